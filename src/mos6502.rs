//! Target machine model: 6502 mnemonics, addressing modes, and encoding.

use crate::error::TranslateError;
use std::fmt;

/// The 56 legal 6502 mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Mnemonic {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The 13 addressing forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirect,
    IndirectIndexed,
    Relative,
}

impl AddrMode {
    /// Instruction size in bytes for this mode (opcode byte included).
    pub fn size(&self) -> usize {
        match self {
            AddrMode::Implied | AddrMode::Accumulator => 1,
            AddrMode::Immediate
            | AddrMode::ZeroPage
            | AddrMode::ZeroPageX
            | AddrMode::ZeroPageY
            | AddrMode::IndexedIndirect
            | AddrMode::IndirectIndexed
            | AddrMode::Relative => 2,
            AddrMode::Absolute | AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::Indirect => {
                3
            }
        }
    }
}

/// Instruction operand. Symbolic forms are rewritten to literal bytes by
/// the address resolver; encoding a symbolic operand is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Byte(u8),
    Word(u16),
    /// Absolute reference to a label (word once resolved).
    Label(String),
    /// Low byte of a label's resolved address (immediate).
    LabelLo(String),
    /// High byte of a label's resolved address (immediate).
    LabelHi(String),
}

/// A single target machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetInstruction {
    pub op: Mnemonic,
    pub mode: AddrMode,
    pub operand: Operand,
}

impl TargetInstruction {
    pub fn new(op: Mnemonic, mode: AddrMode, operand: Operand) -> Self {
        TargetInstruction { op, mode, operand }
    }

    pub fn implied(op: Mnemonic) -> Self {
        Self::new(op, AddrMode::Implied, Operand::None)
    }

    pub fn accumulator(op: Mnemonic) -> Self {
        Self::new(op, AddrMode::Accumulator, Operand::None)
    }

    pub fn imm(op: Mnemonic, value: u8) -> Self {
        Self::new(op, AddrMode::Immediate, Operand::Byte(value))
    }

    /// Immediate loading the low byte of a label's address.
    pub fn imm_lo(op: Mnemonic, label: &str) -> Self {
        Self::new(op, AddrMode::Immediate, Operand::LabelLo(label.to_string()))
    }

    /// Immediate loading the high byte of a label's address.
    pub fn imm_hi(op: Mnemonic, label: &str) -> Self {
        Self::new(op, AddrMode::Immediate, Operand::LabelHi(label.to_string()))
    }

    pub fn zp(op: Mnemonic, addr: u8) -> Self {
        Self::new(op, AddrMode::ZeroPage, Operand::Byte(addr))
    }

    pub fn zpx(op: Mnemonic, addr: u8) -> Self {
        Self::new(op, AddrMode::ZeroPageX, Operand::Byte(addr))
    }

    pub fn abs(op: Mnemonic, addr: u16) -> Self {
        Self::new(op, AddrMode::Absolute, Operand::Word(addr))
    }

    pub fn abs_label(op: Mnemonic, label: &str) -> Self {
        Self::new(op, AddrMode::Absolute, Operand::Label(label.to_string()))
    }

    pub fn abs_x(op: Mnemonic, addr: u16) -> Self {
        Self::new(op, AddrMode::AbsoluteX, Operand::Word(addr))
    }

    pub fn abs_x_label(op: Mnemonic, label: &str) -> Self {
        Self::new(op, AddrMode::AbsoluteX, Operand::Label(label.to_string()))
    }

    pub fn abs_y(op: Mnemonic, addr: u16) -> Self {
        Self::new(op, AddrMode::AbsoluteY, Operand::Word(addr))
    }

    pub fn ind_y(op: Mnemonic, zp_addr: u8) -> Self {
        Self::new(op, AddrMode::IndirectIndexed, Operand::Byte(zp_addr))
    }

    /// Relative branch to a label; the resolver computes the displacement.
    pub fn rel(op: Mnemonic, label: &str) -> Self {
        Self::new(op, AddrMode::Relative, Operand::Label(label.to_string()))
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.mode.size()
    }

    /// Append the encoded bytes. All symbolic operands must have been
    /// rewritten by the resolver first.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), TranslateError> {
        let opcode = encode(self.op, self.mode).ok_or_else(|| {
            TranslateError::Decode(
                format!("illegal encoding {} {:?}", self.op, self.mode),
                0,
            )
        })?;
        out.push(opcode);
        match (&self.operand, self.mode.size()) {
            (Operand::None, 1) => {}
            (Operand::Byte(b), 2) => out.push(*b),
            (Operand::Word(w), 3) => {
                out.push(*w as u8);
                out.push((*w >> 8) as u8);
            }
            (Operand::Label(name), _)
            | (Operand::LabelLo(name), _)
            | (Operand::LabelHi(name), _) => {
                return Err(TranslateError::UnresolvedLabel(name.clone()));
            }
            _ => {
                return Err(TranslateError::Decode(
                    format!("operand {:?} does not fit mode {:?}", self.operand, self.mode),
                    0,
                ));
            }
        }
        Ok(())
    }
}

/// Invert a conditional branch, for long-branch trampoline rewriting.
pub fn invert_branch(op: Mnemonic) -> Option<Mnemonic> {
    match op {
        Mnemonic::BEQ => Some(Mnemonic::BNE),
        Mnemonic::BNE => Some(Mnemonic::BEQ),
        Mnemonic::BCC => Some(Mnemonic::BCS),
        Mnemonic::BCS => Some(Mnemonic::BCC),
        Mnemonic::BPL => Some(Mnemonic::BMI),
        Mnemonic::BMI => Some(Mnemonic::BPL),
        Mnemonic::BVC => Some(Mnemonic::BVS),
        Mnemonic::BVS => Some(Mnemonic::BVC),
        _ => None,
    }
}

/// Opcode byte for a mnemonic/mode pair, or None when the pair is illegal.
pub fn encode(op: Mnemonic, mode: AddrMode) -> Option<u8> {
    use AddrMode::*;
    use Mnemonic::*;
    let byte = match (op, mode) {
        (ADC, Immediate) => 0x69,
        (ADC, ZeroPage) => 0x65,
        (ADC, ZeroPageX) => 0x75,
        (ADC, Absolute) => 0x6D,
        (ADC, AbsoluteX) => 0x7D,
        (ADC, AbsoluteY) => 0x79,
        (ADC, IndexedIndirect) => 0x61,
        (ADC, IndirectIndexed) => 0x71,
        (AND, Immediate) => 0x29,
        (AND, ZeroPage) => 0x25,
        (AND, ZeroPageX) => 0x35,
        (AND, Absolute) => 0x2D,
        (AND, AbsoluteX) => 0x3D,
        (AND, AbsoluteY) => 0x39,
        (AND, IndexedIndirect) => 0x21,
        (AND, IndirectIndexed) => 0x31,
        (ASL, Accumulator) => 0x0A,
        (ASL, ZeroPage) => 0x06,
        (ASL, ZeroPageX) => 0x16,
        (ASL, Absolute) => 0x0E,
        (ASL, AbsoluteX) => 0x1E,
        (BCC, Relative) => 0x90,
        (BCS, Relative) => 0xB0,
        (BEQ, Relative) => 0xF0,
        (BIT, ZeroPage) => 0x24,
        (BIT, Absolute) => 0x2C,
        (BMI, Relative) => 0x30,
        (BNE, Relative) => 0xD0,
        (BPL, Relative) => 0x10,
        (BRK, Implied) => 0x00,
        (BVC, Relative) => 0x50,
        (BVS, Relative) => 0x70,
        (CLC, Implied) => 0x18,
        (CLD, Implied) => 0xD8,
        (CLI, Implied) => 0x58,
        (CLV, Implied) => 0xB8,
        (CMP, Immediate) => 0xC9,
        (CMP, ZeroPage) => 0xC5,
        (CMP, ZeroPageX) => 0xD5,
        (CMP, Absolute) => 0xCD,
        (CMP, AbsoluteX) => 0xDD,
        (CMP, AbsoluteY) => 0xD9,
        (CMP, IndexedIndirect) => 0xC1,
        (CMP, IndirectIndexed) => 0xD1,
        (CPX, Immediate) => 0xE0,
        (CPX, ZeroPage) => 0xE4,
        (CPX, Absolute) => 0xEC,
        (CPY, Immediate) => 0xC0,
        (CPY, ZeroPage) => 0xC4,
        (CPY, Absolute) => 0xCC,
        (DEC, ZeroPage) => 0xC6,
        (DEC, ZeroPageX) => 0xD6,
        (DEC, Absolute) => 0xCE,
        (DEC, AbsoluteX) => 0xDE,
        (DEX, Implied) => 0xCA,
        (DEY, Implied) => 0x88,
        (EOR, Immediate) => 0x49,
        (EOR, ZeroPage) => 0x45,
        (EOR, ZeroPageX) => 0x55,
        (EOR, Absolute) => 0x4D,
        (EOR, AbsoluteX) => 0x5D,
        (EOR, AbsoluteY) => 0x59,
        (EOR, IndexedIndirect) => 0x41,
        (EOR, IndirectIndexed) => 0x51,
        (INC, ZeroPage) => 0xE6,
        (INC, ZeroPageX) => 0xF6,
        (INC, Absolute) => 0xEE,
        (INC, AbsoluteX) => 0xFE,
        (INX, Implied) => 0xE8,
        (INY, Implied) => 0xC8,
        (JMP, Absolute) => 0x4C,
        (JMP, Indirect) => 0x6C,
        (JSR, Absolute) => 0x20,
        (LDA, Immediate) => 0xA9,
        (LDA, ZeroPage) => 0xA5,
        (LDA, ZeroPageX) => 0xB5,
        (LDA, Absolute) => 0xAD,
        (LDA, AbsoluteX) => 0xBD,
        (LDA, AbsoluteY) => 0xB9,
        (LDA, IndexedIndirect) => 0xA1,
        (LDA, IndirectIndexed) => 0xB1,
        (LDX, Immediate) => 0xA2,
        (LDX, ZeroPage) => 0xA6,
        (LDX, ZeroPageY) => 0xB6,
        (LDX, Absolute) => 0xAE,
        (LDX, AbsoluteY) => 0xBE,
        (LDY, Immediate) => 0xA0,
        (LDY, ZeroPage) => 0xA4,
        (LDY, ZeroPageX) => 0xB4,
        (LDY, Absolute) => 0xAC,
        (LDY, AbsoluteX) => 0xBC,
        (LSR, Accumulator) => 0x4A,
        (LSR, ZeroPage) => 0x46,
        (LSR, ZeroPageX) => 0x56,
        (LSR, Absolute) => 0x4E,
        (LSR, AbsoluteX) => 0x5E,
        (NOP, Implied) => 0xEA,
        (ORA, Immediate) => 0x09,
        (ORA, ZeroPage) => 0x05,
        (ORA, ZeroPageX) => 0x15,
        (ORA, Absolute) => 0x0D,
        (ORA, AbsoluteX) => 0x1D,
        (ORA, AbsoluteY) => 0x19,
        (ORA, IndexedIndirect) => 0x01,
        (ORA, IndirectIndexed) => 0x11,
        (PHA, Implied) => 0x48,
        (PHP, Implied) => 0x08,
        (PLA, Implied) => 0x68,
        (PLP, Implied) => 0x28,
        (ROL, Accumulator) => 0x2A,
        (ROL, ZeroPage) => 0x26,
        (ROL, ZeroPageX) => 0x36,
        (ROL, Absolute) => 0x2E,
        (ROL, AbsoluteX) => 0x3E,
        (ROR, Accumulator) => 0x6A,
        (ROR, ZeroPage) => 0x66,
        (ROR, ZeroPageX) => 0x76,
        (ROR, Absolute) => 0x6E,
        (ROR, AbsoluteX) => 0x7E,
        (RTI, Implied) => 0x40,
        (RTS, Implied) => 0x60,
        (SBC, Immediate) => 0xE9,
        (SBC, ZeroPage) => 0xE5,
        (SBC, ZeroPageX) => 0xF5,
        (SBC, Absolute) => 0xED,
        (SBC, AbsoluteX) => 0xFD,
        (SBC, AbsoluteY) => 0xF9,
        (SBC, IndexedIndirect) => 0xE1,
        (SBC, IndirectIndexed) => 0xF1,
        (SEC, Implied) => 0x38,
        (SED, Implied) => 0xF8,
        (SEI, Implied) => 0x78,
        (STA, ZeroPage) => 0x85,
        (STA, ZeroPageX) => 0x95,
        (STA, Absolute) => 0x8D,
        (STA, AbsoluteX) => 0x9D,
        (STA, AbsoluteY) => 0x99,
        (STA, IndexedIndirect) => 0x81,
        (STA, IndirectIndexed) => 0x91,
        (STX, ZeroPage) => 0x86,
        (STX, ZeroPageY) => 0x96,
        (STX, Absolute) => 0x8E,
        (STY, ZeroPage) => 0x84,
        (STY, ZeroPageX) => 0x94,
        (STY, Absolute) => 0x8C,
        (TAX, Implied) => 0xAA,
        (TAY, Implied) => 0xA8,
        (TSX, Implied) => 0xBA,
        (TXA, Implied) => 0x8A,
        (TXS, Implied) => 0x9A,
        (TYA, Implied) => 0x98,
        _ => return None,
    };
    Some(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_common_forms() {
        assert_eq!(encode(Mnemonic::LDA, AddrMode::Immediate), Some(0xA9));
        assert_eq!(encode(Mnemonic::STA, AddrMode::Absolute), Some(0x8D));
        assert_eq!(encode(Mnemonic::JSR, AddrMode::Absolute), Some(0x20));
        assert_eq!(encode(Mnemonic::BNE, AddrMode::Relative), Some(0xD0));
        assert_eq!(encode(Mnemonic::RTS, AddrMode::Implied), Some(0x60));
    }

    #[test]
    fn test_illegal_pairs_rejected() {
        assert_eq!(encode(Mnemonic::STA, AddrMode::Immediate), None);
        assert_eq!(encode(Mnemonic::JMP, AddrMode::ZeroPage), None);
        assert_eq!(encode(Mnemonic::LDX, AddrMode::ZeroPageX), None);
    }

    #[test]
    fn test_sizes_follow_mode() {
        assert_eq!(TargetInstruction::implied(Mnemonic::SEI).size(), 1);
        assert_eq!(TargetInstruction::imm(Mnemonic::LDA, 0x10).size(), 2);
        assert_eq!(TargetInstruction::abs(Mnemonic::STA, 0x2006).size(), 3);
        assert_eq!(TargetInstruction::rel(Mnemonic::BNE, "loop").size(), 2);
    }

    #[test]
    fn test_encode_into_little_endian() {
        let mut out = Vec::new();
        TargetInstruction::abs(Mnemonic::STA, 0x2006)
            .encode_into(&mut out)
            .unwrap();
        assert_eq!(out, vec![0x8D, 0x06, 0x20]);
    }

    #[test]
    fn test_encode_symbolic_operand_is_error() {
        let mut out = Vec::new();
        let err = TargetInstruction::abs_label(Mnemonic::JMP, "main")
            .encode_into(&mut out)
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnresolvedLabel(_)));
    }

    #[test]
    fn test_invert_branch() {
        assert_eq!(invert_branch(Mnemonic::BEQ), Some(Mnemonic::BNE));
        assert_eq!(invert_branch(Mnemonic::BCS), Some(Mnemonic::BCC));
        assert_eq!(invert_branch(Mnemonic::JMP), None);
    }
}
