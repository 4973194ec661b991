//! Managed bytecode (IL) instruction model and static opcode tables.
//!
//! The recognized opcode set is the subset a single entry procedure over
//! value types and arrays can contain. Two-byte opcodes are introduced by
//! the 0xFE extension prefix and are keyed as `0x100 | second_byte`, which
//! keeps their numeric space disjoint from the one-byte space.

/// Extension prefix byte introducing a two-byte opcode.
pub const EXTENSION_PREFIX: u8 = 0xFE;

/// Recognized IL operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IlOpcode {
    Nop,
    // Local variable access
    Ldloc0,
    Ldloc1,
    Ldloc2,
    Ldloc3,
    Stloc0,
    Stloc1,
    Stloc2,
    Stloc3,
    LdlocS,
    StlocS,
    Ldloc,
    Stloc,
    // Constants
    LdcI4M1,
    LdcI4(u8), // ldc.i4.0 .. ldc.i4.8, the inline constant is the variant payload
    LdcI4S,
    LdcI4Imm,
    LdcI8,
    // Stack manipulation
    Dup,
    Pop,
    // Calls and returns
    Call,
    Ret,
    // Branches (short = signed byte delta, long = signed 32-bit delta)
    BrS,
    BrfalseS,
    BrtrueS,
    BeqS,
    BltS,
    BgeS,
    BneUnS,
    Br,
    Brfalse,
    Brtrue,
    Beq,
    Blt,
    Bge,
    BneUn,
    // Arithmetic and logic
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    // Conversions (byte-machine no-ops or constant masks)
    ConvI4,
    ConvU2,
    ConvU1,
    // Strings, arrays, metadata
    Ldstr,
    Newarr,
    LdelemU1,
    StelemI1,
    Ldtoken,
    // Extended (0xFE-prefixed) comparisons
    Ceq,
    Cgt,
    CgtUn,
    Clt,
    CltUn,
}

/// Operand encoding required by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No inline operand.
    None,
    /// Unsigned byte (local variable index).
    UInt8,
    /// Signed byte (short constant or short branch delta).
    Int8,
    /// Unsigned 16-bit (long-form local index).
    UInt16,
    /// Signed 32-bit (constant or long branch delta).
    Int32,
    /// Signed 64-bit constant.
    Int64,
    /// 32-bit metadata token resolved to a call/field/type name.
    Token,
    /// 32-bit string token resolved through the string heap table.
    StringToken,
}

impl OperandKind {
    /// Inline operand size in bytes.
    pub fn size(&self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::UInt8 | OperandKind::Int8 => 1,
            OperandKind::UInt16 => 2,
            OperandKind::Int32 | OperandKind::Token | OperandKind::StringToken => 4,
            OperandKind::Int64 => 8,
        }
    }
}

/// Look up an opcode from its numeric key. One-byte opcodes are their own
/// key; extended opcodes are `0x100 | second_byte`.
pub fn opcode_from_key(key: u16) -> Option<IlOpcode> {
    let op = match key {
        0x00 => IlOpcode::Nop,
        0x06 => IlOpcode::Ldloc0,
        0x07 => IlOpcode::Ldloc1,
        0x08 => IlOpcode::Ldloc2,
        0x09 => IlOpcode::Ldloc3,
        0x0A => IlOpcode::Stloc0,
        0x0B => IlOpcode::Stloc1,
        0x0C => IlOpcode::Stloc2,
        0x0D => IlOpcode::Stloc3,
        0x11 => IlOpcode::LdlocS,
        0x13 => IlOpcode::StlocS,
        0x15 => IlOpcode::LdcI4M1,
        0x16..=0x1E => IlOpcode::LdcI4((key - 0x16) as u8),
        0x1F => IlOpcode::LdcI4S,
        0x20 => IlOpcode::LdcI4Imm,
        0x21 => IlOpcode::LdcI8,
        0x25 => IlOpcode::Dup,
        0x26 => IlOpcode::Pop,
        0x28 => IlOpcode::Call,
        0x2A => IlOpcode::Ret,
        0x2B => IlOpcode::BrS,
        0x2C => IlOpcode::BrfalseS,
        0x2D => IlOpcode::BrtrueS,
        0x2E => IlOpcode::BeqS,
        0x2F => IlOpcode::BgeS,
        0x32 => IlOpcode::BltS,
        0x33 => IlOpcode::BneUnS,
        0x38 => IlOpcode::Br,
        0x39 => IlOpcode::Brfalse,
        0x3A => IlOpcode::Brtrue,
        0x3B => IlOpcode::Beq,
        0x3C => IlOpcode::Bge,
        0x3F => IlOpcode::Blt,
        0x40 => IlOpcode::BneUn,
        0x58 => IlOpcode::Add,
        0x59 => IlOpcode::Sub,
        0x5A => IlOpcode::Mul,
        0x5B => IlOpcode::Div,
        0x5F => IlOpcode::And,
        0x60 => IlOpcode::Or,
        0x61 => IlOpcode::Xor,
        0x62 => IlOpcode::Shl,
        0x63 => IlOpcode::Shr,
        0x69 => IlOpcode::ConvI4,
        0x72 => IlOpcode::Ldstr,
        0x8D => IlOpcode::Newarr,
        0x91 => IlOpcode::LdelemU1,
        0x9C => IlOpcode::StelemI1,
        0xD0 => IlOpcode::Ldtoken,
        0xD1 => IlOpcode::ConvU2,
        0xD2 => IlOpcode::ConvU1,
        0x101 => IlOpcode::Ceq,
        0x102 => IlOpcode::Cgt,
        0x103 => IlOpcode::CgtUn,
        0x104 => IlOpcode::Clt,
        0x105 => IlOpcode::CltUn,
        0x10C => IlOpcode::Ldloc,
        0x10E => IlOpcode::Stloc,
        _ => return None,
    };
    Some(op)
}

/// Required inline operand encoding for an opcode.
pub fn operand_kind(opcode: IlOpcode) -> OperandKind {
    match opcode {
        IlOpcode::LdlocS | IlOpcode::StlocS => OperandKind::UInt8,
        IlOpcode::Ldloc | IlOpcode::Stloc => OperandKind::UInt16,
        IlOpcode::LdcI4S => OperandKind::Int8,
        IlOpcode::LdcI4Imm => OperandKind::Int32,
        IlOpcode::LdcI8 => OperandKind::Int64,
        IlOpcode::BrS
        | IlOpcode::BrfalseS
        | IlOpcode::BrtrueS
        | IlOpcode::BeqS
        | IlOpcode::BgeS
        | IlOpcode::BltS
        | IlOpcode::BneUnS => OperandKind::Int8,
        IlOpcode::Br
        | IlOpcode::Brfalse
        | IlOpcode::Brtrue
        | IlOpcode::Beq
        | IlOpcode::Bge
        | IlOpcode::Blt
        | IlOpcode::BneUn => OperandKind::Int32,
        IlOpcode::Call | IlOpcode::Newarr | IlOpcode::Ldtoken => OperandKind::Token,
        IlOpcode::Ldstr => OperandKind::StringToken,
        _ => OperandKind::None,
    }
}

/// True when this opcode transfers control to an IL offset.
pub fn is_branch(opcode: IlOpcode) -> bool {
    matches!(
        opcode,
        IlOpcode::BrS
            | IlOpcode::BrfalseS
            | IlOpcode::BrtrueS
            | IlOpcode::BeqS
            | IlOpcode::BgeS
            | IlOpcode::BltS
            | IlOpcode::BneUnS
            | IlOpcode::Br
            | IlOpcode::Brfalse
            | IlOpcode::Brtrue
            | IlOpcode::Beq
            | IlOpcode::Bge
            | IlOpcode::Blt
            | IlOpcode::BneUn
    )
}

/// Human-readable opcode name for diagnostics.
pub fn opcode_name(opcode: IlOpcode) -> &'static str {
    match opcode {
        IlOpcode::Nop => "nop",
        IlOpcode::Ldloc0 => "ldloc.0",
        IlOpcode::Ldloc1 => "ldloc.1",
        IlOpcode::Ldloc2 => "ldloc.2",
        IlOpcode::Ldloc3 => "ldloc.3",
        IlOpcode::Stloc0 => "stloc.0",
        IlOpcode::Stloc1 => "stloc.1",
        IlOpcode::Stloc2 => "stloc.2",
        IlOpcode::Stloc3 => "stloc.3",
        IlOpcode::LdlocS => "ldloc.s",
        IlOpcode::StlocS => "stloc.s",
        IlOpcode::Ldloc => "ldloc",
        IlOpcode::Stloc => "stloc",
        IlOpcode::LdcI4M1 => "ldc.i4.m1",
        IlOpcode::LdcI4(_) => "ldc.i4.<n>",
        IlOpcode::LdcI4S => "ldc.i4.s",
        IlOpcode::LdcI4Imm => "ldc.i4",
        IlOpcode::LdcI8 => "ldc.i8",
        IlOpcode::Dup => "dup",
        IlOpcode::Pop => "pop",
        IlOpcode::Call => "call",
        IlOpcode::Ret => "ret",
        IlOpcode::BrS => "br.s",
        IlOpcode::BrfalseS => "brfalse.s",
        IlOpcode::BrtrueS => "brtrue.s",
        IlOpcode::BeqS => "beq.s",
        IlOpcode::BgeS => "bge.s",
        IlOpcode::BltS => "blt.s",
        IlOpcode::BneUnS => "bne.un.s",
        IlOpcode::Br => "br",
        IlOpcode::Brfalse => "brfalse",
        IlOpcode::Brtrue => "brtrue",
        IlOpcode::Beq => "beq",
        IlOpcode::Bge => "bge",
        IlOpcode::Blt => "blt",
        IlOpcode::BneUn => "bne.un",
        IlOpcode::Add => "add",
        IlOpcode::Sub => "sub",
        IlOpcode::Mul => "mul",
        IlOpcode::Div => "div",
        IlOpcode::And => "and",
        IlOpcode::Or => "or",
        IlOpcode::Xor => "xor",
        IlOpcode::Shl => "shl",
        IlOpcode::Shr => "shr",
        IlOpcode::ConvI4 => "conv.i4",
        IlOpcode::ConvU2 => "conv.u2",
        IlOpcode::ConvU1 => "conv.u1",
        IlOpcode::Ldstr => "ldstr",
        IlOpcode::Newarr => "newarr",
        IlOpcode::LdelemU1 => "ldelem.u1",
        IlOpcode::StelemI1 => "stelem.i1",
        IlOpcode::Ldtoken => "ldtoken",
        IlOpcode::Ceq => "ceq",
        IlOpcode::Cgt => "cgt",
        IlOpcode::CgtUn => "cgt.un",
        IlOpcode::Clt => "clt",
        IlOpcode::CltUn => "clt.un",
    }
}

/// Decoded inline operand.
#[derive(Debug, Clone, PartialEq)]
pub enum IlOperand {
    None,
    Int8(i8),
    UInt16(u16),
    Int32(i32),
    Int64(i64),
    /// Literal text from the string heap.
    Str(String),
    /// Resolved call/field/type target name.
    Name(String),
}

/// A decoded IL instruction. Immutable once decoded.
#[derive(Debug, Clone)]
pub struct IlInstruction {
    pub opcode: IlOpcode,
    pub operand: IlOperand,
    /// IL byte offset of the opcode.
    pub offset: usize,
    /// Total encoded size in bytes, prefix and operand included.
    pub size: usize,
}

impl IlInstruction {
    /// IL offset of the instruction following this one.
    pub fn next_offset(&self) -> usize {
        self.offset + self.size
    }

    /// Branch target as an absolute IL offset, if this is a branch.
    pub fn branch_target(&self) -> Option<usize> {
        if !is_branch(self.opcode) {
            return None;
        }
        let delta = match self.operand {
            IlOperand::Int8(d) => d as i64,
            IlOperand::Int32(d) => d as i64,
            _ => return None,
        };
        Some((self.next_offset() as i64 + delta) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_lookup_single_byte() {
        assert_eq!(opcode_from_key(0x00), Some(IlOpcode::Nop));
        assert_eq!(opcode_from_key(0x28), Some(IlOpcode::Call));
        assert_eq!(opcode_from_key(0x16), Some(IlOpcode::LdcI4(0)));
        assert_eq!(opcode_from_key(0x1E), Some(IlOpcode::LdcI4(8)));
        assert_eq!(opcode_from_key(0x01), None);
    }

    #[test]
    fn test_opcode_lookup_extended() {
        assert_eq!(opcode_from_key(0x101), Some(IlOpcode::Ceq));
        assert_eq!(opcode_from_key(0x104), Some(IlOpcode::Clt));
        // The extension prefix itself is not an opcode key
        assert_eq!(opcode_from_key(0xFE), None);
    }

    #[test]
    fn test_operand_widths() {
        assert_eq!(operand_kind(IlOpcode::Nop).size(), 0);
        assert_eq!(operand_kind(IlOpcode::LdcI4S).size(), 1);
        assert_eq!(operand_kind(IlOpcode::Ldloc).size(), 2);
        assert_eq!(operand_kind(IlOpcode::Call).size(), 4);
        assert_eq!(operand_kind(IlOpcode::LdcI8).size(), 8);
    }

    #[test]
    fn test_branch_target_arithmetic() {
        let inst = IlInstruction {
            opcode: IlOpcode::BrS,
            operand: IlOperand::Int8(-2),
            offset: 0x10,
            size: 2,
        };
        // Target is relative to the following instruction
        assert_eq!(inst.branch_target(), Some(0x10));
    }
}
