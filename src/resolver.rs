//! Address resolution.
//!
//! A fixed-point pass over the block arena: walk blocks in order from the
//! base address, define every label at its running address, then patch all
//! symbolic operands. Because resolution is pure recomputation from the
//! in-memory model, blocks may be inserted, removed, or reordered and the
//! pass simply re-run; no write-then-truncate correction exists.
//!
//! Relative branches whose displacement cannot fit a signed byte are
//! rewritten into a long-branch trampoline (inverted short branch over an
//! absolute jump) before patching.

use crate::error::TranslateError;
use crate::mos6502::{invert_branch, AddrMode, Mnemonic, Operand, TargetInstruction};
use crate::program::{BlockItem, Program};
use indexmap::IndexMap;
use log::debug;

/// Walk the arena and bind every label to its running address.
/// Defining a label twice is a hard error.
pub fn assign_addresses(program: &Program) -> Result<IndexMap<String, u16>, TranslateError> {
    let mut labels: IndexMap<String, u16> = IndexMap::new();
    let mut pc = program.base as usize;

    for block in &program.blocks {
        if let Some(name) = &block.label {
            define(&mut labels, name, pc)?;
        }
        for item in &block.items {
            if let Some(name) = item.label() {
                define(&mut labels, name, pc)?;
            }
            pc += item.size();
        }
    }
    // The running address may legally land on 0x10000 (end of the address
    // space) but never past it.
    if pc > 0x1_0000 {
        return Err(TranslateError::AddressOverflow(pc));
    }

    debug!(
        "Address pass: {} labels over 0x{:04x}..0x{:04x}",
        labels.len(),
        program.base,
        pc
    );
    Ok(labels)
}

fn define(
    labels: &mut IndexMap<String, u16>,
    name: &str,
    pc: usize,
) -> Result<(), TranslateError> {
    if labels.contains_key(name) {
        return Err(TranslateError::DuplicateLabel(name.to_string()));
    }
    if pc > 0xFFFF {
        return Err(TranslateError::AddressOverflow(pc));
    }
    labels.insert(name.to_string(), pc as u16);
    Ok(())
}

/// Resolve the program: relax out-of-range relative branches into
/// trampolines, then patch every symbolic operand to its literal bytes.
/// Returns the final label table. Idempotent on a resolved program.
pub fn resolve(program: &mut Program) -> Result<IndexMap<String, u16>, TranslateError> {
    // Relaxation loop: every pass either finds nothing to rewrite or
    // converts one symbolic relative branch to a non-symbolic trampoline,
    // so the loop terminates.
    loop {
        let labels = assign_addresses(program)?;
        match find_overflowing_branch(program, &labels)? {
            None => {
                patch(program, &labels)?;
                return Ok(labels);
            }
            Some((block_idx, item_idx)) => {
                rewrite_as_trampoline(program, block_idx, item_idx)?;
            }
        }
    }
}

/// Locate the first symbolic relative branch whose displacement does not
/// fit in a signed byte.
fn find_overflowing_branch(
    program: &Program,
    labels: &IndexMap<String, u16>,
) -> Result<Option<(usize, usize)>, TranslateError> {
    let mut pc = program.base as usize;
    for (bi, block) in program.blocks.iter().enumerate() {
        for (ii, item) in block.items.iter().enumerate() {
            if let BlockItem::Inst { inst, .. } = item {
                if inst.mode == AddrMode::Relative {
                    if let Operand::Label(name) = &inst.operand {
                        let target = *labels
                            .get(name)
                            .ok_or_else(|| TranslateError::UnresolvedLabel(name.clone()))?;
                        let disp = target as i64 - (pc as i64 + 2);
                        if !(-128..=127).contains(&disp) {
                            debug!(
                                "Branch relaxation: {} -> '{}' displacement {} at 0x{:04x}",
                                inst.op, name, disp, pc
                            );
                            return Ok(Some((bi, ii)));
                        }
                    }
                }
            }
            pc += item.size();
        }
    }
    Ok(None)
}

/// Replace a conditional branch with an inverted-condition short branch
/// over an absolute jump to the original target.
fn rewrite_as_trampoline(
    program: &mut Program,
    block_idx: usize,
    item_idx: usize,
) -> Result<(), TranslateError> {
    let block = &mut program.blocks[block_idx];
    let (inline_label, op, target) = match &block.items[item_idx] {
        BlockItem::Inst { label, inst } => {
            let target = match &inst.operand {
                Operand::Label(name) => name.clone(),
                _ => unreachable!("relaxation only selects symbolic branches"),
            };
            (label.clone(), inst.op, target)
        }
        BlockItem::Data { .. } => unreachable!("relaxation only selects instructions"),
    };

    let inverted = invert_branch(op).ok_or_else(|| {
        // A relative branch with no inverse cannot take the trampoline.
        TranslateError::BranchOutOfRange(target.clone(), i32::MAX)
    })?;

    // Inverted branch skips the 3-byte JMP that follows it.
    block.items[item_idx] = BlockItem::Inst {
        label: inline_label,
        inst: TargetInstruction::new(inverted, AddrMode::Relative, Operand::Byte(3)),
    };
    block.items.insert(
        item_idx + 1,
        BlockItem::Inst {
            label: None,
            inst: TargetInstruction::abs_label(Mnemonic::JMP, &target),
        },
    );
    Ok(())
}

/// Rewrite every symbolic operand to its literal byte form.
fn patch(program: &mut Program, labels: &IndexMap<String, u16>) -> Result<(), TranslateError> {
    let mut pc = program.base as usize;
    for block in &mut program.blocks {
        for item in &mut block.items {
            let size = item.size();
            if let BlockItem::Inst { inst, .. } = item {
                match &inst.operand {
                    Operand::Label(name) => {
                        let target = lookup(labels, name)?;
                        if inst.mode == AddrMode::Relative {
                            let disp = target as i64 - (pc as i64 + 2);
                            if !(-128..=127).contains(&disp) {
                                return Err(TranslateError::BranchOutOfRange(
                                    name.clone(),
                                    disp as i32,
                                ));
                            }
                            inst.operand = Operand::Byte(disp as i8 as u8);
                        } else {
                            inst.operand = Operand::Word(target);
                        }
                    }
                    Operand::LabelLo(name) => {
                        let target = lookup(labels, name)?;
                        inst.operand = Operand::Byte(target as u8);
                    }
                    Operand::LabelHi(name) => {
                        let target = lookup(labels, name)?;
                        inst.operand = Operand::Byte((target >> 8) as u8);
                    }
                    _ => {}
                }
            }
            pc += size;
        }
    }
    Ok(())
}

fn lookup(labels: &IndexMap<String, u16>, name: &str) -> Result<u16, TranslateError> {
    labels
        .get(name)
        .copied()
        .ok_or_else(|| TranslateError::UnresolvedLabel(name.to_string()))
}

/// Encode a fully resolved program to its byte image.
pub fn emit(program: &Program) -> Result<Vec<u8>, TranslateError> {
    let mut out = Vec::with_capacity(program.total_size());
    for block in &program.blocks {
        for item in &block.items {
            match item {
                BlockItem::Inst { inst, .. } => inst.encode_into(&mut out)?,
                BlockItem::Data { bytes, .. } => out.extend_from_slice(bytes),
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Block;

    fn jmp_block(label: &str, target: &str) -> Block {
        let mut b = Block::new(label);
        b.push(TargetInstruction::abs_label(Mnemonic::JMP, target));
        b
    }

    #[test]
    fn test_forward_reference_resolves() {
        let mut program = Program::new(0x8000);
        program.push_block(jmp_block("start", "end"));
        let mut end = Block::new("end");
        end.push(TargetInstruction::implied(Mnemonic::RTS));
        program.push_block(end);

        let labels = resolve(&mut program).unwrap();
        assert_eq!(labels["start"], 0x8000);
        assert_eq!(labels["end"], 0x8003);

        let bytes = emit(&program).unwrap();
        assert_eq!(bytes, vec![0x4C, 0x03, 0x80, 0x60]);
    }

    #[test]
    fn test_duplicate_label_is_fatal() {
        let mut program = Program::new(0x8000);
        program.push_block(jmp_block("a", "a"));
        let mut b = Block::new("a");
        b.push(TargetInstruction::implied(Mnemonic::RTS));
        program.push_block(b);

        assert!(matches!(
            resolve(&mut program),
            Err(TranslateError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_program_past_address_space_is_fatal() {
        let mut program = Program::new(0x8000);
        let mut b = Block::anonymous();
        b.push_data(None, vec![0x00; 0x8001]);
        program.push_block(b);

        assert!(matches!(
            resolve(&mut program),
            Err(TranslateError::AddressOverflow(_))
        ));
    }

    #[test]
    fn test_label_past_address_space_is_fatal() {
        let mut program = Program::new(0x8000);
        let mut filler = Block::anonymous();
        filler.push_data(None, vec![0x00; 0x8000]);
        program.push_block(filler);
        let mut end = Block::new("end");
        end.push(TargetInstruction::implied(Mnemonic::RTS));
        program.push_block(end);

        assert!(matches!(
            resolve(&mut program),
            Err(TranslateError::AddressOverflow(_))
        ));
    }

    #[test]
    fn test_undefined_label_is_fatal() {
        let mut program = Program::new(0x8000);
        program.push_block(jmp_block("a", "nowhere"));

        assert!(matches!(
            resolve(&mut program),
            Err(TranslateError::UnresolvedLabel(_))
        ));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut program = Program::new(0x8000);
        let mut b = Block::new("loop");
        b.push(TargetInstruction::imm(Mnemonic::LDA, 1));
        b.push(TargetInstruction::rel(Mnemonic::BNE, "loop"));
        b.push(TargetInstruction::implied(Mnemonic::RTS));
        program.push_block(b);

        let first = resolve(&mut program).unwrap();
        let second = resolve(&mut program).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_branch_displacement() {
        let mut program = Program::new(0x8000);
        let mut b = Block::new("loop");
        b.push(TargetInstruction::imm(Mnemonic::LDA, 1)); // 0x8000..0x8002
        b.push(TargetInstruction::rel(Mnemonic::BNE, "loop")); // 0x8002..0x8004
        program.push_block(b);

        resolve(&mut program).unwrap();
        let bytes = emit(&program).unwrap();
        // Displacement: 0x8000 - 0x8004 = -4
        assert_eq!(bytes, vec![0xA9, 0x01, 0xD0, 0xFC]);
    }

    #[test]
    fn test_long_branch_becomes_trampoline() {
        // A conditional branch backwards over > 127 bytes of code must be
        // rewritten, not rejected.
        let mut program = Program::new(0x8000);
        let mut b = Block::new("loop");
        for _ in 0..100 {
            b.push(TargetInstruction::abs(Mnemonic::STA, 0x2007)); // 300 bytes
        }
        b.push(TargetInstruction::rel(Mnemonic::BEQ, "loop"));
        b.push(TargetInstruction::implied(Mnemonic::RTS));
        program.push_block(b);

        let labels = resolve(&mut program).unwrap();
        let bytes = emit(&program).unwrap();

        // The branch site now holds BNE +3 / JMP $8000.
        let site = 300;
        assert_eq!(bytes[site], 0xD0); // inverted BEQ -> BNE
        assert_eq!(bytes[site + 1], 0x03);
        assert_eq!(bytes[site + 2], 0x4C);
        assert_eq!(
            u16::from_le_bytes([bytes[site + 3], bytes[site + 4]]),
            labels["loop"]
        );
        assert_eq!(bytes[site + 5], 0x60);
    }

    #[test]
    fn test_all_relative_displacements_in_range() {
        // Property: after resolution every relative operand is a byte whose
        // signed value lands on the label's resolved address.
        let mut program = Program::new(0x8000);
        let mut b = Block::new("head");
        b.push(TargetInstruction::imm(Mnemonic::LDA, 0));
        b.push_labeled("mid", TargetInstruction::imm(Mnemonic::LDX, 0));
        b.push(TargetInstruction::rel(Mnemonic::BNE, "mid"));
        b.push(TargetInstruction::rel(Mnemonic::BEQ, "head"));
        program.push_block(b);

        let labels = resolve(&mut program).unwrap();
        let mut pc = 0x8000usize;
        for block in &program.blocks {
            for item in &block.items {
                if let BlockItem::Inst { inst, .. } = item {
                    if inst.mode == AddrMode::Relative {
                        if let Operand::Byte(d) = inst.operand {
                            let disp = d as i8 as i64;
                            assert!((-128..=127).contains(&disp));
                            let dest = (pc as i64 + 2 + disp) as u16;
                            assert!(labels.values().any(|&a| a == dest));
                        } else {
                            panic!("unpatched relative operand");
                        }
                    }
                }
                pc += item.size();
            }
        }
    }
}
