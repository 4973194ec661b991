//! Bytecode reader: decodes an entry procedure's raw instruction bytes
//! into an ordered sequence of structured IL instructions.
//!
//! The reader has no knowledge of the target machine. Metadata tokens are
//! resolved to human-readable names through caller-provided tables; a token
//! that cannot be resolved is fatal, because the translator cannot select
//! an instruction without knowing the call target.

use crate::error::TranslateError;
use crate::il::{
    opcode_from_key, opcode_name, operand_kind, IlInstruction, IlOperand, OperandKind,
    EXTENSION_PREFIX,
};
use indexmap::IndexMap;
use log::debug;

/// Decode a full method body into structured instructions.
///
/// Decoding is a total, deterministic function of its inputs: the same
/// bytes and tables always produce the same instruction sequence.
pub fn read_body(
    body: &[u8],
    tokens: &IndexMap<u32, String>,
    strings: &IndexMap<u32, String>,
) -> Result<Vec<IlInstruction>, TranslateError> {
    let mut instructions = Vec::new();
    let mut offset = 0;

    while offset < body.len() {
        let inst = decode_at(body, offset, tokens, strings)?;
        debug!(
            "IL 0x{:04x}: {} {:?}",
            inst.offset,
            opcode_name(inst.opcode),
            inst.operand
        );
        offset = inst.next_offset();
        instructions.push(inst);
    }

    Ok(instructions)
}

/// Decode a single instruction at the given IL offset.
pub fn decode_at(
    body: &[u8],
    offset: usize,
    tokens: &IndexMap<u32, String>,
    strings: &IndexMap<u32, String>,
) -> Result<IlInstruction, TranslateError> {
    if offset >= body.len() {
        return Err(TranslateError::Decode(
            "instruction offset out of bounds".to_string(),
            offset,
        ));
    }

    let first = body[offset];
    let mut cursor = offset + 1;

    // One-byte opcode, or two-byte behind the extension prefix. Extended
    // opcodes are keyed past the one-byte space.
    let key = if first == EXTENSION_PREFIX {
        if cursor >= body.len() {
            return Err(TranslateError::Decode(
                "truncated extended opcode".to_string(),
                offset,
            ));
        }
        let second = body[cursor];
        cursor += 1;
        0x100u16 | second as u16
    } else {
        first as u16
    };

    let opcode = opcode_from_key(key).ok_or_else(|| {
        TranslateError::Unsupported(format!("opcode 0x{:02x}", key), offset)
    })?;

    let kind = operand_kind(opcode);
    let width = kind.size();
    if cursor + width > body.len() {
        return Err(TranslateError::Decode(
            format!(
                "truncated operand for '{}' ({} bytes required)",
                opcode_name(opcode),
                width
            ),
            offset,
        ));
    }

    let operand = match kind {
        OperandKind::None => IlOperand::None,
        OperandKind::UInt8 => IlOperand::Int8(body[cursor] as i8),
        OperandKind::Int8 => IlOperand::Int8(body[cursor] as i8),
        OperandKind::UInt16 => {
            IlOperand::UInt16(u16::from_le_bytes([body[cursor], body[cursor + 1]]))
        }
        OperandKind::Int32 => IlOperand::Int32(read_i32(body, cursor)),
        OperandKind::Int64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&body[cursor..cursor + 8]);
            IlOperand::Int64(i64::from_le_bytes(raw))
        }
        OperandKind::Token => {
            let token = read_i32(body, cursor) as u32;
            let name = tokens
                .get(&token)
                .ok_or(TranslateError::UnresolvedToken(token, offset))?;
            IlOperand::Name(name.clone())
        }
        OperandKind::StringToken => {
            let token = read_i32(body, cursor) as u32;
            let text = strings
                .get(&token)
                .ok_or(TranslateError::UnresolvedString(token, offset))?;
            IlOperand::Str(text.clone())
        }
    };
    cursor += width;

    Ok(IlInstruction {
        opcode,
        operand,
        offset,
        size: cursor - offset,
    })
}

fn read_i32(body: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::IlOpcode;

    fn no_tables() -> (IndexMap<u32, String>, IndexMap<u32, String>) {
        (IndexMap::new(), IndexMap::new())
    }

    #[test]
    fn test_decode_simple_sequence() {
        // ldc.i4.2 / ldc.i4.s 10 / add / ret
        let body = vec![0x18, 0x1F, 0x0A, 0x58, 0x2A];
        let (tokens, strings) = no_tables();

        let insts = read_body(&body, &tokens, &strings).unwrap();
        assert_eq!(insts.len(), 4);
        assert_eq!(insts[0].opcode, IlOpcode::LdcI4(2));
        assert_eq!(insts[1].opcode, IlOpcode::LdcI4S);
        assert_eq!(insts[1].operand, IlOperand::Int8(10));
        assert_eq!(insts[2].opcode, IlOpcode::Add);
        assert_eq!(insts[3].opcode, IlOpcode::Ret);
        assert_eq!(insts[3].offset, 4);
    }

    #[test]
    fn test_decode_extended_opcode() {
        // ceq / ret
        let body = vec![0xFE, 0x01, 0x2A];
        let (tokens, strings) = no_tables();

        let insts = read_body(&body, &tokens, &strings).unwrap();
        assert_eq!(insts[0].opcode, IlOpcode::Ceq);
        assert_eq!(insts[0].size, 2);
        assert_eq!(insts[1].offset, 2);
    }

    #[test]
    fn test_decode_call_resolves_token() {
        // call 0x0A000001 (little-endian token)
        let body = vec![0x28, 0x01, 0x00, 0x00, 0x0A];
        let mut tokens = IndexMap::new();
        tokens.insert(0x0A000001u32, "pal_col".to_string());
        let strings = IndexMap::new();

        let insts = read_body(&body, &tokens, &strings).unwrap();
        assert_eq!(insts[0].opcode, IlOpcode::Call);
        assert_eq!(insts[0].operand, IlOperand::Name("pal_col".to_string()));
        assert_eq!(insts[0].size, 5);
    }

    #[test]
    fn test_decode_unresolvable_token_is_fatal() {
        let body = vec![0x28, 0x01, 0x00, 0x00, 0x0A];
        let (tokens, strings) = no_tables();

        match read_body(&body, &tokens, &strings) {
            Err(TranslateError::UnresolvedToken(token, offset)) => {
                assert_eq!(token, 0x0A000001);
                assert_eq!(offset, 0);
            }
            other => panic!("expected UnresolvedToken, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_truncated_operand() {
        // ldc.i4 with only two of four operand bytes
        let body = vec![0x20, 0x34, 0x12];
        let (tokens, strings) = no_tables();

        assert!(matches!(
            read_body(&body, &tokens, &strings),
            Err(TranslateError::Decode(_, 0))
        ));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let body = vec![0x18, 0x1F, 0x0A, 0x58, 0xFE, 0x01, 0x2A];
        let (tokens, strings) = no_tables();

        let a = read_body(&body, &tokens, &strings).unwrap();
        let b = read_body(&body, &tokens, &strings).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.opcode, y.opcode);
            assert_eq!(x.operand, y.operand);
            assert_eq!(x.offset, y.offset);
            assert_eq!(x.size, y.size);
        }
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let body = vec![0x01];
        let (tokens, strings) = no_tables();

        assert!(matches!(
            read_body(&body, &tokens, &strings),
            Err(TranslateError::Unsupported(_, 0))
        ));
    }
}
