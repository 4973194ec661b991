//! Cartridge image assembly: lays the translated regions into a PRG bank,
//! installs the interrupt vectors, and wraps everything in an iNES
//! container.

use crate::catalog;
use crate::error::TranslateError;
use crate::program::Program;
use crate::resolver;
use crate::translator::TranslatedUnit;
use indexmap::IndexSet;
use log::{debug, info};

/// Code region origin in CPU address space.
pub const CODE_BASE: u16 = 0x8000;

/// PRG payload: two 16 KiB banks.
pub const PRG_SIZE: usize = 2 * 16 * 1024;
/// CHR payload: one 8 KiB bank.
pub const CHR_SIZE: usize = 8 * 1024;
/// Container header size.
pub const HEADER_SIZE: usize = 16;

const VECTOR_SIZE: usize = 6;

/// Nametable mirroring arrangement, encoded as one header flag bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
}

impl Mirroring {
    fn flag_bit(self) -> u8 {
        match self {
            Mirroring::Horizontal => 0,
            Mirroring::Vertical => 1,
        }
    }
}

/// Assemble a complete cartridge image from a translated unit and a
/// pattern-table payload.
pub fn assemble(
    unit: TranslatedUnit,
    chr: &[u8],
    mirroring: Mirroring,
) -> Result<Vec<u8>, TranslateError> {
    let mut program = layout(unit)?;
    let labels = resolver::resolve(&mut program)?;
    let body = resolver::emit(&program)?;

    let code_budget = PRG_SIZE - VECTOR_SIZE;
    if body.len() > code_budget {
        return Err(TranslateError::AddressOverflow(
            CODE_BASE as usize + body.len(),
        ));
    }
    info!(
        "PRG payload {} bytes of {} available",
        body.len(),
        code_budget
    );

    let vector = |name: &str| -> Result<u16, TranslateError> {
        labels
            .get(name)
            .copied()
            .ok_or_else(|| TranslateError::UnresolvedLabel(name.to_string()))
    };
    let nmi = vector("nmi")?;
    let reset = vector("startup")?;
    let irq = vector("irq")?;
    debug!(
        "Vectors: nmi=0x{:04x} reset=0x{:04x} irq=0x{:04x}",
        nmi, reset, irq
    );

    let mut rom = Vec::with_capacity(HEADER_SIZE + PRG_SIZE + CHR_SIZE);
    rom.extend_from_slice(&header(mirroring));
    rom.extend_from_slice(&body);
    rom.resize(HEADER_SIZE + code_budget, 0x00);
    rom.extend_from_slice(&nmi.to_le_bytes());
    rom.extend_from_slice(&reset.to_le_bytes());
    rom.extend_from_slice(&irq.to_le_bytes());

    // CHR is copied verbatim and padded to a full bank.
    let take = chr.len().min(CHR_SIZE);
    rom.extend_from_slice(&chr[..take]);
    rom.resize(HEADER_SIZE + PRG_SIZE + CHR_SIZE, 0x00);

    Ok(rom)
}

/// Arrange the output regions in canonical order: library routines (in
/// catalog order), user code, startup, NMI and IRQ handlers, literal data.
fn layout(unit: TranslatedUnit) -> Result<Program, TranslateError> {
    let mut used: IndexSet<String> = unit.used;
    for dep in catalog::STARTUP_DEPS {
        used.insert(dep.to_string());
    }

    let mut program = Program::new(CODE_BASE);
    for sub in catalog::closure(&used)? {
        debug!("Including routine '{}' ({} bytes)", sub.name, sub.block.size());
        program.push_block(sub.block.clone());
    }
    program.push_block(unit.code);
    program.push_block(catalog::startup_block());
    program.push_block(catalog::nmi_block());
    program.push_block(catalog::irq_block());
    program.push_block(unit.data);
    Ok(program)
}

fn header(mirroring: Mirroring) -> [u8; HEADER_SIZE] {
    let mut h = [0u8; HEADER_SIZE];
    h[0..4].copy_from_slice(b"NES\x1A");
    h[4] = (PRG_SIZE / (16 * 1024)) as u8;
    h[5] = (CHR_SIZE / (8 * 1024)) as u8;
    h[6] = mirroring.flag_bit(); // mapper 0, no battery, no trainer
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Block;
    use crate::translator::TranslatedUnit;
    use indexmap::IndexSet;
    use crate::mos6502::{Mnemonic::*, TargetInstruction as T};

    fn trivial_unit() -> TranslatedUnit {
        let mut code = Block::new("main");
        code.push(T::implied(RTS));
        TranslatedUnit {
            code,
            data: Block::anonymous(),
            used: IndexSet::new(),
        }
    }

    #[test]
    fn test_image_dimensions_and_header() {
        let rom = assemble(trivial_unit(), &[], Mirroring::Horizontal).unwrap();
        assert_eq!(rom.len(), HEADER_SIZE + PRG_SIZE + CHR_SIZE);
        assert_eq!(&rom[0..4], b"NES\x1A");
        assert_eq!(rom[4], 2); // PRG banks
        assert_eq!(rom[5], 1); // CHR banks
        assert_eq!(rom[6], 0); // mapper 0, horizontal mirroring
        assert!(rom[7..16].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_mirroring_differs_by_one_header_bit() {
        let h = assemble(trivial_unit(), &[], Mirroring::Horizontal).unwrap();
        let v = assemble(trivial_unit(), &[], Mirroring::Vertical).unwrap();
        assert_eq!(h.len(), v.len());
        let diffs: Vec<usize> = (0..h.len()).filter(|&i| h[i] != v[i]).collect();
        assert_eq!(diffs, vec![6]);
        assert_eq!(h[6] ^ v[6], 0x01);
    }

    #[test]
    fn test_vectors_point_into_prg() {
        let rom = assemble(trivial_unit(), &[], Mirroring::Vertical).unwrap();
        let vec_at = HEADER_SIZE + PRG_SIZE - 6;
        let word = |i: usize| u16::from_le_bytes([rom[i], rom[i + 1]]);
        let nmi = word(vec_at);
        let reset = word(vec_at + 2);
        let irq = word(vec_at + 4);
        for addr in [nmi, reset, irq] {
            assert!(addr >= CODE_BASE);
        }
        // IRQ handler is a lone RTI.
        let irq_off = HEADER_SIZE + (irq - CODE_BASE) as usize;
        assert_eq!(rom[irq_off], 0x40);
        // RESET lands on SEI.
        let reset_off = HEADER_SIZE + (reset - CODE_BASE) as usize;
        assert_eq!(rom[reset_off], 0x78);
    }

    #[test]
    fn test_startup_dependencies_always_included() {
        // Even a unit that calls nothing pulls the startup deps in.
        let rom = assemble(trivial_unit(), &[], Mirroring::Horizontal).unwrap();
        // pal_clear is first in catalog order among the included routines,
        // so the PRG region opens with its first instruction: LDA #$0F.
        assert_eq!(rom[HEADER_SIZE], 0xA9);
        assert_eq!(rom[HEADER_SIZE + 1], 0x0F);
    }

    #[test]
    fn test_chr_copied_and_padded() {
        let chr = vec![0xAB; 100];
        let rom = assemble(trivial_unit(), &chr, Mirroring::Horizontal).unwrap();
        let chr_at = HEADER_SIZE + PRG_SIZE;
        assert!(rom[chr_at..chr_at + 100].iter().all(|b| *b == 0xAB));
        assert!(rom[chr_at + 100..].iter().all(|b| *b == 0x00));
    }

    #[test]
    fn test_oversize_chr_truncated() {
        let chr = vec![0xCD; CHR_SIZE + 512];
        let rom = assemble(trivial_unit(), &chr, Mirroring::Horizontal).unwrap();
        assert_eq!(rom.len(), HEADER_SIZE + PRG_SIZE + CHR_SIZE);
        assert!(rom[HEADER_SIZE + PRG_SIZE..].iter().all(|b| *b == 0xCD));
    }

    #[test]
    fn test_deterministic_output() {
        let a = assemble(trivial_unit(), &[1, 2, 3], Mirroring::Vertical).unwrap();
        let b = assemble(trivial_unit(), &[1, 2, 3], Mirroring::Vertical).unwrap();
        assert_eq!(a, b);
    }
}
