//! Subroutine catalog: the fixed library of pre-verified 6502 blocks
//! implementing named external call targets.
//!
//! Each routine is hand-authored against the NES PPU/APU registers and the
//! zero-page runtime layout below, and ships with the names of the cataloged
//! routines it depends on, so the assembler can lay down exactly the
//! transitive closure of what a program uses. The registry's insertion
//! order is the canonical code order inside the ROM's library region;
//! addresses baked into the routines hold only along that order.

use crate::error::TranslateError;
use crate::mos6502::{Mnemonic::*, TargetInstruction as T};
use crate::program::Block;
use indexmap::{IndexMap, IndexSet};

// Zero-page runtime layout.
pub const PTR: u8 = 0x00; // 2-byte scratch pointer
pub const SP: u8 = 0x02; // 2-byte software argument stack pointer
pub const TMP: u8 = 0x04;
pub const TMP2: u8 = 0x05;
pub const SCROLL_X: u8 = 0x06;
pub const SCROLL_Y: u8 = 0x07;
pub const FRAME_CNT: u8 = 0x08;
pub const PPU_CTRL_VAR: u8 = 0x09;
pub const PPU_MASK_VAR: u8 = 0x0A;
pub const PAL_UPDATE: u8 = 0x0B;
pub const RNG_SEED: u8 = 0x0C;
pub const PAD_STATE: u8 = 0x0D; // 2 bytes, one per controller
pub const PAD_STATEP: u8 = 0x0F; // 2 bytes, previous frame
/// First zero-page address handed to user locals, in declaration order.
pub const LOCALS_BASE: u8 = 0x20;

// RAM buffers.
pub const PAL_BUF: u16 = 0x01C0; // 32-byte palette shadow
pub const OAM_BUF: u16 = 0x0200; // 256-byte sprite shadow, DMA page

// Hardware registers.
pub const PPU_CTRL: u16 = 0x2000;
pub const PPU_MASK: u16 = 0x2001;
pub const PPU_STATUS: u16 = 0x2002;
pub const PPU_SCROLL: u16 = 0x2005;
pub const PPU_ADDR: u16 = 0x2006;
pub const PPU_DATA: u16 = 0x2007;
pub const DMC_FREQ: u16 = 0x4010;
pub const OAM_DMA: u16 = 0x4014;
pub const PAD_PORT: u16 = 0x4016;
pub const APU_FRAME: u16 = 0x4017;

/// Argument width in the target calling convention: an 8-bit value travels
/// in A, a 16-bit value in A (low) / X (high). Earlier arguments go through
/// the software argument stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgWidth {
    Byte,
    Word,
}

/// Call shape for a named external target. This is the whole capability
/// interface: the declaration surface carries no runtime behavior.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub args: &'static [ArgWidth],
    pub returns: Option<ArgWidth>,
}

/// A cataloged subroutine: canonical block, call shape, dependencies.
pub struct Subroutine {
    pub name: &'static str,
    pub sig: Signature,
    pub deps: &'static [&'static str],
    pub block: Block,
}

/// Nametable base address for the constant-folded coordinate macros.
pub fn nametable_base(name: &str) -> Option<u16> {
    match name {
        "NTADR_A" => Some(0x2000),
        "NTADR_B" => Some(0x2400),
        "NTADR_C" => Some(0x2800),
        "NTADR_D" => Some(0x2C00),
        _ => None,
    }
}

/// Look up a cataloged routine by call-target name.
pub fn lookup(name: &str) -> Option<&'static Subroutine> {
    REGISTRY.get(name)
}

/// Expand a set of used routine names to its transitive dependency closure,
/// returned in canonical (registry) order.
pub fn closure(used: &IndexSet<String>) -> Result<Vec<&'static Subroutine>, TranslateError> {
    let mut wanted: IndexSet<&str> = IndexSet::new();
    let mut queue: Vec<&str> = Vec::new();
    for name in used {
        queue.push(name.as_str());
    }
    while let Some(name) = queue.pop() {
        let sub = REGISTRY
            .get(name)
            .ok_or_else(|| TranslateError::UnknownTarget(name.to_string(), 0))?;
        if wanted.insert(sub.name) {
            queue.extend(sub.deps.iter().copied());
        }
    }
    Ok(REGISTRY
        .values()
        .filter(|s| wanted.contains(s.name))
        .collect())
}

fn sig(args: &'static [ArgWidth], returns: Option<ArgWidth>) -> Signature {
    Signature { args, returns }
}

lazy_static! {
    static ref REGISTRY: IndexMap<&'static str, Subroutine> = {
        let mut m = IndexMap::new();
        for sub in build_catalog() {
            m.insert(sub.name, sub);
        }
        m
    };
}

fn build_catalog() -> Vec<Subroutine> {
    use ArgWidth::*;
    vec![
        // --- argument stack helpers -----------------------------------
        Subroutine {
            name: "pusha",
            sig: sig(&[], None),
            deps: &[],
            block: {
                let mut b = Block::new("pusha");
                b.push(T::zp(LDY, SP));
                b.push(T::rel(BNE, "pusha_dec"));
                b.push(T::zp(DEC, SP + 1));
                b.push_labeled("pusha_dec", T::zp(DEC, SP));
                b.push(T::imm(LDY, 0x00));
                b.push(T::ind_y(STA, SP));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "pushax",
            sig: sig(&[], None),
            deps: &[],
            block: {
                let mut b = Block::new("pushax");
                b.push(T::zp(STA, TMP));
                b.push(T::zp(LDA, SP));
                b.push(T::implied(SEC));
                b.push(T::imm(SBC, 0x02));
                b.push(T::zp(STA, SP));
                b.push(T::rel(BCS, "pushax_store"));
                b.push(T::zp(DEC, SP + 1));
                b.push_labeled("pushax_store", T::imm(LDY, 0x01));
                b.push(T::implied(TXA));
                b.push(T::ind_y(STA, SP));
                b.push(T::implied(DEY));
                b.push(T::zp(LDA, TMP));
                b.push(T::ind_y(STA, SP));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "popa",
            sig: sig(&[], None),
            deps: &[],
            block: {
                let mut b = Block::new("popa");
                b.push(T::imm(LDY, 0x00));
                b.push(T::ind_y(LDA, SP));
                b.push(T::zp(INC, SP));
                b.push(T::rel(BNE, "popa_done"));
                b.push(T::zp(INC, SP + 1));
                b.push_labeled("popa_done", T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "popax",
            sig: sig(&[], None),
            deps: &[],
            block: {
                let mut b = Block::new("popax");
                b.push(T::imm(LDY, 0x01));
                b.push(T::ind_y(LDA, SP));
                b.push(T::implied(TAX));
                b.push(T::implied(DEY));
                b.push(T::ind_y(LDA, SP));
                b.push(T::zp(STA, TMP));
                b.push(T::zp(LDA, SP));
                b.push(T::implied(CLC));
                b.push(T::imm(ADC, 0x02));
                b.push(T::zp(STA, SP));
                b.push(T::rel(BCC, "popax_done"));
                b.push(T::zp(INC, SP + 1));
                b.push_labeled("popax_done", T::zp(LDA, TMP));
                b.push(T::implied(RTS));
                b
            },
        },
        // --- palette ---------------------------------------------------
        Subroutine {
            name: "pal_col",
            sig: sig(&[Byte, Byte], None),
            deps: &["popa"],
            block: {
                let mut b = Block::new("pal_col");
                b.push(T::zp(STA, TMP)); // color
                b.push(T::abs_label(JSR, "popa")); // index
                b.push(T::imm(AND, 0x1F));
                b.push(T::implied(TAX));
                b.push(T::zp(LDA, TMP));
                b.push(T::abs_x(STA, PAL_BUF));
                b.push(T::zp(INC, PAL_UPDATE));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "pal_all",
            sig: sig(&[Word], None),
            deps: &[],
            block: pal_copy_block("pal_all", 0x00, 0x20),
        },
        Subroutine {
            name: "pal_bg",
            sig: sig(&[Word], None),
            deps: &[],
            block: pal_copy_block("pal_bg", 0x00, 0x10),
        },
        Subroutine {
            name: "pal_spr",
            sig: sig(&[Word], None),
            deps: &[],
            block: pal_copy_block("pal_spr", 0x10, 0x10),
        },
        Subroutine {
            name: "pal_clear",
            sig: sig(&[], None),
            deps: &[],
            block: {
                let mut b = Block::new("pal_clear");
                b.push(T::imm(LDA, 0x0F));
                b.push(T::imm(LDY, 0x00));
                b.push_labeled("pal_clear_loop", T::abs_y(STA, PAL_BUF));
                b.push(T::implied(INY));
                b.push(T::imm(CPY, 0x20));
                b.push(T::rel(BNE, "pal_clear_loop"));
                b.push(T::zp(INC, PAL_UPDATE));
                b.push(T::implied(RTS));
                b
            },
        },
        // --- VRAM ------------------------------------------------------
        Subroutine {
            name: "vram_adr",
            sig: sig(&[Word], None),
            deps: &[],
            block: {
                let mut b = Block::new("vram_adr");
                b.push(T::abs(STX, PPU_ADDR)); // high byte first
                b.push(T::abs(STA, PPU_ADDR));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "vram_put",
            sig: sig(&[Byte], None),
            deps: &[],
            block: {
                let mut b = Block::new("vram_put");
                b.push(T::abs(STA, PPU_DATA));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "vram_fill",
            sig: sig(&[Byte, Word], None),
            deps: &["popa"],
            block: {
                let mut b = Block::new("vram_fill");
                b.push(T::zp(STA, TMP)); // length low
                b.push(T::zp(STX, TMP2)); // length high
                b.push(T::abs_label(JSR, "popa")); // fill value
                b.push_labeled("vram_fill_loop", T::zp(LDX, TMP));
                b.push(T::rel(BNE, "vram_fill_put"));
                b.push(T::zp(LDX, TMP2));
                b.push(T::rel(BEQ, "vram_fill_done"));
                b.push(T::zp(DEC, TMP2));
                b.push_labeled("vram_fill_put", T::abs(STA, PPU_DATA));
                b.push(T::zp(DEC, TMP));
                b.push(T::abs_label(JMP, "vram_fill_loop"));
                b.push_labeled("vram_fill_done", T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "vram_write",
            sig: sig(&[Word, Word], None),
            deps: &["popax"],
            block: {
                let mut b = Block::new("vram_write");
                b.push(T::zp(STA, TMP)); // length low
                b.push(T::zp(STX, TMP2)); // length high
                b.push(T::abs_label(JSR, "popax")); // source address
                b.push(T::zp(STA, PTR));
                b.push(T::zp(STX, PTR + 1));
                b.push(T::imm(LDY, 0x00));
                b.push_labeled("vram_write_loop", T::zp(LDX, TMP));
                b.push(T::rel(BNE, "vram_write_put"));
                b.push(T::zp(LDX, TMP2));
                b.push(T::rel(BEQ, "vram_write_done"));
                b.push(T::zp(DEC, TMP2));
                b.push_labeled("vram_write_put", T::ind_y(LDA, PTR));
                b.push(T::abs(STA, PPU_DATA));
                b.push(T::implied(INY));
                b.push(T::rel(BNE, "vram_write_nowrap"));
                b.push(T::zp(INC, PTR + 1));
                b.push_labeled("vram_write_nowrap", T::zp(DEC, TMP));
                b.push(T::abs_label(JMP, "vram_write_loop"));
                b.push_labeled("vram_write_done", T::implied(RTS));
                b
            },
        },
        // --- frame sync / PPU control -----------------------------------
        Subroutine {
            name: "ppu_wait_nmi",
            sig: sig(&[], None),
            deps: &[],
            block: {
                let mut b = Block::new("ppu_wait_nmi");
                b.push(T::zp(LDA, FRAME_CNT));
                b.push_labeled("ppu_wait_nmi_spin", T::zp(CMP, FRAME_CNT));
                b.push(T::rel(BEQ, "ppu_wait_nmi_spin"));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "ppu_wait_frame",
            sig: sig(&[], None),
            deps: &["ppu_wait_nmi"],
            block: {
                let mut b = Block::new("ppu_wait_frame");
                b.push(T::abs_label(JSR, "ppu_wait_nmi"));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "ppu_on_all",
            sig: sig(&[], None),
            deps: &["ppu_wait_nmi"],
            block: {
                let mut b = Block::new("ppu_on_all");
                b.push(T::zp(LDA, PPU_MASK_VAR));
                b.push(T::imm(ORA, 0x18)); // background + sprites on
                b.push(T::zp(STA, PPU_MASK_VAR));
                b.push(T::abs_label(JSR, "ppu_wait_nmi"));
                b.push(T::zp(LDA, PPU_MASK_VAR));
                b.push(T::abs(STA, PPU_MASK));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "ppu_off",
            sig: sig(&[], None),
            deps: &["ppu_wait_nmi"],
            block: {
                let mut b = Block::new("ppu_off");
                b.push(T::zp(LDA, PPU_MASK_VAR));
                b.push(T::imm(AND, 0xE7));
                b.push(T::zp(STA, PPU_MASK_VAR));
                b.push(T::abs_label(JSR, "ppu_wait_nmi"));
                b.push(T::zp(LDA, PPU_MASK_VAR));
                b.push(T::abs(STA, PPU_MASK));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "scroll",
            sig: sig(&[Word, Word], None),
            deps: &["popax"],
            block: {
                let mut b = Block::new("scroll");
                b.push(T::zp(STA, SCROLL_Y));
                b.push(T::abs_label(JSR, "popax"));
                b.push(T::zp(STA, SCROLL_X));
                b.push(T::implied(RTS));
                b
            },
        },
        // --- sprites -----------------------------------------------------
        Subroutine {
            name: "oam_clear",
            sig: sig(&[], None),
            deps: &[],
            block: {
                let mut b = Block::new("oam_clear");
                b.push(T::imm(LDX, 0x00));
                b.push(T::imm(LDA, 0xFF));
                b.push_labeled("oam_clear_loop", T::abs_x(STA, OAM_BUF));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::rel(BNE, "oam_clear_loop"));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "oam_spr",
            sig: sig(&[Byte, Byte, Byte, Byte, Byte], Some(Byte)),
            deps: &["popa"],
            block: {
                let mut b = Block::new("oam_spr");
                b.push(T::implied(TAX)); // sprite slot offset
                b.push(T::abs_label(JSR, "popa")); // attributes
                b.push(T::abs_x(STA, OAM_BUF + 2));
                b.push(T::abs_label(JSR, "popa")); // tile index
                b.push(T::abs_x(STA, OAM_BUF + 1));
                b.push(T::abs_label(JSR, "popa")); // y
                b.push(T::abs_x(STA, OAM_BUF));
                b.push(T::abs_label(JSR, "popa")); // x
                b.push(T::abs_x(STA, OAM_BUF + 3));
                b.push(T::implied(TXA));
                b.push(T::implied(CLC));
                b.push(T::imm(ADC, 0x04)); // next free slot
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "oam_meta_spr",
            sig: sig(&[Byte, Byte, Byte, Word], Some(Byte)),
            deps: &["popa"],
            block: {
                let mut b = Block::new("oam_meta_spr");
                b.push(T::zp(STA, PTR)); // metasprite list: dx,dy,tile,attr,...
                b.push(T::zp(STX, PTR + 1));
                b.push(T::abs_label(JSR, "popa")); // sprite slot offset
                b.push(T::implied(TAX));
                b.push(T::abs_label(JSR, "popa")); // y
                b.push(T::zp(STA, TMP2));
                b.push(T::abs_label(JSR, "popa")); // x
                b.push(T::zp(STA, TMP));
                b.push(T::imm(LDY, 0x00));
                b.push_labeled("oam_meta_spr_loop", T::ind_y(LDA, PTR));
                b.push(T::imm(CMP, 0x80)); // list terminator
                b.push(T::rel(BEQ, "oam_meta_spr_done"));
                b.push(T::implied(CLC));
                b.push(T::zp(ADC, TMP));
                b.push(T::abs_x(STA, OAM_BUF + 3));
                b.push(T::implied(INY));
                b.push(T::ind_y(LDA, PTR));
                b.push(T::implied(CLC));
                b.push(T::zp(ADC, TMP2));
                b.push(T::abs_x(STA, OAM_BUF));
                b.push(T::implied(INY));
                b.push(T::ind_y(LDA, PTR));
                b.push(T::abs_x(STA, OAM_BUF + 1));
                b.push(T::implied(INY));
                b.push(T::ind_y(LDA, PTR));
                b.push(T::abs_x(STA, OAM_BUF + 2));
                b.push(T::implied(INY));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::abs_label(JMP, "oam_meta_spr_loop"));
                b.push_labeled("oam_meta_spr_done", T::implied(TXA)); // next free slot
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "oam_hide_rest",
            sig: sig(&[Byte], None),
            deps: &[],
            block: {
                let mut b = Block::new("oam_hide_rest");
                b.push(T::implied(TAX));
                b.push(T::imm(LDA, 0xF0)); // offscreen y
                b.push_labeled("oam_hide_rest_loop", T::abs_x(STA, OAM_BUF));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::implied(INX));
                b.push(T::rel(BNE, "oam_hide_rest_loop"));
                b.push(T::implied(RTS));
                b
            },
        },
        // --- input -------------------------------------------------------
        Subroutine {
            name: "pad_poll",
            sig: sig(&[Byte], Some(Byte)),
            deps: &[],
            block: {
                let mut b = Block::new("pad_poll");
                b.push(T::implied(TAY)); // controller index
                b.push(T::imm(LDA, 0x01));
                b.push(T::abs(STA, PAD_PORT)); // strobe
                b.push(T::imm(LDA, 0x00));
                b.push(T::abs(STA, PAD_PORT));
                b.push(T::zp(STA, TMP));
                b.push(T::imm(LDX, 0x08));
                b.push_labeled("pad_poll_bit", T::abs_y(LDA, PAD_PORT));
                b.push(T::accumulator(LSR));
                b.push(T::zp(ROL, TMP));
                b.push(T::implied(DEX));
                b.push(T::rel(BNE, "pad_poll_bit"));
                b.push(T::zp(LDA, TMP));
                b.push(T::abs_y(STA, PAD_STATE as u16));
                b.push(T::implied(RTS));
                b
            },
        },
        Subroutine {
            name: "pad_trigger",
            sig: sig(&[Byte], Some(Byte)),
            deps: &["pad_poll"],
            block: {
                let mut b = Block::new("pad_trigger");
                b.push(T::abs_label(JSR, "pad_poll")); // A = state, Y = pad
                b.push(T::implied(TAX));
                b.push(T::abs_y(LDA, PAD_STATEP as u16));
                b.push(T::imm(EOR, 0xFF));
                b.push(T::zp(STA, TMP));
                b.push(T::implied(TXA));
                b.push(T::abs_y(STA, PAD_STATEP as u16));
                b.push(T::zp(AND, TMP)); // newly pressed = state & !previous
                b.push(T::implied(RTS));
                b
            },
        },
        // --- misc ----------------------------------------------------------
        Subroutine {
            name: "rand8",
            sig: sig(&[], Some(Byte)),
            deps: &[],
            block: {
                let mut b = Block::new("rand8");
                b.push(T::zp(LDA, RNG_SEED));
                b.push(T::rel(BEQ, "rand8_eor"));
                b.push(T::accumulator(ASL));
                b.push(T::rel(BEQ, "rand8_done")); // seed was 0x80
                b.push(T::rel(BCC, "rand8_done"));
                b.push_labeled("rand8_eor", T::imm(EOR, 0x1D));
                b.push_labeled("rand8_done", T::zp(STA, RNG_SEED));
                b.push(T::implied(RTS));
                b
            },
        },
    ]
}

/// Shared shape of the three palette block-copy routines.
fn pal_copy_block(name: &str, offset: u16, count: u8) -> Block {
    let loop_label = format!("{}_loop", name);
    let mut b = Block::new(name);
    b.push(T::zp(STA, PTR));
    b.push(T::zp(STX, PTR + 1));
    b.push(T::imm(LDY, 0x00));
    b.push_labeled(&loop_label, T::ind_y(LDA, PTR));
    b.push(T::abs_y(STA, PAL_BUF + offset));
    b.push(T::implied(INY));
    b.push(T::imm(CPY, count));
    b.push(T::rel(BNE, &loop_label));
    b.push(T::zp(INC, PAL_UPDATE));
    b.push(T::implied(RTS));
    b
}

/// Runtime initialization block. Placed after user code in the canonical
/// region order; the RESET vector points here.
pub fn startup_block() -> Block {
    let mut b = Block::new("startup");
    b.push(T::implied(SEI));
    b.push(T::implied(CLD));
    b.push(T::imm(LDX, 0x40));
    b.push(T::abs(STX, APU_FRAME)); // frame IRQ off
    b.push(T::imm(LDX, 0xFF));
    b.push(T::implied(TXS));
    b.push(T::implied(INX)); // X = 0
    b.push(T::abs(STX, PPU_CTRL)); // NMI off
    b.push(T::abs(STX, PPU_MASK)); // rendering off
    b.push(T::abs(STX, DMC_FREQ)); // DMC IRQ off
    b.push_labeled("startup_vblank1", T::abs(BIT, PPU_STATUS));
    b.push(T::rel(BPL, "startup_vblank1"));
    b.push_labeled("startup_clear_ram", T::imm(LDA, 0x00));
    b.push(T::abs_x(STA, 0x0000));
    b.push(T::abs_x(STA, 0x0100));
    b.push(T::abs_x(STA, 0x0200));
    b.push(T::abs_x(STA, 0x0300));
    b.push(T::abs_x(STA, 0x0400));
    b.push(T::abs_x(STA, 0x0500));
    b.push(T::abs_x(STA, 0x0600));
    b.push(T::abs_x(STA, 0x0700));
    b.push(T::implied(INX));
    b.push(T::rel(BNE, "startup_clear_ram"));
    b.push_labeled("startup_vblank2", T::abs(BIT, PPU_STATUS));
    b.push(T::rel(BPL, "startup_vblank2"));
    // Argument stack grows down from the top of RAM.
    b.push(T::imm(LDA, 0x00));
    b.push(T::zp(STA, SP));
    b.push(T::imm(LDA, 0x08));
    b.push(T::zp(STA, SP + 1));
    b.push(T::imm(LDA, 0xFD)); // RNG seed, any nonzero value
    b.push(T::zp(STA, RNG_SEED));
    b.push(T::abs_label(JSR, "oam_clear"));
    b.push(T::abs_label(JSR, "pal_clear"));
    b.push(T::imm(LDA, 0x80));
    b.push(T::zp(STA, PPU_CTRL_VAR));
    b.push(T::abs(STA, PPU_CTRL)); // NMI on
    b.push(T::abs_label(JSR, "main"));
    b.push_labeled("startup_exit", T::abs_label(JMP, "startup_exit"));
    b
}

/// Cataloged routines the startup block depends on.
pub const STARTUP_DEPS: &[&str] = &["oam_clear", "pal_clear"];

/// NMI handler: palette upload, sprite DMA, scroll, frame counter.
pub fn nmi_block() -> Block {
    let mut b = Block::new("nmi");
    b.push(T::implied(PHA));
    b.push(T::implied(TXA));
    b.push(T::implied(PHA));
    b.push(T::implied(TYA));
    b.push(T::implied(PHA));
    b.push(T::zp(LDA, PAL_UPDATE));
    b.push(T::rel(BEQ, "nmi_no_pal"));
    b.push(T::imm(LDA, 0x00));
    b.push(T::zp(STA, PAL_UPDATE));
    b.push(T::imm(LDA, 0x3F));
    b.push(T::abs(STA, PPU_ADDR));
    b.push(T::imm(LDA, 0x00));
    b.push(T::abs(STA, PPU_ADDR));
    b.push(T::imm(LDY, 0x00));
    b.push_labeled("nmi_pal_loop", T::abs_y(LDA, PAL_BUF));
    b.push(T::abs(STA, PPU_DATA));
    b.push(T::implied(INY));
    b.push(T::imm(CPY, 0x20));
    b.push(T::rel(BNE, "nmi_pal_loop"));
    b.push_labeled("nmi_no_pal", T::imm(LDA, (OAM_BUF >> 8) as u8));
    b.push(T::abs(STA, OAM_DMA));
    b.push(T::zp(LDA, SCROLL_X));
    b.push(T::abs(STA, PPU_SCROLL));
    b.push(T::zp(LDA, SCROLL_Y));
    b.push(T::abs(STA, PPU_SCROLL));
    b.push(T::zp(LDA, PPU_CTRL_VAR));
    b.push(T::abs(STA, PPU_CTRL));
    b.push(T::zp(INC, FRAME_CNT));
    b.push(T::implied(PLA));
    b.push(T::implied(TAY));
    b.push(T::implied(PLA));
    b.push(T::implied(TAX));
    b.push(T::implied(PLA));
    b.push(T::implied(RTI));
    b
}

pub fn irq_block() -> Block {
    let mut b = Block::new("irq");
    b.push(T::implied(RTI));
    b
}
