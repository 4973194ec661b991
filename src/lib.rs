//! A single-pass compiler backend translating stack-based managed bytecode
//! method bodies into byte-exact iNES cartridge images for the 6502 NES.
//!
//! The pipeline: decode the method body into structured instructions, map
//! them onto 6502 code against a fixed catalog of library routines, resolve
//! symbolic labels to absolute addresses, and assemble the PRG/CHR banks
//! behind an iNES header.

#[macro_use]
extern crate lazy_static;

pub mod catalog;
pub mod error;
pub mod il;
pub mod mos6502;
pub mod program;
pub mod project;
pub mod reader;
pub mod resolver;
pub mod rom;
pub mod translator;

pub use error::TranslateError;
pub use rom::Mirroring;

use indexmap::IndexMap;

/// Everything the translation pipeline consumes. The caller resolves all
/// file I/O before building one of these; the pipeline itself is pure.
pub struct TranslationInput {
    /// Raw method-body bytes.
    pub body: Vec<u8>,
    /// Metadata token -> call target / field name.
    pub tokens: IndexMap<u32, String>,
    /// String token -> literal text.
    pub strings: IndexMap<u32, String>,
    /// Field data name -> initializer bytes.
    pub blobs: IndexMap<String, Vec<u8>>,
    /// Pattern-table payload, padded or truncated to one CHR bank.
    pub chr: Vec<u8>,
    pub mirroring: Mirroring,
}

/// Translate one method body into a complete cartridge image.
pub fn translate(input: &TranslationInput) -> Result<Vec<u8>, TranslateError> {
    let instructions = reader::read_body(&input.body, &input.tokens, &input.strings)?;
    let unit = translator::translate(&instructions, &input.blobs)?;
    rom::assemble(unit, &input.chr, input.mirroring)
}
