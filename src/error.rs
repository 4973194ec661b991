// Translation error handling

use std::fmt;

#[derive(Debug, Clone)]
pub enum TranslateError {
    // Bytecode decoding errors
    Decode(String, usize),             // message, IL offset
    UnresolvedToken(u32, usize),       // metadata token, IL offset
    UnresolvedString(u32, usize),      // string token, IL offset

    // Translation errors
    Unsupported(String, usize),        // opcode name, IL offset
    UnknownTarget(String, usize),      // call target name, IL offset
    MissingBlob(String, usize),        // field data name, IL offset

    // Address resolution errors
    UnresolvedLabel(String),
    DuplicateLabel(String),
    BranchOutOfRange(String, i32),     // label, displacement

    // Image assembly errors
    AddressOverflow(usize),            // bytes required

    // Boundary errors (manifest / IO, never raised by the library core)
    Manifest(String),
    IOError(String),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TranslateError::Decode(msg, offset) => {
                write!(f, "Decode error at IL offset 0x{:04x}: {}", offset, msg)
            }
            TranslateError::UnresolvedToken(token, offset) => {
                write!(
                    f,
                    "Unresolvable metadata token 0x{:08x} at IL offset 0x{:04x}",
                    token, offset
                )
            }
            TranslateError::UnresolvedString(token, offset) => {
                write!(
                    f,
                    "Unresolvable string token 0x{:08x} at IL offset 0x{:04x}",
                    token, offset
                )
            }
            TranslateError::Unsupported(name, offset) => {
                write!(
                    f,
                    "Unsupported instruction '{}' at IL offset 0x{:04x}",
                    name, offset
                )
            }
            TranslateError::UnknownTarget(name, offset) => {
                write!(
                    f,
                    "Unknown call target '{}' at IL offset 0x{:04x}",
                    name, offset
                )
            }
            TranslateError::MissingBlob(name, offset) => {
                write!(
                    f,
                    "No field data blob named '{}' at IL offset 0x{:04x}",
                    name, offset
                )
            }
            TranslateError::UnresolvedLabel(name) => {
                write!(f, "Unresolved label '{}'", name)
            }
            TranslateError::DuplicateLabel(name) => {
                write!(f, "Duplicate label '{}'", name)
            }
            TranslateError::BranchOutOfRange(name, disp) => {
                write!(
                    f,
                    "Relative branch to '{}' out of range (displacement {})",
                    name, disp
                )
            }
            TranslateError::AddressOverflow(size) => {
                write!(
                    f,
                    "Program too large for PRG ROM ({} bytes required)",
                    size
                )
            }
            TranslateError::Manifest(msg) => {
                write!(f, "Invalid project manifest: {}", msg)
            }
            TranslateError::IOError(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for TranslateError {}
