//! Project manifest: the TOML file the command-line binary reads to find
//! its inputs. The library core never touches the filesystem; this module
//! only parses text and normalizes the tables.
//!
//! ```toml
//! body = "main.body"
//! chr = "tiles.chr"
//! output = "game.nes"
//! mirroring = "vertical"
//!
//! [tokens]
//! "0x0A000001" = "pal_col"
//!
//! [strings]
//! "0x70000001" = "HELLO WORLD!"
//!
//! [blobs]
//! "field_data_1" = "palette.bin"
//! ```

use crate::error::TranslateError;
use crate::rom::Mirroring;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Raw method-body bytes to translate.
    pub body: PathBuf,
    /// Pattern-table payload; omitted means a blank CHR bank.
    pub chr: Option<PathBuf>,
    /// Cartridge image to write.
    pub output: PathBuf,
    #[serde(default)]
    pub mirroring: MirroringChoice,
    /// Metadata token -> call target / field name, hex-keyed.
    #[serde(default)]
    pub tokens: IndexMap<String, String>,
    /// String token -> literal text, hex-keyed.
    #[serde(default)]
    pub strings: IndexMap<String, String>,
    /// Field data name -> file of raw initializer bytes.
    #[serde(default)]
    pub blobs: IndexMap<String, PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MirroringChoice {
    #[default]
    Horizontal,
    Vertical,
}

impl From<MirroringChoice> for Mirroring {
    fn from(choice: MirroringChoice) -> Mirroring {
        match choice {
            MirroringChoice::Horizontal => Mirroring::Horizontal,
            MirroringChoice::Vertical => Mirroring::Vertical,
        }
    }
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Manifest, TranslateError> {
        toml::from_str(text).map_err(|e| TranslateError::Manifest(e.to_string()))
    }

    /// Token table with keys parsed from their hex spelling.
    pub fn token_table(&self) -> Result<IndexMap<u32, String>, TranslateError> {
        hex_keyed(&self.tokens)
    }

    /// String table with keys parsed from their hex spelling.
    pub fn string_table(&self) -> Result<IndexMap<u32, String>, TranslateError> {
        hex_keyed(&self.strings)
    }

    /// Input paths are interpreted relative to the manifest's directory.
    pub fn resolve(&self, manifest_path: &Path, file: &Path) -> PathBuf {
        match manifest_path.parent() {
            Some(dir) => dir.join(file),
            None => file.to_path_buf(),
        }
    }
}

fn hex_keyed(table: &IndexMap<String, String>) -> Result<IndexMap<u32, String>, TranslateError> {
    let mut out = IndexMap::new();
    for (key, value) in table {
        let digits = key
            .strip_prefix("0x")
            .or_else(|| key.strip_prefix("0X"))
            .unwrap_or(key);
        let parsed = u32::from_str_radix(digits, 16).map_err(|_| {
            TranslateError::Manifest(format!("'{}' is not a hexadecimal token key", key))
        })?;
        out.insert(parsed, value.clone());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
body = "main.body"
chr = "tiles.chr"
output = "game.nes"
mirroring = "vertical"

[tokens]
"0x0A000001" = "pal_col"
"0x0A000002" = "vram_adr"

[strings]
"0x70000001" = "HELLO WORLD!"

[blobs]
"field_data_1" = "palette.bin"
"#;

    #[test]
    fn test_parse_sample() {
        let m = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(m.body, PathBuf::from("main.body"));
        assert_eq!(m.chr, Some(PathBuf::from("tiles.chr")));
        assert_eq!(m.mirroring, MirroringChoice::Vertical);
        assert_eq!(m.blobs.get("field_data_1"), Some(&PathBuf::from("palette.bin")));
    }

    #[test]
    fn test_hex_keys_parse_in_order() {
        let m = Manifest::parse(SAMPLE).unwrap();
        let tokens = m.token_table().unwrap();
        let keys: Vec<u32> = tokens.keys().copied().collect();
        assert_eq!(keys, vec![0x0A000001, 0x0A000002]);
        assert_eq!(tokens[&0x0A000001], "pal_col");
        let strings = m.string_table().unwrap();
        assert_eq!(strings[&0x70000001], "HELLO WORLD!");
    }

    #[test]
    fn test_defaults() {
        let m = Manifest::parse("body = \"a\"\noutput = \"b\"\n").unwrap();
        assert_eq!(m.mirroring, MirroringChoice::Horizontal);
        assert!(m.chr.is_none());
        assert!(m.tokens.is_empty());
        assert!(m.blobs.is_empty());
    }

    #[test]
    fn test_bad_hex_key_rejected() {
        let m = Manifest::parse("body = \"a\"\noutput = \"b\"\n[tokens]\n\"pal_col\" = \"x\"\n")
            .unwrap();
        let err = m.token_table().unwrap_err();
        assert!(matches!(err, TranslateError::Manifest(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Manifest::parse("body = \"a\"\noutput = \"b\"\nmapper = 4\n").unwrap_err();
        assert!(matches!(err, TranslateError::Manifest(_)));
    }

    #[test]
    fn test_paths_resolve_relative_to_manifest() {
        let m = Manifest::parse("body = \"a\"\noutput = \"b\"\n").unwrap();
        let p = m.resolve(Path::new("proj/game.toml"), Path::new("main.body"));
        assert_eq!(p, PathBuf::from("proj/main.body"));
    }
}
