use il2nes::project::Manifest;
use il2nes::TranslationInput;
use indexmap::IndexMap;
use log::{debug, info};
use std::env;
use std::fs;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    // Display help information if no project file provided
    // Exit with success status since user is requesting help, not encountering an error
    if args.len() < 2 {
        println!("il2nes - managed bytecode to NES cartridge translator");
        println!();
        println!("Usage: {} <project.toml>", args[0]);
        println!("Example:");
        println!("  {} demos/hello/project.toml", args[0]);
        println!();
        println!("The project manifest names the method-body bytes, token and");
        println!("string tables, field data blobs, CHR bank, and output path.");
        return Ok(());
    }

    let manifest_path = Path::new(&args[1]);
    debug!("Loading project manifest: {}", manifest_path.display());
    let manifest_text = read_input(manifest_path);
    let manifest = Manifest::parse(&manifest_text.into_utf8(manifest_path))?;

    let body = read_input(&manifest.resolve(manifest_path, &manifest.body)).0;
    let chr = match &manifest.chr {
        Some(path) => read_input(&manifest.resolve(manifest_path, path)).0,
        None => Vec::new(),
    };
    let mut blobs: IndexMap<String, Vec<u8>> = IndexMap::new();
    for (name, path) in &manifest.blobs {
        let bytes = read_input(&manifest.resolve(manifest_path, path)).0;
        blobs.insert(name.clone(), bytes);
    }

    let input = TranslationInput {
        body,
        tokens: manifest.token_table()?,
        strings: manifest.string_table()?,
        blobs,
        chr,
        mirroring: manifest.mirroring.into(),
    };

    // The image is built completely in memory; the output file is only
    // touched once translation has succeeded.
    let rom = il2nes::translate(&input)?;

    let output = manifest.resolve(manifest_path, &manifest.output);
    if let Err(e) = fs::write(&output, &rom) {
        eprintln!("Error: Cannot write output file '{}': {}", output.display(), e);
        std::process::exit(1);
    }
    info!("Wrote {} bytes to {}", rom.len(), output.display());
    Ok(())
}

struct InputBytes(Vec<u8>);

impl InputBytes {
    fn into_utf8(self, path: &Path) -> String {
        match String::from_utf8(self.0) {
            Ok(text) => text,
            Err(_) => {
                eprintln!("Error: '{}' is not valid UTF-8", path.display());
                std::process::exit(1);
            }
        }
    }
}

// Load an input file with user-friendly error handling
// Use explicit match instead of ? operator to provide clean, formatted error messages
// that guide users to solve common problems like incorrect paths or wrong directories
fn read_input(path: &Path) -> InputBytes {
    match fs::read(path) {
        Ok(bytes) => InputBytes(bytes),
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => {
                    eprintln!("Error: Input file not found: {}", path.display());
                    eprintln!();
                    eprintln!("Please check:");
                    eprintln!("• File path is correct (paths are relative to the manifest)");
                    eprintln!("• You're running from the right directory");
                    eprintln!("• File exists and is readable");
                }
                std::io::ErrorKind::PermissionDenied => {
                    eprintln!("Error: Permission denied accessing input file: {}", path.display());
                    eprintln!();
                    eprintln!("Please check file permissions.");
                }
                _ => {
                    eprintln!("Error: Cannot open input file '{}': {}", path.display(), e);
                }
            }
            std::process::exit(1);
        }
    }
}
