// End-to-end pipeline tests: raw method-body bytes in, complete cartridge
// image out.

use il2nes::rom::{CHR_SIZE, HEADER_SIZE, PRG_SIZE};
use il2nes::{translate, Mirroring, TranslationInput};
use indexmap::IndexMap;
use test_log::test;

/// Method-body builder for test programs.
struct Body {
    bytes: Vec<u8>,
    tokens: IndexMap<u32, String>,
    strings: IndexMap<u32, String>,
    next_token: u32,
    next_string: u32,
}

impl Body {
    fn new() -> Self {
        Body {
            bytes: Vec::new(),
            tokens: IndexMap::new(),
            strings: IndexMap::new(),
            next_token: 0x0A000001,
            next_string: 0x70000001,
        }
    }

    fn op(&mut self, byte: u8) -> &mut Self {
        self.bytes.push(byte);
        self
    }

    fn ops(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    fn token(&mut self, name: &str) -> u32 {
        if let Some((k, _)) = self.tokens.iter().find(|(_, v)| v.as_str() == name) {
            return *k;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.tokens.insert(token, name.to_string());
        token
    }

    fn call(&mut self, name: &str) -> &mut Self {
        let token = self.token(name);
        self.bytes.push(0x28);
        self.bytes.extend_from_slice(&token.to_le_bytes());
        self
    }

    fn ldstr(&mut self, text: &str) -> &mut Self {
        let token = self.next_string;
        self.next_string += 1;
        self.strings.insert(token, text.to_string());
        self.bytes.push(0x72);
        self.bytes.extend_from_slice(&token.to_le_bytes());
        self
    }

    fn ldtoken(&mut self, name: &str) -> &mut Self {
        let token = self.token(name);
        self.bytes.push(0xD0);
        self.bytes.extend_from_slice(&token.to_le_bytes());
        self
    }

    fn into_input(self, mirroring: Mirroring) -> TranslationInput {
        TranslationInput {
            body: self.bytes,
            tokens: self.tokens,
            strings: self.strings,
            blobs: IndexMap::new(),
            chr: Vec::new(),
            mirroring,
        }
    }
}

fn prg(rom: &[u8]) -> &[u8] {
    &rom[HEADER_SIZE..HEADER_SIZE + PRG_SIZE]
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// The palette/text/loop program: set some palette entries, write a string
/// to the first nametable, turn rendering on, spin on the frame counter.
fn hello_world_body() -> Body {
    let mut b = Body::new();
    // pal_col(0, 0x02); pal_col(1, 0x14)
    b.op(0x16).op(0x18).call("pal_col");
    b.op(0x17).ops(&[0x1F, 0x14]).call("pal_col");
    // vram_adr(NTADR_A(2, 2))
    b.op(0x18).op(0x18).call("NTADR_A").call("vram_adr");
    // vram_write("HELLO WORLD!", 12)
    b.ldstr("HELLO WORLD!").ops(&[0x1F, 0x0C]).call("vram_write");
    // ppu_on_all()
    b.call("ppu_on_all");
    // loop: ppu_wait_frame(); br.s loop
    let loop_head = b.bytes.len() as i8;
    b.call("ppu_wait_frame");
    let delta = loop_head - (b.bytes.len() as i8 + 2);
    b.ops(&[0x2B, delta as u8]);
    b
}

#[test]
fn test_hello_world_image_shape() {
    let rom = translate(&hello_world_body().into_input(Mirroring::Vertical)).unwrap();
    assert_eq!(rom.len(), HEADER_SIZE + PRG_SIZE + CHR_SIZE);
    assert_eq!(&rom[0..4], b"NES\x1A");
    assert_eq!(rom[4], 2); // two 16 KiB PRG banks
    assert_eq!(rom[5], 1); // one 8 KiB CHR bank
    assert_eq!(rom[6], 1); // mapper 0, vertical mirroring
}

#[test]
fn test_hello_world_string_is_contiguous() {
    let rom = translate(&hello_world_body().into_input(Mirroring::Vertical)).unwrap();
    assert!(contains(prg(&rom), b"HELLO WORLD!"));
}

#[test]
fn test_hello_world_includes_library_routines() {
    let rom = translate(&hello_world_body().into_input(Mirroring::Vertical)).unwrap();
    // vram_adr is part of the library region: STX $2006 / STA $2006 / RTS.
    assert!(contains(prg(&rom), &[0x8E, 0x06, 0x20, 0x8D, 0x06, 0x20, 0x60]));
}

#[test]
fn test_hello_world_folds_nametable_address() {
    let rom = translate(&hello_world_body().into_input(Mirroring::Vertical)).unwrap();
    // NTADR_A(2, 2) = 0x2042, loaded immediate into A/X before JSR vram_adr.
    assert!(contains(prg(&rom), &[0xA9, 0x42, 0xA2, 0x20, 0x20]));
}

#[test]
fn test_mirroring_differs_in_exactly_one_bit() {
    let h = translate(&hello_world_body().into_input(Mirroring::Horizontal)).unwrap();
    let v = translate(&hello_world_body().into_input(Mirroring::Vertical)).unwrap();
    let diffs: Vec<usize> = (0..h.len()).filter(|&i| h[i] != v[i]).collect();
    assert_eq!(diffs, vec![6]);
    assert_eq!(h[6] ^ v[6], 0x01);
}

#[test]
fn test_translation_is_deterministic() {
    let a = translate(&hello_world_body().into_input(Mirroring::Vertical)).unwrap();
    let b = translate(&hello_world_body().into_input(Mirroring::Vertical)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_long_conditional_branch_gets_a_trampoline() {
    // A conditional backward branch over ~240 bytes of straight-line code
    // cannot encode as a relative branch; the resolver rewrites it as an
    // inverted branch over an absolute jump.
    let mut b = Body::new();
    b.ops(&[0x16, 0x0A]); // ldc.i4.0; stloc.0
    let loop_head = b.bytes.len();
    for _ in 0..60 {
        b.ops(&[0x16, 0x0A]); // each pair emits LDA #$00 / STA zp (4 bytes)
    }
    b.op(0x06); // ldloc.0
    let delta = (loop_head as i32) - (b.bytes.len() as i32 + 5);
    b.op(0x3A); // brtrue (long form)
    b.ops(&delta.to_le_bytes());
    b.op(0x2A); // ret

    let rom = translate(&b.into_input(Mirroring::Horizontal)).unwrap();
    // BEQ +3 over a JMP: the trampoline signature.
    assert!(contains(prg(&rom), &[0xF0, 0x03, 0x4C]));
}

#[test]
fn test_array_initializer_lands_in_data_region() {
    // byte[] pal = { ... }; pal_bg(pal);  via the newarr/dup/ldtoken idiom
    let blob: Vec<u8> = (0..16).map(|i| 0x30 ^ i as u8).collect();
    let mut b = Body::new();
    b.ops(&[0x1F, 0x10]); // ldc.i4.s 16
    {
        let token = b.token("Byte");
        b.op(0x8D); // newarr
        b.bytes.extend_from_slice(&token.to_le_bytes());
    }
    b.op(0x25); // dup
    b.ldtoken("field_data_1");
    b.call("InitializeArray");
    b.op(0x0A); // stloc.0
    b.op(0x06); // ldloc.0
    b.call("pal_bg");
    b.op(0x2A); // ret

    let mut input = b.into_input(Mirroring::Horizontal);
    input.blobs.insert("field_data_1".to_string(), blob.clone());

    let rom = translate(&input).unwrap();
    assert!(contains(prg(&rom), &blob));
}

#[test]
fn test_chr_payload_is_carried_verbatim() {
    let mut input = hello_world_body().into_input(Mirroring::Horizontal);
    input.chr = (0..=255u8).cycle().take(1024).collect();
    let rom = translate(&input).unwrap();
    let chr_at = HEADER_SIZE + PRG_SIZE;
    assert_eq!(&rom[chr_at..chr_at + 1024], &input.chr[..]);
    assert!(rom[chr_at + 1024..].iter().all(|b| *b == 0));
}

#[test]
fn test_unknown_call_target_fails_whole_translation() {
    let mut b = Body::new();
    b.call("do_everything");
    b.op(0x2A);
    let err = translate(&b.into_input(Mirroring::Horizontal)).unwrap_err();
    assert!(matches!(
        err,
        il2nes::TranslateError::UnknownTarget(name, 0) if name == "do_everything"
    ));
}

#[test]
fn test_truncated_body_fails_whole_translation() {
    let mut b = Body::new();
    b.ops(&[0x1F]); // ldc.i4.s with its operand byte missing
    let err = translate(&b.into_input(Mirroring::Horizontal)).unwrap_err();
    assert!(matches!(err, il2nes::TranslateError::Decode(_, 0)));
}
