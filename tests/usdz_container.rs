use usd_forge::error::UsdError;
use usd_forge::usdz::parse_usdz_index;
use usd_forge::{LoadOptions, detect_format, load_usd_from_memory, load_usdz_from_memory};

const LOCAL_HEADER_SIG: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const MIN_USDZ_SIZE: usize = 118;

/// Store-only zip with 64-byte-aligned member data.
fn build_usdz(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, data) in members {
        let header_start = out.len();
        let unpadded_data_start = header_start + 30 + name.len();
        let extra_len = (64 - (unpadded_data_start % 64)) % 64;

        out.extend_from_slice(&LOCAL_HEADER_SIG);
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u32.to_le_bytes()); // time+date
        out.extend_from_slice(&0u32.to_le_bytes()); // crc
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra_len as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend(std::iter::repeat(0u8).take(extra_len));
        assert_eq!(out.len() % 64, 0);
        out.extend_from_slice(data);
    }
    out.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]);
    if out.len() < MIN_USDZ_SIZE {
        out.resize(MIN_USDZ_SIZE, 0);
    }
    out
}

const SPHERE_USDA: &[u8] = b"#usda 1.0\ndef Sphere \"from_usda\"\n{\n    double radius = 1.0\n}\n";

#[test]
fn usdz_dispatch_prefers_usdc_and_warns() {
    // Primary.usda listed first, Primary.usdc second: USDC still wins.
    let usdc = minimal_usdc();
    let zip = build_usdz(&[("Primary.usda", SPHERE_USDA), ("Primary.usdc", &usdc)]);

    let (stage, warnings) =
        load_usdz_from_memory(&zip, "scene.usdz", &LoadOptions::default()).unwrap();
    assert!(
        warnings
            .iter()
            .any(|w| w.message.contains("using USDC file Primary.usdc"))
    );
    // The stage came from the USDC member, not the USDA one.
    assert_eq!(stage.root_prims[0].name, "ball");
}

#[test]
fn usda_only_container_loads_the_usda() {
    let zip = build_usdz(&[("scene.usda", SPHERE_USDA), ("tex.png", &[0x89, b'P'])]);
    let (stage, _) = load_usdz_from_memory(&zip, "scene.usdz", &LoadOptions::default()).unwrap();
    assert_eq!(stage.root_prims[0].name, "from_usda");
}

#[test]
fn auto_detection_routes_to_usdz() {
    let zip = build_usdz(&[("scene.usda", SPHERE_USDA)]);
    assert_eq!(detect_format(&zip), Some(usd_forge::UsdFormat::Usdz));
    let (stage, _) = load_usd_from_memory(&zip, "", &LoadOptions::default()).unwrap();
    assert_eq!(stage.root_prims[0].name, "from_usda");
}

#[test]
fn container_without_scene_fails() {
    let zip = build_usdz(&[("tex.png", &[1, 2, 3])]);
    let err = load_usdz_from_memory(&zip, "x.usdz", &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, UsdError::Format(_)));
}

#[test]
fn asset_size_limit_applies_per_member() {
    let big = vec![0u8; 2 * 1024 * 1024];
    let zip = build_usdz(&[("scene.usda", SPHERE_USDA), ("huge.bin", &big)]);
    let options = LoadOptions {
        max_allowed_asset_size_mb: 1,
        ..Default::default()
    };
    let err = load_usdz_from_memory(&zip, "x.usdz", &options).unwrap_err();
    assert!(matches!(err, UsdError::Input(_)));
}

#[test]
fn unaligned_member_offset_is_an_integrity_error() {
    let mut zip = build_usdz(&[("scene.usda", SPHERE_USDA)]);
    // Shrink the extra field so the data starts one byte early.
    let extra_len = u16::from_le_bytes([zip[28], zip[29]]);
    zip[28..30].copy_from_slice(&(extra_len - 1).to_le_bytes());
    zip.remove(30 + "scene.usda".len());
    let err = parse_usdz_index(&zip).unwrap_err();
    assert!(matches!(err, UsdError::Integrity { .. }));
}

/// Minimal USDC bytes: one Sphere prim named `ball`, produced by the same
/// layout the crate-reader tests assemble.
fn minimal_usdc() -> Vec<u8> {
    use usd_forge::crate_reader::ValueRep;
    use usd_forge::crate_reader::coding::{IntWidth, compress_chunked, write_compressed_ints};
    use usd_forge::value::lookup_type;

    let mut tokens: Vec<String> = Vec::new();
    let mut token = |s: &str, tokens: &mut Vec<String>| -> u32 {
        if let Some(i) = tokens.iter().position(|t| t == s) {
            return i as u32;
        }
        tokens.push(s.to_string());
        (tokens.len() - 1) as u32
    };

    let ball = token("ball", &mut tokens);
    let specifier_tok = token("specifier", &mut tokens);
    let type_name_tok = token("typeName", &mut tokens);
    let def_tok = token("def", &mut tokens);
    let sphere_tok = token("Sphere", &mut tokens);

    let token_ty = lookup_type("token").unwrap().0;
    let fields: Vec<(u32, u64)> = vec![
        (specifier_tok, ValueRep::inlined(token_ty, def_tok).0),
        (type_name_tok, ValueRep::inlined(token_ty, sphere_tok).0),
    ];
    let fieldset_indices: Vec<i64> = vec![-1, 0, 1, -1]; // empty set, then {specifier, typeName}

    // Paths: /, /ball.
    let path_indexes: Vec<i64> = vec![0, 1];
    let elem_tokens: Vec<i64> = vec![0, i64::from(ball)];
    let jumps: Vec<i64> = vec![-1, -2];

    // Specs: pseudo-root (empty fieldset 0), prim (fieldset 1).
    let spec_paths: Vec<i64> = vec![0, 1];
    let spec_fieldsets: Vec<i64> = vec![0, 1];
    let spec_types: Vec<i64> = vec![4, 1];

    let tokens_section = {
        let raw = tokens.join("\0").into_bytes();
        let mut s = (tokens.len() as u64).to_le_bytes().to_vec();
        s.extend_from_slice(&(raw.len() as u64).to_le_bytes());
        s.extend_from_slice(&compress_chunked(&raw));
        s
    };
    let strings_section = 0u64.to_le_bytes().to_vec();
    let fields_section = {
        let token_idxs: Vec<i64> = fields.iter().map(|&(t, _)| i64::from(t)).collect();
        let reps: Vec<u8> = fields.iter().flat_map(|&(_, rep)| rep.to_le_bytes()).collect();
        let compressed_reps = compress_chunked(&reps);
        let mut s = (fields.len() as u64).to_le_bytes().to_vec();
        s.extend_from_slice(&write_compressed_ints(&token_idxs, IntWidth::W32));
        s.extend_from_slice(&(compressed_reps.len() as u64).to_le_bytes());
        s.extend_from_slice(&compressed_reps);
        s
    };
    let fieldsets_section = {
        let mut s = (fieldset_indices.len() as u64).to_le_bytes().to_vec();
        s.extend_from_slice(&write_compressed_ints(&fieldset_indices, IntWidth::W32));
        s
    };
    let paths_section = {
        let mut s = (path_indexes.len() as u64).to_le_bytes().to_vec();
        s.extend_from_slice(&write_compressed_ints(&path_indexes, IntWidth::W32));
        s.extend_from_slice(&write_compressed_ints(&elem_tokens, IntWidth::W32));
        s.extend_from_slice(&write_compressed_ints(&jumps, IntWidth::W32));
        s
    };
    let specs_section = {
        let mut s = (spec_paths.len() as u64).to_le_bytes().to_vec();
        s.extend_from_slice(&write_compressed_ints(&spec_paths, IntWidth::W32));
        s.extend_from_slice(&write_compressed_ints(&spec_fieldsets, IntWidth::W32));
        s.extend_from_slice(&write_compressed_ints(&spec_types, IntWidth::W32));
        s
    };

    let sections: Vec<(&str, &[u8])> = vec![
        ("TOKENS", &tokens_section),
        ("STRINGS", &strings_section),
        ("FIELDS", &fields_section),
        ("FIELDSETS", &fieldsets_section),
        ("PATHS", &paths_section),
        ("SPECS", &specs_section),
        ("VALUES", &[]),
    ];

    let mut out = Vec::new();
    out.extend_from_slice(b"PXR-USDC");
    out.extend_from_slice(&[0, 8, 0, 0, 0, 0, 0, 0]);
    let toc_offset_slot = out.len();
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&[0u8; 64]);

    let mut toc: Vec<(String, u64, u64)> = Vec::new();
    for (name, body) in &sections {
        let offset = out.len() as u64;
        out.extend_from_slice(body);
        toc.push((name.to_string(), offset, body.len() as u64));
    }
    let toc_offset = out.len() as u64;
    out[toc_offset_slot..toc_offset_slot + 8].copy_from_slice(&toc_offset.to_le_bytes());
    out.extend_from_slice(&(toc.len() as u64).to_le_bytes());
    for (name, offset, size) in &toc {
        let mut name_bytes = [0u8; 16];
        name_bytes[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&name_bytes);
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
    }
    out
}
