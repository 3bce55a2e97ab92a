//! Crate-reader tests over hand-assembled USDC files. The builder below is
//! test plumbing only; the library has no USDC writer.

use usd_forge::crate_reader::coding::{IntWidth, compress_chunked, write_compressed_ints};
use usd_forge::crate_reader::{CrateReaderConfig, ValueRep, read_usdc};
use usd_forge::error::UsdError;
use usd_forge::layer::{PrimVar, Specifier};
use usd_forge::value::{Value, lookup_type};
use usd_forge::{LoadOptions, load_usdc_from_memory};

const SPEC_PRIM: i64 = 1;
const SPEC_ATTRIBUTE: i64 = 2;
const SPEC_PSEUDO_ROOT: i64 = 4;

#[derive(Default)]
struct CrateBuilder {
    tokens: Vec<String>,
    strings: Vec<u32>,
    fields: Vec<(u32, u64)>,
    fieldset_indices: Vec<i64>,
    path_indexes: Vec<i64>,
    elem_tokens: Vec<i64>,
    jumps: Vec<i64>,
    spec_paths: Vec<i64>,
    spec_fieldsets: Vec<i64>,
    spec_types: Vec<i64>,
    values: Vec<u8>,
}

impl CrateBuilder {
    fn token(&mut self, s: &str) -> u32 {
        if let Some(i) = self.tokens.iter().position(|t| t == s) {
            return i as u32;
        }
        self.tokens.push(s.to_string());
        (self.tokens.len() - 1) as u32
    }

    fn type_id(name: &str) -> u32 {
        lookup_type(name).expect("registered type").0
    }

    fn inline_token_rep(&mut self, type_name: &str, token: &str) -> u64 {
        let idx = self.token(token);
        ValueRep::inlined(Self::type_id(type_name), idx).0
    }

    fn value_offset(&mut self, bytes: &[u8]) -> u32 {
        let at = self.values.len() as u32;
        self.values.extend_from_slice(bytes);
        at
    }

    fn scalar_rep(&mut self, type_name: &str, bytes: &[u8]) -> u64 {
        let at = self.value_offset(bytes);
        ValueRep::offset(Self::type_id(type_name), false, false, at).0
    }

    fn array_rep(&mut self, type_name: &str, count: u64, elems: &[u8]) -> u64 {
        let mut body = count.to_le_bytes().to_vec();
        body.extend_from_slice(elems);
        let at = self.value_offset(&body);
        ValueRep::offset(Self::type_id(type_name), true, false, at).0
    }

    fn compressed_int_array_rep(&mut self, values: &[i64]) -> u64 {
        let mut body = (values.len() as u64).to_le_bytes().to_vec();
        body.extend_from_slice(&write_compressed_ints(values, IntWidth::W32));
        let at = self.value_offset(&body);
        ValueRep::offset(Self::type_id("int"), true, true, at).0
    }

    fn field(&mut self, name: &str, rep: u64) -> i64 {
        let token = self.token(name);
        self.fields.push((token, rep));
        (self.fields.len() - 1) as i64
    }

    fn fieldset(&mut self, field_indices: &[i64]) -> i64 {
        let ordinal = self
            .fieldset_indices
            .iter()
            .filter(|&&i| i == -1)
            .count() as i64;
        self.fieldset_indices.extend_from_slice(field_indices);
        self.fieldset_indices.push(-1);
        ordinal
    }

    fn path(&mut self, path_index: i64, elem_token: i64, jump: i64) {
        self.path_indexes.push(path_index);
        self.elem_tokens.push(elem_token);
        self.jumps.push(jump);
    }

    fn spec(&mut self, path: i64, fieldset: i64, spec_type: i64) {
        self.spec_paths.push(path);
        self.spec_fieldsets.push(fieldset);
        self.spec_types.push(spec_type);
    }

    fn build(&self) -> Vec<u8> {
        let tokens_section = {
            let raw = self.tokens.join("\0").into_bytes();
            let mut s = (self.tokens.len() as u64).to_le_bytes().to_vec();
            s.extend_from_slice(&(raw.len() as u64).to_le_bytes());
            s.extend_from_slice(&compress_chunked(&raw));
            s
        };
        let strings_section = {
            let mut s = (self.strings.len() as u64).to_le_bytes().to_vec();
            for &idx in &self.strings {
                s.extend_from_slice(&idx.to_le_bytes());
            }
            s
        };
        let fields_section = {
            let token_idxs: Vec<i64> = self.fields.iter().map(|&(t, _)| i64::from(t)).collect();
            let reps: Vec<u8> = self
                .fields
                .iter()
                .flat_map(|&(_, rep)| rep.to_le_bytes())
                .collect();
            let compressed_reps = compress_chunked(&reps);
            let mut s = (self.fields.len() as u64).to_le_bytes().to_vec();
            s.extend_from_slice(&write_compressed_ints(&token_idxs, IntWidth::W32));
            s.extend_from_slice(&(compressed_reps.len() as u64).to_le_bytes());
            s.extend_from_slice(&compressed_reps);
            s
        };
        let fieldsets_section = {
            let mut s = (self.fieldset_indices.len() as u64).to_le_bytes().to_vec();
            s.extend_from_slice(&write_compressed_ints(&self.fieldset_indices, IntWidth::W32));
            s
        };
        let paths_section = {
            let mut s = (self.path_indexes.len() as u64).to_le_bytes().to_vec();
            s.extend_from_slice(&write_compressed_ints(&self.path_indexes, IntWidth::W32));
            s.extend_from_slice(&write_compressed_ints(&self.elem_tokens, IntWidth::W32));
            s.extend_from_slice(&write_compressed_ints(&self.jumps, IntWidth::W32));
            s
        };
        let specs_section = {
            let mut s = (self.spec_paths.len() as u64).to_le_bytes().to_vec();
            s.extend_from_slice(&write_compressed_ints(&self.spec_paths, IntWidth::W32));
            s.extend_from_slice(&write_compressed_ints(&self.spec_fieldsets, IntWidth::W32));
            s.extend_from_slice(&write_compressed_ints(&self.spec_types, IntWidth::W32));
            s
        };

        let sections: Vec<(&str, &[u8])> = vec![
            ("TOKENS", &tokens_section),
            ("STRINGS", &strings_section),
            ("FIELDS", &fields_section),
            ("FIELDSETS", &fieldsets_section),
            ("PATHS", &paths_section),
            ("SPECS", &specs_section),
            ("VALUES", &self.values),
        ];

        let mut out = Vec::new();
        out.extend_from_slice(b"PXR-USDC");
        out.extend_from_slice(&[0, 8, 0, 0, 0, 0, 0, 0]); // version 0.8.0
        let toc_offset_slot = out.len();
        out.extend_from_slice(&[0u8; 8]); // toc offset, patched below
        out.extend_from_slice(&[0u8; 64]); // reserved

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
}

/// `/` + `def Sphere "ball" { double radius; int[] ids }` with stage metas.
fn sphere_crate() -> Vec<u8> {
    let mut b = CrateBuilder::default();

    // Path table: /, /ball, /ball.radius, /ball.ids.
    let ball_tok = b.token("ball");
    let radius_tok = b.token("radius");
    let ids_tok = b.token("ids");
    b.path(0, 0, -1);
    b.path(1, i64::from(ball_tok), -1);
    b.path(2, -i64::from(radius_tok), 0);
    b.path(3, -i64::from(ids_tok), -2);

    let up_axis = b.inline_token_rep("token", "Z");
    let mpu = b.scalar_rep("double", &0.01f64.to_le_bytes());
    let f_up = b.field("upAxis", up_axis);
    let f_mpu = b.field("metersPerUnit", mpu);
    let root_set = b.fieldset(&[f_up, f_mpu]);

    let spec_def = b.inline_token_rep("token", "def");
    let ty_sphere = b.inline_token_rep("token", "Sphere");
    let f_spec = b.field("specifier", spec_def);
    let f_type = b.field("typeName", ty_sphere);
    let prim_set = b.fieldset(&[f_spec, f_type]);

    let ty_double = b.inline_token_rep("token", "double");
    let radius_default = b.scalar_rep("double", &2.5f64.to_le_bytes());
    let f_attr_ty = b.field("typeName", ty_double);
    let f_default = b.field("default", radius_default);
    let attr_set = b.fieldset(&[f_attr_ty, f_default]);

    let ty_int_array = b.inline_token_rep("token", "int[]");
    let ids_value = b.compressed_int_array_rep(&[3, 1, 4, 1, 5, 9, 2, 6]);
    let f_ids_ty = b.field("typeName", ty_int_array);
    let f_ids_default = b.field("default", ids_value);
    let ids_set = b.fieldset(&[f_ids_ty, f_ids_default]);

    b.spec(0, root_set, SPEC_PSEUDO_ROOT);
    b.spec(1, prim_set, SPEC_PRIM);
    b.spec(2, attr_set, SPEC_ATTRIBUTE);
    b.spec(3, ids_set, SPEC_ATTRIBUTE);
    b.build()
}

#[test]
fn minimal_crate_file_materializes() {
    let bytes = sphere_crate();
    let (layer, warnings) = read_usdc(&bytes, &CrateReaderConfig::default()).unwrap();
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

    assert_eq!(layer.metas.up_axis.map(|a| a.as_str()), Some("Z"));
    assert_eq!(layer.metas.meters_per_unit, Some(0.01));

    let ball = layer.root_prim("ball").expect("ball prim");
    assert_eq!(ball.specifier, Specifier::Def);
    assert_eq!(ball.type_name.as_ref().unwrap().as_str(), "Sphere");

    let radius = ball.properties.get("radius").unwrap().as_attribute().unwrap();
    assert_eq!(radius.type_name, "double");
    assert_eq!(radius.value, Some(PrimVar::Scalar(Value::Double(2.5))));

    let ids = ball.properties.get("ids").unwrap().as_attribute().unwrap();
    assert_eq!(
        ids.value,
        Some(PrimVar::Scalar(Value::IntArray(vec![3, 1, 4, 1, 5, 9, 2, 6])))
    );
}

#[test]
fn parallel_section_loading_matches_sequential() {
    let bytes = sphere_crate();
    let (seq, _) = read_usdc(&bytes, &CrateReaderConfig { num_threads: 1 }).unwrap();
    let (par, _) = read_usdc(&bytes, &CrateReaderConfig { num_threads: 4 }).unwrap();
    assert_eq!(seq, par);
}

#[test]
fn crate_stage_loads_end_to_end() {
    let bytes = sphere_crate();
    let (stage, _) =
        load_usdc_from_memory(&bytes, "sphere.usdc", &LoadOptions::default()).unwrap();
    let prim = &stage.root_prims[0];
    match &prim.data {
        usd_forge::stage::PrimData::Sphere(s) => assert_eq!(s.radius, 2.5),
        other => panic!("expected a sphere, got {}", other.type_label()),
    }
}

#[test]
fn short_file_is_a_format_error() {
    let err = read_usdc(&[0u8; 87], &CrateReaderConfig::default()).unwrap_err();
    assert!(matches!(err, UsdError::Format(_)));
}

#[test]
fn bad_magic_is_a_format_error() {
    let mut bytes = sphere_crate();
    bytes[0] = b'X';
    let err = read_usdc(&bytes, &CrateReaderConfig::default()).unwrap_err();
    assert!(matches!(err, UsdError::Format(_)));
}

#[test]
fn nonzero_reserved_version_bytes_are_rejected() {
    let mut bytes = sphere_crate();
    bytes[12] = 1;
    let err = read_usdc(&bytes, &CrateReaderConfig::default()).unwrap_err();
    assert!(matches!(err, UsdError::Format(_)));
}

#[test]
fn out_of_range_token_index_is_an_integrity_error() {
    let mut b = CrateBuilder::default();
    b.path(0, 0, -2);
    let bogus = ValueRep::inlined(lookup_type("token").unwrap().0, 999).0;
    let f = b.field("upAxis", bogus);
    let set = b.fieldset(&[f]);
    b.spec(0, set, SPEC_PSEUDO_ROOT);
    let err = read_usdc(&b.build(), &CrateReaderConfig::default()).unwrap_err();
    assert!(matches!(err, UsdError::Integrity { .. }));
}

#[test]
fn out_of_range_value_offset_is_an_integrity_error() {
    let mut b = CrateBuilder::default();
    b.path(0, 0, -2);
    let bogus = ValueRep::offset(lookup_type("double").unwrap().0, false, false, 40_000).0;
    let f = b.field("metersPerUnit", bogus);
    let set = b.fieldset(&[f]);
    b.spec(0, set, SPEC_PSEUDO_ROOT);
    let err = read_usdc(&b.build(), &CrateReaderConfig::default()).unwrap_err();
    assert!(matches!(err, UsdError::Integrity { .. }));
}

#[test]
fn unregistered_type_id_is_an_integrity_error() {
    let mut b = CrateBuilder::default();
    b.path(0, 0, -2);
    let bogus = ValueRep::inlined(9999, 0).0;
    let f = b.field("metersPerUnit", bogus);
    let set = b.fieldset(&[f]);
    b.spec(0, set, SPEC_PSEUDO_ROOT);
    let err = read_usdc(&b.build(), &CrateReaderConfig::default()).unwrap_err();
    assert!(matches!(err, UsdError::Integrity { .. }));
}

#[test]
fn spec_index_validation_catches_corruption() {
    let mut b = CrateBuilder::default();
    b.path(0, 0, -2);
    let rep = b.inline_token_rep("token", "Z");
    let f = b.field("upAxis", rep);
    let set = b.fieldset(&[f]);
    b.spec(7, set, SPEC_PSEUDO_ROOT); // path index out of range
    let err = read_usdc(&b.build(), &CrateReaderConfig::default()).unwrap_err();
    assert!(matches!(err, UsdError::Integrity { .. }));
}
