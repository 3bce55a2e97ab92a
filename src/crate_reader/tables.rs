//! Crate-file table decoding: TOC sections, token/string/field/fieldset/
//! path/spec tables, and the index validation pass.

use super::coding::{self, IntWidth};
use super::values::ValueRep;
use crate::error::{Result, UsdError};
use crate::path::Path;
use crate::stream::{Endian, StreamReader};

pub const MAGIC: &[u8; 8] = b"PXR-USDC";
/// Magic(8) + version(8) + toc offset(8) + reserved(64).
pub const HEADER_SIZE: usize = 88;
pub const SECTION_NAME_LEN: usize = 16;

pub const SECTION_TOKENS: &str = "TOKENS";
pub const SECTION_STRINGS: &str = "STRINGS";
pub const SECTION_FIELDS: &str = "FIELDS";
pub const SECTION_FIELDSETS: &str = "FIELDSETS";
pub const SECTION_PATHS: &str = "PATHS";
pub const SECTION_SPECS: &str = "SPECS";
pub const SECTION_VALUES: &str = "VALUES";

pub const REQUIRED_SECTIONS: &[&str] = &[
    SECTION_TOKENS,
    SECTION_STRINGS,
    SECTION_FIELDS,
    SECTION_FIELDSETS,
    SECTION_PATHS,
    SECTION_SPECS,
    SECTION_VALUES,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrateVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl std::fmt::Display for CrateVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub token: u32,
    pub rep: ValueRep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecType {
    Prim = 1,
    Attribute = 2,
    Relationship = 3,
    PseudoRoot = 4,
    Variant = 5,
    VariantSet = 6,
}

impl SpecType {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => SpecType::Prim,
            2 => SpecType::Attribute,
            3 => SpecType::Relationship,
            4 => SpecType::PseudoRoot,
            5 => SpecType::Variant,
            6 => SpecType::VariantSet,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Spec {
    pub path_index: u32,
    pub fieldset_index: u32,
    pub spec_type: SpecType,
}

/// Every decoded table plus the raw VALUES bytes.
pub struct CrateTables<'a> {
    pub tokens: Vec<String>,
    /// Indices into `tokens`.
    pub strings: Vec<u32>,
    pub fields: Vec<Field>,
    /// Field-index groups; a spec's fieldset is one entry.
    pub fieldsets: Vec<Vec<u32>>,
    pub paths: Vec<Path>,
    pub specs: Vec<Spec>,
    pub values_data: &'a [u8],
}

fn integrity(section: &'static str, offset: u64, msg: impl Into<String>) -> UsdError {
    UsdError::integrity(section, offset, msg)
}

// ---------------------------------------------------------------------------
// Header / TOC
// ---------------------------------------------------------------------------

pub fn read_header(data: &[u8]) -> Result<(CrateVersion, u64)> {
    if data.len() < HEADER_SIZE {
        return Err(UsdError::Format(format!(
            "USDC file too short: {} byte(s), minimum is {HEADER_SIZE}",
            data.len()
        )));
    }
    let mut sr = StreamReader::new(data, Endian::Little);
    let magic = sr.read(8).expect("header length checked");
    if magic != MAGIC {
        return Err(UsdError::Format("missing PXR-USDC magic".to_string()));
    }

    let version_bytes = sr.read(8).expect("header length checked");
    let version = CrateVersion {
        major: version_bytes[0],
        minor: version_bytes[1],
        patch: version_bytes[2],
    };
    if version_bytes[3..].iter().any(|&b| b != 0) {
        return Err(UsdError::Format(
            "reserved version bytes must be zero".to_string(),
        ));
    }
    if version == (CrateVersion { major: 0, minor: 0, patch: 0 }) {
        return Err(UsdError::Format("invalid crate version 0.0.0".to_string()));
    }

    let toc_offset = sr.read_u64().expect("header length checked");
    if toc_offset as usize >= data.len() || (toc_offset as usize) < HEADER_SIZE {
        return Err(integrity("TOC", toc_offset, "TOC offset out of range"));
    }
    Ok((version, toc_offset))
}

pub fn read_toc(data: &[u8], toc_offset: u64) -> Result<Vec<Section>> {
    let mut sr = StreamReader::new(data, Endian::Little);
    sr.seek_set(toc_offset)
        .map_err(|e| integrity("TOC", toc_offset, e.to_string()))?;
    let count = sr
        .read_u64()
        .map_err(|e| integrity("TOC", toc_offset, e.to_string()))?;
    if count > 64 {
        return Err(integrity("TOC", toc_offset, format!("absurd section count {count}")));
    }

    let mut sections = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let at = sr.tell();
        let name_bytes = sr
            .read(SECTION_NAME_LEN)
            .map_err(|e| integrity("TOC", at, e.to_string()))?;
        let name = String::from_utf8_lossy(name_bytes)
            .trim_end_matches('\0')
            .to_string();
        let offset = sr.read_u64().map_err(|e| integrity("TOC", at, e.to_string()))?;
        let size = sr.read_u64().map_err(|e| integrity("TOC", at, e.to_string()))?;

        let end = offset.checked_add(size);
        if offset < HEADER_SIZE as u64 || end.is_none() || end.unwrap() > data.len() as u64 {
            return Err(integrity(
                "TOC",
                at,
                format!("section `{name}` range {offset}+{size} out of file bounds"),
            ));
        }
        sections.push(Section { name, offset, size });
    }

    for required in REQUIRED_SECTIONS {
        if !sections.iter().any(|s| s.name == *required) {
            return Err(integrity("TOC", toc_offset, format!("missing section `{required}`")));
        }
    }
    Ok(sections)
}

pub fn section_bytes<'a>(data: &'a [u8], sections: &[Section], name: &str) -> &'a [u8] {
    let s = sections
        .iter()
        .find(|s| s.name == name)
        .expect("presence checked by read_toc");
    &data[s.offset as usize..(s.offset + s.size) as usize]
}

// ---------------------------------------------------------------------------
// Section decoders (each runs independently; see the worker pool)
// ---------------------------------------------------------------------------

/// `u64 count, u64 uncompressed_size, LZ4 chunks` of NUL-separated strings.
pub fn decode_tokens(data: &[u8]) -> Result<Vec<String>> {
    const S: &str = SECTION_TOKENS;
    if data.len() < 16 {
        return Err(integrity(S, 0, "token section too short"));
    }
    let count = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
    let raw_size = u64::from_le_bytes(data[8..16].try_into().unwrap()) as usize;
    let raw = coding::decompress_chunked(&data[16..], raw_size)
        .map_err(|e| integrity(S, 16, e.0))?;

    let mut tokens = Vec::with_capacity(count);
    for chunk in raw.split(|&b| b == 0) {
        if tokens.len() == count {
            break;
        }
        let s = std::str::from_utf8(chunk)
            .map_err(|e| integrity(S, 0, format!("token is not UTF-8: {e}")))?;
        tokens.push(s.to_string());
    }
    if tokens.len() != count {
        return Err(integrity(
            S,
            0,
            format!("token count mismatch: decoded {}, header says {count}", tokens.len()),
        ));
    }
    Ok(tokens)
}

/// `u64 count`, then raw u32 token indices.
pub fn decode_strings(data: &[u8]) -> Result<Vec<u32>> {
    const S: &str = SECTION_STRINGS;
    if data.len() < 8 {
        return Err(integrity(S, 0, "string section too short"));
    }
    let count = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
    let body = data
        .get(8..8 + count * 4)
        .ok_or_else(|| integrity(S, 8, "string section truncated"))?;
    Ok(body
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

/// `u64 count`, compressed token-index ints, then `u64 comp_size` + LZ4
/// chunks of `count * 8` rep bytes.
pub fn decode_fields(data: &[u8]) -> Result<Vec<Field>> {
    const S: &str = SECTION_FIELDS;
    if data.len() < 8 {
        return Err(integrity(S, 0, "field section too short"));
    }
    let count = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
    let (token_indexes, consumed) =
        coding::read_compressed_ints(&data[8..], count, IntWidth::W32)
            .map_err(|e| integrity(S, 8, e.0))?;

    let reps_at = 8 + consumed;
    let tail = data
        .get(reps_at..)
        .ok_or_else(|| integrity(S, reps_at as u64, "field section truncated"))?;
    if tail.len() < 8 {
        return Err(integrity(S, reps_at as u64, "field rep block truncated"));
    }
    let comp_size = u64::from_le_bytes(tail[0..8].try_into().unwrap()) as usize;
    let comp = tail
        .get(8..8 + comp_size)
        .ok_or_else(|| integrity(S, reps_at as u64, "field rep block truncated"))?;
    let reps_raw = coding::decompress_chunked(comp, count * 8)
        .map_err(|e| integrity(S, reps_at as u64, e.0))?;

    let mut fields = Vec::with_capacity(count);
    for (i, chunk) in reps_raw.chunks_exact(8).enumerate() {
        let token = u32::try_from(token_indexes[i])
            .map_err(|_| integrity(S, 8, format!("negative token index {}", token_indexes[i])))?;
        fields.push(Field {
            token,
            rep: ValueRep(u64::from_le_bytes(chunk.try_into().unwrap())),
        });
    }
    Ok(fields)
}

/// `u64 total`, compressed ints of field indices with `-1` group
/// terminators.
pub fn decode_fieldsets(data: &[u8]) -> Result<Vec<Vec<u32>>> {
    const S: &str = SECTION_FIELDSETS;
    if data.len() < 8 {
        return Err(integrity(S, 0, "fieldset section too short"));
    }
    let total = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
    let (indices, _) = coding::read_compressed_ints(&data[8..], total, IntWidth::W32)
        .map_err(|e| integrity(S, 8, e.0))?;

    let mut sets = Vec::new();
    let mut current = Vec::new();
    for &idx in &indices {
        if idx == -1 {
            sets.push(std::mem::take(&mut current));
        } else {
            let idx = u32::try_from(idx)
                .map_err(|_| integrity(S, 8, format!("invalid field index {idx}")))?;
            current.push(idx);
        }
    }
    if !current.is_empty() {
        return Err(integrity(S, 8, "fieldset missing terminator"));
    }
    Ok(sets)
}

/// Raw decompressed path table: three parallel int arrays.
pub struct RawPaths {
    pub path_indexes: Vec<i64>,
    pub element_token_indexes: Vec<i64>,
    pub jumps: Vec<i64>,
}

pub fn decode_paths_raw(data: &[u8]) -> Result<RawPaths> {
    const S: &str = SECTION_PATHS;
    if data.len() < 8 {
        return Err(integrity(S, 0, "path section too short"));
    }
    let count = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
    let mut at = 8usize;
    let mut read = |label: &str| -> Result<Vec<i64>> {
        let (v, consumed) = coding::read_compressed_ints(&data[at..], count, IntWidth::W32)
            .map_err(|e| integrity(S, at as u64, format!("{label}: {}", e.0)))?;
        at += consumed;
        Ok(v)
    };
    Ok(RawPaths {
        path_indexes: read("path indexes")?,
        element_token_indexes: read("element token indexes")?,
        jumps: read("jumps")?,
    })
}

/// Expand the jump-encoded path table into concrete paths.
///
/// Per entry: `jump > 0` means child next and sibling at `i + jump`;
/// `-1` child only; `0` sibling only; `-2` leaf.
pub fn build_paths(raw: &RawPaths, tokens: &[String]) -> Result<Vec<Path>> {
    const S: &str = SECTION_PATHS;
    let count = raw.path_indexes.len();
    let mut paths = vec![Path::default(); count];
    if count == 0 {
        return Ok(paths);
    }

    let slot = |i: usize| -> Result<usize> {
        let idx = raw.path_indexes[i];
        usize::try_from(idx)
            .ok()
            .filter(|&v| v < count)
            .ok_or_else(|| integrity(S, 0, format!("path index {idx} out of range")))
    };

    // (parent path, entry index) continuations for sibling branches.
    let mut pending: Vec<(Path, usize)> = Vec::new();
    let mut parent = Path::default();
    let mut i = 0usize;
    let mut visited = 0usize;
    loop {
        // Each entry is visited exactly once in a well-formed table.
        visited += 1;
        if visited > count {
            return Err(integrity(S, 0, "cyclic jump table in path section"));
        }
        let this = i;
        i += 1;

        let path = if parent == Path::default() {
            Path::root()
        } else {
            let token_index = raw.element_token_indexes[this];
            let is_property = token_index < 0;
            let idx = usize::try_from(token_index.abs())
                .ok()
                .filter(|&v| v < tokens.len())
                .ok_or_else(|| {
                    integrity(S, 0, format!("element token index {token_index} out of range"))
                })?;
            let token = &tokens[idx];
            if is_property {
                parent.append_property(token)
            } else {
                parent.append_prim(token)
            }
        };
        paths[slot(this)?] = path.clone();

        let jump = raw.jumps[this];
        let has_child = jump > 0 || jump == -1;
        let has_sibling = jump >= 0;

        if has_child {
            if has_sibling {
                let sibling = this
                    .checked_add(jump as usize)
                    .filter(|&s| s < count)
                    .ok_or_else(|| integrity(S, 0, format!("sibling jump {jump} out of range")))?;
                pending.push((parent.clone(), sibling));
            }
            parent = path;
        } else if !has_sibling {
            // Leaf: resume a pending sibling branch or finish.
            match pending.pop() {
                Some((p, idx)) => {
                    parent = p;
                    i = idx;
                }
                None => break,
            }
        }

        if i >= count {
            if let Some((p, idx)) = pending.pop() {
                parent = p;
                i = idx;
            } else {
                break;
            }
        }
    }

    Ok(paths)
}

pub fn decode_specs(data: &[u8]) -> Result<Vec<Spec>> {
    const S: &str = SECTION_SPECS;
    if data.len() < 8 {
        return Err(integrity(S, 0, "spec section too short"));
    }
    let count = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
    let mut at = 8usize;
    let mut read = |label: &str| -> Result<Vec<i64>> {
        let (v, consumed) = coding::read_compressed_ints(&data[at..], count, IntWidth::W32)
            .map_err(|e| integrity(S, at as u64, format!("{label}: {}", e.0)))?;
        at += consumed;
        Ok(v)
    };
    let path_indexes = read("path indexes")?;
    let fieldset_indexes = read("fieldset indexes")?;
    let spec_types = read("spec types")?;

    let mut specs = Vec::with_capacity(count);
    for idx in 0..count {
        let spec_type = u32::try_from(spec_types[idx])
            .ok()
            .and_then(SpecType::from_u32)
            .ok_or_else(|| {
                integrity(S, 8, format!("invalid spec type {}", spec_types[idx]))
            })?;
        specs.push(Spec {
            path_index: u32::try_from(path_indexes[idx])
                .map_err(|_| integrity(S, 8, "negative spec path index"))?,
            fieldset_index: u32::try_from(fieldset_indexes[idx])
                .map_err(|_| integrity(S, 8, "negative fieldset index"))?,
            spec_type,
        });
    }
    Ok(specs)
}

/// Cross-table index validation; every violation aborts the read.
pub fn validate_tables(tables: &CrateTables<'_>) -> Result<()> {
    for (i, f) in tables.fields.iter().enumerate() {
        if f.token as usize >= tables.tokens.len() {
            return Err(integrity(
                SECTION_FIELDS,
                i as u64,
                format!("field {i} token index {} out of range", f.token),
            ));
        }
    }
    for (i, set) in tables.fieldsets.iter().enumerate() {
        for &fi in set {
            if fi as usize >= tables.fields.len() {
                return Err(integrity(
                    SECTION_FIELDSETS,
                    i as u64,
                    format!("fieldset {i} field index {fi} out of range"),
                ));
            }
        }
    }
    for &s in &tables.strings {
        if s as usize >= tables.tokens.len() {
            return Err(integrity(
                SECTION_STRINGS,
                0,
                format!("string token index {s} out of range"),
            ));
        }
    }
    for (i, spec) in tables.specs.iter().enumerate() {
        if spec.path_index as usize >= tables.paths.len() {
            return Err(integrity(
                SECTION_SPECS,
                i as u64,
                format!("spec {i} path index {} out of range", spec.path_index),
            ));
        }
        if spec.fieldset_index as usize >= tables.fieldsets.len() {
            return Err(integrity(
                SECTION_SPECS,
                i as u64,
                format!("spec {i} fieldset index {} out of range", spec.fieldset_index),
            ));
        }
    }
    Ok(())
}
