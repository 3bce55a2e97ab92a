//! 64-bit value representations and their decoding against the crate
//! tables.
//!
//! Descriptor layout: bits 0-31 type id, bit 32 array, bit 33 inlined,
//! bit 34 compressed, bit 35 payload-is-offset, bits 36-63 the 28-bit
//! payload (an inlined value or an offset into the VALUES section).

use bytemuck::pod_read_unaligned;
use half::f16;

use super::coding::{self, IntWidth};
use super::tables::CrateTables;
use crate::error::{Result, UsdError};
use crate::path::Path;
use crate::value::{
    self, AssetPath, Color3d, Color3f, Color3h, Color4d, Color4f, Color4h, Dictionary,
    LayerOffset, Matrix2d, Matrix3d, Matrix4d, MetaVariable, Normal3d, Normal3f, Normal3h,
    Point3d, Point3f, Point3h, Quatd, Quatf, Quath, Reference, TexCoord2d, TexCoord2f,
    TexCoord2h, TexCoord3d, TexCoord3f, TexCoord3h, TexCoord4d, TexCoord4f, TexCoord4h,
    TimeSamples, Token, Value, Vector3d, Vector3f, Vector3h, Vector4f,
};

const SECTION: &str = "VALUES";
const MAX_DICT_NEST: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRep(pub u64);

impl ValueRep {
    pub fn type_id(self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }

    pub fn is_array(self) -> bool {
        self.0 & (1 << 32) != 0
    }

    pub fn is_inlined(self) -> bool {
        self.0 & (1 << 33) != 0
    }

    pub fn is_compressed(self) -> bool {
        self.0 & (1 << 34) != 0
    }

    pub fn is_payload_offset(self) -> bool {
        self.0 & (1 << 35) != 0
    }

    pub fn payload(self) -> u64 {
        self.0 >> 36
    }

    pub fn inlined(type_id: u32, payload: u32) -> Self {
        Self(u64::from(type_id) | (1 << 33) | (u64::from(payload & 0x0fff_ffff) << 36))
    }

    pub fn offset(type_id: u32, array: bool, compressed: bool, offset: u32) -> Self {
        let mut bits = u64::from(type_id) | (1 << 35) | (u64::from(offset & 0x0fff_ffff) << 36);
        if array {
            bits |= 1 << 32;
        }
        if compressed {
            bits |= 1 << 34;
        }
        Self(bits)
    }
}

fn integrity(offset: u64, msg: impl Into<String>) -> UsdError {
    UsdError::integrity(SECTION, offset, msg)
}

pub(super) fn type_name_of(rep: ValueRep) -> Result<&'static str> {
    value::type_name_for(rep.type_id(), rep.is_array())
        .ok_or_else(|| integrity(0, format!("unregistered value type id {}", rep.type_id())))
}

fn token_at(tables: &CrateTables, idx: u32, at: u64) -> Result<Token> {
    tables
        .tokens
        .get(idx as usize)
        .map(|s| Token::new(s.clone()))
        .ok_or_else(|| integrity(at, format!("token index {idx} out of range")))
}

/// Strings are indices into STRINGS, which in turn index the token table.
fn string_at(tables: &CrateTables, idx: u32, at: u64) -> Result<String> {
    let token_idx = *tables
        .strings
        .get(idx as usize)
        .ok_or_else(|| integrity(at, format!("string index {idx} out of range")))?;
    Ok(token_at(tables, token_idx, at)?.0)
}

fn path_at(tables: &CrateTables, idx: u32, at: u64) -> Result<Path> {
    tables
        .paths
        .get(idx as usize)
        .cloned()
        .ok_or_else(|| integrity(at, format!("path index {idx} out of range")))
}

fn bytes_at<'t>(tables: &'t CrateTables, offset: u64, len: usize) -> Result<&'t [u8]> {
    let start = offset as usize;
    tables
        .values_data
        .get(start..start + len)
        .ok_or_else(|| integrity(offset, format!("value read of {len} byte(s) out of range")))
}

fn scalar_size(base: &str) -> Option<usize> {
    Some(match base {
        "bool" => 1,
        "half" => 2,
        "int" | "uint" | "float" | "string" | "token" | "asset" | "path" => 4,
        "int64" | "uint64" | "double" => 8,
        "half2" => 4,
        "half3" => 6,
        "half4" | "quath" | "color4h" | "texCoord4h" => 8,
        "color3h" | "point3h" | "normal3h" | "vector3h" | "texCoord3h" => 6,
        "texCoord2h" => 4,
        "int2" | "float2" | "texCoord2f" => 8,
        "int3" | "float3" | "color3f" | "point3f" | "normal3f" | "vector3f" | "texCoord3f" => 12,
        "int4" | "float4" | "quatf" | "color4f" | "vector4f" | "texCoord4f" => 16,
        "double2" | "texCoord2d" => 16,
        "double3" | "color3d" | "point3d" | "normal3d" | "vector3d" | "texCoord3d" => 24,
        "double4" | "quatd" | "color4d" | "texCoord4d" => 32,
        "matrix2d" => 32,
        "matrix3d" => 72,
        "matrix4d" => 128,
        "Reference" => 32,
        _ => return None,
    })
}

fn read_f16s<const N: usize>(bytes: &[u8]) -> [f16; N] {
    std::array::from_fn(|i| {
        f16::from_bits(u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]))
    })
}

fn read_f32s<const N: usize>(bytes: &[u8]) -> [f32; N] {
    std::array::from_fn(|i| pod_read_unaligned::<f32>(&bytes[4 * i..4 * i + 4]))
}

fn read_f64s<const N: usize>(bytes: &[u8]) -> [f64; N] {
    std::array::from_fn(|i| pod_read_unaligned::<f64>(&bytes[8 * i..8 * i + 8]))
}

fn read_i32s<const N: usize>(bytes: &[u8]) -> [i32; N] {
    std::array::from_fn(|i| pod_read_unaligned::<i32>(&bytes[4 * i..4 * i + 4]))
}

fn read_matrix<const N: usize>(bytes: &[u8]) -> [[f64; N]; N] {
    std::array::from_fn(|r| read_f64s::<N>(&bytes[r * N * 8..]))
}

/// Decode one fixed-size element of `base` type starting at `bytes`.
fn decode_scalar(tables: &CrateTables, base: &str, bytes: &[u8], at: u64) -> Result<Value> {
    let v = match base {
        "bool" => Value::Bool(bytes[0] != 0),
        "int" => Value::Int(pod_read_unaligned(&bytes[..4])),
        "uint" => Value::Uint(pod_read_unaligned(&bytes[..4])),
        "int64" => Value::Int64(pod_read_unaligned(&bytes[..8])),
        "uint64" => Value::Uint64(pod_read_unaligned(&bytes[..8])),
        "half" => Value::Half(f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]))),
        "float" => Value::Float(pod_read_unaligned(&bytes[..4])),
        "double" => Value::Double(pod_read_unaligned(&bytes[..8])),
        "token" => Value::TokenVal(token_at(tables, pod_read_unaligned::<u32>(&bytes[..4]), at)?),
        "string" => Value::String(string_at(tables, pod_read_unaligned::<u32>(&bytes[..4]), at)?),
        "asset" => Value::Asset(AssetPath::new(
            token_at(tables, pod_read_unaligned::<u32>(&bytes[..4]), at)?.0,
        )),
        "path" => Value::PathVal(path_at(tables, pod_read_unaligned::<u32>(&bytes[..4]), at)?),
        "int2" => Value::Int2(read_i32s(bytes)),
        "int3" => Value::Int3(read_i32s(bytes)),
        "int4" => Value::Int4(read_i32s(bytes)),
        "half2" => Value::Half2(read_f16s(bytes)),
        "half3" => Value::Half3(read_f16s(bytes)),
        "half4" => Value::Half4(read_f16s(bytes)),
        "float2" => Value::Float2(read_f32s(bytes)),
        "float3" => Value::Float3(read_f32s(bytes)),
        "float4" => Value::Float4(read_f32s(bytes)),
        "double2" => Value::Double2(read_f64s(bytes)),
        "double3" => Value::Double3(read_f64s(bytes)),
        "double4" => Value::Double4(read_f64s(bytes)),
        "quath" => Value::QuathVal(Quath(read_f16s(bytes))),
        "quatf" => Value::QuatfVal(Quatf(read_f32s(bytes))),
        "quatd" => Value::QuatdVal(Quatd(read_f64s(bytes))),
        "matrix2d" => Value::Matrix2dVal(Matrix2d(read_matrix(bytes))),
        "matrix3d" => Value::Matrix3dVal(Matrix3d(read_matrix(bytes))),
        "matrix4d" => Value::Matrix4dVal(Matrix4d(read_matrix(bytes))),
        "color3h" => Value::Color3hVal(Color3h(read_f16s(bytes))),
        "color3f" => Value::Color3fVal(Color3f(read_f32s(bytes))),
        "color3d" => Value::Color3dVal(Color3d(read_f64s(bytes))),
        "color4h" => Value::Color4hVal(Color4h(read_f16s(bytes))),
        "color4f" => Value::Color4fVal(Color4f(read_f32s(bytes))),
        "color4d" => Value::Color4dVal(Color4d(read_f64s(bytes))),
        "point3h" => Value::Point3hVal(Point3h(read_f16s(bytes))),
        "point3f" => Value::Point3fVal(Point3f(read_f32s(bytes))),
        "point3d" => Value::Point3dVal(Point3d(read_f64s(bytes))),
        "normal3h" => Value::Normal3hVal(Normal3h(read_f16s(bytes))),
        "normal3f" => Value::Normal3fVal(Normal3f(read_f32s(bytes))),
        "normal3d" => Value::Normal3dVal(Normal3d(read_f64s(bytes))),
        "vector3h" => Value::Vector3hVal(Vector3h(read_f16s(bytes))),
        "vector3f" => Value::Vector3fVal(Vector3f(read_f32s(bytes))),
        "vector3d" => Value::Vector3dVal(Vector3d(read_f64s(bytes))),
        "vector4f" => Value::Vector4fVal(Vector4f(read_f32s(bytes))),
        "texCoord2h" => Value::TexCoord2hVal(TexCoord2h(read_f16s(bytes))),
        "texCoord3h" => Value::TexCoord3hVal(TexCoord3h(read_f16s(bytes))),
        "texCoord4h" => Value::TexCoord4hVal(TexCoord4h(read_f16s(bytes))),
        "texCoord2f" => Value::TexCoord2fVal(TexCoord2f(read_f32s(bytes))),
        "texCoord3f" => Value::TexCoord3fVal(TexCoord3f(read_f32s(bytes))),
        "texCoord4f" => Value::TexCoord4fVal(TexCoord4f(read_f32s(bytes))),
        "texCoord2d" => Value::TexCoord2dVal(TexCoord2d(read_f64s(bytes))),
        "texCoord3d" => Value::TexCoord3dVal(TexCoord3d(read_f64s(bytes))),
        "texCoord4d" => Value::TexCoord4dVal(TexCoord4d(read_f64s(bytes))),
        "Reference" => Value::ReferenceVal(decode_reference(tables, bytes, at)?),
        other => {
            return Err(integrity(at, format!("non-decodable element type `{other}`")));
        }
    };
    Ok(v)
}

/// `u32 asset_token, u32 path_index (MAX = none), f64 offset, f64 scale,
/// u8 triple, 7 pad` = 32 bytes.
fn decode_reference(tables: &CrateTables, bytes: &[u8], at: u64) -> Result<Reference> {
    let asset_token: u32 = pod_read_unaligned(&bytes[0..4]);
    let path_index: u32 = pod_read_unaligned(&bytes[4..8]);
    let offset: f64 = pod_read_unaligned(&bytes[8..16]);
    let scale: f64 = pod_read_unaligned(&bytes[16..24]);
    let triple = bytes[24] != 0;

    let asset = token_at(tables, asset_token, at)?.0;
    let prim_path = if path_index == u32::MAX {
        None
    } else {
        Some(path_at(tables, path_index, at)?)
    };
    let layer_offset = if offset != 0.0 || scale != 1.0 {
        Some(LayerOffset { offset, scale })
    } else {
        None
    };
    Ok(Reference {
        asset_path: if triple {
            AssetPath::triple(asset)
        } else {
            AssetPath::new(asset)
        },
        prim_path,
        layer_offset,
    })
}

fn decode_inlined(tables: &CrateTables, rep: ValueRep, base: &str) -> Result<Value> {
    let payload = rep.payload();
    let v = match base {
        "bool" => Value::Bool(payload != 0),
        // Sign-extend the 28-bit payload.
        "int" => Value::Int((((payload << 36) as i64) >> 36) as i32),
        "uint" => Value::Uint(payload as u32),
        "half" => Value::Half(f16::from_bits(payload as u16)),
        "token" => Value::TokenVal(token_at(tables, payload as u32, 0)?),
        "string" => Value::String(string_at(tables, payload as u32, 0)?),
        "asset" => Value::Asset(AssetPath::new(token_at(tables, payload as u32, 0)?.0)),
        "path" => Value::PathVal(path_at(tables, payload as u32, 0)?),
        other => {
            return Err(integrity(0, format!("type `{other}` cannot be inlined")));
        }
    };
    Ok(v)
}

/// Decode a value rep against the loaded tables.
pub(super) fn decode_value(tables: &CrateTables, rep: ValueRep, depth: u32) -> Result<Value> {
    if depth > MAX_DICT_NEST {
        return Err(integrity(0, "value nesting too deep"));
    }
    if rep.0 == 0 {
        return Ok(Value::Block);
    }
    let name = type_name_of(rep)?;
    let base = name.strip_suffix("[]").unwrap_or(name);

    if base == "dictionary" {
        return decode_dictionary(tables, rep, depth);
    }

    if rep.is_inlined() {
        if rep.is_array() {
            return Err(integrity(0, "arrays cannot be inlined"));
        }
        return decode_inlined(tables, rep, base);
    }

    if !rep.is_payload_offset() {
        return Err(integrity(
            0,
            "value rep is neither inlined nor an offset".to_string(),
        ));
    }

    let offset = rep.payload();
    if !rep.is_array() {
        let size = scalar_size(base)
            .ok_or_else(|| integrity(offset, format!("unsized scalar type `{base}`")))?;
        let bytes = bytes_at(tables, offset, size)?;
        return decode_scalar(tables, base, bytes, offset);
    }

    // Array: u64 count, then either raw fixed-size elements or a
    // compressed-int block for the integer families.
    let header = bytes_at(tables, offset, 8)?;
    let count = u64::from_le_bytes(header.try_into().unwrap()) as usize;
    if count > tables.values_data.len() {
        return Err(integrity(offset, format!("array count {count} out of range")));
    }
    let body_offset = offset + 8;

    if rep.is_compressed() {
        let width = match base {
            "int" | "uint" => IntWidth::W32,
            "int64" | "uint64" => IntWidth::W64,
            other => {
                return Err(integrity(
                    body_offset,
                    format!("compressed arrays unsupported for `{other}`"),
                ));
            }
        };
        let tail = &tables.values_data[body_offset as usize..];
        let (ints, _consumed) = coding::read_compressed_ints(tail, count, width)
            .map_err(|e| integrity(body_offset, e.0))?;
        return Ok(match base {
            "int" => Value::IntArray(ints.iter().map(|&x| x as i32).collect()),
            "uint" => Value::UintArray(ints.iter().map(|&x| x as u32).collect()),
            "int64" => Value::Int64Array(ints),
            _ => Value::Uint64Array(ints.iter().map(|&x| x as u64).collect()),
        });
    }

    let elem_size = scalar_size(base)
        .ok_or_else(|| integrity(offset, format!("unsized element type `{base}`")))?;
    let bytes = bytes_at(tables, body_offset, count * elem_size)?;
    let mut elems = Vec::with_capacity(count);
    for i in 0..count {
        let at = body_offset + (i * elem_size) as u64;
        elems.push(decode_scalar(tables, base, &bytes[i * elem_size..], at)?);
    }
    collect_array(name, elems, offset)
}

/// `u64 count`, then per entry `u32 name_token, 4 pad, u64 rep`.
fn decode_dictionary(tables: &CrateTables, rep: ValueRep, depth: u32) -> Result<Value> {
    let offset = rep.payload();
    let header = bytes_at(tables, offset, 8)?;
    let count = u64::from_le_bytes(header.try_into().unwrap()) as usize;
    let body = bytes_at(tables, offset + 8, count * 16)?;

    let mut dict = Dictionary::new();
    for i in 0..count {
        let entry = &body[i * 16..(i + 1) * 16];
        let name_idx: u32 = pod_read_unaligned(&entry[0..4]);
        let nested = ValueRep(pod_read_unaligned::<u64>(&entry[8..16]));
        let name = token_at(tables, name_idx, offset)?.0;
        let value = decode_value(tables, nested, depth + 1)?;
        let type_name = if value.is_block() {
            "None".to_string()
        } else {
            value.type_name().to_string()
        };
        dict.insert(
            name.clone(),
            MetaVariable {
                name,
                type_name,
                value,
            },
        );
    }
    Ok(Value::DictionaryVal(dict))
}

/// `u64 count`, then per sample `f64 time, u64 rep`.
pub(super) fn decode_time_samples(tables: &CrateTables, rep: ValueRep) -> Result<TimeSamples> {
    let offset = rep.payload();
    let header = bytes_at(tables, offset, 8)?;
    let count = u64::from_le_bytes(header.try_into().unwrap()) as usize;
    let body = bytes_at(tables, offset + 8, count * 16)?;

    let mut ts = TimeSamples::new();
    for i in 0..count {
        let entry = &body[i * 16..(i + 1) * 16];
        let time: f64 = pod_read_unaligned(&entry[0..8]);
        let nested = ValueRep(pod_read_unaligned::<u64>(&entry[8..16]));
        ts.add(time, decode_value(tables, nested, 0)?);
    }
    Ok(ts)
}

/// Re-assemble decoded scalars into the matching typed array value.
fn collect_array(name: &str, elems: Vec<Value>, at: u64) -> Result<Value> {
    macro_rules! collect {
        ($array:ident, $scalar:ident) => {{
            let mut out = Vec::with_capacity(elems.len());
            for e in elems {
                match e {
                    Value::$scalar(x) => out.push(x),
                    _ => return Err(integrity(at, "mixed element types in array")),
                }
            }
            Value::$array(out)
        }};
    }
    let v = match name.strip_suffix("[]").unwrap_or(name) {
        "bool" => collect!(BoolArray, Bool),
        "int" => collect!(IntArray, Int),
        "int64" => collect!(Int64Array, Int64),
        "uint" => collect!(UintArray, Uint),
        "uint64" => collect!(Uint64Array, Uint64),
        "half" => collect!(HalfArray, Half),
        "float" => collect!(FloatArray, Float),
        "double" => collect!(DoubleArray, Double),
        "string" => collect!(StringArray, String),
        "token" => collect!(TokenArray, TokenVal),
        "asset" => collect!(AssetArray, Asset),
        "path" => collect!(PathArray, PathVal),
        "int2" => collect!(Int2Array, Int2),
        "int3" => collect!(Int3Array, Int3),
        "int4" => collect!(Int4Array, Int4),
        "half2" => collect!(Half2Array, Half2),
        "half3" => collect!(Half3Array, Half3),
        "half4" => collect!(Half4Array, Half4),
        "float2" => collect!(Float2Array, Float2),
        "float3" => collect!(Float3Array, Float3),
        "float4" => collect!(Float4Array, Float4),
        "double2" => collect!(Double2Array, Double2),
        "double3" => collect!(Double3Array, Double3),
        "double4" => collect!(Double4Array, Double4),
        "quath" => collect!(QuathArray, QuathVal),
        "quatf" => collect!(QuatfArray, QuatfVal),
        "quatd" => collect!(QuatdArray, QuatdVal),
        "matrix2d" => collect!(Matrix2dArray, Matrix2dVal),
        "matrix3d" => collect!(Matrix3dArray, Matrix3dVal),
        "matrix4d" => collect!(Matrix4dArray, Matrix4dVal),
        "color3h" => collect!(Color3hArray, Color3hVal),
        "color3f" => collect!(Color3fArray, Color3fVal),
        "color3d" => collect!(Color3dArray, Color3dVal),
        "color4h" => collect!(Color4hArray, Color4hVal),
        "color4f" => collect!(Color4fArray, Color4fVal),
        "color4d" => collect!(Color4dArray, Color4dVal),
        "point3h" => collect!(Point3hArray, Point3hVal),
        "point3f" => collect!(Point3fArray, Point3fVal),
        "point3d" => collect!(Point3dArray, Point3dVal),
        "normal3h" => collect!(Normal3hArray, Normal3hVal),
        "normal3f" => collect!(Normal3fArray, Normal3fVal),
        "normal3d" => collect!(Normal3dArray, Normal3dVal),
        "vector3h" => collect!(Vector3hArray, Vector3hVal),
        "vector3f" => collect!(Vector3fArray, Vector3fVal),
        "vector3d" => collect!(Vector3dArray, Vector3dVal),
        "vector4f" => collect!(Vector4fArray, Vector4fVal),
        "texCoord2h" => collect!(TexCoord2hArray, TexCoord2hVal),
        "texCoord3h" => collect!(TexCoord3hArray, TexCoord3hVal),
        "texCoord4h" => collect!(TexCoord4hArray, TexCoord4hVal),
        "texCoord2f" => collect!(TexCoord2fArray, TexCoord2fVal),
        "texCoord3f" => collect!(TexCoord3fArray, TexCoord3fVal),
        "texCoord4f" => collect!(TexCoord4fArray, TexCoord4fVal),
        "texCoord2d" => collect!(TexCoord2dArray, TexCoord2dVal),
        "texCoord3d" => collect!(TexCoord3dArray, TexCoord3dVal),
        "texCoord4d" => collect!(TexCoord4dArray, TexCoord4dVal),
        "Reference" => collect!(ReferenceArray, ReferenceVal),
        other => return Err(integrity(at, format!("unsupported array type `{other}`"))),
    };
    Ok(v)
}
