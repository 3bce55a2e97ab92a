//! The typed value system: a closed sum type over every USD scalar/array
//! type, the type-name registry, typed extraction, `TimeSamples` and
//! dictionaries.

pub(crate) mod print;

use std::collections::BTreeMap;
use std::fmt;

use half::f16;

pub use print::usda_value_string;

// ---------------------------------------------------------------------------
// Leaf payload types
// ---------------------------------------------------------------------------

/// Interned-style short string compared by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Token(pub String);

impl Token {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An `@...@` or `@@@...@@@` delimited asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AssetPath {
    pub path: String,
    /// True when the authored form used the triple-`@` delimiter.
    pub triple_delimited: bool,
}

impl AssetPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            triple_delimited: false,
        }
    }

    pub fn triple(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            triple_delimited: true,
        }
    }
}

/// Time scaling applied to a referenced layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerOffset {
    pub offset: f64,
    pub scale: f64,
}

impl Default for LayerOffset {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
        }
    }
}

/// A `references`/`payload` arc target.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reference {
    pub asset_path: AssetPath,
    pub prim_path: Option<crate::path::Path>,
    pub layer_offset: Option<LayerOffset>,
}

macro_rules! role_newtype {
    ($(#[$doc:meta])* $name:ident, $inner:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name(pub $inner);
    };
}

role_newtype!(Quath, [f16; 4]);
role_newtype!(Quatf, [f32; 4]);
role_newtype!(Quatd, [f64; 4]);
role_newtype!(
    /// Row-major 2x2 double matrix.
    Matrix2d,
    [[f64; 2]; 2]
);
role_newtype!(Matrix3d, [[f64; 3]; 3]);
role_newtype!(Matrix4d, [[f64; 4]; 4]);
role_newtype!(Color3h, [f16; 3]);
role_newtype!(Color3f, [f32; 3]);
role_newtype!(Color3d, [f64; 3]);
role_newtype!(Color4h, [f16; 4]);
role_newtype!(Color4f, [f32; 4]);
role_newtype!(Color4d, [f64; 4]);
role_newtype!(Point3h, [f16; 3]);
role_newtype!(Point3f, [f32; 3]);
role_newtype!(Point3d, [f64; 3]);
role_newtype!(Normal3h, [f16; 3]);
role_newtype!(Normal3f, [f32; 3]);
role_newtype!(Normal3d, [f64; 3]);
role_newtype!(Vector3h, [f16; 3]);
role_newtype!(Vector3f, [f32; 3]);
role_newtype!(Vector3d, [f64; 3]);
role_newtype!(Vector4f, [f32; 4]);
role_newtype!(TexCoord2h, [f16; 2]);
role_newtype!(TexCoord3h, [f16; 3]);
role_newtype!(TexCoord4h, [f16; 4]);
role_newtype!(TexCoord2f, [f32; 2]);
role_newtype!(TexCoord3f, [f32; 3]);
role_newtype!(TexCoord4f, [f32; 4]);
role_newtype!(TexCoord2d, [f64; 2]);
role_newtype!(TexCoord3d, [f64; 3]);
role_newtype!(TexCoord4d, [f64; 4]);

/// A named, typed metadata variable (dictionary entry).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaVariable {
    pub name: String,
    /// Canonical type name, `[]`-suffixed for arrays.
    pub type_name: String,
    pub value: Value,
}

/// Ordered string-keyed metadata map.
pub type Dictionary = BTreeMap<String, MetaVariable>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Declares the closed `Value` sum type plus the type registry and the typed
/// extraction impls in one place. Every entry is
/// `(Variant, payload type, canonical name, registry id, is-array)`.
macro_rules! declare_values {
    ($(($variant:ident, $ty:ty, $name:literal, $id:literal, $array:literal)),+ $(,)?) => {
        #[derive(Debug, Clone, PartialEq, Default)]
        pub enum Value {
            /// Authored erase (`None` in USDA).
            #[default]
            Block,
            $($variant($ty)),+
        }

        impl Value {
            /// Canonical USD type name, `[]`-suffixed for arrays.
            pub fn type_name(&self) -> &'static str {
                match self {
                    Value::Block => "ValueBlock",
                    $(Value::$variant(_) => $name),+
                }
            }

            /// Registry id of the scalar element type.
            pub fn type_id(&self) -> u32 {
                match self {
                    Value::Block => 0,
                    $(Value::$variant(_) => $id),+
                }
            }

            pub fn is_array(&self) -> bool {
                match self {
                    Value::Block => false,
                    $(Value::$variant(_) => $array),+
                }
            }
        }

        $(
            impl ValueType for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_value(v: &Value) -> Option<&Self> {
                    match v {
                        Value::$variant(x) => Some(x),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }
        )+

        /// `(canonical name, id, is_array)` for every registered type.
        pub const TYPE_REGISTRY: &[(&str, u32, bool)] = &[
            $(($name, $id, $array)),+
        ];
    };
}

/// Typed payloads that can be stored in and extracted from a [`Value`].
pub trait ValueType: Sized {
    const TYPE_NAME: &'static str;

    fn from_value(v: &Value) -> Option<&Self>;
    fn into_value(self) -> Value;
}

declare_values! {
    (Bool, bool, "bool", 1, false),
    (Int, i32, "int", 2, false),
    (Int64, i64, "int64", 3, false),
    (Uint, u32, "uint", 4, false),
    (Uint64, u64, "uint64", 5, false),
    (Half, f16, "half", 6, false),
    (Float, f32, "float", 7, false),
    (Double, f64, "double", 8, false),
    (String, String, "string", 9, false),
    (TokenVal, Token, "token", 10, false),
    (Asset, AssetPath, "asset", 11, false),
    (Int2, [i32; 2], "int2", 12, false),
    (Int3, [i32; 3], "int3", 13, false),
    (Int4, [i32; 4], "int4", 14, false),
    (Half2, [f16; 2], "half2", 15, false),
    (Half3, [f16; 3], "half3", 16, false),
    (Half4, [f16; 4], "half4", 17, false),
    (Float2, [f32; 2], "float2", 18, false),
    (Float3, [f32; 3], "float3", 19, false),
    (Float4, [f32; 4], "float4", 20, false),
    (Double2, [f64; 2], "double2", 21, false),
    (Double3, [f64; 3], "double3", 22, false),
    (Double4, [f64; 4], "double4", 23, false),
    (QuathVal, Quath, "quath", 24, false),
    (QuatfVal, Quatf, "quatf", 25, false),
    (QuatdVal, Quatd, "quatd", 26, false),
    (Matrix2dVal, Matrix2d, "matrix2d", 27, false),
    (Matrix3dVal, Matrix3d, "matrix3d", 28, false),
    (Matrix4dVal, Matrix4d, "matrix4d", 29, false),
    (Color3hVal, Color3h, "color3h", 30, false),
    (Color3fVal, Color3f, "color3f", 31, false),
    (Color3dVal, Color3d, "color3d", 32, false),
    (Color4hVal, Color4h, "color4h", 33, false),
    (Color4fVal, Color4f, "color4f", 34, false),
    (Color4dVal, Color4d, "color4d", 35, false),
    (Point3hVal, Point3h, "point3h", 36, false),
    (Point3fVal, Point3f, "point3f", 37, false),
    (Point3dVal, Point3d, "point3d", 38, false),
    (Normal3hVal, Normal3h, "normal3h", 39, false),
    (Normal3fVal, Normal3f, "normal3f", 40, false),
    (Normal3dVal, Normal3d, "normal3d", 41, false),
    (Vector3hVal, Vector3h, "vector3h", 42, false),
    (Vector3fVal, Vector3f, "vector3f", 43, false),
    (Vector3dVal, Vector3d, "vector3d", 44, false),
    (Vector4fVal, Vector4f, "vector4f", 45, false),
    (TexCoord2hVal, TexCoord2h, "texCoord2h", 46, false),
    (TexCoord3hVal, TexCoord3h, "texCoord3h", 47, false),
    (TexCoord4hVal, TexCoord4h, "texCoord4h", 48, false),
    (TexCoord2fVal, TexCoord2f, "texCoord2f", 49, false),
    (TexCoord3fVal, TexCoord3f, "texCoord3f", 50, false),
    (TexCoord4fVal, TexCoord4f, "texCoord4f", 51, false),
    (TexCoord2dVal, TexCoord2d, "texCoord2d", 52, false),
    (TexCoord3dVal, TexCoord3d, "texCoord3d", 53, false),
    (TexCoord4dVal, TexCoord4d, "texCoord4d", 54, false),
    (PathVal, crate::path::Path, "path", 55, false),
    (ReferenceVal, Reference, "Reference", 56, false),
    (DictionaryVal, Dictionary, "dictionary", 57, false),
    (BoolArray, Vec<bool>, "bool[]", 1, true),
    (IntArray, Vec<i32>, "int[]", 2, true),
    (Int64Array, Vec<i64>, "int64[]", 3, true),
    (UintArray, Vec<u32>, "uint[]", 4, true),
    (Uint64Array, Vec<u64>, "uint64[]", 5, true),
    (HalfArray, Vec<f16>, "half[]", 6, true),
    (FloatArray, Vec<f32>, "float[]", 7, true),
    (DoubleArray, Vec<f64>, "double[]", 8, true),
    (StringArray, Vec<String>, "string[]", 9, true),
    (TokenArray, Vec<Token>, "token[]", 10, true),
    (AssetArray, Vec<AssetPath>, "asset[]", 11, true),
    (Int2Array, Vec<[i32; 2]>, "int2[]", 12, true),
    (Int3Array, Vec<[i32; 3]>, "int3[]", 13, true),
    (Int4Array, Vec<[i32; 4]>, "int4[]", 14, true),
    (Half2Array, Vec<[f16; 2]>, "half2[]", 15, true),
    (Half3Array, Vec<[f16; 3]>, "half3[]", 16, true),
    (Half4Array, Vec<[f16; 4]>, "half4[]", 17, true),
    (Float2Array, Vec<[f32; 2]>, "float2[]", 18, true),
    (Float3Array, Vec<[f32; 3]>, "float3[]", 19, true),
    (Float4Array, Vec<[f32; 4]>, "float4[]", 20, true),
    (Double2Array, Vec<[f64; 2]>, "double2[]", 21, true),
    (Double3Array, Vec<[f64; 3]>, "double3[]", 22, true),
    (Double4Array, Vec<[f64; 4]>, "double4[]", 23, true),
    (QuathArray, Vec<Quath>, "quath[]", 24, true),
    (QuatfArray, Vec<Quatf>, "quatf[]", 25, true),
    (QuatdArray, Vec<Quatd>, "quatd[]", 26, true),
    (Matrix2dArray, Vec<Matrix2d>, "matrix2d[]", 27, true),
    (Matrix3dArray, Vec<Matrix3d>, "matrix3d[]", 28, true),
    (Matrix4dArray, Vec<Matrix4d>, "matrix4d[]", 29, true),
    (Color3hArray, Vec<Color3h>, "color3h[]", 30, true),
    (Color3fArray, Vec<Color3f>, "color3f[]", 31, true),
    (Color3dArray, Vec<Color3d>, "color3d[]", 32, true),
    (Color4hArray, Vec<Color4h>, "color4h[]", 33, true),
    (Color4fArray, Vec<Color4f>, "color4f[]", 34, true),
    (Color4dArray, Vec<Color4d>, "color4d[]", 35, true),
    (Point3hArray, Vec<Point3h>, "point3h[]", 36, true),
    (Point3fArray, Vec<Point3f>, "point3f[]", 37, true),
    (Point3dArray, Vec<Point3d>, "point3d[]", 38, true),
    (Normal3hArray, Vec<Normal3h>, "normal3h[]", 39, true),
    (Normal3fArray, Vec<Normal3f>, "normal3f[]", 40, true),
    (Normal3dArray, Vec<Normal3d>, "normal3d[]", 41, true),
    (Vector3hArray, Vec<Vector3h>, "vector3h[]", 42, true),
    (Vector3fArray, Vec<Vector3f>, "vector3f[]", 43, true),
    (Vector3dArray, Vec<Vector3d>, "vector3d[]", 44, true),
    (Vector4fArray, Vec<Vector4f>, "vector4f[]", 45, true),
    (TexCoord2hArray, Vec<TexCoord2h>, "texCoord2h[]", 46, true),
    (TexCoord3hArray, Vec<TexCoord3h>, "texCoord3h[]", 47, true),
    (TexCoord4hArray, Vec<TexCoord4h>, "texCoord4h[]", 48, true),
    (TexCoord2fArray, Vec<TexCoord2f>, "texCoord2f[]", 49, true),
    (TexCoord3fArray, Vec<TexCoord3f>, "texCoord3f[]", 50, true),
    (TexCoord4fArray, Vec<TexCoord4f>, "texCoord4f[]", 51, true),
    (TexCoord2dArray, Vec<TexCoord2d>, "texCoord2d[]", 52, true),
    (TexCoord3dArray, Vec<TexCoord3d>, "texCoord3d[]", 53, true),
    (TexCoord4dArray, Vec<TexCoord4d>, "texCoord4d[]", 54, true),
    (PathArray, Vec<crate::path::Path>, "path[]", 55, true),
    (ReferenceArray, Vec<Reference>, "Reference[]", 56, true),
}

impl Value {
    pub fn is_block(&self) -> bool {
        matches!(self, Value::Block)
    }

    /// Typed borrow; `None` when the payload is of a different type.
    pub fn get<T: ValueType>(&self) -> Option<&T> {
        T::from_value(self)
    }

    pub fn new<T: ValueType>(v: T) -> Value {
        v.into_value()
    }

    /// Type name with any `[]` suffix removed.
    pub fn element_type_name(&self) -> &'static str {
        let name = self.type_name();
        name.strip_suffix("[]").unwrap_or(name)
    }

    /// Erase the payload to an authored block.
    pub fn block_out(&mut self) {
        *self = Value::Block;
    }
}

/// Look up `(id, is_array)` for a canonical type name.
pub fn lookup_type(name: &str) -> Option<(u32, bool)> {
    TYPE_REGISTRY
        .iter()
        .find(|(n, ..)| *n == name)
        .map(|&(_, id, array)| (id, array))
}

/// Look up the canonical name for `(id, is_array)`.
pub fn type_name_for(id: u32, array: bool) -> Option<&'static str> {
    TYPE_REGISTRY
        .iter()
        .find(|&&(_, i, a)| i == id && a == array)
        .map(|&(n, ..)| n)
}

/// Whether `name` (sans `[]`) is a registered attribute type usable in USDA.
pub fn is_registered_type_name(name: &str) -> bool {
    let base = name.strip_suffix("[]").unwrap_or(name);
    TYPE_REGISTRY.iter().any(|(n, _, array)| *n == base && !array)
}

// ---------------------------------------------------------------------------
// TimeSamples
// ---------------------------------------------------------------------------

/// Ordered map from f64 timecode to value. NaN and the infinities are legal
/// keys; ordering uses IEEE-754 total order, so iteration is deterministic
/// for every input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSamples {
    samples: Vec<(f64, Value)>,
}

impl TimeSamples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sample, keeping ascending time order. An existing sample at
    /// the same (total-order) time is replaced.
    pub fn add(&mut self, time: f64, value: Value) {
        match self
            .samples
            .binary_search_by(|(t, _)| t.total_cmp(&time))
        {
            Ok(i) => self.samples[i].1 = value,
            Err(i) => self.samples.insert(i, (time, value)),
        }
    }

    pub fn get(&self, time: f64) -> Option<&Value> {
        self.samples
            .binary_search_by(|(t, _)| t.total_cmp(&time))
            .ok()
            .map(|i| &self.samples[i].1)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in ascending time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Value)> {
        self.samples.iter().map(|(t, v)| (*t, v))
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(t, _)| *t)
    }

    /// Element type name of the first non-blocked sample, if any.
    pub fn element_type_name(&self) -> Option<&'static str> {
        self.samples
            .iter()
            .find(|(_, v)| !v.is_block())
            .map(|(_, v)| v.element_type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_and_ids() {
        let v = Value::Float3([1.0, 2.0, 3.0]);
        assert_eq!(v.type_name(), "float3");
        assert!(!v.is_array());

        let v = Value::Point3fArray(vec![Point3f([0.0; 3])]);
        assert_eq!(v.type_name(), "point3f[]");
        assert_eq!(v.element_type_name(), "point3f");
        assert!(v.is_array());

        assert_eq!(lookup_type("texCoord2f"), Some((49, false)));
        assert_eq!(type_name_for(49, true), Some("texCoord2f[]"));
        assert!(is_registered_type_name("double3[]"));
        assert!(!is_registered_type_name("float5"));

        // Role vectors exist at every width, like texCoords.
        for name in ["point3h", "point3d", "normal3h", "normal3d", "vector3h", "vector3d"] {
            assert!(is_registered_type_name(name), "missing `{name}`");
        }
        assert_eq!(
            Value::Point3dVal(Point3d([0.0; 3])).type_name(),
            "point3d"
        );
        assert_eq!(
            Value::Normal3hArray(vec![Normal3h([f16::ZERO; 3])]).element_type_name(),
            "normal3h"
        );
    }

    #[test]
    fn typed_extraction() {
        let v = Value::Double3([1.0, 2.0, 3.0]);
        assert_eq!(v.get::<[f64; 3]>(), Some(&[1.0, 2.0, 3.0]));
        assert_eq!(v.get::<[f32; 3]>(), None);

        let v = Value::new(Color3f([0.5, 0.5, 0.5]));
        assert_eq!(v.type_name(), "color3f");
        assert!(v.get::<Color3f>().is_some());
        // Same payload shape, different role type.
        assert!(v.get::<Point3f>().is_none());
    }

    #[test]
    fn value_equality_requires_matching_type() {
        let a = Value::Float(1.0);
        let b = Value::Double(1.0);
        assert_ne!(a, b);
        assert_eq!(a, Value::Float(1.0));
    }

    #[test]
    fn time_samples_stay_ordered() {
        let mut ts = TimeSamples::new();
        ts.add(10.0, Value::Float(2.0));
        ts.add(0.0, Value::Float(1.0));
        ts.add(20.0, Value::Block);
        let times: Vec<f64> = ts.times().collect();
        assert_eq!(times, vec![0.0, 10.0, 20.0]);

        // Replacement, not duplication.
        ts.add(10.0, Value::Float(5.0));
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.get(10.0), Some(&Value::Float(5.0)));
    }

    #[test]
    fn time_samples_accept_non_finite_keys() {
        let mut ts = TimeSamples::new();
        ts.add(f64::INFINITY, Value::Int(3));
        ts.add(f64::NEG_INFINITY, Value::Int(1));
        ts.add(0.0, Value::Int(2));
        ts.add(f64::NAN, Value::Int(4));
        let times: Vec<f64> = ts.times().collect();
        assert_eq!(times[0], f64::NEG_INFINITY);
        assert_eq!(times[1], 0.0);
        assert_eq!(times[2], f64::INFINITY);
        assert!(times[3].is_nan());
        assert_eq!(ts.element_type_name(), Some("int"));
    }
}
