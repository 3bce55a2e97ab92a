//! USDA textual form of a [`Value`].

use half::f16;

use super::{AssetPath, Dictionary, Reference, Value};
use crate::strutil;

fn fmt_f64(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x == f64::INFINITY {
        "inf".to_string()
    } else if x == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{x}")
    }
}

fn fmt_f32(x: f32) -> String {
    fmt_f64(f64::from(x))
}

fn fmt_f16(x: f16) -> String {
    fmt_f64(f64::from(x))
}

fn tuple<T, F: Fn(&T) -> String>(xs: &[T], f: F) -> String {
    let inner: Vec<String> = xs.iter().map(|x| f(x)).collect();
    format!("({})", inner.join(", "))
}

fn array<T, F: Fn(&T) -> String>(xs: &[T], f: F) -> String {
    let inner: Vec<String> = xs.iter().map(|x| f(x)).collect();
    format!("[{}]", inner.join(", "))
}

fn matrix<const N: usize>(m: &[[f64; N]; N]) -> String {
    tuple(m, |row| tuple(row, |x| fmt_f64(*x)))
}

pub(crate) fn fmt_asset(a: &AssetPath) -> String {
    if a.triple_delimited || a.path.contains('@') {
        format!("@@@{}@@@", a.path.replace("@@@", "\\@@@"))
    } else {
        format!("@{}@", a.path)
    }
}

pub(crate) fn fmt_reference(r: &Reference) -> String {
    let mut s = fmt_asset(&r.asset_path);
    if let Some(p) = &r.prim_path {
        s.push_str(&format!("<{p}>"));
    }
    if let Some(lo) = &r.layer_offset {
        let mut parts = Vec::new();
        if lo.offset != 0.0 {
            parts.push(format!("offset = {}", fmt_f64(lo.offset)));
        }
        if lo.scale != 1.0 {
            parts.push(format!("scale = {}", fmt_f64(lo.scale)));
        }
        if !parts.is_empty() {
            s.push_str(&format!(" ({})", parts.join("; ")));
        }
    }
    s
}

fn fmt_dictionary(d: &Dictionary, indent: u32) -> String {
    let pad = "    ".repeat(indent as usize + 1);
    let mut s = String::from("{\n");
    for meta in d.values() {
        if let Value::DictionaryVal(sub) = &meta.value {
            s.push_str(&format!(
                "{pad}dictionary {} = {}\n",
                meta.name,
                fmt_dictionary(sub, indent + 1)
            ));
        } else {
            s.push_str(&format!(
                "{pad}{} {} = {}\n",
                meta.type_name,
                meta.name,
                usda_value_string(&meta.value, indent + 1)
            ));
        }
    }
    s.push_str(&format!("{}}}", "    ".repeat(indent as usize)));
    s
}

/// Render a value in USDA syntax. `indent` is the indentation level of the
/// surrounding statement (dictionaries nest below it).
pub fn usda_value_string(v: &Value, indent: u32) -> String {
    match v {
        Value::Block => "None".to_string(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Int(x) => x.to_string(),
        Value::Int64(x) => x.to_string(),
        Value::Uint(x) => x.to_string(),
        Value::Uint64(x) => x.to_string(),
        Value::Half(x) => fmt_f16(*x),
        Value::Float(x) => fmt_f32(*x),
        Value::Double(x) => fmt_f64(*x),
        Value::String(s) => strutil::build_escaped_and_quoted_string(s),
        Value::TokenVal(t) => format!("\"{}\"", t.as_str()),
        Value::Asset(a) => fmt_asset(a),
        Value::Int2(v) => tuple(v, |x| x.to_string()),
        Value::Int3(v) => tuple(v, |x| x.to_string()),
        Value::Int4(v) => tuple(v, |x| x.to_string()),
        Value::Half2(v) => tuple(v, |x| fmt_f16(*x)),
        Value::Half3(v) => tuple(v, |x| fmt_f16(*x)),
        Value::Half4(v) => tuple(v, |x| fmt_f16(*x)),
        Value::Float2(v) => tuple(v, |x| fmt_f32(*x)),
        Value::Float3(v) => tuple(v, |x| fmt_f32(*x)),
        Value::Float4(v) => tuple(v, |x| fmt_f32(*x)),
        Value::Double2(v) => tuple(v, |x| fmt_f64(*x)),
        Value::Double3(v) => tuple(v, |x| fmt_f64(*x)),
        Value::Double4(v) => tuple(v, |x| fmt_f64(*x)),
        Value::QuathVal(q) => tuple(&q.0, |x| fmt_f16(*x)),
        Value::QuatfVal(q) => tuple(&q.0, |x| fmt_f32(*x)),
        Value::QuatdVal(q) => tuple(&q.0, |x| fmt_f64(*x)),
        Value::Matrix2dVal(m) => matrix(&m.0),
        Value::Matrix3dVal(m) => matrix(&m.0),
        Value::Matrix4dVal(m) => matrix(&m.0),
        Value::Color3hVal(c) => tuple(&c.0, |x| fmt_f16(*x)),
        Value::Color3fVal(c) => tuple(&c.0, |x| fmt_f32(*x)),
        Value::Color3dVal(c) => tuple(&c.0, |x| fmt_f64(*x)),
        Value::Color4hVal(c) => tuple(&c.0, |x| fmt_f16(*x)),
        Value::Color4fVal(c) => tuple(&c.0, |x| fmt_f32(*x)),
        Value::Color4dVal(c) => tuple(&c.0, |x| fmt_f64(*x)),
        Value::Point3hVal(p) => tuple(&p.0, |x| fmt_f16(*x)),
        Value::Point3fVal(p) => tuple(&p.0, |x| fmt_f32(*x)),
        Value::Point3dVal(p) => tuple(&p.0, |x| fmt_f64(*x)),
        Value::Normal3hVal(n) => tuple(&n.0, |x| fmt_f16(*x)),
        Value::Normal3fVal(n) => tuple(&n.0, |x| fmt_f32(*x)),
        Value::Normal3dVal(n) => tuple(&n.0, |x| fmt_f64(*x)),
        Value::Vector3hVal(n) => tuple(&n.0, |x| fmt_f16(*x)),
        Value::Vector3fVal(n) => tuple(&n.0, |x| fmt_f32(*x)),
        Value::Vector3dVal(n) => tuple(&n.0, |x| fmt_f64(*x)),
        Value::Vector4fVal(n) => tuple(&n.0, |x| fmt_f32(*x)),
        Value::TexCoord2hVal(t) => tuple(&t.0, |x| fmt_f16(*x)),
        Value::TexCoord3hVal(t) => tuple(&t.0, |x| fmt_f16(*x)),
        Value::TexCoord4hVal(t) => tuple(&t.0, |x| fmt_f16(*x)),
        Value::TexCoord2fVal(t) => tuple(&t.0, |x| fmt_f32(*x)),
        Value::TexCoord3fVal(t) => tuple(&t.0, |x| fmt_f32(*x)),
        Value::TexCoord4fVal(t) => tuple(&t.0, |x| fmt_f32(*x)),
        Value::TexCoord2dVal(t) => tuple(&t.0, |x| fmt_f64(*x)),
        Value::TexCoord3dVal(t) => tuple(&t.0, |x| fmt_f64(*x)),
        Value::TexCoord4dVal(t) => tuple(&t.0, |x| fmt_f64(*x)),
        Value::PathVal(p) => format!("<{p}>"),
        Value::ReferenceVal(r) => fmt_reference(r),
        Value::DictionaryVal(d) => fmt_dictionary(d, indent),
        Value::BoolArray(v) => array(v, |b| if *b { "true" } else { "false" }.to_string()),
        Value::IntArray(v) => array(v, |x| x.to_string()),
        Value::Int64Array(v) => array(v, |x| x.to_string()),
        Value::UintArray(v) => array(v, |x| x.to_string()),
        Value::Uint64Array(v) => array(v, |x| x.to_string()),
        Value::HalfArray(v) => array(v, |x| fmt_f16(*x)),
        Value::FloatArray(v) => array(v, |x| fmt_f32(*x)),
        Value::DoubleArray(v) => array(v, |x| fmt_f64(*x)),
        Value::StringArray(v) => array(v, |s| strutil::build_escaped_and_quoted_string(s)),
        Value::TokenArray(v) => array(v, |t| format!("\"{}\"", t.as_str())),
        Value::AssetArray(v) => array(v, fmt_asset),
        Value::Int2Array(v) => array(v, |x| tuple(x, |y| y.to_string())),
        Value::Int3Array(v) => array(v, |x| tuple(x, |y| y.to_string())),
        Value::Int4Array(v) => array(v, |x| tuple(x, |y| y.to_string())),
        Value::Half2Array(v) => array(v, |x| tuple(x, |y| fmt_f16(*y))),
        Value::Half3Array(v) => array(v, |x| tuple(x, |y| fmt_f16(*y))),
        Value::Half4Array(v) => array(v, |x| tuple(x, |y| fmt_f16(*y))),
        Value::Float2Array(v) => array(v, |x| tuple(x, |y| fmt_f32(*y))),
        Value::Float3Array(v) => array(v, |x| tuple(x, |y| fmt_f32(*y))),
        Value::Float4Array(v) => array(v, |x| tuple(x, |y| fmt_f32(*y))),
        Value::Double2Array(v) => array(v, |x| tuple(x, |y| fmt_f64(*y))),
        Value::Double3Array(v) => array(v, |x| tuple(x, |y| fmt_f64(*y))),
        Value::Double4Array(v) => array(v, |x| tuple(x, |y| fmt_f64(*y))),
        Value::QuathArray(v) => array(v, |q| tuple(&q.0, |y| fmt_f16(*y))),
        Value::QuatfArray(v) => array(v, |q| tuple(&q.0, |y| fmt_f32(*y))),
        Value::QuatdArray(v) => array(v, |q| tuple(&q.0, |y| fmt_f64(*y))),
        Value::Matrix2dArray(v) => array(v, |m| matrix(&m.0)),
        Value::Matrix3dArray(v) => array(v, |m| matrix(&m.0)),
        Value::Matrix4dArray(v) => array(v, |m| matrix(&m.0)),
        Value::Color3hArray(v) => array(v, |c| tuple(&c.0, |y| fmt_f16(*y))),
        Value::Color3fArray(v) => array(v, |c| tuple(&c.0, |y| fmt_f32(*y))),
        Value::Color3dArray(v) => array(v, |c| tuple(&c.0, |y| fmt_f64(*y))),
        Value::Color4hArray(v) => array(v, |c| tuple(&c.0, |y| fmt_f16(*y))),
        Value::Color4fArray(v) => array(v, |c| tuple(&c.0, |y| fmt_f32(*y))),
        Value::Color4dArray(v) => array(v, |c| tuple(&c.0, |y| fmt_f64(*y))),
        Value::Point3hArray(v) => array(v, |p| tuple(&p.0, |y| fmt_f16(*y))),
        Value::Point3fArray(v) => array(v, |p| tuple(&p.0, |y| fmt_f32(*y))),
        Value::Point3dArray(v) => array(v, |p| tuple(&p.0, |y| fmt_f64(*y))),
        Value::Normal3hArray(v) => array(v, |n| tuple(&n.0, |y| fmt_f16(*y))),
        Value::Normal3fArray(v) => array(v, |n| tuple(&n.0, |y| fmt_f32(*y))),
        Value::Normal3dArray(v) => array(v, |n| tuple(&n.0, |y| fmt_f64(*y))),
        Value::Vector3hArray(v) => array(v, |n| tuple(&n.0, |y| fmt_f16(*y))),
        Value::Vector3fArray(v) => array(v, |n| tuple(&n.0, |y| fmt_f32(*y))),
        Value::Vector3dArray(v) => array(v, |n| tuple(&n.0, |y| fmt_f64(*y))),
        Value::Vector4fArray(v) => array(v, |n| tuple(&n.0, |y| fmt_f32(*y))),
        Value::TexCoord2hArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f16(*y))),
        Value::TexCoord3hArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f16(*y))),
        Value::TexCoord4hArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f16(*y))),
        Value::TexCoord2fArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f32(*y))),
        Value::TexCoord3fArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f32(*y))),
        Value::TexCoord4fArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f32(*y))),
        Value::TexCoord2dArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f64(*y))),
        Value::TexCoord3dArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f64(*y))),
        Value::TexCoord4dArray(v) => array(v, |t| tuple(&t.0, |y| fmt_f64(*y))),
        Value::PathArray(v) => array(v, |p| format!("<{p}>")),
        Value::ReferenceArray(v) => array(v, fmt_reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Color3f, MetaVariable, Token};

    #[test]
    fn scalars() {
        assert_eq!(usda_value_string(&Value::Bool(true), 0), "true");
        assert_eq!(usda_value_string(&Value::Double(0.01), 0), "0.01");
        assert_eq!(usda_value_string(&Value::Float(f32::INFINITY), 0), "inf");
        assert_eq!(
            usda_value_string(&Value::Double(f64::NEG_INFINITY), 0),
            "-inf"
        );
        assert_eq!(usda_value_string(&Value::Double(f64::NAN), 0), "nan");
        assert_eq!(usda_value_string(&Value::Block, 0), "None");
    }

    #[test]
    fn compounds() {
        assert_eq!(
            usda_value_string(&Value::Double3([1.0, 2.0, 3.0]), 0),
            "(1, 2, 3)"
        );
        assert_eq!(
            usda_value_string(&Value::new(Color3f([0.5, 0.25, 1.0])), 0),
            "(0.5, 0.25, 1)"
        );
        assert_eq!(
            usda_value_string(
                &Value::TokenArray(vec![Token::new("xformOp:translate")]),
                0
            ),
            "[\"xformOp:translate\"]"
        );
    }

    #[test]
    fn asset_paths() {
        assert_eq!(
            usda_value_string(&Value::Asset(AssetPath::new("a.usda")), 0),
            "@a.usda@"
        );
        assert_eq!(
            usda_value_string(&Value::Asset(AssetPath::triple("has @@@ inside")), 0),
            "@@@has \\@@@ inside@@@"
        );
    }

    #[test]
    fn dictionaries_nest() {
        let mut sub = Dictionary::new();
        sub.insert(
            "x".to_string(),
            MetaVariable {
                name: "x".to_string(),
                type_name: "int".to_string(),
                value: Value::Int(3),
            },
        );
        let mut d = Dictionary::new();
        d.insert(
            "sub".to_string(),
            MetaVariable {
                name: "sub".to_string(),
                type_name: "dictionary".to_string(),
                value: Value::DictionaryVal(sub),
            },
        );
        let s = usda_value_string(&Value::DictionaryVal(d), 0);
        assert!(s.contains("dictionary sub = {"));
        assert!(s.contains("int x = 3"));
    }
}
