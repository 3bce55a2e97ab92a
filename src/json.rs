//! JSON export of layers and values, plus variant extraction.
//!
//! Backs `tusdcat --extract-variants` and gives pipelines a structured view
//! of a (possibly composed) layer without a USD parser of their own.

use serde_json::{Map, Value as Json, json};

use crate::layer::{Layer, PrimSpec, PrimVar, Property, RelTargets};
use crate::value::{Dictionary, Value};

fn f64_json(x: f64) -> Json {
    // JSON has no non-finite numbers; fall back to their spelled forms.
    serde_json::Number::from_f64(x)
        .map(Json::Number)
        .unwrap_or_else(|| {
            Json::String(if x.is_nan() {
                "nan".to_string()
            } else if x > 0.0 {
                "inf".to_string()
            } else {
                "-inf".to_string()
            })
        })
}

fn tuple_json<T: Copy, F: Fn(T) -> Json>(xs: &[T], f: F) -> Json {
    Json::Array(xs.iter().map(|&x| f(x)).collect())
}

pub fn value_to_json(v: &Value) -> Json {
    macro_rules! num_array {
        ($v:expr, $conv:expr) => {
            Json::Array($v.iter().map(|x| $conv(*x)).collect())
        };
    }
    match v {
        Value::Block => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(x) => json!(x),
        Value::Int64(x) => json!(x),
        Value::Uint(x) => json!(x),
        Value::Uint64(x) => json!(x),
        Value::Half(x) => f64_json(f64::from(*x)),
        Value::Float(x) => f64_json(f64::from(*x)),
        Value::Double(x) => f64_json(*x),
        Value::String(s) => json!(s),
        Value::TokenVal(t) => json!(t.as_str()),
        Value::Asset(a) => json!(a.path),
        Value::Int2(v) => tuple_json(v, |x| json!(x)),
        Value::Int3(v) => tuple_json(v, |x| json!(x)),
        Value::Int4(v) => tuple_json(v, |x| json!(x)),
        Value::Half2(v) => tuple_json(v, |x| f64_json(f64::from(x))),
        Value::Half3(v) => tuple_json(v, |x| f64_json(f64::from(x))),
        Value::Half4(v) => tuple_json(v, |x| f64_json(f64::from(x))),
        Value::Float2(v) => tuple_json(v, |x| f64_json(f64::from(x))),
        Value::Float3(v) => tuple_json(v, |x| f64_json(f64::from(x))),
        Value::Float4(v) => tuple_json(v, |x| f64_json(f64::from(x))),
        Value::Double2(v) => tuple_json(v, f64_json),
        Value::Double3(v) => tuple_json(v, f64_json),
        Value::Double4(v) => tuple_json(v, f64_json),
        Value::QuathVal(q) => tuple_json(&q.0, |x| f64_json(f64::from(x))),
        Value::QuatfVal(q) => tuple_json(&q.0, |x| f64_json(f64::from(x))),
        Value::QuatdVal(q) => tuple_json(&q.0, f64_json),
        Value::Matrix2dVal(m) => Json::Array(m.0.iter().map(|r| tuple_json(r, f64_json)).collect()),
        Value::Matrix3dVal(m) => Json::Array(m.0.iter().map(|r| tuple_json(r, f64_json)).collect()),
        Value::Matrix4dVal(m) => Json::Array(m.0.iter().map(|r| tuple_json(r, f64_json)).collect()),
        Value::Color3hVal(c) => tuple_json(&c.0, |x| f64_json(f64::from(x))),
        Value::Color3fVal(c) => tuple_json(&c.0, |x| f64_json(f64::from(x))),
        Value::Color3dVal(c) => tuple_json(&c.0, f64_json),
        Value::Color4hVal(c) => tuple_json(&c.0, |x| f64_json(f64::from(x))),
        Value::Color4fVal(c) => tuple_json(&c.0, |x| f64_json(f64::from(x))),
        Value::Color4dVal(c) => tuple_json(&c.0, f64_json),
        Value::Point3hVal(p) => tuple_json(&p.0, |x| f64_json(f64::from(x))),
        Value::Point3fVal(p) => tuple_json(&p.0, |x| f64_json(f64::from(x))),
        Value::Point3dVal(p) => tuple_json(&p.0, f64_json),
        Value::Normal3hVal(p) => tuple_json(&p.0, |x| f64_json(f64::from(x))),
        Value::Normal3fVal(p) => tuple_json(&p.0, |x| f64_json(f64::from(x))),
        Value::Normal3dVal(p) => tuple_json(&p.0, f64_json),
        Value::Vector3hVal(p) => tuple_json(&p.0, |x| f64_json(f64::from(x))),
        Value::Vector3fVal(p) => tuple_json(&p.0, |x| f64_json(f64::from(x))),
        Value::Vector3dVal(p) => tuple_json(&p.0, f64_json),
        Value::Vector4fVal(p) => tuple_json(&p.0, |x| f64_json(f64::from(x))),
        Value::TexCoord2hVal(t) => tuple_json(&t.0, |x| f64_json(f64::from(x))),
        Value::TexCoord3hVal(t) => tuple_json(&t.0, |x| f64_json(f64::from(x))),
        Value::TexCoord4hVal(t) => tuple_json(&t.0, |x| f64_json(f64::from(x))),
        Value::TexCoord2fVal(t) => tuple_json(&t.0, |x| f64_json(f64::from(x))),
        Value::TexCoord3fVal(t) => tuple_json(&t.0, |x| f64_json(f64::from(x))),
        Value::TexCoord4fVal(t) => tuple_json(&t.0, |x| f64_json(f64::from(x))),
        Value::TexCoord2dVal(t) => tuple_json(&t.0, f64_json),
        Value::TexCoord3dVal(t) => tuple_json(&t.0, f64_json),
        Value::TexCoord4dVal(t) => tuple_json(&t.0, f64_json),
        Value::PathVal(p) => json!(p.to_string()),
        Value::ReferenceVal(r) => {
            let mut obj = Map::new();
            obj.insert("assetPath".to_string(), json!(r.asset_path.path));
            if let Some(p) = &r.prim_path {
                obj.insert("primPath".to_string(), json!(p.to_string()));
            }
            Json::Object(obj)
        }
        Value::DictionaryVal(d) => dictionary_to_json(d),
        Value::BoolArray(v) => num_array!(v, |x: bool| json!(x)),
        Value::IntArray(v) => num_array!(v, |x: i32| json!(x)),
        Value::Int64Array(v) => num_array!(v, |x: i64| json!(x)),
        Value::UintArray(v) => num_array!(v, |x: u32| json!(x)),
        Value::Uint64Array(v) => num_array!(v, |x: u64| json!(x)),
        Value::HalfArray(v) => num_array!(v, |x: half::f16| f64_json(f64::from(x))),
        Value::FloatArray(v) => num_array!(v, |x: f32| f64_json(f64::from(x))),
        Value::DoubleArray(v) => num_array!(v, f64_json),
        Value::StringArray(v) => Json::Array(v.iter().map(|s| json!(s)).collect()),
        Value::TokenArray(v) => Json::Array(v.iter().map(|t| json!(t.as_str())).collect()),
        Value::AssetArray(v) => Json::Array(v.iter().map(|a| json!(a.path)).collect()),
        Value::PathArray(v) => Json::Array(v.iter().map(|p| json!(p.to_string())).collect()),
        other => {
            // Remaining array forms reuse the scalar conversion per element.
            array_fallback(other)
        }
    }
}

fn array_fallback(v: &Value) -> Json {
    macro_rules! per_elem {
        ($($array:ident => $scalar:ident),+ $(,)?) => {
            match v {
                $(Value::$array(items) => Json::Array(
                    items
                        .iter()
                        .map(|x| value_to_json(&Value::$scalar(x.clone())))
                        .collect(),
                ),)+
                _ => Json::Null,
            }
        };
    }
    per_elem!(
        Int2Array => Int2,
        Int3Array => Int3,
        Int4Array => Int4,
        Half2Array => Half2,
        Half3Array => Half3,
        Half4Array => Half4,
        Float2Array => Float2,
        Float3Array => Float3,
        Float4Array => Float4,
        Double2Array => Double2,
        Double3Array => Double3,
        Double4Array => Double4,
        QuathArray => QuathVal,
        QuatfArray => QuatfVal,
        QuatdArray => QuatdVal,
        Matrix2dArray => Matrix2dVal,
        Matrix3dArray => Matrix3dVal,
        Matrix4dArray => Matrix4dVal,
        Color3hArray => Color3hVal,
        Color3fArray => Color3fVal,
        Color3dArray => Color3dVal,
        Color4hArray => Color4hVal,
        Color4fArray => Color4fVal,
        Color4dArray => Color4dVal,
        Point3hArray => Point3hVal,
        Point3fArray => Point3fVal,
        Point3dArray => Point3dVal,
        Normal3hArray => Normal3hVal,
        Normal3fArray => Normal3fVal,
        Normal3dArray => Normal3dVal,
        Vector3hArray => Vector3hVal,
        Vector3fArray => Vector3fVal,
        Vector3dArray => Vector3dVal,
        Vector4fArray => Vector4fVal,
        TexCoord2hArray => TexCoord2hVal,
        TexCoord3hArray => TexCoord3hVal,
        TexCoord4hArray => TexCoord4hVal,
        TexCoord2fArray => TexCoord2fVal,
        TexCoord3fArray => TexCoord3fVal,
        TexCoord4fArray => TexCoord4fVal,
        TexCoord2dArray => TexCoord2dVal,
        TexCoord3dArray => TexCoord3dVal,
        TexCoord4dArray => TexCoord4dVal,
        ReferenceArray => ReferenceVal,
    )
}

pub fn dictionary_to_json(dict: &Dictionary) -> Json {
    let mut obj = Map::new();
    for (key, meta) in dict {
        obj.insert(key.clone(), value_to_json(&meta.value));
    }
    Json::Object(obj)
}

fn primvar_to_json(pv: &PrimVar) -> Json {
    match pv {
        PrimVar::Scalar(v) => value_to_json(v),
        PrimVar::TimeSamples(ts) => {
            let samples: Vec<Json> = ts
                .iter()
                .map(|(t, v)| json!({ "time": f64_json(t), "value": value_to_json(v) }))
                .collect();
            json!({ "timeSamples": samples })
        }
    }
}

fn prim_to_json(prim: &PrimSpec) -> Json {
    let mut obj = Map::new();
    obj.insert("name".to_string(), json!(prim.name));
    obj.insert("specifier".to_string(), json!(prim.specifier.keyword()));
    if let Some(ty) = &prim.type_name {
        obj.insert("typeName".to_string(), json!(ty.as_str()));
    }

    let mut props = Map::new();
    for prop in prim.properties.iter() {
        match prop {
            Property::Attribute(attr) => {
                let v = match &attr.value {
                    Some(pv) => primvar_to_json(pv),
                    None => Json::Null,
                };
                props.insert(
                    attr.name.clone(),
                    json!({ "type": attr.type_name, "value": v }),
                );
            }
            Property::Relationship(rel) => {
                let targets = match &rel.targets {
                    RelTargets::NotAuthored | RelTargets::Blocked => Json::Null,
                    RelTargets::Single(p) => json!([p.to_string()]),
                    RelTargets::Multiple(ps) => {
                        Json::Array(ps.iter().map(|p| json!(p.to_string())).collect())
                    }
                    RelTargets::Placeholder(s) => json!([s]),
                };
                props.insert(rel.name.clone(), json!({ "type": "rel", "targets": targets }));
            }
        }
    }
    if !props.is_empty() {
        obj.insert("properties".to_string(), Json::Object(props));
    }

    if !prim.children.is_empty() {
        obj.insert(
            "children".to_string(),
            Json::Array(prim.children.iter().map(prim_to_json).collect()),
        );
    }
    Json::Object(obj)
}

/// Convert a layer to a JSON document.
pub fn layer_to_json(layer: &Layer) -> Json {
    let mut obj = Map::new();
    let metas = &layer.metas;
    let mut meta_obj = Map::new();
    if let Some(axis) = metas.up_axis {
        meta_obj.insert("upAxis".to_string(), json!(axis.as_str()));
    }
    if let Some(x) = metas.meters_per_unit {
        meta_obj.insert("metersPerUnit".to_string(), f64_json(x));
    }
    if let Some(tok) = &metas.default_prim {
        meta_obj.insert("defaultPrim".to_string(), json!(tok.as_str()));
    }
    if let Some(doc) = &metas.doc {
        meta_obj.insert("doc".to_string(), json!(doc));
    }
    if let Some(d) = &metas.custom_layer_data {
        meta_obj.insert("customLayerData".to_string(), dictionary_to_json(d));
    }
    if !meta_obj.is_empty() {
        obj.insert("metas".to_string(), Json::Object(meta_obj));
    }
    obj.insert(
        "prims".to_string(),
        Json::Array(layer.prim_specs.iter().map(prim_to_json).collect()),
    );
    Json::Object(obj)
}

/// Collect every variantSet in the layer: available variants and the
/// authored selection, keyed by prim path.
pub fn extract_variants(layer: &Layer) -> Json {
    let mut out = Map::new();
    layer.visit_prims(&mut |path, prim| {
        if prim.variant_sets.is_empty() {
            return;
        }
        let selections = prim.metas.variants.clone().unwrap_or_default();
        let mut sets = Map::new();
        for (set_name, variants) in &prim.variant_sets {
            let names: Vec<Json> = variants.keys().map(|n| json!(n)).collect();
            let mut entry = Map::new();
            entry.insert("variants".to_string(), Json::Array(names));
            if let Some(sel) = selections.get(set_name) {
                entry.insert("selected".to_string(), json!(sel));
            }
            sets.insert(set_name.clone(), Json::Object(entry));
        }
        out.insert(path.to_string(), Json::Object(sets));
    });
    Json::Object(out)
}
