//! Typed value parsing for USDA: scalars, tuples, arrays, dictionaries,
//! references and time-sample maps, dispatched by canonical type name.

use half::f16;

use super::lexer::Lexer;
use crate::error::{Result, UsdError};
use crate::path::Path;
use crate::value::{
    AssetPath, Color3d, Color3f, Color3h, Color4d, Color4f, Color4h, Dictionary, LayerOffset,
    Matrix2d, Matrix3d, Matrix4d, MetaVariable, Normal3d, Normal3f, Normal3h, Point3d, Point3f,
    Point3h, Quatd, Quatf, Quath, Reference, TexCoord2d, TexCoord2f, TexCoord2h, TexCoord3d,
    TexCoord3f, TexCoord3h, TexCoord4d, TexCoord4f, TexCoord4h, TimeSamples, Token, Value,
    Vector3d, Vector3f, Vector3h, Vector4f,
};

/// Nesting bound for dictionaries and bracketed values.
pub(super) const MAX_VALUE_NEST: u32 = 256;

pub(super) fn parse_bool(lex: &mut Lexer) -> Result<bool> {
    let pos = lex.pos();
    match lex.peek_char() {
        Some('t') | Some('f') => {
            let word = lex.read_identifier()?;
            match word.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(UsdError::lex(pos, format!("invalid bool `{other}`"))),
            }
        }
        Some('0'..='9') | Some('-') | Some('+') => {
            let n = lex.read_i64()?;
            match n {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(UsdError::lex(pos, format!("invalid bool `{other}`"))),
            }
        }
        other => Err(UsdError::lex(pos, format!("bool expected, found {other:?}"))),
    }
}

fn parse_i32(lex: &mut Lexer) -> Result<i32> {
    let pos = lex.pos();
    let n = lex.read_i64()?;
    i32::try_from(n).map_err(|_| UsdError::lex(pos, format!("int out of range: {n}")))
}

fn parse_u32(lex: &mut Lexer) -> Result<u32> {
    let pos = lex.pos();
    let n = lex.read_i64()?;
    u32::try_from(n).map_err(|_| UsdError::lex(pos, format!("uint out of range: {n}")))
}

fn parse_u64(lex: &mut Lexer) -> Result<u64> {
    let pos = lex.pos();
    let lexeme = lex.read_number_lexeme()?;
    lexeme
        .parse::<u64>()
        .map_err(|_| UsdError::lex(pos, format!("uint64 out of range: `{lexeme}`")))
}

fn parse_f16(lex: &mut Lexer) -> Result<f16> {
    Ok(f16::from_f64(lex.read_f64()?))
}

fn parse_f32(lex: &mut Lexer) -> Result<f32> {
    Ok(lex.read_f64()? as f32)
}

pub(super) fn parse_token(lex: &mut Lexer) -> Result<Token> {
    let s = lex.read_string_literal()?;
    Ok(Token::new(s.value))
}

pub(super) fn parse_string(lex: &mut Lexer) -> Result<String> {
    Ok(lex.read_string_literal()?.value)
}

pub(super) fn parse_asset(lex: &mut Lexer) -> Result<AssetPath> {
    let (path, triple) = lex.read_asset_ref()?;
    Ok(AssetPath {
        path,
        triple_delimited: triple,
    })
}

pub(super) fn parse_path_value(lex: &mut Lexer) -> Result<Path> {
    let pos = lex.pos();
    let raw = lex.read_path_literal()?;
    Path::parse(&raw).map_err(|e| UsdError::parse(pos, e))
}

fn parse_tuple<T, const N: usize>(
    lex: &mut Lexer,
    mut elem: impl FnMut(&mut Lexer) -> Result<T>,
) -> Result<[T; N]> {
    let pos = lex.pos();
    lex.skip_whitespace_and_comments();
    lex.expect_char('(')?;
    let mut out = Vec::with_capacity(N);
    for i in 0..N {
        lex.skip_whitespace_and_comments();
        out.push(elem(lex)?);
        lex.skip_whitespace_and_comments();
        if i + 1 < N {
            lex.expect_char(',')?;
        }
    }
    lex.skip_whitespace_and_comments();
    // Tolerate a trailing comma before the closing paren.
    if lex.peek_char() == Some(',') {
        lex.next_char();
        lex.skip_whitespace_and_comments();
    }
    lex.expect_char(')')?;
    out.try_into()
        .map_err(|_| UsdError::parse(pos, "tuple arity mismatch"))
}

fn parse_matrix<const N: usize>(lex: &mut Lexer) -> Result<[[f64; N]; N]> {
    parse_tuple::<[f64; N], N>(lex, |lex| parse_tuple::<f64, N>(lex, |l| l.read_f64()))
}

pub(super) fn parse_array<T>(
    lex: &mut Lexer,
    mut elem: impl FnMut(&mut Lexer) -> Result<T>,
) -> Result<Vec<T>> {
    lex.skip_whitespace_and_comments();
    lex.expect_char('[')?;
    let mut out = Vec::new();
    loop {
        lex.skip_whitespace_and_comments();
        if lex.peek_char() == Some(']') {
            lex.next_char();
            return Ok(out);
        }
        out.push(elem(lex)?);
        lex.skip_whitespace_and_comments();
        match lex.peek_char() {
            Some(',') => {
                lex.next_char();
            }
            Some(']') => {}
            other => {
                return Err(UsdError::parse(
                    lex.pos(),
                    format!("`,` or `]` expected in array, found {other:?}"),
                ));
            }
        }
    }
}

/// `@asset@`, `@asset@</Prim>`, or a bare `</Prim>` internal reference, each
/// with an optional `(offset = ...; scale = ...)` layer offset.
pub(super) fn parse_reference(lex: &mut Lexer) -> Result<Reference> {
    lex.skip_whitespace_and_comments();
    let mut reference = Reference::default();

    if lex.peek_char() == Some('@') {
        reference.asset_path = parse_asset(lex)?;
        lex.skip_inline_whitespace();
        if lex.peek_char() == Some('<') {
            reference.prim_path = Some(parse_path_value(lex)?);
        }
    } else {
        reference.prim_path = Some(parse_path_value(lex)?);
    }

    lex.skip_inline_whitespace();
    if lex.peek_char() == Some('(') {
        lex.next_char();
        let mut offset = LayerOffset::default();
        loop {
            lex.skip_whitespace_and_comments();
            if lex.peek_char() == Some(')') {
                lex.next_char();
                break;
            }
            let pos = lex.pos();
            let key = lex.read_identifier()?;
            lex.skip_whitespace_and_comments();
            lex.expect_char('=')?;
            lex.skip_whitespace_and_comments();
            let v = lex.read_f64()?;
            match key.as_str() {
                "offset" => offset.offset = v,
                "scale" => offset.scale = v,
                other => {
                    return Err(UsdError::parse(
                        pos,
                        format!("unknown layer-offset key `{other}`"),
                    ));
                }
            }
            lex.skip_whitespace_and_comments();
            if lex.peek_char() == Some(';') {
                lex.next_char();
            }
        }
        reference.layer_offset = Some(offset);
    }

    Ok(reference)
}

/// Dictionary body: `{ <type> <name> = <value> ... }` with nested
/// `dictionary` entries.
pub(super) fn parse_dictionary(lex: &mut Lexer, depth: u32) -> Result<Dictionary> {
    if depth > MAX_VALUE_NEST {
        return Err(UsdError::parse(lex.pos(), "dictionary nesting too deep"));
    }
    lex.skip_whitespace_and_comments();
    lex.expect_char('{')?;
    let mut dict = Dictionary::new();
    loop {
        lex.skip_whitespace_and_comments();
        if lex.peek_char() == Some('}') {
            lex.next_char();
            return Ok(dict);
        }

        let pos = lex.pos();
        let type_name = {
            let mut t = lex.read_identifier()?;
            if lex.starts_with("[]") {
                lex.next_char();
                lex.next_char();
                t.push_str("[]");
            }
            t
        };
        lex.skip_inline_whitespace();

        // Keys may be identifiers or quoted strings.
        let name = if matches!(lex.peek_char(), Some('"') | Some('\'')) {
            lex.read_string_literal()?.value
        } else {
            lex.read_identifier()?
        };
        lex.skip_whitespace_and_comments();
        lex.expect_char('=')?;
        lex.skip_whitespace_and_comments();

        let value = if type_name == "dictionary" {
            Value::DictionaryVal(parse_dictionary(lex, depth + 1)?)
        } else {
            let (base, is_array) = split_array_suffix(&type_name);
            parse_value_of_type(lex, base, is_array, depth + 1)?
        };

        if dict.contains_key(&name) {
            return Err(UsdError::parse(
                pos,
                format!("duplicate dictionary key `{name}`"),
            ));
        }
        dict.insert(
            name.clone(),
            MetaVariable {
                name,
                type_name,
                value,
            },
        );
    }
}

pub(super) fn split_array_suffix(type_name: &str) -> (&str, bool) {
    match type_name.strip_suffix("[]") {
        Some(base) => (base, true),
        None => (type_name, false),
    }
}

/// Parse one value of the given canonical element type.
pub(super) fn parse_value_of_type(
    lex: &mut Lexer,
    base: &str,
    is_array: bool,
    depth: u32,
) -> Result<Value> {
    if depth > MAX_VALUE_NEST {
        return Err(UsdError::parse(lex.pos(), "value nesting too deep"));
    }
    lex.skip_whitespace_and_comments();

    // `None` blocks any type, scalar or array.
    if lex.starts_with("None") {
        for _ in 0..4 {
            lex.next_char();
        }
        return Ok(Value::Block);
    }

    macro_rules! dispatch {
        ($scalar:ident, $array:ident, $f:expr) => {{
            if is_array {
                Value::$array(parse_array(lex, $f)?)
            } else {
                Value::$scalar($f(lex)?)
            }
        }};
    }

    let v = match base {
        "bool" => dispatch!(Bool, BoolArray, parse_bool),
        "int" => dispatch!(Int, IntArray, parse_i32),
        "int64" => dispatch!(Int64, Int64Array, |l: &mut Lexer| l.read_i64()),
        "uint" => dispatch!(Uint, UintArray, parse_u32),
        "uint64" => dispatch!(Uint64, Uint64Array, parse_u64),
        "half" => dispatch!(Half, HalfArray, parse_f16),
        "float" => dispatch!(Float, FloatArray, parse_f32),
        "double" => dispatch!(Double, DoubleArray, |l: &mut Lexer| l.read_f64()),
        "string" => dispatch!(String, StringArray, parse_string),
        "token" => dispatch!(TokenVal, TokenArray, parse_token),
        "asset" => dispatch!(Asset, AssetArray, parse_asset),
        "int2" => dispatch!(Int2, Int2Array, |l: &mut Lexer| parse_tuple::<i32, 2>(
            l, parse_i32
        )),
        "int3" => dispatch!(Int3, Int3Array, |l: &mut Lexer| parse_tuple::<i32, 3>(
            l, parse_i32
        )),
        "int4" => dispatch!(Int4, Int4Array, |l: &mut Lexer| parse_tuple::<i32, 4>(
            l, parse_i32
        )),
        "half2" => dispatch!(Half2, Half2Array, |l: &mut Lexer| parse_tuple::<f16, 2>(
            l, parse_f16
        )),
        "half3" => dispatch!(Half3, Half3Array, |l: &mut Lexer| parse_tuple::<f16, 3>(
            l, parse_f16
        )),
        "half4" => dispatch!(Half4, Half4Array, |l: &mut Lexer| parse_tuple::<f16, 4>(
            l, parse_f16
        )),
        "float2" => dispatch!(Float2, Float2Array, |l: &mut Lexer| parse_tuple::<f32, 2>(
            l, parse_f32
        )),
        "float3" => dispatch!(Float3, Float3Array, |l: &mut Lexer| parse_tuple::<f32, 3>(
            l, parse_f32
        )),
        "float4" => dispatch!(Float4, Float4Array, |l: &mut Lexer| parse_tuple::<f32, 4>(
            l, parse_f32
        )),
        "double2" => dispatch!(Double2, Double2Array, |l: &mut Lexer| parse_tuple::<f64, 2>(
            l,
            |l| l.read_f64()
        )),
        "double3" => dispatch!(Double3, Double3Array, |l: &mut Lexer| parse_tuple::<f64, 3>(
            l,
            |l| l.read_f64()
        )),
        "double4" => dispatch!(Double4, Double4Array, |l: &mut Lexer| parse_tuple::<f64, 4>(
            l,
            |l| l.read_f64()
        )),
        "quath" => dispatch!(QuathVal, QuathArray, |l: &mut Lexer| Ok(Quath(
            parse_tuple::<f16, 4>(l, parse_f16)?
        ))),
        "quatf" => dispatch!(QuatfVal, QuatfArray, |l: &mut Lexer| Ok(Quatf(
            parse_tuple::<f32, 4>(l, parse_f32)?
        ))),
        "quatd" => dispatch!(QuatdVal, QuatdArray, |l: &mut Lexer| Ok(Quatd(
            parse_tuple::<f64, 4>(l, |l| l.read_f64())?
        ))),
        "matrix2d" => dispatch!(Matrix2dVal, Matrix2dArray, |l: &mut Lexer| Ok(Matrix2d(
            parse_matrix::<2>(l)?
        ))),
        "matrix3d" => dispatch!(Matrix3dVal, Matrix3dArray, |l: &mut Lexer| Ok(Matrix3d(
            parse_matrix::<3>(l)?
        ))),
        "matrix4d" => dispatch!(Matrix4dVal, Matrix4dArray, |l: &mut Lexer| Ok(Matrix4d(
            parse_matrix::<4>(l)?
        ))),
        "color3h" => dispatch!(Color3hVal, Color3hArray, |l: &mut Lexer| Ok(Color3h(
            parse_tuple::<f16, 3>(l, parse_f16)?
        ))),
        "color3f" => dispatch!(Color3fVal, Color3fArray, |l: &mut Lexer| Ok(Color3f(
            parse_tuple::<f32, 3>(l, parse_f32)?
        ))),
        "color3d" => dispatch!(Color3dVal, Color3dArray, |l: &mut Lexer| Ok(Color3d(
            parse_tuple::<f64, 3>(l, |l| l.read_f64())?
        ))),
        "color4h" => dispatch!(Color4hVal, Color4hArray, |l: &mut Lexer| Ok(Color4h(
            parse_tuple::<f16, 4>(l, parse_f16)?
        ))),
        "color4f" => dispatch!(Color4fVal, Color4fArray, |l: &mut Lexer| Ok(Color4f(
            parse_tuple::<f32, 4>(l, parse_f32)?
        ))),
        "color4d" => dispatch!(Color4dVal, Color4dArray, |l: &mut Lexer| Ok(Color4d(
            parse_tuple::<f64, 4>(l, |l| l.read_f64())?
        ))),
        "point3h" => dispatch!(Point3hVal, Point3hArray, |l: &mut Lexer| Ok(Point3h(
            parse_tuple::<f16, 3>(l, parse_f16)?
        ))),
        "point3f" => dispatch!(Point3fVal, Point3fArray, |l: &mut Lexer| Ok(Point3f(
            parse_tuple::<f32, 3>(l, parse_f32)?
        ))),
        "point3d" => dispatch!(Point3dVal, Point3dArray, |l: &mut Lexer| Ok(Point3d(
            parse_tuple::<f64, 3>(l, |l| l.read_f64())?
        ))),
        "normal3h" => dispatch!(Normal3hVal, Normal3hArray, |l: &mut Lexer| Ok(Normal3h(
            parse_tuple::<f16, 3>(l, parse_f16)?
        ))),
        "normal3f" => dispatch!(Normal3fVal, Normal3fArray, |l: &mut Lexer| Ok(Normal3f(
            parse_tuple::<f32, 3>(l, parse_f32)?
        ))),
        "normal3d" => dispatch!(Normal3dVal, Normal3dArray, |l: &mut Lexer| Ok(Normal3d(
            parse_tuple::<f64, 3>(l, |l| l.read_f64())?
        ))),
        "vector3h" => dispatch!(Vector3hVal, Vector3hArray, |l: &mut Lexer| Ok(Vector3h(
            parse_tuple::<f16, 3>(l, parse_f16)?
        ))),
        "vector3f" => dispatch!(Vector3fVal, Vector3fArray, |l: &mut Lexer| Ok(Vector3f(
            parse_tuple::<f32, 3>(l, parse_f32)?
        ))),
        "vector3d" => dispatch!(Vector3dVal, Vector3dArray, |l: &mut Lexer| Ok(Vector3d(
            parse_tuple::<f64, 3>(l, |l| l.read_f64())?
        ))),
        "vector4f" => dispatch!(Vector4fVal, Vector4fArray, |l: &mut Lexer| Ok(Vector4f(
            parse_tuple::<f32, 4>(l, parse_f32)?
        ))),
        "texCoord2h" => dispatch!(TexCoord2hVal, TexCoord2hArray, |l: &mut Lexer| Ok(
            TexCoord2h(parse_tuple::<f16, 2>(l, parse_f16)?)
        )),
        "texCoord3h" => dispatch!(TexCoord3hVal, TexCoord3hArray, |l: &mut Lexer| Ok(
            TexCoord3h(parse_tuple::<f16, 3>(l, parse_f16)?)
        )),
        "texCoord4h" => dispatch!(TexCoord4hVal, TexCoord4hArray, |l: &mut Lexer| Ok(
            TexCoord4h(parse_tuple::<f16, 4>(l, parse_f16)?)
        )),
        "texCoord2f" => dispatch!(TexCoord2fVal, TexCoord2fArray, |l: &mut Lexer| Ok(
            TexCoord2f(parse_tuple::<f32, 2>(l, parse_f32)?)
        )),
        "texCoord3f" => dispatch!(TexCoord3fVal, TexCoord3fArray, |l: &mut Lexer| Ok(
            TexCoord3f(parse_tuple::<f32, 3>(l, parse_f32)?)
        )),
        "texCoord4f" => dispatch!(TexCoord4fVal, TexCoord4fArray, |l: &mut Lexer| Ok(
            TexCoord4f(parse_tuple::<f32, 4>(l, parse_f32)?)
        )),
        "texCoord2d" => dispatch!(TexCoord2dVal, TexCoord2dArray, |l: &mut Lexer| Ok(
            TexCoord2d(parse_tuple::<f64, 2>(l, |l| l.read_f64())?)
        )),
        "texCoord3d" => dispatch!(TexCoord3dVal, TexCoord3dArray, |l: &mut Lexer| Ok(
            TexCoord3d(parse_tuple::<f64, 3>(l, |l| l.read_f64())?)
        )),
        "texCoord4d" => dispatch!(TexCoord4dVal, TexCoord4dArray, |l: &mut Lexer| Ok(
            TexCoord4d(parse_tuple::<f64, 4>(l, |l| l.read_f64())?)
        )),
        "path" => dispatch!(PathVal, PathArray, parse_path_value),
        "Reference" => dispatch!(ReferenceVal, ReferenceArray, parse_reference),
        "dictionary" => Value::DictionaryVal(parse_dictionary(lex, depth + 1)?),
        other => {
            return Err(UsdError::parse(
                lex.pos(),
                format!("unsupported attribute type `{other}`"),
            ));
        }
    };
    Ok(v)
}

/// `{ time : value , ... }` with trailing comma allowed and `None` legal in
/// value position.
pub(super) fn parse_time_samples(
    lex: &mut Lexer,
    base: &str,
    is_array: bool,
) -> Result<TimeSamples> {
    lex.skip_whitespace_and_comments();
    lex.expect_char('{')?;
    let mut ts = TimeSamples::new();
    loop {
        lex.skip_whitespace_and_comments();
        if lex.peek_char() == Some('}') {
            lex.next_char();
            return Ok(ts);
        }
        let time = lex.read_f64()?;
        lex.skip_whitespace_and_comments();
        lex.expect_char(':')?;
        lex.skip_whitespace_and_comments();
        let value = parse_value_of_type(lex, base, is_array, 0)?;
        ts.add(time, value);
        lex.skip_whitespace_and_comments();
        match lex.peek_char() {
            Some(',') => {
                lex.next_char();
            }
            Some('}') => {}
            other => {
                return Err(UsdError::parse(
                    lex.pos(),
                    format!("`,` or `}}` expected in timeSamples, found {other:?}"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(s: &str) -> Lexer<'_> {
        Lexer::new(s.as_bytes()).unwrap()
    }

    fn parse(s: &str, ty: &str) -> Value {
        let (base, arr) = split_array_suffix(ty);
        parse_value_of_type(&mut lexer(s), base, arr, 0).unwrap()
    }

    #[test]
    fn scalars_and_tuples() {
        assert_eq!(parse("true", "bool"), Value::Bool(true));
        assert_eq!(parse("1", "bool"), Value::Bool(true));
        assert_eq!(parse("(1, 2, 3)", "double3"), Value::Double3([1.0, 2.0, 3.0]));
        assert_eq!(
            parse("(0.5, 0.5, 0.5)", "color3f"),
            Value::Color3fVal(Color3f([0.5; 3]))
        );
        assert_eq!(parse("None", "float"), Value::Block);
    }

    #[test]
    fn role_vectors_at_every_width() {
        assert_eq!(
            parse("(1, 2, 3)", "point3d"),
            Value::Point3dVal(Point3d([1.0, 2.0, 3.0]))
        );
        assert_eq!(
            parse("(0, 1, 0)", "normal3h"),
            Value::Normal3hVal(Normal3h([
                f16::from_f64(0.0),
                f16::from_f64(1.0),
                f16::from_f64(0.0)
            ]))
        );
        assert_eq!(
            parse("[(1, 0, 0), (0, 0, 1)]", "vector3d[]"),
            Value::Vector3dArray(vec![
                Vector3d([1.0, 0.0, 0.0]),
                Vector3d([0.0, 0.0, 1.0])
            ])
        );
    }

    #[test]
    fn arrays_allow_trailing_comma_and_newlines() {
        assert_eq!(
            parse("[1, 2,\n  3,]", "int[]"),
            Value::IntArray(vec![1, 2, 3])
        );
        assert_eq!(parse("[]", "float[]"), Value::FloatArray(vec![]));
        assert_eq!(
            parse("[(0, 0), (1, 1)]", "texCoord2f[]"),
            Value::TexCoord2fArray(vec![
                TexCoord2f([0.0, 0.0]),
                TexCoord2f([1.0, 1.0])
            ])
        );
    }

    #[test]
    fn matrices() {
        assert_eq!(
            parse("((1, 0), (0, 1))", "matrix2d"),
            Value::Matrix2dVal(Matrix2d([[1.0, 0.0], [0.0, 1.0]]))
        );
    }

    #[test]
    fn references() {
        let r = parse_reference(&mut lexer("@a.usda@</Root> (offset = 10; scale = 2)")).unwrap();
        assert_eq!(r.asset_path.path, "a.usda");
        assert_eq!(r.prim_path.unwrap().prim_part(), "/Root");
        let lo = r.layer_offset.unwrap();
        assert_eq!(lo.offset, 10.0);
        assert_eq!(lo.scale, 2.0);

        let r = parse_reference(&mut lexer("</Internal/Prim>")).unwrap();
        assert!(r.asset_path.path.is_empty());
        assert_eq!(r.prim_path.unwrap().prim_part(), "/Internal/Prim");
    }

    #[test]
    fn dictionaries() {
        let d = parse_dictionary(
            &mut lexer("{\n  string name = \"x\"\n  dictionary sub = { int i = 1 }\n}"),
            0,
        )
        .unwrap();
        assert_eq!(
            d["name"].value,
            Value::String("x".to_string())
        );
        let Value::DictionaryVal(sub) = &d["sub"].value else {
            panic!("expected nested dictionary");
        };
        assert_eq!(sub["i"].value, Value::Int(1));
    }

    #[test]
    fn time_samples_with_blocks() {
        let ts = parse_time_samples(&mut lexer("{ 0: 1.0, 10: None, 20: 3.0, }"), "float", false)
            .unwrap();
        assert_eq!(ts.len(), 3);
        let entries: Vec<(f64, Value)> = ts.iter().map(|(t, v)| (t, v.clone())).collect();
        assert_eq!(entries[0], (0.0, Value::Float(1.0)));
        assert_eq!(entries[1], (10.0, Value::Block));
        assert_eq!(entries[2], (20.0, Value::Float(3.0)));
    }

    #[test]
    fn array_time_samples() {
        let ts = parse_time_samples(
            &mut lexer("{ 0: [(0,0,0)], 1: [(1,1,1), (2,2,2)] }"),
            "point3f",
            true,
        )
        .unwrap();
        assert_eq!(ts.len(), 2);
        assert_eq!(
            ts.get(1.0),
            Some(&Value::Point3fArray(vec![
                Point3f([1.0; 3]),
                Point3f([2.0; 3])
            ]))
        );
    }
}
