//! USDA serialization of layers and stages.
//!
//! The layer printer is the inverse of the text parser up to formatting:
//! parse → print → parse yields a structurally equal layer.

use crate::layer::{
    AttrMeta, Attribute, Layer, LayerMetas, ListEditQual, PrimMetas, PrimSpec, PrimVar, Property,
    RelTargets, Relationship, Specifier, VariantContent, Variability,
};
use crate::stage::{Prim, Stage};
use crate::strutil;
use crate::value::print::{fmt_asset, fmt_reference};
use crate::value::{Dictionary, TimeSamples, usda_value_string};

fn indent(n: u32) -> String {
    "    ".repeat(n as usize)
}

fn qual_prefix(qual: ListEditQual) -> String {
    if qual == ListEditQual::ResetToExplicit {
        String::new()
    } else {
        format!("{} ", qual.keyword())
    }
}

fn fmt_f64(x: f64) -> String {
    usda_value_string(&crate::value::Value::Double(x), 0)
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

pub fn layer_to_usda(layer: &Layer) -> String {
    let mut out = String::from("#usda 1.0\n");
    print_layer_metas(&layer.metas, &mut out);
    for prim in &layer.prim_specs {
        out.push('\n');
        print_prim(prim, 0, &mut out);
    }
    out
}

fn print_layer_metas(metas: &LayerMetas, out: &mut String) {
    let mut lines: Vec<String> = Vec::new();
    if let Some(doc) = &metas.doc {
        lines.push(format!("doc = {}", strutil::build_escaped_and_quoted_string(doc)));
    }
    if let Some(comment) = &metas.comment {
        lines.push(format!(
            "comment = {}",
            strutil::build_escaped_and_quoted_string(comment)
        ));
    }
    if let Some(tok) = &metas.default_prim {
        lines.push(format!("defaultPrim = \"{tok}\""));
    }
    if let Some(axis) = metas.up_axis {
        lines.push(format!("upAxis = \"{}\"", axis.as_str()));
    }
    if let Some(x) = metas.meters_per_unit {
        lines.push(format!("metersPerUnit = {}", fmt_f64(x)));
    }
    if let Some(x) = metas.time_codes_per_second {
        lines.push(format!("timeCodesPerSecond = {}", fmt_f64(x)));
    }
    if let Some(x) = metas.frames_per_second {
        lines.push(format!("framesPerSecond = {}", fmt_f64(x)));
    }
    if let Some(x) = metas.start_time_code {
        lines.push(format!("startTimeCode = {}", fmt_f64(x)));
    }
    if let Some(x) = metas.end_time_code {
        lines.push(format!("endTimeCode = {}", fmt_f64(x)));
    }
    if !metas.sub_layers.is_empty() {
        let items: Vec<String> = metas.sub_layers.iter().map(fmt_asset).collect();
        lines.push(format!("subLayers = [{}]", items.join(", ")));
    }
    if let Some(dict) = &metas.custom_layer_data {
        lines.push(format!("customLayerData = {}", fmt_dict(dict, 1)));
    }
    if let Some((qual, tokens)) = &metas.api_schemas {
        let items: Vec<String> = tokens.iter().map(|t| format!("\"{t}\"")).collect();
        lines.push(format!(
            "{}apiSchemas = [{}]",
            qual_prefix(*qual),
            items.join(", ")
        ));
    }

    if lines.is_empty() {
        return;
    }
    out.push_str("(\n");
    for line in lines {
        out.push_str(&format!("    {line}\n"));
    }
    out.push_str(")\n");
}

fn fmt_dict(dict: &Dictionary, level: u32) -> String {
    usda_value_string(&crate::value::Value::DictionaryVal(dict.clone()), level - 1)
}

fn print_prim(prim: &PrimSpec, level: u32, out: &mut String) {
    let pad = indent(level);
    out.push_str(&pad);
    out.push_str(prim.specifier.keyword());
    if let Some(ty) = &prim.type_name {
        out.push_str(&format!(" {ty}"));
    }
    out.push_str(&format!(" \"{}\"", prim.name));

    let meta_lines = prim_meta_lines(&prim.metas, level + 1);
    if meta_lines.is_empty() {
        out.push('\n');
    } else {
        out.push_str(" (\n");
        for line in &meta_lines {
            out.push_str(&format!("{}{line}\n", indent(level + 1)));
        }
        out.push_str(&format!("{pad})\n"));
    }

    out.push_str(&format!("{pad}{{\n"));
    print_properties(&prim.properties, level + 1, out);
    for (set_name, variants) in &prim.variant_sets {
        print_variant_set(set_name, variants, level + 1, out);
    }
    for child in &prim.children {
        print_prim(child, level + 1, out);
    }
    out.push_str(&format!("{pad}}}\n"));
}

fn prim_meta_lines(metas: &PrimMetas, level: u32) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(comment) = &metas.comment {
        lines.push(strutil::build_escaped_and_quoted_string(comment));
    }
    if let Some(kind) = &metas.kind {
        lines.push(format!("kind = \"{kind}\""));
    }
    if let Some(doc) = &metas.doc {
        lines.push(format!("doc = {}", strutil::build_escaped_and_quoted_string(doc)));
    }
    if let Some(active) = metas.active {
        lines.push(format!("active = {active}"));
    }
    if let Some(hidden) = metas.hidden {
        lines.push(format!("hidden = {hidden}"));
    }
    for (name, slot) in [("references", &metas.references), ("payload", &metas.payload)] {
        if let Some((qual, refs)) = slot {
            let body = if refs.len() == 1 {
                fmt_reference(&refs[0])
            } else {
                let items: Vec<String> = refs.iter().map(fmt_reference).collect();
                format!("[{}]", items.join(", "))
            };
            lines.push(format!("{}{name} = {body}", qual_prefix(*qual)));
        }
    }
    for (name, slot) in [("inherits", &metas.inherits), ("specializes", &metas.specializes)] {
        if let Some((qual, paths)) = slot {
            let body = if paths.len() == 1 {
                format!("<{}>", paths[0])
            } else {
                let items: Vec<String> = paths.iter().map(|p| format!("<{p}>")).collect();
                format!("[{}]", items.join(", "))
            };
            lines.push(format!("{}{name} = {body}", qual_prefix(*qual)));
        }
    }
    if let Some(selections) = &metas.variants {
        let mut body = String::from("{\n");
        for (k, v) in selections {
            body.push_str(&format!(
                "{}string {k} = {}\n",
                indent(level + 1),
                strutil::build_escaped_and_quoted_string(v)
            ));
        }
        body.push_str(&format!("{}}}", indent(level)));
        lines.push(format!("variants = {body}"));
    }
    if let Some((qual, names)) = &metas.variant_sets {
        let body = if names.len() == 1 {
            strutil::build_escaped_and_quoted_string(&names[0])
        } else {
            let items: Vec<String> = names
                .iter()
                .map(|n| strutil::build_escaped_and_quoted_string(n))
                .collect();
            format!("[{}]", items.join(", "))
        };
        lines.push(format!("{}variantSets = {body}", qual_prefix(*qual)));
    }
    if let Some((qual, tokens)) = &metas.api_schemas {
        let items: Vec<String> = tokens.iter().map(|t| format!("\"{t}\"")).collect();
        lines.push(format!(
            "{}apiSchemas = [{}]",
            qual_prefix(*qual),
            items.join(", ")
        ));
    }
    if let Some(dict) = &metas.custom_data {
        lines.push(format!("customData = {}", fmt_dict(dict, level + 1)));
    }
    if let Some(dict) = &metas.asset_info {
        lines.push(format!("assetInfo = {}", fmt_dict(dict, level + 1)));
    }
    lines
}

fn print_variant_set(
    set_name: &str,
    variants: &std::collections::BTreeMap<String, VariantContent>,
    level: u32,
    out: &mut String,
) {
    let pad = indent(level);
    out.push_str(&format!("{pad}variantSet \"{set_name}\" = {{\n"));
    for (variant_name, content) in variants {
        out.push_str(&format!("{}\"{variant_name}\" {{\n", indent(level + 1)));
        print_properties(&content.properties, level + 2, out);
        for child in &content.children {
            print_prim(child, level + 2, out);
        }
        out.push_str(&format!("{}}}\n", indent(level + 1)));
    }
    out.push_str(&format!("{pad}}}\n"));
}

fn print_properties(props: &crate::layer::PropertyMap, level: u32, out: &mut String) {
    for prop in props.iter() {
        match prop {
            Property::Attribute(attr) => print_attribute(attr, level, out),
            Property::Relationship(rel) => print_relationship(rel, level, out),
        }
    }
}

fn print_attribute(attr: &Attribute, level: u32, out: &mut String) {
    let pad = indent(level);
    let mut head = String::new();
    head.push_str(&qual_prefix(attr.list_edit));
    if attr.is_custom {
        head.push_str("custom ");
    }
    if attr.variability == Variability::Uniform {
        head.push_str("uniform ");
    }
    head.push_str(&attr.type_name);
    head.push(' ');
    head.push_str(&attr.name);

    match &attr.value {
        Some(PrimVar::Scalar(v)) => {
            out.push_str(&format!(
                "{pad}{head} = {}{}\n",
                usda_value_string(v, level),
                attr_meta_suffix(&attr.metas, level)
            ));
        }
        Some(PrimVar::TimeSamples(ts)) => {
            out.push_str(&format!(
                "{pad}{head}.timeSamples = {}{}\n",
                fmt_time_samples(ts, level),
                attr_meta_suffix(&attr.metas, level)
            ));
        }
        None => {
            if attr.connection_paths.is_empty() {
                out.push_str(&format!(
                    "{pad}{head}{}\n",
                    attr_meta_suffix(&attr.metas, level)
                ));
            }
        }
    }

    if !attr.connection_paths.is_empty() {
        let body = if attr.connection_paths.len() == 1 {
            format!("<{}>", attr.connection_paths[0])
        } else {
            let items: Vec<String> = attr
                .connection_paths
                .iter()
                .map(|p| format!("<{p}>"))
                .collect();
            format!("[{}]", items.join(", "))
        };
        let metas = if attr.value.is_none() {
            attr_meta_suffix(&attr.metas, level)
        } else {
            String::new()
        };
        out.push_str(&format!("{pad}{head}.connect = {body}{metas}\n"));
    }
}

fn fmt_time_samples(ts: &TimeSamples, level: u32) -> String {
    let mut s = String::from("{\n");
    for (t, v) in ts.iter() {
        s.push_str(&format!(
            "{}{}: {},\n",
            indent(level + 1),
            fmt_f64(t),
            usda_value_string(v, level + 1)
        ));
    }
    s.push_str(&format!("{}}}", indent(level)));
    s
}

fn print_relationship(rel: &Relationship, level: u32, out: &mut String) {
    let pad = indent(level);
    let mut head = String::new();
    head.push_str(&qual_prefix(rel.list_edit));
    if rel.is_custom {
        head.push_str("custom ");
    }
    head.push_str("rel ");
    head.push_str(&rel.name);

    let target = match &rel.targets {
        RelTargets::NotAuthored => None,
        RelTargets::Single(p) => Some(format!("<{p}>")),
        RelTargets::Multiple(ps) => {
            let items: Vec<String> = ps.iter().map(|p| format!("<{p}>")).collect();
            Some(format!("[{}]", items.join(", ")))
        }
        RelTargets::Placeholder(s) => Some(strutil::build_escaped_and_quoted_string(s)),
        RelTargets::Blocked => Some("None".to_string()),
    };
    match target {
        Some(t) => out.push_str(&format!(
            "{pad}{head} = {t}{}\n",
            attr_meta_suffix(&rel.metas, level)
        )),
        None => out.push_str(&format!(
            "{pad}{head}{}\n",
            attr_meta_suffix(&rel.metas, level)
        )),
    }
}

fn attr_meta_suffix(metas: &AttrMeta, level: u32) -> String {
    let mut lines = Vec::new();
    if let Some(interp) = &metas.interpolation {
        lines.push(format!("interpolation = \"{interp}\""));
    }
    if let Some(n) = metas.element_size {
        lines.push(format!("elementSize = {n}"));
    }
    if let Some(cs) = &metas.color_space {
        lines.push(format!("colorSpace = \"{cs}\""));
    }
    if let Some(doc) = &metas.doc {
        lines.push(format!("doc = {}", strutil::build_escaped_and_quoted_string(doc)));
    }
    if let Some(hidden) = metas.hidden {
        lines.push(format!("hidden = {hidden}"));
    }
    if let Some(w) = metas.weight {
        lines.push(format!("weight = {}", fmt_f64(w)));
    }
    if let Some(dict) = &metas.custom_data {
        lines.push(format!("customData = {}", fmt_dict(dict, level + 1)));
    }
    for meta in metas.others.values() {
        lines.push(format!(
            "{} = {}",
            meta.name,
            usda_value_string(&meta.value, level + 1)
        ));
    }
    if lines.is_empty() {
        return String::new();
    }
    let pad = indent(level + 1);
    let body: Vec<String> = lines.iter().map(|l| format!("{pad}{l}")).collect();
    format!(" (\n{}\n{})", body.join("\n"), indent(level))
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

pub fn stage_to_usda(stage: &Stage) -> String {
    let mut out = String::from("#usda 1.0\n");
    print_layer_metas(&stage.metas, &mut out);
    for prim in &stage.root_prims {
        out.push('\n');
        print_stage_prim(prim, 0, &mut out);
    }
    out
}

fn print_stage_prim(prim: &Prim, level: u32, out: &mut String) {
    let pad = indent(level);
    out.push_str(&pad);
    out.push_str(prim.specifier.keyword());
    match &prim.type_name {
        Some(ty) => out.push_str(&format!(" {ty}")),
        None => {
            if prim.specifier == Specifier::Def {
                out.push_str(&format!(" {}", prim.data.type_label()));
            }
        }
    }
    out.push_str(&format!(" \"{}\"", prim.name));

    let meta_lines = prim_meta_lines(&prim.metas, level + 1);
    if meta_lines.is_empty() {
        out.push('\n');
    } else {
        out.push_str(" (\n");
        for line in &meta_lines {
            out.push_str(&format!("{}{line}\n", indent(level + 1)));
        }
        out.push_str(&format!("{pad})\n"));
    }

    out.push_str(&format!("{pad}{{\n"));
    print_properties(&prim.props, level + 1, out);
    for child in &prim.children {
        print_stage_prim(child, level + 1, out);
    }
    out.push_str(&format!("{pad}}}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ascii::{LoadState, parse_usda};

    fn round_trip(src: &str) -> (Layer, Layer) {
        let (first, _) = parse_usda(src.as_bytes(), LoadState::Toplevel).unwrap();
        let printed = layer_to_usda(&first);
        let (second, _) = parse_usda(printed.as_bytes(), LoadState::Toplevel)
            .unwrap_or_else(|e| panic!("reparse failed: {e}\n--- printed ---\n{printed}"));
        (first, second)
    }

    #[test]
    fn minimal_document_round_trips() {
        let (a, b) = round_trip(
            r#"#usda 1.0
(
    upAxis = "Y"
    metersPerUnit = 0.01
)
def Xform "root"
{
    double3 xformOp:translate = (1, 2, 3)
    uniform token[] xformOpOrder = ["xformOp:translate"]
}
"#,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn rich_document_round_trips() {
        let (a, b) = round_trip(
            r#"#usda 1.0
(
    defaultPrim = "root"
    doc = "example"
    customLayerData = {
        string generator = "test"
        int version = 3
    }
)
def Xform "root" (
    kind = "component"
    active = true
    prepend apiSchemas = ["MaterialBindingAPI"]
)
{
    float radius.timeSamples = { 0: 1, 10: None, 20: 3, }
    custom float myValue = 0.5 (
        interpolation = "constant"
    )
    texCoord2f[] primvars:st = [(0, 0), (1, 1)] (
        interpolation = "vertex"
    )
    rel material:binding = </Materials/pbr>
    def Sphere "ball"
    {
        double radius = 2.5
    }
}
def "varianted" (
    variants = {
        string lod = "high"
    }
    variantSets = "lod"
)
{
    variantSet "lod" = {
        "high" {
            def Sphere "detail" { double radius = 1 }
        }
        "low" {
        }
    }
}
"#,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn references_and_connections_round_trip() {
        let (a, b) = round_trip(
            r#"#usda 1.0
def Xform "root" (
    prepend references = @./geo.usda@</Geo>
    payload = [@a.usda@, @b.usda@</B>]
    inherits = </_base>
)
{
    float inputs:x = 1
    float inputs:x.connect = </Other.outputs:r>
    asset uri = @@@weird \@@@ path@@@
    rel many = [</A>, </B>]
    rel placeholder = "todo"
    rel blocked = None
    int64 big = 9007199254740993
    uniform token axis = "Y"
}
"#,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn escaped_strings_round_trip() {
        let (a, b) = round_trip(
            "#usda 1.0\ndef \"s\"\n{\n    string a = \"has 'single' and \\\"double\\\"\"\n    string b = \"\"\"multi\nline\"\"\"\n}\n",
        );
        assert_eq!(a, b);
    }
}
