use std::path::PathBuf;

use usd_forge::ascii::{LoadState, parse_usda};
use usd_forge::composition::{
    CompositionFeatures, composite, composite_references, composite_sublayers, composite_variant,
};
use usd_forge::error::UsdError;
use usd_forge::layer::{Layer, PrimVar};
use usd_forge::resolver::AssetResolver;
use usd_forge::value::Value;

fn parse(src: &str) -> Layer {
    parse_usda(src.as_bytes(), LoadState::Toplevel).unwrap().0
}

/// Unique scratch directory per test, populated with the given files.
fn scratch(tag: &str, files: &[(&str, &str)]) -> (PathBuf, AssetResolver) {
    let dir = std::env::temp_dir().join(format!(
        "usd-forge-flatten-{tag}-{}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
    let mut resolver = AssetResolver::new();
    resolver.set_current_working_path(dir.to_string_lossy().into_owned());
    resolver.add_search_path(dir.to_string_lossy().into_owned());
    (dir, resolver)
}

#[test]
fn variant_selection_scenario() {
    let layer = parse(
        r#"#usda 1.0
def "shape" (
    variants = {
        string shape = "sphere"
    }
    variantSets = "shape"
)
{
    variantSet "shape" = {
        "sphere" {
            def Sphere "s" { double radius = 2.0 }
        }
        "cube" {
            def Cube "c" { double size = 2.0 }
        }
    }
}
"#,
    );
    assert!(layer.check_unresolved_variant());

    let (composed, warnings) = composite_variant(&layer).unwrap();
    assert!(warnings.is_empty());
    assert!(!composed.check_unresolved_variant());

    let shape = &composed.prim_specs[0];
    assert!(shape.variant_sets.is_empty());
    assert_eq!(shape.children.len(), 1);
    let s = &shape.children[0];
    assert_eq!(s.name, "s");
    assert_eq!(s.type_name.as_ref().unwrap().as_str(), "Sphere");
    let radius = s
        .properties
        .get("radius")
        .and_then(|p| p.as_attribute())
        .unwrap();
    assert_eq!(radius.value, Some(PrimVar::Scalar(Value::Double(2.0))));
    assert!(shape.child("c").is_none());
}

#[test]
fn local_opinion_beats_variant_opinion() {
    let layer = parse(
        r#"#usda 1.0
def "shape" (
    variants = {
        string lod = "high"
    }
)
{
    double detail = 9.0
    variantSet "lod" = {
        "high" {
            double detail = 1.0
            double extra = 2.0
        }
    }
}
"#,
    );
    let (composed, _) = composite_variant(&layer).unwrap();
    let prim = &composed.prim_specs[0];
    let detail = prim.properties.get("detail").unwrap().as_attribute().unwrap();
    assert_eq!(detail.value, Some(PrimVar::Scalar(Value::Double(9.0))));
    assert!(prim.properties.contains("extra"));
}

#[test]
fn sublayer_cycle_scenario() {
    let (_dir, resolver) = scratch(
        "cycle",
        &[
            (
                "A.usda",
                "#usda 1.0\n(\n    subLayers = [@B.usda@]\n)\n",
            ),
            (
                "B.usda",
                "#usda 1.0\n(\n    subLayers = [@A.usda@]\n)\n",
            ),
        ],
    );
    let (root, _) = usd_forge::load_layer_from_file(
        &_dir.join("A.usda").to_string_lossy(),
    )
    .unwrap();

    let err = composite_sublayers(&resolver, &root).unwrap_err();
    let UsdError::Composition(msg) = err else {
        panic!("expected a composition error");
    };
    assert!(msg.contains("A.usda"));
    assert!(msg.contains("B.usda"));
}

#[test]
fn sublayers_merge_weaker_and_idempotently() {
    let (_dir, resolver) = scratch(
        "merge",
        &[(
            "sub.usda",
            r#"#usda 1.0
(
    metersPerUnit = 1
)
def Xform "root"
{
    double a = 1.0
    double b = 2.0
}
"#,
        )],
    );
    let root = parse(
        r#"#usda 1.0
(
    subLayers = [@sub.usda@]
    metersPerUnit = 0.01
)
def Xform "root"
{
    double a = 10.0
}
"#,
    );

    let (composed, warnings) = composite_sublayers(&resolver, &root).unwrap();
    assert!(warnings.is_empty());
    // Stronger (including) layer wins; sublayer fills the gaps.
    assert_eq!(composed.metas.meters_per_unit, Some(0.01));
    let prim = &composed.prim_specs[0];
    let a = prim.properties.get("a").unwrap().as_attribute().unwrap();
    assert_eq!(a.value, Some(PrimVar::Scalar(Value::Double(10.0))));
    let b = prim.properties.get("b").unwrap().as_attribute().unwrap();
    assert_eq!(b.value, Some(PrimVar::Scalar(Value::Double(2.0))));
    assert!(!composed.has_unresolved_sublayers());

    // Applying the pass to its own output changes nothing.
    let (again, _) = composite_sublayers(&resolver, &composed).unwrap();
    assert_eq!(again, composed);
}

#[test]
fn references_compose_with_default_prim() {
    let (_dir, resolver) = scratch(
        "refs",
        &[(
            "geo.usda",
            r#"#usda 1.0
(
    defaultPrim = "Geo"
)
def Mesh "Geo"
{
    int[] faceVertexCounts = [3]
    double weight = 1.0
}
"#,
        )],
    );
    let root = parse(
        r#"#usda 1.0
def Xform "model" (
    references = @geo.usda@
)
{
    double weight = 5.0
}
"#,
    );
    assert!(root.check_unresolved_references());

    let (composed, _) = composite_references(&resolver, &root).unwrap();
    assert!(!composed.check_unresolved_references());
    let model = &composed.prim_specs[0];
    // Referenced opinions are weaker than local ones.
    let weight = model.properties.get("weight").unwrap().as_attribute().unwrap();
    assert_eq!(weight.value, Some(PrimVar::Scalar(Value::Double(5.0))));
    // But referenced-only properties arrive.
    assert!(model.properties.contains("faceVertexCounts"));
    // The local prim keeps its name and gains the referenced type.
    assert_eq!(model.name, "model");
}

#[test]
fn reference_with_explicit_target_and_nesting() {
    let (_dir, resolver) = scratch(
        "nested",
        &[
            (
                "mid.usda",
                r#"#usda 1.0
def Xform "Mid" (
    references = @leaf.usda@</Leaf>
)
{
    double fromMid = 1.0
}
"#,
            ),
            (
                "leaf.usda",
                "#usda 1.0\ndef Sphere \"Leaf\"\n{\n    double fromLeaf = 2.0\n}\n",
            ),
        ],
    );
    let root = parse(
        "#usda 1.0\ndef Xform \"root\" (\n    references = @mid.usda@</Mid>\n)\n{\n}\n",
    );

    let (composed, _) = composite_references(&resolver, &root).unwrap();
    let prim = &composed.prim_specs[0];
    assert!(prim.properties.contains("fromMid"));
    assert!(prim.properties.contains("fromLeaf"));
}

#[test]
fn reference_cycle_is_fatal_and_names_the_cycle() {
    let (_dir, resolver) = scratch(
        "refcycle",
        &[
            (
                "a.usda",
                "#usda 1.0\n(\n    defaultPrim = \"A\"\n)\ndef Xform \"A\" (\n    references = @b.usda@\n)\n{\n}\n",
            ),
            (
                "b.usda",
                "#usda 1.0\n(\n    defaultPrim = \"B\"\n)\ndef Xform \"B\" (\n    references = @a.usda@\n)\n{\n}\n",
            ),
        ],
    );
    let root = parse(
        "#usda 1.0\ndef Xform \"top\" (\n    references = @a.usda@\n)\n{\n}\n",
    );

    let err = composite_references(&resolver, &root).unwrap_err();
    let UsdError::Composition(msg) = err else {
        panic!("expected composition error, got {err}");
    };
    assert!(msg.contains("a.usda"));
    assert!(msg.contains("b.usda"));
}

#[test]
fn missing_default_prim_is_a_composition_error() {
    let (_dir, resolver) = scratch(
        "nodefault",
        &[("empty.usda", "#usda 1.0\n")],
    );
    let root = parse(
        "#usda 1.0\ndef Xform \"x\" (\n    references = @empty.usda@\n)\n{\n}\n",
    );
    let err = composite_references(&resolver, &root).unwrap_err();
    assert!(matches!(err, UsdError::Composition(_)));
}

#[test]
fn inherits_pull_from_class_prims() {
    let layer = parse(
        r#"#usda 1.0
class "_base"
{
    double shared = 7.0
}
def Sphere "ball" (
    inherits = </_base>
)
{
    double radius = 1.0
}
"#,
    );
    let (composed, _) = usd_forge::composite_inherits(&layer).unwrap();
    let ball = composed.root_prim("ball").unwrap();
    let shared = ball.properties.get("shared").unwrap().as_attribute().unwrap();
    assert_eq!(shared.value, Some(PrimVar::Scalar(Value::Double(7.0))));
    assert!(!composed.check_unresolved_inherits());
}

#[test]
fn specializes_compose_like_weakest_inherits() {
    let layer = parse(
        r#"#usda 1.0
class "_special"
{
    double a = 1.0
    double b = 2.0
}
def Sphere "s" (
    specializes = </_special>
)
{
    double a = 10.0
}
"#,
    );
    let (composed, _) = usd_forge::composite_specializes(&layer).unwrap();
    let s = composed.root_prim("s").unwrap();
    assert_eq!(
        s.properties.get("a").unwrap().as_attribute().unwrap().value,
        Some(PrimVar::Scalar(Value::Double(10.0)))
    );
    assert_eq!(
        s.properties.get("b").unwrap().as_attribute().unwrap().value,
        Some(PrimVar::Scalar(Value::Double(2.0)))
    );
    assert!(!composed.check_unresolved_specializes());
}

#[test]
fn full_flatten_drives_arcs_to_fixpoint() {
    let (_dir, resolver) = scratch(
        "full",
        &[(
            "shapes.usda",
            r#"#usda 1.0
(
    defaultPrim = "Shapes"
)
def "Shapes" (
    variants = {
        string which = "round"
    }
)
{
    variantSet "which" = {
        "round" {
            def Sphere "geo" { double radius = 4.0 }
        }
        "boxy" {
            def Cube "geo" { double size = 4.0 }
        }
    }
}
"#,
        )],
    );
    let root = parse(
        "#usda 1.0\ndef Xform \"asset\" (\n    references = @shapes.usda@\n)\n{\n}\n",
    );

    let (composed, _warnings) =
        composite(&resolver, &root, &CompositionFeatures::default()).unwrap();
    // The reference pulled in a variant set which the next pass resolved.
    let asset = composed.root_prim("asset").unwrap();
    let geo = asset.child("geo").expect("variant child spliced in");
    assert_eq!(geo.type_name.as_ref().unwrap().as_str(), "Sphere");
    assert!(!composed.check_unresolved_references());
    assert!(!composed.check_unresolved_variant());
}

#[test]
fn feature_mask_limits_what_resolves() {
    let layer = parse(
        r#"#usda 1.0
def "shape" (
    variants = {
        string s = "a"
    }
)
{
    variantSet "s" = {
        "a" { def Sphere "x" {} }
    }
}
"#,
    );
    let resolver = AssetResolver::new();
    let features = CompositionFeatures {
        variant_sets: false,
        ..CompositionFeatures::default()
    };
    let (composed, warnings) = composite(&resolver, &layer, &features).unwrap();
    // Disabled arcs stay authored and are reported, not errored.
    assert!(composed.check_unresolved_variant());
    assert!(!warnings.is_empty());
}
