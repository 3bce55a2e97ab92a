//! Immutable registries for the USDA parser: recognized stage/prim/property
//! metadata, attribute types, prim types and API schemas.

/// A registered metadata key: canonical storage name, value type, and
/// whether an array form is accepted.
#[derive(Debug, Clone, Copy)]
pub struct VariableDef {
    pub key: &'static str,
    /// Canonical name the value is stored under (aliases map here).
    pub name: &'static str,
    pub type_name: &'static str,
    pub allow_array: bool,
}

const fn def(key: &'static str, name: &'static str, type_name: &'static str) -> VariableDef {
    VariableDef {
        key,
        name,
        type_name,
        allow_array: false,
    }
}

const fn def_array(key: &'static str, name: &'static str, type_name: &'static str) -> VariableDef {
    VariableDef {
        key,
        name,
        type_name,
        allow_array: true,
    }
}

pub const STAGE_METAS: &[VariableDef] = &[
    def("doc", "doc", "string"),
    // Alias of `doc`.
    def("documentation", "doc", "string"),
    def("comment", "comment", "string"),
    def("metersPerUnit", "metersPerUnit", "double"),
    def("timeCodesPerSecond", "timeCodesPerSecond", "double"),
    def("framesPerSecond", "framesPerSecond", "double"),
    def("startTimeCode", "startTimeCode", "double"),
    def("endTimeCode", "endTimeCode", "double"),
    def("defaultPrim", "defaultPrim", "token"),
    def("upAxis", "upAxis", "token"),
    def("customLayerData", "customLayerData", "dictionary"),
    def_array("subLayers", "subLayers", "asset"),
    def_array("apiSchemas", "apiSchemas", "token"),
];

pub const PRIM_METAS: &[VariableDef] = &[
    def("kind", "kind", "token"),
    def("doc", "doc", "string"),
    def_array("references", "references", "Reference"),
    def_array("payload", "payload", "Reference"),
    def_array("inherits", "inherits", "path"),
    def_array("specializes", "specializes", "path"),
    def_array("variantSets", "variantSets", "string"),
    def("variants", "variants", "dictionary"),
    def("assetInfo", "assetInfo", "dictionary"),
    def("customData", "customData", "dictionary"),
    def("active", "active", "bool"),
    def("hidden", "hidden", "bool"),
    def_array("apiSchemas", "apiSchemas", "token"),
];

pub const PROP_METAS: &[VariableDef] = &[
    def("doc", "doc", "string"),
    def("active", "active", "bool"),
    def("hidden", "hidden", "bool"),
    def("customData", "customData", "dictionary"),
    def("elementSize", "elementSize", "int"),
    def("weight", "weight", "double"),
    def("colorSpace", "colorSpace", "token"),
    def("interpolation", "interpolation", "token"),
];

pub fn lookup(table: &'static [VariableDef], key: &str) -> Option<&'static VariableDef> {
    table.iter().find(|d| d.key == key)
}

/// Typed prim schemas the reconstructor knows; anything else lowers to a
/// generic GPrim with a warning.
pub const PRIM_TYPES: &[&str] = &[
    "Xform",
    "Sphere",
    "Cube",
    "Cone",
    "Cylinder",
    "Capsule",
    "BasisCurves",
    "Mesh",
    "Points",
    "GeomSubset",
    "Scope",
    "Material",
    "NodeGraph",
    "Shader",
    "SphereLight",
    "DomeLight",
    "DiskLight",
    "DistantLight",
    "CylinderLight",
    "Camera",
    "SkelRoot",
    "Skeleton",
    "SkelAnimation",
    "BlendShape",
    "GPrim",
];

/// User-defined API schemas are not accepted.
pub const API_SCHEMAS: &[&str] = &["MaterialBindingAPI", "SkelBindingAPI"];

pub const KIND_TOKENS: &[&str] = &["model", "group", "assembly", "component", "subcomponent"];

pub const INTERPOLATION_TOKENS: &[&str] =
    &["constant", "uniform", "varying", "vertex", "faceVarying"];

pub fn is_known_prim_type(name: &str) -> bool {
    PRIM_TYPES.contains(&name)
}

pub fn is_known_api_schema(name: &str) -> bool {
    // Instanced form: `SkelBindingAPI:skel0`.
    let base = name.split(':').next().unwrap_or(name);
    API_SCHEMAS.contains(&base)
}
