//! The composed, typed scene graph: [`Stage`], [`Prim`] and the per-schema
//! payload structs produced by reconstruction.

use crate::layer::{Axis, LayerMetas, PrimMetas, PrimVar, PropertyMap, Specifier};
use crate::path::Path;
use crate::value::{Point3f, Token};

/// Transform op kinds accepted in `xformOpOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XformOpKind {
    Translate,
    Scale,
    RotateX,
    RotateY,
    RotateZ,
    RotateXYZ,
    RotateXZY,
    RotateYXZ,
    RotateYZX,
    RotateZXY,
    RotateZYX,
    Orient,
    Transform,
}

impl XformOpKind {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "translate" => Self::Translate,
            "scale" => Self::Scale,
            "rotateX" => Self::RotateX,
            "rotateY" => Self::RotateY,
            "rotateZ" => Self::RotateZ,
            "rotateXYZ" => Self::RotateXYZ,
            "rotateXZY" => Self::RotateXZY,
            "rotateYXZ" => Self::RotateYXZ,
            "rotateYZX" => Self::RotateYZX,
            "rotateZXY" => Self::RotateZXY,
            "rotateZYX" => Self::RotateZYX,
            "orient" => Self::Orient,
            "transform" => Self::Transform,
            _ => return None,
        })
    }

    /// Element type names an op's attribute may carry.
    pub fn allowed_types(self) -> &'static [&'static str] {
        match self {
            Self::Translate | Self::Scale => &["double3", "float3", "half3"],
            Self::RotateX | Self::RotateY | Self::RotateZ => &["double", "float", "half"],
            Self::RotateXYZ
            | Self::RotateXZY
            | Self::RotateYXZ
            | Self::RotateYZX
            | Self::RotateZXY
            | Self::RotateZYX => &["double3", "float3", "half3"],
            Self::Orient => &["quatd", "quatf", "quath"],
            Self::Transform => &["matrix4d"],
        }
    }
}

/// One applied transform op: kind, optional name suffix, inversion flag and
/// the authored value.
#[derive(Debug, Clone, PartialEq)]
pub struct XformOp {
    pub kind: XformOpKind,
    /// `xformOp:translate:pivot` carries suffix `pivot`.
    pub suffix: String,
    pub inverted: bool,
    pub value: Option<PrimVar>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Xform {
    pub ops: Vec<XformOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubdivisionScheme {
    None,
    #[default]
    CatmullClark,
    Bilinear,
    Loop,
}

impl SubdivisionScheme {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "none" => Self::None,
            "catmullClark" => Self::CatmullClark,
            "bilinear" => Self::Bilinear,
            "loop" => Self::Loop,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeomMesh {
    pub points: Vec<Point3f>,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub subdivision_scheme: SubdivisionScheme,
    pub double_sided: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeomSphere {
    pub radius: f64,
}

impl Default for GeomSphere {
    fn default() -> Self {
        Self { radius: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeomCube {
    pub size: f64,
}

impl Default for GeomCube {
    fn default() -> Self {
        Self { size: 2.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeomCone {
    pub radius: f64,
    pub height: f64,
}

impl Default for GeomCone {
    fn default() -> Self {
        Self {
            radius: 1.0,
            height: 2.0,
        }
    }
}

/// Unlike Cone, cylinders carry an authored spine `axis`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeomCylinder {
    pub radius: f64,
    pub height: f64,
    pub axis: Axis,
}

impl Default for GeomCylinder {
    fn default() -> Self {
        Self {
            radius: 1.0,
            height: 2.0,
            axis: Axis::Z,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeomCapsule {
    pub radius: f64,
    pub height: f64,
    pub axis: Axis,
}

impl Default for GeomCapsule {
    fn default() -> Self {
        Self {
            radius: 0.5,
            height: 1.0,
            axis: Axis::Z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeomBasisCurves {
    pub curve_vertex_counts: Vec<i32>,
    pub points: Vec<Point3f>,
    pub curve_type: Option<Token>,
    pub basis: Option<Token>,
    pub wrap: Option<Token>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeomPoints {
    pub points: Vec<Point3f>,
    pub widths: Vec<f32>,
}

/// `indices` are validated non-negative and stored unsigned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeomSubset {
    pub element_type: Option<Token>,
    pub family_name: Option<Token>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraProjection {
    #[default]
    Perspective,
    Orthographic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeomCamera {
    pub projection: CameraProjection,
    pub focal_length: f32,
    pub horizontal_aperture: f32,
    pub vertical_aperture: f32,
    pub clipping_range: [f32; 2],
}

impl Default for GeomCamera {
    fn default() -> Self {
        Self {
            projection: CameraProjection::Perspective,
            focal_length: 50.0,
            horizontal_aperture: 20.955,
            vertical_aperture: 15.2908,
            clipping_range: [1.0, 1_000_000.0],
        }
    }
}

/// Shader sub-type selected by `info:id`.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderNode {
    PreviewSurface(UsdPreviewSurface),
    UvTexture(UsdUVTexture),
    PrimvarReaderFloat2(UsdPrimvarReaderFloat2),
    /// Unsupported id, preserved with a warning.
    Unknown(Token),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsdPreviewSurface {
    pub diffuse_color: Option<[f32; 3]>,
    pub metallic: Option<f32>,
    pub roughness: Option<f32>,
    pub opacity: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsdUVTexture {
    pub file: Option<crate::value::AssetPath>,
    pub st_connection: Option<Path>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsdPrimvarReaderFloat2 {
    pub varname: Option<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub info_id: Token,
    pub node: ShaderNode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Material {
    /// `outputs:surface` connection.
    pub surface: Option<Path>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LuxLight {
    pub intensity: Option<f32>,
    pub color: Option<[f32; 3]>,
    /// Sphere/disk/cylinder radius, when the light type has one.
    pub radius: Option<f32>,
    /// Distant-light angle.
    pub angle: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skeleton {
    pub joints: Vec<Token>,
    pub bind_transforms: Vec<crate::value::Matrix4d>,
    pub rest_transforms: Vec<crate::value::Matrix4d>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkelAnimation {
    pub joints: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendShape {
    pub offsets: Vec<crate::value::Vector3f>,
    pub point_indices: Vec<i32>,
}

/// Typed payload per schema; anything unrecognized is a `GPrim`.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimData {
    Xform(Xform),
    Scope,
    Mesh(GeomMesh),
    Sphere(GeomSphere),
    Cube(GeomCube),
    Cone(GeomCone),
    Cylinder(GeomCylinder),
    Capsule(GeomCapsule),
    BasisCurves(GeomBasisCurves),
    Points(GeomPoints),
    GeomSubset(GeomSubset),
    Camera(GeomCamera),
    Shader(Shader),
    Material(Material),
    NodeGraph,
    SphereLight(LuxLight),
    DomeLight(LuxLight),
    DiskLight(LuxLight),
    DistantLight(LuxLight),
    CylinderLight(LuxLight),
    SkelRoot,
    Skeleton(Skeleton),
    SkelAnimation(SkelAnimation),
    BlendShape(BlendShape),
    GPrim,
}

impl PrimData {
    pub fn type_label(&self) -> &'static str {
        match self {
            PrimData::Xform(_) => "Xform",
            PrimData::Scope => "Scope",
            PrimData::Mesh(_) => "Mesh",
            PrimData::Sphere(_) => "Sphere",
            PrimData::Cube(_) => "Cube",
            PrimData::Cone(_) => "Cone",
            PrimData::Cylinder(_) => "Cylinder",
            PrimData::Capsule(_) => "Capsule",
            PrimData::BasisCurves(_) => "BasisCurves",
            PrimData::Points(_) => "Points",
            PrimData::GeomSubset(_) => "GeomSubset",
            PrimData::Camera(_) => "Camera",
            PrimData::Shader(_) => "Shader",
            PrimData::Material(_) => "Material",
            PrimData::NodeGraph => "NodeGraph",
            PrimData::SphereLight(_) => "SphereLight",
            PrimData::DomeLight(_) => "DomeLight",
            PrimData::DiskLight(_) => "DiskLight",
            PrimData::DistantLight(_) => "DistantLight",
            PrimData::CylinderLight(_) => "CylinderLight",
            PrimData::SkelRoot => "SkelRoot",
            PrimData::Skeleton(_) => "Skeleton",
            PrimData::SkelAnimation(_) => "SkelAnimation",
            PrimData::BlendShape(_) => "BlendShape",
            PrimData::GPrim => "GPrim",
        }
    }
}

/// A composed, typed scene node. Every authored property survives in
/// `props`; the typed payload is a validated view over the hallmark ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Prim {
    pub name: String,
    pub path: Path,
    /// The authored type token (may differ from the payload for GPrims).
    pub type_name: Option<Token>,
    pub specifier: Specifier,
    pub metas: PrimMetas,
    pub props: PropertyMap,
    /// `material:binding` relationship target, when authored.
    pub material_binding: Option<Path>,
    pub data: PrimData,
    pub children: Vec<Prim>,
}

impl Prim {
    pub fn child(&self, name: &str) -> Option<&Prim> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// The composed scene graph. Immutable after reconstruction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stage {
    pub metas: LayerMetas,
    pub root_prims: Vec<Prim>,
}

impl Stage {
    pub fn find_prim_at_path(&self, path: &Path) -> Option<&Prim> {
        if !path.is_absolute() {
            return None;
        }
        let mut components = path.components();
        let first = components.next()?;
        let mut current = self.root_prims.iter().find(|p| p.name == first)?;
        for name in components {
            current = current.child(name)?;
        }
        Some(current)
    }

    /// Depth-first visit of every prim.
    pub fn visit_prims<'a>(&'a self, f: &mut dyn FnMut(&'a Prim)) {
        fn rec<'a>(prim: &'a Prim, f: &mut dyn FnMut(&'a Prim)) {
            f(prim);
            for child in &prim.children {
                rec(child, f);
            }
        }
        for prim in &self.root_prims {
            rec(prim, f);
        }
    }

    /// Serialize back to USDA text.
    pub fn export_to_string(&self) -> String {
        crate::pprint::stage_to_usda(self)
    }
}
