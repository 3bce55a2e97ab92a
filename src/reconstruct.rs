//! Lowering a composed [`Layer`] to a typed [`Stage`].
//!
//! Dispatch is a closed switch on the prim-type token. Validators map
//! hallmark properties onto the typed structs; a missing or type-mismatched
//! required property is a schema error. Unknown prim types fall back to a
//! generic GPrim with a warning (an error in strict mode).

use crate::error::{Result, UsdError, Warnings};
use crate::layer::{Axis, Layer, PrimSpec, PrimVar, RelTargets, Specifier};
use crate::path::Path;
use crate::stage::*;
use crate::value::{Matrix4d, Point3f, Token, Value, Vector3f};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconstructOptions {
    /// Strict mode turns unknown prim types and shader ids into errors.
    pub strict: bool,
}

/// Lower a composed layer to a stage. The layer is not referenced by the
/// returned stage.
pub fn layer_to_stage(
    layer: &Layer,
    options: ReconstructOptions,
) -> Result<(Stage, Warnings)> {
    let mut warnings = Warnings::new();
    let mut root_prims = Vec::new();
    for spec in &layer.prim_specs {
        // Pure class templates never become prims.
        if spec.specifier == Specifier::Class {
            continue;
        }
        root_prims.push(reconstruct_prim(spec, &Path::root(), options, &mut warnings)?);
    }
    Ok((
        Stage {
            metas: layer.metas.clone(),
            root_prims,
        },
        warnings,
    ))
}

fn reconstruct_prim(
    spec: &PrimSpec,
    parent: &Path,
    options: ReconstructOptions,
    warnings: &mut Warnings,
) -> Result<Prim> {
    let path = parent.append_prim(&spec.name);
    let type_token = spec.type_name.clone();
    let type_name = type_token.as_ref().map(|t| t.as_str().to_string());

    let data = match type_name.as_deref() {
        Some("Xform") => PrimData::Xform(build_xform(spec)?),
        Some("Scope") => PrimData::Scope,
        Some("Mesh") => PrimData::Mesh(build_mesh(spec)?),
        Some("Sphere") => PrimData::Sphere(build_sphere(spec)?),
        Some("Cube") => PrimData::Cube(build_cube(spec)?),
        Some("Cone") => PrimData::Cone(build_cone(spec)?),
        Some("Cylinder") => PrimData::Cylinder(build_cylinder(spec)?),
        Some("Capsule") => PrimData::Capsule(build_capsule(spec)?),
        Some("BasisCurves") => PrimData::BasisCurves(build_basis_curves(spec)?),
        Some("Points") => PrimData::Points(build_points(spec)?),
        Some("GeomSubset") => PrimData::GeomSubset(build_geom_subset(spec)?),
        Some("Camera") => PrimData::Camera(build_camera(spec)?),
        Some("Shader") => PrimData::Shader(build_shader(spec, options, warnings)?),
        Some("Material") => PrimData::Material(build_material(spec)),
        Some("NodeGraph") => PrimData::NodeGraph,
        Some("SphereLight") => PrimData::SphereLight(build_light(spec)?),
        Some("DomeLight") => PrimData::DomeLight(build_light(spec)?),
        Some("DiskLight") => PrimData::DiskLight(build_light(spec)?),
        Some("DistantLight") => PrimData::DistantLight(build_light(spec)?),
        Some("CylinderLight") => PrimData::CylinderLight(build_light(spec)?),
        Some("SkelRoot") => PrimData::SkelRoot,
        Some("Skeleton") => PrimData::Skeleton(build_skeleton(spec)?),
        Some("SkelAnimation") => PrimData::SkelAnimation(build_skel_animation(spec)?),
        Some("BlendShape") => PrimData::BlendShape(build_blend_shape(spec)?),
        Some("GPrim") | None => PrimData::GPrim,
        Some(other) => {
            if options.strict {
                return Err(UsdError::Schema(format!(
                    "unknown prim type `{other}` at `{path}`"
                )));
            }
            warnings.push(format!(
                "unknown prim type `{other}` at `{path}`; reconstructing as GPrim"
            ));
            PrimData::GPrim
        }
    };

    let material_binding = material_binding_of(spec);

    let mut children = Vec::new();
    for child in &spec.children {
        if child.specifier == Specifier::Class {
            continue;
        }
        children.push(reconstruct_prim(child, &path, options, warnings)?);
    }

    Ok(Prim {
        name: spec.name.clone(),
        path,
        type_name: type_token,
        specifier: spec.specifier,
        metas: spec.metas.clone(),
        props: spec.properties.clone(),
        material_binding,
        data,
        children,
    })
}

fn material_binding_of(spec: &PrimSpec) -> Option<Path> {
    let rel = spec.properties.get("material:binding")?.as_relationship()?;
    match &rel.targets {
        RelTargets::Single(p) => Some(p.clone()),
        RelTargets::Multiple(ps) => ps.first().cloned(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Typed property access
// ---------------------------------------------------------------------------

fn schema_err(prim: &PrimSpec, msg: impl std::fmt::Display) -> UsdError {
    UsdError::Schema(format!("prim `{}`: {msg}", prim.name))
}

/// Default-value scalar of an attribute, `None` when unauthored, blocked or
/// animated.
fn scalar_of<'a>(spec: &'a PrimSpec, name: &str) -> Option<&'a Value> {
    let attr = spec.properties.get(name)?.as_attribute()?;
    match &attr.value {
        Some(PrimVar::Scalar(v)) if !v.is_block() => Some(v),
        _ => None,
    }
}

/// Typed extraction with a schema error on a type mismatch.
fn typed_of<'a, T: crate::value::ValueType>(
    spec: &'a PrimSpec,
    name: &str,
) -> Result<Option<&'a T>> {
    let Some(v) = scalar_of(spec, name) else {
        return Ok(None);
    };
    v.get::<T>().map(Some).ok_or_else(|| {
        schema_err(
            spec,
            format!(
                "property `{name}` expected `{}`, found `{}`",
                T::TYPE_NAME,
                v.type_name()
            ),
        )
    })
}

fn f64_of(spec: &PrimSpec, name: &str) -> Result<Option<f64>> {
    match scalar_of(spec, name) {
        None => Ok(None),
        Some(Value::Double(x)) => Ok(Some(*x)),
        Some(Value::Float(x)) => Ok(Some(f64::from(*x))),
        Some(v) => Err(schema_err(
            spec,
            format!("property `{name}` expected `double`, found `{}`", v.type_name()),
        )),
    }
}

fn f32_of(spec: &PrimSpec, name: &str) -> Result<Option<f32>> {
    match scalar_of(spec, name) {
        None => Ok(None),
        Some(Value::Float(x)) => Ok(Some(*x)),
        Some(Value::Double(x)) => Ok(Some(*x as f32)),
        Some(v) => Err(schema_err(
            spec,
            format!("property `{name}` expected `float`, found `{}`", v.type_name()),
        )),
    }
}

fn token_of(spec: &PrimSpec, name: &str) -> Result<Option<Token>> {
    Ok(typed_of::<Token>(spec, name)?.cloned())
}

fn axis_of(spec: &PrimSpec, name: &str) -> Result<Option<Axis>> {
    let Some(tok) = token_of(spec, name)? else {
        return Ok(None);
    };
    Axis::parse(tok.as_str())
        .map(Some)
        .ok_or_else(|| schema_err(spec, format!("invalid axis `{tok}`")))
}

// ---------------------------------------------------------------------------
// Per-schema builders
// ---------------------------------------------------------------------------

fn build_xform(spec: &PrimSpec) -> Result<Xform> {
    let Some(order) = typed_of::<Vec<Token>>(spec, "xformOpOrder")? else {
        return Ok(Xform::default());
    };

    let mut ops = Vec::with_capacity(order.len());
    for token in order {
        let raw = token.as_str();
        let (inverted, rest) = match raw.strip_prefix("!invert!") {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let mut parts = rest.splitn(3, ':');
        let ns = parts.next().unwrap_or_default();
        let op_name = parts.next().unwrap_or_default();
        let suffix = parts.next().unwrap_or_default();
        if ns != "xformOp" {
            return Err(schema_err(
                spec,
                format!("xformOpOrder entry `{raw}` is not an xformOp"),
            ));
        }
        let Some(kind) = XformOpKind::parse(op_name) else {
            return Err(schema_err(
                spec,
                format!("unknown xformOp `{op_name}` in `{raw}`"),
            ));
        };

        let attr = spec
            .properties
            .get(rest)
            .and_then(|p| p.as_attribute())
            .ok_or_else(|| {
                schema_err(spec, format!("xformOpOrder names `{raw}` but no such attribute"))
            })?;
        // Blocked values fall back to the declared type.
        let declared = attr.type_name.strip_suffix("[]").unwrap_or(&attr.type_name);
        let elem: &str = attr
            .value
            .as_ref()
            .and_then(|pv| pv.element_type_name())
            .unwrap_or(declared);
        if !kind.allowed_types().iter().any(|t| *t == elem) {
            return Err(schema_err(
                spec,
                format!(
                    "xformOp `{raw}` has type `{elem}`, allowed: {:?}",
                    kind.allowed_types()
                ),
            ));
        }

        ops.push(XformOp {
            kind,
            suffix: suffix.to_string(),
            inverted,
            value: attr.value.clone(),
        });
    }
    Ok(Xform { ops })
}

fn build_mesh(spec: &PrimSpec) -> Result<GeomMesh> {
    let mut mesh = GeomMesh::default();
    if let Some(points) = typed_of::<Vec<Point3f>>(spec, "points")? {
        mesh.points = points.clone();
    }
    if let Some(counts) = typed_of::<Vec<i32>>(spec, "faceVertexCounts")? {
        mesh.face_vertex_counts = counts.clone();
    }
    if let Some(indices) = typed_of::<Vec<i32>>(spec, "faceVertexIndices")? {
        mesh.face_vertex_indices = indices.clone();
    }
    if let Some(scheme) = token_of(spec, "subdivisionScheme")? {
        mesh.subdivision_scheme = SubdivisionScheme::parse(scheme.as_str()).ok_or_else(|| {
            schema_err(spec, format!("unknown subdivisionScheme `{scheme}`"))
        })?;
    }
    mesh.double_sided = typed_of::<bool>(spec, "doubleSided")?.copied();
    Ok(mesh)
}

fn build_sphere(spec: &PrimSpec) -> Result<GeomSphere> {
    let mut sphere = GeomSphere::default();
    if let Some(radius) = f64_of(spec, "radius")? {
        sphere.radius = radius;
    }
    Ok(sphere)
}

fn build_cube(spec: &PrimSpec) -> Result<GeomCube> {
    let mut cube = GeomCube::default();
    if let Some(size) = f64_of(spec, "size")? {
        cube.size = size;
    }
    Ok(cube)
}

fn build_cone(spec: &PrimSpec) -> Result<GeomCone> {
    let mut cone = GeomCone::default();
    if let Some(radius) = f64_of(spec, "radius")? {
        cone.radius = radius;
    }
    if let Some(height) = f64_of(spec, "height")? {
        cone.height = height;
    }
    Ok(cone)
}

fn build_cylinder(spec: &PrimSpec) -> Result<GeomCylinder> {
    let mut cylinder = GeomCylinder::default();
    if let Some(radius) = f64_of(spec, "radius")? {
        cylinder.radius = radius;
    }
    if let Some(height) = f64_of(spec, "height")? {
        cylinder.height = height;
    }
    if let Some(axis) = axis_of(spec, "axis")? {
        cylinder.axis = axis;
    }
    Ok(cylinder)
}

fn build_capsule(spec: &PrimSpec) -> Result<GeomCapsule> {
    let mut capsule = GeomCapsule::default();
    if let Some(radius) = f64_of(spec, "radius")? {
        capsule.radius = radius;
    }
    if let Some(height) = f64_of(spec, "height")? {
        capsule.height = height;
    }
    if let Some(axis) = axis_of(spec, "axis")? {
        capsule.axis = axis;
    }
    Ok(capsule)
}

fn build_basis_curves(spec: &PrimSpec) -> Result<GeomBasisCurves> {
    let mut curves = GeomBasisCurves::default();
    if let Some(counts) = typed_of::<Vec<i32>>(spec, "curveVertexCounts")? {
        curves.curve_vertex_counts = counts.clone();
    }
    if let Some(points) = typed_of::<Vec<Point3f>>(spec, "points")? {
        curves.points = points.clone();
    }
    curves.curve_type = token_of(spec, "type")?;
    curves.basis = token_of(spec, "basis")?;
    curves.wrap = token_of(spec, "wrap")?;
    Ok(curves)
}

fn build_points(spec: &PrimSpec) -> Result<GeomPoints> {
    let mut points = GeomPoints::default();
    if let Some(p) = typed_of::<Vec<Point3f>>(spec, "points")? {
        points.points = p.clone();
    }
    if let Some(w) = typed_of::<Vec<f32>>(spec, "widths")? {
        points.widths = w.clone();
    }
    Ok(points)
}

fn build_geom_subset(spec: &PrimSpec) -> Result<GeomSubset> {
    let mut subset = GeomSubset {
        element_type: token_of(spec, "elementType")?,
        family_name: token_of(spec, "familyName")?,
        indices: Vec::new(),
    };
    if let Some(indices) = typed_of::<Vec<i32>>(spec, "indices")? {
        subset.indices = indices
            .iter()
            .map(|&i| {
                u32::try_from(i)
                    .map_err(|_| schema_err(spec, format!("negative subset index {i}")))
            })
            .collect::<Result<_>>()?;
    }
    Ok(subset)
}

fn build_camera(spec: &PrimSpec) -> Result<GeomCamera> {
    let mut camera = GeomCamera::default();
    if let Some(projection) = token_of(spec, "projection")? {
        camera.projection = match projection.as_str() {
            "perspective" => CameraProjection::Perspective,
            "orthographic" => CameraProjection::Orthographic,
            other => {
                return Err(schema_err(spec, format!("invalid projection `{other}`")));
            }
        };
    }
    if let Some(x) = f32_of(spec, "focalLength")? {
        camera.focal_length = x;
    }
    if let Some(x) = f32_of(spec, "horizontalAperture")? {
        camera.horizontal_aperture = x;
    }
    if let Some(x) = f32_of(spec, "verticalAperture")? {
        camera.vertical_aperture = x;
    }
    if let Some(range) = typed_of::<[f32; 2]>(spec, "clippingRange")? {
        camera.clipping_range = *range;
    }
    Ok(camera)
}

fn build_shader(
    spec: &PrimSpec,
    options: ReconstructOptions,
    warnings: &mut Warnings,
) -> Result<Shader> {
    let info_id = token_of(spec, "info:id")?
        .ok_or_else(|| schema_err(spec, "Shader requires `info:id`"))?;

    let node = match info_id.as_str() {
        "UsdPreviewSurface" => ShaderNode::PreviewSurface(UsdPreviewSurface {
            diffuse_color: typed_of::<crate::value::Color3f>(spec, "inputs:diffuseColor")?
                .map(|c| c.0),
            metallic: f32_of(spec, "inputs:metallic")?,
            roughness: f32_of(spec, "inputs:roughness")?,
            opacity: f32_of(spec, "inputs:opacity")?,
        }),
        "UsdUVTexture" => {
            let st_connection = spec
                .properties
                .get("inputs:st")
                .and_then(|p| p.as_attribute())
                .and_then(|a| a.connection_paths.first().cloned());
            ShaderNode::UvTexture(UsdUVTexture {
                file: typed_of::<crate::value::AssetPath>(spec, "inputs:file")?.cloned(),
                st_connection,
            })
        }
        "UsdPrimvarReader_float2" => ShaderNode::PrimvarReaderFloat2(UsdPrimvarReaderFloat2 {
            varname: token_of(spec, "inputs:varname")?,
        }),
        other => {
            if options.strict {
                return Err(schema_err(spec, format!("unsupported shader id `{other}`")));
            }
            warnings.push(format!("unsupported shader id `{other}`"));
            ShaderNode::Unknown(info_id.clone())
        }
    };

    Ok(Shader { info_id, node })
}

fn build_material(spec: &PrimSpec) -> Material {
    let surface = spec
        .properties
        .get("outputs:surface")
        .and_then(|p| p.as_attribute())
        .and_then(|a| a.connection_paths.first().cloned());
    Material { surface }
}

fn build_light(spec: &PrimSpec) -> Result<LuxLight> {
    Ok(LuxLight {
        intensity: f32_of(spec, "inputs:intensity")?,
        color: typed_of::<crate::value::Color3f>(spec, "inputs:color")?.map(|c| c.0),
        radius: f32_of(spec, "inputs:radius")?,
        angle: f32_of(spec, "inputs:angle")?,
    })
}

fn build_skeleton(spec: &PrimSpec) -> Result<Skeleton> {
    Ok(Skeleton {
        joints: typed_of::<Vec<Token>>(spec, "joints")?.cloned().unwrap_or_default(),
        bind_transforms: typed_of::<Vec<Matrix4d>>(spec, "bindTransforms")?
            .cloned()
            .unwrap_or_default(),
        rest_transforms: typed_of::<Vec<Matrix4d>>(spec, "restTransforms")?
            .cloned()
            .unwrap_or_default(),
    })
}

fn build_skel_animation(spec: &PrimSpec) -> Result<SkelAnimation> {
    Ok(SkelAnimation {
        joints: typed_of::<Vec<Token>>(spec, "joints")?.cloned().unwrap_or_default(),
    })
}

fn build_blend_shape(spec: &PrimSpec) -> Result<BlendShape> {
    Ok(BlendShape {
        offsets: typed_of::<Vec<Vector3f>>(spec, "offsets")?.cloned().unwrap_or_default(),
        point_indices: typed_of::<Vec<i32>>(spec, "pointIndices")?
            .cloned()
            .unwrap_or_default(),
    })
}
