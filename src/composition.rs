//! Layer composition: subLayers, references, payload, inherits, variantSets
//! and specializes, applied in the fixpoint loop of the flatten pipeline.
//!
//! Local opinions always win; arc-delivered opinions merge in as weaker.
//! Arc targets are expanded depth-first with an explicit stack keyed by the
//! unresolved asset path (or target prim path), so cycles surface as typed
//! errors naming the participants.

use std::collections::BTreeSet;

use crate::api;
use crate::ascii::LoadState;
use crate::error::{Result, UsdError, Warnings};
use crate::layer::{
    Attribute, Layer, LayerMetas, ListEditQual, PrimMetas, PrimSpec, PrimVar, Property,
    PropertyMap, RelTargets, Relationship, Specifier, VariantContent,
};
use crate::path::Path;
use crate::resolver::{AssetResolver, base_dir};
use crate::value::{LayerOffset, Value};

/// Which arcs a flatten pass is allowed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionFeatures {
    pub sub_layers: bool,
    pub inherits: bool,
    pub variant_sets: bool,
    pub references: bool,
    pub payload: bool,
    pub specializes: bool,
}

impl Default for CompositionFeatures {
    fn default() -> Self {
        Self {
            sub_layers: true,
            inherits: true,
            variant_sets: true,
            references: true,
            payload: true,
            specializes: true,
        }
    }
}

impl CompositionFeatures {
    pub fn none() -> Self {
        Self {
            sub_layers: false,
            inherits: false,
            variant_sets: false,
            references: false,
            payload: false,
            specializes: false,
        }
    }
}

pub const MAX_COMPOSITION_ITERATIONS: usize = 128;
/// Sanity bound on sublayer recursion.
pub const MAX_SUBLAYER_NESTING: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// List-edit combination
// ---------------------------------------------------------------------------

/// Combine a stronger list opinion with a weaker one under the stronger
/// side's qualifier.
pub fn list_edit_combine<T: Clone + PartialEq>(
    qual: ListEditQual,
    strong: &[T],
    weak: &[T],
) -> Vec<T> {
    match qual {
        ListEditQual::ResetToExplicit => strong.to_vec(),
        ListEditQual::Prepend => {
            let mut out = strong.to_vec();
            out.extend(weak.iter().filter(|&w| !strong.contains(w)).cloned());
            out
        }
        ListEditQual::Append | ListEditQual::Add => {
            let mut out: Vec<T> = weak
                .iter()
                .filter(|&w| !strong.contains(w))
                .cloned()
                .collect();
            out.extend(strong.iter().cloned());
            out
        }
        ListEditQual::Delete => weak
            .iter()
            .filter(|&w| !strong.contains(w))
            .cloned()
            .collect(),
        ListEditQual::Reorder => {
            let mut out: Vec<T> = strong
                .iter()
                .filter(|&s| weak.contains(s))
                .cloned()
                .collect();
            out.extend(weak.iter().filter(|&w| !strong.contains(w)).cloned());
            out
        }
    }
}

/// List-edit combination for matching array-typed values; `None` when the
/// payloads are not a combinable pair.
fn combine_array_values(qual: ListEditQual, strong: &Value, weak: &Value) -> Option<Value> {
    macro_rules! combine {
        ($($variant:ident),+ $(,)?) => {
            match (strong, weak) {
                $(
                    (Value::$variant(s), Value::$variant(w)) => {
                        Some(Value::$variant(list_edit_combine(qual, s, w)))
                    }
                )+
                _ => None,
            }
        };
    }
    combine!(
        BoolArray,
        IntArray,
        Int64Array,
        UintArray,
        Uint64Array,
        HalfArray,
        FloatArray,
        DoubleArray,
        StringArray,
        TokenArray,
        AssetArray,
        PathArray,
        ReferenceArray,
        Int2Array,
        Int3Array,
        Int4Array,
        Float2Array,
        Float3Array,
        Float4Array,
        Double2Array,
        Double3Array,
        Double4Array,
    )
}

fn merge_list_meta<T: Clone + PartialEq>(
    strong: &mut Option<(ListEditQual, Vec<T>)>,
    weak: &Option<(ListEditQual, Vec<T>)>,
) {
    match strong.take() {
        None => {
            if let Some(w) = weak {
                *strong = Some(w.clone());
            }
        }
        Some((qual, items)) => {
            if qual != ListEditQual::ResetToExplicit {
                if let Some((_, weak_items)) = weak {
                    let combined = list_edit_combine(qual, &items, weak_items);
                    *strong = Some((ListEditQual::ResetToExplicit, combined));
                    return;
                }
            }
            *strong = Some((qual, items));
        }
    }
}

// ---------------------------------------------------------------------------
// Weaker-opinion merging
// ---------------------------------------------------------------------------

fn merge_attr_weaker(strong: &mut Attribute, weak: &Attribute) {
    if strong.value.is_none() {
        strong.value = weak.value.clone();
    } else if strong.list_edit != ListEditQual::ResetToExplicit {
        if let (Some(PrimVar::Scalar(s)), Some(PrimVar::Scalar(w))) =
            (&strong.value, &weak.value)
        {
            if let Some(combined) = combine_array_values(strong.list_edit, s, w) {
                strong.value = Some(PrimVar::Scalar(combined));
                strong.list_edit = ListEditQual::ResetToExplicit;
            }
        }
    }
    if strong.connection_paths.is_empty() {
        strong.connection_paths = weak.connection_paths.clone();
    }
    let m = &mut strong.metas;
    let w = &weak.metas;
    m.interpolation = m.interpolation.take().or_else(|| w.interpolation.clone());
    m.element_size = m.element_size.or(w.element_size);
    m.color_space = m.color_space.take().or_else(|| w.color_space.clone());
    m.custom_data = m.custom_data.take().or_else(|| w.custom_data.clone());
    m.doc = m.doc.take().or_else(|| w.doc.clone());
    m.hidden = m.hidden.or(w.hidden);
    m.weight = m.weight.or(w.weight);
    for (k, v) in &w.others {
        m.others.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

fn merge_rel_weaker(strong: &mut Relationship, weak: &Relationship) {
    match (&strong.targets, &weak.targets) {
        (RelTargets::NotAuthored, _) => strong.targets = weak.targets.clone(),
        (RelTargets::Multiple(s), RelTargets::Multiple(w))
            if strong.list_edit != ListEditQual::ResetToExplicit =>
        {
            strong.targets = RelTargets::Multiple(list_edit_combine(strong.list_edit, s, w));
            strong.list_edit = ListEditQual::ResetToExplicit;
        }
        _ => {}
    }
}

fn merge_props_weaker(strong: &mut PropertyMap, weak: &PropertyMap) {
    for weak_prop in weak.iter() {
        if !strong.contains(weak_prop.name()) {
            strong.insert(weak_prop.clone());
            continue;
        }
        let existing = strong.get_mut(weak_prop.name()).expect("presence checked");
        match (existing, weak_prop) {
            (Property::Attribute(s), Property::Attribute(w)) => merge_attr_weaker(s, w),
            (Property::Relationship(s), Property::Relationship(w)) => merge_rel_weaker(s, w),
            // A name collision across property kinds: the stronger side wins.
            _ => {}
        }
    }
}

fn merge_metas_weaker(strong: &mut PrimMetas, weak: &PrimMetas) {
    strong.kind = strong.kind.take().or_else(|| weak.kind.clone());
    strong.active = strong.active.or(weak.active);
    strong.hidden = strong.hidden.or(weak.hidden);
    strong.doc = strong.doc.take().or_else(|| weak.doc.clone());
    strong.comment = strong.comment.take().or_else(|| weak.comment.clone());
    merge_list_meta(&mut strong.references, &weak.references);
    merge_list_meta(&mut strong.payload, &weak.payload);
    merge_list_meta(&mut strong.inherits, &weak.inherits);
    merge_list_meta(&mut strong.specializes, &weak.specializes);
    merge_list_meta(&mut strong.variant_sets, &weak.variant_sets);
    merge_list_meta(&mut strong.api_schemas, &weak.api_schemas);
    if let Some(weak_sel) = &weak.variants {
        let sel = strong.variants.get_or_insert_with(Default::default);
        for (k, v) in weak_sel {
            sel.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    strong.custom_data = strong.custom_data.take().or_else(|| weak.custom_data.clone());
    strong.asset_info = strong.asset_info.take().or_else(|| weak.asset_info.clone());
    for (k, v) in &weak.unknown {
        strong.unknown.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

fn merge_prim_weaker(strong: &mut PrimSpec, weak: &PrimSpec) {
    if strong.type_name.is_none() {
        strong.type_name = weak.type_name.clone();
    }
    // An overlay composed over a def becomes a def.
    if strong.specifier == Specifier::Over && weak.specifier == Specifier::Def {
        strong.specifier = Specifier::Def;
    }
    merge_props_weaker(&mut strong.properties, &weak.properties);
    merge_metas_weaker(&mut strong.metas, &weak.metas);
    merge_children_weaker(&mut strong.children, &weak.children);
    for (set_name, weak_set) in &weak.variant_sets {
        let set = strong.variant_sets.entry(set_name.clone()).or_default();
        for (variant_name, weak_content) in weak_set {
            if !set.contains_key(variant_name) {
                set.insert(variant_name.clone(), weak_content.clone());
                continue;
            }
            let content = set.get_mut(variant_name).expect("presence checked");
            merge_props_weaker(&mut content.properties, &weak_content.properties);
            merge_children_weaker(&mut content.children, &weak_content.children);
        }
    }
}

fn merge_children_weaker(strong: &mut Vec<PrimSpec>, weak: &[PrimSpec]) {
    for weak_child in weak {
        match strong.iter().position(|c| c.name == weak_child.name) {
            Some(i) => merge_prim_weaker(&mut strong[i], weak_child),
            None => strong.push(weak_child.clone()),
        }
    }
}

fn merge_layer_metas_weaker(strong: &mut LayerMetas, weak: &LayerMetas) {
    strong.doc = strong.doc.take().or_else(|| weak.doc.clone());
    strong.comment = strong.comment.take().or_else(|| weak.comment.clone());
    strong.default_prim = strong.default_prim.take().or_else(|| weak.default_prim.clone());
    strong.up_axis = strong.up_axis.or(weak.up_axis);
    strong.meters_per_unit = strong.meters_per_unit.or(weak.meters_per_unit);
    strong.time_codes_per_second = strong.time_codes_per_second.or(weak.time_codes_per_second);
    strong.frames_per_second = strong.frames_per_second.or(weak.frames_per_second);
    strong.start_time_code = strong.start_time_code.or(weak.start_time_code);
    strong.end_time_code = strong.end_time_code.or(weak.end_time_code);
    strong.custom_layer_data = strong
        .custom_layer_data
        .take()
        .or_else(|| weak.custom_layer_data.clone());
    merge_list_meta(&mut strong.api_schemas, &weak.api_schemas);
    for (k, v) in &weak.unknown {
        strong.unknown.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

fn merge_root_prims_weaker(strong: &mut Vec<PrimSpec>, weak: &[PrimSpec]) {
    merge_children_weaker(strong, weak);
}

// ---------------------------------------------------------------------------
// Tree walking
// ---------------------------------------------------------------------------

/// Visit every prim spec mutably, variant branches included.
fn for_each_prim_mut(
    prims: &mut Vec<PrimSpec>,
    f: &mut impl FnMut(&mut PrimSpec) -> Result<()>,
) -> Result<()> {
    for prim in prims {
        f(prim)?;
        for_each_prim_mut(&mut prim.children, f)?;
        for set in prim.variant_sets.values_mut() {
            for content in set.values_mut() {
                for_each_prim_mut(&mut content.children, f)?;
            }
        }
    }
    Ok(())
}

/// Scale and shift every time sample in a referenced subtree.
fn apply_layer_offset(prim: &mut PrimSpec, lo: &LayerOffset) {
    fn remap(props: &mut PropertyMap, lo: &LayerOffset) {
        for prop in props.iter_mut() {
            let Property::Attribute(attr) = prop else {
                continue;
            };
            if let Some(PrimVar::TimeSamples(ts)) = &mut attr.value {
                let mut remapped = crate::value::TimeSamples::new();
                for (t, v) in ts.iter() {
                    remapped.add(t * lo.scale + lo.offset, v.clone());
                }
                *ts = remapped;
            }
        }
    }
    remap(&mut prim.properties, lo);
    for child in &mut prim.children {
        apply_layer_offset(child, lo);
    }
    for set in prim.variant_sets.values_mut() {
        for content in set.values_mut() {
            remap(&mut content.properties, lo);
            for child in &mut content.children {
                apply_layer_offset(child, lo);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// subLayers
// ---------------------------------------------------------------------------

/// Load and merge every sublayer, recursively, weaker than the including
/// layer. Cycles are detected against the unresolved asset paths.
pub fn composite_sublayers(resolver: &AssetResolver, layer: &Layer) -> Result<(Layer, Warnings)> {
    let mut warnings = Warnings::new();
    let mut stack: Vec<BTreeSet<String>> = Vec::new();
    let out = composite_sublayers_rec(resolver, layer, "<root>", &mut stack, &mut warnings)?;
    Ok((out, warnings))
}

fn composite_sublayers_rec(
    resolver: &AssetResolver,
    in_layer: &Layer,
    in_layer_name: &str,
    stack: &mut Vec<BTreeSet<String>>,
    warnings: &mut Warnings,
) -> Result<Layer> {
    if stack.len() > MAX_SUBLAYER_NESTING {
        return Err(UsdError::Composition(
            "subLayer is nested too deeply".to_string(),
        ));
    }
    stack.push(BTreeSet::new());

    let mut out = Layer {
        metas: in_layer.metas.clone(),
        prim_specs: in_layer.prim_specs.clone(),
    };
    out.metas.sub_layers.clear();

    for sublayer in &in_layer.metas.sub_layers {
        let sublayer_path = sublayer.path.clone();

        if stack.iter().any(|frame| frame.contains(&sublayer_path)) {
            stack.pop();
            return Err(UsdError::Composition(format!(
                "circular sublayer reference detected for {sublayer_path} in {in_layer_name}"
            )));
        }

        let Some(resolved) = resolver.resolve(&sublayer_path) else {
            stack.pop();
            return Err(UsdError::Resolution(format!(
                "sublayer `{sublayer_path}` not found (cwd `{}`, search paths {:?})",
                resolver.current_working_path(),
                resolver.search_paths()
            )));
        };

        let (sub_layer, sub_warnings) =
            api::load_layer_from_file_with_state(&resolved, LoadState::Sublayer)?;
        warnings.extend(sub_warnings);

        stack
            .last_mut()
            .expect("frame pushed above")
            .insert(sublayer_path.clone());

        let mut sub_resolver = resolver.clone();
        sub_resolver.set_current_working_path(base_dir(&resolved));
        sub_resolver.add_search_path(base_dir(&resolved));

        let composited =
            composite_sublayers_rec(&sub_resolver, &sub_layer, &sublayer_path, stack, warnings)?;

        // Sublayer opinions are weaker than everything already merged.
        merge_layer_metas_weaker(&mut out.metas, &composited.metas);
        merge_root_prims_weaker(&mut out.prim_specs, &composited.prim_specs);
    }

    stack.pop();
    Ok(out)
}

// ---------------------------------------------------------------------------
// references / payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefArc {
    References,
    Payload,
}

impl RefArc {
    fn label(self) -> &'static str {
        match self {
            RefArc::References => "references",
            RefArc::Payload => "payload",
        }
    }

    fn load_state(self) -> LoadState {
        match self {
            RefArc::References => LoadState::Reference,
            RefArc::Payload => LoadState::Payload,
        }
    }

    fn take(self, metas: &mut PrimMetas) -> Option<(ListEditQual, Vec<crate::value::Reference>)> {
        match self {
            RefArc::References => metas.references.take(),
            RefArc::Payload => metas.payload.take(),
        }
    }
}

pub fn composite_references(resolver: &AssetResolver, layer: &Layer) -> Result<(Layer, Warnings)> {
    let (out, warnings, _) = composite_ref_arc(resolver, layer, RefArc::References)?;
    Ok((out, warnings))
}

pub fn composite_payload(resolver: &AssetResolver, layer: &Layer) -> Result<(Layer, Warnings)> {
    let (out, warnings, _) = composite_ref_arc(resolver, layer, RefArc::Payload)?;
    Ok((out, warnings))
}

fn composite_ref_arc(
    resolver: &AssetResolver,
    layer: &Layer,
    arc: RefArc,
) -> Result<(Layer, Warnings, usize)> {
    let mut out = layer.clone();
    let snapshot = layer.clone();
    let mut warnings = Warnings::new();
    let mut resolved = 0usize;
    let mut stack: Vec<String> = Vec::new();

    for_each_prim_mut(&mut out.prim_specs, &mut |prim| {
        expand_prim_ref_arc(
            resolver,
            &snapshot,
            prim,
            arc,
            &mut stack,
            &mut warnings,
            &mut resolved,
        )
    })?;

    Ok((out, warnings, resolved))
}

fn expand_prim_ref_arc(
    resolver: &AssetResolver,
    snapshot: &Layer,
    prim: &mut PrimSpec,
    arc: RefArc,
    stack: &mut Vec<String>,
    warnings: &mut Warnings,
    resolved: &mut usize,
) -> Result<()> {
    let Some((_qual, refs)) = arc.take(&mut prim.metas) else {
        return Ok(());
    };

    // First reference is strongest; merging weaker in order preserves that.
    for reference in &refs {
        let subtree = if reference.asset_path.path.is_empty() {
            // Internal reference into this layer.
            let Some(target) = &reference.prim_path else {
                warnings.push(format!(
                    "{} arc on `{}` has neither asset path nor prim path",
                    arc.label(),
                    prim.name
                ));
                continue;
            };
            let Some(found) = snapshot.find_prim_at_path(target) else {
                warnings.push(format!(
                    "internal {} target `{target}` not found",
                    arc.label()
                ));
                continue;
            };
            found.clone()
        } else {
            match load_reference_subtree(resolver, reference, arc, stack, warnings)? {
                Some(subtree) => subtree,
                None => continue,
            }
        };

        let mut subtree = subtree;
        if let Some(lo) = &reference.layer_offset {
            apply_layer_offset(&mut subtree, lo);
        }
        merge_prim_weaker(prim, &subtree);
        *resolved += 1;
    }
    Ok(())
}

fn load_reference_subtree(
    resolver: &AssetResolver,
    reference: &crate::value::Reference,
    arc: RefArc,
    stack: &mut Vec<String>,
    warnings: &mut Warnings,
) -> Result<Option<PrimSpec>> {
    let asset = &reference.asset_path.path;

    if stack.iter().any(|s| s == asset) {
        let mut cycle: Vec<&str> = stack.iter().map(String::as_str).collect();
        cycle.push(asset);
        return Err(UsdError::Composition(format!(
            "{} cycle detected: {}",
            arc.label(),
            cycle.join(" -> ")
        )));
    }

    let Some(resolved_path) = resolver.resolve(asset) else {
        return Err(UsdError::Resolution(format!(
            "{} target `{asset}` not found (cwd `{}`, search paths {:?})",
            arc.label(),
            resolver.current_working_path(),
            resolver.search_paths()
        )));
    };

    let (mut target_layer, sub_warnings) =
        api::load_layer_from_file_with_state(&resolved_path, arc.load_state())?;
    warnings.extend(sub_warnings);

    let mut sub_resolver = resolver.clone();
    sub_resolver.set_current_working_path(base_dir(&resolved_path));
    sub_resolver.add_search_path(base_dir(&resolved_path));

    // The referenced layer brings its own sublayer stack.
    if target_layer.has_unresolved_sublayers() {
        let mut sublayer_stack = Vec::new();
        target_layer = composite_sublayers_rec(
            &sub_resolver,
            &target_layer,
            asset,
            &mut sublayer_stack,
            warnings,
        )?;
    }

    let root = match &reference.prim_path {
        Some(target) => target_layer.find_prim_at_path(target).ok_or_else(|| {
            UsdError::Composition(format!(
                "{} target `{target}` not found in `{asset}`",
                arc.label()
            ))
        })?,
        None => target_layer.default_root_prim().ok_or_else(|| {
            UsdError::Composition(format!(
                "referenced layer `{asset}` has no default prim"
            ))
        })?,
    };
    let mut subtree = root.clone();

    // Resolve the subtree's own arcs of this kind before merging, with the
    // asset on the stack so cycles fail loudly.
    stack.push(asset.clone());
    let mut nested_resolved = 0usize;
    let snapshot = target_layer.clone();
    let result = (|| -> Result<()> {
        expand_prim_ref_arc(
            &sub_resolver,
            &snapshot,
            &mut subtree,
            arc,
            stack,
            warnings,
            &mut nested_resolved,
        )?;
        let mut children = std::mem::take(&mut subtree.children);
        for_each_prim_mut(&mut children, &mut |p| {
            expand_prim_ref_arc(
                &sub_resolver,
                &snapshot,
                p,
                arc,
                stack,
                warnings,
                &mut nested_resolved,
            )
        })?;
        subtree.children = children;
        Ok(())
    })();
    stack.pop();
    result?;

    Ok(Some(subtree))
}

// ---------------------------------------------------------------------------
// inherits / specializes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassArc {
    Inherits,
    Specializes,
}

impl ClassArc {
    fn label(self) -> &'static str {
        match self {
            ClassArc::Inherits => "inherits",
            ClassArc::Specializes => "specializes",
        }
    }

    fn take(self, metas: &mut PrimMetas) -> Option<(ListEditQual, Vec<Path>)> {
        match self {
            ClassArc::Inherits => metas.inherits.take(),
            ClassArc::Specializes => metas.specializes.take(),
        }
    }
}

pub fn composite_inherits(layer: &Layer) -> Result<(Layer, Warnings)> {
    let (out, warnings, _) = composite_class_arc(layer, ClassArc::Inherits)?;
    Ok((out, warnings))
}

/// Specializes composes like inherits but at the weakest strength; by this
/// point every other arc has already claimed its opinions, so a plain weaker
/// merge realizes that ordering.
pub fn composite_specializes(layer: &Layer) -> Result<(Layer, Warnings)> {
    let (out, warnings, _) = composite_class_arc(layer, ClassArc::Specializes)?;
    Ok((out, warnings))
}

fn composite_class_arc(layer: &Layer, arc: ClassArc) -> Result<(Layer, Warnings, usize)> {
    let mut out = layer.clone();
    let snapshot = layer.clone();
    let mut warnings = Warnings::new();
    let mut resolved = 0usize;

    for_each_prim_mut(&mut out.prim_specs, &mut |prim| {
        let Some((_qual, targets)) = arc.take(&mut prim.metas) else {
            return Ok(());
        };
        for target in &targets {
            let mut stack: Vec<Path> = Vec::new();
            let Some(subtree) =
                resolve_class_target(&snapshot, target, arc, &mut stack, &mut warnings)?
            else {
                continue;
            };
            merge_prim_weaker(prim, &subtree);
            resolved += 1;
        }
        Ok(())
    })?;

    Ok((out, warnings, resolved))
}

fn resolve_class_target(
    snapshot: &Layer,
    target: &Path,
    arc: ClassArc,
    stack: &mut Vec<Path>,
    warnings: &mut Warnings,
) -> Result<Option<PrimSpec>> {
    if stack.contains(target) {
        let mut cycle: Vec<String> = stack.iter().map(Path::to_string).collect();
        cycle.push(target.to_string());
        return Err(UsdError::Composition(format!(
            "{} cycle detected: {}",
            arc.label(),
            cycle.join(" -> ")
        )));
    }

    let Some(found) = snapshot.find_prim_at_path(target) else {
        warnings.push(format!("{} target `{target}` not found", arc.label()));
        return Ok(None);
    };
    let mut subtree = found.clone();

    // Chase the target's own class arcs depth-first.
    stack.push(target.clone());
    let result = (|| -> Result<()> {
        let nested = match arc {
            ClassArc::Inherits => subtree.metas.inherits.take(),
            ClassArc::Specializes => subtree.metas.specializes.take(),
        };
        if let Some((_qual, nested_targets)) = nested {
            for nested_target in &nested_targets {
                if let Some(base) =
                    resolve_class_target(snapshot, nested_target, arc, stack, warnings)?
                {
                    merge_prim_weaker(&mut subtree, &base);
                }
            }
        }
        Ok(())
    })();
    stack.pop();
    result?;

    Ok(Some(subtree))
}

// ---------------------------------------------------------------------------
// variantSets
// ---------------------------------------------------------------------------

pub fn composite_variant(layer: &Layer) -> Result<(Layer, Warnings)> {
    let (out, warnings, _) = composite_variant_counted(layer)?;
    Ok((out, warnings))
}

fn composite_variant_counted(layer: &Layer) -> Result<(Layer, Warnings, usize)> {
    let mut out = layer.clone();
    let mut warnings = Warnings::new();
    let mut resolved = 0usize;

    for_each_prim_mut(&mut out.prim_specs, &mut |prim| {
        let Some(selections) = prim.metas.variants.clone() else {
            return Ok(());
        };
        for (set_name, variant_name) in &selections {
            let Some(mut set) = prim.variant_sets.remove(set_name) else {
                continue;
            };
            match set.remove(variant_name) {
                Some(content) => {
                    splice_variant_content(prim, &content);
                }
                None => {
                    warnings.push(format!(
                        "variant selection `{variant_name}` not found in variantSet `{set_name}`"
                    ));
                }
            }
            resolved += 1;
        }
        Ok(())
    })?;

    Ok((out, warnings, resolved))
}

/// Selected-branch opinions are weaker than locally authored ones.
fn splice_variant_content(prim: &mut PrimSpec, content: &VariantContent) {
    merge_props_weaker(&mut prim.properties, &content.properties);
    merge_children_weaker(&mut prim.children, &content.children);
}

// ---------------------------------------------------------------------------
// Flatten driver
// ---------------------------------------------------------------------------

/// Full flatten: sublayers first, then the fixpoint loop over references,
/// payload, inherits, variants and specializes.
pub fn composite(
    resolver: &AssetResolver,
    layer: &Layer,
    features: &CompositionFeatures,
) -> Result<(Layer, Warnings)> {
    let mut warnings = Warnings::new();
    let mut src = layer.clone();

    if features.sub_layers && src.has_unresolved_sublayers() {
        let (composited, w) = composite_sublayers(resolver, &src)?;
        warnings.extend(w);
        src = composited;
    }

    let mut iterations = 0usize;
    loop {
        if iterations >= MAX_COMPOSITION_ITERATIONS {
            return Err(UsdError::Composition(format!(
                "composition did not converge after {MAX_COMPOSITION_ITERATIONS} iterations"
            )));
        }
        iterations += 1;

        let mut progressed = false;

        if features.references && src.check_unresolved_references() {
            let (out, w, n) = composite_ref_arc(resolver, &src, RefArc::References)?;
            warnings.extend(w);
            progressed |= n > 0;
            src = out;
        }
        if features.payload && src.check_unresolved_payload() {
            let (out, w, n) = composite_ref_arc(resolver, &src, RefArc::Payload)?;
            warnings.extend(w);
            progressed |= n > 0;
            src = out;
        }
        if features.inherits && src.check_unresolved_inherits() {
            let (out, w, n) = composite_class_arc(&src, ClassArc::Inherits)?;
            warnings.extend(w);
            progressed |= n > 0;
            src = out;
        }
        if features.variant_sets && src.check_unresolved_variant() {
            let (out, w, n) = composite_variant_counted(&src)?;
            warnings.extend(w);
            progressed |= n > 0;
            src = out;
        }
        if features.specializes && src.check_unresolved_specializes() {
            let (out, w, n) = composite_class_arc(&src, ClassArc::Specializes)?;
            warnings.extend(w);
            progressed |= n > 0;
            src = out;
        }

        let unresolved = (features.references && src.check_unresolved_references())
            || (features.payload && src.check_unresolved_payload())
            || (features.inherits && src.check_unresolved_inherits())
            || (features.variant_sets && src.check_unresolved_variant())
            || (features.specializes && src.check_unresolved_specializes());

        if !unresolved || !progressed {
            break;
        }
    }

    // Anything still authored (disabled feature or non-converging arc) is
    // reported; the layer itself stays valid.
    let mut remaining = Vec::new();
    if src.check_unresolved_references() {
        remaining.push("references");
    }
    if src.check_unresolved_payload() {
        remaining.push("payload");
    }
    if src.check_unresolved_inherits() {
        remaining.push("inherits");
    }
    if src.check_unresolved_variant() {
        remaining.push("variantSets");
    }
    if src.check_unresolved_specializes() {
        remaining.push("specializes");
    }
    if !remaining.is_empty() {
        warnings.push(format!(
            "unresolved composition arcs remain after flattening: {}",
            remaining.join(", ")
        ));
    }

    Ok((src, warnings))
}
