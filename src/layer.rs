//! The authored (pre-composition) data model: `Layer`, `PrimSpec`,
//! properties, relationships and metadata.
//!
//! Layers are produced by exactly one of the three readers and are immutable
//! inputs to composition; composition produces a new `Layer` owning its data.

use std::collections::BTreeMap;

use crate::path::Path;
use crate::value::{AssetPath, Dictionary, Reference, TimeSamples, Token, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Specifier {
    #[default]
    Def,
    Over,
    Class,
}

impl Specifier {
    pub fn keyword(self) -> &'static str {
        match self {
            Specifier::Def => "def",
            Specifier::Over => "over",
            Specifier::Class => "class",
        }
    }
}

/// List-edit qualifier governing how list-valued opinions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListEditQual {
    /// No qualifier authored: the list replaces weaker opinions outright.
    #[default]
    ResetToExplicit,
    Add,
    Prepend,
    Append,
    Delete,
    Reorder,
}

impl ListEditQual {
    pub fn keyword(self) -> &'static str {
        match self {
            ListEditQual::ResetToExplicit => "",
            ListEditQual::Add => "add",
            ListEditQual::Prepend => "prepend",
            ListEditQual::Append => "append",
            ListEditQual::Delete => "delete",
            ListEditQual::Reorder => "reorder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variability {
    #[default]
    Varying,
    Uniform,
}

/// Attribute (and relationship) metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttrMeta {
    pub interpolation: Option<Token>,
    pub element_size: Option<u32>,
    pub color_space: Option<Token>,
    pub custom_data: Option<Dictionary>,
    pub doc: Option<String>,
    pub hidden: Option<bool>,
    pub weight: Option<f64>,
    /// Registered-but-untyped keys, preserved as authored.
    pub others: Dictionary,
}

impl AttrMeta {
    pub fn is_empty(&self) -> bool {
        self.interpolation.is_none()
            && self.element_size.is_none()
            && self.color_space.is_none()
            && self.custom_data.is_none()
            && self.doc.is_none()
            && self.hidden.is_none()
            && self.weight.is_none()
            && self.others.is_empty()
    }
}

/// An attribute's authored data: a single value or a time-sample map.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimVar {
    Scalar(Value),
    TimeSamples(TimeSamples),
}

impl PrimVar {
    /// Element type name of the payload, ignoring `[]`; `None` for a blocked
    /// scalar or an all-blocked sample map.
    pub fn element_type_name(&self) -> Option<&'static str> {
        match self {
            PrimVar::Scalar(Value::Block) => None,
            PrimVar::Scalar(v) => Some(v.element_type_name()),
            PrimVar::TimeSamples(ts) => ts.element_type_name(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            PrimVar::Scalar(v) => Some(v),
            PrimVar::TimeSamples(_) => None,
        }
    }

    pub fn as_timesamples(&self) -> Option<&TimeSamples> {
        match self {
            PrimVar::TimeSamples(ts) => Some(ts),
            PrimVar::Scalar(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// Declared type name, `[]`-suffixed for arrays.
    pub type_name: String,
    pub variability: Variability,
    pub is_custom: bool,
    pub list_edit: ListEditQual,
    /// `None` when the attribute was declared without a value.
    pub value: Option<PrimVar>,
    /// Targets of `.connect` statements.
    pub connection_paths: Vec<Path>,
    pub metas: AttrMeta,
}

impl Attribute {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            variability: Variability::default(),
            is_custom: false,
            list_edit: ListEditQual::default(),
            value: None,
            connection_paths: Vec::new(),
            metas: AttrMeta::default(),
        }
    }

    /// Authored erase: `float a = None`.
    pub fn is_blocked(&self) -> bool {
        matches!(self.value, Some(PrimVar::Scalar(Value::Block)))
    }
}

/// Relationship targets.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RelTargets {
    /// Declared without any target (`rel skel:skeleton`).
    #[default]
    NotAuthored,
    Single(Path),
    Multiple(Vec<Path>),
    /// A quoted-string placeholder target.
    Placeholder(String),
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relationship {
    pub name: String,
    pub targets: RelTargets,
    pub is_custom: bool,
    pub list_edit: ListEditQual,
    pub metas: AttrMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Attribute(Attribute),
    Relationship(Relationship),
}

impl Property {
    pub fn name(&self) -> &str {
        match self {
            Property::Attribute(a) => &a.name,
            Property::Relationship(r) => &r.name,
        }
    }

    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Property::Attribute(a) => Some(a),
            Property::Relationship(_) => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Property::Relationship(r) => Some(r),
            Property::Attribute(_) => None,
        }
    }
}

/// Insertion-ordered property map with unique names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyMap {
    entries: Vec<Property>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.entries.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.entries.iter_mut().find(|p| p.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace, preserving the original position on replace.
    pub fn insert(&mut self, prop: Property) {
        match self.entries.iter().position(|p| p.name() == prop.name()) {
            Some(i) => self.entries[i] = prop,
            None => self.entries.push(prop),
        }
    }

    /// Insert only if absent; returns false when the name is taken.
    pub fn insert_new(&mut self, prop: Property) -> bool {
        if self.contains(prop.name()) {
            return false;
        }
        self.entries.push(prop);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        let idx = self.entries.iter().position(|p| p.name() == name)?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Property> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Property> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for p in iter {
            map.insert(p);
        }
        map
    }
}

/// One selectable branch of a variant set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariantContent {
    pub properties: PropertyMap,
    pub children: Vec<PrimSpec>,
}

/// Prim-level metadata, including the composition arcs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimMetas {
    pub kind: Option<Token>,
    pub active: Option<bool>,
    pub hidden: Option<bool>,
    pub doc: Option<String>,
    pub references: Option<(ListEditQual, Vec<Reference>)>,
    pub payload: Option<(ListEditQual, Vec<Reference>)>,
    pub inherits: Option<(ListEditQual, Vec<Path>)>,
    pub specializes: Option<(ListEditQual, Vec<Path>)>,
    /// The `variantSets` declaration list.
    pub variant_sets: Option<(ListEditQual, Vec<String>)>,
    /// Authored variant selections (string-valued only).
    pub variants: Option<BTreeMap<String, String>>,
    pub api_schemas: Option<(ListEditQual, Vec<Token>)>,
    pub custom_data: Option<Dictionary>,
    pub asset_info: Option<Dictionary>,
    pub comment: Option<String>,
    /// Unknown-but-preserved metadata.
    pub unknown: Dictionary,
}

/// An authored scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimSpec {
    pub name: String,
    pub specifier: Specifier,
    pub type_name: Option<Token>,
    pub properties: PropertyMap,
    pub metas: PrimMetas,
    pub children: Vec<PrimSpec>,
    /// variantSet name → variant name → content.
    pub variant_sets: BTreeMap<String, BTreeMap<String, VariantContent>>,
}

impl PrimSpec {
    pub fn new(name: impl Into<String>, specifier: Specifier) -> Self {
        Self {
            name: name.into(),
            specifier,
            type_name: None,
            properties: PropertyMap::new(),
            metas: PrimMetas::default(),
            children: Vec::new(),
            variant_sets: BTreeMap::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&PrimSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut PrimSpec> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Append a child; returns false when the name is already taken.
    pub fn add_child(&mut self, child: PrimSpec) -> bool {
        if self.child(&child.name).is_some() {
            return false;
        }
        self.children.push(child);
        true
    }

    fn has_unresolved(&self, which: UnresolvedArc) -> bool {
        let here = match which {
            UnresolvedArc::References => self.metas.references.is_some(),
            UnresolvedArc::Payload => self.metas.payload.is_some(),
            UnresolvedArc::Inherits => self.metas.inherits.is_some(),
            UnresolvedArc::Specializes => self.metas.specializes.is_some(),
            UnresolvedArc::Variant => self
                .metas
                .variants
                .as_ref()
                .is_some_and(|sel| sel.keys().any(|k| self.variant_sets.contains_key(k))),
        };
        if here {
            return true;
        }
        let in_children = self.children.iter().any(|c| c.has_unresolved(which));
        if in_children {
            return true;
        }
        self.variant_sets.values().any(|set| {
            set.values()
                .any(|content| content.children.iter().any(|c| c.has_unresolved(which)))
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum UnresolvedArc {
    References,
    Payload,
    Inherits,
    Specializes,
    Variant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }

    /// Case-sensitive, per the stage-meta registry.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "X" => Some(Axis::X),
            "Y" => Some(Axis::Y),
            "Z" => Some(Axis::Z),
            _ => None,
        }
    }
}

/// Stage/layer metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerMetas {
    pub doc: Option<String>,
    pub comment: Option<String>,
    pub default_prim: Option<Token>,
    pub up_axis: Option<Axis>,
    pub meters_per_unit: Option<f64>,
    pub time_codes_per_second: Option<f64>,
    pub frames_per_second: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,
    pub sub_layers: Vec<AssetPath>,
    pub custom_layer_data: Option<Dictionary>,
    pub api_schemas: Option<(ListEditQual, Vec<Token>)>,
    /// Unknown stage metadata preserved as raw values.
    pub unknown: Dictionary,
}

/// A single document: metadata plus a PrimSpec forest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layer {
    pub metas: LayerMetas,
    pub prim_specs: Vec<PrimSpec>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the prim spec at an absolute prim path.
    pub fn find_prim_at_path(&self, path: &Path) -> Option<&PrimSpec> {
        if !path.is_absolute() {
            return None;
        }
        let mut components = path.components();
        let first = components.next()?;
        let mut current = self.prim_specs.iter().find(|p| p.name == first)?;
        for name in components {
            current = current.child(name)?;
        }
        Some(current)
    }

    pub fn root_prim(&self, name: &str) -> Option<&PrimSpec> {
        self.prim_specs.iter().find(|p| p.name == name)
    }

    /// Default-prim selection: the authored `defaultPrim` if present, else
    /// the first root prim.
    pub fn default_root_prim(&self) -> Option<&PrimSpec> {
        if let Some(token) = &self.metas.default_prim {
            return self.root_prim(token.as_str());
        }
        self.prim_specs.first()
    }

    pub fn check_unresolved_references(&self) -> bool {
        self.any_prim(UnresolvedArc::References)
    }

    pub fn check_unresolved_payload(&self) -> bool {
        self.any_prim(UnresolvedArc::Payload)
    }

    pub fn check_unresolved_inherits(&self) -> bool {
        self.any_prim(UnresolvedArc::Inherits)
    }

    pub fn check_unresolved_specializes(&self) -> bool {
        self.any_prim(UnresolvedArc::Specializes)
    }

    pub fn check_unresolved_variant(&self) -> bool {
        self.any_prim(UnresolvedArc::Variant)
    }

    pub fn has_unresolved_sublayers(&self) -> bool {
        !self.metas.sub_layers.is_empty()
    }

    fn any_prim(&self, which: UnresolvedArc) -> bool {
        self.prim_specs.iter().any(|p| p.has_unresolved(which))
    }

    /// Depth-first visit of every prim spec (variant branches excluded).
    pub fn visit_prims<'a>(&'a self, f: &mut dyn FnMut(&Path, &'a PrimSpec)) {
        fn rec<'a>(prim: &'a PrimSpec, at: &Path, f: &mut dyn FnMut(&Path, &'a PrimSpec)) {
            let here = at.append_prim(&prim.name);
            f(&here, prim);
            for child in &prim.children {
                rec(child, &here, f);
            }
        }
        for prim in &self.prim_specs {
            rec(prim, &Path::root(), f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, type_name: &str, v: Value) -> Property {
        let mut a = Attribute::new(name, type_name);
        a.value = Some(PrimVar::Scalar(v));
        Property::Attribute(a)
    }

    #[test]
    fn property_map_is_insertion_ordered_and_unique() {
        let mut props = PropertyMap::new();
        assert!(props.insert_new(attr("b", "int", Value::Int(1))));
        assert!(props.insert_new(attr("a", "int", Value::Int(2))));
        assert!(!props.insert_new(attr("b", "int", Value::Int(3))));
        let names: Vec<&str> = props.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["b", "a"]);

        props.insert(attr("b", "int", Value::Int(9)));
        let names: Vec<&str> = props.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn find_prim_at_path_walks_children() {
        let mut root = PrimSpec::new("Root", Specifier::Def);
        let mut mid = PrimSpec::new("Mid", Specifier::Def);
        mid.add_child(PrimSpec::new("Leaf", Specifier::Def));
        root.add_child(mid);
        let layer = Layer {
            metas: LayerMetas::default(),
            prim_specs: vec![root],
        };

        let p = Path::parse("/Root/Mid/Leaf").unwrap();
        assert_eq!(layer.find_prim_at_path(&p).unwrap().name, "Leaf");
        assert!(layer.find_prim_at_path(&Path::parse("/Root/Nope").unwrap()).is_none());
        assert!(layer.find_prim_at_path(&Path::parse("Root").unwrap()).is_none());
    }

    #[test]
    fn unresolved_arc_checks_recurse() {
        let mut leaf = PrimSpec::new("Leaf", Specifier::Def);
        leaf.metas.references = Some((ListEditQual::default(), vec![Reference::default()]));
        let mut root = PrimSpec::new("Root", Specifier::Def);
        root.add_child(leaf);
        let layer = Layer {
            metas: LayerMetas::default(),
            prim_specs: vec![root],
        };
        assert!(layer.check_unresolved_references());
        assert!(!layer.check_unresolved_payload());
        assert!(!layer.check_unresolved_variant());
    }

    #[test]
    fn variant_needs_both_sets_and_selection() {
        let mut prim = PrimSpec::new("P", Specifier::Def);
        prim.variant_sets
            .entry("shape".to_string())
            .or_default()
            .insert("sphere".to_string(), VariantContent::default());
        let layer = Layer {
            metas: LayerMetas::default(),
            prim_specs: vec![prim.clone()],
        };
        // Sets without a selection: nothing to expand.
        assert!(!layer.check_unresolved_variant());

        prim.metas.variants = Some(BTreeMap::from([(
            "shape".to_string(),
            "sphere".to_string(),
        )]));
        let layer = Layer {
            metas: LayerMetas::default(),
            prim_specs: vec![prim],
        };
        assert!(layer.check_unresolved_variant());
    }
}
