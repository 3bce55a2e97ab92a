//! Reader for the binary crate (USDC) form.
//!
//! Pipeline: read magic/TOC, load and decompress the sections (optionally in
//! parallel), validate every cross-table index, then materialize specs in
//! declaration order into a [`Layer`].

pub mod coding;
mod tables;
mod values;

pub use tables::{CrateVersion, Field, Spec, SpecType};
pub use values::ValueRep;

use std::collections::BTreeMap;

use crossbeam_channel::unbounded;

use crate::error::{Result, UsdError, Warnings};
use crate::layer::{
    Attribute, Axis, Layer, ListEditQual, PrimSpec, PrimVar, Property, RelTargets, Relationship,
    Specifier, VariantContent, Variability,
};
use crate::path::Path;
use crate::strutil;
use crate::value::{self, Token, Value};

use tables::{CrateTables, RawPaths};

#[derive(Debug, Clone)]
pub struct CrateReaderConfig {
    /// Worker threads for section decompression; `<= 1` disables the pool.
    pub num_threads: usize,
}

impl Default for CrateReaderConfig {
    fn default() -> Self {
        Self { num_threads: 1 }
    }
}

/// Parse USDC bytes into a layer.
pub fn read_usdc(data: &[u8], config: &CrateReaderConfig) -> Result<(Layer, Warnings)> {
    let (_version, toc_offset) = tables::read_header(data)?;
    let sections = tables::read_toc(data, toc_offset)?;

    let decoded = decode_sections(data, &sections, config.num_threads)?;
    let paths = tables::build_paths(&decoded.raw_paths, &decoded.tokens)?;

    let crate_tables = CrateTables {
        tokens: decoded.tokens,
        strings: decoded.strings,
        fields: decoded.fields,
        fieldsets: decoded.fieldsets,
        paths,
        specs: decoded.specs,
        values_data: tables::section_bytes(data, &sections, tables::SECTION_VALUES),
    };
    tables::validate_tables(&crate_tables)?;

    materialize(&crate_tables)
}

// ---------------------------------------------------------------------------
// Section loading
// ---------------------------------------------------------------------------

struct DecodedSections {
    tokens: Vec<String>,
    strings: Vec<u32>,
    fields: Vec<Field>,
    fieldsets: Vec<Vec<u32>>,
    raw_paths: RawPaths,
    specs: Vec<Spec>,
}

enum Decoded {
    Tokens(Vec<String>),
    Strings(Vec<u32>),
    Fields(Vec<Field>),
    FieldSets(Vec<Vec<u32>>),
    Paths(RawPaths),
    Specs(Vec<Spec>),
}

type SectionDecoder = fn(&[u8]) -> Result<Decoded>;

fn decode_sections(
    data: &[u8],
    sections: &[tables::Section],
    num_threads: usize,
) -> Result<DecodedSections> {
    let jobs: Vec<(&[u8], SectionDecoder)> = vec![
        (
            tables::section_bytes(data, sections, tables::SECTION_TOKENS),
            |b| Ok(Decoded::Tokens(tables::decode_tokens(b)?)),
        ),
        (
            tables::section_bytes(data, sections, tables::SECTION_STRINGS),
            |b| Ok(Decoded::Strings(tables::decode_strings(b)?)),
        ),
        (
            tables::section_bytes(data, sections, tables::SECTION_FIELDS),
            |b| Ok(Decoded::Fields(tables::decode_fields(b)?)),
        ),
        (
            tables::section_bytes(data, sections, tables::SECTION_FIELDSETS),
            |b| Ok(Decoded::FieldSets(tables::decode_fieldsets(b)?)),
        ),
        (
            tables::section_bytes(data, sections, tables::SECTION_PATHS),
            |b| Ok(Decoded::Paths(tables::decode_paths_raw(b)?)),
        ),
        (
            tables::section_bytes(data, sections, tables::SECTION_SPECS),
            |b| Ok(Decoded::Specs(tables::decode_specs(b)?)),
        ),
    ];

    let results = if num_threads <= 1 {
        let mut out = Vec::with_capacity(jobs.len());
        for (bytes, decode) in jobs {
            out.push(decode(bytes)?);
        }
        out
    } else {
        run_pool(jobs, num_threads)?
    };

    let mut tokens = None;
    let mut strings = None;
    let mut fields = None;
    let mut fieldsets = None;
    let mut raw_paths = None;
    let mut specs = None;
    for r in results {
        match r {
            Decoded::Tokens(v) => tokens = Some(v),
            Decoded::Strings(v) => strings = Some(v),
            Decoded::Fields(v) => fields = Some(v),
            Decoded::FieldSets(v) => fieldsets = Some(v),
            Decoded::Paths(v) => raw_paths = Some(v),
            Decoded::Specs(v) => specs = Some(v),
        }
    }
    Ok(DecodedSections {
        tokens: tokens.expect("tokens job always queued"),
        strings: strings.expect("strings job always queued"),
        fields: fields.expect("fields job always queued"),
        fieldsets: fieldsets.expect("fieldsets job always queued"),
        raw_paths: raw_paths.expect("paths job always queued"),
        specs: specs.expect("specs job always queued"),
    })
}

/// Fan section decoding out over a small worker pool.
fn run_pool(jobs: Vec<(&[u8], SectionDecoder)>, num_threads: usize) -> Result<Vec<Decoded>> {
    let n_jobs = jobs.len();
    let (job_tx, job_rx) = unbounded::<(&[u8], SectionDecoder)>();
    let (res_tx, res_rx) = unbounded::<Result<Decoded>>();
    for job in jobs {
        job_tx.send(job).expect("channel open");
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..num_threads.min(n_jobs) {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            scope.spawn(move || {
                while let Ok((bytes, decode)) = job_rx.recv() {
                    if res_tx.send(decode(bytes)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(res_tx);

        let mut out = Vec::with_capacity(n_jobs);
        for r in res_rx.iter() {
            out.push(r?);
        }
        Ok(out)
    })
}

// ---------------------------------------------------------------------------
// Materialization
// ---------------------------------------------------------------------------

/// One prim-path step: a named child or a variant branch.
enum Comp {
    Prim(String),
    Variant(String, String),
}

fn comps_of(path: &Path) -> Result<Vec<Comp>> {
    let mut comps = Vec::new();
    for raw in path.components() {
        if let Some(brace) = raw.find('{') {
            let (name, elem) = raw.split_at(brace);
            if !name.is_empty() {
                comps.push(Comp::Prim(name.to_string()));
            }
            let (set, sel) = strutil::tokenize_variant_element(elem).ok_or_else(|| {
                UsdError::integrity(
                    tables::SECTION_PATHS,
                    0,
                    format!("malformed variant element in path `{path}`"),
                )
            })?;
            comps.push(Comp::Variant(set, sel));
        } else {
            comps.push(Comp::Prim(raw.to_string()));
        }
    }
    Ok(comps)
}

enum Target<'m> {
    Prim(&'m mut PrimSpec),
    Variant(&'m mut VariantContent),
}

fn ensure_target<'m>(children: &'m mut Vec<PrimSpec>, comps: &[Comp]) -> Result<Target<'m>> {
    let (first, rest) = comps.split_first().ok_or_else(|| {
        UsdError::integrity(tables::SECTION_SPECS, 0, "empty prim path in spec")
    })?;
    let Comp::Prim(name) = first else {
        return Err(UsdError::integrity(
            tables::SECTION_SPECS,
            0,
            "variant element without an owning prim",
        ));
    };

    let idx = match children.iter().position(|c| &c.name == name) {
        Some(i) => i,
        None => {
            // Intermediate prims discovered through a deeper spec start out
            // as overlays; a dedicated Prim spec refines the specifier.
            children.push(PrimSpec::new(name.clone(), Specifier::Over));
            children.len() - 1
        }
    };
    let prim = &mut children[idx];

    let Some((next, tail)) = rest.split_first() else {
        return Ok(Target::Prim(prim));
    };
    match next {
        Comp::Prim(_) => ensure_target(&mut prim.children, rest),
        Comp::Variant(set, sel) => {
            let content = prim
                .variant_sets
                .entry(set.clone())
                .or_default()
                .entry(sel.clone())
                .or_default();
            if tail.is_empty() {
                Ok(Target::Variant(content))
            } else {
                ensure_target(&mut content.children, tail)
            }
        }
    }
}

struct Materializer<'t, 'd> {
    tables: &'t CrateTables<'d>,
    warnings: Warnings,
}

fn materialize(tables: &CrateTables<'_>) -> Result<(Layer, Warnings)> {
    let mut m = Materializer {
        tables,
        warnings: Warnings::new(),
    };
    let mut layer = Layer::new();

    for spec in &tables.specs {
        let path = &tables.paths[spec.path_index as usize];
        let fieldset = &tables.fieldsets[spec.fieldset_index as usize];
        match spec.spec_type {
            SpecType::PseudoRoot => {
                if !path.is_root() {
                    return Err(UsdError::integrity(
                        tables::SECTION_SPECS,
                        0,
                        format!("pseudo-root spec at non-root path `{path}`"),
                    ));
                }
                m.apply_layer_metas(&mut layer, fieldset)?;
            }
            SpecType::Prim | SpecType::Variant => {
                let comps = comps_of(path)?;
                match ensure_target(&mut layer.prim_specs, &comps)? {
                    Target::Prim(prim) => m.apply_prim_fields(prim, fieldset)?,
                    Target::Variant(_) => {
                        // The branch exists; its content arrives via nested
                        // prim/property specs.
                    }
                }
            }
            SpecType::VariantSet => {
                let comps = comps_of(path)?;
                let _ = ensure_target(&mut layer.prim_specs, &comps)?;
            }
            SpecType::Attribute => {
                m.apply_property_spec(&mut layer, path, fieldset, false)?;
            }
            SpecType::Relationship => {
                m.apply_property_spec(&mut layer, path, fieldset, true)?;
            }
        }
    }

    Ok((layer, m.warnings))
}

impl Materializer<'_, '_> {
    fn field_name(&self, field: &Field) -> &str {
        &self.tables.tokens[field.token as usize]
    }

    fn decode(&self, rep: ValueRep) -> Result<Value> {
        values::decode_value(self.tables, rep, 0)
    }

    fn apply_layer_metas(&mut self, layer: &mut Layer, fieldset: &[u32]) -> Result<()> {
        for &fi in fieldset {
            let field = self.tables.fields[fi as usize];
            let name = self.field_name(&field).to_string();
            match name.as_str() {
                "doc" => layer.metas.doc = self.decode_string(field.rep)?,
                "comment" => layer.metas.comment = self.decode_string(field.rep)?,
                "defaultPrim" => layer.metas.default_prim = self.decode_token(field.rep)?,
                "upAxis" => {
                    let Some(tok) = self.decode_token(field.rep)? else {
                        continue;
                    };
                    let Some(axis) = Axis::parse(tok.as_str()) else {
                        return Err(UsdError::integrity(
                            tables::SECTION_VALUES,
                            0,
                            format!("invalid upAxis `{tok}`"),
                        ));
                    };
                    layer.metas.up_axis = Some(axis);
                }
                "metersPerUnit" => layer.metas.meters_per_unit = self.decode_f64(field.rep)?,
                "timeCodesPerSecond" => {
                    layer.metas.time_codes_per_second = self.decode_f64(field.rep)?;
                }
                "framesPerSecond" => layer.metas.frames_per_second = self.decode_f64(field.rep)?,
                "startTimeCode" => layer.metas.start_time_code = self.decode_f64(field.rep)?,
                "endTimeCode" => layer.metas.end_time_code = self.decode_f64(field.rep)?,
                "subLayers" => match self.decode(field.rep)? {
                    Value::AssetArray(v) => layer.metas.sub_layers = v,
                    Value::Asset(a) => layer.metas.sub_layers = vec![a],
                    other => {
                        return Err(self.type_mismatch("subLayers", "asset[]", &other));
                    }
                },
                "customLayerData" => match self.decode(field.rep)? {
                    Value::DictionaryVal(d) => layer.metas.custom_layer_data = Some(d),
                    other => return Err(self.type_mismatch("customLayerData", "dictionary", &other)),
                },
                "apiSchemas" => match self.decode(field.rep)? {
                    Value::TokenArray(v) => {
                        layer.metas.api_schemas = Some((ListEditQual::ResetToExplicit, v));
                    }
                    other => return Err(self.type_mismatch("apiSchemas", "token[]", &other)),
                },
                other => {
                    self.warnings
                        .push(format!("unknown layer metadatum `{other}` in crate file"));
                    self.preserve_unknown(&mut layer.metas.unknown, other, field.rep)?;
                }
            }
        }
        Ok(())
    }

    fn apply_prim_fields(&mut self, prim: &mut PrimSpec, fieldset: &[u32]) -> Result<()> {
        for &fi in fieldset {
            let field = self.tables.fields[fi as usize];
            let name = self.field_name(&field).to_string();
            match name.as_str() {
                "specifier" => {
                    let Some(tok) = self.decode_token(field.rep)? else {
                        continue;
                    };
                    prim.specifier = match tok.as_str() {
                        "def" => Specifier::Def,
                        "over" => Specifier::Over,
                        "class" => Specifier::Class,
                        other => {
                            return Err(UsdError::integrity(
                                tables::SECTION_VALUES,
                                0,
                                format!("invalid specifier `{other}`"),
                            ));
                        }
                    };
                }
                "typeName" => prim.type_name = self.decode_token(field.rep)?,
                "kind" => prim.metas.kind = self.decode_token(field.rep)?,
                "active" => prim.metas.active = self.decode_bool(field.rep)?,
                "hidden" => prim.metas.hidden = self.decode_bool(field.rep)?,
                "doc" => prim.metas.doc = self.decode_string(field.rep)?,
                "comment" => prim.metas.comment = self.decode_string(field.rep)?,
                "references" | "payload" => {
                    let refs = match self.decode(field.rep)? {
                        Value::ReferenceArray(v) => v,
                        Value::ReferenceVal(r) => vec![r],
                        other => return Err(self.type_mismatch(&name, "Reference[]", &other)),
                    };
                    let slot = (ListEditQual::ResetToExplicit, refs);
                    if name == "references" {
                        prim.metas.references = Some(slot);
                    } else {
                        prim.metas.payload = Some(slot);
                    }
                }
                "inherits" | "specializes" => {
                    let paths = match self.decode(field.rep)? {
                        Value::PathArray(v) => v,
                        Value::PathVal(p) => vec![p],
                        other => return Err(self.type_mismatch(&name, "path[]", &other)),
                    };
                    let slot = (ListEditQual::ResetToExplicit, paths);
                    if name == "inherits" {
                        prim.metas.inherits = Some(slot);
                    } else {
                        prim.metas.specializes = Some(slot);
                    }
                }
                "variantSetNames" => {
                    let names = match self.decode(field.rep)? {
                        Value::StringArray(v) => v,
                        Value::TokenArray(v) => v.into_iter().map(|t| t.0).collect(),
                        other => return Err(self.type_mismatch("variantSetNames", "string[]", &other)),
                    };
                    prim.metas.variant_sets = Some((ListEditQual::ResetToExplicit, names));
                }
                "variantSelection" => {
                    let Value::DictionaryVal(dict) = self.decode(field.rep)? else {
                        return Err(UsdError::integrity(
                            tables::SECTION_VALUES,
                            0,
                            "variantSelection must be a dictionary",
                        ));
                    };
                    let mut selections = BTreeMap::new();
                    for (key, meta) in dict {
                        match meta.value {
                            Value::String(s) => {
                                selections.insert(key, s);
                            }
                            Value::TokenVal(t) => {
                                selections.insert(key, t.0);
                            }
                            _ => {
                                return Err(UsdError::integrity(
                                    tables::SECTION_VALUES,
                                    0,
                                    format!("variant selection `{key}` must be a string"),
                                ));
                            }
                        }
                    }
                    prim.metas.variants = Some(selections);
                }
                "apiSchemas" => match self.decode(field.rep)? {
                    Value::TokenArray(v) => {
                        prim.metas.api_schemas = Some((ListEditQual::ResetToExplicit, v));
                    }
                    other => return Err(self.type_mismatch("apiSchemas", "token[]", &other)),
                },
                "customData" => match self.decode(field.rep)? {
                    Value::DictionaryVal(d) => prim.metas.custom_data = Some(d),
                    other => return Err(self.type_mismatch("customData", "dictionary", &other)),
                },
                "assetInfo" => match self.decode(field.rep)? {
                    Value::DictionaryVal(d) => prim.metas.asset_info = Some(d),
                    other => return Err(self.type_mismatch("assetInfo", "dictionary", &other)),
                },
                // Child/property order is implied by spec declaration order.
                "primChildren" | "properties" => {}
                other => {
                    self.warnings
                        .push(format!("unknown prim metadatum `{other}` in crate file"));
                    self.preserve_unknown(&mut prim.metas.unknown, other, field.rep)?;
                }
            }
        }
        Ok(())
    }

    fn apply_property_spec(
        &mut self,
        layer: &mut Layer,
        path: &Path,
        fieldset: &[u32],
        is_relationship: bool,
    ) -> Result<()> {
        let prop_name = path.prop_part().to_string();
        if prop_name.is_empty() {
            return Err(UsdError::integrity(
                tables::SECTION_SPECS,
                0,
                format!("property spec without property path: `{path}`"),
            ));
        }
        let comps = comps_of(path)?;
        let properties = match ensure_target(&mut layer.prim_specs, &comps)? {
            Target::Prim(prim) => &mut prim.properties,
            Target::Variant(content) => &mut content.properties,
        };

        let prop = if is_relationship {
            Property::Relationship(self.build_relationship(prop_name.clone(), fieldset)?)
        } else {
            Property::Attribute(self.build_attribute(prop_name.clone(), fieldset)?)
        };
        if !properties.insert_new(prop) {
            return Err(UsdError::integrity(
                tables::SECTION_SPECS,
                0,
                format!("duplicate property spec `{path}`"),
            ));
        }
        Ok(())
    }

    fn build_attribute(&mut self, name: String, fieldset: &[u32]) -> Result<Attribute> {
        let mut attr = Attribute::new(name, String::new());
        for &fi in fieldset {
            let field = self.tables.fields[fi as usize];
            let fname = self.field_name(&field).to_string();
            match fname.as_str() {
                "typeName" => {
                    if let Some(tok) = self.decode_token(field.rep)? {
                        if !value::is_registered_type_name(tok.as_str()) {
                            self.warnings
                                .push(format!("unregistered attribute type `{tok}`"));
                        }
                        attr.type_name = tok.0;
                    }
                }
                "default" => {
                    attr.value = Some(PrimVar::Scalar(self.decode(field.rep)?));
                }
                "timeSamples" => {
                    let ts = values::decode_time_samples(self.tables, field.rep)?;
                    attr.value = Some(PrimVar::TimeSamples(ts));
                }
                "variability" => {
                    if let Some(tok) = self.decode_token(field.rep)? {
                        if tok.as_str() == "uniform" {
                            attr.variability = Variability::Uniform;
                        }
                    }
                }
                "custom" => attr.is_custom = self.decode_bool(field.rep)?.unwrap_or(false),
                "connectionPaths" => {
                    attr.connection_paths = match self.decode(field.rep)? {
                        Value::PathArray(v) => v,
                        Value::PathVal(p) => vec![p],
                        other => return Err(self.type_mismatch("connectionPaths", "path[]", &other)),
                    };
                }
                "interpolation" => attr.metas.interpolation = self.decode_token(field.rep)?,
                "colorSpace" => attr.metas.color_space = self.decode_token(field.rep)?,
                "elementSize" => {
                    if let Value::Int(n) = self.decode(field.rep)? {
                        attr.metas.element_size = u32::try_from(n).ok();
                    }
                }
                "hidden" => attr.metas.hidden = self.decode_bool(field.rep)?,
                "doc" => attr.metas.doc = self.decode_string(field.rep)?,
                "customData" => {
                    if let Value::DictionaryVal(d) = self.decode(field.rep)? {
                        attr.metas.custom_data = Some(d);
                    }
                }
                other => {
                    self.warnings
                        .push(format!("unknown attribute field `{other}` in crate file"));
                }
            }
        }

        // Declared type and payload type must agree, array suffix aside.
        if let Some(pv) = &attr.value {
            if let Some(elem) = pv.element_type_name() {
                let declared = attr.type_name.strip_suffix("[]").unwrap_or(&attr.type_name);
                if !declared.is_empty() && declared != elem {
                    return Err(UsdError::integrity(
                        tables::SECTION_VALUES,
                        0,
                        format!(
                            "attribute `{}` declared `{}` but carries `{elem}`",
                            attr.name, attr.type_name
                        ),
                    ));
                }
            }
        }
        Ok(attr)
    }

    fn build_relationship(&mut self, name: String, fieldset: &[u32]) -> Result<Relationship> {
        let mut rel = Relationship {
            name,
            ..Default::default()
        };
        for &fi in fieldset {
            let field = self.tables.fields[fi as usize];
            let fname = self.field_name(&field).to_string();
            match fname.as_str() {
                "targetPaths" => {
                    rel.targets = match self.decode(field.rep)? {
                        Value::PathArray(v) => RelTargets::Multiple(v),
                        Value::PathVal(p) => RelTargets::Single(p),
                        Value::Block => RelTargets::Blocked,
                        other => return Err(self.type_mismatch("targetPaths", "path[]", &other)),
                    };
                }
                "custom" => rel.is_custom = self.decode_bool(field.rep)?.unwrap_or(false),
                "hidden" => rel.metas.hidden = self.decode_bool(field.rep)?,
                "doc" => rel.metas.doc = self.decode_string(field.rep)?,
                other => {
                    self.warnings
                        .push(format!("unknown relationship field `{other}` in crate file"));
                }
            }
        }
        Ok(rel)
    }

    // -- small typed decode helpers ---------------------------------------

    fn decode_token(&self, rep: ValueRep) -> Result<Option<Token>> {
        match self.decode(rep)? {
            Value::TokenVal(t) => Ok(Some(t)),
            Value::Block => Ok(None),
            other => Err(self.type_mismatch("field", "token", &other)),
        }
    }

    fn decode_string(&self, rep: ValueRep) -> Result<Option<String>> {
        match self.decode(rep)? {
            Value::String(s) => Ok(Some(s)),
            Value::TokenVal(t) => Ok(Some(t.0)),
            Value::Block => Ok(None),
            other => Err(self.type_mismatch("field", "string", &other)),
        }
    }

    fn decode_f64(&self, rep: ValueRep) -> Result<Option<f64>> {
        match self.decode(rep)? {
            Value::Double(x) => Ok(Some(x)),
            Value::Float(x) => Ok(Some(f64::from(x))),
            Value::Int(x) => Ok(Some(f64::from(x))),
            Value::Block => Ok(None),
            other => Err(self.type_mismatch("field", "double", &other)),
        }
    }

    fn decode_bool(&self, rep: ValueRep) -> Result<Option<bool>> {
        match self.decode(rep)? {
            Value::Bool(b) => Ok(Some(b)),
            Value::Block => Ok(None),
            other => Err(self.type_mismatch("field", "bool", &other)),
        }
    }

    fn type_mismatch(&self, field: &str, expected: &str, got: &Value) -> UsdError {
        UsdError::integrity(
            tables::SECTION_VALUES,
            0,
            format!("field `{field}` expected {expected}, got {}", got.type_name()),
        )
    }

    fn preserve_unknown(
        &mut self,
        dict: &mut value::Dictionary,
        name: &str,
        rep: ValueRep,
    ) -> Result<()> {
        let value = self.decode(rep)?;
        dict.insert(
            name.to_string(),
            value::MetaVariable {
                name: name.to_string(),
                type_name: value.type_name().to_string(),
                value,
            },
        );
        Ok(())
    }
}
