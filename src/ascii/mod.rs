//! Hand-written recursive-descent parser for the USDA text form.
//!
//! Produces a [`Layer`] of [`PrimSpec`]s. Errors carry the (row, col) of the
//! failing token; recoverable conditions (unknown metadata, unknown prim
//! types) are collected as warnings instead.

mod lexer;
mod registry;
mod values;

use std::collections::BTreeMap;

pub use lexer::{Lexer, StringData};
pub use registry::{API_SCHEMAS, PRIM_TYPES, is_known_api_schema, is_known_prim_type};

use crate::error::{Result, TextPos, UsdError, Warnings};
use crate::layer::{
    AttrMeta, Attribute, Axis, Layer, LayerMetas, ListEditQual, PrimMetas, PrimSpec, PrimVar,
    Property, PropertyMap, RelTargets, Relationship, Specifier, VariantContent, Variability,
};
use crate::path::Path;
use crate::strutil;
use crate::value::{self, MetaVariable, Reference, Token, Value};

/// How the document being parsed was reached. Referenced and payloaded
/// layers do not themselves pull in sublayers; the grammar is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Toplevel,
    Sublayer,
    Reference,
    Payload,
}

/// Nesting bound for prim blocks and variant sets.
const MAX_PRIM_NEST: u32 = 1024;

/// Parse a USDA document into a layer.
pub fn parse_usda(bytes: &[u8], load_state: LoadState) -> Result<(Layer, Warnings)> {
    let mut parser = AsciiParser::new(bytes, load_state)?;
    let layer = parser.parse()?;
    Ok((layer, parser.warnings))
}

pub struct AsciiParser<'a> {
    lex: Lexer<'a>,
    warnings: Warnings,
    /// Error frames pushed on the way out of a failing parse; the newest
    /// frame is the surfaced diagnostic.
    err_frames: Vec<(TextPos, String)>,
    load_state: LoadState,
}

impl<'a> AsciiParser<'a> {
    pub fn new(bytes: &'a [u8], load_state: LoadState) -> Result<Self> {
        Ok(Self {
            lex: Lexer::new(bytes)?,
            warnings: Warnings::new(),
            err_frames: Vec::new(),
            load_state,
        })
    }

    pub fn error_frames(&self) -> &[(TextPos, String)] {
        &self.err_frames
    }

    fn fail(&mut self, pos: TextPos, msg: impl Into<String>) -> UsdError {
        let msg = msg.into();
        self.err_frames.push((pos, msg.clone()));
        UsdError::parse(pos, msg)
    }

    pub fn parse(&mut self) -> Result<Layer> {
        let mut layer = Layer::new();
        self.parse_magic()?;

        self.lex.skip_whitespace_and_comments();
        if self.lex.peek_char() == Some('(') {
            let mut metas = LayerMetas::default();
            self.parse_stage_metas(&mut metas)?;
            layer.metas = metas;
        }

        loop {
            self.lex.skip_whitespace_and_comments();
            if self.lex.eof() {
                break;
            }
            let pos = self.lex.pos();
            let word = self.lex.read_identifier()?;
            let Some(specifier) = specifier_for(&word) else {
                return Err(self.fail(pos, format!("`def`, `over` or `class` expected, found `{word}`")));
            };
            let prim = self.parse_prim(specifier, 0)?;
            if layer.prim_specs.iter().any(|p| p.name == prim.name) {
                return Err(self.fail(pos, format!("duplicate root prim name `{}`", prim.name)));
            }
            layer.prim_specs.push(prim);
        }

        Ok(layer)
    }

    // -- header ------------------------------------------------------------

    fn parse_magic(&mut self) -> Result<()> {
        // The magic line looks like a comment, so it is matched before any
        // comment skipping.
        while matches!(
            self.lex.peek_char(),
            Some(' ') | Some('\t') | Some('\x0c') | Some('\n') | Some('\r')
        ) {
            self.lex.next_char();
        }
        if !self.lex.starts_with("#usda") {
            return Err(UsdError::Format("missing `#usda 1.0` magic".to_string()));
        }
        for _ in 0.."#usda".len() {
            self.lex.next_char();
        }
        self.lex.skip_inline_whitespace();
        let mut version = String::new();
        while let Some(c) = self.lex.peek_char() {
            if c == '\n' || c == '\r' {
                break;
            }
            version.push(c);
            self.lex.next_char();
        }
        let version = version.trim();
        if version != "1.0" {
            return Err(UsdError::Format(format!(
                "unsupported USDA version `{version}`"
            )));
        }
        Ok(())
    }

    // -- stage metadata ----------------------------------------------------

    fn parse_stage_metas(&mut self, metas: &mut LayerMetas) -> Result<()> {
        self.lex.expect_char('(')?;
        loop {
            self.lex.skip_whitespace_and_comments();
            match self.lex.peek_char() {
                Some(')') => {
                    self.lex.next_char();
                    return Ok(());
                }
                Some('"') | Some('\'') => {
                    // A bare (doc)string in the meta block.
                    let s = self.lex.read_string_literal()?;
                    metas.comment = Some(s.value);
                    continue;
                }
                None => {
                    let pos = self.lex.pos();
                    return Err(self.fail(pos, "unterminated stage metadata block"));
                }
                _ => {}
            }

            let pos = self.lex.pos();
            let mut word = self.lex.read_identifier()?;
            let mut qual = ListEditQual::ResetToExplicit;
            if let Some(q) = list_edit_for(&word) {
                qual = q;
                self.lex.skip_inline_whitespace();
                word = self.lex.read_identifier()?;
            }

            let Some(def) = registry::lookup(registry::STAGE_METAS, &word) else {
                self.warnings
                    .push_at(pos, format!("unknown stage metadatum `{word}`"));
                self.skim_meta_value()?;
                continue;
            };

            self.lex.skip_whitespace_and_comments();
            self.lex.expect_char('=')?;
            self.lex.skip_whitespace_and_comments();
            if self.lex.peek_char() == Some('[') && !def.allow_array {
                return Err(self.fail(pos, format!("`{}` does not accept an array value", def.key)));
            }

            match def.name {
                "doc" => metas.doc = Some(values::parse_string(&mut self.lex)?),
                "comment" => metas.comment = Some(values::parse_string(&mut self.lex)?),
                "metersPerUnit" => metas.meters_per_unit = Some(self.lex.read_f64()?),
                "timeCodesPerSecond" => {
                    metas.time_codes_per_second = Some(self.lex.read_f64()?);
                }
                "framesPerSecond" => metas.frames_per_second = Some(self.lex.read_f64()?),
                "startTimeCode" => metas.start_time_code = Some(self.lex.read_f64()?),
                "endTimeCode" => metas.end_time_code = Some(self.lex.read_f64()?),
                "defaultPrim" => {
                    metas.default_prim = Some(values::parse_token(&mut self.lex)?);
                }
                "upAxis" => {
                    let tok = values::parse_token(&mut self.lex)?;
                    let Some(axis) = Axis::parse(tok.as_str()) else {
                        return Err(self.fail(pos, format!("invalid upAxis `{tok}`")));
                    };
                    metas.up_axis = Some(axis);
                }
                "customLayerData" => {
                    metas.custom_layer_data =
                        Some(values::parse_dictionary(&mut self.lex, 0)?);
                }
                "subLayers" => {
                    let assets = if self.lex.peek_char() == Some('[') {
                        match values::parse_value_of_type(&mut self.lex, "asset", true, 0)? {
                            Value::AssetArray(v) => v,
                            _ => Vec::new(),
                        }
                    } else {
                        vec![values::parse_asset(&mut self.lex)?]
                    };
                    if matches!(self.load_state, LoadState::Reference | LoadState::Payload) {
                        self.warnings.push_at(
                            pos,
                            "subLayers in a referenced layer are not loaded".to_string(),
                        );
                    }
                    metas.sub_layers = assets;
                }
                "apiSchemas" => {
                    let tokens = self.parse_api_schemas(pos)?;
                    metas.api_schemas = Some((qual, tokens));
                }
                other => {
                    return Err(self.fail(pos, format!("unhandled stage metadatum `{other}`")));
                }
            }
        }
    }

    fn parse_api_schemas(&mut self, pos: TextPos) -> Result<Vec<Token>> {
        let tokens = match values::parse_value_of_type(&mut self.lex, "token", true, 0)? {
            Value::TokenArray(v) => v,
            _ => Vec::new(),
        };
        for t in &tokens {
            if !registry::is_known_api_schema(t.as_str()) {
                return Err(self.fail(pos, format!("unknown API schema `{t}`")));
            }
        }
        Ok(tokens)
    }

    /// Consume an unknown metadatum's value: balanced braces/brackets/parens,
    /// a quoted string, or the rest of the line.
    fn skim_meta_value(&mut self) -> Result<()> {
        self.lex.skip_inline_whitespace();
        if self.lex.peek_char() == Some('=') {
            self.lex.next_char();
            self.lex.skip_whitespace_and_comments();
        }
        match self.lex.peek_char() {
            Some('"') | Some('\'') => {
                self.lex.read_string_literal()?;
            }
            Some(open @ ('{' | '[' | '(')) => {
                let close = match open {
                    '{' => '}',
                    '[' => ']',
                    _ => ')',
                };
                let mut depth = 0u32;
                loop {
                    match self.lex.peek_char() {
                        Some('"') | Some('\'') => {
                            self.lex.read_string_literal()?;
                        }
                        Some(c) => {
                            self.lex.next_char();
                            if c == open {
                                depth += 1;
                            } else if c == close {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                        }
                        None => {
                            let pos = self.lex.pos();
                            return Err(self.fail(pos, "unterminated metadata value"));
                        }
                    }
                }
            }
            _ => {
                while let Some(c) = self.lex.peek_char() {
                    if c == '\n' || c == '\r' || c == ')' {
                        break;
                    }
                    self.lex.next_char();
                }
            }
        }
        Ok(())
    }

    // -- prims -------------------------------------------------------------

    fn parse_prim(&mut self, specifier: Specifier, depth: u32) -> Result<PrimSpec> {
        if depth > MAX_PRIM_NEST {
            let pos = self.lex.pos();
            return Err(self.fail(pos, "prim nesting too deep"));
        }

        self.lex.skip_inline_whitespace();

        // Optional prim type before the quoted name.
        let mut type_name: Option<Token> = None;
        if matches!(self.lex.peek_char(), Some(c) if c.is_alphabetic() || c == '_') {
            let pos = self.lex.pos();
            let ty = self.lex.read_identifier()?;
            if !registry::is_known_prim_type(&ty) {
                self.warnings
                    .push_at(pos, format!("unknown prim type `{ty}`"));
            }
            type_name = Some(Token::new(ty));
        }

        self.lex.skip_inline_whitespace();
        let name_pos = self.lex.pos();
        let name = self.lex.read_string_literal()?.value;
        if !strutil::is_valid_utf8_identifier(&name) {
            return Err(self.fail(name_pos, format!("invalid prim name `{name}`")));
        }

        let mut prim = PrimSpec::new(name, specifier);
        prim.type_name = type_name;

        self.lex.skip_whitespace_and_comments();
        if self.lex.peek_char() == Some('(') {
            let mut metas = PrimMetas::default();
            self.parse_prim_metas(&mut metas)?;
            prim.metas = metas;
        }

        self.lex.skip_whitespace_and_comments();
        self.lex.expect_char('{')?;
        let body = self.parse_prim_body(depth, true)?;
        prim.properties = body.properties;
        prim.children = body.children;
        prim.variant_sets = body.variant_sets;
        Ok(prim)
    }

    fn parse_prim_metas(&mut self, metas: &mut PrimMetas) -> Result<()> {
        self.lex.expect_char('(')?;
        loop {
            self.lex.skip_whitespace_and_comments();
            match self.lex.peek_char() {
                Some(')') => {
                    self.lex.next_char();
                    return Ok(());
                }
                Some('"') | Some('\'') => {
                    let s = self.lex.read_string_literal()?;
                    metas.comment = Some(s.value);
                    continue;
                }
                None => {
                    let pos = self.lex.pos();
                    return Err(self.fail(pos, "unterminated prim metadata block"));
                }
                _ => {}
            }

            let pos = self.lex.pos();
            let mut word = self.lex.read_identifier()?;
            let mut qual = ListEditQual::ResetToExplicit;
            if let Some(q) = list_edit_for(&word) {
                qual = q;
                self.lex.skip_inline_whitespace();
                word = self.lex.read_identifier()?;
            }

            let Some(def) = registry::lookup(registry::PRIM_METAS, &word) else {
                self.warnings
                    .push_at(pos, format!("unknown prim metadatum `{word}`"));
                self.skim_meta_value()?;
                continue;
            };

            self.lex.skip_whitespace_and_comments();
            self.lex.expect_char('=')?;
            self.lex.skip_whitespace_and_comments();
            if self.lex.peek_char() == Some('[') && !def.allow_array {
                return Err(self.fail(pos, format!("`{}` does not accept an array value", def.key)));
            }

            match def.name {
                "kind" => {
                    let tok = values::parse_token(&mut self.lex)?;
                    if !registry::KIND_TOKENS.contains(&tok.as_str()) {
                        self.warnings
                            .push_at(pos, format!("unknown kind `{tok}`"));
                    }
                    metas.kind = Some(tok);
                }
                "doc" => metas.doc = Some(values::parse_string(&mut self.lex)?),
                "active" => metas.active = Some(values::parse_bool(&mut self.lex)?),
                "hidden" => metas.hidden = Some(values::parse_bool(&mut self.lex)?),
                "customData" => {
                    metas.custom_data = Some(values::parse_dictionary(&mut self.lex, 0)?);
                }
                "assetInfo" => {
                    metas.asset_info = Some(values::parse_dictionary(&mut self.lex, 0)?);
                }
                "references" | "payload" => {
                    let refs = self.parse_reference_list()?;
                    if def.name == "references" {
                        metas.references = Some((qual, refs));
                    } else {
                        metas.payload = Some((qual, refs));
                    }
                }
                "inherits" | "specializes" => {
                    let paths = self.parse_path_list()?;
                    if def.name == "inherits" {
                        metas.inherits = Some((qual, paths));
                    } else {
                        metas.specializes = Some((qual, paths));
                    }
                }
                "variantSets" => {
                    let names = if self.lex.peek_char() == Some('[') {
                        match values::parse_value_of_type(&mut self.lex, "string", true, 0)? {
                            Value::StringArray(v) => v,
                            _ => Vec::new(),
                        }
                    } else {
                        vec![values::parse_string(&mut self.lex)?]
                    };
                    metas.variant_sets = Some((qual, names));
                }
                "variants" => {
                    let dict = values::parse_dictionary(&mut self.lex, 0)?;
                    let mut selections = BTreeMap::new();
                    for (key, meta) in &dict {
                        let Value::String(sel) = &meta.value else {
                            return Err(self.fail(
                                pos,
                                format!("variant selection `{key}` must be a string"),
                            ));
                        };
                        selections.insert(key.clone(), sel.clone());
                    }
                    metas.variants = Some(selections);
                }
                "apiSchemas" => {
                    let tokens = self.parse_api_schemas(pos)?;
                    metas.api_schemas = Some((qual, tokens));
                }
                other => {
                    return Err(self.fail(pos, format!("unhandled prim metadatum `{other}`")));
                }
            }
        }
    }

    fn parse_reference_list(&mut self) -> Result<Vec<Reference>> {
        if self.lex.starts_with("None") {
            for _ in 0..4 {
                self.lex.next_char();
            }
            return Ok(Vec::new());
        }
        if self.lex.peek_char() == Some('[') {
            values::parse_array(&mut self.lex, values::parse_reference)
        } else {
            Ok(vec![values::parse_reference(&mut self.lex)?])
        }
    }

    fn parse_path_list(&mut self) -> Result<Vec<Path>> {
        if self.lex.peek_char() == Some('[') {
            values::parse_array(&mut self.lex, values::parse_path_value)
        } else {
            Ok(vec![values::parse_path_value(&mut self.lex)?])
        }
    }

    // -- prim bodies -------------------------------------------------------

    fn parse_prim_body(&mut self, depth: u32, allow_variant_sets: bool) -> Result<BodyContent> {
        let mut body = BodyContent::default();
        loop {
            self.lex.skip_whitespace_and_comments();
            match self.lex.peek_char() {
                Some('}') => {
                    self.lex.next_char();
                    return Ok(body);
                }
                Some(';') => {
                    self.lex.next_char();
                    continue;
                }
                None => {
                    let pos = self.lex.pos();
                    return Err(self.fail(pos, "unterminated prim body"));
                }
                _ => {}
            }

            let pos = self.lex.pos();
            let word = self.lex.read_identifier()?;

            if let Some(specifier) = specifier_for(&word) {
                let child = self.parse_prim(specifier, depth + 1)?;
                if !body
                    .children
                    .iter()
                    .all(|c: &PrimSpec| c.name != child.name)
                {
                    return Err(self.fail(pos, format!("duplicate child prim `{}`", child.name)));
                }
                body.children.push(child);
                continue;
            }

            if word == "variantSet" {
                if !allow_variant_sets {
                    return Err(self.fail(
                        pos,
                        "variantSet statements may not nest inside a variant branch",
                    ));
                }
                let (set_name, variants) = self.parse_variant_set(depth)?;
                body.variant_sets.insert(set_name, variants);
                continue;
            }

            let prop = self.parse_property(pos, word)?;
            // `.connect`/`.timeSamples` statements may complete an attribute
            // that was declared earlier.
            let mut merged = false;
            if let Some(Property::Attribute(existing)) = body.properties.get_mut(prop.name()) {
                let Property::Attribute(update) = &prop else {
                    return Err(self.fail(pos, format!("duplicate property `{}`", prop.name())));
                };
                if !update.connection_paths.is_empty() {
                    existing
                        .connection_paths
                        .extend(update.connection_paths.iter().cloned());
                    merged = true;
                } else if matches!(update.value, Some(PrimVar::TimeSamples(_))) {
                    existing.value = update.value.clone();
                    merged = true;
                } else {
                    return Err(self.fail(pos, format!("duplicate property `{}`", prop.name())));
                }
            }
            if merged {
                continue;
            }
            if body.properties.contains(prop.name()) {
                return Err(self.fail(pos, format!("duplicate property `{}`", prop.name())));
            }
            body.properties.insert(prop);
        }
    }

    fn parse_property(&mut self, pos: TextPos, first_word: String) -> Result<Property> {
        let mut word = first_word;
        let mut list_edit = ListEditQual::ResetToExplicit;
        let mut is_custom = false;
        let mut uniform = false;

        if let Some(q) = list_edit_for(&word) {
            list_edit = q;
            self.lex.skip_inline_whitespace();
            word = self.lex.read_identifier()?;
        }
        if word == "custom" {
            is_custom = true;
            self.lex.skip_inline_whitespace();
            word = self.lex.read_identifier()?;
        }
        if word == "uniform" {
            uniform = true;
            self.lex.skip_inline_whitespace();
            word = self.lex.read_identifier()?;
        }

        if word == "rel" {
            return self.parse_relationship(list_edit, is_custom);
        }

        // `word` is the declared type, optionally array-suffixed.
        let mut type_name = word;
        if self.lex.starts_with("[]") {
            self.lex.next_char();
            self.lex.next_char();
            type_name.push_str("[]");
        }
        let (base, is_array) = values::split_array_suffix(&type_name);
        if !value::is_registered_type_name(base) {
            return Err(self.fail(pos, format!("unknown attribute type `{base}`")));
        }
        let base = base.to_string();

        self.lex.skip_inline_whitespace();
        let name_pos = self.lex.pos();
        let attr_name = self.lex.read_identifier()?;
        if !strutil::is_valid_property_name(&attr_name) {
            return Err(self.fail(name_pos, format!("invalid property name `{attr_name}`")));
        }

        let mut attr = Attribute::new(attr_name, type_name.clone());
        attr.is_custom = is_custom;
        attr.list_edit = list_edit;
        if uniform {
            attr.variability = Variability::Uniform;
        }

        // Optional `.connect` / `.timeSamples` suffix.
        if self.lex.peek_char() == Some('.') {
            self.lex.next_char();
            let suffix_pos = self.lex.pos();
            let suffix = self.lex.read_identifier()?;
            match suffix.as_str() {
                "connect" => {
                    self.lex.skip_whitespace_and_comments();
                    self.lex.expect_char('=')?;
                    self.lex.skip_whitespace_and_comments();
                    attr.connection_paths = self.parse_path_list()?;
                    self.parse_optional_attr_metas(&mut attr.metas)?;
                    return Ok(Property::Attribute(attr));
                }
                "timeSamples" => {
                    self.lex.skip_whitespace_and_comments();
                    self.lex.expect_char('=')?;
                    self.lex.skip_whitespace_and_comments();
                    let ts = values::parse_time_samples(&mut self.lex, &base, is_array)?;
                    attr.value = Some(PrimVar::TimeSamples(ts));
                    self.parse_optional_attr_metas(&mut attr.metas)?;
                    return Ok(Property::Attribute(attr));
                }
                other => {
                    return Err(self.fail(
                        suffix_pos,
                        format!("only `.connect` and `.timeSamples` are allowed, found `.{other}`"),
                    ));
                }
            }
        }

        self.lex.skip_inline_whitespace();
        if self.lex.peek_char() == Some('=') {
            self.lex.next_char();
            self.lex.skip_whitespace_and_comments();
            let v = values::parse_value_of_type(&mut self.lex, &base, is_array, 0)?;
            attr.value = Some(PrimVar::Scalar(v));
        }

        self.parse_optional_attr_metas(&mut attr.metas)?;
        Ok(Property::Attribute(attr))
    }

    fn parse_relationship(
        &mut self,
        list_edit: ListEditQual,
        is_custom: bool,
    ) -> Result<Property> {
        self.lex.skip_inline_whitespace();
        let name_pos = self.lex.pos();
        let name = self.lex.read_identifier()?;
        if !strutil::is_valid_property_name(&name) {
            return Err(self.fail(name_pos, format!("invalid relationship name `{name}`")));
        }

        let mut rel = Relationship {
            name,
            targets: RelTargets::NotAuthored,
            is_custom,
            list_edit,
            metas: Default::default(),
        };

        self.lex.skip_inline_whitespace();
        if self.lex.peek_char() == Some('=') {
            self.lex.next_char();
            self.lex.skip_whitespace_and_comments();
            rel.targets = match self.lex.peek_char() {
                Some('<') => RelTargets::Single(values::parse_path_value(&mut self.lex)?),
                Some('[') => RelTargets::Multiple(
                    values::parse_array(&mut self.lex, values::parse_path_value)?,
                ),
                Some('"') | Some('\'') => {
                    RelTargets::Placeholder(values::parse_string(&mut self.lex)?)
                }
                _ if self.lex.starts_with("None") => {
                    for _ in 0..4 {
                        self.lex.next_char();
                    }
                    RelTargets::Blocked
                }
                other => {
                    let pos = self.lex.pos();
                    return Err(self.fail(
                        pos,
                        format!("relationship target expected, found {other:?}"),
                    ));
                }
            };
        }

        self.parse_optional_attr_metas(&mut rel.metas)?;
        Ok(Property::Relationship(rel))
    }

    fn parse_optional_attr_metas(&mut self, metas: &mut AttrMeta) -> Result<()> {
        self.lex.skip_inline_whitespace();
        if self.lex.peek_char() != Some('(') {
            return Ok(());
        }
        self.lex.next_char();
        loop {
            self.lex.skip_whitespace_and_comments();
            match self.lex.peek_char() {
                Some(')') => {
                    self.lex.next_char();
                    return Ok(());
                }
                Some('"') | Some('\'') => {
                    let s = self.lex.read_string_literal()?;
                    metas.doc = Some(s.value);
                    continue;
                }
                None => {
                    let pos = self.lex.pos();
                    return Err(self.fail(pos, "unterminated attribute metadata block"));
                }
                _ => {}
            }

            let pos = self.lex.pos();
            let word = self.lex.read_identifier()?;
            let Some(def) = registry::lookup(registry::PROP_METAS, &word) else {
                self.warnings
                    .push_at(pos, format!("unknown attribute metadatum `{word}`"));
                self.skim_meta_value()?;
                continue;
            };

            self.lex.skip_whitespace_and_comments();
            self.lex.expect_char('=')?;
            self.lex.skip_whitespace_and_comments();

            match def.name {
                "interpolation" => {
                    let tok = values::parse_token(&mut self.lex)?;
                    if !registry::INTERPOLATION_TOKENS.contains(&tok.as_str()) {
                        return Err(self.fail(pos, format!("invalid interpolation `{tok}`")));
                    }
                    metas.interpolation = Some(tok);
                }
                "elementSize" => {
                    let n = self.lex.read_i64()?;
                    let n = u32::try_from(n)
                        .map_err(|_| self.fail(pos, format!("invalid elementSize {n}")))?;
                    metas.element_size = Some(n);
                }
                "colorSpace" => {
                    metas.color_space = Some(values::parse_token(&mut self.lex)?);
                }
                "customData" => {
                    metas.custom_data = Some(values::parse_dictionary(&mut self.lex, 0)?);
                }
                "doc" => metas.doc = Some(values::parse_string(&mut self.lex)?),
                "hidden" => metas.hidden = Some(values::parse_bool(&mut self.lex)?),
                "weight" => metas.weight = Some(self.lex.read_f64()?),
                other => {
                    // Registered keys without a first-class field are carried
                    // as metadata variables.
                    let v = values::parse_value_of_type(&mut self.lex, def.type_name, false, 0)?;
                    metas.others.insert(
                        other.to_string(),
                        MetaVariable {
                            name: other.to_string(),
                            type_name: def.type_name.to_string(),
                            value: v,
                        },
                    );
                }
            }
        }
    }

    // -- variant sets ------------------------------------------------------

    fn parse_variant_set(
        &mut self,
        depth: u32,
    ) -> Result<(String, BTreeMap<String, VariantContent>)> {
        if depth > MAX_PRIM_NEST {
            let pos = self.lex.pos();
            return Err(self.fail(pos, "variantSet nesting too deep"));
        }
        self.lex.skip_inline_whitespace();
        let set_name = self.lex.read_string_literal()?.value;
        self.lex.skip_whitespace_and_comments();
        self.lex.expect_char('=')?;
        self.lex.skip_whitespace_and_comments();
        self.lex.expect_char('{')?;

        let mut variants = BTreeMap::new();
        loop {
            self.lex.skip_whitespace_and_comments();
            match self.lex.peek_char() {
                Some('}') => {
                    self.lex.next_char();
                    return Ok((set_name, variants));
                }
                Some('"') | Some('\'') => {}
                other => {
                    let pos = self.lex.pos();
                    return Err(self.fail(
                        pos,
                        format!("variant name or `}}` expected, found {other:?}"),
                    ));
                }
            }

            let variant_pos = self.lex.pos();
            let variant_name = self.lex.read_string_literal()?.value;

            self.lex.skip_whitespace_and_comments();
            if self.lex.peek_char() == Some('(') {
                // Branch-level metadata has no slot in the data model.
                self.warnings.push_at(
                    variant_pos,
                    format!("metadata on variant `{variant_name}` is ignored"),
                );
                let mut discard = PrimMetas::default();
                self.parse_prim_metas(&mut discard)?;
                self.lex.skip_whitespace_and_comments();
            }

            self.lex.expect_char('{')?;
            let body = self.parse_prim_body(depth + 1, false)?;
            if variants.contains_key(&variant_name) {
                return Err(self.fail(
                    variant_pos,
                    format!("duplicate variant `{variant_name}` in set `{set_name}`"),
                ));
            }
            variants.insert(
                variant_name,
                VariantContent {
                    properties: body.properties,
                    children: body.children,
                },
            );
        }
    }
}

#[derive(Default)]
struct BodyContent {
    properties: PropertyMap,
    children: Vec<PrimSpec>,
    variant_sets: BTreeMap<String, BTreeMap<String, VariantContent>>,
}

fn specifier_for(word: &str) -> Option<Specifier> {
    match word {
        "def" => Some(Specifier::Def),
        "over" => Some(Specifier::Over),
        "class" => Some(Specifier::Class),
        _ => None,
    }
}

fn list_edit_for(word: &str) -> Option<ListEditQual> {
    match word {
        "add" => Some(ListEditQual::Add),
        "prepend" => Some(ListEditQual::Prepend),
        "append" => Some(ListEditQual::Append),
        "delete" => Some(ListEditQual::Delete),
        "reorder" => Some(ListEditQual::Reorder),
        _ => None,
    }
}
