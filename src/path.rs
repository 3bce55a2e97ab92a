//! Scene-graph paths: `/A/B.attr`, relative forms, and variant elements.

use std::fmt;

use crate::strutil;

/// A prim path with an optional property part.
///
/// The prim part is the slash-delimited portion (`/A/B`, `../C`, or empty for
/// a property-only relative path); the property part is whatever follows the
/// single permitted `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    prim: String,
    prop: String,
}

impl Path {
    pub fn new(prim: impl Into<String>, prop: impl Into<String>) -> Self {
        Self {
            prim: prim.into(),
            prop: prop.into(),
        }
    }

    pub fn root() -> Self {
        Self::new("/", "")
    }

    /// Parse and validate a path string.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Err("empty path".to_string());
        }
        if s == "/" {
            return Ok(Self::root());
        }

        // Property-only relative path: `.radius`.
        if let Some(prop) = s.strip_prefix('.') {
            if !s.starts_with("..") {
                if !strutil::is_valid_property_name(prop) {
                    return Err(format!("invalid property name `{prop}`"));
                }
                return Ok(Self::new("", prop));
            }
        }

        // Split off the property part: the single '.' not belonging to a
        // `..` component.
        let (prim_str, prop_str) = split_prim_and_prop(s)?;

        if let Some(prop) = &prop_str {
            if !strutil::is_valid_property_name(prop) {
                return Err(format!("invalid property name `{prop}`"));
            }
        }

        if prim_str.is_empty() {
            // Property-only relative path (e.g. `.radius` was split above).
            let Some(prop) = prop_str else {
                return Err(format!("invalid path `{s}`"));
            };
            return Ok(Self::new("", prop));
        }

        let absolute = prim_str.starts_with('/');
        let body = if absolute { &prim_str[1..] } else { &prim_str[..] };
        if body.is_empty() && prop_str.is_none() {
            return Ok(Self::root());
        }

        if !body.is_empty() {
            for component in body.split('/') {
                validate_prim_component(component)?;
            }
        }

        Ok(Self::new(prim_str, prop_str.unwrap_or_default()))
    }

    pub fn is_absolute(&self) -> bool {
        self.prim.starts_with('/')
    }

    pub fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    pub fn is_root(&self) -> bool {
        self.prim == "/" && self.prop.is_empty()
    }

    pub fn is_prim_path(&self) -> bool {
        !self.prim.is_empty() && self.prop.is_empty()
    }

    pub fn is_property_path(&self) -> bool {
        !self.prop.is_empty()
    }

    pub fn prim_part(&self) -> &str {
        &self.prim
    }

    pub fn prop_part(&self) -> &str {
        &self.prop
    }

    /// Name of the last prim component (`/A/B` → `B`, `/` → ``).
    pub fn element_name(&self) -> &str {
        self.prim.rsplit('/').next().unwrap_or("")
    }

    /// Path with the last prim component removed; the root is its own parent.
    pub fn parent(&self) -> Path {
        if self.is_property_path() {
            return Path::new(self.prim.clone(), "");
        }
        match self.prim.rfind('/') {
            Some(0) => Path::root(),
            Some(idx) => Path::new(&self.prim[..idx], ""),
            None => Path::default(),
        }
    }

    pub fn append_prim(&self, name: &str) -> Path {
        let prim = if self.prim == "/" {
            format!("/{name}")
        } else if self.prim.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.prim)
        };
        Path::new(prim, "")
    }

    pub fn append_property(&self, name: &str) -> Path {
        Path::new(self.prim.clone(), name)
    }

    /// Prim components, skipping the leading empty segment of absolute paths.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.prim
            .split('/')
            .filter(|c| !c.is_empty())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prop.is_empty() {
            f.write_str(&self.prim)
        } else if self.prim.is_empty() {
            write!(f, ".{}", self.prop)
        } else {
            write!(f, "{}.{}", self.prim, self.prop)
        }
    }
}

fn split_prim_and_prop(s: &str) -> Result<(String, Option<String>), String> {
    // Walk components; a '.' inside the final component separates the
    // property. `.` and `..` path components are kept intact.
    let mut dot_at: Option<usize> = None;
    let mut component_start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '/' => component_start = i + 1,
            '.' => {
                let component = &s[component_start..i];
                // Part of a `.`/`..` component, not a property separator.
                if component.is_empty() || component.chars().all(|c| c == '.') {
                    continue;
                }
                if dot_at.is_some() {
                    return Err(format!("multiple `.` in path `{s}`"));
                }
                dot_at = Some(i);
            }
            _ => {}
        }
    }
    match dot_at {
        Some(i) => Ok((s[..i].to_string(), Some(s[i + 1..].to_string()))),
        None => Ok((s.to_string(), None)),
    }
}

fn validate_prim_component(component: &str) -> Result<(), String> {
    if component.is_empty() {
        return Err("empty path component".to_string());
    }
    if component == "." || component == ".." {
        return Ok(());
    }

    // A component may carry a trailing variant element: `Root{shape=sphere}`.
    if let Some(brace) = component.find('{') {
        let (name, variant) = component.split_at(brace);
        if !strutil::is_variant_element_name(variant) {
            return Err(format!("invalid variant element in `{component}`"));
        }
        if name.is_empty() {
            return Ok(());
        }
        if !strutil::is_valid_utf8_identifier(name) {
            return Err(format!("invalid prim name `{name}`"));
        }
        return Ok(());
    }

    if !strutil::is_valid_utf8_identifier(component) {
        return Err(format!("invalid prim name `{component}`"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prim_and_property_paths() {
        let p = Path::parse("/A/B.attr").unwrap();
        assert_eq!(p.prim_part(), "/A/B");
        assert_eq!(p.prop_part(), "attr");
        assert!(p.is_absolute());

        let p = Path::parse("/Materials/pbr.outputs:surface").unwrap();
        assert_eq!(p.prop_part(), "outputs:surface");

        let p = Path::parse("/Root").unwrap();
        assert!(p.is_prim_path());
        assert_eq!(p.element_name(), "Root");
    }

    #[test]
    fn root_and_relative() {
        assert!(Path::parse("/").unwrap().is_root());
        let p = Path::parse("../Sibling").unwrap();
        assert!(p.is_relative());
        assert_eq!(p.element_name(), "Sibling");
    }

    #[test]
    fn rejects_malformed() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("/A.b.c").is_err());
        assert!(Path::parse("/9bad").is_err());
        assert!(Path::parse("/A//B").is_err());
        assert!(Path::parse("/A.:x").is_err());
    }

    #[test]
    fn variant_elements_in_components() {
        let p = Path::parse("/Root{shape=sphere}/Child").unwrap();
        assert_eq!(p.element_name(), "Child");
        // A bare `{set}` element selects nothing but is well-formed.
        assert!(Path::parse("/Root{shape}/Child").is_ok());
        assert!(Path::parse("/Root{a=b=c}/Child").is_err());
    }

    #[test]
    fn parent_and_append() {
        let p = Path::parse("/A/B/C").unwrap();
        assert_eq!(p.parent().prim_part(), "/A/B");
        assert_eq!(Path::root().append_prim("X").prim_part(), "/X");
        assert_eq!(
            p.append_property("radius").to_string(),
            "/A/B/C.radius"
        );
        assert!(Path::parse("/A").unwrap().parent().is_root());
    }
}
