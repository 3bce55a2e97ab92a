//! String utilities for the USDA text form: quoting/escaping, identifier
//! validation, variant-element tokenization, UDIM splitting and unique-name
//! generation.

use std::collections::BTreeMap;

pub fn has_newline(s: &str) -> bool {
    s.contains('\n') || s.contains('\r')
}

pub fn has_quotes(s: &str, double_quote: bool) -> bool {
    s.contains(if double_quote { '"' } else { '\'' })
}

pub fn has_triple_quotes(s: &str, double_quote: bool) -> bool {
    s.contains(if double_quote { "\"\"\"" } else { "'''" })
}

/// Count `\"""` (or `\'''`) sequences.
pub fn count_escaped_triple_quotes(s: &str, double_quote: bool) -> usize {
    let needle = if double_quote { "\\\"\"\"" } else { "\\'''" };
    let bytes = s.as_bytes();
    let pat = needle.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i + pat.len() <= bytes.len() {
        if &bytes[i..i + pat.len()] == pat {
            count += 1;
            i += pat.len();
        } else {
            i += 1;
        }
    }
    count
}

pub fn quote(s: &str, delim: &str) -> String {
    format!("{delim}{s}{delim}")
}

pub fn unwrap(s: &str, prefix: &str, suffix: &str) -> String {
    let s = s.strip_prefix(prefix).unwrap_or(s);
    let s = s.strip_suffix(suffix).unwrap_or(s);
    s.to_string()
}

/// Backslash-escape every occurrence of one quote kind.
pub fn escape_single_quote(s: &str, double_quote: bool) -> String {
    let (from, to) = if double_quote {
        ('"', "\\\"")
    } else {
        ('\'', "\\'")
    };
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == from {
            out.push_str(to);
        } else {
            out.push(c);
        }
    }
    out
}

/// Emit control characters as C/hex escapes. A backslash is doubled unless it
/// immediately precedes a quote character (those spell an escaped quote and
/// must survive as-is).
pub fn escape_control_sequence(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    for i in 0..chars.len() {
        match chars[i] {
            '\x07' => out.push_str("\\x07"),
            '\x08' => out.push_str("\\x08"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\x0b"),
            '\x0c' => out.push_str("\\x0c"),
            '\\' => {
                if matches!(chars.get(i + 1), Some('"') | Some('\'')) {
                    out.push('\\');
                } else {
                    out.push_str("\\\\");
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_control_sequence`]. Unknown escapes drop the
/// backslash; a trailing lone backslash is dropped as well.
pub fn unescape_control_sequence(s: &str) -> String {
    if s.len() < 2 {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('a') => {
                out.push('\x07');
                i += 2;
            }
            Some('b') => {
                out.push('\x08');
                i += 2;
            }
            Some('t') => {
                out.push('\t');
                i += 2;
            }
            Some('v') => {
                out.push('\x0b');
                i += 2;
            }
            Some('f') => {
                out.push('\x0c');
                i += 2;
            }
            Some('n') => {
                out.push('\n');
                i += 2;
            }
            Some('r') => {
                out.push('\r');
                i += 2;
            }
            Some('\\') => {
                out.push('\\');
                i += 2;
            }
            // Unknown escape or trailing backslash: drop the backslash.
            _ => i += 1,
        }
    }
    out
}

pub fn escape_backslash(s: &str, triple_quoted: bool) -> String {
    if !triple_quoted {
        return s.replace('\\', "\\\\");
    }

    // Inside a triple-quoted string, \""" and \''' are already escape
    // sequences and must not have their backslash doubled.
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            if chars[i + 1..].starts_with(&['\'', '\'', '\'']) {
                out.push_str("\\'''");
                i += 4;
            } else if chars[i + 1..].starts_with(&['"', '"', '"']) {
                out.push_str("\\\"\"\"");
                i += 4;
            } else {
                out.push_str("\\\\");
                i += 1;
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

pub fn unescape_backslash(s: &str) -> String {
    s.replace("\\\\", "\\")
}

/// Choose a quote kind and escape `s` for USDA output.
///
/// Triple quotes are used iff the value contains a newline. Within the chosen
/// quote kind, occurrences of that quote are escaped; the opposite kind is
/// left alone.
pub fn build_escaped_and_quoted_string(s: &str) -> String {
    if has_newline(s) {
        let has_triple_single = has_triple_quotes(s, false);
        let has_triple_double = has_triple_quotes(s, true);
        let (body, delim) = if has_triple_single && has_triple_double {
            (escape_single_quote(s, true), "\"\"\"")
        } else if has_triple_single {
            (s.to_string(), "\"\"\"")
        } else if has_triple_double {
            (s.to_string(), "'''")
        } else {
            (s.to_string(), "\"\"\"")
        };
        quote(&escape_control_sequence(&body), delim)
    } else {
        let has_single = has_quotes(s, false);
        let has_double = has_quotes(s, true);
        let (body, delim) = if has_single && has_double {
            (escape_single_quote(s, true), "\"")
        } else if has_double {
            (s.to_string(), "'")
        } else {
            (s.to_string(), "\"")
        };
        quote(&escape_control_sequence(&body), delim)
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// ASCII identifier: first char letter or `_`, rest letters/digits/`_`.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extended identifier: UTF-8 codepoints in the letter/number general
/// categories are accepted (emoji and symbols are not).
pub fn is_valid_utf8_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_alphabetic() || c.is_numeric() || c == '_')
}

/// Property names additionally allow interior namespace `:` separators, but
/// may not start or end with `:` or `.`, and each namespace segment must be
/// an identifier.
pub fn is_valid_property_name(s: &str) -> bool {
    if s.starts_with(':') || s.ends_with(':') || s.starts_with('.') || s.ends_with('.') {
        return false;
    }
    if s.is_empty() {
        return false;
    }
    s.split(':').all(is_valid_utf8_identifier)
}

// ---------------------------------------------------------------------------
// Variant elements
// ---------------------------------------------------------------------------

/// Tokenize `{variantSetName=variantName}`. Either side may be empty, but
/// neither may contain `=` or a newline, and the braces are mandatory.
pub fn tokenize_variant_element(element: &str) -> Option<(String, String)> {
    if !(element.starts_with('{') && element.ends_with('}')) {
        return None;
    }
    let inner = unwrap(element, "{", "}");
    let mut parts = inner.splitn(2, '=');
    let set = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();
    if set.contains('=') || has_newline(set) || name.contains('=') || has_newline(name) {
        return None;
    }
    Some((set.to_string(), name.to_string()))
}

pub fn is_variant_element_name(name: &str) -> bool {
    tokenize_variant_element(name).is_some()
}

// ---------------------------------------------------------------------------
// UDIM
// ---------------------------------------------------------------------------

/// Split an asset path containing the `<UDIM>` tile token into the pieces
/// before and after the token. Returns `None` when the token is absent.
pub fn split_udim_path(path: &str) -> Option<(String, String)> {
    let idx = path.find("<UDIM>")?;
    Some((path[..idx].to_string(), path[idx + "<UDIM>".len()..].to_string()))
}

pub fn is_udim_path(path: &str) -> bool {
    path.contains("<UDIM>")
}

// ---------------------------------------------------------------------------
// Unique names
// ---------------------------------------------------------------------------

/// Append the current usage count until the candidate is unused
/// (`plane` → `plane1`, `sphere1` → `sphere11`). Bounded at 1024 attempts.
pub fn make_unique_name(names: &BTreeMap<String, usize>, name: &str) -> Option<String> {
    let count = |n: &str| names.get(n).copied().unwrap_or(0);
    if count(name) == 0 {
        return Some(name.to_string());
    }

    const MAX_LOOP: usize = 1024;
    let mut candidate = name.to_string();
    for _ in 0..MAX_LOOP {
        let uses = count(&candidate);
        if uses == 0 {
            return Some(candidate);
        }
        candidate.push_str(&uses.to_string());
        if count(&candidate) == 0 {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_valid_utf8_identifier("_aaa"));
        assert!(is_valid_utf8_identifier("___"));
        assert!(is_valid_identifier("customLayerData"));
        assert!(is_valid_utf8_identifier("響"));
        assert!(!is_valid_utf8_identifier("_hello😩"));
        assert!(!is_valid_identifier("9lives"));
        assert!(is_valid_property_name("primvars:st"));
        assert!(is_valid_property_name("inputs:file"));
        assert!(!is_valid_property_name(":leading"));
        assert!(!is_valid_property_name("trailing:"));
        assert!(!is_valid_property_name("dotted."));
    }

    #[test]
    fn quote_kind_selection() {
        assert_eq!(build_escaped_and_quoted_string("plain"), "\"plain\"");
        assert_eq!(build_escaped_and_quoted_string("say \"hi\""), "'say \"hi\"'");
        assert_eq!(build_escaped_and_quoted_string("it's"), "\"it's\"");
        assert_eq!(
            build_escaped_and_quoted_string("both \" and '"),
            "\"both \\\" and '\""
        );
        assert_eq!(build_escaped_and_quoted_string("a\nb"), "\"\"\"a\nb\"\"\"");
    }

    #[test]
    fn control_escapes_round_trip() {
        let s = "tab\there";
        let escaped = escape_control_sequence(s);
        assert_eq!(escaped, "tab\\there");
        assert_eq!(unescape_control_sequence(&escaped), s);
    }

    #[test]
    fn backslash_before_escaped_quote_is_preserved() {
        let escaped = escape_control_sequence("a\\\"b");
        assert_eq!(escaped, "a\\\"b");
        let escaped = escape_control_sequence("a\\b");
        assert_eq!(escaped, "a\\\\b");
    }

    #[test]
    fn unknown_escapes_drop_backslash() {
        assert_eq!(unescape_control_sequence("a\\qb"), "aqb");
        assert_eq!(unescape_control_sequence("end\\"), "end");
    }

    #[test]
    fn variant_elements() {
        assert_eq!(
            tokenize_variant_element("{shape=sphere}"),
            Some(("shape".to_string(), "sphere".to_string()))
        );
        assert_eq!(
            tokenize_variant_element("{shape=}"),
            Some(("shape".to_string(), String::new()))
        );
        assert!(tokenize_variant_element("shape=sphere").is_none());
        assert!(tokenize_variant_element("{a=b=c}").is_none());
        assert!(is_variant_element_name("{lod=high}"));
    }

    #[test]
    fn udim_split() {
        assert_eq!(
            split_udim_path("tex/diffuse.<UDIM>.png"),
            Some(("tex/diffuse.".to_string(), ".png".to_string()))
        );
        assert!(split_udim_path("tex/diffuse.png").is_none());
    }

    #[test]
    fn unique_names() {
        let mut names = BTreeMap::new();
        names.insert("plane".to_string(), 1usize);
        assert_eq!(make_unique_name(&names, "sphere").unwrap(), "sphere");
        assert_eq!(make_unique_name(&names, "plane").unwrap(), "plane1");
        names.insert("plane1".to_string(), 1);
        assert_eq!(make_unique_name(&names, "plane").unwrap(), "plane11");
    }
}
