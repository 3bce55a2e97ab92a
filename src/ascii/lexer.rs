//! Character-level scanning for the USDA text form.
//!
//! The lexer drives a [`StreamReader`] over the raw bytes (the whole input is
//! UTF-8 validated up front) and tracks 1-based row/column for diagnostics.

use crate::error::{Result, TextPos, UsdError};
use crate::stream::{Endian, StreamReader};
use crate::strutil;

/// Origin and shape of a parsed string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringData {
    pub value: String,
    /// Row/col of the opening quote; kept for triple-quoted diagnostics.
    pub pos: TextPos,
    pub triple_quoted: bool,
    pub single_quote: bool,
}

pub struct Lexer<'a> {
    text: &'a str,
    sr: StreamReader<'a>,
    row: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            UsdError::Format(format!("USDA input is not valid UTF-8: {e}"))
        })?;
        Ok(Self {
            text,
            sr: StreamReader::new(bytes, Endian::Little),
            row: 1,
            col: 1,
        })
    }

    pub fn pos(&self) -> TextPos {
        TextPos::new(self.row, self.col)
    }

    pub fn eof(&self) -> bool {
        self.sr.eof()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.text[self.sr.tell() as usize..].chars().next()
    }

    pub fn starts_with(&self, pat: &str) -> bool {
        self.text[self.sr.tell() as usize..].starts_with(pat)
    }

    /// Consume one character, folding `\r\n`/`\r` into a single newline for
    /// row/col accounting.
    pub fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.sr.read(c.len_utf8()).ok()?;
        match c {
            '\n' => {
                self.row += 1;
                self.col = 1;
            }
            '\r' => {
                if self.peek_char() == Some('\n') {
                    let _ = self.sr.read(1);
                }
                self.row += 1;
                self.col = 1;
                return Some('\n');
            }
            _ => self.col += 1,
        }
        Some(c)
    }

    pub fn expect_char(&mut self, expected: char) -> Result<()> {
        let pos = self.pos();
        match self.next_char() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(UsdError::lex(
                pos,
                format!("expected `{expected}` but found `{c}`"),
            )),
            None => Err(UsdError::lex(
                pos,
                format!("expected `{expected}` but hit end of input"),
            )),
        }
    }

    /// Skip spaces, tabs and form feeds (not newlines).
    pub fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek_char(), Some(' ') | Some('\t') | Some('\x0c')) {
            self.next_char();
        }
    }

    /// Skip whitespace, newlines and `#` comments.
    pub fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\x0c') | Some('\n') | Some('\r') => {
                    self.next_char();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.next_char();
                    }
                }
                _ => return,
            }
        }
    }

    /// Identifier with optional interior `:` namespace separators.
    pub fn read_identifier(&mut self) -> Result<String> {
        let pos = self.pos();
        let mut out = String::new();
        match self.peek_char() {
            Some(c) if c.is_alphabetic() || c == '_' => {
                out.push(c);
                self.next_char();
            }
            Some(c) => {
                return Err(UsdError::lex(pos, format!("invalid identifier start `{c}`")));
            }
            None => return Err(UsdError::lex(pos, "identifier expected at end of input")),
        }
        while let Some(c) = self.peek_char() {
            if c.is_alphabetic() || c.is_numeric() || c == '_' || c == ':' {
                out.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        Ok(out)
    }

    /// `"..."`, `'...'`, `"""..."""` or `'''...'''`. The returned
    /// [`StringData`] records the opening position for triple-quoted forms.
    pub fn read_string_literal(&mut self) -> Result<StringData> {
        let pos = self.pos();
        let quote = match self.peek_char() {
            Some(c @ ('"' | '\'')) => c,
            other => {
                return Err(UsdError::lex(
                    pos,
                    format!("string literal expected, found {other:?}"),
                ));
            }
        };
        let triple_delim: String = std::iter::repeat(quote).take(3).collect();
        let triple = self.starts_with(&triple_delim);

        if triple {
            for _ in 0..3 {
                self.next_char();
            }
            let mut raw = String::new();
            loop {
                if self.starts_with(&triple_delim) {
                    // An escaped closing delimiter stays part of the body.
                    if raw.ends_with('\\') {
                        raw.pop();
                        raw.push_str(&triple_delim);
                        for _ in 0..3 {
                            self.next_char();
                        }
                        continue;
                    }
                    for _ in 0..3 {
                        self.next_char();
                    }
                    return Ok(StringData {
                        value: strutil::unescape_control_sequence(&raw),
                        pos,
                        triple_quoted: true,
                        single_quote: quote == '\'',
                    });
                }
                match self.next_char() {
                    Some(c) => raw.push(c),
                    None => {
                        return Err(UsdError::lex(pos, "unterminated triple-quoted string"));
                    }
                }
            }
        }

        self.next_char();
        let mut raw = String::new();
        loop {
            match self.next_char() {
                Some('\\') => {
                    // Keep the escape for the unescape pass, but never let an
                    // escaped quote terminate the literal.
                    raw.push('\\');
                    match self.next_char() {
                        Some(c) => raw.push(c),
                        None => {
                            return Err(UsdError::lex(pos, "unterminated string literal"));
                        }
                    }
                }
                Some('\n') => {
                    return Err(UsdError::lex(pos, "newline inside single-quoted string"));
                }
                Some(c) if c == quote => {
                    return Ok(StringData {
                        value: strutil::unescape_control_sequence(&raw),
                        pos,
                        triple_quoted: false,
                        single_quote: quote == '\'',
                    });
                }
                Some(c) => raw.push(c),
                None => return Err(UsdError::lex(pos, "unterminated string literal")),
            }
        }
    }

    /// `@...@` or `@@@...@@@`; the triple form allows `\@@@` for an embedded
    /// literal `@@@`.
    pub fn read_asset_ref(&mut self) -> Result<(String, bool)> {
        let pos = self.pos();
        if self.peek_char() != Some('@') {
            return Err(UsdError::lex(pos, "asset reference expected"));
        }
        let triple = self.starts_with("@@@");
        if triple {
            for _ in 0..3 {
                self.next_char();
            }
            let mut raw = String::new();
            loop {
                if self.starts_with("\\@@@") {
                    raw.push_str("@@@");
                    for _ in 0..4 {
                        self.next_char();
                    }
                    continue;
                }
                if self.starts_with("@@@") {
                    for _ in 0..3 {
                        self.next_char();
                    }
                    return Ok((raw, true));
                }
                match self.next_char() {
                    Some(c) => raw.push(c),
                    None => {
                        return Err(UsdError::lex(pos, "unterminated triple-@ asset reference"));
                    }
                }
            }
        }

        self.next_char();
        let mut raw = String::new();
        loop {
            match self.next_char() {
                Some('@') => return Ok((raw, false)),
                Some('\n') => {
                    return Err(UsdError::lex(pos, "newline inside asset reference"));
                }
                Some(c) => raw.push(c),
                None => return Err(UsdError::lex(pos, "unterminated asset reference")),
            }
        }
    }

    /// `<...>` path literal.
    pub fn read_path_literal(&mut self) -> Result<String> {
        let pos = self.pos();
        self.expect_char('<')?;
        let mut raw = String::new();
        loop {
            match self.next_char() {
                Some('>') => return Ok(raw),
                Some('\n') => return Err(UsdError::lex(pos, "newline inside path literal")),
                Some(c) => raw.push(c),
                None => return Err(UsdError::lex(pos, "unterminated path literal")),
            }
        }
    }

    /// Raw numeric lexeme: sign, digits, decimal point, exponent, or one of
    /// `inf`/`-inf`/`nan`.
    pub fn read_number_lexeme(&mut self) -> Result<String> {
        let pos = self.pos();
        let mut out = String::new();

        if matches!(self.peek_char(), Some('-') | Some('+')) {
            out.push(self.next_char().unwrap());
        }
        if self.starts_with("inf") {
            for _ in 0..3 {
                self.next_char();
            }
            out.push_str("inf");
            return Ok(out);
        }
        if self.starts_with("nan") {
            for _ in 0..3 {
                self.next_char();
            }
            out.push_str("nan");
            return Ok(out);
        }

        let mut seen_digit = false;
        while let Some(c) = self.peek_char() {
            match c {
                '0'..='9' => {
                    seen_digit = true;
                    out.push(c);
                    self.next_char();
                }
                '.' => {
                    out.push(c);
                    self.next_char();
                }
                'e' | 'E' => {
                    out.push(c);
                    self.next_char();
                    if matches!(self.peek_char(), Some('-') | Some('+')) {
                        out.push(self.next_char().unwrap());
                    }
                }
                _ => break,
            }
        }
        if !seen_digit {
            return Err(UsdError::lex(pos, "number expected"));
        }
        Ok(out)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let pos = self.pos();
        let lexeme = self.read_number_lexeme()?;
        match lexeme.as_str() {
            "inf" | "+inf" => return Ok(f64::INFINITY),
            "-inf" => return Ok(f64::NEG_INFINITY),
            "nan" | "+nan" | "-nan" => return Ok(f64::NAN),
            _ => {}
        }
        lexeme
            .parse::<f64>()
            .map_err(|_| UsdError::lex(pos, format!("malformed number `{lexeme}`")))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let pos = self.pos();
        let lexeme = self.read_number_lexeme()?;
        lexeme
            .parse::<i64>()
            .map_err(|_| UsdError::lex(pos, format!("malformed integer `{lexeme}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(s: &str) -> Lexer<'_> {
        Lexer::new(s.as_bytes()).unwrap()
    }

    #[test]
    fn tracks_rows_and_columns() {
        let mut lex = lexer("ab\ncd\r\nef");
        assert_eq!(lex.pos(), TextPos::new(1, 1));
        lex.next_char();
        lex.next_char();
        lex.next_char(); // \n
        assert_eq!(lex.pos(), TextPos::new(2, 1));
        lex.next_char();
        lex.next_char();
        assert_eq!(lex.next_char(), Some('\n')); // \r\n folded
        assert_eq!(lex.pos(), TextPos::new(3, 1));
    }

    #[test]
    fn identifiers_allow_namespaces() {
        let mut lex = lexer("primvars:st rest");
        assert_eq!(lex.read_identifier().unwrap(), "primvars:st");
        assert!(lexer("9bad").read_identifier().is_err());
    }

    #[test]
    fn string_literals() {
        let s = lexer("\"hi\\\"there\" x").read_string_literal().unwrap();
        assert_eq!(s.value, "hi\"there");
        assert!(!s.triple_quoted);

        let s = lexer("'''line1\nline2''' x").read_string_literal().unwrap();
        assert_eq!(s.value, "line1\nline2");
        assert!(s.triple_quoted);
        assert!(s.single_quote);
        assert_eq!(s.pos, TextPos::new(1, 1));

        assert!(lexer("\"no\nnewline\"").read_string_literal().is_err());
        assert!(lexer("\"unterminated").read_string_literal().is_err());
    }

    #[test]
    fn triple_quoted_keeps_escaped_delimiter() {
        let s = lexer("\"\"\"a\\\"\"\"b\"\"\"").read_string_literal().unwrap();
        assert_eq!(s.value, "a\"\"\"b");
    }

    #[test]
    fn asset_refs() {
        assert_eq!(lexer("@a.usda@").read_asset_ref().unwrap(), ("a.usda".to_string(), false));
        assert_eq!(
            lexer("@@@path with \\@@@ inside@@@").read_asset_ref().unwrap(),
            ("path with @@@ inside".to_string(), true)
        );
        assert!(lexer("@unterminated").read_asset_ref().is_err());
    }

    #[test]
    fn numbers() {
        assert_eq!(lexer("1.5e2,").read_f64().unwrap(), 150.0);
        assert_eq!(lexer("-inf").read_f64().unwrap(), f64::NEG_INFINITY);
        assert!(lexer("nan").read_f64().unwrap().is_nan());
        assert_eq!(lexer("-42").read_i64().unwrap(), -42);
        assert!(lexer("..").read_f64().is_err());
    }
}
