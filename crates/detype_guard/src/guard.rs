//! The protection scanner.
//!
//! A single linear scan classifies every byte of the buffer. Template
//! interpolation placeholders are re-scanned recursively: the `${ ... }`
//! delimiters belong to the template but the expression inside is ordinary
//! code and may itself contain strings, templates, and comments.
//!
//! Fail-safe: when a string, template, or block comment never closes, the
//! remainder of the buffer is classified as protected and a diagnostic is
//! recorded. Under-transformation is always preferred to corrupting a
//! literal.

use crate::chars::{is_ascii_ident_part, is_line_break, is_whitespace};
use detype_core::text::TextSpan;
use detype_diagnostics::{messages, Diagnostic, DiagnosticCollection};
use memchr::memchr;

/// Classification of a single byte of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionKind {
    /// Rewritable code.
    Code,
    /// Inside a string or regular expression literal.
    Str,
    /// Inside a template literal (delimiters and text, not interpolations).
    Template,
    /// Inside a line or block comment.
    Comment,
}

/// Per-byte protection classification for one source buffer.
#[derive(Debug, Clone)]
pub struct ProtectionMask {
    kinds: Vec<ProtectionKind>,
}

impl ProtectionMask {
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The classification of the byte at `i`.
    #[inline]
    pub fn kind(&self, i: usize) -> ProtectionKind {
        self.kinds[i]
    }

    /// Whether the byte at `i` is protected (not rewritable).
    #[inline]
    pub fn is_protected(&self, i: usize) -> bool {
        self.kinds[i] != ProtectionKind::Code
    }

    /// Whether the byte at `i` is rewritable code.
    #[inline]
    pub fn is_code(&self, i: usize) -> bool {
        self.kinds[i] == ProtectionKind::Code
    }

    /// Whether the byte at `i` is inside a comment.
    #[inline]
    pub fn is_comment(&self, i: usize) -> bool {
        self.kinds[i] == ProtectionKind::Comment
    }

    /// The end (exclusive) of the contiguous protected run starting at `i`.
    /// Returns `i` itself if the byte at `i` is code.
    pub fn protected_run_end(&self, i: usize) -> usize {
        let mut j = i;
        while j < self.kinds.len() && self.kinds[j] != ProtectionKind::Code {
            j += 1;
        }
        j
    }
}

/// The outcome of guarding one buffer: the mask plus any diagnostics the
/// scan raised (unterminated literals and comments).
#[derive(Debug)]
pub struct GuardedSource {
    pub mask: ProtectionMask,
    pub diagnostics: DiagnosticCollection,
}

/// Scan a source buffer and classify every byte.
pub fn guard_source(text: &str) -> GuardedSource {
    let mut scanner = Scanner::new(text);
    scanner.scan_chunk(false);
    GuardedSource {
        mask: ProtectionMask {
            kinds: scanner.kinds,
        },
        diagnostics: scanner.diagnostics,
    }
}

/// How a recursive chunk scan ended.
enum ChunkEnd {
    Eof,
    CloseBrace,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    kinds: Vec<ProtectionKind>,
    diagnostics: DiagnosticCollection,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            kinds: vec![ProtectionKind::Code; text.len()],
            diagnostics: DiagnosticCollection::new(),
        }
    }

    #[inline]
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    #[inline]
    fn mark(&mut self, i: usize, kind: ProtectionKind) {
        if i < self.kinds.len() {
            self.kinds[i] = kind;
        }
    }

    /// Classify everything from `start` to the end of the buffer and stop
    /// the scan. Used when a delimiter never closes.
    fn protect_rest(&mut self, start: usize, kind: ProtectionKind) {
        for i in start..self.kinds.len() {
            self.kinds[i] = kind;
        }
        self.pos = self.kinds.len();
    }

    /// Scan code until end of buffer, or (inside an interpolation) until the
    /// `}` matching the `${` that opened it.
    fn scan_chunk(&mut self, in_interpolation: bool) -> ChunkEnd {
        let mut brace_depth = 0usize;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match b {
                b'\'' | b'"' => self.scan_string(b),
                b'`' => self.scan_template(),
                b'/' if self.peek(1) == Some(b'/') => self.scan_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.scan_block_comment(),
                b'/' => {
                    if !self.try_scan_regex() {
                        self.pos += 1;
                    }
                }
                b'{' if in_interpolation => {
                    brace_depth += 1;
                    self.pos += 1;
                }
                b'}' if in_interpolation => {
                    if brace_depth == 0 {
                        return ChunkEnd::CloseBrace;
                    }
                    brace_depth -= 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        ChunkEnd::Eof
    }

    fn scan_string(&mut self, quote: u8) {
        let start = self.pos;
        self.mark(start, ProtectionKind::Str);
        self.pos += 1;
        loop {
            if self.pos >= self.bytes.len() {
                self.diagnostics.add(Diagnostic::at(
                    TextSpan::new(start as u32, 1),
                    &messages::UNTERMINATED_STRING_LITERAL,
                    &[],
                ));
                self.protect_rest(start, ProtectionKind::Str);
                return;
            }
            let b = self.bytes[self.pos];
            if b == quote {
                self.mark(self.pos, ProtectionKind::Str);
                self.pos += 1;
                return;
            }
            if b == b'\\' {
                self.mark(self.pos, ProtectionKind::Str);
                self.mark(self.pos + 1, ProtectionKind::Str);
                self.pos += 2;
                continue;
            }
            if is_line_break(b) {
                self.diagnostics.add(Diagnostic::at(
                    TextSpan::new(start as u32, 1),
                    &messages::UNTERMINATED_STRING_LITERAL,
                    &[],
                ));
                self.protect_rest(start, ProtectionKind::Str);
                return;
            }
            self.mark(self.pos, ProtectionKind::Str);
            self.pos += 1;
        }
    }

    fn scan_template(&mut self) {
        let start = self.pos;
        self.mark(start, ProtectionKind::Template);
        self.pos += 1;
        loop {
            if self.pos >= self.bytes.len() {
                self.diagnostics.add(Diagnostic::at(
                    TextSpan::new(start as u32, 1),
                    &messages::UNTERMINATED_TEMPLATE_LITERAL,
                    &[],
                ));
                self.protect_rest(start, ProtectionKind::Template);
                return;
            }
            let b = self.bytes[self.pos];
            if b == b'`' {
                self.mark(self.pos, ProtectionKind::Template);
                self.pos += 1;
                return;
            }
            if b == b'\\' {
                self.mark(self.pos, ProtectionKind::Template);
                self.mark(self.pos + 1, ProtectionKind::Template);
                self.pos += 2;
                continue;
            }
            if b == b'$' && self.peek(1) == Some(b'{') {
                self.mark(self.pos, ProtectionKind::Template);
                self.mark(self.pos + 1, ProtectionKind::Template);
                self.pos += 2;
                match self.scan_chunk(true) {
                    ChunkEnd::CloseBrace => {
                        self.mark(self.pos, ProtectionKind::Template);
                        self.pos += 1;
                    }
                    ChunkEnd::Eof => {
                        self.diagnostics.add(Diagnostic::at(
                            TextSpan::new(start as u32, 1),
                            &messages::UNTERMINATED_TEMPLATE_LITERAL,
                            &[],
                        ));
                        self.protect_rest(start, ProtectionKind::Template);
                        return;
                    }
                }
                continue;
            }
            // Line breaks are ordinary template content.
            self.mark(self.pos, ProtectionKind::Template);
            self.pos += 1;
        }
    }

    fn scan_line_comment(&mut self) {
        let end = memchr(b'\n', &self.bytes[self.pos..])
            .map(|o| self.pos + o)
            .unwrap_or(self.bytes.len());
        for i in self.pos..end {
            self.kinds[i] = ProtectionKind::Comment;
        }
        self.pos = end;
    }

    fn scan_block_comment(&mut self) {
        let start = self.pos;
        self.mark(self.pos, ProtectionKind::Comment);
        self.mark(self.pos + 1, ProtectionKind::Comment);
        self.pos += 2;
        while self.pos + 1 < self.bytes.len() {
            if self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/' {
                self.mark(self.pos, ProtectionKind::Comment);
                self.mark(self.pos + 1, ProtectionKind::Comment);
                self.pos += 2;
                return;
            }
            self.mark(self.pos, ProtectionKind::Comment);
            self.pos += 1;
        }
        self.diagnostics.add(Diagnostic::at(
            TextSpan::new(start as u32, 2),
            &messages::UNTERMINATED_BLOCK_COMMENT,
            &[],
        ));
        self.protect_rest(start, ProtectionKind::Comment);
    }

    /// Decide whether the `/` at the current position starts a regular
    /// expression literal, and if so protect it. A `/` is a regex start when
    /// the previous significant token cannot end an expression; otherwise it
    /// is a division operator and stays rewritable.
    fn try_scan_regex(&mut self) -> bool {
        if !self.regex_allowed_here() {
            return false;
        }
        // Look ahead for the closing '/' on this line.
        let mut i = self.pos + 1;
        let mut in_class = false;
        let close = loop {
            if i >= self.bytes.len() {
                return false;
            }
            let b = self.bytes[i];
            if is_line_break(b) {
                return false;
            }
            match b {
                b'\\' => {
                    // An escape cannot swallow the line break.
                    match self.bytes.get(i + 1) {
                        None => return false,
                        Some(&n) if is_line_break(n) => return false,
                        _ => i += 2,
                    }
                }
                b'[' => {
                    in_class = true;
                    i += 1;
                }
                b']' => {
                    in_class = false;
                    i += 1;
                }
                b'/' if !in_class => break i,
                _ => i += 1,
            }
        };
        // Consume trailing flags.
        let mut end = close + 1;
        while end < self.bytes.len() && is_ascii_ident_part(self.bytes[end]) {
            end += 1;
        }
        for i in self.pos..end {
            self.kinds[i] = ProtectionKind::Str;
        }
        self.pos = end;
        true
    }

    /// Whether a regex literal may start at the current position, based on
    /// the previous significant byte.
    fn regex_allowed_here(&self) -> bool {
        let mut i = self.pos;
        loop {
            if i == 0 {
                return true;
            }
            i -= 1;
            let b = self.bytes[i];
            if is_whitespace(b) || self.kinds[i] == ProtectionKind::Comment {
                continue;
            }
            if is_ascii_ident_part(b) {
                // A regex can follow a keyword but not an identifier or
                // number.
                let mut s = i;
                while s > 0 && is_ascii_ident_part(self.bytes[s - 1]) {
                    s -= 1;
                }
                let word = &self.bytes[s..=i];
                return matches!(
                    word,
                    b"return"
                        | b"typeof"
                        | b"instanceof"
                        | b"new"
                        | b"in"
                        | b"of"
                        | b"delete"
                        | b"void"
                        | b"case"
                        | b"do"
                        | b"else"
                        | b"yield"
                        | b"await"
                        | b"throw"
                );
            }
            return matches!(
                b,
                b'=' | b'('
                    | b','
                    | b'['
                    | b'!'
                    | b'&'
                    | b'|'
                    | b'?'
                    | b'{'
                    | b';'
                    | b':'
                    | b'+'
                    | b'-'
                    | b'*'
                    | b'%'
                    | b'~'
                    | b'^'
                    | b'<'
                    | b'>'
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<ProtectionKind> {
        let guarded = guard_source(text);
        (0..guarded.mask.len()).map(|i| guarded.mask.kind(i)).collect()
    }

    #[test]
    fn test_plain_code_unprotected() {
        let guarded = guard_source("const x = 1;");
        assert!((0..guarded.mask.len()).all(|i| guarded.mask.is_code(i)));
        assert!(guarded.diagnostics.is_empty());
    }

    #[test]
    fn test_string_protected() {
        let k = kinds(r#"let s = "a: b";"#);
        // The quotes and everything between them.
        assert_eq!(k[8], ProtectionKind::Str);
        assert_eq!(k[11], ProtectionKind::Str);
        assert_eq!(k[13], ProtectionKind::Str);
        // The semicolon after is code.
        assert_eq!(k[14], ProtectionKind::Code);
    }

    #[test]
    fn test_escaped_quote() {
        let text = r#"let s = 'it\'s';x"#;
        let k = kinds(text);
        let x = text.find('x').unwrap();
        assert_eq!(k[x], ProtectionKind::Code);
        assert_eq!(k[x - 2], ProtectionKind::Str);
    }

    #[test]
    fn test_line_comment_protected() {
        let text = "let a = 1; // c: number\nlet b = 2;";
        let k = kinds(text);
        let slash = text.find("//").unwrap();
        assert_eq!(k[slash], ProtectionKind::Comment);
        assert_eq!(k[slash + 5], ProtectionKind::Comment);
        let b = text.rfind("let").unwrap();
        assert_eq!(k[b], ProtectionKind::Code);
    }

    #[test]
    fn test_block_comment_protected() {
        let text = "a /* x: y */ b";
        let k = kinds(text);
        assert_eq!(k[0], ProtectionKind::Code);
        assert_eq!(k[5], ProtectionKind::Comment);
        assert_eq!(k[13], ProtectionKind::Code);
    }

    #[test]
    fn test_template_interpolation_is_code() {
        let text = "let t = `count: ${n + 1} items`;";
        let k = kinds(text);
        let backtick = text.find('`').unwrap();
        assert_eq!(k[backtick], ProtectionKind::Template);
        let n = text.find("n +").unwrap();
        assert_eq!(k[n], ProtectionKind::Code);
        let items = text.find("items").unwrap();
        assert_eq!(k[items], ProtectionKind::Template);
    }

    #[test]
    fn test_nested_template_in_interpolation() {
        let text = "`a${`b${c}d`}e`";
        let k = kinds(text);
        let c = text.find('c').unwrap();
        assert_eq!(k[c], ProtectionKind::Code);
        let d = text.find('d').unwrap();
        assert_eq!(k[d], ProtectionKind::Template);
        let e = text.find('e').unwrap();
        assert_eq!(k[e], ProtectionKind::Template);
    }

    #[test]
    fn test_string_inside_interpolation() {
        let text = "`x${'a`b'}y`";
        let k = kinds(text);
        let a = text.find('a').unwrap();
        assert_eq!(k[a], ProtectionKind::Str);
        // The backtick inside the string must not end the template.
        let y = text.find('y').unwrap();
        assert_eq!(k[y], ProtectionKind::Template);
    }

    #[test]
    fn test_unterminated_string_protects_rest() {
        let text = "let s = 'oops\nlet t = 1;";
        let guarded = guard_source(text);
        assert_eq!(guarded.diagnostics.len(), 1);
        let start = text.find('\'').unwrap();
        assert!((start..text.len()).all(|i| guarded.mask.is_protected(i)));
    }

    #[test]
    fn test_unterminated_template_protects_rest() {
        let text = "let t = `open\nmore";
        let guarded = guard_source(text);
        assert_eq!(guarded.diagnostics.len(), 1);
        assert!(guarded.mask.is_protected(text.len() - 1));
    }

    #[test]
    fn test_unterminated_block_comment() {
        let text = "a /* never closes";
        let guarded = guard_source(text);
        assert_eq!(guarded.diagnostics.len(), 1);
        assert!(guarded.mask.is_protected(text.len() - 1));
    }

    #[test]
    fn test_regex_literal_protected() {
        let text = "const re = /a'b\"c/g; let x = 1;";
        let guarded = guard_source(text);
        let slash = text.find('/').unwrap();
        assert!(guarded.mask.is_protected(slash));
        // The apostrophe inside the regex must not open a string.
        let x = text.rfind("x =").unwrap();
        assert!(guarded.mask.is_code(x));
        assert!(guarded.diagnostics.is_empty());
    }

    #[test]
    fn test_division_not_protected() {
        let text = "let r = total / count / 2;";
        let guarded = guard_source(text);
        assert!((0..guarded.mask.len()).all(|i| guarded.mask.is_code(i)));
    }

    #[test]
    fn test_regex_after_return() {
        let text = "return /ab+c/.test(s);";
        let guarded = guard_source(text);
        let slash = text.find('/').unwrap();
        assert!(guarded.mask.is_protected(slash));
        let test = text.find("test").unwrap();
        assert!(guarded.mask.is_code(test));
    }

    #[test]
    fn test_protected_run_end() {
        let text = "a 'bcd' e";
        let guarded = guard_source(text);
        let q = text.find('\'').unwrap();
        assert_eq!(guarded.mask.protected_run_end(q), q + 5);
        assert_eq!(guarded.mask.protected_run_end(0), 0);
    }
}
