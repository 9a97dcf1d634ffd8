//! Shared scanning utilities for the rewriting passes.
//!
//! All cursor movement is protection-aware: protected runs (strings,
//! templates, comments) are either skipped atomically or treated as a single
//! opaque token, and delimiter depth is only counted on code bytes.

use detype_guard::chars::{ident_part_at, is_ascii_ident_part, is_ascii_ident_start, is_space, is_whitespace};
use detype_guard::{guard_source, ProtectionKind, ProtectionMask};
use memchr::memchr;

/// A buffer paired with its protection mask.
pub(crate) struct Source<'a> {
    pub text: &'a str,
    pub bytes: &'a [u8],
    pub mask: ProtectionMask,
}

impl<'a> Source<'a> {
    /// Guard the buffer and wrap it for scanning. The guard's diagnostics
    /// are dropped here; the pipeline reports them once from its own guard
    /// step.
    pub fn new(text: &'a str) -> Self {
        let guarded = guard_source(text);
        Self {
            text,
            bytes: text.as_bytes(),
            mask: guarded.mask,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_code(&self, i: usize) -> bool {
        self.mask.is_code(i)
    }

    /// Skip whitespace and comments starting at `i`. Strings and templates
    /// are significant tokens and stop the cursor.
    pub fn skip_trivia(&self, mut i: usize) -> usize {
        while i < self.len() {
            if self.mask.kind(i) == ProtectionKind::Comment {
                i = self.mask.protected_run_end(i);
                continue;
            }
            if self.mask.is_code(i) && is_whitespace(self.bytes[i]) {
                i += 1;
                continue;
            }
            break;
        }
        i
    }

    /// The index of the last significant byte strictly before `i`, skipping
    /// whitespace and comments. Strings and templates count as significant.
    pub fn prev_significant(&self, i: usize) -> Option<usize> {
        let mut j = i;
        while j > 0 {
            j -= 1;
            if self.mask.kind(j) == ProtectionKind::Comment {
                continue;
            }
            if self.mask.is_code(j) && is_whitespace(self.bytes[j]) {
                continue;
            }
            return Some(j);
        }
        None
    }

    /// The identifier starting at `i`, if any, together with its end offset.
    pub fn word_at(&self, i: usize) -> Option<(&'a str, usize)> {
        if i >= self.len() || !self.is_code(i) {
            return None;
        }
        let b = self.bytes[i];
        if !(is_ascii_ident_start(b) || b >= 0x80) {
            return None;
        }
        if b >= 0x80 && !ident_part_at(self.text, i) {
            return None;
        }
        let mut end = i;
        while end < self.len() && self.is_code(end) && ident_part_at(self.text, end) {
            // Advance a full character at a time for non-ASCII.
            let step = if self.bytes[end] < 0x80 {
                1
            } else {
                self.text[end..].chars().next().map(char::len_utf8).unwrap_or(1)
            };
            end += step;
        }
        Some((&self.text[i..end], end))
    }

    /// The identifier whose last byte is `end - 1`, if any, together with its
    /// start offset.
    pub fn word_ending_at(&self, end: usize) -> Option<(&'a str, usize)> {
        if end == 0 || end > self.len() {
            return None;
        }
        let mut start = end;
        while start > 0 {
            let j = start - 1;
            if !self.is_code(j) {
                break;
            }
            let b = self.bytes[j];
            if is_ascii_ident_part(b) || b >= 0x80 {
                start -= 1;
            } else {
                break;
            }
        }
        // Back off to a character boundary for multibyte identifiers.
        while start < end && !self.text.is_char_boundary(start) {
            start += 1;
        }
        if start == end {
            return None;
        }
        let word = &self.text[start..end];
        let first = word.bytes().next().unwrap();
        if first.is_ascii_digit() {
            return None;
        }
        Some((word, start))
    }

    /// Find the close delimiter matching the open delimiter at `open`,
    /// counting depth over code bytes only. Protected runs are skipped
    /// atomically so delimiters inside literals never count.
    pub fn find_matching(&self, open: usize) -> Option<usize> {
        let open_byte = self.bytes[open];
        let close_byte = match open_byte {
            b'(' => b')',
            b'[' => b']',
            b'{' => b'}',
            b'<' => b'>',
            _ => return None,
        };
        let mut depth = 0usize;
        let mut i = open;
        while i < self.len() {
            if !self.is_code(i) {
                i = self.mask.protected_run_end(i);
                continue;
            }
            let b = self.bytes[i];
            // `=>` must not count toward angle depth.
            if open_byte == b'<' && b == b'=' && self.bytes.get(i + 1) == Some(&b'>') {
                i += 2;
                continue;
            }
            if b == open_byte {
                depth += 1;
            } else if b == close_byte {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            i += 1;
        }
        None
    }

    /// The start of the contiguous protected run containing `i`.
    pub fn protected_run_start(&self, i: usize) -> usize {
        let mut j = i;
        while j > 0 && !self.mask.is_code(j - 1) {
            j -= 1;
        }
        j
    }

    /// The end of the line containing `i` (the index of the `\n`, or the
    /// buffer length).
    pub fn line_end(&self, i: usize) -> usize {
        memchr(b'\n', &self.bytes[i..])
            .map(|o| i + o)
            .unwrap_or(self.len())
    }

    /// Walk `end` backwards over trailing whitespace and comments, not
    /// crossing `floor`.
    pub fn trim_trivia_back(&self, mut end: usize, floor: usize) -> usize {
        while end > floor {
            let j = end - 1;
            if self.mask.kind(j) == ProtectionKind::Comment {
                end = j;
                continue;
            }
            if self.is_code(j) && is_whitespace(self.bytes[j]) {
                end = j;
                continue;
            }
            break;
        }
        end
    }

    /// Walk `start` backwards over horizontal whitespace only.
    pub fn trim_spaces_back(&self, mut start: usize, floor: usize) -> usize {
        while start > floor && self.is_code(start - 1) && is_space(self.bytes[start - 1]) {
            start -= 1;
        }
        start
    }
}

/// Reserved words that can never name a call or method header.
pub(crate) fn is_control_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "for"
            | "while"
            | "switch"
            | "catch"
            | "return"
            | "typeof"
            | "delete"
            | "void"
            | "in"
            | "of"
            | "new"
            | "do"
            | "else"
            | "case"
            | "throw"
            | "await"
            | "yield"
            | "instanceof"
    )
}

/// A single text replacement, half-open over byte offsets of the pass input.
#[derive(Debug)]
pub(crate) struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// An ordered set of non-overlapping edits collected during one pass.
#[derive(Debug, Default)]
pub(crate) struct EditList {
    edits: Vec<Edit>,
}

impl EditList {
    pub fn new() -> Self {
        Self { edits: Vec::new() }
    }

    /// Whether `[start, end)` overlaps any recorded edit.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.edits.iter().any(|e| start < e.end && e.start < end)
    }

    /// Whether the point `i` falls inside any recorded edit range.
    pub fn contains_point(&self, i: usize) -> bool {
        self.edits.iter().any(|e| i >= e.start && i < e.end)
    }

    /// Record an edit. Returns false (and records nothing) if it would
    /// overlap an earlier edit - the first rewrite of a region wins.
    pub fn push(&mut self, start: usize, end: usize, replacement: impl Into<String>) -> bool {
        debug_assert!(start <= end);
        if self.overlaps(start, end) {
            return false;
        }
        self.edits.push(Edit {
            start,
            end,
            replacement: replacement.into(),
        });
        true
    }

    /// Apply all edits to the text they were recorded against.
    pub fn apply(mut self, text: &str) -> String {
        if self.edits.is_empty() {
            return text.to_string();
        }
        self.edits.sort_by_key(|e| e.start);
        let mut out = String::with_capacity(text.len());
        let mut pos = 0usize;
        for edit in &self.edits {
            out.push_str(&text[pos..edit.start]);
            out.push_str(&edit.replacement);
            pos = edit.end;
        }
        out.push_str(&text[pos..]);
        out
    }
}
