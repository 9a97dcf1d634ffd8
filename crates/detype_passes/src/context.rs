//! Brace-context classification.
//!
//! A `{` can open a statement block, an object literal, or a class body, and
//! a member line `name: Type;` is only rewritable in the last case. The
//! classifier decides each brace's kind from the previous significant token,
//! which is enough context to keep object-literal properties untouched.

use crate::scan::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BraceKind {
    Block,
    Object,
    ClassBody,
}

/// The byte ranges `(open, close)` of every class body in the buffer,
/// including bodies of nested class expressions. Unclosed bodies are
/// omitted.
pub(crate) fn class_body_ranges(src: &Source<'_>) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut stack: Vec<(usize, BraceKind)> = Vec::new();
    // Set when a `class` keyword has been seen and its body brace is still
    // ahead; cleared by the brace or by a statement terminator.
    let mut pending_class = false;

    let mut i = 0usize;
    while i < src.len() {
        if !src.is_code(i) {
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        if let Some((word, end)) = src.word_at(i) {
            if word == "class" {
                pending_class = true;
            }
            i = end;
            continue;
        }
        match b {
            b'{' => {
                let kind = if pending_class {
                    BraceKind::ClassBody
                } else {
                    classify_plain_brace(src, i)
                };
                pending_class = false;
                stack.push((i, kind));
            }
            b'}' => {
                if let Some((open, kind)) = stack.pop() {
                    if kind == BraceKind::ClassBody {
                        ranges.push((open, i));
                    }
                }
            }
            b';' => pending_class = false,
            _ => {}
        }
        i += 1;
    }

    ranges.sort();
    ranges
}

/// Classify a `{` that does not open a class body.
fn classify_plain_brace(src: &Source<'_>, brace: usize) -> BraceKind {
    let prev = match src.prev_significant(brace) {
        Some(p) => p,
        None => return BraceKind::Block,
    };
    if !src.is_code(prev) {
        // After a string or template: `"x" {` only occurs in expression
        // positions such as switch cases; treat as object.
        return BraceKind::Object;
    }
    let b = src.bytes[prev];
    // `=> {` is an arrow body even though `=` alone would mean object.
    if b == b'>' && prev > 0 && src.bytes[prev - 1] == b'=' {
        return BraceKind::Block;
    }
    if let Some((word, _)) = src.word_ending_at(prev + 1) {
        return match word {
            "return" | "typeof" | "in" | "of" | "case" | "instanceof" | "yield" | "await" => {
                BraceKind::Object
            }
            // `do {`, `else {`, `try {`, `finally {` and any identifier
            // (labels aside, `ident {` is not an object position).
            _ => BraceKind::Block,
        };
    }
    match b {
        b'=' | b'(' | b',' | b'[' | b':' | b'?' | b'!' | b'&' | b'|' | b'+' | b'-' | b'*' | b'%' => {
            BraceKind::Object
        }
        _ => BraceKind::Block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(text: &str) -> Vec<(usize, usize)> {
        let src = Source::new(text);
        class_body_ranges(&src)
    }

    #[test]
    fn test_simple_class() {
        let text = "class A { x = 1; }";
        let r = ranges(text);
        assert_eq!(r, vec![(8, 17)]);
    }

    #[test]
    fn test_extends_call() {
        let text = "class A extends mix(B, C) { }";
        let r = ranges(text);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].0, text.find('{').unwrap());
    }

    #[test]
    fn test_object_literal_not_class() {
        assert!(ranges("const o = { a: 1 };").is_empty());
        assert!(ranges("f({ a: 1 });").is_empty());
        assert!(ranges("return { a: 1 };").is_empty());
    }

    #[test]
    fn test_method_bodies_not_class_ranges() {
        let text = "class A { m() { return { x: 1 }; } }";
        let r = ranges(text);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0], (text.find('{').unwrap(), text.len() - 1));
    }

    #[test]
    fn test_class_in_string_ignored() {
        assert!(ranges("const s = 'class A { }';").is_empty());
    }
}
