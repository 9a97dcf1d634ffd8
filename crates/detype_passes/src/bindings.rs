//! Binding annotations: `const`/`let`/`var` declarations and class
//! properties.
//!
//! The annotation boundary is the first top-level `=` (or the statement
//! terminator), found with depth counting so an object-shaped type before
//! the `=` is never mistaken for the assignment. Class properties reuse the
//! same machinery but only inside braces the context classifier tagged as
//! class bodies - object-literal properties share the surface syntax and
//! must never be rewritten.

use crate::context::class_body_ranges;
use crate::scan::{EditList, Source};
use detype_diagnostics::DiagnosticCollection;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DECL_RE: Regex = Regex::new(r"\b(?:const|let|var)\b").unwrap();
}

/// Pass 5: strip variable and class-property annotations.
pub fn normalize_bindings(text: &str, _diagnostics: &mut DiagnosticCollection) -> String {
    let src = Source::new(text);
    let mut edits = EditList::new();

    strip_variable_annotations(&src, &mut edits);
    strip_class_properties(&src, &mut edits);

    edits.apply(text)
}

fn strip_variable_annotations(src: &Source<'_>, edits: &mut EditList) {
    for m in DECL_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) {
            continue;
        }
        // Statement position (or `for (let ...`).
        let positioned = match src.prev_significant(i) {
            None => true,
            Some(p) => {
                src.is_code(p)
                    && (matches!(src.bytes[p], b';' | b'{' | b'}' | b'(')
                        || src
                            .word_ending_at(p + 1)
                            .map(|(w, _)| matches!(w, "export" | "else" | "do"))
                            .unwrap_or(false))
            }
        };
        if !positioned {
            continue;
        }

        // Walk the declarator list.
        let mut p = src.skip_trivia(m.end());
        loop {
            if p >= src.len() {
                break;
            }
            // Binding name: identifier or destructuring pattern.
            let name_end = if let Some((_, end)) = src.word_at(p) {
                end
            } else if src.is_code(p) && matches!(src.bytes[p], b'{' | b'[') {
                match src.find_matching(p) {
                    Some(close) => close + 1,
                    None => break,
                }
            } else {
                break;
            };

            let mut q = src.skip_trivia(name_end);
            // Definite-assignment marker: `let loaded!: boolean`.
            if q < src.len() && src.is_code(q) && src.bytes[q] == b'!' {
                let after = src.skip_trivia(q + 1);
                if after < src.len() && src.is_code(after) && src.bytes[after] == b':' {
                    edits.push(src.trim_spaces_back(q, name_end), q + 1, "");
                    q = after;
                }
            }

            if q < src.len() && src.is_code(q) && src.bytes[q] == b':' {
                let start = src.trim_spaces_back(q, name_end);
                let (end, end_byte) = annotation_end(src, q + 1);
                if end_byte == b'=' {
                    edits.push(start, end, " ");
                } else {
                    edits.push(start, src.trim_trivia_back(end, start), "");
                }
                q = end;
            }

            if q < src.len() && src.is_code(q) && src.bytes[q] == b'=' && src.bytes.get(q + 1) != Some(&b'=') {
                q = initializer_end(src, q + 1);
            }
            if q < src.len() && src.is_code(q) && src.bytes[q] == b',' {
                p = src.skip_trivia(q + 1);
                continue;
            }
            break;
        }
    }
}

/// Find the end of a binding annotation starting after its `:`. Returns the
/// boundary index and the byte that ended the scan (`=`, `,`, `;`, or a
/// line break when the statement just stops).
fn annotation_end(src: &Source<'_>, from: usize) -> (usize, u8) {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    let mut angle = 0i32;
    let mut i = from;
    while i < src.len() {
        if !src.is_code(i) {
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        if b == b'=' && src.bytes.get(i + 1) == Some(&b'>') {
            i += 2;
            continue;
        }
        let balanced = paren == 0 && brace == 0 && bracket == 0 && angle == 0;
        match b {
            b'(' => paren += 1,
            b')' => paren -= 1,
            b'{' => brace += 1,
            b'}' => brace -= 1,
            b'[' => bracket += 1,
            b']' => bracket -= 1,
            b'<' => angle += 1,
            b'>' if angle > 0 => angle -= 1,
            b'=' if balanced && src.bytes.get(i + 1) != Some(&b'=') => return (i, b'='),
            b',' if balanced => return (i, b','),
            b';' if balanced => return (i, b';'),
            b'\n' if balanced => {
                let trailing = src
                    .prev_significant(i)
                    .filter(|&p| src.is_code(p))
                    .map(|p| matches!(src.bytes[p], b'|' | b'&'))
                    .unwrap_or(false);
                let next = src.skip_trivia(i + 1);
                let leading = next < src.len()
                    && src.is_code(next)
                    && matches!(src.bytes[next], b'|' | b'&');
                if !trailing && !leading {
                    return (i, b'\n');
                }
            }
            _ => {}
        }
        i += 1;
    }
    (src.len(), b'\n')
}

/// Skip an initializer expression: to the next `,` or `;` at depth zero, or
/// the end of the statement line.
fn initializer_end(src: &Source<'_>, from: usize) -> usize {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    let mut i = src.skip_trivia(from);
    while i < src.len() {
        if !src.is_code(i) {
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        let balanced = paren == 0 && brace == 0 && bracket == 0;
        match b {
            b'(' => paren += 1,
            b')' if balanced => return i,
            b')' => paren -= 1,
            b'{' => brace += 1,
            b'}' if balanced => return i,
            b'}' => brace -= 1,
            b'[' => bracket += 1,
            b']' => bracket -= 1,
            b',' | b';' if balanced => return i,
            b'\n' if balanced => return i,
            _ => {}
        }
        i += 1;
    }
    src.len()
}

fn strip_class_properties(src: &Source<'_>, edits: &mut EditList) {
    for (open, close) in class_body_ranges(src) {
        let mut i = src.skip_trivia(open + 1);
        while i < close {
            i = strip_member(src, edits, i, close);
        }
    }
}

/// Handle one class member starting at `i`; returns the start of the next
/// member. Only plain property declarations are rewritten here - methods
/// were already normalized by the signature pass, so their headers and
/// bodies are skipped wholesale.
fn strip_member(src: &Source<'_>, edits: &mut EditList, i: usize, close: usize) -> usize {
    let mut cur = i;

    // Leading member keywords that survive in the output.
    loop {
        match src.word_at(cur) {
            Some((w, end)) if matches!(w, "static" | "async" | "get" | "set") => {
                let n = src.skip_trivia(end);
                // Only a modifier when something nameable follows.
                if n < close && (src.word_at(n).is_some() || src.bytes[n] == b'#') {
                    cur = src.skip_trivia(end);
                    continue;
                }
                break;
            }
            _ => break,
        }
    }

    // Member name: identifier, `#private`, or computed `[...]`.
    let name_end = if cur < close && src.is_code(cur) && src.bytes[cur] == b'#' {
        match src.word_at(cur + 1) {
            Some((_, end)) => end,
            None => return advance_member(src, cur + 1, close),
        }
    } else if let Some((_, end)) = src.word_at(cur) {
        end
    } else if cur < close && src.is_code(cur) && src.bytes[cur] == b'[' {
        match src.find_matching(cur) {
            Some(c) => c + 1,
            None => return close,
        }
    } else if cur < close && src.is_code(cur) && src.bytes[cur] == b';' {
        return src.skip_trivia(cur + 1);
    } else {
        return advance_member(src, cur + 1, close);
    };

    let mut q = src.skip_trivia(name_end);
    if q >= close {
        return close;
    }

    // Optional / definite-assignment markers.
    let mut marker: Option<usize> = None;
    if src.is_code(q) && matches!(src.bytes[q], b'?' | b'!') && src.bytes.get(q + 1) != Some(&b'=') {
        marker = Some(q);
        q = src.skip_trivia(q + 1);
    }

    if q < close && src.is_code(q) && src.bytes[q] == b':' {
        let start = src.trim_spaces_back(marker.unwrap_or(q), name_end);
        let (end, end_byte) = annotation_end(src, q + 1);
        let end = end.min(close);
        if end_byte == b'=' {
            edits.push(start, end, " ");
        } else {
            edits.push(start, src.trim_trivia_back(end, start), "");
        }
        return advance_member(src, end, close);
    }
    if let Some(mk) = marker {
        // `ready!;` or `label?;` with no annotation.
        edits.push(src.trim_spaces_back(mk, name_end), mk + 1, "");
        return advance_member(src, mk + 1, close);
    }
    advance_member(src, name_end, close)
}

/// Advance to the start of the next class member: past a `;`, past a
/// balanced method body, or past an initializer expression.
fn advance_member(src: &Source<'_>, from: usize, close: usize) -> usize {
    let mut paren = 0i32;
    let mut bracket = 0i32;
    let mut i = from.max(1);
    while i < close {
        if !src.is_code(i) {
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        let balanced = paren == 0 && bracket == 0;
        match b {
            b'(' => paren += 1,
            b')' => paren -= 1,
            b'[' => bracket += 1,
            b']' => bracket -= 1,
            b'{' if balanced => {
                // Method body or object-literal initializer: skip it whole.
                match src.find_matching(i) {
                    Some(c) => {
                        i = c + 1;
                        continue;
                    }
                    None => return close,
                }
            }
            b'{' => {}
            b';' if balanced => return src.skip_trivia(i + 1),
            b'\n' if balanced && paren == 0 => {
                // ASI: a member can end at the line break.
                let next = src.skip_trivia(i + 1);
                if next < close && src.is_code(next) && matches!(src.bytes[next], b'.' | b'(' | b'[' | b'=' | b'?' | b':' | b'+' | b'-' | b'*' | b'|' | b'&') {
                    i = next;
                    continue;
                }
                return next;
            }
            _ => {}
        }
        i += 1;
    }
    close
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> String {
        let mut diags = DiagnosticCollection::new();
        normalize_bindings(text, &mut diags)
    }

    #[test]
    fn test_simple_annotation() {
        assert_eq!(run("const total: number = 0;"), "const total = 0;");
        assert_eq!(run("let name: string;"), "let name;");
        assert_eq!(run("var flag: boolean = true;"), "var flag = true;");
    }

    #[test]
    fn test_object_type_annotation() {
        assert_eq!(
            run("const origin: { x: number; y: number } = { x: 0, y: 0 };"),
            "const origin = { x: 0, y: 0 };"
        );
    }

    #[test]
    fn test_generic_annotation() {
        assert_eq!(
            run("const cache: Map<string, number> = new Map();"),
            "const cache = new Map();"
        );
    }

    #[test]
    fn test_array_annotation_with_ternary_initializer() {
        assert_eq!(
            run("let history: string[] = stored ? JSON.parse(stored) : [];"),
            "let history = stored ? JSON.parse(stored) : [];"
        );
    }

    #[test]
    fn test_multiple_declarators() {
        assert_eq!(run("let a: number = 1, b: string = 'x', c = 2;"), "let a = 1, b = 'x', c = 2;");
    }

    #[test]
    fn test_for_loop_binding() {
        assert_eq!(
            run("for (let i: number = 0; i < n; i++) { use(i); }"),
            "for (let i = 0; i < n; i++) { use(i); }"
        );
    }

    #[test]
    fn test_for_of_untouched() {
        let text = "for (const row of rows) { push(row); }";
        assert_eq!(run(text), text);
    }

    #[test]
    fn test_destructuring_annotation() {
        assert_eq!(
            run("const { id, text }: Post = payload;"),
            "const { id, text } = payload;"
        );
    }

    #[test]
    fn test_ternary_untouched() {
        let text = "const r = cond ? a : b;";
        assert_eq!(run(text), text);
    }

    #[test]
    fn test_object_literal_untouched() {
        let text = "const opts = { depth: 'basic', retries: 3 };";
        assert_eq!(run(text), text);
    }

    #[test]
    fn test_definite_assignment_marker() {
        assert_eq!(run("let ready!: boolean;"), "let ready;");
    }

    #[test]
    fn test_class_property_annotations() {
        let text = "class Store {\n  cache: Map<string, number> = new Map();\n  label: string;\n  hits = 0;\n}";
        let out = run(text);
        assert!(out.contains("cache = new Map();"));
        assert!(out.contains("\n  label;"));
        assert!(out.contains("hits = 0;"));
    }

    #[test]
    fn test_class_optional_property() {
        let out = run("class A {\n  note?: string;\n}");
        assert!(out.contains("\n  note;"));
    }

    #[test]
    fn test_class_methods_left_to_signature_pass() {
        let text = "class A {\n  run() {\n    const inner = { a: 1 };\n    return inner;\n  }\n}";
        assert_eq!(run(text), text);
    }

    #[test]
    fn test_object_property_inside_method_untouched() {
        let text = "class A {\n  build() {\n    return { mode: 'fast', depth: 2 };\n  }\n}";
        assert_eq!(run(text), text);
    }

    #[test]
    fn test_static_property() {
        let out = run("class Config {\n  static instance: Config;\n}");
        assert!(out.contains("static instance;"));
    }

    #[test]
    fn test_multiline_object_initializer() {
        let text = "const settings: AppSettings = {\n  refreshInterval: 60,\n  maxPosts: 25,\n};";
        let out = run(text);
        assert_eq!(out, "const settings = {\n  refreshInterval: 60,\n  maxPosts: 25,\n};");
    }
}
