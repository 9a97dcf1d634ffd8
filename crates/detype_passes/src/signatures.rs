//! Function and method signature normalization.
//!
//! Recognizes headers - `function f(...)`, method and accessor forms,
//! arrows - and strips their return-type annotation and every parameter
//! annotation, leaving parameter names, default values, destructuring
//! patterns and rest markers intact. Everything is decided with balanced
//! scanning against the protection mask; a call site is never rewritten
//! because a header is only confirmed once the token after the closing
//! paren is a body brace, an arrow, or a return annotation that provably
//! leads to one.

use crate::scan::{is_control_keyword, EditList, Source};
use detype_core::text::TextSpan;
use detype_diagnostics::{messages, Diagnostic, DiagnosticCollection};
use memchr::memchr_iter;

/// Pass 3: strip return-type and parameter-type annotations.
pub fn normalize_signatures(text: &str, diagnostics: &mut DiagnosticCollection) -> String {
    let src = Source::new(text);
    let mut edits = EditList::new();

    for i in memchr_iter(b'(', src.bytes) {
        if !src.is_code(i) || edits.contains_point(i) {
            continue;
        }

        // What sits to the left of the paren: an identifier (possibly with a
        // generic parameter list between them), the `function` keyword, or
        // punctuation (arrow parameter lists).
        let mut ident_prev = false;
        let mut prev_word: Option<&str> = None;
        let mut ident_start: Option<usize> = None;
        let mut generic_list: Option<(usize, usize)> = None;

        if let Some(p) = src.prev_significant(i) {
            if src.is_code(p) && src.bytes[p] == b'>' {
                if let Some(lt) = generic_open_before(&src, p) {
                    generic_list = Some((lt, p + 1));
                    if let Some(q) = src.prev_significant(lt) {
                        if src.is_code(q) {
                            if let Some((w, ws)) = src.word_ending_at(q + 1) {
                                if is_control_keyword(w) {
                                    continue;
                                }
                                ident_prev = true;
                                prev_word = Some(w);
                                ident_start = Some(ws);
                            }
                        }
                    }
                }
            } else if src.is_code(p) {
                if let Some((w, ws)) = src.word_ending_at(p + 1) {
                    if is_control_keyword(w) {
                        continue;
                    }
                    ident_prev = true;
                    prev_word = Some(w);
                    ident_start = Some(ws);
                }
            }
        }

        let close = match src.find_matching(i) {
            Some(c) => c,
            None => {
                if prev_word == Some("function") {
                    diagnostics.add(Diagnostic::at(
                        TextSpan::new(i as u32, 1),
                        &messages::UNCLOSED_PARAMETER_LIST,
                        &[],
                    ));
                }
                continue;
            }
        };

        let k = src.skip_trivia(close + 1);
        if k >= src.len() {
            continue;
        }

        let mut confirmed = false;
        if src.bytes[k] == b'{' {
            confirmed = ident_prev;
        } else if src.bytes[k] == b'=' && src.bytes.get(k + 1) == Some(&b'>') {
            confirmed = true;
        } else if src.bytes[k] == b':' && !call_in_ternary(&src, ident_start, prev_word) {
            match return_annotation_end(&src, k, diagnostics) {
                Some(BodyStart::Brace(body)) => {
                    if ident_prev {
                        edits.push(close + 1, body, " ");
                        confirmed = true;
                    }
                }
                Some(BodyStart::Arrow(arrow)) => {
                    edits.push(close + 1, arrow, " ");
                    confirmed = true;
                }
                None => {}
            }
        }

        if confirmed {
            if let Some((a, b)) = generic_list {
                edits.push(a, b, "");
            }
            strip_params(&src, &mut edits, i + 1, close);
        }
    }

    edits.apply(text)
}

/// `cond ? f(a) : ...` or `case f(a): ...` - a call whose closing paren is
/// followed by a colon that is not a return annotation. A genuine method
/// header's identifier is never preceded by `.`, `?`, `:`, or an
/// expression-position keyword; the `function` keyword is unambiguous
/// either way.
fn call_in_ternary(src: &Source<'_>, ident_start: Option<usize>, prev_word: Option<&str>) -> bool {
    if prev_word == Some("function") {
        return false;
    }
    let start = match ident_start {
        Some(s) => s,
        None => return false,
    };
    let p = match src.prev_significant(start) {
        Some(p) => p,
        None => return false,
    };
    if !src.is_code(p) {
        return false;
    }
    if matches!(src.bytes[p], b'.' | b'?' | b':') {
        return true;
    }
    src.word_ending_at(p + 1)
        .map(|(w, _)| is_control_keyword(w))
        .unwrap_or(false)
}

/// Walk backwards from a `>` to the `<` opening the same angle-bracket list.
fn generic_open_before(src: &Source<'_>, gt: usize) -> Option<usize> {
    let mut depth = 1i32;
    let mut j = gt;
    let floor = gt.saturating_sub(400);
    while j > floor {
        j -= 1;
        if !src.is_code(j) {
            j = src.protected_run_start(j);
            continue;
        }
        match src.bytes[j] {
            b'>' => {
                if j > 0 && src.bytes[j - 1] == b'=' {
                    // `=>` inside a function type.
                    j -= 1;
                } else {
                    depth += 1;
                }
            }
            b'<' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            b';' | b'{' | b'}' => return None,
            _ => {}
        }
    }
    None
}

/// Statement-position words that cannot appear inside a type annotation.
fn expression_keyword(word: &str) -> bool {
    matches!(
        word,
        "return" | "if"
            | "for"
            | "while"
            | "switch"
            | "do"
            | "else"
            | "case"
            | "throw"
            | "await"
            | "yield"
            | "delete"
            | "new"
            | "var"
            | "let"
            | "const"
            | "function"
            | "break"
            | "continue"
    )
}

/// Where a confirmed header's body begins after a return annotation.
enum BodyStart {
    Brace(usize),
    Arrow(usize),
}

/// Scan a return-type annotation starting at its `:` and locate the body it
/// leads to. Tolerates object-shaped return types spanning lines. Returns
/// None (leaving the text alone) when the colon turns out to belong to an
/// expression; reports a diagnostic only when the bounded lookahead runs out
/// while the content still reads as a type.
fn return_annotation_end(
    src: &Source<'_>,
    colon: usize,
    diagnostics: &mut DiagnosticCollection,
) -> Option<BodyStart> {
    let mut i = colon + 1;
    let hard_bound = (colon + 800).min(src.len());
    let mut newlines = 0usize;
    loop {
        // Skip trivia, counting line breaks toward the lookahead bound.
        while i < src.len() {
            if src.mask.is_comment(i) {
                i = src.mask.protected_run_end(i);
                continue;
            }
            if src.is_code(i) && src.bytes[i].is_ascii_whitespace() {
                if src.bytes[i] == b'\n' {
                    newlines += 1;
                }
                i += 1;
                continue;
            }
            break;
        }
        if i >= src.len() {
            return None;
        }
        if i >= hard_bound || newlines > 8 {
            diagnostics.add(Diagnostic::at(
                TextSpan::new(colon as u32, 1),
                &messages::AMBIGUOUS_RETURN_TYPE,
                &[],
            ));
            return None;
        }
        if !src.is_code(i) {
            // String or template literal type.
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        if b == b'=' && src.bytes.get(i + 1) == Some(&b'>') {
            return Some(BodyStart::Arrow(i));
        }
        match b {
            b'{' => {
                let close = match src.find_matching(i) {
                    Some(c) => c,
                    None => return None,
                };
                // An object-shaped return type is followed by the real body
                // brace or the arrow; otherwise this brace IS the body.
                let n = src.skip_trivia(close + 1);
                let continues = n < src.len()
                    && src.is_code(n)
                    && (src.bytes[n] == b'{'
                        || (src.bytes[n] == b'=' && src.bytes.get(n + 1) == Some(&b'>')));
                if continues {
                    i = close + 1;
                } else {
                    return Some(BodyStart::Brace(i));
                }
            }
            b'(' | b'[' | b'<' => match src.find_matching(i) {
                Some(c) => i = c + 1,
                None => return None,
            },
            b';' | b',' | b')' | b']' | b'}' | b'=' => return None,
            b'.' | b'|' | b'&' | b'?' | b':' | b'!' | b'-' => i += 1,
            _ => {
                if let Some((word, end)) = src.word_at(i) {
                    // `void`, `typeof`, `keyof` etc. are legal in type
                    // position; statement keywords mean this colon belongs
                    // to an expression (ternary branch, case label).
                    if expression_keyword(word) {
                        return None;
                    }
                    i = end;
                } else if b.is_ascii_digit() {
                    i += 1;
                } else {
                    return None;
                }
            }
        }
    }
}

/// Strip the annotations of every parameter in `[pstart, pend)`.
fn strip_params(src: &Source<'_>, edits: &mut EditList, pstart: usize, pend: usize) {
    let mut p = src.skip_trivia(pstart);
    while p < pend {
        let (pe, next) = param_extent(src, p, pend);
        let removed_whole = process_param(src, edits, p, pe);
        if removed_whole {
            // A `this` pseudo-parameter disappears together with its
            // trailing comma.
            edits.push(p, next.min(pend), "");
        }
        if next <= p {
            break;
        }
        p = next;
    }
}

/// The extent of one parameter: up to the next comma at bracket-depth zero
/// relative to the parameter list. Angle brackets only gain depth inside an
/// annotation (after `:`, before a top-level `=`), so a comparison inside a
/// default value cannot swallow the separator.
fn param_extent(src: &Source<'_>, from: usize, pend: usize) -> (usize, usize) {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    let mut angle = 0i32;
    let mut in_annotation = false;
    let mut i = from;
    while i < pend {
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
            b'<' if in_annotation => angle += 1,
            b'>' if angle > 0 => angle -= 1,
            b':' if balanced => in_annotation = true,
            b'=' if balanced => in_annotation = false,
            b',' if balanced => return (i, src.skip_trivia(i + 1)),
            _ => {}
        }
        i += 1;
    }
    (pend, pend)
}

/// Strip one parameter's annotation (and optional marker). Returns true if
/// the whole parameter should be removed (`this` typing).
fn process_param(src: &Source<'_>, edits: &mut EditList, s_raw: usize, e_raw: usize) -> bool {
    let s = src.skip_trivia(s_raw);
    let e = src.trim_trivia_back(e_raw, s);
    if s >= e {
        return false;
    }
    let is_this = src.word_at(s).map(|(w, _)| w == "this").unwrap_or(false);

    // Locate the optional marker and the annotation colon at depth zero,
    // stopping at a default-value `=`.
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    let mut question: Option<usize> = None;
    let mut colon: Option<usize> = None;
    let mut i = s;
    while i < e {
        if !src.is_code(i) {
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        if b == b'=' && src.bytes.get(i + 1) == Some(&b'>') {
            i += 2;
            continue;
        }
        let balanced = paren == 0 && brace == 0 && bracket == 0;
        match b {
            b'(' => paren += 1,
            b')' => paren -= 1,
            b'{' => brace += 1,
            b'}' => brace -= 1,
            b'[' => bracket += 1,
            b']' => bracket -= 1,
            b'?' if balanced => question = Some(i),
            b':' if balanced => colon = Some(i),
            b'=' if balanced => break,
            _ => {}
        }
        if colon.is_some() {
            break;
        }
        i += 1;
    }

    if let Some(colon_idx) = colon {
        if is_this {
            return true;
        }
        let mut start = question.unwrap_or(colon_idx);
        start = src.trim_spaces_back(start, s);
        let eq = annotation_assignment(src, colon_idx + 1, e);
        match eq {
            Some(eq_idx) => {
                edits.push(start, eq_idx, " ");
            }
            None => {
                edits.push(start, e, "");
            }
        }
    } else if let Some(q) = question {
        let start = src.trim_spaces_back(q, s);
        edits.push(start, q + 1, "");
    }
    false
}

/// Find the `=` that ends an annotation and begins a default value, if any,
/// between `from` and `e`. Angle brackets count here: the scan is entirely
/// inside an annotation.
fn annotation_assignment(src: &Source<'_>, from: usize, e: usize) -> Option<usize> {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    let mut angle = 0i32;
    let mut i = from;
    while i < e {
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
            b'=' if balanced && src.bytes.get(i + 1) != Some(&b'=') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> (String, DiagnosticCollection) {
        let mut diags = DiagnosticCollection::new();
        let out = normalize_signatures(text, &mut diags);
        (out, diags)
    }

    #[test]
    fn test_signature_round_trip() {
        let (out, diags) = run(r#"function f(a: number, b?: string = "x"): void { return; }"#);
        assert!(diags.is_empty());
        assert_eq!(out, r#"function f(a, b = "x") { return; }"#);
    }

    #[test]
    fn test_union_type_parameter() {
        let (out, _) = run("function g(mode: 'A' | 'B', n: number) {}");
        assert_eq!(out, "function g(mode, n) {}");
    }

    #[test]
    fn test_generic_annotation_comma_not_a_separator() {
        let (out, _) = run("function h(map: Map<string, number>, tag: string) {}");
        assert_eq!(out, "function h(map, tag) {}");
    }

    #[test]
    fn test_rest_and_destructuring() {
        let (out, _) = run("function f({a, b}: Config, ...rest: number[]) {}");
        assert_eq!(out, "function f({a, b}, ...rest) {}");
    }

    #[test]
    fn test_object_return_type_multiline() {
        let text = "function stats(): {\n  views: number;\n  likes: number;\n} {\n  return { views: 0, likes: 0 };\n}";
        let (out, diags) = run(text);
        assert!(diags.is_empty());
        assert!(out.starts_with("function stats() {"));
        assert!(out.contains("return { views: 0, likes: 0 };"));
    }

    #[test]
    fn test_arrow_with_return_type() {
        let (out, _) = run("const f = (x: number): number => x * 2;");
        assert_eq!(out, "const f = (x) => x * 2;");
    }

    #[test]
    fn test_async_arrow() {
        let (out, _) = run("const load = async (id: string) => fetch(id);");
        assert_eq!(out, "const load = async (id) => fetch(id);");
    }

    #[test]
    fn test_method_with_return_annotation() {
        let text = "class A {\n  area(): number {\n    return 1;\n  }\n}";
        let (out, _) = run(text);
        assert!(out.contains("area() {"));
    }

    #[test]
    fn test_generic_method_header() {
        let (out, _) = run("function pick<T>(items: T[], n: number): T[] { return items; }");
        assert_eq!(out, "function pick(items, n) { return items; }");
    }

    #[test]
    fn test_call_site_untouched() {
        let text = "save(record, { sheet: 'Posts' });";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_if_condition_untouched() {
        let text = "if (check(a) && b) { run(); }";
        let (out, _) = run(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_ternary_with_calls_untouched() {
        let text = "const v = cond ? pick(a) : fallback(b);";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_ternary_arrow_alternative_untouched() {
        let text = "const h = cond ? f(a) : (x) => y;";
        let (out, _) = run(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_switch_case_call_label_untouched() {
        let text = "switch (k) { case key(a): return 1; default: return 0; }";
        let (out, _) = run(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_case_label_with_block_untouched() {
        let text = "switch (k) { case key(a): { run(); } }";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_function_typed_parameter_with_default() {
        let (out, _) = run("function on(cb: (e: Event) => void = () => {}) {}");
        assert_eq!(out, "function on(cb = () => {}) {}");
    }

    #[test]
    fn test_this_parameter_removed() {
        let (out, _) = run("function bind(this: Window, x: number) { return x; }");
        assert_eq!(out, "function bind(x) { return x; }");
    }

    #[test]
    fn test_optional_without_annotation() {
        let (out, _) = run("function opt(a?, b) {}");
        assert_eq!(out, "function opt(a, b) {}");
    }

    #[test]
    fn test_default_with_ternary_untouched() {
        let text = "function pick(flag = cond ? 1 : 2) {}";
        let (out, _) = run(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_annotated_string_param_preserves_literal() {
        let (out, _) = run("function tag(sep: string = ', ') { return sep; }");
        assert_eq!(out, "function tag(sep = ', ') { return sep; }");
    }

    #[test]
    fn test_idempotent_on_untyped() {
        let text = "function add(a, b = 2) {\n  return a + b;\n}\nconst mul = (x, y) => x * y;";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }
}
