//! Expression-level stripping: `as` assertions, generic argument lists,
//! and postfix non-null assertions.
//!
//! The dangerous neighbours here are the comparison and shift operators and
//! ternary syntax. A `<` is only consumed as a type-argument list when a
//! balanced `>` is reached with purely type-like content in between and the
//! list is immediately applied to a call - `if (a < b && c > d)` fails the
//! content test and stays untouched. Ternary `?`/`:` pairs are never
//! anchors for this pass at all.

use crate::scan::{EditList, Source};
use detype_core::text::TextSpan;
use detype_diagnostics::{messages, Diagnostic, DiagnosticCollection};
use detype_guard::ProtectionKind;
use lazy_static::lazy_static;
use memchr::memchr_iter;
use regex::Regex;

lazy_static! {
    static ref AS_RE: Regex = Regex::new(r"\bas\b").unwrap();
}

/// Pass 4: strip assertions and generic argument lists from expressions.
pub fn normalize_expressions(text: &str, diagnostics: &mut DiagnosticCollection) -> String {
    let src = Source::new(text);
    let mut edits = EditList::new();

    strip_as_assertions(&src, &mut edits, diagnostics);
    strip_generic_arguments(&src, &mut edits, diagnostics);
    strip_non_null_assertions(&src, &mut edits);

    edits.apply(text)
}

fn strip_as_assertions(src: &Source<'_>, edits: &mut EditList, diagnostics: &mut DiagnosticCollection) {
    for m in AS_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) {
            continue;
        }
        // `as` only asserts in expression position: after an identifier, a
        // literal, or a closing delimiter. `import * as ns` stays.
        let prev = match src.prev_significant(i) {
            Some(p) => p,
            None => continue,
        };
        let expr_prev = if src.is_code(prev) {
            match src.bytes[prev] {
                b')' | b']' => true,
                _ => src
                    .word_ending_at(prev + 1)
                    .map(|(w, _)| !reserved_before_as(w))
                    .unwrap_or(false),
            }
        } else {
            // A string, template, or regex literal can be asserted.
            !src.mask.is_comment(prev)
        };
        if !expr_prev {
            continue;
        }

        match type_expression_end(src, src.skip_trivia(m.end())) {
            Some(end) => {
                let start = src.trim_spaces_back(i, 0);
                edits.push(start, end, "");
            }
            None => {
                diagnostics.add(Diagnostic::at(
                    TextSpan::new(i as u32, 2),
                    &messages::AMBIGUOUS_TYPE_ASSERTION,
                    &[],
                ));
            }
        }
    }
}

/// Words that cannot be the asserted operand to their right.
fn reserved_before_as(word: &str) -> bool {
    matches!(
        word,
        "return" | "case" | "in" | "of" | "new" | "typeof" | "delete" | "void" | "yield"
            | "await" | "instanceof" | "do" | "else" | "throw" | "const" | "let" | "var"
            | "function" | "class"
    )
}

/// Consume a type expression starting at `i`: a (possibly generic,
/// possibly array-suffixed) type reference, extended over `|`/`&` unions.
/// Returns the exclusive end, or None when the text does not read as a
/// type.
fn type_expression_end(src: &Source<'_>, i: usize) -> Option<usize> {
    let mut end = type_reference_end(src, i)?;
    loop {
        let n = src.skip_trivia(end);
        if n >= src.len() || !src.is_code(n) {
            return Some(end);
        }
        let b = src.bytes[n];
        let doubled = src.bytes.get(n + 1) == Some(&b);
        if (b == b'|' || b == b'&') && !doubled {
            let after = src.skip_trivia(n + 1);
            end = type_reference_end(src, after)?;
            continue;
        }
        return Some(end);
    }
}

/// One type reference: `Ident(.Ident)*`, optional `<...>`, optional `[]`
/// suffixes. A string literal type is also accepted.
fn type_reference_end(src: &Source<'_>, i: usize) -> Option<usize> {
    if i >= src.len() {
        return None;
    }
    let mut end;
    if !src.is_code(i) {
        if src.mask.kind(i) != ProtectionKind::Str {
            return None;
        }
        end = src.mask.protected_run_end(i);
    } else {
        let (_, word_end) = src.word_at(i)?;
        end = word_end;
        // Qualified name.
        loop {
            let n = src.skip_trivia(end);
            if n < src.len() && src.is_code(n) && src.bytes[n] == b'.' {
                let after = src.skip_trivia(n + 1);
                let (_, we) = src.word_at(after)?;
                end = we;
            } else {
                break;
            }
        }
        // Generic arguments.
        let n = src.skip_trivia(end);
        if n < src.len() && src.is_code(n) && src.bytes[n] == b'<' {
            let close = src.find_matching(n)?;
            end = close + 1;
        }
    }
    // Array suffixes, `any[][]` included.
    loop {
        let n = src.skip_trivia(end);
        if n + 1 < src.len()
            && src.is_code(n)
            && src.bytes[n] == b'['
            && src.skip_trivia(n + 1) < src.len()
            && src.bytes[src.skip_trivia(n + 1)] == b']'
        {
            end = src.skip_trivia(n + 1) + 1;
        } else {
            break;
        }
    }
    Some(end)
}

fn strip_generic_arguments(src: &Source<'_>, edits: &mut EditList, diagnostics: &mut DiagnosticCollection) {
    for i in memchr_iter(b'<', src.bytes) {
        if !src.is_code(i) || edits.contains_point(i) {
            continue;
        }
        // Only after an identifier: `Map<...>`, `fetchJson<...>`.
        let prev = match src.prev_significant(i) {
            Some(p) => p,
            None => continue,
        };
        if !src.is_code(prev) || src.word_ending_at(prev + 1).is_none() {
            continue;
        }

        match angle_list_end(src, i) {
            AngleScan::Closed(close) => {
                // Type arguments must be applied: `foo<T>(...)`.
                let follow = src.skip_trivia(close + 1);
                if follow < src.len() && src.is_code(follow) && src.bytes[follow] == b'(' {
                    edits.push(i, close + 1, "");
                }
            }
            AngleScan::NotTypeArguments => {}
            AngleScan::Unbalanced => {
                diagnostics.add(Diagnostic::at(
                    TextSpan::new(i as u32, 1),
                    &messages::UNCLOSED_TYPE_ARGUMENT_LIST,
                    &[],
                ));
            }
        }
    }
}

enum AngleScan {
    Closed(usize),
    NotTypeArguments,
    Unbalanced,
}

/// Scan a candidate type-argument list on one line. Content must stay
/// type-like; `&&`, `||`, arithmetic, or statement punctuation at top level
/// mean the `<` was a comparison. Running out of line with type-like
/// content is the genuinely ambiguous case and is reported.
fn angle_list_end(src: &Source<'_>, lt: usize) -> AngleScan {
    let bound = src.line_end(lt);
    // A numeric right operand is a comparison: `count < 60`.
    let first = src.skip_trivia(lt + 1);
    if first < src.len() && src.is_code(first) && src.bytes[first].is_ascii_digit() {
        return AngleScan::NotTypeArguments;
    }
    let mut angle = 1i32;
    let mut brace = 0i32;
    let mut paren = 0i32;
    let mut i = lt + 1;
    while i < bound {
        if !src.is_code(i) {
            if src.mask.is_comment(i) {
                return AngleScan::NotTypeArguments;
            }
            // Literal types are fine content.
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        if b == b'=' && src.bytes.get(i + 1) == Some(&b'>') {
            i += 2;
            continue;
        }
        match b {
            b'<' => angle += 1,
            b'>' => {
                angle -= 1;
                if angle == 0 {
                    return AngleScan::Closed(i);
                }
            }
            b'{' => brace += 1,
            b'}' => {
                if brace == 0 {
                    return AngleScan::NotTypeArguments;
                }
                brace -= 1;
            }
            b'(' => paren += 1,
            b')' => {
                if paren == 0 {
                    return AngleScan::NotTypeArguments;
                }
                paren -= 1;
            }
            b'&' | b'|' => {
                if src.bytes.get(i + 1) == Some(&b) {
                    return AngleScan::NotTypeArguments;
                }
            }
            b':' | b';' => {
                if brace == 0 && paren == 0 {
                    return AngleScan::NotTypeArguments;
                }
            }
            b',' | b'.' | b'[' | b']' | b'?' | b'-' => {}
            _ => {
                if src.word_at(i).is_some() {
                    let (_, end) = src.word_at(i).unwrap();
                    i = end;
                    continue;
                }
                if b.is_ascii_digit() || b.is_ascii_whitespace() {
                    i += 1;
                    continue;
                }
                return AngleScan::NotTypeArguments;
            }
        }
        i += 1;
    }
    if angle > 0 {
        AngleScan::Unbalanced
    } else {
        AngleScan::NotTypeArguments
    }
}

/// Postfix `!` non-null assertions: `config!.key`, `find(id)!`. Written
/// flush against the operand, which keeps prefix negation and `!=` apart.
fn strip_non_null_assertions(src: &Source<'_>, edits: &mut EditList) {
    for i in memchr_iter(b'!', src.bytes) {
        if !src.is_code(i) || edits.contains_point(i) {
            continue;
        }
        if src.bytes.get(i + 1) == Some(&b'=') {
            continue;
        }
        if i == 0 {
            continue;
        }
        let p = i - 1;
        let operand = if src.is_code(p) {
            matches!(src.bytes[p], b')' | b']') || detype_guard::chars::ident_part_at(src.text, p)
        } else {
            src.mask.kind(p) == ProtectionKind::Str || src.mask.kind(p) == ProtectionKind::Template
        };
        if operand {
            edits.push(i, i + 1, "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> (String, DiagnosticCollection) {
        let mut diags = DiagnosticCollection::new();
        let out = normalize_expressions(text, &mut diags);
        (out, diags)
    }

    #[test]
    fn test_as_simple() {
        let (out, diags) = run("const data = response as PostData;");
        assert_eq!(out, "const data = response;");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_as_any_array() {
        let (out, _) = run("const rows = sheet.getValues() as any[];");
        assert_eq!(out, "const rows = sheet.getValues();");
    }

    #[test]
    fn test_as_const() {
        let (out, _) = run("const modes = ['a', 'b'] as const;");
        assert_eq!(out, "const modes = ['a', 'b'];");
    }

    #[test]
    fn test_as_generic_type() {
        let (out, _) = run("const map = raw as Map<string, number>;");
        assert_eq!(out, "const map = raw;");
    }

    #[test]
    fn test_as_union() {
        let (out, _) = run("const m = v as 'basic' | 'detailed';");
        assert_eq!(out, "const m = v;");
    }

    #[test]
    fn test_import_star_as_untouched() {
        let text = "import * as utils from './utils';";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_as_property_name_untouched() {
        let text = "const x = opts.as;";
        let (out, _) = run(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_as_in_string_untouched() {
        let text = "const s = 'save as draft';";
        let (out, _) = run(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_generic_call_stripped() {
        let (out, diags) = run("const m = new Map<string, number>();");
        assert_eq!(out, "const m = new Map();");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_comparison_untouched() {
        let text = "if (a < b && c > d) {}";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_loop_comparison_untouched() {
        let text = "for (let i = 0; i < rows.length; i++) { sum += i; }";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_generic_with_object_type_argument() {
        let (out, _) = run("const cache = new Map<string, { hits: number }>();");
        assert_eq!(out, "const cache = new Map();");
    }

    #[test]
    fn test_generic_function_call() {
        let (out, _) = run("const post = fetchJson<Post>(url);");
        assert_eq!(out, "const post = fetchJson(url);");
    }

    #[test]
    fn test_bare_angle_without_call_untouched() {
        let text = "const less = a < b;";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_numeric_comparison_at_line_end_silent() {
        let text = "const every = n < 60\n  ? 'minutes'\n  : 'hours';";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_typelike_unbalanced_reports() {
        let text = "if (limit < threshold\n  && c > d) {}";
        let (_, diags) = run(text);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.diagnostics()[0].code, 1104);
    }

    #[test]
    fn test_ternary_untouched() {
        let text = "const r = cond ? a : b;";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_non_null_after_call() {
        let (out, _) = run("const v = lookup(id)!;");
        assert_eq!(out, "const v = lookup(id);");
    }

    #[test]
    fn test_non_null_before_member() {
        let (out, _) = run("settings!.apiKey = key;");
        assert_eq!(out, "settings.apiKey = key;");
    }

    #[test]
    fn test_negation_untouched() {
        let text = "if (!ready && a != b && c !== d) { flip(); }";
        let (out, _) = run(text);
        assert_eq!(out, text);
    }

    #[test]
    fn test_as_with_bad_tail_reports() {
        let text = "const x = y as (Foo);";
        let (out, diags) = run(text);
        assert_eq!(out, text);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.diagnostics()[0].code, 1202);
    }
}
