//! Whole-construct removal: declarations with no runtime representation.
//!
//! Interfaces and type aliases are removed in their entirety with
//! depth-counted scanning (a non-greedy `\{[^}]*\}` match loses nested
//! bodies, so braces are matched explicitly). Import statements disappear,
//! `export` markers are stripped off the declarations they modify, access
//! modifiers vanish, and class heads lose their type parameters and
//! `implements` clauses. Removal is purely subtractive; blank lines left
//! behind are collapsed by the cleanup pass.

use crate::scan::{EditList, Source};
use detype_core::text::TextSpan;
use detype_diagnostics::{messages, Diagnostic, DiagnosticCollection};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INTERFACE_RE: Regex = Regex::new(r"\binterface\b").unwrap();
    static ref TYPE_RE: Regex = Regex::new(r"\btype\b").unwrap();
    static ref IMPORT_RE: Regex = Regex::new(r"\bimport\b").unwrap();
    static ref EXPORT_RE: Regex = Regex::new(r"\bexport\b").unwrap();
    static ref CLASS_RE: Regex = Regex::new(r"\bclass\b").unwrap();
    static ref MODIFIER_RE: Regex = Regex::new(r"\b(?:private|public|protected|readonly)\b").unwrap();
}

/// Pass 2: remove type-only declarations and markers.
pub fn strip_declarations(text: &str, diagnostics: &mut DiagnosticCollection) -> String {
    let src = Source::new(text);
    let mut edits = EditList::new();

    strip_interfaces(&src, &mut edits, diagnostics);
    strip_type_aliases(&src, &mut edits, diagnostics);
    strip_class_heritage(&src, &mut edits);
    strip_imports(&src, &mut edits);
    strip_export_markers(&src, &mut edits);
    strip_modifiers(&src, &mut edits);

    edits.apply(text)
}

/// Whether the keyword starting at `i` sits in declaration position (start
/// of a statement or member, possibly behind `export`/`declare`).
fn decl_position(src: &Source<'_>, i: usize) -> bool {
    let prev = match src.prev_significant(i) {
        Some(p) => p,
        None => return true,
    };
    if !src.is_code(prev) {
        return false;
    }
    if matches!(src.bytes[prev], b';' | b'{' | b'}') {
        return true;
    }
    if let Some((word, _)) = src.word_ending_at(prev + 1) {
        return matches!(word, "export" | "declare");
    }
    false
}

/// Extend a deletion start leftwards over an `export`/`declare` prefix.
fn include_prefix(src: &Source<'_>, i: usize) -> usize {
    if let Some(p) = src.prev_significant(i) {
        if let Some((word, start)) = src.word_ending_at(p + 1) {
            if matches!(word, "export" | "declare") {
                return start;
            }
        }
    }
    i
}

fn strip_interfaces(src: &Source<'_>, edits: &mut EditList, diagnostics: &mut DiagnosticCollection) {
    for m in INTERFACE_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) || !decl_position(src, i) {
            continue;
        }
        let start = include_prefix(src, i);
        let mut cur = src.skip_trivia(m.end());
        let (name, name_end) = match src.word_at(cur) {
            Some(w) => w,
            None => continue,
        };
        cur = src.skip_trivia(name_end);

        // Optional generic parameter list on the interface itself.
        if cur < src.len() && src.bytes[cur] == b'<' {
            match src.find_matching(cur) {
                Some(close) => cur = src.skip_trivia(close + 1),
                None => {
                    diagnostics.add(Diagnostic::at(
                        TextSpan::new(i as u32, 9),
                        &messages::UNCLOSED_INTERFACE_BODY,
                        &[name],
                    ));
                    continue;
                }
            }
        }

        // Skip an extends clause (possibly with its own type arguments) to
        // reach the body brace.
        let mut open = None;
        let mut steps = 0usize;
        while cur < src.len() {
            steps += 1;
            if steps > 1000 {
                break;
            }
            if !src.is_code(cur) {
                cur = src.mask.protected_run_end(cur);
                continue;
            }
            match src.bytes[cur] {
                b'{' => {
                    open = Some(cur);
                    break;
                }
                b'<' | b'(' | b'[' => match src.find_matching(cur) {
                    Some(close) => cur = close + 1,
                    None => break,
                },
                b';' | b'=' => break,
                _ => cur += 1,
            }
        }

        let open = match open {
            Some(o) => o,
            None => {
                diagnostics.add(Diagnostic::at(
                    TextSpan::new(i as u32, 9),
                    &messages::UNCLOSED_INTERFACE_BODY,
                    &[name],
                ));
                continue;
            }
        };
        match src.find_matching(open) {
            Some(close) => {
                edits.push(start, close + 1, "");
            }
            None => {
                diagnostics.add(Diagnostic::at(
                    TextSpan::new(i as u32, 9),
                    &messages::UNCLOSED_INTERFACE_BODY,
                    &[name],
                ));
            }
        }
    }
}

fn strip_type_aliases(src: &Source<'_>, edits: &mut EditList, diagnostics: &mut DiagnosticCollection) {
    for m in TYPE_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) || !decl_position(src, i) {
            continue;
        }
        let start = include_prefix(src, i);
        let mut cur = src.skip_trivia(m.end());
        let (name, name_end) = match src.word_at(cur) {
            Some(w) => w,
            None => continue,
        };
        cur = src.skip_trivia(name_end);

        if cur < src.len() && src.bytes[cur] == b'<' {
            match src.find_matching(cur) {
                Some(close) => cur = src.skip_trivia(close + 1),
                None => continue,
            }
        }
        // Only `type Name =` is an alias; `type` is also a legal identifier.
        if cur >= src.len() || src.bytes[cur] != b'=' || src.bytes.get(cur + 1) == Some(&b'=') {
            continue;
        }

        match alias_end(src, cur + 1) {
            Some(end) => {
                edits.push(start, end, "");
            }
            None => {
                diagnostics.add(Diagnostic::at(
                    TextSpan::new(i as u32, 4),
                    &messages::UNTERMINATED_TYPE_ALIAS,
                    &[name],
                ));
            }
        }
    }
}

/// Find the end of a type alias body starting after its `=`. Returns the
/// exclusive end of the deletion: past a terminating `;`, or at the line
/// break for a semicolonless single-line alias.
fn alias_end(src: &Source<'_>, from: usize) -> Option<usize> {
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
            b';' if balanced => return Some(i + 1),
            b'\n' if balanced => {
                // The alias continues past the line break when the line
                // ends with `|`, `&`, or `=`, or the next line leads with
                // `|` or `&`.
                let trailing = src
                    .prev_significant(i)
                    .filter(|&p| src.is_code(p))
                    .map(|p| matches!(src.bytes[p], b'|' | b'&' | b'='))
                    .unwrap_or(false);
                let next = src.skip_trivia(i + 1);
                let leading = next < src.len()
                    && src.is_code(next)
                    && matches!(src.bytes[next], b'|' | b'&');
                if !trailing && !leading {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    let balanced = paren == 0 && brace == 0 && bracket == 0 && angle == 0;
    if balanced {
        Some(src.len())
    } else {
        None
    }
}

/// Remove class type parameters, type arguments on the extends target, and
/// the whole `implements` clause.
fn strip_class_heritage(src: &Source<'_>, edits: &mut EditList) {
    for m in CLASS_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) {
            continue;
        }
        let mut cur = src.skip_trivia(m.end());
        // Optional class name (class expressions may omit it).
        if let Some((word, end)) = src.word_at(cur) {
            if word != "extends" && word != "implements" {
                cur = src.skip_trivia(end);
            }
        }

        let mut impl_start = None;
        let mut open = None;
        let mut steps = 0usize;
        while cur < src.len() {
            steps += 1;
            if steps > 500 {
                break;
            }
            if !src.is_code(cur) {
                cur = src.mask.protected_run_end(cur);
                continue;
            }
            let b = src.bytes[cur];
            if b == b'{' {
                open = Some(cur);
                break;
            }
            if let Some((word, end)) = src.word_at(cur) {
                if word == "implements" && impl_start.is_none() {
                    impl_start = Some(cur);
                }
                cur = end;
                continue;
            }
            match b {
                b'<' => match src.find_matching(cur) {
                    Some(close) => {
                        if impl_start.is_none() {
                            edits.push(cur, close + 1, "");
                        }
                        cur = close + 1;
                    }
                    None => break,
                },
                b'(' | b'[' => match src.find_matching(cur) {
                    Some(close) => cur = close + 1,
                    None => break,
                },
                b';' | b'=' | b')' | b'}' => break,
                _ => cur += 1,
            }
        }

        if let (Some(imp), Some(o)) = (impl_start, open) {
            edits.push(imp, o, "");
        }
    }
}

fn strip_imports(src: &Source<'_>, edits: &mut EditList) {
    for m in IMPORT_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) || !decl_position(src, i) {
            continue;
        }
        // `import(...)` is a runtime call and `import.meta` a runtime value.
        let next = src.skip_trivia(m.end());
        if next < src.len() && matches!(src.bytes[next], b'(' | b'.') {
            continue;
        }
        if let Some(end) = statement_end(src, m.end()) {
            edits.push(m.start(), end, "");
        }
    }
}

/// Find the end of an import/export statement: past a top-level `;`, or at
/// the line break once the statement cannot continue.
fn statement_end(src: &Source<'_>, from: usize) -> Option<usize> {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    let mut saw_specifier = false;
    let mut i = from;
    let mut lines = 0usize;
    while i < src.len() {
        if !src.is_code(i) {
            if src.mask.kind(i) == detype_guard::ProtectionKind::Str {
                saw_specifier = true;
            }
            i = src.mask.protected_run_end(i);
            continue;
        }
        let b = src.bytes[i];
        let balanced = paren == 0 && brace == 0 && bracket == 0;
        match b {
            b'(' => paren += 1,
            b')' => paren -= 1,
            b'{' => brace += 1,
            b'}' => brace -= 1,
            b'[' => bracket += 1,
            b']' => bracket -= 1,
            b';' if balanced => return Some(i + 1),
            b'\n' if balanced => {
                lines += 1;
                if lines > 40 {
                    return None;
                }
                if saw_specifier {
                    return Some(i);
                }
                let cont = src
                    .prev_significant(i)
                    .map(|p| {
                        if !src.is_code(p) {
                            return true;
                        }
                        if matches!(src.bytes[p], b',' | b'{') {
                            return true;
                        }
                        src.word_ending_at(p + 1)
                            .map(|(w, _)| matches!(w, "from" | "import" | "export" | "type"))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false);
                if !cont {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Some(src.len())
}

fn strip_export_markers(src: &Source<'_>, edits: &mut EditList) {
    for m in EXPORT_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) || !decl_position(src, i) {
            continue;
        }
        let next = src.skip_trivia(m.end());
        if next >= src.len() {
            continue;
        }
        if let Some((word, end)) = src.word_at(next) {
            if word == "default" {
                // `export default <expr>` keeps the expression as a
                // statement.
                edits.push(i, src.skip_trivia(end), "");
                continue;
            }
            if word == "type" {
                // `export type { ... }` is linkage-only. (`export type X =`
                // was already consumed by the alias pass and overlaps.)
                if let Some(end) = statement_end(src, m.end()) {
                    edits.push(i, end, "");
                }
                continue;
            }
            // `export function f` and friends: drop the keyword only.
            edits.push(i, next, "");
            continue;
        }
        if matches!(src.bytes[next], b'{' | b'*') {
            // Re-export / named export list: no runtime declaration here.
            if let Some(end) = statement_end(src, m.end()) {
                edits.push(i, end, "");
            }
            continue;
        }
        edits.push(i, next, "");
    }
}

fn strip_modifiers(src: &Source<'_>, edits: &mut EditList) {
    for m in MODIFIER_RE.find_iter(src.text) {
        let i = m.start();
        if !src.is_code(i) || edits.contains_point(i) {
            continue;
        }
        // Must be the leading token of a member or parameter.
        let lead = match src.prev_significant(i) {
            None => true,
            Some(p) => {
                src.is_code(p)
                    && (matches!(src.bytes[p], b';' | b'{' | b'}' | b'(' | b',')
                        || src
                            .word_ending_at(p + 1)
                            .map(|(w, _)| {
                                matches!(
                                    w,
                                    "static" | "async" | "abstract" | "public" | "private"
                                        | "protected" | "readonly" | "export"
                                )
                            })
                            .unwrap_or(false))
            }
        };
        if !lead {
            continue;
        }
        // Must be followed by the identifier it modifies; `private: 1` or
        // `private()` are uses of the word as a name.
        let next = src.skip_trivia(m.end());
        if next >= src.len() {
            continue;
        }
        let follows_ident = src.word_at(next).is_some() || src.bytes[next] == b'#';
        if !follows_ident {
            continue;
        }
        edits.push(i, next, "");
    }
}
