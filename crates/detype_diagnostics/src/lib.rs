//! detype_diagnostics: Diagnostic messages and reporting infrastructure.
//!
//! The transformer never fails hard on ambiguous source: it prefers leaving
//! text untouched and recording a diagnostic pointing at the region that
//! needs manual review. This module defines the message catalogue and the
//! collection type the pipeline threads through its passes.

use detype_core::text::TextSpan;
use std::fmt;

/// Diagnostic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Message,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Warning => write!(f, "warning"),
            DiagnosticCategory::Error => write!(f, "error"),
            DiagnosticCategory::Message => write!(f, "message"),
        }
    }
}

/// A diagnostic message template with a code and category.
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    /// The diagnostic code (e.g., 1001, 1201).
    pub code: u32,
    /// The category of this diagnostic.
    pub category: DiagnosticCategory,
    /// The message template string. May contain `{0}`, `{1}`, etc. placeholders.
    pub message: &'static str,
}

/// A realized diagnostic with location information and resolved message text.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The file path where this diagnostic occurred, if any.
    pub file: Option<String>,
    /// The source text span where this diagnostic occurred, if any.
    pub span: Option<TextSpan>,
    /// The resolved message text.
    pub message_text: String,
    /// The diagnostic code.
    pub code: u32,
    /// The category.
    pub category: DiagnosticCategory,
}

impl Diagnostic {
    /// Create a new diagnostic without location info.
    pub fn new(message: &DiagnosticMessage, args: &[&str]) -> Self {
        Self {
            file: None,
            span: None,
            message_text: format_message(message.message, args),
            code: message.code,
            category: message.category,
        }
    }

    /// Create a new diagnostic at a span in the current buffer.
    pub fn at(span: TextSpan, message: &DiagnosticMessage, args: &[&str]) -> Self {
        Self {
            file: None,
            span: Some(span),
            message_text: format_message(message.message, args),
            code: message.code,
            category: message.category,
        }
    }

    /// Attach a file name to this diagnostic.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Whether this is an error diagnostic.
    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}", file)?;
            if let Some(span) = self.span {
                write!(f, "({})", span.start)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{} DT{}: {}", self.category, self.code, self.message_text)
    }
}

/// Format a message template by replacing `{0}`, `{1}`, etc. with arguments.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut result = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{}}}", i), arg);
    }
    result
}

/// A collection of diagnostics accumulated during a conversion.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollection {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollection {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.category == DiagnosticCategory::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.category == DiagnosticCategory::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn extend(&mut self, other: DiagnosticCollection) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Attach a file name to every diagnostic that does not carry one yet.
    pub fn assign_file(&mut self, file: &str) {
        for d in &mut self.diagnostics {
            if d.file.is_none() {
                d.file = Some(file.to_string());
            }
        }
    }

    /// Sort diagnostics by file and position.
    pub fn sort(&mut self) {
        self.diagnostics.sort_by(|a, b| {
            let file_cmp = a.file.cmp(&b.file);
            if file_cmp != std::cmp::Ordering::Equal {
                return file_cmp;
            }
            let a_pos = a.span.map(|s| s.start).unwrap_or(0);
            let b_pos = b.span.map(|s| s.start).unwrap_or(0);
            a_pos.cmp(&b_pos)
        });
    }
}

// ============================================================================
// Diagnostic Messages
// ============================================================================

pub mod messages {
    use super::*;

    macro_rules! diag {
        ($code:expr, Error, $msg:expr) => {
            DiagnosticMessage { code: $code, category: DiagnosticCategory::Error, message: $msg }
        };
        ($code:expr, Warning, $msg:expr) => {
            DiagnosticMessage { code: $code, category: DiagnosticCategory::Warning, message: $msg }
        };
        ($code:expr, Message, $msg:expr) => {
            DiagnosticMessage { code: $code, category: DiagnosticCategory::Message, message: $msg }
        };
    }

    // ========================================================================
    // Unterminated literals (1000-1099)
    // ========================================================================
    pub const UNTERMINATED_STRING_LITERAL: DiagnosticMessage =
        diag!(1001, Error, "Unterminated string literal; the rest of the file was left unchanged.");
    pub const UNTERMINATED_TEMPLATE_LITERAL: DiagnosticMessage =
        diag!(1002, Error, "Unterminated template literal; the rest of the file was left unchanged.");
    pub const UNTERMINATED_BLOCK_COMMENT: DiagnosticMessage =
        diag!(1003, Error, "Unterminated block comment; the rest of the file was left unchanged.");

    // ========================================================================
    // Unbalanced delimiters (1100-1199)
    // ========================================================================
    pub const UNCLOSED_INTERFACE_BODY: DiagnosticMessage =
        diag!(1101, Warning, "No closing '}' found for interface '{0}'; the declaration was left unchanged.");
    pub const UNTERMINATED_TYPE_ALIAS: DiagnosticMessage =
        diag!(1102, Warning, "No terminating ';' found for type alias '{0}'; the declaration was left unchanged.");
    pub const UNCLOSED_PARAMETER_LIST: DiagnosticMessage =
        diag!(1103, Warning, "No closing ')' found for this parameter list; the signature was left unchanged.");
    pub const UNCLOSED_TYPE_ARGUMENT_LIST: DiagnosticMessage =
        diag!(1104, Warning, "Type argument list is never closed on this line; the expression was left unchanged.");

    // ========================================================================
    // Ambiguous annotations (1200-1299)
    // ========================================================================
    pub const AMBIGUOUS_RETURN_TYPE: DiagnosticMessage =
        diag!(1201, Warning, "Could not locate a function body after this return type annotation; left unchanged.");
    pub const AMBIGUOUS_TYPE_ASSERTION: DiagnosticMessage =
        diag!(1202, Warning, "'as' is not followed by a recognizable type here; left unchanged.");
    pub const AMBIGUOUS_ANNOTATION: DiagnosticMessage =
        diag!(1203, Warning, "Could not tell this ':' apart from object or ternary syntax; left unchanged.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message("No closing '}}' found for interface '{0}'.", &["Foo"]),
            "No closing '}' found for interface 'Foo'."
        );
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::at(
            TextSpan::new(4, 9),
            &messages::UNCLOSED_INTERFACE_BODY,
            &["Config"],
        )
        .with_file("src/Code.ts");
        let rendered = d.to_string();
        assert!(rendered.starts_with("src/Code.ts(4): warning DT1101"));
        assert!(rendered.contains("'Config'"));
    }

    #[test]
    fn test_collection_sort() {
        let mut c = DiagnosticCollection::new();
        c.add(Diagnostic::at(TextSpan::new(30, 1), &messages::AMBIGUOUS_ANNOTATION, &[]));
        c.add(Diagnostic::at(TextSpan::new(2, 1), &messages::AMBIGUOUS_ANNOTATION, &[]));
        c.sort();
        assert_eq!(c.diagnostics()[0].span.unwrap().start, 2);
    }

    #[test]
    fn test_collection_error_count() {
        let mut c = DiagnosticCollection::new();
        c.add(Diagnostic::new(&messages::UNTERMINATED_STRING_LITERAL, &[]));
        c.add(Diagnostic::new(&messages::AMBIGUOUS_ANNOTATION, &[]));
        assert!(c.has_errors());
        assert_eq!(c.error_count(), 1);
        assert_eq!(c.len(), 2);
    }
}
