//! detype_converter: Conversion orchestration.
//!
//! Runs the pass pipeline over one buffer, and drives whole-project batches
//! in parallel. Per-file conversion is synchronous and owns its buffer; the
//! batch fans independent files out across rayon workers, each writing a
//! distinct destination path.

use detype_diagnostics::DiagnosticCollection;
use detype_guard::guard_source;
use detype_passes::{
    collapse_blank_lines, normalize_bindings, normalize_expressions, normalize_signatures,
    strip_declarations,
};
use detype_project::{copy_asset, WorkItem};
use rayon::prelude::*;
use std::path::PathBuf;
use thiserror::Error;

/// The finished conversion of one buffer: the untyped output plus every
/// diagnostic the pipeline raised. Never mutated after the final pass.
///
/// Guard diagnostics carry spans into the original text; a diagnostic from
/// a later pass indexes that pass's input buffer, so once earlier passes
/// have removed text its location drifts toward the start of the file.
/// Positions are a review aid, not an exact map.
#[derive(Debug)]
pub struct ConversionResult {
    pub output: String,
    pub diagnostics: DiagnosticCollection,
}

impl ConversionResult {
    /// Whether any region of the output needs manual review.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// The type-stripping converter. Stateless; one instance can convert any
/// number of files.
#[derive(Debug, Default)]
pub struct Converter;

impl Converter {
    pub fn new() -> Self {
        Self
    }

    /// Convert one buffer. The file name is only used to label diagnostics.
    pub fn convert(&self, file_name: &str, source: &str) -> ConversionResult {
        let mut diagnostics = DiagnosticCollection::new();

        // The guard runs first so unterminated-literal reports carry spans
        // into the original text; the passes re-derive their masks privately.
        let guarded = guard_source(source);
        diagnostics.extend(guarded.diagnostics);

        let buffer = strip_declarations(source, &mut diagnostics);
        let buffer = normalize_signatures(&buffer, &mut diagnostics);
        let buffer = normalize_expressions(&buffer, &mut diagnostics);
        let buffer = normalize_bindings(&buffer, &mut diagnostics);
        let output = collapse_blank_lines(&buffer);

        diagnostics.assign_file(file_name);
        diagnostics.sort();
        ConversionResult {
            output,
            diagnostics,
        }
    }
}

/// Errors that fail a single work item outright (as opposed to diagnostics,
/// which accompany a produced output).
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Project(#[from] detype_project::ProjectError),
}

/// What happened to one work item.
#[derive(Debug)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub diagnostics: DiagnosticCollection,
    pub error: Option<ConvertError>,
    pub copied: bool,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Batch totals for reporting.
#[derive(Debug)]
pub struct BatchSummary {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    pub fn converted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded() && !o.copied)
            .count()
    }

    pub fn copied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded() && o.copied)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.diagnostics.len()).sum()
    }
}

/// Convert a whole work list, writing outputs as we go. Files are
/// independent, so they are processed in parallel; failures are isolated
/// per item and never abort the batch.
pub fn convert_project(items: &[WorkItem]) -> BatchSummary {
    let converter = Converter::new();
    let mut outcomes: Vec<FileOutcome> = items
        .par_iter()
        .map(|item| run_item(&converter, item))
        .collect();
    outcomes.sort_by(|a, b| a.source.cmp(&b.source));
    BatchSummary { outcomes }
}

fn run_item(converter: &Converter, item: &WorkItem) -> FileOutcome {
    match item {
        WorkItem::CopyAsset { source, dest } => {
            let error = copy_asset(source, dest).err().map(ConvertError::from);
            FileOutcome {
                source: source.clone(),
                dest: dest.clone(),
                diagnostics: DiagnosticCollection::new(),
                error,
                copied: true,
            }
        }
        WorkItem::Transform { source, dest } => {
            let text = match std::fs::read_to_string(source) {
                Ok(t) => t,
                Err(e) => {
                    return FileOutcome {
                        source: source.clone(),
                        dest: dest.clone(),
                        diagnostics: DiagnosticCollection::new(),
                        error: Some(ConvertError::Read {
                            path: source.clone(),
                            source: e,
                        }),
                        copied: false,
                    }
                }
            };
            let result = converter.convert(&source.to_string_lossy(), &text);
            let error = write_output(dest, &result.output).err();
            FileOutcome {
                source: source.clone(),
                dest: dest.clone(),
                diagnostics: result.diagnostics,
                error,
                copied: false,
            }
        }
    }
}

fn write_output(dest: &PathBuf, text: &str) -> Result<(), ConvertError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConvertError::Write {
            path: dest.clone(),
            source: e,
        })?;
    }
    std::fs::write(dest, text).map_err(|e| ConvertError::Write {
        path: dest.clone(),
        source: e,
    })
}

/// Tokenize a buffer into its runtime-significant tokens: identifiers,
/// literals (as single tokens), and operator/punctuation characters.
/// Comments and whitespace vanish. Conversion of a diagnostic-free buffer
/// must preserve this sequence exactly, minus the type syntax it removes -
/// the integration suite leans on that property.
pub fn runtime_tokens(text: &str) -> Vec<String> {
    use detype_guard::chars::ident_part_at;
    use detype_guard::ProtectionKind;

    let guarded = guard_source(text);
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        match guarded.mask.kind(i) {
            ProtectionKind::Comment => {
                i = guarded.mask.protected_run_end(i);
            }
            ProtectionKind::Str | ProtectionKind::Template => {
                // A literal is one token; interpolations split templates
                // into their own runs.
                let end = guarded.mask.protected_run_end(i);
                tokens.push(text[i..end].to_string());
                i = end;
            }
            ProtectionKind::Code => {
                let b = bytes[i];
                if b.is_ascii_whitespace() {
                    i += 1;
                } else if ident_part_at(text, i) || b.is_ascii_digit() {
                    let mut end = i;
                    while end < bytes.len()
                        && guarded.mask.is_code(end)
                        && (ident_part_at(text, end) || bytes[end].is_ascii_digit())
                    {
                        end += if bytes[end] < 0x80 {
                            1
                        } else {
                            text[end..].chars().next().map(char::len_utf8).unwrap_or(1)
                        };
                    }
                    tokens.push(text[i..end].to_string());
                    i = end;
                } else {
                    tokens.push((b as char).to_string());
                    i += 1;
                }
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_clean_source() {
        let converter = Converter::new();
        let result = converter.convert("t.ts", "const x: number = 1;\n");
        assert!(result.is_clean());
        assert_eq!(result.output, "const x = 1;\n");
    }

    #[test]
    fn test_diagnostics_carry_file_name() {
        let converter = Converter::new();
        let result = converter.convert("bad.ts", "const s = 'open\nlet x = 1;\n");
        assert!(!result.is_clean());
        assert_eq!(
            result.diagnostics.diagnostics()[0].file.as_deref(),
            Some("bad.ts")
        );
    }

    #[test]
    fn test_runtime_tokens() {
        let tokens = runtime_tokens("const x = f(1, 'two'); // note\n");
        assert_eq!(
            tokens,
            vec!["const", "x", "=", "f", "(", "1", ",", "'two'", ")", ";"]
        );
    }

    #[test]
    fn test_runtime_tokens_template_split_by_interpolation() {
        let tokens = runtime_tokens("`a${n}b`");
        assert_eq!(tokens, vec!["`a${", "n", "}b`"]);
    }
}
