//! detype_options: detype.json parsing and conversion options.
//!
//! A project can carry a `detype.json` next to its sources selecting the
//! source and output directories, the file patterns to convert, and the
//! asset extensions to copy through unchanged. CLI flags override whatever
//! the file says.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options controlling one conversion run, matching the detype.json schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Directory containing the typed sources.
    pub src_dir: Option<String>,
    /// Directory receiving the converted output.
    pub out_dir: Option<String>,
    /// Subpaths to exclude from discovery.
    pub exclude: Option<Vec<String>>,
    /// File extensions copied through byte-for-byte (with the dot).
    pub asset_extensions: Option<Vec<String>>,
    /// Treat any diagnostic as a failure.
    pub strict: Option<bool>,
}

impl ConvertOptions {
    /// The source directory, defaulting to `src`.
    pub fn src_dir(&self) -> &str {
        self.src_dir.as_deref().unwrap_or("src")
    }

    /// The output directory, defaulting to `dist`.
    pub fn out_dir(&self) -> &str {
        self.out_dir.as_deref().unwrap_or("dist")
    }

    /// The exclusion list, defaulting to the usual non-source directories.
    pub fn exclude(&self) -> Vec<String> {
        self.exclude
            .clone()
            .unwrap_or_else(|| vec!["node_modules".to_string(), ".git".to_string()])
    }

    /// Asset extensions copied unchanged; markup templates and manifest
    /// files by default.
    pub fn asset_extensions(&self) -> Vec<String> {
        self.asset_extensions
            .clone()
            .unwrap_or_else(|| vec![".html".to_string(), ".json".to_string()])
    }

    pub fn strict(&self) -> bool {
        self.strict.unwrap_or(false)
    }

    /// Overlay another set of options; fields set in `other` win.
    pub fn merged_with(&self, other: &ConvertOptions) -> ConvertOptions {
        ConvertOptions {
            src_dir: other.src_dir.clone().or_else(|| self.src_dir.clone()),
            out_dir: other.out_dir.clone().or_else(|| self.out_dir.clone()),
            exclude: other.exclude.clone().or_else(|| self.exclude.clone()),
            asset_extensions: other
                .asset_extensions
                .clone()
                .or_else(|| self.asset_extensions.clone()),
            strict: other.strict.or(self.strict),
        }
    }
}

/// Parse a detype.json document from a string.
pub fn parse_options(content: &str) -> Result<ConvertOptions, serde_json::Error> {
    serde_json::from_str(content)
}

/// Parse a detype.json file from a path.
pub fn parse_options_file(path: impl AsRef<Path>) -> Result<ConvertOptions, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_options(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ConvertOptions::default();
        assert_eq!(opts.src_dir(), "src");
        assert_eq!(opts.out_dir(), "dist");
        assert!(!opts.strict());
        assert!(opts.asset_extensions().contains(&".html".to_string()));
    }

    #[test]
    fn test_parse() {
        let opts = parse_options(
            r#"{"srcDir": "app", "outDir": "build", "assetExtensions": [".html"], "strict": true}"#,
        )
        .unwrap();
        assert_eq!(opts.src_dir(), "app");
        assert_eq!(opts.out_dir(), "build");
        assert_eq!(opts.asset_extensions(), vec![".html".to_string()]);
        assert!(opts.strict());
    }

    #[test]
    fn test_partial_document_gets_defaults() {
        let opts = parse_options(r#"{"outDir": "out"}"#).unwrap();
        assert_eq!(opts.src_dir(), "src");
        assert_eq!(opts.out_dir(), "out");
    }

    #[test]
    fn test_merge_overrides() {
        let base = parse_options(r#"{"srcDir": "app", "strict": false}"#).unwrap();
        let cli = ConvertOptions {
            out_dir: Some("build".to_string()),
            strict: Some(true),
            ..Default::default()
        };
        let merged = base.merged_with(&cli);
        assert_eq!(merged.src_dir(), "app");
        assert_eq!(merged.out_dir(), "build");
        assert!(merged.strict());
    }
}
