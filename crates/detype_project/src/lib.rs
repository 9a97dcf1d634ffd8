//! detype_project: source discovery and asset passthrough.
//!
//! Walks a source directory and pairs every file with its destination:
//! typed sources become transform items (`.ts` mapped to `.js`), markup and
//! manifest files become copy items, and everything else is ignored. The
//! converter core never discovers files itself - it only ever sees the
//! `(source, destination)` pairs produced here.

use detype_options::ConvertOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while discovering or copying files.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("source directory '{0}' does not exist")]
    MissingSourceDir(PathBuf),
    #[error("failed to read directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy '{path}': {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Convert a typed source file and write the untyped result.
    Transform { source: PathBuf, dest: PathBuf },
    /// Copy a non-transformable asset byte-for-byte.
    CopyAsset { source: PathBuf, dest: PathBuf },
}

impl WorkItem {
    pub fn source(&self) -> &Path {
        match self {
            WorkItem::Transform { source, .. } => source,
            WorkItem::CopyAsset { source, .. } => source,
        }
    }

    pub fn dest(&self) -> &Path {
        match self {
            WorkItem::Transform { dest, .. } => dest,
            WorkItem::CopyAsset { dest, .. } => dest,
        }
    }
}

/// Walk `src_dir` and produce the work list for one conversion run.
/// Destination paths mirror the source layout under `out_dir`; the caller
/// gets distinct destinations because the walk never yields a source twice.
pub fn discover_work(
    src_dir: &Path,
    out_dir: &Path,
    options: &ConvertOptions,
) -> Result<Vec<WorkItem>, ProjectError> {
    if !src_dir.is_dir() {
        return Err(ProjectError::MissingSourceDir(src_dir.to_path_buf()));
    }
    let exclude = options.exclude();
    let assets = options.asset_extensions();
    let mut items = Vec::new();
    walk_directory(src_dir, src_dir, out_dir, &exclude, &assets, &mut items)?;
    items.sort_by(|a, b| a.source().cmp(b.source()));
    Ok(items)
}

fn walk_directory(
    root: &Path,
    dir: &Path,
    out_dir: &Path,
    exclude: &[String],
    assets: &[String],
    items: &mut Vec<WorkItem>,
) -> Result<(), ProjectError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProjectError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if is_excluded(&path, exclude) {
            continue;
        }
        if path.is_dir() {
            let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if matches!(dir_name, "node_modules" | ".git" | "dist" | "build") {
                continue;
            }
            walk_directory(root, &path, out_dir, exclude, assets, items)?;
        } else if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.ends_with(".d.ts") {
                // Pure type declarations have no runtime output.
                continue;
            }
            if name.ends_with(".ts") {
                let mut dest = out_dir.join(rel);
                dest.set_extension("js");
                items.push(WorkItem::Transform {
                    source: path.clone(),
                    dest,
                });
            } else if assets.iter().any(|ext| name.ends_with(ext.as_str())) {
                items.push(WorkItem::CopyAsset {
                    source: path.clone(),
                    dest: out_dir.join(rel),
                });
            }
        }
    }
    Ok(())
}

fn is_excluded(path: &Path, exclude: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    exclude.iter().any(|pattern| {
        let trimmed = pattern.trim_start_matches("./").trim_start_matches("**/");
        !trimmed.is_empty() && path_str.contains(trimmed)
    })
}

/// Copy an asset byte-for-byte, creating the destination directory.
pub fn copy_asset(source: &Path, dest: &Path) -> Result<(), ProjectError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ProjectError::Copy {
            path: dest.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::copy(source, dest).map_err(|e| ProjectError::Copy {
        path: source.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// The latest modification time among the given files; used by watch mode.
pub fn latest_mtime(paths: &[PathBuf]) -> std::time::SystemTime {
    let mut latest = std::time::SystemTime::UNIX_EPOCH;
    for p in paths {
        if let Ok(metadata) = std::fs::metadata(p) {
            if let Ok(mtime) = metadata.modified() {
                if mtime > latest {
                    latest = mtime;
                }
            }
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("detype_project_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_discover_transforms_and_assets() {
        let root = scratch_dir("discover");
        let src = root.join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("Code.ts"), "const a: number = 1;").unwrap();
        fs::write(src.join("nested/util.ts"), "let b = 2;").unwrap();
        fs::write(src.join("index.html"), "<html></html>").unwrap();
        fs::write(src.join("manifest.json"), "{}").unwrap();
        fs::write(src.join("notes.md"), "ignored").unwrap();
        fs::write(src.join("globals.d.ts"), "declare const g: number;").unwrap();

        let items = discover_work(&src, &root.join("dist"), &ConvertOptions::default()).unwrap();
        let transforms: Vec<_> = items
            .iter()
            .filter(|i| matches!(i, WorkItem::Transform { .. }))
            .collect();
        let copies: Vec<_> = items
            .iter()
            .filter(|i| matches!(i, WorkItem::CopyAsset { .. }))
            .collect();
        assert_eq!(transforms.len(), 2);
        assert_eq!(copies.len(), 2);
        assert!(items.iter().all(|i| !i.source().ends_with("notes.md")));
        assert!(items.iter().all(|i| !i.source().ends_with("globals.d.ts")));

        let code = items
            .iter()
            .find(|i| i.source().ends_with("Code.ts"))
            .unwrap();
        assert!(code.dest().ends_with("dist/Code.js"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_source_dir() {
        let err = discover_work(
            Path::new("/nonexistent/detype/src"),
            Path::new("/tmp/out"),
            &ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::MissingSourceDir(_)));
    }

    #[test]
    fn test_exclusions() {
        let root = scratch_dir("exclude");
        let src = root.join("src");
        fs::create_dir_all(src.join("vendor")).unwrap();
        fs::write(src.join("main.ts"), "let a = 1;").unwrap();
        fs::write(src.join("vendor/lib.ts"), "let b = 2;").unwrap();

        let options = ConvertOptions {
            exclude: Some(vec!["vendor".to_string()]),
            ..Default::default()
        };
        let items = discover_work(&src, &root.join("dist"), &options).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].source().ends_with("main.ts"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_copy_asset_creates_parents() {
        let root = scratch_dir("copy");
        let src = root.join("index.html");
        fs::write(&src, "<h1>ok</h1>").unwrap();
        let dest = root.join("out/deep/index.html");
        copy_asset(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "<h1>ok</h1>");
        let _ = fs::remove_dir_all(&root);
    }
}
