// ChapterSleuth - core/discovery.rs
//
// Recursive directory traversal and novel file discovery.
//
// Uses `walkdir` as an OS abstraction and reads only file metadata, never
// content; decoding is owned by the app layer. Per-file I/O errors are
// non-fatal and collected as warnings. Exclude patterns short-circuit
// directory descent via filter_entry so excluded subtrees are never
// traversed at all.

use crate::core::model::DiscoveredFile;
use crate::util::constants;
use crate::util::error::DiscoveryError;
use std::path::Path;

/// Configuration for a discovery operation.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum directory recursion depth.
    pub max_depth: usize,

    /// Maximum number of matching files to return before stopping.
    pub max_files: usize,

    /// Glob patterns (filename-only) that a file MUST match to be included.
    /// An empty list means "include everything that is not excluded".
    pub include_patterns: Vec<String>,

    /// Glob patterns matched against filenames AND directory component
    /// names. Matching files are skipped; matching directories are not
    /// descended into.
    pub exclude_patterns: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: constants::DEFAULT_MAX_DEPTH,
            max_files: constants::DEFAULT_MAX_FILES,
            include_patterns: constants::DEFAULT_INCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            exclude_patterns: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

/// Discover novel files under `root`, applying include/exclude globs.
///
/// Inaccessible entries are recorded as warning strings and do not abort
/// the walk; only an invalid root or the max-files limit is fatal.
pub fn discover_files(
    root: &Path,
    config: &DiscoveryConfig,
) -> Result<(Vec<DiscoveredFile>, Vec<String>), DiscoveryError> {
    if !root.exists() {
        return Err(DiscoveryError::RootNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let max_files = config.max_files.min(constants::ABSOLUTE_MAX_FILES);
    let max_depth = config.max_depth.min(constants::ABSOLUTE_MAX_DEPTH);

    tracing::debug!(
        root = %root.display(),
        max_depth,
        max_files,
        include = ?config.include_patterns,
        exclude = ?config.exclude_patterns,
        "Discovery starting"
    );

    let include_pats = compile_patterns(&config.include_patterns, "include");
    let exclude_pats = compile_patterns(&config.exclude_patterns, "exclude");

    let mut files: Vec<DiscoveredFile> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() {
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_str().unwrap_or("");
                return !is_excluded_component(name, &exclude_pats);
            }
            true
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let msg = format!("Cannot access '{path_str}': {e}");
                tracing::debug!(warning = %msg, "Discovery warning");
                warnings.push(msg);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => {
                warnings.push(format!("Skipping '{}': non-UTF-8 filename", path.display()));
                continue;
            }
        };

        if is_excluded_component(file_name, &exclude_pats) {
            continue;
        }
        if !include_pats.is_empty() && !include_pats.iter().any(|p| p.matches(file_name)) {
            continue;
        }

        let size_bytes = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warnings.push(format!("Cannot stat '{}': {e}", path.display()));
                continue;
            }
        };

        if files.len() >= max_files {
            return Err(DiscoveryError::MaxFilesExceeded { max: max_files });
        }
        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            size_bytes,
        });
    }

    tracing::info!(
        files = files.len(),
        warnings = warnings.len(),
        "Discovery complete"
    );
    Ok((files, warnings))
}

fn compile_patterns(patterns: &[String], kind: &str) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = %p, kind, error = %e, "Invalid glob pattern; skipped");
                None
            }
        })
        .collect()
}

fn is_excluded_component(name: &str, exclude_pats: &[glob::Pattern]) -> bool {
    exclude_pats.iter().any(|p| p.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discovers_txt_files_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("소설 1-100.txt"), "내용");
        touch(&dir.path().join("cover.jpg"), "binary");
        touch(&dir.path().join("nested/소설 2.txt"), "내용");

        let (files, warnings) = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_excluded_directories_not_descended() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".git/objects/aa.txt"), "x");
        touch(&dir.path().join("novel.txt"), "내용");

        let (files, _) = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("novel.txt"));
    }

    #[test]
    fn test_max_files_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            touch(&dir.path().join(format!("{i}.txt")), "x");
        }
        let config = DiscoveryConfig {
            max_files: 3,
            ..Default::default()
        };
        let result = discover_files(dir.path(), &config);
        assert!(matches!(
            result,
            Err(DiscoveryError::MaxFilesExceeded { max: 3 })
        ));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let result = discover_files(Path::new("/definitely/not/here"), &DiscoveryConfig::default());
        assert!(matches!(result, Err(DiscoveryError::RootNotFound { .. })));
    }

    #[test]
    fn test_deterministic_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.txt"] {
            touch(&dir.path().join(name), "x");
        }
        let (files, _) = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }
}
