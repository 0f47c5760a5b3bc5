// ChapterSleuth - app/batch.rs
//
// Driver pipeline: discover novel files, skip content already in the
// processed index, segment each file, package and export the results, and
// keep the index current. Files are processed one at a time; a failing
// file is recorded and never aborts the batch.

use crate::app::index::{content_hash, IndexEntry, ProcessedIndex};
use crate::app::naming::{self, sanitize_filename};
use crate::app::package::{self, PackageOptions};
use crate::core::discovery;
use crate::core::encoding;
use crate::core::export;
use crate::core::model::{FailureKind, SegmentationFailure};
use crate::core::runner::{CancelFlag, ChapterSplitRunner};
use crate::oracle::Oracle;
use crate::platform::config::{AppConfig, PlatformPaths};
use crate::util::constants;
use crate::util::error::{ChapterSleuthError, EncodingError, ExportError, Result};
use std::path::{Path, PathBuf};

/// Driver output options.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub out_dir: PathBuf,
    pub make_epub: bool,
    pub export_reports: bool,
}

/// Result of processing one file.
#[derive(Debug)]
pub enum FileOutcome {
    Done {
        hash: String,
        report: FileReport,
    },
    Skipped {
        reason: String,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

#[derive(Debug)]
pub struct FileReport {
    pub title: String,
    pub expected: usize,
    pub chapters: usize,
    pub epub_path: Option<PathBuf>,
}

/// Batch totals.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub discovered: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warnings: Vec<String>,
}

/// Segment a single file end to end.
///
/// `skip_index`, when given, suppresses re-processing of content already
/// indexed. Infrastructure errors (unreadable file, export I/O) surface as
/// `Err`; segmentation failures are a `FileOutcome::Failed` value because
/// they are an expected per-file result, not a driver defect.
pub async fn process_file<O: Oracle>(
    path: &Path,
    expected_override: Option<usize>,
    oracle: &O,
    config: &AppConfig,
    options: &ProcessOptions,
    skip_index: Option<&ProcessedIndex>,
    cancel: &CancelFlag,
) -> Result<FileOutcome> {
    let (hash, decoded) = crate::platform::fs::with_file_bytes(path, |bytes| {
        (content_hash(bytes), encoding::decode(bytes, path))
    })
    .map_err(|source| ChapterSleuthError::Io {
        path: path.to_path_buf(),
        operation: "read",
        source,
    })?;

    if let Some(index) = skip_index {
        if index.contains(&hash) {
            tracing::info!(path = %path.display(), "Already indexed; skipping");
            return Ok(FileOutcome::Skipped {
                reason: "content hash already in index".to_string(),
            });
        }
    }

    let text = match decoded {
        Ok(text) => text,
        Err(EncodingError::EmptyFile { .. }) => {
            return Ok(FileOutcome::Failed {
                kind: FailureKind::InvalidInput,
                reason: "file is empty".to_string(),
            })
        }
        Err(e @ EncodingError::Undetermined { .. }) => {
            return Ok(FileOutcome::Failed {
                kind: FailureKind::EncodingUndetermined,
                reason: e.to_string(),
            })
        }
        Err(EncodingError::Io { path, source }) => {
            return Err(ChapterSleuthError::Io {
                path,
                operation: "decode",
                source,
            })
        }
    };

    let info = naming::parse_filename(path);
    let expected = match expected_override.or(info.expected_count) {
        Some(n) if n > 0 => n,
        _ => {
            return Ok(FileOutcome::Failed {
                kind: FailureKind::InvalidInput,
                reason: "no expected chapter count (not in filename, not supplied)".to_string(),
            })
        }
    };

    tracing::info!(
        path = %path.display(),
        title = %info.title,
        expected,
        encoding = text.encoding(),
        "Segmenting"
    );

    let runner = ChapterSplitRunner::new(oracle, config.runner_config(), cancel.clone());
    let stem = sanitize_filename(&info.title);
    match runner.run(&text, expected, &info.hints()).await {
        Ok(output) => {
            let mut epub_path = None;
            if options.make_epub {
                let target = options.out_dir.join(format!("{stem}.epub"));
                let pkg = PackageOptions {
                    title: info.title.clone(),
                    author: config
                        .package
                        .author
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                };
                package::write_epub(&output.chapters, &pkg, &target)?;
                epub_path = Some(target);
            }
            if options.export_reports {
                write_reports(&options.out_dir, &stem, &output.chapters, &output.log)?;
            }
            Ok(FileOutcome::Done {
                hash,
                report: FileReport {
                    title: info.title,
                    expected,
                    chapters: output.chapters.len(),
                    epub_path,
                },
            })
        }
        Err(failure) => {
            if options.export_reports {
                write_failure_log(&options.out_dir, &stem, &failure)?;
            }
            tracing::warn!(
                path = %path.display(),
                kind = %failure.kind,
                reason = %failure.reason,
                "Segmentation failed"
            );
            Ok(FileOutcome::Failed {
                kind: failure.kind,
                reason: failure.reason,
            })
        }
    }
}

/// Process every discovered file under `root`.
pub async fn run_batch<O: Oracle>(
    root: &Path,
    oracle: &O,
    config: &AppConfig,
    paths: &PlatformPaths,
    options: &ProcessOptions,
    cancel: &CancelFlag,
) -> Result<BatchSummary> {
    let (files, warnings) = discovery::discover_files(root, &config.discovery_config())?;

    let index_path = paths.data_dir.join(constants::INDEX_FILE_NAME);
    let mut index = ProcessedIndex::load(&index_path);

    let mut summary = BatchSummary {
        discovered: files.len(),
        warnings,
        ..Default::default()
    };

    for file in &files {
        if cancel.is_cancelled() {
            tracing::info!("Batch cancelled");
            break;
        }
        match process_file(
            &file.path,
            None,
            oracle,
            config,
            options,
            Some(&index),
            cancel,
        )
        .await
        {
            Ok(FileOutcome::Done { hash, report }) => {
                index.insert(
                    hash,
                    IndexEntry {
                        source_path: file.path.clone(),
                        chapter_count: report.chapters,
                        output_path: report.epub_path.clone(),
                        processed_at: chrono::Utc::now(),
                    },
                );
                if let Err(e) = index.save(&index_path) {
                    summary
                        .warnings
                        .push(format!("Cannot save index '{}': {e}", index_path.display()));
                }
                summary.processed += 1;
            }
            Ok(FileOutcome::Skipped { .. }) => summary.skipped += 1,
            Ok(FileOutcome::Failed { kind, reason }) => {
                summary
                    .warnings
                    .push(format!("'{}': {kind}: {reason}", file.path.display()));
                summary.failed += 1;
            }
            Err(e) => {
                summary
                    .warnings
                    .push(format!("'{}': {e}", file.path.display()));
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        discovered = summary.discovered,
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        "Batch complete"
    );
    Ok(summary)
}

fn write_reports(
    out_dir: &Path,
    stem: &str,
    chapters: &[crate::core::model::Chapter],
    log: &crate::core::model::ReconciliationLog,
) -> Result<()> {
    std::fs::create_dir_all(out_dir).map_err(|source| ChapterSleuthError::Io {
        path: out_dir.to_path_buf(),
        operation: "create output directory",
        source,
    })?;

    let manifest_path = out_dir.join(format!("{stem}.manifest.csv"));
    let file = std::fs::File::create(&manifest_path).map_err(|source| ExportError::Io {
        path: manifest_path.clone(),
        source,
    })?;
    export::export_manifest_csv(chapters, file, &manifest_path)?;

    let log_path = out_dir.join(format!("{stem}.log.json"));
    let file = std::fs::File::create(&log_path).map_err(|source| ExportError::Io {
        path: log_path.clone(),
        source,
    })?;
    export::export_log_json(log, file, &log_path)?;
    Ok(())
}

fn write_failure_log(out_dir: &Path, stem: &str, failure: &SegmentationFailure) -> Result<()> {
    std::fs::create_dir_all(out_dir).map_err(|source| ChapterSleuthError::Io {
        path: out_dir.to_path_buf(),
        operation: "create output directory",
        source,
    })?;
    let log_path = out_dir.join(format!("{stem}.failure.json"));
    let file = std::fs::File::create(&log_path).map_err(|source| ExportError::Io {
        path: log_path.clone(),
        source,
    })?;
    export::export_log_json(&failure.log, file, &log_path)?;
    Ok(())
}
