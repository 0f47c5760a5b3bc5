// ChapterSleuth - core/export.rs
//
// CSV and JSON export of chapter manifests and the reconciliation log.
// Core layer: writes to any Write trait object.

use crate::core::model::{Chapter, ReconciliationLog};
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// Export a chapter manifest to CSV.
///
/// Writes: cid, type, title, subtitle, length, start_offset
pub fn export_manifest_csv<W: Write>(
    chapters: &[Chapter],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(["cid", "type", "title", "subtitle", "length", "start_offset"])
        .map_err(|e| ExportError::Csv {
            path: export_path.to_path_buf(),
            source: e,
        })?;

    let mut count = 0;
    for chapter in chapters {
        let cid = chapter.cid.to_string();
        let length = chapter.length.to_string();
        let offset = chapter.start_offset.to_string();
        csv_writer
            .write_record([
                cid.as_str(),
                chapter.chapter_type.label(),
                chapter.title.as_str(),
                chapter.subtitle.as_str(),
                length.as_str(),
                offset.as_str(),
            ])
            .map_err(|e| ExportError::Csv {
                path: export_path.to_path_buf(),
                source: e,
            })?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Export a chapter manifest to JSON (array of objects, bodies included).
pub fn export_manifest_json<W: Write>(
    chapters: &[Chapter],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, chapters).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(chapters.len())
}

/// Export the reconciliation log to JSON for operator review.
pub fn export_log_json<W: Write>(
    log: &ReconciliationLog,
    writer: W,
    export_path: &Path,
) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, log).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })
}
