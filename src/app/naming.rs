// ChapterSleuth - app/naming.rs
//
// Filename metadata extraction. Serialized novel filenames carry the work
// title, the chapter count (as a range or a total), and often a
// completion marker; the expected chapter count the engine needs is
// normally recovered here.

use crate::core::model::MetadataHints;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Metadata recovered from a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameInfo {
    /// Work title with count/completion markers and extension removed.
    pub title: String,
    /// Expected chapter count, when the filename states one.
    pub expected_count: Option<usize>,
    /// True when the filename carries a completion marker (완결, 完結).
    pub completed: bool,
}

impl NameInfo {
    pub fn hints(&self) -> MetadataHints {
        MetadataHints {
            title: Some(self.title.clone()),
            ..Default::default()
        }
    }
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*[-~]\s*(\d+)").expect("range regex"))
}

fn total_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 전250화 / 총 250화 / 250화 / 250편 / 250회
    RE.get_or_init(|| Regex::new(r"(?:전|총)?\s*(\d+)\s*[화편회]").expect("total regex"))
}

fn complete_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"완결|完結|\(완\)|\[완\]").expect("complete regex"))
}

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Leading source tags like [조아라] plus stray empty brackets left
    // behind once counts and completion markers are cut out.
    RE.get_or_init(|| Regex::new(r"^\s*\[[^\]]*\]|\(\s*\)|\[\s*\]").expect("noise regex"))
}

/// Replace characters that cannot appear in filenames on any supported
/// platform.
pub fn sanitize_filename(name: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"[\x00-\x1F\x7F"*/:<>?\\|]+"#).expect("sanitize regex")
    });
    let cleaned = re.replace_all(name, "_").into_owned();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a novel filename.
///
/// A numeric range (`1-250`) wins over a bare total (`250화`) because
/// ranges are unambiguous; both are removed from the residual title.
pub fn parse_filename(path: &Path) -> NameInfo {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let mut residue = stem.to_string();
    let mut expected_count = None;

    if let Some(caps) = range_re().captures(stem) {
        let lo: usize = caps[1].parse().unwrap_or(0);
        let hi: usize = caps[2].parse().unwrap_or(0);
        if hi >= lo && hi > 0 {
            expected_count = Some(hi - lo + 1);
            residue = residue.replace(caps.get(0).map(|m| m.as_str()).unwrap_or(""), " ");
        }
    }
    if expected_count.is_none() {
        if let Some(caps) = total_re().captures(stem) {
            let total: usize = caps[1].parse().unwrap_or(0);
            if total > 0 {
                expected_count = Some(total);
                residue = residue.replace(caps.get(0).map(|m| m.as_str()).unwrap_or(""), " ");
            }
        }
    }

    let completed = complete_re().is_match(stem);
    residue = complete_re().replace_all(&residue, " ").into_owned();
    residue = noise_re().replace_all(&residue, " ").into_owned();

    let title = residue.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = if title.is_empty() {
        stem.to_string()
    } else {
        title
    };

    NameInfo {
        title,
        expected_count,
        completed,
    }
}
