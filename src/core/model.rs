// ChapterSleuth - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no oracle
// dependencies. These types are the shared vocabulary across all layers.

use serde::{Deserialize, Serialize};

// =============================================================================
// Chapter (normalised output of segmentation)
// =============================================================================

/// A single segmented chapter.
///
/// Chapters exist only for the duration of a segmentation run and are handed
/// to the caller in `cid` order. `cid` values are dense and start at 0.
#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    /// Dense, strictly increasing chapter index starting at 0.
    pub cid: u32,

    /// The chapter title as it appears in the source (trimmed).
    /// Empty when the file was split without a detected header.
    pub title: String,

    /// Optional subtitle: the second line of a merged two-line header, or
    /// the remainder of a header line after the matched title.
    pub subtitle: String,

    /// Full chapter body text.
    pub body: String,

    /// Code-point length of `body`.
    pub length: usize,

    /// Classification derived from the title keyword map.
    pub chapter_type: ChapterType,

    /// Byte offset of the chapter's first line in the decoded text.
    pub start_offset: usize,
}

// =============================================================================
// Chapter type
// =============================================================================

/// Chapter classification derived from title keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    #[default]
    Main,
    Side,
    Epilogue,
    Prologue,
    Other,
}

impl ChapterType {
    /// Human-readable label for display and export.
    pub fn label(&self) -> &'static str {
        match self {
            ChapterType::Main => "main",
            ChapterType::Side => "side",
            ChapterType::Epilogue => "epilogue",
            ChapterType::Prologue => "prologue",
            ChapterType::Other => "other",
        }
    }
}

impl std::fmt::Display for ChapterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Boundary
// =============================================================================

/// Origin of a boundary candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundarySource {
    Regex,
    Structural,
    AiDirect,
    Topic,
    Manual,
}

/// A selected or candidate line position that starts a new chapter.
#[derive(Debug, Clone, Serialize)]
pub struct Boundary {
    /// Zero-based line number in the decoded text.
    pub line_num: usize,

    /// Byte offset of the line start in the decoded text.
    pub byte_offset: usize,

    /// The title line as it appears in the source. Never empty.
    pub text: String,

    /// Chapter-header likelihood in [0, 1] where known.
    pub score: Option<f64>,

    /// Where this boundary came from.
    pub source: BoundarySource,
}

// =============================================================================
// Sample window
// =============================================================================

/// Decoded content between line-aligned byte offsets.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    pub start_byte: usize,
    pub end_byte: usize,
    pub text: String,
}

// =============================================================================
// Reconciliation log
// =============================================================================

/// Runner stage that produced a reconciliation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    PatternAcquire,
    RegexSplit,
    Evaluate,
    AutoRepair,
    GapRefine,
    DirectSearch,
    Advanced,
    Done,
    Fail,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "INIT",
            Stage::PatternAcquire => "PATTERN_ACQUIRE",
            Stage::RegexSplit => "REGEX_SPLIT",
            Stage::Evaluate => "EVALUATE",
            Stage::AutoRepair => "AUTO_REPAIR",
            Stage::GapRefine => "GAP_REFINE",
            Stage::DirectSearch => "DIRECT_SEARCH",
            Stage::Advanced => "ADVANCED",
            Stage::Done => "DONE",
            Stage::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// One entry in the reconciliation log.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationEvent {
    pub stage: Stage,
    pub action: String,
    pub before_count: usize,
    pub after_count: usize,
    pub reason: String,
}

/// Ordered diagnostic record of the Runner's state transitions and
/// decisions. Append order matches the Runner's transition order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationLog {
    events: Vec<ReconciliationEvent>,
}

impl ReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        stage: Stage,
        action: impl Into<String>,
        before_count: usize,
        after_count: usize,
        reason: impl Into<String>,
    ) {
        let event = ReconciliationEvent {
            stage,
            action: action.into(),
            before_count,
            after_count,
            reason: reason.into(),
        };
        tracing::debug!(
            stage = %event.stage,
            action = %event.action,
            before = event.before_count,
            after = event.after_count,
            reason = %event.reason,
            "Reconciliation event"
        );
        self.events.push(event);
    }

    pub fn events(&self) -> &[ReconciliationEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// =============================================================================
// Run outcome
// =============================================================================

/// Failure taxonomy surfaced by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// expected_count <= 0, file unreadable, or file empty.
    InvalidInput,
    /// No usable text stream even with the UTF-8 fallback.
    EncodingUndetermined,
    /// Initial pattern acquisition produced no valid compiling regex.
    PatternUnusable,
    /// Boundary-mode split invoked with an invalid set (internal bug).
    InvalidBoundary,
    /// LLM calls failed past the retry budget.
    OracleUnavailable,
    /// Escalation ladder exhausted without achieving the expected count.
    Stagnated,
    /// Wall-clock budget exceeded.
    Timeout,
    /// Cooperative cancellation requested.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::InvalidInput => "invalid input",
            FailureKind::EncodingUndetermined => "encoding undetermined",
            FailureKind::PatternUnusable => "pattern unusable",
            FailureKind::InvalidBoundary => "invalid boundary set",
            FailureKind::OracleUnavailable => "oracle unavailable",
            FailureKind::Stagnated => "stagnated",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Best-effort diagnostic snapshot attached to failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartialSnapshot {
    /// The best pattern observed, as a string, if any.
    pub pattern: Option<String>,

    /// Match count the best pattern produced.
    pub match_count: Option<usize>,

    /// The best boundary set assembled, if the advanced pipeline ran.
    pub boundaries: Vec<Boundary>,

    /// Best-effort chapters for manual review, if a split succeeded at the
    /// wrong count.
    pub chapters: Vec<Chapter>,
}

/// Successful segmentation: exactly `expected_count` chapters plus the log.
#[derive(Debug)]
pub struct SegmentationOutput {
    pub chapters: Vec<Chapter>,
    pub log: ReconciliationLog,
    /// Detected source encoding name, for operator reference.
    pub encoding: &'static str,
}

/// Failed segmentation: kind, reason, best-effort snapshot, and the log.
/// The Runner never partially returns; mismatched counts are always an
/// explicit failure carrying diagnostics.
#[derive(Debug)]
pub struct SegmentationFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub partial: Option<PartialSnapshot>,
    pub log: ReconciliationLog,
}

impl std::fmt::Display for SegmentationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "segmentation failed ({}): {}", self.kind, self.reason)
    }
}

impl std::error::Error for SegmentationFailure {}

// =============================================================================
// Discovered file
// =============================================================================

/// A file found by discovery, before any content is read.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: std::path::PathBuf,
    pub size_bytes: u64,
}

// =============================================================================
// Metadata hints
// =============================================================================

/// Advisory metadata supplied by the caller. Never authoritative.
#[derive(Debug, Clone, Default)]
pub struct MetadataHints {
    pub title: Option<String>,
    pub series: Option<String>,
    pub volume_markers: Vec<String>,
    pub known_end_markers: Vec<String>,
}
