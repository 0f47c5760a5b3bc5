// ChapterSleuth - core/runner.rs
//
// The top-level segmentation state machine:
//
//   INIT -> PATTERN_ACQUIRE -> REGEX_SPLIT -> EVALUATE
//        -> {DONE | AUTO_REPAIR | GAP_REFINE | DIRECT_SEARCH | ADVANCED | FAIL}
//
// The Runner never partially returns: either a chapter sequence of exactly
// the expected length, or a failure carrying the reconciliation log and a
// best-effort snapshot. Cancellation is checked before every oracle call;
// the wall-clock budget is checked at every stage boundary.

use crate::core::model::{
    Chapter, FailureKind, MetadataHints, PartialSnapshot, ReconciliationLog, SegmentationFailure,
    SegmentationOutput, Stage,
};
use crate::core::optimizer;
use crate::core::pattern::PatternManager;
use crate::core::scorer::AiScorer;
use crate::core::splitter::{self, SplitConfig, SplitOutcome};
use crate::core::structural;
use crate::core::text::NovelText;
use crate::core::topic::TopicChangeDetector;
use crate::oracle::Oracle;
use crate::util::constants;
use crate::util::error::{ChapterSleuthError, OracleError};
use fancy_regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runner tunables. The observed-constant thresholds are configuration,
/// not hard-coded policy.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub stagnation_tolerance: usize,
    pub max_refine_iterations: u32,
    pub rejection_threshold: u32,
    pub wall_clock_budget: Duration,
    pub split: SplitConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stagnation_tolerance: constants::STAGNATION_TOLERANCE,
            max_refine_iterations: constants::MAX_REFINE_ITERATIONS,
            rejection_threshold: constants::REJECTION_THRESHOLD,
            wall_clock_budget: Duration::from_secs(constants::DEFAULT_RUN_BUDGET_SECS),
            split: SplitConfig::default(),
        }
    }
}

/// The chapter split runner. One instance drives one file.
pub struct ChapterSplitRunner<'o, O> {
    oracle: &'o O,
    config: RunnerConfig,
    cancel: CancelFlag,
}

/// Best attempt observed so far, kept for diagnostic snapshots.
struct BestAttempt {
    pattern: String,
    count: usize,
    chapters: Vec<Chapter>,
}

impl<'o, O: Oracle> ChapterSplitRunner<'o, O> {
    pub fn new(oracle: &'o O, config: RunnerConfig, cancel: CancelFlag) -> Self {
        Self {
            oracle,
            config,
            cancel,
        }
    }

    /// Segment `text` into exactly `expected` chapters, or fail with
    /// diagnostics.
    pub async fn run(
        &self,
        text: &NovelText,
        expected: usize,
        hints: &MetadataHints,
    ) -> Result<SegmentationOutput, SegmentationFailure> {
        let mut log = ReconciliationLog::new();
        let deadline = Instant::now() + self.config.wall_clock_budget;

        // ---- INIT ----
        if expected == 0 {
            log.record(Stage::Init, "reject", 0, 0, "expected_count must be positive");
            return Err(fail(FailureKind::InvalidInput, "expected_count must be positive", None, log));
        }
        if text.is_empty() {
            log.record(Stage::Init, "reject", 0, 0, "file is empty");
            return Err(fail(FailureKind::InvalidInput, "file contains no text", None, log));
        }
        log.record(
            Stage::Init,
            "start",
            0,
            0,
            format!(
                "{} bytes, {} lines, encoding {}, hints: {}",
                text.len_bytes(),
                text.line_count(),
                text.encoding(),
                hints.title.as_deref().unwrap_or("-"),
            ),
        );

        let manager = PatternManager::new(self.oracle, self.config.split.close_duplicate_gap);
        let mut best: Option<BestAttempt> = None;

        // ---- PATTERN_ACQUIRE ----
        self.checkpoint(deadline, &mut log, &best)?;
        let (mut pattern, oracle_available) = match manager.analyze(text, expected).await {
            Ok(pattern) => {
                log.record(
                    Stage::PatternAcquire,
                    "oracle",
                    0,
                    0,
                    format!("pattern '{}'", pattern.as_str()),
                );
                (pattern, true)
            }
            Err(ChapterSleuthError::Oracle(e)) => {
                log.record(Stage::PatternAcquire, "oracle-unavailable", 0, 0, e.to_string());
                match manager.fallback_pattern(text, expected) {
                    Some((pattern, count)) => {
                        log.record(
                            Stage::PatternAcquire,
                            "fallback-battery",
                            0,
                            count,
                            format!("pattern '{}'", pattern.as_str()),
                        );
                        (pattern, false)
                    }
                    None if expected == 1 => {
                        return Ok(whole_file_chapter(text, log));
                    }
                    None => {
                        log.record(Stage::Fail, "no-fallback", 0, 0, "battery matched nothing");
                        return Err(fail(
                            FailureKind::OracleUnavailable,
                            "oracle unavailable and no built-in pattern matches",
                            None,
                            log,
                        ));
                    }
                }
            }
            Err(e) if expected == 1 => {
                // A single-chapter request never needs a header pattern;
                // the whole file is the chapter.
                log.record(Stage::PatternAcquire, "single-chapter", 0, 1, e.to_string());
                return Ok(whole_file_chapter(text, log));
            }
            Err(e) => {
                log.record(Stage::Fail, "pattern-unusable", 0, 0, e.to_string());
                return Err(fail(
                    FailureKind::PatternUnusable,
                    format!("initial pattern acquisition failed: {e}"),
                    None,
                    log,
                ));
            }
        };

        // ---- REGEX_SPLIT + EVALUATE ----
        let mut outcome = self.split_and_evaluate(text, &pattern, &[], expected, &mut log, &mut best);
        if outcome.chapters.len() == expected {
            return Ok(self.done(text, outcome, log));
        }

        // ---- AUTO_REPAIR ----
        let before = outcome.chapters.len();
        let repaired = manager.auto_validate(text, &pattern, expected);
        if !repaired.accepted_repairs.is_empty() {
            pattern = repaired.pattern;
            outcome = self.split_and_evaluate(text, &pattern, &[], expected, &mut log, &mut best);
            log.record(
                Stage::AutoRepair,
                "repair",
                before,
                outcome.chapters.len(),
                repaired.accepted_repairs.join(","),
            );
            if outcome.chapters.len() == expected {
                return Ok(self.done(text, outcome, log));
            }
        } else {
            log.record(Stage::AutoRepair, "no-op", before, before, "no repair improved the count");
        }

        if !oracle_available {
            // Deterministic ladder exhausted; nothing else can run.
            log.record(
                Stage::Fail,
                "oracle-unavailable",
                outcome.chapters.len(),
                expected,
                "count mismatch and no oracle for escalation",
            );
            return Err(fail(
                FailureKind::OracleUnavailable,
                format!(
                    "count {} != expected {} and the oracle is unavailable",
                    outcome.chapters.len(),
                    expected
                ),
                snapshot(&best),
                log,
            ));
        }

        // ---- GAP_REFINE ----
        // The stagnation window looks at refinement-iteration counts only.
        let mut counts: Vec<usize> = Vec::new();
        let mut prev_count = outcome.chapters.len();
        let mut rejected_streak: u32 = 0;
        for iteration in 0..self.config.max_refine_iterations {
            self.checkpoint(deadline, &mut log, &best)?;

            let refined = match manager.refine(text, &pattern, expected).await {
                Ok(r) => r,
                Err(e) => return Err(self.oracle_failure(e, &best, log)),
            };
            let unchanged = refined.pattern.as_str() == pattern.as_str();
            pattern = refined.pattern;

            outcome = self.split_and_evaluate(text, &pattern, &[], expected, &mut log, &mut best);
            let count = outcome.chapters.len();
            log.record(
                Stage::GapRefine,
                "iterate",
                prev_count,
                count,
                format!(
                    "iteration {}, rejections {}, pattern {}",
                    iteration + 1,
                    refined.rejections,
                    if unchanged { "unchanged" } else { "updated" },
                ),
            );
            counts.push(count);
            prev_count = count;

            if count == expected {
                return Ok(self.done(text, outcome, log));
            }

            if unchanged || refined.rejections > 0 {
                rejected_streak += 1;
            } else {
                rejected_streak = 0;
            }
            if rejected_streak >= self.config.rejection_threshold {
                log.record(
                    Stage::GapRefine,
                    "rejection-streak",
                    count,
                    count,
                    format!("{rejected_streak} consecutive rejected iterations"),
                );
                break;
            }
            if stagnated(&counts, constants::STAGNATION_WINDOW, self.config.stagnation_tolerance) {
                log.record(
                    Stage::GapRefine,
                    "stagnation",
                    count,
                    count,
                    format!(
                        "last {} counts within tolerance {}",
                        constants::STAGNATION_WINDOW,
                        self.config.stagnation_tolerance
                    ),
                );
                break;
            }
        }

        // ---- DIRECT_SEARCH ----
        self.checkpoint(deadline, &mut log, &best)?;
        let mut title_candidates: Vec<String> = Vec::new();
        let current_count = outcome.chapters.len();
        if (current_count as f64) < expected as f64 * constants::DIRECT_SEARCH_TRIGGER_RATIO {
            let existing = manager.effective_matches(text, &pattern);
            let titles = match manager.direct_title_search(text, &existing).await {
                Ok(t) => t,
                Err(e) => return Err(self.oracle_failure(e, &best, log)),
            };
            log.record(
                Stage::DirectSearch,
                "enumerate",
                current_count,
                titles.len(),
                format!("{} verbatim title candidates", titles.len()),
            );

            self.checkpoint(deadline, &mut log, &best)?;
            match manager.pattern_from_titles(&titles).await {
                Ok(Some(synth)) => {
                    log.record(
                        Stage::DirectSearch,
                        "reverse-regex",
                        0,
                        0,
                        format!("pattern '{}'", synth.as_str()),
                    );
                    let merged = merge_patterns(&pattern, &synth);
                    if let Some(merged) = merged {
                        pattern = merged;
                    }
                }
                Ok(None) => {
                    log.record(Stage::DirectSearch, "reverse-regex", 0, 0, "no usable pattern");
                }
                Err(e) => return Err(self.oracle_failure(e, &best, log)),
            }

            title_candidates = titles;
            outcome = self.split_and_evaluate(
                text,
                &pattern,
                &title_candidates,
                expected,
                &mut log,
                &mut best,
            );
            if outcome.chapters.len() == expected {
                return Ok(self.done(text, outcome, log));
            }
        } else {
            log.record(
                Stage::DirectSearch,
                "skip",
                current_count,
                current_count,
                "count not below the direct-search trigger ratio",
            );
        }

        // ---- ADVANCED ----
        self.checkpoint(deadline, &mut log, &best)?;
        self.advanced(text, expected, &title_candidates, deadline, &mut log, &mut best)
            .await
    }

    /// The advanced pipeline: structural candidates, AI scoring, optional
    /// topic detection, global optimization, boundary-mode split.
    async fn advanced(
        &self,
        text: &NovelText,
        expected: usize,
        title_candidates: &[String],
        deadline: Instant,
        log: &mut ReconciliationLog,
        best: &mut Option<BestAttempt>,
    ) -> Result<SegmentationOutput, SegmentationFailure> {
        let mut candidates = structural::analyze(text, expected);
        // Verbatim titles from direct search join the pool as strong
        // candidates even when structure alone missed them.
        if !title_candidates.is_empty() {
            let titles: std::collections::HashSet<&str> =
                title_candidates.iter().map(|t| t.trim()).collect();
            let known: std::collections::HashSet<usize> =
                candidates.iter().map(|c| c.line_num).collect();
            for n in 0..text.line_count() {
                if titles.contains(text.line(n).trim()) && !known.contains(&n) {
                    candidates.push(structural::HeaderCandidate {
                        line_num: n,
                        byte_offset: text.line_start(n),
                        text: text.line(n).to_string(),
                        structural_score: 0.8,
                        ai_score: None,
                        source: crate::core::model::BoundarySource::AiDirect,
                    });
                }
            }
        }
        candidates.sort_by_key(|c| c.line_num);
        log.record(
            Stage::Advanced,
            "structural",
            0,
            candidates.len(),
            "candidate pool assembled",
        );

        self.checkpoint(deadline, log, best)?;
        let scorer = AiScorer::new(self.oracle);
        if let Err(e) = scorer.score(text, &mut candidates).await {
            return Err(self.oracle_failure_ref(e, best, log));
        }

        if TopicChangeDetector::<O>::should_run(candidates.len(), expected) {
            self.checkpoint(deadline, log, best)?;
            let detector = TopicChangeDetector::new(self.oracle);
            match detector.detect(text).await {
                Ok(extra) => {
                    let before = candidates.len();
                    for candidate in extra {
                        if !candidates.iter().any(|c| c.line_num == candidate.line_num) {
                            candidates.push(candidate);
                        }
                    }
                    candidates.sort_by_key(|c| c.line_num);
                    log.record(
                        Stage::Advanced,
                        "topic-detect",
                        before,
                        candidates.len(),
                        "under-coverage topic pass",
                    );
                }
                Err(e) => return Err(self.oracle_failure_ref(e, best, log)),
            }
        }

        let selection = optimizer::select_boundaries(text.len_bytes(), &candidates, expected);
        log.record(
            Stage::Advanced,
            "optimize",
            candidates.len(),
            selection.boundaries.len(),
            format!("spacing {}, shortfall {}", selection.spacing, selection.shortfall),
        );

        if selection.boundaries.len() != expected {
            let seated = expected - selection.shortfall;
            let mut snap = snapshot(best).unwrap_or_default();
            snap.boundaries = selection.boundaries;
            let reason = format!("optimizer seated {seated} of {expected} boundaries");
            log.record(Stage::Fail, "shortfall", seated, expected, &reason);
            return Err(fail(FailureKind::Stagnated, reason, Some(snap), take_log(log)));
        }

        match splitter::split_by_boundaries(text, &selection.boundaries) {
            Ok(chapters) => {
                log.record(
                    Stage::Advanced,
                    "boundary-split",
                    selection.boundaries.len(),
                    chapters.len(),
                    "boundary-mode split",
                );
                log.record(Stage::Done, "done", chapters.len(), chapters.len(), "advanced pipeline");
                Ok(SegmentationOutput {
                    chapters,
                    log: take_log(log),
                    encoding: text.encoding(),
                })
            }
            Err(e) => {
                let reason = format!("boundary-mode split rejected the optimizer's set: {e}");
                log.record(Stage::Fail, "invalid-boundary", expected, 0, &reason);
                let mut snap = snapshot(best).unwrap_or_default();
                snap.boundaries = selection.boundaries;
                Err(fail(FailureKind::InvalidBoundary, reason, Some(snap), take_log(log)))
            }
        }
    }

    /// Regex-mode split plus evaluation bookkeeping.
    fn split_and_evaluate(
        &self,
        text: &NovelText,
        pattern: &Regex,
        title_candidates: &[String],
        expected: usize,
        log: &mut ReconciliationLog,
        best: &mut Option<BestAttempt>,
    ) -> SplitOutcome {
        let outcome = splitter::split(text, pattern, title_candidates, &self.config.split);
        let count = outcome.chapters.len();
        log.record(
            Stage::RegexSplit,
            "split",
            0,
            count,
            format!(
                "pattern '{}', prelude {} bytes, {} close duplicates dropped",
                pattern.as_str(),
                outcome.discarded_prelude_bytes,
                outcome.dropped_duplicates.len(),
            ),
        );
        log.record(
            Stage::Evaluate,
            "compare",
            count,
            expected,
            if count == expected { "match" } else { "mismatch" },
        );

        let better = match best.as_ref() {
            None => true,
            Some(b) => count.abs_diff(expected) < b.count.abs_diff(expected),
        };
        if better {
            *best = Some(BestAttempt {
                pattern: pattern.as_str().to_string(),
                count,
                chapters: outcome.chapters.clone(),
            });
        }
        outcome
    }

    fn done(
        &self,
        text: &NovelText,
        outcome: SplitOutcome,
        mut log: ReconciliationLog,
    ) -> SegmentationOutput {
        log.record(
            Stage::Done,
            "done",
            outcome.chapters.len(),
            outcome.chapters.len(),
            "regex split matched the expected count",
        );
        SegmentationOutput {
            chapters: outcome.chapters,
            log,
            encoding: text.encoding(),
        }
    }

    /// Cancellation and wall-clock checks, run before every oracle call.
    fn checkpoint(
        &self,
        deadline: Instant,
        log: &mut ReconciliationLog,
        best: &Option<BestAttempt>,
    ) -> Result<(), SegmentationFailure> {
        if self.cancel.is_cancelled() {
            log.record(Stage::Fail, "cancelled", 0, 0, "cooperative cancellation");
            return Err(fail(
                FailureKind::Cancelled,
                "cancellation requested",
                None,
                take_log(log),
            ));
        }
        if Instant::now() > deadline {
            log.record(Stage::Fail, "timeout", 0, 0, "wall-clock budget exceeded");
            return Err(fail(
                FailureKind::Timeout,
                "wall-clock budget exceeded",
                snapshot(best),
                take_log(log),
            ));
        }
        Ok(())
    }

    fn oracle_failure(
        &self,
        error: OracleError,
        best: &Option<BestAttempt>,
        mut log: ReconciliationLog,
    ) -> SegmentationFailure {
        log.record(Stage::Fail, "oracle", 0, 0, error.to_string());
        fail(
            FailureKind::OracleUnavailable,
            format!("oracle failed past the retry budget: {error}"),
            snapshot(best),
            log,
        )
    }

    fn oracle_failure_ref(
        &self,
        error: OracleError,
        best: &Option<BestAttempt>,
        log: &mut ReconciliationLog,
    ) -> SegmentationFailure {
        log.record(Stage::Fail, "oracle", 0, 0, error.to_string());
        fail(
            FailureKind::OracleUnavailable,
            format!("oracle failed past the retry budget: {error}"),
            snapshot(best),
            take_log(log),
        )
    }
}

/// The expected_count = 1 degenerate case: one chapter spanning the whole
/// file, with an empty title when no header was detected.
fn whole_file_chapter(text: &NovelText, mut log: ReconciliationLog) -> SegmentationOutput {
    let body = text.text().to_string();
    let chapter = Chapter {
        cid: 0,
        title: String::new(),
        subtitle: String::new(),
        length: body.chars().count(),
        body,
        chapter_type: crate::core::model::ChapterType::Main,
        start_offset: 0,
    };
    log.record(Stage::Done, "done", 1, 1, "single whole-file chapter");
    SegmentationOutput {
        chapters: vec![chapter],
        log,
        encoding: text.encoding(),
    }
}

/// Stagnation: the trailing `window` counts all sit within `tolerance` of
/// each other.
fn stagnated(counts: &[usize], window: usize, tolerance: usize) -> bool {
    if counts.len() < window {
        return false;
    }
    let tail = &counts[counts.len() - window..];
    let max = *tail.iter().max().unwrap_or(&0);
    let min = *tail.iter().min().unwrap_or(&0);
    max - min <= tolerance
}

/// Alternation of the current and a synthesised pattern, when it compiles.
fn merge_patterns(current: &Regex, synth: &Regex) -> Option<Regex> {
    crate::core::pattern::compile_pattern(&format!(
        "(?:{})|(?:{})",
        current.as_str(),
        synth.as_str()
    ))
    .ok()
}

fn fail(
    kind: FailureKind,
    reason: impl Into<String>,
    partial: Option<PartialSnapshot>,
    log: ReconciliationLog,
) -> SegmentationFailure {
    SegmentationFailure {
        kind,
        reason: reason.into(),
        partial,
        log,
    }
}

fn snapshot(best: &Option<BestAttempt>) -> Option<PartialSnapshot> {
    best.as_ref().map(|b| PartialSnapshot {
        pattern: Some(b.pattern.clone()),
        match_count: Some(b.count),
        boundaries: Vec::new(),
        chapters: b.chapters.clone(),
    })
}

fn take_log(log: &mut ReconciliationLog) -> ReconciliationLog {
    std::mem::take(log)
}
