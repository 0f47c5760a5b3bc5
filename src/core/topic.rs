// ChapterSleuth - core/topic.rs
//
// Sliding-window topic-change detection. Used only when structural
// candidates under-cover the file: adjacent window pairs are compared by
// the oracle, and score peaks become additional boundary candidates. The
// pass is bounded by an absolute per-file call budget; the stride widens
// beyond W/2 when needed so the whole file always fits in the budget.

use crate::core::model::BoundarySource;
use crate::core::structural::HeaderCandidate;
use crate::core::text::NovelText;
use crate::oracle::Oracle;
use crate::util::constants;
use crate::util::error::OracleError;

pub struct TopicChangeDetector<'o, O> {
    oracle: &'o O,
}

impl<'o, O: Oracle> TopicChangeDetector<'o, O> {
    pub fn new(oracle: &'o O) -> Self {
        Self { oracle }
    }

    /// Returns true when structural coverage is thin enough that the
    /// detector should run at all.
    pub fn should_run(candidate_count: usize, expected: usize) -> bool {
        if expected == 0 {
            return false;
        }
        (candidate_count as f64 / expected as f64) < constants::TOPIC_COVERAGE_THRESHOLD
    }

    /// Slide window pairs across the file and emit a candidate at each
    /// score peak. An unparseable response is no peak (logged), not a
    /// neutral one; only total oracle failure aborts the pass.
    pub async fn detect(&self, text: &NovelText) -> Result<Vec<HeaderCandidate>, OracleError> {
        let window = constants::TOPIC_WINDOW_BYTES;
        let len = text.len_bytes();
        if len < window * 2 {
            return Ok(Vec::new());
        }

        let stride = (window / 2).max(len / constants::TOPIC_CALL_BUDGET.max(1));

        let mut candidates = Vec::new();
        let mut calls = 0usize;
        let mut failures = 0usize;
        let mut last_error: Option<OracleError> = None;

        let mut offset = 0usize;
        while offset + window * 2 <= len && calls < constants::TOPIC_CALL_BUDGET {
            let split_point = offset + window;
            let before = text.slice_lines(offset, split_point);
            let after = text.slice_lines(split_point, split_point + window);
            calls += 1;

            match self.oracle.complete(&pair_prompt(before, after)).await {
                Ok(response) => {
                    if let Some(score) = parse_score(&response) {
                        if score > constants::TOPIC_PEAK_THRESHOLD {
                            if let Some(candidate) = candidate_at(text, split_point, score) {
                                candidates.push(candidate);
                            }
                        }
                    } else {
                        tracing::warn!(
                            offset = split_point,
                            "Unparseable topic-change response; no peak recorded"
                        );
                    }
                }
                Err(e) => {
                    failures += 1;
                    last_error = Some(e);
                }
            }

            offset += stride;
        }

        if calls > 0 && failures == calls {
            return Err(last_error.unwrap_or(OracleError::Exhausted {
                attempts: constants::ORACLE_MAX_ATTEMPTS,
            }));
        }

        tracing::debug!(
            calls,
            peaks = candidates.len(),
            stride,
            "Topic-change detection complete"
        );
        Ok(candidates)
    }
}

/// Anchor a peak to the first non-blank line at or after the window
/// boundary.
fn candidate_at(text: &NovelText, offset: usize, score: f64) -> Option<HeaderCandidate> {
    let mut n = text.line_at_offset(text.snap_to_line_start(offset));
    while n < text.line_count() && text.line(n).trim().is_empty() {
        n += 1;
    }
    if n >= text.line_count() {
        return None;
    }
    Some(HeaderCandidate {
        line_num: n,
        byte_offset: text.line_start(n),
        text: text.line(n).to_string(),
        structural_score: score,
        ai_score: None,
        source: BoundarySource::Topic,
    })
}

/// First parseable float in the response.
fn parse_score(response: &str) -> Option<f64> {
    response
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .filter(|t| !t.is_empty())
        .find_map(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

fn pair_prompt(before: &str, after: &str) -> String {
    format!(
        "Two consecutive passages from a serialized novel follow. Reply with a single \
         number between 0.0 and 1.0: the likelihood that a chapter boundary falls \
         between them (1.0 = certain topic change, 0.0 = continuous scene). Reply \
         with the number only.\n--- PASSAGE A ---\n{before}\n--- PASSAGE B ---\n{after}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedOracle {
        responses: Mutex<Vec<String>>,
    }

    impl Oracle for ScriptedOracle {
        async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
            let mut r = self.responses.lock().unwrap();
            match r.len() {
                0 => Err(OracleError::Exhausted { attempts: 5 }),
                1 => Ok(r[0].clone()),
                _ => Ok(r.pop().unwrap()),
            }
        }
    }

    fn fixture(bytes: usize) -> NovelText {
        let mut s = String::new();
        while s.len() < bytes {
            s.push_str("장면이 계속 이어지는 본문 단락이다.\n");
        }
        NovelText::new(s, "UTF-8", 1.0)
    }

    #[test]
    fn test_should_run_on_thin_coverage() {
        assert!(TopicChangeDetector::<ScriptedOracle>::should_run(10, 100));
        assert!(!TopicChangeDetector::<ScriptedOracle>::should_run(150, 100));
        assert!(!TopicChangeDetector::<ScriptedOracle>::should_run(0, 0));
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("0.8"), Some(0.8));
        assert_eq!(parse_score("score: 0.35"), Some(0.35));
        assert_eq!(parse_score("no numbers here"), None);
        assert_eq!(parse_score("5"), Some(1.0));
    }

    #[tokio::test]
    async fn test_detect_respects_call_budget() {
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec!["0.1".to_string()]),
        };
        let detector = TopicChangeDetector::new(&oracle);
        // A large file would need far more than the budget at stride W/2.
        let text = fixture(constants::TOPIC_WINDOW_BYTES * constants::TOPIC_CALL_BUDGET * 4);
        let candidates = detector.detect(&text).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_peaks_become_topic_candidates() {
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec!["0.9".to_string()]),
        };
        let detector = TopicChangeDetector::new(&oracle);
        let text = fixture(constants::TOPIC_WINDOW_BYTES * 4);
        let candidates = detector.detect(&text).await.unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates
            .iter()
            .all(|c| c.source == BoundarySource::Topic && c.structural_score > 0.5));
    }

    #[tokio::test]
    async fn test_small_file_skipped() {
        let oracle = ScriptedOracle {
            responses: Mutex::new(Vec::new()),
        };
        let detector = TopicChangeDetector::new(&oracle);
        let text = fixture(512);
        assert!(detector.detect(&text).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_total_failure_propagates() {
        let oracle = ScriptedOracle {
            responses: Mutex::new(Vec::new()),
        };
        let detector = TopicChangeDetector::new(&oracle);
        let text = fixture(constants::TOPIC_WINDOW_BYTES * 4);
        assert!(detector.detect(&text).await.is_err());
    }
}
