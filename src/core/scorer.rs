// ChapterSleuth - core/scorer.rs
//
// Oracle-assisted likelihood scoring for header candidates. Candidates are
// batched, each shown with a few lines of surrounding context, and the
// oracle returns one number per candidate. Anything unparseable degrades
// to the neutral score; above the hard candidate cap, scoring is skipped
// entirely and structural scores stand alone.

use crate::core::structural::HeaderCandidate;
use crate::core::text::NovelText;
use crate::oracle::Oracle;
use crate::util::constants;
use crate::util::error::OracleError;

pub struct AiScorer<'o, O> {
    oracle: &'o O,
}

impl<'o, O: Oracle> AiScorer<'o, O> {
    pub fn new(oracle: &'o O) -> Self {
        Self { oracle }
    }

    /// Assign `ai_score` to every candidate in place.
    ///
    /// Batches fail soft: a malformed or missing response leaves the whole
    /// batch at the neutral score with a warning. Only when every batch
    /// fails at the transport level is the oracle considered unavailable.
    pub async fn score(
        &self,
        text: &NovelText,
        candidates: &mut [HeaderCandidate],
    ) -> Result<(), OracleError> {
        if candidates.is_empty() {
            return Ok(());
        }
        if candidates.len() > constants::SCORER_SKIP_THRESHOLD {
            tracing::info!(
                candidates = candidates.len(),
                threshold = constants::SCORER_SKIP_THRESHOLD,
                "Too many candidates; skipping AI scoring"
            );
            return Ok(());
        }

        let mut failed_batches = 0usize;
        let mut total_batches = 0usize;
        let mut last_error: Option<OracleError> = None;

        for batch in candidates.chunks_mut(constants::SCORER_BATCH_SIZE) {
            total_batches += 1;
            let prompt = batch_prompt(text, batch);
            match self.oracle.complete(&prompt).await {
                Ok(response) => {
                    let scores = parse_scores(&response, batch.len());
                    for (candidate, score) in batch.iter_mut().zip(scores) {
                        candidate.ai_score = Some(score);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Scoring batch failed; using neutral scores");
                    for candidate in batch.iter_mut() {
                        candidate.ai_score = Some(constants::SCORER_NEUTRAL);
                    }
                    failed_batches += 1;
                    last_error = Some(e);
                }
            }
        }

        if failed_batches == total_batches {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(())
    }
}

/// One score per line or a JSON array; anything else degrades per
/// candidate to the neutral score.
fn parse_scores(response: &str, expected: usize) -> Vec<f64> {
    if let Ok(values) = serde_json::from_str::<Vec<f64>>(response.trim()) {
        return normalise(values, expected);
    }

    // One score per line; the score is the last numeric token, so
    // "1. 0.8" and "candidate 3: 0.25" both parse.
    let mut values = Vec::with_capacity(expected);
    for line in response.lines().filter(|l| !l.trim().is_empty()) {
        let score = line
            .split_whitespace()
            .rev()
            .find_map(|t| t.trim_matches([',', ':', ')']).parse::<f64>().ok());
        if let Some(v) = score {
            values.push(v);
        }
    }
    normalise(values, expected)
}

fn normalise(mut values: Vec<f64>, expected: usize) -> Vec<f64> {
    if values.len() != expected {
        tracing::warn!(
            got = values.len(),
            expected,
            "Score count mismatch; padding with neutral"
        );
    }
    values.truncate(expected);
    while values.len() < expected {
        values.push(constants::SCORER_NEUTRAL);
    }
    values
        .into_iter()
        .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { constants::SCORER_NEUTRAL })
        .collect()
}

fn batch_prompt(text: &NovelText, batch: &[HeaderCandidate]) -> String {
    let mut prompt = String::from(
        "For each numbered candidate line below, judge how likely it is to be a \
         chapter title in a serialized novel, given its surrounding context. Reply \
         with one number between 0.0 and 1.0 per candidate, one per line, in order, \
         and nothing else.\n",
    );
    for (i, candidate) in batch.iter().enumerate() {
        let from = candidate.line_num.saturating_sub(constants::SCORER_CONTEXT_LINES);
        let to = (candidate.line_num + constants::SCORER_CONTEXT_LINES + 1).min(text.line_count());
        prompt.push_str(&format!(
            "\n### Candidate {} (line marked with >>)\n",
            i + 1
        ));
        for n in from..to {
            if n == candidate.line_num {
                prompt.push_str(">> ");
            }
            prompt.push_str(text.line(n));
            prompt.push('\n');
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::BoundarySource;
    use crate::core::text::NovelText;
    use std::sync::Mutex;

    struct ScriptedOracle {
        responses: Mutex<Vec<Result<String, ()>>>,
    }

    impl Oracle for ScriptedOracle {
        async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
            let mut r = self.responses.lock().unwrap();
            match r.pop() {
                Some(Ok(s)) => Ok(s),
                _ => Err(OracleError::Exhausted { attempts: 5 }),
            }
        }
    }

    fn candidates(n: usize) -> Vec<HeaderCandidate> {
        (0..n)
            .map(|i| HeaderCandidate {
                line_num: i * 10,
                byte_offset: i * 100,
                text: format!("후보 {i}"),
                structural_score: 0.5,
                ai_score: None,
                source: BoundarySource::Structural,
            })
            .collect()
    }

    fn fixture() -> NovelText {
        let mut s = String::new();
        for i in 0..200 {
            s.push_str(&format!("줄 {i}\n"));
        }
        NovelText::new(s, "UTF-8", 1.0)
    }

    #[test]
    fn test_parse_scores_json_array() {
        assert_eq!(parse_scores("[0.9, 0.1, 0.5]", 3), vec![0.9, 0.1, 0.5]);
    }

    #[test]
    fn test_parse_scores_lines() {
        assert_eq!(parse_scores("0.9\n0.1\n", 2), vec![0.9, 0.1]);
    }

    #[test]
    fn test_parse_scores_numbered_lines() {
        assert_eq!(parse_scores("1. 0.8\n2. 0.2\n", 2), vec![0.8, 0.2]);
    }

    #[test]
    fn test_parse_scores_pads_and_clamps() {
        assert_eq!(
            parse_scores("2.5\n", 3),
            vec![1.0, constants::SCORER_NEUTRAL, constants::SCORER_NEUTRAL]
        );
    }

    #[tokio::test]
    async fn test_scores_assigned_in_order() {
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec![Ok("0.9\n0.2\n0.7".to_string())]),
        };
        let scorer = AiScorer::new(&oracle);
        let text = fixture();
        let mut cands = candidates(3);
        scorer.score(&text, &mut cands).await.unwrap();
        assert_eq!(cands[0].ai_score, Some(0.9));
        assert_eq!(cands[1].ai_score, Some(0.2));
        assert_eq!(cands[2].ai_score, Some(0.7));
    }

    #[tokio::test]
    async fn test_failed_batch_degrades_to_neutral() {
        // Two batches: the first call fails, the second succeeds.
        // Responses are popped from the end of the vec.
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec![Ok("0.8".to_string()), Err(())]),
        };
        let scorer = AiScorer::new(&oracle);
        let text = fixture();
        let mut cands = candidates(constants::SCORER_BATCH_SIZE + 1);
        scorer.score(&text, &mut cands).await.unwrap();
        assert!(cands[..constants::SCORER_BATCH_SIZE]
            .iter()
            .all(|c| c.ai_score == Some(constants::SCORER_NEUTRAL)));
        assert_eq!(cands[constants::SCORER_BATCH_SIZE].ai_score, Some(0.8));
    }

    #[tokio::test]
    async fn test_all_batches_failing_is_an_error() {
        let oracle = ScriptedOracle {
            responses: Mutex::new(Vec::new()),
        };
        let scorer = AiScorer::new(&oracle);
        let text = fixture();
        let mut cands = candidates(3);
        assert!(scorer.score(&text, &mut cands).await.is_err());
    }

    #[tokio::test]
    async fn test_skip_above_threshold() {
        let oracle = ScriptedOracle {
            responses: Mutex::new(Vec::new()),
        };
        let scorer = AiScorer::new(&oracle);
        let text = fixture();
        let mut cands = candidates(constants::SCORER_SKIP_THRESHOLD + 1);
        scorer.score(&text, &mut cands).await.unwrap();
        assert!(cands.iter().all(|c| c.ai_score.is_none()));
    }
}
