// ChapterSleuth - core/structural.rs
//
// Pattern-free header candidate generation. Scans the line index once and
// scores each line on structural cues: shortness, surrounding blank lines,
// punctuation shape, bracketing, marker lexemes, and the dialogue
// continuation penalty. No oracle involvement.

use crate::core::model::BoundarySource;
use crate::core::pattern::is_end_marker_line;
use crate::core::text::NovelText;
use crate::util::constants;

/// A candidate header line flowing through the advanced pipeline.
#[derive(Debug, Clone)]
pub struct HeaderCandidate {
    pub line_num: usize,
    pub byte_offset: usize,
    pub text: String,
    /// Structural likelihood in [0, 1].
    pub structural_score: f64,
    /// Oracle likelihood in [0, 1]; None until (and unless) scored.
    pub ai_score: Option<f64>,
    pub source: BoundarySource,
}

/// Minimum structural score for a line to be emitted at all.
const SCORE_FLOOR: f64 = 0.25;

/// Scan the file and emit scored candidates, at most
/// `STRUCTURAL_CANDIDATE_FACTOR * expected` of them (best first, then
/// re-ordered by position).
pub fn analyze(text: &NovelText, expected: usize) -> Vec<HeaderCandidate> {
    let mut candidates = Vec::new();
    let mut prev_non_blank: Option<usize> = None;

    for n in 0..text.line_count() {
        let line = text.line(n);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let score = score_line(text, n, trimmed, prev_non_blank);
        prev_non_blank = Some(n);

        if score >= SCORE_FLOOR {
            candidates.push(HeaderCandidate {
                line_num: n,
                byte_offset: text.line_start(n),
                text: line.to_string(),
                structural_score: score,
                ai_score: None,
                source: BoundarySource::Structural,
            });
        }
    }

    let cap = constants::STRUCTURAL_CANDIDATE_FACTOR.saturating_mul(expected.max(1));
    if candidates.len() > cap {
        candidates.sort_by(|a, b| {
            b.structural_score
                .partial_cmp(&a.structural_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(cap);
        candidates.sort_by_key(|c| c.line_num);
    }

    tracing::debug!(
        candidates = candidates.len(),
        cap,
        "Structural analysis complete"
    );
    candidates
}

fn score_line(
    text: &NovelText,
    n: usize,
    trimmed: &str,
    prev_non_blank: Option<usize>,
) -> f64 {
    let char_count = trimmed.chars().count();
    if char_count > constants::STRUCTURAL_MAX_LINE_CHARS {
        return 0.0;
    }
    if is_end_marker_line(trimmed) {
        return 0.0;
    }

    let mut score = 0.0f64;

    // Shortness: shorter lines look more like headers.
    score += 0.15 * (1.0 - char_count as f64 / constants::STRUCTURAL_MAX_LINE_CHARS as f64);

    // Blank line before / after.
    let blank_before = n == 0 || text.line(n - 1).trim().is_empty();
    let blank_after = n + 1 >= text.line_count() || text.line(n + 1).trim().is_empty();
    if blank_before {
        score += 0.20;
    }
    if blank_after {
        score += 0.15;
    }

    // Punctuation shape: headers do not end mid-sentence, and often open
    // with a bracket.
    let ends_terminated = trimmed
        .chars()
        .last()
        .is_some_and(|c| constants::SENTENCE_TERMINATORS.contains(&c));
    if !ends_terminated {
        score += 0.20;
    }
    if trimmed
        .chars()
        .next()
        .is_some_and(|c| constants::HEADER_BRACKET_OPENERS.contains(&c))
    {
        score += 0.15;
    }

    // Marker lexemes.
    if constants::STRUCTURAL_LEXEMES.iter().any(|l| trimmed.contains(l)) {
        score += 0.20;
    }

    // Dialogue-continuation penalty: the previous line trails off into this
    // one, so this line is mid-passage.
    if let Some(p) = prev_non_blank {
        let prev_tail = text.line(p).trim_end().chars().last();
        if prev_tail.is_some_and(|c| constants::DIALOGUE_CONTINUATION_TAILS.contains(&c)) {
            score -= 0.25;
        }
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nt(s: &str) -> NovelText {
        NovelText::new(s.to_string(), "UTF-8", 1.0)
    }

    #[test]
    fn test_header_outscores_prose() {
        let s = "\n제12화 폭풍 전야\n\n주인공은 천천히 고개를 들어 흐린 하늘을 바라보았다. 바람이 거세게 불어오고 있었다.\n";
        let text = nt(s);
        let candidates = analyze(&text, 10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text.trim(), "제12화 폭풍 전야");
        assert!(candidates[0].structural_score > 0.5);
    }

    #[test]
    fn test_bracketed_header_scores_high() {
        let text = nt("\n< 연습생 면접 >\n\n본문이 이어진다. 아주 길지는 않다.\n");
        let candidates = analyze(&text, 5);
        let header = candidates
            .iter()
            .find(|c| c.text.trim() == "< 연습생 면접 >")
            .unwrap();
        assert!(header.structural_score > 0.6);
    }

    #[test]
    fn test_long_line_is_never_a_candidate() {
        let long = "이 줄은 아주 길어서 도저히 장 제목일 수가 없는, 예순 자를 확실히 넘기는 평범한 서술 문장이며 여전히 더 길게 이어진다.";
        let text = nt(&format!("\n{long}\n\n"));
        assert!(analyze(&text, 5).is_empty());
    }

    #[test]
    fn test_end_marker_line_is_never_a_candidate() {
        let text = nt("\n< 제목 > 끝\n\n");
        assert!(analyze(&text, 5).is_empty());
    }

    #[test]
    fn test_dialogue_continuation_penalised() {
        let s = "그가 말했다,\n짧은 줄\n\n\n짧은 줄\n";
        let text = nt(s);
        let candidates = analyze(&text, 5);
        let after_comma = candidates.iter().find(|c| c.line_num == 1);
        let standalone = candidates.iter().find(|c| c.line_num == 4).unwrap();
        match after_comma {
            Some(c) => assert!(c.structural_score < standalone.structural_score),
            None => {} // penalised below the floor entirely
        }
    }

    #[test]
    fn test_output_capped_at_factor_times_expected() {
        let mut s = String::new();
        for i in 0..100 {
            s.push_str(&format!("\n짧은 후보 {i}\n"));
        }
        let text = nt(&s);
        let candidates = analyze(&text, 4);
        assert!(candidates.len() <= 20);
        // Position order is preserved after the cap.
        for pair in candidates.windows(2) {
            assert!(pair[0].line_num < pair[1].line_num);
        }
    }
}
