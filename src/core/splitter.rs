// ChapterSleuth - core/splitter.rs
//
// Chapter splitting in two modes.
//
// Regex mode walks the line index once, treating a line as a header when
// the pattern matches it or it appears verbatim in the caller's title
// candidates. Boundary mode takes a pre-validated boundary list and cuts
// mechanically, with no pattern matching at all.
//
// Offsets everywhere are byte offsets into the decoded text.

use crate::core::model::{Boundary, BoundarySource, Chapter, ChapterType};
use crate::core::text::NovelText;
use crate::util::constants;
use crate::util::error::SplitError;
use fancy_regex::Regex;
use std::collections::HashSet;

/// Tunables for regex-mode splitting.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Header lines at or below this many code points may merge with an
    /// immediately following header line into a title/subtitle pair.
    pub bracket_merge_len: usize,

    /// Titles longer than this are never stripped from the first body line.
    pub max_title_len: usize,

    /// Consecutive boundaries closer than this many bytes are treated as a
    /// duplicated start marker; the second is dropped.
    pub close_duplicate_gap: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            bracket_merge_len: constants::BRACKET_PATTERN_LENGTH,
            max_title_len: constants::MAX_TITLE_LENGTH,
            close_duplicate_gap: constants::MIN_PAIR_GAP_BYTES,
        }
    }
}

/// Result of a regex-mode split.
#[derive(Debug)]
pub struct SplitOutcome {
    pub chapters: Vec<Chapter>,
    /// The boundaries the chapters were cut at, in order.
    pub boundaries: Vec<Boundary>,
    /// Bytes of pre-first-chapter prelude that were discarded.
    pub discarded_prelude_bytes: usize,
    /// (kept_offset, dropped_offset) pairs removed by the close-duplicate
    /// filter.
    pub dropped_duplicates: Vec<(usize, usize)>,
}

/// One detected header: the boundary line plus an optional merged subtitle
/// line consumed along with it.
#[derive(Debug, Clone)]
struct Header {
    line_num: usize,
    /// Line number of a merged second header line, when the two-line title
    /// rule applied.
    merged_line: Option<usize>,
    source: BoundarySource,
}

/// Split `text` into chapters at lines matching `pattern` or appearing
/// verbatim (trimmed) in `title_candidates`.
///
/// When no header is found at all, the whole file becomes a single chapter
/// with an empty title, so the caller always receives at least one chapter.
pub fn split(
    text: &NovelText,
    pattern: &Regex,
    title_candidates: &[String],
    config: &SplitConfig,
) -> SplitOutcome {
    let candidates: HashSet<&str> = title_candidates.iter().map(|s| s.trim()).collect();

    let mut headers = detect_headers(text, pattern, &candidates);
    merge_two_line_titles(text, config, &mut headers);
    let dropped_duplicates = drop_close_duplicates(text, config, &mut headers);

    if headers.is_empty() {
        let body = text.text().to_string();
        let length = body.chars().count();
        return SplitOutcome {
            chapters: vec![Chapter {
                cid: 0,
                title: String::new(),
                subtitle: String::new(),
                length,
                body,
                chapter_type: ChapterType::Main,
                start_offset: 0,
            }],
            boundaries: Vec::new(),
            discarded_prelude_bytes: 0,
            dropped_duplicates,
        };
    }

    let discarded_prelude_bytes = text.line_start(headers[0].line_num);
    if discarded_prelude_bytes > 0 {
        tracing::info!(
            bytes = discarded_prelude_bytes,
            "Discarding pre-first-chapter prelude"
        );
    }

    let mut chapters = Vec::with_capacity(headers.len());
    let mut boundaries = Vec::with_capacity(headers.len());

    for (idx, header) in headers.iter().enumerate() {
        let header_line = text.line(header.line_num);
        let (title, mut subtitle) = extract_title(header_line, pattern);
        if let Some(merged) = header.merged_line {
            subtitle = text.line(merged).trim().to_string();
        }

        let body_first_line = header.merged_line.unwrap_or(header.line_num) + 1;
        let body_end = headers
            .get(idx + 1)
            .map(|next| text.line_start(next.line_num))
            .unwrap_or_else(|| text.len_bytes());
        let body_start = if body_first_line < text.line_count() {
            text.line_start(body_first_line)
        } else {
            text.len_bytes()
        };

        let mut body = text.text()[body_start.min(body_end)..body_end].to_string();
        strip_title_prefix(&mut body, &title, config.max_title_len);

        let classification_key = if subtitle.is_empty() {
            title.clone()
        } else {
            format!("{title}{}{subtitle}", constants::TITLE_MERGE_SEPARATOR)
        };

        boundaries.push(Boundary {
            line_num: header.line_num,
            byte_offset: text.line_start(header.line_num),
            text: header_line.to_string(),
            score: None,
            source: header.source,
        });
        chapters.push(Chapter {
            cid: idx as u32,
            chapter_type: classify_title(&classification_key),
            length: body.chars().count(),
            title,
            subtitle,
            body,
            start_offset: text.line_start(header.line_num),
        });
    }

    SplitOutcome {
        chapters,
        boundaries,
        discarded_prelude_bytes,
        dropped_duplicates,
    }
}

/// Split at a pre-validated boundary list. No pattern matching occurs.
///
/// Yields exactly `boundaries.len()` chapters. Empty bodies are allowed
/// (and logged). Invalid sets - unsorted, out of range, text not matching
/// the line - are an internal bug and fail with `InvalidBoundary`.
pub fn split_by_boundaries(
    text: &NovelText,
    boundaries: &[Boundary],
) -> Result<Vec<Chapter>, SplitError> {
    validate_boundaries(text, boundaries)?;

    let prelude = text.line_start(boundaries[0].line_num);
    if prelude > 0 {
        tracing::info!(bytes = prelude, "Discarding pre-first-chapter prelude");
    }

    let mut chapters = Vec::with_capacity(boundaries.len());
    for (idx, boundary) in boundaries.iter().enumerate() {
        let title = text.line(boundary.line_num).trim().to_string();
        let body_start = if boundary.line_num + 1 < text.line_count() {
            text.line_start(boundary.line_num + 1)
        } else {
            text.len_bytes()
        };
        let body_end = boundaries
            .get(idx + 1)
            .map(|next| text.line_start(next.line_num))
            .unwrap_or_else(|| text.len_bytes());

        let body = text.text()[body_start.min(body_end)..body_end].to_string();
        if body.trim().is_empty() {
            tracing::warn!(cid = idx, line = boundary.line_num, "Chapter has an empty body");
        }

        chapters.push(Chapter {
            cid: idx as u32,
            chapter_type: classify_title(&title),
            length: body.chars().count(),
            subtitle: String::new(),
            title,
            body,
            start_offset: text.line_start(boundary.line_num),
        });
    }
    Ok(chapters)
}

/// Classify a chapter from its title via the keyword map.
pub fn classify_title(title: &str) -> ChapterType {
    let lowered = title.to_lowercase();
    let contains_any = |lexemes: &[&str]| lexemes.iter().any(|l| lowered.contains(&l.to_lowercase()));

    if contains_any(constants::PROLOGUE_LEXEMES) {
        ChapterType::Prologue
    } else if contains_any(constants::EPILOGUE_LEXEMES) {
        ChapterType::Epilogue
    } else if contains_any(constants::SIDE_STORY_LEXEMES) {
        ChapterType::Side
    } else {
        ChapterType::Main
    }
}

// =============================================================================
// Header detection
// =============================================================================

fn detect_headers(
    text: &NovelText,
    pattern: &Regex,
    candidates: &HashSet<&str>,
) -> Vec<Header> {
    let mut headers = Vec::new();
    for n in 0..text.line_count() {
        let line = text.line(n);
        if line.trim().is_empty() {
            continue;
        }
        if candidates.contains(line.trim()) {
            headers.push(Header {
                line_num: n,
                merged_line: None,
                source: BoundarySource::AiDirect,
            });
        } else if line_matches(pattern, line) {
            headers.push(Header {
                line_num: n,
                merged_line: None,
                source: BoundarySource::Regex,
            });
        }
    }
    headers
}

/// A fancy-regex runtime error (backtracking limit) degrades to a
/// non-match rather than aborting the split.
pub(crate) fn line_matches(pattern: &Regex, line: &str) -> bool {
    match pattern.is_match(line) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!(error = %e, "Pattern evaluation failed on line; treating as non-match");
            false
        }
    }
}

/// Apply the two-line title rule: a short header whose immediately next
/// non-blank line is also a header consumes that line as its subtitle.
/// Identical adjacent header lines are left for the close-duplicate filter
/// (author-mistake duplicates are dropped, not merged).
fn merge_two_line_titles(text: &NovelText, config: &SplitConfig, headers: &mut Vec<Header>) {
    let mut merged = Vec::with_capacity(headers.len());
    let mut i = 0;
    while i < headers.len() {
        let current = headers[i].clone();
        let mergeable = headers.get(i + 1).is_some_and(|next| {
            let first = text.line(current.line_num);
            let second = text.line(next.line_num);
            first.trim().chars().count() <= config.bracket_merge_len
                && next_non_blank_line(text, current.line_num) == Some(next.line_num)
                && first.trim() != second.trim()
        });
        if mergeable {
            let next = headers[i + 1].clone();
            merged.push(Header {
                line_num: current.line_num,
                merged_line: Some(next.line_num),
                source: current.source,
            });
            i += 2;
        } else {
            merged.push(current);
            i += 1;
        }
    }
    *headers = merged;
}

fn next_non_blank_line(text: &NovelText, after: usize) -> Option<usize> {
    ((after + 1)..text.line_count()).find(|&n| !text.line(n).trim().is_empty())
}

/// Drop the second of any boundary pair closer than the configured gap.
/// Both offsets are logged per the duplicated-start-marker policy.
fn drop_close_duplicates(
    text: &NovelText,
    config: &SplitConfig,
    headers: &mut Vec<Header>,
) -> Vec<(usize, usize)> {
    let mut dropped = Vec::new();
    let mut kept: Vec<Header> = Vec::with_capacity(headers.len());
    for header in headers.drain(..) {
        let offset = text.line_start(header.line_num);
        match kept.last() {
            Some(prev) => {
                let prev_offset = text.line_start(prev.line_num);
                if offset - prev_offset < config.close_duplicate_gap {
                    tracing::info!(
                        kept_offset = prev_offset,
                        dropped_offset = offset,
                        "Close-duplicate boundary dropped"
                    );
                    dropped.push((prev_offset, offset));
                } else {
                    kept.push(header);
                }
            }
            None => kept.push(header),
        }
    }
    *headers = kept;
    dropped
}

// =============================================================================
// Title handling
// =============================================================================

/// Title is the matched portion of the header line; any remainder becomes
/// the subtitle. Candidate lines (no regex match) use the whole line.
fn extract_title(line: &str, pattern: &Regex) -> (String, String) {
    let trimmed = line.trim();
    match pattern.find(trimmed) {
        Ok(Some(m)) if m.start() == 0 && m.end() < trimmed.len() => {
            let title = trimmed[..m.end()].trim().to_string();
            let subtitle = trimmed[m.end()..].trim().to_string();
            (title, subtitle)
        }
        _ => (trimmed.to_string(), String::new()),
    }
}

/// Some sources repeat the title at the top of the body; strip that prefix
/// when the title is short enough to be a genuine header echo.
fn strip_title_prefix(body: &mut String, title: &str, max_title_len: usize) {
    if title.is_empty() || title.chars().count() > max_title_len {
        return;
    }
    let first_line_end = body.find('\n').unwrap_or(body.len());
    let first_line = &body[..first_line_end];
    if let Some(rest) = first_line.trim_start().strip_prefix(title) {
        let leading = first_line.len() - first_line.trim_start().len();
        let strip_len = leading + (first_line.trim_start().len() - rest.len());
        body.replace_range(..strip_len, "");
        // Drop a separator left dangling after the echo.
        while body.starts_with([' ', '\t', ':', '-']) {
            body.remove(0);
        }
    }
}

// =============================================================================
// Boundary validation
// =============================================================================

fn validate_boundaries(text: &NovelText, boundaries: &[Boundary]) -> Result<(), SplitError> {
    if boundaries.is_empty() {
        return Err(SplitError::NoBoundaries);
    }
    let mut prev: Option<&Boundary> = None;
    for (index, boundary) in boundaries.iter().enumerate() {
        if boundary.line_num >= text.line_count() {
            return Err(SplitError::InvalidBoundary {
                index,
                reason: format!(
                    "line {} out of range ({} lines)",
                    boundary.line_num,
                    text.line_count()
                ),
            });
        }
        if boundary.text.trim().is_empty() {
            return Err(SplitError::InvalidBoundary {
                index,
                reason: "empty boundary text".to_string(),
            });
        }
        if text.line(boundary.line_num).trim() != boundary.text.trim() {
            return Err(SplitError::InvalidBoundary {
                index,
                reason: format!(
                    "text does not match line {}: expected '{}'",
                    boundary.line_num,
                    crate::util::logging::preview(text.line(boundary.line_num))
                ),
            });
        }
        if let Some(p) = prev {
            if boundary.line_num <= p.line_num {
                return Err(SplitError::InvalidBoundary {
                    index,
                    reason: format!(
                        "line numbers not strictly increasing ({} after {})",
                        boundary.line_num, p.line_num
                    ),
                });
            }
        }
        prev = Some(boundary);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nt(s: &str) -> NovelText {
        NovelText::new(s.to_string(), "UTF-8", 1.0)
    }

    fn pat(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    /// Body lines are long enough that consecutive chapters sit farther
    /// apart than the default close-duplicate gap.
    fn numbered_novel(chapters: usize, body_lines: usize) -> String {
        let mut s = String::new();
        for c in 1..=chapters {
            s.push_str(&format!("제{c}화 여정의 기록\n"));
            for l in 0..body_lines {
                s.push_str(&format!("본문 {c}-{l} 문장이 길게 이어진다.\n"));
            }
            s.push('\n');
        }
        s
    }

    #[test]
    fn test_clean_numbered_split() {
        let text = nt(&numbered_novel(5, 15));
        let outcome = split(&text, &pat(r"^제\d+화"), &[], &SplitConfig::default());
        assert_eq!(outcome.chapters.len(), 5);
        assert_eq!(outcome.discarded_prelude_bytes, 0);
        for (i, ch) in outcome.chapters.iter().enumerate() {
            assert_eq!(ch.cid, i as u32);
            assert_eq!(ch.title, format!("제{}화", i + 1));
            assert_eq!(ch.subtitle, "여정의 기록");
            assert!(ch.body.contains("본문"));
            assert_eq!(ch.chapter_type, ChapterType::Main);
        }
        // Start offsets strictly increase.
        for pair in outcome.chapters.windows(2) {
            assert!(pair[0].start_offset < pair[1].start_offset);
        }
    }

    #[test]
    fn test_round_trip_reconstruction() {
        let source = numbered_novel(4, 15);
        let text = nt(&source);
        let outcome = split(&text, &pat(r"^제\d+화"), &[], &SplitConfig::default());

        let mut rebuilt = String::new();
        for (boundary, chapter) in outcome.boundaries.iter().zip(&outcome.chapters) {
            rebuilt.push_str(&boundary.text);
            rebuilt.push('\n');
            rebuilt.push_str(&chapter.body);
        }
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_no_header_yields_single_untitled_chapter() {
        let text = nt("그냥 본문만 있는 파일이다.\n줄이 더 있다.\n");
        let outcome = split(&text, &pat(r"^제\d+화"), &[], &SplitConfig::default());
        assert_eq!(outcome.chapters.len(), 1);
        assert_eq!(outcome.chapters[0].title, "");
        assert_eq!(outcome.chapters[0].body, text.text());
    }

    #[test]
    fn test_prelude_is_discarded_and_measured() {
        let mut s = String::from("작가의 말: 인사드립니다.\n\n");
        let prelude_len = s.len();
        s.push_str(&numbered_novel(2, 15));
        let text = nt(&s);
        let outcome = split(&text, &pat(r"^제\d+화"), &[], &SplitConfig::default());
        assert_eq!(outcome.chapters.len(), 2);
        assert_eq!(outcome.discarded_prelude_bytes, prelude_len);
    }

    #[test]
    fn test_title_candidates_are_headers() {
        let s = "제1화 시작\n본문 하나.\n연습생 면접\n본문 둘.\n";
        let text = nt(s);
        let candidates = vec!["연습생 면접".to_string()];
        let config = SplitConfig {
            close_duplicate_gap: 0,
            ..Default::default()
        };
        let outcome = split(&text, &pat(r"^제\d+화"), &candidates, &config);
        assert_eq!(outcome.chapters.len(), 2);
        assert_eq!(outcome.chapters[1].title, "연습생 면접");
        assert_eq!(outcome.boundaries[1].source, BoundarySource::AiDirect);
    }

    #[test]
    fn test_two_line_title_merge() {
        let s = "< 서쪽 탑 >\n제3화\n본문이 여기서 시작된다.\n";
        let text = nt(s);
        let config = SplitConfig {
            close_duplicate_gap: 0,
            ..Default::default()
        };
        let outcome = split(&text, &pat(r"^(?:< .+ >|제\d+화)$"), &[], &config);
        assert_eq!(outcome.chapters.len(), 1);
        assert_eq!(outcome.chapters[0].title, "< 서쪽 탑 >");
        assert_eq!(outcome.chapters[0].subtitle, "제3화");
        assert_eq!(outcome.chapters[0].body, "본문이 여기서 시작된다.\n");
    }

    #[test]
    fn test_duplicate_adjacent_start_markers_dropped() {
        let mut s = String::from("< 제목 >\n< 제목 >\n");
        s.push_str(&"본문 문장.\n".repeat(200));
        s.push_str("< 다음 장 >\n");
        s.push_str(&"본문 문장.\n".repeat(200));
        let text = nt(&s);
        let outcome = split(&text, &pat(r"^< .+ >$"), &[], &SplitConfig::default());
        assert_eq!(outcome.chapters.len(), 2);
        assert_eq!(outcome.dropped_duplicates.len(), 1);
        assert_eq!(outcome.dropped_duplicates[0].0, 0);
    }

    #[test]
    fn test_title_echo_stripped_from_body() {
        let s = "제1화\n제1화 만남\n진짜 본문은 여기부터.\n";
        let config = SplitConfig {
            close_duplicate_gap: 0,
            ..Default::default()
        };
        let outcome = split(&nt(s), &pat(r"^제\d+화$"), &[], &config);
        assert_eq!(outcome.chapters.len(), 1);
        assert_eq!(outcome.chapters[0].title, "제1화");
        assert!(outcome.chapters[0].body.starts_with("만남"));
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_title("프롤로그"), ChapterType::Prologue);
        assert_eq!(classify_title("에필로그 - 긴 여정의 끝"), ChapterType::Epilogue);
        assert_eq!(classify_title("외전 1. 다른 이야기"), ChapterType::Side);
        assert_eq!(classify_title("제15화 평범한 날"), ChapterType::Main);
        assert_eq!(classify_title("Epilogue"), ChapterType::Epilogue);
    }

    #[test]
    fn test_boundary_mode_exact_count() {
        let text = nt(&numbered_novel(3, 2));
        let boundaries: Vec<Boundary> = (0..3)
            .map(|i| {
                let line_num = i * 4;
                Boundary {
                    line_num,
                    byte_offset: text.line_start(line_num),
                    text: text.line(line_num).to_string(),
                    score: Some(0.9),
                    source: BoundarySource::Structural,
                }
            })
            .collect();
        let chapters = split_by_boundaries(&text, &boundaries).unwrap();
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "제1화 여정의 기록");
        assert!(chapters[2].body.contains("본문 3-1"));
    }

    #[test]
    fn test_boundary_mode_rejects_unsorted() {
        let text = nt(&numbered_novel(3, 2));
        let make = |line_num: usize| Boundary {
            line_num,
            byte_offset: text.line_start(line_num),
            text: text.line(line_num).to_string(),
            score: None,
            source: BoundarySource::Manual,
        };
        let result = split_by_boundaries(&text, &[make(4), make(0)]);
        assert!(matches!(result, Err(SplitError::InvalidBoundary { .. })));
    }

    #[test]
    fn test_boundary_mode_rejects_out_of_range() {
        let text = nt("제1화\n본문.\n");
        let boundary = Boundary {
            line_num: 99,
            byte_offset: 0,
            text: "제1화".to_string(),
            score: None,
            source: BoundarySource::Manual,
        };
        let result = split_by_boundaries(&text, &[boundary]);
        assert!(matches!(result, Err(SplitError::InvalidBoundary { .. })));
    }

    #[test]
    fn test_boundary_mode_rejects_mismatched_text() {
        let text = nt("제1화\n본문.\n");
        let boundary = Boundary {
            line_num: 0,
            byte_offset: 0,
            text: "다른 제목".to_string(),
            score: None,
            source: BoundarySource::Manual,
        };
        let result = split_by_boundaries(&text, &[boundary]);
        assert!(matches!(result, Err(SplitError::InvalidBoundary { .. })));
    }

    #[test]
    fn test_boundary_mode_rejects_empty_set() {
        let text = nt("제1화\n본문.\n");
        assert!(matches!(
            split_by_boundaries(&text, &[]),
            Err(SplitError::NoBoundaries)
        ));
    }
}
