// ChapterSleuth - core/pattern.rs
//
// Chapter-header pattern acquisition and repair. This module owns every
// oracle interaction that produces, repairs, or augments the header regex:
// initial acquisition from head/middle/tail samples, deterministic
// auto-validation, gap-directed refinement, direct title enumeration,
// reverse-regex synthesis, and consensus voting.
//
// Every oracle-sourced value is untrusted: it must survive sanitisation,
// compilation, shape checks, and a counted trial against the file before
// it replaces the current best pattern.

use crate::core::model::SampleWindow;
use crate::core::sampler;
use crate::core::splitter::line_matches;
use crate::core::text::NovelText;
use crate::oracle::Oracle;
use crate::util::constants;
use crate::util::error::{ChapterSleuthError, OracleError, PatternError};
use fancy_regex::Regex;
use std::collections::HashSet;

/// One line the current pattern matches.
#[derive(Debug, Clone)]
pub struct LineMatch {
    pub line_num: usize,
    pub byte_offset: usize,
    pub text: String,
}

/// A large inter-match region worth re-analysing.
#[derive(Debug, Clone, Copy)]
pub struct Gap {
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Gap {
    pub fn len(&self) -> usize {
        self.end_byte - self.start_byte
    }
}

/// Outcome of the deterministic auto-validation pass.
#[derive(Debug)]
pub struct AutoValidateOutcome {
    pub pattern: Regex,
    /// Human-readable names of the repairs that were accepted, in order.
    pub accepted_repairs: Vec<&'static str>,
}

/// Outcome of one gap-directed refinement iteration.
#[derive(Debug)]
pub struct RefineOutcome {
    pub pattern: Regex,
    /// Trailing count of consecutive rejected proposals. Reset to zero by
    /// any acceptance within the iteration.
    pub rejections: u32,
}

/// Built-in header pattern battery, tried when the oracle cannot supply an
/// initial pattern. Families: numbered, bracketed, decorated, CJK chapter
/// markers, and named sections.
const FALLBACK_PATTERNS: &[&str] = &[
    r"^\s*제\s*\d+\s*[화장권부편회]",
    r"^\s*\d+\s*화(?:\s|$)",
    r"^\s*[<\[【《]\s*.{1,48}?\s*[>\]】》]\s*$",
    r"(?i)^\s*chapter\s+\d+",
    r"(?i)^\s*episode\s+\d+",
    r"^\s*第\s*[0-9一二三四五六七八九十百千万]+\s*[章节回話话]",
    r"^\s*(?:프롤로그|에필로그|외전|서장|종장)",
    r"^\s*[=\-#*]{3,}\s*.{0,40}\s*[=\-#*]{3,}\s*$",
];

/// Owns oracle-driven pattern work for one segmentation run.
pub struct PatternManager<'o, O> {
    oracle: &'o O,
    /// Close-duplicate gap used by effective match counting.
    close_duplicate_gap: usize,
}

impl<'o, O: Oracle> PatternManager<'o, O> {
    pub fn new(oracle: &'o O, close_duplicate_gap: usize) -> Self {
        Self {
            oracle,
            close_duplicate_gap,
        }
    }

    // =========================================================================
    // Match counting
    // =========================================================================

    /// Lines the pattern matches, after close-duplicate suppression.
    /// This is the canonical count every acceptance decision uses.
    pub fn effective_matches(&self, text: &NovelText, pattern: &Regex) -> Vec<LineMatch> {
        let mut matches = Vec::new();
        for n in 0..text.line_count() {
            let line = text.line(n);
            if line.trim().is_empty() {
                continue;
            }
            if line_matches(pattern, line) {
                matches.push(LineMatch {
                    line_num: n,
                    byte_offset: text.line_start(n),
                    text: line.to_string(),
                });
            }
        }
        self.suppress_close_duplicates(matches)
    }

    fn suppress_close_duplicates(&self, matches: Vec<LineMatch>) -> Vec<LineMatch> {
        if self.close_duplicate_gap == 0 {
            return matches;
        }
        let mut kept: Vec<LineMatch> = Vec::with_capacity(matches.len());
        for m in matches {
            match kept.last() {
                Some(prev) if m.byte_offset - prev.byte_offset < self.close_duplicate_gap => {
                    tracing::debug!(
                        kept_offset = prev.byte_offset,
                        dropped_offset = m.byte_offset,
                        "Close-duplicate match suppressed"
                    );
                }
                _ => kept.push(m),
            }
        }
        kept
    }

    /// Matched lines whose tail is an end marker. Used to verify a repair
    /// does not introduce obvious end-marker matches.
    fn end_marker_match_count(&self, text: &NovelText, pattern: &Regex) -> usize {
        self.effective_matches(text, pattern)
            .iter()
            .filter(|m| is_end_marker_line(&m.text))
            .count()
    }

    // =========================================================================
    // 4.4.1 Initial pattern generation
    // =========================================================================

    /// Obtain an initial header pattern from the oracle, retrying with
    /// progressively stricter prompts when the result matches nothing.
    pub async fn analyze(
        &self,
        text: &NovelText,
        expected: usize,
    ) -> Result<Regex, ChapterSleuthError> {
        let tri = sampler::default_tri_sample(text);

        for attempt in 0..constants::PATTERN_ACQUIRE_ATTEMPTS {
            let prompt = initial_prompt(&tri.head, &tri.middle, &tri.tail, expected, attempt);
            let response = self.oracle.complete(&prompt).await?;

            match compile_response_pattern(&response) {
                Ok(pattern) => {
                    let count = self.effective_matches(text, &pattern).len();
                    if count >= 1 {
                        tracing::info!(
                            pattern = pattern.as_str(),
                            matches = count,
                            attempt = attempt + 1,
                            "Initial pattern accepted"
                        );
                        return Ok(pattern);
                    }
                    tracing::warn!(
                        pattern = pattern.as_str(),
                        attempt = attempt + 1,
                        "Pattern matches zero lines; retrying"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt = attempt + 1, "Unusable pattern response");
                }
            }
        }

        Err(PatternError::Unusable {
            attempts: constants::PATTERN_ACQUIRE_ATTEMPTS,
        }
        .into())
    }

    /// Deterministic fallback when the oracle is unavailable: the built-in
    /// battery pattern whose effective count lands closest to `expected`.
    pub fn fallback_pattern(&self, text: &NovelText, expected: usize) -> Option<(Regex, usize)> {
        let mut best: Option<(Regex, usize)> = None;
        for raw in FALLBACK_PATTERNS {
            let Ok(pattern) = compile_pattern(raw) else {
                continue;
            };
            let count = self.effective_matches(text, &pattern).len();
            if count == 0 {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, best_count)) => {
                    count.abs_diff(expected) < best_count.abs_diff(expected)
                }
            };
            if better {
                best = Some((pattern, count));
            }
        }
        best
    }

    // =========================================================================
    // 4.4.2 Deterministic auto-validation and repair
    // =========================================================================

    /// Apply deterministic repairs, each accepted only when it moves the
    /// effective count toward `expected` without introducing end-marker
    /// matches. Zero oracle calls.
    pub fn auto_validate(
        &self,
        text: &NovelText,
        pattern: &Regex,
        expected: usize,
    ) -> AutoValidateOutcome {
        let mut best = pattern.clone();
        let mut best_count = self.effective_matches(text, &best).len();
        let mut best_end_markers = self.end_marker_match_count(text, &best);
        let mut accepted = Vec::new();

        // End-marker filter: wrap in a negative look-ahead so lines whose
        // final token contains an end-marker lexeme stop matching.
        if let Ok(candidate) = compile_pattern(&wrap_end_marker_guard(best.as_str())) {
            let count = self.effective_matches(text, &candidate).len();
            if count >= 1
                && count.abs_diff(expected) < best_count.abs_diff(expected)
            {
                best = candidate;
                best_count = count;
                best_end_markers = self.end_marker_match_count(text, &best);
                accepted.push("end-marker-filter");
            }
        }

        // Number-optional relaxation: most aggressive variant first.
        let base = best.as_str().to_string();
        let relaxed_both = relax_digits(&relax_parenthesised_numbers(&base));
        let relaxed_parens = relax_parenthesised_numbers(&base);
        let relaxed_digits = relax_digits(&base);
        let variants: [(&str, &str); 3] = [
            ("relax-both", &relaxed_both),
            ("relax-parens", &relaxed_parens),
            ("relax-digits", &relaxed_digits),
        ];

        for (name, raw) in variants {
            if raw == best.as_str() {
                continue;
            }
            let Ok(candidate) = compile_pattern(raw) else {
                continue;
            };
            let count = self.effective_matches(text, &candidate).len();
            let end_markers = self.end_marker_match_count(text, &candidate);
            if count >= 1
                && count.abs_diff(expected) < best_count.abs_diff(expected)
                && end_markers <= best_end_markers
            {
                best = candidate;
                best_count = count;
                best_end_markers = end_markers;
                accepted.push(name);
                break;
            }
        }

        tracing::debug!(
            pattern = best.as_str(),
            matches = best_count,
            repairs = ?accepted,
            "Auto-validation complete"
        );
        AutoValidateOutcome {
            pattern: best,
            accepted_repairs: accepted,
        }
    }

    // =========================================================================
    // 4.4.3 Gap-directed refinement
    // =========================================================================

    /// Regions between adjacent matches wider than
    /// max(avg_chapter_bytes * 1.5, 50 000), widest first, capped at
    /// MAX_GAPS_TO_ANALYZE.
    pub fn dynamic_gaps(
        &self,
        text: &NovelText,
        matches: &[LineMatch],
        expected: usize,
    ) -> Vec<Gap> {
        if matches.len() < 2 || expected == 0 {
            return Vec::new();
        }
        let avg = text.len_bytes() / expected;
        let threshold = ((avg as f64 * constants::DYNAMIC_GAP_FACTOR) as usize)
            .max(constants::DYNAMIC_GAP_FLOOR_BYTES);

        let mut gaps: Vec<Gap> = matches
            .windows(2)
            .filter(|pair| pair[1].byte_offset - pair[0].byte_offset > threshold)
            .map(|pair| Gap {
                start_byte: pair[0].byte_offset,
                end_byte: pair[1].byte_offset,
            })
            .collect();
        gaps.sort_by(|a, b| b.len().cmp(&a.len()));
        gaps.truncate(constants::MAX_GAPS_TO_ANALYZE);
        gaps
    }

    /// One refinement iteration: sample the widest dynamic gaps and ask the
    /// oracle for either a broader regex or the title lines it sees. Each
    /// proposal is accepted only if it strictly increases the effective
    /// count without exceeding `expected`.
    pub async fn refine(
        &self,
        text: &NovelText,
        pattern: &Regex,
        expected: usize,
    ) -> Result<RefineOutcome, OracleError> {
        let mut best = pattern.clone();
        let mut best_count = self.effective_matches(text, &best).len();
        let mut best_end_markers = self.end_marker_match_count(text, &best);
        let mut rejections: u32 = 0;

        let matches = self.effective_matches(text, &best);
        let gaps = self.dynamic_gaps(text, &matches, expected);
        if gaps.is_empty() {
            tracing::debug!("No dynamic gaps; refinement iteration is a rejection");
            return Ok(RefineOutcome {
                pattern: best,
                rejections: 1,
            });
        }

        for gap in gaps {
            let mid = gap.start_byte + gap.len() / 2;
            let window = sampler::extract_around(text, mid, constants::GAP_SAMPLE_RADIUS_BYTES);
            let prompt = gap_prompt(&window, best.as_str());
            let response = self.oracle.complete(&prompt).await?;

            let candidate = self.proposal_to_pattern(&response, &window, best.as_str());
            let accepted = match candidate {
                Some(candidate) => {
                    let count = self.effective_matches(text, &candidate).len();
                    let end_markers = self.end_marker_match_count(text, &candidate);
                    if count > best_count && count <= expected && end_markers <= best_end_markers {
                        tracing::info!(
                            pattern = candidate.as_str(),
                            matches = count,
                            "Gap refinement proposal accepted"
                        );
                        best = candidate;
                        best_count = count;
                        best_end_markers = end_markers;
                        true
                    } else {
                        tracing::debug!(
                            matches = count,
                            best = best_count,
                            "Gap refinement proposal rejected"
                        );
                        false
                    }
                }
                None => false,
            };

            if accepted {
                rejections = 0;
            } else {
                rejections += 1;
            }
        }

        Ok(RefineOutcome {
            pattern: best,
            rejections,
        })
    }

    /// Interpret a gap-analysis response: a regex if it compiles, otherwise
    /// title lines found verbatim in the window, folded into the current
    /// pattern as an alternation.
    fn proposal_to_pattern(
        &self,
        response: &str,
        window: &SampleWindow,
        current: &str,
    ) -> Option<Regex> {
        // A single-line response is a regex proposal; multiple lines are a
        // title listing (most title lines would also compile as regexes,
        // so the line count disambiguates the two reply forms).
        let non_empty_lines = response.lines().filter(|l| !l.trim().is_empty()).count();
        if non_empty_lines <= 1 {
            if let Ok(pattern) = compile_response_pattern(response) {
                return Some(pattern);
            }
        }

        let window_lines: HashSet<&str> =
            window.text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let titles: Vec<&str> = response
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !is_end_marker_line(l) && window_lines.contains(l))
            .collect();
        if titles.is_empty() {
            return None;
        }

        let alternation = titles
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        compile_pattern(&format!("(?:{current})|^\\s*(?:{alternation})\\s*$")).ok()
    }

    // =========================================================================
    // 4.4.4 Direct AI title search
    // =========================================================================

    /// Enumerate chapter-title lines across the whole file via uniform
    /// samples, with consensus voting per sample. Returned titles are
    /// deduplicated, end-marker filtered, and verified to occur verbatim in
    /// the file.
    pub async fn direct_title_search(
        &self,
        text: &NovelText,
        existing: &[LineMatch],
    ) -> Result<Vec<String>, OracleError> {
        let samples = sampler::uniform_samples(
            text,
            constants::MAX_UNIFORM_SAMPLES,
            constants::MAX_PROMPT_SAMPLE_BYTES,
        );

        let fewshot: Vec<&str> = existing
            .iter()
            .take(constants::DIRECT_SEARCH_FEWSHOT)
            .map(|m| m.text.trim())
            .collect();

        let file_lines: HashSet<&str> = (0..text.line_count())
            .map(|n| text.line(n).trim())
            .filter(|l| !l.is_empty())
            .collect();

        let mut titles: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut failures = 0usize;
        let mut last_error: Option<OracleError> = None;
        let total = samples.len();

        for sample in &samples {
            let prompt = title_search_prompt(sample, &fewshot);
            match self.consensus_lines(&prompt).await {
                Ok(lines) => {
                    for line in lines {
                        let trimmed = line.trim();
                        if trimmed.is_empty()
                            || is_end_marker_line(trimmed)
                            || !file_lines.contains(trimmed)
                        {
                            continue;
                        }
                        if seen.insert(trimmed.to_string()) {
                            titles.push(trimmed.to_string());
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == total && total > 0 {
            // Every sample failed: the oracle is effectively unavailable.
            return Err(last_error.unwrap_or(OracleError::Exhausted {
                attempts: constants::ORACLE_MAX_ATTEMPTS,
            }));
        }
        if failures > 0 {
            tracing::warn!(failures, total, "Some title-search samples failed; continuing");
        }

        tracing::info!(titles = titles.len(), samples = total, "Direct title search complete");
        Ok(titles)
    }

    // =========================================================================
    // 4.4.5 Reverse-regex synthesis
    // =========================================================================

    /// Ask the oracle for a single regex matching all supplied titles.
    /// Returns None (degrade, not fail) when the response is unusable or
    /// matches none of the titles.
    pub async fn pattern_from_titles(
        &self,
        titles: &[String],
    ) -> Result<Option<Regex>, OracleError> {
        if titles.is_empty() {
            return Ok(None);
        }
        let prompt = reverse_regex_prompt(titles);
        let response = self.oracle.complete(&prompt).await?;

        match compile_response_pattern(&response) {
            Ok(pattern) => {
                let hit = titles.iter().any(|t| line_matches(&pattern, t));
                if hit {
                    Ok(Some(pattern))
                } else {
                    tracing::warn!(
                        pattern = pattern.as_str(),
                        "Synthesised pattern matches none of its own examples; discarded"
                    );
                    Ok(None)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reverse-regex synthesis returned no usable pattern");
                Ok(None)
            }
        }
    }

    // =========================================================================
    // 4.4.6 Consensus voting
    // =========================================================================

    /// Issue the same extraction prompt several times and keep only lines
    /// appearing in a quorum of the runs. Suppresses oracle variance on
    /// single-shot extraction tasks.
    async fn consensus_lines(&self, prompt: &str) -> Result<Vec<String>, OracleError> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for _ in 0..constants::CONSENSUS_RUNS {
            let response = self.oracle.complete(prompt).await?;
            let mut in_run: HashSet<String> = HashSet::new();
            for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if !in_run.insert(line.to_string()) {
                    continue;
                }
                match counts.iter_mut().find(|(l, _)| l.as_str() == line) {
                    Some((_, c)) => *c += 1,
                    None => counts.push((line.to_string(), 1)),
                }
            }
        }
        Ok(counts
            .into_iter()
            .filter(|(_, c)| *c >= constants::CONSENSUS_QUORUM)
            .map(|(l, _)| l)
            .collect())
    }
}

// =============================================================================
// End-marker handling
// =============================================================================

/// True when the line's final whitespace-delimited token contains one of
/// the end-marker lexemes.
pub fn is_end_marker_line(line: &str) -> bool {
    let tail = line
        .trim_end()
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("");
    if tail.is_empty() {
        return false;
    }
    constants::END_MARKER_LEXEMES.iter().any(|m| tail.contains(m))
}

/// Wrap a pattern in a negative look-ahead excluding end-marker lines,
/// mirroring `is_end_marker_line` semantics.
pub fn wrap_end_marker_guard(pattern: &str) -> String {
    let lexemes = constants::END_MARKER_LEXEMES
        .iter()
        .map(|m| regex::escape(m))
        .collect::<Vec<_>>()
        .join("|");
    format!(r"(?!.*(?:{lexemes})\S*\s*$)(?:{pattern})")
}

// =============================================================================
// Pattern string transformations
// =============================================================================

/// `\d+` -> `\d*`: tolerate headers that drop their number.
fn relax_digits(pattern: &str) -> String {
    pattern.replace(r"\d+", r"\d*")
}

/// `\(\d+\)` -> `(?:\(\d+\))?`: tolerate headers that drop a parenthesised
/// number group like `(12)`.
fn relax_parenthesised_numbers(pattern: &str) -> String {
    pattern.replace(r"\(\d+\)", r"(?:\(\d+\))?")
}

// =============================================================================
// Oracle response validation
// =============================================================================

/// Strip fences and prose from an oracle response and compile the first
/// plausible line as a pattern.
pub fn compile_response_pattern(response: &str) -> Result<Regex, PatternError> {
    let candidate = sanitize_response(response).ok_or_else(|| PatternError::InvalidResponse {
        response_preview: preview_of(response),
        reason: "empty response",
    })?;

    if let Some(first) = candidate.chars().next() {
        if matches!(first, '*' | '+' | '?' | '{' | ')') {
            return Err(PatternError::InvalidResponse {
                response_preview: preview_of(&candidate),
                reason: "begins with a repetition metacharacter",
            });
        }
    }
    if !parentheses_balanced(&candidate) {
        return Err(PatternError::InvalidResponse {
            response_preview: preview_of(&candidate),
            reason: "unbalanced parentheses",
        });
    }
    compile_pattern(&candidate)
}

/// Compile with the length cap. Patterns are evaluated per line, so no
/// multi-line flag is needed; `^`/`$` anchor to each line naturally.
pub fn compile_pattern(pattern: &str) -> Result<Regex, PatternError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(PatternError::TooLong {
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }
    Regex::new(pattern).map_err(|source| PatternError::Compile {
        pattern: pattern.to_string(),
        source,
    })
}

fn sanitize_response(response: &str) -> Option<String> {
    let stripped = response.trim();
    let stripped = stripped
        .strip_prefix("```regex")
        .or_else(|| stripped.strip_prefix("```"))
        .unwrap_or(stripped);
    let stripped = stripped.strip_suffix("```").unwrap_or(stripped);

    stripped
        .lines()
        .map(|l| l.trim().trim_matches('`'))
        .map(|l| l.strip_prefix("regex:").map(str::trim).unwrap_or(l))
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn parentheses_balanced(pattern: &str) -> bool {
    let mut depth: i32 = 0;
    let mut escaped = false;
    let mut in_class = false;
    for ch in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_class
}

fn preview_of(s: &str) -> String {
    s.chars().take(80).collect()
}

// =============================================================================
// Prompts
// =============================================================================

fn initial_prompt(
    head: &SampleWindow,
    middle: &SampleWindow,
    tail: &SampleWindow,
    expected: usize,
    attempt: u32,
) -> String {
    let strictness = match attempt {
        0 => "",
        1 => "Your previous pattern matched nothing. Anchor the pattern to the start \
              of the line with ^ and keep it minimal.\n",
        _ => "Emit only a raw pattern on a single line. No prose, no backticks, no \
              explanation. The pattern must match at least one sampled line.\n",
    };
    format!(
        "You are given three samples (head, middle, tail) of a serialized novel text \
         file that contains about {expected} chapters.\n\
         Emit exactly one raw regular expression that matches the chapter-title lines \
         and nothing else.\n\
         Recognised header families: numbered (제1화, 12화, Chapter 3, 第5章), \
         bracketed (< 제목 >, 【서장】, [1]), decorated (=== 제목 ===).\n\
         Never match lines whose final token contains an end marker: 끝, 완, END, end, \
         fin, 종료, 끗, 完.\n\
         {strictness}\
         --- HEAD ---\n{}\n--- MIDDLE ---\n{}\n--- TAIL ---\n{}",
        head.text, middle.text, tail.text
    )
}

fn gap_prompt(window: &SampleWindow, current: &str) -> String {
    format!(
        "The regular expression `{current}` finds chapter titles in a novel file, but \
         it misses every title inside the following region. Either reply with a single \
         broader regular expression on one line, or list the chapter-title lines you \
         see in the region, one per line, exactly as they appear.\n\
         Do not list lines whose final token contains an end marker (끝, 완, END, end, \
         fin, 종료, 끗, 完).\n\
         --- REGION ---\n{}",
        window.text
    )
}

fn title_search_prompt(sample: &SampleWindow, fewshot: &[&str]) -> String {
    let examples = if fewshot.is_empty() {
        String::from("(no confirmed examples yet)")
    } else {
        fewshot.join("\n")
    };
    format!(
        "List every line in the sample below that is a chapter title, one per line, \
         exactly as it appears. Confirmed chapter titles from the same file look like:\n\
         {examples}\n\
         Skip lines whose final token contains an end marker (끝, 완, END, end, fin, \
         종료, 끗, 完). Reply with title lines only; reply with an empty message if \
         there are none.\n\
         --- SAMPLE ---\n{}",
        sample.text
    )
}

fn reverse_regex_prompt(titles: &[String]) -> String {
    let listing = titles
        .iter()
        .take(constants::MAX_UNIFORM_SAMPLES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Emit exactly one raw regular expression, on a single line, that matches every \
         one of the following chapter-title lines and does not match chapter end \
         markers (lines ending in 끝, 완, END, end, fin, 종료, 끗, 完):\n{listing}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::error::OracleError;
    use std::sync::Mutex;

    /// Test oracle returning scripted responses in order, then repeating
    /// the last one.
    struct ScriptedOracle {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl Oracle for ScriptedOracle {
        async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
            let mut responses = self.responses.lock().unwrap();
            match responses.len() {
                0 => Err(OracleError::Exhausted { attempts: 5 }),
                1 => Ok(responses[0].clone()),
                _ => Ok(responses.pop().unwrap()),
            }
        }
    }

    fn nt(s: &str) -> NovelText {
        NovelText::new(s.to_string(), "UTF-8", 1.0)
    }

    fn paired_marker_novel(chapters: usize) -> String {
        let mut s = String::new();
        for c in 1..=chapters {
            s.push_str(&format!("< 이야기 {c} >\n"));
            for l in 0..15 {
                s.push_str(&format!("본문 {c}-{l} 내용이 계속 이어지고 있다.\n"));
            }
            s.push_str(&format!("< 이야기 {c} > 끝\n\n"));
        }
        s
    }

    #[test]
    fn test_is_end_marker_line() {
        assert!(is_end_marker_line("< 제목 > 끝"));
        assert!(is_end_marker_line("제3화 완"));
        assert!(is_end_marker_line("THE END"));
        assert!(is_end_marker_line("chapter one end"));
        assert!(is_end_marker_line("본문끝"));
        assert!(!is_end_marker_line("< 제목 >"));
        assert!(!is_end_marker_line("제3화 시작"));
        assert!(!is_end_marker_line(""));
    }

    #[test]
    fn test_end_marker_guard_wraps_pattern() {
        let guarded = compile_pattern(&wrap_end_marker_guard(r"^< .+ >")).unwrap();
        assert!(line_matches(&guarded, "< 제목 >"));
        assert!(!line_matches(&guarded, "< 제목 > 끝"));
        assert!(!line_matches(&guarded, "< 제목 > 완"));
    }

    #[test]
    fn test_sanitize_fenced_response() {
        let pattern = compile_response_pattern("```regex\n^제\\d+화\n```").unwrap();
        assert!(line_matches(&pattern, "제1화 만남"));
    }

    #[test]
    fn test_sanitize_prose_prefix() {
        let pattern = compile_response_pattern("regex: ^제\\d+화").unwrap();
        assert!(line_matches(&pattern, "제9화"));
    }

    #[test]
    fn test_reject_leading_repetition() {
        let err = compile_response_pattern("*화$").unwrap_err();
        assert!(matches!(err, PatternError::InvalidResponse { .. }));
    }

    #[test]
    fn test_reject_unbalanced_parens() {
        let err = compile_response_pattern(r"^(제\d+화").unwrap_err();
        assert!(matches!(err, PatternError::InvalidResponse { .. }));
    }

    #[test]
    fn test_parens_inside_class_are_literal() {
        assert!(parentheses_balanced(r"^[()]+$"));
        assert!(parentheses_balanced(r"\(\d+\)"));
        assert!(!parentheses_balanced(r"(()"));
    }

    #[test]
    fn test_relaxations() {
        assert_eq!(relax_digits(r"^제\d+화"), r"^제\d*화");
        assert_eq!(
            relax_parenthesised_numbers(r"^.+\(\d+\)$"),
            r"^.+(?:\(\d+\))?$"
        );
    }

    #[test]
    fn test_effective_matches_suppresses_close_pairs() {
        let oracle = ScriptedOracle::new(&[]);
        let manager = PatternManager::new(&oracle, 500);
        let mut s = String::from("< 제목 >\n< 제목 >\n");
        s.push_str(&"본문 내용이 길게 이어진다.\n".repeat(100));
        s.push_str("< 다음 >\n");
        s.push_str(&"본문 내용이 길게 이어진다.\n".repeat(100));
        let text = nt(&s);
        let pattern = compile_pattern(r"^< .+ >$").unwrap();
        let matches = manager.effective_matches(&text, &pattern);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_auto_validate_end_marker_scenario() {
        // Paired start/end markers: the raw pattern matches both, the
        // end-marker filter halves the count to the expected value.
        let oracle = ScriptedOracle::new(&[]);
        let manager = PatternManager::new(&oracle, 0);
        let text = nt(&paired_marker_novel(8));
        let pattern = compile_pattern(r"^< .+ >").unwrap();
        assert_eq!(manager.effective_matches(&text, &pattern).len(), 16);

        let outcome = manager.auto_validate(&text, &pattern, 8);
        assert_eq!(manager.effective_matches(&text, &outcome.pattern).len(), 8);
        assert!(outcome.accepted_repairs.contains(&"end-marker-filter"));
    }

    #[test]
    fn test_auto_validate_number_relaxation() {
        // Some chapters numbered `제N화`, some headed by a bare `제화`-less
        // bracket form the digit relaxation recovers.
        let mut s = String::new();
        for c in 1..=6 {
            s.push_str(&format!("제{c}화 기록\n"));
            s.push_str(&"본문이 길게 이어진다.\n".repeat(15));
        }
        s.push_str("제화 번외 기록\n");
        s.push_str(&"본문이 길게 이어진다.\n".repeat(15));
        let oracle = ScriptedOracle::new(&[]);
        let manager = PatternManager::new(&oracle, 0);
        let text = nt(&s);
        let pattern = compile_pattern(r"^제\d+화").unwrap();
        assert_eq!(manager.effective_matches(&text, &pattern).len(), 6);

        let outcome = manager.auto_validate(&text, &pattern, 7);
        assert_eq!(manager.effective_matches(&text, &outcome.pattern).len(), 7);
        assert!(outcome
            .accepted_repairs
            .iter()
            .any(|r| r.starts_with("relax")));
    }

    #[test]
    fn test_auto_validate_idempotent_on_clean_input() {
        let mut s = String::new();
        for c in 1..=5 {
            s.push_str(&format!("제{c}화 기록\n"));
            s.push_str(&"본문이 길게 이어진다.\n".repeat(15));
        }
        let oracle = ScriptedOracle::new(&[]);
        let manager = PatternManager::new(&oracle, 0);
        let text = nt(&s);
        let pattern = compile_pattern(r"^제\d+화").unwrap();
        let outcome = manager.auto_validate(&text, &pattern, 5);
        assert!(outcome.accepted_repairs.is_empty());
        assert_eq!(manager.effective_matches(&text, &outcome.pattern).len(), 5);
    }

    #[test]
    fn test_dynamic_gaps_ranked_and_capped() {
        let oracle = ScriptedOracle::new(&[]);
        let manager = PatternManager::new(&oracle, 0);
        // Build matches by hand: offsets 0, 100k, 350k, 360k.
        let matches: Vec<LineMatch> = [0usize, 100_000, 350_000, 360_000]
            .iter()
            .map(|&byte_offset| LineMatch {
                line_num: byte_offset / 100,
                byte_offset,
                text: "제목".to_string(),
            })
            .collect();
        let mut padded = String::new();
        for _ in 0..4000 {
            padded.push_str(&"x".repeat(99));
            padded.push('\n');
        }
        let text = nt(&padded);
        let gaps = manager.dynamic_gaps(&text, &matches, 8);
        // avg = 50k, threshold = max(75k, 50k) = 75k. Gaps 100k and 250k
        // qualify, widest first.
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].len(), 250_000);
        assert_eq!(gaps[1].len(), 100_000);
    }

    #[test]
    fn test_fallback_battery_numbered() {
        let oracle = ScriptedOracle::new(&[]);
        let manager = PatternManager::new(&oracle, 0);
        let mut s = String::new();
        for c in 1..=9 {
            s.push_str(&format!("제{c}화 기록\n"));
            s.push_str(&"본문.\n".repeat(10));
        }
        let text = nt(&s);
        let (pattern, count) = manager.fallback_pattern(&text, 9).unwrap();
        assert_eq!(count, 9);
        assert!(line_matches(&pattern, "제3화 기록"));
    }

    #[tokio::test]
    async fn test_analyze_accepts_first_valid_pattern() {
        let oracle = ScriptedOracle::new(&["^제\\d+화"]);
        let manager = PatternManager::new(&oracle, 0);
        let mut s = String::new();
        for c in 1..=4 {
            s.push_str(&format!("제{c}화\n본문.\n"));
        }
        let text = nt(&s);
        let pattern = manager.analyze(&text, 4).await.unwrap();
        assert_eq!(manager.effective_matches(&text, &pattern).len(), 4);
    }

    #[tokio::test]
    async fn test_analyze_retries_zero_match_pattern() {
        let oracle = ScriptedOracle::new(&["^Chapter \\d+", "^제\\d+화"]);
        let manager = PatternManager::new(&oracle, 0);
        let mut s = String::new();
        for c in 1..=4 {
            s.push_str(&format!("제{c}화\n본문.\n"));
        }
        let text = nt(&s);
        let pattern = manager.analyze(&text, 4).await.unwrap();
        assert!(line_matches(&pattern, "제1화"));
    }

    #[tokio::test]
    async fn test_analyze_unusable_after_attempts() {
        let oracle = ScriptedOracle::new(&["not a regex ((("]);
        let manager = PatternManager::new(&oracle, 0);
        let text = nt("제1화\n본문.\n");
        let err = manager.analyze(&text, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ChapterSleuthError::Pattern(PatternError::Unusable { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn test_refine_accepts_strict_improvement() {
        // Pattern misses bracketed chapters; the oracle proposes a broader
        // alternation that picks them up.
        let mut s = String::new();
        for c in 1..=3 {
            s.push_str(&format!("제{c}화 기록\n"));
            s.push_str(&"본문 문장이 아주 길게 이어지는 단락이다.\n".repeat(600));
        }
        s.push_str("< 외전 >\n");
        s.push_str(&"본문 문장이 아주 길게 이어지는 단락이다.\n".repeat(600));
        s.push_str("제4화 기록\n");
        s.push_str(&"본문 문장이 아주 길게 이어지는 단락이다.\n".repeat(600));

        let oracle = ScriptedOracle::new(&[r"^(?:제\d+화|< .+ >)"]);
        let manager = PatternManager::new(&oracle, 500);
        let text = nt(&s);
        let pattern = compile_pattern(r"^제\d+화").unwrap();
        let outcome = manager.refine(&text, &pattern, 5).await.unwrap();
        assert_eq!(outcome.rejections, 0);
        assert_eq!(manager.effective_matches(&text, &outcome.pattern).len(), 5);
    }

    #[tokio::test]
    async fn test_refine_counts_rejections() {
        let mut s = String::new();
        for c in 1..=3 {
            s.push_str(&format!("제{c}화 기록\n"));
            s.push_str(&"본문 문장이 아주 길게 이어지는 단락이다.\n".repeat(600));
        }
        // Oracle keeps proposing the same pattern: no strict improvement.
        let oracle = ScriptedOracle::new(&[r"^제\d+화"]);
        let manager = PatternManager::new(&oracle, 500);
        let text = nt(&s);
        let pattern = compile_pattern(r"^제\d+화").unwrap();
        let outcome = manager.refine(&text, &pattern, 10).await.unwrap();
        assert!(outcome.rejections >= 1);
        assert_eq!(outcome.pattern.as_str(), pattern.as_str());
    }

    #[tokio::test]
    async fn test_direct_title_search_intersects_file_lines() {
        let mut s = String::new();
        for c in 1..=3 {
            s.push_str(&format!("< 연습생 면접 {c} >\n"));
            s.push_str(&"본문 내용.\n".repeat(20));
        }
        // One real title, one hallucinated, one end marker.
        let response = "< 연습생 면접 2 >\n< 없는 제목 >\n< 연습생 면접 1 > 끝";
        let oracle = ScriptedOracle::new(&[response]);
        let manager = PatternManager::new(&oracle, 0);
        let text = nt(&s);
        let titles = manager.direct_title_search(&text, &[]).await.unwrap();
        assert_eq!(titles, vec!["< 연습생 면접 2 >".to_string()]);
    }

    #[tokio::test]
    async fn test_pattern_from_titles_rejects_non_matching() {
        let oracle = ScriptedOracle::new(&["^Chapter \\d+$"]);
        let manager = PatternManager::new(&oracle, 0);
        let titles = vec!["< 연습생 면접 >".to_string()];
        let result = manager.pattern_from_titles(&titles).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_pattern_from_titles_accepts_matching() {
        let oracle = ScriptedOracle::new(&[r"^< .+ >$"]);
        let manager = PatternManager::new(&oracle, 0);
        let titles = vec!["< 연습생 면접 >".to_string()];
        let pattern = manager.pattern_from_titles(&titles).await.unwrap().unwrap();
        assert!(line_matches(&pattern, "< 연습생 면접 >"));
    }
}
