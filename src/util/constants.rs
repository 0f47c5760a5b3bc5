// ChapterSleuth - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Anything tunable an operator might reasonably override is mirrored in
// platform::config; the values here are the shipped defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "ChapterSleuth";

/// Application identifier used for config/data/cache directories.
pub const APP_ID: &str = "ChapterSleuth";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Encoding detection
// =============================================================================

/// Maximum number of bytes sniffed for encoding detection.
pub const ENCODING_SNIFF_BYTES: usize = 256 * 1024; // 256 KiB

/// Confidence below which the detector falls back to its preference order
/// (UTF-8 first, then EUC-KR).
pub const ENCODING_MIN_CONFIDENCE: f32 = 0.6;

/// Fraction of replacement characters in the final decoded text above which
/// the text stream is considered unusable (EncodingUndetermined).
pub const MAX_REPLACEMENT_RATIO: f32 = 0.30;

// =============================================================================
// Sampling
// =============================================================================

/// Default size of each head/middle/tail sample window.
pub const DEFAULT_SAMPLE_WINDOW_BYTES: usize = 20 * 1024; // 20 KiB

/// Maximum number of uniform samples taken for direct title search.
pub const MAX_UNIFORM_SAMPLES: usize = 30;

/// Maximum bytes of sample text sent to the oracle in a single call.
pub const MAX_PROMPT_SAMPLE_BYTES: usize = 20 * 1024; // 20 KiB

// =============================================================================
// Splitting
// =============================================================================

/// Header lines at or below this many code points are eligible for the
/// two-line title merge (short bracketed title followed by a second header).
pub const BRACKET_PATTERN_LENGTH: usize = 50;

/// Maximum title length in code points. Longer matched titles are not
/// stripped from the first body line.
pub const MAX_TITLE_LENGTH: usize = 100;

/// Separator used when a merged two-line title is rendered as one string.
pub const TITLE_MERGE_SEPARATOR: &str = " | ";

/// Consecutive regex matches closer than this many bytes are treated as a
/// paired start/end marker duplicate; the second match is dropped.
/// Observed corpus constant, overridable via [segmentation] in config.
pub const MIN_PAIR_GAP_BYTES: usize = 500;

// =============================================================================
// Pattern acquisition and repair
// =============================================================================

/// Attempts at initial pattern acquisition before PatternUnusable.
pub const PATTERN_ACQUIRE_ATTEMPTS: u32 = 3;

/// Maximum accepted length of an oracle-supplied regex pattern.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Number of largest dynamic gaps analysed per refinement iteration.
pub const MAX_GAPS_TO_ANALYZE: usize = 3;

/// A gap is "dynamic" when it exceeds max(avg_chapter_bytes * this factor,
/// DYNAMIC_GAP_FLOOR_BYTES).
pub const DYNAMIC_GAP_FACTOR: f64 = 1.5;

/// Absolute floor for dynamic gap detection.
pub const DYNAMIC_GAP_FLOOR_BYTES: usize = 50_000;

/// Radius of the sample window extracted around a gap midpoint.
pub const GAP_SAMPLE_RADIUS_BYTES: usize = 10 * 1024; // 10 KiB

/// Direct AI title search triggers when the best match count falls below
/// this fraction of the expected count.
pub const DIRECT_SEARCH_TRIGGER_RATIO: f64 = 0.95;

/// Number of existing matches shown to the oracle as few-shot examples
/// during direct title search.
pub const DIRECT_SEARCH_FEWSHOT: usize = 5;

/// Runs issued for consensus voting; results kept when they appear in at
/// least CONSENSUS_QUORUM of them.
pub const CONSENSUS_RUNS: usize = 3;
pub const CONSENSUS_QUORUM: usize = 2;

/// End-marker lexemes. A line whose final whitespace-delimited token
/// contains one of these closes a chapter in paired-marker sources and must
/// never be matched as a chapter header.
pub const END_MARKER_LEXEMES: &[&str] =
    &["끝", "완", "END", "end", "fin", "종료", "끗", "完"];

// =============================================================================
// Runner escalation
// =============================================================================

/// Maximum gap-refinement iterations before escalation.
pub const MAX_REFINE_ITERATIONS: u32 = 5;

/// Stagnation window: number of trailing refinement counts examined.
pub const STAGNATION_WINDOW: usize = 3;

/// Stagnation tolerance: escalate when max - min of the window is at or
/// below this. Observed corpus constant, overridable via config.
pub const STAGNATION_TOLERANCE: usize = 2;

/// Consecutive fully-rejected refinement iterations before escalation.
pub const REJECTION_THRESHOLD: u32 = 2;

// =============================================================================
// Structural analysis
// =============================================================================

/// Trimmed lines longer than this many code points are never structural
/// header candidates.
pub const STRUCTURAL_MAX_LINE_CHARS: usize = 60;

/// Structural candidate output is capped at this multiple of the expected
/// chapter count.
pub const STRUCTURAL_CANDIDATE_FACTOR: usize = 5;

/// Characters that open a bracketed header (`< 제목 >`, `【1화】`, ...).
pub const HEADER_BRACKET_OPENERS: &[char] = &['{', '[', '<', '【', '(', '《', '「'];

/// Sentence-terminating punctuation; a candidate header line must not end
/// with one of these.
pub const SENTENCE_TERMINATORS: &[char] =
    &['.', '。', '!', '?', '！', '？', ',', '，', '…', '"', '”', '’', '」', '』'];

/// Trailing characters on the previous line that indicate a continuing
/// passage of dialogue or narration.
pub const DIALOGUE_CONTINUATION_TAILS: &[char] = &[',', '，', '"', '“', '—', '·', ':', '：'];

/// Closed list of time/place and chapter-marker lexemes that raise a line's
/// structural score.
pub const STRUCTURAL_LEXEMES: &[&str] = &[
    "화", "장", "편", "부", "막", "章", "回", "話", "프롤로그", "에필로그",
    "외전", "번외", "서장", "종장", "Chapter", "chapter", "Part", "Episode",
    "다음날", "며칠 후", "몇 년 후", "그날 밤", "새벽", "아침", "정오", "저녁",
];

// =============================================================================
// AI scoring
// =============================================================================

/// Candidates scored per batched oracle call.
pub const SCORER_BATCH_SIZE: usize = 10;

/// Context lines included before and after each candidate.
pub const SCORER_CONTEXT_LINES: usize = 5;

/// Neutral score assigned when an oracle response is missing or unparseable.
pub const SCORER_NEUTRAL: f64 = 0.5;

/// When structural candidates exceed this count, AI scoring is skipped and
/// structural scores are used directly.
pub const SCORER_SKIP_THRESHOLD: usize = 200;

// =============================================================================
// Topic change detection
// =============================================================================

/// Sliding window size.
pub const TOPIC_WINDOW_BYTES: usize = 2 * 1024; // 2 KiB

/// Activation threshold: the detector runs only when structural coverage
/// (candidates / expected_count) is below this.
pub const TOPIC_COVERAGE_THRESHOLD: f64 = 1.2;

/// A window pair scoring above this becomes a boundary candidate.
pub const TOPIC_PEAK_THRESHOLD: f64 = 0.5;

/// Absolute per-file budget of topic-change oracle calls. The stride is
/// widened beyond W/2 when needed so the whole file fits in this budget.
pub const TOPIC_CALL_BUDGET: usize = 40;

// =============================================================================
// Global optimization
// =============================================================================

/// Weight of the AI score in the combined candidate score.
pub const OPTIMIZER_AI_WEIGHT: f64 = 0.7;

/// Weight of the structural score in the combined candidate score.
pub const OPTIMIZER_STRUCTURAL_WEIGHT: f64 = 0.3;

/// Minimum spacing floor between selected boundaries.
pub const OPTIMIZER_SPACING_FLOOR_BYTES: usize = 2_000;

/// Minimum spacing is max(avg_chapter_bytes / this divisor, the floor).
pub const OPTIMIZER_SPACING_DIVISOR: usize = 4;

/// Number of spacing halvings attempted when fewer than N boundaries fit.
pub const OPTIMIZER_MAX_RELAXATIONS: u32 = 3;

// =============================================================================
// Oracle budgets
// =============================================================================

/// Default oracle requests per minute across a whole process.
pub const DEFAULT_ORACLE_RPM: u32 = 60;

/// Default cap on in-flight oracle calls.
pub const DEFAULT_ORACLE_CONCURRENCY: usize = 5;

/// Default per-call timeout in seconds.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;

/// Retry attempts (including the first) for transient oracle failures.
pub const ORACLE_MAX_ATTEMPTS: u32 = 5;

/// Initial backoff delay for oracle retries.
pub const ORACLE_BACKOFF_BASE_MS: u64 = 500;

/// Backoff ceiling for oracle retries.
pub const ORACLE_BACKOFF_MAX_MS: u64 = 15_000;

/// Fallback wait when a 429 response carries no Retry-After header.
pub const ORACLE_RETRY_AFTER_FALLBACK_SECS: u64 = 60;

/// Default wall-clock budget for a whole segmentation run in seconds.
pub const DEFAULT_RUN_BUDGET_SECS: u64 = 15 * 60;

// =============================================================================
// Chapter classification lexemes
// =============================================================================

/// Title keywords classifying a chapter as a prologue.
pub const PROLOGUE_LEXEMES: &[&str] = &["프롤로그", "서장", "서문", "prologue", "序章"];

/// Title keywords classifying a chapter as an epilogue.
pub const EPILOGUE_LEXEMES: &[&str] =
    &["에필로그", "종장", "후기", "epilogue", "終章", "后记"];

/// Title keywords classifying a chapter as a side story.
pub const SIDE_STORY_LEXEMES: &[&str] =
    &["외전", "번외", "특별편", "side story", "番外"];

// =============================================================================
// Discovery limits
// =============================================================================

/// Maximum directory recursion depth during discovery.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Maximum number of files to discover in a single batch.
pub const DEFAULT_MAX_FILES: usize = 50_000;

/// Hard upper bound on max files (prevents configuration mistakes).
pub const ABSOLUTE_MAX_FILES: usize = 200_000;

/// Hard upper bound on max depth (prevents infinite traversal).
pub const ABSOLUTE_MAX_DEPTH: usize = 50;

/// Default include glob patterns for novel file discovery.
pub const DEFAULT_INCLUDE_PATTERNS: &[&str] = &["*.txt"];

/// Default exclude glob patterns for novel file discovery.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] =
    &["*.gz", "*.zip", "*.rar", "*.bak", "*.tmp", ".git", "__MACOSX"];

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a source line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Files
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Processed-file index name (stored in the platform data directory).
pub const INDEX_FILE_NAME: &str = "index.json";

/// Oracle response cache subdirectory name.
pub const CACHE_DIR_NAME: &str = "oracle-cache";
