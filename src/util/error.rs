// ChapterSleuth - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; all errors preserve the causal chain
// for diagnostic logging. Run-level failure reporting (failure kind plus
// partial snapshot plus reconciliation log) lives in core::model.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all ChapterSleuth operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum ChapterSleuthError {
    /// Encoding detection or decoding failed.
    Encoding(EncodingError),

    /// Chapter-header pattern acquisition or validation failed.
    Pattern(PatternError),

    /// Chapter splitting failed.
    Split(SplitError),

    /// LLM oracle call failed.
    Oracle(OracleError),

    /// File discovery failed.
    Discovery(DiscoveryError),

    /// Export operation failed.
    Export(ExportError),

    /// EPUB packaging failed.
    Package(PackageError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for ChapterSleuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "Encoding error: {e}"),
            Self::Pattern(e) => write!(f, "Pattern error: {e}"),
            Self::Split(e) => write!(f, "Split error: {e}"),
            Self::Oracle(e) => write!(f, "Oracle error: {e}"),
            Self::Discovery(e) => write!(f, "Discovery error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Package(e) => write!(f, "Packaging error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ChapterSleuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Pattern(e) => Some(e),
            Self::Split(e) => Some(e),
            Self::Oracle(e) => Some(e),
            Self::Discovery(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Package(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding errors
// ---------------------------------------------------------------------------

/// Errors related to encoding detection and decoding.
#[derive(Debug)]
pub enum EncodingError {
    /// Even the UTF-8 fallback produced mostly replacement characters.
    Undetermined {
        path: PathBuf,
        encoding: &'static str,
        replacement_ratio: f32,
    },

    /// The file is empty.
    EmptyFile { path: PathBuf },

    /// I/O error reading the file for detection.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undetermined {
                path,
                encoding,
                replacement_ratio,
            } => write!(
                f,
                "'{}': no usable text stream; best candidate {encoding} decoded with \
                 {:.0}% replacement characters",
                path.display(),
                replacement_ratio * 100.0
            ),
            Self::EmptyFile { path } => {
                write!(f, "'{}' is empty", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "'{}': I/O error: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for EncodingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<EncodingError> for ChapterSleuthError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

// ---------------------------------------------------------------------------
// Pattern errors
// ---------------------------------------------------------------------------

/// Errors related to chapter-header pattern acquisition and validation.
#[derive(Debug)]
pub enum PatternError {
    /// The oracle response did not contain a usable regex.
    InvalidResponse { response_preview: String, reason: &'static str },

    /// A regex pattern failed to compile.
    Compile {
        pattern: String,
        source: fancy_regex::Error,
    },

    /// A regex pattern exceeds the maximum allowed length.
    TooLong { length: usize, max_length: usize },

    /// Initial acquisition failed on every attempt.
    Unusable { attempts: u32 },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidResponse {
                response_preview,
                reason,
            } => write!(f, "unusable oracle response ({reason}): '{response_preview}'"),
            Self::Compile { pattern, source } => {
                write!(f, "pattern '{pattern}' does not compile: {source}")
            }
            Self::TooLong { length, max_length } => write!(
                f,
                "pattern is {length} chars, exceeds maximum of {max_length}"
            ),
            Self::Unusable { attempts } => write!(
                f,
                "no valid chapter-header pattern after {attempts} acquisition attempts"
            ),
        }
    }
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compile { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PatternError> for ChapterSleuthError {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e)
    }
}

// ---------------------------------------------------------------------------
// Split errors
// ---------------------------------------------------------------------------

/// Errors related to chapter splitting.
#[derive(Debug)]
pub enum SplitError {
    /// Boundary-mode split invoked with an invalid boundary set.
    /// Internal bug by contract; never produced from external input.
    InvalidBoundary { index: usize, reason: String },

    /// Boundary-mode split invoked with an empty boundary set.
    NoBoundaries,
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBoundary { index, reason } => {
                write!(f, "invalid boundary at index {index}: {reason}")
            }
            Self::NoBoundaries => write!(f, "boundary-mode split requires at least one boundary"),
        }
    }
}

impl std::error::Error for SplitError {}

impl From<SplitError> for ChapterSleuthError {
    fn from(e: SplitError) -> Self {
        Self::Split(e)
    }
}

// ---------------------------------------------------------------------------
// Oracle errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the LLM oracle subsystem.
#[derive(Debug)]
pub enum OracleError {
    /// Transport-level failure (connection, DNS, TLS, body read).
    Transport { source: reqwest::Error },

    /// The per-call timeout elapsed.
    Timeout { timeout_secs: u64 },

    /// The endpoint returned 429; retry after the given delay.
    RateLimited { retry_after_secs: u64 },

    /// Non-success HTTP status other than 429.
    Api { status: u16, message: String },

    /// The response body did not contain a completion.
    MalformedResponse { body_preview: String },

    /// All retry attempts exhausted.
    Exhausted { attempts: u32 },

    /// Cooperative cancellation observed before the call.
    Cancelled,
}

impl OracleError {
    /// Transient errors are retried inside the oracle wrapper; permanent
    /// ones propagate immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::MalformedResponse { .. } | Self::Exhausted { .. } | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { source } => write!(f, "transport failure: {source}"),
            Self::Timeout { timeout_secs } => {
                write!(f, "call exceeded {timeout_secs}s timeout")
            }
            Self::RateLimited { retry_after_secs } => {
                write!(f, "rate limited; retry after {retry_after_secs}s")
            }
            Self::Api { status, message } => {
                write!(f, "API returned status {status}: {message}")
            }
            Self::MalformedResponse { body_preview } => {
                write!(f, "malformed response body: '{body_preview}'")
            }
            Self::Exhausted { attempts } => {
                write!(f, "gave up after {attempts} attempts")
            }
            Self::Cancelled => write!(f, "cancelled before dispatch"),
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source } => Some(source),
            _ => None,
        }
    }
}

impl From<OracleError> for ChapterSleuthError {
    fn from(e: OracleError) -> Self {
        Self::Oracle(e)
    }
}

// ---------------------------------------------------------------------------
// Discovery errors
// ---------------------------------------------------------------------------

/// Errors related to file discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The root scan path does not exist or is not accessible.
    RootNotFound { path: PathBuf },

    /// The root path is not a directory.
    NotADirectory { path: PathBuf },

    /// Maximum file count exceeded during scan.
    MaxFilesExceeded { max: usize },

    /// Walkdir traversal error (wraps individual file/dir access failures).
    Traversal {
        path: PathBuf,
        source: walkdir::Error,
    },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Scan path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "Scan path '{}' is not a directory", path.display())
            }
            Self::MaxFilesExceeded { max } => {
                write!(
                    f,
                    "Discovery stopped: exceeded maximum of {max} files. \
                     Increase [discovery] max_files in config or narrow the scan path."
                )
            }
            Self::Traversal { path, source } => {
                write!(f, "Error traversing '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Traversal { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DiscoveryError> for ChapterSleuthError {
    fn from(e: DiscoveryError) -> Self {
        Self::Discovery(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to manifest and log export.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for ChapterSleuthError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Packaging errors
// ---------------------------------------------------------------------------

/// Errors related to EPUB assembly.
#[derive(Debug)]
pub enum PackageError {
    /// epub-builder rejected the document structure.
    Epub { path: PathBuf, reason: String },

    /// I/O error writing the package.
    Io { path: PathBuf, source: io::Error },

    /// Packaging invoked with no chapters.
    NoChapters { path: PathBuf },
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epub { path, reason } => {
                write!(f, "EPUB assembly failed for '{}': {reason}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Package I/O error '{}': {source}", path.display())
            }
            Self::NoChapters { path } => {
                write!(f, "Refusing to package '{}': no chapters", path.display())
            }
        }
    }
}

impl std::error::Error for PackageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PackageError> for ChapterSleuthError {
    fn from(e: PackageError) -> Self {
        Self::Package(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for ChapterSleuthError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for ChapterSleuth results.
pub type Result<T> = std::result::Result<T, ChapterSleuthError>;
