// ChapterSleuth - util/logging.rs
//
// Structured logging on tracing/tracing-subscriber. The effective filter
// is resolved from, in order: the RUST_LOG environment variable, the CLI
// --debug flag, the [logging] level in config.toml, and finally the
// built-in default. Output goes to stderr; file content never appears in
// events beyond bounded previews, and API keys never appear at all.

use tracing_subscriber::EnvFilter;

/// Initialise the logging subsystem once, at startup.
///
/// The first directive source that yields a value wins; RUST_LOG is
/// honoured even when --debug or a config level is also present.
pub fn init(debug_flag: bool, config_level: Option<&str>) {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| debug_flag.then(|| "debug".to_string()))
        .or_else(|| config_level.map(str::to_string))
        .unwrap_or_else(|| super::constants::DEFAULT_LOG_LEVEL.to_string());

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::new(&directive))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        filter = %directive,
        "Logging initialised"
    );
}

/// Truncate a source line for safe inclusion in debug output.
pub fn preview(line: &str) -> &str {
    let max = super::constants::DEBUG_MAX_LINE_PREVIEW;
    match line.char_indices().nth(max) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
