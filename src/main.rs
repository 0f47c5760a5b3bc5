// ChapterSleuth - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. Logging initialisation (debug mode support)
// 3. Configuration and platform path resolution
// 4. Oracle construction (HTTP client, shared limiter, optional cache)
// 5. Subcommand dispatch: split, batch, detect

use chaptersleuth::app::batch::{self, FileOutcome, ProcessOptions};
use chaptersleuth::core::encoding;
use chaptersleuth::core::runner::CancelFlag;
use chaptersleuth::oracle::cache::{CachedOracle, ResponseCache};
use chaptersleuth::oracle::client::HttpOracle;
use chaptersleuth::oracle::Oracle;
use chaptersleuth::platform::config::{AppConfig, PlatformPaths};
use chaptersleuth::platform::fs;
use chaptersleuth::util::error::OracleError;
use chaptersleuth::util::{constants, logging};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// ChapterSleuth - deterministic chapter segmentation for serialized novel
/// files, with an LLM-assisted recovery ladder and EPUB packaging.
#[derive(Parser, Debug)]
#[command(name = "chaptersleuth", version, about)]
struct Cli {
    /// Path to an alternate config.toml.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a single novel file and package it.
    Split {
        /// The novel text file.
        file: PathBuf,

        /// Expected chapter count (overrides the filename).
        #[arg(short = 'e', long = "expected")]
        expected: Option<usize>,

        /// Output directory (default: alongside the input).
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,

        /// Skip EPUB generation.
        #[arg(long = "no-epub")]
        no_epub: bool,

        /// Skip manifest/log report export.
        #[arg(long = "no-reports")]
        no_reports: bool,
    },

    /// Discover and segment every novel file under a directory.
    Batch {
        /// Root directory to scan.
        dir: PathBuf,

        /// Output directory (default: <dir>/chaptersleuth-out).
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },

    /// Probe a file's encoding and print the detection result.
    Detect {
        /// The file to probe.
        file: PathBuf,
    },
}

/// The concrete oracle the CLI wires up: the HTTP client, optionally
/// behind the on-disk response cache.
enum AppOracle {
    Cached(CachedOracle<HttpOracle>),
    Plain(HttpOracle),
}

impl Oracle for AppOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        match self {
            AppOracle::Cached(oracle) => oracle.complete(prompt).await,
            AppOracle::Plain(oracle) => oracle.complete(prompt).await,
        }
    }
}

fn build_oracle(config: &AppConfig, paths: &PlatformPaths) -> Result<AppOracle, OracleError> {
    let oracle_config = config.oracle_config();
    let model = oracle_config.model.clone();
    let client = HttpOracle::new(oracle_config)?;

    if config.oracle.cache {
        match ResponseCache::open(paths.cache_dir.clone(), model) {
            Ok(cache) => return Ok(AppOracle::Cached(CachedOracle::new(client, cache))),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot open oracle cache; running uncached");
            }
        }
    }
    Ok(AppOracle::Plain(client))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = PlatformPaths::resolve();
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(cli.debug, config.logging.level.as_deref());
    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "ChapterSleuth starting"
    );

    let cancel = CancelFlag::new();
    {
        // Ctrl-C requests cooperative cancellation; the runner observes the
        // flag before its next oracle call or file read.
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received; cancelling");
                cancel.cancel();
            }
        });
    }

    match run(cli, config, paths, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cli: Cli,
    config: AppConfig,
    paths: PlatformPaths,
    cancel: CancelFlag,
) -> Result<(), String> {
    match cli.command {
        Command::Split {
            file,
            expected,
            out,
            no_epub,
            no_reports,
        } => {
            let out_dir = out
                .or_else(|| file.parent().map(|p| p.to_path_buf()))
                .unwrap_or_else(|| PathBuf::from("."));
            let options = ProcessOptions {
                out_dir,
                make_epub: !no_epub,
                export_reports: !no_reports,
            };
            let oracle = build_oracle(&config, &paths).map_err(|e| e.to_string())?;

            let outcome =
                batch::process_file(&file, expected, &oracle, &config, &options, None, &cancel)
                    .await
                    .map_err(|e| e.to_string())?;
            match outcome {
                FileOutcome::Done { report, .. } => {
                    println!(
                        "{}: {} chapters{}",
                        report.title,
                        report.chapters,
                        report
                            .epub_path
                            .map(|p| format!(" -> {}", p.display()))
                            .unwrap_or_default()
                    );
                    Ok(())
                }
                FileOutcome::Skipped { reason } => {
                    println!("Skipped: {reason}");
                    Ok(())
                }
                FileOutcome::Failed { kind, reason } => {
                    Err(format!("segmentation failed ({kind}): {reason}"))
                }
            }
        }

        Command::Batch { dir, out } => {
            let out_dir = out.unwrap_or_else(|| dir.join("chaptersleuth-out"));
            let options = ProcessOptions {
                out_dir,
                make_epub: true,
                export_reports: true,
            };
            let oracle = build_oracle(&config, &paths).map_err(|e| e.to_string())?;

            let summary = batch::run_batch(&dir, &oracle, &config, &paths, &options, &cancel)
                .await
                .map_err(|e| e.to_string())?;
            println!(
                "Discovered {}, processed {}, skipped {}, failed {}",
                summary.discovered, summary.processed, summary.skipped, summary.failed
            );
            for warning in &summary.warnings {
                eprintln!("Warning: {warning}");
            }
            if summary.failed > 0 {
                Err(format!("{} file(s) failed", summary.failed))
            } else {
                Ok(())
            }
        }

        Command::Detect { file } => {
            let guess = fs::with_file_bytes(&file, |bytes| encoding::detect(bytes))
                .map_err(|e| format!("cannot read '{}': {e}", file.display()))?;
            println!(
                "{}: {} (confidence {:.2})",
                file.display(),
                guess.encoding.name(),
                guess.confidence
            );
            Ok(())
        }
    }
}
