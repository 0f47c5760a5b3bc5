// ChapterSleuth - platform/config.rs
//
// Platform path resolution (XDG / AppData / Library via the `directories`
// crate) and TOML configuration loading with range validation. The
// observed-corpus thresholds the engine depends on are deliberately
// configuration here, not hard-coded policy.

use crate::core::discovery::DiscoveryConfig;
use crate::core::runner::RunnerConfig;
use crate::core::splitter::SplitConfig;
use crate::oracle::client::OracleConfig;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The three directories the driver writes into, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/chaptersleuth/).
    pub config_dir: PathBuf,

    /// Data directory: processed-file index, reports.
    pub data_dir: PathBuf,

    /// Cache directory: oracle response cache.
    pub cache_dir: PathBuf,
}

impl PlatformPaths {
    /// Where ChapterSleuth keeps its files, following each OS's directory
    /// convention. Hosts with no such convention (stripped-down containers,
    /// odd HOME setups) get everything under the working directory instead.
    pub fn resolve() -> Self {
        let dirs = ProjectDirs::from("", "", constants::APP_ID);
        let (config_dir, data_dir, cache_root) = match &dirs {
            Some(d) => (
                d.config_dir().to_path_buf(),
                d.data_dir().to_path_buf(),
                d.cache_dir().to_path_buf(),
            ),
            None => {
                let cwd = PathBuf::from(".");
                (cwd.clone(), cwd.clone(), cwd)
            }
        };

        let paths = Self {
            config_dir,
            data_dir,
            cache_dir: cache_root.join(constants::CACHE_DIR_NAME),
        };
        tracing::debug!(
            layout = if dirs.is_some() { "platform" } else { "working-directory" },
            config = %paths.config_dir.display(),
            data = %paths.data_dir.display(),
            cache = %paths.cache_dir.display(),
            "Directory layout selected"
        );
        paths
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// TOML configuration
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub logging: LoggingSection,
    pub segmentation: SegmentationSection,
    pub oracle: OracleSection,
    pub discovery: DiscoverySection,
    pub package: PackageSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Log level when RUST_LOG and --debug are absent.
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationSection {
    /// Close-duplicate threshold in bytes (observed corpus constant).
    pub close_duplicate_gap_bytes: usize,
    /// Stagnation tolerance on refinement counts (observed corpus constant).
    pub stagnation_tolerance: usize,
    /// Gap-refinement iteration cap.
    pub max_refine_iterations: u32,
    /// Whole-run wall-clock budget in seconds.
    pub wall_clock_budget_secs: u64,
}

impl Default for SegmentationSection {
    fn default() -> Self {
        Self {
            close_duplicate_gap_bytes: constants::MIN_PAIR_GAP_BYTES,
            stagnation_tolerance: constants::STAGNATION_TOLERANCE,
            max_refine_iterations: constants::MAX_REFINE_ITERATIONS,
            wall_clock_budget_secs: constants::DEFAULT_RUN_BUDGET_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleSection {
    pub api_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key, if any.
    pub api_key_env: Option<String>,
    pub requests_per_minute: u32,
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    /// Enable the on-disk response cache.
    pub cache: bool,
}

impl Default for OracleSection {
    fn default() -> Self {
        let base = OracleConfig::default();
        Self {
            api_url: base.api_url,
            model: base.model,
            api_key_env: None,
            requests_per_minute: base.requests_per_minute,
            concurrency: base.concurrency,
            request_timeout_secs: base.timeout_secs,
            max_attempts: base.max_attempts,
            cache: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoverySection {
    pub max_depth: usize,
    pub max_files: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let base = DiscoveryConfig::default();
        Self {
            max_depth: base.max_depth,
            max_files: base.max_files,
            include: base.include_patterns,
            exclude: base.exclude_patterns,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageSection {
    /// Author written into EPUB metadata when the filename gives none.
    pub author: Option<String>,
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let range = |field: &str, value: u64, min: u64, max: u64| {
            if value < min || value > max {
                Err(ConfigError::ValueOutOfRange {
                    field: field.to_string(),
                    value: value.to_string(),
                    expected: format!("{min}..={max}"),
                })
            } else {
                Ok(())
            }
        };
        range(
            "oracle.requests_per_minute",
            self.oracle.requests_per_minute as u64,
            1,
            10_000,
        )?;
        range("oracle.concurrency", self.oracle.concurrency as u64, 1, 64)?;
        range(
            "oracle.request_timeout_secs",
            self.oracle.request_timeout_secs,
            1,
            600,
        )?;
        range("oracle.max_attempts", self.oracle.max_attempts as u64, 1, 10)?;
        range(
            "segmentation.wall_clock_budget_secs",
            self.segmentation.wall_clock_budget_secs,
            1,
            24 * 3600,
        )?;
        range(
            "segmentation.max_refine_iterations",
            self.segmentation.max_refine_iterations as u64,
            1,
            50,
        )?;
        range(
            "discovery.max_files",
            self.discovery.max_files as u64,
            1,
            constants::ABSOLUTE_MAX_FILES as u64,
        )?;
        range(
            "discovery.max_depth",
            self.discovery.max_depth as u64,
            1,
            constants::ABSOLUTE_MAX_DEPTH as u64,
        )?;
        Ok(())
    }

    /// Runner configuration derived from the [segmentation] section.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            stagnation_tolerance: self.segmentation.stagnation_tolerance,
            max_refine_iterations: self.segmentation.max_refine_iterations,
            rejection_threshold: constants::REJECTION_THRESHOLD,
            wall_clock_budget: Duration::from_secs(self.segmentation.wall_clock_budget_secs),
            split: SplitConfig {
                close_duplicate_gap: self.segmentation.close_duplicate_gap_bytes,
                ..SplitConfig::default()
            },
        }
    }

    /// Oracle client configuration, resolving the API key from the
    /// configured environment variable. The key value itself never appears
    /// in config files or logs.
    pub fn oracle_config(&self) -> OracleConfig {
        let api_key = self
            .oracle
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty());
        OracleConfig {
            api_url: self.oracle.api_url.clone(),
            model: self.oracle.model.clone(),
            api_key,
            timeout_secs: self.oracle.request_timeout_secs,
            requests_per_minute: self.oracle.requests_per_minute,
            concurrency: self.oracle.concurrency,
            max_attempts: self.oracle.max_attempts,
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            max_depth: self.discovery.max_depth,
            max_files: self.discovery.max_files,
            include_patterns: self.discovery.include.clone(),
            exclude_patterns: self.discovery.exclude.clone(),
        }
    }
}
