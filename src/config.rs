#![forbid(unsafe_code)]

//! Engine tuning knobs and their TOML loader.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime configuration shared by every stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Capacity of the bounded queue between two stages.
    pub buffer_size: usize,
    /// Lookups grouped into one backend request.
    pub lookup_batch_size: usize,
    /// Idle time after which a partial lookup batch is flushed.
    pub lookup_batch_timeout: Duration,
    /// Travelers buffered before an aggregation batch is indexed.
    pub aggregation_batch_size: usize,
    /// Capacity of the result queue handed to callers.
    pub result_buffer: usize,
    /// Collects per-stage counters for every pipeline.
    pub profile: bool,
    /// Loads full properties for marked elements even when no later
    /// statement reads them.
    pub store_marks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl EngineConfig {
    /// Default settings.
    pub fn balanced() -> Self {
        Self {
            buffer_size: 100,
            lookup_batch_size: 100,
            lookup_batch_timeout: Duration::from_millis(5),
            aggregation_batch_size: 100,
            result_buffer: 1000,
            profile: false,
            store_marks: false,
        }
    }

    /// Small batches flushed quickly, for interactive point queries.
    pub fn low_latency() -> Self {
        Self {
            buffer_size: 16,
            lookup_batch_size: 16,
            lookup_batch_timeout: Duration::from_millis(1),
            aggregation_batch_size: 32,
            result_buffer: 100,
            ..Self::balanced()
        }
    }

    /// Large batches for full scans and aggregations.
    pub fn throughput() -> Self {
        Self {
            buffer_size: 1000,
            lookup_batch_size: 1000,
            lookup_batch_timeout: Duration::from_millis(20),
            aggregation_batch_size: 1000,
            result_buffer: 10_000,
            ..Self::balanced()
        }
    }

    /// Parses the `[engine]` table of a TOML document. Missing keys keep the
    /// `balanced` defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })?;
        raw.engine.unwrap_or_default().into_config()
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawFile = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        raw.engine.unwrap_or_default().into_config()
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawFile {
    engine: Option<RawEngine>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawEngine {
    preset: Option<String>,
    buffer_size: Option<usize>,
    lookup_batch_size: Option<usize>,
    lookup_batch_timeout_ms: Option<u64>,
    aggregation_batch_size: Option<usize>,
    result_buffer: Option<usize>,
    profile: Option<bool>,
    store_marks: Option<bool>,
}

impl RawEngine {
    fn into_config(self) -> Result<EngineConfig, ConfigError> {
        let mut cfg = match self.preset.as_deref() {
            None | Some("balanced") => EngineConfig::balanced(),
            Some("low_latency") => EngineConfig::low_latency(),
            Some("throughput") => EngineConfig::throughput(),
            Some(other) => {
                return Err(ConfigError::UnknownPreset {
                    name: other.to_string(),
                })
            }
        };
        if let Some(v) = self.buffer_size {
            cfg.buffer_size = positive("buffer_size", v)?;
        }
        if let Some(v) = self.lookup_batch_size {
            cfg.lookup_batch_size = positive("lookup_batch_size", v)?;
        }
        if let Some(ms) = self.lookup_batch_timeout_ms {
            cfg.lookup_batch_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = self.aggregation_batch_size {
            cfg.aggregation_batch_size = positive("aggregation_batch_size", v)?;
        }
        if let Some(v) = self.result_buffer {
            cfg.result_buffer = positive("result_buffer", v)?;
        }
        if let Some(v) = self.profile {
            cfg.profile = v;
        }
        if let Some(v) = self.store_marks {
            cfg.store_marks = v;
        }
        Ok(cfg)
    }
}

fn positive(key: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero",
        })
    } else {
        Ok(value)
    }
}

/// Failures while loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read engine config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The TOML document was malformed.
    #[error("failed to parse engine config{}: {source}", describe_path(.path))]
    Parse {
        /// File that failed, absent for in-memory documents.
        path: Option<PathBuf>,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A preset name was not recognized.
    #[error("unknown engine preset '{name}'")]
    UnknownPreset {
        /// Offending preset.
        name: String,
    },
    /// A key held an unusable value.
    #[error("engine config key '{key}' {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}
