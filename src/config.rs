//! Engine tuning knobs and the optional TOML configuration file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration options supplied when creating engine sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    /// Quiet period before a filter-session write is flushed.
    pub persist_debounce: Duration,
    /// Maximum number of entries kept in the dynamic value cache.
    pub value_cache_capacity: usize,
    /// Relative dataset size drift tolerated before the static index is ignored.
    pub static_index_drift: f64,
    /// Rows scanned per static-index scheduling turn.
    pub static_index_chunk_rows: usize,
    /// Itinerary hydration attempts before falling back to manual refresh.
    pub visits_max_attempts: u32,
    /// Delay before the first hydration retry.
    pub visits_base_delay: Duration,
    /// Upper bound for the hydration retry delay.
    pub visits_max_delay: Duration,
    /// Page size for suggestion and candidate lists.
    pub option_page_size: usize,
    /// Number of depth tables retained per chain session.
    pub depth_cache_capacity: usize,
    /// Initial side-by-side setting for new chain sessions.
    pub allow_side_by_side_default: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            persist_debounce: Duration::from_millis(400),
            value_cache_capacity: 120,
            static_index_drift: 0.05,
            static_index_chunk_rows: 512,
            visits_max_attempts: 8,
            visits_base_delay: Duration::from_millis(250),
            visits_max_delay: Duration::from_secs(4),
            option_page_size: 50,
            depth_cache_capacity: 32,
            allow_side_by_side_default: false,
        }
    }
}

impl EngineOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the persistence debounce window.
    pub fn persist_debounce(mut self, window: Duration) -> Self {
        self.persist_debounce = window;
        self
    }

    /// Sets the dynamic value cache capacity.
    pub fn value_cache_capacity(mut self, entries: usize) -> Self {
        self.value_cache_capacity = entries;
        self
    }

    /// Sets the tolerated static-index drift ratio.
    pub fn static_index_drift(mut self, ratio: f64) -> Self {
        self.static_index_drift = ratio;
        self
    }

    /// Sets the rows scanned per static-index turn.
    pub fn static_index_chunk_rows(mut self, rows: usize) -> Self {
        self.static_index_chunk_rows = rows;
        self
    }

    /// Sets the itinerary hydration retry budget.
    pub fn visits_retry(mut self, max_attempts: u32, base: Duration, max: Duration) -> Self {
        self.visits_max_attempts = max_attempts;
        self.visits_base_delay = base;
        self.visits_max_delay = max;
        self
    }

    /// Sets the option list page size.
    pub fn option_page_size(mut self, size: usize) -> Self {
        self.option_page_size = size;
        self
    }

    /// Sets the number of depth tables kept per chain session.
    pub fn depth_cache_capacity(mut self, entries: usize) -> Self {
        self.depth_cache_capacity = entries;
        self
    }

    /// Sets the initial side-by-side setting.
    pub fn allow_side_by_side_default(mut self, allow: bool) -> Self {
        self.allow_side_by_side_default = allow;
        self
    }

    fn apply(mut self, raw: &RawEngineSection) -> Result<Self, ConfigError> {
        if let Some(ms) = raw.persist_debounce_ms {
            self.persist_debounce = Duration::from_millis(ms);
        }
        if let Some(entries) = raw.value_cache_capacity {
            if entries == 0 {
                return Err(ConfigError::Invalid {
                    key: "value_cache_capacity",
                    reason: "must be at least 1".into(),
                });
            }
            self.value_cache_capacity = entries;
        }
        if let Some(ratio) = raw.static_index_drift {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(ConfigError::Invalid {
                    key: "static_index_drift",
                    reason: format!("{ratio} is not a non-negative ratio"),
                });
            }
            self.static_index_drift = ratio;
        }
        if let Some(rows) = raw.static_index_chunk_rows {
            self.static_index_chunk_rows = rows.max(1);
        }
        if let Some(attempts) = raw.visits_max_attempts {
            self.visits_max_attempts = attempts;
        }
        if let Some(ms) = raw.visits_base_delay_ms {
            self.visits_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.visits_max_delay_ms {
            self.visits_max_delay = Duration::from_millis(ms);
        }
        if let Some(size) = raw.option_page_size {
            self.option_page_size = size.max(1);
        }
        if let Some(entries) = raw.depth_cache_capacity {
            self.depth_cache_capacity = entries.max(1);
        }
        if let Some(allow) = raw.allow_side_by_side {
            self.allow_side_by_side_default = allow;
        }
        Ok(self)
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    path: Option<PathBuf>,
    /// Options after applying the file on top of the defaults.
    pub options: EngineOptions,
    /// Profile used when none is given on the command line.
    pub default_profile: Option<String>,
}

impl EngineConfig {
    /// Loads `explicit` or the default config path. A missing file yields defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let raw = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        let options = EngineOptions::default().apply(&raw.engine)?;
        Ok(Self {
            path,
            options,
            default_profile: raw.default_profile,
        })
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Ok(Self {
            path: None,
            options: EngineOptions::default().apply(&raw.engine)?,
            default_profile: raw.default_profile,
        })
    }

    /// Path the configuration was resolved from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    engine: RawEngineSection,
    #[serde(default)]
    default_profile: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawEngineSection {
    persist_debounce_ms: Option<u64>,
    value_cache_capacity: Option<usize>,
    static_index_drift: Option<f64>,
    static_index_chunk_rows: Option<usize>,
    visits_max_attempts: Option<u32>,
    visits_base_delay_ms: Option<u64>,
    visits_max_delay_ms: Option<u64>,
    option_page_size: Option<usize>,
    depth_cache_capacity: Option<usize>,
    allow_side_by_side: Option<bool>,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("config value '{key}' is invalid: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Explanation.
        reason: String,
    },
}

/// Default configuration file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("berth").join("engine.toml"))
}
