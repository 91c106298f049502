//! Bootstrap configuration loading
//!
//! Settings come from a TOML file whose location is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`FRAMEXFER_CONFIG`)
//! 3. Platform config directory (`<config_dir>/framexfer/config.toml`), if present
//! 4. Built-in defaults (no file)
//!
//! Every field has a built-in default, so a partial file is valid.

use crate::types::{DrainMode, FeedMode, FlipMethod, FrameGeometry, MemoryDomain, PixelFormat};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FRAMEXFER_CONFIG";

/// Benchmark settings loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchSettings {
    /// Number of trials in the series
    #[serde(default = "default_trials")]
    pub trials: u32,

    /// Buffers per trial (N)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,

    #[serde(default = "default_memory_domain")]
    pub memory_domain: MemoryDomain,

    #[serde(default = "default_drain_mode")]
    pub drain_mode: DrainMode,

    /// Chunk size for chunked feeding; absent means single-burst
    #[serde(default)]
    pub chunk_size: Option<usize>,

    #[serde(default = "default_flip_method")]
    pub flip_method: FlipMethod,

    /// Copy completed frames and check the smoke pattern
    #[serde(default = "default_true")]
    pub verify_output: bool,

    /// Print the `Max:` report line
    #[serde(default = "default_true")]
    pub report_max: bool,

    /// Surfaces in the device pool (device-pooled only); defaults to batch size
    #[serde(default)]
    pub pool_surfaces: Option<usize>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_trials() -> u32 {
    10
}

fn default_batch_size() -> usize {
    30
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_pixel_format() -> PixelFormat {
    PixelFormat::Rgba
}

fn default_memory_domain() -> MemoryDomain {
    MemoryDomain::Host
}

fn default_drain_mode() -> DrainMode {
    DrainMode::Notify
}

fn default_flip_method() -> FlipMethod {
    FlipMethod::Horizontal
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            batch_size: default_batch_size(),
            width: default_width(),
            height: default_height(),
            pixel_format: default_pixel_format(),
            memory_domain: default_memory_domain(),
            drain_mode: default_drain_mode(),
            chunk_size: None,
            flip_method: default_flip_method(),
            verify_output: true,
            report_max: true,
            pool_surfaces: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl BenchSettings {
    /// Load settings from a resolved config path, or defaults when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No config file, using built-in defaults");
            return Ok(Self::default());
        };

        info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Frame geometry described by these settings
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height, self.pixel_format)
    }

    /// Feed mode derived from `chunk_size`
    pub fn feed_mode(&self) -> FeedMode {
        match self.chunk_size {
            Some(chunk_size) => FeedMode::Chunked { chunk_size },
            None => FeedMode::SingleBurst,
        }
    }

    /// Device pool capacity (device-pooled only)
    pub fn pool_capacity(&self) -> usize {
        self.pool_surfaces.unwrap_or(self.batch_size)
    }

    /// Reject settings that cannot produce a valid series
    pub fn validate(&self) -> Result<()> {
        if self.trials < 2 {
            return Err(Error::Config(format!(
                "trials must be at least 2 for a sample standard deviation (got {})",
                self.trials
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "frame dimensions must be non-zero (got {}x{})",
                self.width, self.height
            )));
        }
        if self.geometry().frame_len().is_none() {
            return Err(Error::Config(format!(
                "frame size overflows: {}",
                self.geometry()
            )));
        }
        if let Some(chunk_size) = self.chunk_size {
            if chunk_size == 0 {
                return Err(Error::Config("chunk_size must be at least 1".to_string()));
            }
        }
        if self.memory_domain == MemoryDomain::DevicePooled && self.pool_capacity() < self.batch_size {
            return Err(Error::Config(format!(
                "pool_surfaces ({}) smaller than batch_size ({})",
                self.pool_capacity(),
                self.batch_size
            )));
        }
        Ok(())
    }
}

/// Resolve the config file path following the priority order above
///
/// Returns `Ok(None)` when no file is named and none exists at the platform
/// location. An explicitly named file that does not exist is an error.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_exists(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return require_exists(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    if let Some(path) = default_config_path() {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // Priority 4: Built-in defaults
    Ok(None)
}

/// Platform config file location (`~/.config/framexfer/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("framexfer").join("config.toml"))
}

fn require_exists(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}
