//! Logging setup for Periscope
//!
//! Console (stderr) and file layers over one registry; `RUST_LOG` overrides
//! the configured level.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// The `[logging]` table of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log to stderr
    #[serde(default = "default_true")]
    pub console_enabled: bool,

    /// Append to `file_path`
    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "default_log_path")]
    pub file_path: String,

    /// Console timestamps; file lines always carry one
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include file/line info
    #[serde(default)]
    pub file_info: bool,

    /// Include the `periscope::*` target
    #[serde(default = "default_true")]
    pub show_target: bool,

    #[serde(default = "default_true")]
    pub ansi_colors: bool,

    /// trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "periscope.log".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: default_log_path(),
            timestamps: true,
            file_info: false,
            show_target: true,
            ansi_colors: true,
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// Debug level with file/line info, keeping the configured outputs
    pub fn verbose(mut self) -> Self {
        self.level = "debug".to_string();
        self.file_info = true;
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    /// Configured level, `INFO` when unrecognized
    pub fn get_level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn console_layer(&self) -> BoxedLayer {
        let layer = fmt::layer()
            .with_ansi(self.ansi_colors)
            .with_target(self.show_target)
            .with_file(self.file_info)
            .with_line_number(self.file_info)
            .with_writer(std::io::stderr);
        if self.timestamps {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }

    fn file_layer(&self) -> Result<BoxedLayer> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| Error::Config(format!("log file {}: {}", self.file_path, e)))?;
        Ok(fmt::layer()
            .with_ansi(false)
            .with_target(self.show_target)
            .with_file(self.file_info)
            .with_line_number(self.file_info)
            .with_writer(Mutex::new(file))
            .boxed())
    }

    fn layers(&self) -> Result<Vec<BoxedLayer>> {
        let mut layers = Vec::with_capacity(2);
        if self.console_enabled {
            layers.push(self.console_layer());
        }
        if self.file_enabled && !self.file_path.is_empty() {
            layers.push(self.file_layer()?);
        }
        Ok(layers)
    }
}

/// Install the global subscriber described by `config`
///
/// Fails only when the log file cannot be opened. Once a subscriber is
/// installed later calls are no-ops.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let layers = config.layers()?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.get_level()).into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
    Ok(())
}
