//! Logging setup shared by the CLI and tests.
//!
//! `LogConfig::from_env` reads `IPA_LOG_LEVEL`, `IPA_LOG_FORMAT` and
//! `IPA_LOG_FILE`; `RUST_LOG` still wins when set.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::env::parse_log_level_string;
use crate::errors::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "human" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("cannot open log file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global logger is already installed")]
    AlreadyInitialized,
}

impl LoggingError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InternalLoggingError
    }
}

/// How and where to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Write to stderr instead of stdout (keeps stdout for command output).
    pub stderr: bool,
    /// Optional JSON log file, written through a non-blocking appender.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(level: &str) -> Self {
        Self {
            level: level.to_string(),
            format: LogFormat::Pretty,
            stderr: false,
            file: None,
        }
    }

    /// Build from `IPA_LOG_*` variables; unparseable values fall back to defaults.
    pub fn from_env(default_level: &str) -> Self {
        let mut config = Self::new(default_level);
        if let Some(level) = std::env::var("IPA_LOG_LEVEL")
            .ok()
            .as_deref()
            .and_then(parse_log_level_string)
        {
            config.level = level.to_string();
        }
        if let Some(format) = std::env::var("IPA_LOG_FORMAT")
            .ok()
            .and_then(|f| f.parse().ok())
        {
            config.format = format;
        }
        config.file = std::env::var_os("IPA_LOG_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        config
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directive = format!("warn,ipa_common={0},ipactl={0}", self.level);
        EnvFilter::try_new(&directive).map_err(|e| LoggingError::Filter {
            filter: directive,
            message: e.to_string(),
        })
    }
}

/// Keeps background log writers alive; drop it last.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console: BoxedLayer = match (config.format, config.stderr) {
        (LogFormat::Pretty, true) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        (LogFormat::Pretty, false) => tracing_subscriber::fmt::layer().with_target(false).boxed(),
        (LogFormat::Json, true) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Json, false) => tracing_subscriber::fmt::layer().json().boxed(),
    };
    layers.push(console);

    if let Some(path) = &config.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LoggingError::File {
                path: path.clone(),
                source,
            })?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.filter()?)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LoggingGuards { _guards: guards })
}
