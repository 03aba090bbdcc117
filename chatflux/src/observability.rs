//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. Binaries call [`init_tracing`] once and
//! keep the returned guard alive so buffered lines are flushed on exit.
//!
//! ```rust,ignore
//! let _guard = chatflux::observability::init_tracing(&TracingConfig::from_env()?)?;
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use chatflux_core::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line, including the current span.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Stdout,
    /// Daily rolling files named `{file_prefix}.YYYY-MM-DD` under `directory`.
    DailyFile {
        directory: PathBuf,
        file_prefix: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    pub filter: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
            output: LogOutput::default(),
        }
    }
}

impl TracingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn with_daily_file(mut self, directory: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        self.output = LogOutput::DailyFile {
            directory: directory.into(),
            file_prefix: file_prefix.into(),
        };
        self
    }

    /// Read `CHATFLUX_LOG`, `CHATFLUX_LOG_FORMAT` (`pretty`, `json`) and
    /// `CHATFLUX_LOG_DIR` on top of the defaults.
    pub fn from_env() -> Result<Self, LlmError> {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var("CHATFLUX_LOG") {
            config.filter = filter;
        }
        if let Ok(format) = std::env::var("CHATFLUX_LOG_FORMAT") {
            config.format = parse_format(&format)?;
        }
        if let Ok(directory) = std::env::var("CHATFLUX_LOG_DIR") {
            config = config.with_daily_file(directory, "chatflux.log");
        }
        Ok(config)
    }
}

pub fn parse_format(value: &str) -> Result<LogFormat, LlmError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(LlmError::ConfigurationError(format!(
            "invalid log format `{other}`, expected pretty or json"
        ))),
    }
}

/// Install the global subscriber described by `config`.
///
/// A subscriber installed earlier (by the host or a test harness) is left in place.
pub fn init_tracing(config: &TracingConfig) -> Result<WorkerGuard, LlmError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            LlmError::ConfigurationError(format!("invalid log filter `{}`: {e}", config.filter))
        })?,
    };

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::DailyFile {
            directory,
            file_prefix,
        } => tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, file_prefix)),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .with_ansi(config.output == LogOutput::Stdout);
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };

    match result {
        Ok(()) => Ok(guard),
        Err(e) if e.to_string().contains("already been set") => {
            tracing::debug!("tracing subscriber already installed");
            Ok(guard)
        }
        Err(e) => Err(LlmError::ConfigurationError(format!(
            "failed to initialize tracing: {e}"
        ))),
    }
}
