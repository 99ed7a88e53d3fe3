//! Logging Configuration and Initialization
//!
//! Centralized tracing setup for the arxiv-sync binaries:
//!
//! - Console output, text or JSON (JSON is what log aggregation expects)
//! - Optional daily-rotating file output next to the console
//! - Level and per-module filter directives from the environment
//!
//! Library code only emits events through `tracing` macros with structured
//! fields; run and chunk context travels in spans, never in globals:
//!
//! ```rust
//! use tracing::{info, info_span};
//!
//! let span = info_span!("chunk", key = "parsed_1719708664153/metadata-1000.json");
//! let _guard = span.enter();
//! info!(indexed = 998, failed = 2, "Chunk indexed");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use arxiv_sync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", s)),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON lines, one event per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Dependencies that are chatty at `info` and below
const QUIET_DIRECTIVES: [&str; 4] = [
    "aws_smithy_runtime=warn",
    "aws_config=warn",
    "hyper_util=warn",
    "reqwest=warn",
];

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Extra filter directives, e.g. "aws_smithy_runtime=debug,arxiv_sync::ingest=trace"
    pub filter_directives: Option<String>,
    /// When set, events are also written to a daily-rotating file in this directory
    pub log_dir: Option<PathBuf>,
    /// Log file name prefix ("arxiv-sync" -> "arxiv-sync.2024-06-30")
    pub log_file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::for_binary("arxiv-sync", false)
    }
}

impl LogConfig {
    /// Defaults for one binary; `verbose` lowers the level to debug
    pub fn for_binary(name: &str, verbose: bool) -> Self {
        Self {
            level: if verbose { LogLevel::Debug } else { LogLevel::Info },
            format: LogFormat::Text,
            filter_directives: None,
            log_dir: None,
            log_file_prefix: name.to_string(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// `LOG_LEVEL`, `LOG_FORMAT` (text|json), `LOG_FILTER`, `LOG_DIR` and
    /// `LOG_FILE_PREFIX`.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay environment variables on top of an existing configuration
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        self.filter_directives = std::env::var("LOG_FILTER").ok().or(self.filter_directives);
        self.log_dir = std::env::var("LOG_DIR").ok().map(PathBuf::from).or(self.log_dir);
        if let Ok(prefix) = std::env::var("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        Ok(self)
    }
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let user = config.filter_directives.as_deref().unwrap_or_default();
    let directives = QUIET_DIRECTIVES
        .iter()
        .copied()
        .chain(user.split(','))
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.to_tracing_level().into());
    // Later directives for the same target win, so user directives come last.
    for directive in directives {
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("Invalid log filter directive '{}'", directive))?,
        );
    }

    Ok(filter)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(ansi);

    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global tracing subscriber; call once at startup
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(config.format, std::io::stdout, true)];

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, &config.log_file_prefix));
        // Dropping the guard stops the writer thread.
        std::mem::forget(guard);

        layers.push(fmt_layer(config.format, writer, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(())
}
