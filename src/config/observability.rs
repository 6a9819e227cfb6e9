use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Diagnostics emitted by the client itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How client events (page fetches, cache hits and misses, cache failures)
/// are rendered when the client installs its own subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Lowest level emitted when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "default_timestamps")]
    pub timestamps: bool,

    /// Attach the source file and line to every event.
    #[serde(default)]
    pub file_line: bool,

    /// Extra directives appended to `level`, e.g.
    /// `identity_client::cache=trace` to follow cache decisions only.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            timestamps: default_timestamps(),
            file_line: false,
            filter: None,
        }
    }
}

fn default_timestamps() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Every cache hit and miss.
    Trace,
    /// Page fetches, cursor exhaustion and cache purges.
    Debug,
    #[default]
    Info,
    /// Cache store failures the client recovered from.
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, for interactive debugging.
    Pretty,
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}
