mod cache;
mod observability;
mod query;

#[cfg(feature = "config-file")]
use std::path::Path;

pub use cache::*;
pub use observability::*;
pub use query::*;
use serde::{Deserialize, Serialize};

/// Client configuration.
///
/// Everything is optional; an empty document yields a client with no cache,
/// the default page size and compact `info` logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Query compilation settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Resource cache. Defaults to no caching.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    #[cfg(feature = "config-file")]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[cfg(feature = "config-file")]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: ClientConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.query.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[cfg(feature = "config-file")]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
#[cfg(feature = "config-file")]
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid expansion pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
