use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::query::DEFAULT_PAGE_MAX;

/// Query compilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Largest `limit` sent with a single collection request.
    #[serde(default = "default_page_max")]
    pub page_max: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_max: default_page_max(),
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_max == 0 {
            return Err(ConfigError::Validation(
                "query.page_max must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_page_max() -> u64 {
    DEFAULT_PAGE_MAX
}
