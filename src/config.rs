use crate::error::{ConsolidationError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Upper bound on store calls in flight across all requests served by this processor.
    pub max_concurrent_fetches: usize,

    /// Per-fetch timeout in milliseconds. `0` disables it.
    pub fetch_timeout_ms: u64,

    /// Optional deadline for a whole consolidation, in milliseconds.
    pub request_deadline_ms: Option<u64>,

    /// Serve repeated `(statement, month)` fetches within one request from memory.
    pub cache_fetches: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            fetch_timeout_ms: 30_000,
            request_deadline_ms: None,
            cache_fetches: true,
        }
    }
}

impl ConsolidationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(ConsolidationError::InvalidConfig(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }

    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_ms.map(Duration::from_millis)
    }
}
