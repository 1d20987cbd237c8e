use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsolidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store failure fetching {statement} for {period}: {details}")]
    StoreFailure {
        statement: String,
        period: String,
        details: String,
    },

    #[error("Fetching {statement} for {period} timed out after {after_ms} ms")]
    Timeout {
        statement: String,
        period: String,
        after_ms: u64,
    },

    #[error("Consolidation cancelled before completion")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConsolidationError {
    /// HTTP-equivalent status for the request handler: 400 for caller mistakes, 500 otherwise.
    pub fn status_code(&self) -> u16 {
        match self {
            ConsolidationError::InvalidInput(_) => 400,
            _ => 500,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ConsolidationError::InvalidInput(_))
    }

    pub(crate) fn invalid(details: impl Into<String>) -> Self {
        ConsolidationError::InvalidInput(details.into())
    }
}

pub type Result<T> = std::result::Result<T, ConsolidationError>;
