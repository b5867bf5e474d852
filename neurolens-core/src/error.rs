use thiserror::Error;

#[derive(Error, Debug)]
pub enum NeurolensError {
    #[error("No baseline recorded for subject {subject}")]
    NoBaseline { subject: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Feature schema mismatch: expected version {expected}, found {found}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("Capability error: {0}")]
    Capability(#[from] crate::capability::CapabilityError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl NeurolensError {
    /// True for errors caused by the caller's request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NeurolensError::NoBaseline { .. } | NeurolensError::InvalidInput(_)
        )
    }
}
