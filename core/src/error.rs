use thiserror::Error;

/// Kraken guard error types
#[derive(Error, Debug)]
pub enum KrakenError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Memory sampling failed
    #[error("Memory probe error: {0}")]
    MemoryProbeError(String),

    /// Internal failure inside a hook body
    #[error("Hook error: {hook} - {message}")]
    HookError { hook: String, message: String },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl KrakenError {
    /// Build a hook error tagged with the hook name
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        KrakenError::HookError {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for KrakenError {
    fn from(err: serde_json::Error) -> Self {
        KrakenError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for KrakenError {
    fn from(err: serde_yaml::Error) -> Self {
        KrakenError::SerializationError(err.to_string())
    }
}

/// Result type alias for Kraken guard operations
pub type Result<T> = std::result::Result<T, KrakenError>;
