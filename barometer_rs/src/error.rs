use thiserror::Error;

/// Barometer error types
///
/// Start failures are not errors in this sense: they are reported to the
/// caller as `PluginResult::Error` deliveries on the result channel.
#[derive(Error, Debug)]
pub enum BarometerError {
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for barometer operations
pub type BResult<T> = Result<T, BarometerError>;

impl BarometerError {
    pub(crate) fn lock_poisoned(what: &str) -> Self {
        BarometerError::Internal(format!("Failed to acquire {} lock", what))
    }
}
