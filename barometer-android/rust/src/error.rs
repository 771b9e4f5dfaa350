use barometer_rs::BarometerError;
use jni::JNIEnv;
use thiserror::Error;

/// Barometer JNI error types
#[derive(Error, Debug)]
pub enum BarometerJniError {
    #[error("Barometer not initialized; call nativeInit first")]
    NotInitialized,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error(transparent)]
    Core(#[from] BarometerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<jni::errors::Error> for BarometerJniError {
    fn from(e: jni::errors::Error) -> Self {
        BarometerJniError::JniError(e.to_string())
    }
}

/// Result type for JNI operations
pub type JResult<T> = Result<T, BarometerJniError>;

/// Java exception class thrown for `error`
pub fn exception_class(error: &BarometerJniError) -> &'static str {
    match error {
        BarometerJniError::NotInitialized => "java/lang/IllegalStateException",
        BarometerJniError::InvalidParameters(_)
        | BarometerJniError::Core(BarometerError::InvalidConfig(_)) => {
            "java/lang/IllegalArgumentException"
        }
        BarometerJniError::Core(BarometerError::UnsupportedAction(_)) => {
            "java/lang/UnsupportedOperationException"
        }
        BarometerJniError::Core(BarometerError::Io(_)) => "java/io/IOException",
        BarometerJniError::JniError(_)
        | BarometerJniError::Internal(_)
        | BarometerJniError::Core(BarometerError::Internal(_)) => "java/lang/RuntimeException",
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &BarometerJniError) -> JResult<()> {
    log::error!("[jni] {}", error);

    // A pending exception from a failed upcall takes precedence
    if env.exception_check().unwrap_or(false) {
        return Ok(());
    }

    env.throw_new(exception_class(error), error.to_string())
        .map_err(|_| BarometerJniError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}
