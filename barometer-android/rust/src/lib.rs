// Barometer Android JNI Library
// Exposes the Rust barometer listener to the Cordova plugin via JNI

pub mod android_jni;
pub mod bridge;
pub mod error;

pub use error::{BarometerJniError, JResult};

static LOGGING: std::sync::Once = std::sync::Once::new();

/// Route `log` records to logcat. No-op off Android.
pub(crate) fn init_logging() {
    LOGGING.call_once(|| {
        // Fails only if another logger was installed first
        #[cfg(target_os = "android")]
        let _ = android_log::init("Barometer");
    });
}
