use crate::bridge::{JavaBridge, JavaResultChannel, JavaSensorManager};
use crate::error::{throw_java_exception, BarometerJniError, JResult};
use barometer_rs::{
    BarometerListener, BarometerPlugin, CallbackHandle, ListenerConfig, SensorAccuracy,
    SensorSample, SensorType, TokioTimer,
};
use jni::objects::{JClass, JObject, JString};
use jni::sys::{jboolean, jfloat, jint, jlong, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use std::sync::{Arc, Mutex};
use tokio::runtime::{Builder, Handle, Runtime};

/// Plugin instance bound to one Java bridge
struct NativeBarometer {
    bridge: Arc<JavaBridge>,
    plugin: BarometerPlugin,
}

// Global state - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_BAROMETER: Arc<Mutex<Option<Arc<NativeBarometer>>>> = Arc::new(Mutex::new(None));
    static ref TIMER_RUNTIME: Mutex<Option<Runtime>> = Mutex::new(None);
}

/// Runtime driving start timeouts, created on first use and kept for the
/// life of the process
fn timer_runtime() -> JResult<Handle> {
    let mut runtime = TIMER_RUNTIME.lock().map_err(|_| {
        BarometerJniError::Internal("Failed to acquire timer runtime lock".to_string())
    })?;
    if let Some(runtime) = runtime.as_ref() {
        return Ok(runtime.handle().clone());
    }
    let built = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("barometer-timer")
        .enable_time()
        .build()
        .map_err(|e| BarometerJniError::Internal(format!("Failed to start timer runtime: {}", e)))?;
    let handle = built.handle().clone();
    *runtime = Some(built);
    Ok(handle)
}

fn lock_global() -> JResult<std::sync::MutexGuard<'static, Option<Arc<NativeBarometer>>>> {
    GLOBAL_BAROMETER.lock().map_err(|_| {
        BarometerJniError::Internal("Failed to acquire global barometer lock".to_string())
    })
}

/// Get the current barometer
fn get_barometer() -> JResult<Arc<NativeBarometer>> {
    lock_global()?
        .as_ref()
        .map(Arc::clone)
        .ok_or(BarometerJniError::NotInitialized)
}

fn java_string(env: &mut JNIEnv, value: &JString, what: &str) -> JResult<String> {
    if value.is_null() {
        return Err(BarometerJniError::InvalidParameters(format!(
            "{} is null",
            what
        )));
    }
    Ok(env.get_string(value)?.into())
}

fn parse_config(json: Option<String>) -> JResult<ListenerConfig> {
    match json {
        Some(json) => Ok(ListenerConfig::from_json(&json)?),
        None => Ok(ListenerConfig::default()),
    }
}

/// JNI: Bind the barometer to a Java bridge object
/// Parameters: bridge (see `bridge` module), configJson (nullable)
#[no_mangle]
pub extern "C" fn Java_org_dartlang_phonegap_barometer_BarometerNative_nativeInit(
    mut env: JNIEnv,
    _class: JClass,
    bridge: JObject,
    config_json: JString,
) {
    if let Err(e) = init_impl(&mut env, &bridge, &config_json) {
        let _ = throw_java_exception(&mut env, &e);
    }
}

fn init_impl(env: &mut JNIEnv, bridge: &JObject, config_json: &JString) -> JResult<()> {
    crate::init_logging();

    let config_json = if config_json.is_null() {
        None
    } else {
        Some(java_string(env, config_json, "configJson")?)
    };
    let config = parse_config(config_json)?;
    let bridge = Arc::new(JavaBridge::new(env, bridge)?);

    let listener = BarometerListener::new(
        Box::new(JavaSensorManager::new(Arc::clone(&bridge))),
        Box::new(TokioTimer::new(timer_runtime()?)),
        config,
    );
    let barometer = Arc::new(NativeBarometer {
        bridge,
        plugin: BarometerPlugin::new(listener),
    });

    let previous = lock_global()?.replace(barometer);
    if let Some(previous) = previous {
        log::warn!("[jni] Re-initialized; stopping previous barometer");
        previous.plugin.on_destroy()?;
    }

    log::info!("[jni] Barometer initialized");
    Ok(())
}

/// JNI: Run a plugin action
/// Returns: true if the action exists, false otherwise (or on error, with a Java exception)
#[no_mangle]
pub extern "C" fn Java_org_dartlang_phonegap_barometer_BarometerNative_nativeExecute(
    mut env: JNIEnv,
    _class: JClass,
    action: JString,
    callback_id: JString,
) -> jboolean {
    match execute_impl(&mut env, &action, &callback_id) {
        Ok(true) => JNI_TRUE,
        Ok(false) => JNI_FALSE,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            JNI_FALSE
        }
    }
}

fn execute_impl(env: &mut JNIEnv, action: &JString, callback_id: &JString) -> JResult<bool> {
    let action = java_string(env, action, "action")?;
    let callback_id = java_string(env, callback_id, "callbackId")?;
    let barometer = get_barometer()?;

    let channel = JavaResultChannel::new(Arc::clone(&barometer.bridge), callback_id);
    let callback = CallbackHandle::new(Arc::new(channel));
    log::debug!("[jni] execute {} ({})", action, callback.id());

    Ok(barometer.plugin.execute(&action, callback)?)
}

/// JNI: Sensor event from `SensorEventListener.onSensorChanged`
/// Parameters: Android sensor type, first value (hPa), capture time (ms since epoch)
#[no_mangle]
pub extern "C" fn Java_org_dartlang_phonegap_barometer_BarometerNative_nativeOnSensorChanged(
    mut env: JNIEnv,
    _class: JClass,
    sensor_type: jint,
    value: jfloat,
    timestamp_ms: jlong,
) {
    if let Err(e) = on_sensor_changed_impl(sensor_type, value, timestamp_ms) {
        let _ = throw_java_exception(&mut env, &e);
    }
}

fn on_sensor_changed_impl(sensor_type: i32, value: f32, timestamp_ms: i64) -> JResult<()> {
    let barometer = get_barometer()?;
    let sample = SensorSample::new(SensorType::from_raw(sensor_type), vec![value], timestamp_ms);
    barometer.plugin.listener().on_sensor_sample(&sample)?;
    Ok(())
}

/// JNI: `SensorEventListener.onAccuracyChanged`
#[no_mangle]
pub extern "C" fn Java_org_dartlang_phonegap_barometer_BarometerNative_nativeOnAccuracyChanged(
    mut env: JNIEnv,
    _class: JClass,
    sensor_type: jint,
    accuracy: jint,
) {
    if let Err(e) = on_accuracy_changed_impl(sensor_type, accuracy) {
        let _ = throw_java_exception(&mut env, &e);
    }
}

fn on_accuracy_changed_impl(sensor_type: i32, accuracy: i32) -> JResult<()> {
    let barometer = get_barometer()?;
    barometer
        .plugin
        .listener()
        .on_accuracy_changed(SensorType::from_raw(sensor_type), SensorAccuracy::from_raw(accuracy))?;
    Ok(())
}

/// JNI: Hosting web view reset
#[no_mangle]
pub extern "C" fn Java_org_dartlang_phonegap_barometer_BarometerNative_nativeOnReset(
    mut env: JNIEnv,
    _class: JClass,
) {
    if let Err(e) = on_reset_impl() {
        let _ = throw_java_exception(&mut env, &e);
    }
}

fn on_reset_impl() -> JResult<()> {
    get_barometer()?.plugin.on_reset()?;
    Ok(())
}

/// JNI: Plugin destroyed. Stops listening and releases the bridge.
/// Safe to call when not initialized.
#[no_mangle]
pub extern "C" fn Java_org_dartlang_phonegap_barometer_BarometerNative_nativeOnDestroy(
    mut env: JNIEnv,
    _class: JClass,
) {
    if let Err(e) = on_destroy_impl() {
        let _ = throw_java_exception(&mut env, &e);
    }
}

fn on_destroy_impl() -> JResult<()> {
    let barometer = lock_global()?.take();
    if let Some(barometer) = barometer {
        barometer.plugin.on_destroy()?;
        log::info!("[jni] Barometer destroyed");
    }
    Ok(())
}

/// JNI: Current listener status
/// Returns: 0 stopped, 1 starting, 2 running, 3 failed to start; -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_org_dartlang_phonegap_barometer_BarometerNative_nativeGetStatus(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_status_impl() {
        Ok(code) => code,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn get_status_impl() -> JResult<i32> {
    Ok(get_barometer()?.plugin.listener().status()?.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use barometer_rs::BarometerError;

    #[test]
    fn test_missing_config_uses_defaults() {
        let config = parse_config(None).unwrap();
        assert_eq!(config.start_timeout_ms, 2000);
        assert_eq!(config.min_accuracy, SensorAccuracy::Medium);
    }

    #[test]
    fn test_config_json_is_applied() {
        let config = parse_config(Some(r#"{"start_timeout_ms": 500}"#.to_string())).unwrap();
        assert_eq!(config.start_timeout_ms, 500);
    }

    #[test]
    fn test_bad_config_is_invalid_argument() {
        let err = parse_config(Some(r#"{"start_timeout_ms": 0}"#.to_string())).unwrap_err();
        assert!(matches!(
            err,
            BarometerJniError::Core(BarometerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_timer_runtime_is_created_once() {
        timer_runtime().unwrap();
        timer_runtime().unwrap();
        assert!(TIMER_RUNTIME.lock().unwrap().is_some());
    }

    #[test]
    fn test_calls_before_init_report_not_initialized() {
        assert!(matches!(
            get_status_impl(),
            Err(BarometerJniError::NotInitialized)
        ));
        assert!(on_destroy_impl().is_ok());
    }
}
