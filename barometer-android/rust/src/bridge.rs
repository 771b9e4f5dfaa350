//! Java side of the barometer: sensor access and result delivery are
//! upcalls on the bridge object handed to `nativeInit`.
//!
//! Expected Java methods on the bridge:
//! - `int pressureSensorCount()`
//! - `String pressureSensorName()` (may return null)
//! - `void registerListener(int samplingPeriod)`
//! - `void unregisterListener()`
//! - `void deliverResult(String callbackId, String json)`
//!
//! `deliverResult` runs while the listener is locked and must only post
//! the result to the web view; it must not call back into native code.

use crate::error::{BarometerJniError, JResult};
use barometer_rs::{
    PluginResult, ResultChannel, SamplingRate, SensorDirectory, SensorHandle, SensorSubscription,
    SensorType,
};
use jni::objects::{GlobalRef, JObject, JString, JValue};
use jni::{JNIEnv, JavaVM};
use std::sync::Arc;

const VENDOR: &str = "android";

/// Global reference to the Java bridge object plus the VM to reach it
/// from any thread.
pub struct JavaBridge {
    vm: JavaVM,
    bridge: GlobalRef,
}

impl JavaBridge {
    pub fn new(env: &mut JNIEnv, bridge: &JObject) -> JResult<Self> {
        if bridge.is_null() {
            return Err(BarometerJniError::InvalidParameters(
                "bridge object is null".to_string(),
            ));
        }
        Ok(Self {
            vm: env.get_java_vm()?,
            bridge: env.new_global_ref(bridge)?,
        })
    }

    /// Run `call` against the bridge on the current thread, attaching it
    /// to the VM if needed. A Java exception raised by the upcall is
    /// logged and cleared.
    fn upcall<T>(
        &self,
        method: &str,
        call: impl FnOnce(&mut JNIEnv, &JObject) -> jni::errors::Result<T>,
    ) -> JResult<T> {
        let mut env = self.vm.attach_current_thread()?;
        let result = call(&mut *env, self.bridge.as_obj());
        if result.is_err() && env.exception_check().unwrap_or(false) {
            let _ = env.exception_describe();
            let _ = env.exception_clear();
        }
        result.map_err(|e| BarometerJniError::JniError(format!("{}: {}", method, e)))
    }

    fn pressure_sensor_count(&self) -> JResult<i32> {
        self.upcall("pressureSensorCount", |env, bridge| {
            env.call_method(bridge, "pressureSensorCount", "()I", &[])?.i()
        })
    }

    fn pressure_sensor_name(&self) -> JResult<Option<String>> {
        self.upcall("pressureSensorName", |env, bridge| {
            let name = env
                .call_method(bridge, "pressureSensorName", "()Ljava/lang/String;", &[])?
                .l()?;
            if name.is_null() {
                return Ok(None);
            }
            let name = JString::from(name);
            let name: String = env.get_string(&name)?.into();
            Ok(Some(name))
        })
    }

    fn register_listener(&self, rate: SamplingRate) -> JResult<()> {
        self.upcall("registerListener", |env, bridge| {
            env.call_method(bridge, "registerListener", "(I)V", &[JValue::Int(rate.raw())])?;
            Ok(())
        })
    }

    fn unregister_listener(&self) -> JResult<()> {
        self.upcall("unregisterListener", |env, bridge| {
            env.call_method(bridge, "unregisterListener", "()V", &[])?;
            Ok(())
        })
    }

    fn deliver_result(&self, callback_id: &str, json: &str) -> JResult<()> {
        self.upcall("deliverResult", |env, bridge| {
            let callback_id = env.new_string(callback_id)?;
            let json = env.new_string(json)?;
            env.call_method(
                bridge,
                "deliverResult",
                "(Ljava/lang/String;Ljava/lang/String;)V",
                &[JValue::Object(&callback_id), JValue::Object(&json)],
            )?;
            Ok(())
        })
    }
}

/// Pressure sensors as reported by the Java side. Android registers the
/// default sensor, so at most one handle is listed.
fn pressure_handles(count: i32, name: Option<String>) -> Vec<SensorHandle> {
    if count <= 0 {
        return Vec::new();
    }
    let name = name.unwrap_or_else(|| "Pressure Sensor".to_string());
    vec![SensorHandle::new(&name, VENDOR, SensorType::Pressure)]
}

/// `SensorManager` backed by Android's `SensorManager` through the bridge
pub struct JavaSensorManager {
    bridge: Arc<JavaBridge>,
}

impl JavaSensorManager {
    pub fn new(bridge: Arc<JavaBridge>) -> Self {
        Self { bridge }
    }
}

impl SensorDirectory for JavaSensorManager {
    fn list_sensors(&self, kind: SensorType) -> Vec<SensorHandle> {
        if kind != SensorType::Pressure {
            return Vec::new();
        }
        let count = match self.bridge.pressure_sensor_count() {
            Ok(count) => count,
            Err(e) => {
                log::error!("[bridge] {}", e);
                return Vec::new();
            }
        };
        let name = if count > 0 {
            self.bridge.pressure_sensor_name().unwrap_or_else(|e| {
                log::warn!("[bridge] {}", e);
                None
            })
        } else {
            None
        };
        log::debug!("[bridge] {} pressure sensor(s)", count);
        pressure_handles(count, name)
    }
}

impl SensorSubscription for JavaSensorManager {
    fn subscribe(&mut self, sensor: &SensorHandle, rate: SamplingRate) {
        log::debug!("[bridge] registering {} at {:?}", sensor.name, rate);
        if let Err(e) = self.bridge.register_listener(rate) {
            log::error!("[bridge] {}", e);
        }
    }

    fn unsubscribe(&mut self) {
        if let Err(e) = self.bridge.unregister_listener() {
            log::error!("[bridge] {}", e);
        }
    }
}

/// Result channel for one Java callback id
pub struct JavaResultChannel {
    bridge: Arc<JavaBridge>,
    callback_id: String,
}

impl JavaResultChannel {
    pub fn new(bridge: Arc<JavaBridge>, callback_id: String) -> Self {
        Self {
            bridge,
            callback_id,
        }
    }
}

impl ResultChannel for JavaResultChannel {
    fn deliver(&self, result: PluginResult) {
        let json = match result.to_json() {
            Ok(json) => json,
            Err(e) => {
                log::error!("[bridge] encoding result for {}: {}", self.callback_id, e);
                return;
            }
        };
        if let Err(e) = self.bridge.deliver_result(&self.callback_id, &json) {
            log::error!("[bridge] {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sensor_lists_nothing() {
        assert!(pressure_handles(0, None).is_empty());
        assert!(pressure_handles(-1, Some("BMP280".into())).is_empty());
    }

    #[test]
    fn test_default_sensor_listed_once() {
        let handles = pressure_handles(2, Some("BMP280 Pressure".into()));
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].name, "BMP280 Pressure");
        assert_eq!(handles[0].sensor_type, SensorType::Pressure);
    }

    #[test]
    fn test_unnamed_sensor_gets_placeholder() {
        let handles = pressure_handles(1, None);
        assert_eq!(handles[0].name, "Pressure Sensor");
        assert_eq!(handles[0].vendor, VENDOR);
    }
}
