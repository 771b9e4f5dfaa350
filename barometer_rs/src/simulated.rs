//! Simulated pressure sensor platform, used by the demo binary and tests

use crate::listener::BarometerListener;
use crate::sensor::{
    SamplingRate, SensorAccuracy, SensorDirectory, SensorHandle, SensorSample, SensorSubscription,
    SensorType,
};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{interval, Duration};

#[derive(Default)]
struct SimulatedState {
    sensors: Vec<SensorHandle>,
    subscription: Option<(SensorHandle, SamplingRate)>,
    /// Bumped on every subscribe so the feeder knows to re-report accuracy
    epoch: u64,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
}

/// In-memory sensor manager. Clones share state, so a test can keep one
/// clone and give another to the listener.
#[derive(Clone, Default)]
pub struct SimulatedSensorManager {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedSensorManager {
    pub fn with_barometer() -> Self {
        let manager = Self::default();
        manager.add_sensor(SensorHandle::new(
            "Simulated Barometer",
            "barometer_rs",
            SensorType::Pressure,
        ));
        manager
    }

    pub fn without_barometer() -> Self {
        let manager = Self::default();
        manager.add_sensor(SensorHandle::new(
            "Simulated Accelerometer",
            "barometer_rs",
            SensorType::Other(1),
        ));
        manager
    }

    pub fn add_sensor(&self, sensor: SensorHandle) {
        self.lock().sensors.push(sensor);
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().subscription.is_some()
    }

    pub fn subscribed_rate(&self) -> Option<SamplingRate> {
        self.lock().subscription.as_ref().map(|(_, rate)| *rate)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.lock().unsubscribe_calls
    }

    fn epoch(&self) -> Option<u64> {
        let state = self.lock();
        state.subscription.is_some().then_some(state.epoch)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SensorDirectory for SimulatedSensorManager {
    fn list_sensors(&self, kind: SensorType) -> Vec<SensorHandle> {
        self.lock()
            .sensors
            .iter()
            .filter(|sensor| sensor.sensor_type == kind)
            .cloned()
            .collect()
    }
}

impl SensorSubscription for SimulatedSensorManager {
    fn subscribe(&mut self, sensor: &SensorHandle, rate: SamplingRate) {
        let mut state = self.lock();
        state.subscription = Some((sensor.clone(), rate));
        state.epoch += 1;
        state.subscribe_calls += 1;
    }

    fn unsubscribe(&mut self) {
        let mut state = self.lock();
        state.subscription = None;
        state.unsubscribe_calls += 1;
    }
}

/// Feed mock pressure samples into `listener` while the simulated sensor
/// is subscribed. Accuracy is reported once per subscription, before the
/// first sample, the way Android reports it on registration.
pub async fn pressure_loop(
    listener: BarometerListener,
    sensors: SimulatedSensorManager,
    period: Duration,
    accuracy: SensorAccuracy,
) {
    let mut interval = interval(period);
    let mut reported_epoch = None;
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        let Some(epoch) = sensors.epoch() else {
            continue;
        };

        if reported_epoch != Some(epoch) {
            if let Err(e) = listener.on_accuracy_changed(SensorType::Pressure, accuracy) {
                log::error!("[pressure] {}", e);
                break;
            }
            reported_epoch = Some(epoch);
        }

        if let Err(e) = listener.on_sensor_sample(&mock_pressure_sample()) {
            log::error!("[pressure] {}", e);
            break;
        }

        sample_count += 1;
        if sample_count % 50 == 0 {
            log::debug!("[pressure] {} samples", sample_count);
        }
    }
}

fn mock_pressure_sample() -> SensorSample {
    use std::f64::consts::PI;
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let t = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed) as f64 * 0.05;

    // Slow drift around standard sea-level pressure, in hPa
    let hpa = 1013.25 + (t * 0.1 * PI).sin() * 1.5 + (t * 2.0 * PI).sin() * 0.05;
    SensorSample::pressure(hpa as f32, Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::listener::Status;
    use crate::result::{crossbeam_callback, PluginResult};
    use crate::timer::TokioTimer;

    #[test]
    fn test_directory_filters_by_kind() {
        let manager = SimulatedSensorManager::with_barometer();
        assert_eq!(manager.list_sensors(SensorType::Pressure).len(), 1);
        assert!(manager.list_sensors(SensorType::Other(1)).is_empty());

        let none = SimulatedSensorManager::without_barometer();
        assert!(none.list_sensors(SensorType::Pressure).is_empty());
    }

    #[test]
    fn test_subscription_bookkeeping() {
        let mut manager = SimulatedSensorManager::with_barometer();
        let sensor = manager.list_sensors(SensorType::Pressure).remove(0);

        manager.subscribe(&sensor, SamplingRate::Game);
        assert!(manager.is_subscribed());
        assert_eq!(manager.subscribed_rate(), Some(SamplingRate::Game));

        manager.unsubscribe();
        assert!(!manager.is_subscribed());
        assert_eq!(manager.subscribe_calls(), 1);
        assert_eq!(manager.unsubscribe_calls(), 1);
    }

    #[test]
    fn test_mock_sample_is_near_sea_level() {
        let sample = mock_pressure_sample();
        assert_eq!(sample.sensor_type, SensorType::Pressure);
        assert!((sample.values[0] - 1013.25).abs() < 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pressure_loop_drives_listener_to_running() {
        let sensors = SimulatedSensorManager::with_barometer();
        let listener = BarometerListener::new(
            Box::new(sensors.clone()),
            Box::new(TokioTimer::current().unwrap()),
            ListenerConfig::default(),
        );
        let feeder = tokio::spawn(pressure_loop(
            listener.clone(),
            sensors.clone(),
            Duration::from_millis(200),
            SensorAccuracy::High,
        ));

        let (cb, rx) = crossbeam_callback();
        listener.start(cb).unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;

        assert_eq!(listener.status().unwrap(), Status::Running);
        let readings = rx
            .try_iter()
            .filter(|r| matches!(r, PluginResult::Ok(_)))
            .count();
        assert!(readings >= 3, "expected several readings, got {}", readings);

        listener.stop().unwrap();
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_accuracy_feed_never_delivers() {
        let sensors = SimulatedSensorManager::with_barometer();
        let listener = BarometerListener::new(
            Box::new(sensors.clone()),
            Box::new(TokioTimer::current().unwrap()),
            ListenerConfig::default(),
        );
        let feeder = tokio::spawn(pressure_loop(
            listener.clone(),
            sensors.clone(),
            Duration::from_millis(200),
            SensorAccuracy::Low,
        ));

        let (cb, rx) = crossbeam_callback();
        listener.start(cb).unwrap();
        tokio::time::sleep(Duration::from_millis(3000)).await;

        // Samples arrived, so the start did not time out, but none passed the filter
        assert_eq!(listener.status().unwrap(), Status::Running);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![PluginResult::NoResult]);
        feeder.abort();
    }
}
