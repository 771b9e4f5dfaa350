use crate::config::ListenerConfig;
use crate::error::{BResult, BarometerError};
use crate::result::{
    CallbackHandle, CallbackId, ErrorPayload, PluginResult, PressureReading, MSG_NO_SENSOR,
    MSG_START_TIMEOUT,
};
use crate::sensor::{SensorAccuracy, SensorManager, SensorSample, SensorType};
use crate::timer::{TimerHandle, TimerService};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Listener lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Not subscribed, nothing pending
    Stopped,
    /// Subscribed, waiting for the first sample; start timer armed
    Starting,
    /// Subscribed and receiving samples
    Running,
    /// Last start attempt failed; a new `start` retries
    ErrorFailedToStart,
}

impl Status {
    /// Numeric code, shared with the failure code on the wire
    pub fn code(&self) -> i32 {
        match self {
            Status::Stopped => 0,
            Status::Starting => 1,
            Status::Running => 2,
            Status::ErrorFailedToStart => 3,
        }
    }

    /// Whether the listener owns an active sensor subscription in this state
    pub fn holds_subscription(&self) -> bool {
        matches!(self, Status::Starting | Status::Running)
    }
}

/// Point-in-time view of the listener
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerSnapshot {
    pub status: Status,
    pub last_reading: Option<PressureReading>,
    pub accuracy: SensorAccuracy,
    pub timer_armed: bool,
    pub pending_callback: Option<CallbackId>,
}

struct ArmedTimer {
    handle: TimerHandle,
    generation: u64,
}

/// The listener's mutable record. Only reachable through the mutex in
/// [`BarometerListener`].
struct ListenerState {
    status: Status,
    last_reading: Option<PressureReading>,
    accuracy: SensorAccuracy,
    pending: Option<CallbackHandle>,
    armed: Option<ArmedTimer>,
    generation: u64,
    sensors: Box<dyn SensorManager>,
    timer: Box<dyn TimerService>,
    config: ListenerConfig,
    this: Weak<Mutex<ListenerState>>,
}

impl ListenerState {
    fn new(
        sensors: Box<dyn SensorManager>,
        timer: Box<dyn TimerService>,
        config: ListenerConfig,
        this: Weak<Mutex<ListenerState>>,
    ) -> Self {
        ListenerState {
            status: Status::Stopped,
            last_reading: None,
            accuracy: SensorAccuracy::Unreliable,
            pending: None,
            armed: None,
            generation: 0,
            sensors,
            timer,
            config,
            this,
        }
    }

    fn start(&mut self, callback: CallbackHandle) -> Status {
        let ack = callback.clone();
        let incoming = callback.id();
        if let Some(previous) = self.pending.replace(callback) {
            if previous.id() != incoming {
                log::warn!(
                    "Pending callback {} replaced by {}; it will receive no further results",
                    previous.id(),
                    incoming
                );
            }
        }

        match self.status {
            Status::Starting | Status::Running => {
                log::debug!("start() while {:?}, results now go to {}", self.status, incoming);
            }
            Status::Stopped | Status::ErrorFailedToStart => self.subscribe_and_arm(),
        }

        ack.deliver(PluginResult::NoResult);
        self.status
    }

    /// Stopped/ErrorFailedToStart → Starting, or → ErrorFailedToStart when
    /// the platform has no pressure sensor.
    fn subscribe_and_arm(&mut self) {
        let Some(sensor) = self
            .sensors
            .list_sensors(SensorType::Pressure)
            .into_iter()
            .next()
        else {
            log::warn!("No pressure sensor available");
            self.status = Status::ErrorFailedToStart;
            self.fail(MSG_NO_SENSOR);
            return;
        };

        self.sensors.subscribe(&sensor, self.config.sampling_rate);
        self.status = Status::Starting;
        self.disarm_timer();
        self.arm_timer();
        log::info!(
            "Subscribed to {} ({}), waiting up to {} ms for first sample",
            sensor.name,
            sensor.vendor,
            self.config.start_timeout_ms
        );
    }

    fn arm_timer(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let this = self.this.clone();
        let handle = self.timer.schedule(
            self.config.start_timeout(),
            Box::new(move || {
                let Some(shared) = this.upgrade() else {
                    return;
                };
                match shared.lock() {
                    Ok(mut state) => state.on_timeout(generation),
                    Err(_) => log::error!("Listener lock poisoned, start timeout dropped"),
                };
            }),
        );
        self.armed = Some(ArmedTimer { handle, generation });
    }

    fn disarm_timer(&mut self) {
        if let Some(armed) = self.armed.take() {
            self.timer.cancel(armed.handle);
        }
    }

    fn stop(&mut self) {
        self.disarm_timer();
        if self.status.holds_subscription() {
            self.sensors.unsubscribe();
        }
        if let Some(abandoned) = self.pending.take() {
            log::debug!("{} released by stop without a result", abandoned.id());
        }
        if self.status != Status::Stopped {
            log::info!("Barometer stopped (was {:?})", self.status);
        }
        self.status = Status::Stopped;
        self.accuracy = SensorAccuracy::Unreliable;
    }

    fn on_sensor_sample(&mut self, sample: &SensorSample) {
        if sample.sensor_type != SensorType::Pressure {
            return;
        }
        if !self.status.holds_subscription() {
            log::debug!("Sample ignored while {:?}", self.status);
            return;
        }

        if self.status == Status::Starting {
            self.disarm_timer();
            log::info!("First pressure sample received, barometer running");
        }
        self.status = Status::Running;

        if self.accuracy < self.config.min_accuracy {
            log::debug!(
                "Sample filtered: accuracy {} below {}",
                self.accuracy,
                self.config.min_accuracy
            );
            return;
        }
        let Some(&value) = sample.values.first() else {
            log::debug!("Sample without values ignored");
            return;
        };

        let reading = PressureReading::new(value, sample.capture_time_ms);
        self.last_reading = Some(reading);
        match &self.pending {
            Some(callback) => callback.deliver(PluginResult::Ok(reading)),
            None => log::debug!("Reading recorded with no pending callback"),
        }
    }

    fn on_accuracy_changed(&mut self, sensor_type: SensorType, accuracy: SensorAccuracy) {
        if sensor_type != SensorType::Pressure || !self.status.holds_subscription() {
            return;
        }
        if accuracy != self.accuracy {
            log::debug!("Accuracy {} -> {}", self.accuracy, accuracy);
        }
        self.accuracy = accuracy;
    }

    /// Timer entry point. Cancellation can lose the race with firing, so
    /// both the arming generation and the status are re-checked here.
    fn on_timeout(&mut self, generation: u64) {
        let current = self.armed.as_ref().map(|armed| armed.generation);
        if current != Some(generation) || self.status != Status::Starting {
            log::debug!(
                "Stale start timer {} ignored (status {:?})",
                generation,
                self.status
            );
            return;
        }

        self.armed = None;
        self.sensors.unsubscribe();
        self.status = Status::ErrorFailedToStart;
        log::warn!(
            "No pressure sample within {} ms, start failed",
            self.config.start_timeout_ms
        );
        self.fail(MSG_START_TIMEOUT);
    }

    /// Deliver the terminal failure for the current start attempt
    fn fail(&mut self, message: &str) {
        match self.pending.take() {
            Some(callback) => {
                callback.deliver(PluginResult::Error(ErrorPayload::failed_to_start(message)))
            }
            None => log::warn!("Start failure with no pending callback: {}", message),
        }
    }

    fn snapshot(&self) -> ListenerSnapshot {
        ListenerSnapshot {
            status: self.status,
            last_reading: self.last_reading,
            accuracy: self.accuracy,
            timer_armed: self.armed.is_some(),
            pending_callback: self.pending.as_ref().map(CallbackHandle::id),
        }
    }
}

impl Drop for ListenerState {
    fn drop(&mut self) {
        self.disarm_timer();
        if self.status.holds_subscription() {
            self.sensors.unsubscribe();
        }
    }
}

/// Barometric pressure listener.
///
/// Cloneable handle around one mutex-guarded state machine. Every entry
/// point, including the start timer, goes through that mutex, so no two
/// operations ever interleave. Nothing here blocks on the sensor.
#[derive(Clone)]
pub struct BarometerListener {
    state: Arc<Mutex<ListenerState>>,
}

impl BarometerListener {
    pub fn new(
        sensors: Box<dyn SensorManager>,
        timer: Box<dyn TimerService>,
        config: ListenerConfig,
    ) -> Self {
        let state = Arc::new_cyclic(|this| {
            Mutex::new(ListenerState::new(sensors, timer, config, this.clone()))
        });
        BarometerListener { state }
    }

    fn lock(&self) -> BResult<MutexGuard<'_, ListenerState>> {
        self.state
            .lock()
            .map_err(|_| BarometerError::lock_poisoned("listener"))
    }

    /// Accept a start request. `callback` becomes the delivery target and
    /// always receives a `NoResult` acknowledgement; a missing sensor is
    /// reported on it as a failure before the acknowledgement.
    pub fn start(&self, callback: CallbackHandle) -> BResult<Status> {
        Ok(self.lock()?.start(callback))
    }

    /// Stop listening. Idempotent. A pending request is released without
    /// any delivery.
    pub fn stop(&self) -> BResult<()> {
        self.lock()?.stop();
        Ok(())
    }

    pub fn on_sensor_sample(&self, sample: &SensorSample) -> BResult<()> {
        self.lock()?.on_sensor_sample(sample);
        Ok(())
    }

    pub fn on_accuracy_changed(
        &self,
        sensor_type: SensorType,
        accuracy: SensorAccuracy,
    ) -> BResult<()> {
        self.lock()?.on_accuracy_changed(sensor_type, accuracy);
        Ok(())
    }

    /// Hosting view reset or navigated away
    pub fn on_host_reset(&self) -> BResult<()> {
        let mut state = self.lock()?;
        if state.status == Status::Running {
            state.stop();
        }
        Ok(())
    }

    pub fn on_destroy(&self) -> BResult<()> {
        self.lock()?.stop();
        Ok(())
    }

    pub fn status(&self) -> BResult<Status> {
        Ok(self.lock()?.status)
    }

    pub fn last_reading(&self) -> BResult<Option<PressureReading>> {
        Ok(self.lock()?.last_reading)
    }

    pub fn snapshot(&self) -> BResult<ListenerSnapshot> {
        Ok(self.lock()?.snapshot())
    }
}
