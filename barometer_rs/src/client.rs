//! Application-side facade over the plugin.
//!
//! Any number of one-shot requests and periodic watches share a single
//! native start. The native listener is started when the first consumer
//! registers and stopped once the last one is gone.

use crate::error::{BResult, BarometerError};
use crate::plugin::BarometerPlugin;
use crate::result::{CallbackHandle, ErrorPayload, PluginResult, PressureReading};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant};

/// Watch period when none is given
pub const DEFAULT_WATCH_FREQUENCY: Duration = Duration::from_millis(10_000);

pub type OnPressure = Arc<dyn Fn(PressureReading) + Send + Sync>;
pub type OnError = Arc<dyn Fn(ErrorPayload) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

enum Consumer {
    OneShot {
        on_success: OnPressure,
        on_error: Option<OnError>,
    },
    Watch {
        watch: WatchId,
        on_error: Option<OnError>,
    },
}

#[derive(Default)]
struct ClientState {
    running: bool,
    last: Option<PressureReading>,
    consumers: Vec<Consumer>,
    watches: HashMap<WatchId, AbortHandle>,
    next_watch: u64,
}

struct Shared {
    plugin: BarometerPlugin,
    state: Mutex<ClientState>,
    results: UnboundedSender<PluginResult>,
}

impl Shared {
    fn lock(&self) -> BResult<MutexGuard<'_, ClientState>> {
        self.state
            .lock()
            .map_err(|_| BarometerError::lock_poisoned("client"))
    }

    fn callback(&self) -> CallbackHandle {
        CallbackHandle::new(Arc::new(self.results.clone()))
    }

    /// Start the native listener unless it already runs. Called with the
    /// client lock held, so the decision and the command cannot interleave
    /// with another consumer's. Results only go to the channel, never back
    /// into the client.
    fn start_if_idle(&self, state: &mut ClientState) -> BResult<()> {
        if !state.running {
            state.running = true;
            self.plugin.execute("start", self.callback())?;
        }
        Ok(())
    }

    /// Stop the native listener once no consumer is left. Client lock held.
    fn stop_if_unused(&self, state: &mut ClientState) -> BResult<()> {
        if state.consumers.is_empty() && state.running {
            state.running = false;
            self.plugin.execute("stop", self.callback())?;
        }
        Ok(())
    }

    fn handle(&self, result: PluginResult) -> BResult<()> {
        match result {
            PluginResult::NoResult => Ok(()),
            PluginResult::Ok(reading) => {
                let notify = {
                    let mut state = self.lock()?;
                    state.last = Some(reading);
                    let mut notify = Vec::new();
                    state.consumers.retain(|consumer| match consumer {
                        Consumer::OneShot { on_success, .. } => {
                            notify.push(Arc::clone(on_success));
                            false
                        }
                        Consumer::Watch { .. } => true,
                    });
                    notify
                };
                // Callbacks may register new consumers; the listener keeps
                // running meanwhile and the stop is decided afterwards.
                for on_success in notify {
                    on_success(reading);
                }
                let mut state = self.lock()?;
                self.stop_if_unused(&mut state)
            }
            PluginResult::Error(payload) => {
                // Every consumer hears about the failure and is dropped.
                // The failed listener is stopped before anyone is told, so
                // a request made from an error callback starts afresh.
                let notify: Vec<OnError> = {
                    let mut state = self.lock()?;
                    let notify = state
                        .consumers
                        .drain(..)
                        .filter_map(|consumer| match consumer {
                            Consumer::OneShot { on_error, .. } => on_error,
                            Consumer::Watch { on_error, .. } => on_error,
                        })
                        .collect();
                    self.stop_if_unused(&mut state)?;
                    notify
                };
                for on_error in notify {
                    on_error(payload.clone());
                }
                Ok(())
            }
        }
    }
}

async fn dispatch(shared: Arc<Shared>, mut results: UnboundedReceiver<PluginResult>) {
    while let Some(result) = results.recv().await {
        if let Err(e) = shared.handle(result) {
            log::error!("[client] {}", e);
        }
    }
}

/// Multiplexes pressure consumers over one [`BarometerPlugin`]
pub struct BarometerClient {
    shared: Arc<Shared>,
    runtime: Handle,
    dispatcher: AbortHandle,
}

impl BarometerClient {
    pub fn new(plugin: BarometerPlugin, runtime: Handle) -> Self {
        let (results, rx) = unbounded_channel();
        let shared = Arc::new(Shared {
            plugin,
            state: Mutex::new(ClientState::default()),
            results,
        });
        let dispatcher = runtime.spawn(dispatch(Arc::clone(&shared), rx)).abort_handle();
        Self {
            shared,
            runtime,
            dispatcher,
        }
    }

    /// Client on the runtime the caller is running in
    pub fn current(plugin: BarometerPlugin) -> BResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| BarometerError::Internal(format!("No tokio runtime: {}", e)))?;
        Ok(Self::new(plugin, runtime))
    }

    /// Last reading seen by this client, if any
    pub fn last_pressure(&self) -> BResult<Option<PressureReading>> {
        Ok(self.shared.lock()?.last)
    }

    pub fn is_running(&self) -> BResult<bool> {
        Ok(self.shared.lock()?.running)
    }

    /// Request the next reading. `on_success` or `on_error` fires at most once.
    pub fn get_current_pressure(
        &self,
        on_success: impl Fn(PressureReading) + Send + Sync + 'static,
        on_error: Option<OnError>,
    ) -> BResult<()> {
        let mut state = self.shared.lock()?;
        state.consumers.push(Consumer::OneShot {
            on_success: Arc::new(on_success),
            on_error,
        });
        self.shared.start_if_idle(&mut state)
    }

    /// Report the last known reading every `frequency` until cleared.
    ///
    /// If the listener is already running with a known reading, `on_success`
    /// also fires right away. A start failure reaches `on_error` and ends
    /// the watch's registration; the returned id must still be cleared.
    pub fn watch_pressure(
        &self,
        on_success: impl Fn(PressureReading) + Send + Sync + 'static,
        on_error: Option<OnError>,
        frequency: Option<Duration>,
    ) -> BResult<WatchId> {
        let frequency = frequency.unwrap_or(DEFAULT_WATCH_FREQUENCY);
        let on_success: OnPressure = Arc::new(on_success);

        let (watch, immediate) = {
            let mut state = self.shared.lock()?;
            state.next_watch += 1;
            let watch = WatchId(state.next_watch);
            state.consumers.push(Consumer::Watch { watch, on_error });

            let ticker = self.runtime.spawn(watch_loop(
                Arc::downgrade(&self.shared),
                Arc::clone(&on_success),
                frequency,
            ));
            state.watches.insert(watch, ticker.abort_handle());

            let immediate = if state.running { state.last } else { None };
            self.shared.start_if_idle(&mut state)?;
            (watch, immediate)
        };

        if let Some(reading) = immediate {
            on_success(reading);
        }
        log::debug!("[client] watch {:?} every {:?}", watch, frequency);
        Ok(watch)
    }

    /// Stop a watch. Unknown ids are ignored.
    pub fn clear_watch(&self, watch: WatchId) -> BResult<()> {
        let mut state = self.shared.lock()?;
        let Some(ticker) = state.watches.remove(&watch) else {
            return Ok(());
        };
        ticker.abort();
        state
            .consumers
            .retain(|consumer| !matches!(consumer, Consumer::Watch { watch: w, .. } if *w == watch));
        self.shared.stop_if_unused(&mut state)
    }
}

impl Drop for BarometerClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
        if let Ok(mut state) = self.shared.state.lock() {
            for (_, ticker) in state.watches.drain() {
                ticker.abort();
            }
        }
    }
}

async fn watch_loop(shared: std::sync::Weak<Shared>, on_success: OnPressure, frequency: Duration) {
    let mut ticks = interval_at(Instant::now() + frequency, frequency);
    loop {
        ticks.tick().await;
        let Some(client) = shared.upgrade() else {
            break;
        };
        let last = match client.lock() {
            Ok(state) => state.last,
            Err(e) => {
                log::error!("[client] {}", e);
                break;
            }
        };
        if let Some(reading) = last {
            on_success(reading);
        }
    }
}
