//! One-shot, cancelable delayed callbacks

use crate::error::{BResult, BarometerError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Delayed invocation service used for the start timeout.
///
/// Cancellation is best effort: a callback may already be running when
/// `cancel` is called, so whatever it triggers must re-check state first.
pub trait TimerService: Send {
    fn schedule(&mut self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    fn cancel(&mut self, handle: TimerHandle);
}

/// Timer backed by tokio tasks
pub struct TokioTimer {
    runtime: Handle,
    next_id: u64,
    pending: Arc<Mutex<HashMap<TimerHandle, AbortHandle>>>,
}

impl TokioTimer {
    pub fn new(runtime: Handle) -> Self {
        TokioTimer {
            runtime,
            next_id: 0,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Timer on the runtime the caller is running in
    pub fn current() -> BResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| BarometerError::Internal(format!("No tokio runtime: {}", e)))?;
        Ok(Self::new(runtime))
    }

    /// Number of timers scheduled but neither fired nor cancelled
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl TimerService for TokioTimer {
    fn schedule(&mut self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);

        // Hold the table while spawning so the task cannot look itself up
        // before its abort handle is registered.
        let mut table = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = Arc::clone(&self.pending);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let still_armed = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&handle)
                .is_some();
            if still_armed {
                callback();
            }
        });
        table.insert(handle, task.abort_handle());

        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        let removed = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        if let Some(abort) = removed {
            abort.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        let mut table = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, abort) in table.drain() {
            abort.abort();
        }
    }
}

struct ManualEntry {
    handle: TimerHandle,
    deadline: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualTimerState {
    now: Duration,
    next_id: u64,
    entries: Vec<ManualEntry>,
}

/// Timer driven by an explicit virtual clock.
///
/// Clones share the same clock, so a host can keep one clone and hand
/// another to the listener. Callbacks run from `advance`, outside the
/// timer's own lock.
#[derive(Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<ManualTimerState>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    pub fn armed_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Move the clock forward and fire everything that came due.
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let mut due: Vec<ManualEntry> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.now += by;
            let now = state.now;
            let (due, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut state.entries)
                .into_iter()
                .partition(|entry| entry.deadline <= now);
            state.entries = keep;
            due
        };
        due.sort_by_key(|entry| entry.deadline);

        let fired = due.len();
        for entry in due {
            log::trace!("Manual timer {:?} fired", entry.handle);
            (entry.callback)();
        }
        fired
    }
}

impl TimerService for ManualTimer {
    fn schedule(&mut self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let handle = TimerHandle(state.next_id);
        let deadline = state.now + delay;
        state.entries.push(ManualEntry {
            handle,
            deadline,
            callback,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .retain(|entry| entry.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, TimerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        (count, Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_manual_timer_fires_at_deadline() {
        let mut timer = ManualTimer::new();
        let (count, callback) = counter();
        timer.schedule(Duration::from_millis(2000), callback);

        assert_eq!(timer.advance(Duration::from_millis(1999)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(timer.advance(Duration::from_millis(1)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // One-shot
        assert_eq!(timer.advance(Duration::from_secs(10)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_timer_cancel() {
        let mut timer = ManualTimer::new();
        let (count, callback) = counter();
        let handle = timer.schedule(Duration::from_millis(500), callback);
        assert_eq!(timer.armed_count(), 1);

        timer.cancel(handle);
        assert_eq!(timer.armed_count(), 0);
        timer.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_timer_clones_share_clock() {
        let timer = ManualTimer::new();
        let mut scheduler = timer.clone();
        let (count, callback) = counter();
        scheduler.schedule(Duration::from_millis(10), callback);

        timer.advance(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires() {
        let mut timer = TokioTimer::current().unwrap();
        let (count, callback) = counter();
        timer.schedule(Duration::from_millis(2000), callback);
        assert_eq!(timer.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(timer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_cancel() {
        let mut timer = TokioTimer::current().unwrap();
        let (count, callback) = counter();
        let handle = timer.schedule(Duration::from_millis(2000), callback);

        tokio::time::sleep(Duration::from_millis(500)).await;
        timer.cancel(handle);
        tokio::time::sleep(Duration::from_millis(3000)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timer.pending_count(), 0);
    }
}
