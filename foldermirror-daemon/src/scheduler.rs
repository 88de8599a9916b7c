//! Quiet-period debouncing with a single armed timer.
//!
//! The scheduler owns at most one timer task. Arming a new one aborts the
//! previous handle first, so a flush can only fire after a full quiet period
//! with no further activity. Each armed timer carries a generation number;
//! the fired callback must confirm it is still current via
//! [`DebounceScheduler::take_if_current`] before it flushes, which closes the
//! window between a timer waking up and a concurrent re-arm aborting it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct DebounceScheduler {
    quiet_period: Duration,
    generation: u64,
    armed: Option<ArmedTimer>,
}

impl DebounceScheduler {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            generation: 0,
            armed: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Restart the countdown. `fire` receives the new timer's generation and
    /// builds the future that runs once the quiet period elapses.
    ///
    /// With nothing pending this does nothing and leaves any armed timer alone.
    /// Must be called from within a tokio runtime.
    pub fn on_activity<F, Fut>(&mut self, pending: usize, fire: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if pending == 0 {
            return;
        }
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        // Measured from the activity, not from when the task first runs.
        let deadline = Instant::now() + self.quiet_period;
        let on_fire = fire(generation);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire.await;
        });
        self.armed = Some(ArmedTimer { generation, handle });
    }

    /// Called by a fired timer. Disarms and returns `true` only if
    /// `generation` is still the armed one; a stale timer gets `false`.
    ///
    /// The slot is cleared without aborting, since the caller is the timer
    /// task itself.
    pub fn take_if_current(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(timer) if timer.generation == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    /// Cancel the armed timer ahead of an immediate flush. Returns whether a
    /// timer was pending.
    pub fn flush_now(&mut self) -> bool {
        let was_armed = self.cancel();
        if was_armed {
            tracing::debug!("debounce timer cancelled for immediate flush");
        }
        was_armed
    }

    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
