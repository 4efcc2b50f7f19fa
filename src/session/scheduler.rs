//! Proactive renewal timer.
//!
//! One one-shot timer per manager, armed a safety margin before the session
//! expires. Scheduling again replaces the pending timer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Fired,
}

struct Slot {
    generation: u64,
    state: SchedulerState,
    handle: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct RefreshScheduler {
    slot: Arc<Mutex<Slot>>,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                state: SchedulerState::Idle,
                handle: None,
            })),
        }
    }
}

/// Time to wait before renewing a session that expires at `expires_at`.
/// Zero when the margin has already been reached.
pub fn renewal_delay(expires_at: i64, now: i64, margin: Duration) -> Duration {
    let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
    let secs = expires_at.saturating_sub(now).saturating_sub(margin);
    if secs <= 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(secs as u64)
    }
}

/// Shortest wait before renewing a token that itself came from a renewal.
const MIN_REARM: Duration = Duration::from_secs(1);

/// Like [`renewal_delay`], for a token just issued by the renewal endpoint.
///
/// A token whose whole lifetime fits inside the margin would otherwise be
/// renewed again at once, and again after that. Such tokens are renewed at
/// half their remaining lifetime instead, never sooner than one second.
pub fn rearm_delay(expires_at: i64, now: i64, margin: Duration) -> Duration {
    let delay = renewal_delay(expires_at, now, margin);
    if !delay.is_zero() {
        return delay;
    }
    let remaining = u64::try_from(expires_at.saturating_sub(now)).unwrap_or(0);
    Duration::from_secs(remaining / 2).max(MIN_REARM)
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        self.slot.lock().state
    }

    /// Cancel any pending timer and run `task` after `delay`.
    ///
    /// Must be called from within a Tokio runtime. A zero delay still runs the
    /// task on the runtime, never inline.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;
        let shared = self.slot.clone();

        debug!("Renewal scheduled in {}s", delay.as_secs());

        // The lock is held until the handle is stored, so the task cannot
        // observe the slot before it is filled in.
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                // Detach so a reschedule from inside `task` does not abort us.
                slot.handle = None;
                slot.state = SchedulerState::Fired;
            }

            debug!("Renewal timer fired");
            task.await;

            let mut slot = shared.lock();
            if slot.generation == generation && slot.state == SchedulerState::Fired {
                slot.state = SchedulerState::Idle;
            }
        }));
        slot.state = SchedulerState::Scheduled;
    }

    /// Clear any pending timer.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation += 1;
        slot.state = SchedulerState::Idle;
    }
}
