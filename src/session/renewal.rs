//! Single-flight renewal.
//!
//! Holds the one renewal state of a manager. The proactive timer and any
//! number of failed requests all get a clone of the same shared
//! outcome while a renewal is running.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::SessionRecord;
use crate::error::SessionError;

pub type RenewalOutcome = Result<SessionRecord, SessionError>;
pub type SharedRenewal = Shared<BoxFuture<'static, RenewalOutcome>>;

enum RenewalState {
    Idle,
    InFlight {
        generation: u64,
        outcome: SharedRenewal,
    },
}

pub struct Renewal {
    state: Arc<Mutex<RenewalState>>,
    next_generation: Mutex<u64>,
    cancel: watch::Sender<u64>,
}

impl Default for Renewal {
    fn default() -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(RenewalState::Idle)),
            next_generation: Mutex::new(0),
            cancel,
        }
    }
}

/// Handed to a renewal job. Lets the job apply its result only while it is
/// still the current renewal, i.e. not cancelled by a logout or superseded by
/// a new login.
pub struct RenewalTicket {
    state: Arc<Mutex<RenewalState>>,
    generation: u64,
}

impl RenewalTicket {
    pub fn is_current(&self) -> bool {
        is_generation(&self.state.lock(), self.generation)
    }

    /// Run `apply` if this renewal is still current. Cancellation and
    /// [`Renewal::preempt`] are excluded until `apply` returns.
    ///
    /// `apply` must not call back into the owning [`Renewal`].
    pub fn commit<R>(&self, apply: impl FnOnce() -> R) -> Result<R, SessionError> {
        let state = self.state.lock();
        if !is_generation(&state, self.generation) {
            tracing::debug!("Renewal superseded, result discarded");
            return Err(SessionError::LoggedOut);
        }
        Ok(apply())
    }
}

fn is_generation(state: &RenewalState, generation: u64) -> bool {
    matches!(state, RenewalState::InFlight { generation: g, .. } if *g == generation)
}

impl Renewal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(*self.state.lock(), RenewalState::InFlight { .. })
    }

    /// Join the running renewal, or start `job` if none is running.
    ///
    /// The job runs on its own task so it settles even if every waiter goes
    /// away. It should apply its result through the ticket. Must be called
    /// from within a Tokio runtime.
    pub fn run<F, Fut>(&self, job: F) -> SharedRenewal
    where
        F: FnOnce(RenewalTicket) -> Fut,
        Fut: Future<Output = RenewalOutcome> + Send + 'static,
    {
        let mut state = self.state.lock();
        if let RenewalState::InFlight { outcome, .. } = &*state {
            tracing::debug!("Joining in-flight renewal");
            return outcome.clone();
        }

        let generation = {
            let mut next = self.next_generation.lock();
            *next += 1;
            *next
        };
        // Subscribed before the job starts, so a logout issued at any point
        // after this is observed.
        let mut cancelled = self.cancel.subscribe();
        let job = job(RenewalTicket {
            state: self.state.clone(),
            generation,
        });
        let slot = self.state.clone();

        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancelled.changed() => Err(SessionError::LoggedOut),
                outcome = job => outcome,
            };

            let mut state = slot.lock();
            if is_generation(&state, generation) {
                *state = RenewalState::Idle;
            }
            outcome
        });

        let outcome = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(SessionError::Internal(format!("renewal task failed: {e}"))))
        }
        .boxed()
        .shared();

        *state = RenewalState::InFlight {
            generation,
            outcome: outcome.clone(),
        };
        outcome
    }

    /// Reject every waiter of the running renewal with `LoggedOut` and return
    /// to idle. No-op when idle.
    pub fn cancel(&self) {
        self.abandon(&mut self.state.lock());
    }

    /// Run `replace` with no renewal able to commit meanwhile. If it succeeds,
    /// the running renewal is cancelled as by [`Renewal::cancel`]; if it fails,
    /// the renewal is left alone.
    pub fn preempt<T, E>(&self, replace: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut state = self.state.lock();
        let replaced = replace()?;
        self.abandon(&mut state);
        Ok(replaced)
    }

    fn abandon(&self, state: &mut RenewalState) {
        if matches!(*state, RenewalState::InFlight { .. }) {
            *state = RenewalState::Idle;
            self.cancel.send_modify(|epoch| *epoch += 1);
        }
    }
}
