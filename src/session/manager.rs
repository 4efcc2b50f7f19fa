//! The session manager: public surface consumed by UI and API collaborators.

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::renewal::{RenewalOutcome, RenewalTicket};
use super::{
    rearm_delay, renewal_delay, CredentialPair, RefreshScheduler, Renewal, SchedulerState,
    SessionPolicy, SessionRecord,
};
use crate::bridge::{
    ExternalCredential, HostBridge, LogoutReason, OutboundChannel, SessionEvent, Subscription,
};
use crate::client::RenewalClient;
use crate::config::Config;
use crate::error::SessionError;
use crate::store::{CookieJar, StorageCoordinator, TierSet};
use crate::token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    LoggedOut,
    Active,
}

struct Inner {
    config: Config,
    policy: SessionPolicy,
    storage: StorageCoordinator,
    scheduler: RefreshScheduler,
    renewal: Renewal,
    client: Arc<dyn RenewalClient>,
    bridge: HostBridge,
    cookie_jar: Option<Arc<CookieJar>>,
    phase: Mutex<Phase>,
}

/// Owns the session of one client context.
///
/// Cheap to clone; clones share the same session. Operations that arm timers
/// or start renewals must run inside a Tokio runtime.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

pub struct SessionManagerBuilder {
    config: Config,
    storage: StorageCoordinator,
    client: Arc<dyn RenewalClient>,
    channel: Option<Arc<dyn OutboundChannel>>,
    cookie_jar: Option<Arc<CookieJar>>,
}

impl SessionManagerBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: StorageCoordinator) -> Self {
        self.storage = storage;
        self
    }

    /// Attach an embedding host. Its presence makes this a host context.
    pub fn host_channel(mut self, channel: Arc<dyn OutboundChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// The jar behind the cookie-visible tier, for building `Cookie` headers.
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            inner: Arc::new(Inner {
                policy: self.config.policy(),
                config: self.config,
                storage: self.storage,
                scheduler: RefreshScheduler::new(),
                renewal: Renewal::new(),
                client: self.client,
                bridge: HostBridge::new(self.channel),
                cookie_jar: self.cookie_jar,
                phase: Mutex::new(Phase::LoggedOut),
            }),
        }
    }
}

impl SessionManager {
    pub fn builder(client: Arc<dyn RenewalClient>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            config: Config::default(),
            storage: StorageCoordinator::new(),
            client,
            channel: None,
            cookie_jar: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_host_context(&self) -> bool {
        self.inner.bridge.is_host_context()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Public surface
    // ─────────────────────────────────────────────────────────────────────────

    /// Establish a session. Fails only if no selected tier could persist it.
    pub fn login(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        keep_session: bool,
    ) -> Result<(), SessionError> {
        let tiers = self
            .inner
            .policy
            .choose_tiers(keep_session, self.is_host_context());
        let credentials = CredentialPair::new(access_token, refresh_token);
        self.establish(credentials, tiers, true)?;
        info!("Logged in (keep_session: {keep_session})");
        Ok(())
    }

    /// Best-effort remote invalidation, then local teardown. Idempotent.
    pub async fn logout(&self) {
        let current = self.inner.storage.peek();

        // Nothing may renew or fire while the remote call is pending.
        self.inner.scheduler.cancel();
        self.inner.renewal.cancel();

        if let Some(record) = current {
            let call = self.inner.client.invalidate(record.access_token());
            match tokio::time::timeout(self.inner.config.renewal_timeout, call).await {
                Ok(Ok(())) => debug!("Remote session invalidated"),
                Ok(Err(e)) => warn!("Remote logout failed (ignored): {e}"),
                Err(_) => warn!("Remote logout timed out (ignored)"),
            }
        }

        self.teardown(LogoutReason::Explicit);
    }

    /// Current access token if unexpired. Finding the session expired here
    /// ends it the same way a logout does.
    pub fn access_token(&self) -> Option<String> {
        match self.inner.storage.read() {
            Some(record) => Some(record.credentials.access_token),
            None => {
                if *self.inner.phase.lock() == Phase::Active {
                    info!("Session expired");
                    self.teardown(LogoutReason::Expired);
                }
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Subscribe to login, refresh and logout events.
    pub fn on_session_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.bridge.events().subscribe(handler)
    }

    /// Accept a credential from the host's own native login. Always stored as
    /// durable; the host is not notified back.
    pub fn receive_external_credential(
        &self,
        payload: ExternalCredential,
    ) -> Result<(), SessionError> {
        payload.validate()?;
        let tiers = self.inner.policy.choose_tiers(true, true);
        self.establish(payload.into_credentials(), tiers, false)?;
        info!("Session received from host");
        Ok(())
    }

    /// Pick up a session persisted by an earlier process. Returns whether one
    /// was found.
    pub fn restore(&self) -> bool {
        let Some(record) = self.inner.storage.read() else {
            return false;
        };
        *self.inner.phase.lock() = Phase::Active;
        self.arm(&record, false);
        self.inner.bridge.events().emit(&SessionEvent::LoggedIn {
            subject: record.subject(),
        });
        info!("Restored session from {:?}", record.tiers);
        true
    }

    pub fn current_session(&self) -> Option<SessionRecord> {
        self.inner.storage.read()
    }

    /// `Cookie` header carrying the cookie-visible tier, for same-origin requests.
    pub fn cookie_header(&self) -> Option<String> {
        self.inner.cookie_jar.as_ref().and_then(|jar| jar.cookie_header())
    }

    /// `Set-Cookie` lines mirroring the cookie-visible tier.
    pub fn set_cookie_lines(&self) -> Vec<String> {
        self.inner
            .cookie_jar
            .as_ref()
            .map(|jar| jar.set_cookie_lines())
            .unwrap_or_default()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.inner.scheduler.state()
    }

    pub fn is_renewing(&self) -> bool {
        self.inner.renewal.is_in_flight()
    }

    /// Access token to attach to an outgoing request, expired or not; the
    /// server decides whether it is still acceptable.
    pub fn bearer_token(&self) -> Option<String> {
        self.inner
            .storage
            .peek()
            .map(|record| record.credentials.access_token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Renewal
    // ─────────────────────────────────────────────────────────────────────────

    /// The one guarded renewal. Concurrent callers share a single call to the
    /// renewal endpoint and its outcome.
    ///
    /// On success the new record is already stored when this resolves. On
    /// failure the session has already been torn down.
    pub async fn renew(&self) -> RenewalOutcome {
        let inner = self.inner.clone();
        self.inner
            .renewal
            .run(move |ticket| async move {
                let manager = SessionManager { inner };
                match manager.perform_renewal(&ticket).await {
                    Ok(record) => Ok(record),
                    Err(e) => manager.fail_renewal(&ticket, e),
                }
            })
            .await
    }

    async fn perform_renewal(&self, ticket: &RenewalTicket) -> RenewalOutcome {
        let current = self
            .inner
            .storage
            .peek()
            .ok_or_else(|| SessionError::RenewalRejected("no session to renew".into()))?;
        let refresh_token = current
            .refresh_token()
            .ok_or_else(|| SessionError::RenewalRejected("no refresh token".into()))?
            .to_string();

        info!("Renewing session");
        let timeout = self.inner.config.renewal_timeout;
        let renewed = tokio::time::timeout(timeout, self.inner.client.renew(&refresh_token))
            .await
            .map_err(|_| {
                SessionError::RenewalNetworkFailure(format!(
                    "renewal timed out after {}s",
                    timeout.as_secs()
                ))
            })??;

        // A token we cannot schedule against would be renewed again at once.
        let claims = token::decode(&renewed.access_token).map_err(|e| {
            SessionError::RenewalRejected(format!("renewed access token unreadable: {e}"))
        })?;
        if token::is_expired(&claims, Utc::now().timestamp()) {
            return Err(SessionError::RenewalRejected(
                "renewed access token already expired".into(),
            ));
        }

        let credentials = CredentialPair {
            access_token: renewed.access_token,
            refresh_token: renewed.refresh_token.or(current.credentials.refresh_token.clone()),
        };

        // Written before any waiter sees the new credentials, and only if no
        // logout or login has happened since the renewal started.
        let record = current.renewed(credentials);
        let record = ticket.commit(|| -> RenewalOutcome {
            let written = self.inner.storage.write(&record, &current.tiers)?;
            let record = SessionRecord {
                tiers: written,
                ..record
            };
            *self.inner.phase.lock() = Phase::Active;
            self.arm(&record, true);
            Ok(record)
        })??;

        self.inner.bridge.notify_refreshed(&record);
        info!("Session renewed, expires at {}", record.expires_at);
        Ok(record)
    }

    /// End the session after a failed renewal, unless the renewal has been
    /// superseded, in which case the session now belongs to someone else.
    fn fail_renewal(&self, ticket: &RenewalTicket, err: SessionError) -> RenewalOutcome {
        match ticket.commit(|| self.discard()) {
            Ok(previous) => {
                error!("Session renewal failed: {err}");
                self.announce_logout(previous, LogoutReason::RenewalFailed);
                Err(err)
            }
            Err(superseded) => {
                debug!("Superseded renewal failed (ignored): {err}");
                Err(superseded)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn establish(
        &self,
        credentials: CredentialPair,
        tiers: TierSet,
        post_to_host: bool,
    ) -> Result<(), SessionError> {
        let record = SessionRecord::new(credentials, tiers.clone());
        // A renewal of the previous session must not overwrite this one. A
        // failed write leaves the previous session, and its renewal, as is.
        let written = self
            .inner
            .renewal
            .preempt(|| self.inner.storage.write(&record, &tiers))?;
        let record = SessionRecord {
            tiers: written,
            ..record
        };

        *self.inner.phase.lock() = Phase::Active;
        self.arm(&record, false);
        self.inner.bridge.notify_login(&record, post_to_host);
        Ok(())
    }

    /// Schedule the proactive renewal of `record`. `renewed` marks a record
    /// fresh from the renewal endpoint, which is never renewed back-to-back.
    fn arm(&self, record: &SessionRecord, renewed: bool) {
        if record.refresh_token().is_none() {
            // Nothing to renew with; expiry is discovered lazily on read.
            debug!("No refresh token, proactive renewal not scheduled");
            self.inner.scheduler.cancel();
            return;
        }

        let now = Utc::now().timestamp();
        let margin = self.inner.config.safety_margin;
        let delay = if renewed {
            rearm_delay(record.expires_at, now, margin)
        } else {
            renewal_delay(record.expires_at, now, margin)
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        self.inner.scheduler.schedule(delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = SessionManager { inner };
            if let Err(e) = manager.renew().await {
                debug!("Proactive renewal ended the session: {e}");
            }
        });
    }

    /// Local teardown shared by logout, renewal failure and expiry. Safe to
    /// call repeatedly; the logout notification fires once per session.
    fn teardown(&self, reason: LogoutReason) {
        self.inner.renewal.cancel();
        let previous = self.discard();
        self.announce_logout(previous, reason);
    }

    /// Drop the stored session and its timer. Returns the phase it ended.
    fn discard(&self) -> Phase {
        self.inner.scheduler.cancel();
        self.inner.storage.clear();
        std::mem::replace(&mut *self.inner.phase.lock(), Phase::LoggedOut)
    }

    fn announce_logout(&self, previous: Phase, reason: LogoutReason) {
        if previous == Phase::Active {
            info!("Logged out ({reason:?})");
            self.inner.bridge.notify_logout(reason);
        }
    }
}
