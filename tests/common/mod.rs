#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::Notify;

use storefront_session::bridge::OutboundChannel;
use storefront_session::client::RenewalClient;
use storefront_session::store::{
    CookieJar, MemoryStore, TierStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use storefront_session::{
    Config, CredentialPair, OutboundRequest, OutboundResponse, SessionError, SessionEvent,
    SessionManager, StorageCoordinator, Subscription, Tier, Transport,
};

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Compact token with the given claims. Every call yields a distinct token.
pub fn token(sub: &str, exp: i64) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let jti = TOKEN_SEQ.fetch_add(1, Ordering::SeqCst);
    format!(
        "{}.{}.signature",
        engine.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        engine.encode(format!(r#"{{"sub":"{sub}","exp":{exp},"jti":{jti}}}"#)),
    )
}

pub fn token_expiring_in(secs: i64) -> String {
    token("user_1", Utc::now().timestamp() + secs)
}

// ─────────────────────────────────────────────────────────────────────────────
// Renewal endpoint
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalMode {
    Succeed,
    Reject,
    NetworkFailure,
    /// Succeeds with an access token that does not decode.
    Unreadable,
    /// Succeeds with an access token that has already expired.
    Expired,
}

pub struct FakeRenewalClient {
    mode: Mutex<RenewalMode>,
    delay: Duration,
    hold: Option<Arc<Notify>>,
    ttl: i64,
    renew_calls: AtomicUsize,
    invalidations: AtomicUsize,
    fail_invalidate: bool,
}

impl FakeRenewalClient {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(RenewalMode::Succeed),
            delay: Duration::ZERO,
            hold: None,
            ttl: 3600,
            renew_calls: AtomicUsize::new(0),
            invalidations: AtomicUsize::new(0),
            fail_invalidate: false,
        }
    }

    pub fn rejecting() -> Self {
        Self::new().with_mode(RenewalMode::Reject)
    }

    pub fn with_mode(self, mode: RenewalMode) -> Self {
        *self.mode.lock() = mode;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Each renewal waits for a permit on `release` before answering.
    pub fn held_by(mut self, release: Arc<Notify>) -> Self {
        self.hold = Some(release);
        self
    }

    /// Lifetime of issued access tokens, in seconds.
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_failing_invalidate(mut self) -> Self {
        self.fail_invalidate = true;
        self
    }

    pub fn set_mode(&self, mode: RenewalMode) {
        *self.mode.lock() = mode;
    }

    pub fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenewalClient for FakeRenewalClient {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, SessionError> {
        let n = self.renew_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        let refresh = Some(format!("{refresh_token}-r{n}"));
        let mode = *self.mode.lock();
        match mode {
            RenewalMode::Succeed => Ok(CredentialPair::new(token_expiring_in(self.ttl), refresh)),
            RenewalMode::Unreadable => Ok(CredentialPair::new("opaque-token", refresh)),
            RenewalMode::Expired => Ok(CredentialPair::new(token_expiring_in(-60), refresh)),
            RenewalMode::Reject => Err(SessionError::RenewalRejected("refresh token revoked".into())),
            RenewalMode::NetworkFailure => {
                Err(SessionError::RenewalNetworkFailure("connection reset".into()))
            }
        }
    }

    async fn invalidate(&self, _access_token: &str) -> Result<(), SessionError> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        if self.fail_invalidate {
            return Err(SessionError::Transport("logout endpoint unreachable".into()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storefront API behind the retry gate
// ─────────────────────────────────────────────────────────────────────────────

/// Answers 401 for rejected tokens, otherwise 200 with the bearer as body.
pub struct FakeApi {
    rejected: Mutex<HashSet<String>>,
    reject_all: bool,
    latency: Duration,
    calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            rejected: Mutex::new(HashSet::new()),
            reject_all: false,
            latency: Duration::from_millis(10),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting_everything() -> Self {
        Self {
            reject_all: true,
            ..Self::new()
        }
    }

    pub fn reject(&self, token: &str) {
        self.rejected.lock().insert(token.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeApi {
    async fn execute(&self, request: &OutboundRequest) -> Result<OutboundResponse, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        if request.url().contains("/broken") {
            return Ok(OutboundResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
        }

        let bearer = request.bearer().unwrap_or_default().to_string();
        let rejected = self.reject_all || self.rejected.lock().contains(&bearer);
        if rejected {
            return Ok(OutboundResponse::new(StatusCode::UNAUTHORIZED, "unauthorized"));
        }
        Ok(OutboundResponse::new(StatusCode::OK, bearer))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host channel
// ─────────────────────────────────────────────────────────────────────────────

/// Records everything posted to the host.
#[derive(Default)]
pub struct RecordingChannel {
    pub messages: Mutex<Vec<storefront_session::bridge::HostMessage>>,
}

impl OutboundChannel for RecordingChannel {
    fn send(&self, message: &storefront_session::bridge::HostMessage) -> anyhow::Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct Tiers {
    pub durable: Arc<MemoryStore>,
    pub ephemeral: Arc<MemoryStore>,
    pub cookie: Arc<CookieJar>,
}

impl Tiers {
    pub fn new() -> Self {
        Self {
            durable: Arc::new(MemoryStore::new()),
            ephemeral: Arc::new(MemoryStore::new()),
            cookie: Arc::new(CookieJar::new("/")),
        }
    }

    pub fn coordinator(&self) -> StorageCoordinator {
        StorageCoordinator::new()
            .with_tier(Tier::Durable, self.durable.clone())
            .with_tier(Tier::Ephemeral, self.ephemeral.clone())
            .with_tier(Tier::CookieVisible, self.cookie.clone())
    }

    pub fn access_token(&self, tier: Tier) -> Option<String> {
        let store: &dyn TierStore = match tier {
            Tier::Durable => self.durable.as_ref(),
            Tier::Ephemeral => self.ephemeral.as_ref(),
            Tier::CookieVisible => self.cookie.as_ref(),
        };
        store.get(ACCESS_TOKEN_KEY).unwrap()
    }

    /// Put a session into the durable tier directly, as an earlier process
    /// would have left it.
    pub fn seed_durable(&self, access_token: &str, refresh_token: &str) {
        self.durable.set(ACCESS_TOKEN_KEY, access_token).unwrap();
        self.durable.set(REFRESH_TOKEN_KEY, refresh_token).unwrap();
    }

    pub fn all_empty(&self) -> bool {
        [Tier::Durable, Tier::Ephemeral, Tier::CookieVisible]
            .into_iter()
            .all(|tier| self.access_token(tier).is_none())
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub client: Arc<FakeRenewalClient>,
    pub tiers: Tiers,
    pub events: Arc<Mutex<Vec<SessionEvent>>>,
    _subscription: Subscription,
}

impl Harness {
    pub fn new(client: FakeRenewalClient) -> Self {
        Self::build(client, Config::default(), None)
    }

    pub fn with_config(client: FakeRenewalClient, config: Config) -> Self {
        Self::build(client, config, None)
    }

    pub fn with_host(client: FakeRenewalClient, channel: Arc<RecordingChannel>) -> Self {
        Self::build(client, Config::default(), Some(channel))
    }

    fn build(client: FakeRenewalClient, config: Config, channel: Option<Arc<RecordingChannel>>) -> Self {
        let client = Arc::new(client);
        let tiers = Tiers::new();
        let mut builder = SessionManager::builder(client.clone())
            .config(config)
            .storage(tiers.coordinator())
            .cookie_jar(tiers.cookie.clone());
        if let Some(channel) = channel {
            builder = builder.host_channel(channel);
        }
        let manager = builder.build();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = manager.on_session_event(move |e| sink.lock().push(e.clone()));

        Self {
            manager,
            client,
            tiers,
            events,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn logout_events(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::LoggedOut { .. }))
            .count()
    }
}
