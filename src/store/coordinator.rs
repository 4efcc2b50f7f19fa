//! Storage coordinator, the only writer of the storage tiers.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{Tier, TierSet, TierStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::SessionError;
use crate::session::{CredentialPair, SessionRecord};

/// Reads and writes session records across the configured tiers.
#[derive(Clone, Default)]
pub struct StorageCoordinator {
    /// Kept sorted by tier priority.
    tiers: Vec<(Tier, Arc<dyn TierStore>)>,
}

impl StorageCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a backend for `tier`, replacing any previous one.
    pub fn with_tier(mut self, tier: Tier, store: Arc<dyn TierStore>) -> Self {
        self.tiers.retain(|(t, _)| *t != tier);
        self.tiers.push((tier, store));
        self.tiers.sort_by_key(|(t, _)| *t);
        self
    }

    pub fn configured_tiers(&self) -> TierSet {
        self.tiers.iter().map(|(t, _)| *t).collect()
    }

    /// Persist `record` into each tier of `tiers`, then drop any session data
    /// from the tiers not selected.
    ///
    /// A failing tier is logged and skipped. Returns the tiers actually written;
    /// fails only when none of the selected tiers could be written, in which
    /// case no tier has been touched beyond the failed writes.
    pub fn write(&self, record: &SessionRecord, tiers: &TierSet) -> Result<TierSet, SessionError> {
        let mut written = TierSet::new();

        for (tier, store) in self.tiers.iter().filter(|(t, _)| tiers.contains(t)) {
            match write_pair(store.as_ref(), &record.credentials) {
                Ok(()) => {
                    written.insert(*tier);
                }
                Err(e) => {
                    let err = SessionError::StorageWriteFailure {
                        tier: *tier,
                        message: e.to_string(),
                    };
                    warn!("{err}");
                }
            }
        }

        for tier in tiers.difference(&self.configured_tiers()) {
            warn!("No backend configured for {tier} tier");
        }

        if written.is_empty() {
            return Err(SessionError::AllTiersFailed);
        }

        for (tier, store) in self.tiers.iter().filter(|(t, _)| !tiers.contains(t)) {
            if let Err(e) = clear_session_keys(store.as_ref()) {
                warn!("Failed to drop stale session from {tier} tier: {e}");
            }
        }

        debug!("Session written to {:?}", written);
        Ok(written)
    }

    /// First non-expired record in priority order.
    ///
    /// If every populated tier holds an expired (or undecodable) token, all
    /// tiers are cleared and `None` is returned.
    pub fn read(&self) -> Option<SessionRecord> {
        let now = Utc::now().timestamp();
        let mut found_expired = false;

        for (tier, store) in &self.tiers {
            let Some(credentials) = read_pair(*tier, store.as_ref()) else {
                continue;
            };

            let record = SessionRecord::new(credentials, TierSet::new());
            if record.is_expired(now) {
                debug!("Expired session in {tier} tier");
                found_expired = true;
                continue;
            }

            let holders = self.tiers_holding(record.access_token());
            return Some(SessionRecord {
                tiers: holders,
                ..record
            });
        }

        if found_expired {
            info!("Stored session expired, clearing all tiers");
            self.clear();
        }
        None
    }

    /// First populated record in priority order, expired or not. Never clears.
    ///
    /// Renewal needs the refresh token of a session whose access token has
    /// already lapsed.
    pub fn peek(&self) -> Option<SessionRecord> {
        self.tiers.iter().find_map(|(tier, store)| {
            let credentials = read_pair(*tier, store.as_ref())?;
            let tiers = self.tiers_holding(&credentials.access_token);
            Some(SessionRecord::new(credentials, tiers))
        })
    }

    /// Purge every tier. Backend errors are logged and ignored.
    pub fn clear(&self) {
        for (tier, store) in &self.tiers {
            if let Err(e) = store.clear() {
                warn!("Failed to clear {tier} tier: {e}");
            }
        }
    }

    fn tiers_holding(&self, access_token: &str) -> TierSet {
        self.tiers
            .iter()
            .filter(|(t, store)| {
                read_pair(*t, store.as_ref())
                    .is_some_and(|pair| pair.access_token == access_token)
            })
            .map(|(t, _)| *t)
            .collect()
    }
}

fn write_pair(store: &dyn TierStore, credentials: &CredentialPair) -> anyhow::Result<()> {
    store.set(ACCESS_TOKEN_KEY, &credentials.access_token)?;
    match &credentials.refresh_token {
        Some(refresh) => store.set(REFRESH_TOKEN_KEY, refresh)?,
        None => store.remove(REFRESH_TOKEN_KEY)?,
    }
    Ok(())
}

fn clear_session_keys(store: &dyn TierStore) -> anyhow::Result<()> {
    store.remove(ACCESS_TOKEN_KEY)?;
    store.remove(REFRESH_TOKEN_KEY)?;
    Ok(())
}

fn read_pair(tier: Tier, store: &dyn TierStore) -> Option<CredentialPair> {
    let access = match store.get(ACCESS_TOKEN_KEY) {
        Ok(Some(access)) if !access.is_empty() => access,
        Ok(_) => return None,
        Err(e) => {
            warn!("{}", SessionError::StorageRead(format!("{tier} tier: {e}")));
            return None;
        }
    };
    let refresh = store.get(REFRESH_TOKEN_KEY).ok().flatten();
    Some(CredentialPair::new(access, refresh))
}
