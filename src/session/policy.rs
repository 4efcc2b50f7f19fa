use crate::store::{Tier, TierSet};

/// Decides which tiers a new session is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Write the cookie-visible tier for every session, whatever the
    /// keep-session choice. Server-rendered requests and the embedding shell
    /// read the session from there.
    pub cookie_always: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self { cookie_always: true }
    }
}

impl SessionPolicy {
    pub fn choose_tiers(&self, keep_session: bool, is_host_context: bool) -> TierSet {
        let mut tiers = TierSet::new();

        if self.cookie_always {
            tiers.insert(Tier::CookieVisible);
        }

        // A native host owns its process lifecycle and always wants persistence.
        if is_host_context || keep_session {
            tiers.insert(Tier::Durable);
        } else {
            tiers.insert(Tier::Ephemeral);
        }

        tiers
    }
}
