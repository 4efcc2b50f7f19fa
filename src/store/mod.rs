//! Session storage: three tiers behind one coordinator.
//!
//! Read priority is Durable → Ephemeral → CookieVisible. Nothing outside
//! [`StorageCoordinator`] touches a tier directly.

pub mod coordinator;
pub mod tiers;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use coordinator::StorageCoordinator;
pub use tiers::{CookieJar, FileStore, MemoryStore, TierStore};

/// Key holding the access token in every tier.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Key holding the refresh token in every tier.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// A storage tier. Declaration order is read priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Survives process restarts.
    Durable,
    /// Lives as long as the browsing session.
    Ephemeral,
    /// Attached to same-origin requests and readable by the embedding shell.
    CookieVisible,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Durable => "durable",
            Tier::Ephemeral => "ephemeral",
            Tier::CookieVisible => "cookie",
        };
        f.write_str(name)
    }
}

/// Ordered set of tiers.
pub type TierSet = BTreeSet<Tier>;
