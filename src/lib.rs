//! storefront-session: client-side session and credential lifecycle.
//!
//! - **token**: claim decoding (no signature checks)
//! - **store**: three storage tiers behind one coordinator
//! - **session**: tier policy, proactive renewal timer, single-flight renewal,
//!   and the [`SessionManager`] that owns them
//! - **gate**: retry gate around the outgoing transport
//! - **bridge**: in-process events and the embedding-host channel
//! - **client**: renewal and invalidation calls
//! - **api**: loopback HTTP surface for the native host

pub mod api;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod session;
pub mod store;
pub mod token;

pub use bridge::{ExternalCredential, LogoutReason, SessionEvent, Subscription};
pub use config::Config;
pub use error::SessionError;
pub use gate::{OutboundRequest, OutboundResponse, RetryGate, Transport};
pub use session::{CredentialPair, SessionManager, SessionRecord};
pub use store::{StorageCoordinator, Tier};
