//! Session lifecycle: records, tier policy, proactive scheduling and the
//! single-flight renewal, owned by [`SessionManager`].

mod manager;
mod policy;
mod record;
pub mod renewal;
pub mod scheduler;

pub use manager::{SessionManager, SessionManagerBuilder};
pub use policy::SessionPolicy;
pub use record::{CredentialPair, SessionRecord};
pub use renewal::{Renewal, RenewalTicket};
pub use scheduler::{rearm_delay, renewal_delay, RefreshScheduler, SchedulerState};
