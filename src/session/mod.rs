//! Keeps the process-wide [`AuthState`](crate::models::AuthState) in step
//! with the auth provider's session events.

pub mod machine;
pub mod profile_fetch;
pub mod synchronizer;

pub use machine::{decide, plan_mount, MountPlan, Phase, Step, SyncContext};
pub use profile_fetch::fetch_profile;
pub use synchronizer::SessionSynchronizer;
