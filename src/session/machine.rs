//! Pure decision logic for the session synchronizer.
//!
//! Nothing in here performs I/O. The worker feeds every provider event
//! through [`decide`] and then carries out the returned [`Step`].

use crate::config::RestoreStrategy;
use crate::models::Session;
use crate::providers::{AuthChange, AuthEvent};

/// Named states of the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Anonymous,
    Authenticated { user_id: String },
}

impl Phase {
    /// Loading is only ever left, never re-entered.
    pub fn allows(&self, next: &Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (_, Loading) => false,
            (Loading, _) => true,
            (Anonymous, Anonymous) => true,
            (Anonymous, Authenticated { .. }) => true,
            (Authenticated { .. }, Anonymous) => true,
            (Authenticated { .. }, Authenticated { .. }) => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Loading => "loading",
            Phase::Anonymous => "anonymous",
            Phase::Authenticated { .. } => "authenticated",
        }
    }
}

/// Everything the decision function needs to know about the worker.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub strategy: RestoreStrategy,
    pub phase: Phase,
    /// The single source of truth for "is a re-fetch needed".
    pub current_user_id: Option<String>,
    pub tab_active: bool,
    /// False when the last profile lookup for the current user came back empty.
    pub profile_loaded: bool,
    /// Set just before this tab asks the provider to sign out.
    pub explicit_sign_out: bool,
}

impl SyncContext {
    pub fn new(strategy: RestoreStrategy) -> Self {
        SyncContext {
            strategy,
            phase: Phase::Loading,
            current_user_id: None,
            tab_active: false,
            profile_loaded: false,
            explicit_sign_out: false,
        }
    }

    fn is_current_user(&self, user_id: &str) -> bool {
        self.current_user_id.as_deref() == Some(user_id)
    }

    fn gate_closed(&self, event: AuthEvent) -> bool {
        self.strategy == RestoreStrategy::TabGated && !self.tab_active && event != AuthEvent::SignedIn
    }
}

/// What to do on mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPlan {
    /// Show the anonymous state without asking the provider.
    StartAnonymous,
    /// Read the cookie session (read-only) and adopt it if present.
    Restore,
}

pub fn plan_mount(strategy: RestoreStrategy, tab_flag_set: bool) -> MountPlan {
    match (strategy, tab_flag_set) {
        (RestoreStrategy::TabGated, false) => MountPlan::StartAnonymous,
        _ => MountPlan::Restore,
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The tab has not signed in; the event belongs to another tab's session.
    Ignore,
    /// Token refreshed for the current user but the profile never loaded.
    RetryProfile(Session),
    /// Token refreshed for the current user; nothing to re-fetch.
    NoteRefresh,
    /// `SIGNED_OUT` that this tab asked for.
    ConfirmSignOut,
    /// `SIGNED_OUT` nobody asked for: verify before believing it.
    VerifySignOut,
    /// A (new) user to activate in this tab.
    Activate(Session),
    /// Same user, tab already active.
    Deduplicate,
    /// An event with no session.
    Clear,
}

/// The transition table for provider events.
pub fn decide(ctx: &SyncContext, change: &AuthChange) -> Step {
    if change.event == AuthEvent::SignedOut && ctx.explicit_sign_out {
        return Step::ConfirmSignOut;
    }
    if ctx.gate_closed(change.event) {
        return Step::Ignore;
    }

    match (change.event, &change.session) {
        (AuthEvent::TokenRefreshed, Some(session)) if ctx.is_current_user(session.user_id()) => {
            if ctx.profile_loaded {
                Step::NoteRefresh
            } else {
                Step::RetryProfile(session.clone())
            }
        }
        (AuthEvent::SignedOut, _) => Step::VerifySignOut,
        (_, Some(session)) => {
            if !ctx.is_current_user(session.user_id()) || !ctx.tab_active {
                Step::Activate(session.clone())
            } else {
                Step::Deduplicate
            }
        }
        (_, None) => Step::Clear,
    }
}
