use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::machine::{decide, plan_mount, MountPlan, Phase, Step, SyncContext};
use super::profile_fetch::fetch_profile;
use crate::config::SessionConfig;
use crate::models::{AuthState, Session};
use crate::profiles::ProfileStore;
use crate::providers::{AuthChange, AuthProvider, Subscription};
use crate::storage::TabStorage;
use crate::utils::log_throttle::LogThrottle;

const TAB_FLAG_VALUE: &str = "1";
const REFRESH_LOG_WINDOW: Duration = Duration::from_secs(300);

/// Work items for the worker, processed strictly in arrival order.
enum Command {
    Provider(AuthChange),
    ExplicitSignOut,
    RefreshProfile(oneshot::Sender<()>),
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AuthState>,
    refresh_count: watch::Receiver<u64>,
    cancelled: Arc<AtomicBool>,
    subscription: Mutex<Option<Subscription>>,
    provider: Arc<dyn AuthProvider>,
}

/// Handle to a running session synchronizer.
///
/// Cheap to clone; every clone talks to the same worker. The worker owns the
/// auth state and applies provider events one at a time, so no two profile
/// rebuilds for the same user ever run concurrently.
#[derive(Clone)]
pub struct SessionSynchronizer {
    inner: Arc<Shared>,
}

impl SessionSynchronizer {
    /// Subscribe to `provider` and spawn the worker on the current tokio runtime.
    ///
    /// The worker runs the mount probe before anything else; provider events
    /// that arrive in the meantime wait in the queue behind it.
    pub fn start(
        provider: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        tab_storage: Arc<dyn TabStorage>,
        config: SessionConfig,
    ) -> Self {
        let (commands, queue) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(AuthState::initial());
        let (count_tx, count_rx) = watch::channel(0u64);
        let cancelled = Arc::new(AtomicBool::new(false));

        let listener_tx = commands.clone();
        let subscription = provider.on_auth_state_change(Arc::new(move |change: AuthChange| {
            // Fails only once the worker is gone, at which point nobody cares.
            let _ = listener_tx.send(Command::Provider(change));
        }));

        info!(
            "Starting session synchronizer (provider='{}', store='{}', restore={:?})",
            provider.get_name(),
            profiles.get_name(),
            config.restore
        );

        let worker = Worker {
            ctx: SyncContext::new(config.restore),
            provider: provider.clone(),
            profiles,
            tab_storage,
            config,
            state: state_tx,
            refresh_count: count_tx,
            cancelled: cancelled.clone(),
            log_throttle: LogThrottle::new(REFRESH_LOG_WINDOW),
        };
        tokio::spawn(worker.run(queue));

        SessionSynchronizer {
            inner: Arc::new(Shared {
                commands,
                state: state_rx,
                refresh_count: count_rx,
                cancelled,
                subscription: Mutex::new(Some(subscription)),
                provider,
            }),
        }
    }

    /// Check credentials with the provider. Local state only changes once
    /// the provider reports the new session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), String> {
        self.inner
            .provider
            .sign_in_with_password(email, password)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(
                    event_name = "session.sign_in.failed",
                    event_domain = "session",
                    "Sign-in failed for '{}': {}",
                    email,
                    e
                );
                e
            })
    }

    /// Register a new account. Does not sign in.
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<(), String> {
        let metadata = HashMap::from([("full_name".to_string(), Value::from(full_name))]);
        self.inner.provider.sign_up(email, password, metadata).await
    }

    /// Sign out of this tab.
    pub async fn sign_out(&self) {
        // Queued ahead of the SIGNED_OUT the provider is about to emit.
        self.send(Command::ExplicitSignOut);
        if let Err(e) = self.inner.provider.sign_out().await {
            warn!("Provider sign-out reported an error: {}", e);
        }
    }

    /// Re-fetch the profile pair for the cached user. No-op when signed out.
    pub async fn refresh_profile(&self) {
        let (done, wait) = oneshot::channel();
        if self.send(Command::RefreshProfile(done)) {
            let _ = wait.await;
        }
    }

    /// Resolves once every command queued before this call has been handled.
    pub async fn settle(&self) {
        let (done, wait) = oneshot::channel();
        if self.send(Command::Barrier(done)) {
            let _ = wait.await;
        }
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.clone()
    }

    /// Counts silent re-authentications; pages re-fetch their data when it moves.
    pub fn token_refresh_count(&self) -> u64 {
        *self.inner.refresh_count.borrow()
    }

    pub fn subscribe_token_refresh(&self) -> watch::Receiver<u64> {
        self.inner.refresh_count.clone()
    }

    /// Wait for the mount probe to resolve and return the state at that point.
    pub async fn wait_until_loaded(&self) -> AuthState {
        let mut rx = self.subscribe();
        let resolved = rx.wait_for(|state| !state.loading).await.map(|s| (*s).clone());
        match resolved {
            Ok(state) => state,
            Err(_) => rx.borrow().clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Stop listening to the provider and stop the worker. Fetches already
    /// in flight finish, but their results are thrown away.
    pub fn shutdown(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.send(Command::Shutdown);
        info!("Session synchronizer shut down");
    }

    fn send(&self, command: Command) -> bool {
        self.inner.commands.send(command).is_ok()
    }
}

/// Owns the state; lives on its own task.
struct Worker {
    ctx: SyncContext,
    provider: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    tab_storage: Arc<dyn TabStorage>,
    config: SessionConfig,
    state: watch::Sender<AuthState>,
    refresh_count: watch::Sender<u64>,
    cancelled: Arc<AtomicBool>,
    log_throttle: LogThrottle,
}

impl Worker {
    async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Command>) {
        self.mount().await;

        while let Some(command) = queue.recv().await {
            if self.is_cancelled() {
                break;
            }
            match command {
                Command::Provider(change) => self.handle_change(change).await,
                Command::ExplicitSignOut => self.ctx.explicit_sign_out = true,
                Command::RefreshProfile(done) => {
                    self.refresh_profile().await;
                    let _ = done.send(());
                }
                Command::Barrier(done) => {
                    let _ = done.send(());
                }
                Command::Shutdown => break,
            }
        }
        debug!("Session worker stopped");
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn mount(&mut self) {
        let tab_flag_set = self.tab_storage.get(&self.config.tab_flag_key).is_some();
        self.ctx.tab_active = tab_flag_set;

        if plan_mount(self.config.restore, tab_flag_set) == MountPlan::StartAnonymous {
            info!(
                event_name = "session.mount.new_tab",
                event_domain = "session",
                "New tab, starting in anonymous state"
            );
            self.publish(AuthState::anonymous());
            return;
        }

        // Read-only: forcing a refresh here would race the provider's own refresh.
        let session = match self.provider.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not read the stored session on mount: {}", e);
                None
            }
        };
        if self.is_cancelled() {
            return;
        }

        match session {
            Some(session) => {
                info!(
                    event_name = "session.mount.restored",
                    event_domain = "session",
                    user_id = session.user_id(),
                    "Session found on mount"
                );
                self.ctx.current_user_id = Some(session.user.id.clone());
                self.mark_tab_active();
                self.load_and_publish(session).await;
            }
            None => {
                if tab_flag_set {
                    info!("Tab flag set but no cookie session, resetting");
                }
                self.forget_user();
                self.publish(AuthState::anonymous());
            }
        }
    }

    async fn handle_change(&mut self, change: AuthChange) {
        let step = decide(&self.ctx, &change);
        debug!(
            auth_event = change.event.as_str(),
            phase = self.ctx.phase.name(),
            ?step,
            "handling auth change"
        );

        match step {
            Step::Ignore => {}
            Step::NoteRefresh => {
                if let Some(suppressed_count) =
                    self.log_throttle.admit("session.token_refreshed")
                {
                    info!(
                        event_name = "session.token_refreshed",
                        event_domain = "session",
                        suppressed_count,
                        "Token refreshed in background, session still active"
                    );
                }
                self.bump_refresh_count();
            }
            Step::RetryProfile(session) => {
                info!("Token refreshed, retrying profile fetch after an earlier failure");
                let (profile, seller_profile) =
                    fetch_profile(self.profiles.as_ref(), session.user_id()).await;
                if let Some(profile) = profile {
                    self.ctx.profile_loaded = true;
                    self.publish(AuthState::build(
                        Some(session.user),
                        Some(profile),
                        seller_profile,
                    ));
                }
                self.bump_refresh_count();
            }
            Step::ConfirmSignOut => {
                self.ctx.explicit_sign_out = false;
                info!(
                    event_name = "session.sign_out.explicit",
                    event_domain = "session",
                    "Explicit sign out, clearing auth state"
                );
                self.sign_out_locally();
            }
            Step::VerifySignOut => self.verify_sign_out().await,
            Step::Activate(session) => {
                info!(
                    event_name = "session.sign_in",
                    event_domain = "session",
                    user_id = session.user_id(),
                    "Signed in, fetching profile"
                );
                self.mark_tab_active();
                self.ctx.current_user_id = Some(session.user.id.clone());
                self.ctx.profile_loaded = false;
                self.load_and_publish(session).await;
                self.bump_refresh_count();
            }
            Step::Deduplicate => {
                info!("SIGNED_IN deduped, same user already active");
            }
            Step::Clear => {
                self.ctx.current_user_id = None;
                self.ctx.profile_loaded = false;
                self.publish(AuthState::anonymous());
            }
        }
    }

    /// A `SIGNED_OUT` this tab did not ask for is usually a failed background
    /// refresh. Try one refresh ourselves before believing it.
    async fn verify_sign_out(&mut self) {
        warn!(
            event_name = "session.sign_out.unconfirmed",
            event_domain = "session",
            "SIGNED_OUT received without explicit sign out, verifying with a refresh"
        );
        let refreshed = self.provider.refresh_session().await;
        if self.is_cancelled() {
            return;
        }

        match refreshed {
            Ok(session) => {
                info!(
                    event_name = "session.sign_out.spurious",
                    event_domain = "session",
                    user_id = session.user_id(),
                    "SIGNED_OUT was spurious, session recovered"
                );
                let unchanged = self.ctx.current_user_id.as_deref() == Some(session.user_id())
                    && self.ctx.profile_loaded;
                if !unchanged {
                    self.ctx.current_user_id = Some(session.user.id.clone());
                    self.load_and_publish(session).await;
                }
                self.bump_refresh_count();
            }
            Err(e) => {
                warn!(
                    event_name = "session.sign_out.confirmed",
                    event_domain = "session",
                    "SIGNED_OUT confirmed, refresh also failed: {}",
                    e
                );
                self.sign_out_locally();
            }
        }
    }

    async fn refresh_profile(&mut self) {
        let Some(user_id) = self.ctx.current_user_id.clone() else {
            debug!("refresh_profile called with no active user");
            return;
        };
        let (profile, seller_profile) = fetch_profile(self.profiles.as_ref(), &user_id).await;
        if let Some(profile) = profile {
            self.ctx.profile_loaded = true;
            let next = self.state.borrow().with_profile(profile, seller_profile);
            self.publish(next);
        }
    }

    /// Fetch the profile pair for the session's user and publish the rebuilt state.
    async fn load_and_publish(&mut self, session: Session) {
        let (profile, seller_profile) =
            fetch_profile(self.profiles.as_ref(), session.user_id()).await;
        if self.is_cancelled() {
            return;
        }
        self.ctx.profile_loaded = profile.is_some();
        self.publish(AuthState::build(
            Some(session.user),
            profile,
            seller_profile,
        ));
    }

    fn mark_tab_active(&mut self) {
        self.tab_storage.set(&self.config.tab_flag_key, TAB_FLAG_VALUE);
        self.ctx.tab_active = true;
    }

    fn forget_user(&mut self) {
        self.tab_storage.remove(&self.config.tab_flag_key);
        self.ctx.tab_active = false;
        self.ctx.current_user_id = None;
        self.ctx.profile_loaded = false;
    }

    fn sign_out_locally(&mut self) {
        self.forget_user();
        self.publish(AuthState::anonymous());
    }

    fn publish(&mut self, next: AuthState) {
        if self.is_cancelled() {
            return;
        }
        let phase = match next.user_id() {
            Some(user_id) => Phase::Authenticated {
                user_id: user_id.to_string(),
            },
            None => Phase::Anonymous,
        };
        debug_assert!(self.ctx.phase.allows(&phase));
        if self.ctx.phase != phase {
            debug!(from = self.ctx.phase.name(), to = phase.name(), "phase change");
        }
        self.ctx.phase = phase;
        self.state.send_replace(next);
    }

    fn bump_refresh_count(&self) {
        if self.is_cancelled() {
            return;
        }
        self.refresh_count.send_modify(|count| *count += 1);
    }
}
