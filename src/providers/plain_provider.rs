use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::{AuthChange, AuthEvent, AuthProvider};
use super::listeners::{AuthListener, AuthListeners, Subscription};
use crate::models::{Session, User};

const MIN_PASSWORD_LEN: usize = 6;

fn default_token_ttl() -> i64 {
    3600
}

/// PlainAuthConfig seeds an in-memory provider with known accounts.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct PlainAuthConfig {
    /// A friendly name for logs.
    pub name: String,
    /// Accounts that can sign in with email/password.
    pub users: Vec<PlainUserEntry>,
    /// Lifetime of issued access tokens.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

/// Represents a single account (id + credentials).
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct PlainUserEntry {
    pub id: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

impl PlainUserEntry {
    fn to_user(&self) -> User {
        let metadata = self
            .full_name
            .as_ref()
            .map(|name| HashMap::from([("full_name".to_string(), Value::from(name.as_str()))]));
        User::new(self.id.clone(), Some(self.email.clone()), metadata)
    }
}

/// The session persisted across tabs. Several providers (one per tab) may
/// share the same jar.
pub type CookieJar = Arc<Mutex<Option<Session>>>;

/// An in-memory provider. Besides serving local setups it exposes hooks to
/// reproduce the provider's unreliable event stream: spurious sign-outs,
/// failing refreshes and arbitrary events.
pub struct PlainAuthProvider {
    pub config: PlainAuthConfig,
    accounts: Mutex<Vec<PlainUserEntry>>,
    cookie: CookieJar,
    listeners: AuthListeners,
    failing_refreshes: AtomicU32,
    refresh_calls: AtomicU32,
    get_session_calls: AtomicU32,
}

impl PlainAuthProvider {
    /// Create a provider with its own, empty cookie jar.
    pub fn new(config: &PlainAuthConfig) -> Self {
        Self::with_cookie_jar(config, CookieJar::default())
    }

    /// Create a provider sharing `cookie` with other providers, the way
    /// browser tabs share one cookie session.
    pub fn with_cookie_jar(config: &PlainAuthConfig, cookie: CookieJar) -> Self {
        info!(
            "Creating plain auth provider '{}' with {} account(s)",
            config.name,
            config.users.len()
        );
        Self {
            config: config.clone(),
            accounts: Mutex::new(config.users.clone()),
            cookie,
            listeners: AuthListeners::new(),
            failing_refreshes: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            get_session_calls: AtomicU32::new(0),
        }
    }

    pub fn cookie_jar(&self) -> CookieJar {
        self.cookie.clone()
    }

    /// Put a session straight into the cookie jar without emitting anything.
    pub fn set_cookie_session(&self, session: Option<Session>) {
        *lock(&self.cookie) = session;
    }

    /// Issue a session for a configured account without emitting anything,
    /// as if a sign-in happened in another tab.
    pub fn seed_cookie_for(&self, email: &str) -> Option<Session> {
        let user = lock(&self.accounts)
            .iter()
            .find(|entry| entry.email == email)
            .map(PlainUserEntry::to_user)?;
        let session = Session::issue(user, self.config.token_ttl_secs);
        self.set_cookie_session(Some(session.clone()));
        Some(session)
    }

    pub fn current_cookie(&self) -> Option<Session> {
        lock(&self.cookie).clone()
    }

    /// Push an arbitrary event to listeners.
    pub fn emit(&self, event: AuthEvent, session: Option<Session>) {
        self.listeners.notify(AuthChange::new(event, session));
    }

    /// Rotate the cookie tokens and emit `TOKEN_REFRESHED`, as the
    /// background refresh does. Returns false when there is no session.
    pub fn emit_token_refreshed(&self) -> bool {
        let refreshed = {
            let mut cookie = lock(&self.cookie);
            match cookie.as_ref() {
                Some(current) => {
                    let next = Session::issue(current.user.clone(), self.config.token_ttl_secs);
                    *cookie = Some(next.clone());
                    Some(next)
                }
                None => None,
            }
        };
        match refreshed {
            Some(session) => {
                self.emit(AuthEvent::TokenRefreshed, Some(session));
                true
            }
            None => false,
        }
    }

    /// Emit `SIGNED_OUT` while leaving the cookie intact: what a failed
    /// background refresh looks like from the outside.
    pub fn emit_spurious_sign_out(&self) {
        warn!("Plain provider '{}' emitting spurious SIGNED_OUT", self.config.name);
        self.emit(AuthEvent::SignedOut, None);
    }

    /// Make the next `count` refresh attempts fail with a transport error.
    pub fn fail_next_refreshes(&self, count: u32) {
        self.failing_refreshes.store(count, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn get_session_calls(&self) -> u32 {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    fn take_refresh_failure(&self) -> bool {
        self.failing_refreshes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AuthProvider for PlainAuthProvider {
    fn get_name(&self) -> &str {
        &self.config.name
    }

    fn get_type(&self) -> &str {
        "plain"
    }

    async fn get_session(&self) -> Result<Option<Session>, String> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current_cookie())
    }

    async fn refresh_session(&self) -> Result<Session, String> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_refresh_failure() {
            debug!("Plain provider '{}' failing refresh on request", self.config.name);
            return Err("Failed to fetch: network error".to_string());
        }

        let refreshed = {
            let mut cookie = lock(&self.cookie);
            let current = cookie
                .as_ref()
                .ok_or_else(|| "Auth session missing!".to_string())?;
            let next = Session::issue(current.user.clone(), self.config.token_ttl_secs);
            *cookie = Some(next.clone());
            next
        };
        // A successful manual refresh is reported as a sign-in by the real client.
        self.emit(AuthEvent::SignedIn, Some(refreshed.clone()));
        Ok(refreshed)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, String> {
        debug!("Password sign-in attempt for '{}'", email);
        let user = lock(&self.accounts)
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email) && entry.password == password)
            .map(PlainUserEntry::to_user)
            .ok_or_else(|| "Invalid login credentials".to_string())?;

        let session = Session::issue(user, self.config.token_ttl_secs);
        self.set_cookie_session(Some(session.clone()));
        self.emit(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<(), String> {
        if !email.contains('@') {
            return Err("Unable to validate email address: invalid format".to_string());
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "Password should be at least {} characters.",
                MIN_PASSWORD_LEN
            ));
        }

        let mut accounts = lock(&self.accounts);
        if accounts.iter().any(|entry| entry.email.eq_ignore_ascii_case(email)) {
            return Err("User already registered".to_string());
        }
        accounts.push(PlainUserEntry {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            password: password.to_string(),
            full_name: metadata
                .get("full_name")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
        info!("Registered new account '{}' on plain provider", email);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), String> {
        self.set_cookie_session(None);
        self.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
