use std::collections::HashMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::listeners::{AuthListener, Subscription};
use super::plain_provider::{PlainAuthConfig, PlainAuthProvider};
use super::rest_provider::{spawn_auto_refresh, RestAuthConfig, RestAuthProvider};
use crate::models::Session;

/// Configuration options for the auth provider backing the synchronizer.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
#[serde(tag = "type")]
pub enum ProviderConfig {
    #[serde(rename = "plain")]
    PlainAuthConfig(PlainAuthConfig),

    #[serde(rename = "rest")]
    RestAuthConfig(RestAuthConfig),
}

/// Lifecycle events pushed by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl AuthEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthEvent::InitialSession => "INITIAL_SESSION",
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
        }
    }
}

/// One entry of the provider's event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(event: AuthEvent, session: Option<Session>) -> Self {
        AuthChange { event, session }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::user_id)
    }
}

/// The remote auth service as seen from one tab.
///
/// Implementations own the cross-tab persisted session (the "cookie") and
/// must notify listeners of every lifecycle change. `sign_out` always ends
/// the local session and emits `SIGNED_OUT`, even when the remote call fails.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    fn get_name(&self) -> &str;
    fn get_type(&self) -> &str;

    /// Read the persisted session without contacting the server.
    async fn get_session(&self) -> Result<Option<Session>, String>;

    /// Exchange the persisted refresh token for a fresh session.
    async fn refresh_session(&self) -> Result<Session, String>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, String>;

    /// Register a new identity. Never establishes a session by itself.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<(), String>;

    async fn sign_out(&self) -> Result<(), String>;

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription;
}

/// Create an auth provider from a given config. REST providers configured
/// with `auto_refresh` get their background refresh loop started here.
pub async fn create_auth_provider(config: &ProviderConfig) -> Arc<dyn AuthProvider> {
    match config {
        ProviderConfig::PlainAuthConfig(cfg) => Arc::new(PlainAuthProvider::new(cfg)),
        ProviderConfig::RestAuthConfig(cfg) => {
            let provider = Arc::new(RestAuthProvider::new(cfg));
            if cfg.auto_refresh {
                info!(
                    "Starting background token refresh for provider '{}' every {}s",
                    cfg.name, cfg.refresh_interval_secs
                );
                spawn_auto_refresh(&provider);
            }
            provider
        }
    }
}
