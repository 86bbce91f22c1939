use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::lock::Mutex;
use reqwest::{Client, RequestBuilder, Response};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::base::{AuthChange, AuthEvent, AuthProvider};
use super::listeners::{AuthListener, AuthListeners, Subscription};
use crate::models::{Session, User};
use crate::utils::log_throttle::LogThrottle;

const REFRESH_LOG_WINDOW: Duration = Duration::from_secs(300);

fn default_timeout_in_ms() -> u64 {
    10_000
}

fn default_refresh_margin_secs() -> i64 {
    60
}

fn default_refresh_interval_secs() -> u64 {
    30
}

/// Config for a GoTrue-compatible auth server.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct RestAuthConfig {
    pub name: String,
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    pub anon_key: String,
    /// Where the session is persisted between runs. In-memory when unset.
    #[serde(default)]
    pub session_file: Option<String>,
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
    #[serde(default)]
    pub auto_refresh: bool,
    /// Refresh once the access token expires within this many seconds.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

/// Session payload returned by the token endpoints.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: User,
}

impl From<TokenResponse> for Session {
    fn from(res: TokenResponse) -> Self {
        let expires_at = res
            .expires_at
            .or_else(|| res.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Session {
            access_token: res.access_token,
            refresh_token: res.refresh_token,
            expires_at,
            user: res.user,
        }
    }
}

/// Why a refresh-token exchange failed.
#[derive(Debug)]
enum RefreshFailure {
    /// The server rejected the refresh token; the session is gone for good.
    Rejected(String),
    /// The request never got a usable answer (network, timeout, 5xx).
    Transport(String),
}

impl RefreshFailure {
    fn message(&self) -> &str {
        match self {
            RefreshFailure::Rejected(msg) | RefreshFailure::Transport(msg) => msg,
        }
    }
}

/// Auth provider speaking the GoTrue REST protocol.
pub struct RestAuthProvider {
    pub config: RestAuthConfig,
    client: Client,
    session: Mutex<Option<Session>>,
    listeners: AuthListeners,
    log_throttle: LogThrottle,
}

impl RestAuthProvider {
    pub fn new(config: &RestAuthConfig) -> Self {
        info!(
            "Creating REST auth provider '{}' for {}",
            config.name, config.url
        );
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_in_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            config: config.clone(),
            client,
            session: Mutex::new(None),
            listeners: AuthListeners::new(),
            log_throttle: LogThrottle::new(REFRESH_LOG_WINDOW),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn with_keys(&self, request: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.config.anon_key))
    }

    fn notify(&self, event: AuthEvent, session: Option<Session>) {
        self.listeners.notify(AuthChange::new(event, session));
    }

    /// Replace the cached session and mirror it to the session file.
    async fn store_session(&self, session: Option<Session>) {
        *self.session.lock().await = session.clone();

        let Some(path) = &self.config.session_file else {
            return;
        };
        let result = match &session {
            Some(s) => match serde_json::to_string(s) {
                Ok(body) => tokio::fs::write(path, body).await,
                Err(e) => {
                    error!("Failed to serialize session: {}", e);
                    return;
                }
            },
            None => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = result {
            warn!("Failed to update session file '{}': {}", path, e);
        }
    }

    async fn read_session_file(&self, path: &str) -> Result<Option<Session>, String> {
        match tokio::fs::read_to_string(path).await {
            Ok(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| format!("Corrupt session file '{}': {}", path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("Failed to read session file '{}': {}", path, e)),
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<Session, RefreshFailure> {
        let res = self
            .with_keys(
                self.client
                    .post(self.endpoint("token?grant_type=refresh_token")),
                None,
            )
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshFailure::Transport(format!("Failed to fetch: {}", e)))?;

        let status = res.status();
        if status.is_success() {
            let body: TokenResponse = res
                .json()
                .await
                .map_err(|e| RefreshFailure::Transport(format!("Invalid token response: {}", e)))?;
            Ok(body.into())
        } else if status.is_client_error() {
            Err(RefreshFailure::Rejected(error_message(res).await))
        } else {
            Err(RefreshFailure::Transport(error_message(res).await))
        }
    }

    /// One pass of the background refresh loop.
    ///
    /// A failed refresh is announced as `SIGNED_OUT` even when it was only a
    /// transport error; listeners are expected to verify before logging out.
    /// Only a rejected refresh token discards the stored session.
    pub async fn auto_refresh_tick(&self) {
        let current = match self.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                warn!("Background refresh could not read session: {}", e);
                return;
            }
        };
        if !current.expires_within(self.config.refresh_margin_secs) {
            return;
        }

        match self.request_refresh(&current.refresh_token).await {
            Ok(session) => {
                self.store_session(Some(session.clone())).await;
                if let Some(suppressed_count) =
                    self.log_throttle.admit("providers.rest.auto_refresh.ok")
                {
                    info!(
                        event_name = "providers.rest.auto_refresh.ok",
                        event_domain = "providers",
                        provider_name = self.config.name.as_str(),
                        suppressed_count,
                        "access token refreshed in background"
                    );
                }
                self.notify(AuthEvent::TokenRefreshed, Some(session));
            }
            Err(RefreshFailure::Rejected(msg)) => {
                warn!("Background refresh rejected, session ended: {}", msg);
                self.store_session(None).await;
                self.notify(AuthEvent::SignedOut, None);
            }
            Err(RefreshFailure::Transport(msg)) => {
                // The refresh token is still good; keep it for the listener's retry.
                warn!("Background refresh failed: {}", msg);
                self.notify(AuthEvent::SignedOut, None);
            }
        }
    }
}

/// Run `auto_refresh_tick` on an interval for as long as the provider lives.
pub fn spawn_auto_refresh(provider: &Arc<RestAuthProvider>) -> JoinHandle<()> {
    let weak = Arc::downgrade(provider);
    let period = Duration::from_secs(provider.config.refresh_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let Some(provider) = weak.upgrade() else {
                debug!("Auth provider dropped, stopping background refresh");
                break;
            };
            provider.auto_refresh_tick().await;
        }
    })
}

/// Pull a human readable message out of a GoTrue error body.
async fn error_message(res: Response) -> String {
    let status = res.status();
    let body: Value = res.json().await.unwrap_or(Value::Null);
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}

#[async_trait::async_trait]
impl AuthProvider for RestAuthProvider {
    fn get_name(&self) -> &str {
        &self.config.name
    }

    fn get_type(&self) -> &str {
        "rest"
    }

    async fn get_session(&self) -> Result<Option<Session>, String> {
        match &self.config.session_file {
            Some(path) => {
                let stored = self.read_session_file(path).await?;
                *self.session.lock().await = stored.clone();
                Ok(stored)
            }
            None => Ok(self.session.lock().await.clone()),
        }
    }

    async fn refresh_session(&self) -> Result<Session, String> {
        let current = self
            .get_session()
            .await?
            .ok_or_else(|| "Auth session missing!".to_string())?;

        match self.request_refresh(&current.refresh_token).await {
            Ok(session) => {
                self.store_session(Some(session.clone())).await;
                self.notify(AuthEvent::SignedIn, Some(session.clone()));
                Ok(session)
            }
            Err(failure) => {
                if let RefreshFailure::Rejected(_) = failure {
                    self.store_session(None).await;
                }
                Err(failure.message().to_string())
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, String> {
        debug!("Password sign-in attempt for '{}'", email);
        let res = self
            .with_keys(self.client.post(self.endpoint("token?grant_type=password")), None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| format!("Failed to fetch: {}", e))?;

        if !res.status().is_success() {
            return Err(error_message(res).await);
        }
        let session: Session = res
            .json::<TokenResponse>()
            .await
            .map_err(|e| format!("Invalid token response: {}", e))?
            .into();

        self.store_session(Some(session.clone())).await;
        self.notify(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<(), String> {
        let res = self
            .with_keys(self.client.post(self.endpoint("signup")), None)
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await
            .map_err(|e| format!("Failed to fetch: {}", e))?;

        if res.status().is_success() {
            info!("Registered new account '{}'", email);
            Ok(())
        } else {
            Err(error_message(res).await)
        }
    }

    async fn sign_out(&self) -> Result<(), String> {
        let current = self.session.lock().await.clone();
        let remote = match current {
            Some(session) => {
                let res = self
                    .with_keys(
                        self.client.post(self.endpoint("logout")),
                        Some(&session.access_token),
                    )
                    .send()
                    .await;
                match res {
                    Ok(res) if res.status().is_success() => Ok(()),
                    Ok(res) => Err(error_message(res).await),
                    Err(e) => Err(format!("Failed to fetch: {}", e)),
                }
            }
            None => Ok(()),
        };

        self.store_session(None).await;
        self.notify(AuthEvent::SignedOut, None);
        remote
    }

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}
