use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ProfileStore;
use crate::models::{Profile, SellerProfile};
use crate::providers::AuthProvider;

fn default_timeout_in_ms() -> u64 {
    10_000
}

/// Config for a PostgREST endpoint exposing the profile tables.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct RestProfileConfig {
    pub name: String,
    pub url: String,
    pub anon_key: String,
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
}

pub struct RestProfileStore {
    pub config: RestProfileConfig,
    client: Client,
    auth: Arc<dyn AuthProvider>,
}

impl RestProfileStore {
    pub fn new(config: &RestProfileConfig, auth: Arc<dyn AuthProvider>) -> Self {
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
            auth,
        }
    }

    /// Fetch the single row of `table` whose primary key is `id`.
    async fn fetch_row<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>, String> {
        // Rows are protected by row-level security, so send the user's token when there is one.
        let bearer = match self.auth.get_session().await {
            Ok(Some(session)) => session.access_token,
            _ => self.config.anon_key.clone(),
        };

        let url = format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table);
        debug!("Fetching {} row for id '{}'", table, id);
        let res = self
            .client
            .get(&url)
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())])
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch {}: {}", table, e))?;

        if !res.status().is_success() {
            return Err(format!("{} lookup failed: {}", table, res.status()));
        }

        let mut rows: Vec<T> = res
            .json()
            .await
            .map_err(|e| format!("Failed to parse {} row: {}", table, e))?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.swap_remove(0)))
        }
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    fn get_name(&self) -> &str {
        &self.config.name
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, String> {
        self.fetch_row("profiles", user_id).await
    }

    async fn get_seller_profile(&self, user_id: &str) -> Result<Option<SellerProfile>, String> {
        self.fetch_row("seller_profiles", user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Session, User};
    use crate::providers::plain_provider::{PlainAuthConfig, PlainAuthProvider};
    use mockito::{Matcher, Server};

    fn plain_auth() -> Arc<PlainAuthProvider> {
        Arc::new(PlainAuthProvider::new(&PlainAuthConfig {
            name: "auth".to_string(),
            users: vec![],
            token_ttl_secs: 3600,
        }))
    }

    fn test_config(url: &str) -> RestProfileConfig {
        RestProfileConfig {
            name: "TestProfiles".to_string(),
            url: url.to_string(),
            anon_key: "anon".to_string(),
            timeout_in_ms: 2_000,
        }
    }

    /// Test that the profile row is fetched with the user's access token.
    #[tokio::test]
    async fn test_get_profile_uses_session_token() {
        let auth = plain_auth();
        let mut session = Session::issue(User::new("u1", None, None), 3600);
        session.access_token = "user-token".to_string();
        auth.set_cookie_session(Some(session));

        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.u1".into()),
                Matcher::UrlEncoded("select".into(), "*".into()),
            ]))
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer user-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": "u1", "full_name": "Ana", "role": "seller"}]"#)
            .create_async()
            .await;

        let store = RestProfileStore::new(&test_config(&server.url()), auth);
        let profile = store.get_profile("u1").await.expect("lookup ok");
        m.assert_async().await;

        assert_eq!(profile.map(|p| p.role), Some(Role::Seller));
    }

    /// Test that an empty result set is reported as a missing row.
    #[tokio::test]
    async fn test_missing_row() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/rest/v1/seller_profiles")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer anon")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let store = RestProfileStore::new(&test_config(&server.url()), plain_auth());
        let result = store.get_seller_profile("u1").await;
        m.assert_async().await;

        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let store = RestProfileStore::new(&test_config(&server.url()), plain_auth());
        assert!(store.get_profile("u1").await.is_err());
    }
}
