use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::user::User;

/// A provider-issued session. The synchronizer only ever looks at `user.id`;
/// token validity is left to the provider's own refresh logic.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    /// Create a session whose access token expires `ttl_secs` from now.
    /// Token strings are random (UUID v4).
    pub fn issue(user: User, ttl_secs: i64) -> Self {
        Session {
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: uuid::Uuid::new_v4().to_string(),
            expires_at: Some(Utc::now().timestamp() + ttl_secs),
            user,
        }
    }

    /// True when the access token expires within `margin_secs` from now.
    /// Sessions without an expiry never need refreshing.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(exp) => exp - Utc::now().timestamp() <= margin_secs,
            None => false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}
