use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The identity reported by the auth provider for a signed-in account.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata attached at sign-up (e.g. `full_name`).
    #[serde(default)]
    pub user_metadata: HashMap<String, Value>,
}

impl User {
    /// Construct a new User with optional email and metadata.
    pub fn new(
        id: impl Into<String>,
        email: Option<String>,
        user_metadata: Option<HashMap<String, Value>>,
    ) -> Self {
        User {
            id: id.into(),
            email,
            user_metadata: user_metadata.unwrap_or_default(),
        }
    }

    /// The `full_name` metadata entry, if it was provided as a string.
    pub fn full_name(&self) -> Option<&str> {
        self.user_metadata.get("full_name").and_then(Value::as_str)
    }
}
