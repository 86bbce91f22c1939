use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_tab_flag_key() -> String {
    "tab_active".to_string()
}

/// How a freshly started tab treats a session it finds in the cookie jar.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreStrategy {
    /// Only restore when this tab has signed in before (tab flag set).
    /// A new tab starts anonymous even if another tab is signed in.
    #[default]
    TabGated,
    /// Always adopt the cookie session on start.
    Cookie,
}

/// Settings for the session synchronizer.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub restore: RestoreStrategy,
    /// Key of the tab-activation flag in tab storage.
    #[serde(default = "default_tab_flag_key")]
    pub tab_flag_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            restore: RestoreStrategy::default(),
            tab_flag_key: default_tab_flag_key(),
        }
    }
}
