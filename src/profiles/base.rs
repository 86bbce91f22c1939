use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::plain_store::{PlainProfileConfig, PlainProfileStore};
use super::rest_store::{RestProfileConfig, RestProfileStore};
use crate::models::{Profile, SellerProfile};
use crate::providers::AuthProvider;

/// The existing profile store backends, told apart by a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
#[serde(tag = "type")]
pub enum ProfileStoreConfig {
    #[serde(rename = "plain")]
    Plain(PlainProfileConfig),

    #[serde(rename = "rest")]
    Rest(RestProfileConfig),
}

/// Row lookups on the `profiles` and `seller_profiles` tables.
///
/// `Ok(None)` means the row does not exist; `Err` is a transport or decoding
/// failure. Callers decide whether to absorb either.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    fn get_name(&self) -> &str;
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, String>;
    async fn get_seller_profile(&self, user_id: &str) -> Result<Option<SellerProfile>, String>;
}

/// Creates a concrete profile store from the config. The REST store reads
/// the current access token from `auth` for row-level security.
pub fn create_profile_store(
    config: &ProfileStoreConfig,
    auth: Arc<dyn AuthProvider>,
) -> Arc<dyn ProfileStore> {
    match config {
        ProfileStoreConfig::Plain(cfg) => {
            info!("Using in-memory profile store '{}'", cfg.name);
            Arc::new(PlainProfileStore::new(cfg))
        }
        ProfileStoreConfig::Rest(cfg) => {
            info!("Using REST profile store '{}' at {}", cfg.name, cfg.url);
            Arc::new(RestProfileStore::new(cfg, auth))
        }
    }
}
