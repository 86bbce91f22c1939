use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::ProfileStore;
use crate::models::{Profile, SellerProfile};

/// Rows served by the in-memory store.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct PlainProfileConfig {
    pub name: String,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub seller_profiles: Vec<SellerProfile>,
}

/// An in-memory profile store with call counters and failure injection.
pub struct PlainProfileStore {
    name: String,
    profiles: Mutex<HashMap<String, Profile>>,
    seller_profiles: Mutex<HashMap<String, SellerProfile>>,
    failing_fetches: AtomicU32,
    failing_seller_fetches: AtomicU32,
    profile_fetches: AtomicU32,
    seller_fetches: AtomicU32,
    paused: watch::Sender<bool>,
}

impl PlainProfileStore {
    pub fn new(config: &PlainProfileConfig) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            name: config.name.clone(),
            profiles: Mutex::new(
                config
                    .profiles
                    .iter()
                    .map(|p| (p.id.clone(), p.clone()))
                    .collect(),
            ),
            seller_profiles: Mutex::new(
                config
                    .seller_profiles
                    .iter()
                    .map(|p| (p.id.clone(), p.clone()))
                    .collect(),
            ),
            failing_fetches: AtomicU32::new(0),
            failing_seller_fetches: AtomicU32::new(0),
            profile_fetches: AtomicU32::new(0),
            seller_fetches: AtomicU32::new(0),
            paused,
        }
    }

    pub fn empty(name: &str) -> Self {
        Self::new(&PlainProfileConfig {
            name: name.to_string(),
            profiles: Vec::new(),
            seller_profiles: Vec::new(),
        })
    }

    pub fn set_profile(&self, profile: Profile) {
        lock(&self.profiles).insert(profile.id.clone(), profile);
    }

    pub fn set_seller_profile(&self, seller_profile: SellerProfile) {
        lock(&self.seller_profiles).insert(seller_profile.id.clone(), seller_profile);
    }

    /// Make the next `count` profile lookups fail like a dropped connection.
    pub fn fail_next_fetches(&self, count: u32) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Same as `fail_next_fetches`, for `seller_profiles` lookups only.
    pub fn fail_next_seller_fetches(&self, count: u32) {
        self.failing_seller_fetches.store(count, Ordering::SeqCst);
    }

    /// Hold every lookup until `resume` is called.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn profile_fetches(&self) -> u32 {
        self.profile_fetches.load(Ordering::SeqCst)
    }

    pub fn seller_fetches(&self) -> u32 {
        self.seller_fetches.load(Ordering::SeqCst)
    }

    async fn wait_until_resumed(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|paused| !*paused).await;
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProfileStore for PlainProfileStore {
    fn get_name(&self) -> &str {
        &self.name
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, String> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        self.wait_until_resumed().await;
        if Self::take_failure(&self.failing_fetches) {
            debug!("Plain profile store failing lookup for '{}'", user_id);
            return Err("TypeError: Failed to fetch".to_string());
        }
        Ok(lock(&self.profiles).get(user_id).cloned())
    }

    async fn get_seller_profile(&self, user_id: &str) -> Result<Option<SellerProfile>, String> {
        self.seller_fetches.fetch_add(1, Ordering::SeqCst);
        self.wait_until_resumed().await;
        if Self::take_failure(&self.failing_seller_fetches) {
            debug!("Plain profile store failing seller lookup for '{}'", user_id);
            return Err("TypeError: Failed to fetch".to_string());
        }
        Ok(lock(&self.seller_profiles).get(user_id).cloned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
