#![allow(dead_code)]

use std::sync::Arc;

use authsync::config::{RestoreStrategy, SessionConfig};
use authsync::models::{AuthState, Profile, Role, SellerProfile};
use authsync::profiles::plain_store::{PlainProfileConfig, PlainProfileStore};
use authsync::providers::plain_provider::{CookieJar, PlainAuthConfig, PlainAuthProvider, PlainUserEntry};
use authsync::session::SessionSynchronizer;
use authsync::storage::{MemoryTabStorage, TabStorage};

pub const TAB_FLAG: &str = "tab_active";

pub const BUYER_EMAIL: &str = "ana@example.com";
pub const SELLER_EMAIL: &str = "sam@example.com";
pub const ADMIN_EMAIL: &str = "root@example.com";
pub const PASSWORD: &str = "secret123";

fn account(id: &str, email: &str, full_name: &str) -> PlainUserEntry {
    PlainUserEntry {
        id: id.to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        full_name: Some(full_name.to_string()),
    }
}

pub fn provider_config() -> PlainAuthConfig {
    PlainAuthConfig {
        name: "test-auth".to_string(),
        users: vec![
            account("u-buyer", BUYER_EMAIL, "Ana Buyer"),
            account("u-seller", SELLER_EMAIL, "Sam Seller"),
            account("u-admin", ADMIN_EMAIL, "Root Admin"),
        ],
        token_ttl_secs: 3600,
    }
}

pub fn profile_config() -> PlainProfileConfig {
    PlainProfileConfig {
        name: "test-profiles".to_string(),
        profiles: vec![
            Profile::new("u-buyer", "Ana Buyer", Role::Buyer),
            Profile::new("u-seller", "Sam Seller", Role::Seller),
            Profile::new("u-admin", "Root Admin", Role::Admin),
        ],
        seller_profiles: vec![SellerProfile::new("u-seller", "Sam's Cards")],
    }
}

/// One browser tab: its own provider client and tab storage, sharing the
/// cookie jar with every other tab built from the same jar.
pub struct Tab {
    pub provider: Arc<PlainAuthProvider>,
    pub profiles: Arc<PlainProfileStore>,
    pub storage: Arc<MemoryTabStorage>,
    pub session: SessionSynchronizer,
}

impl Tab {
    pub fn open(jar: CookieJar, storage: MemoryTabStorage, restore: RestoreStrategy) -> Self {
        let provider = Arc::new(PlainAuthProvider::with_cookie_jar(&provider_config(), jar));
        let profiles = Arc::new(PlainProfileStore::new(&profile_config()));
        Self::open_with(provider, profiles, storage, restore)
    }

    pub fn open_with(
        provider: Arc<PlainAuthProvider>,
        profiles: Arc<PlainProfileStore>,
        storage: MemoryTabStorage,
        restore: RestoreStrategy,
    ) -> Self {
        let storage = Arc::new(storage);
        let session = SessionSynchronizer::start(
            provider.clone(),
            profiles.clone(),
            storage.clone(),
            SessionConfig {
                restore,
                tab_flag_key: TAB_FLAG.to_string(),
            },
        );
        Tab {
            provider,
            profiles,
            storage,
            session,
        }
    }

    /// A fresh tab with an empty cookie jar, already past its mount probe.
    pub async fn fresh() -> Self {
        let tab = Self::open(
            CookieJar::default(),
            MemoryTabStorage::new(),
            RestoreStrategy::TabGated,
        );
        tab.session.wait_until_loaded().await;
        tab
    }

    /// A fresh tab where `email` has signed in and every resulting event has
    /// been processed.
    pub async fn signed_in(email: &str) -> Self {
        let tab = Self::fresh().await;
        tab.session
            .sign_in(email, PASSWORD)
            .await
            .expect("sign in should succeed");
        tab.session.settle().await;
        tab
    }

    pub fn tab_flag(&self) -> Option<String> {
        self.storage.get(TAB_FLAG)
    }

    /// Snapshot of the state, after checking the derived-flag invariants.
    pub fn state(&self) -> AuthState {
        let state = self.session.state();
        assert_invariants(&state);
        state
    }
}

pub fn assert_invariants(state: &AuthState) {
    assert_eq!(state.is_authenticated, state.user.is_some());
    let role = state.profile.as_ref().map(|p| p.role);
    assert_eq!(
        state.is_seller,
        matches!(role, Some(Role::Seller) | Some(Role::Admin))
    );
    assert_eq!(state.is_admin, role == Some(Role::Admin));
}
