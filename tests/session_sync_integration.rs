mod common;

use std::time::Duration;

use authsync::config::RestoreStrategy;
use authsync::models::{Profile, Role};
use authsync::providers::plain_provider::CookieJar;
use authsync::providers::AuthEvent;
use authsync::storage::MemoryTabStorage;
use common::*;

#[tokio::test]
async fn new_tab_starts_anonymous_even_with_cookie_session() {
    let jar = CookieJar::default();
    let other_tab = Tab::signed_in(BUYER_EMAIL).await;
    *jar.lock().unwrap() = other_tab.provider.current_cookie();

    let tab = Tab::open(jar, MemoryTabStorage::new(), RestoreStrategy::TabGated);
    let state = tab.session.wait_until_loaded().await;

    assert!(!state.is_authenticated);
    assert_eq!(tab.provider.get_session_calls(), 0);
    assert!(tab.tab_flag().is_none());

    // Background events for the cookie session do not leak into this tab.
    assert!(tab.provider.emit_token_refreshed());
    tab.provider.emit_spurious_sign_out();
    tab.session.settle().await;
    assert!(!tab.state().is_authenticated);
    assert_eq!(tab.profiles.profile_fetches(), 0);
    assert_eq!(tab.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn reload_with_seeded_cookie_is_authenticated() {
    let seller_tab = Tab::signed_in(SELLER_EMAIL).await;
    let jar = CookieJar::default();
    *jar.lock().unwrap() = seller_tab.provider.current_cookie();

    let tab = Tab::open(
        jar,
        MemoryTabStorage::with_entry(TAB_FLAG, "1"),
        RestoreStrategy::TabGated,
    );
    let state = tab.session.wait_until_loaded().await;

    assert!(state.is_authenticated);
    assert_eq!(state.user_id(), Some("u-seller"));
    assert!(state.is_seller);
    assert!(!state.is_admin);
    assert_eq!(
        state.seller_profile.map(|s| s.store_name),
        Some("Sam's Cards".to_string())
    );
    assert_eq!(tab.provider.get_session_calls(), 1);
    assert_eq!(tab.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn stale_tab_flag_is_cleared_when_cookie_is_gone() {
    let tab = Tab::open(
        CookieJar::default(),
        MemoryTabStorage::with_entry(TAB_FLAG, "1"),
        RestoreStrategy::TabGated,
    );
    let state = tab.session.wait_until_loaded().await;

    assert!(!state.is_authenticated);
    assert!(!state.loading);
    assert!(tab.tab_flag().is_none());
}

#[tokio::test]
async fn cookie_strategy_adopts_session_in_new_tab() {
    let buyer_tab = Tab::signed_in(BUYER_EMAIL).await;
    let jar = CookieJar::default();
    *jar.lock().unwrap() = buyer_tab.provider.current_cookie();

    let tab = Tab::open(jar, MemoryTabStorage::new(), RestoreStrategy::Cookie);
    let state = tab.session.wait_until_loaded().await;

    assert!(state.is_authenticated);
    assert_eq!(state.user_id(), Some("u-buyer"));
    assert_eq!(tab.tab_flag().as_deref(), Some("1"));
}

#[tokio::test]
async fn sign_in_builds_state_and_sets_tab_flag() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;
    let state = tab.state();

    assert!(state.is_authenticated);
    assert!(!state.is_seller);
    assert_eq!(state.profile.map(|p| p.full_name), Some("Ana Buyer".to_string()));
    assert_eq!(tab.tab_flag().as_deref(), Some("1"));
    assert_eq!(tab.profiles.profile_fetches(), 1);
    assert_eq!(tab.profiles.seller_fetches(), 0);
    assert_eq!(tab.session.token_refresh_count(), 1);
}

#[tokio::test]
async fn seller_and_admin_flags() {
    let seller = Tab::signed_in(SELLER_EMAIL).await.state();
    assert!(seller.is_seller);
    assert!(!seller.is_admin);
    assert!(seller.seller_profile.is_some());

    let admin = Tab::signed_in(ADMIN_EMAIL).await.state();
    assert!(admin.is_seller);
    assert!(admin.is_admin);
    assert!(admin.seller_profile.is_none());
}

#[tokio::test]
async fn duplicate_signed_in_fetches_once() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;
    let before = tab.state();

    tab.provider
        .emit(AuthEvent::SignedIn, tab.provider.current_cookie());
    tab.provider
        .emit(AuthEvent::SignedIn, tab.provider.current_cookie());
    tab.session.settle().await;

    assert_eq!(tab.profiles.profile_fetches(), 1);
    assert_eq!(tab.state(), before);
}

#[tokio::test]
async fn token_refresh_does_not_refetch_profile() {
    let tab = Tab::signed_in(SELLER_EMAIL).await;
    let before = tab.state();
    let mut updates = tab.session.subscribe();
    updates.borrow_and_update();

    for _ in 0..3 {
        assert!(tab.provider.emit_token_refreshed());
    }
    tab.session.settle().await;

    assert_eq!(tab.profiles.profile_fetches(), 1);
    assert_eq!(tab.profiles.seller_fetches(), 1);
    assert_eq!(tab.state(), before);
    assert!(!updates.has_changed().expect("worker alive"));
    assert_eq!(tab.session.token_refresh_count(), 4);
}

#[tokio::test]
async fn explicit_sign_out_skips_verification() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;

    tab.session.sign_out().await;
    tab.session.settle().await;

    let state = tab.state();
    assert!(!state.is_authenticated);
    assert!(!state.loading);
    assert_eq!(tab.provider.refresh_calls(), 0);
    assert!(tab.tab_flag().is_none());
    assert!(tab.provider.current_cookie().is_none());
}

#[tokio::test]
async fn spurious_sign_out_is_recovered_without_flicker() {
    let tab = Tab::signed_in(SELLER_EMAIL).await;
    let before = tab.state();
    let count_before = tab.session.token_refresh_count();
    let mut updates = tab.session.subscribe();
    updates.borrow_and_update();

    tab.provider.emit_spurious_sign_out();
    tab.session.settle().await;
    // The recovery refresh reports a SIGNED_IN of its own.
    tab.session.settle().await;

    assert_eq!(tab.provider.refresh_calls(), 1);
    assert_eq!(tab.state(), before);
    assert!(!updates.has_changed().expect("worker alive"));
    assert_eq!(tab.profiles.profile_fetches(), 1);
    assert_eq!(tab.session.token_refresh_count(), count_before + 1);
    assert_eq!(tab.tab_flag().as_deref(), Some("1"));
}

#[tokio::test]
async fn spurious_sign_out_confirmed_when_refresh_fails() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;
    tab.provider.fail_next_refreshes(1);

    tab.provider.emit_spurious_sign_out();
    tab.session.settle().await;

    assert!(!tab.state().is_authenticated);
    assert_eq!(tab.provider.refresh_calls(), 1);
    assert!(tab.tab_flag().is_none());
}

#[tokio::test]
async fn sign_in_after_sign_out_same_user_reactivates() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;
    tab.session.sign_out().await;
    tab.session.settle().await;

    tab.session
        .sign_in(BUYER_EMAIL, PASSWORD)
        .await
        .expect("sign in should succeed");
    tab.session.settle().await;

    assert!(tab.state().is_authenticated);
    assert_eq!(tab.profiles.profile_fetches(), 2);
}

#[tokio::test]
async fn switching_user_refetches() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;

    tab.session
        .sign_in(ADMIN_EMAIL, PASSWORD)
        .await
        .expect("sign in should succeed");
    tab.session.settle().await;

    let state = tab.state();
    assert_eq!(state.user_id(), Some("u-admin"));
    assert!(state.is_admin);
    assert_eq!(tab.profiles.profile_fetches(), 2);
}

#[tokio::test]
async fn sessionless_event_clears_state() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;

    tab.provider.emit(AuthEvent::InitialSession, None);
    tab.session.settle().await;

    assert!(!tab.state().is_authenticated);
}

#[tokio::test]
async fn profile_network_error_keeps_user_and_retries_on_refresh() {
    let tab = Tab::fresh().await;
    tab.profiles.fail_next_fetches(1);

    tab.session
        .sign_in(SELLER_EMAIL, PASSWORD)
        .await
        .expect("sign in should succeed");
    tab.session.settle().await;

    let state = tab.state();
    assert!(state.is_authenticated);
    assert!(state.profile.is_none());
    assert!(!state.is_seller);

    assert!(tab.provider.emit_token_refreshed());
    tab.session.settle().await;

    let state = tab.state();
    assert_eq!(tab.profiles.profile_fetches(), 2);
    assert!(state.is_seller);
    assert!(state.seller_profile.is_some());
}

#[tokio::test]
async fn seller_row_error_keeps_seller_role() {
    let tab = Tab::fresh().await;
    tab.profiles.fail_next_seller_fetches(1);

    tab.session
        .sign_in(SELLER_EMAIL, PASSWORD)
        .await
        .expect("sign in should succeed");
    tab.session.settle().await;

    let state = tab.state();
    assert!(state.is_authenticated);
    assert!(state.is_seller);
    assert_eq!(state.profile.map(|p| p.role), Some(Role::Seller));
    assert!(state.seller_profile.is_none());
    assert_eq!(tab.profiles.seller_fetches(), 1);
}

#[tokio::test]
async fn refresh_profile_is_noop_when_signed_out() {
    let tab = Tab::fresh().await;

    tab.session.refresh_profile().await;

    assert_eq!(tab.profiles.profile_fetches(), 0);
    assert!(!tab.state().is_authenticated);
}

#[tokio::test]
async fn refresh_profile_picks_up_role_change() {
    let tab = Tab::signed_in(BUYER_EMAIL).await;
    assert!(!tab.state().is_seller);

    tab.profiles
        .set_profile(Profile::new("u-buyer", "Ana Buyer", Role::Seller));
    tab.session.refresh_profile().await;

    let state = tab.state();
    assert!(state.is_seller);
    assert_eq!(state.user_id(), Some("u-buyer"));
    assert_eq!(tab.profiles.profile_fetches(), 2);
    assert_eq!(tab.profiles.seller_fetches(), 1);
}

#[tokio::test]
async fn sign_in_error_surfaces_provider_message() {
    let tab = Tab::fresh().await;

    let err = tab
        .session
        .sign_in(BUYER_EMAIL, "wrong-password")
        .await
        .expect_err("sign in should fail");
    tab.session.settle().await;

    assert_eq!(err, "Invalid login credentials");
    assert!(!tab.state().is_authenticated);
    assert_eq!(tab.profiles.profile_fetches(), 0);
}

#[tokio::test]
async fn sign_up_registers_without_signing_in() {
    let tab = Tab::fresh().await;

    tab.session
        .sign_up("new@example.com", "longenough", "New Person")
        .await
        .expect("sign up should succeed");
    tab.session.settle().await;
    assert!(!tab.state().is_authenticated);

    let err = tab
        .session
        .sign_up("new@example.com", "longenough", "New Person")
        .await
        .expect_err("duplicate sign up should fail");
    assert_eq!(err, "User already registered");

    let err = tab
        .session
        .sign_up("short@example.com", "abc", "Short")
        .await
        .expect_err("short password should fail");
    assert!(err.contains("at least 6"));

    tab.session
        .sign_in("new@example.com", "longenough")
        .await
        .expect("new account can sign in");
    tab.session.settle().await;
    let state = tab.state();
    assert!(state.is_authenticated);
    // No profile row exists for the new account yet.
    assert!(state.profile.is_none());
}

#[tokio::test]
async fn shutdown_discards_in_flight_fetch() {
    let tab = Tab::fresh().await;
    tab.profiles.pause();

    tab.session
        .sign_in(SELLER_EMAIL, PASSWORD)
        .await
        .expect("sign in should succeed");
    while tab.profiles.profile_fetches() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tab.session.shutdown();
    assert_eq!(tab.provider.subscriber_count(), 0);
    tab.profiles.resume();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(tab.session.is_cancelled());
    assert!(!tab.state().is_authenticated);
    assert_eq!(tab.session.token_refresh_count(), 0);

    // Events after shutdown go nowhere.
    tab.provider.emit_spurious_sign_out();
    tab.session.settle().await;
    assert_eq!(tab.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn wait_until_loaded_resolves_once() {
    let tab = Tab::fresh().await;
    let first = tab.session.wait_until_loaded().await;
    let second = tab.session.wait_until_loaded().await;
    assert_eq!(first, second);
    assert!(!first.loading);
}
