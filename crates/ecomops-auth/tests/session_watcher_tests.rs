//! Integration tests for provider state-change handling.

use ecomops_auth::{
    ACCESS_TOKEN_KEY, AuthChange, AuthContext, AuthEvent, AuthProvider, AuthState,
    MemoryTokenStore, SessionWatcher, SyntheticAuthProvider, TokenStore, WatchOutcome,
};

#[test]
fn session_watcher_tests_overwrites_cache_on_token_refresh() {
    let provider = SyntheticAuthProvider::with_account("ops@example.test", "pw");
    let first = provider
        .issue_session("ops@example.test")
        .expect("session should be issued");
    let store = MemoryTokenStore::new();
    let mut context = AuthContext::new(first.clone());
    let receiver = provider.subscribe();

    let refreshed = provider
        .set_session(&first.access_token, &first.refresh_token)
        .expect("refresh should succeed");

    let outcome = SessionWatcher::drain(&receiver, &mut context, &store);
    assert_eq!(outcome, WatchOutcome::Continue);
    assert_eq!(store.get(ACCESS_TOKEN_KEY), Some(refreshed.access_token.clone()));
    assert_eq!(context.access_token(0), Some(refreshed.access_token.as_str()));
}

#[test]
fn session_watcher_tests_redirects_and_clears_on_sign_out() {
    let provider = SyntheticAuthProvider::with_account("ops@example.test", "pw");
    let session = provider
        .issue_session("ops@example.test")
        .expect("session should be issued");
    let store = MemoryTokenStore::with_entries([(ACCESS_TOKEN_KEY, "a"), ("token", "legacy")]);
    let mut context = AuthContext::new(session);
    let receiver = provider.subscribe();

    provider.sign_out().expect("sign out should succeed");

    let outcome = SessionWatcher::drain(&receiver, &mut context, &store);
    assert_eq!(outcome, WatchOutcome::RedirectToLogin);
    assert!(store.is_empty());
    assert!(matches!(context.state(), AuthState::Unauthenticated));
}

#[test]
fn session_watcher_tests_treats_null_session_as_sign_out() {
    let provider = SyntheticAuthProvider::with_account("ops@example.test", "pw");
    let session = provider
        .issue_session("ops@example.test")
        .expect("session should be issued");
    let store = MemoryTokenStore::new();
    let mut context = AuthContext::new(session);

    let outcome = SessionWatcher::apply(
        AuthChange {
            event: AuthEvent::TokenRefreshed,
            session: None,
        },
        &mut context,
        &store,
    );
    assert_eq!(outcome, WatchOutcome::RedirectToLogin);
    assert!(!context.is_authenticated());
}

#[test]
fn session_watcher_tests_continue_with_no_pending_changes() {
    let provider = SyntheticAuthProvider::with_account("ops@example.test", "pw");
    let session = provider
        .issue_session("ops@example.test")
        .expect("session should be issued");
    let store = MemoryTokenStore::new();
    let mut context = AuthContext::new(session);
    let receiver = provider.subscribe();

    assert_eq!(
        SessionWatcher::drain(&receiver, &mut context, &store),
        WatchOutcome::Continue
    );
}
