//! Integration tests for form-facing auth operations.

use std::sync::Arc;

use ecomops_auth::{
    ACCESS_TOKEN_KEY, AuthClient, AuthError, Credentials, MemoryTokenStore, REFRESH_TOKEN_KEY,
    SyntheticAuthProvider, TokenStore,
};

fn client_with(provider: &Arc<SyntheticAuthProvider>) -> AuthClient {
    AuthClient::new(provider.clone())
}

#[test]
fn auth_client_tests_login_caches_both_tokens() {
    let provider = Arc::new(SyntheticAuthProvider::with_account("ops@example.test", "pw"));
    let store = MemoryTokenStore::new();

    let session = client_with(&provider)
        .login(&Credentials::new("ops@example.test", "pw"), &store)
        .expect("login should succeed");
    assert_eq!(store.get(ACCESS_TOKEN_KEY), Some(session.access_token));
    assert_eq!(store.get(REFRESH_TOKEN_KEY), Some(session.refresh_token));
}

#[test]
fn auth_client_tests_login_surfaces_provider_message_verbatim() {
    let provider = Arc::new(SyntheticAuthProvider::with_account("ops@example.test", "pw"));
    let store = MemoryTokenStore::new();

    let error = client_with(&provider)
        .login(&Credentials::new("ops@example.test", "wrong"), &store)
        .expect_err("login should fail");
    assert_eq!(error.to_string(), "Invalid login credentials");
    assert!(store.is_empty());
}

#[test]
fn auth_client_tests_blank_credentials_never_reach_provider() {
    let provider = Arc::new(SyntheticAuthProvider::new());
    let store = MemoryTokenStore::new();

    let error = client_with(&provider)
        .login(&Credentials::new("  ", "pw"), &store)
        .expect_err("blank email should fail");
    assert!(matches!(error, AuthError::EmptyCredential));
    assert!(provider.calls().is_empty());
}

#[test]
fn auth_client_tests_change_password_verifies_current_password() {
    let provider = Arc::new(SyntheticAuthProvider::with_account("ops@example.test", "old"));
    provider
        .issue_session("ops@example.test")
        .expect("session should be issued");
    let client = client_with(&provider);

    let error = client
        .change_password("not-old", "new")
        .expect_err("wrong current password should fail");
    assert!(matches!(error, AuthError::IncorrectPassword));
    assert_eq!(provider.password_of("ops@example.test").as_deref(), Some("old"));

    client
        .change_password("old", "new")
        .expect("password change should succeed");
    assert_eq!(provider.password_of("ops@example.test").as_deref(), Some("new"));
}

#[test]
fn auth_client_tests_change_password_requires_session() {
    let provider = Arc::new(SyntheticAuthProvider::with_account("ops@example.test", "old"));
    let error = client_with(&provider)
        .change_password("old", "new")
        .expect_err("no session should fail");
    assert!(matches!(error, AuthError::NoSession));
}

#[test]
fn auth_client_tests_password_reset_requires_https_redirect() {
    let provider = Arc::new(SyntheticAuthProvider::new());
    let client = client_with(&provider);

    assert!(matches!(
        client.request_password_reset("ops@example.test", "http://example.test/reset"),
        Err(AuthError::InvalidEndpoint(_))
    ));
    client
        .request_password_reset("ops@example.test", "https://example.test/reset")
        .expect("reset email should be requested");
    assert_eq!(provider.recovery_emails(), vec!["ops@example.test".to_string()]);
}

#[test]
fn auth_client_tests_logout_clears_cache() {
    let provider = Arc::new(SyntheticAuthProvider::with_account("ops@example.test", "pw"));
    let store = MemoryTokenStore::new();
    let client = client_with(&provider);
    client
        .login(&Credentials::new("ops@example.test", "pw"), &store)
        .expect("login should succeed");

    client.logout(&store).expect("logout should succeed");
    assert!(store.is_empty());
    assert_eq!(provider.call_count("sign_out"), 1);
}
