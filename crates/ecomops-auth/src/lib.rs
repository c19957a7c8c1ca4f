#![warn(missing_docs)]
//! # ecomops-auth
//!
//! ## Purpose
//! Implements session lifecycle handling for ecomops pages.
//!
//! ## Responsibilities
//! - Model sessions, cached tokens and provider state-change notifications.
//! - Wrap the remote auth provider behind the [`AuthProvider`] seam.
//! - Bootstrap a page session from the provider or from cached tokens.
//! - Apply provider notifications to the page's [`AuthContext`].
//!
//! ## Data flow
//! Page load -> [`SessionBootstrapper::bootstrap`] -> [`AuthContext`] ->
//! resource loading. Provider pushes [`AuthChange`] values ->
//! [`SessionWatcher::drain`] -> token cache update or redirect.
//!
//! ## Ownership and lifetimes
//! The page owns one [`AuthContext`] for its whole lifetime. The token cache
//! is only a restoration fallback and is overwritten idempotently.
//!
//! ## Error model
//! Provider messages are surfaced verbatim through [`AuthError::Provider`]
//! so forms can show them to the user. Bootstrap failures never error: they
//! resolve to [`Bootstrap::RedirectToLogin`].
//!
//! ## Security and privacy notes
//! Token values are never logged; [`Session`]'s `Debug` output redacts them.
//!
//! ## Example
//! ```rust
//! use ecomops_auth::{Bootstrap, MemoryTokenStore, SessionBootstrapper, SyntheticAuthProvider};
//!
//! let provider = SyntheticAuthProvider::new();
//! let store = MemoryTokenStore::new();
//! assert!(matches!(
//!     SessionBootstrapper::bootstrap(&provider, &store),
//!     Bootstrap::RedirectToLogin(_)
//! ));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Cache key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "sb-access-token";
/// Cache key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "sb-refresh-token";
/// Bare token key written by older page revisions; only ever cleared.
pub const LEGACY_TOKEN_KEY: &str = "token";

/// Authenticated user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Provider user id.
    pub id: String,
    /// Account email.
    #[serde(default)]
    pub email: String,
}

/// Provider-issued credential pair plus user identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token for backend calls.
    pub access_token: String,
    /// Token used to restore or refresh the session.
    pub refresh_token: String,
    /// Signed-in user.
    pub user: User,
    /// Absolute expiry in epoch milliseconds, when the provider reports one.
    pub expires_at_ms: Option<u64>,
}

impl Session {
    /// Returns `true` when the access token has expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|expires_at| now_ms >= expires_at)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user", &self.user)
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Email/password pair collected by login and signup forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from form values.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    fn ensure_present(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        Ok(())
    }
}

/// Provider state-change kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in.
    SignedIn,
    /// The session ended.
    SignedOut,
    /// Tokens were rotated.
    TokenRefreshed,
    /// User attributes (password) changed.
    UserUpdated,
    /// The user arrived from a password recovery link.
    PasswordRecovery,
}

/// One push notification from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    /// What happened.
    pub event: AuthEvent,
    /// Session after the change, if any.
    pub session: Option<Session>,
}

/// Email kinds the provider can resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendKind {
    /// Signup confirmation email.
    Signup,
    /// Email-change confirmation.
    EmailChange,
}

impl ResendKind {
    /// Provider wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::EmailChange => "email_change",
        }
    }
}

/// Local key/value token cache (the page's persistent storage).
pub trait TokenStore: Send + Sync {
    /// Reads one key.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes one key.
    ///
    /// # Errors
    /// Returns [`AuthError::Storage`] when the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;

    /// Removes every key.
    ///
    /// # Errors
    /// Returns [`AuthError::Storage`] when the backing store cannot be written.
    fn clear(&self) -> Result<(), AuthError>;
}

/// In-memory token store for tests and ephemeral shells.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with `entries`.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.entries.lock() {
            for (key, value) in entries {
                map.insert(key.to_string(), value.to_string());
            }
        }
        store
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let mut map = self
            .entries
            .lock()
            .map_err(|_| AuthError::Storage("token store lock poisoned".to_string()))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut map = self
            .entries
            .lock()
            .map_err(|_| AuthError::Storage("token store lock poisoned".to_string()))?;
        map.clear();
        Ok(())
    }
}

/// Tokens found in the cache at page load.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CachedTokens {
    /// Cached access token.
    pub access_token: Option<String>,
    /// Cached refresh token.
    pub refresh_token: Option<String>,
}

impl CachedTokens {
    /// Reads both keys, treating blank values as missing.
    pub fn load(store: &dyn TokenStore) -> Self {
        let read = |key: &str| store.get(key).filter(|value| !value.trim().is_empty());
        Self {
            access_token: read(ACCESS_TOKEN_KEY),
            refresh_token: read(REFRESH_TOKEN_KEY),
        }
    }
}

impl fmt::Debug for CachedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTokens")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Writes the session's tokens into the cache.
///
/// # Errors
/// Propagates [`AuthError::Storage`].
pub fn persist_session(store: &dyn TokenStore, session: &Session) -> Result<(), AuthError> {
    store.set(ACCESS_TOKEN_KEY, &session.access_token)?;
    store.set(REFRESH_TOKEN_KEY, &session.refresh_token)
}

/// Remote authentication provider capability.
///
/// The provider's own protocol is opaque; implementations adapt it.
pub trait AuthProvider: Send + Sync {
    /// Registers an account. Returns a session when no confirmation is needed.
    fn sign_up(
        &self,
        credentials: &Credentials,
        redirect_to: Option<&str>,
    ) -> Result<Option<Session>, AuthError>;

    /// Signs in with email and password.
    fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// Returns the provider-held session, if any.
    fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Restores a session from cached tokens, refreshing when needed.
    fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, AuthError>;

    /// Registers the single state-change subscriber.
    fn subscribe(&self) -> Receiver<AuthChange>;

    /// Ends the current session.
    fn sign_out(&self) -> Result<(), AuthError>;

    /// Returns the signed-in user, if any.
    fn get_user(&self) -> Result<Option<User>, AuthError>;

    /// Sets a new password for the signed-in user.
    fn update_user_password(&self, password: &str) -> Result<User, AuthError>;

    /// Sends a password recovery email.
    fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), AuthError>;

    /// Resends a confirmation email.
    fn resend(&self, kind: ResendKind, email: &str) -> Result<(), AuthError>;
}

/// Form-facing auth operations over a provider.
#[derive(Clone)]
pub struct AuthClient {
    provider: Arc<dyn AuthProvider>,
}

impl AuthClient {
    /// Creates a client over `provider`.
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self { provider }
    }

    /// Returns the wrapped provider.
    pub fn provider(&self) -> &dyn AuthProvider {
        self.provider.as_ref()
    }

    /// Registers a new account.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for blank input,
    /// [`AuthError::InvalidEndpoint`] for a non-HTTPS redirect, and provider
    /// errors as-is.
    pub fn sign_up(
        &self,
        credentials: &Credentials,
        redirect_to: Option<&str>,
    ) -> Result<Option<Session>, AuthError> {
        credentials.ensure_present()?;
        if let Some(redirect) = redirect_to {
            validate_redirect_url(redirect)?;
        }
        let session = self.provider.sign_up(credentials, redirect_to)?;
        info!(stage = "auth", action = "sign_up", confirmed = session.is_some());
        Ok(session)
    }

    /// Signs in and caches the resulting tokens.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for blank input and provider or
    /// storage errors as-is.
    pub fn login(
        &self,
        credentials: &Credentials,
        store: &dyn TokenStore,
    ) -> Result<Session, AuthError> {
        credentials.ensure_present()?;
        let session = self.provider.sign_in_with_password(credentials)?;
        if session.access_token.trim().is_empty() || session.refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidResponse(
                "session is missing access or refresh token".to_string(),
            ));
        }
        persist_session(store, &session)?;
        info!(stage = "auth", action = "login", user_id = %session.user.id);
        Ok(session)
    }

    /// Re-verifies the current password, then sets `new_password`.
    ///
    /// # Errors
    /// Returns [`AuthError::NoSession`] when nobody is signed in,
    /// [`AuthError::IncorrectPassword`] when `current_password` is wrong,
    /// and provider errors from the update as-is.
    pub fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        let user = self
            .provider
            .get_user()?
            .filter(|user| !user.email.trim().is_empty())
            .ok_or(AuthError::NoSession)?;

        let check = Credentials::new(user.email.clone(), current_password);
        if self.provider.sign_in_with_password(&check).is_err() {
            return Err(AuthError::IncorrectPassword);
        }

        let updated = self.provider.update_user_password(new_password)?;
        info!(stage = "auth", action = "change_password", user_id = %updated.id);
        Ok(updated)
    }

    /// Sends a recovery email that links back to `redirect_to`.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for a blank email,
    /// [`AuthError::InvalidEndpoint`] for a non-HTTPS redirect and provider
    /// errors as-is.
    pub fn request_password_reset(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        validate_redirect_url(redirect_to)?;
        self.provider.reset_password_for_email(email.trim(), redirect_to)
    }

    /// Sets a new password from a recovery session.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for a blank password and
    /// provider errors as-is.
    pub fn reset_password(&self, new_password: &str) -> Result<User, AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        self.provider.update_user_password(new_password)
    }

    /// Resends the signup confirmation email.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for a blank email and provider
    /// errors as-is.
    pub fn resend_confirmation(&self, email: &str) -> Result<(), AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        self.provider.resend(ResendKind::Signup, email.trim())
    }

    /// Signs out and wipes the token cache.
    ///
    /// The cache is cleared even when the provider call fails.
    ///
    /// # Errors
    /// Returns the provider error after clearing the cache.
    pub fn logout(&self, store: &dyn TokenStore) -> Result<(), AuthError> {
        let signed_out = self.provider.sign_out();
        store.clear()?;
        info!(stage = "auth", action = "logout", provider_ok = signed_out.is_ok());
        signed_out
    }
}

/// Validates that a provider redirect target is an HTTPS URL.
///
/// # Errors
/// Returns [`AuthError::InvalidEndpoint`] for unparsable or non-HTTPS URLs.
pub fn validate_redirect_url(redirect: &str) -> Result<(), AuthError> {
    let parsed = Url::parse(redirect)
        .map_err(|error| AuthError::InvalidEndpoint(format!("invalid redirect url: {error}")))?;
    if parsed.scheme() != "https" {
        return Err(AuthError::InvalidEndpoint(
            "redirect url must use https".to_string(),
        ));
    }
    Ok(())
}

/// Page-level authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No valid session exists.
    Unauthenticated,
    /// Session is currently valid.
    Authenticated(Session),
    /// Session expired or was rejected; the user must log in again.
    ReauthRequired,
}

/// Auth state machine with explicit legal transitions.
#[derive(Debug, Clone)]
pub struct AuthStateMachine {
    state: AuthState,
}

impl AuthStateMachine {
    /// Creates a machine in `Unauthenticated` state.
    pub fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Sign-in or restore transition.
    pub fn on_sign_in(&mut self, session: Session) {
        self.state = AuthState::Authenticated(session);
    }

    /// Token rotation; ignored unless authenticated.
    pub fn on_token_refreshed(&mut self, session: Session) {
        if matches!(self.state, AuthState::Authenticated(_)) {
            self.state = AuthState::Authenticated(session);
        }
    }

    /// Re-evaluates state against token expiry.
    pub fn on_tick(&mut self, now_ms: u64) {
        if let AuthState::Authenticated(session) = &self.state
            && session.is_expired(now_ms)
        {
            self.state = AuthState::ReauthRequired;
        }
    }

    /// Backend rejected the token.
    pub fn on_rejected(&mut self) {
        self.state = AuthState::ReauthRequired;
    }

    /// Explicit logout transition.
    pub fn logout(&mut self) {
        self.state = AuthState::Unauthenticated;
    }

    /// Returns the bearer token when the session is usable at `now_ms`.
    pub fn access_token(&self, now_ms: u64) -> Option<&str> {
        match &self.state {
            AuthState::Authenticated(session) if !session.is_expired(now_ms) => {
                Some(session.access_token.as_str())
            }
            _ => None,
        }
    }
}

impl Default for AuthStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit session object threaded through one page load.
#[derive(Debug, Clone)]
pub struct AuthContext {
    machine: AuthStateMachine,
    user: User,
}

impl AuthContext {
    /// Creates an authenticated context.
    pub fn new(session: Session) -> Self {
        let user = session.user.clone();
        let mut machine = AuthStateMachine::new();
        machine.on_sign_in(session);
        Self { machine, user }
    }

    /// Signed-in user.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Current machine state.
    pub fn state(&self) -> &AuthState {
        self.machine.state()
    }

    /// Bearer token when still usable at `now_ms`.
    pub fn access_token(&self, now_ms: u64) -> Option<&str> {
        self.machine.access_token(now_ms)
    }

    /// Returns `true` while the session is authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.machine.state(), AuthState::Authenticated(_))
    }

    /// Mutable access for watcher transitions.
    pub fn machine_mut(&mut self) -> &mut AuthStateMachine {
        &mut self.machine
    }
}

/// Why a page was sent back to login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectReason {
    /// Neither the provider nor the cache held a session.
    NoSession,
    /// Cache held an access token but no refresh token (or the reverse).
    IncompleteTokens,
    /// Provider rejected the cached tokens.
    RestoreFailed(String),
    /// Provider reported sign-out.
    SignedOut,
}

/// Result of a page-load bootstrap.
#[derive(Debug)]
pub enum Bootstrap {
    /// Session confirmed; the page may load protected resources.
    Ready(AuthContext),
    /// The page must redirect to login and do nothing else.
    RedirectToLogin(RedirectReason),
}

/// Obtains a page session at load time.
pub struct SessionBootstrapper;

impl SessionBootstrapper {
    /// Resolves the page session.
    ///
    /// Order: provider session, then cached access+refresh tokens submitted
    /// for restoration. Provider errors and invalid refresh tokens are
    /// treated identically and are not retried.
    pub fn bootstrap(provider: &dyn AuthProvider, store: &dyn TokenStore) -> Bootstrap {
        match provider.get_session() {
            Ok(Some(session)) => return Self::ready(store, session, "provider"),
            Ok(None) => debug!(stage = "bootstrap", action = "provider_session", found = false),
            Err(error) => warn!(stage = "bootstrap", action = "provider_session", %error),
        }

        let cached = CachedTokens::load(store);
        let (access, refresh) = match (cached.access_token, cached.refresh_token) {
            (Some(access), Some(refresh)) => (access, refresh),
            (None, None) => {
                info!(stage = "bootstrap", action = "redirect", reason = "no_session");
                return Bootstrap::RedirectToLogin(RedirectReason::NoSession);
            }
            _ => {
                info!(stage = "bootstrap", action = "redirect", reason = "incomplete_tokens");
                return Bootstrap::RedirectToLogin(RedirectReason::IncompleteTokens);
            }
        };

        match provider.set_session(&access, &refresh) {
            Ok(session) => Self::ready(store, session, "cache"),
            Err(error) => {
                warn!(stage = "bootstrap", action = "restore", %error);
                if let Err(clear_error) = store.clear() {
                    warn!(stage = "bootstrap", action = "clear_cache", error = %clear_error);
                }
                Bootstrap::RedirectToLogin(RedirectReason::RestoreFailed(error.to_string()))
            }
        }
    }

    fn ready(store: &dyn TokenStore, session: Session, source: &str) -> Bootstrap {
        if let Err(error) = persist_session(store, &session) {
            warn!(stage = "bootstrap", action = "persist", %error);
        }
        info!(stage = "bootstrap", action = "ready", source, user_id = %session.user.id);
        Bootstrap::Ready(AuthContext::new(session))
    }
}

/// What the page must do after applying a provider notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Keep running.
    Continue,
    /// Leave for the login page.
    RedirectToLogin,
}

/// Applies provider state-change notifications to the page context.
pub struct SessionWatcher;

impl SessionWatcher {
    /// Applies one notification.
    pub fn apply(change: AuthChange, context: &mut AuthContext, store: &dyn TokenStore) -> WatchOutcome {
        match (change.event, change.session) {
            (AuthEvent::SignedOut, _) | (_, None) => {
                info!(stage = "watcher", action = "session_ended", event = ?change.event);
                if let Err(error) = store.clear() {
                    warn!(stage = "watcher", action = "clear_cache", %error);
                }
                context.machine_mut().logout();
                WatchOutcome::RedirectToLogin
            }
            (event, Some(session)) => {
                debug!(stage = "watcher", action = "session_updated", ?event);
                if let Err(error) = persist_session(store, &session) {
                    warn!(stage = "watcher", action = "persist", %error);
                }
                if event == AuthEvent::SignedIn {
                    context.machine_mut().on_sign_in(session);
                } else {
                    context.machine_mut().on_token_refreshed(session);
                }
                WatchOutcome::Continue
            }
        }
    }

    /// Applies every pending notification, stopping at the first redirect.
    pub fn drain(
        receiver: &Receiver<AuthChange>,
        context: &mut AuthContext,
        store: &dyn TokenStore,
    ) -> WatchOutcome {
        loop {
            match receiver.try_recv() {
                Ok(change) => {
                    if Self::apply(change, context, store) == WatchOutcome::RedirectToLogin {
                        return WatchOutcome::RedirectToLogin;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return WatchOutcome::Continue;
                }
            }
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct SyntheticState {
    accounts: BTreeMap<String, String>,
    current: Option<Session>,
    live_refresh_tokens: BTreeSet<String>,
    issued: u64,
    subscriber: Option<Sender<AuthChange>>,
    calls: Vec<String>,
    recovery_emails: Vec<String>,
    fail_get_session: bool,
}

/// Deterministic in-process provider for tests and offline use.
///
/// Issues `access-N`/`refresh-N` token pairs, accepts only refresh tokens it
/// issued and has not revoked, and records every call by name.
#[derive(Debug, Default)]
pub struct SyntheticAuthProvider {
    state: Mutex<SyntheticState>,
}

impl SyntheticAuthProvider {
    /// Creates a provider with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider with one confirmed account.
    pub fn with_account(email: &str, password: &str) -> Self {
        let provider = Self::new();
        if let Ok(mut state) = provider.state.lock() {
            state.accounts.insert(email.to_string(), password.to_string());
        }
        provider
    }

    /// Issues a session for `email` without a password check and records it
    /// as the provider-held session.
    pub fn issue_session(&self, email: &str) -> Option<Session> {
        let mut state = self.state.lock().ok()?;
        Some(Self::issue(&mut state, email))
    }

    /// Drops the provider-held session without revoking tokens, as after a
    /// page reload where only the cache survives.
    pub fn forget_current(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.current = None;
        }
    }

    /// Makes `get_session` fail from now on.
    pub fn fail_get_session(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_get_session = true;
        }
    }

    /// Pushes a notification to the subscriber.
    pub fn push_change(&self, change: AuthChange) {
        if let Ok(state) = self.state.lock()
            && let Some(subscriber) = &state.subscriber
        {
            let _ = subscriber.send(change);
        }
    }

    /// Names of every provider call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Number of calls named `name`.
    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == name).count()
    }

    /// Emails a recovery link was sent to.
    pub fn recovery_emails(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.recovery_emails.clone())
            .unwrap_or_default()
    }

    /// Returns the stored password for `email`.
    pub fn password_of(&self, email: &str) -> Option<String> {
        self.state.lock().ok()?.accounts.get(email).cloned()
    }

    fn lock(&self, call: &str) -> Result<std::sync::MutexGuard<'_, SyntheticState>, AuthError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AuthError::Transport("synthetic provider lock poisoned".to_string()))?;
        state.calls.push(call.to_string());
        Ok(state)
    }

    fn issue(state: &mut SyntheticState, email: &str) -> Session {
        state.issued += 1;
        let session = Session {
            access_token: format!("access-{}", state.issued),
            refresh_token: format!("refresh-{}", state.issued),
            user: User {
                id: format!("user-{email}"),
                email: email.to_string(),
            },
            expires_at_ms: None,
        };
        state.live_refresh_tokens.insert(session.refresh_token.clone());
        state.current = Some(session.clone());
        session
    }

    fn emit(state: &SyntheticState, event: AuthEvent) {
        if let Some(subscriber) = &state.subscriber {
            let _ = subscriber.send(AuthChange {
                event,
                session: state.current.clone(),
            });
        }
    }
}

impl AuthProvider for SyntheticAuthProvider {
    fn sign_up(
        &self,
        credentials: &Credentials,
        _redirect_to: Option<&str>,
    ) -> Result<Option<Session>, AuthError> {
        let mut state = self.lock("sign_up")?;
        if state.accounts.contains_key(&credentials.email) {
            return Err(AuthError::Provider("User already registered".to_string()));
        }
        state
            .accounts
            .insert(credentials.email.clone(), credentials.password.clone());
        Ok(None)
    }

    fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let mut state = self.lock("sign_in_with_password")?;
        if state.accounts.get(&credentials.email) != Some(&credentials.password) {
            return Err(AuthError::Provider("Invalid login credentials".to_string()));
        }
        let session = Self::issue(&mut state, &credentials.email);
        Self::emit(&state, AuthEvent::SignedIn);
        Ok(session)
    }

    fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let state = self.lock("get_session")?;
        if state.fail_get_session {
            return Err(AuthError::Transport("session storage unavailable".to_string()));
        }
        Ok(state.current.clone())
    }

    fn set_session(&self, _access_token: &str, refresh_token: &str) -> Result<Session, AuthError> {
        let mut state = self.lock("set_session")?;
        if !state.live_refresh_tokens.remove(refresh_token) {
            return Err(AuthError::Provider(
                "Invalid Refresh Token: Refresh Token Not Found".to_string(),
            ));
        }
        let email = state
            .current
            .as_ref()
            .map(|session| session.user.email.clone())
            .or_else(|| state.accounts.keys().next().cloned())
            .unwrap_or_default();
        let session = Self::issue(&mut state, &email);
        Self::emit(&state, AuthEvent::TokenRefreshed);
        Ok(session)
    }

    fn subscribe(&self) -> Receiver<AuthChange> {
        let (sender, receiver) = mpsc::channel();
        if let Ok(mut state) = self.lock("subscribe") {
            state.subscriber = Some(sender);
        }
        receiver
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        let mut state = self.lock("sign_out")?;
        if let Some(session) = state.current.take() {
            state.live_refresh_tokens.remove(&session.refresh_token);
        }
        Self::emit(&state, AuthEvent::SignedOut);
        Ok(())
    }

    fn get_user(&self) -> Result<Option<User>, AuthError> {
        let state = self.lock("get_user")?;
        Ok(state.current.as_ref().map(|session| session.user.clone()))
    }

    fn update_user_password(&self, password: &str) -> Result<User, AuthError> {
        let mut state = self.lock("update_user")?;
        let user = state
            .current
            .as_ref()
            .map(|session| session.user.clone())
            .ok_or_else(|| AuthError::Provider("Auth session missing!".to_string()))?;
        state.accounts.insert(user.email.clone(), password.to_string());
        Self::emit(&state, AuthEvent::UserUpdated);
        Ok(user)
    }

    fn reset_password_for_email(&self, email: &str, _redirect_to: &str) -> Result<(), AuthError> {
        let mut state = self.lock("reset_password_for_email")?;
        state.recovery_emails.push(email.to_string());
        Ok(())
    }

    fn resend(&self, _kind: ResendKind, email: &str) -> Result<(), AuthError> {
        let state = self.lock("resend")?;
        if !state.accounts.contains_key(email) {
            return Err(AuthError::Provider("User not found".to_string()));
        }
        Ok(())
    }
}

/// Errors produced by auth client, provider and cache logic.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Redirect or provider URL violates policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Email or password is blank.
    #[error("email and password must be non-empty")]
    EmptyCredential,
    /// Nobody is signed in.
    #[error("you must be logged in")]
    NoSession,
    /// Current password did not verify.
    #[error("current password is incorrect")]
    IncorrectPassword,
    /// Provider rejected the call; message is shown verbatim.
    #[error("{0}")]
    Provider(String),
    /// Provider could not be reached.
    #[error("auth transport failure: {0}")]
    Transport(String),
    /// Provider response violated expectations.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),
    /// Token cache could not be read or written.
    #[error("token storage failure: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for redirect policy, state transitions and redaction.

    use super::*;

    fn session(expires_at_ms: Option<u64>) -> Session {
        Session {
            access_token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
            user: User {
                id: "u1".to_string(),
                email: "ops@example.test".to_string(),
            },
            expires_at_ms,
        }
    }

    #[test]
    fn validates_redirect_policy() {
        validate_redirect_url("https://example.test/reset-password.html")
            .expect("https redirect should pass");
        assert!(validate_redirect_url("http://example.test/reset").is_err());
        assert!(validate_redirect_url("not a url").is_err());
    }

    #[test]
    fn state_machine_requires_reauth_after_expiry() {
        let mut machine = AuthStateMachine::new();
        machine.on_sign_in(session(Some(1_000)));
        assert_eq!(machine.access_token(999), Some("secret-access"));
        machine.on_tick(1_001);
        assert!(matches!(machine.state(), AuthState::ReauthRequired));
        assert_eq!(machine.access_token(1_001), None);
    }

    #[test]
    fn token_refresh_is_ignored_after_logout() {
        let mut machine = AuthStateMachine::new();
        machine.on_sign_in(session(None));
        machine.logout();
        machine.on_token_refreshed(session(None));
        assert!(matches!(machine.state(), AuthState::Unauthenticated));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", session(None));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("ops@example.test"));
    }

    #[test]
    fn memory_store_clears_wholesale() {
        let store = MemoryTokenStore::with_entries([
            (ACCESS_TOKEN_KEY, "a"),
            (REFRESH_TOKEN_KEY, "r"),
            (LEGACY_TOKEN_KEY, "legacy"),
        ]);
        assert_eq!(store.len(), 3);
        store.clear().expect("clear should work");
        assert!(store.is_empty());
    }
}
