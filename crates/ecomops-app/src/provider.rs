//! Hosted auth provider adapter speaking the provider's REST protocol.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ecomops_auth::{
    AuthChange, AuthError, AuthEvent, AuthProvider, Credentials, ResendKind, Session, User, now_ms,
};
use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::{is_https_endpoint, redact_sensitive};

#[derive(Debug, Default)]
struct ProviderState {
    current: Option<Session>,
    subscriber: Option<Sender<AuthChange>>,
}

/// Provider client holding the current session in memory.
#[derive(Debug)]
pub struct HttpAuthProvider {
    base: Url,
    anon_key: String,
    client: Client,
    state: Mutex<ProviderState>,
}

impl HttpAuthProvider {
    /// Creates a client for the project at `project_url`.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidEndpoint`] for a non-HTTPS project URL and
    /// [`AuthError::Transport`] when the HTTP client cannot be built.
    pub fn new(project_url: &str, anon_key: &str, timeout_ms: u64) -> Result<Self, AuthError> {
        if !is_https_endpoint(project_url) {
            return Err(AuthError::InvalidEndpoint(
                "auth project url must use https".to_string(),
            ));
        }
        let base = Url::parse(&format!("{}/auth/v1/", project_url.trim_end_matches('/')))
            .map_err(|error| AuthError::InvalidEndpoint(error.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|error| AuthError::Transport(error.to_string()))?;
        Ok(Self {
            base,
            anon_key: anon_key.to_string(),
            client,
            state: Mutex::new(ProviderState::default()),
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, ProviderState>, AuthError> {
        self.state
            .lock()
            .map_err(|_| AuthError::Storage("provider state lock poisoned".to_string()))
    }

    fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, AuthError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|error| AuthError::InvalidEndpoint(error.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }

        let mut request = self
            .client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.anon_key));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .map_err(|error| AuthError::Transport(redact_sensitive(&error.to_string())))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|error| AuthError::Transport(redact_sensitive(&error.to_string())))?;
        debug!(stage = "auth_http", action = "response", path, status = status.as_u16());

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        if status.is_success() {
            Ok(value)
        } else {
            Err(AuthError::Provider(error_message(&value, status.as_u16())))
        }
    }

    fn adopt(&self, session: Session, event: AuthEvent) -> Result<Session, AuthError> {
        let mut state = self.state()?;
        state.current = Some(session.clone());
        emit(&state, event);
        Ok(session)
    }

    fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let value = self.call(
            Method::POST,
            "token",
            &[("grant_type", "refresh_token")],
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )?;
        let session = parse_session(&value)?;
        info!(stage = "auth_http", action = "refreshed", user_id = %session.user.id);
        self.adopt(session, AuthEvent::TokenRefreshed)
    }

    fn current_access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .state()?
            .current
            .as_ref()
            .map(|session| session.access_token.clone()))
    }
}

impl AuthProvider for HttpAuthProvider {
    fn sign_up(
        &self,
        credentials: &Credentials,
        redirect_to: Option<&str>,
    ) -> Result<Option<Session>, AuthError> {
        let query: Vec<(&str, &str)> = redirect_to
            .map(|redirect| vec![("redirect_to", redirect)])
            .unwrap_or_default();
        let value = self.call(
            Method::POST,
            "signup",
            &query,
            None,
            Some(json!({ "email": credentials.email, "password": credentials.password })),
        )?;
        if value.get("access_token").is_some() {
            let session = parse_session(&value)?;
            return self.adopt(session, AuthEvent::SignedIn).map(Some);
        }
        Ok(None)
    }

    fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let value = self.call(
            Method::POST,
            "token",
            &[("grant_type", "password")],
            None,
            Some(json!({ "email": credentials.email, "password": credentials.password })),
        )?;
        let session = parse_session(&value)?;
        self.adopt(session, AuthEvent::SignedIn)
    }

    fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let current = self.state()?.current.clone();
        match current {
            Some(session) if session.is_expired(now_ms()) => {
                self.refresh(&session.refresh_token).map(Some)
            }
            other => Ok(other),
        }
    }

    fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, AuthError> {
        match self.call(Method::GET, "user", &[], Some(access_token), None) {
            Ok(value) => {
                let user = parse_user(&value)?;
                let session = Session {
                    access_token: access_token.to_string(),
                    refresh_token: refresh_token.to_string(),
                    user,
                    expires_at_ms: None,
                };
                self.adopt(session, AuthEvent::SignedIn)
            }
            Err(AuthError::Provider(_)) => self.refresh(refresh_token),
            Err(error) => Err(error),
        }
    }

    fn subscribe(&self) -> Receiver<AuthChange> {
        let (sender, receiver) = mpsc::channel();
        if let Ok(mut state) = self.state() {
            state.subscriber = Some(sender);
        }
        receiver
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        let token = self.current_access_token()?;
        let remote = match token.as_deref() {
            Some(token) => self.call(Method::POST, "logout", &[], Some(token), None).map(|_| ()),
            None => Ok(()),
        };
        let mut state = self.state()?;
        state.current = None;
        emit(&state, AuthEvent::SignedOut);
        match remote {
            Err(AuthError::Provider(_)) | Ok(()) => Ok(()),
            Err(error) => Err(error),
        }
    }

    fn get_user(&self) -> Result<Option<User>, AuthError> {
        let Some(token) = self.current_access_token()? else {
            return Ok(None);
        };
        let value = self.call(Method::GET, "user", &[], Some(&token), None)?;
        parse_user(&value).map(Some)
    }

    fn update_user_password(&self, password: &str) -> Result<User, AuthError> {
        let token = self
            .current_access_token()?
            .ok_or_else(|| AuthError::Provider("Auth session missing!".to_string()))?;
        let value = self.call(
            Method::PUT,
            "user",
            &[],
            Some(&token),
            Some(json!({ "password": password })),
        )?;
        let user = parse_user(&value)?;
        let state = self.state()?;
        emit(&state, AuthEvent::UserUpdated);
        Ok(user)
    }

    fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        self.call(
            Method::POST,
            "recover",
            &[("redirect_to", redirect_to)],
            None,
            Some(json!({ "email": email })),
        )?;
        Ok(())
    }

    fn resend(&self, kind: ResendKind, email: &str) -> Result<(), AuthError> {
        self.call(
            Method::POST,
            "resend",
            &[],
            None,
            Some(json!({ "type": kind.as_str(), "email": email })),
        )?;
        Ok(())
    }
}

fn emit(state: &ProviderState, event: AuthEvent) {
    if let Some(subscriber) = &state.subscriber {
        let _ = subscriber.send(AuthChange {
            event,
            session: state.current.clone(),
        });
    }
}

/// Extracts the session from a token-grant response.
///
/// # Errors
/// Returns [`AuthError::InvalidResponse`] when a token or the user is missing.
pub fn parse_session(value: &Value) -> Result<Session, AuthError> {
    let token = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AuthError::InvalidResponse(format!("missing {key}")))
    };
    let user = parse_user(value.get("user").unwrap_or(&Value::Null))?;
    let expires_at_ms = value
        .get("expires_at")
        .and_then(Value::as_u64)
        .map(|seconds| seconds.saturating_mul(1_000))
        .or_else(|| {
            value
                .get("expires_in")
                .and_then(Value::as_u64)
                .map(|seconds| now_ms().saturating_add(seconds.saturating_mul(1_000)))
        });
    Ok(Session {
        access_token: token("access_token")?,
        refresh_token: token("refresh_token")?,
        user,
        expires_at_ms,
    })
}

fn parse_user(value: &Value) -> Result<User, AuthError> {
    serde_json::from_value(value.clone())
        .map_err(|error| AuthError::InvalidResponse(format!("invalid user: {error}")))
}

/// Human-readable message from a provider error body.
pub fn error_message(value: &Value, status: u16) -> String {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .or_else(|| value.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("auth provider returned status {status}"))
}
