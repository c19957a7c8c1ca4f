#![warn(missing_docs)]
//! # ecomops-api
//!
//! ## Purpose
//! Typed client for the ecomops REST backend.
//!
//! ## Responsibilities
//! - Build bearer-authenticated requests for every backend endpoint.
//! - Execute them through an injectable [`HttpTransport`].
//! - Map HTTP status codes into [`ApiError`] and classify failures.
//! - Provide the exponential backoff [`RetryPolicy`] used by pollers.
//!
//! ## Data flow
//! Page controller -> [`ApiClient`] method -> [`HttpRequest`] ->
//! [`HttpTransport::send`] -> [`HttpResponse`] -> `ecomops_core::parse_*`.
//!
//! ## Ownership and lifetimes
//! Requests own their bodies (including report file bytes) so transports
//! can retry or move them across threads without borrowing the caller.
//!
//! ## Error model
//! 401/403 become [`ApiError::Unauthorized`], other 4xx become
//! [`ApiError::Client`] with the backend's `detail`, 5xx become
//! [`ApiError::Server`]. [`classify_api_error`] tells pollers what to retry.
//!
//! ## Security and privacy notes
//! Bearer tokens are redacted from `Debug` output and file bytes are never
//! logged; uploads are correlated by [`ReportFile::fingerprint`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use ecomops_core::{
    CoreError, DashboardSummary, DuplicateCheck, FinancialSummary, RebuildProgress, RebuildTicket,
    UploadForm, UploadRecord, parse_duplicate_check, parse_financial_summary,
    parse_rebuild_progress, parse_rebuild_ticket, parse_summary, parse_uploads,
};
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Liveness check for the bearer token.
pub const PROTECTED_PATH: &str = "/protected";
/// Upload list.
pub const UPLOADS_LIST_PATH: &str = "/uploads/list";
/// Multipart report upload.
pub const UPLOADS_UPLOAD_PATH: &str = "/uploads/upload";
/// Pre-flight duplicate check.
pub const UPLOADS_DUPLICATE_PATH: &str = "/uploads/check-duplicate";
/// Dashboard KPI summary.
pub const DASHBOARD_SUMMARY_PATH: &str = "/dashboard/summary";
/// Financial reconciliation summary.
pub const FINANCIAL_SUMMARY_PATH: &str = "/dashboard/financial-summary";
/// Summary rebuild trigger; progress lives under `/progress/{session_id}`.
pub const REBUILD_SUMMARY_PATH: &str = "/dashboard/rebuild-summary";

/// HTTP method subset used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Method {
    /// `GET`.
    Get,
    /// `POST`.
    Post,
}

/// One multipart form field.
#[derive(Clone, PartialEq, Eq)]
pub enum FormPart {
    /// Plain text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// File field.
    File {
        /// Field name.
        name: String,
        /// Original file name.
        file_name: String,
        /// File contents.
        bytes: Vec<u8>,
    },
}

impl FormPart {
    /// Field name.
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

impl fmt::Debug for FormPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { name, value } => f
                .debug_struct("Text")
                .field("name", name)
                .field("value", value)
                .finish(),
            Self::File {
                name,
                file_name,
                bytes,
            } => f
                .debug_struct("File")
                .field("name", name)
                .field("file_name", file_name)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// Request body variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// JSON document.
    Json(Value),
    /// `multipart/form-data` fields in order.
    Multipart(Vec<FormPart>),
}

/// Transport-agnostic request.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL including query.
    pub url: Url,
    /// Bearer token for the `Authorization` header.
    pub bearer: Option<String>,
    /// Body.
    pub body: RequestBody,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("body", &self.body)
            .finish()
    }
}

/// Transport-agnostic response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body text.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstract transport used by [`ApiClient`].
pub trait HttpTransport: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    /// Returns [`ApiError::Timeout`] or [`ApiError::Transport`] when no HTTP
    /// response was received. Non-2xx responses are returned as `Ok`.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Report file selected in the upload form.
#[derive(Clone, PartialEq, Eq)]
pub struct ReportFile {
    /// Original file name.
    pub file_name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl ReportFile {
    /// Creates a report file.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// SHA-256 of the contents as lowercase hex.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// Returns `true` for zero-byte files.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ReportFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportFile")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Backend confirmation message.
    pub message: String,
    /// Id of the created record, when returned.
    pub record_id: Option<String>,
    /// Fingerprint of the uploaded file.
    pub fingerprint: String,
}

/// Typed backend client.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    /// Creates a validated client.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidEndpoint`] when `base_url` is not HTTPS.
    pub fn new(base_url: &str, transport: Arc<dyn HttpTransport>) -> Result<Self, ApiError> {
        let base_url = validate_base_url(base_url)?;
        Ok(Self {
            base_url,
            transport,
        })
    }

    /// Configured base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /protected`.
    ///
    /// # Errors
    /// Returns [`ApiError::Unauthorized`] when the token is rejected.
    pub fn check_protected(&self, token: &str) -> Result<(), ApiError> {
        self.execute(Method::Get, self.endpoint(PROTECTED_PATH)?, token, RequestBody::Empty)?;
        Ok(())
    }

    /// `GET /uploads/list`.
    ///
    /// # Errors
    /// Returns status, transport or decode errors.
    pub fn list_uploads(&self, token: &str) -> Result<Vec<UploadRecord>, ApiError> {
        let body = self.execute(
            Method::Get,
            self.endpoint(UPLOADS_LIST_PATH)?,
            token,
            RequestBody::Empty,
        )?;
        Ok(parse_uploads(&body)?)
    }

    /// `GET /uploads/check-duplicate?website&report_type&duration`.
    ///
    /// # Errors
    /// Returns status, transport or decode errors.
    pub fn check_duplicate(&self, token: &str, form: &UploadForm) -> Result<DuplicateCheck, ApiError> {
        let mut url = self.endpoint(UPLOADS_DUPLICATE_PATH)?;
        url.query_pairs_mut()
            .append_pair("website", form.website.trim())
            .append_pair("report_type", form.report_type.trim())
            .append_pair("duration", &form.duration());
        let body = self.execute(Method::Get, url, token, RequestBody::Empty)?;
        Ok(parse_duplicate_check(&body)?)
    }

    /// `POST /uploads/upload` as multipart form data.
    ///
    /// # Errors
    /// Returns [`ApiError::Contract`] for an invalid form, otherwise status
    /// or transport errors.
    pub fn upload_report(
        &self,
        token: &str,
        form: &UploadForm,
        file: &ReportFile,
    ) -> Result<UploadReceipt, ApiError> {
        form.validate()?;
        let fingerprint = file.fingerprint();

        let mut parts = vec![
            text_part("website", form.website.trim()),
            text_part("report_type", form.report_type.trim()),
            text_part("duration", &form.duration()),
        ];
        if let Some(payment_type) = form.effective_payment_type() {
            parts.push(text_part("payment_type", payment_type));
        }
        parts.push(FormPart::File {
            name: "file".to_string(),
            file_name: file.file_name.clone(),
            bytes: file.bytes.clone(),
        });

        info!(
            stage = "upload",
            action = "send",
            website = form.website.as_str(),
            report_type = form.report_type.as_str(),
            size = file.bytes.len(),
            fingerprint = fingerprint.as_str()
        );
        let body = self.execute(
            Method::Post,
            self.endpoint(UPLOADS_UPLOAD_PATH)?,
            token,
            RequestBody::Multipart(parts),
        )?;

        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Upload successful")
            .to_string();
        let record_id = ["id", "upload_id"]
            .iter()
            .find_map(|key| value.get(*key).and_then(id_from_value));

        Ok(UploadReceipt {
            message,
            record_id,
            fingerprint,
        })
    }

    /// `GET /dashboard/summary`.
    ///
    /// # Errors
    /// Returns status, transport or decode errors.
    pub fn dashboard_summary(&self, token: &str) -> Result<DashboardSummary, ApiError> {
        let body = self.execute(
            Method::Get,
            self.endpoint(DASHBOARD_SUMMARY_PATH)?,
            token,
            RequestBody::Empty,
        )?;
        Ok(parse_summary(&body)?)
    }

    /// `GET /dashboard/financial-summary`.
    ///
    /// # Errors
    /// Returns status, transport or decode errors.
    pub fn financial_summary(&self, token: &str) -> Result<FinancialSummary, ApiError> {
        let body = self.execute(
            Method::Get,
            self.endpoint(FINANCIAL_SUMMARY_PATH)?,
            token,
            RequestBody::Empty,
        )?;
        Ok(parse_financial_summary(&body)?)
    }

    /// `POST /dashboard/rebuild-summary`.
    ///
    /// # Errors
    /// Returns status, transport or decode errors.
    pub fn start_rebuild(&self, token: &str) -> Result<RebuildTicket, ApiError> {
        let body = self.execute(
            Method::Post,
            self.endpoint(REBUILD_SUMMARY_PATH)?,
            token,
            RequestBody::Empty,
        )?;
        Ok(parse_rebuild_ticket(&body)?)
    }

    /// `GET /dashboard/rebuild-summary/progress/{session_id}`.
    ///
    /// # Errors
    /// Returns status, transport or decode errors.
    pub fn rebuild_progress(&self, token: &str, session_id: &str) -> Result<RebuildProgress, ApiError> {
        let mut url = self.endpoint(REBUILD_SUMMARY_PATH)?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidEndpoint("base url cannot carry a path".to_string()))?
            .push("progress")
            .push(session_id);
        let body = self.execute(Method::Get, url, token, RequestBody::Empty)?;
        Ok(parse_rebuild_progress(&body)?)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined)
            .map_err(|error| ApiError::InvalidEndpoint(format!("invalid endpoint {path}: {error}")))
    }

    fn execute(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: RequestBody,
    ) -> Result<String, ApiError> {
        let request = HttpRequest {
            method,
            url,
            bearer: Some(token.to_string()),
            body,
        };
        let response = self.transport.send(&request);
        let response = match response {
            Ok(response) => response,
            Err(error) => {
                warn!(stage = "api", action = "send", path = request.url.path(), %error);
                return Err(error);
            }
        };
        debug!(
            stage = "api",
            action = "response",
            method = ?request.method,
            path = request.url.path(),
            status = response.status
        );
        check_status(response)
    }
}

fn text_part(name: &str, value: &str) -> FormPart {
    FormPart::Text {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Maps a raw response into its body or a status error.
///
/// # Errors
/// Returns [`ApiError::Unauthorized`], [`ApiError::Client`] or
/// [`ApiError::Server`] for non-2xx statuses.
pub fn check_status(response: HttpResponse) -> Result<String, ApiError> {
    match response.status {
        200..=299 => Ok(response.body),
        401 | 403 => Err(ApiError::Unauthorized(response.status)),
        400..=499 => Err(ApiError::Client {
            status: response.status,
            detail: extract_detail(&response.body),
        }),
        status => Err(ApiError::Server(status)),
    }
}

/// Pulls the human-readable `detail` out of a backend error body.
///
/// Accepts `{"detail": "..."}`, validation lists
/// (`{"detail": [{"msg": "..."}]}`), `{"message": "..."}` and plain text.
pub fn extract_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    match value.get("detail").or_else(|| value.get("message")) {
        Some(Value::String(detail)) => detail.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => body.trim().to_string(),
    }
}

/// Validates that the backend base URL is HTTPS.
///
/// # Errors
/// Returns [`ApiError::InvalidEndpoint`] for unparsable or non-HTTPS URLs.
pub fn validate_base_url(base_url: &str) -> Result<Url, ApiError> {
    let parsed = Url::parse(base_url)
        .map_err(|error| ApiError::InvalidEndpoint(format!("invalid api url: {error}")))?;
    if parsed.scheme() != "https" {
        return Err(ApiError::InvalidEndpoint(
            "api base url must use https".to_string(),
        ));
    }
    Ok(parsed)
}

/// Failure classes that decide polling behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt after backoff.
    Retriable,
    /// Retrying will not help.
    Permanent,
    /// Token rejected; the page must log out.
    Unauthorized,
}

/// Classifies an API error for retry decisions.
pub fn classify_api_error(error: &ApiError) -> FailureClass {
    match error {
        ApiError::Unauthorized(_) => FailureClass::Unauthorized,
        ApiError::Server(_) | ApiError::Timeout | ApiError::Transport(_) => FailureClass::Retriable,
        ApiError::Client { status: 408 | 429, .. } => FailureClass::Retriable,
        ApiError::Client { .. } | ApiError::InvalidEndpoint(_) | ApiError::Contract(_) => {
            FailureClass::Permanent
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    /// Delay after the first failure.
    pub base_delay_ms: u64,
    /// Upper bound for the exponential component.
    pub max_delay_ms: u64,
    /// Upper bound of uniformly drawn extra delay.
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based):
    /// `min(base * 2^attempt, max) + U[0, jitter]`.
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> u64 {
        let factor = 1_u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        let exponential = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..=self.jitter_ms)
        };
        exponential.saturating_add(jitter)
    }

    /// Returns `true` while `failures` consecutive failures may still retry.
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

/// Backend client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Base URL violates policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// 401/403: token missing, expired or rejected.
    #[error("unauthorized (status {0})")]
    Unauthorized(u16),
    /// Other 4xx with the backend's detail message.
    #[error("{detail}")]
    Client {
        /// Status code.
        status: u16,
        /// Backend-provided detail.
        detail: String,
    },
    /// 5xx.
    #[error("server error (status {0})")]
    Server(u16),
    /// No response within the transport deadline.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Response or form violated the payload contract.
    #[error("contract error: {0}")]
    Contract(#[from] CoreError),
}

/// Scripted reply served by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// HTTP response.
    Respond(HttpResponse),
    /// Simulated timeout.
    Timeout,
    /// Simulated connection failure.
    Transport(String),
}

/// Request as observed by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Method.
    pub method: Method,
    /// URL path.
    pub path: String,
    /// Decoded query pairs.
    pub query: Vec<(String, String)>,
    /// Bearer token.
    pub bearer: Option<String>,
    /// Multipart text fields and file field names, in order.
    pub fields: Vec<(String, String)>,
}

/// Deterministic transport for tests and offline demos.
///
/// Replies are queued per `(method, path)`; the last queued reply of a route
/// keeps being served. Unscripted routes answer 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<BTreeMap<(Method, String), VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Creates an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an HTTP response for a route.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        self.push(method, path, ScriptedReply::Respond(HttpResponse::new(status, body)))
    }

    /// Queues an arbitrary reply for a route.
    pub fn push(&self, method: Method, path: &str, reply: ScriptedReply) -> &Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes
                .entry((method, path.to_string()))
                .or_default()
                .push_back(reply);
        }
        self
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Number of requests received for a route.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }

    fn record(request: &HttpRequest) -> RecordedRequest {
        let fields = match &request.body {
            RequestBody::Multipart(parts) => parts
                .iter()
                .map(|part| match part {
                    FormPart::Text { name, value } => (name.clone(), value.clone()),
                    FormPart::File { name, file_name, .. } => (name.clone(), file_name.clone()),
                })
                .collect(),
            _ => Vec::new(),
        };
        RecordedRequest {
            method: request.method,
            path: request.url.path().to_string(),
            query: request
                .url
                .query_pairs()
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect(),
            bearer: request.bearer.clone(),
            fields,
        }
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let recorded = Self::record(request);
        let key = (recorded.method, recorded.path.clone());
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(recorded);
        }

        let reply = {
            let mut routes = self
                .routes
                .lock()
                .map_err(|_| ApiError::Transport("scripted routes lock poisoned".to_string()))?;
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Timeout) => Err(ApiError::Timeout),
            Some(ScriptedReply::Transport(message)) => Err(ApiError::Transport(message)),
            None => Ok(HttpResponse::new(404, r#"{"detail":"Not Found"}"#)),
        }
    }
}
