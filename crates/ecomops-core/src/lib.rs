#![warn(missing_docs)]
//! # ecomops-core
//!
//! ## Purpose
//! Defines the transient view-models exchanged with the ecomops backend.
//!
//! ## Responsibilities
//! - Represent upload records, dashboard and financial summaries, duplicate
//!   checks and summary-rebuild progress.
//! - Parse raw backend JSON into validated, owned values.
//! - Validate upload form input before anything leaves the client.
//!
//! ## Data flow
//! Backend response bytes -> `parse_*` -> typed snapshot -> renderer.
//! Upload form fields -> [`UploadForm::validate`] -> multipart request.
//!
//! ## Ownership and lifetimes
//! Every snapshot owns its strings. A page fetches, renders and discards;
//! nothing here is shared across writers.
//!
//! ## Error model
//! Bad JSON returns [`CoreError::Decode`]; blank mandatory identifiers return
//! [`CoreError::InvalidContract`]; incomplete forms return
//! [`CoreError::MissingField`].
//!
//! ## Example
//! ```rust
//! use ecomops_core::parse_summary;
//!
//! let summary = parse_summary(r#"{"shipped_orders":12,"total_paid":45000.5}"#).unwrap();
//! assert_eq!(summary.shipped_orders, 12);
//! assert!(summary.by_website.is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Processing status of one uploaded report, driven server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UploadStatus {
    /// Accepted, not yet picked up.
    Pending,
    /// Being parsed or aggregated.
    InProgress,
    /// Processing finished successfully.
    Completed,
    /// Processing failed.
    Failed,
    /// Status string this client does not know yet.
    Other(String),
}

impl UploadStatus {
    /// Returns `true` once the backend will not move the record any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Backend wire label.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for UploadStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Self::Pending,
            "in_progress" | "in-progress" | "processing" | "running" => Self::InProgress,
            "completed" | "complete" | "done" | "success" => Self::Completed,
            "failed" | "failure" | "error" => Self::Failed,
            _ => Self::Other(raw),
        }
    }
}

impl From<UploadStatus> for String {
    fn from(status: UploadStatus) -> Self {
        status.as_str().to_string()
    }
}

impl Default for UploadStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-tracked artifact for one user-submitted report file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Backend record id (numeric ids are normalized to strings).
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Sales channel (`amazon`, `jiomart`, ...).
    #[serde(default, deserialize_with = "default_if_null")]
    pub website: String,
    /// Report kind (`orders`, `payments`, ...).
    #[serde(default, deserialize_with = "default_if_null")]
    pub report_type: String,
    /// Reporting window, `"{start} to {end}"`.
    #[serde(default, deserialize_with = "default_if_null")]
    pub duration: String,
    /// Download link for the stored file.
    #[serde(default, deserialize_with = "default_if_null")]
    pub file_url: String,
    /// Processing status.
    #[serde(default, deserialize_with = "default_if_null")]
    pub status: UploadStatus,
    /// Processing progress in percent, rounded and clamped to `0..=100`.
    #[serde(default, deserialize_with = "lenient_percent")]
    pub progress: Option<u8>,
    /// Backend status message, when reported.
    #[serde(default)]
    pub message: Option<String>,
    /// Upload timestamp as sent by the backend.
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

/// Per-channel order and payment figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsiteStats {
    /// Order count.
    #[serde(default, deserialize_with = "default_if_null")]
    pub orders: u64,
    /// Amount paid out by the marketplace.
    #[serde(default, deserialize_with = "default_if_null")]
    pub paid: f64,
    /// Marketplace fees and charges.
    #[serde(default, deserialize_with = "default_if_null")]
    pub charges: f64,
    /// Gross order value.
    #[serde(default, deserialize_with = "default_if_null")]
    pub order_value: f64,
    /// Amount still owed by the marketplace.
    #[serde(default, deserialize_with = "default_if_null")]
    pub outstanding: f64,
}

/// Server-computed order/payment aggregate, treated as an immutable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    /// Shipped order count.
    #[serde(default, deserialize_with = "default_if_null")]
    pub shipped_orders: u64,
    /// Cancelled order count.
    #[serde(default, deserialize_with = "default_if_null")]
    pub cancelled_orders: u64,
    /// Returned order count.
    #[serde(default, deserialize_with = "default_if_null")]
    pub returned_orders: u64,
    /// Gross order value across channels.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_order_value: f64,
    /// Total paid across channels.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_paid: f64,
    /// Total charges across channels.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_charges: f64,
    /// Total outstanding across channels.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_outstanding: f64,
    /// Breakdown keyed by sales channel.
    #[serde(default, deserialize_with = "default_if_null")]
    pub by_website: BTreeMap<String, WebsiteStats>,
}

/// Per-channel payment reconciliation figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsiteFinancials {
    /// Gross order value.
    #[serde(default, deserialize_with = "default_if_null")]
    pub order_value: f64,
    /// Amount paid out.
    #[serde(default, deserialize_with = "default_if_null")]
    pub paid: f64,
    /// Fees and charges.
    #[serde(default, deserialize_with = "default_if_null")]
    pub charges: f64,
    /// Amount still owed.
    #[serde(default, deserialize_with = "default_if_null")]
    pub outstanding: f64,
}

/// Payload of `GET /dashboard/financial-summary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    /// Gross order value.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_order_value: f64,
    /// Total paid.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_paid: f64,
    /// Total charges.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_charges: f64,
    /// Total outstanding.
    #[serde(default, deserialize_with = "default_if_null")]
    pub total_outstanding: f64,
    /// Breakdown keyed by sales channel.
    #[serde(default, deserialize_with = "default_if_null")]
    pub by_website: BTreeMap<String, WebsiteFinancials>,
}

/// Answer of the pre-flight duplicate check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    /// `true` when a report with the same key is already stored.
    #[serde(default)]
    pub exists: bool,
    /// Id of the existing record.
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub id: Option<String>,
    /// Upload time of the existing record.
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

/// Handle returned when a summary rebuild is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildTicket {
    /// Server-side rebuild session id used for progress polling.
    pub session_id: String,
}

/// One progress sample of a summary rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildProgress {
    /// Free-form status line; terminal lines start with a marker.
    #[serde(default)]
    pub status: String,
}

/// Interpretation of a [`RebuildProgress`] status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Rebuild still running.
    Running,
    /// Rebuild finished successfully.
    Succeeded,
    /// Rebuild failed.
    Failed,
}

/// Leading marker of a successful rebuild status.
pub const SUCCESS_MARKER: &str = "✅";
/// Leading marker of a failed rebuild status.
pub const FAILURE_MARKER: &str = "❌";

impl RebuildProgress {
    /// Classifies the status line by its leading marker.
    pub fn outcome(&self) -> RebuildOutcome {
        let status = self.status.trim_start();
        let lower = status.to_ascii_lowercase();
        if status.starts_with(SUCCESS_MARKER)
            || ["done", "success", "completed"]
                .iter()
                .any(|marker| lower.starts_with(marker))
        {
            RebuildOutcome::Succeeded
        } else if status.starts_with(FAILURE_MARKER)
            || ["error", "failed"].iter().any(|marker| lower.starts_with(marker))
        {
            RebuildOutcome::Failed
        } else {
            RebuildOutcome::Running
        }
    }
}

/// Sales channels offered by the upload page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Website {
    /// Amazon seller exports.
    Amazon,
    /// Jiomart seller exports.
    Jiomart,
}

impl Website {
    /// All channels in button order.
    pub const ALL: [Website; 2] = [Website::Amazon, Website::Jiomart];

    /// Form value sent to the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Jiomart => "jiomart",
        }
    }
}

/// Report kinds offered by the upload page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    /// Order export.
    Orders,
    /// Payment/settlement export.
    Payments,
    /// Returns export.
    Returns,
}

impl ReportType {
    /// All report kinds in button order.
    pub const ALL: [ReportType; 3] = [ReportType::Orders, ReportType::Payments, ReportType::Returns];

    /// Form value sent to the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Payments => "payments",
            Self::Returns => "returns",
        }
    }
}

/// Returns `true` when `report_type` names a payment export.
pub fn is_payment_report(report_type: &str) -> bool {
    report_type.trim().eq_ignore_ascii_case(ReportType::Payments.as_str())
}

/// Upload form fields, minus the file itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    /// Selected sales channel.
    pub website: String,
    /// Selected report kind.
    pub report_type: String,
    /// Reporting window start (`YYYY-MM-DD`).
    pub start_date: String,
    /// Reporting window end (`YYYY-MM-DD`).
    pub end_date: String,
    /// Payment export flavour; only meaningful for payment reports.
    pub payment_type: Option<String>,
}

impl UploadForm {
    /// Duplicate-check and storage key component for the reporting window.
    pub fn duration(&self) -> String {
        format!("{} to {}", self.start_date.trim(), self.end_date.trim())
    }

    /// Payment type forwarded to the backend, present only for payment reports.
    pub fn effective_payment_type(&self) -> Option<&str> {
        if !is_payment_report(&self.report_type) {
            return None;
        }
        self.payment_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Checks that every mandatory field is filled.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingField`] naming the first blank field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("website", &self.website),
            ("report_type", &self.report_type),
            ("start_date", &self.start_date),
            ("end_date", &self.end_date),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::MissingField(name));
            }
        }

        if is_payment_report(&self.report_type) && self.effective_payment_type().is_none() {
            return Err(CoreError::MissingField("payment_type"));
        }

        Ok(())
    }
}

/// Parses `GET /dashboard/summary`.
///
/// # Errors
/// Returns [`CoreError::Decode`] for invalid JSON.
pub fn parse_summary(raw: &str) -> Result<DashboardSummary, CoreError> {
    serde_json::from_str(raw).map_err(CoreError::Decode)
}

/// Parses `GET /dashboard/financial-summary`.
///
/// # Errors
/// Returns [`CoreError::Decode`] for invalid JSON.
pub fn parse_financial_summary(raw: &str) -> Result<FinancialSummary, CoreError> {
    serde_json::from_str(raw).map_err(CoreError::Decode)
}

/// Parses `GET /uploads/list`.
///
/// # Errors
/// Returns [`CoreError::Decode`] for invalid JSON.
/// Returns [`CoreError::InvalidContract`] when a record has a blank id.
pub fn parse_uploads(raw: &str) -> Result<Vec<UploadRecord>, CoreError> {
    let records: Vec<UploadRecord> = serde_json::from_str(raw).map_err(CoreError::Decode)?;
    if records.iter().any(|record| record.id.trim().is_empty()) {
        return Err(CoreError::InvalidContract(
            "upload record id is empty".to_string(),
        ));
    }
    Ok(records)
}

/// Parses `GET /uploads/check-duplicate`.
///
/// # Errors
/// Returns [`CoreError::Decode`] for invalid JSON.
pub fn parse_duplicate_check(raw: &str) -> Result<DuplicateCheck, CoreError> {
    serde_json::from_str(raw).map_err(CoreError::Decode)
}

/// Parses `POST /dashboard/rebuild-summary`.
///
/// # Errors
/// Returns [`CoreError::Decode`] for invalid JSON.
/// Returns [`CoreError::InvalidContract`] when `session_id` is blank.
pub fn parse_rebuild_ticket(raw: &str) -> Result<RebuildTicket, CoreError> {
    let ticket: RebuildTicket = serde_json::from_str(raw).map_err(CoreError::Decode)?;
    if ticket.session_id.trim().is_empty() {
        return Err(CoreError::InvalidContract(
            "rebuild session_id is empty".to_string(),
        ));
    }
    Ok(ticket)
}

/// Parses `GET /dashboard/rebuild-summary/progress/{session_id}`.
///
/// # Errors
/// Returns [`CoreError::Decode`] for invalid JSON.
pub fn parse_rebuild_progress(raw: &str) -> Result<RebuildProgress, CoreError> {
    serde_json::from_str(raw).map_err(CoreError::Decode)
}

/// Error type for payload decoding and form validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON decoding failure.
    #[error("payload decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Payload decoded but violates contract expectations.
    #[error("contract violation: {0}")]
    InvalidContract(String),
    /// Mandatory form field is blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

fn default_if_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Numbers or numeric strings (`"42"`, `"42.5%"`); anything else reads as unknown.
fn lenient_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(number)) => number.as_f64(),
        Some(serde_json::Value::String(text)) => text.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|value: &f64| value.is_finite())
        .map(|value| value.round().clamp(0.0, 100.0) as u8))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(value) => value,
            StringOrNumber::Number(value) => value.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}

#[cfg(test)]
mod tests {
    //! Unit tests for status mapping and form validation.

    use super::*;

    #[test]
    fn status_mapping_preserves_unknown_labels() {
        assert_eq!(UploadStatus::from("Processing".to_string()), UploadStatus::InProgress);
        assert_eq!(UploadStatus::from("done".to_string()), UploadStatus::Completed);
        assert_eq!(
            UploadStatus::from("archived".to_string()),
            UploadStatus::Other("archived".to_string())
        );
        assert!(UploadStatus::Failed.is_terminal());
        assert!(!UploadStatus::InProgress.is_terminal());
    }

    #[test]
    fn payment_reports_require_payment_type() {
        let mut form = UploadForm {
            website: "amazon".to_string(),
            report_type: "payments".to_string(),
            start_date: "2024-04-01".to_string(),
            end_date: "2024-04-30".to_string(),
            payment_type: None,
        };
        assert!(matches!(
            form.validate(),
            Err(CoreError::MissingField("payment_type"))
        ));

        form.payment_type = Some("settlement".to_string());
        form.validate().expect("payment form should validate");
        assert_eq!(form.duration(), "2024-04-01 to 2024-04-30");
    }

    #[test]
    fn payment_type_is_dropped_for_order_reports() {
        let form = UploadForm {
            website: "jiomart".to_string(),
            report_type: "orders".to_string(),
            start_date: "2024-04-01".to_string(),
            end_date: "2024-04-30".to_string(),
            payment_type: Some("settlement".to_string()),
        };
        form.validate().expect("order form should validate");
        assert_eq!(form.effective_payment_type(), None);
    }

    #[test]
    fn rebuild_outcome_follows_leading_marker() {
        let running = RebuildProgress {
            status: "Processing 3/10 files".to_string(),
        };
        let done = RebuildProgress {
            status: "✅ Summary rebuilt".to_string(),
        };
        let failed = RebuildProgress {
            status: "❌ Rebuild failed: timeout".to_string(),
        };
        assert_eq!(running.outcome(), RebuildOutcome::Running);
        assert_eq!(done.outcome(), RebuildOutcome::Succeeded);
        assert_eq!(failed.outcome(), RebuildOutcome::Failed);
    }
}
