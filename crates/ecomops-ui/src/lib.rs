#![warn(missing_docs)]
//! # ecomops-ui
//!
//! ## Purpose
//! Defines the page-facing view seam and per-page UI state for ecomops.
//!
//! ## Responsibilities
//! - Catalogue the static pages and which of them need a session.
//! - Abstract DOM mutation, alerts, confirmations and navigation behind
//!   [`PageView`].
//! - Model button-group selectors, inline status text and widget states.
//!
//! ## Data flow
//! Controllers produce fragments and messages -> [`PageView`] -> the real
//! page (or a [`RecordingView`] in tests).
//!
//! ## Ownership and lifetimes
//! Views are borrowed mutably by one controller at a time; recorded events
//! are owned values.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors: invalid
//! selections are rejected by returning `false`.
//!
//! ## Security and privacy notes
//! Views never receive tokens or passwords.

use std::collections::VecDeque;

use ecomops_render::Fragment;

/// Static pages of the ecomops frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Login form (site root).
    Login,
    /// Signup form.
    Signup,
    /// KPI dashboard.
    Dashboard,
    /// Report upload form.
    Upload,
    /// Change password form.
    ChangePassword,
    /// Forgot password form.
    ForgotPassword,
    /// Reset password form (recovery link target).
    ResetPassword,
}

impl Page {
    /// Document path of the page.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Login => "index.html",
            Self::Signup => "signup.html",
            Self::Dashboard => "dashboard.html",
            Self::Upload => "upload.html",
            Self::ChangePassword => "change-password.html",
            Self::ForgotPassword => "forgot-password.html",
            Self::ResetPassword => "reset-password.html",
        }
    }

    /// Returns `true` when opening the page requires a session bootstrap.
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::Dashboard | Self::Upload | Self::ChangePassword)
    }
}

/// Inline status tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Green confirmation.
    Success,
    /// Red failure.
    Error,
    /// Neutral progress text.
    Info,
}

/// Inline status line shown under a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Text content.
    pub text: String,
    /// Color tone.
    pub tone: Tone,
}

impl StatusMessage {
    /// Success message.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Success,
        }
    }

    /// Error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Error,
        }
    }

    /// Neutral message.
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Info,
        }
    }
}

/// Page surface driven by controllers.
pub trait PageView {
    /// Replaces the inner HTML of element `element_id`.
    fn set_html(&mut self, element_id: &str, html: &str);

    /// Shows inline status text.
    fn set_status(&mut self, message: StatusMessage);

    /// Shows a blocking alert.
    fn alert(&mut self, message: &str);

    /// Asks a yes/no question; `true` means confirmed.
    fn confirm(&mut self, message: &str) -> bool;

    /// Navigates away.
    fn redirect(&mut self, page: Page);

    /// Applies a rendered fragment.
    fn apply(&mut self, fragment: &Fragment) {
        self.set_html(&fragment.element_id, &fragment.html);
    }
}

/// One recorded view interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// `set_html`.
    Html {
        /// Element id.
        element_id: String,
        /// HTML content.
        html: String,
    },
    /// `set_status`.
    Status(StatusMessage),
    /// `alert`.
    Alert(String),
    /// `confirm` and the answer given.
    Confirm {
        /// Question text.
        message: String,
        /// Answer returned.
        answer: bool,
    },
    /// `redirect`.
    Redirect(Page),
}

/// View that records every interaction, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingView {
    events: Vec<ViewEvent>,
    answers: VecDeque<bool>,
}

impl RecordingView {
    /// Creates a view that declines every confirmation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues answers for upcoming confirmations; unqueued ones decline.
    pub fn with_answers(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            events: Vec::new(),
            answers: answers.into_iter().collect(),
        }
    }

    /// All events in order.
    pub fn events(&self) -> &[ViewEvent] {
        &self.events
    }

    /// Latest HTML written to `element_id`.
    pub fn html(&self, element_id: &str) -> Option<&str> {
        self.events.iter().rev().find_map(|event| match event {
            ViewEvent::Html { element_id: id, html } if id == element_id => Some(html.as_str()),
            _ => None,
        })
    }

    /// Latest status line.
    pub fn last_status(&self) -> Option<&StatusMessage> {
        self.events.iter().rev().find_map(|event| match event {
            ViewEvent::Status(message) => Some(message),
            _ => None,
        })
    }

    /// Every alert text.
    pub fn alerts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ViewEvent::Alert(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every confirmation question.
    pub fn confirmations(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ViewEvent::Confirm { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every redirect target.
    pub fn redirects(&self) -> Vec<Page> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ViewEvent::Redirect(page) => Some(*page),
                _ => None,
            })
            .collect()
    }
}

impl PageView for RecordingView {
    fn set_html(&mut self, element_id: &str, html: &str) {
        self.events.push(ViewEvent::Html {
            element_id: element_id.to_string(),
            html: html.to_string(),
        });
    }

    fn set_status(&mut self, message: StatusMessage) {
        self.events.push(ViewEvent::Status(message));
    }

    fn alert(&mut self, message: &str) {
        self.events.push(ViewEvent::Alert(message.to_string()));
    }

    fn confirm(&mut self, message: &str) -> bool {
        let answer = self.answers.pop_front().unwrap_or(false);
        self.events.push(ViewEvent::Confirm {
            message: message.to_string(),
            answer,
        });
        answer
    }

    fn redirect(&mut self, page: Page) {
        self.events.push(ViewEvent::Redirect(page));
    }
}

/// Mutually exclusive button selector backing a hidden form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonGroup {
    field: String,
    options: Vec<String>,
    active: Option<usize>,
}

impl ButtonGroup {
    /// Creates a group for hidden field `field` with button values `options`.
    pub fn new<I, S>(field: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            options: options.into_iter().map(Into::into).collect(),
            active: None,
        }
    }

    /// Hidden field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Activates the button for `value`, deactivating the others.
    ///
    /// Returns `false` and keeps the current selection for unknown values.
    pub fn select(&mut self, value: &str) -> bool {
        match self.options.iter().position(|option| option == value) {
            Some(index) => {
                self.active = Some(index);
                true
            }
            None => false,
        }
    }

    /// Hidden field value.
    pub fn value(&self) -> Option<&str> {
        self.active.map(|index| self.options[index].as_str())
    }

    /// Returns `true` when `value`'s button is the active one.
    pub fn is_active(&self, value: &str) -> bool {
        self.value() == Some(value)
    }
}

/// Independent state of one dashboard widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetState {
    /// Not fetched.
    Idle,
    /// Rendered from a fresh response.
    Ready,
    /// Fetch failed; the message was rendered in place.
    Failed(String),
}

/// Widget states after one dashboard load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardState {
    /// Upload list widget.
    pub uploads: WidgetState,
    /// KPI summary widget.
    pub summary: WidgetState,
    /// Financial summary widget.
    pub financial: WidgetState,
}

impl DashboardState {
    /// All widgets idle.
    pub fn new() -> Self {
        Self {
            uploads: WidgetState::Idle,
            summary: WidgetState::Idle,
            financial: WidgetState::Idle,
        }
    }

    /// Number of widgets that failed.
    pub fn failures(&self) -> usize {
        [&self.uploads, &self.summary, &self.financial]
            .iter()
            .filter(|state| matches!(state, WidgetState::Failed(_)))
            .count()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
