//! Page controller shared by every ecomops page.
//!
//! One controller instance lives for one page load. Protected pages run the
//! session bootstrap in [`PageController::open`]; every later operation
//! re-checks the session watcher before touching the backend, and leaves the
//! page at most once.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, ScopedJoinHandle};

use ecomops_api::{ApiClient, ApiError, ReportFile, UploadReceipt};
use ecomops_auth::{
    AuthChange, AuthClient, AuthContext, AuthError, Bootstrap, Credentials, RedirectReason,
    SessionBootstrapper, SessionWatcher, TokenStore, WatchOutcome, now_ms,
};
use ecomops_core::{
    CoreError, RebuildOutcome, RebuildProgress, UploadForm, UploadRecord, UploadStatus,
};
use ecomops_render::{
    Fragment, ids, render_dashboard, render_financial_cards, render_upload_list, render_welcome,
    render_widget_error,
};
use ecomops_ui::{DashboardState, Page, PageView, StatusMessage, WidgetState};
use tracing::{error, info, warn};

use crate::poller::{CancellationToken, PollOutcome, PollStep, ProgressPoller};

/// Alert shown when the backend rejects the page token.
pub const ACCESS_DENIED: &str = "Access denied. Please login again.";
/// Alert shown when a form needs a session the page does not have.
pub const LOGIN_FIRST: &str = "Please login first.";
/// Inline status after an accepted upload.
pub const UPLOAD_OK: &str = "✅ Upload successful!";
/// Inline status when the backend cannot be reached.
pub const BACKEND_UNREACHABLE: &str = "Could not reach the server. Please try again later.";

/// Collaborators injected into every page.
#[derive(Clone)]
pub struct AppServices {
    /// Auth operations over the provider.
    pub auth: AuthClient,
    /// Token cache.
    pub store: Arc<dyn TokenStore>,
    /// Backend client.
    pub api: ApiClient,
    /// Landing page linked from recovery emails.
    pub reset_redirect: String,
}

/// Result of opening a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOpen {
    /// Page needs no session.
    Public,
    /// Session confirmed.
    Ready,
    /// Page left for login.
    Redirected(RedirectReason),
}

/// Result of a dashboard load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Widgets rendered; each carries its own state.
    Loaded(DashboardState),
    /// Liveness check could not reach the backend.
    Unavailable(String),
    /// Page left for login.
    Redirected,
}

/// Result of an upload submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Form incomplete; nothing was sent.
    Invalid(String),
    /// User declined to replace an existing report.
    Declined,
    /// Backend accepted the file.
    Uploaded(UploadReceipt),
    /// Backend rejected the file.
    Failed(String),
    /// Page left for login.
    Redirected,
}

/// Per-page controller.
pub struct PageController<'v> {
    page: Page,
    services: AppServices,
    view: &'v mut dyn PageView,
    context: Option<AuthContext>,
    changes: Option<Receiver<AuthChange>>,
    left: bool,
}

impl<'v> PageController<'v> {
    /// Creates a controller for `page`.
    pub fn new(page: Page, services: AppServices, view: &'v mut dyn PageView) -> Self {
        Self {
            page,
            services,
            view,
            context: None,
            changes: None,
            left: false,
        }
    }

    /// Page this controller drives.
    pub fn page(&self) -> Page {
        self.page
    }

    /// Session context, once bootstrapped.
    pub fn context(&self) -> Option<&AuthContext> {
        self.context.as_ref()
    }

    /// Returns `true` once the page navigated away.
    pub fn has_left(&self) -> bool {
        self.left
    }

    /// Runs the page-load session bootstrap for protected pages.
    pub fn open(&mut self) -> PageOpen {
        if !self.page.requires_session() {
            return PageOpen::Public;
        }
        let provider = self.services.auth.provider();
        match SessionBootstrapper::bootstrap(provider, self.services.store.as_ref()) {
            Bootstrap::Ready(context) => {
                self.changes = Some(provider.subscribe());
                self.context = Some(context);
                PageOpen::Ready
            }
            Bootstrap::RedirectToLogin(reason) => {
                info!(stage = "page", action = "redirect", page = self.page.path(), ?reason);
                self.leave(Page::Login);
                PageOpen::Redirected(reason)
            }
        }
    }

    /// Signs out, wipes the cache and leaves for login, once per page.
    pub fn logout(&mut self) {
        if self.left {
            return;
        }
        if let Err(error) = self.services.auth.logout(self.services.store.as_ref()) {
            warn!(stage = "page", action = "logout", %error);
        }
        if let Some(context) = self.context.as_mut() {
            context.machine_mut().logout();
        }
        self.leave(Page::Login);
    }

    /// Applies pending provider notifications; returns `false` if the page left.
    pub fn sync_session(&mut self) -> bool {
        if self.left {
            return false;
        }
        if let (Some(changes), Some(context)) = (self.changes.as_ref(), self.context.as_mut()) {
            let outcome =
                SessionWatcher::drain(changes, context, self.services.store.as_ref());
            context.machine_mut().on_tick(now_ms());
            if outcome == WatchOutcome::RedirectToLogin {
                self.leave(Page::Login);
                return false;
            }
        }
        true
    }

    /// Loads the dashboard: liveness check, then concurrent widget fetches.
    pub fn load_dashboard(&mut self, include_financial: bool) -> LoadOutcome {
        let Some(token) = self.require_token() else {
            return LoadOutcome::Redirected;
        };
        if let Some(context) = &self.context {
            let welcome = render_welcome(&context.user().email);
            self.view.apply(&welcome);
        }

        match self.services.api.check_protected(&token) {
            Ok(()) => {}
            Err(error @ (ApiError::Timeout | ApiError::Transport(_))) => {
                error!(stage = "dashboard", action = "liveness", %error);
                self.view.set_status(StatusMessage::error(BACKEND_UNREACHABLE));
                return LoadOutcome::Unavailable(error.to_string());
            }
            Err(error) => {
                warn!(stage = "dashboard", action = "liveness", %error);
                self.deny_access();
                return LoadOutcome::Redirected;
            }
        }
        // Notifications drained here may have rotated the access token.
        let Some(token) = self.require_token() else {
            return LoadOutcome::Redirected;
        };

        let api = &self.services.api;
        let (uploads, summary, financial) = thread::scope(|scope| {
            let uploads = scope.spawn(|| api.list_uploads(&token));
            let summary = scope.spawn(|| api.dashboard_summary(&token));
            let financial = include_financial.then(|| scope.spawn(|| api.financial_summary(&token)));
            (joined(uploads), joined(summary), financial.map(joined))
        });

        let mut rejected = false;
        let mut state = DashboardState::new();
        state.uploads = self.render_widget(uploads, ids::FILE_LIST, "uploads", &mut rejected, |records| {
            vec![render_upload_list(records)]
        });
        state.summary = self.render_widget(summary, ids::WEBSITE_CARDS, "summary", &mut rejected, render_dashboard);
        if let Some(financial) = financial {
            state.financial = self.render_widget(
                financial,
                ids::OUTSTANDING_BY_WEBSITE,
                "financial summary",
                &mut rejected,
                render_financial_cards,
            );
        }

        if rejected {
            self.deny_access();
            return LoadOutcome::Redirected;
        }
        info!(stage = "dashboard", action = "loaded", failures = state.failures());
        LoadOutcome::Loaded(state)
    }

    /// Signs up a new account.
    pub fn submit_signup(&mut self, credentials: &Credentials) -> bool {
        match self.services.auth.sign_up(credentials, None) {
            Ok(_) => {
                self.view.alert("Signup successful! Please check your email to confirm.");
                self.leave(Page::Login);
                true
            }
            Err(error) => {
                self.view.alert(&provider_message(&error, "Signup failed."));
                false
            }
        }
    }

    /// Signs in and caches the session tokens.
    pub fn submit_login(&mut self, credentials: &Credentials) -> bool {
        match self.services.auth.login(credentials, self.services.store.as_ref()) {
            Ok(session) => {
                self.context = Some(AuthContext::new(session));
                self.leave(Page::Dashboard);
                true
            }
            Err(error) => {
                self.view.alert(&provider_message(&error, "Login failed."));
                false
            }
        }
    }

    /// Resends the signup confirmation email.
    pub fn submit_resend(&mut self, email: &str) -> bool {
        match self.services.auth.resend_confirmation(email) {
            Ok(()) => {
                self.view
                    .set_status(StatusMessage::success("✅ Confirmation email sent again."));
                true
            }
            Err(error) => {
                self.view
                    .set_status(StatusMessage::error(format!("❌ Error: {error}")));
                false
            }
        }
    }

    /// Verifies the current password and sets a new one.
    pub fn submit_change_password(&mut self, current: &str, new_password: &str) -> bool {
        if !self.sync_session() {
            return false;
        }
        let result = self.services.auth.change_password(current, new_password);
        match result {
            Ok(_) => {
                self.view.alert("✅ Password changed successfully!");
                self.sync_session();
                true
            }
            Err(AuthError::NoSession) => {
                self.view
                    .alert("❌ You must be logged in to change your password.");
                false
            }
            Err(AuthError::IncorrectPassword) => {
                self.view.alert("❌ Current password is incorrect.");
                self.sync_session();
                false
            }
            Err(error) => {
                self.view
                    .alert(&format!("❌ Failed to change password: {error}"));
                false
            }
        }
    }

    /// Sends a password recovery email.
    pub fn submit_forgot_password(&mut self, email: &str) -> bool {
        let redirect = self.services.reset_redirect.clone();
        match self.services.auth.request_password_reset(email, &redirect) {
            Ok(()) => {
                self.view.set_status(StatusMessage::success(
                    "✅ Reset link sent! Please check your email.",
                ));
                true
            }
            Err(error) => {
                self.view
                    .set_status(StatusMessage::error(format!("❌ Error: {error}")));
                false
            }
        }
    }

    /// Sets a new password from the recovery session.
    pub fn submit_reset_password(&mut self, new_password: &str) -> bool {
        match self.services.auth.reset_password(new_password) {
            Ok(_) => {
                self.view
                    .alert("✅ Password has been reset. You can now log in.");
                self.leave(Page::Login);
                true
            }
            Err(error) => {
                self.view
                    .alert(&format!("❌ Failed to reset password: {error}"));
                false
            }
        }
    }

    /// Validates, checks for duplicates, asks before replacing, then uploads.
    pub fn submit_upload(&mut self, form: &UploadForm, file: &ReportFile) -> UploadOutcome {
        let Some(token) = self.require_token() else {
            return UploadOutcome::Redirected;
        };

        if let Err(error) = form.validate() {
            let message = match error {
                CoreError::MissingField(field) => format!("Please fill in {field}."),
                other => other.to_string(),
            };
            self.view.set_status(StatusMessage::error(message.clone()));
            return UploadOutcome::Invalid(message);
        }
        if file.is_empty() {
            let message = "Please choose a file.".to_string();
            self.view.set_status(StatusMessage::error(message.clone()));
            return UploadOutcome::Invalid(message);
        }

        match self.services.api.check_duplicate(&token, form) {
            Ok(check) if check.exists => {
                let question = format!(
                    "A report already exists:\nFile ID: {}\nUploaded: {}\n\nReplace it?",
                    check.id.as_deref().unwrap_or("unknown"),
                    check.uploaded_at.as_deref().unwrap_or("unknown")
                );
                if !self.view.confirm(&question) {
                    info!(stage = "upload", action = "declined_overwrite");
                    return UploadOutcome::Declined;
                }
            }
            Ok(_) => {}
            Err(ApiError::Unauthorized(_)) => {
                self.deny_access();
                return UploadOutcome::Redirected;
            }
            Err(error) => warn!(stage = "upload", action = "duplicate_check", %error),
        }

        self.view.set_status(StatusMessage::info("Uploading…"));
        match self.services.api.upload_report(&token, form, file) {
            Ok(receipt) => {
                self.view.set_status(StatusMessage::success(UPLOAD_OK));
                UploadOutcome::Uploaded(receipt)
            }
            Err(ApiError::Unauthorized(_)) => {
                self.deny_access();
                UploadOutcome::Redirected
            }
            Err(error) => {
                let message = format!("❌ Upload failed: {error}");
                self.view.set_status(StatusMessage::error(message.clone()));
                UploadOutcome::Failed(message)
            }
        }
    }

    /// Polls the uploads list until the uploaded record is terminal.
    pub fn track_upload(
        &mut self,
        form: &UploadForm,
        receipt: &UploadReceipt,
        poller: &ProgressPoller,
        cancel: &CancellationToken,
    ) -> PollOutcome<UploadRecord> {
        let Some(token) = self.require_token() else {
            return PollOutcome::Unauthorized;
        };
        let api = &self.services.api;
        let view = &mut *self.view;
        let record_id = receipt.record_id.as_deref();
        let duration = form.duration();

        let outcome = poller.run("upload", cancel, || {
            let records = api.list_uploads(&token)?;
            view.apply(&render_upload_list(&records));
            let record = records.iter().find(|record| match record_id {
                Some(id) => record.id == id,
                None => {
                    record.website == form.website
                        && record.report_type == form.report_type
                        && record.duration == duration
                }
            });
            match record {
                Some(record) if record.status.is_terminal() => Ok(PollStep::Done(record.clone())),
                Some(record) => {
                    view.set_status(StatusMessage::info(progress_line(record)));
                    Ok(PollStep::Pending)
                }
                None => Ok(PollStep::Pending),
            }
        });

        match &outcome {
            PollOutcome::Finished(record) if record.status == UploadStatus::Failed => {
                let reason = record.message.as_deref().unwrap_or("unknown error");
                self.view.set_status(StatusMessage::error(format!(
                    "❌ Processing failed: {reason}"
                )));
            }
            PollOutcome::Finished(_) => {
                self.view.set_status(StatusMessage::success("✅ Report processed."));
            }
            other => self.report_poll_end(other),
        }
        outcome
    }

    /// Starts a summary rebuild and polls it to completion.
    pub fn rebuild_summary(
        &mut self,
        poller: &ProgressPoller,
        cancel: &CancellationToken,
    ) -> PollOutcome<RebuildProgress> {
        let Some(token) = self.require_token() else {
            return PollOutcome::Unauthorized;
        };

        self.view.set_status(StatusMessage::info("Rebuilding summary…"));
        let ticket = match self.services.api.start_rebuild(&token) {
            Ok(ticket) => ticket,
            Err(ApiError::Unauthorized(_)) => {
                self.deny_access();
                return PollOutcome::Unauthorized;
            }
            Err(error) => {
                let message = format!("❌ Rebuild failed: {error}");
                self.view.set_status(StatusMessage::error(message.clone()));
                return PollOutcome::Failed(message);
            }
        };
        info!(stage = "rebuild", action = "started", session_id = ticket.session_id.as_str());

        let api = &self.services.api;
        let view = &mut *self.view;
        let outcome = poller.run("rebuild", cancel, || {
            let progress = api.rebuild_progress(&token, &ticket.session_id)?;
            match progress.outcome() {
                RebuildOutcome::Running => {
                    view.set_status(StatusMessage::info(progress.status.clone()));
                    Ok(PollStep::Pending)
                }
                RebuildOutcome::Succeeded | RebuildOutcome::Failed => Ok(PollStep::Done(progress)),
            }
        });

        match &outcome {
            PollOutcome::Finished(progress) if progress.outcome() == RebuildOutcome::Failed => {
                self.view.set_status(StatusMessage::error(progress.status.clone()));
            }
            PollOutcome::Finished(progress) => {
                self.view.set_status(StatusMessage::success(progress.status.clone()));
                match self.services.api.dashboard_summary(&token) {
                    Ok(summary) => self.apply_all(&render_dashboard(&summary)),
                    Err(error) => {
                        warn!(stage = "rebuild", action = "refresh_summary", %error);
                        self.view.apply(&render_widget_error(
                            ids::WEBSITE_CARDS,
                            &format!("Failed to load summary: {error}"),
                        ));
                    }
                }
            }
            other => self.report_poll_end(other),
        }
        outcome
    }

    fn require_token(&mut self) -> Option<String> {
        if !self.sync_session() {
            return None;
        }
        let token = self
            .context
            .as_ref()
            .and_then(|context| context.access_token(now_ms()))
            .map(str::to_string);
        if token.is_none() {
            self.view.alert(LOGIN_FIRST);
            self.logout();
        }
        token
    }

    fn deny_access(&mut self) {
        if self.left {
            return;
        }
        if let Some(context) = self.context.as_mut() {
            context.machine_mut().on_rejected();
        }
        self.view.alert(ACCESS_DENIED);
        self.logout();
    }

    fn leave(&mut self, page: Page) {
        if !self.left {
            self.left = true;
            self.view.redirect(page);
        }
    }

    fn apply_all(&mut self, fragments: &[Fragment]) {
        for fragment in fragments {
            self.view.apply(fragment);
        }
    }

    fn render_widget<T, F>(
        &mut self,
        result: Result<T, ApiError>,
        element_id: &str,
        label: &str,
        rejected: &mut bool,
        render: F,
    ) -> WidgetState
    where
        F: FnOnce(&T) -> Vec<Fragment>,
    {
        match result {
            Ok(value) => {
                self.apply_all(&render(&value));
                WidgetState::Ready
            }
            Err(ApiError::Unauthorized(status)) => {
                *rejected = true;
                WidgetState::Failed(format!("unauthorized (status {status})"))
            }
            Err(error) => {
                warn!(stage = "dashboard", action = "widget", widget = label, %error);
                let message = format!("Failed to load {label}: {error}");
                self.view.apply(&render_widget_error(element_id, &message));
                WidgetState::Failed(message)
            }
        }
    }

    fn report_poll_end<T>(&mut self, outcome: &PollOutcome<T>) {
        match outcome {
            PollOutcome::Finished(_) | PollOutcome::Cancelled => {}
            PollOutcome::Unauthorized => self.deny_access(),
            PollOutcome::Exhausted { .. } => self.view.set_status(StatusMessage::info(
                "Still processing. Check the dashboard later.",
            )),
            PollOutcome::GaveUp { last_error, .. } => self.view.set_status(StatusMessage::error(
                format!("❌ Lost contact with the server: {last_error}"),
            )),
            PollOutcome::Failed(message) => {
                self.view.set_status(StatusMessage::error(format!("❌ {message}")))
            }
        }
    }
}

fn joined<T>(handle: ScopedJoinHandle<'_, Result<T, ApiError>>) -> Result<T, ApiError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(ApiError::Transport("widget fetch panicked".to_string())))
}

fn provider_message(error: &AuthError, fallback: &str) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

fn progress_line(record: &UploadRecord) -> String {
    match record.progress {
        Some(progress) => format!("Processing… {}%", progress.min(100)),
        None => format!("Processing… ({})", record.status),
    }
}
