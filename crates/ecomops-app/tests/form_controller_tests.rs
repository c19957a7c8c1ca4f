//! Integration tests for the auth form controllers.

mod common;

use common::{EMAIL, Fixture, PASSWORD};
use ecomops_app::{PageController, PageOpen};
use ecomops_auth::{ACCESS_TOKEN_KEY, Credentials, REFRESH_TOKEN_KEY, TokenStore};
use ecomops_ui::{Page, RecordingView, Tone};

#[test]
fn form_controller_tests_signup_confirms_and_returns_to_login() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Signup, fixture.services(), &mut view);
    assert!(page.submit_signup(&Credentials::new("new@example.test", "pw-123456")));
    drop(page);

    assert_eq!(
        view.alerts(),
        vec!["Signup successful! Please check your email to confirm."]
    );
    assert_eq!(view.redirects(), vec![Page::Login]);
}

#[test]
fn form_controller_tests_signup_shows_provider_message() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Signup, fixture.services(), &mut view);
    assert!(!page.submit_signup(&Credentials::new(EMAIL, "whatever")));
    drop(page);

    assert_eq!(view.alerts(), vec!["User already registered"]);
    assert!(view.redirects().is_empty());
}

#[test]
fn form_controller_tests_login_caches_both_tokens_and_opens_dashboard() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Login, fixture.services(), &mut view);
    assert!(page.submit_login(&Credentials::new(EMAIL, PASSWORD)));
    drop(page);

    assert_eq!(fixture.store.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-1"));
    assert_eq!(fixture.store.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));
    assert_eq!(view.redirects(), vec![Page::Dashboard]);
}

#[test]
fn form_controller_tests_login_failure_alerts_and_stays() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Login, fixture.services(), &mut view);
    assert!(!page.submit_login(&Credentials::new(EMAIL, "wrong")));
    drop(page);

    assert_eq!(view.alerts(), vec!["Invalid login credentials"]);
    assert!(fixture.store.is_empty());
    assert!(view.redirects().is_empty());
}

#[test]
fn form_controller_tests_change_password_checks_current_password() {
    let fixture = Fixture::signed_in();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::ChangePassword, fixture.services(), &mut view);
    assert_eq!(page.open(), PageOpen::Ready);
    assert!(!page.submit_change_password("nope", "new-password"));
    assert!(page.submit_change_password(PASSWORD, "new-password"));
    drop(page);

    assert_eq!(
        view.alerts(),
        vec!["❌ Current password is incorrect.", "✅ Password changed successfully!"]
    );
    assert_eq!(fixture.provider.password_of(EMAIL).as_deref(), Some("new-password"));
    assert!(view.redirects().is_empty());
}

#[test]
fn form_controller_tests_forgot_password_sends_recovery_email() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::ForgotPassword, fixture.services(), &mut view);
    assert!(page.submit_forgot_password(EMAIL));
    assert!(!page.submit_forgot_password("  "));
    drop(page);

    assert_eq!(fixture.provider.recovery_emails(), vec![EMAIL.to_string()]);
    let statuses: Vec<Tone> = view
        .events()
        .iter()
        .filter_map(|event| match event {
            ecomops_ui::ViewEvent::Status(status) => Some(status.tone),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![Tone::Success, Tone::Error]);
}

#[test]
fn form_controller_tests_reset_password_requires_recovery_session() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::ResetPassword, fixture.services(), &mut view);
    assert!(!page.submit_reset_password("fresh-password"));
    drop(page);
    assert_eq!(
        view.alerts(),
        vec!["❌ Failed to reset password: Auth session missing!"]
    );

    fixture.provider.issue_session(EMAIL);
    let mut view = RecordingView::new();
    let mut page = PageController::new(Page::ResetPassword, fixture.services(), &mut view);
    assert!(page.submit_reset_password("fresh-password"));
    drop(page);

    assert_eq!(view.redirects(), vec![Page::Login]);
    assert_eq!(fixture.provider.password_of(EMAIL).as_deref(), Some("fresh-password"));
}

#[test]
fn form_controller_tests_resend_reports_unknown_account() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Signup, fixture.services(), &mut view);
    assert!(page.submit_resend(EMAIL));
    assert!(!page.submit_resend("ghost@example.test"));
    drop(page);

    assert_eq!(
        view.last_status().map(|status| status.text.as_str()),
        Some("❌ Error: User not found")
    );
}
