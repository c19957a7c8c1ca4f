//! Integration tests for page-load session bootstrap.

mod common;

use std::sync::Arc;

use common::{API_BASE, EMAIL, Fixture, SUMMARY_BODY, UPLOADS_BODY};
use ecomops_api::{
    ApiClient, ApiError, DASHBOARD_SUMMARY_PATH, HttpRequest, HttpResponse, HttpTransport, Method,
    PROTECTED_PATH, ScriptedTransport, UPLOADS_LIST_PATH,
};
use ecomops_app::{AppServices, LoadOutcome, PageController, PageOpen};
use ecomops_auth::{
    ACCESS_TOKEN_KEY, AuthChange, AuthEvent, RedirectReason, REFRESH_TOKEN_KEY,
    SyntheticAuthProvider, TokenStore,
};
use ecomops_ui::{Page, RecordingView};

/// Rotates the provider session while the liveness check is in flight.
struct RefreshDuringLiveness {
    inner: Arc<ScriptedTransport>,
    provider: Arc<SyntheticAuthProvider>,
}

impl HttpTransport for RefreshDuringLiveness {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        if request.url.path() == PROTECTED_PATH
            && let Some(session) = self.provider.issue_session(EMAIL)
        {
            self.provider.push_change(AuthChange {
                event: AuthEvent::TokenRefreshed,
                session: Some(session),
            });
        }
        self.inner.send(request)
    }
}

#[test]
fn page_bootstrap_tests_missing_refresh_token_never_reaches_backend() {
    let fixture = Fixture::signed_out();
    fixture
        .store
        .set(ACCESS_TOKEN_KEY, "access-orphan")
        .expect("seed access token");
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Dashboard, fixture.services(), &mut view);
    assert_eq!(page.open(), PageOpen::Redirected(RedirectReason::IncompleteTokens));
    page.load_dashboard(true);
    drop(page);

    assert!(fixture.transport.requests().is_empty());
    assert_eq!(fixture.provider.call_count("set_session"), 0);
    assert_eq!(view.redirects(), vec![Page::Login]);
}

#[test]
fn page_bootstrap_tests_restores_session_from_cache_after_reload() {
    let fixture = Fixture::signed_in();
    fixture.provider.forget_current();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Upload, fixture.services(), &mut view);
    assert_eq!(page.open(), PageOpen::Ready);
    assert_eq!(
        page.context().map(|context| context.user().email.clone()),
        Some(EMAIL.to_string())
    );
    drop(page);

    assert_eq!(fixture.provider.call_count("set_session"), 1);
    assert_eq!(fixture.store.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-2"));
    assert!(view.redirects().is_empty());
}

#[test]
fn page_bootstrap_tests_rejected_cache_is_cleared_and_redirects() {
    let fixture = Fixture::signed_out();
    fixture.store.set(ACCESS_TOKEN_KEY, "access-9").expect("seed access");
    fixture.store.set(REFRESH_TOKEN_KEY, "refresh-9").expect("seed refresh");
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::ChangePassword, fixture.services(), &mut view);
    assert!(matches!(page.open(), PageOpen::Redirected(RedirectReason::RestoreFailed(_))));
    drop(page);

    assert!(fixture.store.is_empty());
    assert_eq!(view.redirects(), vec![Page::Login]);
}

#[test]
fn page_bootstrap_tests_public_pages_skip_the_provider() {
    let fixture = Fixture::signed_out();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::ForgotPassword, fixture.services(), &mut view);
    assert_eq!(page.open(), PageOpen::Public);
    drop(page);

    assert!(fixture.provider.calls().is_empty());
    assert!(view.events().is_empty());
}

#[test]
fn page_bootstrap_tests_logout_leaves_exactly_once() {
    let fixture = Fixture::signed_in();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Dashboard, fixture.services(), &mut view);
    assert_eq!(page.open(), PageOpen::Ready);
    page.logout();
    page.logout();
    assert!(page.has_left());
    drop(page);

    assert_eq!(fixture.provider.call_count("sign_out"), 1);
    assert!(fixture.store.is_empty());
    assert_eq!(view.redirects(), vec![Page::Login]);
}

#[test]
fn page_bootstrap_tests_provider_sign_out_notification_ends_the_page() {
    let fixture = Fixture::signed_in();
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Dashboard, fixture.services(), &mut view);
    assert_eq!(page.open(), PageOpen::Ready);
    fixture.provider.push_change(AuthChange {
        event: AuthEvent::SignedOut,
        session: None,
    });
    assert!(!page.sync_session());
    page.load_dashboard(false);
    drop(page);

    assert!(fixture.transport.requests().is_empty());
    assert!(fixture.store.is_empty());
    assert_eq!(view.redirects(), vec![Page::Login]);
}

#[test]
fn page_bootstrap_tests_widgets_use_token_refreshed_during_liveness_check() {
    let fixture = Fixture::signed_in();
    fixture
        .transport
        .respond(Method::Get, PROTECTED_PATH, 200, "{}")
        .respond(Method::Get, UPLOADS_LIST_PATH, 200, UPLOADS_BODY)
        .respond(Method::Get, DASHBOARD_SUMMARY_PATH, 200, SUMMARY_BODY);
    let transport = RefreshDuringLiveness {
        inner: fixture.transport.clone(),
        provider: fixture.provider.clone(),
    };
    let services = AppServices {
        api: ApiClient::new(API_BASE, Arc::new(transport)).expect("api base should be valid"),
        ..fixture.services()
    };
    let mut view = RecordingView::new();

    let mut page = PageController::new(Page::Dashboard, services, &mut view);
    assert_eq!(page.open(), PageOpen::Ready);
    assert!(matches!(page.load_dashboard(false), LoadOutcome::Loaded(_)));
    drop(page);

    let requests = fixture.transport.requests();
    assert_eq!(requests[0].bearer.as_deref(), Some("access-1"));
    for request in requests.iter().filter(|request| request.path != PROTECTED_PATH) {
        assert_eq!(request.bearer.as_deref(), Some("access-2"), "{}", request.path);
    }
    assert_eq!(requests.len(), 3);
    assert_eq!(fixture.store.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-2"));
    assert!(view.redirects().is_empty());
}
