//! Integration tests for endpoint request building and response mapping.

use std::sync::Arc;

use ecomops_api::{
    ApiClient, ApiError, DASHBOARD_SUMMARY_PATH, Method, PROTECTED_PATH, ReportFile,
    ScriptedTransport, UPLOADS_DUPLICATE_PATH, UPLOADS_UPLOAD_PATH,
};
use ecomops_core::UploadForm;

const BASE: &str = "https://api.example.test";

fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
    ApiClient::new(BASE, transport.clone()).expect("client should build")
}

fn payment_form() -> UploadForm {
    UploadForm {
        website: "amazon".to_string(),
        report_type: "payments".to_string(),
        start_date: "2024-04-01".to_string(),
        end_date: "2024-04-30".to_string(),
        payment_type: Some("settlement".to_string()),
    }
}

#[test]
fn api_client_tests_rejects_plain_http_base() {
    let transport = Arc::new(ScriptedTransport::new());
    assert!(matches!(
        ApiClient::new("http://api.example.test", transport),
        Err(ApiError::InvalidEndpoint(_))
    ));
}

#[test]
fn api_client_tests_sends_bearer_token_to_protected_route() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(Method::Get, PROTECTED_PATH, 200, r#"{"ok":true}"#);

    client(&transport)
        .check_protected("access-1")
        .expect("liveness check should pass");
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].bearer.as_deref(), Some("access-1"));
}

#[test]
fn api_client_tests_maps_rejected_token_to_unauthorized() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(Method::Get, DASHBOARD_SUMMARY_PATH, 401, r#"{"detail":"Invalid token"}"#);

    assert!(matches!(
        client(&transport).dashboard_summary("expired"),
        Err(ApiError::Unauthorized(401))
    ));
}

#[test]
fn api_client_tests_encodes_duplicate_check_query() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(Method::Get, UPLOADS_DUPLICATE_PATH, 200, r#"{"exists":false}"#);

    let check = client(&transport)
        .check_duplicate("access-1", &payment_form())
        .expect("duplicate check should succeed");
    assert!(!check.exists);

    let query = &transport.requests()[0].query;
    assert_eq!(
        query,
        &vec![
            ("website".to_string(), "amazon".to_string()),
            ("report_type".to_string(), "payments".to_string()),
            ("duration".to_string(), "2024-04-01 to 2024-04-30".to_string()),
        ]
    );
}

#[test]
fn api_client_tests_builds_multipart_upload_in_field_order() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        Method::Post,
        UPLOADS_UPLOAD_PATH,
        200,
        r#"{"message":"File uploaded","id":91}"#,
    );
    let file = ReportFile::new("payments.csv", b"settlement_id,amount\n".to_vec());

    let receipt = client(&transport)
        .upload_report("access-1", &payment_form(), &file)
        .expect("upload should succeed");
    assert_eq!(receipt.message, "File uploaded");
    assert_eq!(receipt.record_id.as_deref(), Some("91"));
    assert_eq!(receipt.fingerprint, file.fingerprint());

    let names: Vec<String> = transport.requests()[0]
        .fields
        .iter()
        .map(|(name, _)| name.clone())
        .collect();
    assert_eq!(
        names,
        vec!["website", "report_type", "duration", "payment_type", "file"]
    );
}

#[test]
fn api_client_tests_refuses_incomplete_upload_form() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut form = payment_form();
    form.end_date.clear();
    let file = ReportFile::new("payments.csv", vec![1, 2, 3]);

    assert!(matches!(
        client(&transport).upload_report("access-1", &form, &file),
        Err(ApiError::Contract(_))
    ));
    assert!(transport.requests().is_empty());
}

#[test]
fn api_client_tests_surfaces_upload_detail() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        Method::Post,
        UPLOADS_UPLOAD_PATH,
        400,
        r#"{"detail":"Unsupported file format"}"#,
    );
    let file = ReportFile::new("payments.pdf", vec![1]);

    let error = client(&transport)
        .upload_report("access-1", &payment_form(), &file)
        .expect_err("upload should fail");
    assert_eq!(error.to_string(), "Unsupported file format");
}

#[test]
fn api_client_tests_escapes_rebuild_session_segment() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        Method::Get,
        "/dashboard/rebuild-summary/progress/rb%201",
        200,
        r#"{"status":"Processing"}"#,
    );

    let progress = client(&transport)
        .rebuild_progress("access-1", "rb 1")
        .expect("progress should be fetched");
    assert_eq!(progress.status, "Processing");
}
