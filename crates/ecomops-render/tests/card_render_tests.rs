//! Tests KPI cards, upload list and escaping in rendered fragments.

use ecomops_core::{UploadRecord, UploadStatus, parse_financial_summary, parse_summary};
use ecomops_render::{
    Fragment, ids, render_dashboard, render_financial_cards, render_summary_cards,
    render_upload_list, render_welcome,
};

fn html_for<'a>(fragments: &'a [Fragment], id: &str) -> &'a str {
    fragments
        .iter()
        .find(|fragment| fragment.element_id == id)
        .map(|fragment| fragment.html.as_str())
        .expect("fragment should exist")
}

#[test]
fn card_render_tests_shipped_orders_and_paid_amount() {
    let summary = parse_summary(r#"{"shipped_orders": 12, "total_paid": 45000.5}"#)
        .expect("summary should parse");
    let fragments = render_summary_cards(&summary);

    assert_eq!(html_for(&fragments, ids::SHIPPED_ORDERS), "12");
    assert_eq!(html_for(&fragments, ids::TOTAL_PAID), "₹45,000.50");
    assert_eq!(html_for(&fragments, ids::TOTAL_CHARGES), "₹0.00");
    assert_eq!(fragments.len(), 7);
}

#[test]
fn card_render_tests_dashboard_includes_ranking_and_website_cards() {
    let summary = parse_summary(
        r#"{"by_website": {
            "jiomart": {"orders": 2, "paid": 999.99},
            "amazon": {"orders": 20, "paid": 1234567, "outstanding": 10}
        }}"#,
    )
    .expect("summary should parse");
    let fragments = render_dashboard(&summary);

    let cards = html_for(&fragments, ids::WEBSITE_CARDS);
    let amazon = cards.find("amazon").expect("amazon card");
    let jiomart = cards.find("jiomart").expect("jiomart card");
    assert!(amazon < jiomart);
    assert!(cards.contains("Paid: ₹12,34,567.00"));
    assert!(cards.contains("Paid: ₹999.99"));

    let ranking = html_for(&fragments, ids::ORDERS_BY_WEBSITE);
    assert!(ranking.contains("width: 100%"));
    assert!(ranking.contains("width: 10%"));
}

#[test]
fn card_render_tests_upload_list_links_and_escapes() {
    let records = vec![
        UploadRecord {
            id: "1".to_string(),
            website: "amazon".to_string(),
            report_type: "orders".to_string(),
            duration: "2024-04-01 to 2024-04-30".to_string(),
            file_url: "https://files.example.test/1.csv?a=1&b=2".to_string(),
            status: UploadStatus::InProgress,
            progress: Some(40),
            message: None,
            uploaded_at: None,
        },
        UploadRecord {
            id: "2".to_string(),
            website: "<script>".to_string(),
            report_type: "payments".to_string(),
            duration: String::new(),
            file_url: String::new(),
            status: UploadStatus::Failed,
            progress: Some(100),
            message: Some("Bad header row".to_string()),
            uploaded_at: None,
        },
    ];

    let fragment = render_upload_list(&records);
    assert_eq!(fragment.element_id, ids::FILE_LIST);
    assert!(fragment.html.contains(
        "<strong>amazon</strong> – orders (2024-04-01 to 2024-04-30) – <a href=\"https://files.example.test/1.csv?a=1&amp;b=2\" target=\"_blank\">View</a>"
    ));
    assert!(fragment.html.contains("in_progress 40%"));
    assert!(fragment.html.contains("&lt;script&gt;"));
    assert!(fragment.html.contains("failed – Bad header row"));
    assert!(!fragment.html.contains("failed 100%"));
}

#[test]
fn card_render_tests_upload_list_skips_non_web_links() {
    let record = |id: &str, file_url: &str| UploadRecord {
        id: id.to_string(),
        website: "amazon".to_string(),
        report_type: "orders".to_string(),
        duration: "2024-04-01 to 2024-04-30".to_string(),
        file_url: file_url.to_string(),
        status: UploadStatus::Completed,
        progress: None,
        message: None,
        uploaded_at: None,
    };
    let records = vec![
        record("1", "javascript:alert(document.cookie)"),
        record("2", " JavaScript:alert(1)"),
        record("3", "data:text/html;base64,PHNjcmlwdD4="),
        record("4", "HTTP://files.example.test/4.csv"),
    ];

    let html = render_upload_list(&records).html;
    assert!(!html.to_ascii_lowercase().contains("javascript:"));
    assert!(!html.contains("data:text/html"));
    assert_eq!(html.matches("<a href=").count(), 1);
    assert!(html.contains("<a href=\"HTTP://files.example.test/4.csv\""));
}

#[test]
fn card_render_tests_financial_cards() {
    let financial = parse_financial_summary(
        r#"{"total_outstanding": 1500.25, "by_website": {"amazon": {"outstanding": 1500.25}}}"#,
    )
    .expect("financial summary should parse");
    let fragments = render_financial_cards(&financial);
    assert_eq!(html_for(&fragments, ids::FIN_OUTSTANDING), "₹1,500.25");
    assert!(html_for(&fragments, ids::OUTSTANDING_BY_WEBSITE).contains("₹1,500.25"));
}

#[test]
fn card_render_tests_welcome_line() {
    let fragment = render_welcome("ops@example.test");
    assert_eq!(fragment.element_id, ids::MESSAGE);
    assert_eq!(fragment.html, "Welcome, ops@example.test");
}
