//! Integration tests for VERSION propagation into the binary and clients.

use std::fs;

use ecomops_app::{APP_VERSION, app_version};

#[test]
fn version_display_tests_reports_workspace_version() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../VERSION");
    let expected = fs::read_to_string(path).expect("VERSION should be readable");
    assert_eq!(app_version(), expected.trim());
    assert_eq!(APP_VERSION, app_version());
}

#[test]
fn version_display_tests_version_has_numeric_major() {
    let major = app_version().split('.').next().unwrap_or_default();
    assert!(major.parse::<u32>().is_ok(), "major component should be numeric: {major}");
}
