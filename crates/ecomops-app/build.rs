use std::env;
use std::fs;
use std::path::Path;

// Exposes the workspace `VERSION` file as `ECOMOPS_VERSION`.
fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
    let version_file = Path::new(&manifest_dir).join("../../VERSION");
    println!("cargo:rerun-if-changed={}", version_file.display());

    let contents = fs::read_to_string(&version_file)
        .unwrap_or_else(|error| panic!("cannot read {}: {error}", version_file.display()));
    let version = contents.trim();
    let well_formed = !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    assert!(well_formed, "VERSION must hold a dotted version, got {version:?}");

    println!("cargo:rustc-env=ECOMOPS_VERSION={version}");
}
