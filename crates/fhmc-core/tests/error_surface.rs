use fhmc_core::errors::{ErrorInfo, McError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("bin", 4)
        .with_context("reason", "example")
}

#[test]
fn config_error_surface() {
    let err = McError::Config(sample_info("histogram-bins", "num >= 2 required"));
    assert_eq!(err.info().code, "histogram-bins");
    assert!(err.info().context.contains_key("bin"));
    assert!(err.to_string().starts_with("config error: num >= 2 required"));
}

#[test]
fn consistency_error_surface() {
    let err = McError::Consistency(
        sample_info("replica-energy", "replica energy mismatch").with_hint("determinism bug"),
    );
    assert_eq!(err.info().code, "replica-energy");
    assert!(err.to_string().contains("hint: determinism bug"));
}

#[test]
fn serde_error_surface() {
    let err = McError::Serde(sample_info("version-mismatch", "unknown version"));
    assert_eq!(err.info().code, "version-mismatch");
}

#[test]
fn error_serializes_with_family_tag() {
    let err = McError::System(sample_info("overlap", "bad system"));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["family"], "System");
    assert_eq!(json["detail"]["code"], "overlap");
    let back: McError = serde_json::from_value(json).unwrap();
    assert_eq!(back, err);
}

#[test]
fn io_helper_records_path() {
    let err = McError::io("read", "missing", std::path::Path::new("/tmp/x.json"));
    assert!(matches!(err, McError::Serde(_)));
    assert_eq!(err.info().context["path"], "/tmp/x.json");
}
