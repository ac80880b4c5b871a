use fhmc_core::provenance::{from_bytes, from_json, to_bytes, to_json, RunProvenance};
use fhmc_core::McError;

#[test]
fn binary_envelope_round_trip() {
    let payload = vec![0.5_f64, -1.25, 3.0];
    let bytes = to_bytes("bias", 1, &payload).unwrap();
    let back: Vec<f64> = from_bytes(&bytes, "bias", 1).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn unknown_version_is_fatal() {
    let bytes = to_bytes("bias", 2, &vec![1.0_f64]).unwrap();
    let err = from_bytes::<Vec<f64>>(&bytes, "bias", 1).unwrap_err();
    assert!(matches!(err, McError::Serde(ref info) if info.code == "version-mismatch"));
}

#[test]
fn foreign_kind_is_fatal() {
    let json = to_json("criteria", 1, &42_u32).unwrap();
    let err = from_json::<u32>(&json, "bias", 1).unwrap_err();
    assert_eq!(err.info().code, "kind-mismatch");
}

#[test]
fn provenance_round_trip_json() {
    let provenance = RunProvenance {
        seed: 99,
        seed_label: Some("fixed".into()),
        created_at: "2024-01-01T00:00:00Z".into(),
        tool_versions: [("fhmc-core".into(), "0.1.0".into())].into_iter().collect(),
    };
    let json = to_json("provenance", 1, &provenance).unwrap();
    let back: RunProvenance = from_json(&json, "provenance", 1).unwrap();
    assert_eq!(back, provenance);
}
