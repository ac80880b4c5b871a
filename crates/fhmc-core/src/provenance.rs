//! Provenance descriptors and versioned serialization envelopes.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, McError};

/// Versioned envelope wrapped around every persisted engine object.
///
/// `kind` names the object (`"bias"`, `"criteria"`, `"window"`), `version`
/// is the integer layout tag of that object. Readers accept exactly one tag
/// per kind; anything else is fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Object kind stored in the envelope.
    pub kind: String,
    /// Integer layout tag.
    pub version: u32,
    /// The wrapped object.
    pub payload: T,
}

impl<T> Versioned<T> {
    /// Wraps a payload.
    pub fn new(kind: impl Into<String>, version: u32, payload: T) -> Self {
        Self {
            kind: kind.into(),
            version,
            payload,
        }
    }

    /// Unwraps the payload after checking kind and version tags.
    pub fn into_checked(self, kind: &str, version: u32) -> Result<T, McError> {
        if self.kind != kind {
            return Err(McError::Serde(
                ErrorInfo::new("kind-mismatch", "unexpected object kind in envelope")
                    .with_context("expected", kind)
                    .with_context("found", &self.kind),
            ));
        }
        if self.version != version {
            return Err(McError::Serde(
                ErrorInfo::new("version-mismatch", "unrecognized serialization version")
                    .with_context("kind", kind)
                    .with_context("expected", version)
                    .with_context("found", self.version)
                    .with_hint("the stream was written by an incompatible engine build"),
            ));
        }
        Ok(self.payload)
    }
}

/// Serializes `payload` into a versioned binary byte stream.
pub fn to_bytes<T: Serialize>(kind: &str, version: u32, payload: &T) -> Result<Vec<u8>, McError> {
    bincode::serialize(&Versioned::new(kind, version, payload)).map_err(|err| {
        McError::Serde(ErrorInfo::new("encode", err.to_string()).with_context("kind", kind))
    })
}

/// Restores a payload written by [`to_bytes`], rejecting foreign tags.
pub fn from_bytes<T: DeserializeOwned>(
    bytes: &[u8],
    kind: &str,
    version: u32,
) -> Result<T, McError> {
    let envelope: Versioned<T> = bincode::deserialize(bytes).map_err(|err| {
        McError::Serde(ErrorInfo::new("decode", err.to_string()).with_context("kind", kind))
    })?;
    envelope.into_checked(kind, version)
}

/// Serializes `payload` into a versioned, human readable JSON document.
pub fn to_json<T: Serialize>(kind: &str, version: u32, payload: &T) -> Result<String, McError> {
    serde_json::to_string_pretty(&Versioned::new(kind, version, payload)).map_err(|err| {
        McError::Serde(ErrorInfo::new("json-encode", err.to_string()).with_context("kind", kind))
    })
}

/// Restores a payload written by [`to_json`], rejecting foreign tags.
pub fn from_json<T: DeserializeOwned>(json: &str, kind: &str, version: u32) -> Result<T, McError> {
    let envelope: Versioned<T> = serde_json::from_str(json).map_err(|err| {
        McError::Serde(ErrorInfo::new("json-decode", err.to_string()).with_context("kind", kind))
    })?;
    envelope.into_checked(kind, version)
}

/// Provenance information attached to run manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Master deterministic seed used for all randomness.
    pub seed: u64,
    /// Optional label describing the seed policy.
    pub seed_label: Option<String>,
    /// RFC-3339 timestamp recording when the artifact was generated.
    pub created_at: String,
    /// Version map for all tools involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}
