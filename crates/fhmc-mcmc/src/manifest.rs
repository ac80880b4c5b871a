use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use fhmc_core::{ErrorInfo, McError, RunProvenance};

use crate::config::RunConfig;
use crate::window::Window;

/// Structured manifest describing a completed or running flat-histogram run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: RunConfig,
    /// Seed, label, timestamp and tool versions.
    pub provenance: RunProvenance,
    /// Final window layout.
    pub windows: Vec<Window>,
    /// Whether every window reached its completion criterion.
    pub complete: bool,
    /// Attempts resolved per window.
    pub attempts: u64,
    /// SHA-256 of the canonical JSON of every window's final system.
    pub final_state_hash: String,
    /// Metrics file produced during the run (relative to run directory).
    pub metrics_file: Option<PathBuf>,
    /// Per-bin report (relative to run directory).
    pub report_file: Option<PathBuf>,
    /// Checkpoint files generated during the run (relative order preserved).
    pub checkpoints: Vec<PathBuf>,
}

impl RunManifest {
    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), McError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| McError::io("manifest-mkdir", err, parent))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            McError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        fs::write(path, json).map_err(|err| McError::io("manifest-write", err, path))
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, McError> {
        let contents =
            fs::read_to_string(path).map_err(|err| McError::io("manifest-read", err, path))?;
        serde_json::from_str(&contents).map_err(|err| {
            McError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display()),
            )
        })
    }
}

/// Provenance stamped with the current time and this crate's version.
pub fn provenance(config: &RunConfig) -> RunProvenance {
    let mut tool_versions = BTreeMap::new();
    tool_versions.insert(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    RunProvenance {
        seed: config.seed_policy.master_seed,
        seed_label: config.seed_policy.label.clone(),
        created_at: Utc::now().to_rfc3339(),
        tool_versions,
    }
}

/// Hex SHA-256 of the JSON encoding of `value`.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String, McError> {
    let json = serde_json::to_vec(value)
        .map_err(|err| McError::Serde(ErrorInfo::new("serialize", err.to_string())))?;
    let mut hasher = Sha256::new();
    hasher.update(json);
    Ok(format!("{:x}", hasher.finalize()))
}
