//! Structured error types shared across FHMC crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`McError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (bins, energies, thread indices, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the FHMC engine.
///
/// Soft rejections (a macrostate outside the soft bounds, a hard-core
/// overlap) are ordinary rejected trials and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum McError {
    /// Malformed configuration detected at startup (histogram ranges,
    /// window layouts, bias parameters).
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Invariant violations between replicas, windows or checkpoints.
    /// These indicate an implementation bug and must stop the run.
    #[error("consistency error: {0}")]
    Consistency(ErrorInfo),
    /// Serialization, schema version and I/O errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Randomness and seeding errors.
    #[error("rng error: {0}")]
    Rng(ErrorInfo),
    /// Failures reported by the external system collaborator.
    #[error("system error: {0}")]
    System(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl McError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            McError::Config(info)
            | McError::Consistency(info)
            | McError::Serde(info)
            | McError::Rng(info)
            | McError::System(info) => info,
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        McError::Config(ErrorInfo::new(code, message))
    }

    /// Wraps an I/O failure tied to a path.
    pub fn io(code: impl Into<String>, err: impl ToString, path: &std::path::Path) -> Self {
        McError::Serde(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display()),
        )
    }
}
