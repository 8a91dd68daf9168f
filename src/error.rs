//! Error taxonomy for the HIL pipeline
//!
//! Every stage reports failures through [`HilError`]. Nothing here is
//! retried; an error aborts the orchestrator's state machine and its
//! `Display` text becomes the failure detail shown to the user.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HilError {
    /// A required external binary is not installed or not in PATH
    #[error("{tool} not found. Is it installed and in your PATH?")]
    ToolNotFound { tool: String },

    #[error("build of target '{target}' failed:\n{output}")]
    Build { target: String, output: String },

    /// An external flashing tool exited non-zero (or the artifact is unusable)
    #[error("flashing failed during {step}:\n{output}")]
    Flash { step: String, output: String },

    #[error("serial port {port} failed: {source}")]
    Serial {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Deadline exceeded with no conclusive verdict
    #[error("timed out after {elapsed_secs:.1}s waiting for {waiting_for}")]
    VerificationTimeout {
        waiting_for: String,
        elapsed_secs: f64,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{measured} outside accepted range {min}..={max}")]
    ToleranceViolation {
        measured: String,
        min: String,
        max: String,
    },

    #[error("unknown device id {0}")]
    UnknownDevice(u32),

    #[error("not enough rising edges to compute a frequency (found {found}, need 2)")]
    InsufficientEdges { found: usize },

    #[error("average period is zero, cannot compute frequency")]
    DegenerateSignal,

    /// The logic analyzer capture tool exited non-zero
    #[error("signal capture failed:\n{0}")]
    Capture(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HilError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HilError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HilError>;
