//! Error taxonomy shared by every reader crate.

use thiserror::Error;

/// Result type alias using SmioError.
pub type SmioResult<T> = Result<T, SmioError>;

/// Primary error type for time-series reading.
#[derive(Debug, Error)]
pub enum SmioError {
    // === Setup Errors ===
    /// Unknown dataset id, unknown adapter kind, invalid resample rule, ...
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No path group yielded an existing directory for {dataset} on {host}")]
    PathResolutionFailed { dataset: String, host: String },

    // === Location Errors ===
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    // === Storage Errors ===
    #[error("Cell {cell} not found at {path}")]
    CellMissing { cell: u32, path: String },

    #[error("Variable '{variable}' missing from cell {cell}")]
    VariableMissing { cell: u32, variable: String },

    #[error("Cell {cell} is corrupt: {reason}")]
    CellCorrupt { cell: u32, reason: String },

    /// Malformed in-situ station file
    #[error("Station file {path} is corrupt: {reason}")]
    StationCorrupt { path: String, reason: String },

    // === Transform Errors ===
    #[error("Adapter '{adapter}' precondition failed: {reason}")]
    AdapterPreconditionFailed { adapter: String, reason: String },

    // === Infrastructure Errors ===
    #[error("Transient I/O error, retry may succeed: {0}")]
    TransientIo(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SmioError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an UnknownLocation error.
    pub fn unknown_location(msg: impl Into<String>) -> Self {
        Self::UnknownLocation(msg.into())
    }

    /// Create a CellCorrupt error.
    pub fn cell_corrupt(cell: u32, reason: impl Into<String>) -> Self {
        Self::CellCorrupt {
            cell,
            reason: reason.into(),
        }
    }

    /// Create an AdapterPreconditionFailed error.
    pub fn adapter_precondition(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AdapterPreconditionFailed {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may reasonably retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, SmioError::TransientIo(_))
    }

    /// Short machine-readable kind name, used in read reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SmioError::Configuration(_) => "ConfigurationError",
            SmioError::PathResolutionFailed { .. } => "PathResolutionFailed",
            SmioError::UnknownLocation(_) => "UnknownLocation",
            SmioError::CellMissing { .. } => "CellMissing",
            SmioError::VariableMissing { .. } => "VariableMissing",
            SmioError::CellCorrupt { .. } => "CellCorrupt",
            SmioError::StationCorrupt { .. } => "StationCorrupt",
            SmioError::AdapterPreconditionFailed { .. } => "AdapterPreconditionFailed",
            SmioError::TransientIo(_) => "TransientIOError",
            SmioError::Io(_) => "IOError",
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for SmioError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                SmioError::TransientIo(err.to_string())
            }
            _ => SmioError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SmioError {
    fn from(err: serde_json::Error) -> Self {
        SmioError::Configuration(format!("JSON error: {}", err))
    }
}
