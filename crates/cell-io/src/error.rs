//! Error types for cell-file access.

use std::path::PathBuf;

use smio_common::SmioError;
use thiserror::Error;

/// Result type for cell-file operations.
pub type CellIoResult<T> = Result<T, CellIoError>;

/// Error types for cell-file access.
#[derive(Error, Debug)]
pub enum CellIoError {
    /// The cell file does not exist
    #[error("cell {cell} not found at {}", path.display())]
    CellMissing { cell: u32, path: PathBuf },

    /// The requested variable is not stored in the cell file
    #[error("variable '{variable}' missing from cell {cell}")]
    VariableMissing { cell: u32, variable: String },

    /// On-disk invariants violated (size mismatch, unparsable time units, ...)
    #[error("cell {cell} is corrupt: {reason}")]
    CellCorrupt { cell: u32, reason: String },

    /// Error reported by the NetCDF library
    #[error("NetCDF error in cell {cell}: {message}")]
    NetCdf { cell: u32, message: String },

    /// Grid file missing, unreadable or inconsistent
    #[error("invalid grid file {}: {reason}", path.display())]
    InvalidGrid { path: PathBuf, reason: String },

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CellIoError {
    pub fn corrupt(cell: u32, reason: impl Into<String>) -> Self {
        Self::CellCorrupt {
            cell,
            reason: reason.into(),
        }
    }
}

impl From<CellIoError> for SmioError {
    fn from(err: CellIoError) -> Self {
        match err {
            CellIoError::CellMissing { cell, path } => SmioError::CellMissing {
                cell,
                path: path.display().to_string(),
            },
            CellIoError::VariableMissing { cell, variable } => {
                SmioError::VariableMissing { cell, variable }
            }
            CellIoError::CellCorrupt { cell, reason } => SmioError::CellCorrupt { cell, reason },
            // The netCDF library does not distinguish unreadable from malformed files.
            CellIoError::NetCdf { cell, message } => SmioError::CellCorrupt {
                cell,
                reason: message,
            },
            CellIoError::InvalidGrid { path, reason } => {
                SmioError::configuration(format!("grid file {}: {}", path.display(), reason))
            }
            CellIoError::Io(e) => SmioError::from(e),
        }
    }
}
