//! Error types for the segment engine.
//!
//! This module provides a unified error type for recoverable segment
//! operations. Contract violations (writes outside a reserved window,
//! mismatched result shapes) are programming errors and panic instead;
//! see the crate-level docs for the taxonomy.

use thiserror::Error;

use crate::schema::{DataType, FieldId};

/// Result type alias for segment operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in segment operations.
///
/// Each variant includes a descriptive error message suitable for end-users.
/// Error codes follow the pattern `TESSERA-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Field not found in the segment schema (TESSERA-001).
    #[error("[TESSERA-001] Field {0} not found in schema")]
    FieldNotFound(FieldId),

    /// Field data type mismatch (TESSERA-002).
    #[error("[TESSERA-002] Type mismatch for field {field}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Field being accessed.
        field: FieldId,
        /// Data type declared in the schema.
        expected: DataType,
        /// Data type supplied by the caller.
        actual: DataType,
    },

    /// Vector dimension mismatch (TESSERA-003).
    #[error("[TESSERA-003] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Field has no loaded representation that can serve the request (TESSERA-004).
    #[error("[TESSERA-004] Field {field} is not loaded: {required}")]
    FieldNotLoaded {
        /// Field being accessed.
        field: FieldId,
        /// What the operation needed (e.g. "raw column data or a vector index").
        required: &'static str,
    },

    /// A representation is already bound for the field (TESSERA-005).
    #[error("[TESSERA-005] Field {field} already has {what} loaded")]
    AlreadyLoaded {
        /// Field being loaded.
        field: FieldId,
        /// Which representation collided ("raw data" or "index").
        what: &'static str,
    },

    /// Loaded blob disagrees with the segment row count (TESSERA-006).
    #[error("[TESSERA-006] Row count mismatch: segment has {expected} rows, blob carries {actual}")]
    RowCountMismatch {
        /// Row count already established for the segment.
        expected: usize,
        /// Row count carried by the incoming blob.
        actual: usize,
    },

    /// Invalid search or retrieve parameters (TESSERA-007).
    #[error("[TESSERA-007] Invalid query parameters: {0}")]
    InvalidQuery(String),

    /// Unknown index kind in a load request (TESSERA-008).
    #[error("[TESSERA-008] Unknown index kind '{0}'")]
    UnknownIndexKind(String),

    /// Serialization error (TESSERA-009).
    #[error("[TESSERA-009] Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (TESSERA-010).
    #[error("[TESSERA-010] Configuration error: {0}")]
    Config(String),

    /// Internal error (TESSERA-011).
    ///
    /// Indicates an unexpected internal error. Please report if encountered.
    #[error("[TESSERA-011] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "TESSERA-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FieldNotFound(_) => "TESSERA-001",
            Self::TypeMismatch { .. } => "TESSERA-002",
            Self::DimensionMismatch { .. } => "TESSERA-003",
            Self::FieldNotLoaded { .. } => "TESSERA-004",
            Self::AlreadyLoaded { .. } => "TESSERA-005",
            Self::RowCountMismatch { .. } => "TESSERA-006",
            Self::InvalidQuery(_) => "TESSERA-007",
            Self::UnknownIndexKind(_) => "TESSERA-008",
            Self::Serialization(_) => "TESSERA-009",
            Self::Config(_) => "TESSERA-010",
            Self::Internal(_) => "TESSERA-011",
        }
    }

    /// Returns true if this error is recoverable.
    ///
    /// Recoverable errors describe a state the caller can repair (load the
    /// missing data, fix the request) and retry. Internal errors are not.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
