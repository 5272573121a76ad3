//! Error types for rangekeeper.
//!
//! Every error carries the ranges, paths or identifiers involved so that a
//! failed transaction can be diagnosed from the message alone.

use crate::range::{UnitRange, Universe};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for rangekeeper operations.
#[derive(Error, Debug)]
pub enum RangeError {
    // =========================================================================
    // Reservation Errors (E100-E199)
    // =========================================================================
    /// The range overlaps a reservation that already exists.
    #[error("E101: Cannot reserve range {range}: overlapping with {existing}")]
    OverlappingRange {
        /// The range that was being reserved.
        range: UnitRange,
        /// The existing reservation it conflicts with.
        existing: UnitRange,
    },

    /// Part of the range is not currently reserved.
    #[error("E102: Cannot release range {range}: not fully reserved")]
    NotReserved {
        /// The range that was being released.
        range: UnitRange,
    },

    /// The range lies (partly) outside the universe.
    #[error("E103: Range {range} lies outside the universe {universe}")]
    OutOfUniverse {
        /// The offending range.
        range: UnitRange,
        /// The configured universe.
        universe: Universe,
    },

    /// Lower bound greater than upper bound.
    #[error("E104: Invalid range {lo}-{hi}: lower bound exceeds upper bound")]
    InvalidRange {
        /// Lower bound.
        lo: u32,
        /// Upper bound.
        hi: u32,
    },

    // =========================================================================
    // Allocation Errors (E200-E299)
    // =========================================================================
    /// Not enough free units left in the universe.
    #[error("E201: Capacity exceeded: requested {requested} units, {available} free")]
    CapacityExceeded {
        /// Number of units requested.
        requested: u32,
        /// Number of free units in the universe.
        available: u64,
    },

    /// The allocation request itself is malformed.
    #[error("E202: Invalid allocation request: {cause}")]
    InvalidRequest {
        /// Why the request was rejected.
        cause: String,
    },

    // =========================================================================
    // Storage Errors (E300-E399)
    // =========================================================================
    /// A persisted document is unreadable or breaks the reserved-space invariants.
    #[error("E301: Corrupt state in {path}: {cause}")]
    CorruptState {
        /// The document that failed validation.
        path: PathBuf,
        /// Description of the corruption.
        cause: String,
    },

    /// The transaction lock could not be acquired in time.
    #[error("E302: Timed out after {timeout_ms}ms waiting for lock {path}")]
    LockTimeout {
        /// The lock file.
        path: PathBuf,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Document name is absolute or escapes the state directory.
    #[error("E303: Invalid document name '{name}'")]
    InvalidDocumentName {
        /// The rejected name.
        name: String,
    },

    // =========================================================================
    // Configuration Errors (E400-E499)
    // =========================================================================
    /// Invalid configuration value.
    #[error("E401: Invalid configuration value for '{field}': {cause}")]
    ConfigValue {
        /// The configuration field with the invalid value.
        field: String,
        /// Reason why the value is invalid.
        cause: String,
    },

    /// Configuration file could not be read or parsed.
    #[error("E402: Failed to load configuration from {path}: {cause}")]
    ConfigParse {
        /// The configuration file.
        path: PathBuf,
        /// Description of the failure.
        cause: String,
    },

    // =========================================================================
    // Project Errors (E500-E599)
    // =========================================================================
    /// The project does not exist or belongs to someone else.
    #[error("E501: Project '{project}' not found for owner '{owner}'")]
    ProjectNotFound {
        /// The requesting owner.
        owner: String,
        /// The project identifier.
        project: String,
    },

    // =========================================================================
    // I/O Errors (E900-E999)
    // =========================================================================
    /// File I/O error.
    #[error("E901: I/O error at {path}: {cause}")]
    Io {
        /// The path where the I/O error occurred.
        path: PathBuf,
        /// Description of the I/O error.
        cause: String,
    },

    /// Serialization error.
    #[error("E902: Serialization error: {0}")]
    Serialization(String),
}

impl RangeError {
    /// Get the error code (e.g., "E101").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OverlappingRange { .. } => "E101",
            Self::NotReserved { .. } => "E102",
            Self::OutOfUniverse { .. } => "E103",
            Self::InvalidRange { .. } => "E104",
            Self::CapacityExceeded { .. } => "E201",
            Self::InvalidRequest { .. } => "E202",
            Self::CorruptState { .. } => "E301",
            Self::LockTimeout { .. } => "E302",
            Self::InvalidDocumentName { .. } => "E303",
            Self::ConfigValue { .. } => "E401",
            Self::ConfigParse { .. } => "E402",
            Self::ProjectNotFound { .. } => "E501",
            Self::Io { .. } => "E901",
            Self::Serialization(_) => "E902",
        }
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Io { .. })
    }

    /// Check if this error is a configuration/validation error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigValue { .. } | Self::ConfigParse { .. } | Self::InvalidDocumentName { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, context: &str, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            cause: format!("{}: {}", context, err),
        }
    }
}

/// Result type alias using `RangeError`.
pub type Result<T> = std::result::Result<T, RangeError>;
