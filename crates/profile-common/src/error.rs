//! Error types for Profile Vault.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a data failure, carried by error notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataErrorKind {
    /// File absent. Benign, triggers default creation.
    NotFound,
    /// Malformed bytes or a failed decrypt.
    Decode,
    /// Schema version outside the supported range.
    UnsupportedVersion,
    /// A named migration step failed.
    MigrationStep,
    /// Strict validation rejected the profile.
    Validation,
    /// Read, write or copy error.
    Io,
}

impl DataErrorKind {
    /// Returns a stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Decode => "decode",
            Self::UnsupportedVersion => "unsupported_version",
            Self::MigrationStep => "migration_step",
            Self::Validation => "validation",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for DataErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for profile persistence.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No data at the given location.
    #[error("Profile data not found: {0}")]
    NotFound(String),

    /// Bytes could not be decoded into a profile.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Schema version is newer than this build or older than any migration.
    #[error("Unsupported data version {found} (supported: {minimum}..={current})")]
    UnsupportedVersion {
        /// Version found in the blob
        found: u32,
        /// Oldest version that can be migrated
        minimum: u32,
        /// Version written by this build
        current: u32,
    },

    /// A migration step failed.
    #[error("Migration {from} -> {to} failed: {reason}")]
    MigrationStep {
        /// Source version of the failing step
        from: u32,
        /// Target version of the failing step
        to: u32,
        /// Reason for failure
        reason: String,
    },

    /// Strict validation failed.
    #[error("Validation failed on `{field}`: {reason}")]
    Validation {
        /// Offending field
        field: String,
        /// Description of the violation
        reason: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProfileError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> DataErrorKind {
        match self {
            Self::NotFound(_) => DataErrorKind::NotFound,
            Self::Decode(_) => DataErrorKind::Decode,
            Self::UnsupportedVersion { .. } => DataErrorKind::UnsupportedVersion,
            Self::MigrationStep { .. } => DataErrorKind::MigrationStep,
            Self::Validation { .. } => DataErrorKind::Validation,
            Self::Io(err) if err.kind() == std::io::ErrorKind::NotFound => {
                DataErrorKind::NotFound
            },
            Self::Io(_) => DataErrorKind::Io,
        }
    }
}

/// Result type alias for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;
