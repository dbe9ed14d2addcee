//! Schema version constants and compatibility checks.

/// Oldest schema version that can still be migrated.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 4;

/// How a stored schema version relates to this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCompatibility {
    /// Same version, no changes needed.
    Current,
    /// Older but migratable.
    MigrationRequired,
    /// Older than any migration we ship.
    TooOld,
    /// Written by a newer build, or corrupt.
    TooNew,
}

impl VersionCompatibility {
    /// Checks if the data can be loaded as-is or after migration.
    #[must_use]
    pub const fn can_load(self) -> bool {
        matches!(self, Self::Current | Self::MigrationRequired)
    }

    /// Checks if migration is needed.
    #[must_use]
    pub const fn needs_migration(self) -> bool {
        matches!(self, Self::MigrationRequired)
    }
}

/// Classifies a stored schema version against this build.
#[must_use]
pub const fn check_compatibility(version: u32) -> VersionCompatibility {
    if version == CURRENT_VERSION {
        VersionCompatibility::Current
    } else if version < MIN_SUPPORTED_VERSION {
        VersionCompatibility::TooOld
    } else if version < CURRENT_VERSION {
        VersionCompatibility::MigrationRequired
    } else {
        VersionCompatibility::TooNew
    }
}

/// Magic bytes for file format identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicBytes(pub [u8; 4]);

impl MagicBytes {
    /// Encrypted profile blob marker.
    pub const ENCRYPTED_PROFILE: Self = Self(*b"PVE1");

    /// Returns the marker bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Checks whether `data` starts with this marker.
    #[must_use]
    pub fn prefixes(&self, data: &[u8]) -> bool {
        data.starts_with(&self.0)
    }
}
