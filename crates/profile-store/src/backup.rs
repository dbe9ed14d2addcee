//! Single-slot backup of the primary profile file.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use profile_common::{ProfileError, ProfileResult};
use tracing::{debug, info};

/// Default suffix appended to the primary file name.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

/// Backup slot living next to the primary file.
#[derive(Debug, Clone)]
pub struct BackupStore {
    primary: PathBuf,
    backup: PathBuf,
}

impl BackupStore {
    /// Creates a backup slot for `primary`, at `primary` + `suffix`.
    #[must_use]
    pub fn new(primary: impl Into<PathBuf>, suffix: &str) -> Self {
        let primary = primary.into();
        let mut name: OsString = primary
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default();
        name.push(suffix);
        let backup = primary.with_file_name(name);
        Self { primary, backup }
    }

    /// Returns the primary file path.
    #[must_use]
    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    /// Returns the backup file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.backup
    }

    /// Copies the primary over the backup.
    ///
    /// Returns `false` without touching the backup if there is no primary.
    pub fn snapshot(&self) -> io::Result<bool> {
        if !self.primary.exists() {
            debug!("No primary at {}, skipping backup", self.primary.display());
            return Ok(false);
        }
        fs::copy(&self.primary, &self.backup)?;
        debug!("Backed up {} -> {}", self.primary.display(), self.backup.display());
        Ok(true)
    }

    /// Reads the backup bytes.
    pub fn restore(&self) -> ProfileResult<Vec<u8>> {
        match fs::read(&self.backup) {
            Ok(bytes) => {
                info!("Read backup from {}", self.backup.display());
                Ok(bytes)
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProfileError::NotFound(
                self.backup.display().to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks if a backup exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.backup.exists()
    }

    /// Deletes the backup. Succeeds if it is already gone.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.backup) {
            Ok(()) => {
                info!("Deleted backup {}", self.backup.display());
                Ok(())
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profile_common::DataErrorKind;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> BackupStore {
        BackupStore::new(dir.path().join("user_profile.json"), DEFAULT_BACKUP_SUFFIX)
    }

    #[test]
    fn test_backup_path_is_sibling() {
        let backup = BackupStore::new("/data/user_profile.json", ".bak");
        assert_eq!(backup.path(), Path::new("/data/user_profile.json.bak"));
    }

    #[test]
    fn test_snapshot_without_primary_is_noop() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let backup = store(&dir);

        assert!(!backup.snapshot().expect("snapshot"));
        assert!(!backup.exists());
    }

    #[test]
    fn test_snapshot_and_restore() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let backup = store(&dir);

        fs::write(backup.primary_path(), b"first").expect("write");
        assert!(backup.snapshot().expect("snapshot"));

        fs::write(backup.primary_path(), b"second").expect("write");
        assert_eq!(backup.restore().expect("restore"), b"first");

        // Next snapshot overwrites the slot
        backup.snapshot().expect("snapshot");
        assert_eq!(backup.restore().expect("restore"), b"second");
    }

    #[test]
    fn test_restore_missing_is_not_found() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let err = store(&dir).restore().expect_err("no backup");
        assert_eq!(err.kind(), DataErrorKind::NotFound);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let backup = store(&dir);
        fs::write(backup.primary_path(), b"data").expect("write");
        backup.snapshot().expect("snapshot");

        backup.clear().expect("clear");
        assert!(!backup.exists());
        backup.clear().expect("second clear");
    }
}
