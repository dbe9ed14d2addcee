//! Collaborators injected into the store: device identity and clock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// File name of the per-install identity inside the data directory.
pub const INSTALL_ID_FILE: &str = "install_id";

/// Supplies a stable per-install string used for key derivation.
pub trait DeviceIdentity: Send + Sync {
    /// Returns the identity, or `None` if it is unavailable.
    fn device_id(&self) -> Option<String>;
}

/// Identity fixed at construction.
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub String);

impl DeviceIdentity for FixedIdentity {
    fn device_id(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Identity persisted as a UUID in the data directory, created on first use.
#[derive(Debug, Clone)]
pub struct InstallIdentity {
    path: PathBuf,
}

impl InstallIdentity {
    /// Creates an identity stored in `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(INSTALL_ID_FILE),
        }
    }

    fn read_or_create(&self) -> std::io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(existing) if !existing.trim().is_empty() => return Ok(existing.trim().to_string()),
            Ok(_) => warn!("Install id file is empty, regenerating"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e),
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let id = Uuid::new_v4().to_string();
        fs::write(&self.path, &id)?;
        info!("Created install id at {}", self.path.display());
        Ok(id)
    }
}

impl DeviceIdentity for InstallIdentity {
    fn device_id(&self) -> Option<String> {
        match self.read_or_create() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Install id unavailable: {e}");
                None
            },
        }
    }
}

/// Time source for `lastModified` stamps.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_identity_is_stable() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let identity = InstallIdentity::new(dir.path());

        let first = identity.device_id().expect("identity");
        let second = InstallIdentity::new(dir.path())
            .device_id()
            .expect("identity");
        assert_eq!(first, second);
        assert!(dir.path().join(INSTALL_ID_FILE).exists());
    }

    #[test]
    fn test_install_identity_regenerates_blank_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(dir.path().join(INSTALL_ID_FILE), "  \n").expect("write");

        let id = InstallIdentity::new(dir.path())
            .device_id()
            .expect("identity");
        assert!(!id.is_empty());
    }

    #[test]
    fn test_fixed_clock_shared_between_clones() {
        let clock = FixedClock::new(DateTime::<Utc>::UNIX_EPOCH);
        let other = clock.clone();
        clock.advance(Duration::seconds(30));
        assert_eq!(other.now().timestamp(), 30);
    }
}
