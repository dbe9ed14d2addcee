//! Profile persistence coordinator.
//!
//! [`ProfileStore`] is the only owner of the in-memory [`UserProfile`] and the
//! only entry point for reading or writing it. Load never fails outward: a
//! broken primary falls back to the backup slot, and a broken backup falls
//! back to a fresh default profile. Save reports failure as `false` after
//! firing a [`ProfileEvent::DataError`]; retrying is the caller's job.
//!
//! All operations are synchronous and assume at most one in flight.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use profile_common::{
    check_compatibility, DataErrorKind, ProfileError, ProfileResult, VersionCompatibility,
    CURRENT_VERSION, MIN_SUPPORTED_VERSION,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backup::BackupStore;
use crate::codec::ProfileCodec;
use crate::config::StoreConfig;
use crate::events::{EventDispatcher, LoadSource, ProfileEvent, ProfileObserver};
use crate::migration::{document_version, MigrationRegistry};
use crate::profile::UserProfile;
use crate::providers::{Clock, DeviceIdentity, InstallIdentity, SystemClock};
use crate::validation::Validator;

/// A decoded, migrated and repaired profile plus what was done to it.
struct Decoded {
    profile: UserProfile,
    migrated_from: Option<u32>,
    repaired: Vec<&'static str>,
}

impl Decoded {
    fn changed(&self) -> bool {
        self.migrated_from.is_some() || !self.repaired.is_empty()
    }
}

/// Owns the user profile and coordinates its persistence.
pub struct ProfileStore {
    config: StoreConfig,
    codec: ProfileCodec,
    backup: BackupStore,
    validator: Validator,
    migrations: MigrationRegistry,
    clock: Box<dyn Clock>,
    events: EventDispatcher,
    profile: UserProfile,
    /// Set while the primary on disk is known to be unreadable, so it is
    /// never snapshotted over the backup.
    primary_unreadable: bool,
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("primary", &self.backup.primary_path())
            .field("backup", &self.backup.path())
            .field("encrypt", &self.config.encrypt)
            .field("primary_unreadable", &self.primary_unreadable)
            .field("user_id", &self.profile.user_id)
            .finish_non_exhaustive()
    }
}

impl ProfileStore {
    /// Creates a store with explicit collaborators.
    ///
    /// The in-memory profile starts as unsaved defaults; call
    /// [`load`](Self::load) before mutating it.
    #[must_use]
    pub fn open(
        mut config: StoreConfig,
        identity: Box<dyn DeviceIdentity>,
        clock: Box<dyn Clock>,
    ) -> Self {
        config.validate();
        let backup = BackupStore::new(config.primary_path(), &config.backup_suffix);
        let profile = UserProfile::new(
            config.default_nickname.clone(),
            config.starting_coins,
            clock.now(),
        );

        Self {
            validator: Validator::new(config.default_nickname.clone()),
            codec: ProfileCodec::new(identity),
            migrations: MigrationRegistry::with_builtin_migrations(),
            events: EventDispatcher::new(),
            backup,
            clock,
            profile,
            config,
            primary_unreadable: false,
        }
    }

    /// Creates a store using the install identity in the data directory and
    /// the system clock.
    #[must_use]
    pub fn with_system_defaults(config: StoreConfig) -> Self {
        let identity = InstallIdentity::new(&config.data_dir);
        Self::open(config, Box::new(identity), Box::new(SystemClock))
    }

    /// Registers an observer for profile notifications.
    pub fn subscribe(&mut self, observer: impl ProfileObserver + 'static) {
        self.events.subscribe(Box::new(observer));
    }

    /// Returns the current profile.
    #[must_use]
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Returns the configuration in effect.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the primary file path.
    #[must_use]
    pub fn primary_path(&self) -> &Path {
        self.backup.primary_path()
    }

    /// Returns the backup slot.
    #[must_use]
    pub fn backup(&self) -> &BackupStore {
        &self.backup
    }

    fn emit(&self, event: ProfileEvent) {
        self.events.emit(&event);
    }

    fn emit_error(&self, err: &ProfileError) {
        self.emit(ProfileEvent::DataError {
            kind: err.kind(),
            reason: err.to_string(),
        });
    }

    // ------------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------------

    /// Loads the profile from disk, recovering from any failure.
    ///
    /// Always leaves a valid profile in memory and returns it.
    pub fn load(&mut self) -> &UserProfile {
        info!("Loading profile from {}", self.primary_path().display());
        self.primary_unreadable = false;

        match self.read_primary() {
            Ok(bytes) => match self.decode(&bytes) {
                Ok(decoded) => self.adopt(decoded, LoadSource::Primary),
                Err(err) => self.recover(&err),
            },
            Err(err) if err.kind() == DataErrorKind::NotFound => {
                info!("No profile on disk, creating defaults");
                self.create_default(true);
            },
            Err(err) => self.recover(&err),
        }

        &self.profile
    }

    fn read_primary(&self) -> ProfileResult<Vec<u8>> {
        fs::read(self.primary_path()).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ProfileError::NotFound(self.primary_path().display().to_string())
            } else {
                ProfileError::Io(e)
            }
        })
    }

    /// Decrypt, parse, version-check, migrate, bind and repair a blob.
    fn decode(&self, bytes: &[u8]) -> ProfileResult<Decoded> {
        let plain = self.codec.decrypt(bytes);
        let mut doc: Value =
            serde_json::from_slice(&plain).map_err(|e| ProfileError::Decode(e.to_string()))?;

        let version = document_version(&doc)?;
        let migrated_from = match check_compatibility(version) {
            VersionCompatibility::Current => None,
            VersionCompatibility::MigrationRequired => {
                let records = self.migrations.migrate(&mut doc, version, CURRENT_VERSION)?;
                debug!("Applied {} migration steps", records.len());
                Some(version)
            },
            VersionCompatibility::TooOld | VersionCompatibility::TooNew => {
                return Err(ProfileError::UnsupportedVersion {
                    found: version,
                    minimum: MIN_SUPPORTED_VERSION,
                    current: CURRENT_VERSION,
                });
            },
        };

        let mut profile: UserProfile =
            serde_json::from_value(doc).map_err(|e| ProfileError::Decode(e.to_string()))?;
        let report = self.validator.repair(&mut profile);

        Ok(Decoded {
            profile,
            migrated_from,
            repaired: report.fields,
        })
    }

    fn adopt(&mut self, decoded: Decoded, source: LoadSource) {
        let changed = decoded.changed();
        let Decoded {
            profile,
            migrated_from,
            repaired,
        } = decoded;
        self.profile = profile;

        if let Some(from) = migrated_from {
            info!("Migrated profile from version {from} to {CURRENT_VERSION}");
            self.emit(ProfileEvent::Migrated {
                from,
                to: CURRENT_VERSION,
            });
        }
        if !repaired.is_empty() {
            warn!("Repaired profile fields: {}", repaired.join(", "));
            self.emit(ProfileEvent::Repaired { fields: repaired });
        }

        match source {
            LoadSource::Primary if changed => {
                self.save();
            },
            LoadSource::Backup => self.rewrite_primary(),
            LoadSource::Primary | LoadSource::Default => {},
        }

        info!("Loaded profile {} ({:?})", self.profile.user_id, source);
        self.emit(ProfileEvent::Loaded { source });
    }

    fn recover(&mut self, err: &ProfileError) {
        warn!("Primary profile unusable: {err}");
        self.emit_error(err);

        match self.backup.restore().and_then(|bytes| self.decode(&bytes)) {
            Ok(decoded) => {
                info!("Recovered profile from backup {}", self.backup.path().display());
                self.adopt(decoded, LoadSource::Backup);
            },
            Err(backup_err) => {
                error!("Backup unusable, falling back to defaults: {backup_err}");
                self.emit_error(&backup_err);
                self.create_default(false);
            },
        }
    }

    /// Replaces the in-memory profile with defaults and persists it.
    ///
    /// With `snapshot == false` the primary is written directly, so whatever
    /// sits in the primary slot is not copied over the backup.
    fn create_default(&mut self, snapshot: bool) {
        self.profile = UserProfile::new(
            self.config.default_nickname.clone(),
            self.config.starting_coins,
            self.clock.now(),
        );
        if snapshot {
            self.save();
        } else {
            self.rewrite_primary();
        }
        self.emit(ProfileEvent::Loaded {
            source: LoadSource::Default,
        });
    }

    /// Writes the in-memory profile over a corrupt primary without snapshotting it.
    ///
    /// If the write fails the primary stays marked unreadable until a later
    /// save replaces it.
    fn rewrite_primary(&mut self) {
        match self.write_primary() {
            Ok(()) => {
                info!("Rewrote primary profile");
                self.primary_unreadable = false;
                self.emit(ProfileEvent::Saved);
            },
            Err(err) => {
                error!("Failed to rewrite primary profile: {err}");
                self.primary_unreadable = true;
                self.emit_error(&err);
            },
        }
    }

    // ------------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------------

    /// Validates, backs up and writes the current profile.
    ///
    /// Returns `false` on failure; a `DataError` has already been fired and
    /// the previous file is left untouched.
    pub fn save(&mut self) -> bool {
        match self.try_save() {
            Ok(()) => {
                info!("Saved profile to {}", self.primary_path().display());
                self.primary_unreadable = false;
                self.emit(ProfileEvent::Saved);
                true
            },
            Err(err) => {
                error!("Failed to save profile: {err}");
                self.emit_error(&err);
                false
            },
        }
    }

    fn try_save(&self) -> ProfileResult<()> {
        self.validator.check(&self.profile)?;
        if self.primary_unreadable {
            warn!("Primary is unreadable, leaving backup untouched");
        } else {
            self.backup.snapshot()?;
        }
        self.write_primary()
    }

    fn write_primary(&self) -> ProfileResult<()> {
        let json = serde_json::to_vec_pretty(&self.profile)
            .map_err(|e| ProfileError::Decode(format!("serialize failed: {e}")))?;
        let bytes = if self.config.encrypt {
            self.codec.encrypt(&json)?
        } else {
            json
        };
        write_atomic(self.primary_path(), &bytes)?;
        Ok(())
    }

    /// Reads the primary file and returns its decrypted bytes.
    pub fn read_raw(&self) -> ProfileResult<Vec<u8>> {
        self.read_primary().map(|bytes| self.codec.decrypt(&bytes))
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Applies `mutator` and saves.
    ///
    /// The mutation runs on a copy that is strictly validated first; an
    /// invalid result is discarded with a `DataError` and nothing changes.
    pub fn update_field<F>(&mut self, mutator: F) -> bool
    where
        F: FnOnce(&mut UserProfile),
    {
        let mut candidate = self.profile.clone();
        mutator(&mut candidate);
        candidate.last_modified = self.clock.now();

        if let Err(violation) = self.validator.check(&candidate) {
            let err = ProfileError::from(violation);
            warn!("Rejected profile update: {err}");
            self.emit_error(&err);
            return false;
        }

        self.profile = candidate;
        self.save()
    }

    /// Adds coins. A negative amount that would overdraw is rejected.
    pub fn add_coins(&mut self, amount: i64) -> bool {
        self.update_field(|p| p.coins = p.coins.saturating_add(amount))
    }

    /// Spends coins. Returns `false` without changes if the balance is short.
    pub fn spend_coins(&mut self, amount: i64) -> bool {
        if amount < 0 || self.profile.coins < amount {
            debug!(
                "Cannot spend {} coins with balance {}",
                amount, self.profile.coins
            );
            return false;
        }
        self.update_field(|p| p.coins -= amount)
    }

    /// Adds gems.
    pub fn add_gems(&mut self, amount: i64) -> bool {
        self.update_field(|p| p.gems = p.gems.saturating_add(amount))
    }

    /// Adds experience and applies any level-ups.
    pub fn add_experience(&mut self, amount: i64) -> bool {
        self.update_field(|p| {
            let gained = p.gain_experience(amount);
            if gained > 0 {
                info!("Level up: now level {}", p.level);
            }
        })
    }

    /// Records a finished game in the stats.
    ///
    /// Fails with a `DataError` if a game counter would overflow.
    pub fn record_game(&mut self, score: i64, won: bool, play_time_secs: f64) -> bool {
        let mut stats = self.profile.stats().cloned().unwrap_or_default();
        if !stats.record_game(score, won, play_time_secs) {
            let err = ProfileError::Validation {
                field: "gameStats".to_string(),
                reason: "game counters would overflow".to_string(),
            };
            warn!("Rejected game record: {err}");
            self.emit_error(&err);
            return false;
        }
        self.update_field(|p| p.game_stats = Some(stats))
    }

    /// Unlocks an achievement. Returns `false` if blank or already unlocked.
    pub fn unlock_achievement(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.profile.has_achievement(id) {
            return false;
        }
        self.update_field(|p| {
            p.unlock_achievement(id);
        })
    }

    /// Renames the profile. Blank names are rejected.
    pub fn set_nickname(&mut self, nickname: &str) -> bool {
        let nickname = nickname.trim().to_string();
        self.update_field(|p| p.nickname = nickname)
    }

    // ------------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------------

    /// Deletes the primary and backup and starts over with defaults.
    pub fn reset(&mut self) -> bool {
        warn!("Resetting profile {}", self.profile.user_id);

        if let Err(e) = self.backup.clear() {
            self.emit_error(&ProfileError::from(e));
        }
        match fs::remove_file(self.primary_path()) {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => self.emit_error(&ProfileError::from(e)),
        }

        self.profile = UserProfile::new(
            self.config.default_nickname.clone(),
            self.config.starting_coins,
            self.clock.now(),
        );
        self.save()
    }
}

/// Atomic write: temp file then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path: PathBuf = path.with_file_name(temp_name);

    let written = {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes).and_then(|()| file.sync_all())
    };
    let result = written.and_then(|()| fs::rename(&temp_path, path));

    if let Err(e) = result {
        // Clean up temp file on failure
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    debug!("Atomic write complete for {}", path.display());
    Ok(())
}
