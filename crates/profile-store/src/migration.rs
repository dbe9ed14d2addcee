//! Profile schema versioning and migration.
//!
//! Migrations run on the decoded JSON document before it is bound to
//! [`UserProfile`](crate::profile::UserProfile), so a field that is absent can
//! be told apart from one explicitly set to zero. Steps only backfill fields a
//! version introduced; they never rewrite existing valid data.
//!
//! Adding a schema version means bumping `CURRENT_VERSION` and appending one
//! step to [`MigrationRegistry::with_builtin_migrations`].

use profile_common::{ProfileError, ProfileResult, CURRENT_VERSION, MIN_SUPPORTED_VERSION};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// JSON key holding the schema version.
pub const VERSION_KEY: &str = "dataVersion";

/// Version assumed for blobs written before version tagging.
pub const UNTAGGED_VERSION: u32 = 1;

/// Errors related to migration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// Target is older than the source.
    #[error("Cannot downgrade from version {from} to {to}")]
    Downgrade {
        /// Source version
        from: u32,
        /// Requested target
        to: u32,
    },

    /// Source predates every migration.
    #[error("Version {found} is too old (minimum: {minimum})")]
    TooOld {
        /// Found version
        found: u32,
        /// Minimum supported version
        minimum: u32,
    },

    /// No step starts at this version.
    #[error("No migration from version {0}")]
    MissingStep(u32),

    /// A step failed; the document stays at `from`.
    #[error("Migration {from} -> {to} ({description}) failed: {reason}")]
    StepFailed {
        /// Source version of the failing step
        from: u32,
        /// Target version of the failing step
        to: u32,
        /// Step description
        description: String,
        /// Reason for failure
        reason: String,
    },

    /// A registered step does not continue the chain.
    #[error("Migration must start at version {expected}, got {found}")]
    OutOfOrder {
        /// Head version of the registry
        expected: u32,
        /// Source version of the rejected step
        found: u32,
    },
}

impl From<MigrationError> for ProfileError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::StepFailed {
                from, to, reason, ..
            } => ProfileError::MigrationStep { from, to, reason },
            MigrationError::Downgrade { from, .. } | MigrationError::TooOld { found: from, .. } => {
                ProfileError::UnsupportedVersion {
                    found: from,
                    minimum: MIN_SUPPORTED_VERSION,
                    current: CURRENT_VERSION,
                }
            },
            MigrationError::MissingStep(from) => ProfileError::MigrationStep {
                from,
                to: from + 1,
                reason: "no migration registered".to_string(),
            },
            MigrationError::OutOfOrder { expected, found } => ProfileError::MigrationStep {
                from: found,
                to: expected,
                reason: "migration table out of order".to_string(),
            },
        }
    }
}

/// Reason a single step could not apply.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StepError(pub String);

/// Record of an applied step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Source version.
    pub from_version: u32,
    /// Target version.
    pub to_version: u32,
    /// What the step did.
    pub description: String,
}

/// A single `v -> v + 1` transformation.
pub trait Migration {
    /// Source version this migration applies to.
    fn source_version(&self) -> u32;

    /// Target version after migration.
    fn target_version(&self) -> u32 {
        self.source_version() + 1
    }

    /// Migrates the document in place.
    fn migrate(&self, doc: &mut Value) -> Result<(), StepError>;

    /// Description of changes made.
    fn description(&self) -> &str;
}

/// Reads the schema version of a document.
///
/// A missing version means the blob predates tagging and is treated as
/// [`UNTAGGED_VERSION`].
pub fn document_version(doc: &Value) -> ProfileResult<u32> {
    let root = doc
        .as_object()
        .ok_or_else(|| ProfileError::Decode("profile is not a JSON object".to_string()))?;

    match root.get(VERSION_KEY) {
        None | Some(Value::Null) => Ok(UNTAGGED_VERSION),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ProfileError::Decode(format!("invalid {VERSION_KEY}: {value}"))),
    }
}

fn root_object<'a>(doc: &'a mut Value) -> Result<&'a mut Map<String, Value>, StepError> {
    doc.as_object_mut()
        .ok_or_else(|| StepError("document is not an object".to_string()))
}

// ============================================================================
// Built-in steps
// ============================================================================

/// v1 -> v2: introduces `gameStats`.
#[derive(Debug, Clone, Copy)]
pub struct AddGameStats;

impl Migration for AddGameStats {
    fn source_version(&self) -> u32 {
        1
    }

    fn migrate(&self, doc: &mut Value) -> Result<(), StepError> {
        let root = root_object(doc)?;
        let missing = match root.get("gameStats") {
            None | Some(Value::Null) => true,
            Some(Value::Object(_)) => false,
            Some(other) => return Err(StepError(format!("gameStats is not an object: {other}"))),
        };
        if missing {
            root.insert(
                "gameStats".to_string(),
                json!({ "totalGames": 0, "wins": 0, "losses": 0, "highestScore": 0 }),
            );
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "add game stats"
    }
}

/// v2 -> v3: introduces `achievements`.
#[derive(Debug, Clone, Copy)]
pub struct AddAchievements;

impl Migration for AddAchievements {
    fn source_version(&self) -> u32 {
        2
    }

    fn migrate(&self, doc: &mut Value) -> Result<(), StepError> {
        let root = root_object(doc)?;
        let missing = match root.get("achievements") {
            None | Some(Value::Null) => true,
            Some(Value::Array(_)) => false,
            Some(other) => return Err(StepError(format!("achievements is not an array: {other}"))),
        };
        if missing {
            root.insert("achievements".to_string(), json!([]));
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "add achievements"
    }
}

/// v3 -> v4: introduces `averageScore` and `totalPlayTime` in `gameStats`.
///
/// Only absent, `null` or negative values are backfilled; any non-negative
/// value is taken as already migrated.
#[derive(Debug, Clone, Copy)]
pub struct AddScoreAggregates;

impl Migration for AddScoreAggregates {
    fn source_version(&self) -> u32 {
        3
    }

    fn migrate(&self, doc: &mut Value) -> Result<(), StepError> {
        let root = root_object(doc)?;
        let stats = root
            .get_mut("gameStats")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| StepError("gameStats is missing or not an object".to_string()))?;

        for key in ["averageScore", "totalPlayTime"] {
            let needs_default = match stats.get(key) {
                None | Some(Value::Null) => true,
                Some(Value::Number(n)) => n.as_f64().map_or(true, |v| v < 0.0),
                Some(other) => return Err(StepError(format!("{key} is not a number: {other}"))),
            };
            if needs_default {
                stats.insert(key.to_string(), json!(0.0));
            }
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "add average score and total play time"
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered, append-only table of migration steps.
pub struct MigrationRegistry {
    steps: Vec<Box<dyn Migration + Send + Sync>>,
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::with_builtin_migrations()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("base", &MIN_SUPPORTED_VERSION)
            .field("head", &self.head_version())
            .finish()
    }
}

impl MigrationRegistry {
    /// Creates an empty registry starting at [`MIN_SUPPORTED_VERSION`].
    #[must_use]
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Creates a registry with all built-in migrations.
    #[must_use]
    pub fn with_builtin_migrations() -> Self {
        let mut registry = Self::new();
        registry.steps.push(Box::new(AddGameStats));
        registry.steps.push(Box::new(AddAchievements));
        registry.steps.push(Box::new(AddScoreAggregates));
        debug_assert_eq!(registry.head_version(), CURRENT_VERSION);
        registry
    }

    /// Newest version reachable through the table.
    #[must_use]
    pub fn head_version(&self) -> u32 {
        self.steps
            .last()
            .map_or(MIN_SUPPORTED_VERSION, |step| step.target_version())
    }

    /// Appends a step. It must start where the table currently ends.
    pub fn register(
        &mut self,
        migration: Box<dyn Migration + Send + Sync>,
    ) -> Result<(), MigrationError> {
        let expected = self.head_version();
        if migration.source_version() != expected
            || migration.target_version() != expected + 1
        {
            return Err(MigrationError::OutOfOrder {
                expected,
                found: migration.source_version(),
            });
        }
        self.steps.push(migration);
        Ok(())
    }

    /// Lists `(source, target, description)` for every step, in order.
    #[must_use]
    pub fn list_migrations(&self) -> Vec<(u32, u32, &str)> {
        self.steps
            .iter()
            .map(|m| (m.source_version(), m.target_version(), m.description()))
            .collect()
    }

    fn step_from(&self, version: u32) -> Option<&(dyn Migration + Send + Sync)> {
        let index = version.checked_sub(MIN_SUPPORTED_VERSION)? as usize;
        self.steps.get(index).map(|step| &**step)
    }

    /// Migrates `doc` from `from_version` to `to_version`.
    ///
    /// After each step the document's `dataVersion` is set to that step's
    /// target, so on failure it is left at the last version that succeeded.
    pub fn migrate(
        &self,
        doc: &mut Value,
        from_version: u32,
        to_version: u32,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        if to_version < from_version {
            return Err(MigrationError::Downgrade {
                from: from_version,
                to: to_version,
            });
        }
        if from_version < MIN_SUPPORTED_VERSION {
            return Err(MigrationError::TooOld {
                found: from_version,
                minimum: MIN_SUPPORTED_VERSION,
            });
        }
        if from_version == to_version {
            return Ok(Vec::new());
        }
        if to_version > self.head_version() {
            return Err(MigrationError::MissingStep(self.head_version()));
        }

        let mut current = from_version;
        let mut records = Vec::new();

        while current < to_version {
            let step = self
                .step_from(current)
                .ok_or(MigrationError::MissingStep(current))?;
            let target = step.target_version();

            info!(
                "Applying migration: {} ({} -> {})",
                step.description(),
                current,
                target
            );

            if let Err(StepError(reason)) = step.migrate(doc) {
                warn!("Migration {} -> {} failed: {}", current, target, reason);
                return Err(MigrationError::StepFailed {
                    from: current,
                    to: target,
                    description: step.description().to_string(),
                    reason,
                });
            }

            if let Some(root) = doc.as_object_mut() {
                root.insert(VERSION_KEY.to_string(), json!(target));
            }
            records.push(MigrationRecord {
                from_version: current,
                to_version: target,
                description: step.description().to_string(),
            });
            current = target;
        }

        debug!("Migrated document {} -> {}", from_version, to_version);
        Ok(records)
    }
}
