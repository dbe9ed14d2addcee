//! Periodic profile saving with retry.
//!
//! [`AutoSave`] is driven from a cooperative loop: call
//! [`update`](AutoSave::update) once per tick with the elapsed time. It never
//! sleeps; retries are scheduled by counting down `retry_delay_secs` across
//! ticks.

use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

use crate::config::AutoSaveConfig;
use crate::store::ProfileStore;

/// Maximum history entries kept.
pub const MAX_HISTORY: usize = 20;

/// What caused a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoSaveTrigger {
    /// Interval elapsed.
    Interval,
    /// Requested through [`AutoSave::trigger`].
    Manual,
    /// Retry after a failed attempt.
    Retry,
}

/// Record of a save attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoSaveRecord {
    /// The trigger that caused the attempt.
    pub trigger: AutoSaveTrigger,
    /// Scheduler time of the attempt, in seconds since creation.
    pub at_secs: f64,
    /// Whether the save succeeded.
    pub success: bool,
}

/// Status of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSaveStatus {
    /// Waiting for the next interval or trigger.
    Idle,
    /// A failed save is waiting to be retried.
    Retrying {
        /// Failed attempts so far in this cycle
        failures: u32,
    },
    /// Paused by the caller.
    Paused,
    /// Disabled by config.
    Disabled,
}

#[derive(Debug, Clone, Copy)]
struct PendingRetry {
    failures: u32,
    wait_secs: f64,
}

/// Interval-driven saver.
#[derive(Debug, Clone)]
pub struct AutoSave {
    config: AutoSaveConfig,
    clock_secs: f64,
    since_save: f64,
    paused: bool,
    manual_requested: bool,
    retry: Option<PendingRetry>,
    history: VecDeque<AutoSaveRecord>,
}

impl Default for AutoSave {
    fn default() -> Self {
        Self::new(AutoSaveConfig::default())
    }
}

impl AutoSave {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(config: AutoSaveConfig) -> Self {
        Self {
            config,
            clock_secs: 0.0,
            since_save: 0.0,
            paused: false,
            manual_requested: false,
            retry: None,
            history: VecDeque::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AutoSaveConfig {
        &self.config
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> AutoSaveStatus {
        if !self.config.enabled {
            AutoSaveStatus::Disabled
        } else if self.paused {
            AutoSaveStatus::Paused
        } else if let Some(retry) = self.retry {
            AutoSaveStatus::Retrying {
                failures: retry.failures,
            }
        } else {
            AutoSaveStatus::Idle
        }
    }

    /// Returns recent attempts, newest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<AutoSaveRecord> {
        &self.history
    }

    /// Returns time until the next interval save.
    #[must_use]
    pub fn time_until_next_save(&self) -> f64 {
        (self.config.interval_secs - self.since_save).max(0.0)
    }

    /// Stops saving until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        self.paused = true;
        debug!("Autosave paused");
    }

    /// Resumes saving.
    pub fn resume(&mut self) {
        self.paused = false;
        debug!("Autosave resumed");
    }

    /// Requests a save on the next update.
    pub fn trigger(&mut self) {
        self.manual_requested = true;
        debug!("Autosave triggered");
    }

    /// Advances the scheduler and saves if due.
    ///
    /// Returns the save result if an attempt was made this tick.
    pub fn update(&mut self, delta_secs: f64, store: &mut ProfileStore) -> Option<bool> {
        if !self.config.enabled || self.paused {
            return None;
        }
        let delta = delta_secs.max(0.0);
        self.clock_secs += delta;

        if let Some(retry) = self.retry.as_mut() {
            retry.wait_secs -= delta;
            if retry.wait_secs > 0.0 {
                return None;
            }
            return Some(self.attempt(store, AutoSaveTrigger::Retry));
        }

        self.since_save += delta;
        let trigger = if self.manual_requested {
            AutoSaveTrigger::Manual
        } else if self.since_save >= self.config.interval_secs {
            AutoSaveTrigger::Interval
        } else {
            return None;
        };

        self.manual_requested = false;
        self.since_save = 0.0;
        Some(self.attempt(store, trigger))
    }

    fn attempt(&mut self, store: &mut ProfileStore, trigger: AutoSaveTrigger) -> bool {
        let success = store.save();

        self.history.push_front(AutoSaveRecord {
            trigger,
            at_secs: self.clock_secs,
            success,
        });
        while self.history.len() > MAX_HISTORY {
            self.history.pop_back();
        }

        if success {
            if self.retry.take().is_some() {
                info!("Autosave succeeded on retry");
            } else {
                debug!("Autosave complete ({:?})", trigger);
            }
            return true;
        }

        let failures = self.retry.map_or(1, |r| r.failures + 1);
        if failures <= self.config.max_retries {
            warn!(
                "Autosave failed, retry {}/{} in {}s",
                failures, self.config.max_retries, self.config.retry_delay_secs
            );
            self.retry = Some(PendingRetry {
                failures,
                wait_secs: self.config.retry_delay_secs,
            });
        } else {
            error!(
                "Autosave failed after {} retries, waiting for next interval",
                self.config.max_retries
            );
            self.retry = None;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::providers::{FixedClock, FixedIdentity};
    use chrono::{DateTime, Utc};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn store_in(dir: &Path) -> ProfileStore {
        ProfileStore::open(
            StoreConfig::in_dir(dir),
            Box::new(FixedIdentity("autosave-device".to_string())),
            Box::new(FixedClock::new(DateTime::<Utc>::UNIX_EPOCH)),
        )
    }

    fn config() -> AutoSaveConfig {
        AutoSaveConfig {
            enabled: true,
            interval_secs: 10.0,
            max_retries: 2,
            retry_delay_secs: 1.0,
        }
    }

    #[test]
    fn test_saves_on_interval() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut store = store_in(dir.path());
        let mut autosave = AutoSave::new(config());

        assert_eq!(autosave.update(4.0, &mut store), None);
        assert_eq!(autosave.update(4.0, &mut store), None);
        assert_eq!(autosave.update(4.0, &mut store), Some(true));
        assert!(store.primary_path().exists());
        assert_eq!(autosave.history().len(), 1);
        assert_eq!(autosave.history()[0].trigger, AutoSaveTrigger::Interval);
        assert!((autosave.time_until_next_save() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_manual_trigger() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut store = store_in(dir.path());
        let mut autosave = AutoSave::new(config());

        autosave.trigger();
        assert_eq!(autosave.update(0.1, &mut store), Some(true));
        assert_eq!(autosave.history()[0].trigger, AutoSaveTrigger::Manual);
        assert_eq!(autosave.update(0.1, &mut store), None);
    }

    #[test]
    fn test_paused_and_disabled_do_nothing() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut store = store_in(dir.path());
        let mut autosave = AutoSave::new(config());

        autosave.pause();
        assert_eq!(autosave.status(), AutoSaveStatus::Paused);
        assert_eq!(autosave.update(100.0, &mut store), None);
        autosave.resume();
        assert_eq!(autosave.status(), AutoSaveStatus::Idle);

        let mut disabled = AutoSave::new(AutoSaveConfig {
            enabled: false,
            ..config()
        });
        disabled.trigger();
        assert_eq!(disabled.status(), AutoSaveStatus::Disabled);
        assert_eq!(disabled.update(100.0, &mut store), None);
        assert!(!store.primary_path().exists());
    }

    #[test]
    fn test_retries_then_gives_up() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file").expect("write");
        let mut store = store_in(&blocker);
        let mut autosave = AutoSave::new(config());

        autosave.trigger();
        assert_eq!(autosave.update(0.0, &mut store), Some(false));
        assert_eq!(
            autosave.status(),
            AutoSaveStatus::Retrying { failures: 1 }
        );

        assert_eq!(autosave.update(0.5, &mut store), None);
        assert_eq!(autosave.update(0.5, &mut store), Some(false));
        assert_eq!(
            autosave.status(),
            AutoSaveStatus::Retrying { failures: 2 }
        );

        assert_eq!(autosave.update(1.0, &mut store), Some(false));
        assert_eq!(autosave.status(), AutoSaveStatus::Idle);
        assert_eq!(autosave.history().len(), 3);
        assert!(autosave.history().iter().all(|r| !r.success));
    }

    #[test]
    fn test_retry_recovers() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = dir.path().join("data");
        fs::write(&data_dir, b"file").expect("write");
        let mut store = store_in(&data_dir);
        let mut autosave = AutoSave::new(config());

        autosave.trigger();
        assert_eq!(autosave.update(0.0, &mut store), Some(false));

        fs::remove_file(&data_dir).expect("remove");
        assert_eq!(autosave.update(1.0, &mut store), Some(true));
        assert_eq!(autosave.status(), AutoSaveStatus::Idle);
        assert_eq!(autosave.history()[0].trigger, AutoSaveTrigger::Retry);
    }

    #[test]
    fn test_history_is_bounded() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut store = store_in(dir.path());
        let mut autosave = AutoSave::new(config());

        for _ in 0..(MAX_HISTORY + 5) {
            autosave.trigger();
            autosave.update(0.0, &mut store);
        }
        assert_eq!(autosave.history().len(), MAX_HISTORY);
    }
}
