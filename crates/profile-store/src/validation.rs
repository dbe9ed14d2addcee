//! Profile invariant checks and in-place repair.
//!
//! Rules run in a fixed order: basic fields, then game stats, then
//! collections, then cross-field consistency. Later rules see the effect of
//! earlier repairs, so `totalGames` is recomputed from already-clamped
//! `wins` and `losses`.

use profile_common::{ProfileError, UserId, CURRENT_VERSION, MIN_SUPPORTED_VERSION};
use thiserror::Error;
use tracing::warn;

use crate::profile::{GameStats, UserProfile, DEFAULT_NICKNAME};

/// How violations are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Read-only; stop at the first violation.
    Strict,
    /// Coerce every violation to a safe default and continue.
    Repair,
}

/// A single broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{field}`: {reason}")]
pub struct Violation {
    /// Field name as serialized.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl From<Violation> for ProfileError {
    fn from(v: Violation) -> Self {
        ProfileError::Validation {
            field: v.field.to_string(),
            reason: v.reason,
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether anything was coerced.
    pub repaired: bool,
    /// Coerced fields, each listed once in rule order.
    pub fields: Vec<&'static str>,
}

struct Rule {
    field: &'static str,
    check: fn(&UserProfile) -> Option<String>,
    repair: fn(&mut UserProfile, &Validator),
}

fn negative(value: i64) -> Option<String> {
    (value < 0).then(|| format!("must be non-negative, got {value}"))
}

fn bad_float(value: f64) -> Option<String> {
    (!value.is_finite() || value < 0.0).then(|| format!("must be finite and non-negative, got {value}"))
}

fn stat(profile: &UserProfile, read: fn(&GameStats) -> Option<String>) -> Option<String> {
    profile.game_stats.as_ref().and_then(read)
}

/// Checks and repairs profile invariants.
pub struct Validator {
    placeholder_nickname: String,
    rules: Vec<Rule>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_NICKNAME)
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("placeholder_nickname", &self.placeholder_nickname)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl Validator {
    /// Creates a validator that repairs blank nicknames to `placeholder_nickname`.
    #[must_use]
    pub fn new(placeholder_nickname: impl Into<String>) -> Self {
        Self {
            placeholder_nickname: placeholder_nickname.into(),
            rules: Self::rule_table(),
        }
    }

    fn rule_table() -> Vec<Rule> {
        vec![
            // Basic fields
            Rule {
                field: "userId",
                check: |p| p.user_id.is_blank().then(|| "must not be blank".to_string()),
                repair: |p, _| p.user_id = UserId::generate(),
            },
            Rule {
                field: "nickname",
                check: |p| p.nickname.trim().is_empty().then(|| "must not be blank".to_string()),
                repair: |p, v| p.nickname.clone_from(&v.placeholder_nickname),
            },
            Rule {
                field: "level",
                check: |p| (p.level < 1).then(|| format!("must be at least 1, got {}", p.level)),
                repair: |p, _| p.level = 1,
            },
            Rule {
                field: "experience",
                check: |p| negative(p.experience),
                repair: |p, _| p.experience = 0,
            },
            Rule {
                field: "coins",
                check: |p| negative(p.coins),
                repair: |p, _| p.coins = 0,
            },
            Rule {
                field: "gems",
                check: |p| negative(p.gems),
                repair: |p, _| p.gems = 0,
            },
            Rule {
                field: "dataVersion",
                check: |p| {
                    (!(MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&p.data_version)).then(
                        || {
                            format!(
                                "must be within {MIN_SUPPORTED_VERSION}..={CURRENT_VERSION}, got {}",
                                p.data_version
                            )
                        },
                    )
                },
                repair: |p, _| p.data_version = CURRENT_VERSION,
            },
            // Game stats
            Rule {
                field: "gameStats",
                check: |p| p.game_stats.is_none().then(|| "must be present".to_string()),
                repair: |p, _| p.game_stats = Some(GameStats::default()),
            },
            Rule {
                field: "gameStats.totalGames",
                check: |p| stat(p, |s| negative(s.total_games)),
                repair: |p, _| p.stats_mut().total_games = 0,
            },
            Rule {
                field: "gameStats.wins",
                check: |p| stat(p, |s| negative(s.wins)),
                repair: |p, _| p.stats_mut().wins = 0,
            },
            Rule {
                field: "gameStats.losses",
                check: |p| stat(p, |s| negative(s.losses)),
                repair: |p, _| p.stats_mut().losses = 0,
            },
            Rule {
                field: "gameStats.highestScore",
                check: |p| stat(p, |s| negative(s.highest_score)),
                repair: |p, _| p.stats_mut().highest_score = 0,
            },
            Rule {
                field: "gameStats.averageScore",
                check: |p| stat(p, |s| bad_float(s.average_score)),
                repair: |p, _| p.stats_mut().average_score = 0.0,
            },
            Rule {
                field: "gameStats.totalPlayTime",
                check: |p| stat(p, |s| bad_float(s.total_play_time)),
                repair: |p, _| p.stats_mut().total_play_time = 0.0,
            },
            // Collections
            Rule {
                field: "achievements",
                check: |p| p.achievements.is_none().then(|| "must be present".to_string()),
                repair: |p, _| p.achievements = Some(Vec::new()),
            },
            Rule {
                field: "achievements",
                check: |p| {
                    let blanks = p
                        .achievement_ids()
                        .iter()
                        .filter(|id| id.trim().is_empty())
                        .count();
                    (blanks > 0).then(|| format!("contains {blanks} blank entries"))
                },
                repair: |p, _| {
                    if let Some(ids) = p.achievements.as_mut() {
                        ids.retain(|id| !id.trim().is_empty());
                    }
                },
            },
            Rule {
                field: "achievements",
                check: |p| {
                    let dupes = p.achievement_ids().len() - p.distinct_achievements().len();
                    (dupes > 0).then(|| format!("contains {dupes} duplicate entries"))
                },
                repair: |p, _| p.achievements = Some(p.distinct_achievements()),
            },
            // Cross-field
            Rule {
                field: "gameStats.totalGames",
                check: |p| {
                    stat(p, |s| {
                        let expected = s.wins.saturating_add(s.losses);
                        (s.total_games != expected).then(|| {
                            format!(
                                "must equal wins + losses ({expected}), got {}",
                                s.total_games
                            )
                        })
                    })
                },
                repair: |p, _| {
                    let stats = p.stats_mut();
                    stats.total_games = stats.wins.saturating_add(stats.losses);
                },
            },
        ]
    }

    /// Checks every invariant without mutating, stopping at the first violation.
    pub fn check(&self, profile: &UserProfile) -> Result<(), Violation> {
        for rule in &self.rules {
            if let Some(reason) = (rule.check)(profile) {
                return Err(Violation {
                    field: rule.field,
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Coerces every violated invariant to a safe default.
    pub fn repair(&self, profile: &mut UserProfile) -> ValidationReport {
        let mut report = ValidationReport::default();
        for rule in &self.rules {
            if let Some(reason) = (rule.check)(profile) {
                warn!("Repairing `{}`: {}", rule.field, reason);
                (rule.repair)(profile, self);
                report.repaired = true;
                if !report.fields.contains(&rule.field) {
                    report.fields.push(rule.field);
                }
            }
        }
        report
    }

    /// Validates `profile` in the given mode.
    ///
    /// Strict mode never mutates and fails on the first violation. Repair mode
    /// always succeeds.
    pub fn validate(
        &self,
        profile: &mut UserProfile,
        mode: ValidationMode,
    ) -> Result<ValidationReport, Violation> {
        match mode {
            ValidationMode::Strict => self.check(profile).map(|()| ValidationReport::default()),
            ValidationMode::Repair => Ok(self.repair(profile)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn valid() -> UserProfile {
        UserProfile::new("Ann", 100, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn test_valid_profile_passes() {
        let validator = Validator::default();
        let mut p = valid();
        assert!(validator.check(&p).is_ok());

        let report = validator.validate(&mut p, ValidationMode::Repair).expect("repair");
        assert!(!report.repaired);
        assert!(report.fields.is_empty());
    }

    #[test]
    fn test_strict_stops_at_first_violation() {
        let validator = Validator::default();
        let mut p = valid();
        p.coins = -50;
        p.gems = -1;
        let before = p.clone();

        let err = validator
            .validate(&mut p, ValidationMode::Strict)
            .expect_err("should fail");
        assert_eq!(err.field, "coins");
        assert_eq!(p, before);
    }

    #[test]
    fn test_repair_negative_counters() {
        let validator = Validator::default();
        let mut p = valid();
        p.coins = -50;
        p.experience = -1;
        p.level = 0;

        let report = validator.repair(&mut p);
        assert!(report.repaired);
        assert_eq!(report.fields, vec!["level", "experience", "coins"]);
        assert_eq!(p.coins, 0);
        assert_eq!(p.experience, 0);
        assert_eq!(p.level, 1);
    }

    #[test]
    fn test_repair_blank_identity_fields() {
        let validator = Validator::new("Guest");
        let mut p = valid();
        p.user_id = UserId::from_raw("");
        p.nickname = "   ".to_string();

        validator.repair(&mut p);
        assert!(!p.user_id.is_blank());
        assert_eq!(p.nickname, "Guest");
    }

    #[test]
    fn test_repair_missing_collections() {
        let validator = Validator::default();
        let mut p = valid();
        p.game_stats = None;
        p.achievements = None;

        let report = validator.repair(&mut p);
        assert_eq!(report.fields, vec!["gameStats", "achievements"]);
        assert_eq!(p.stats(), Some(&GameStats::default()));
        assert_eq!(p.achievements, Some(Vec::new()));
    }

    #[test]
    fn test_repair_achievement_entries() {
        let validator = Validator::default();
        let mut p = valid();
        p.achievements = Some(vec![
            "a".to_string(),
            String::new(),
            "b".to_string(),
            "a".to_string(),
            " ".to_string(),
        ]);

        let report = validator.repair(&mut p);
        assert_eq!(report.fields, vec!["achievements"]);
        assert_eq!(p.achievement_ids(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_repair_total_games_from_clamped_counts() {
        let validator = Validator::default();
        let mut p = valid();
        let stats = p.stats_mut();
        stats.wins = 3;
        stats.losses = -2;
        stats.total_games = 10;

        let report = validator.repair(&mut p);
        assert_eq!(
            report.fields,
            vec!["gameStats.losses", "gameStats.totalGames"]
        );
        let stats = p.stats().expect("stats");
        assert_eq!(stats.losses, 0);
        assert_eq!(stats.total_games, 3);
    }

    #[test]
    fn test_repair_bad_floats() {
        let validator = Validator::default();
        let mut p = valid();
        p.stats_mut().average_score = f64::NAN;
        p.stats_mut().total_play_time = -5.0;

        validator.repair(&mut p);
        let stats = p.stats().expect("stats");
        assert!(stats.average_score.abs() < f64::EPSILON);
        assert!(stats.total_play_time.abs() < f64::EPSILON);
    }

    #[test]
    fn test_repair_out_of_range_version() {
        let validator = Validator::default();
        let mut p = valid();
        p.data_version = 0;
        assert_eq!(validator.check(&p).expect_err("bad version").field, "dataVersion");

        validator.repair(&mut p);
        assert_eq!(p.data_version, CURRENT_VERSION);
    }

    #[test]
    fn test_inconsistent_totals_fail_strict() {
        let validator = Validator::default();
        let mut p = valid();
        let stats = p.stats_mut();
        stats.total_games = 5;
        stats.wins = 2;
        stats.losses = 2;

        let err = validator.check(&p).expect_err("inconsistent");
        assert_eq!(err.field, "gameStats.totalGames");
        assert!(err.reason.contains("wins + losses"));
    }

    fn arb_profile() -> impl Strategy<Value = UserProfile> {
        (
            (-5i32..20, -100i64..100, -100i64..100, -100i64..100),
            prop::option::of((
                -10i64..10,
                -10i64..10,
                -10i64..10,
                -10i64..100,
                -10.0f64..100.0,
            )),
            prop::option::of(prop::collection::vec("[ab ]{0,2}", 0..6)),
            (0u32..7, "[a-z ]{0,4}"),
        )
            .prop_map(|((level, xp, coins, gems), stats, achievements, (version, nick))| {
                let mut p = UserProfile::new(nick, coins, DateTime::<Utc>::UNIX_EPOCH);
                p.level = level;
                p.experience = xp;
                p.gems = gems;
                p.data_version = version;
                p.game_stats = stats.map(|(total, wins, losses, high, avg)| GameStats {
                    total_games: total,
                    wins,
                    losses,
                    highest_score: high,
                    average_score: avg,
                    total_play_time: avg,
                });
                p.achievements = achievements;
                p
            })
    }

    proptest! {
        #[test]
        fn prop_repair_is_idempotent(mut p in arb_profile()) {
            let validator = Validator::default();
            validator.repair(&mut p);
            let second = validator.repair(&mut p);
            prop_assert!(!second.repaired);
            prop_assert!(validator.check(&p).is_ok());
        }

        #[test]
        fn prop_repair_restores_total_games(mut p in arb_profile()) {
            Validator::default().repair(&mut p);
            let stats = p.stats().expect("stats present after repair");
            prop_assert_eq!(stats.total_games, stats.wins + stats.losses);
            prop_assert!(p.level >= 1);
            prop_assert!(p.coins >= 0 && p.gems >= 0 && p.experience >= 0);
        }
    }
}
