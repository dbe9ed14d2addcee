//! Persisted user profile data model.
//!
//! Numeric fields are signed and the collections are optional so that a
//! damaged blob still deserializes; the validator then repairs it.

use chrono::{DateTime, Utc};
use profile_common::{UserId, CURRENT_VERSION};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Experience required per level: reaching `level + 1` costs `level * EXPERIENCE_PER_LEVEL`.
pub const EXPERIENCE_PER_LEVEL: i64 = 100;

/// Default nickname for new and repaired profiles.
pub const DEFAULT_NICKNAME: &str = "Player";

/// Coins granted to a fresh profile.
pub const DEFAULT_STARTING_COINS: i64 = 100;

// ============================================================================
// Game Stats
// ============================================================================

/// Aggregated gameplay statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GameStats {
    /// Games played. Always `wins + losses` on a valid profile.
    pub total_games: i64,
    /// Games won.
    pub wins: i64,
    /// Games lost.
    pub losses: i64,
    /// Best single-game score.
    pub highest_score: i64,
    /// Mean score across all games.
    pub average_score: f64,
    /// Total play time in seconds.
    pub total_play_time: f64,
}

impl GameStats {
    /// Records a finished game.
    ///
    /// Returns `false` and leaves the stats untouched if a counter would
    /// overflow.
    pub fn record_game(&mut self, score: i64, won: bool, play_time_secs: f64) -> bool {
        let (wins, losses) = if won {
            (self.wins.checked_add(1), Some(self.losses))
        } else {
            (Some(self.wins), self.losses.checked_add(1))
        };
        let (Some(wins), Some(losses)) = (wins, losses) else {
            return false;
        };
        let Some(total_games) = wins.checked_add(losses) else {
            return false;
        };

        let previous = self.total_games.max(0);
        self.average_score =
            (self.average_score * previous as f64 + score as f64) / (previous as f64 + 1.0);
        self.wins = wins;
        self.losses = losses;
        self.total_games = total_games;
        self.highest_score = self.highest_score.max(score);
        self.total_play_time += play_time_secs.max(0.0);
        true
    }

    /// Returns the win rate in `[0, 1]`, or 0 with no games played.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.total_games <= 0 {
            0.0
        } else {
            self.wins as f64 / self.total_games as f64
        }
    }
}

// ============================================================================
// User Profile
// ============================================================================

/// The persisted user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable identity, generated once.
    #[serde(default = "blank_user_id")]
    pub user_id: UserId,
    /// Display name.
    #[serde(default)]
    pub nickname: String,
    /// Player level, at least 1.
    #[serde(default)]
    pub level: i32,
    /// Experience towards the next level.
    #[serde(default)]
    pub experience: i64,
    /// Soft currency.
    #[serde(default)]
    pub coins: i64,
    /// Hard currency.
    #[serde(default)]
    pub gems: i64,
    /// Aggregated stats. `None` only in damaged or legacy blobs.
    #[serde(default)]
    pub game_stats: Option<GameStats>,
    /// Unlocked achievement ids. `None` only in damaged or legacy blobs.
    #[serde(default, deserialize_with = "lenient_ids")]
    pub achievements: Option<Vec<String>>,
    /// Schema version of this profile.
    #[serde(default)]
    pub data_version: u32,
    /// Time of the last committed mutation.
    #[serde(default)]
    pub last_modified: DateTime<Utc>,
}

fn blank_user_id() -> UserId {
    UserId::from_raw("")
}

/// Reads an id list, turning `null` entries into blanks for the repairer to drop.
fn lenient_ids<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|ids| ids.into_iter().map(Option::unwrap_or_default).collect()))
}

impl UserProfile {
    /// Creates a fresh profile at the current schema version.
    #[must_use]
    pub fn new(nickname: impl Into<String>, starting_coins: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: UserId::generate(),
            nickname: nickname.into(),
            level: 1,
            experience: 0,
            coins: starting_coins,
            gems: 0,
            game_stats: Some(GameStats::default()),
            achievements: Some(Vec::new()),
            data_version: CURRENT_VERSION,
            last_modified: now,
        }
    }

    /// Returns the stats, or `None` on an unrepaired legacy profile.
    #[must_use]
    pub fn stats(&self) -> Option<&GameStats> {
        self.game_stats.as_ref()
    }

    /// Returns the stats, inserting empty ones if missing.
    pub fn stats_mut(&mut self) -> &mut GameStats {
        self.game_stats.get_or_insert_with(GameStats::default)
    }

    /// Returns the unlocked achievement ids.
    #[must_use]
    pub fn achievement_ids(&self) -> &[String] {
        self.achievements.as_deref().unwrap_or_default()
    }

    /// Checks whether an achievement is unlocked.
    #[must_use]
    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievement_ids().iter().any(|a| a == id)
    }

    /// Adds an achievement id. Returns `false` if blank or already present.
    pub fn unlock_achievement(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.has_achievement(id) {
            return false;
        }
        self.achievements
            .get_or_insert_with(Vec::new)
            .push(id.to_string());
        true
    }

    /// Experience needed to advance from the current level.
    #[must_use]
    pub fn experience_to_next_level(&self) -> i64 {
        i64::from(self.level.max(1)) * EXPERIENCE_PER_LEVEL
    }

    /// Adds experience, levelling up as thresholds are crossed.
    ///
    /// Returns the number of levels gained.
    pub fn gain_experience(&mut self, amount: i64) -> u32 {
        self.experience = self.experience.saturating_add(amount.max(0));
        let mut gained = 0;
        while self.level < i32::MAX && self.experience >= self.experience_to_next_level() {
            self.experience -= self.experience_to_next_level();
            self.level = self.level.max(1).saturating_add(1);
            gained += 1;
        }
        gained
    }

    /// Returns duplicate-free achievement ids in first-seen order.
    #[must_use]
    pub fn distinct_achievements(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.achievement_ids()
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}
