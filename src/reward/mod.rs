//! Learner profiles and the score → reward bridge.
//!
//! [`apply_score`] is a pure function; [`RewardLedger`] adds the
//! at-most-once guarantee per session.  Neither persists anything: the
//! proposed [`Profile`] is handed to whoever owns storage
//! ([`store::ProfileStore`]).

pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use store::{JsonProfileStore, ProfileStore};

/// Words per day a new profile aims for.
pub const DEFAULT_DAILY_GOAL: u32 = 5;

/// Coins earned per score point.
pub const DEFAULT_COINS_PER_POINT: u32 = 5;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub coins: u64,
    #[serde(default = "default_daily_goal")]
    pub daily_goal: u32,
    #[serde(default)]
    pub daily_progress: u32,
    /// Language codes the learner picked, most preferred first.
    #[serde(default)]
    pub target_languages: Vec<String>,
}

fn default_daily_goal() -> u32 {
    DEFAULT_DAILY_GOAL
}

impl Profile {
    /// A fresh profile with no coins and no progress.
    pub fn new(name: &str, avatar: &str, daily_goal: u32) -> Self {
        let id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().to_string())
            .unwrap_or_else(|_| "0".to_string());
        Self {
            id,
            name: name.to_string(),
            avatar: avatar.to_string(),
            coins: 0,
            daily_goal,
            daily_progress: 0,
            target_languages: Vec::new(),
        }
    }

    pub fn goal_reached(&self) -> bool {
        self.daily_progress >= self.daily_goal
    }
}

// ---------------------------------------------------------------------------
// apply_score
// ---------------------------------------------------------------------------

/// Propose the profile after earning `score`.
///
/// A positive score adds `score * coins_per_point` coins and one word of
/// daily progress, clamped to the daily goal.  Zero changes nothing.
///
/// ```rust
/// use pov_kids::reward::{apply_score, Profile};
///
/// let before = Profile::new("Mia", "🦊", 5);
/// let after = apply_score(&before, 3, 5);
/// assert_eq!(after.coins, 15);
/// assert_eq!(after.daily_progress, 1);
/// ```
pub fn apply_score(previous: &Profile, score: u8, coins_per_point: u32) -> Profile {
    let mut next = previous.clone();
    if score == 0 {
        return next;
    }
    let earned = u64::from(score) * u64::from(coins_per_point);
    next.coins = next.coins.saturating_add(earned);
    next.daily_progress = next.daily_progress.saturating_add(1).min(next.daily_goal);
    next
}

// ---------------------------------------------------------------------------
// RewardLedger
// ---------------------------------------------------------------------------

/// Remembers which sessions have been rewarded.
///
/// Session ids only grow, so the newest rewarded id covers every older one.
#[derive(Debug)]
pub struct RewardLedger {
    coins_per_point: u32,
    last_awarded: Option<u64>,
}

impl RewardLedger {
    pub fn new(coins_per_point: u32) -> Self {
        Self {
            coins_per_point,
            last_awarded: None,
        }
    }

    /// Apply `score` for `session_id`.  `None` when the session was already
    /// rewarded.
    pub fn award(&mut self, session_id: u64, profile: &Profile, score: u8) -> Option<Profile> {
        if self.is_awarded(session_id) {
            log::debug!("reward: session {session_id} already rewarded");
            return None;
        }
        self.last_awarded = Some(session_id);
        let next = apply_score(profile, score, self.coins_per_point);
        log::info!(
            "reward: session {session_id} scored {score}, coins {} -> {}, progress {}/{}",
            profile.coins,
            next.coins,
            next.daily_progress,
            next.daily_goal
        );
        Some(next)
    }

    pub fn is_awarded(&self, session_id: u64) -> bool {
        self.last_awarded.is_some_and(|last| session_id <= last)
    }
}

impl Default for RewardLedger {
    fn default() -> Self {
        Self::new(DEFAULT_COINS_PER_POINT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(coins: u64, progress: u32, goal: u32) -> Profile {
        Profile {
            id: "p1".into(),
            name: "Mia".into(),
            avatar: "🦊".into(),
            coins,
            daily_goal: goal,
            daily_progress: progress,
            target_languages: vec!["es-ES".into()],
        }
    }

    #[test]
    fn score_three_earns_fifteen_coins() {
        let after = apply_score(&profile(10, 2, 5), 3, 5);
        assert_eq!(after.coins, 25);
        assert_eq!(after.daily_progress, 3);
        assert_eq!(after.id, "p1");
        assert_eq!(after.target_languages, vec!["es-ES".to_string()]);
    }

    #[test]
    fn progress_is_clamped_to_goal() {
        let after = apply_score(&profile(0, 5, 5), 1, 5);
        assert_eq!(after.daily_progress, 5);
        assert_eq!(after.coins, 5);
        assert!(after.goal_reached());
    }

    #[test]
    fn zero_score_changes_nothing() {
        let before = profile(7, 1, 5);
        assert_eq!(apply_score(&before, 0, 5), before);
    }

    #[test]
    fn coins_saturate() {
        let after = apply_score(&profile(u64::MAX - 1, 0, 5), 3, 5);
        assert_eq!(after.coins, u64::MAX);
    }

    #[test]
    fn ledger_awards_once_per_session() {
        let mut ledger = RewardLedger::default();
        let before = profile(0, 0, 5);

        let first = ledger.award(42, &before, 3).unwrap();
        assert_eq!(first.coins, 15);
        assert!(ledger.is_awarded(42));

        assert!(ledger.award(42, &first, 3).is_none());

        let second = ledger.award(43, &first, 2).unwrap();
        assert_eq!(second.coins, 25);
        assert_eq!(second.daily_progress, 2);
    }

    #[test]
    fn ledger_never_rewards_an_older_session() {
        let mut ledger = RewardLedger::default();
        let before = profile(0, 0, 5);

        assert!(!ledger.is_awarded(1));
        ledger.award(7, &before, 1).unwrap();
        assert!(ledger.is_awarded(3));
        assert!(ledger.award(3, &before, 3).is_none());
        assert!(!ledger.is_awarded(8));
    }

    #[test]
    fn new_profile_defaults() {
        let p = Profile::new("Leo", "🐼", DEFAULT_DAILY_GOAL);
        assert_eq!(p.coins, 0);
        assert_eq!(p.daily_progress, 0);
        assert_eq!(p.daily_goal, 5);
        assert!(!p.id.is_empty());
    }

    #[test]
    fn profile_json_fills_missing_fields() {
        let p: Profile = serde_json::from_str(r#"{"id":"1","name":"Ana"}"#).unwrap();
        assert_eq!(p.daily_goal, DEFAULT_DAILY_GOAL);
        assert_eq!(p.coins, 0);
        assert!(p.target_languages.is_empty());
    }
}
