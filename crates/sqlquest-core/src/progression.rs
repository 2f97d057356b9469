//! Progression data model and the pure rules that move it.
//!
//! Nothing here touches storage or randomness; callers load the current state, apply one
//! of these transitions, and persist the result.

use crate::ExerciseKey;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MISSION_SLOTS: usize = 3;
pub const WEEKLY_MISSIONS_TARGET: u32 = 12;
pub const QUEST_XP_REWARD: u64 = 200;
pub const SHIELD_STREAK_INTERVAL: u32 = 7;
pub const SHIELD_CAP: u32 = 1;
pub const RECOVERY_MIN_STREAK: u32 = 7;
pub const RECOVERY_MISSIONS_NEEDED: u32 = 5;
pub const RECOVERY_WINDOW_DAYS: i64 = 2;
pub const RECOVERY_COOLDOWN_DAYS: i64 = 30;

/// `floor(0.1 * sqrt(total_xp) + 1)`, evaluated on the integer square root so that
/// perfect squares never land just under a level boundary.
pub fn level_for_xp(total_xp: u64) -> u32 {
    let level = integer_sqrt(total_xp) / 10 + 1;
    u32::try_from(level).unwrap_or(u32::MAX)
}

fn integer_sqrt(value: u64) -> u64 {
    let mut root = (value as f64).sqrt() as u64;
    while root.checked_mul(root).map_or(true, |square| square > value) {
        root -= 1;
    }
    while (root + 1)
        .checked_mul(root + 1)
        .map_or(false, |square| square <= value)
    {
        root += 1;
    }
    root
}

/// Most recent Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Learner {
    pub user_id: String,
    pub total_xp: u64,
    pub level: u32,
    pub current_streak: u32,
    pub max_streak: u32,
    pub streak_shields: u32,
    pub last_login_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoginOutcome {
    FirstLogin,
    SameDay,
    Continued { shield_awarded: bool },
    /// Two-day gap covered by a shield without spending it.
    ShieldHeld,
    ShieldConsumed,
    StreakBroken { previous_streak: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginTransition {
    pub learner: Learner,
    pub gap_days: Option<i64>,
    pub outcome: LoginOutcome,
    /// Streak value that broke, when it was long enough to qualify for recovery.
    pub recovery_candidate: Option<u32>,
}

impl Learner {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            total_xp: 0,
            level: level_for_xp(0),
            current_streak: 0,
            max_streak: 0,
            streak_shields: 0,
            last_login_date: None,
            created_at: now,
        }
    }

    pub fn add_xp(&mut self, amount: u64) {
        self.total_xp = self.total_xp.saturating_add(amount);
        self.level = level_for_xp(self.total_xp);
    }

    pub fn set_streak(&mut self, streak: u32) {
        self.current_streak = streak;
        self.max_streak = self.max_streak.max(streak);
    }

    pub fn process_login(&self, today: NaiveDate) -> LoginTransition {
        let mut learner = self.clone();
        let previous_streak = self.current_streak;
        let gap_days = self.last_login_date.map(|last| (today - last).num_days());

        let outcome = match gap_days {
            None => {
                learner.current_streak = 1;
                LoginOutcome::FirstLogin
            }
            // A clock that moved backwards counts as a same-day login.
            Some(gap) if gap <= 0 => LoginOutcome::SameDay,
            Some(1) => {
                learner.current_streak = previous_streak.saturating_add(1);
                let shield_awarded = learner.current_streak % SHIELD_STREAK_INTERVAL == 0
                    && learner.streak_shields < SHIELD_CAP;
                if shield_awarded {
                    learner.streak_shields += 1;
                }
                LoginOutcome::Continued { shield_awarded }
            }
            Some(2) if learner.streak_shields > 0 => LoginOutcome::ShieldHeld,
            Some(_) if learner.streak_shields > 0 => {
                learner.streak_shields -= 1;
                LoginOutcome::ShieldConsumed
            }
            Some(_) => {
                learner.current_streak = 1;
                LoginOutcome::StreakBroken { previous_streak }
            }
        };

        learner.max_streak = learner.max_streak.max(learner.current_streak);
        if gap_days.map_or(true, |gap| gap > 0) {
            learner.last_login_date = Some(today);
        }

        let recovery_candidate = match outcome {
            LoginOutcome::StreakBroken { previous_streak }
                if previous_streak >= RECOVERY_MIN_STREAK =>
            {
                Some(previous_streak)
            }
            _ => None,
        };

        LoginTransition {
            learner,
            gap_days,
            outcome,
            recovery_candidate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressRecord {
    pub user_id: String,
    pub exercise: ExerciseKey,
    pub completed: bool,
    pub attempts: u32,
    pub hints_used: u32,
    pub xp_earned: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn first_attempt(
        user_id: impl Into<String>,
        exercise: ExerciseKey,
        completed: bool,
        xp_delta: u64,
        hints_delta: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            exercise,
            completed,
            attempts: 1,
            hints_used: hints_delta,
            xp_earned: xp_delta,
            completed_at: completed.then_some(now),
            updated_at: now,
        }
    }

    /// Not idempotent: every call counts as another attempt.
    pub fn record_attempt(
        &mut self,
        completed: bool,
        xp_delta: u64,
        hints_delta: u32,
        now: DateTime<Utc>,
    ) {
        self.attempts = self.attempts.saturating_add(1);
        self.hints_used = self.hints_used.saturating_add(hints_delta);
        self.xp_earned = self.xp_earned.saturating_add(xp_delta);
        self.completed = completed;
        if completed {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyMission {
    pub user_id: String,
    pub date: NaiveDate,
    pub slots: [ExerciseKey; MISSION_SLOTS],
    pub completed_count: u8,
    pub created_at: DateTime<Utc>,
}

impl DailyMission {
    pub fn new(
        user_id: impl Into<String>,
        date: NaiveDate,
        slots: [ExerciseKey; MISSION_SLOTS],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            date,
            slots,
            completed_count: 0,
            created_at: now,
        }
    }

    pub fn next_slot(&self) -> Option<ExerciseKey> {
        self.slots.get(usize::from(self.completed_count)).copied()
    }

    pub fn is_complete(&self) -> bool {
        usize::from(self.completed_count) >= MISSION_SLOTS
    }

    /// Slots clear strictly in order; only the next unfilled slot can advance.
    pub fn advance(&mut self, exercise: ExerciseKey) -> bool {
        if self.next_slot() != Some(exercise) {
            return false;
        }
        self.completed_count += 1;
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestReward {
    StreakShield,
    BonusXp,
}

impl QuestReward {
    pub fn from_coin(heads: bool) -> Self {
        if heads {
            QuestReward::StreakShield
        } else {
            QuestReward::BonusXp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestReward::StreakShield => "streak_shield",
            QuestReward::BonusXp => "bonus_xp",
        }
    }

    /// Shield rewards are granted without the login-time shield cap.
    pub fn apply(&self, learner: &mut Learner) {
        match self {
            QuestReward::StreakShield => {
                learner.streak_shields = learner.streak_shields.saturating_add(1)
            }
            QuestReward::BonusXp => learner.add_xp(QUEST_XP_REWARD),
        }
    }
}

impl fmt::Display for QuestReward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestReward {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "streak_shield" => Ok(QuestReward::StreakShield),
            "bonus_xp" => Ok(QuestReward::BonusXp),
            other => Err(format!("Unknown quest reward: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyQuest {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub missions_target: u32,
    pub missions_completed: u32,
    pub completed: bool,
    pub reward_claimed: bool,
    pub reward: Option<QuestReward>,
    pub created_at: DateTime<Utc>,
}

impl WeeklyQuest {
    pub fn new(user_id: impl Into<String>, week_start: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            week_start,
            missions_target: WEEKLY_MISSIONS_TARGET,
            missions_completed: 0,
            completed: false,
            reward_claimed: false,
            reward: None,
            created_at: now,
        }
    }

    /// Counts one mission and reports whether an unclaimed reward is now due.
    pub fn record_mission(&mut self) -> bool {
        self.missions_completed = self.missions_completed.saturating_add(1);
        self.completed = self.missions_completed >= self.missions_target;
        self.reward_due()
    }

    pub fn reward_due(&self) -> bool {
        self.completed && !self.reward_claimed
    }

    pub fn claim_reward(&mut self, reward: QuestReward, learner: &mut Learner) -> bool {
        if !self.reward_due() {
            return false;
        }
        reward.apply(learner);
        self.reward_claimed = true;
        self.reward = Some(reward);
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryTicket {
    pub ticket_id: String,
    pub user_id: String,
    pub broken_streak: u32,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub missions_needed: u32,
    pub missions_completed: u32,
    pub used: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub advanced: bool,
    pub restored_streak: Option<u32>,
    pub ticket: Option<RecoveryTicket>,
}

impl RecoveryOutcome {
    pub fn restored(&self) -> bool {
        self.restored_streak.is_some()
    }
}

impl RecoveryTicket {
    pub fn open(user_id: impl Into<String>, broken_streak: u32, now: DateTime<Utc>) -> Self {
        Self {
            ticket_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            broken_streak,
            created_at: now,
            deadline: now + Duration::days(RECOVERY_WINDOW_DAYS),
            missions_needed: RECOVERY_MISSIONS_NEEDED,
            missions_completed: 0,
            used: false,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.deadline >= now
    }

    /// A ticket redeemed within the cooldown window blocks opening another one.
    pub fn blocks_new_ticket(&self, now: DateTime<Utc>) -> bool {
        self.used && self.created_at >= now - Duration::days(RECOVERY_COOLDOWN_DAYS)
    }

    pub fn restored_streak(&self) -> u32 {
        self.broken_streak / 2
    }

    /// Counts one mission toward the ticket; on the last one the learner's streak is
    /// overwritten with half the broken streak and the ticket is spent.
    pub fn advance(&mut self, learner: &mut Learner, now: DateTime<Utc>) -> RecoveryOutcome {
        if !self.is_active(now) {
            return RecoveryOutcome::default();
        }

        self.missions_completed = self.missions_completed.saturating_add(1);
        let mut restored_streak = None;
        if self.missions_completed >= self.missions_needed {
            let restored = self.restored_streak();
            learner.set_streak(restored);
            self.used = true;
            restored_streak = Some(restored);
        }

        RecoveryOutcome {
            advanced: true,
            restored_streak,
            ticket: Some(self.clone()),
        }
    }
}

/// One entry of the spaced-repetition backlog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewEntry {
    pub user_id: String,
    pub exercise: ExerciseKey,
    pub due_date: NaiveDate,
    pub interval_days: u32,
    pub updated_at: DateTime<Utc>,
}

impl ReviewEntry {
    /// Misses come back tomorrow; hits double the interval up to `max_interval_days`.
    pub fn schedule(
        previous: Option<&ReviewEntry>,
        user_id: impl Into<String>,
        exercise: ExerciseKey,
        correct: bool,
        today: NaiveDate,
        max_interval_days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let interval_days = if correct {
            let previous_interval = previous.map_or(1, |entry| entry.interval_days.max(1));
            previous_interval
                .saturating_mul(2)
                .min(max_interval_days.max(1))
        } else {
            1
        };

        Self {
            user_id: user_id.into(),
            exercise,
            due_date: today + Duration::days(i64::from(interval_days)),
            interval_days,
            updated_at: now,
        }
    }
}
