//! Persistence for the progression engine.
//!
//! The engine only talks to [`ProgressionStore`]. Reads are plain lookups; every write goes
//! through a [`WriteBatch`] that an adapter applies all-or-nothing, so a transition is either
//! fully persisted or not at all.

use chrono::{DateTime, NaiveDate, Utc};
use sqlquest_core::{
    DailyMission, ExerciseKey, Learner, ProgressRecord, RecoveryTicket, ReviewEntry, WeeklyQuest,
};
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, PROGRESSION_SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("store lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Learner(Learner),
    Progress(ProgressRecord),
    /// Inserts the mission; an existing row only takes the new completed count.
    Mission(DailyMission),
    Quest(WeeklyQuest),
    Recovery(RecoveryTicket),
    Review(ReviewEntry),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_learner(&mut self, learner: &Learner) {
        self.ops.push(WriteOp::Learner(learner.clone()));
    }

    pub fn put_progress(&mut self, record: &ProgressRecord) {
        self.ops.push(WriteOp::Progress(record.clone()));
    }

    pub fn put_mission(&mut self, mission: &DailyMission) {
        self.ops.push(WriteOp::Mission(mission.clone()));
    }

    pub fn put_quest(&mut self, quest: &WeeklyQuest) {
        self.ops.push(WriteOp::Quest(quest.clone()));
    }

    pub fn put_recovery(&mut self, ticket: &RecoveryTicket) {
        self.ops.push(WriteOp::Recovery(ticket.clone()));
    }

    pub fn put_review(&mut self, entry: &ReviewEntry) {
        self.ops.push(WriteOp::Review(entry.clone()));
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub trait ProgressionStore: Send + Sync {
    fn learner(&self, user_id: &str) -> Result<Option<Learner>, StorageError>;

    fn progress(
        &self,
        user_id: &str,
        exercise: ExerciseKey,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    fn progress_for_learner(&self, user_id: &str) -> Result<Vec<ProgressRecord>, StorageError>;

    fn daily_mission(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyMission>, StorageError>;

    fn weekly_quest(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyQuest>, StorageError>;

    /// Most recently created ticket, used or not.
    fn latest_recovery_ticket(&self, user_id: &str)
        -> Result<Option<RecoveryTicket>, StorageError>;

    /// Most recently created ticket that has been redeemed.
    fn latest_used_recovery_ticket(
        &self,
        user_id: &str,
    ) -> Result<Option<RecoveryTicket>, StorageError>;

    fn review(
        &self,
        user_id: &str,
        exercise: ExerciseKey,
    ) -> Result<Option<ReviewEntry>, StorageError>;

    /// Backlog entries due on or before `date`, earliest due date first.
    fn due_reviews(&self, user_id: &str, date: NaiveDate)
        -> Result<Vec<ReviewEntry>, StorageError>;

    fn commit(&self, batch: &WriteBatch) -> Result<(), StorageError>;
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}
