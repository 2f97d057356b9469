use crate::{ProgressionStore, StorageError, WriteBatch, WriteOp};
use chrono::NaiveDate;
use sqlquest_core::{
    DailyMission, ExerciseKey, Learner, ProgressRecord, RecoveryTicket, ReviewEntry, WeeklyQuest,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    learners: BTreeMap<String, Learner>,
    progress: BTreeMap<(String, ExerciseKey), ProgressRecord>,
    missions: BTreeMap<(String, NaiveDate), DailyMission>,
    quests: BTreeMap<(String, NaiveDate), WeeklyQuest>,
    // Insertion order breaks ties between tickets created at the same instant.
    tickets: Vec<RecoveryTicket>,
    reviews: BTreeMap<(String, ExerciseKey), ReviewEntry>,
}

impl MemoryState {
    fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::Learner(learner) => {
                self.learners
                    .insert(learner.user_id.clone(), learner.clone());
            }
            WriteOp::Progress(record) => {
                self.progress
                    .insert((record.user_id.clone(), record.exercise), record.clone());
            }
            WriteOp::Mission(mission) => {
                self.missions
                    .entry((mission.user_id.clone(), mission.date))
                    .and_modify(|existing| existing.completed_count = mission.completed_count)
                    .or_insert_with(|| mission.clone());
            }
            WriteOp::Quest(quest) => {
                self.quests
                    .insert((quest.user_id.clone(), quest.week_start), quest.clone());
            }
            WriteOp::Recovery(ticket) => {
                match self
                    .tickets
                    .iter_mut()
                    .find(|existing| existing.ticket_id == ticket.ticket_id)
                {
                    Some(existing) => {
                        existing.missions_completed = ticket.missions_completed;
                        existing.used = ticket.used;
                    }
                    None => self.tickets.push(ticket.clone()),
                }
            }
            WriteOp::Review(entry) => {
                self.reviews
                    .insert((entry.user_id.clone(), entry.exercise), entry.clone());
            }
        }
    }

    fn latest_ticket<'a>(
        &'a self,
        user_id: &str,
        predicate: impl Fn(&RecoveryTicket) -> bool,
    ) -> Option<&'a RecoveryTicket> {
        self.tickets
            .iter()
            .filter(|ticket| ticket.user_id == user_id && predicate(*ticket))
            .fold(None, |best, ticket| match best {
                Some(best) if best.created_at > ticket.created_at => Some(best),
                _ => Some(ticket),
            })
    }
}

/// In-process adapter. Every batch is applied under a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl ProgressionStore for MemoryStore {
    fn learner(&self, user_id: &str) -> Result<Option<Learner>, StorageError> {
        Ok(self.lock()?.learners.get(user_id).cloned())
    }

    fn progress(
        &self,
        user_id: &str,
        exercise: ExerciseKey,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        Ok(self
            .lock()?
            .progress
            .get(&(user_id.to_string(), exercise))
            .cloned())
    }

    fn progress_for_learner(&self, user_id: &str) -> Result<Vec<ProgressRecord>, StorageError> {
        Ok(self
            .lock()?
            .progress
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn daily_mission(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyMission>, StorageError> {
        Ok(self
            .lock()?
            .missions
            .get(&(user_id.to_string(), date))
            .cloned())
    }

    fn weekly_quest(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyQuest>, StorageError> {
        Ok(self
            .lock()?
            .quests
            .get(&(user_id.to_string(), week_start))
            .cloned())
    }

    fn latest_recovery_ticket(
        &self,
        user_id: &str,
    ) -> Result<Option<RecoveryTicket>, StorageError> {
        Ok(self.lock()?.latest_ticket(user_id, |_| true).cloned())
    }

    fn latest_used_recovery_ticket(
        &self,
        user_id: &str,
    ) -> Result<Option<RecoveryTicket>, StorageError> {
        Ok(self
            .lock()?
            .latest_ticket(user_id, |ticket| ticket.used)
            .cloned())
    }

    fn review(
        &self,
        user_id: &str,
        exercise: ExerciseKey,
    ) -> Result<Option<ReviewEntry>, StorageError> {
        Ok(self
            .lock()?
            .reviews
            .get(&(user_id.to_string(), exercise))
            .cloned())
    }

    fn due_reviews(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ReviewEntry>, StorageError> {
        let mut entries = self
            .lock()?
            .reviews
            .values()
            .filter(|entry| entry.user_id == user_id && entry.due_date <= date)
            .cloned()
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| (entry.due_date, entry.exercise));
        Ok(entries)
    }

    fn commit(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        for op in batch.ops() {
            state.apply(op);
        }
        Ok(())
    }
}
