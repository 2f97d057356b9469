use crate::{EngineError, LearnerTxn, ProgressionEngine, QuestProgress};
use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use sqlquest_core::progression::MISSION_SLOTS;
use sqlquest_core::{DailyMission, ExerciseKey, RecoveryOutcome, ReviewEntry};
use sqlquest_storage::WriteBatch;
use tracing::{debug, info};

/// Redraws allowed per slot before a duplicate pick is accepted.
const FILL_RETRIES: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissionCompletion {
    pub completed_count: u8,
    pub advanced: bool,
    pub mission: Option<DailyMission>,
    pub quest: Option<QuestProgress>,
    pub recovery: RecoveryOutcome,
}

impl ProgressionEngine {
    /// Returns the user's missions for `date`, generating them on first read.
    ///
    /// Due review entries fill slots first (earliest due date first, ties shuffled); the rest
    /// are drawn uniformly from the catalog.
    pub fn get_or_create_missions(
        &self,
        user_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DailyMission, EngineError> {
        self.serialized(user_id, || {
            if let Some(mission) = self.store.daily_mission(user_id, date)? {
                return Ok(mission);
            }

            let levels = self.stocked_levels();
            let due = self.store.due_reviews(user_id, date)?;
            let from_backlog = due.len().min(MISSION_SLOTS);
            if from_backlog < MISSION_SLOTS && levels.is_empty() {
                return Err(EngineError::EmptyCatalog);
            }

            let slots = self.with_rng(|rng| pick_slots(due, &levels, rng));
            let mission = DailyMission::new(user_id, date, slots, now);
            let mut batch = WriteBatch::new();
            batch.put_mission(&mission);
            self.store.commit(&batch)?;

            info!(
                event = "missions_generated",
                user_id,
                date = %date,
                from_backlog,
                slots = %slot_list(&mission.slots)
            );
            Ok(mission)
        })
    }

    /// Advances the mission for `date` when `exercise` is the next unfilled slot. A date with
    /// no generated mission is a no-op with a zero count.
    pub fn complete_mission(
        &self,
        user_id: &str,
        date: NaiveDate,
        exercise: ExerciseKey,
        now: DateTime<Utc>,
    ) -> Result<MissionCompletion, EngineError> {
        self.serialized(user_id, || {
            let mut txn = self.begin(user_id, now)?;
            let completion = self.complete_mission_in(&mut txn, date, exercise, now)?;
            if completion.advanced {
                self.commit(txn)?;
            }
            Ok(completion)
        })
    }

    pub(crate) fn complete_mission_in(
        &self,
        txn: &mut LearnerTxn,
        date: NaiveDate,
        exercise: ExerciseKey,
        now: DateTime<Utc>,
    ) -> Result<MissionCompletion, EngineError> {
        let Some(mut mission) = self.store.daily_mission(txn.user_id(), date)? else {
            debug!(event = "mission_missing", user_id = txn.user_id(), date = %date);
            return Ok(MissionCompletion::default());
        };

        if !mission.advance(exercise) {
            return Ok(MissionCompletion {
                completed_count: mission.completed_count,
                mission: Some(mission),
                ..MissionCompletion::default()
            });
        }

        txn.batch.put_mission(&mission);
        info!(
            event = "mission_advanced",
            user_id = txn.user_id(),
            date = %date,
            exercise = %exercise,
            completed_count = mission.completed_count
        );

        let quest = self.record_quest_mission_in(txn, now)?;
        let recovery = self.advance_recovery_in(txn, now)?;
        Ok(MissionCompletion {
            completed_count: mission.completed_count,
            advanced: true,
            mission: Some(mission),
            quest: Some(quest),
            recovery,
        })
    }

    /// `(level_id, question_count)` for every level that has at least one question.
    fn stocked_levels(&self) -> Vec<(u32, u32)> {
        (1..=self.catalog.level_count())
            .filter_map(|level_id| {
                let questions = self.catalog.questions_in_level(level_id);
                (questions > 0).then_some((level_id, questions))
            })
            .collect()
    }
}

/// Callers guarantee `levels` is non-empty whenever the backlog cannot fill every slot.
fn pick_slots(
    mut due: Vec<ReviewEntry>,
    levels: &[(u32, u32)],
    rng: &mut StdRng,
) -> [ExerciseKey; MISSION_SLOTS] {
    due.shuffle(rng);
    // Stable, so entries sharing a due date keep their shuffled order.
    due.sort_by_key(|entry| entry.due_date);

    let mut backlog = due.into_iter().map(|entry| entry.exercise);
    let mut taken: Vec<ExerciseKey> = Vec::with_capacity(MISSION_SLOTS);
    std::array::from_fn(|_| {
        let pick = match backlog.next() {
            Some(exercise) => exercise,
            None => draw_fresh(levels, &taken, rng),
        };
        taken.push(pick);
        pick
    })
}

fn draw_fresh(levels: &[(u32, u32)], taken: &[ExerciseKey], rng: &mut StdRng) -> ExerciseKey {
    let mut pick = draw_uniform(levels, rng);
    for _ in 0..FILL_RETRIES {
        if !taken.contains(&pick) {
            break;
        }
        pick = draw_uniform(levels, rng);
    }
    pick
}

fn draw_uniform(levels: &[(u32, u32)], rng: &mut StdRng) -> ExerciseKey {
    let (level_id, questions) = levels[rng.gen_range(0..levels.len())];
    ExerciseKey {
        level_id,
        question_id: rng.gen_range(1..=questions),
    }
}

fn slot_list(slots: &[ExerciseKey]) -> String {
    slots
        .iter()
        .map(ExerciseKey::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
