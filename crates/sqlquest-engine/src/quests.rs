use crate::{EngineError, LearnerTxn, ProgressionEngine};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;
use sqlquest_core::progression::week_start;
use sqlquest_core::{QuestReward, WeeklyQuest};
use sqlquest_storage::WriteBatch;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestProgress {
    pub quest: WeeklyQuest,
    /// Set only on the call that completed the quest and claimed its reward.
    pub reward_granted: Option<QuestReward>,
}

impl ProgressionEngine {
    /// Returns the quest for the week containing `week_of`, creating it on first read.
    /// Any date inside the week resolves to the same Sunday key.
    pub fn get_or_create_quest(
        &self,
        user_id: &str,
        week_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WeeklyQuest, EngineError> {
        let week = week_start(week_of);
        self.serialized(user_id, || {
            if let Some(quest) = self.store.weekly_quest(user_id, week)? {
                return Ok(quest);
            }
            let quest = WeeklyQuest::new(user_id, week, now);
            let mut batch = WriteBatch::new();
            batch.put_quest(&quest);
            self.store.commit(&batch)?;
            Ok(quest)
        })
    }

    /// Counts one mission toward the current week outside the daily mission flow.
    ///
    /// Mission advances already count toward the quest, so callers that also use this
    /// entry point for the same work will count it twice.
    pub fn complete_weekly_quest(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<QuestProgress, EngineError> {
        self.serialized(user_id, || {
            let mut txn = self.begin(user_id, now)?;
            let progress = self.record_quest_mission_in(&mut txn, now)?;
            self.commit(txn)?;
            Ok(progress)
        })
    }

    pub(crate) fn record_quest_mission_in(
        &self,
        txn: &mut LearnerTxn,
        now: DateTime<Utc>,
    ) -> Result<QuestProgress, EngineError> {
        let week = week_start(now.date_naive());
        let mut quest = match self.store.weekly_quest(txn.user_id(), week)? {
            Some(quest) => quest,
            None => WeeklyQuest::new(txn.user_id(), week, now),
        };

        let mut reward_granted = None;
        if quest.record_mission() {
            let reward = self.with_rng(|rng| QuestReward::from_coin(rng.gen_bool(0.5)));
            if quest.claim_reward(reward, &mut txn.learner) {
                info!(
                    event = "quest_reward_granted",
                    user_id = txn.user_id(),
                    week_start = %week,
                    reward = %reward,
                    total_xp = txn.learner.total_xp,
                    shields = txn.learner.streak_shields
                );
                reward_granted = Some(reward);
            }
        }

        txn.batch.put_quest(&quest);
        Ok(QuestProgress {
            quest,
            reward_granted,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{EngineConfig, ProgressionEngine};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use sqlquest_core::progression::{QUEST_XP_REWARD, WEEKLY_MISSIONS_TARGET};
    use sqlquest_core::{QuestReward, UniformCatalog};
    use sqlquest_storage::{MemoryStore, ProgressionStore};
    use std::sync::Arc;

    // Wednesday; the week starts on Sunday 2026-03-01.
    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn sunday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date")
    }

    fn engine(seed: u64) -> (Arc<MemoryStore>, ProgressionEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = ProgressionEngine::new(
            store.clone(),
            Arc::new(UniformCatalog::default()),
            EngineConfig {
                rng_seed: Some(seed),
                ..EngineConfig::default()
            },
        );
        (store, engine)
    }

    #[test]
    fn quest_is_created_once_per_week() {
        let (_store, engine) = engine(1);
        let first = engine
            .get_or_create_quest("u1", ts().date_naive(), ts())
            .expect("quest");
        assert_eq!(first.week_start, sunday());
        assert_eq!(first.missions_target, WEEKLY_MISSIONS_TARGET);

        let again = engine
            .get_or_create_quest("u1", sunday(), ts() + Duration::days(1))
            .expect("quest");
        assert_eq!(again, first);
    }

    #[test]
    fn twelfth_completion_grants_exactly_one_reward() {
        for seed in [1, 2, 3, 4] {
            let (store, engine) = engine(seed);
            for _ in 0..WEEKLY_MISSIONS_TARGET - 1 {
                let progress = engine.complete_weekly_quest("u1", ts()).expect("complete");
                assert_eq!(progress.reward_granted, None);
                assert!(!progress.quest.completed);
            }

            let progress = engine.complete_weekly_quest("u1", ts()).expect("complete");
            assert!(progress.quest.completed);
            assert!(progress.quest.reward_claimed);
            let reward = progress.reward_granted.expect("reward granted");
            assert_eq!(progress.quest.reward, Some(reward));

            let learner = store.learner("u1").expect("load").expect("learner");
            match reward {
                QuestReward::StreakShield => assert_eq!(learner.streak_shields, 1),
                QuestReward::BonusXp => {
                    assert_eq!(learner.total_xp, QUEST_XP_REWARD);
                    assert_eq!(learner.level, 2);
                }
            }

            let extra = engine.complete_weekly_quest("u1", ts()).expect("complete");
            assert_eq!(extra.reward_granted, None);
            assert_eq!(extra.quest.missions_completed, WEEKLY_MISSIONS_TARGET + 1);
            assert_eq!(store.learner("u1").expect("load"), Some(learner));
        }
    }

    #[test]
    fn next_week_starts_a_fresh_quest() {
        let (store, engine) = engine(5);
        engine.complete_weekly_quest("u1", ts()).expect("complete");
        let next = engine
            .complete_weekly_quest("u1", ts() + Duration::days(5))
            .expect("complete");
        assert_eq!(next.quest.missions_completed, 1);
        assert_eq!(next.quest.week_start, sunday() + Duration::days(7));
        let first = store
            .weekly_quest("u1", sunday())
            .expect("load")
            .expect("quest");
        assert_eq!(first.missions_completed, 1);
    }
}
