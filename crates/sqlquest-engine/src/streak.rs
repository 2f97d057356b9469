use crate::{EngineError, ProgressionEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlquest_core::progression::LoginOutcome;
use sqlquest_core::{Learner, RecoveryTicket};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginReport {
    pub learner: Learner,
    pub outcome: LoginOutcome,
    /// Whole UTC days since the previous login; `None` on the first one.
    pub gap_days: Option<i64>,
    pub recovery_opened: Option<RecoveryTicket>,
}

impl ProgressionEngine {
    /// Applies one login to the user's streak, creating the learner on first contact.
    ///
    /// A streak of seven or more that breaks without a shield also tries to open a recovery
    /// ticket in the same commit.
    pub fn process_login(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginReport, EngineError> {
        self.serialized(user_id, || {
            let mut txn = self.begin(user_id, now)?;
            let transition = txn.learner.process_login(now.date_naive());
            txn.learner = transition.learner;

            match transition.outcome {
                LoginOutcome::StreakBroken { previous_streak } => {
                    info!(event = "streak_broken", user_id, previous_streak);
                }
                LoginOutcome::Continued {
                    shield_awarded: true,
                } => {
                    info!(
                        event = "shield_awarded",
                        user_id,
                        streak = txn.learner.current_streak
                    );
                }
                LoginOutcome::ShieldConsumed => {
                    info!(
                        event = "shield_consumed",
                        user_id,
                        shields_left = txn.learner.streak_shields
                    );
                }
                _ => {}
            }

            let recovery_opened = match transition.recovery_candidate {
                Some(broken_streak) => {
                    self.open_recovery_in(user_id, &mut txn.batch, broken_streak, now)?
                }
                None => None,
            };

            let learner = self.commit(txn)?;
            info!(
                event = "login_processed",
                user_id,
                streak = learner.current_streak,
                max_streak = learner.max_streak,
                shields = learner.streak_shields,
                gap_days = ?transition.gap_days
            );
            Ok(LoginReport {
                learner,
                outcome: transition.outcome,
                gap_days: transition.gap_days,
                recovery_opened,
            })
        })
    }
}
