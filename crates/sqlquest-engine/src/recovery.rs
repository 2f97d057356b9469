use crate::{EngineError, LearnerTxn, ProgressionEngine};
use chrono::{DateTime, Utc};
use sqlquest_core::progression::RECOVERY_MIN_STREAK;
use sqlquest_core::{RecoveryOutcome, RecoveryTicket};
use sqlquest_storage::WriteBatch;
use tracing::{debug, info};

impl ProgressionEngine {
    /// Opens a recovery ticket for a streak that just broke. Returns `None` when the streak
    /// is too short or a ticket was redeemed within the cooldown window.
    pub fn try_open_recovery(
        &self,
        user_id: &str,
        broken_streak: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<RecoveryTicket>, EngineError> {
        self.serialized(user_id, || {
            let mut batch = WriteBatch::new();
            let ticket = self.open_recovery_in(user_id, &mut batch, broken_streak, now)?;
            self.store.commit(&batch)?;
            Ok(ticket)
        })
    }

    /// Latest ticket for the user if it is unused and its deadline has not passed.
    pub fn get_active_recovery(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RecoveryTicket>, EngineError> {
        Ok(self
            .store
            .latest_recovery_ticket(user_id)?
            .filter(|ticket| ticket.is_active(now)))
    }

    pub fn advance_recovery(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RecoveryOutcome, EngineError> {
        self.serialized(user_id, || {
            let mut txn = self.begin(user_id, now)?;
            let outcome = self.advance_recovery_in(&mut txn, now)?;
            if outcome.advanced {
                self.commit(txn)?;
            }
            Ok(outcome)
        })
    }

    pub(crate) fn open_recovery_in(
        &self,
        user_id: &str,
        batch: &mut WriteBatch,
        broken_streak: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<RecoveryTicket>, EngineError> {
        if broken_streak < RECOVERY_MIN_STREAK {
            return Ok(None);
        }
        if let Some(used) = self.store.latest_used_recovery_ticket(user_id)? {
            if used.blocks_new_ticket(now) {
                debug!(
                    event = "recovery_cooldown",
                    user_id,
                    ticket_id = %used.ticket_id
                );
                return Ok(None);
            }
        }

        let ticket = RecoveryTicket::open(user_id, broken_streak, now);
        batch.put_recovery(&ticket);
        info!(
            event = "recovery_opened",
            user_id,
            ticket_id = %ticket.ticket_id,
            broken_streak,
            deadline = %ticket.deadline
        );
        Ok(Some(ticket))
    }

    pub(crate) fn advance_recovery_in(
        &self,
        txn: &mut LearnerTxn,
        now: DateTime<Utc>,
    ) -> Result<RecoveryOutcome, EngineError> {
        let Some(mut ticket) = self.store.latest_recovery_ticket(txn.user_id())? else {
            return Ok(RecoveryOutcome::default());
        };
        let outcome = ticket.advance(&mut txn.learner, now);
        if !outcome.advanced {
            return Ok(outcome);
        }

        txn.batch.put_recovery(&ticket);
        if let Some(restored) = outcome.restored_streak {
            info!(
                event = "recovery_restored",
                user_id = txn.user_id(),
                ticket_id = %ticket.ticket_id,
                restored_streak = restored
            );
        }
        Ok(outcome)
    }
}
