use crate::{format_timestamp, ProgressionStore, StorageError, WriteBatch, WriteOp};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sqlquest_core::{
    DailyMission, ExerciseKey, Learner, ProgressRecord, QuestReward, RecoveryTicket, ReviewEntry,
    WeeklyQuest,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const PROGRESSION_SCHEMA_VERSION: i64 = 2;

const DATE_FORMAT: &str = "%Y-%m-%d";

const LEARNER_COLUMNS: &str = "user_id, total_xp, level, current_streak, max_streak, \
     streak_shields, last_login_date, created_at";
const PROGRESS_COLUMNS: &str = "user_id, level_id, question_id, completed, attempts, \
     hints_used, xp_earned, completed_at, updated_at";
const MISSION_COLUMNS: &str =
    "user_id, mission_date, slot1, slot2, slot3, completed_count, created_at";
const QUEST_COLUMNS: &str = "user_id, week_start, missions_target, missions_completed, \
     completed, reward_claimed, reward, created_at";
const TICKET_COLUMNS: &str = "ticket_id, user_id, broken_streak, created_at, deadline, \
     missions_needed, missions_completed, used";
const REVIEW_COLUMNS: &str =
    "user_id, level_id, question_id, due_date, interval_days, updated_at";

/// SQLite adapter. One connection guarded by a mutex; batches run in a transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        let conn = self.lock()?;
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let mut current = self.schema_version()?;
        if current > PROGRESSION_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: PROGRESSION_SCHEMA_VERSION,
            });
        }

        let conn = self.lock()?;
        if current < 1 {
            let sql = include_str!("../migrations/0001_progression_schema.sql");
            conn.execute_batch(sql)?;
            conn.execute("PRAGMA user_version = 1", []).map(|_| ())?;
            current = 1;
        }

        if current < 2 {
            let sql = include_str!("../migrations/0002_review_backlog.sql");
            conn.execute_batch(sql)?;
            conn.execute("PRAGMA user_version = 2", []).map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

impl ProgressionStore for SqliteStore {
    fn learner(&self, user_id: &str) -> Result<Option<Learner>, StorageError> {
        let conn = self.lock()?;
        let learner = conn
            .query_row(
                &format!("SELECT {LEARNER_COLUMNS} FROM learners WHERE user_id = ?1"),
                [user_id],
                learner_from_row,
            )
            .optional()?;
        Ok(learner)
    }

    fn progress(
        &self,
        user_id: &str,
        exercise: ExerciseKey,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {PROGRESS_COLUMNS} FROM progress_records
                     WHERE user_id = ?1 AND level_id = ?2 AND question_id = ?3"
                ),
                params![
                    user_id,
                    i64::from(exercise.level_id),
                    i64::from(exercise.question_id)
                ],
                progress_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn progress_for_learner(&self, user_id: &str) -> Result<Vec<ProgressRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress_records
             WHERE user_id = ?1
             ORDER BY level_id ASC, question_id ASC"
        ))?;
        let records = stmt
            .query_map([user_id], progress_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn daily_mission(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyMission>, StorageError> {
        let conn = self.lock()?;
        let mission = conn
            .query_row(
                &format!(
                    "SELECT {MISSION_COLUMNS} FROM daily_missions
                     WHERE user_id = ?1 AND mission_date = ?2"
                ),
                params![user_id, format_date(date)],
                mission_from_row,
            )
            .optional()?;
        Ok(mission)
    }

    fn weekly_quest(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyQuest>, StorageError> {
        let conn = self.lock()?;
        let quest = conn
            .query_row(
                &format!(
                    "SELECT {QUEST_COLUMNS} FROM weekly_quests
                     WHERE user_id = ?1 AND week_start = ?2"
                ),
                params![user_id, format_date(week_start)],
                quest_from_row,
            )
            .optional()?;
        Ok(quest)
    }

    fn latest_recovery_ticket(
        &self,
        user_id: &str,
    ) -> Result<Option<RecoveryTicket>, StorageError> {
        let conn = self.lock()?;
        let ticket = conn
            .query_row(
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM recovery_tickets
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                [user_id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    fn latest_used_recovery_ticket(
        &self,
        user_id: &str,
    ) -> Result<Option<RecoveryTicket>, StorageError> {
        let conn = self.lock()?;
        let ticket = conn
            .query_row(
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM recovery_tickets
                     WHERE user_id = ?1 AND used = 1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                [user_id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    fn review(
        &self,
        user_id: &str,
        exercise: ExerciseKey,
    ) -> Result<Option<ReviewEntry>, StorageError> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {REVIEW_COLUMNS} FROM review_entries
                     WHERE user_id = ?1 AND level_id = ?2 AND question_id = ?3"
                ),
                params![
                    user_id,
                    i64::from(exercise.level_id),
                    i64::from(exercise.question_id)
                ],
                review_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn due_reviews(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ReviewEntry>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_entries
             WHERE user_id = ?1 AND due_date <= ?2
             ORDER BY due_date ASC, level_id ASC, question_id ASC"
        ))?;
        let entries = stmt
            .query_map(params![user_id, format_date(date)], review_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn commit(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for op in batch.ops() {
            match op {
                WriteOp::Learner(learner) => write_learner(&tx, learner)?,
                WriteOp::Progress(record) => write_progress(&tx, record)?,
                WriteOp::Mission(mission) => write_mission(&tx, mission)?,
                WriteOp::Quest(quest) => write_quest(&tx, quest)?,
                WriteOp::Recovery(ticket) => write_ticket(&tx, ticket)?,
                WriteOp::Review(entry) => write_review(&tx, entry)?,
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn write_learner(conn: &Connection, learner: &Learner) -> Result<(), StorageError> {
    conn.execute(
        "
        INSERT INTO learners (
            user_id,
            total_xp,
            level,
            current_streak,
            max_streak,
            streak_shields,
            last_login_date,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(user_id) DO UPDATE SET
            total_xp=excluded.total_xp,
            level=excluded.level,
            current_streak=excluded.current_streak,
            max_streak=excluded.max_streak,
            streak_shields=excluded.streak_shields,
            last_login_date=excluded.last_login_date
        ",
        params![
            learner.user_id,
            to_sql_u64(learner.total_xp),
            i64::from(learner.level),
            i64::from(learner.current_streak),
            i64::from(learner.max_streak),
            i64::from(learner.streak_shields),
            learner.last_login_date.map(format_date),
            format_timestamp(learner.created_at),
        ],
    )?;
    Ok(())
}

fn write_progress(conn: &Connection, record: &ProgressRecord) -> Result<(), StorageError> {
    conn.execute(
        "
        INSERT INTO progress_records (
            user_id,
            level_id,
            question_id,
            completed,
            attempts,
            hints_used,
            xp_earned,
            completed_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(user_id, level_id, question_id) DO UPDATE SET
            completed=excluded.completed,
            attempts=excluded.attempts,
            hints_used=excluded.hints_used,
            xp_earned=excluded.xp_earned,
            completed_at=excluded.completed_at,
            updated_at=excluded.updated_at
        ",
        params![
            record.user_id,
            i64::from(record.exercise.level_id),
            i64::from(record.exercise.question_id),
            record.completed,
            i64::from(record.attempts),
            i64::from(record.hints_used),
            to_sql_u64(record.xp_earned),
            record.completed_at.map(format_timestamp),
            format_timestamp(record.updated_at),
        ],
    )?;
    Ok(())
}

fn write_mission(conn: &Connection, mission: &DailyMission) -> Result<(), StorageError> {
    let [slot1, slot2, slot3] = mission.slots;
    conn.execute(
        "
        INSERT INTO daily_missions (
            user_id,
            mission_date,
            slot1,
            slot2,
            slot3,
            completed_count,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(user_id, mission_date) DO UPDATE SET
            completed_count=excluded.completed_count
        ",
        params![
            mission.user_id,
            format_date(mission.date),
            slot1.to_string(),
            slot2.to_string(),
            slot3.to_string(),
            i64::from(mission.completed_count),
            format_timestamp(mission.created_at),
        ],
    )?;
    Ok(())
}

fn write_quest(conn: &Connection, quest: &WeeklyQuest) -> Result<(), StorageError> {
    conn.execute(
        "
        INSERT INTO weekly_quests (
            user_id,
            week_start,
            missions_target,
            missions_completed,
            completed,
            reward_claimed,
            reward,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(user_id, week_start) DO UPDATE SET
            missions_target=excluded.missions_target,
            missions_completed=excluded.missions_completed,
            completed=excluded.completed,
            reward_claimed=excluded.reward_claimed,
            reward=excluded.reward
        ",
        params![
            quest.user_id,
            format_date(quest.week_start),
            i64::from(quest.missions_target),
            i64::from(quest.missions_completed),
            quest.completed,
            quest.reward_claimed,
            quest.reward.map(|reward| reward.as_str()),
            format_timestamp(quest.created_at),
        ],
    )?;
    Ok(())
}

fn write_ticket(conn: &Connection, ticket: &RecoveryTicket) -> Result<(), StorageError> {
    conn.execute(
        "
        INSERT INTO recovery_tickets (
            ticket_id,
            user_id,
            broken_streak,
            created_at,
            deadline,
            missions_needed,
            missions_completed,
            used
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(ticket_id) DO UPDATE SET
            missions_completed=excluded.missions_completed,
            used=excluded.used
        ",
        params![
            ticket.ticket_id,
            ticket.user_id,
            i64::from(ticket.broken_streak),
            format_timestamp(ticket.created_at),
            format_timestamp(ticket.deadline),
            i64::from(ticket.missions_needed),
            i64::from(ticket.missions_completed),
            ticket.used,
        ],
    )?;
    Ok(())
}

fn write_review(conn: &Connection, entry: &ReviewEntry) -> Result<(), StorageError> {
    conn.execute(
        "
        INSERT INTO review_entries (
            user_id,
            level_id,
            question_id,
            due_date,
            interval_days,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(user_id, level_id, question_id) DO UPDATE SET
            due_date=excluded.due_date,
            interval_days=excluded.interval_days,
            updated_at=excluded.updated_at
        ",
        params![
            entry.user_id,
            i64::from(entry.exercise.level_id),
            i64::from(entry.exercise.question_id),
            format_date(entry.due_date),
            i64::from(entry.interval_days),
            format_timestamp(entry.updated_at),
        ],
    )?;
    Ok(())
}

fn learner_from_row(row: &Row<'_>) -> rusqlite::Result<Learner> {
    let last_login_date = row
        .get::<_, Option<String>>(6)?
        .map(|value| parse_date_column(6, &value))
        .transpose()?;
    Ok(Learner {
        user_id: row.get(0)?,
        total_xp: u64_column(row, 1)?,
        level: u32_column(row, 2)?,
        current_streak: u32_column(row, 3)?,
        max_streak: u32_column(row, 4)?,
        streak_shields: u32_column(row, 5)?,
        last_login_date,
        created_at: parse_timestamp_column(7, &row.get::<_, String>(7)?)?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ProgressRecord> {
    let completed_at = row
        .get::<_, Option<String>>(7)?
        .map(|value| parse_timestamp_column(7, &value))
        .transpose()?;
    Ok(ProgressRecord {
        user_id: row.get(0)?,
        exercise: ExerciseKey {
            level_id: u32_column(row, 1)?,
            question_id: u32_column(row, 2)?,
        },
        completed: row.get(3)?,
        attempts: u32_column(row, 4)?,
        hints_used: u32_column(row, 5)?,
        xp_earned: u64_column(row, 6)?,
        completed_at,
        updated_at: parse_timestamp_column(8, &row.get::<_, String>(8)?)?,
    })
}

fn mission_from_row(row: &Row<'_>) -> rusqlite::Result<DailyMission> {
    let completed_count = row.get::<_, i64>(5)?;
    Ok(DailyMission {
        user_id: row.get(0)?,
        date: parse_date_column(1, &row.get::<_, String>(1)?)?,
        slots: [
            exercise_column(row, 2)?,
            exercise_column(row, 3)?,
            exercise_column(row, 4)?,
        ],
        completed_count: u8::try_from(completed_count)
            .map_err(|err| conversion_error(5, err))?,
        created_at: parse_timestamp_column(6, &row.get::<_, String>(6)?)?,
    })
}

fn quest_from_row(row: &Row<'_>) -> rusqlite::Result<WeeklyQuest> {
    let reward = row
        .get::<_, Option<String>>(6)?
        .map(|value| {
            value
                .parse::<QuestReward>()
                .map_err(|err| conversion_error(6, err))
        })
        .transpose()?;
    Ok(WeeklyQuest {
        user_id: row.get(0)?,
        week_start: parse_date_column(1, &row.get::<_, String>(1)?)?,
        missions_target: u32_column(row, 2)?,
        missions_completed: u32_column(row, 3)?,
        completed: row.get(4)?,
        reward_claimed: row.get(5)?,
        reward,
        created_at: parse_timestamp_column(7, &row.get::<_, String>(7)?)?,
    })
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<RecoveryTicket> {
    Ok(RecoveryTicket {
        ticket_id: row.get(0)?,
        user_id: row.get(1)?,
        broken_streak: u32_column(row, 2)?,
        created_at: parse_timestamp_column(3, &row.get::<_, String>(3)?)?,
        deadline: parse_timestamp_column(4, &row.get::<_, String>(4)?)?,
        missions_needed: u32_column(row, 5)?,
        missions_completed: u32_column(row, 6)?,
        used: row.get(7)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewEntry> {
    Ok(ReviewEntry {
        user_id: row.get(0)?,
        exercise: ExerciseKey {
            level_id: u32_column(row, 1)?,
            question_id: u32_column(row, 2)?,
        },
        due_date: parse_date_column(3, &row.get::<_, String>(3)?)?,
        interval_days: u32_column(row, 4)?,
        updated_at: parse_timestamp_column(5, &row.get::<_, String>(5)?)?,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn to_sql_u64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn u32_column(row: &Row<'_>, index: usize) -> rusqlite::Result<u32> {
    let value = row.get::<_, i64>(index)?;
    u32::try_from(value).map_err(|err| conversion_error(index, err))
}

fn u64_column(row: &Row<'_>, index: usize) -> rusqlite::Result<u64> {
    let value = row.get::<_, i64>(index)?;
    u64::try_from(value).map_err(|err| conversion_error(index, err))
}

fn exercise_column(row: &Row<'_>, index: usize) -> rusqlite::Result<ExerciseKey> {
    row.get::<_, String>(index)?
        .parse::<ExerciseKey>()
        .map_err(|err| conversion_error(index, err))
}

fn parse_date_column(index: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|err| conversion_error(index, err))
}

fn parse_timestamp_column(index: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| conversion_error(index, err))
}

fn conversion_error(
    index: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::NamedTempFile;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
    }

    fn key(level_id: u32, question_id: u32) -> ExerciseKey {
        ExerciseKey {
            level_id,
            question_id,
        }
    }

    #[test]
    fn migration_creates_progression_tables() {
        let db = SqliteStore::open_in_memory().expect("open db");

        for table in [
            "learners",
            "progress_records",
            "daily_missions",
            "weekly_quests",
            "recovery_tickets",
            "review_entries",
        ] {
            assert!(db.table_exists(table).expect("table check"));
        }

        assert_eq!(
            db.schema_version().expect("schema version"),
            PROGRESSION_SCHEMA_VERSION
        );
    }

    #[test]
    fn migrate_rejects_newer_schema() {
        let file = NamedTempFile::new().expect("temp file");
        {
            let conn = Connection::open(file.path()).expect("open raw");
            conn.execute("PRAGMA user_version = 99", [])
                .expect("bump version");
        }

        let result = SqliteStore::open(file.path());
        assert!(matches!(
            result,
            Err(StorageError::UnsupportedSchemaVersion { found: 99, .. })
        ));
    }

    #[test]
    fn learner_and_progress_roundtrip() {
        let db = SqliteStore::open_in_memory().expect("open db");
        let mut learner = Learner::new("u1", ts());
        learner.add_xp(150);
        learner.current_streak = 3;
        learner.max_streak = 8;
        learner.last_login_date = Some(day(2));
        let record = ProgressRecord::first_attempt("u1", key(2, 4), true, 8, 1, ts());

        let mut batch = WriteBatch::new();
        batch.put_learner(&learner);
        batch.put_progress(&record);
        db.commit(&batch).expect("commit");

        assert_eq!(db.learner("u1").expect("learner"), Some(learner));
        assert_eq!(db.progress("u1", key(2, 4)).expect("progress"), Some(record.clone()));
        assert_eq!(db.progress("u1", key(2, 5)).expect("progress"), None);
        assert_eq!(
            db.progress_for_learner("u1").expect("progress list"),
            vec![record]
        );
        assert_eq!(db.learner("nobody").expect("learner"), None);
    }

    #[test]
    fn mission_upsert_keeps_original_slots() {
        let db = SqliteStore::open_in_memory().expect("open db");
        let mission = DailyMission::new("u1", day(2), [key(1, 1), key(1, 2), key(1, 3)], ts());
        let mut batch = WriteBatch::new();
        batch.put_mission(&mission);
        db.commit(&batch).expect("commit");

        let mut replacement = mission.clone();
        replacement.slots = [key(9, 9), key(9, 8), key(9, 7)];
        replacement.completed_count = 1;
        let mut batch = WriteBatch::new();
        batch.put_mission(&replacement);
        db.commit(&batch).expect("commit");

        let stored = db
            .daily_mission("u1", day(2))
            .expect("mission")
            .expect("mission exists");
        assert_eq!(stored.slots, mission.slots);
        assert_eq!(stored.completed_count, 1);
        assert_eq!(db.daily_mission("u1", day(3)).expect("mission"), None);
    }

    #[test]
    fn quest_roundtrip_with_reward() {
        let db = SqliteStore::open_in_memory().expect("open db");
        let mut quest = WeeklyQuest::new("u1", day(1), ts());
        quest.missions_completed = 12;
        quest.completed = true;
        quest.reward_claimed = true;
        quest.reward = Some(QuestReward::StreakShield);
        let mut batch = WriteBatch::new();
        batch.put_quest(&quest);
        db.commit(&batch).expect("commit");

        assert_eq!(db.weekly_quest("u1", day(1)).expect("quest"), Some(quest));
    }

    #[test]
    fn latest_tickets_are_ordered_by_creation() {
        let db = SqliteStore::open_in_memory().expect("open db");
        let mut older = RecoveryTicket::open("u1", 9, ts());
        older.used = true;
        older.missions_completed = 5;
        let newer = RecoveryTicket::open("u1", 12, ts() + Duration::days(40));

        let mut batch = WriteBatch::new();
        batch.put_recovery(&newer);
        batch.put_recovery(&older);
        db.commit(&batch).expect("commit");

        assert_eq!(
            db.latest_recovery_ticket("u1").expect("latest"),
            Some(newer)
        );
        assert_eq!(
            db.latest_used_recovery_ticket("u1").expect("latest used"),
            Some(older)
        );
        assert_eq!(db.latest_recovery_ticket("u2").expect("latest"), None);
    }

    #[test]
    fn due_reviews_filter_and_order() {
        let db = SqliteStore::open_in_memory().expect("open db");
        let mut batch = WriteBatch::new();
        for (exercise, due) in [(key(1, 1), day(5)), (key(1, 2), day(3)), (key(1, 3), day(9))] {
            batch.put_review(&ReviewEntry {
                user_id: "u1".to_string(),
                exercise,
                due_date: due,
                interval_days: 1,
                updated_at: ts(),
            });
        }
        db.commit(&batch).expect("commit");

        let due = db.due_reviews("u1", day(5)).expect("due");
        let keys = due.iter().map(|entry| entry.exercise).collect::<Vec<_>>();
        assert_eq!(keys, vec![key(1, 2), key(1, 1)]);
        assert_eq!(
            db.review("u1", key(1, 3)).expect("review").map(|e| e.due_date),
            Some(day(9))
        );
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let file = NamedTempFile::new().expect("temp file");
        {
            let db = SqliteStore::open(file.path()).expect("open db");
            let mut batch = WriteBatch::new();
            batch.put_learner(&Learner::new("u1", ts()));
            db.commit(&batch).expect("commit");
        }

        let reopened = SqliteStore::open(file.path()).expect("reopen");
        assert!(reopened.learner("u1").expect("learner").is_some());
        assert_eq!(
            reopened.schema_version().expect("version"),
            PROGRESSION_SCHEMA_VERSION
        );
    }
}
