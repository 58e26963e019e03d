//! SQLite backend
//!
//! Definitions and schedules are stored as JSON bodies next to the columns
//! the queries filter on. The schedule table carries a partial unique index
//! over `(definition_id, institution_id)` limited to the occupying statuses;
//! it is the authoritative guard against duplicate scheduling.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use fritest_core::{
    Attempt, AttemptLog, BatchDirectory, Category, DefinitionFilter, DefinitionRepository,
    Difficulty, QuestionBank, QuestionRef, Schedule, ScheduleFilter, ScheduleRepository,
    StoreError, StudentId, TestDefinition,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS definitions (
    id          TEXT PRIMARY KEY,
    created_by  TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    body        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schedules (
    id              TEXT PRIMARY KEY,
    definition_id   TEXT NOT NULL,
    institution_id  TEXT NOT NULL,
    status          TEXT NOT NULL,
    scheduled_date  TEXT NOT NULL,
    body            TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_schedules_one_per_institution
    ON schedules(definition_id, institution_id)
    WHERE status IN ('scheduled', 'active', 'completed');

CREATE INDEX IF NOT EXISTS idx_schedules_institution
    ON schedules(institution_id, scheduled_date);

CREATE TABLE IF NOT EXISTS questions (
    id          TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    difficulty  TEXT NOT NULL,
    in_library  INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_questions_cell
    ON questions(category, difficulty)
    WHERE in_library = 1;

CREATE TABLE IF NOT EXISTS batch_members (
    institution_id  TEXT NOT NULL,
    batch_id        TEXT NOT NULL,
    student_id      TEXT NOT NULL,
    PRIMARY KEY (institution_id, batch_id, student_id)
);

CREATE TABLE IF NOT EXISTS attempts (
    schedule_id   TEXT NOT NULL,
    student_id    TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    completed_at  TEXT,
    PRIMARY KEY (schedule_id, student_id)
);
";

/// Map a rusqlite error, keeping constraint violations distinguishable
fn sql_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message.clone().unwrap_or_else(|| err.to_string()))
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

fn json_error(err: serde_json::Error) -> StoreError {
    StoreError::Serialization(err.to_string())
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{text}': {e}")))
}

fn parse_field<T: FromStr>(text: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    text.parse()
        .map_err(|e: T::Err| StoreError::Serialization(e.to_string()))
}

/// SQLite-backed implementation of every persistence trait
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(sql_error)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(sql_error)?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "opened fritest database");
        Ok(store)
    }

    /// A private in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(sql_error)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(sql_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("connection mutex poisoned: {e}")))
    }

    // ------------------------------------------------------------------
    // Seeding helpers for the question bank, batches and attempts. These
    // belong to neighbouring subsystems; the engine only reads them.
    // ------------------------------------------------------------------

    /// Insert or replace a question
    pub fn add_question(&self, question: &QuestionRef, in_library: bool) -> Result<(), StoreError> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO questions (id, category, difficulty, in_library)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    question.question_id,
                    question.category.as_str(),
                    question.difficulty.as_str(),
                    in_library
                ],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    /// Flag a question as usable (or not) for generation
    pub fn set_in_library(&self, question_id: &str, in_library: bool) -> Result<(), StoreError> {
        let changed = self
            .lock()?
            .execute(
                "UPDATE questions SET in_library = ?2 WHERE id = ?1",
                params![question_id, in_library],
            )
            .map_err(sql_error)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("question {question_id}")));
        }
        Ok(())
    }

    /// Put a student in an institution's batch
    pub fn add_batch_member(
        &self,
        institution: &str,
        batch: &str,
        student: &str,
    ) -> Result<(), StoreError> {
        self.lock()?
            .execute(
                "INSERT OR IGNORE INTO batch_members (institution_id, batch_id, student_id)
                 VALUES (?1, ?2, ?3)",
                params![institution, batch, student],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    /// Record that a student opened the test; a second start is ignored
    pub fn start_attempt(
        &self,
        schedule: &str,
        student: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.lock()?
            .execute(
                "INSERT OR IGNORE INTO attempts (schedule_id, student_id, started_at)
                 VALUES (?1, ?2, ?3)",
                params![schedule, student, timestamp(at)],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    /// Record completion, starting the attempt as well if it was never opened
    pub fn complete_attempt(
        &self,
        schedule: &str,
        student: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.lock()?
            .execute(
                "INSERT INTO attempts (schedule_id, student_id, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT (schedule_id, student_id)
                 DO UPDATE SET completed_at = excluded.completed_at",
                params![schedule, student, timestamp(at)],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    fn bodies<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(sql_error)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(sql_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(sql_error)
    }

    fn body<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Option<String>, StoreError> {
        self.lock()?
            .query_row(sql, params, |row| row.get::<_, String>(0))
            .optional()
            .map_err(sql_error)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl DefinitionRepository for SqliteStore {
    fn insert_definition(&self, definition: &TestDefinition) -> Result<(), StoreError> {
        let body = serde_json::to_string(definition).map_err(json_error)?;
        self.lock()?
            .execute(
                "INSERT INTO definitions (id, created_by, status, created_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    definition.id,
                    definition.created_by,
                    definition.status.as_str(),
                    timestamp(definition.created_at),
                    body
                ],
            )
            .map_err(sql_error)?;
        debug!(definition = %definition.id, "inserted definition");
        Ok(())
    }

    fn update_definition(&self, definition: &TestDefinition) -> Result<(), StoreError> {
        let body = serde_json::to_string(definition).map_err(json_error)?;
        let changed = self
            .lock()?
            .execute(
                "UPDATE definitions SET status = ?2, body = ?3 WHERE id = ?1",
                params![definition.id, definition.status.as_str(), body],
            )
            .map_err(sql_error)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("test definition {}", definition.id)));
        }
        Ok(())
    }

    fn get_definition(&self, id: &str) -> Result<Option<TestDefinition>, StoreError> {
        self.body("SELECT body FROM definitions WHERE id = ?1", params![id])?
            .map(|body| serde_json::from_str(&body).map_err(json_error))
            .transpose()
    }

    fn list_definitions(&self, filter: &DefinitionFilter) -> Result<Vec<TestDefinition>, StoreError> {
        self.bodies(
            "SELECT body FROM definitions
             WHERE (?1 IS NULL OR created_by = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC",
            params![filter.created_by.as_deref(), filter.status.map(|s| s.as_str())],
        )?
        .iter()
        .map(|body| serde_json::from_str(body).map_err(json_error))
        .collect()
    }
}

impl ScheduleRepository for SqliteStore {
    fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let body = serde_json::to_string(schedule).map_err(json_error)?;
        self.lock()?
            .execute(
                "INSERT INTO schedules
                    (id, definition_id, institution_id, status, scheduled_date, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    schedule.id,
                    schedule.definition_id,
                    schedule.institution_id,
                    schedule.status.as_str(),
                    timestamp(schedule.scheduled_date),
                    body
                ],
            )
            .map_err(sql_error)?;
        debug!(schedule = %schedule.id, "inserted schedule");
        Ok(())
    }

    fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let body = serde_json::to_string(schedule).map_err(json_error)?;
        let changed = self
            .lock()?
            .execute(
                "UPDATE schedules SET status = ?2, scheduled_date = ?3, body = ?4 WHERE id = ?1",
                params![
                    schedule.id,
                    schedule.status.as_str(),
                    timestamp(schedule.scheduled_date),
                    body
                ],
            )
            .map_err(sql_error)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("schedule {}", schedule.id)));
        }
        Ok(())
    }

    fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StoreError> {
        self.body("SELECT body FROM schedules WHERE id = ?1", params![id])?
            .map(|body| serde_json::from_str(&body).map_err(json_error))
            .transpose()
    }

    fn find_occupying(
        &self,
        definition: &str,
        institution: &str,
    ) -> Result<Option<Schedule>, StoreError> {
        self.body(
            "SELECT body FROM schedules
             WHERE definition_id = ?1 AND institution_id = ?2
               AND status IN ('scheduled', 'active', 'completed')",
            params![definition, institution],
        )?
        .map(|body| serde_json::from_str(&body).map_err(json_error))
        .transpose()
    }

    fn list_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>, StoreError> {
        self.bodies(
            "SELECT body FROM schedules
             WHERE (?1 IS NULL OR institution_id = ?1)
               AND (?2 IS NULL OR definition_id = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY scheduled_date DESC, id",
            params![
                filter.institution.as_deref(),
                filter.definition.as_deref(),
                filter.status.map(|s| s.as_str())
            ],
        )?
        .iter()
        .map(|body| serde_json::from_str(body).map_err(json_error))
        .collect()
    }
}

impl QuestionBank for SqliteStore {
    fn sample(
        &self,
        category: Category,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuestionRef>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, category, difficulty FROM questions
                 WHERE category = ?1 AND difficulty = ?2 AND in_library = 1
                 ORDER BY RANDOM()
                 LIMIT ?3",
            )
            .map_err(sql_error)?;
        let rows = stmt
            .query_map(
                params![category.as_str(), difficulty.as_str(), count as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .map_err(sql_error)?;

        let mut sampled = Vec::new();
        for row in rows {
            let (id, category, difficulty) = row.map_err(sql_error)?;
            sampled.push(QuestionRef::new(
                id,
                parse_field(&category)?,
                parse_field(&difficulty)?,
            ));
        }
        Ok(sampled)
    }

    fn available(&self, category: Category, difficulty: Difficulty) -> Result<usize, StoreError> {
        let count: i64 = self
            .lock()?
            .query_row(
                "SELECT COUNT(*) FROM questions
                 WHERE category = ?1 AND difficulty = ?2 AND in_library = 1",
                params![category.as_str(), difficulty.as_str()],
                |row| row.get(0),
            )
            .map_err(sql_error)?;
        Ok(count as usize)
    }
}

impl BatchDirectory for SqliteStore {
    fn resolve_batch_members(
        &self,
        institution: &str,
        batch: &str,
    ) -> Result<Vec<StudentId>, StoreError> {
        self.bodies(
            "SELECT student_id FROM batch_members
             WHERE institution_id = ?1 AND batch_id = ?2
             ORDER BY student_id",
            params![institution, batch],
        )
    }
}

impl AttemptLog for SqliteStore {
    fn find_attempt(&self, schedule: &str, student: &str) -> Result<Option<Attempt>, StoreError> {
        let row = self
            .lock()?
            .query_row(
                "SELECT started_at, completed_at FROM attempts
                 WHERE schedule_id = ?1 AND student_id = ?2",
                params![schedule, student],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()
            .map_err(sql_error)?;

        let Some((started_at, completed_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Attempt {
            schedule_id: schedule.to_string(),
            student_id: student.to_string(),
            started_at: parse_timestamp(&started_at)?,
            completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        assert!(timestamp(early) < timestamp(late));
        assert_eq!(parse_timestamp(&timestamp(late)).unwrap(), late);
    }

    #[test]
    fn constraint_violation_becomes_conflict() {
        let store = SqliteStore::in_memory().unwrap();
        let conn = store.lock().unwrap();
        conn.execute(
            "INSERT INTO batch_members VALUES ('i', 'b', 's')",
            [],
        )
        .unwrap();
        let err = conn
            .execute("INSERT INTO batch_members VALUES ('i', 'b', 's')", [])
            .unwrap_err();
        assert!(matches!(sql_error(err), StoreError::Conflict(_)));
    }

    #[test]
    fn unknown_category_is_a_serialization_error() {
        let err = parse_field::<Category>("history").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
