//! Schedule Management
//!
//! Orchestrates one institution's scheduling of a test definition:
//!
//! 1. The definition must be active, open at `now`, and targeted to the
//!    institution
//! 2. No other non-cancelled schedule may exist for the pair
//! 3. Requested dates must lie inside the definition's window
//! 4. The roster is resolved from explicit students and batch members
//! 5. The generator runs exactly once; nothing is written if it fails
//! 6. The schedule is persisted; the store's uniqueness constraint is the
//!    final word on duplicates
//!
//! The frozen question list is never regenerated. Updates may touch dates,
//! faculty, instructions, roster and forward status only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fritest_core::{
    BatchDirectory, BatchId, Category, DefinitionError, DefinitionFilter, DefinitionRepository,
    DefinitionStatus, Difficulty, FacultyId, InstitutionRef, QuestionBank, Schedule,
    ScheduleFilter, ScheduleId, ScheduleRepository, ScheduleStatus, StoreError, StudentId,
    TestDefinition,
};

use crate::generator::{GenerationError, Generator};

/// Errors from scheduling operations
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Test definition {definition} is already scheduled for institution {institution}")]
    AlreadyScheduled {
        definition: String,
        institution: String,
        /// The schedule holding the slot, when it could be identified
        existing: Option<ScheduleId>,
    },

    #[error("Window violation: {0}")]
    WindowViolation(String),

    #[error(
        "Not enough {category}/{difficulty} questions: required {required}, available {available}"
    )]
    InsufficientQuestions {
        category: Category,
        difficulty: Difficulty,
        required: usize,
        available: usize,
    },

    #[error("Invalid test definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<GenerationError> for ScheduleError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InvalidDefinition(e) => ScheduleError::InvalidDefinition(e),
            GenerationError::InsufficientQuestions {
                category,
                difficulty,
                required,
                available,
            } => ScheduleError::InsufficientQuestions {
                category,
                difficulty,
                required,
                available,
            },
            GenerationError::DuplicateQuestion(id) => ScheduleError::Store(StoreError::Backend(
                format!("question bank returned '{id}' more than once"),
            )),
            GenerationError::Bank(e) => ScheduleError::Store(e),
        }
    }
}

/// What an institution asks for when scheduling
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_faculty: Option<FacultyId>,
    #[serde(default)]
    pub assigned_students: Vec<StudentId>,
    #[serde(default)]
    pub assigned_batches: Vec<BatchId>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl ScheduleRequest {
    /// A request for the given date with nobody assigned yet
    pub fn on(scheduled_date: DateTime<Utc>) -> Self {
        Self {
            scheduled_date,
            ..Self::default()
        }
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.scheduled_end_date = Some(end);
        self
    }

    pub fn faculty(mut self, faculty: impl Into<String>) -> Self {
        self.assigned_faculty = Some(faculty.into());
        self
    }

    pub fn student(mut self, student: impl Into<String>) -> Self {
        self.assigned_students.push(student.into());
        self
    }

    pub fn batch(mut self, batch: impl Into<String>) -> Self {
        self.assigned_batches.push(batch.into());
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(text.into());
        self
    }
}

/// Partial edit of an existing schedule; `None` leaves a field untouched
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub scheduled_date: Option<DateTime<Utc>>,
    /// `Some(None)` removes the end date
    pub scheduled_end_date: Option<Option<DateTime<Utc>>>,
    /// `Some(None)` removes the assigned faculty
    pub assigned_faculty: Option<Option<FacultyId>>,
    pub assigned_students: Option<Vec<StudentId>>,
    pub assigned_batches: Option<Vec<BatchId>>,
    /// `Some(None)` removes the instructions
    pub instructions: Option<Option<String>>,
    pub status: Option<ScheduleStatus>,
}

impl ScheduleUpdate {
    fn touches_roster(&self) -> bool {
        self.assigned_students.is_some() || self.assigned_batches.is_some()
    }
}

/// A definition as seen by one institution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvailableDefinition {
    pub definition: TestDefinition,
    /// The institution already holds a non-cancelled schedule for it
    pub is_scheduled: bool,
}

/// Definition detail with the institution's current schedule, if any
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefinitionDetail {
    pub definition: TestDefinition,
    pub schedule: Option<Schedule>,
}

/// Per-institution scheduling service
pub struct ScheduleManager<'a> {
    definitions: &'a dyn DefinitionRepository,
    schedules: &'a dyn ScheduleRepository,
    bank: &'a dyn QuestionBank,
    batches: &'a dyn BatchDirectory,
    generator: Generator,
}

impl<'a> ScheduleManager<'a> {
    pub fn new(
        definitions: &'a dyn DefinitionRepository,
        schedules: &'a dyn ScheduleRepository,
        bank: &'a dyn QuestionBank,
        batches: &'a dyn BatchDirectory,
        generator: Generator,
    ) -> Self {
        Self {
            definitions,
            schedules,
            bank,
            batches,
            generator,
        }
    }

    /// Definitions the institution may schedule right now, newest first
    pub fn available_definitions(
        &self,
        institution: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailableDefinition>, ScheduleError> {
        let mut open: Vec<TestDefinition> = self
            .definitions
            .list_definitions(&DefinitionFilter {
                status: Some(DefinitionStatus::Active),
                ..DefinitionFilter::default()
            })?
            .into_iter()
            .filter(|d| d.is_available_to(institution, now))
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let scheduled: HashSet<String> = self
            .schedules
            .list_schedules(&ScheduleFilter {
                institution: Some(institution.to_string()),
                ..ScheduleFilter::default()
            })?
            .into_iter()
            .filter(|s| s.status.occupies_slot())
            .map(|s| s.definition_id)
            .collect();

        Ok(open
            .into_iter()
            .map(|definition| AvailableDefinition {
                is_scheduled: scheduled.contains(&definition.id),
                definition,
            })
            .collect())
    }

    /// One available definition together with the institution's schedule for it
    pub fn definition_detail(
        &self,
        definition_id: &str,
        institution: &str,
        now: DateTime<Utc>,
    ) -> Result<DefinitionDetail, ScheduleError> {
        let definition = self.open_definition(definition_id, institution, now)?;
        let schedule = self.schedules.find_occupying(definition_id, institution)?;
        Ok(DefinitionDetail {
            definition,
            schedule,
        })
    }

    /// Schedule a definition for an institution and freeze its question list
    pub fn schedule(
        &self,
        definition_id: &str,
        institution: &InstitutionRef,
        request: ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Schedule, ScheduleError> {
        let definition = self.open_definition(definition_id, &institution.id, now)?;

        if let Some(existing) = self.schedules.find_occupying(definition_id, &institution.id)? {
            return Err(ScheduleError::AlreadyScheduled {
                definition: definition_id.to_string(),
                institution: institution.id.clone(),
                existing: Some(existing.id),
            });
        }

        check_dates(&definition, request.scheduled_date, request.scheduled_end_date)?;

        let roster = self.resolve_roster(
            &institution.id,
            &request.assigned_students,
            &request.assigned_batches,
        )?;

        let generated_questions = self.generator.generate(&definition, self.bank)?;

        let schedule = Schedule {
            id: Uuid::new_v4().to_string(),
            definition_id: definition.id.clone(),
            institution_id: institution.id.clone(),
            institution_name: institution.name.clone(),
            scheduled_date: request.scheduled_date,
            scheduled_end_date: request.scheduled_end_date,
            assigned_faculty: request.assigned_faculty,
            assigned_students: request.assigned_students,
            assigned_batches: request.assigned_batches,
            total_assigned_students: roster.len(),
            roster,
            generated_questions,
            status: ScheduleStatus::Scheduled,
            instructions: request.instructions,
            total_attempted: 0,
            total_completed: 0,
            created_at: now,
            updated_at: now,
        };

        match self.schedules.insert_schedule(&schedule) {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                // Lost the race against a concurrent request for the same pair
                warn!(
                    definition = %definition_id,
                    institution = %institution.id,
                    %reason,
                    "schedule rejected by uniqueness constraint"
                );
                let existing = self
                    .schedules
                    .find_occupying(definition_id, &institution.id)
                    .ok()
                    .flatten()
                    .map(|s| s.id);
                return Err(ScheduleError::AlreadyScheduled {
                    definition: definition_id.to_string(),
                    institution: institution.id.clone(),
                    existing,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            schedule = %schedule.id,
            definition = %definition_id,
            institution = %institution.id,
            students = schedule.total_assigned_students,
            questions = schedule.generated_questions.len(),
            "scheduled test"
        );
        Ok(schedule)
    }

    /// Edit a scheduled or active schedule. The question list is left as is.
    pub fn update(
        &self,
        schedule_id: &str,
        institution: &str,
        update: ScheduleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Schedule, ScheduleError> {
        let mut schedule = self.get(schedule_id, institution)?;
        if !schedule.status.is_editable() {
            return Err(ScheduleError::InvalidState(format!(
                "cannot update a {} schedule",
                schedule.status
            )));
        }

        if let Some(next) = update.status {
            if !schedule.status.can_transition_to(next) {
                return Err(ScheduleError::InvalidState(format!(
                    "cannot move schedule from {} to {}",
                    schedule.status, next
                )));
            }
        }

        if update.scheduled_date.is_some() || update.scheduled_end_date.is_some() {
            let definition = self
                .definitions
                .get_definition(&schedule.definition_id)?
                .ok_or_else(|| {
                    ScheduleError::NotFound(format!("test definition {}", schedule.definition_id))
                })?;
            let start = update.scheduled_date.unwrap_or(schedule.scheduled_date);
            let end = update
                .scheduled_end_date
                .unwrap_or(schedule.scheduled_end_date);
            check_dates(&definition, start, end)?;
            schedule.scheduled_date = start;
            schedule.scheduled_end_date = end;
        }

        if update.touches_roster() {
            let students = update
                .assigned_students
                .clone()
                .unwrap_or_else(|| schedule.assigned_students.clone());
            let batches = update
                .assigned_batches
                .clone()
                .unwrap_or_else(|| schedule.assigned_batches.clone());
            schedule.roster = self.resolve_roster(institution, &students, &batches)?;
            schedule.total_assigned_students = schedule.roster.len();
            schedule.assigned_students = students;
            schedule.assigned_batches = batches;
        }

        if let Some(faculty) = update.assigned_faculty {
            schedule.assigned_faculty = faculty;
        }
        if let Some(instructions) = update.instructions {
            schedule.instructions = instructions;
        }
        if let Some(status) = update.status {
            schedule.status = status;
        }
        schedule.updated_at = now;

        self.schedules.update_schedule(&schedule)?;
        debug!(schedule = %schedule.id, status = %schedule.status, "updated schedule");
        Ok(schedule)
    }

    /// Cancel a schedule, freeing the (definition, institution) pair
    pub fn cancel(
        &self,
        schedule_id: &str,
        institution: &str,
        now: DateTime<Utc>,
    ) -> Result<Schedule, ScheduleError> {
        let mut schedule = self.get(schedule_id, institution)?;
        match schedule.status {
            ScheduleStatus::Completed => {
                return Err(ScheduleError::InvalidState(
                    "cannot cancel a completed schedule".into(),
                ))
            }
            ScheduleStatus::Cancelled => return Ok(schedule),
            ScheduleStatus::Scheduled | ScheduleStatus::Active => {}
        }

        schedule.status = ScheduleStatus::Cancelled;
        schedule.updated_at = now;
        self.schedules.update_schedule(&schedule)?;
        info!(schedule = %schedule.id, institution, "cancelled schedule");
        Ok(schedule)
    }

    /// The institution's schedules, latest date first
    pub fn list(
        &self,
        institution: &str,
        status: Option<ScheduleStatus>,
    ) -> Result<Vec<Schedule>, ScheduleError> {
        Ok(self.schedules.list_schedules(&ScheduleFilter {
            institution: Some(institution.to_string()),
            status,
            ..ScheduleFilter::default()
        })?)
    }

    /// A schedule owned by the institution
    pub fn get(&self, schedule_id: &str, institution: &str) -> Result<Schedule, ScheduleError> {
        self.schedules
            .get_schedule(schedule_id)?
            .filter(|s| s.institution_id == institution)
            .ok_or_else(|| ScheduleError::NotFound(format!("schedule {schedule_id}")))
    }

    fn open_definition(
        &self,
        definition_id: &str,
        institution: &str,
        now: DateTime<Utc>,
    ) -> Result<TestDefinition, ScheduleError> {
        let definition = self
            .definitions
            .get_definition(definition_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("test definition {definition_id}")))?;

        if definition.status != DefinitionStatus::Active {
            return Err(ScheduleError::Forbidden(format!(
                "test definition {definition_id} is {}",
                definition.status
            )));
        }
        if !definition.window.contains(now) {
            return Err(ScheduleError::Forbidden(format!(
                "test definition {definition_id} is not open at {now}"
            )));
        }
        if !definition.is_targeted_to(institution) {
            return Err(ScheduleError::Forbidden(format!(
                "test definition {definition_id} is not offered to institution {institution}"
            )));
        }
        Ok(definition)
    }

    fn resolve_roster(
        &self,
        institution: &str,
        students: &[StudentId],
        batches: &[BatchId],
    ) -> Result<BTreeSet<StudentId>, ScheduleError> {
        let mut roster: BTreeSet<StudentId> = students
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        for batch in batches {
            let members = self.batches.resolve_batch_members(institution, batch)?;
            debug!(institution, batch = %batch, members = members.len(), "resolved batch");
            roster.extend(members);
        }
        Ok(roster)
    }
}

fn check_dates(
    definition: &TestDefinition,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> Result<(), ScheduleError> {
    let window = definition.window;
    if !window.contains(start) {
        return Err(ScheduleError::WindowViolation(format!(
            "scheduled date {start} is outside {} .. {}",
            window.from, window.to
        )));
    }
    if let Some(end) = end {
        if !window.contains(end) {
            return Err(ScheduleError::WindowViolation(format!(
                "scheduled end date {end} is outside {} .. {}",
                window.from, window.to
            )));
        }
        if end < start {
            return Err(ScheduleError::WindowViolation(format!(
                "scheduled end date {end} is before scheduled date {start}"
            )));
        }
    }
    Ok(())
}
