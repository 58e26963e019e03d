//! Admin-side management of test definitions.
//!
//! Definitions are scoped to the admin who authored them. Deleting archives.
//! Once any schedule references a definition its composition is frozen and
//! only its status may change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use fritest_core::{
    AttemptLog, AvailabilityWindow, Category, CategoryTargets, DefinitionError, DefinitionFilter,
    DefinitionRepository, DefinitionStatus, Difficulty, DifficultyTargets, InstitutionId,
    QuestionBank, ScheduleFilter, ScheduleId, ScheduleRepository, ScheduleStatus, StoreError,
    TestDefinition,
};

use crate::generator::{AllocationPlan, GenerationError, Generator};
use crate::progress::ProgressTracker;

/// Errors from definition management
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Test definition not found: {0}")]
    NotFound(String),

    #[error("Test definition {0} is referenced by a schedule; only its status can change")]
    Immutable(String),

    #[error("Invalid test definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error(
        "Not enough {category}/{difficulty} questions: required {required}, available {available}"
    )]
    InsufficientQuestions {
        category: Category,
        difficulty: Difficulty,
        required: usize,
        available: usize,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<GenerationError> for CatalogError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InvalidDefinition(e) => CatalogError::InvalidDefinition(e),
            GenerationError::InsufficientQuestions {
                category,
                difficulty,
                required,
                available,
            } => CatalogError::InsufficientQuestions {
                category,
                difficulty,
                required,
                available,
            },
            GenerationError::DuplicateQuestion(id) => CatalogError::Store(StoreError::Backend(
                format!("question bank returned '{id}' more than once"),
            )),
            GenerationError::Bank(e) => CatalogError::Store(e),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_duration() -> u32 {
    60
}

/// Body of a new definition as an admin submits it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub total_questions: u32,
    pub category_targets: CategoryTargets,
    #[serde(default)]
    pub difficulty_targets: DifficultyTargets,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    pub available_from: DateTime<Utc>,
    pub available_to: DateTime<Utc>,
    #[serde(default)]
    pub target_institutions: BTreeSet<InstitutionId>,
    #[serde(default = "default_true")]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub show_results_immediately: bool,
    #[serde(default)]
    pub allow_review: bool,
}

/// Partial edit of a definition; absent fields are left untouched
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub total_questions: Option<u32>,
    pub category_targets: Option<CategoryTargets>,
    pub difficulty_targets: Option<DifficultyTargets>,
    pub duration_minutes: Option<u32>,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    pub target_institutions: Option<BTreeSet<InstitutionId>>,
    pub shuffle_questions: Option<bool>,
    pub show_results_immediately: Option<bool>,
    pub allow_review: Option<bool>,
    pub status: Option<DefinitionStatus>,
}

impl DefinitionEdit {
    /// A status change and nothing else
    pub fn status(status: DefinitionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn is_status_only(&self) -> bool {
        *self
            == Self {
                status: self.status,
                ..Self::default()
            }
    }

    fn apply(self, definition: &mut TestDefinition) {
        if let Some(name) = self.name {
            definition.name = name;
        }
        if let Some(description) = self.description {
            definition.description = Some(description);
        }
        if let Some(total) = self.total_questions {
            definition.total_questions = total;
        }
        if let Some(targets) = self.category_targets {
            definition.category_targets = targets;
        }
        if let Some(targets) = self.difficulty_targets {
            definition.difficulty_targets = targets;
        }
        if let Some(minutes) = self.duration_minutes {
            definition.duration_minutes = minutes;
        }
        if let Some(from) = self.available_from {
            definition.window.from = from;
        }
        if let Some(to) = self.available_to {
            definition.window.to = to;
        }
        if let Some(targets) = self.target_institutions {
            definition.target_institutions = targets;
        }
        if let Some(shuffle) = self.shuffle_questions {
            definition.shuffle_questions = shuffle;
        }
        if let Some(show) = self.show_results_immediately {
            definition.show_results_immediately = show;
        }
        if let Some(review) = self.allow_review {
            definition.allow_review = review;
        }
        if let Some(status) = self.status {
            definition.status = status;
        }
    }
}

/// Listing options for an admin's definitions
#[derive(Clone, Debug, Default)]
pub struct DefinitionQuery {
    pub status: Option<DefinitionStatus>,
    /// Also return definitions whose window closed before `now`
    pub include_expired: bool,
}

/// One schedule line in [`DefinitionStats`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStats {
    pub schedule_id: ScheduleId,
    pub institution_id: InstitutionId,
    pub institution_name: String,
    pub scheduled_date: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub assigned_students: usize,
    pub completed: usize,
}

/// Uptake of one definition across institutions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionStats {
    pub definition_id: String,
    /// Institutions holding a non-cancelled schedule
    pub total_institutions_scheduled: usize,
    pub total_students_assigned: usize,
    pub total_completed: usize,
    /// Every schedule, cancelled ones included, latest date first
    pub schedules: Vec<ScheduleStats>,
}

/// Admin-facing definition service
pub struct DefinitionCatalog<'a> {
    definitions: &'a dyn DefinitionRepository,
    schedules: &'a dyn ScheduleRepository,
    bank: &'a dyn QuestionBank,
    generator: Generator,
}

impl<'a> DefinitionCatalog<'a> {
    pub fn new(
        definitions: &'a dyn DefinitionRepository,
        schedules: &'a dyn ScheduleRepository,
        bank: &'a dyn QuestionBank,
        generator: Generator,
    ) -> Self {
        Self {
            definitions,
            schedules,
            bank,
            generator,
        }
    }

    /// Validate, check the bank can supply every cell, and store as active
    pub fn create(
        &self,
        draft: DefinitionDraft,
        admin_id: &str,
        admin_username: &str,
        now: DateTime<Utc>,
    ) -> Result<TestDefinition, CatalogError> {
        let definition = TestDefinition {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            description: draft.description,
            total_questions: draft.total_questions,
            category_targets: draft.category_targets,
            difficulty_targets: draft.difficulty_targets,
            duration_minutes: draft.duration_minutes,
            window: AvailabilityWindow::new(draft.available_from, draft.available_to),
            target_institutions: draft.target_institutions,
            shuffle_questions: draft.shuffle_questions,
            show_results_immediately: draft.show_results_immediately,
            allow_review: draft.allow_review,
            status: DefinitionStatus::Active,
            created_by: admin_id.to_string(),
            created_by_username: admin_username.to_string(),
            created_at: now,
            updated_at: now,
        };

        let plan = self.generator.check_supply(&definition, self.bank)?;
        self.definitions.insert_definition(&definition)?;

        info!(
            definition = %definition.id,
            admin = admin_username,
            questions = definition.total_questions,
            drift = plan.drift,
            "created test definition"
        );
        Ok(definition)
    }

    /// Apply a partial edit. Referenced definitions accept status edits only;
    /// any other edit must still be suppliable by the bank.
    pub fn edit(
        &self,
        id: &str,
        admin_id: &str,
        edit: DefinitionEdit,
        now: DateTime<Utc>,
    ) -> Result<TestDefinition, CatalogError> {
        let mut definition = self.get(id, admin_id)?;
        let status_only = edit.is_status_only();

        if !status_only && self.is_referenced(id)? {
            warn!(definition = id, "rejected edit of referenced definition");
            return Err(CatalogError::Immutable(id.to_string()));
        }

        edit.apply(&mut definition);
        if status_only {
            definition.validate()?;
        } else {
            self.generator.check_supply(&definition, self.bank)?;
        }
        definition.updated_at = now;
        self.definitions.update_definition(&definition)?;

        info!(definition = id, status = %definition.status, "updated test definition");
        Ok(definition)
    }

    /// A definition authored by `admin_id`
    pub fn get(&self, id: &str, admin_id: &str) -> Result<TestDefinition, CatalogError> {
        self.definitions
            .get_definition(id)?
            .filter(|d| d.created_by == admin_id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// The admin's definitions, newest first
    pub fn list(
        &self,
        admin_id: &str,
        query: &DefinitionQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<TestDefinition>, CatalogError> {
        let mut definitions: Vec<TestDefinition> = self
            .definitions
            .list_definitions(&DefinitionFilter {
                created_by: Some(admin_id.to_string()),
                status: query.status,
            })?
            .into_iter()
            .filter(|d| query.include_expired || d.window.to >= now)
            .collect();
        definitions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(definitions)
    }

    /// Soft delete
    pub fn archive(
        &self,
        id: &str,
        admin_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TestDefinition, CatalogError> {
        self.edit(id, admin_id, DefinitionEdit::status(DefinitionStatus::Archived), now)
    }

    /// Allocation plan and supply check for an existing definition
    pub fn plan(&self, id: &str, admin_id: &str) -> Result<AllocationPlan, CatalogError> {
        let definition = self.get(id, admin_id)?;
        Ok(self.generator.check_supply(&definition, self.bank)?)
    }

    /// Per-institution uptake. Completion counts come from the attempt log.
    pub fn stats(
        &self,
        id: &str,
        admin_id: &str,
        attempts: &dyn AttemptLog,
    ) -> Result<DefinitionStats, CatalogError> {
        let definition = self.get(id, admin_id)?;
        let tracker = ProgressTracker::new(attempts);

        let schedules = self.schedules.list_schedules(&ScheduleFilter {
            definition: Some(definition.id.clone()),
            ..ScheduleFilter::default()
        })?;

        let mut stats = DefinitionStats {
            definition_id: definition.id,
            total_institutions_scheduled: 0,
            total_students_assigned: 0,
            total_completed: 0,
            schedules: Vec::with_capacity(schedules.len()),
        };

        for schedule in schedules {
            let completed = tracker.summarize(&schedule)?.completed;
            if schedule.status.occupies_slot() {
                stats.total_institutions_scheduled += 1;
                stats.total_students_assigned += schedule.total_assigned_students;
                stats.total_completed += completed;
            }
            stats.schedules.push(ScheduleStats {
                schedule_id: schedule.id,
                institution_id: schedule.institution_id,
                institution_name: schedule.institution_name,
                scheduled_date: schedule.scheduled_date,
                status: schedule.status,
                assigned_students: schedule.total_assigned_students,
                completed,
            });
        }
        Ok(stats)
    }

    fn is_referenced(&self, id: &str) -> Result<bool, StoreError> {
        let schedules = self.schedules.list_schedules(&ScheduleFilter {
            definition: Some(id.to_string()),
            ..ScheduleFilter::default()
        })?;
        Ok(!schedules.is_empty())
    }
}
