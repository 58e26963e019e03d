//! # fritest-core
//!
//! Core domain model and traits for the fritest scheduling engine.
//!
//! This crate provides:
//! - Domain types: `TestDefinition`, `Schedule`, `GeneratedQuestion`, `Attempt`
//! - Collaborator traits: `QuestionBank`, `BatchDirectory`, `AttemptLog`,
//!   `DefinitionRepository`, `ScheduleRepository`
//! - Validation and error types
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use fritest_core::{CategoryTargets, DifficultyTargets, TestDefinition};
//!
//! let definition = TestDefinition::new("fri-2026", "Readiness 2026")
//!     .questions(40)
//!     .categories(CategoryTargets::new(50, 30, 20))
//!     .difficulties(DifficultyTargets::new(40, 40, 20))
//!     .window(
//!         Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
//!         Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap(),
//!     );
//!
//! assert!(definition.validate().is_ok());
//! ```

pub mod progress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a test definition
pub type DefinitionId = String;

/// Unique identifier for a schedule
pub type ScheduleId = String;

/// Unique identifier for an institution
pub type InstitutionId = String;

/// Unique identifier for a student
pub type StudentId = String;

/// Unique identifier for a faculty member
pub type FacultyId = String;

/// Unique identifier for a batch of students
pub type BatchId = String;

/// Unique identifier for a question in the bank
pub type QuestionId = String;

// ============================================================================
// Classification
// ============================================================================

/// Subject category of a question
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Aptitude,
    Technical,
    Psychometric,
}

impl Category {
    /// All categories, in generation order
    pub const ALL: [Category; 3] = [Category::Aptitude, Category::Technical, Category::Psychometric];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Aptitude => "aptitude",
            Category::Technical => "technical",
            Category::Psychometric => "psychometric",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aptitude" => Ok(Category::Aptitude),
            "technical" => Ok(Category::Technical),
            "psychometric" => Ok(Category::Psychometric),
            other => Err(ParseError::UnknownValue {
                kind: "category",
                value: other.to_string(),
            }),
        }
    }
}

/// Difficulty level of a question
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// All difficulties, in generation order
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ParseError::UnknownValue {
                kind: "difficulty",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Percentage of questions per category (must sum to 100)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTargets {
    pub aptitude: u8,
    pub technical: u8,
    pub psychometric: u8,
}

impl CategoryTargets {
    pub const fn new(aptitude: u8, technical: u8, psychometric: u8) -> Self {
        Self {
            aptitude,
            technical,
            psychometric,
        }
    }

    pub fn get(&self, category: Category) -> u8 {
        match category {
            Category::Aptitude => self.aptitude,
            Category::Technical => self.technical,
            Category::Psychometric => self.psychometric,
        }
    }

    pub fn sum(&self) -> u32 {
        u32::from(self.aptitude) + u32::from(self.technical) + u32::from(self.psychometric)
    }
}

/// Percentage of questions per difficulty (must sum to 100)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyTargets {
    pub easy: u8,
    pub medium: u8,
    pub hard: u8,
}

impl DifficultyTargets {
    pub const fn new(easy: u8, medium: u8, hard: u8) -> Self {
        Self { easy, medium, hard }
    }

    pub fn get(&self, difficulty: Difficulty) -> u8 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn sum(&self) -> u32 {
        u32::from(self.easy) + u32::from(self.medium) + u32::from(self.hard)
    }
}

impl Default for DifficultyTargets {
    fn default() -> Self {
        Self::new(33, 34, 33)
    }
}

/// Which of the two percentage partitions a validation failure refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Category,
    Difficulty,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Category => write!(f, "category"),
            TargetKind::Difficulty => write!(f, "difficulty"),
        }
    }
}

// ============================================================================
// Availability Window
// ============================================================================

/// Period during which institutions may schedule and conduct a test
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl AvailabilityWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Inclusive at both ends
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }

    pub fn is_well_formed(&self) -> bool {
        self.from < self.to
    }
}

// ============================================================================
// Test Definition
// ============================================================================

/// Lifecycle status of a test definition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionStatus {
    Draft,
    #[default]
    Active,
    Expired,
    Archived,
}

impl DefinitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionStatus::Draft => "draft",
            DefinitionStatus::Active => "active",
            DefinitionStatus::Expired => "expired",
            DefinitionStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefinitionStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(DefinitionStatus::Draft),
            "active" => Ok(DefinitionStatus::Active),
            "expired" => Ok(DefinitionStatus::Expired),
            "archived" => Ok(DefinitionStatus::Archived),
            other => Err(ParseError::UnknownValue {
                kind: "definition status",
                value: other.to_string(),
            }),
        }
    }
}

/// Admin-authored test template expressed as percentage targets
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Unique identifier
    pub id: DefinitionId,
    /// Human-readable name
    pub name: String,
    pub description: Option<String>,
    /// Number of questions every generated schedule should carry
    pub total_questions: u32,
    pub category_targets: CategoryTargets,
    pub difficulty_targets: DifficultyTargets,
    /// Time allowed per attempt
    pub duration_minutes: u32,
    /// Scheduling window
    pub window: AvailabilityWindow,
    /// Institutions allowed to schedule (empty = all)
    pub target_institutions: BTreeSet<InstitutionId>,
    pub shuffle_questions: bool,
    pub show_results_immediately: bool,
    pub allow_review: bool,
    pub status: DefinitionStatus,
    /// Admin who authored the definition
    pub created_by: String,
    pub created_by_username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestDefinition {
    /// Create a new definition with the given ID and name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            total_questions: 0,
            category_targets: CategoryTargets::default(),
            difficulty_targets: DifficultyTargets::default(),
            duration_minutes: 60,
            window: AvailabilityWindow::default(),
            target_institutions: BTreeSet::new(),
            shuffle_questions: true,
            show_results_immediately: false,
            allow_review: false,
            status: DefinitionStatus::Active,
            created_by: String::new(),
            created_by_username: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the total question count
    pub fn questions(mut self, total: u32) -> Self {
        self.total_questions = total;
        self
    }

    /// Set the category percentages
    pub fn categories(mut self, targets: CategoryTargets) -> Self {
        self.category_targets = targets;
        self
    }

    /// Set the difficulty percentages
    pub fn difficulties(mut self, targets: DifficultyTargets) -> Self {
        self.difficulty_targets = targets;
        self
    }

    /// Set the attempt duration
    pub fn duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// Set the availability window
    pub fn window(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.window = AvailabilityWindow::new(from, to);
        self
    }

    /// Restrict the definition to an institution (may be called repeatedly)
    pub fn target(mut self, institution: impl Into<String>) -> Self {
        self.target_institutions.insert(institution.into());
        self
    }

    /// Enable or disable per-schedule shuffling
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle_questions = shuffle;
        self
    }

    /// Set the lifecycle status
    pub fn with_status(mut self, status: DefinitionStatus) -> Self {
        self.status = status;
        self
    }

    /// Record the authoring admin
    pub fn created_by(mut self, admin_id: impl Into<String>, username: impl Into<String>) -> Self {
        self.created_by = admin_id.into();
        self.created_by_username = username.into();
        self
    }

    /// Check the structural invariants of the definition.
    ///
    /// Percentages must partition 100 exactly; there is no rounding tolerance.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.total_questions == 0 {
            return Err(DefinitionError::InvalidTotal);
        }
        if self.duration_minutes == 0 {
            return Err(DefinitionError::InvalidDuration);
        }
        let category_sum = self.category_targets.sum();
        if category_sum != 100 {
            return Err(DefinitionError::InvalidPercentages {
                kind: TargetKind::Category,
                sum: category_sum,
            });
        }
        let difficulty_sum = self.difficulty_targets.sum();
        if difficulty_sum != 100 {
            return Err(DefinitionError::InvalidPercentages {
                kind: TargetKind::Difficulty,
                sum: difficulty_sum,
            });
        }
        if !self.window.is_well_formed() {
            return Err(DefinitionError::InvalidWindow {
                from: self.window.from,
                to: self.window.to,
            });
        }
        Ok(())
    }

    /// Whether the institution is allowed to see this definition at all
    pub fn is_targeted_to(&self, institution: &str) -> bool {
        self.target_institutions.is_empty() || self.target_institutions.contains(institution)
    }

    /// Active, inside its window at `now`, and targeted to the institution
    pub fn is_available_to(&self, institution: &str, now: DateTime<Utc>) -> bool {
        self.status == DefinitionStatus::Active
            && self.window.contains(now)
            && self.is_targeted_to(institution)
    }
}

// ============================================================================
// Questions
// ============================================================================

/// A question drawn from the bank
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionRef {
    pub question_id: QuestionId,
    pub category: Category,
    pub difficulty: Difficulty,
}

impl QuestionRef {
    pub fn new(question_id: impl Into<String>, category: Category, difficulty: Difficulty) -> Self {
        Self {
            question_id: question_id.into(),
            category,
            difficulty,
        }
    }
}

/// A question frozen into a schedule at a fixed position
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question_id: QuestionId,
    pub category: Category,
    pub difficulty: Difficulty,
    /// Zero-based position shared by every student of the schedule
    pub order_index: u32,
}

// ============================================================================
// Schedule
// ============================================================================

/// Lifecycle status of a schedule
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    #[default]
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    /// Statuses that hold the (definition, institution) slot
    pub const OCCUPYING: [ScheduleStatus; 3] = [
        ScheduleStatus::Scheduled,
        ScheduleStatus::Active,
        ScheduleStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Active => "active",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    /// Does a schedule in this status block another one for the same pair?
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, ScheduleStatus::Cancelled)
    }

    /// Can dates, faculty, instructions or roster still be edited?
    pub fn is_editable(&self) -> bool {
        matches!(self, ScheduleStatus::Scheduled | ScheduleStatus::Active)
    }

    /// Legal transitions through the update path.
    ///
    /// Cancellation has its own operation and is never reached here.
    pub fn can_transition_to(&self, next: ScheduleStatus) -> bool {
        match self {
            ScheduleStatus::Scheduled => next != ScheduleStatus::Cancelled,
            ScheduleStatus::Active => {
                matches!(next, ScheduleStatus::Active | ScheduleStatus::Completed)
            }
            ScheduleStatus::Completed | ScheduleStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(ScheduleStatus::Scheduled),
            "active" => Ok(ScheduleStatus::Active),
            "completed" => Ok(ScheduleStatus::Completed),
            "cancelled" | "canceled" => Ok(ScheduleStatus::Cancelled),
            other => Err(ParseError::UnknownValue {
                kind: "schedule status",
                value: other.to_string(),
            }),
        }
    }
}

/// The institution acting on a schedule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionRef {
    pub id: InstitutionId,
    pub name: String,
}

impl InstitutionRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One institution's frozen instantiation of a test definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique identifier
    pub id: ScheduleId,
    pub definition_id: DefinitionId,
    pub institution_id: InstitutionId,
    pub institution_name: String,
    pub scheduled_date: DateTime<Utc>,
    pub scheduled_end_date: Option<DateTime<Utc>>,
    pub assigned_faculty: Option<FacultyId>,
    /// Students named explicitly in the request
    pub assigned_students: Vec<StudentId>,
    /// Batches named in the request
    pub assigned_batches: Vec<BatchId>,
    /// Explicit students ∪ batch members, deduplicated
    pub roster: BTreeSet<StudentId>,
    /// Frozen at creation; never regenerated
    pub generated_questions: Vec<GeneratedQuestion>,
    pub status: ScheduleStatus,
    pub instructions: Option<String>,
    pub total_assigned_students: usize,
    /// Roster members who opened the test, as of the last progress refresh
    pub total_attempted: usize,
    /// Roster members who submitted, as of the last progress refresh
    pub total_completed: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Question IDs in the order every student sees them
    pub fn question_ids(&self) -> Vec<&str> {
        let mut ordered: Vec<&GeneratedQuestion> = self.generated_questions.iter().collect();
        ordered.sort_by_key(|q| q.order_index);
        ordered.iter().map(|q| q.question_id.as_str()).collect()
    }

    /// Number of generated questions in a (category, difficulty) cell
    pub fn cell_count(&self, category: Category, difficulty: Difficulty) -> usize {
        self.generated_questions
            .iter()
            .filter(|q| q.category == category && q.difficulty == difficulty)
            .count()
    }
}

// ============================================================================
// Attempt
// ============================================================================

/// A student's attempt at a schedule (owned by the test-taking subsystem)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub schedule_id: ScheduleId,
    pub student_id: StudentId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Queryable store of questions (read-only from the engine's perspective)
pub trait QuestionBank: Send + Sync {
    /// Draw up to `count` available questions of one cell, uniformly at random
    /// and without replacement. A short result means the stock is exhausted.
    fn sample(
        &self,
        category: Category,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuestionRef>, StoreError>;

    /// Number of available questions in one cell
    fn available(&self, category: Category, difficulty: Difficulty) -> Result<usize, StoreError>;
}

/// Institution-scoped batch membership
pub trait BatchDirectory: Send + Sync {
    /// Members of a batch owned by `institution`; a foreign or unknown batch
    /// resolves to no members.
    fn resolve_batch_members(
        &self,
        institution: &str,
        batch: &str,
    ) -> Result<Vec<StudentId>, StoreError>;
}

/// Read access to attempts
pub trait AttemptLog: Send + Sync {
    fn find_attempt(&self, schedule: &str, student: &str) -> Result<Option<Attempt>, StoreError>;
}

/// Filter for listing definitions
#[derive(Clone, Debug, Default)]
pub struct DefinitionFilter {
    pub created_by: Option<String>,
    pub status: Option<DefinitionStatus>,
}

/// Persistence for test definitions
pub trait DefinitionRepository: Send + Sync {
    fn insert_definition(&self, definition: &TestDefinition) -> Result<(), StoreError>;
    fn update_definition(&self, definition: &TestDefinition) -> Result<(), StoreError>;
    fn get_definition(&self, id: &str) -> Result<Option<TestDefinition>, StoreError>;
    fn list_definitions(&self, filter: &DefinitionFilter) -> Result<Vec<TestDefinition>, StoreError>;
}

/// Filter for listing schedules
#[derive(Clone, Debug, Default)]
pub struct ScheduleFilter {
    pub institution: Option<InstitutionId>,
    pub definition: Option<DefinitionId>,
    pub status: Option<ScheduleStatus>,
}

/// Persistence for schedules.
///
/// Implementations must enforce "at most one occupying schedule per
/// (definition, institution)" themselves and report a violation as
/// [`StoreError::Conflict`].
pub trait ScheduleRepository: Send + Sync {
    fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError>;
    fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError>;
    fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StoreError>;
    /// The schedule currently holding the pair's slot, if any
    fn find_occupying(
        &self,
        definition: &str,
        institution: &str,
    ) -> Result<Option<Schedule>, StoreError>;
    /// Matching schedules, latest `scheduled_date` first
    fn list_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<Schedule>, StoreError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Definition validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("{kind} percentages must add up to 100 (got {sum})")]
    InvalidPercentages { kind: TargetKind, sum: u32 },

    #[error("availableFrom ({from}) must be before availableTo ({to})")]
    InvalidWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("total question count must be at least 1")]
    InvalidTotal,

    #[error("test duration must be at least 1 minute")]
    InvalidDuration,
}

/// Persistence or collaborator failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Parse error for enumerated values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown {kind}: '{value}'")]
    UnknownValue { kind: &'static str, value: String },
}

// ============================================================================
// Tests
// ============================================================================
