//! fritest-engine: question generation and scheduling
//!
//! Turns percentage-based test definitions into frozen, per-institution
//! question lists and manages the schedules that carry them.
//!
//! # Components
//!
//! - [`generator`]: stratified sampling of the question bank
//! - [`schedule`]: per-institution scheduling, update and cancellation
//! - [`catalog`]: admin-side definition management
//! - [`progress`]: per-student completion summaries
//! - [`memory`]: in-process collaborators for embedding and tests
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use fritest_core::{CategoryTargets, TestDefinition};
//! use fritest_engine::{memory::MemoryQuestionBank, Generator};
//!
//! let bank = MemoryQuestionBank::stocked(10);
//! let definition = TestDefinition::new("fri", "Foundation Readiness")
//!     .questions(10)
//!     .categories(CategoryTargets::new(50, 30, 20))
//!     .window(
//!         Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
//!         Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap(),
//!     );
//!
//! let questions = Generator::default().generate(&definition, &bank).unwrap();
//! assert_eq!(questions.len(), 10);
//! ```

pub mod catalog;
pub mod config;
pub mod generator;
pub mod memory;
pub mod progress;
pub mod schedule;

pub use catalog::{
    CatalogError, DefinitionCatalog, DefinitionDraft, DefinitionEdit, DefinitionQuery,
    DefinitionStats, ScheduleStats,
};
pub use config::{ConfigError, EngineConfig, RoundingPolicy};
pub use generator::{AllocationPlan, CellPlan, GenerationError, Generator};
pub use progress::ProgressTracker;
pub use schedule::{
    AvailableDefinition, DefinitionDetail, ScheduleError, ScheduleManager, ScheduleRequest,
    ScheduleUpdate,
};
