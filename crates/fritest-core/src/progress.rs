//! Schedule Progress Reporting
//!
//! Types for per-student completion summaries of a schedule. A summary
//! answers: "Who has finished the test, who is still in it, and who has not
//! opened it yet?"
//!
//! Summaries are reporting artifacts. They are recomputed from attempts on
//! demand and never written back as the source of truth.
//!
//! # Example
//!
//! ```rust
//! use fritest_core::progress::{AttemptState, ProgressSummary, StudentProgress};
//!
//! let summary = ProgressSummary::from_students(
//!     "sched-1",
//!     vec![
//!         StudentProgress::pending("ana"),
//!         StudentProgress::pending("ben"),
//!     ],
//! );
//!
//! assert_eq!(summary.total, 2);
//! assert_eq!(summary.pending, 2);
//! assert_eq!(summary.completion_percent(), 0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Attempt, ScheduleId, StudentId};

// ============================================================================
// Core Types
// ============================================================================

/// Where a rostered student stands against a schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptState {
    /// No attempt recorded
    Pending,
    /// Attempt exists without a completion timestamp
    Started,
    /// Attempt has a completion timestamp
    Completed,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Pending => "pending",
            AttemptState::Started => "started",
            AttemptState::Completed => "completed",
        }
    }

    /// Classify an optional attempt
    pub fn of(attempt: Option<&Attempt>) -> Self {
        match attempt {
            None => AttemptState::Pending,
            Some(a) if a.is_completed() => AttemptState::Completed,
            Some(_) => AttemptState::Started,
        }
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One roster member's progress
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProgress {
    pub student_id: StudentId,
    pub state: AttemptState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StudentProgress {
    /// A student with no attempt
    pub fn pending(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            state: AttemptState::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    /// Build from an attempt lookup result
    pub fn from_attempt(student_id: impl Into<String>, attempt: Option<&Attempt>) -> Self {
        Self {
            student_id: student_id.into(),
            state: AttemptState::of(attempt),
            started_at: attempt.map(|a| a.started_at),
            completed_at: attempt.and_then(|a| a.completed_at),
        }
    }
}

/// Aggregated progress for one schedule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub schedule_id: ScheduleId,

    /// Roster size
    pub total: usize,

    pub completed: usize,

    pub started: usize,

    pub pending: usize,

    /// Per-student detail, in roster order
    pub per_student: Vec<StudentProgress>,
}

impl ProgressSummary {
    /// Tally a list of per-student records
    pub fn from_students(schedule_id: impl Into<String>, per_student: Vec<StudentProgress>) -> Self {
        let mut completed = 0usize;
        let mut started = 0usize;
        let mut pending = 0usize;

        for student in &per_student {
            match student.state {
                AttemptState::Completed => completed += 1,
                AttemptState::Started => started += 1,
                AttemptState::Pending => pending += 1,
            }
        }

        Self {
            schedule_id: schedule_id.into(),
            total: per_student.len(),
            completed,
            started,
            pending,
            per_student,
        }
    }

    /// Students with any attempt (started or completed)
    pub fn attempted(&self) -> usize {
        self.started + self.completed
    }

    /// Share of the roster that completed, rounded to a whole percent
    pub fn completion_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u8
    }
}
