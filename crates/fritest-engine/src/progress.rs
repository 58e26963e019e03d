//! Read-side aggregation of attempts against a schedule's roster.

use fritest_core::progress::{ProgressSummary, StudentProgress};
use fritest_core::{AttemptLog, Schedule, StoreError};
use tracing::debug;

/// Summarizes per-student completion; never writes anything back
pub struct ProgressTracker<'a> {
    attempts: &'a dyn AttemptLog,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(attempts: &'a dyn AttemptLog) -> Self {
        Self { attempts }
    }

    /// One attempt lookup per roster member, in roster order
    pub fn summarize(&self, schedule: &Schedule) -> Result<ProgressSummary, StoreError> {
        let per_student = schedule
            .roster
            .iter()
            .map(|student| {
                let attempt = self.attempts.find_attempt(&schedule.id, student)?;
                Ok(StudentProgress::from_attempt(student.as_str(), attempt.as_ref()))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let summary = ProgressSummary::from_students(schedule.id.as_str(), per_student);
        debug!(
            schedule = %schedule.id,
            total = summary.total,
            completed = summary.completed,
            started = summary.started,
            "summarized progress"
        );
        Ok(summary)
    }

    /// Summarize and copy the tallies onto the schedule's counters
    pub fn refresh(&self, schedule: &mut Schedule) -> Result<ProgressSummary, StoreError> {
        let summary = self.summarize(schedule)?;
        schedule.total_attempted = summary.started + summary.completed;
        schedule.total_completed = summary.completed;
        Ok(summary)
    }
}
