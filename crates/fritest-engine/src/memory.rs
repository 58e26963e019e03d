//! In-memory collaborators
//!
//! Lightweight implementations of the external collaborator traits. They
//! back the engine's own tests and are handy for demos and embedding where
//! the question bank already lives in process memory.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use fritest_core::{
    Attempt, AttemptLog, BatchDirectory, Category, Difficulty, QuestionBank, QuestionRef,
    StoreError, StudentId,
};

#[derive(Clone, Debug)]
struct BankEntry {
    question: QuestionRef,
    available: bool,
}

/// Question bank held in a vector
#[derive(Debug, Default)]
pub struct MemoryQuestionBank {
    entries: Vec<BankEntry>,
    next_seq: usize,
    sample_calls: AtomicUsize,
}

impl MemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bank with `per_cell` available questions in each of the nine cells
    pub fn stocked(per_cell: usize) -> Self {
        let mut bank = Self::new();
        for category in Category::ALL {
            for difficulty in Difficulty::ALL {
                bank.fill(category, difficulty, per_cell);
            }
        }
        bank
    }

    /// Add one available question
    pub fn add(&mut self, question: QuestionRef) {
        self.entries.push(BankEntry {
            question,
            available: true,
        });
    }

    /// Add `count` available questions with generated IDs to one cell
    pub fn fill(&mut self, category: Category, difficulty: Difficulty, count: usize) {
        for _ in 0..count {
            let id = format!("{}-{}-{}", category, difficulty, self.next_seq);
            self.next_seq += 1;
            self.add(QuestionRef::new(id, category, difficulty));
        }
    }

    /// Drop questions that do not satisfy the predicate
    pub fn retain(&mut self, mut keep: impl FnMut(&QuestionRef) -> bool) {
        self.entries.retain(|e| keep(&e.question));
    }

    /// Mark questions available (in the library) or not
    pub fn set_available(&mut self, mut available: impl FnMut(&QuestionRef) -> bool) {
        for entry in &mut self.entries {
            entry.available = available(&entry.question);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `sample` calls served so far
    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    fn eligible(&self, category: Category, difficulty: Difficulty) -> Vec<&QuestionRef> {
        self.entries
            .iter()
            .filter(|e| e.available)
            .map(|e| &e.question)
            .filter(|q| q.category == category && q.difficulty == difficulty)
            .collect()
    }
}

impl QuestionBank for MemoryQuestionBank {
    fn sample(
        &self,
        category: Category,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuestionRef>, StoreError> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        let eligible = self.eligible(category, difficulty);
        Ok(eligible
            .choose_multiple(&mut rand::thread_rng(), count)
            .map(|q| (*q).clone())
            .collect())
    }

    fn available(&self, category: Category, difficulty: Difficulty) -> Result<usize, StoreError> {
        Ok(self.eligible(category, difficulty).len())
    }
}

/// Batch membership keyed by (institution, batch)
#[derive(Debug, Default)]
pub struct MemoryBatches {
    batches: HashMap<(String, String), Vec<StudentId>>,
}

impl MemoryBatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch owned by `institution`
    pub fn insert(
        &mut self,
        institution: impl Into<String>,
        batch: impl Into<String>,
        students: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.batches.insert(
            (institution.into(), batch.into()),
            students.into_iter().map(Into::into).collect(),
        );
    }
}

impl BatchDirectory for MemoryBatches {
    fn resolve_batch_members(
        &self,
        institution: &str,
        batch: &str,
    ) -> Result<Vec<StudentId>, StoreError> {
        Ok(self
            .batches
            .get(&(institution.to_string(), batch.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Attempts keyed by (schedule, student)
#[derive(Debug, Default)]
pub struct MemoryAttempts {
    attempts: RwLock<HashMap<(String, String), Attempt>>,
}

impl MemoryAttempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a student opened the test. Starting twice keeps the first
    /// start time.
    pub fn start(&self, schedule: &str, student: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut attempts = self.write()?;
        attempts
            .entry((schedule.to_string(), student.to_string()))
            .or_insert_with(|| Attempt {
                schedule_id: schedule.to_string(),
                student_id: student.to_string(),
                started_at: at,
                completed_at: None,
            });
        Ok(())
    }

    /// Record completion; an attempt that was never started starts now
    pub fn complete(
        &self,
        schedule: &str,
        student: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut attempts = self.write()?;
        let attempt = attempts
            .entry((schedule.to_string(), student.to_string()))
            .or_insert_with(|| Attempt {
                schedule_id: schedule.to_string(),
                student_id: student.to_string(),
                started_at: at,
                completed_at: None,
            });
        attempt.completed_at = Some(at);
        Ok(())
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<(String, String), Attempt>>, StoreError>
    {
        self.attempts
            .write()
            .map_err(|e| StoreError::Backend(format!("attempt log poisoned: {e}")))
    }
}

impl AttemptLog for MemoryAttempts {
    fn find_attempt(&self, schedule: &str, student: &str) -> Result<Option<Attempt>, StoreError> {
        let attempts = self
            .attempts
            .read()
            .map_err(|e| StoreError::Backend(format!("attempt log poisoned: {e}")))?;
        Ok(attempts
            .get(&(schedule.to_string(), student.to_string()))
            .cloned())
    }
}
