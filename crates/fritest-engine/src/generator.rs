//! Stratified Question Generation
//!
//! Turns a percentage-based `TestDefinition` into a concrete, ordered list of
//! question references.
//!
//! # Algorithm
//!
//! 1. Category counts: `round_half_up(percent * total / 100)` per category,
//!    then reconciled with the total according to the `RoundingPolicy`
//! 2. Difficulty split per category: easy and medium are rounded, hard takes
//!    the remainder so each category subtotal is exact
//! 3. Each non-empty (category, difficulty) cell is sampled uniformly without
//!    replacement; any short cell fails the whole generation
//! 4. Concatenate in category order, then difficulty order, and number 0..N-1
//! 5. Optionally permute with Fisher–Yates and renumber
//!
//! Generation is randomized and has no idempotence guarantee: callers must
//! run it exactly once per schedule.

use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use fritest_core::{
    Category, DefinitionError, Difficulty, GeneratedQuestion, QuestionBank, QuestionId,
    QuestionRef, StoreError, TestDefinition,
};

use crate::config::{EngineConfig, RoundingPolicy};

/// Errors during question generation
#[derive(Debug, Error)]
pub enum GenerationError {
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

    #[error("Question bank returned question '{0}' more than once")]
    DuplicateQuestion(QuestionId),

    #[error("Question bank error: {0}")]
    Bank(#[from] StoreError),
}

/// `round(percent / 100 * of)` with halves rounded up, in exact integer arithmetic
pub fn round_half_up_share(percent: u8, of: u32) -> u32 {
    ((u64::from(percent) * u64::from(of) + 50) / 100) as u32
}

/// Number of questions to draw from one (category, difficulty) cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellPlan {
    pub category: Category,
    pub difficulty: Difficulty,
    pub count: u32,
}

/// Per-cell counts derived from a definition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationPlan {
    /// All nine cells in generation order, including empty ones
    pub cells: Vec<CellPlan>,
    /// Requested total
    pub requested: u32,
    /// Sum of the independently rounded category counts minus the requested
    /// total, before any reconciliation
    pub drift: i64,
    pub policy: RoundingPolicy,
}

impl AllocationPlan {
    /// Compute the allocation for a definition. The definition is assumed to
    /// be valid; see [`Generator::plan`] for the checked entry point.
    pub fn compute(definition: &TestDefinition, policy: RoundingPolicy) -> Self {
        let total = definition.total_questions;
        let mut category_counts: Vec<(Category, u32)> = Category::ALL
            .iter()
            .map(|&c| (c, round_half_up_share(definition.category_targets.get(c), total)))
            .collect();

        let rounded_sum: i64 = category_counts.iter().map(|(_, n)| i64::from(*n)).sum();
        let drift = rounded_sum - i64::from(total);

        if drift != 0 && policy == RoundingPolicy::Reconcile {
            // Largest target wins; on ties the earliest category in generation order
            let (target_idx, _) = Category::ALL
                .iter()
                .enumerate()
                .fold((0usize, 0u8), |(best_idx, best_pct), (idx, &c)| {
                    let pct = definition.category_targets.get(c);
                    if pct > best_pct {
                        (idx, pct)
                    } else {
                        (best_idx, best_pct)
                    }
                });
            let adjusted = (i64::from(category_counts[target_idx].1) - drift).max(0);
            category_counts[target_idx].1 = adjusted as u32;
        }

        let targets = definition.difficulty_targets;
        let mut cells = Vec::with_capacity(9);
        for (category, count) in category_counts {
            let easy = round_half_up_share(targets.easy, count).min(count);
            let medium = round_half_up_share(targets.medium, count).min(count - easy);
            let hard = count - easy - medium;
            for (difficulty, n) in [
                (Difficulty::Easy, easy),
                (Difficulty::Medium, medium),
                (Difficulty::Hard, hard),
            ] {
                cells.push(CellPlan {
                    category,
                    difficulty,
                    count: n,
                });
            }
        }

        Self {
            cells,
            requested: total,
            drift,
            policy,
        }
    }

    /// Questions the plan will actually produce
    pub fn total(&self) -> u32 {
        self.cells.iter().map(|c| c.count).sum()
    }

    pub fn category_count(&self, category: Category) -> u32 {
        self.cells
            .iter()
            .filter(|c| c.category == category)
            .map(|c| c.count)
            .sum()
    }

    pub fn count(&self, category: Category, difficulty: Difficulty) -> u32 {
        self.cells
            .iter()
            .find(|c| c.category == category && c.difficulty == difficulty)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    /// Cells that require at least one question
    pub fn non_empty(&self) -> impl Iterator<Item = &CellPlan> {
        self.cells.iter().filter(|c| c.count > 0)
    }
}

/// Stratified sampler
#[derive(Clone, Debug, Default)]
pub struct Generator {
    config: EngineConfig,
}

impl Generator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate the definition and compute its allocation plan
    pub fn plan(&self, definition: &TestDefinition) -> Result<AllocationPlan, GenerationError> {
        definition.validate()?;
        Ok(AllocationPlan::compute(definition, self.config.rounding))
    }

    /// Check the bank holds enough available questions for every cell,
    /// without drawing any.
    pub fn check_supply(
        &self,
        definition: &TestDefinition,
        bank: &dyn QuestionBank,
    ) -> Result<AllocationPlan, GenerationError> {
        let plan = self.plan(definition)?;
        for cell in plan.non_empty() {
            let available = bank.available(cell.category, cell.difficulty)?;
            let required = cell.count as usize;
            if available < required {
                return Err(GenerationError::InsufficientQuestions {
                    category: cell.category,
                    difficulty: cell.difficulty,
                    required,
                    available,
                });
            }
        }
        Ok(plan)
    }

    /// Generate a question list using the thread-local RNG for shuffling
    pub fn generate(
        &self,
        definition: &TestDefinition,
        bank: &dyn QuestionBank,
    ) -> Result<Vec<GeneratedQuestion>, GenerationError> {
        self.generate_with_rng(definition, bank, &mut rand::thread_rng())
    }

    /// Generate a question list, shuffling with the given RNG.
    ///
    /// Nothing is returned unless every cell was filled.
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        definition: &TestDefinition,
        bank: &dyn QuestionBank,
        rng: &mut R,
    ) -> Result<Vec<GeneratedQuestion>, GenerationError> {
        let plan = self.plan(definition)?;
        if plan.drift != 0 {
            debug!(
                definition = %definition.id,
                drift = plan.drift,
                policy = %plan.policy,
                "category rounding drift"
            );
        }

        let cells: Vec<CellPlan> = plan.non_empty().copied().collect();
        let sampled: Vec<Vec<QuestionRef>> = if self.config.parallel_sampling {
            cells
                .par_iter()
                .map(|cell| sample_cell(bank, cell))
                .collect::<Result<_, _>>()?
        } else {
            cells
                .iter()
                .map(|cell| sample_cell(bank, cell))
                .collect::<Result<_, _>>()?
        };

        let drawn: usize = sampled.iter().map(Vec::len).sum();
        let mut seen = HashSet::with_capacity(drawn);
        let mut questions: Vec<GeneratedQuestion> = Vec::with_capacity(drawn);
        for question in sampled.into_iter().flatten() {
            if !seen.insert(question.question_id.clone()) {
                return Err(GenerationError::DuplicateQuestion(question.question_id));
            }
            questions.push(GeneratedQuestion {
                order_index: questions.len() as u32,
                question_id: question.question_id,
                category: question.category,
                difficulty: question.difficulty,
            });
        }

        if definition.shuffle_questions {
            questions.shuffle(rng);
            for (index, question) in questions.iter_mut().enumerate() {
                question.order_index = index as u32;
            }
        }

        info!(
            definition = %definition.id,
            questions = questions.len(),
            shuffled = definition.shuffle_questions,
            "generated question set"
        );
        Ok(questions)
    }
}

fn sample_cell(bank: &dyn QuestionBank, cell: &CellPlan) -> Result<Vec<QuestionRef>, GenerationError> {
    let required = cell.count as usize;
    let mut drawn = bank.sample(cell.category, cell.difficulty, required)?;
    debug!(
        category = %cell.category,
        difficulty = %cell.difficulty,
        required,
        drawn = drawn.len(),
        "sampled cell"
    );
    if drawn.len() < required {
        return Err(GenerationError::InsufficientQuestions {
            category: cell.category,
            difficulty: cell.difficulty,
            required,
            available: drawn.len(),
        });
    }
    drawn.truncate(required);
    // Frozen entries carry the cell they were drawn for
    for question in &mut drawn {
        question.category = cell.category;
        question.difficulty = cell.difficulty;
    }
    Ok(drawn)
}
