//! fritest-store: SQLite persistence
//!
//! [`SqliteStore`] implements every collaborator trait from `fritest-core`
//! over a single connection, so one database file backs the definition
//! catalog, schedules, the question bank, batch membership and attempts.
//!
//! ```rust
//! use fritest_core::{Category, Difficulty, QuestionBank, QuestionRef};
//! use fritest_store::SqliteStore;
//!
//! let store = SqliteStore::in_memory().unwrap();
//! store
//!     .add_question(&QuestionRef::new("q1", Category::Aptitude, Difficulty::Easy), true)
//!     .unwrap();
//! assert_eq!(store.available(Category::Aptitude, Difficulty::Easy).unwrap(), 1);
//! ```

pub mod sqlite;

pub use sqlite::SqliteStore;
