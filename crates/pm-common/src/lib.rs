pub mod db;
pub mod error;
pub mod logging;
pub mod matching;
pub mod run_id;
pub mod store;

pub use error::EngineError;
pub use matching::pipeline::{MatchingConfig, MatchingEngine, RecomputeFailure, RecomputeReport};
pub use store::{MatchingStore, StoreError, StoredMatch, memory::InMemoryStore};

pub type StudentId = i64;
pub type InternshipId = i64;
pub type SkillId = i64;
pub type GroupId = i64;
pub type QuestionId = i64;
