#![allow(async_fn_in_trait)]

pub mod memory;

use deadpool_postgres::PoolError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_postgres::Error as PgError;

use crate::matching::aggregation::{SkillScore, SkillScores};
use crate::matching::criteria::Criteria;
use crate::matching::ranking::RankedMatch;
use crate::{InternshipId, StudentId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("write rejected: {0}")]
    Conflict(String),
}

/// One persisted row of a student's ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredMatch {
    pub student_id: StudentId,
    pub internship_id: InternshipId,
    pub rank: i32,
    pub score: f64,
}

/// Storage the engine reads scores and criteria from and writes results to.
///
/// Both `replace_*` writes are all-or-nothing: on error the previously stored
/// rows for the student stay authoritative. Concurrent `replace_matches` calls
/// for one student are serialized by the implementation.
pub trait MatchingStore: Send + Sync {
    async fn student_exists(&self, student_id: StudentId) -> Result<bool, StoreError>;

    async fn internship_exists(&self, internship_id: InternshipId) -> Result<bool, StoreError>;

    async fn load_skill_scores(&self, student_id: StudentId) -> Result<SkillScores, StoreError>;

    /// Replace every skill score of the student and mark the assessment as
    /// submitted.
    async fn replace_skill_scores(
        &self,
        student_id: StudentId,
        scores: &[SkillScore],
    ) -> Result<(), StoreError>;

    async fn load_criteria(&self, internship_id: InternshipId) -> Result<Criteria, StoreError>;

    /// Criteria of every internship eligible for matching, including those
    /// with no weights configured.
    async fn active_criteria(&self) -> Result<Vec<Criteria>, StoreError>;

    async fn submitted_student_ids(&self) -> Result<Vec<StudentId>, StoreError>;

    /// Delete the student's matches and insert `matches` with 1-based ranks.
    async fn replace_matches(
        &self,
        student_id: StudentId,
        matches: &[RankedMatch],
    ) -> Result<(), StoreError>;

    /// Stored matches ordered by rank.
    async fn load_matches(&self, student_id: StudentId) -> Result<Vec<StoredMatch>, StoreError>;
}

/// Assign dense 1-based ranks in list order.
pub fn to_stored_matches(student_id: StudentId, matches: &[RankedMatch]) -> Vec<StoredMatch> {
    matches
        .iter()
        .enumerate()
        .map(|(idx, m)| StoredMatch {
            student_id,
            internship_id: m.internship_id,
            rank: idx as i32 + 1,
            score: m.score,
        })
        .collect()
}
