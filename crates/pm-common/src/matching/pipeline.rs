use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use super::{
    aggregation::{AssessmentAnswer, SkillScore, aggregate_answers},
    criteria::{EffectiveWeights, audit_criteria, resolve_effective_weights},
    ranking::{RankedMatch, rank_internships},
    scoring::{CompatibilityBreakdown, compatibility, compatibility_breakdown},
};
use crate::error::EngineError;
use crate::store::{MatchingStore, StoredMatch};
use crate::{InternshipId, StudentId, run_id};

const DEFAULT_TOP_K: usize = 3;
const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingConfig {
    /// Number of matches kept per student.
    pub top_k: usize,
    /// Students recomputed at once during a sweep.
    pub concurrency: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl MatchingConfig {
    pub fn from_env() -> Self {
        Self {
            top_k: env_usize("PM_MATCH_TOP_K").unwrap_or(DEFAULT_TOP_K),
            concurrency: env_usize("PM_RECOMPUTE_CONCURRENCY").unwrap_or(DEFAULT_CONCURRENCY),
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeFailure {
    pub student_id: StudentId,
    pub error: String,
}

/// Outcome of a sweep over all submitted students.
#[derive(Debug, Clone, Serialize)]
pub struct RecomputeReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub internships_considered: usize,
    pub succeeded: Vec<StudentId>,
    pub failures: Vec<RecomputeFailure>,
}

impl RecomputeReport {
    pub fn students_total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// In-process locks keyed by student id.
#[derive(Default)]
struct StudentLocks {
    inner: Mutex<HashMap<StudentId, Arc<AsyncMutex<()>>>>,
}

impl StudentLocks {
    const PRUNE_ABOVE: usize = 1024;

    async fn acquire(&self, student_id: StudentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() > Self::PRUNE_ABOVE {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(map.entry(student_id).or_default())
        };
        lock.lock_owned().await
    }
}

/// Entry point for score aggregation, compatibility scoring and match
/// recomputation over a [`MatchingStore`].
pub struct MatchingEngine<S> {
    store: S,
    config: MatchingConfig,
    locks: StudentLocks,
}

impl<S: MatchingStore> MatchingEngine<S> {
    pub fn new(store: S, config: MatchingConfig) -> Self {
        Self {
            store,
            config,
            locks: StudentLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    async fn ensure_student(&self, student_id: StudentId) -> Result<(), EngineError> {
        if self.store.student_exists(student_id).await? {
            Ok(())
        } else {
            Err(EngineError::StudentNotFound(student_id))
        }
    }

    async fn ensure_internship(&self, internship_id: InternshipId) -> Result<(), EngineError> {
        if self.store.internship_exists(internship_id).await? {
            Ok(())
        } else {
            Err(EngineError::InternshipNotFound(internship_id))
        }
    }

    /// Aggregate one submission and replace the student's stored scores.
    #[instrument(skip(self, answers), fields(answer_count = answers.len()))]
    pub async fn aggregate_scores(
        &self,
        student_id: StudentId,
        answers: &[AssessmentAnswer],
    ) -> Result<Vec<SkillScore>, EngineError> {
        let scores = aggregate_answers(answers)?;
        self.ensure_student(student_id).await?;

        let _guard = self.locks.acquire(student_id).await;
        self.store
            .replace_skill_scores(student_id, &scores)
            .await
            .map_err(|source| EngineError::PersistenceFailure { student_id, source })?;

        info!(skills = scores.len(), "assessment scores stored");
        Ok(scores)
    }

    /// Effective weights of one internship; empty when it has no criteria.
    pub async fn resolve_weights(
        &self,
        internship_id: InternshipId,
    ) -> Result<EffectiveWeights, EngineError> {
        self.ensure_internship(internship_id).await?;
        let criteria = self.store.load_criteria(internship_id).await?;
        Ok(resolve_effective_weights(&criteria))
    }

    pub async fn score(
        &self,
        student_id: StudentId,
        internship_id: InternshipId,
    ) -> Result<f64, EngineError> {
        self.ensure_student(student_id).await?;
        let weights = self.resolve_weights(internship_id).await?;
        let scores = self.store.load_skill_scores(student_id).await?;
        Ok(compatibility(&scores, &weights))
    }

    pub async fn score_breakdown(
        &self,
        student_id: StudentId,
        internship_id: InternshipId,
    ) -> Result<CompatibilityBreakdown, EngineError> {
        self.ensure_student(student_id).await?;
        let weights = self.resolve_weights(internship_id).await?;
        let scores = self.store.load_skill_scores(student_id).await?;
        Ok(compatibility_breakdown(&scores, &weights))
    }

    async fn active_candidates(&self) -> Result<Vec<(InternshipId, EffectiveWeights)>, EngineError> {
        let criteria = self.store.active_criteria().await?;
        Ok(criteria
            .iter()
            .map(|c| {
                let issues = audit_criteria(c);
                if !issues.is_empty() {
                    debug!(internship_id = c.internship_id, ?issues, "incomplete criteria");
                }
                (c.internship_id, resolve_effective_weights(c))
            })
            .collect())
    }

    /// Best `k` active internships for the student.
    #[instrument(skip(self))]
    pub async fn rank_matches(
        &self,
        student_id: StudentId,
        k: usize,
    ) -> Result<Vec<RankedMatch>, EngineError> {
        self.ensure_student(student_id).await?;
        let candidates = self.active_candidates().await?;
        let scores = self.store.load_skill_scores(student_id).await?;
        Ok(rank_internships(&scores, &candidates, k))
    }

    fn validate_ranking(&self, ranked: &[RankedMatch]) -> Result<(), EngineError> {
        if ranked.len() > self.config.top_k {
            return Err(EngineError::InvalidRanking(format!(
                "{} matches exceed the limit of {}",
                ranked.len(),
                self.config.top_k
            )));
        }

        let mut seen = BTreeSet::new();
        for m in ranked {
            if !seen.insert(m.internship_id) {
                return Err(EngineError::InvalidRanking(format!(
                    "internship {} listed more than once",
                    m.internship_id
                )));
            }
            if !(0.0..=100.0).contains(&m.score) {
                return Err(EngineError::InvalidRanking(format!(
                    "score {} of internship {} outside 0..=100",
                    m.score, m.internship_id
                )));
            }
        }

        Ok(())
    }

    async fn write_matches(
        &self,
        student_id: StudentId,
        ranked: &[RankedMatch],
    ) -> Result<(), EngineError> {
        self.store
            .replace_matches(student_id, ranked)
            .await
            .map_err(|source| EngineError::PersistenceFailure { student_id, source })
    }

    /// Replace the student's stored ranking with `ranked`, ranks 1..=n in
    /// list order.
    #[instrument(skip(self, ranked), fields(match_count = ranked.len()))]
    pub async fn persist_matches(
        &self,
        student_id: StudentId,
        ranked: &[RankedMatch],
    ) -> Result<(), EngineError> {
        self.validate_ranking(ranked)?;
        self.ensure_student(student_id).await?;

        let _guard = self.locks.acquire(student_id).await;
        self.write_matches(student_id, ranked).await
    }

    /// The student's persisted ranking, ordered by rank.
    pub async fn stored_matches(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<StoredMatch>, EngineError> {
        self.ensure_student(student_id).await?;
        Ok(self.store.load_matches(student_id).await?)
    }

    /// Rank and persist in one step, holding the student's lock throughout.
    #[instrument(skip(self))]
    pub async fn recompute_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<RankedMatch>, EngineError> {
        self.ensure_student(student_id).await?;
        let candidates = self.active_candidates().await?;
        self.recompute_with(student_id, &candidates).await
    }

    /// Store a submission and refresh the student's matches.
    pub async fn submit_assessment(
        &self,
        student_id: StudentId,
        answers: &[AssessmentAnswer],
    ) -> Result<Vec<RankedMatch>, EngineError> {
        self.aggregate_scores(student_id, answers).await?;
        self.recompute_student(student_id).await
    }

    async fn recompute_with(
        &self,
        student_id: StudentId,
        candidates: &[(InternshipId, EffectiveWeights)],
    ) -> Result<Vec<RankedMatch>, EngineError> {
        let _guard = self.locks.acquire(student_id).await;

        let scores = self.store.load_skill_scores(student_id).await?;
        let ranked = rank_internships(&scores, candidates, self.config.top_k);
        self.write_matches(student_id, &ranked).await?;

        debug!(student_id, matches = ranked.len(), "matches recomputed");
        Ok(ranked)
    }

    /// Recompute every submitted student. A failing student is recorded in
    /// the report and the sweep moves on.
    #[instrument(skip(self), fields(run_id = run_id::get()))]
    pub async fn recompute_all(&self) -> Result<RecomputeReport, EngineError> {
        let started_at = Utc::now();
        let student_ids = self.store.submitted_student_ids().await?;
        let candidates = self.active_candidates().await?;

        info!(
            students = student_ids.len(),
            internships = candidates.len(),
            "recompute sweep started"
        );

        let candidates_ref = &candidates;
        let outcomes: Vec<_> = stream::iter(student_ids)
            .map(|student_id| async move {
                let outcome = self.recompute_with(student_id, candidates_ref).await;
                (student_id, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        for (student_id, outcome) in outcomes {
            match outcome {
                Ok(_) => succeeded.push(student_id),
                Err(err) => {
                    warn!(student_id, error = %err, "recompute failed");
                    failures.push(RecomputeFailure {
                        student_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        succeeded.sort_unstable();
        failures.sort_by_key(|f| f.student_id);

        let report = RecomputeReport {
            run_id: run_id::get().to_string(),
            started_at,
            finished_at: Utc::now(),
            internships_considered: candidates.len(),
            succeeded,
            failures,
        };

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "recompute sweep finished"
        );
        Ok(report)
    }
}
