use chrono::Utc;
use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;
use tracing::{debug, instrument};

use crate::db::PgPool;
use crate::db::directory::{lock_student, mark_submitted};
use crate::db::util::TimedClientExt;
use crate::matching::aggregation::{SkillScore, SkillScores};
use crate::store::StoreError;
use crate::StudentId;

pub async fn fetch_skill_scores(
    client: &impl GenericClient,
    student_id: StudentId,
) -> Result<SkillScores, PgError> {
    let rows = client
        .timed_query(
            "SELECT skill_id, score FROM placement.skill_scores WHERE student_id = $1",
            &[&student_id],
            "fetch_skill_scores",
        )
        .await?;

    Ok(SkillScores::from_scores(rows.iter().map(|row| SkillScore {
        skill_id: row.get("skill_id"),
        score: row.get("score"),
    })))
}

/// Replace the student's scores and set the submitted flag in one
/// transaction.
#[instrument(skip(pool, scores), fields(score_count = scores.len()))]
pub async fn replace_skill_scores(
    pool: &PgPool,
    student_id: StudentId,
    scores: &[SkillScore],
) -> Result<(), StoreError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    if !lock_student(&tx, student_id).await? {
        return Err(StoreError::Conflict(format!("unknown student {student_id}")));
    }

    let deleted = tx
        .timed_execute(
            "DELETE FROM placement.skill_scores WHERE student_id = $1",
            &[&student_id],
            "delete_skill_scores",
        )
        .await?;

    let stmt = tx
        .prepare_cached(
            "INSERT INTO placement.skill_scores (student_id, skill_id, score)
             VALUES ($1, $2, $3)",
        )
        .await?;
    for score in scores {
        tx.timed_execute(
            &stmt,
            &[&student_id, &score.skill_id, &score.score],
            "insert_skill_score",
        )
        .await?;
    }

    mark_submitted(&tx, student_id, Utc::now()).await?;
    tx.commit().await?;

    debug!(deleted, inserted = scores.len(), "skill scores replaced");
    Ok(())
}
