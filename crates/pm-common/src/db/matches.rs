use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;
use tracing::{debug, instrument};

use crate::db::PgPool;
use crate::db::directory::lock_student;
use crate::db::util::TimedClientExt;
use crate::matching::ranking::RankedMatch;
use crate::store::{StoreError, StoredMatch, to_stored_matches};
use crate::StudentId;

pub async fn fetch_matches(
    client: &impl GenericClient,
    student_id: StudentId,
) -> Result<Vec<StoredMatch>, PgError> {
    let rows = client
        .timed_query(
            "SELECT student_id, internship_id, rank, score
             FROM placement.matches
             WHERE student_id = $1
             ORDER BY rank",
            &[&student_id],
            "fetch_matches",
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| StoredMatch {
            student_id: row.get("student_id"),
            internship_id: row.get("internship_id"),
            rank: row.get("rank"),
            score: row.get("score"),
        })
        .collect())
}

/// Delete and re-insert the student's whole ranking in one transaction.
///
/// The student row lock serializes concurrent replaces for the same student;
/// any error drops the transaction, leaving the old ranking in place.
#[instrument(skip(pool, matches), fields(match_count = matches.len()))]
pub async fn replace_matches(
    pool: &PgPool,
    student_id: StudentId,
    matches: &[RankedMatch],
) -> Result<(), StoreError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    if !lock_student(&tx, student_id).await? {
        return Err(StoreError::Conflict(format!("unknown student {student_id}")));
    }

    let deleted = tx
        .timed_execute(
            "DELETE FROM placement.matches WHERE student_id = $1",
            &[&student_id],
            "delete_matches",
        )
        .await?;

    let stmt = tx
        .prepare_cached(
            "INSERT INTO placement.matches (student_id, internship_id, rank, score)
             VALUES ($1, $2, $3, $4)",
        )
        .await?;
    for row in to_stored_matches(student_id, matches) {
        tx.timed_execute(
            &stmt,
            &[&row.student_id, &row.internship_id, &row.rank, &row.score],
            "insert_match",
        )
        .await?;
    }

    tx.commit().await?;

    debug!(deleted, inserted = matches.len(), "matches replaced");
    Ok(())
}
