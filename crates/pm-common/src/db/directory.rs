//! Lookups against the student and internship tables owned by the
//! surrounding application.

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;

use crate::db::util::TimedClientExt;
use crate::{InternshipId, StudentId};

pub async fn student_exists(
    client: &impl GenericClient,
    student_id: StudentId,
) -> Result<bool, PgError> {
    let row = client
        .timed_query_one(
            "SELECT EXISTS (SELECT 1 FROM placement.students WHERE id = $1)",
            &[&student_id],
            "student_exists",
        )
        .await?;
    Ok(row.get(0))
}

pub async fn internship_exists(
    client: &impl GenericClient,
    internship_id: InternshipId,
) -> Result<bool, PgError> {
    let row = client
        .timed_query_one(
            "SELECT EXISTS (SELECT 1 FROM placement.internships WHERE id = $1)",
            &[&internship_id],
            "internship_exists",
        )
        .await?;
    Ok(row.get(0))
}

/// Take the student's row lock for the rest of the transaction. Returns
/// `false` when the student does not exist.
pub async fn lock_student(
    client: &impl GenericClient,
    student_id: StudentId,
) -> Result<bool, PgError> {
    let row = client
        .timed_query_opt(
            "SELECT id FROM placement.students WHERE id = $1 FOR UPDATE",
            &[&student_id],
            "lock_student",
        )
        .await?;
    Ok(row.is_some())
}

pub async fn mark_submitted(
    client: &impl GenericClient,
    student_id: StudentId,
    submitted_at: DateTime<Utc>,
) -> Result<u64, PgError> {
    client
        .timed_execute(
            "UPDATE placement.students
             SET assessment_submitted = true, submitted_at = $2
             WHERE id = $1",
            &[&student_id, &submitted_at],
            "mark_submitted",
        )
        .await
}

pub async fn submitted_student_ids(
    client: &impl GenericClient,
) -> Result<Vec<StudentId>, PgError> {
    let rows = client
        .timed_query(
            "SELECT id FROM placement.students WHERE assessment_submitted ORDER BY id",
            &[],
            "submitted_student_ids",
        )
        .await?;
    Ok(rows.iter().map(|row| row.get::<_, i64>("id")).collect())
}

pub async fn active_internship_ids(
    client: &impl GenericClient,
) -> Result<Vec<InternshipId>, PgError> {
    let rows = client
        .timed_query(
            "SELECT id FROM placement.internships WHERE is_active ORDER BY id",
            &[],
            "active_internship_ids",
        )
        .await?;
    Ok(rows.iter().map(|row| row.get::<_, i64>("id")).collect())
}
