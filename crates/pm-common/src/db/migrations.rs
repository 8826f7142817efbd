use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "reference tables, scores, weights and ranked matches",
        sql: r#"
CREATE TABLE IF NOT EXISTS placement.students (
    id BIGINT PRIMARY KEY,
    display_name TEXT NOT NULL DEFAULT '',
    assessment_submitted BOOLEAN NOT NULL DEFAULT false,
    submitted_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS placement.internships (
    id BIGINT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    is_active BOOLEAN NOT NULL DEFAULT true
);

CREATE TABLE IF NOT EXISTS placement.skill_groups (
    id BIGINT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS placement.skills (
    id BIGINT PRIMARY KEY,
    group_id BIGINT NOT NULL REFERENCES placement.skill_groups(id),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS placement.skill_scores (
    student_id BIGINT NOT NULL REFERENCES placement.students(id) ON DELETE CASCADE,
    skill_id BIGINT NOT NULL REFERENCES placement.skills(id),
    score DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (student_id, skill_id),
    CONSTRAINT chk_skill_score_range CHECK (score >= 1.0 AND score <= 5.0)
);

CREATE TABLE IF NOT EXISTS placement.group_weights (
    internship_id BIGINT NOT NULL REFERENCES placement.internships(id) ON DELETE CASCADE,
    group_id BIGINT NOT NULL REFERENCES placement.skill_groups(id),
    weight INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (internship_id, group_id),
    CONSTRAINT chk_group_weight_range CHECK (weight >= 0 AND weight <= 100)
);

CREATE TABLE IF NOT EXISTS placement.skill_weights (
    internship_id BIGINT NOT NULL REFERENCES placement.internships(id) ON DELETE CASCADE,
    skill_id BIGINT NOT NULL REFERENCES placement.skills(id),
    weight INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (internship_id, skill_id),
    CONSTRAINT chk_skill_weight_range CHECK (weight >= 0 AND weight <= 100)
);

CREATE TABLE IF NOT EXISTS placement.matches (
    student_id BIGINT NOT NULL REFERENCES placement.students(id) ON DELETE CASCADE,
    internship_id BIGINT NOT NULL REFERENCES placement.internships(id) ON DELETE CASCADE,
    rank INTEGER NOT NULL,
    score DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (student_id, rank),
    CONSTRAINT uq_matches_student_internship UNIQUE (student_id, internship_id),
    CONSTRAINT chk_match_rank CHECK (rank >= 1),
    CONSTRAINT chk_match_score_range CHECK (score >= 0.0 AND score <= 100.0)
);
"#,
    },
    Migration {
        id: 2,
        description: "lookup indexes for criteria loading and admin views",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_internships_active
    ON placement.internships(id) WHERE is_active;
CREATE INDEX IF NOT EXISTS idx_students_submitted
    ON placement.students(id) WHERE assessment_submitted;
CREATE INDEX IF NOT EXISTS idx_skills_group
    ON placement.skills(group_id);
CREATE INDEX IF NOT EXISTS idx_matches_internship
    ON placement.matches(internship_id);
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS placement;
             CREATE TABLE IF NOT EXISTS placement.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM placement.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO placement.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
