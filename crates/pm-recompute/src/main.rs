use std::time::Instant;

use clap::Parser;
use dotenvy::dotenv;
use pm_common::db::{
    DbPoolError, MigrationError, PgMatchingStore, create_pool_from_url_checked, run_migrations,
};
use pm_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use pm_common::matching::RankedMatch;
use pm_common::{
    EngineError, MatchingConfig, MatchingEngine, RecomputeReport, StoredMatch,
    StudentId,
};
use pm_metrics::{init_metrics, record_students, record_sweep};
use thiserror::Error;
use tracing::{error, info};

const APP_NAME: &str = "pm-recompute";
const DEFAULT_METRICS_PORT: u16 = 9187;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "pm-recompute",
    about = "Recompute ranked internship matches for submitted students"
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Recompute a single student instead of every submitted one
    #[arg(long)]
    student_id: Option<StudentId>,

    /// Print the stored ranking of --student-id without recomputing
    #[arg(long, requires = "student_id", default_value_t = false)]
    show: bool,

    /// Matches kept per student
    #[arg(long, env = "PM_MATCH_TOP_K")]
    top_k: Option<usize>,

    /// Students recomputed at once during a sweep
    #[arg(long, env = "PM_RECOMPUTE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Apply pending schema migrations before running
    #[arg(long, default_value_t = false)]
    migrate: bool,

    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Expose Prometheus metrics on PM_METRICS_PORT while running
    #[arg(long, default_value_t = false)]
    metrics: bool,
}

#[derive(Debug, Error)]
enum RecomputeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Pool(#[from] DbPoolError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("{failed} of {total} students failed to recompute")]
    SweepIncomplete { failed: usize, total: usize },
}

fn matching_config(cli: &Cli) -> Result<MatchingConfig, RecomputeError> {
    let mut config = MatchingConfig::from_env();

    if let Some(top_k) = cli.top_k {
        if top_k == 0 {
            return Err(RecomputeError::InvalidConfig(
                "PM_MATCH_TOP_K must be positive".into(),
            ));
        }
        config.top_k = top_k;
    }

    if let Some(concurrency) = cli.concurrency {
        if concurrency == 0 {
            return Err(RecomputeError::InvalidConfig(
                "PM_RECOMPUTE_CONCURRENCY must be positive".into(),
            ));
        }
        config.concurrency = concurrency;
    }

    Ok(config)
}

fn print_ranking(
    student_id: StudentId,
    ranked: &[RankedMatch],
    json: bool,
) -> Result<(), RecomputeError> {
    if json {
        println!("{}", serde_json::to_string_pretty(ranked)?);
        return Ok(());
    }

    println!("student {student_id}: {} match(es)", ranked.len());
    for (idx, m) in ranked.iter().enumerate() {
        println!("  #{} internship={} score={:.2}", idx + 1, m.internship_id, m.score);
    }
    Ok(())
}

fn print_stored(
    student_id: StudentId,
    stored: &[StoredMatch],
    json: bool,
) -> Result<(), RecomputeError> {
    if json {
        println!("{}", serde_json::to_string_pretty(stored)?);
        return Ok(());
    }

    println!("student {student_id}: {} stored match(es)", stored.len());
    for m in stored {
        println!("  #{} internship={} score={:.2}", m.rank, m.internship_id, m.score);
    }
    Ok(())
}

fn print_report(report: &RecomputeReport, json: bool) -> Result<(), RecomputeError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "run {}: {} student(s), {} ok, {} failed, {} internship(s) considered",
        report.run_id,
        report.students_total(),
        report.succeeded.len(),
        report.failures.len(),
        report.internships_considered
    );
    for failure in &report.failures {
        println!("  student {} failed: {}", failure.student_id, failure.error);
    }
    Ok(())
}

/// `(succeeded, failed)` for a single-student run.
fn outcome_counts<T, E>(outcome: &Result<T, E>) -> (usize, usize) {
    if outcome.is_ok() { (1, 0) } else { (0, 1) }
}

async fn run() -> Result<(), RecomputeError> {
    dotenv().ok();
    init_tracing_subscriber(APP_NAME);
    install_tracing_panic_hook(APP_NAME);

    let cli = Cli::parse();
    let config = matching_config(&cli)?;

    if cli.metrics {
        init_metrics("PM_METRICS_PORT", DEFAULT_METRICS_PORT);
    }

    let pool = create_pool_from_url_checked(&cli.database_url).await?;
    if cli.migrate {
        run_migrations(&pool).await?;
    }

    info!(top_k = config.top_k, concurrency = config.concurrency, "pm-recompute starting");
    let engine = MatchingEngine::new(PgMatchingStore::new(pool), config);

    match cli.student_id {
        Some(student_id) if cli.show => {
            let stored = engine.stored_matches(student_id).await?;
            print_stored(student_id, &stored, cli.json)
        }
        Some(student_id) => {
            let outcome = engine.recompute_student(student_id).await;
            let (ok, failed) = outcome_counts(&outcome);
            record_students(ok, failed);
            print_ranking(student_id, &outcome?, cli.json)
        }
        None => {
            let started = Instant::now();
            let report = engine.recompute_all().await?;
            record_sweep(report.succeeded.len(), report.failures.len(), started.elapsed());
            print_report(&report, cli.json)?;

            if report.is_clean() {
                Ok(())
            } else {
                Err(RecomputeError::SweepIncomplete {
                    failed: report.failures.len(),
                    total: report.students_total(),
                })
            }
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "pm-recompute failed");
        std::process::exit(1);
    }
}
