#![allow(async_fn_in_trait)]

use std::future::Future;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use deadpool_postgres::GenericClient;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error as PgError, Row, ToStatement};
use tracing::warn;

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// `PM_DB_LOG_MIN_DURATION_MS`; unset, zero or unparsable disables it.
fn slow_statement_threshold() -> Option<Duration> {
    static THRESHOLD: OnceLock<Option<Duration>> = OnceLock::new();

    *THRESHOLD.get_or_init(|| {
        parse_threshold(std::env::var("PM_DB_LOG_MIN_DURATION_MS").ok())
            .map(Duration::from_millis)
    })
}

fn parse_threshold(raw: Option<String>) -> Option<u64> {
    raw.and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
}

async fn timed<T>(label: &str, statement: impl Future<Output = T>) -> T {
    let Some(threshold) = slow_statement_threshold() else {
        return statement.await;
    };

    let started = Instant::now();
    let output = statement.await;
    let elapsed = started.elapsed();
    if elapsed >= threshold {
        warn!(
            statement = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow statement"
        );
    }
    output
}

/// `GenericClient` calls tagged with a label for slow-statement logging.
pub trait TimedClientExt: GenericClient {
    async fn timed_query<S>(
        &self,
        statement: &S,
        params: Params<'_>,
        label: &str,
    ) -> Result<Vec<Row>, PgError>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        timed(label, self.query(statement, params)).await
    }

    async fn timed_query_opt<S>(
        &self,
        statement: &S,
        params: Params<'_>,
        label: &str,
    ) -> Result<Option<Row>, PgError>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        timed(label, self.query_opt(statement, params)).await
    }

    async fn timed_query_one<S>(
        &self,
        statement: &S,
        params: Params<'_>,
        label: &str,
    ) -> Result<Row, PgError>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        timed(label, self.query_one(statement, params)).await
    }

    async fn timed_execute<S>(
        &self,
        statement: &S,
        params: Params<'_>,
        label: &str,
    ) -> Result<u64, PgError>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        timed(label, self.execute(statement, params)).await
    }
}

impl<T: GenericClient + ?Sized> TimedClientExt for T {}
