use std::str::FromStr;

use deadpool_postgres::{
    Config, CreatePoolError, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
};
use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::info;

pub type PgPool = Pool;

const DEFAULT_POOL_MAX_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidConfig(String),
    #[error("failed to create database pool: {0}")]
    PoolCreation(#[from] CreatePoolError),
    #[error("database is unreachable: {0}")]
    Unreachable(#[from] PoolError),
    #[error("database ping failed: {0}")]
    Ping(#[from] tokio_postgres::Error),
}

/// `PM_DB_POOL_MAX_SIZE`, falling back to 16 when unset or not positive.
fn pool_max_size(raw: Option<String>) -> usize {
    raw.and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(DEFAULT_POOL_MAX_SIZE)
}

/// Build a pool without connecting.
pub fn create_pool_from_url(db_url: &str) -> Result<PgPool, DbPoolError> {
    tokio_postgres::Config::from_str(db_url)
        .map_err(|e| DbPoolError::InvalidConfig(e.to_string()))?;

    let mut cfg = Config::new();
    cfg.url = Some(db_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(pool_max_size(
        std::env::var("PM_DB_POOL_MAX_SIZE").ok(),
    )));

    Ok(cfg.create_pool(Some(Runtime::Tokio1), NoTls)?)
}

/// Like [`create_pool_from_url`], but fails fast when no connection can be made.
pub async fn create_pool_from_url_checked(db_url: &str) -> Result<PgPool, DbPoolError> {
    let pool = create_pool_from_url(db_url)?;
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    info!(max_size = pool.status().max_size, "database pool ready");
    Ok(pool)
}
