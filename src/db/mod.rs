use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Handle on the job registry: the durable source of truth for
/// client-visible job status.
#[derive(Clone)]
pub struct JobRegistry {
    pool: PgPool,
    table: String,
    record_ttl_secs: u64,
}

impl JobRegistry {
    pub fn new(pool: PgPool, table: impl Into<String>, record_ttl_secs: u64) -> Self {
        Self {
            pool,
            table: table.into(),
            record_ttl_secs,
        }
    }
}
