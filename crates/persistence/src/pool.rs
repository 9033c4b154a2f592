//! Postgres pool construction with retry-with-backoff connect, exactly as
//! the teacher's TMF API crates set theirs up.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

/// Connects with 5 retries and doubling backoff, starting at 1s. Panics
/// if every attempt fails — this is a startup-fatal operation (§7).
pub async fn init_pool(database_url: &str) -> Pool<Postgres> {
    let mut retries = 5;
    let mut delay = 1;

    loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
        {
            Ok(pool) => return pool,
            Err(e) if retries > 0 => {
                log::warn!(
                    "failed to connect to database ({} retries left): {}",
                    retries,
                    e
                );
                retries -= 1;
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay *= 2;
            }
            Err(e) => panic!("failed to connect to database after retries: {e}"),
        }
    }
}
