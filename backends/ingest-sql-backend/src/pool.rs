/*!
Connecting an [`sqlx::AnyPool`] from a connection string, covering both
Postgres and SQLite (including `sqlite::memory:`, used by this crate's
own tests and by `ingest-sql-backend`'s in-memory-state integration
tests in the workspace).
*/

use std::sync::Once;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::{dialect::Dialect, error::Error};

static INSTALL_DRIVERS: Once = Once::new();

fn ensure_drivers_installed() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Connect to `url`, returning both the pool and the dialect it speaks.
pub async fn connect(url: &str) -> Result<(AnyPool, Dialect), Error> {
    let dialect = Dialect::from_url(url)
        .ok_or_else(|| Error::InvalidConnectionString(url.to_string()))?;

    ensure_drivers_installed();

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;

    Ok((pool, dialect))
}
