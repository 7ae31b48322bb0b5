/*!
[`SqlStateStore`]: the [`StateStore`](cur_ingest::StateStore) contract
backed by an `AnyPool`-connected SQL database. One wide `load_state`
table (bootstrapped on first use) backs every vendor/export; the
version-swap protocol from spec.md §4.7 runs inside a transaction on
both dialects, since both Postgres and SQLite support multi-statement
transactions (the "accept a brief inconsistency window" fallback in
spec.md §9 OQ1 is not needed here — see `ingest-http-backend` for the
dialect that does need it).
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cur_ingest::{CurrentVersion, Error as IngestError, HistoryEntry, StateStore};
use cur_ingest_spec::{BillingPeriod, Vendor};
use sqlx::AnyPool;

use crate::{dialect::Dialect, error::Error, schema};

/// A `StateStore` over `billing_state.load_state` (or its flattened
/// SQLite equivalent).
pub struct SqlStateStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlStateStore {
    /// Connect (or reuse) `pool` and make sure `load_state` exists.
    pub async fn new(pool: AnyPool, dialect: Dialect) -> Result<Self, Error> {
        schema::ensure_load_state_table(&pool, dialect).await?;
        Ok(SqlStateStore { pool, dialect })
    }

    fn table(&self) -> String {
        schema::load_state_table(self.dialect)
    }
}

fn row_exists_sql(dialect: Dialect, table: &str) -> String {
    format!(
        "SELECT 1 FROM {table} WHERE vendor = {p1} AND export_name = {p2} AND billing_period = {p3} AND version_id = {p4}",
        p1 = dialect.placeholder(1),
        p2 = dialect.placeholder(2),
        p3 = dialect.placeholder(3),
        p4 = dialect.placeholder(4),
    )
}

#[async_trait]
impl StateStore for SqlStateStore {
    async fn is_version_loaded(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
    ) -> Result<bool, IngestError> {
        let table = self.table();
        let sql = format!(
            "SELECT 1 FROM {table} WHERE vendor = {p1} AND export_name = {p2} AND billing_period = {p3} AND version_id = {p4} AND status = {p5}",
            p1 = self.dialect.placeholder(1),
            p2 = self.dialect.placeholder(2),
            p3 = self.dialect.placeholder(3),
            p4 = self.dialect.placeholder(4),
            p5 = self.dialect.placeholder(5),
        );
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(vendor.to_string())
            .bind(export)
            .bind(period.to_string())
            .bind(version_id)
            .bind("completed")
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(row.is_some())
    }

    async fn start_load(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
        data_format_version: &str,
        file_count: i64,
    ) -> Result<(), IngestError> {
        let table = self.table();
        let now = Utc::now().to_rfc3339();

        let exists: Option<(i64,)> = sqlx::query_as(&row_exists_sql(self.dialect, &table))
            .bind(vendor.to_string())
            .bind(export)
            .bind(period.to_string())
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;

        if exists.is_some() {
            let sql = format!(
                "UPDATE {table} SET status = {p1}, started_at = {p2}, file_count = {p3}, error_message = NULL, is_current = {p4}
                 WHERE vendor = {p5} AND export_name = {p6} AND billing_period = {p7} AND version_id = {p8}",
                p1 = self.dialect.placeholder(1),
                p2 = self.dialect.placeholder(2),
                p3 = self.dialect.placeholder(3),
                p4 = self.dialect.placeholder(4),
                p5 = self.dialect.placeholder(5),
                p6 = self.dialect.placeholder(6),
                p7 = self.dialect.placeholder(7),
                p8 = self.dialect.placeholder(8),
            );
            sqlx::query(&sql)
                .bind("started")
                .bind(&now)
                .bind(file_count.to_string())
                .bind("0")
                .bind(vendor.to_string())
                .bind(export)
                .bind(period.to_string())
                .bind(version_id)
                .execute(&self.pool)
                .await
                .map_err(Error::from)?;
        } else {
            let sql = format!(
                "INSERT INTO {table} (vendor, export_name, billing_period, version_id, data_format_version, is_current, started_at, status, file_count)
                 VALUES ({p1}, {p2}, {p3}, {p4}, {p5}, {p6}, {p7}, {p8}, {p9})",
                p1 = self.dialect.placeholder(1),
                p2 = self.dialect.placeholder(2),
                p3 = self.dialect.placeholder(3),
                p4 = self.dialect.placeholder(4),
                p5 = self.dialect.placeholder(5),
                p6 = self.dialect.placeholder(6),
                p7 = self.dialect.placeholder(7),
                p8 = self.dialect.placeholder(8),
                p9 = self.dialect.placeholder(9),
            );
            sqlx::query(&sql)
                .bind(vendor.to_string())
                .bind(export)
                .bind(period.to_string())
                .bind(version_id)
                .bind(data_format_version)
                .bind("0")
                .bind(&now)
                .bind("started")
                .bind(file_count.to_string())
                .execute(&self.pool)
                .await
                .map_err(Error::from)?;
        }
        Ok(())
    }

    async fn complete_load(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
        row_count: i64,
    ) -> Result<(), IngestError> {
        let table = self.table();
        let mut tx = self.pool.begin().await.map_err(Error::from)?;

        let clear_sql = format!(
            "UPDATE {table} SET is_current = {p1} WHERE vendor = {p2} AND export_name = {p3} AND billing_period = {p4} AND version_id <> {p5}",
            p1 = self.dialect.placeholder(1),
            p2 = self.dialect.placeholder(2),
            p3 = self.dialect.placeholder(3),
            p4 = self.dialect.placeholder(4),
            p5 = self.dialect.placeholder(5),
        );
        sqlx::query(&clear_sql)
            .bind("0")
            .bind(vendor.to_string())
            .bind(export)
            .bind(period.to_string())
            .bind(version_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;

        let complete_sql = format!(
            "UPDATE {table} SET status = {p1}, completed_at = {p2}, row_count = {p3}, is_current = {p4}
             WHERE vendor = {p5} AND export_name = {p6} AND billing_period = {p7} AND version_id = {p8}",
            p1 = self.dialect.placeholder(1),
            p2 = self.dialect.placeholder(2),
            p3 = self.dialect.placeholder(3),
            p4 = self.dialect.placeholder(4),
            p5 = self.dialect.placeholder(5),
            p6 = self.dialect.placeholder(6),
            p7 = self.dialect.placeholder(7),
            p8 = self.dialect.placeholder(8),
        );
        sqlx::query(&complete_sql)
            .bind("completed")
            .bind(Utc::now().to_rfc3339())
            .bind(row_count.to_string())
            .bind("1")
            .bind(vendor.to_string())
            .bind(export)
            .bind(period.to_string())
            .bind(version_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;

        tx.commit().await.map_err(Error::from)?;
        Ok(())
    }

    async fn fail_load(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
        message: String,
    ) -> Result<(), IngestError> {
        let table = self.table();
        let sql = format!(
            "UPDATE {table} SET status = {p1}, error_message = {p2}, is_current = {p3}
             WHERE vendor = {p4} AND export_name = {p5} AND billing_period = {p6} AND version_id = {p7}",
            p1 = self.dialect.placeholder(1),
            p2 = self.dialect.placeholder(2),
            p3 = self.dialect.placeholder(3),
            p4 = self.dialect.placeholder(4),
            p5 = self.dialect.placeholder(5),
            p6 = self.dialect.placeholder(6),
            p7 = self.dialect.placeholder(7),
        );
        sqlx::query(&sql)
            .bind("failed")
            .bind(message)
            .bind("0")
            .bind(vendor.to_string())
            .bind(export)
            .bind(period.to_string())
            .bind(version_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn current_versions(&self, vendor: Vendor, export: &str) -> Result<Vec<CurrentVersion>, IngestError> {
        let table = self.table();
        let sql = format!(
            "SELECT billing_period, version_id, data_format_version, completed_at, row_count, file_count
             FROM {table}
             WHERE vendor = {p1} AND export_name = {p2} AND is_current = {p3}
             ORDER BY billing_period DESC",
            p1 = self.dialect.placeholder(1),
            p2 = self.dialect.placeholder(2),
            p3 = self.dialect.placeholder(3),
        );
        let rows: Vec<(String, String, String, Option<String>, Option<String>, String)> = sqlx::query_as(&sql)
            .bind(vendor.to_string())
            .bind(export)
            .bind("1")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(period, version_id, fmt, completed_at, row_count, file_count)| {
                Ok(CurrentVersion {
                    billing_period: BillingPeriod::parse(&period).map_err(cur_ingest_spec::Error::from)?,
                    version_id,
                    data_format_version: fmt,
                    loaded_at: completed_at
                        .as_deref()
                        .map(parse_timestamp)
                        .transpose()?
                        .ok_or_else(|| {
                            IngestError::StateStoreInconsistent(format!(
                                "current version of {period} has no completed_at"
                            ))
                        })?,
                    row_count: row_count.and_then(|s| s.parse().ok()).unwrap_or(0),
                    file_count: file_count.parse().unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()
    }

    async fn version_history(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
    ) -> Result<Vec<HistoryEntry>, IngestError> {
        let table = self.table();
        let sql = format!(
            "SELECT version_id, is_current, started_at, completed_at, row_count, file_count, error_message
             FROM {table}
             WHERE vendor = {p1} AND export_name = {p2} AND billing_period = {p3}
             ORDER BY started_at DESC",
            p1 = self.dialect.placeholder(1),
            p2 = self.dialect.placeholder(2),
            p3 = self.dialect.placeholder(3),
        );
        let rows: Vec<(String, String, String, Option<String>, Option<String>, String, Option<String>)> =
            sqlx::query_as(&sql)
                .bind(vendor.to_string())
                .bind(export)
                .bind(period.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(Error::from)?;

        rows.into_iter()
            .map(|(version_id, is_current, started_at, completed_at, row_count, file_count, error_message)| {
                Ok(HistoryEntry {
                    version_id,
                    is_current: is_current == "1",
                    started_at: parse_timestamp(&started_at)?,
                    completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
                    row_count: row_count.and_then(|s| s.parse().ok()),
                    file_count: file_count.parse().unwrap_or(0),
                    error_message,
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()
    }

    async fn known_exports(&self) -> Result<Vec<(Vendor, String)>, IngestError> {
        let table = self.table();
        let sql = format!("SELECT DISTINCT vendor, export_name FROM {table}");
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(vendor, export)| {
                let vendor: Vendor = vendor.parse().map_err(cur_ingest_spec::Error::from)?;
                Ok((vendor, export))
            })
            .collect::<Result<Vec<_>, IngestError>>()
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(cur_ingest_spec::Error::from)
        .map_err(IngestError::from)
}
