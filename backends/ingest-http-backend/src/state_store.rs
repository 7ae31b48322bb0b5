/*!
[`HttpStateStore`]: the [`StateStore`](cur_ingest::StateStore) contract
over the HTTP SQL dialect. This warehouse family has no multi-statement
transactions, so `complete_load` follows spec.md §4.7's fallback order:
mark the new record `completed`/`is_current=1` first, then clear
`is_current` on its siblings. Callers of `current_versions` may
therefore observe a brief window with two current rows for the same
(vendor, export, billing_period); [`current_versions`] resolves that by
preferring the row with the latest `completed_at`, per spec.md §7's
`StateStoreInconsistent` handling.
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cur_ingest::{CurrentVersion, Error as IngestError, HistoryEntry, StateStore};
use cur_ingest_spec::{BillingPeriod, Vendor};
use serde_json::Value;

use crate::{client::HttpSqlClient, error::Error, schema};

/// A `StateStore` over a ClickHouse-style `load_state` table.
pub struct HttpStateStore {
    client: HttpSqlClient,
}

impl HttpStateStore {
    /// Connect (schema already bootstrapped by the caller) and wrap `client`.
    pub async fn new(client: HttpSqlClient) -> Result<Self, Error> {
        schema::ensure_load_state_table(&client).await?;
        Ok(HttpStateStore { client })
    }

    fn table(&self) -> String {
        schema::load_state_table(self.client.database())
    }
}

#[async_trait]
impl StateStore for HttpStateStore {
    async fn is_version_loaded(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
    ) -> Result<bool, IngestError> {
        let table = self.table();
        let sql = format!(
            "SELECT 1 FROM {table} WHERE vendor = '{}' AND export_name = '{}' AND billing_period = '{}' AND version_id = '{}' AND status = 'completed'",
            schema::escape(&vendor.to_string()),
            schema::escape(export),
            schema::escape(&period.to_string()),
            schema::escape(version_id),
        );
        let rows = self.client.query_rows(&sql).await.map_err(Error::from)?;
        Ok(!rows.is_empty())
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
        let where_clause = format!(
            "vendor = '{}' AND export_name = '{}' AND billing_period = '{}' AND version_id = '{}'",
            schema::escape(&vendor.to_string()),
            schema::escape(export),
            schema::escape(&period.to_string()),
            schema::escape(version_id),
        );

        let exists = !self
            .client
            .query_rows(&format!("SELECT 1 FROM {table} WHERE {where_clause}"))
            .await
            .map_err(Error::from)?
            .is_empty();

        if exists {
            let sql = format!(
                "ALTER TABLE {table} UPDATE status = 'started', started_at = '{now}', file_count = {file_count}, error_message = NULL, is_current = 0 WHERE {where_clause}"
            );
            self.client.execute(&sql).await.map_err(Error::from)?;
        } else {
            let sql = format!(
                "INSERT INTO {table} (vendor, export_name, billing_period, version_id, data_format_version, is_current, started_at, status, file_count) VALUES ('{}', '{}', '{}', '{}', '{}', 0, '{now}', 'started', {file_count})",
                schema::escape(&vendor.to_string()),
                schema::escape(export),
                schema::escape(&period.to_string()),
                schema::escape(version_id),
                schema::escape(data_format_version),
            );
            self.client.execute(&sql).await.map_err(Error::from)?;
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
        let now = Utc::now().to_rfc3339();
        let this_where = format!(
            "vendor = '{}' AND export_name = '{}' AND billing_period = '{}' AND version_id = '{}'",
            schema::escape(&vendor.to_string()),
            schema::escape(export),
            schema::escape(&period.to_string()),
            schema::escape(version_id),
        );

        // Flip this record current+completed first; only then clear the
        // siblings. A crash between the two statements leaves two current
        // rows rather than zero, which `current_versions` resolves below.
        let complete_sql = format!(
            "ALTER TABLE {table} UPDATE status = 'completed', completed_at = '{now}', row_count = {row_count}, is_current = 1 WHERE {this_where}"
        );
        self.client.execute(&complete_sql).await.map_err(Error::from)?;

        let clear_sql = format!(
            "ALTER TABLE {table} UPDATE is_current = 0 WHERE vendor = '{}' AND export_name = '{}' AND billing_period = '{}' AND version_id != '{}'",
            schema::escape(&vendor.to_string()),
            schema::escape(export),
            schema::escape(&period.to_string()),
            schema::escape(version_id),
        );
        self.client.execute(&clear_sql).await.map_err(Error::from)?;

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
            "ALTER TABLE {table} UPDATE status = 'failed', error_message = '{}', is_current = 0 WHERE vendor = '{}' AND export_name = '{}' AND billing_period = '{}' AND version_id = '{}'",
            schema::escape(&message),
            schema::escape(&vendor.to_string()),
            schema::escape(export),
            schema::escape(&period.to_string()),
            schema::escape(version_id),
        );
        self.client.execute(&sql).await.map_err(Error::from)?;
        Ok(())
    }

    async fn current_versions(&self, vendor: Vendor, export: &str) -> Result<Vec<CurrentVersion>, IngestError> {
        let table = self.table();
        let sql = format!(
            "SELECT billing_period, version_id, data_format_version, completed_at, row_count, file_count FROM {table} WHERE vendor = '{}' AND export_name = '{}' AND is_current = 1 ORDER BY billing_period DESC, completed_at DESC",
            schema::escape(&vendor.to_string()),
            schema::escape(export),
        );
        let rows = self.client.query_rows(&sql).await.map_err(Error::from)?;

        let mut out: Vec<CurrentVersion> = Vec::new();
        let mut seen_periods = std::collections::HashSet::new();
        for row in rows {
            let period_str = field_str(&row, "billing_period")?;
            // Rows are ordered newest-completed-first within a period, so
            // the first one seen per period is the one to trust if a
            // transient two-current window is in effect.
            if !seen_periods.insert(period_str.clone()) {
                continue;
            }
            let completed_at = field_opt_str(&row, "completed_at");
            out.push(CurrentVersion {
                billing_period: BillingPeriod::parse(&period_str).map_err(cur_ingest_spec::Error::from)?,
                version_id: field_str(&row, "version_id")?,
                data_format_version: field_str(&row, "data_format_version")?,
                loaded_at: completed_at
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()?
                    .ok_or_else(|| IngestError::StateStoreInconsistent(format!("current version of {period_str} has no completed_at")))?,
                row_count: field_opt_i64(&row, "row_count").unwrap_or(0),
                file_count: field_opt_i64(&row, "file_count").unwrap_or(0),
            });
        }
        Ok(out)
    }

    async fn version_history(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
    ) -> Result<Vec<HistoryEntry>, IngestError> {
        let table = self.table();
        let sql = format!(
            "SELECT version_id, is_current, started_at, completed_at, row_count, file_count, error_message FROM {table} WHERE vendor = '{}' AND export_name = '{}' AND billing_period = '{}' ORDER BY started_at DESC",
            schema::escape(&vendor.to_string()),
            schema::escape(export),
            schema::escape(&period.to_string()),
        );
        let rows = self.client.query_rows(&sql).await.map_err(Error::from)?;

        rows.into_iter()
            .map(|row| {
                Ok(HistoryEntry {
                    version_id: field_str(&row, "version_id")?,
                    is_current: field_opt_i64(&row, "is_current").unwrap_or(0) != 0,
                    started_at: parse_timestamp(&field_str(&row, "started_at")?)?,
                    completed_at: field_opt_str(&row, "completed_at").map(|s| parse_timestamp(&s)).transpose()?,
                    row_count: field_opt_i64(&row, "row_count"),
                    file_count: field_opt_i64(&row, "file_count").unwrap_or(0),
                    error_message: field_opt_str(&row, "error_message"),
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()
    }

    async fn known_exports(&self) -> Result<Vec<(Vendor, String)>, IngestError> {
        let table = self.table();
        let sql = format!("SELECT DISTINCT vendor, export_name FROM {table}");
        let rows = self.client.query_rows(&sql).await.map_err(Error::from)?;
        rows.into_iter()
            .map(|row| {
                let vendor: Vendor = field_str(&row, "vendor")?.parse().map_err(cur_ingest_spec::Error::from)?;
                Ok((vendor, field_str(&row, "export_name")?))
            })
            .collect::<Result<Vec<_>, IngestError>>()
    }
}

fn field_str(row: &Value, key: &str) -> Result<String, IngestError> {
    row.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::StateStoreInconsistent(format!("missing field {key}")))
}

fn field_opt_str(row: &Value, key: &str) -> Option<String> {
    row.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn field_opt_i64(row: &Value, key: &str) -> Option<i64> {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(cur_ingest_spec::Error::from)
        .map_err(IngestError::from)
}
