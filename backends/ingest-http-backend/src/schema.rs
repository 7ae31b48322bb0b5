/*!
DDL helpers and identifier quoting for the HTTP SQL dialect: backtick-quoted
`database`.`table` references, and the `load_state` table bootstrap.

Mutations on an already-written table (the version-swap protocol's
`is_current` flips) use `ALTER TABLE ... UPDATE`, which this family of
warehouses applies as an asynchronous mutation rather than an
in-transaction write — there is no multi-statement transaction to wrap
them in, which is why [`crate::state_store`] follows the flip-then-clear
order from spec.md §4.7's non-transactional fallback instead.
*/

use crate::{client::HttpSqlClient, error::Error};

const LOAD_STATE_TABLE: &str = "load_state";

/// Backtick-quote a single identifier.
pub fn quote_ident(name: &str) -> String {
    format!("`{name}`")
}

/// A dialect-correct `database`.`table` reference.
pub fn qualified(database: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(database), quote_ident(table))
}

/// The qualified name of the `load_state` table in `database`.
pub fn load_state_table(database: &str) -> String {
    qualified(database, LOAD_STATE_TABLE)
}

/// Create the `load_state` table if it doesn't already exist.
pub async fn ensure_load_state_table(client: &HttpSqlClient) -> Result<(), Error> {
    let table = load_state_table(client.database());
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            vendor String,
            export_name String,
            billing_period String,
            version_id String,
            data_format_version String,
            is_current UInt8,
            started_at String,
            completed_at Nullable(String),
            status String,
            row_count Nullable(Int64),
            file_count Int64,
            error_message Nullable(String)
        ) ENGINE = MergeTree ORDER BY (vendor, export_name, billing_period, version_id)"
    );
    client.execute(&sql).await
}

/// `CREATE DATABASE IF NOT EXISTS`, for the dataset a load writes into.
pub async fn ensure_database(client: &HttpSqlClient, database: &str) -> Result<(), Error> {
    client
        .execute(&format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database)))
        .await
}

/// Does `database.table` exist?
pub async fn table_exists(client: &HttpSqlClient, database: &str, table: &str) -> Result<bool, Error> {
    let sql = format!(
        "SELECT 1 FROM system.tables WHERE database = '{}' AND name = '{}'",
        escape(database),
        escape(table)
    );
    Ok(!client.query_rows(&sql).await?.is_empty())
}

/// The columns of `database.table`, in declared order.
pub async fn table_columns(client: &HttpSqlClient, database: &str, table: &str) -> Result<Vec<String>, Error> {
    let sql = format!(
        "SELECT name FROM system.columns WHERE database = '{}' AND table = '{}' ORDER BY position",
        escape(database),
        escape(table)
    );
    let rows = client.query_rows(&sql).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect())
}

/// List tables in `database` whose name matches `<export_sanitized>_%`,
/// excluding any ending `_unified`.
pub async fn tables_for_export(client: &HttpSqlClient, database: &str, export_sanitized: &str) -> Result<Vec<String>, Error> {
    let sql = format!(
        "SELECT name FROM system.tables WHERE database = '{}' AND name LIKE '{}_%'",
        escape(database),
        escape(export_sanitized)
    );
    let rows = client.query_rows(&sql).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .filter(|name| !name.ends_with("_unified"))
        .collect())
}

/// Escape a literal for embedding in a single-quoted SQL string.
pub fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_backtick_quotes_both_parts() {
        assert_eq!(qualified("aws_billing", "acme_2024_01"), "`aws_billing`.`acme_2024_01`");
    }

    #[test]
    fn escape_handles_quotes_and_backslashes() {
        assert_eq!(escape("it's"), "it\\'s");
        assert_eq!(escape(r"a\b"), r"a\\b");
    }
}
