/*!
DDL helpers: dataset/table naming per dialect, and the `load_state` and
data-table schema bootstrap. Every column in both tables is `TEXT`
(booleans and counts included, stored as `0`/`1` and decimal text) so a
single code path binds `AnyPool` values without needing dialect-specific
type mapping — the ambient-engine equivalent of the original's "just
make DuckDB/ClickHouse agree on strings" approach.
*/

use sqlx::AnyPool;

use crate::{dialect::Dialect, error::Error};

/// Fully-qualified name for `dataset.table` under `dialect`: a real
/// `schema.table` reference for Postgres, or a flattened
/// `dataset_table` name for SQLite, which has no schemas.
pub fn qualified(dialect: Dialect, dataset: &str, table: &str) -> String {
    match dialect {
        Dialect::Postgres => format!("{dataset}.{table}"),
        Dialect::Sqlite => format!("{dataset}_{table}"),
    }
}

/// Make sure `dataset` exists as a schema. A no-op for SQLite, which
/// flattens datasets into the table name instead.
pub async fn ensure_dataset(pool: &AnyPool, dialect: Dialect, dataset: &str) -> Result<(), Error> {
    if dialect == Dialect::Postgres {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {dataset}");
        sqlx::query(&sql).execute(pool).await?;
    }
    Ok(())
}

const LOAD_STATE_DATASET: &str = "billing_state";
const LOAD_STATE_TABLE: &str = "load_state";

/// The qualified name of the `load_state` table for `dialect`.
pub fn load_state_table(dialect: Dialect) -> String {
    qualified(dialect, LOAD_STATE_DATASET, LOAD_STATE_TABLE)
}

/// Create the `load_state` table (and its dataset) if absent.
pub async fn ensure_load_state_table(pool: &AnyPool, dialect: Dialect) -> Result<(), Error> {
    ensure_dataset(pool, dialect, LOAD_STATE_DATASET).await?;
    let table = load_state_table(dialect);
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            vendor TEXT NOT NULL,
            export_name TEXT NOT NULL,
            billing_period TEXT NOT NULL,
            version_id TEXT NOT NULL,
            data_format_version TEXT NOT NULL,
            is_current TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL,
            row_count TEXT,
            file_count TEXT NOT NULL,
            error_message TEXT,
            PRIMARY KEY (vendor, export_name, billing_period, version_id)
        )"
    );
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// `DROP TABLE IF EXISTS` for a replace-disposition write.
pub async fn drop_table_if_exists(pool: &AnyPool, qualified_table: &str) -> Result<(), Error> {
    let sql = format!("DROP TABLE IF EXISTS {qualified_table}");
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// Create a data table with `columns` (all `TEXT`), optionally adding a
/// `billing_period TEXT` column for the single-table strategy.
pub async fn create_data_table(
    pool: &AnyPool,
    qualified_table: &str,
    columns: &[String],
    with_billing_period: bool,
) -> Result<(), Error> {
    let mut defs: Vec<String> = Vec::new();
    if with_billing_period {
        defs.push("billing_period TEXT".to_string());
    }
    defs.extend(columns.iter().map(|c| format!("{c} TEXT")));
    if defs.is_empty() {
        // A manifest whose data files yielded zero data rows and zero
        // header columns (an empty CSV, for instance) still needs a
        // table to exist for the unified view and any later ALTER/DELETE.
        defs.push("_empty_manifest TEXT".to_string());
    }
    let sql = format!("CREATE TABLE IF NOT EXISTS {qualified_table} ({})", defs.join(", "));
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// `ALTER TABLE ... ADD COLUMN` for a column discovered mid-load that
/// wasn't in the table's first batch. Mapped to
/// `Error::SchemaEvolutionConflict` by the caller if it fails — the
/// backend rejected the type/shape change for this month's table.
pub async fn add_column(pool: &AnyPool, qualified_table: &str, column: &str) -> Result<(), sqlx::Error> {
    let sql = format!("ALTER TABLE {qualified_table} ADD COLUMN {column} TEXT");
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// Delete every row for `billing_period` ahead of an append, for the
/// single-table strategy.
pub async fn delete_period(
    pool: &AnyPool,
    dialect: Dialect,
    qualified_table: &str,
    billing_period: &str,
) -> Result<(), Error> {
    let sql = format!(
        "DELETE FROM {qualified_table} WHERE billing_period = {}",
        dialect.placeholder(1)
    );
    sqlx::query(&sql).bind(billing_period).execute(pool).await?;
    Ok(())
}

/// List the tables in `dataset` whose name matches `<export_sanitized>_%`,
/// excluding any table ending in `_unified` (the view itself). SQLite
/// has no schemas, so its tables are matched by the flattened
/// `dataset_` prefix instead.
pub async fn tables_for_export(
    pool: &AnyPool,
    dialect: Dialect,
    dataset: &str,
    export_sanitized: &str,
) -> Result<Vec<String>, Error> {
    let (sql, like_pattern): (String, String) = match dialect {
        Dialect::Postgres => (
            "SELECT table_name FROM information_schema.tables WHERE table_schema = {schema} AND table_name LIKE {pattern}"
                .replace("{schema}", &dialect.placeholder(1))
                .replace("{pattern}", &dialect.placeholder(2)),
            format!("{export_sanitized}_%"),
        ),
        Dialect::Sqlite => (
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE {pattern}"
                .replace("{pattern}", &dialect.placeholder(1)),
            format!("{dataset}_{export_sanitized}_%"),
        ),
    };

    let rows = match dialect {
        Dialect::Postgres => {
            sqlx::query_as::<_, (String,)>(&sql)
                .bind(dataset)
                .bind(&like_pattern)
                .fetch_all(pool)
                .await?
        }
        Dialect::Sqlite => {
            sqlx::query_as::<_, (String,)>(&sql)
                .bind(&like_pattern)
                .fetch_all(pool)
                .await?
        }
    };

    let prefix_to_strip = match dialect {
        Dialect::Postgres => String::new(),
        Dialect::Sqlite => format!("{dataset}_"),
    };

    Ok(rows
        .into_iter()
        .map(|(name,)| name.strip_prefix(prefix_to_strip.as_str()).unwrap_or(&name).to_string())
        .filter(|name| !name.ends_with("_unified"))
        .collect())
}

/// The columns of `qualified_table`, in declared order. `billing_period`
/// (the single-table strategy's internal bookkeeping column) is included
/// only when `include_billing_period` is set — callers building INSERTs
/// need it, callers building the unified view's column list don't.
pub async fn table_columns(
    pool: &AnyPool,
    dialect: Dialect,
    dataset: &str,
    table_name: &str,
    include_billing_period: bool,
) -> Result<Vec<String>, Error> {
    let (sql, binds): (String, Vec<String>) = match dialect {
        Dialect::Postgres => (
            "SELECT column_name FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position".to_string(),
            vec![dataset.to_string(), table_name.to_string()],
        ),
        Dialect::Sqlite => {
            let qualified = format!("{dataset}_{table_name}");
            (format!("PRAGMA table_info({qualified})"), vec![])
        }
    };

    let columns = match dialect {
        Dialect::Postgres => {
            let mut query = sqlx::query_as::<_, (String,)>(&sql);
            for bind in &binds {
                query = query.bind(bind);
            }
            let rows = query.fetch_all(pool).await?;
            rows.into_iter().map(|(name,)| name).collect::<Vec<_>>()
        }
        Dialect::Sqlite => {
            // PRAGMA table_info columns: cid, name, type, notnull, dflt_value, pk
            let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
                sqlx::query_as(&sql).fetch_all(pool).await?;
            rows.into_iter().map(|(_, name, ..)| name).collect::<Vec<_>>()
        }
    };

    Ok(if include_billing_period {
        columns
    } else {
        columns.into_iter().filter(|name| name != "billing_period").collect()
    })
}

/// Does `dataset.table_name` (or its flattened SQLite equivalent) exist?
pub async fn table_exists(pool: &AnyPool, dialect: Dialect, dataset: &str, table_name: &str) -> Result<bool, Error> {
    match dialect {
        Dialect::Postgres => {
            let sql = "SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2";
            let row: Option<(i32,)> = sqlx::query_as(sql).bind(dataset).bind(table_name).fetch_optional(pool).await?;
            Ok(row.is_some())
        }
        Dialect::Sqlite => {
            let qualified = format!("{dataset}_{table_name}");
            let sql = "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?";
            let row: Option<(i32,)> = sqlx::query_as(sql).bind(&qualified).fetch_optional(pool).await?;
            Ok(row.is_some())
        }
    }
}
