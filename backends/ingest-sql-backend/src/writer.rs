/*!
Writing a [`RowStream`] into a dialect-qualified table: create-or-evolve
the destination, apply the write disposition, then insert in batches.
Every column binds as `TEXT` (or SQL `NULL`), matching the all-text
schema in [`schema`].
*/

use cur_ingest::{Error as IngestError, Row, RowStream, WriteDisposition};
use futures::StreamExt;
use serde_json::Value;
use sqlx::AnyPool;

use crate::{dialect::Dialect, error::Error, schema};

const BATCH_SIZE: usize = 500;

/// Write every row of `rows` into `dataset.table`, applying `disposition`
/// first, and return the number of rows written.
pub async fn write_table(
    pool: &AnyPool,
    dialect: Dialect,
    dataset: &str,
    table: &str,
    disposition: WriteDisposition,
    rows: RowStream,
) -> Result<i64, IngestError> {
    let qualified_table = schema::qualified(dialect, dataset, table);
    schema::ensure_dataset(pool, dialect, dataset).await.map_err(Error::from)?;

    let with_billing_period = matches!(disposition, WriteDisposition::ReplacePeriod(_));
    let mut exists = schema::table_exists(pool, dialect, dataset, table).await.map_err(Error::from)?;

    match disposition {
        WriteDisposition::Replace => {
            if exists {
                schema::drop_table_if_exists(pool, &qualified_table).await.map_err(Error::from)?;
                exists = false;
            }
        }
        WriteDisposition::ReplacePeriod(period) => {
            if exists {
                schema::delete_period(pool, dialect, &qualified_table, &period.to_string())
                    .await
                    .map_err(Error::from)?;
            }
        }
    }

    let mut known_columns: Option<Vec<String>> = if exists {
        Some(
            schema::table_columns(pool, dialect, dataset, table, true)
                .await
                .map_err(Error::from)?,
        )
    } else {
        None
    };

    let mut total_rows: i64 = 0;
    let mut chunks = rows.chunks(BATCH_SIZE);

    while let Some(chunk) = chunks.next().await {
        let batch: Vec<Row> = chunk.into_iter().collect::<Result<Vec<Row>, IngestError>>()?;
        if batch.is_empty() {
            continue;
        }

        let mut batch_columns: Vec<String> = Vec::new();
        for row in &batch {
            for column in row.keys() {
                if !batch_columns.contains(column) {
                    batch_columns.push(column.clone());
                }
            }
        }

        match &mut known_columns {
            None => {
                schema::create_data_table(pool, &qualified_table, &batch_columns, with_billing_period)
                    .await
                    .map_err(Error::from)?;
                exists = true;
                let mut columns = if with_billing_period {
                    vec!["billing_period".to_string()]
                } else {
                    Vec::new()
                };
                columns.extend(batch_columns.iter().cloned());
                known_columns = Some(columns);
            }
            Some(existing) => {
                for column in &batch_columns {
                    if !existing.contains(column) {
                        schema::add_column(pool, &qualified_table, column).await.map_err(|err| {
                            IngestError::SchemaEvolutionConflict {
                                table: qualified_table.clone(),
                                detail: err.to_string(),
                            }
                        })?;
                        existing.push(column.clone());
                    }
                }
            }
        }

        let insert_columns = known_columns
            .as_ref()
            .expect("populated by the branch above on every path")
            .clone();

        let billing_period_value = match disposition {
            WriteDisposition::ReplacePeriod(period) => Some(period.to_string()),
            WriteDisposition::Replace => None,
        };

        insert_batch(pool, dialect, &qualified_table, &insert_columns, billing_period_value.as_deref(), &batch).await?;
        total_rows += batch.len() as i64;
    }

    // A manifest with zero surviving rows still needs its table created
    // so the unified view and future ALTER/DELETE calls have something
    // to target.
    if !exists {
        schema::create_data_table(pool, &qualified_table, &[], with_billing_period)
            .await
            .map_err(Error::from)?;
    }

    Ok(total_rows)
}

async fn insert_batch(
    pool: &AnyPool,
    dialect: Dialect,
    qualified_table: &str,
    columns: &[String],
    billing_period_value: Option<&str>,
    batch: &[Row],
) -> Result<(), IngestError> {
    let has_billing_period = columns.first().map(|c| c == "billing_period").unwrap_or(false);
    let data_columns: &[String] = if has_billing_period { &columns[1..] } else { columns };

    let column_list = columns.join(", ");
    let placeholder_list = dialect.placeholder_list(columns.len());
    let sql = format!("INSERT INTO {qualified_table} ({column_list}) VALUES ({placeholder_list})");

    for row in batch {
        let mut query = sqlx::query(&sql);
        if has_billing_period {
            query = query.bind(billing_period_value.map(|s| s.to_string()));
        }
        for column in data_columns {
            query = query.bind(value_to_bind(row.get(column)));
        }
        query.execute(pool).await.map_err(Error::from)?;
    }
    Ok(())
}

/// Render one cell as the text this all-TEXT schema stores, or `None`
/// for a SQL `NULL` (an absent column or a JSON `null`).
fn value_to_bind(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    }
}
