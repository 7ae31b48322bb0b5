/*!
The native ingest path: for each data file, build a `s3()` or
`azureBlobStorage()` table-function reference (the backend's own
object-store reader) and hand the union of them straight to
`INSERT INTO ... SELECT`, so bytes never pass through this process. Used
only because `supports_native_object_store()` is `true`; [`write_table`]
exists to satisfy the `Backend` trait but is unreachable in practice,
the way `ingest-sql-backend::ingest_native` is unreachable for its
backend.
*/

use cur_ingest::{reader::FileFormat, store::Credentials, Error as IngestError, RowStream, WriteDisposition};

use crate::{client::HttpSqlClient, error::Error, schema};

fn format_clause(format: FileFormat) -> &'static str {
    match format {
        FileFormat::Csv => "CSVWithNames",
        FileFormat::CsvGzip => "CSVWithNames",
        FileFormat::Parquet => "Parquet",
    }
}

fn compression_clause(format: FileFormat) -> Option<&'static str> {
    matches!(format, FileFormat::CsvGzip).then_some("gzip")
}

/// One data file expressed as a table function call reading straight
/// from the source bucket/container.
fn table_function(bucket: &str, data_file: &str, format: FileFormat, credentials: &Credentials) -> String {
    let fmt = format_clause(format);
    match credentials {
        Credentials::Aws(creds) => {
            let uri = format!("https://{bucket}.s3.amazonaws.com/{data_file}");
            match (&creds.access_key_id, &creds.secret_access_key) {
                (Some(key), Some(secret)) => match compression_clause(format) {
                    Some(compression) => format!("s3('{uri}', '{key}', '{secret}', '{fmt}', '{compression}')"),
                    None => format!("s3('{uri}', '{key}', '{secret}', '{fmt}')"),
                },
                _ => match compression_clause(format) {
                    Some(compression) => format!("s3('{uri}', '{fmt}', '{compression}')"),
                    None => format!("s3('{uri}', '{fmt}')"),
                },
            }
        }
        Credentials::Azure(creds) => {
            let connection = creds
                .connection_string
                .clone()
                .unwrap_or_else(|| format!("DefaultEndpointsProtocol=https;AccountName={}", creds.account.clone().unwrap_or_default()));
            format!("azureBlobStorage('{connection}', '{bucket}', '{data_file}', '{fmt}')")
        }
    }
}

/// Build the `SELECT … UNION ALL …` spanning every data file, each read
/// through its own table function.
fn union_select(bucket: &str, data_files: &[String], format: FileFormat, credentials: &Credentials) -> String {
    data_files
        .iter()
        .map(|f| format!("SELECT * FROM {}", table_function(bucket, f, format, credentials)))
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

/// Ingest `data_files` directly into `database.table`, applying
/// `disposition`, and return the row count written.
pub async fn ingest_native(
    client: &HttpSqlClient,
    database: &str,
    table: &str,
    disposition: WriteDisposition,
    bucket: &str,
    data_files: &[String],
    format: FileFormat,
    credentials: &Credentials,
) -> Result<i64, IngestError> {
    schema::ensure_database(client, database).await.map_err(Error::from)?;
    let qualified_table = schema::qualified(database, table);

    if data_files.is_empty() {
        ensure_empty_table(client, database, table, matches!(disposition, WriteDisposition::ReplacePeriod(_)))
            .await
            .map_err(Error::from)?;
        return Ok(0);
    }

    let select = union_select(bucket, data_files, format, credentials);

    match disposition {
        WriteDisposition::Replace => {
            let drop_sql = format!("DROP TABLE IF EXISTS {qualified_table}");
            client.execute(&drop_sql).await.map_err(Error::from)?;
            let create_sql = format!(
                "CREATE TABLE {qualified_table} ENGINE = MergeTree ORDER BY tuple() AS {select}"
            );
            client.execute(&create_sql).await.map_err(Error::from)?;
        }
        WriteDisposition::ReplacePeriod(period) => {
            let exists = schema::table_exists(client, database, table).await.map_err(Error::from)?;
            if !exists {
                let create_sql = format!(
                    "CREATE TABLE {qualified_table} ENGINE = MergeTree ORDER BY tuple() AS SELECT *, '{}' AS billing_period FROM ({select}) AS src",
                    period
                );
                client.execute(&create_sql).await.map_err(Error::from)?;
            } else {
                let delete_sql = format!(
                    "ALTER TABLE {qualified_table} DELETE WHERE billing_period = '{}'",
                    period
                );
                client.execute(&delete_sql).await.map_err(Error::from)?;
                let insert_sql = format!(
                    "INSERT INTO {qualified_table} SELECT *, '{}' AS billing_period FROM ({select}) AS src",
                    period
                );
                client.execute(&insert_sql).await.map_err(Error::from)?;
            }
        }
    }

    let count_sql = match disposition {
        WriteDisposition::Replace => format!("SELECT count() AS n FROM {qualified_table}"),
        WriteDisposition::ReplacePeriod(period) => format!(
            "SELECT count() AS n FROM {qualified_table} WHERE billing_period = '{}'",
            period
        ),
    };
    let rows = client.query_rows(&count_sql).await.map_err(Error::from)?;
    let row_count = rows
        .first()
        .and_then(|row| row.get("n"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    Ok(row_count)
}

/// A manifest with zero data files still needs its table to exist.
async fn ensure_empty_table(client: &HttpSqlClient, database: &str, table: &str, with_billing_period: bool) -> Result<(), Error> {
    let qualified_table = schema::qualified(database, table);
    let column = if with_billing_period { "billing_period String" } else { "_empty_manifest String" };
    let sql = format!("CREATE TABLE IF NOT EXISTS {qualified_table} ({column}) ENGINE = MergeTree ORDER BY tuple()");
    client.execute(&sql).await
}

/// Unreachable in practice: this backend declares
/// `supports_native_object_store() = true`, so the orchestrator never
/// constructs a `RowStream` to hand it. Kept to satisfy the `Backend`
/// trait uniformly across backends.
pub async fn write_table(
    _client: &HttpSqlClient,
    _database: &str,
    _table: &str,
    _disposition: WriteDisposition,
    _rows: RowStream,
) -> Result<i64, IngestError> {
    Err(IngestError::ConfigInvalid(
        "the http backend ingests natively; write_table should never be called".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cur_ingest::store::AwsCredentials;

    #[test]
    fn table_function_embeds_access_keys_when_present() {
        let creds = Credentials::Aws(AwsCredentials {
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("secret".into()),
            session_token: None,
            region: None,
        });
        let call = table_function("bucket", "cur/acme/data.csv", FileFormat::Csv, &creds);
        assert!(call.starts_with("s3("));
        assert!(call.contains("AKIA"));
        assert!(call.contains("CSVWithNames"));
    }

    #[test]
    fn table_function_omits_keys_when_absent() {
        let creds = Credentials::Aws(AwsCredentials::default());
        let call = table_function("bucket", "cur/acme/data.parquet", FileFormat::Parquet, &creds);
        assert_eq!(call, "s3('https://bucket.s3.amazonaws.com/cur/acme/data.parquet', 'Parquet')");
    }

    #[test]
    fn csv_gzip_adds_compression_argument() {
        let creds = Credentials::Aws(AwsCredentials::default());
        let call = table_function("bucket", "cur/acme/data.csv.gz", FileFormat::CsvGzip, &creds);
        assert!(call.ends_with("'gzip')"));
    }

    #[test]
    fn union_select_joins_every_file() {
        let creds = Credentials::Aws(AwsCredentials::default());
        let files = vec!["a.csv".to_string(), "b.csv".to_string()];
        let sql = union_select("bucket", &files, FileFormat::Csv, &creds);
        assert_eq!(sql.matches("UNION ALL").count(), 1);
        assert!(sql.contains("a.csv"));
        assert!(sql.contains("b.csv"));
    }
}
