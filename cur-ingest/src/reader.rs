/*!
The Data Reader: streams rows from CSV (optionally gzipped) or Parquet
blobs as column-keyed records. Column names containing `/` are rewritten
to `_` before emission.

A file is never materialized fully in memory: Parquet is read directly
off the object store in batches, and CSV is streamed through a bounded
channel fed by a blocking reader task.
*/

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::DataType;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use object_store::{path::Path, ObjectStore};
use parquet::arrow::async_reader::ParquetObjectReader;
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Error;

/// A single record, keyed by (already-normalized) column name.
pub type Row = BTreeMap<String, Value>;

/// A boxed stream of rows, the shape every reader implementation produces.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row, Error>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The file format a data file is read as.
pub enum FileFormat {
    /// Plain, uncompressed CSV
    Csv,
    /// Gzip-compressed CSV
    CsvGzip,
    /// Parquet
    Parquet,
}

impl FileFormat {
    /// Detect format by file extension, for the `export_format: auto` policy.
    pub fn sniff(key: &str) -> Option<FileFormat> {
        if key.ends_with(".parquet") {
            Some(FileFormat::Parquet)
        } else if key.ends_with(".csv.gz") || key.ends_with(".csv.zip") {
            Some(FileFormat::CsvGzip)
        } else if key.ends_with(".csv") {
            Some(FileFormat::Csv)
        } else {
            None
        }
    }
}

/// Rewrite `/` to `_` in a column name.
fn normalize_column_name(name: &str) -> String {
    name.replace('/', "_")
}

#[async_trait]
/// A source of rows for a single data file. Backends that ingest
/// natively from the object store never construct one of these.
pub trait DataReader: Send + Sync {
    /// Stream the rows of `key`, bounded in memory regardless of file size.
    async fn read(&self, key: &str, format: FileFormat) -> Result<RowStream, Error>;
}

/// The generic fallback reader, backed directly by the object store.
pub struct GenericReader {
    store: Arc<dyn ObjectStore>,
    channel_capacity: usize,
}

impl GenericReader {
    /// Build a reader over `store` with a bounded producer/consumer
    /// channel capacity.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        GenericReader {
            store,
            channel_capacity: 256,
        }
    }
}

#[async_trait]
impl DataReader for GenericReader {
    async fn read(&self, key: &str, format: FileFormat) -> Result<RowStream, Error> {
        match format {
            FileFormat::Parquet => read_parquet(Arc::clone(&self.store), key).await,
            FileFormat::Csv | FileFormat::CsvGzip => {
                read_csv(Arc::clone(&self.store), key, format, self.channel_capacity).await
            }
        }
    }
}

async fn read_parquet(store: Arc<dyn ObjectStore>, key: &str) -> Result<RowStream, Error> {
    let path: Path = key.into();
    let meta = store
        .head(&path)
        .await
        .map_err(|err| match err {
            object_store::Error::NotFound { path, .. } => Error::ObjectNotFound(path.to_string()),
            other => Error::ObjectStore(other),
        })?;

    let object_reader = ParquetObjectReader::new(store, meta);
    let stream_builder = ParquetRecordBatchStreamBuilder::new(object_reader)
        .await?
        .build()?;

    let rows = stream_builder.flat_map(|batch_result| {
        let items: Vec<Result<Row, Error>> = match batch_result {
            Ok(batch) => batch_to_rows(&batch),
            Err(err) => vec![Err(Error::Parquet(err))],
        };
        futures::stream::iter(items)
    });

    Ok(Box::pin(rows))
}

fn batch_to_rows(batch: &arrow::array::RecordBatch) -> Vec<Result<Row, Error>> {
    let schema = batch.schema();
    let mut rows: Vec<Row> = (0..batch.num_rows()).map(|_| Row::new()).collect();

    for (col_idx, field) in schema.fields().iter().enumerate() {
        let column = batch.column(col_idx);
        let name = normalize_column_name(field.name());
        for (row_idx, row) in rows.iter_mut().enumerate() {
            row.insert(name.clone(), arrow_value_to_json(column, row_idx));
        }
    }

    rows.into_iter().map(Ok).collect()
}

/// Convert one cell of an Arrow array to a JSON value. Falls back to a
/// debug-formatted string for array types not explicitly covered.
fn arrow_value_to_json(array: &dyn Array, idx: usize) -> Value {
    if array.is_null(idx) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(idx).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(idx).to_string()),
        DataType::Boolean => Value::Bool(array.as_boolean().value(idx)),
        DataType::Int8 => Value::from(array.as_primitive::<arrow::datatypes::Int8Type>().value(idx)),
        DataType::Int16 => Value::from(array.as_primitive::<arrow::datatypes::Int16Type>().value(idx)),
        DataType::Int32 => Value::from(array.as_primitive::<arrow::datatypes::Int32Type>().value(idx)),
        DataType::Int64 => Value::from(array.as_primitive::<arrow::datatypes::Int64Type>().value(idx)),
        DataType::UInt8 => Value::from(array.as_primitive::<arrow::datatypes::UInt8Type>().value(idx)),
        DataType::UInt16 => Value::from(array.as_primitive::<arrow::datatypes::UInt16Type>().value(idx)),
        DataType::UInt32 => Value::from(array.as_primitive::<arrow::datatypes::UInt32Type>().value(idx)),
        DataType::UInt64 => Value::from(array.as_primitive::<arrow::datatypes::UInt64Type>().value(idx)),
        DataType::Float32 => Value::from(array.as_primitive::<arrow::datatypes::Float32Type>().value(idx)),
        DataType::Float64 => Value::from(array.as_primitive::<arrow::datatypes::Float64Type>().value(idx)),
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            Value::String(format!("{:?}", array.slice(idx, 1)))
        }
        _ => Value::String(format!("{:?}", array.slice(idx, 1))),
    }
}

async fn read_csv(
    store: Arc<dyn ObjectStore>,
    key: &str,
    format: FileFormat,
    channel_capacity: usize,
) -> Result<RowStream, Error> {
    let path: Path = key.into();
    let get_result = store.get(&path).await.map_err(|err| match err {
        object_store::Error::NotFound { path, .. } => Error::ObjectNotFound(path.to_string()),
        other => Error::ObjectStore(other),
    })?;

    // Spill to the scratch file chunk by chunk as the object store streams
    // it in, so a multi-GB monthly file never sits fully in memory.
    let mut byte_stream = get_result.into_stream();
    let mut scratch = tempfile::NamedTempFile::new()?;
    {
        use std::io::Write;
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|err| match err {
                object_store::Error::NotFound { path, .. } => Error::ObjectNotFound(path.to_string()),
                other => Error::ObjectStore(other),
            })?;
            scratch.write_all(&chunk)?;
        }
        scratch.flush()?;
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Row, Error>>(channel_capacity);
    let key_for_errors = key.to_string();
    let scratch_path = scratch.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        let result = run_sync_csv_read(&scratch_path, format, &tx);
        if let Err(err) = result {
            let _ = tx.blocking_send(Err(Error::ManifestMalformed(format!(
                "{key_for_errors}: {err}"
            ))));
        }
        // `scratch` (the NamedTempFile) is dropped here, deleting the
        // per-manifest scratch copy once the blocking read finishes.
        drop(scratch);
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

fn run_sync_csv_read(
    path: &std::path::Path,
    format: FileFormat,
    tx: &tokio::sync::mpsc::Sender<Result<Row, Error>>,
) -> Result<(), Error> {
    let file = std::fs::File::open(path)?;
    let reader: Box<dyn std::io::Read> = match format {
        FileFormat::CsvGzip => Box::new(flate2::read::GzDecoder::new(file)),
        FileFormat::Csv => Box::new(file),
        FileFormat::Parquet => unreachable!("parquet is handled by read_parquet"),
    };

    let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(normalize_column_name)
        .collect();

    for record in csv_reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            row.insert(name.clone(), Value::String(value.to_string()));
        }
        if tx.blocking_send(Ok(row)).is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_detects_known_extensions() {
        assert_eq!(FileFormat::sniff("a/b/file.parquet"), Some(FileFormat::Parquet));
        assert_eq!(FileFormat::sniff("a/b/file.csv.gz"), Some(FileFormat::CsvGzip));
        assert_eq!(FileFormat::sniff("a/b/file.csv"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::sniff("a/b/file.txt"), None);
    }

    #[test]
    fn normalize_column_name_rewrites_slash() {
        assert_eq!(normalize_column_name("lineItem/UnblendedCost"), "lineItem_UnblendedCost");
        assert_eq!(normalize_column_name("bill/BillingPeriodStartDate"), "bill_BillingPeriodStartDate");
    }
}
