/*!
The Orchestrator: enumerate → skip-or-load decision → start → stream →
commit or fail → refresh unified view.
*/

use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};

use cur_ingest_spec::{BillingPeriod, ExportName, FormatVersion, Manifest, Vendor};
use tracing::{info, info_span, warn, Instrument};

use crate::{
    backend::{Backend, StateStore, WriteDisposition},
    error::Error,
    manifest_locator, manifest_normalizer,
    reader::FileFormat,
    store::{self, Credentials},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which table layout strategy to load into.
pub enum Strategy {
    /// One table per (export, billing_period); the default.
    Separate,
    /// One `billing_data` table with a `billing_period` column.
    Single,
}

/// Source coordinates and locator parameters for one run.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Which vendor's manifests to locate
    pub vendor: Vendor,
    /// Bucket or container the export lives in
    pub bucket: String,
    /// Path prefix (AWS) or directory (Azure) under the bucket
    pub prefix: String,
    /// Caller-supplied logical export name
    pub export_name: ExportName,
    /// Manifest schema version (AWS only; ignored for Azure)
    pub format_version: FormatVersion,
    /// Inclusive start of the billing-period range to load
    pub start: Option<BillingPeriod>,
    /// Inclusive end of the billing-period range to load
    pub end: Option<BillingPeriod>,
    /// Force reload regardless of recorded state
    pub reset: bool,
    /// Azure only: whether the export is partitioned (one execution
    /// subfolder per month, possibly several data files) or single-file
    /// (one CSV directly in the month folder, version id parsed from its
    /// name). Ignored for AWS. Caller-supplied, not auto-detected —
    /// mirrors the original `AzureHandler(partitioned=...)` constructor
    /// argument.
    pub azure_partitioned: bool,
    /// Table layout strategy
    pub strategy: Strategy,
    /// Format override; `None` means auto-detect per data file
    pub export_format: Option<FileFormat>,
    /// Object-store credentials
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Default)]
/// The run's outcome, one entry per manifest processed.
pub struct Summary {
    /// Tables successfully (re)loaded, with their row counts
    pub loaded: Vec<(String, i64)>,
    /// Manifests skipped because already loaded
    pub skipped: Vec<BillingPeriod>,
    /// Manifests that failed, with their error message
    pub failed: Vec<(BillingPeriod, String)>,
}

/// Signals cooperative cancellation: checked between manifests and
/// between data files within a manifest.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that starts uncancelled.
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run the import pipeline to completion.
pub async fn run(
    backend: Arc<dyn Backend>,
    source: &SourceConfig,
    cancellation: &CancellationToken,
    continue_on_error: bool,
) -> Result<Summary, Error> {
    let object_store = store::build_object_store(&source.bucket, &source.credentials)?;
    let state_store = backend.state_store().await?;
    let dataset = format!("{}_billing", source.vendor);

    let manifest_refs = manifest_locator::locate(
        object_store.as_ref(),
        source.vendor,
        &source.bucket,
        &source.prefix,
        source.export_name.as_str(),
        source.format_version,
        source.start,
        source.end,
    )
    .await?;

    let mut summary = Summary::default();

    for manifest_ref in manifest_refs {
        if cancellation.is_cancelled() {
            break;
        }

        let span = info_span!(
            "load",
            vendor = %source.vendor,
            export = %source.export_name,
            billing_period = %manifest_ref.billing_period,
        );

        let outcome = process_one_manifest(
            backend.as_ref(),
            state_store.as_ref(),
            object_store.as_ref(),
            source,
            &dataset,
            &manifest_ref,
            cancellation,
        )
        .instrument(span)
        .await;

        match outcome {
            Ok(ManifestOutcome::Loaded { table, row_count }) => {
                summary.loaded.push((table, row_count));
            }
            Ok(ManifestOutcome::Skipped) => {
                summary.skipped.push(manifest_ref.billing_period);
            }
            Err(err) => {
                summary.failed.push((manifest_ref.billing_period, err.to_string()));
                if !continue_on_error {
                    return Err(err);
                }
            }
        }
    }

    if !summary.loaded.is_empty() {
        let sanitized = cur_ingest_spec::sanitize::sanitize_export(&source.export_name);
        backend.refresh_unified_view(&dataset, &sanitized).await?;
    }

    Ok(summary)
}

enum ManifestOutcome {
    Loaded { table: String, row_count: i64 },
    Skipped,
}

async fn process_one_manifest(
    backend: &dyn Backend,
    state_store: &dyn StateStore,
    object_store: &dyn object_store::ObjectStore,
    source: &SourceConfig,
    dataset: &str,
    manifest_ref: &manifest_locator::ManifestRef,
    cancellation: &CancellationToken,
) -> Result<ManifestOutcome, Error> {
    let manifest = fetch_and_normalize(object_store, source, manifest_ref).await?;

    if !source.reset
        && state_store
            .is_version_loaded(
                source.vendor,
                source.export_name.as_str(),
                manifest.billing_period,
                &manifest.version_id,
            )
            .await?
    {
        info!(version_id = %manifest.version_id, "skip, already loaded");
        return Ok(ManifestOutcome::Skipped);
    }

    state_store
        .start_load(
            source.vendor,
            source.export_name.as_str(),
            manifest.billing_period,
            &manifest.version_id,
            &manifest.format_version.to_string(),
            manifest.file_count() as i64,
        )
        .await?;

    match load_manifest(backend, source, dataset, &manifest, cancellation).await {
        Ok((table, row_count)) => {
            state_store
                .complete_load(
                    source.vendor,
                    source.export_name.as_str(),
                    manifest.billing_period,
                    &manifest.version_id,
                    row_count,
                )
                .await?;
            Ok(ManifestOutcome::Loaded { table, row_count })
        }
        Err(err) => {
            let message = if cancellation.is_cancelled() {
                "cancelled".to_string()
            } else {
                err.to_string()
            };
            state_store
                .fail_load(
                    source.vendor,
                    source.export_name.as_str(),
                    manifest.billing_period,
                    &manifest.version_id,
                    message,
                )
                .await?;
            Err(err)
        }
    }
}

async fn fetch_and_normalize(
    object_store: &dyn object_store::ObjectStore,
    source: &SourceConfig,
    manifest_ref: &manifest_locator::ManifestRef,
) -> Result<Manifest, Error> {
    match source.vendor {
        Vendor::Aws => {
            let bytes = store::get_bytes(object_store, &manifest_ref.key).await?;
            match manifest_ref.format_version {
                FormatVersion::V1 => manifest_normalizer::normalize_aws_v1(
                    &bytes,
                    &source.export_name,
                    manifest_ref.billing_period,
                )
                .map_err(Error::from),
                FormatVersion::V2 => manifest_normalizer::normalize_aws_v2(
                    &bytes,
                    &source.export_name,
                    manifest_ref.billing_period,
                )
                .map_err(Error::from),
            }
        }
        Vendor::Azure => {
            let data_files = if source.azure_partitioned {
                let prefix = manifest_ref
                    .key
                    .rsplit_once('/')
                    .map(|(dir, _)| dir.to_string())
                    .unwrap_or_else(|| manifest_ref.key.clone());
                let siblings = store::list_under_prefix(object_store, &prefix).await?;
                siblings
                    .into_iter()
                    .map(|o| o.location.to_string())
                    .filter(|key| key.ends_with(".csv") || key.ends_with(".csv.gz"))
                    .collect()
            } else {
                vec![manifest_ref.key.clone()]
            };
            manifest_normalizer::normalize_azure(
                manifest_ref,
                &source.export_name,
                source.azure_partitioned,
                data_files,
            )
            .map_err(Error::from)
        }
    }
}

/// Compute the table name for this manifest and run the write (separate
/// or single-table strategy), returning (table_name, row_count).
async fn load_manifest(
    backend: &dyn Backend,
    source: &SourceConfig,
    dataset: &str,
    manifest: &Manifest,
    cancellation: &CancellationToken,
) -> Result<(String, i64), Error> {
    let table = match source.strategy {
        Strategy::Separate => {
            cur_ingest_spec::sanitize::table_name(&source.export_name, &manifest.billing_period)
        }
        Strategy::Single => "billing_data".to_string(),
    };

    let disposition = match source.strategy {
        Strategy::Separate => WriteDisposition::Replace,
        Strategy::Single => WriteDisposition::ReplacePeriod(manifest.billing_period),
    };

    if backend.supports_native_object_store() {
        let format = source.export_format.unwrap_or(FileFormat::Parquet);
        let row_count = backend
            .ingest_native(
                dataset,
                &table,
                disposition,
                &source.bucket,
                &manifest.data_files,
                format,
                &source.credentials,
            )
            .await?;
        return Ok((table, row_count));
    }

    let reader = backend
        .data_reader()
        .ok_or_else(|| Error::ConfigInvalid(format!("backend {} has no data reader", backend.name())))?;

    // A replace (or replace-period) disposition must apply once to the
    // whole manifest, not once per data file — otherwise each file's
    // write would drop the rows the previous file just wrote. Every
    // file's rows are read in listed order into one combined stream and
    // handed to the backend in a single `write_table` call; file order
    // and in-file row order are both preserved.
    let rows = combined_row_stream(reader, manifest.data_files.clone(), source.export_format, cancellation.clone());
    let total_rows = backend.write_table(dataset, &table, disposition, rows).await?;

    Ok((table, total_rows))
}

/// Build one `RowStream` spanning every data file in `data_files`, read
/// in order. Reads happen lazily as the stream is polled, so only one
/// file's bytes are in flight at a time.
fn combined_row_stream(
    reader: std::sync::Arc<dyn crate::reader::DataReader>,
    data_files: Vec<String>,
    export_format: Option<FileFormat>,
    cancellation: CancellationToken,
) -> crate::reader::RowStream {
    use futures::StreamExt;

    let per_file = futures::stream::iter(data_files).then(move |data_file| {
        let reader = std::sync::Arc::clone(&reader);
        let cancellation = cancellation.clone();
        async move {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let format = export_format
                .or_else(|| FileFormat::sniff(&data_file))
                .unwrap_or(FileFormat::Csv);
            reader.read(&data_file, format).await.map_err(|err| {
                warn!(data_file = %data_file, error = %err, "data file read failed");
                err
            })
        }
    });

    Box::pin(per_file.flat_map(|result| match result {
        Ok(stream) => stream,
        Err(err) => Box::pin(futures::stream::once(async move { Err(err) })) as crate::reader::RowStream,
    }))
}
