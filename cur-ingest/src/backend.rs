/*!
The Backend Adapter interface: a uniform seam between the orchestrator
and any analytical database, plus the state-store contract every
adapter must provide.
*/

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cur_ingest_spec::{BillingPeriod, Vendor};

use crate::{
    error::Error,
    reader::{DataReader, FileFormat, RowStream},
    store::Credentials,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a write should treat the destination table's existing contents.
pub enum WriteDisposition {
    /// Drop and rewrite the destination entirely (separate-tables strategy).
    Replace,
    /// Delete rows matching this billing period, then append the new
    /// rows (single-table strategy). Backends with multi-statement
    /// transactions should wrap delete+append in one; backends without
    /// must sequence the two steps so readers never see a half-applied
    /// month.
    ReplacePeriod(BillingPeriod),
}

#[derive(Debug, Clone)]
/// One row of `current_versions()`.
pub struct CurrentVersion {
    /// The billing period this row describes
    pub billing_period: BillingPeriod,
    /// The current load's version id
    pub version_id: String,
    /// The manifest format version the load was read under
    pub data_format_version: String,
    /// When the load completed
    pub loaded_at: DateTime<Utc>,
    /// Rows written by the load
    pub row_count: i64,
    /// Data files the load consumed
    pub file_count: i64,
}

#[derive(Debug, Clone)]
/// One row of `version_history()`.
pub struct HistoryEntry {
    /// The load's version id
    pub version_id: String,
    /// Whether this is the (v,e,p)'s current version
    pub is_current: bool,
    /// When the load started
    pub started_at: DateTime<Utc>,
    /// When the load completed, if it did
    pub completed_at: Option<DateTime<Utc>>,
    /// Rows written, valid only when completed
    pub row_count: Option<i64>,
    /// Data files the load attempted
    pub file_count: i64,
    /// Failure message, valid only when failed
    pub error_message: Option<String>,
}

#[async_trait]
/// Persistent map from (vendor, export, billing_period, version_id) to
/// load status and the per-month "current" pointer.
pub trait StateStore: Send + Sync {
    /// True iff a completed record exists for this exact key.
    async fn is_version_loaded(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
    ) -> Result<bool, Error>;

    /// Upsert a `started` record: reset an existing key to `started` and
    /// clear its error, or insert a fresh one.
    async fn start_load(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
        data_format_version: &str,
        file_count: i64,
    ) -> Result<(), Error>;

    /// The version-swap protocol: clear `is_current` on every sibling
    /// record for (v,e,p), then mark this one current and completed.
    /// Implementations without multi-statement transactions must perform
    /// the two steps in whichever order their backend can make atomic.
    async fn complete_load(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
        row_count: i64,
    ) -> Result<(), Error>;

    /// Mark a record failed, capturing `message` verbatim.
    async fn fail_load(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
        version_id: &str,
        message: String,
    ) -> Result<(), Error>;

    /// The current version of every billing period for (vendor, export),
    /// newest billing period first.
    async fn current_versions(
        &self,
        vendor: Vendor,
        export: &str,
    ) -> Result<Vec<CurrentVersion>, Error>;

    /// Every load attempt for (vendor, export, billing_period), newest
    /// `started_at` first.
    async fn version_history(
        &self,
        vendor: Vendor,
        export: &str,
        period: BillingPeriod,
    ) -> Result<Vec<HistoryEntry>, Error>;

    /// The distinct exports this store has any record for, one entry per
    /// (vendor, export), used by `list-exports`.
    async fn known_exports(&self) -> Result<Vec<(Vendor, String)>, Error>;
}

#[async_trait]
/// An analytical database this system can load into.
pub trait Backend: Send + Sync {
    /// Stable, lowercase identifier used in config and the registry.
    fn name(&self) -> &'static str;

    /// Human-readable connection summary, for logging only.
    fn connection_descriptor(&self) -> String;

    /// Dialect-correct fully-qualified table name.
    fn table_reference(&self, dataset: &str, table: &str) -> String;

    /// True if this backend can ingest data files directly from the
    /// object store without a local reader.
    fn supports_native_object_store(&self) -> bool;

    /// Create or return this backend's state store.
    async fn state_store(&self) -> Result<Arc<dyn StateStore>, Error>;

    /// A reader for this backend, or `None` if it ingests natively.
    fn data_reader(&self) -> Option<Arc<dyn DataReader>>;

    /// Write `rows` into `dataset.table` with the given disposition. Used
    /// when `data_reader()` is `Some`.
    async fn write_table(
        &self,
        dataset: &str,
        table: &str,
        disposition: WriteDisposition,
        rows: RowStream,
    ) -> Result<i64, Error>;

    /// Ingest `data_files` directly, bypassing the generic reader. Used
    /// when `supports_native_object_store()` is true. `bucket` is the
    /// source bucket/container `data_files` are relative to, needed to
    /// address them from the backend's own SQL table functions.
    async fn ingest_native(
        &self,
        dataset: &str,
        table: &str,
        disposition: WriteDisposition,
        bucket: &str,
        data_files: &[String],
        format: FileFormat,
        credentials: &Credentials,
    ) -> Result<i64, Error>;

    /// (Re)build the per-export unified view.
    async fn refresh_unified_view(&self, dataset: &str, export_sanitized: &str) -> Result<(), Error>;
}
