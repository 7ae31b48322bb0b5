/*!
Data model for cloud cost-and-usage export ingestion: the normalized
[`Manifest`](manifest::Manifest), the closed [`ColumnType`](column::ColumnType)
set vendor schemas are mapped into, the persisted [`LoadRecord`](load_record::LoadRecord),
and the export-name sanitizer that derives data table names.

This crate has no I/O. It is the vocabulary the rest of the workspace
shares, the way `iceberg-rust-spec` is to `iceberg-rust`.
*/

pub mod billing_period;
pub mod column;
pub mod error;
pub mod export_name;
pub mod load_record;
pub mod manifest;
pub mod sanitize;
pub mod vendor;

pub use billing_period::BillingPeriod;
pub use column::{Column, ColumnType};
pub use error::Error;
pub use export_name::ExportName;
pub use load_record::{LoadKey, LoadRecord, LoadStatus};
pub use manifest::Manifest;
pub use vendor::{FormatVersion, Vendor};
