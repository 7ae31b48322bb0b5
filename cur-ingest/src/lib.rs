/*!
The ingestion engine: manifest discovery, normalization, the streaming
data reader, the `Backend`/`StateStore` seams, the backend registry, the
orchestrator's load pipeline, and the unified view builder.

`cur-ingest-spec` is the vocabulary this crate's I/O operates on, the way
`iceberg-rust-spec` is to `iceberg-rust`.
*/

pub mod backend;
pub mod error;
pub mod manifest_locator;
pub mod manifest_normalizer;
pub mod orchestrator;
pub mod reader;
pub mod registry;
pub mod store;
pub mod unified_view;

pub use backend::{Backend, CurrentVersion, HistoryEntry, StateStore, WriteDisposition};
pub use error::Error;
pub use manifest_locator::ManifestRef;
pub use orchestrator::{CancellationToken, SourceConfig, Strategy, Summary};
pub use reader::{DataReader, FileFormat, Row, RowStream};
pub use registry::{BackendConfig, BackendFactory, BackendRegistry};
pub use store::{AwsCredentials, AzureCredentials, Credentials};

pub use cur_ingest_spec::{
    BillingPeriod, Column, ColumnType, ExportName, FormatVersion, LoadKey, LoadRecord, LoadStatus,
    Manifest, Vendor,
};
