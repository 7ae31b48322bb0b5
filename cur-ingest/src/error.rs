/*!
Error type for the ingestion engine.
*/

use thiserror::Error;

#[derive(Error, Debug)]
/// Errors raised by manifest discovery, normalization, reading, and the
/// orchestrator's load pipeline.
pub enum Error {
    /// A required configuration field was missing or invalid. Raised before
    /// any state mutation.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A transient object-store or state-store failure, surfaced after
    /// retries are exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// A manifest-listed key returned 404 on fetch.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A manifest's JSON failed to parse, or a required field was missing.
    #[error("manifest malformed: {0}")]
    ManifestMalformed(String),

    /// The backend rejected a column type change for an existing table.
    #[error("schema evolution conflict in {table}: {detail}")]
    SchemaEvolutionConflict {
        /// Table name that rejected the write
        table: String,
        /// Backend-reported detail
        detail: String,
    },

    /// The backend writer failed; message captured verbatim.
    #[error("backend write failed: {0}")]
    BackendWrite(String),

    /// The "at most one current" invariant was violated at read time.
    #[error("state store inconsistent for {0}: more than one current version")]
    StateStoreInconsistent(String),

    /// The named backend has no registered factory.
    #[error("backend '{requested}' not available; available backends: {available:?}")]
    BackendNotAvailable {
        /// The backend name that was requested
        requested: String,
        /// Names of backends that are registered
        available: Vec<String>,
    },

    /// The operator cancelled the run.
    #[error("cancelled")]
    Cancelled,

    /// Data model error from `cur-ingest-spec`.
    #[error(transparent)]
    Spec(#[from] cur_ingest_spec::Error),

    /// Object-store error.
    #[error("object store error")]
    ObjectStore(#[from] object_store::Error),

    /// CSV parsing error.
    #[error("csv error")]
    Csv(#[from] csv::Error),

    /// Parquet error.
    #[error("parquet error")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow error.
    #[error("arrow error")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Io error.
    #[error("io error")]
    IO(#[from] std::io::Error),

    /// Serde json.
    #[error("serde json error")]
    JSONSerde(#[from] serde_json::Error),

    /// Chrono parse.
    #[error("chrono parse error")]
    Chrono(#[from] chrono::ParseError),

    /// Regex error.
    #[error("regex error")]
    Regex(#[from] regex::Error),

    /// Url parse error.
    #[error("url parse error")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// True for failures worth retrying with backoff; false for "object
    /// not found" and everything else — those are never worth a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::ObjectStore(_))
    }
}
