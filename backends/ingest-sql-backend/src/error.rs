use thiserror::Error;

#[derive(Error, Debug)]
/// Errors specific to the sqlx-backed state store and writer.
pub enum Error {
    /// A sqlx driver/pool/query error.
    #[error("sql error")]
    SqlError(#[from] sqlx::Error),

    /// A sqlx migration error.
    #[error("migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// A connection string the backend couldn't parse or use.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
}

impl From<Error> for cur_ingest::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::SqlError(err) => cur_ingest::Error::BackendWrite(err.to_string()),
            other => cur_ingest::Error::BackendWrite(other.to_string()),
        }
    }
}
