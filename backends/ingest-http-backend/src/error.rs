use thiserror::Error;

#[derive(Error, Debug)]
/// Errors specific to the HTTP SQL client and its write path.
pub enum Error {
    /// The configured base URL couldn't be parsed.
    #[error(transparent)]
    BadUrl(#[from] url::ParseError),

    /// The HTTP request itself failed (connection, TLS, timeout).
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// The warehouse returned a non-2xx status with a body we can show.
    #[error("query failed with status {status}: {body}")]
    QueryFailed {
        /// HTTP status code returned
        status: u16,
        /// Response body, truncated to a reasonable length
        body: String,
    },

    /// The response body wasn't the shape we expected (e.g. JSON decode).
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    /// A connection string the backend couldn't parse or use.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
}

impl From<Error> for cur_ingest::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::QueryFailed { .. } | Error::UnexpectedResponse(_) => {
                cur_ingest::Error::BackendWrite(value.to_string())
            }
            Error::InvalidConnectionString(msg) => cur_ingest::Error::ConfigInvalid(msg),
            other => cur_ingest::Error::Transport(other.to_string()),
        }
    }
}
