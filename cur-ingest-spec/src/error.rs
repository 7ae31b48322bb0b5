/*!
Error type for the cost-export data model.
*/

use thiserror::Error;

#[derive(Error, Debug)]
/// Errors raised while parsing or validating the data model
pub enum Error {
    /// Invalid format
    #[error("{0} doesn't have the right format")]
    InvalidFormat(String),
    /// Required field missing from a vendor manifest
    #[error("manifest is missing required field {0}")]
    ManifestMalformed(String),
    /// Value not found
    #[error("{0} {1} not found")]
    NotFound(String, String),
    /// Serde json
    #[error("serde json error")]
    JSONSerde(#[from] serde_json::Error),
    /// Chrono parse
    #[error("chrono parse error")]
    Chrono(#[from] chrono::ParseError),
    /// Regex error
    #[error("regex error")]
    Regex(#[from] regex::Error),
}
