/*!
[`ExportName`], the caller-supplied logical name for a stream of manifests.
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// A validated export name: at most 128 characters, `[A-Za-z0-9_-]` only.
pub struct ExportName(String);

impl ExportName {
    /// Validate and wrap a raw string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_LEN {
            return Err(Error::InvalidFormat(format!(
                "export name '{raw}' must be 1..={MAX_LEN} characters"
            )));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(Error::InvalidFormat(format!(
                "export name '{raw}' must match [A-Za-z0-9_-]"
            )));
        }
        Ok(ExportName(raw))
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ExportName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ExportName::parse(value)
    }
}

impl From<ExportName> for String {
    fn from(value: ExportName) -> Self {
        value.0
    }
}

impl AsRef<str> for ExportName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alphanumeric_underscore_and_dash() {
        assert!(ExportName::parse("acme-prod_1").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(ExportName::parse("").is_err());
    }

    #[test]
    fn rejects_over_max_len() {
        let raw = "a".repeat(129);
        assert!(ExportName::parse(raw).is_err());
    }

    #[test]
    fn accepts_exactly_max_len() {
        let raw = "a".repeat(128);
        assert!(ExportName::parse(raw).is_ok());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(ExportName::parse("acme/prod").is_err());
        assert!(ExportName::parse("acme prod").is_err());
        assert!(ExportName::parse("acme.prod").is_err());
    }

    #[test]
    fn try_from_string_matches_parse() {
        let via_parse = ExportName::parse("acme").unwrap();
        let via_try_from = ExportName::try_from("acme".to_string()).unwrap();
        assert_eq!(via_parse, via_try_from);
    }
}
