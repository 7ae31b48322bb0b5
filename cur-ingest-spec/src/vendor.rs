/*!
Vendor and manifest-format identifiers.
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The cloud vendor a manifest was published by
pub enum Vendor {
    /// Amazon Web Services Cost and Usage Report
    Aws,
    /// Azure Cost Management export
    Azure,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::Aws => write!(f, "aws"),
            Vendor::Azure => write!(f, "azure"),
        }
    }
}

impl std::str::FromStr for Vendor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Vendor::Aws),
            "azure" => Ok(Vendor::Azure),
            other => Err(Error::InvalidFormat(format!("vendor '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The vendor-specific manifest schema version
pub enum FormatVersion {
    /// AWS CUR v1 / Azure's only manifest shape
    V1,
    /// AWS CUR v2 (`BILLING_PERIOD=` path layout)
    V2,
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatVersion::V1 => write!(f, "v1"),
            FormatVersion::V2 => write!(f, "v2"),
        }
    }
}

impl std::str::FromStr for FormatVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(FormatVersion::V1),
            "v2" => Ok(FormatVersion::V2),
            other => Err(Error::InvalidFormat(format!("format_version '{other}'"))),
        }
    }
}
