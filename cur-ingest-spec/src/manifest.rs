/*!
Defining the [`Manifest`] struct: the normalized, in-memory description of
one vendor publication of a billing month's data.
*/

use serde::{Deserialize, Serialize};

use crate::{
    billing_period::BillingPeriod,
    column::Column,
    export_name::ExportName,
    vendor::{FormatVersion, Vendor},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A normalized manifest: vendor-neutral description of one billing
/// period's publication, regardless of which vendor schema it came from.
pub struct Manifest {
    /// The vendor that published this manifest
    pub vendor: Vendor,
    /// The vendor manifest schema version this was parsed from
    pub format_version: FormatVersion,
    /// The caller-supplied logical export name
    pub export_name: ExportName,
    /// The calendar month this manifest covers
    pub billing_period: BillingPeriod,
    /// The vendor's immutable identifier for this publication
    pub version_id: String,
    /// Object-store keys (or URIs) of the data files this manifest lists
    pub data_files: Vec<String>,
    /// The ordered column schema for this publication
    pub columns: Vec<Column>,
}

impl Manifest {
    /// Number of data files this manifest lists.
    pub fn file_count(&self) -> usize {
        self.data_files.len()
    }
}
