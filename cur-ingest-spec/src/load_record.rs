/*!
[`LoadRecord`]: the persisted row tracking one (vendor, export, billing
period, version) load attempt, and the [`LoadKey`] that identifies it.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{billing_period::BillingPeriod, error::Error, export_name::ExportName, vendor::Vendor};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifies one load attempt: (vendor, export, billing_period, version_id).
pub struct LoadKey {
    /// Vendor
    pub vendor: Vendor,
    /// Export name
    pub export_name: ExportName,
    /// Billing period
    pub billing_period: BillingPeriod,
    /// Vendor's immutable version/assembly/execution id
    pub version_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The status of a load attempt.
///
/// Transitions are `Started -> Completed` or `Started -> Failed` only; a
/// rerun of the same key resets a `Completed` or `Failed` record back to
/// `Started`, clearing `error_message`.
pub enum LoadStatus {
    /// The load is in flight (or was, and the run crashed)
    Started,
    /// The load finished successfully and wrote `row_count` rows
    Completed,
    /// The load failed; `error_message` is set
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One row in the `load_state` table.
pub struct LoadRecord {
    /// The key this record is stored under
    pub key: LoadKey,
    /// Vendor manifest schema version string (e.g. "v1", "v2")
    pub data_format_version: String,
    /// True iff this is the current version for its (vendor, export, period)
    pub is_current: bool,
    /// When `start_load` (or the reset-on-rerun) was recorded
    pub started_at: DateTime<Utc>,
    /// When the load reached `Completed`, if it has
    pub completed_at: Option<DateTime<Utc>>,
    /// Current status
    pub status: LoadStatus,
    /// Rows written; only meaningful when `status == Completed`
    pub row_count: Option<i64>,
    /// Number of data files this load processed
    pub file_count: i64,
    /// Error message; only meaningful when `status == Failed`
    pub error_message: Option<String>,
}

impl LoadRecord {
    /// Construct a freshly-started record.
    pub fn started(key: LoadKey, data_format_version: String, file_count: i64, now: DateTime<Utc>) -> Self {
        LoadRecord {
            key,
            data_format_version,
            is_current: false,
            started_at: now,
            completed_at: None,
            status: LoadStatus::Started,
            row_count: None,
            file_count,
            error_message: None,
        }
    }

    /// Reset an existing record back to `Started`: a rerun of the same key
    /// clears `error_message` rather than creating a new row.
    pub fn restart(&mut self, file_count: i64, now: DateTime<Utc>) {
        self.status = LoadStatus::Started;
        self.started_at = now;
        self.file_count = file_count;
        self.error_message = None;
        self.is_current = false;
    }

    /// Transition to `Completed` and mark current. Callers are responsible
    /// for having already cleared `is_current` on sibling records before
    /// calling this.
    pub fn complete(&mut self, row_count: i64, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != LoadStatus::Started {
            return Err(Error::InvalidFormat(format!(
                "cannot complete a load in status {:?}",
                self.status
            )));
        }
        self.status = LoadStatus::Completed;
        self.completed_at = Some(now);
        self.row_count = Some(row_count);
        self.is_current = true;
        Ok(())
    }

    /// Transition to `Failed`.
    pub fn fail(&mut self, message: String) {
        self.status = LoadStatus::Failed;
        self.error_message = Some(message);
        self.is_current = false;
    }

    /// `is_current` implies `status == Completed`.
    pub fn invariant_holds(&self) -> bool {
        !self.is_current || self.status == LoadStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> LoadKey {
        LoadKey {
            vendor: Vendor::Aws,
            export_name: ExportName::parse("acme").unwrap(),
            billing_period: BillingPeriod::new(2024, 1).unwrap(),
            version_id: "assembly-1".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn started_record_is_not_current() {
        let record = LoadRecord::started(key(), "v1".to_string(), 1, now());
        assert_eq!(record.status, LoadStatus::Started);
        assert!(!record.is_current);
        assert!(record.invariant_holds());
    }

    #[test]
    fn complete_marks_current_and_sets_row_count() {
        let mut record = LoadRecord::started(key(), "v1".to_string(), 1, now());
        record.complete(1000, now()).unwrap();
        assert_eq!(record.status, LoadStatus::Completed);
        assert!(record.is_current);
        assert_eq!(record.row_count, Some(1000));
        assert!(record.invariant_holds());
    }

    #[test]
    fn complete_rejects_non_started_record() {
        let mut record = LoadRecord::started(key(), "v1".to_string(), 1, now());
        record.complete(1000, now()).unwrap();
        assert!(record.complete(2000, now()).is_err());
    }

    #[test]
    fn fail_clears_current_and_sets_message() {
        let mut record = LoadRecord::started(key(), "v1".to_string(), 1, now());
        record.fail("boom".to_string());
        assert_eq!(record.status, LoadStatus::Failed);
        assert!(!record.is_current);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert!(record.invariant_holds());
    }

    #[test]
    fn restart_resets_a_failed_record_to_started() {
        let mut record = LoadRecord::started(key(), "v1".to_string(), 1, now());
        record.fail("boom".to_string());
        record.restart(2, now());
        assert_eq!(record.status, LoadStatus::Started);
        assert!(record.error_message.is_none());
        assert_eq!(record.file_count, 2);
        assert!(!record.is_current);
    }

    #[test]
    fn restart_resets_a_completed_record_to_started() {
        let mut record = LoadRecord::started(key(), "v1".to_string(), 1, now());
        record.complete(1000, now()).unwrap();
        record.restart(1, now());
        assert_eq!(record.status, LoadStatus::Started);
        assert!(!record.is_current);
        assert!(record.invariant_holds());
    }
}
