/*!
The Manifest Locator: enumerates manifest blobs for a (bucket, prefix,
export) under a vendor-specific path schema, parses the billing period
out of the key, and filters by an inclusive date range.
*/

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use cur_ingest_spec::{BillingPeriod, FormatVersion, Vendor};
use object_store::ObjectMeta;
use regex::Regex;
use tracing::warn;

use crate::{error::Error, store};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A located manifest blob, not yet fetched or normalized.
pub struct ManifestRef {
    /// Bucket or container the manifest lives in
    pub bucket: String,
    /// Full object-store key
    pub key: String,
    /// Billing period parsed from the path (or folder, for Azure)
    pub billing_period: BillingPeriod,
    /// Manifest schema version
    pub format_version: FormatVersion,
}

/// Build the AWS v1 manifest path pattern for a known export name. The
/// `regex` crate has no backreference support, so the export name (known
/// to the caller) is woven into the pattern literally rather than
/// captured once and matched again.
fn aws_v1_pattern(export: &str) -> Result<Regex, Error> {
    let export = regex::escape(export);
    Regex::new(&format!(
        r"^(?P<prefix>.*)/{export}/(?P<year>\d{{4}})(?P<month>\d{{2}})\d{{2}}-\d{{8}}/{export}-Manifest\.json$"
    ))
    .map_err(Error::from)
}

/// Build the AWS v2 manifest path pattern for a known export name.
fn aws_v2_pattern(export: &str) -> Result<Regex, Error> {
    let export = regex::escape(export);
    Regex::new(&format!(
        r"^(?P<prefix>.*)/{export}/metadata/BILLING_PERIOD=(?P<year>\d{{4}})-(?P<month>\d{{2}})/{export}-Manifest\.json$"
    ))
    .map_err(Error::from)
}

/// Locate AWS manifests under `prefix/export/...` for the given format
/// version, filtering to `[start, end]` inclusive at month granularity.
pub async fn locate_aws(
    store: &dyn object_store::ObjectStore,
    bucket: &str,
    prefix: &str,
    export: &str,
    format_version: FormatVersion,
    start: Option<BillingPeriod>,
    end: Option<BillingPeriod>,
) -> Result<Vec<ManifestRef>, Error> {
    let list_prefix = format!("{prefix}/{export}");
    let objects = self::list(store, &list_prefix).await?;

    let pattern = match format_version {
        FormatVersion::V1 => aws_v1_pattern(export)?,
        FormatVersion::V2 => aws_v2_pattern(export)?,
    };

    let mut refs = Vec::new();
    for obj in objects {
        let key = obj.location.to_string();
        let Some(captures) = pattern.captures(&key) else {
            continue;
        };
        let year: i32 = match captures["year"].parse() {
            Ok(y) => y,
            Err(_) => {
                warn!(key = %key, "matched manifest path but year segment unparseable, skipping");
                continue;
            }
        };
        let month: u32 = match captures["month"].parse() {
            Ok(m) => m,
            Err(_) => {
                warn!(key = %key, "matched manifest path but month segment unparseable, skipping");
                continue;
            }
        };
        let billing_period = match BillingPeriod::new(year, month) {
            Ok(bp) => bp,
            Err(_) => {
                warn!(key = %key, "matched manifest path but billing period out of range, skipping");
                continue;
            }
        };
        if !in_range(&billing_period, start, end) {
            continue;
        }
        refs.push(ManifestRef {
            bucket: bucket.to_string(),
            key,
            billing_period,
            format_version,
        });
    }

    refs.sort_by_key(|m| (m.billing_period.year(), m.billing_period.month()));
    Ok(refs)
}

/// Locate Azure manifests: enumerate blobs under `directory/export/`,
/// group by the `YYYYMMDD-YYYYMMDD` folder segment, and pick the blob
/// with the maximum `last_modified` per folder.
pub async fn locate_azure(
    store: &dyn object_store::ObjectStore,
    bucket: &str,
    directory: &str,
    export: &str,
    start: Option<BillingPeriod>,
    end: Option<BillingPeriod>,
) -> Result<Vec<ManifestRef>, Error> {
    static FOLDER: OnceLock<Regex> = OnceLock::new();
    let folder_pattern = FOLDER.get_or_init(|| {
        Regex::new(r"^\d{4}(\d{2})\d{2}-\d{8}$").expect("static pattern")
    });

    let list_prefix = format!("{directory}/{export}");
    let objects = self::list(store, &list_prefix).await?;

    use std::collections::HashMap;
    let mut newest_per_folder: HashMap<String, ObjectMeta> = HashMap::new();

    for obj in objects {
        let key = obj.location.to_string();
        let relative = key.strip_prefix(&format!("{list_prefix}/")).unwrap_or(&key);
        let Some(folder) = relative.split('/').next() else {
            continue;
        };
        if !folder_pattern.is_match(folder) {
            continue;
        }
        match newest_per_folder.get(folder) {
            Some(existing) if existing.last_modified >= obj.last_modified => {}
            _ => {
                newest_per_folder.insert(folder.to_string(), obj);
            }
        }
    }

    let mut refs = Vec::new();
    for (folder, obj) in newest_per_folder {
        let caps = folder_pattern.captures(&folder).expect("pre-filtered");
        let year: i32 = folder[0..4].parse().unwrap_or_default();
        let month: u32 = match caps.get(1).and_then(|m| m.as_str().parse().ok()) {
            Some(m) => m,
            None => continue,
        };
        let billing_period = match BillingPeriod::new(year, month) {
            Ok(bp) => bp,
            Err(_) => continue,
        };
        if !in_range(&billing_period, start, end) {
            continue;
        }
        refs.push(ManifestRef {
            bucket: bucket.to_string(),
            key: obj.location.to_string(),
            billing_period,
            format_version: FormatVersion::V1,
        });
    }

    refs.sort_by_key(|m| (m.billing_period.year(), m.billing_period.month()));
    Ok(refs)
}

async fn list(store: &dyn object_store::ObjectStore, prefix: &str) -> Result<Vec<ObjectMeta>, Error> {
    self::store::list_under_prefix(store, prefix).await
}

fn in_range(period: &BillingPeriod, start: Option<BillingPeriod>, end: Option<BillingPeriod>) -> bool {
    let as_date = |bp: BillingPeriod| -> NaiveDate { bp.as_utc().date_naive() };
    let p = as_date(*period);
    if let Some(start) = start {
        if p < as_date(start) {
            return false;
        }
    }
    if let Some(end) = end {
        if p > as_date(end) {
            return false;
        }
    }
    true
}

/// Vendor-dispatching entry point used by the orchestrator.
pub async fn locate(
    store: &dyn object_store::ObjectStore,
    vendor: Vendor,
    bucket: &str,
    prefix: &str,
    export: &str,
    format_version: FormatVersion,
    start: Option<BillingPeriod>,
    end: Option<BillingPeriod>,
) -> Result<Vec<ManifestRef>, Error> {
    match vendor {
        Vendor::Aws => locate_aws(store, bucket, prefix, export, format_version, start, end).await,
        Vendor::Azure => locate_azure(store, bucket, prefix, export, start, end).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_v1_pattern_matches_and_captures() {
        let key = "cur/acme/20240101-20240201/acme-Manifest.json";
        let pattern = aws_v1_pattern("acme").unwrap();
        let caps = pattern.captures(key).expect("should match");
        assert_eq!(&caps["year"], "2024");
        assert_eq!(&caps["month"], "01");
    }

    #[test]
    fn aws_v2_pattern_matches_and_captures() {
        let key = "cur/acme/metadata/BILLING_PERIOD=2024-03/acme-Manifest.json";
        let pattern = aws_v2_pattern("acme").unwrap();
        let caps = pattern.captures(key).expect("should match");
        assert_eq!(&caps["year"], "2024");
        assert_eq!(&caps["month"], "03");
    }

    #[test]
    fn aws_v1_pattern_rejects_mismatched_export_name() {
        let key = "cur/acme/20240101-20240201/other-Manifest.json";
        let pattern = aws_v1_pattern("acme").unwrap();
        assert!(pattern.captures(key).is_none());
    }

    #[test]
    fn in_range_is_inclusive_at_month_granularity() {
        let jan = BillingPeriod::new(2024, 1).unwrap();
        let feb = BillingPeriod::new(2024, 2).unwrap();
        let mar = BillingPeriod::new(2024, 3).unwrap();
        assert!(in_range(&feb, Some(feb), Some(feb)));
        assert!(!in_range(&jan, Some(feb), Some(mar)));
        assert!(!in_range(&mar, Some(jan), Some(feb)));
    }

    use bytes::Bytes;
    use object_store::{memory::InMemory, path::Path, ObjectStore};

    async fn put(store: &InMemory, key: &str) {
        store.put(&Path::from(key), Bytes::from_static(b"{}").into()).await.unwrap();
    }

    #[tokio::test]
    async fn locate_aws_v1_finds_one_manifest_per_month_sorted_ascending() {
        let store = InMemory::new();
        put(&store, "cur/acme/20240101-20240201/acme-Manifest.json").await;
        put(&store, "cur/acme/20240301-20240401/acme-Manifest.json").await;
        put(&store, "cur/acme/20240201-20240301/acme-Manifest.json").await;
        // A sibling export's manifest must not match acme's pattern.
        put(&store, "cur/other/20240101-20240201/other-Manifest.json").await;

        let refs = locate_aws(&store, "bucket", "cur", "acme", FormatVersion::V1, None, None)
            .await
            .unwrap();

        assert_eq!(refs.len(), 3);
        let months: Vec<u32> = refs.iter().map(|r| r.billing_period.month()).collect();
        assert_eq!(months, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn locate_aws_v1_date_range_filter_keeps_only_february() {
        let store = InMemory::new();
        for (y, m) in [(2024, 1), (2024, 2), (2024, 3), (2024, 4), (2024, 5)] {
            put(&store, &format!("cur/acme/{y}{m:02}01-{y}{m:02}28/acme-Manifest.json")).await;
        }

        let start = BillingPeriod::new(2024, 2).unwrap();
        let end = BillingPeriod::new(2024, 2).unwrap();
        let refs = locate_aws(&store, "bucket", "cur", "acme", FormatVersion::V1, Some(start), Some(end))
            .await
            .unwrap();

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].billing_period, start);
    }

    #[tokio::test]
    async fn locate_aws_v2_parses_billing_period_from_path_segment() {
        let store = InMemory::new();
        put(&store, "cur/acme/metadata/BILLING_PERIOD=2024-03/acme-Manifest.json").await;

        let refs = locate_aws(&store, "bucket", "cur", "acme", FormatVersion::V2, None, None)
            .await
            .unwrap();

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].billing_period, BillingPeriod::new(2024, 3).unwrap());
        assert_eq!(refs[0].format_version, FormatVersion::V2);
    }

    #[tokio::test]
    async fn locate_azure_picks_newest_blob_per_folder() {
        let store = InMemory::new();
        // Two executions landed in the same month folder; the newer one
        // (put second, since InMemory stamps last_modified at put time)
        // must win.
        put(&store, "billing/acme/20240101-20240201/exec-a/acme-Manifest_a.json").await;
        put(&store, "billing/acme/20240101-20240201/exec-b/acme-Manifest_b.json").await;

        let refs = locate_azure(&store, "bucket", "billing", "acme", None, None).await.unwrap();

        assert_eq!(refs.len(), 1);
        assert!(refs[0].key.contains("exec-b"));
        assert_eq!(refs[0].billing_period, BillingPeriod::new(2024, 1).unwrap());
    }
}
