/*!
The Manifest Normalizer: turns vendor-specific manifest JSON (or, for
Azure, a synthesized stand-in) into a common [`Manifest`] record.
*/

use chrono::{DateTime, Utc};
use cur_ingest_spec::{BillingPeriod, Column, ColumnType, Error, FormatVersion, ExportName, Manifest, Vendor};
use serde_json::Value;

use crate::manifest_locator::ManifestRef;

/// Parse AWS CUR v1 manifest JSON.
///
/// Column name = `<category>_<name with ':' replaced by '_'>`. Type map:
/// `String|Interval → String`, `DateTime → DateTime`,
/// `Decimal|BigDecimal|OptionalBigDecimal → Decimal(20,8)`,
/// `OptionalString → String`, anything missing/unknown → `String`.
pub fn normalize_aws_v1(
    bytes: &[u8],
    export_name: &ExportName,
    located_period: BillingPeriod,
) -> Result<Manifest, Error> {
    let json: Value = serde_json::from_slice(bytes)?;

    let assembly_id = json
        .get("assemblyId")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ManifestMalformed("missing assemblyId".into()))?
        .to_string();

    let billing_period = json
        .get("billingPeriod")
        .and_then(|bp| bp.get("start"))
        .and_then(Value::as_str)
        .and_then(|s| parse_aws_v1_date(s).ok())
        .unwrap_or(located_period);

    let report_keys = json
        .get("reportKeys")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ManifestMalformed("missing reportKeys".into()))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect::<Vec<_>>();

    let columns = json
        .get("columns")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .filter_map(|col| {
                    let category = col.get("category").and_then(Value::as_str)?;
                    let name = col.get("name").and_then(Value::as_str)?;
                    let ty = col.get("type").and_then(Value::as_str);
                    let column_name = format!("{category}_{}", name.replace(':', "_"));
                    Some(Column::new(column_name, map_aws_v1_type(ty)))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Manifest {
        vendor: Vendor::Aws,
        format_version: FormatVersion::V1,
        export_name: export_name.clone(),
        billing_period,
        version_id: assembly_id,
        data_files: report_keys,
        columns,
    })
}

fn map_aws_v1_type(raw: Option<&str>) -> ColumnType {
    match raw {
        Some("String") | Some("Interval") | Some("OptionalString") => ColumnType::String,
        Some("DateTime") => ColumnType::DateTime,
        Some("Decimal") | Some("BigDecimal") | Some("OptionalBigDecimal") => {
            ColumnType::Decimal(20, 8)
        }
        _ => ColumnType::String,
    }
}

fn parse_aws_v1_date(raw: &str) -> Result<BillingPeriod, Error> {
    let dt: DateTime<Utc> = raw.parse()?;
    Ok(BillingPeriod::from_datetime(dt))
}

/// Parse AWS CUR v2 manifest JSON. The billing period comes from the
/// located path (`BILLING_PERIOD=YYYY-MM`), not the manifest body.
///
/// Column type map: `string → String`, `timestamp → DateTime64(9)`,
/// `double → Float64`, `map → Map(Nullable String)`,
/// `struct → Tuple(...)` (flattened as `Nullable String` fields since v2
/// manifests don't describe nested field types).
pub fn normalize_aws_v2(
    bytes: &[u8],
    export_name: &ExportName,
    billing_period: BillingPeriod,
) -> Result<Manifest, Error> {
    let json: Value = serde_json::from_slice(bytes)?;

    let execution_id = json
        .get("executionId")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ManifestMalformed("missing executionId".into()))?
        .to_string();

    let data_files = json
        .get("dataFiles")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ManifestMalformed("missing dataFiles".into()))?
        .iter()
        .filter_map(Value::as_str)
        .map(reduce_to_last_three_segments)
        .collect::<Vec<_>>();

    let columns = json
        .get("columns")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .filter_map(|col| {
                    let name = col.get("name").and_then(Value::as_str)?;
                    let ty = col.get("type").and_then(Value::as_str);
                    Some(Column::new(name.to_string(), map_aws_v2_type(ty)))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Manifest {
        vendor: Vendor::Aws,
        format_version: FormatVersion::V2,
        export_name: export_name.clone(),
        billing_period,
        version_id: execution_id,
        data_files,
        columns,
    })
}

fn map_aws_v2_type(raw: Option<&str>) -> ColumnType {
    match raw {
        Some("string") => ColumnType::String,
        Some("timestamp") => ColumnType::DateTime64(9),
        Some("double") => ColumnType::Float64,
        Some("map") => ColumnType::Map(Box::new(ColumnType::nullable_string())),
        Some("struct") => ColumnType::Tuple(vec![("value".to_string(), ColumnType::nullable_string())]),
        _ => ColumnType::String,
    }
}

/// Strip a `dataFiles` URI to its last 3 path segments, matching
/// `open_finops/aws_ofs/manifest_normalizer.py::normalize_v2`.
fn reduce_to_last_three_segments(uri: &str) -> String {
    let segments: Vec<&str> = uri.trim_end_matches('/').split('/').collect();
    let take = segments.len().min(3);
    segments[segments.len() - take..].join("/")
}

/// Synthesize an Azure manifest from its located blob. Azure's manifest
/// payload carries no usable schema; columns are populated later by the
/// Data Reader once it has sampled the CSV/Parquet header.
///
/// `partitioned` mirrors the caller-supplied flag `AzureHandler` took in
/// the original implementation: it is not auto-detected from the blob
/// layout. For a partitioned export, `version_id` is the execution
/// folder name (the representative blob's parent directory) and
/// `data_files` already lists every CSV/CSV.GZ sibling in that folder.
/// For a single-file export, `version_id` is parsed heuristically from
/// the full key by splitting on `_` and taking the second token, then
/// splitting that on `.` and taking the first (`open_finops/azure_ofs/__init__.py::AzureHandler.build_manifests`,
/// non-partitioned branch) — preserved exactly, including its fragility
/// on directory names that happen to contain underscores. A key that
/// doesn't yield a plausible token either way is reported as
/// `ManifestMalformed` rather than inventing an id (spec.md §9, OQ2).
pub fn normalize_azure(
    located: &ManifestRef,
    export_name: &ExportName,
    partitioned: bool,
    data_files: Vec<String>,
) -> Result<Manifest, Error> {
    let version_id = if partitioned {
        azure_version_id_partitioned(&located.key)?
    } else {
        azure_version_id_single_file(&located.key)?
    };

    Ok(Manifest {
        vendor: Vendor::Azure,
        format_version: FormatVersion::V1,
        export_name: export_name.clone(),
        billing_period: located.billing_period,
        version_id,
        data_files,
        columns: Vec::new(),
    })
}

/// Partitioned export: the version id is the representative blob's
/// parent directory name (`file_path.split("/")[-2]`).
fn azure_version_id_partitioned(key: &str) -> Result<String, Error> {
    let segments: Vec<&str> = key.split('/').collect();
    if segments.len() < 2 {
        return Err(Error::ManifestMalformed(format!(
            "cannot derive an execution id from path: {key}"
        )));
    }
    Ok(segments[segments.len() - 2].to_string())
}

/// Single-file export: `file_path.split("_")[1].split(".")[0]`, applied
/// to the full key exactly as the original does (not just the basename).
fn azure_version_id_single_file(key: &str) -> Result<String, Error> {
    let second_token = key
        .split('_')
        .nth(1)
        .ok_or_else(|| Error::ManifestMalformed(format!("no '_' to derive a version id from: {key}")))?;
    let candidate = second_token.split('.').next().unwrap_or(second_token);
    if candidate.is_empty() {
        return Err(Error::ManifestMalformed(format!(
            "could not derive a version id from filename: {key}"
        )));
    }
    Ok(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_v2_reduces_to_last_three_segments() {
        assert_eq!(
            reduce_to_last_three_segments("s3://bucket/a/b/c/d/file.parquet"),
            "c/d/file.parquet"
        );
        assert_eq!(reduce_to_last_three_segments("a/b"), "a/b");
    }

    #[test]
    fn azure_version_id_partitioned_uses_parent_folder() {
        let key = "exports/acme/20240101-20240201/run-id-abc/part-0.csv";
        assert_eq!(azure_version_id_partitioned(key).unwrap(), "run-id-abc");
    }

    #[test]
    fn azure_version_id_single_file_uses_underscore_dot_heuristic() {
        let key = "exports/acme/20240101-20240201/acme_20240115T120000.csv";
        assert_eq!(azure_version_id_single_file(key).unwrap(), "20240115T120000");
    }

    #[test]
    fn azure_version_id_single_file_rejects_unparseable_filename() {
        let key = "exports/acme/20240101-20240201/readme.txt";
        assert!(azure_version_id_single_file(key).is_err());
    }

    #[test]
    fn aws_v1_type_map_covers_known_types() {
        assert_eq!(map_aws_v1_type(Some("String")), ColumnType::String);
        assert_eq!(map_aws_v1_type(Some("Interval")), ColumnType::String);
        assert_eq!(map_aws_v1_type(Some("DateTime")), ColumnType::DateTime);
        assert_eq!(map_aws_v1_type(Some("BigDecimal")), ColumnType::Decimal(20, 8));
        assert_eq!(map_aws_v1_type(None), ColumnType::String);
    }
}
