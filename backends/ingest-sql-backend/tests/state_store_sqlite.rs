//! Integration tests for `SqlStateStore` against an in-memory SQLite
//! database, exercising the skip/load/replace/version-swap protocol from
//! spec.md §4.4/§4.7 end to end without any network or disk dependency.

use cur_ingest::StateStore;
use cur_ingest_spec::{BillingPeriod, Vendor};
use ingest_sql_backend::{dialect::Dialect, pool, state_store::SqlStateStore};

async fn new_store() -> SqlStateStore {
    let (pool, dialect) = pool::connect("sqlite::memory:").await.unwrap();
    assert_eq!(dialect, Dialect::Sqlite);
    SqlStateStore::new(pool, dialect).await.unwrap()
}

fn period(y: i32, m: u32) -> BillingPeriod {
    BillingPeriod::new(y, m).unwrap()
}

#[tokio::test]
async fn fresh_load_round_trips_through_is_version_loaded() {
    let store = new_store().await;
    let p = period(2024, 1);

    assert!(!store.is_version_loaded(Vendor::Aws, "acme", p, "assembly-1").await.unwrap());

    store.start_load(Vendor::Aws, "acme", p, "assembly-1", "v1", 1).await.unwrap();
    assert!(!store.is_version_loaded(Vendor::Aws, "acme", p, "assembly-1").await.unwrap());

    store.complete_load(Vendor::Aws, "acme", p, "assembly-1", 1000).await.unwrap();
    assert!(store.is_version_loaded(Vendor::Aws, "acme", p, "assembly-1").await.unwrap());

    let current = store.current_versions(Vendor::Aws, "acme").await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].version_id, "assembly-1");
    assert_eq!(current[0].row_count, 1000);
}

#[tokio::test]
async fn version_replacement_keeps_exactly_one_current() {
    let store = new_store().await;
    let p = period(2024, 1);

    store.start_load(Vendor::Aws, "acme", p, "assembly-1", "v1", 1).await.unwrap();
    store.complete_load(Vendor::Aws, "acme", p, "assembly-1", 1000).await.unwrap();

    store.start_load(Vendor::Aws, "acme", p, "assembly-2", "v1", 1).await.unwrap();
    store.complete_load(Vendor::Aws, "acme", p, "assembly-2", 1200).await.unwrap();

    let current = store.current_versions(Vendor::Aws, "acme").await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].version_id, "assembly-2");
    assert_eq!(current[0].row_count, 1200);

    let history = store.version_history(Vendor::Aws, "acme", p).await.unwrap();
    assert_eq!(history.len(), 2);
    // newest started_at first
    assert_eq!(history[0].version_id, "assembly-2");
    assert!(history[0].is_current);
    assert!(!history[1].is_current);
}

#[tokio::test]
async fn failed_load_is_not_current_and_reports_message() {
    let store = new_store().await;
    let p = period(2024, 1);

    store.start_load(Vendor::Aws, "acme", p, "assembly-1", "v1", 1).await.unwrap();
    store.fail_load(Vendor::Aws, "acme", p, "assembly-1", "boom".to_string()).await.unwrap();

    assert!(!store.is_version_loaded(Vendor::Aws, "acme", p, "assembly-1").await.unwrap());
    let current = store.current_versions(Vendor::Aws, "acme").await.unwrap();
    assert!(current.is_empty());

    let history = store.version_history(Vendor::Aws, "acme", p).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn rerun_of_same_key_resets_status_instead_of_inserting_a_row() {
    let store = new_store().await;
    let p = period(2024, 1);

    store.start_load(Vendor::Aws, "acme", p, "assembly-1", "v1", 1).await.unwrap();
    store.fail_load(Vendor::Aws, "acme", p, "assembly-1", "transient".to_string()).await.unwrap();

    // A rerun with the identical key upserts rather than appending.
    store.start_load(Vendor::Aws, "acme", p, "assembly-1", "v1", 1).await.unwrap();
    store.complete_load(Vendor::Aws, "acme", p, "assembly-1", 1000).await.unwrap();

    let history = store.version_history(Vendor::Aws, "acme", p).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].error_message.is_none());
    assert_eq!(history[0].row_count, Some(1000));
}

#[tokio::test]
async fn current_versions_spans_multiple_months_descending() {
    let store = new_store().await;

    store.start_load(Vendor::Aws, "acme", period(2024, 1), "a1", "v1", 1).await.unwrap();
    store.complete_load(Vendor::Aws, "acme", period(2024, 1), "a1", 1000).await.unwrap();
    store.start_load(Vendor::Aws, "acme", period(2024, 2), "a2", "v1", 1).await.unwrap();
    store.complete_load(Vendor::Aws, "acme", period(2024, 2), "a2", 1100).await.unwrap();

    let current = store.current_versions(Vendor::Aws, "acme").await.unwrap();
    assert_eq!(current.len(), 2);
    assert_eq!(current[0].billing_period, period(2024, 2));
    assert_eq!(current[1].billing_period, period(2024, 1));
}

#[tokio::test]
async fn known_exports_lists_distinct_vendor_export_pairs() {
    let store = new_store().await;

    store.start_load(Vendor::Aws, "acme", period(2024, 1), "a1", "v1", 1).await.unwrap();
    store.complete_load(Vendor::Aws, "acme", period(2024, 1), "a1", 1000).await.unwrap();
    store.start_load(Vendor::Aws, "other-export", period(2024, 1), "a2", "v1", 1).await.unwrap();
    store.complete_load(Vendor::Aws, "other-export", period(2024, 1), "a2", 500).await.unwrap();

    let mut exports = store.known_exports().await.unwrap();
    exports.sort_by(|a, b| a.1.cmp(&b.1));
    let names: Vec<&str> = exports.iter().map(|(_, name)| name.as_str()).collect();
    assert_eq!(names, vec!["acme", "other-export"]);
    assert!(exports.iter().all(|(vendor, _)| *vendor == Vendor::Aws));
}
