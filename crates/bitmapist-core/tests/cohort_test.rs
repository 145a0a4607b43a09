//! Integration tests for cohort retention tables.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use bitmapist_core::store::MemoryBitmapStore;
use bitmapist_core::{
    cohort_table_at, CellValue, CohortOptions, Granularity, RowOrder, Tracker, TrackerConfig,
};

fn setup() -> Tracker {
    Tracker::new(Arc::new(MemoryBitmapStore::new()), TrackerConfig::default()).unwrap()
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// Wednesday of ISO week 12 of 2024.
fn now() -> DateTime<Utc> {
    at(2024, 3, 20)
}

async fn seed(tracker: &Tracker) {
    // Four sign-ups in week 10 (March 4-10).
    for id in 1..=4 {
        tracker
            .mark_event("registered", id, Some(at(2024, 3, 5)))
            .await
            .unwrap();
        tracker
            .mark_event("active", id, Some(at(2024, 3, 6)))
            .await
            .unwrap();
    }
    // Week 11: two of them come back. Week 12: one.
    for id in [1, 2] {
        tracker
            .mark_event("active", id, Some(at(2024, 3, 12)))
            .await
            .unwrap();
    }
    tracker
        .mark_event("active", 1, Some(at(2024, 3, 19)))
        .await
        .unwrap();
}

async fn weekly(tracker: &Tracker, name: &str) -> bitmapist_core::Bitmap {
    tracker
        .bitmap_at(name, Granularity::Week, now())
        .await
        .unwrap()
}

fn values(cells: &[CellValue]) -> Vec<f64> {
    cells.iter().map(CellValue::as_f64).collect()
}

#[tokio::test]
async fn test_percent_retention() {
    let tracker = setup();
    seed(&tracker).await;
    let registered = weekly(&tracker, "registered").await;
    let active = weekly(&tracker, "active").await;

    let options = CohortOptions::default().with_rows(3);
    let table = cohort_table_at(&tracker, &registered, &active, &options, now())
        .await
        .unwrap();

    assert_eq!(table.len(), 3);
    let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["2024-03-04", "2024-03-11", "2024-03-18"]);

    let oldest = &table.rows[0];
    assert_eq!(oldest.size, 4);
    assert_eq!(values(&oldest.cells), vec![100.0, 50.0, 25.0]);

    // Newer cohorts are empty and truncated at `now`.
    assert_eq!(table.rows[1].size, 0);
    assert_eq!(values(&table.rows[1].cells), vec![0.0, 0.0]);
    assert_eq!(values(&table.rows[2].cells), vec![0.0]);
}

#[tokio::test]
async fn test_count_mode_and_newest_first() {
    let tracker = setup();
    seed(&tracker).await;
    let registered = weekly(&tracker, "registered").await;
    let active = weekly(&tracker, "active").await;

    let options = CohortOptions::default()
        .with_rows(3)
        .with_percent(false)
        .with_order(RowOrder::NewestFirst);
    let table = cohort_table_at(&tracker, &registered, &active, &options, now())
        .await
        .unwrap();

    assert_eq!(table.rows[0].label, "2024-03-18");
    let oldest = &table.rows[2];
    assert_eq!(
        oldest.cells,
        vec![CellValue::Count(4), CellValue::Count(2), CellValue::Count(1)]
    );
}

#[tokio::test]
async fn test_cols_cap_cells() {
    let tracker = setup();
    seed(&tracker).await;
    let registered = weekly(&tracker, "registered").await;
    let active = weekly(&tracker, "active").await;

    let options = CohortOptions::default().with_rows(3).with_cols(2);
    let table = cohort_table_at(&tracker, &registered, &active, &options, now())
        .await
        .unwrap();
    assert_eq!(values(&table.rows[0].cells), vec![100.0, 50.0]);
}

#[tokio::test]
async fn test_empty_tracker_gives_zero_cells() {
    let tracker = setup();
    let registered = weekly(&tracker, "registered").await;
    let active = weekly(&tracker, "active").await;

    let options = CohortOptions::default().with_rows(3);
    let table = cohort_table_at(&tracker, &registered, &active, &options, now())
        .await
        .unwrap();

    assert_eq!(table.len(), 3);
    for row in &table.rows {
        assert_eq!(row.size, 0);
        assert!(row.cells.iter().all(|c| *c == CellValue::Percent(0.0)));
    }
}

#[tokio::test]
async fn test_future_cohort_has_no_cells() {
    let tracker = setup();
    let next_week = tracker.week("registered", 2024, 13).unwrap();
    let activity = tracker.week("active", 2024, 13).unwrap();

    let options = CohortOptions::default().with_rows(1);
    let table = cohort_table_at(&tracker, &next_week, &activity, &options, now())
        .await
        .unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.rows[0].cells.is_empty());
}

#[tokio::test]
async fn test_dateless_cohort() {
    let tracker = setup();
    tracker.mark_unique("premium", 1).await.unwrap();
    tracker.mark_unique("premium", 2).await.unwrap();
    tracker.mark_unique("churned", 2).await.unwrap();

    let premium = tracker.unique("premium");
    let churned = tracker.unique("churned");
    let options = CohortOptions::default().with_rows(2);
    let table = cohort_table_at(&tracker, &premium, &churned, &options, now())
        .await
        .unwrap();

    assert_eq!(table.len(), 2);
    for row in &table.rows {
        assert_eq!(row.label, "-");
        assert_eq!(row.size, 2);
        assert_eq!(values(&row.cells), vec![50.0, 50.0]);
    }
}

#[tokio::test]
async fn test_table_serializes() {
    let tracker = setup();
    seed(&tracker).await;
    let registered = weekly(&tracker, "registered").await;
    let active = weekly(&tracker, "active").await;
    let options = CohortOptions::default().with_rows(1);
    let table = cohort_table_at(&tracker, &registered, &active, &options, now())
        .await
        .unwrap();

    let json = serde_json::to_string(&table).unwrap();
    assert!(json.contains("\"label\":\"2024-03-18\""));
}
