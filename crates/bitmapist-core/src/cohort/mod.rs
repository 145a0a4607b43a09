//! Cohort retention analysis.
//!
//! Each row is one cohort: the subjects that performed the cohort event in
//! a period. Cells count how many of them performed the activity event in
//! that period and each one after it.
//!
//! # Example
//!
//! ```ignore
//! use bitmapist_core::cohort::{cohort_table, CohortOptions};
//! use bitmapist_core::Granularity;
//!
//! let registered = tracker.current("registered", Granularity::Week).await?;
//! let active = tracker.current("active", Granularity::Week).await?;
//! let table = cohort_table(&tracker, &registered, &active, &CohortOptions::default()).await?;
//! ```

mod table;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bitmap::{combine_at, Bitmap};
use crate::error::BitmapistResult;
use crate::tracker::Tracker;
use crate::types::BitOperator;

pub use table::{CellValue, CohortRow, CohortTable};

/// Default number of cohort rows.
pub const DEFAULT_ROWS: usize = 20;

/// Row ordering of a cohort table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Oldest cohort first, the source handles' period last.
    #[default]
    OldestFirst,
    /// The source handles' period first.
    NewestFirst,
}

/// Shape of a cohort table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortOptions {
    /// Number of cohorts, counting back from the source period.
    pub rows: usize,
    /// Activity periods per row. Defaults to `rows` and never exceeds it.
    pub cols: Option<usize>,
    /// Report percentages of the cohort size instead of raw counts.
    pub use_percent: bool,
    pub order: RowOrder,
}

impl Default for CohortOptions {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: None,
            use_percent: true,
            order: RowOrder::default(),
        }
    }
}

impl CohortOptions {
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_cols(mut self, cols: usize) -> Self {
        self.cols = Some(cols);
        self
    }

    pub fn with_percent(mut self, use_percent: bool) -> Self {
        self.use_percent = use_percent;
        self
    }

    pub fn with_order(mut self, order: RowOrder) -> Self {
        self.order = order;
        self
    }

    fn effective_cols(&self) -> usize {
        self.cols.map_or(self.rows, |c| c.min(self.rows))
    }
}

/// Build a retention table ending at the periods of `cohort` and `activity`.
pub async fn cohort_table(
    tracker: &Tracker,
    cohort: &Bitmap,
    activity: &Bitmap,
    options: &CohortOptions,
) -> BitmapistResult<CohortTable> {
    cohort_table_at(tracker, cohort, activity, options, tracker.now()).await
}

/// [`cohort_table`] evaluated at `now`.
///
/// Cells stop at the first activity period starting at or after `now`.
pub async fn cohort_table_at(
    tracker: &Tracker,
    cohort: &Bitmap,
    activity: &Bitmap,
    options: &CohortOptions,
    now: DateTime<Utc>,
) -> BitmapistResult<CohortTable> {
    let cols = options.effective_cols();
    let mut rows = Vec::with_capacity(options.rows);

    for offset in 0..options.rows {
        let back = -(offset as i64);
        let row_cohort = cohort.delta_at(tracker, back, now).await?;
        let base_activity = activity.delta_at(tracker, back, now).await?;
        let row = cohort_row(
            tracker,
            &row_cohort,
            &base_activity,
            cols,
            options.use_percent,
            now,
        )
        .await?;
        rows.push(row);
    }

    if options.order == RowOrder::OldestFirst {
        rows.reverse();
    }
    debug!(
        rows = rows.len(),
        cols,
        cohort = %cohort,
        activity = %activity,
        "Built cohort table"
    );
    Ok(CohortTable { rows })
}

async fn cohort_row(
    tracker: &Tracker,
    cohort: &Bitmap,
    base_activity: &Bitmap,
    cols: usize,
    use_percent: bool,
    now: DateTime<Utc>,
) -> BitmapistResult<CohortRow> {
    let label = cohort
        .period_start()
        .map_or_else(|| "-".to_string(), |start| start.format("%Y-%m-%d").to_string());
    let size = cohort.count(tracker).await?;

    let mut cells = Vec::with_capacity(cols);
    for activity_offset in 0..cols {
        let current = base_activity
            .delta_at(tracker, activity_offset as i64, now)
            .await?;
        if current.period_start().is_some_and(|start| start >= now) {
            break;
        }
        let overlap = combine_at(
            tracker,
            BitOperator::And,
            &[cohort.clone(), current],
            now,
        )
        .await?
        .count(tracker)
        .await?;
        cells.push(if use_percent {
            CellValue::Percent(percent(overlap, size))
        } else {
            CellValue::Count(overlap)
        });
    }

    Ok(CohortRow { label, size, cells })
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}
