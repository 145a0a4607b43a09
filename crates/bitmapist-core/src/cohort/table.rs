//! Retention matrix types.

use serde::{Deserialize, Serialize};

/// One retention cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Cohort members active in the period.
    Count(u64),
    /// Active members as a percentage of the cohort.
    Percent(f64),
}

impl CellValue {
    /// The value as a float, whichever form it is in.
    pub fn as_f64(&self) -> f64 {
        match *self {
            CellValue::Count(n) => n as f64,
            CellValue::Percent(p) => p,
        }
    }
}

/// One cohort and its retention over the following periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRow {
    /// Cohort period start as `YYYY-MM-DD`, or `-` for dateless cohorts.
    pub label: String,
    /// Number of subjects in the cohort.
    pub size: u64,
    /// Retention cells, one per elapsed activity period.
    pub cells: Vec<CellValue>,
}

/// Retention matrix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CohortTable {
    pub rows: Vec<CohortRow>,
}

impl CohortTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a row by label.
    pub fn row(&self, label: &str) -> Option<&CohortRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}
