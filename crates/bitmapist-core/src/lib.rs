//! bitmapist-core - Core library for bitmapist.
//!
//! Time-bucketed event tracking over remote bitmaps. Every event
//! (`"active"`, `"registered"`, ...) gets one bitmap per period; bit `n` is
//! set when subject `n` performed the event in that period. Bitmaps combine
//! with AND/OR/XOR/NOT into derived bitmaps that expire on their own, and
//! combine again into cohort retention tables.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bitmapist_core::{store::MemoryBitmapStore, Tracker, TrackerConfig};
//!
//! let tracker = Tracker::new(Arc::new(MemoryBitmapStore::new()), TrackerConfig::default())?;
//!
//! // Record activity
//! tracker.mark_event("active", 123, None).await?;
//!
//! // Who was active in both March and April?
//! let march = tracker.month("active", 2024, 3)?;
//! let april = tracker.month("active", 2024, 4)?;
//! let both = march.and(&tracker, &april).await?;
//! println!("{} retained", both.count(&tracker).await?);
//! ```

pub mod bitmap;
pub mod cohort;
pub mod config;
pub mod error;
pub mod store;
pub mod tracker;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use bitmap::{combine, combine_at, Bitmap, BitmapSource, Positions};
pub use cohort::{cohort_table, cohort_table_at, CellValue, CohortOptions, CohortTable, RowOrder};
pub use config::TrackerConfig;
pub use error::{BitmapistError, BitmapistResult, ErrorCode};
pub use tracker::{MarkOptions, Tracker, TransactionGuard};
pub use traits::{BitmapStore, StoreCommand, StoreConfig, StoreProvider};
pub use types::{BitOperator, Granularity, Period};
