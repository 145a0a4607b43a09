//! Bitmap handles.
//!
//! A [`Bitmap`] is a lightweight value naming one remote bitmap. It caches
//! nothing: every read goes to the store through the [`Tracker`] passed in.

mod bitop;

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};

use crate::error::BitmapistResult;
use crate::tracker::Tracker;
use crate::types::{key, BitOperator, Granularity, Period};

pub use bitop::{combine, combine_at};

/// What a handle's key was built from.
#[derive(Debug, Clone)]
pub enum BitmapSource {
    /// Event bitmap for one period. Year periods are backed by a derived key.
    Event { name: String, period: Period },
    /// Result of a bitwise operation over other handles.
    Derived {
        op: BitOperator,
        operands: Vec<Bitmap>,
    },
}

/// Handle to one remote bitmap.
///
/// Handles compare equal when their keys are equal.
#[derive(Debug, Clone)]
pub struct Bitmap {
    key: String,
    source: BitmapSource,
}

impl Bitmap {
    /// Handle for an atomic (non-year) period. Nothing is written.
    pub(crate) fn for_period(prefix: &str, name: &str, period: Period) -> Self {
        Self {
            key: key::event_key(prefix, name, &period),
            source: BitmapSource::Event {
                name: name.to_string(),
                period,
            },
        }
    }

    pub(crate) fn derived(key: String, op: BitOperator, operands: Vec<Bitmap>) -> Self {
        Self {
            key,
            source: BitmapSource::Derived { op, operands },
        }
    }

    /// Handle for any period, materializing year periods.
    pub(crate) async fn event(
        tracker: &Tracker,
        name: &str,
        period: Period,
        now: DateTime<Utc>,
    ) -> BitmapistResult<Self> {
        match (period.granularity(), period.year_number()) {
            (Granularity::Year, Some(year)) => Self::year(tracker, name, year, now).await,
            _ => Ok(Self::for_period(tracker.key_prefix(), name, period)),
        }
    }

    /// Year handle: the OR of the twelve month bitmaps, bound to the derived key.
    pub(crate) async fn year(
        tracker: &Tracker,
        name: &str,
        year: i32,
        now: DateTime<Utc>,
    ) -> BitmapistResult<Self> {
        let period = Period::year(year)?;
        let months = (1..=12)
            .map(|m| Ok(Self::for_period(tracker.key_prefix(), name, Period::month(year, m)?)))
            .collect::<BitmapistResult<Vec<_>>>()?;
        let union = combine_at(tracker, BitOperator::Or, &months, now).await?;
        Ok(Self {
            key: union.key,
            source: BitmapSource::Event {
                name: name.to_string(),
                period,
            },
        })
    }

    /// The store key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// How the key was built.
    pub fn source(&self) -> &BitmapSource {
        &self.source
    }

    /// Event name, for event handles.
    pub fn event_name(&self) -> Option<&str> {
        match &self.source {
            BitmapSource::Event { name, .. } => Some(name),
            BitmapSource::Derived { .. } => None,
        }
    }

    /// Period, for event handles.
    pub fn period(&self) -> Option<&Period> {
        match &self.source {
            BitmapSource::Event { period, .. } => Some(period),
            BitmapSource::Derived { .. } => None,
        }
    }

    /// Operands, for derived handles. Empty for event handles.
    pub fn operands(&self) -> &[Bitmap] {
        match &self.source {
            BitmapSource::Event { .. } => &[],
            BitmapSource::Derived { operands, .. } => operands,
        }
    }

    /// Whether this handle came out of a bitwise operation.
    pub fn is_derived(&self) -> bool {
        matches!(self.source, BitmapSource::Derived { .. })
    }

    /// First instant covered. Derived handles report the earliest operand start.
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        match &self.source {
            BitmapSource::Event { period, .. } => period.start(),
            BitmapSource::Derived { operands, .. } => {
                operands.iter().filter_map(Bitmap::period_start).min()
            }
        }
    }

    /// Last instant covered. Derived handles report the earliest operand end.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        match &self.source {
            BitmapSource::Event { period, .. } => period.end(),
            BitmapSource::Derived { operands, .. } => {
                operands.iter().filter_map(Bitmap::period_end).min()
            }
        }
    }

    /// Whether the covered time closed before `now`.
    ///
    /// A derived handle is finished only when every operand is.
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        match &self.source {
            BitmapSource::Event { period, .. } => period.is_finished(now),
            BitmapSource::Derived { operands, .. } => operands.iter().all(|b| b.is_finished(now)),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Whether subject `id` is in the set.
    pub async fn contains(&self, tracker: &Tracker, id: u64) -> BitmapistResult<bool> {
        tracker.store().get_bit(&self.key, id).await
    }

    /// Number of subjects in the set.
    pub async fn count(&self, tracker: &Tracker) -> BitmapistResult<u64> {
        tracker.store().bit_count(&self.key).await
    }

    /// Subject ids in the set, ascending. Re-reads the bitmap on each call.
    pub async fn positions(&self, tracker: &Tracker) -> BitmapistResult<Positions> {
        let bytes = tracker.store().fetch(&self.key).await?.unwrap_or_default();
        Ok(Positions::new(bytes))
    }

    /// Whether the key is present in the store.
    pub async fn exists(&self, tracker: &Tracker) -> BitmapistResult<bool> {
        tracker.store().exists(&self.key).await
    }

    /// Remove the key. Deleting a missing key is not an error.
    pub async fn delete(&self, tracker: &Tracker) -> BitmapistResult<()> {
        tracker.store().delete(&[self.key.clone()]).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Combinators
    // ------------------------------------------------------------------

    /// Subjects in both sets.
    pub async fn and(&self, tracker: &Tracker, other: &Bitmap) -> BitmapistResult<Bitmap> {
        self.binary(tracker, BitOperator::And, other).await
    }

    /// Subjects in either set.
    pub async fn or(&self, tracker: &Tracker, other: &Bitmap) -> BitmapistResult<Bitmap> {
        self.binary(tracker, BitOperator::Or, other).await
    }

    /// Subjects in exactly one of the sets.
    pub async fn xor(&self, tracker: &Tracker, other: &Bitmap) -> BitmapistResult<Bitmap> {
        self.binary(tracker, BitOperator::Xor, other).await
    }

    /// Bitwise complement, over the bytes the bitmap occupies.
    pub async fn not(&self, tracker: &Tracker) -> BitmapistResult<Bitmap> {
        combine(tracker, BitOperator::Not, std::slice::from_ref(self)).await
    }

    async fn binary(
        &self,
        tracker: &Tracker,
        op: BitOperator,
        other: &Bitmap,
    ) -> BitmapistResult<Bitmap> {
        combine(tracker, op, &[self.clone(), other.clone()]).await
    }

    // ------------------------------------------------------------------
    // Time shifting
    // ------------------------------------------------------------------

    /// The same bitmap `n` periods away.
    pub async fn delta(&self, tracker: &Tracker, n: i64) -> BitmapistResult<Bitmap> {
        self.delta_at(tracker, n, tracker.now()).await
    }

    /// [`delta`](Self::delta) with an explicit evaluation time for the
    /// expiry of anything re-materialized.
    ///
    /// Derived handles shift every operand and recombine with the same
    /// operator.
    pub fn delta_at<'a>(
        &'a self,
        tracker: &'a Tracker,
        n: i64,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, BitmapistResult<Bitmap>> {
        async move {
            match &self.source {
                BitmapSource::Event { name, period } => {
                    Bitmap::event(tracker, name, period.delta(n)?, now).await
                }
                BitmapSource::Derived { op, operands } => {
                    let mut shifted = Vec::with_capacity(operands.len());
                    for operand in operands {
                        shifted.push(operand.delta_at(tracker, n, now).await?);
                    }
                    combine_at(tracker, *op, &shifted, now).await
                }
            }
        }
        .boxed()
    }

    /// The same bitmap one period later.
    pub async fn next(&self, tracker: &Tracker) -> BitmapistResult<Bitmap> {
        self.delta(tracker, 1).await
    }

    /// The same bitmap one period earlier.
    pub async fn prev(&self, tracker: &Tracker) -> BitmapistResult<Bitmap> {
        self.delta(tracker, -1).await
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Bitmap {}

impl Hash for Bitmap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Ascending set bit positions of a fetched bitmap.
///
/// Position 0 is the most significant bit of the first byte.
#[derive(Debug, Clone)]
pub struct Positions {
    bytes: Vec<u8>,
    next: u64,
}

impl Positions {
    fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, next: 0 }
    }
}

impl Iterator for Positions {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            let index = (self.next / 8) as usize;
            let byte = *self.bytes.get(index)?;
            let bit = self.next % 8;
            if bit == 0 && byte == 0 {
                self.next += 8;
                continue;
            }
            let position = self.next;
            self.next += 1;
            if byte & (0x80 >> bit) != 0 {
                return Some(position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::store::MemoryBitmapStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn tracker() -> Tracker {
        Tracker::new(Arc::new(MemoryBitmapStore::new()), TrackerConfig::default()).unwrap()
    }

    #[test]
    fn test_positions_msb_first() {
        let positions: Vec<u64> = Positions::new(vec![0x80, 0x00, 0x41]).collect();
        assert_eq!(positions, vec![0, 17, 23]);
        assert_eq!(Positions::new(Vec::new()).count(), 0);
    }

    #[tokio::test]
    async fn test_event_handle_reads() {
        let tracker = tracker();
        let day = tracker.day("active", 2024, 3, 13).unwrap();
        assert_eq!(day.key(), "bitmapist_active_2024-3-13");
        assert_eq!(day.count(&tracker).await.unwrap(), 0);
        assert!(!day.exists(&tracker).await.unwrap());

        for id in [3, 1, 200] {
            tracker.store().set_bit(day.key(), id, true).await.unwrap();
        }
        assert!(day.contains(&tracker, 200).await.unwrap());
        assert_eq!(day.count(&tracker).await.unwrap(), 3);
        let ids: Vec<u64> = day.positions(&tracker).await.unwrap().collect();
        assert_eq!(ids, vec![1, 3, 200]);

        day.delete(&tracker).await.unwrap();
        day.delete(&tracker).await.unwrap();
        assert_eq!(day.count(&tracker).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handles_equal_by_key() {
        let tracker = tracker();
        let a = tracker.month("active", 2024, 3).unwrap();
        let b = tracker
            .bitmap_at(
                "active",
                Granularity::Month,
                Utc.with_ymd_and_hms(2024, 3, 30, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, tracker.month("active", 2024, 4).unwrap());
    }

    #[tokio::test]
    async fn test_year_materializes_months() {
        let tracker = tracker();
        tracker
            .mark_event(
                "active",
                7,
                Some(Utc.with_ymd_and_hms(2023, 5, 2, 0, 0, 0).unwrap()),
            )
            .await
            .unwrap();
        let year = tracker.year("active", 2023).await.unwrap();
        assert!(year.key().starts_with("bitmapist_bitop_OR_bitmapist_active_2023-1-"));
        assert_eq!(year.event_name(), Some("active"));
        assert!(year.contains(&tracker, 7).await.unwrap());
        assert_eq!(
            year.period_start(),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_derived_bounds_and_finish() {
        let tracker = tracker();
        let now = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
        let closed = tracker.day("active", 2024, 3, 12).unwrap();
        let open = tracker.day("active", 2024, 3, 13).unwrap();

        let both = combine_at(&tracker, BitOperator::And, &[open.clone(), closed.clone()], now)
            .await
            .unwrap();
        assert!(both.is_derived());
        assert_eq!(both.operands().len(), 2);
        assert_eq!(both.period_start(), closed.period_start());
        assert_eq!(both.period_end(), closed.period_end());
        assert!(!both.is_finished(now));

        let later = Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap();
        assert!(both.is_finished(later));
    }

    #[tokio::test]
    async fn test_delta_shifts_derived_operands() {
        let tracker = tracker();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let a = tracker.month("a", 2024, 1).unwrap();
        let b = tracker.month("b", 2024, 2).unwrap();
        let both = combine_at(&tracker, BitOperator::And, &[a, b], now)
            .await
            .unwrap();

        let shifted = both.delta_at(&tracker, 1, now).await.unwrap();
        assert_eq!(
            shifted.key(),
            "bitmapist_bitop_AND_bitmapist_a_2024-2-bitmapist_b_2024-3"
        );

        let back = shifted.delta_at(&tracker, -1, now).await.unwrap();
        assert_eq!(back, both);
    }

    #[tokio::test]
    async fn test_next_prev_and_unique_delta() {
        let tracker = tracker();
        let week = tracker.week("active", 2020, 53).unwrap();
        assert_eq!(week.next(&tracker).await.unwrap().key(), "bitmapist_active_W2021-1");
        assert_eq!(week.prev(&tracker).await.unwrap().key(), "bitmapist_active_W2020-52");

        let unique = tracker.unique("premium");
        assert_eq!(unique.delta(&tracker, 5).await.unwrap(), unique);
    }

    #[tokio::test]
    async fn test_year_delta_rematerializes() {
        let tracker = tracker();
        let year = tracker.year("active", 2023).await.unwrap();
        let next = year.next(&tracker).await.unwrap();
        assert_eq!(next, tracker.year("active", 2024).await.unwrap());
        assert_eq!(next.period().map(|p| p.suffix()), Some("2024".to_string()));
    }
}
