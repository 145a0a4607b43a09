//! Event tracking entry point.
//!
//! A [`Tracker`] binds one store connection to one configuration. Every
//! bitmap operation receives the tracker explicitly; nothing is bound
//! ambiently.

mod batch;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::bitmap::Bitmap;
use crate::config::TrackerConfig;
use crate::error::BitmapistResult;
use crate::traits::{BitmapStore, StoreCommand};
use crate::types::{key, Granularity, Period};

pub use batch::TransactionGuard;

/// Per-call overrides of the configured tracking granularities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkOptions {
    /// Override `track_hourly`.
    pub track_hourly: Option<bool>,
    /// Override `track_unique`.
    pub track_unique: Option<bool>,
}

impl MarkOptions {
    /// Force hourly tracking on or off for this call.
    pub fn hourly(mut self, enabled: bool) -> Self {
        self.track_hourly = Some(enabled);
        self
    }

    /// Force unique tracking on or off for this call.
    pub fn unique(mut self, enabled: bool) -> Self {
        self.track_unique = Some(enabled);
        self
    }
}

/// Event tracker bound to one bitmap store.
pub struct Tracker {
    store: Arc<dyn BitmapStore>,
    config: TrackerConfig,
    pipeline: Mutex<batch::Pipeline>,
}

impl Tracker {
    /// Create a tracker over `store`.
    pub fn new(store: Arc<dyn BitmapStore>, config: TrackerConfig) -> BitmapistResult<Self> {
        config.validate()?;
        debug!(
            provider = ?store.provider(),
            key_prefix = %config.key_prefix,
            track_hourly = config.track_hourly,
            track_unique = config.track_unique,
            "Creating tracker"
        );
        Ok(Self {
            store,
            config,
            pipeline: Mutex::default(),
        })
    }

    /// Create a tracker with default configuration.
    pub fn with_defaults(store: Arc<dyn BitmapStore>) -> Self {
        Self {
            store,
            config: TrackerConfig::default(),
            pipeline: Mutex::default(),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &dyn BitmapStore {
        self.store.as_ref()
    }

    /// Tracker configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Namespace prefix of every key.
    pub fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }

    /// Evaluation time for expiry and cohort truncation.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Dateless bitmap of `name`.
    pub fn unique(&self, name: &str) -> Bitmap {
        Bitmap::for_period(self.key_prefix(), name, Period::unique())
    }

    /// Yearly bitmap of `name`, materialized as the OR of its twelve months.
    pub async fn year(&self, name: &str, year: i32) -> BitmapistResult<Bitmap> {
        Bitmap::year(self, name, year, self.now()).await
    }

    /// Monthly bitmap of `name`.
    pub fn month(&self, name: &str, year: i32, month: u32) -> BitmapistResult<Bitmap> {
        Ok(Bitmap::for_period(
            self.key_prefix(),
            name,
            Period::month(year, month)?,
        ))
    }

    /// ISO-weekly bitmap of `name`.
    pub fn week(&self, name: &str, iso_year: i32, week: u32) -> BitmapistResult<Bitmap> {
        Ok(Bitmap::for_period(
            self.key_prefix(),
            name,
            Period::week(iso_year, week)?,
        ))
    }

    /// Daily bitmap of `name`.
    pub fn day(&self, name: &str, year: i32, month: u32, day: u32) -> BitmapistResult<Bitmap> {
        Ok(Bitmap::for_period(
            self.key_prefix(),
            name,
            Period::day(year, month, day)?,
        ))
    }

    /// Hourly bitmap of `name`.
    pub fn hour(
        &self,
        name: &str,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
    ) -> BitmapistResult<Bitmap> {
        Ok(Bitmap::for_period(
            self.key_prefix(),
            name,
            Period::hour(year, month, day, hour)?,
        ))
    }

    /// Bitmap of `name` for any period. Year periods are materialized.
    pub async fn bitmap(&self, name: &str, period: Period) -> BitmapistResult<Bitmap> {
        Bitmap::event(self, name, period, self.now()).await
    }

    /// Bitmap of `name` for the period of `granularity` containing `instant`.
    pub async fn bitmap_at(
        &self,
        name: &str,
        granularity: Granularity,
        instant: DateTime<Utc>,
    ) -> BitmapistResult<Bitmap> {
        self.bitmap(name, Period::containing(granularity, instant))
            .await
    }

    /// Bitmap of `name` for the current period of `granularity`.
    pub async fn current(&self, name: &str, granularity: Granularity) -> BitmapistResult<Bitmap> {
        self.bitmap_at(name, granularity, self.now()).await
    }

    // ------------------------------------------------------------------
    // Marking
    // ------------------------------------------------------------------

    /// Mark `id` as having done `name` at `timestamp` (default: now).
    ///
    /// Sets the bit in the month, week and day bitmaps, plus hour and
    /// unique when those are tracked.
    pub async fn mark_event(
        &self,
        name: &str,
        id: u64,
        timestamp: Option<DateTime<Utc>>,
    ) -> BitmapistResult<()> {
        self.mark_event_with(name, id, timestamp, MarkOptions::default())
            .await
    }

    /// [`mark_event`](Self::mark_event) with per-call tracking overrides.
    pub async fn mark_event_with(
        &self,
        name: &str,
        id: u64,
        timestamp: Option<DateTime<Utc>>,
        options: MarkOptions,
    ) -> BitmapistResult<()> {
        self.write_event(name, id, timestamp, true, options).await
    }

    /// Clear `id` from the bitmaps of `name` at `timestamp` (default: now).
    pub async fn unmark_event(
        &self,
        name: &str,
        id: u64,
        timestamp: Option<DateTime<Utc>>,
    ) -> BitmapistResult<()> {
        self.unmark_event_with(name, id, timestamp, MarkOptions::default())
            .await
    }

    /// [`unmark_event`](Self::unmark_event) with per-call tracking overrides.
    pub async fn unmark_event_with(
        &self,
        name: &str,
        id: u64,
        timestamp: Option<DateTime<Utc>>,
        options: MarkOptions,
    ) -> BitmapistResult<()> {
        self.write_event(name, id, timestamp, false, options).await
    }

    /// Mark a dateless flag (user property, experiment bucket, ...).
    pub async fn mark_unique(&self, name: &str, id: u64) -> BitmapistResult<()> {
        self.write_unique(name, id, true).await
    }

    /// Clear a dateless flag.
    pub async fn unmark_unique(&self, name: &str, id: u64) -> BitmapistResult<()> {
        self.write_unique(name, id, false).await
    }

    async fn write_event(
        &self,
        name: &str,
        id: u64,
        timestamp: Option<DateTime<Utc>>,
        value: bool,
        options: MarkOptions,
    ) -> BitmapistResult<()> {
        let timestamp = timestamp.unwrap_or_else(|| self.now());
        let track_hourly = options.track_hourly.unwrap_or(self.config.track_hourly);
        let track_unique = options.track_unique.unwrap_or(self.config.track_unique);

        let mut granularities = vec![Granularity::Month, Granularity::Week, Granularity::Day];
        if track_hourly {
            granularities.push(Granularity::Hour);
        }
        if track_unique {
            granularities.push(Granularity::Unique);
        }

        let commands = granularities
            .into_iter()
            .map(|g| StoreCommand::SetBit {
                key: key::event_key(self.key_prefix(), name, &Period::containing(g, timestamp)),
                offset: id,
                value,
            })
            .collect();
        self.dispatch(commands).await
    }

    async fn write_unique(&self, name: &str, id: u64, value: bool) -> BitmapistResult<()> {
        let command = StoreCommand::SetBit {
            key: key::event_key(self.key_prefix(), name, &Period::unique()),
            offset: id,
            value,
        };
        self.dispatch(vec![command]).await
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Every tracked event name starting with `name_prefix`, sorted.
    pub async fn event_names(&self, name_prefix: &str) -> BitmapistResult<Vec<String>> {
        let pattern = key::scan_pattern(self.key_prefix(), name_prefix);
        let keys = self
            .store
            .scan_keys(&pattern, self.config.scan_batch)
            .await?;
        let names: BTreeSet<String> = keys
            .iter()
            .filter_map(|k| key::event_name_from_key(k))
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Delete every key under the namespace prefix. Returns the count.
    pub async fn delete_all_events(&self) -> BitmapistResult<u64> {
        let pattern = key::scan_pattern(self.key_prefix(), "");
        self.delete_matching(&pattern).await
    }

    /// Delete every derived bitmap. Returns the count.
    pub async fn delete_temporary_bitop_keys(&self) -> BitmapistResult<u64> {
        let pattern = key::scan_pattern(self.key_prefix(), key::BITOP_MARKER);
        self.delete_matching(&pattern).await
    }

    async fn delete_matching(&self, pattern: &str) -> BitmapistResult<u64> {
        let keys = self
            .store
            .scan_keys(pattern, self.config.scan_batch)
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = self.store.delete(&keys).await?;
        debug!(pattern, deleted, "Deleted keys");
        Ok(deleted)
    }

    /// Queue `commands` in the open transaction, or run them now as one
    /// atomic unit.
    pub(crate) async fn dispatch(&self, commands: Vec<StoreCommand>) -> BitmapistResult<()> {
        let commands = match self.enqueue(commands) {
            None => return Ok(()),
            Some(commands) => commands,
        };
        self.store.execute(commands).await
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("provider", &self.store.provider())
            .field("config", &self.config)
            .field("transaction_open", &self.is_transaction_open())
            .finish()
    }
}
