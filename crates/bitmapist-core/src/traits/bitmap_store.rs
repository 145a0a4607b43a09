//! Bitmap store trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BitmapistError, BitmapistResult};
use crate::types::BitOperator;

/// One write command, queued in a batch or dispatched on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum StoreCommand {
    /// Set or clear one bit.
    SetBit { key: String, offset: u64, value: bool },
    /// Combine `sources` into `dest`.
    BitOp {
        op: BitOperator,
        dest: String,
        sources: Vec<String>,
    },
    /// Expire `key` after `seconds`.
    Expire { key: String, seconds: u64 },
}

impl StoreCommand {
    /// Reject a command the store would refuse once a batch is under way.
    pub fn validate(&self) -> BitmapistResult<()> {
        match self {
            StoreCommand::SetBit { offset, .. } => check_offset(*offset),
            StoreCommand::BitOp { op, sources, .. } => check_bit_op(*op, sources),
            StoreCommand::Expire { .. } => Ok(()),
        }
    }
}

/// Exclusive upper bound on bit offsets. Bitmaps are capped at 512 MB.
pub const MAX_BIT_OFFSET: u64 = 1 << 32;

/// Check a bit offset against [`MAX_BIT_OFFSET`].
pub fn check_offset(offset: u64) -> BitmapistResult<()> {
    if offset >= MAX_BIT_OFFSET {
        return Err(BitmapistError::store(format!(
            "bit offset {} is out of range",
            offset
        )));
    }
    Ok(())
}

/// Check BITOP arity: at least one source, exactly one for `NOT`.
pub fn check_bit_op(op: BitOperator, sources: &[String]) -> BitmapistResult<()> {
    if sources.is_empty() {
        return Err(BitmapistError::store("BITOP requires at least one source key"));
    }
    if op.is_unary() && sources.len() != 1 {
        return Err(BitmapistError::store(
            "BITOP NOT must be called with a single source key",
        ));
    }
    Ok(())
}

/// Core BitmapStore trait - all store backends implement this.
///
/// Bit positions use the store's convention: position 0 is the most
/// significant bit of the first byte. Missing keys read as empty bitmaps.
#[async_trait]
pub trait BitmapStore: Send + Sync {
    /// Set (`true`) or clear (`false`) one bit. Returns the previous bit.
    async fn set_bit(&self, key: &str, offset: u64, value: bool) -> BitmapistResult<bool>;

    /// Read one bit.
    async fn get_bit(&self, key: &str, offset: u64) -> BitmapistResult<bool>;

    /// Number of set bits.
    async fn bit_count(&self, key: &str) -> BitmapistResult<u64>;

    /// Raw bitmap bytes, or `None` when the key is absent.
    async fn fetch(&self, key: &str) -> BitmapistResult<Option<Vec<u8>>>;

    /// Combine `sources` into `dest`. Returns the byte length of the result.
    ///
    /// Shorter sources are zero padded. `NOT` takes exactly one source.
    /// An empty result removes `dest`.
    async fn bit_op(&self, op: BitOperator, dest: &str, sources: &[String])
        -> BitmapistResult<u64>;

    /// Set a time-to-live on a key. Returns `false` when the key is absent.
    async fn expire(&self, key: &str, seconds: u64) -> BitmapistResult<bool>;

    /// Delete keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> BitmapistResult<u64>;

    /// Whether a key is present.
    async fn exists(&self, key: &str) -> BitmapistResult<bool>;

    /// Every key matching a glob-style `pattern`, fetched `batch` at a time.
    async fn scan_keys(&self, pattern: &str, batch: usize) -> BitmapistResult<Vec<String>>;

    /// Dispatch an ordered command list as one atomic unit.
    async fn execute(&self, commands: Vec<StoreCommand>) -> BitmapistResult<()>;

    /// Which backend this is.
    fn provider(&self) -> StoreProvider;
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: StoreProvider,
    /// Connection URL for networked providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StoreConfig {
    /// Configuration for the in-process store.
    pub fn memory() -> Self {
        Self {
            provider: StoreProvider::Memory,
            url: None,
        }
    }

    /// Configuration for a Redis-protocol store at `url`.
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            provider: StoreProvider::Redis,
            url: Some(url.into()),
        }
    }
}

/// Store provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreProvider {
    /// In-process store, for tests and development.
    #[default]
    Memory,
    /// Redis or any server speaking its bitmap commands.
    Redis,
}
