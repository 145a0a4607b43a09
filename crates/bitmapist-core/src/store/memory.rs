//! In-process bitmap store.
//!
//! Mirrors the semantics of a Redis-protocol bitmap server closely enough
//! that everything above the [`BitmapStore`] trait behaves the same against
//! either: most-significant-bit-first positions, zero padding in combines,
//! lazy key expiry, glob-style key scans.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use glob::Pattern;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{BitmapistError, BitmapistResult};
use crate::traits::{check_bit_op, check_offset, BitmapStore, StoreCommand, StoreProvider};
use crate::types::BitOperator;

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

/// In-memory [`BitmapStore`].
#[derive(Debug, Default)]
pub struct MemoryBitmapStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBitmapStore {
    /// Create an empty store.
    pub fn new() -> Self {
        debug!("Creating in-memory bitmap store");
        Self::default()
    }

    /// Remaining time-to-live of a key, if it has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock().await;
        let entry = live(&mut entries, key)?;
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries);
        entries.len()
    }

    /// Whether the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BitmapStore for MemoryBitmapStore {
    async fn set_bit(&self, key: &str, offset: u64, value: bool) -> BitmapistResult<bool> {
        check_offset(offset)?;
        let mut entries = self.entries.lock().await;
        Ok(set_bit(&mut entries, key, offset, value))
    }

    async fn get_bit(&self, key: &str, offset: u64) -> BitmapistResult<bool> {
        check_offset(offset)?;
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key).is_some_and(|e| bit_at(&e.bytes, offset)))
    }

    async fn bit_count(&self, key: &str) -> BitmapistResult<u64> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key)
            .map(|e| e.bytes.iter().map(|b| u64::from(b.count_ones())).sum())
            .unwrap_or(0))
    }

    async fn fetch(&self, key: &str) -> BitmapistResult<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key).map(|e| e.bytes.clone()))
    }

    async fn bit_op(
        &self,
        op: BitOperator,
        dest: &str,
        sources: &[String],
    ) -> BitmapistResult<u64> {
        check_bit_op(op, sources)?;
        let mut entries = self.entries.lock().await;
        Ok(bit_op(&mut entries, op, dest, sources))
    }

    async fn expire(&self, key: &str, seconds: u64) -> BitmapistResult<bool> {
        let mut entries = self.entries.lock().await;
        Ok(expire(&mut entries, key, seconds))
    }

    async fn delete(&self, keys: &[String]) -> BitmapistResult<u64> {
        let mut entries = self.entries.lock().await;
        Ok(delete(&mut entries, keys))
    }

    async fn exists(&self, key: &str) -> BitmapistResult<bool> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key).is_some())
    }

    async fn scan_keys(&self, pattern: &str, _batch: usize) -> BitmapistResult<Vec<String>> {
        let matcher = redis_glob(pattern)?;
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries);
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| matcher.matches(k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn execute(&self, commands: Vec<StoreCommand>) -> BitmapistResult<()> {
        // Reject the whole batch before touching anything.
        for command in &commands {
            command.validate()?;
        }

        let mut entries = self.entries.lock().await;
        for command in commands {
            match command {
                StoreCommand::SetBit { key, offset, value } => {
                    set_bit(&mut entries, &key, offset, value);
                }
                StoreCommand::BitOp { op, dest, sources } => {
                    bit_op(&mut entries, op, &dest, &sources);
                }
                StoreCommand::Expire { key, seconds } => {
                    expire(&mut entries, &key, seconds);
                }
            }
        }
        Ok(())
    }

    fn provider(&self) -> StoreProvider {
        StoreProvider::Memory
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let expired = entries
        .get(key)
        .and_then(|e| e.expires_at)
        .is_some_and(|at| at <= Instant::now());
    if expired {
        entries.remove(key);
        return None;
    }
    entries.get_mut(key)
}

fn purge_expired(entries: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    entries.retain(|_, e| e.expires_at.map_or(true, |at| at > now));
}

fn bit_at(bytes: &[u8], offset: u64) -> bool {
    let index = (offset / 8) as usize;
    let mask = 0x80u8 >> (offset % 8);
    bytes.get(index).is_some_and(|b| b & mask != 0)
}

fn set_bit(entries: &mut HashMap<String, Entry>, key: &str, offset: u64, value: bool) -> bool {
    let index = (offset / 8) as usize;
    let mask = 0x80u8 >> (offset % 8);
    if live(entries, key).is_none() {
        entries.insert(
            key.to_string(),
            Entry {
                bytes: Vec::new(),
                expires_at: None,
            },
        );
    }
    let Some(entry) = entries.get_mut(key) else {
        return false;
    };
    if entry.bytes.len() <= index {
        entry.bytes.resize(index + 1, 0);
    }
    let previous = entry.bytes[index] & mask != 0;
    if value {
        entry.bytes[index] |= mask;
    } else {
        entry.bytes[index] &= !mask;
    }
    previous
}

fn bit_op(
    entries: &mut HashMap<String, Entry>,
    op: BitOperator,
    dest: &str,
    sources: &[String],
) -> u64 {
    let inputs: Vec<Vec<u8>> = sources
        .iter()
        .map(|k| live(entries, k).map(|e| e.bytes.clone()).unwrap_or_default())
        .collect();
    let len = inputs.iter().map(Vec::len).max().unwrap_or(0);

    let byte = |input: &Vec<u8>, i: usize| input.get(i).copied().unwrap_or(0);
    let result: Vec<u8> = (0..len)
        .map(|i| match op {
            BitOperator::Not => !byte(&inputs[0], i),
            BitOperator::And => inputs.iter().fold(0xff, |acc, input| acc & byte(input, i)),
            BitOperator::Or => inputs.iter().fold(0x00, |acc, input| acc | byte(input, i)),
            BitOperator::Xor => inputs.iter().fold(0x00, |acc, input| acc ^ byte(input, i)),
        })
        .collect();

    if result.is_empty() {
        entries.remove(dest);
    } else {
        entries.insert(
            dest.to_string(),
            Entry {
                bytes: result,
                expires_at: None,
            },
        );
    }
    len as u64
}

fn expire(entries: &mut HashMap<String, Entry>, key: &str, seconds: u64) -> bool {
    if live(entries, key).is_none() {
        return false;
    }
    if seconds == 0 {
        entries.remove(key);
    } else if let Some(entry) = entries.get_mut(key) {
        entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
    }
    true
}

fn delete(entries: &mut HashMap<String, Entry>, keys: &[String]) -> u64 {
    let mut removed = 0;
    for key in keys {
        if live(entries, key).is_some() {
            entries.remove(key);
            removed += 1;
        }
    }
    removed
}

/// Compile a Redis `MATCH` pattern.
///
/// Redis escapes with a backslash and negates classes with `[^..]`. `glob` spells
/// those `[x]` and `[!..]`. Runs of `*` collapse to one.
fn redis_glob(pattern: &str) -> BitmapistResult<Pattern> {
    let mut translated = String::with_capacity(pattern.len());
    let mut in_class = false;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().unwrap_or('\\');
                if in_class {
                    translated.push(escaped);
                } else {
                    translated.push_str(&Pattern::escape(&escaped.to_string()));
                }
            }
            '[' if !in_class => {
                in_class = true;
                translated.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    translated.push('!');
                }
            }
            ']' if in_class => {
                in_class = false;
                translated.push(']');
            }
            '*' if !in_class && translated.ends_with('*') => {}
            other => translated.push(other),
        }
    }
    Pattern::new(&translated)
        .map_err(|e| BitmapistError::store(format!("invalid pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MAX_BIT_OFFSET;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_get_count() {
        let store = MemoryBitmapStore::new();
        assert!(!store.set_bit("k", 5, true).await.unwrap());
        assert!(store.set_bit("k", 5, true).await.unwrap());
        store.set_bit("k", 555, true).await.unwrap();
        assert!(store.get_bit("k", 5).await.unwrap());
        assert!(!store.get_bit("k", 6).await.unwrap());
        assert_eq!(store.bit_count("k").await.unwrap(), 2);
        assert_eq!(store.bit_count("missing").await.unwrap(), 0);
        assert!(!store.get_bit("missing", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_bit_order_is_msb_first() {
        let store = MemoryBitmapStore::new();
        store.set_bit("k", 0, true).await.unwrap();
        store.set_bit("k", 9, true).await.unwrap();
        assert_eq!(store.fetch("k").await.unwrap(), Some(vec![0x80, 0x40]));
    }

    #[tokio::test]
    async fn test_clearing_bit_keeps_key() {
        let store = MemoryBitmapStore::new();
        store.set_bit("k", 3, false).await.unwrap();
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.bit_count("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bit_op_pads_and_removes_empty_result() {
        let store = MemoryBitmapStore::new();
        store.set_bit("a", 1, true).await.unwrap();
        store.set_bit("b", 20, true).await.unwrap();

        let len = store
            .bit_op(BitOperator::Or, "or", &keys(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(len, 3);
        assert_eq!(store.bit_count("or").await.unwrap(), 2);

        let len = store
            .bit_op(BitOperator::And, "none", &keys(&["x", "y"]))
            .await
            .unwrap();
        assert_eq!(len, 0);
        assert!(!store.exists("none").await.unwrap());
    }

    #[tokio::test]
    async fn test_not_requires_single_source() {
        let store = MemoryBitmapStore::new();
        let err = store
            .bit_op(BitOperator::Not, "n", &keys(&["a", "b"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("single source"));
    }

    #[tokio::test]
    async fn test_expire_and_ttl() {
        let store = MemoryBitmapStore::new();
        assert!(!store.expire("k", 60).await.unwrap());
        store.set_bit("k", 1, true).await.unwrap();
        assert!(store.ttl("k").await.is_none());
        assert!(store.expire("k", 60).await.unwrap());
        let ttl = store.ttl("k").await.unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(55));

        assert!(store.expire("k", 0).await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_execute_applies_in_order() {
        let store = MemoryBitmapStore::new();
        store
            .execute(vec![
                StoreCommand::SetBit {
                    key: "a".into(),
                    offset: 2,
                    value: true,
                },
                StoreCommand::BitOp {
                    op: BitOperator::Not,
                    dest: "n".into(),
                    sources: keys(&["a"]),
                },
                StoreCommand::Expire {
                    key: "n".into(),
                    seconds: 60,
                },
            ])
            .await
            .unwrap();
        assert!(store.exists("a").await.unwrap());
        assert_eq!(store.bit_count("n").await.unwrap(), 7);
        assert!(store.ttl("n").await.is_some());
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_batch_atomically() {
        let store = MemoryBitmapStore::new();
        let result = store
            .execute(vec![
                StoreCommand::SetBit {
                    key: "a".into(),
                    offset: 2,
                    value: true,
                },
                StoreCommand::BitOp {
                    op: BitOperator::Not,
                    dest: "n".into(),
                    sources: keys(&["a", "b"]),
                },
            ])
            .await;
        assert!(result.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_counts_existing() {
        let store = MemoryBitmapStore::new();
        store.set_bit("a", 1, true).await.unwrap();
        assert_eq!(store.delete(&keys(&["a", "b"])).await.unwrap(), 1);
        assert_eq!(store.delete(&keys(&["a"])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_keys() {
        let store = MemoryBitmapStore::new();
        for k in ["bitmapist_foo_u", "bitmapist_bar_u", "other_foo_u"] {
            store.set_bit(k, 1, true).await.unwrap();
        }
        assert_eq!(
            store.scan_keys("bitmapist_*", 10).await.unwrap(),
            keys(&["bitmapist_bar_u", "bitmapist_foo_u"])
        );
        assert_eq!(
            store.scan_keys("bitmapist_f*", 10).await.unwrap(),
            keys(&["bitmapist_foo_u"])
        );
    }

    #[tokio::test]
    async fn test_scan_keys_follows_redis_patterns() {
        let store = MemoryBitmapStore::new();
        for k in ["bitmapist_a_u", "bitmapist_b_u", "bitmapist_c_u", "bitmapist_*_u"] {
            store.set_bit(k, 1, true).await.unwrap();
        }
        assert_eq!(
            store.scan_keys("bitmapist_[ab]*", 10).await.unwrap(),
            keys(&["bitmapist_a_u", "bitmapist_b_u"])
        );
        assert_eq!(
            store.scan_keys("bitmapist_[^ab]_u", 10).await.unwrap(),
            keys(&["bitmapist_*_u", "bitmapist_c_u"])
        );
        assert_eq!(
            store.scan_keys("bitmapist_\\a*", 10).await.unwrap(),
            keys(&["bitmapist_a_u"])
        );
        assert_eq!(
            store.scan_keys("bitmapist_\\*_u", 10).await.unwrap(),
            keys(&["bitmapist_*_u"])
        );
        assert_eq!(store.scan_keys("bitmapist_?_u", 10).await.unwrap().len(), 4);
        assert_eq!(store.scan_keys("**", 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_offset_out_of_range_is_rejected() {
        let store = MemoryBitmapStore::new();
        assert!(store.set_bit("k", u64::MAX, true).await.is_err());
        assert!(store.set_bit("k", MAX_BIT_OFFSET, true).await.is_err());
        assert!(store.get_bit("k", MAX_BIT_OFFSET).await.is_err());
        assert!(store.is_empty().await);

        let result = store
            .execute(vec![
                StoreCommand::SetBit {
                    key: "a".into(),
                    offset: 1,
                    value: true,
                },
                StoreCommand::SetBit {
                    key: "b".into(),
                    offset: MAX_BIT_OFFSET,
                    value: true,
                },
            ])
            .await;
        assert!(result.is_err());
        assert!(store.is_empty().await);
    }
}
