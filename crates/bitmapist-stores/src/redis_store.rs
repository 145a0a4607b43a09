//! Redis bitmap store.
//!
//! Works against Redis and any server implementing its bitmap commands
//! (SETBIT, GETBIT, BITCOUNT, BITOP). Batches go out as one MULTI/EXEC
//! pipeline.

use async_trait::async_trait;

use bitmapist_core::error::{BitmapistError, BitmapistResult};
use bitmapist_core::traits::{
    check_bit_op, BitmapStore, StoreCommand, StoreConfig, StoreProvider,
};
use bitmapist_core::types::BitOperator;

use redis::aio::MultiplexedConnection;
use redis::{Client, Pipeline, RedisError};

const DEFAULT_URL: &str = "redis://localhost:6379";

/// Redis-backed [`BitmapStore`].
pub struct RedisBitmapStore {
    connection: MultiplexedConnection,
    url: String,
}

impl RedisBitmapStore {
    /// Connect using the store configuration. Defaults to a local server.
    pub async fn new(config: &StoreConfig) -> BitmapistResult<Self> {
        let url = config.url.as_deref().unwrap_or(DEFAULT_URL);
        Self::connect(url).await
    }

    /// Connect to `url`.
    pub async fn connect(url: &str) -> BitmapistResult<Self> {
        let client = Client::open(url).map_err(|e| {
            BitmapistError::Configuration(format!("Invalid Redis URL '{}': {}", url, e))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_err("Failed to connect to Redis", e))?;

        tracing::debug!("Connected to Redis bitmap store at {}", url);
        Ok(Self {
            connection,
            url: url.to_string(),
        })
    }

    /// The URL this store is connected to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BitmapStore for RedisBitmapStore {
    async fn set_bit(&self, key: &str, offset: u64, value: bool) -> BitmapistResult<bool> {
        let mut conn = self.connection.clone();
        let previous: u8 = redis::cmd("SETBIT")
            .arg(key)
            .arg(offset)
            .arg(u8::from(value))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to set bit", e))?;
        Ok(previous == 1)
    }

    async fn get_bit(&self, key: &str, offset: u64) -> BitmapistResult<bool> {
        let mut conn = self.connection.clone();
        let bit: u8 = redis::cmd("GETBIT")
            .arg(key)
            .arg(offset)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to get bit", e))?;
        Ok(bit == 1)
    }

    async fn bit_count(&self, key: &str) -> BitmapistResult<u64> {
        let mut conn = self.connection.clone();
        redis::cmd("BITCOUNT")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to count bits", e))
    }

    async fn fetch(&self, key: &str) -> BitmapistResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to fetch bitmap", e))
    }

    async fn bit_op(
        &self,
        op: BitOperator,
        dest: &str,
        sources: &[String],
    ) -> BitmapistResult<u64> {
        check_bit_op(op, sources)?;
        let mut conn = self.connection.clone();
        redis::cmd("BITOP")
            .arg(op.as_str())
            .arg(dest)
            .arg(sources)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to combine bitmaps", e))
    }

    async fn expire(&self, key: &str, seconds: u64) -> BitmapistResult<bool> {
        let mut conn = self.connection.clone();
        let set: u8 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to set expiry", e))?;
        Ok(set == 1)
    }

    async fn delete(&self, keys: &[String]) -> BitmapistResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to delete keys", e))
    }

    async fn exists(&self, key: &str) -> BitmapistResult<bool> {
        let mut conn = self.connection.clone();
        let found: u8 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("Failed to check key", e))?;
        Ok(found == 1)
    }

    async fn scan_keys(&self, pattern: &str, batch: usize) -> BitmapistResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(batch)
                .query_async(&mut conn)
                .await
                .map_err(|e| map_err("Failed to scan keys", e))?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn execute(&self, commands: Vec<StoreCommand>) -> BitmapistResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        // MULTI/EXEC does not roll back a failing command, so reject up front.
        for command in &commands {
            command.validate()?;
        }

        let count = commands.len();
        let pipe = build_pipeline(commands);
        let mut conn = self.connection.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_err("Failed to execute batch", e))?;

        tracing::debug!(commands = count, "Executed Redis batch");
        Ok(())
    }

    fn provider(&self) -> StoreProvider {
        StoreProvider::Redis
    }
}

fn build_pipeline(commands: Vec<StoreCommand>) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for command in commands {
        match command {
            StoreCommand::SetBit { key, offset, value } => {
                pipe.cmd("SETBIT").arg(key).arg(offset).arg(u8::from(value));
            }
            StoreCommand::BitOp { op, dest, sources } => {
                pipe.cmd("BITOP").arg(op.as_str()).arg(dest).arg(sources);
            }
            StoreCommand::Expire { key, seconds } => {
                pipe.cmd("EXPIRE").arg(key).arg(seconds);
            }
        }
        pipe.ignore();
    }
    pipe
}

/// Classify a driver error. Timeouts and lost connections are retryable.
fn map_err(context: &str, err: RedisError) -> BitmapistError {
    let message = format!("{}: {}", context, err);
    let mapped = if err.is_timeout() {
        BitmapistError::store_timeout(message)
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        BitmapistError::store_unavailable(message)
    } else {
        BitmapistError::store(message)
    };
    mapped.with_source(err)
}
