//! Factory for creating bitmap store providers.

use std::sync::Arc;

use bitmapist_core::error::{BitmapistError, BitmapistResult};
use bitmapist_core::store::MemoryBitmapStore;
use bitmapist_core::traits::{BitmapStore, StoreConfig, StoreProvider};

/// Factory for creating bitmap store providers.
pub struct BitmapStoreFactory;

impl BitmapStoreFactory {
    /// Create a bitmap store from the given configuration.
    ///
    /// Providers whose cargo feature is not enabled yield
    /// [`BitmapistError::UnsupportedProvider`].
    pub async fn create(config: &StoreConfig) -> BitmapistResult<Arc<dyn BitmapStore>> {
        match config.provider {
            StoreProvider::Memory => Ok(Arc::new(MemoryBitmapStore::new())),

            #[cfg(feature = "redis")]
            StoreProvider::Redis => {
                let store = crate::redis_store::RedisBitmapStore::new(config).await?;
                Ok(Arc::new(store))
            }

            #[allow(unreachable_patterns)]
            _ => Err(BitmapistError::UnsupportedProvider {
                provider: format!("{:?}", config.provider),
            }),
        }
    }

    /// Create an in-process store.
    pub fn memory() -> Arc<dyn BitmapStore> {
        Arc::new(MemoryBitmapStore::new())
    }

    /// Create a Redis store at `url`.
    #[cfg(feature = "redis")]
    pub async fn redis(url: &str) -> BitmapistResult<Arc<dyn BitmapStore>> {
        Self::create(&StoreConfig::redis(url)).await
    }
}
