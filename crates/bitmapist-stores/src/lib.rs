//! bitmapist-stores - Bitmap store implementations for bitmapist.
//!
//! The in-process store ships with `bitmapist-core`; this crate adds
//! networked backends and a factory that picks one from configuration.
//!
//! # Supported Backends
//!
//! - **Memory** (always available) - in-process, for tests and development
//! - **Redis** (feature: `redis`) - Redis or any server with its bitmap commands

mod factory;

#[cfg(feature = "redis")]
mod redis_store;

// Public exports
pub use factory::BitmapStoreFactory;

#[cfg(feature = "redis")]
pub use redis_store::RedisBitmapStore;

// Re-export core types for convenience
pub use bitmapist_core::store::MemoryBitmapStore;
pub use bitmapist_core::traits::{BitmapStore, StoreCommand, StoreConfig, StoreProvider};
