//! Store implementations bundled with the core crate.
//!
//! Networked backends live in `bitmapist-stores`.

mod memory;

pub use memory::MemoryBitmapStore;
