//! Core traits for bitmapist backends.

mod bitmap_store;

pub use bitmap_store::*;
