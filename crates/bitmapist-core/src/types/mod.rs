//! Value types: periods, operators and key construction.

pub mod key;
mod operator;
mod period;

pub use operator::BitOperator;
pub use period::{Granularity, Period};
