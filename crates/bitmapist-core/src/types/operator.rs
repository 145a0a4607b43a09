//! Boolean operators understood by the store's bit-combine command.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Bitwise operator for combining bitmaps.
///
/// The string form is the store's command argument (`AND`, `OR`, `XOR`,
/// `NOT`) and also appears verbatim in derived keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum BitOperator {
    And,
    Or,
    Xor,
    /// Unary; takes exactly one operand.
    Not,
}

impl BitOperator {
    /// Command argument for this operator.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether the operator takes a single operand.
    pub fn is_unary(&self) -> bool {
        matches!(self, BitOperator::Not)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_operator_strings() {
        assert_eq!(BitOperator::And.as_str(), "AND");
        assert_eq!(BitOperator::Xor.to_string(), "XOR");
        assert_eq!(BitOperator::from_str("NOT").unwrap(), BitOperator::Not);
        assert!(BitOperator::Not.is_unary());
        assert!(!BitOperator::Or.is_unary());
    }
}
