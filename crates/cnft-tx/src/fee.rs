//! Service fee schedule for batch operations.

use cnft_types::constants::LOVELACE_PER_ADA;
use cnft_types::Quantity;
use serde::{Deserialize, Serialize};

/// Per-item service fee (1 ADA).
pub const DEFAULT_FEE_PER_ITEM: u64 = LOVELACE_PER_ADA;

/// Floor applied regardless of item count (1 ADA).
pub const DEFAULT_MINIMUM_FEE: u64 = LOVELACE_PER_ADA;

/// Fee owed to the operator of a batch workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Address the fee is paid to.
    pub address: String,
    pub per_item: u64,
    pub minimum: u64,
}

impl FeeSchedule {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            per_item: DEFAULT_FEE_PER_ITEM,
            minimum: DEFAULT_MINIMUM_FEE,
        }
    }

    /// `max(item_count * per_item, minimum)` in lovelace.
    pub fn amount(&self, item_count: usize) -> Quantity {
        let scaled = Quantity::from(self.per_item) * Quantity::from(item_count);
        scaled.max(Quantity::from(self.minimum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_amount() {
        let fees = FeeSchedule::new("addr_test1fee");
        assert_eq!(fees.amount(0), Quantity::from(1_000_000u64));
        assert_eq!(fees.amount(1), Quantity::from(1_000_000u64));
        assert_eq!(fees.amount(7), Quantity::from(7_000_000u64));
    }

    #[test]
    fn test_custom_minimum() {
        let fees = FeeSchedule {
            address: "addr_test1fee".into(),
            per_item: 500_000,
            minimum: 2_000_000,
        };
        assert_eq!(fees.amount(3), Quantity::from(2_000_000u64));
        assert_eq!(fees.amount(5), Quantity::from(2_500_000u64));
    }
}
