//! Common numeric helpers and query types used across the ledger

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept for material consumption quantities
pub const QUANTITY_SCALE: u32 = 4;
/// Decimal places kept for production unit costs
pub const UNIT_COST_SCALE: u32 = 4;
/// Decimal places for piece balances and money
pub const MONEY_SCALE: u32 = 2;
/// Decimal places for shipped weight
pub const WEIGHT_SCALE: u32 = 3;

fn quantize(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
}

/// Round a material quantity to 4 places, half to even
pub fn quantize_quantity(value: Decimal) -> Decimal {
    quantize(value, QUANTITY_SCALE)
}

pub fn quantize_unit_cost(value: Decimal) -> Decimal {
    quantize(value, UNIT_COST_SCALE)
}

/// Round money and piece balances to 2 places, half to even
pub fn quantize_money(value: Decimal) -> Decimal {
    quantize(value, MONEY_SCALE)
}

pub fn quantize_weight(value: Decimal) -> Decimal {
    quantize(value, WEIGHT_SCALE)
}

/// Date range for queries, inclusive on both ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start.map_or(true, |start| day >= start) && self.end.map_or(true, |end| day <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quantize_uses_bankers_rounding() {
        assert_eq!(quantize_money(Decimal::new(1225, 3)), Decimal::new(122, 2));
        assert_eq!(quantize_money(Decimal::new(1235, 3)), Decimal::new(124, 2));
        assert_eq!(quantize_quantity(Decimal::new(123455, 5)), Decimal::new(12346, 4));
        assert_eq!(quantize_quantity(Decimal::new(123445, 5)), Decimal::new(12344, 4));
    }

    #[test]
    fn test_quantize_leaves_short_values_alone() {
        assert_eq!(quantize_money(Decimal::from(8)), Decimal::from(8));
        assert_eq!(quantize_weight(Decimal::new(15, 1)), Decimal::new(15, 1));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 3, 1),
            end: NaiveDate::from_ymd_opt(2024, 3, 31),
        };
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert!(range.contains(first));
        assert!(range.contains(last));
        assert!(!range.contains(after));
    }

    #[test]
    fn test_open_date_range_matches_everything() {
        let range = DateRange {
            start: None,
            end: None,
        };
        assert!(range.contains(Utc::now()));
    }
}
