//! Order sizing and exit pricing.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::Position;

/// Whole shares a lot buys at `price`: `floor(lot / price)`.
pub fn lot_quantity(lot: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO || lot <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (lot / price).floor()
}

/// Limit price for an entry at `last_price`, truncated to a valid tick: whole
/// cents from $1 up, four decimals below.
pub fn entry_limit_price(last_price: Decimal) -> Decimal {
    let dp = if last_price >= Decimal::ONE { 2 } else { 4 };
    last_price.round_dp_with_strategy(dp, RoundingStrategy::ToZero)
}

/// Limit price for a regular exit: never below cost plus `markup`, but follow
/// the market up when it already trades higher.
///
/// Rounded up to the cent so the floor is never undercut.
pub fn exit_limit_price(position: &Position, last_price: Decimal, markup: Decimal) -> Decimal {
    position
        .break_even_exit(markup)
        .max(last_price)
        .round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lot_quantity() {
        assert_eq!(lot_quantity(dec!(1000), dec!(50)), dec!(20));
        assert_eq!(lot_quantity(dec!(1000), dec!(33)), dec!(30));
        assert_eq!(lot_quantity(dec!(100), dec!(250)), dec!(0));
        assert_eq!(lot_quantity(dec!(100), dec!(0)), dec!(0));
    }

    #[test]
    fn test_entry_price_truncates_sub_penny() {
        assert_eq!(entry_limit_price(dec!(50)), dec!(50));
        assert_eq!(entry_limit_price(dec!(50.0049)), dec!(50.00));
        assert_eq!(entry_limit_price(dec!(172.339)), dec!(172.33));
        assert_eq!(entry_limit_price(dec!(0.51237)), dec!(0.5123));
    }

    #[test]
    fn test_exit_price_floor_at_cost_plus_cent() {
        let pos = Position::new("AAPL", dec!(20), dec!(50.00));
        // Market below cost: hold the floor
        assert_eq!(exit_limit_price(&pos, dec!(49.50), dec!(0.01)), dec!(50.01));
        // Market above cost: chase it
        assert_eq!(exit_limit_price(&pos, dec!(50.40), dec!(0.01)), dec!(50.40));
    }

    #[test]
    fn test_exit_price_rounds_up_to_cent() {
        let pos = Position::new("AAPL", dec!(20), dec!(50.0033));
        assert_eq!(exit_limit_price(&pos, dec!(49.00), dec!(0.01)), dec!(50.02));
    }
}
