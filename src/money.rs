//! Monetary arithmetic helpers shared by every service.
//!
//! All amounts in the system use "pretty-decimal" rounding: integral values
//! pass through unchanged, anything else is rounded to exactly two decimal
//! places (half away from zero). Applied before any balance mutation or
//! persistence so repeated fee arithmetic cannot accumulate drift.

use rust_decimal::{Decimal, RoundingStrategy};

/// One hundred, as a `Decimal`, for percentage math.
pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Pretty-decimal rounding: two decimal places, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Ceiling-rounds to two decimal places. Used for display of the Gini index.
pub fn ceil2(value: Decimal) -> Decimal {
    (value * HUNDRED).ceil() / HUNDRED
}

/// The fee taken on `amount` at `fee_percent`, pretty-decimal rounded.
pub fn fee_for(amount: Decimal, fee_percent: Decimal) -> Decimal {
    round2(amount * fee_percent / HUNDRED)
}

/// Grosses a net amount back up through a percentage fee, i.e. the amount
/// that nets to `net` after `fee_percent` is taken.
pub fn gross_up(net: Decimal, fee_percent: Decimal) -> Decimal {
    net / ((HUNDRED - fee_percent) / HUNDRED)
}

/// Median of a set of amounts. Returns `None` for an empty set; an even
/// count averages the two middle values.
pub fn median(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / Decimal::TWO)
    }
}
