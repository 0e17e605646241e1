use super::ids::{GroupId, MemberId};
use crate::money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One side of a bilateral currency-exchange relationship. Positions are
/// always created in cross-linked pairs; escrowed liquidity lives in
/// `balance`, of which `funded_by_operator` is still owed back to the
/// operator (the remainder is owed to counterpart liquidity flows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub id: Uuid,
    pub group_id: GroupId,
    pub operator_id: MemberId,
    pub balance: Decimal,
    /// Units of this group's currency per unit of the counterpart's.
    pub rate: Decimal,
    pub funded_by_operator: Decimal,
    pub fees_earned: Decimal,
    pub paired_position_id: Uuid,
}

impl ExchangePosition {
    pub fn new(
        id: Uuid,
        group_id: GroupId,
        operator_id: MemberId,
        balance: Decimal,
        rate: Decimal,
        paired_position_id: Uuid,
    ) -> Self {
        Self {
            id,
            group_id,
            operator_id,
            balance,
            rate: money::round2(rate),
            funded_by_operator: balance,
            fees_earned: Decimal::ZERO,
            paired_position_id,
        }
    }

    /// The most the operator may withdraw: their own funding, capped at
    /// what the position still holds.
    pub fn withdrawable(&self) -> Decimal {
        self.funded_by_operator.min(self.balance)
    }
}

/// A pair is valid when the two sides quote mathematically inverse rates,
/// compared after pretty-decimal rounding.
pub fn is_reciprocal(rate_a: Decimal, rate_b: Decimal) -> bool {
    if rate_a.is_zero() || rate_b.is_zero() {
        return false;
    }
    money::round2(rate_a) == money::round2(Decimal::ONE / rate_b)
}

/// A routing candidate: a reciprocal-valid position pair between two
/// groups, with enough context to rank by rate and check liquidity.
#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub position_id: Uuid,
    pub paired_position_id: Uuid,
    pub balance: Decimal,
    pub counterpart_balance: Decimal,
    pub rate: Decimal,
}

/// Picks the cheapest route by strict `<` comparison. Ties keep the first
/// candidate in enumeration order; the order is the store's enumeration
/// order, which makes selection deterministic for a given store state.
pub fn best_route(candidates: &[RouteCandidate]) -> Option<&RouteCandidate> {
    candidates
        .iter()
        .reduce(|best, next| if next.rate < best.rate { next } else { best })
}
