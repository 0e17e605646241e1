use super::{notify_feed, notify_member};
use crate::config::PolicySettings;
use crate::error::{AppError, Result};
use crate::gateway::NotificationGateway;
use crate::models::{
    best_route, generate_coupon_code, is_reciprocal, ExchangePosition, GroupId, MemberId,
    RedeemTicket, RemittanceCoupon, RouteCandidate,
};
use crate::money;
use crate::observability::metrics::get_metrics;
use crate::services::group::GroupService;
use crate::services::ledger::LedgerService;
use crate::store::{collections, DataStore, DataStoreExt, Filter};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// One side of a new exchange pair.
#[derive(Debug, Clone)]
pub struct PairSide {
    pub group_id: GroupId,
    pub operator_id: MemberId,
}

/// Quote returned when a cross-group transfer is initiated. The coupon is
/// not yet funded; `cost` is what funding will debit in origin currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponQuote {
    pub coupon: RemittanceCoupon,
    pub cost: Decimal,
    pub redeemable: Decimal,
    pub destination_currency: String,
}

/// Pinned route and amount awaiting the claimant's confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemQuote {
    pub ticket: RedeemTicket,
    pub fee_percent: Decimal,
}

/// Outcome of a confirmed redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub credited: Decimal,
    pub claimant_balance: Decimal,
}

/// Result of updating a position's funding or rate.
#[derive(Debug, Clone, Copy)]
pub struct PositionUpdate {
    /// Whether the pair is reciprocal-valid after the update.
    pub active: bool,
}

/// Bilateral exchange pairs, liquidity-aware routing, and the escrowed
/// remittance-coupon settlement protocol.
pub struct ExchangeService {
    store: Arc<dyn DataStore>,
    gateway: Arc<dyn NotificationGateway>,
    ledger: Arc<LedgerService>,
    groups: Arc<GroupService>,
    policy: PolicySettings,
}

impl ExchangeService {
    pub fn new(
        store: Arc<dyn DataStore>,
        gateway: Arc<dyn NotificationGateway>,
        ledger: Arc<LedgerService>,
        groups: Arc<GroupService>,
        policy: PolicySettings,
    ) -> Self {
        Self {
            store,
            gateway,
            ledger,
            groups,
            policy,
        }
    }

    // ---- positions -----------------------------------------------------

    pub async fn position(&self, id: Uuid) -> Result<ExchangePosition> {
        self.store
            .select_one(collections::EXCHANGE_POSITIONS, &[Filter::eq("id", id)])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("exchange position '{id}'")))
    }

    pub async fn positions_for_group(&self, group: &GroupId) -> Result<Vec<ExchangePosition>> {
        self.store
            .select_as(
                collections::EXCHANGE_POSITIONS,
                &[Filter::eq("group_id", group)],
            )
            .await
    }

    pub async fn positions_for_operator(
        &self,
        group: &GroupId,
        operator: &MemberId,
    ) -> Result<Vec<ExchangePosition>> {
        self.store
            .select_as(
                collections::EXCHANGE_POSITIONS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("operator_id", operator),
                ],
            )
            .await
    }

    /// A position, its counterpart, and whether the pair is active.
    pub async fn position_detail(
        &self,
        id: Uuid,
    ) -> Result<(ExchangePosition, ExchangePosition, bool)> {
        let position = self.position(id).await?;
        let pair = self.position(position.paired_position_id).await?;
        let active = is_reciprocal(position.rate, pair.rate);
        Ok((position, pair, active))
    }

    /// Creates both sides of a new exchange pair. The creator's side is
    /// funded from their personal balance (escrow); the counterpart's side
    /// starts empty and inactive until they fund it with a reciprocal rate.
    pub async fn add_pair(
        &self,
        origin: PairSide,
        counterpart: PairSide,
        amount: Decimal,
        rate: Decimal,
    ) -> Result<(ExchangePosition, ExchangePosition)> {
        let origin_config = self.groups.config(&origin.group_id).await?;
        let counterpart_config = self.groups.config(&counterpart.group_id).await?;
        self.ledger
            .balance(&origin.group_id, &origin.operator_id)
            .await?;

        let amount = money::round2(amount);
        let rate = money::round2(rate);
        if amount <= Decimal::ZERO || rate <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "amount and rate must be greater than 0".to_string(),
            ));
        }
        for existing in self
            .positions_for_operator(&origin.group_id, &origin.operator_id)
            .await?
        {
            let pair = self.position(existing.paired_position_id).await?;
            if pair.group_id == counterpart.group_id {
                return Err(AppError::InvalidInput(
                    "you have already created an exchange with this pairing".to_string(),
                ));
            }
        }

        let origin_id = Uuid::new_v4();
        let counterpart_id = Uuid::new_v4();
        let origin_position = ExchangePosition::new(
            origin_id,
            origin.group_id.clone(),
            origin.operator_id.clone(),
            amount,
            rate,
            counterpart_id,
        );
        let counterpart_position = ExchangePosition::new(
            counterpart_id,
            counterpart.group_id.clone(),
            counterpart.operator_id.clone(),
            Decimal::ZERO,
            Decimal::ZERO,
            origin_id,
        );

        // Escrow leaves the personal balance before the rows land; a
        // failed debit therefore aborts the pair creation.
        self.ledger
            .debit(&origin.group_id, &origin.operator_id, amount)
            .await?;
        self.store
            .insert_as(collections::EXCHANGE_POSITIONS, &origin_position)
            .await?;
        self.store
            .insert_as(collections::EXCHANGE_POSITIONS, &counterpart_position)
            .await?;

        notify_member(
            self.gateway.as_ref(),
            &counterpart.operator_id,
            &format!(
                "'{}' has created an exchange with you at {rate}:1. Fund your side \
                 and set your rate to {} to activate the pair (position {counterpart_id}).",
                origin.operator_id,
                money::round2(Decimal::ONE / rate),
            ),
        )
        .await;
        notify_feed(
            self.gateway.as_ref(),
            &origin_config,
            &format!(
                "'{}' has created an exchange for {} shares; waiting on the \
                 counterpart to fund their side.",
                origin.operator_id, counterpart_config.currency_name
            ),
        )
        .await;
        info!(
            origin_group = %origin.group_id,
            counterpart_group = %counterpart.group_id,
            %rate,
            "exchange pair created"
        );
        Ok((origin_position, counterpart_position))
    }

    /// Adds operator funding and/or re-quotes the rate on one side.
    pub async fn update_position(
        &self,
        position_id: Uuid,
        operator: &MemberId,
        additional_amount: Option<Decimal>,
        rate: Option<Decimal>,
    ) -> Result<PositionUpdate> {
        let position = self.position(position_id).await?;
        if &position.operator_id != operator {
            return Err(AppError::InvalidInput(
                "you are not the operator of this exchange position".to_string(),
            ));
        }
        self.ledger.balance(&position.group_id, operator).await?;
        if additional_amount.is_none() && rate.is_none() {
            return Err(AppError::InvalidInput(
                "provide an amount and/or a rate".to_string(),
            ));
        }

        let amount = money::round2(additional_amount.unwrap_or_default());
        if amount < Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "amount cannot be negative".to_string(),
            ));
        }
        let new_rate = match rate {
            Some(rate) if money::round2(rate) <= Decimal::ZERO => {
                return Err(AppError::InvalidInput(
                    "rate must be greater than 0".to_string(),
                ))
            }
            Some(rate) => money::round2(rate),
            None => position.rate,
        };

        if amount > Decimal::ZERO {
            self.ledger
                .debit(&position.group_id, operator, amount)
                .await?;
        }
        self.store
            .update(
                collections::EXCHANGE_POSITIONS,
                &[Filter::eq("id", position_id)],
                json!({
                    "balance": position.balance + amount,
                    "rate": new_rate,
                    "funded_by_operator": position.funded_by_operator + amount,
                }),
            )
            .await?;

        let pair = self.position(position.paired_position_id).await?;
        let active = is_reciprocal(new_rate, pair.rate);
        if rate.is_some() && new_rate != position.rate {
            if active {
                notify_member(
                    self.gateway.as_ref(),
                    &pair.operator_id,
                    &format!(
                        "'{operator}' set their side of the exchange to {new_rate}:1. \
                         The pair is valid."
                    ),
                )
                .await;
                if position.balance.is_zero() && amount > Decimal::ZERO {
                    self.announce_activation(&position, &pair).await;
                }
            } else {
                notify_member(
                    self.gateway.as_ref(),
                    &pair.operator_id,
                    &format!(
                        "'{operator}' set their side of the exchange to {new_rate}:1. \
                         Set your side (position {}) to {} to make the pair valid.",
                        pair.id,
                        money::round2(Decimal::ONE / new_rate),
                    ),
                )
                .await;
            }
        }
        Ok(PositionUpdate { active })
    }

    async fn announce_activation(&self, position: &ExchangePosition, pair: &ExchangePosition) {
        for (side, other) in [(position, pair), (pair, position)] {
            if let Ok(config) = self.groups.config(&side.group_id).await {
                if let Ok(other_config) = self.groups.config(&other.group_id).await {
                    notify_feed(
                        self.gateway.as_ref(),
                        &config,
                        &format!(
                            "The exchange for {} shares, run by '{}', is now active!",
                            other_config.currency_name, side.operator_id
                        ),
                    )
                    .await;
                }
            }
        }
    }

    /// Returns escrowed funds to the operator, bounded by what they funded
    /// and what the position still holds.
    pub async fn withdraw(
        &self,
        position_id: Uuid,
        operator: &MemberId,
        amount: Decimal,
    ) -> Result<Decimal> {
        let position = self.position(position_id).await?;
        if &position.operator_id != operator {
            return Err(AppError::InvalidInput(
                "you are not the operator of this exchange position".to_string(),
            ));
        }
        let amount = money::round2(amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "amount must be greater than 0".to_string(),
            ));
        }
        if amount > position.withdrawable() {
            return Err(AppError::InsufficientFunds {
                requested: amount,
                available: position.withdrawable(),
            });
        }
        self.store
            .update(
                collections::EXCHANGE_POSITIONS,
                &[Filter::eq("id", position_id)],
                json!({
                    "balance": position.balance - amount,
                    "funded_by_operator": position.funded_by_operator - amount,
                }),
            )
            .await?;
        self.ledger
            .credit(&position.group_id, operator, amount)
            .await?;
        Ok(position.balance - amount)
    }

    /// Credits accumulated routing fees to the operator and zeroes them.
    pub async fn withdraw_fees(&self, position_id: Uuid, operator: &MemberId) -> Result<Decimal> {
        let position = self.position(position_id).await?;
        if &position.operator_id != operator {
            return Err(AppError::InvalidInput(
                "you are not the operator of this exchange position".to_string(),
            ));
        }
        let fees = position.fees_earned;
        if fees > Decimal::ZERO {
            self.ledger
                .credit(&position.group_id, operator, fees)
                .await?;
            self.store
                .update(
                    collections::EXCHANGE_POSITIONS,
                    &[Filter::eq("id", position_id)],
                    json!({ "fees_earned": Decimal::ZERO }),
                )
                .await?;
        }
        Ok(fees)
    }

    // ---- routing -------------------------------------------------------

    /// Every reciprocal-valid pair from `origin` into `destination`, in
    /// store enumeration order.
    pub async fn valid_pairs(
        &self,
        origin: &GroupId,
        destination: &GroupId,
    ) -> Result<Vec<RouteCandidate>> {
        let mut candidates = Vec::new();
        for position in self.positions_for_group(origin).await? {
            let pair = match self.position(position.paired_position_id).await {
                Ok(pair) => pair,
                Err(AppError::NotFound(_)) => {
                    warn!(position = %position.id, "position has no counterpart; skipping");
                    continue;
                }
                Err(error) => return Err(error),
            };
            if &pair.group_id == destination && is_reciprocal(position.rate, pair.rate) {
                candidates.push(RouteCandidate {
                    position_id: position.id,
                    paired_position_id: pair.id,
                    balance: position.balance,
                    counterpart_balance: pair.balance,
                    rate: position.rate,
                });
            }
        }
        Ok(candidates)
    }

    // ---- settlement protocol -------------------------------------------

    /// Step 1: quote the transfer and record an unfunded coupon. The
    /// sender's balance is untouched until the coupon is funded.
    /// `destination_amount` is what the recipient should net, in the
    /// destination currency.
    pub async fn initiate_transfer(
        &self,
        origin_group: &GroupId,
        sender: &MemberId,
        destination_group: &GroupId,
        destination_amount: Decimal,
        message: Option<String>,
    ) -> Result<CouponQuote> {
        let destination_amount = money::round2(destination_amount);
        if destination_amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "amount must be greater than 0".to_string(),
            ));
        }
        let origin_config = self.groups.config(origin_group).await?;
        let destination_config = self.groups.config(destination_group).await?;
        let sender_balance = self.ledger.balance(origin_group, sender).await?;

        let candidates = self.valid_pairs(origin_group, destination_group).await?;
        if candidates.is_empty() {
            return Err(AppError::InvalidRoute(
                "no active exchange pairs for this transfer".to_string(),
            ));
        }
        // At initiation the requested amount is in destination currency,
        // so liquidity is compared against the counterpart side directly.
        let usable: Vec<RouteCandidate> = candidates
            .into_iter()
            .filter(|candidate| destination_amount <= candidate.counterpart_balance)
            .collect();
        let best = best_route(&usable).ok_or_else(|| {
            AppError::InvalidRoute("no exchange pair with enough liquidity".to_string())
        })?;

        // Gross up through the destination fee, then convert at the route
        // rate into origin currency.
        let gross_destination =
            Self::grossed(destination_amount, destination_config.fee_percent)?;
        let amount = money::round2(gross_destination * best.rate);
        let fee = money::fee_for(amount, origin_config.fee_percent);
        if !sender_balance.has_sufficient_funds(amount + fee) {
            return Err(AppError::InsufficientFunds {
                requested: amount + fee,
                available: sender_balance.amount,
            });
        }

        let code = self.unique_coupon_code().await?;
        let coupon = RemittanceCoupon::new(
            code,
            sender.clone(),
            destination_group.clone(),
            origin_group.clone(),
            amount,
            fee,
            message,
        );
        self.store
            .insert_as(collections::REMITTANCE_COUPONS, &coupon)
            .await?;
        get_metrics().record_coupon_issued(origin_group.as_str(), destination_group.as_str());

        Ok(CouponQuote {
            coupon,
            cost: amount + fee,
            redeemable: destination_amount,
            destination_currency: destination_config.currency_name,
        })
    }

    /// Grosses a destination-currency net amount up through the
    /// destination fee. A fee of 100% or more leaves nothing to redeem.
    fn grossed(net: Decimal, fee_percent: Decimal) -> Result<Decimal> {
        if fee_percent >= Decimal::ONE_HUNDRED {
            return Err(AppError::InvalidRoute(
                "the destination group's fee consumes the whole amount".to_string(),
            ));
        }
        Ok(money::gross_up(net, fee_percent))
    }

    /// Coupon codes are collision-checked against coupons that can still
    /// be redeemed; a redeemed coupon's code may be reissued.
    async fn unique_coupon_code(&self) -> Result<String> {
        loop {
            let code = generate_coupon_code();
            let taken = self
                .store
                .exists(
                    collections::REMITTANCE_COUPONS,
                    &[
                        Filter::eq("coupon_code", &code),
                        Filter::eq("is_redeemed", false),
                    ],
                )
                .await?;
            if !taken {
                return Ok(code);
            }
        }
    }

    pub async fn coupon_by_code(&self, code: &str) -> Result<Option<RemittanceCoupon>> {
        self.store
            .select_one(
                collections::REMITTANCE_COUPONS,
                &[Filter::eq("coupon_code", code)],
            )
            .await
    }

    /// Step 2: the sender confirms; escrow is taken and the redemption
    /// clock starts. Funding an already-funded coupon is a no-op returning
    /// the coupon unchanged.
    pub async fn fund_coupon(&self, code: &str, sender: &MemberId) -> Result<RemittanceCoupon> {
        let coupon = self
            .coupon_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("coupon '{code}'")))?;
        if &coupon.sender_id != sender {
            return Err(AppError::InvalidInput(
                "only the sender can fund this coupon".to_string(),
            ));
        }
        if coupon.is_redeemed {
            return Err(AppError::InvalidInput(
                "this payment has already been redeemed".to_string(),
            ));
        }
        if coupon.is_funded {
            return Ok(coupon);
        }

        self.ledger
            .debit(&coupon.origin_group_id, sender, coupon.amount + coupon.fee)
            .await?;
        let funded_at = Utc::now();
        self.store
            .update(
                collections::REMITTANCE_COUPONS,
                &[Filter::eq("coupon_code", code)],
                json!({ "is_funded": true, "created_at": funded_at }),
            )
            .await?;

        let origin_config = self.groups.config(&coupon.origin_group_id).await?;
        notify_feed(
            self.gateway.as_ref(),
            &origin_config,
            &format!("'{sender}' started an external payment."),
        )
        .await;
        info!(coupon = %coupon.coupon_code, %sender, "coupon funded");

        Ok(RemittanceCoupon {
            is_funded: true,
            created_at: funded_at,
            ..coupon
        })
    }

    /// Step 3: the claimant presents the coupon code; route discovery is
    /// re-run and the chosen route pinned in a ticket. Coupon codes are
    /// bearer instruments — any member of the destination group may
    /// redeem. Re-preparing returns the existing live ticket.
    pub async fn prepare_redeem(&self, code: &str, claimant: &MemberId) -> Result<RedeemQuote> {
        let coupon = self
            .coupon_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("coupon '{code}'")))?;
        if coupon.is_redeemed {
            return Err(AppError::InvalidInput(
                "this payment has already been redeemed".to_string(),
            ));
        }
        if !coupon.is_funded {
            return Err(AppError::InvalidInput(
                "this coupon has not been funded by the sender".to_string(),
            ));
        }
        let destination_config = self.groups.config(&coupon.destination_group_id).await?;
        self.ledger
            .balance(&coupon.destination_group_id, claimant)
            .await?;

        if let Some(existing) = self.live_ticket(code).await? {
            return Ok(RedeemQuote {
                ticket: existing,
                fee_percent: destination_config.fee_percent,
            });
        }

        let candidates = self
            .valid_pairs(&coupon.origin_group_id, &coupon.destination_group_id)
            .await?;
        if candidates.is_empty() {
            return Err(AppError::InvalidRoute(
                "no active exchange pairs for this transfer".to_string(),
            ));
        }
        // At redemption the coupon amount is in origin currency; it lands
        // on the counterpart side divided by the route rate.
        let usable: Vec<RouteCandidate> = candidates
            .into_iter()
            .filter(|candidate| coupon.amount / candidate.rate <= candidate.counterpart_balance)
            .collect();
        let best = best_route(&usable).ok_or_else(|| {
            AppError::InvalidRoute("no exchange pair with enough liquidity".to_string())
        })?;

        let gross = money::round2(coupon.amount / best.rate);
        let fee = money::fee_for(gross, destination_config.fee_percent);
        let ticket = RedeemTicket {
            id: Uuid::new_v4(),
            coupon_code: coupon.coupon_code.clone(),
            claimant_id: claimant.clone(),
            amount: money::round2(gross - fee),
            fee,
            route_position_id: best.position_id,
            origin_group_id: coupon.origin_group_id.clone(),
            destination_group_id: coupon.destination_group_id.clone(),
            is_redeemed: false,
        };
        self.store
            .insert_as(collections::REDEEM_TICKETS, &ticket)
            .await?;

        Ok(RedeemQuote {
            ticket,
            fee_percent: destination_config.fee_percent,
        })
    }

    async fn live_ticket(&self, code: &str) -> Result<Option<RedeemTicket>> {
        self.store
            .select_one(
                collections::REDEEM_TICKETS,
                &[
                    Filter::eq("coupon_code", code),
                    Filter::eq("is_redeemed", false),
                ],
            )
            .await
    }

    pub async fn ticket(&self, id: Uuid) -> Result<Option<RedeemTicket>> {
        self.store
            .select_one(collections::REDEEM_TICKETS, &[Filter::eq("id", id)])
            .await
    }

    /// Step 4a: the claimant confirms and funds move. The claimant gains
    /// the ticket amount; the origin-side position absorbs the remitted
    /// origin-currency amount; the destination-side position pays out the
    /// pre-fee destination amount; both sides earn their fees.
    pub async fn confirm_redeem(&self, ticket_id: Uuid, claimant: &MemberId) -> Result<SettlementReceipt> {
        let ticket = self
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| AppError::Expired("this payment".to_string()))?;
        if ticket.is_redeemed {
            return Err(AppError::InvalidInput(
                "this payment has already been redeemed".to_string(),
            ));
        }
        if &ticket.claimant_id != claimant {
            return Err(AppError::InvalidInput(
                "this redemption belongs to another claimant".to_string(),
            ));
        }
        let coupon = self
            .coupon_by_code(&ticket.coupon_code)
            .await?
            .ok_or_else(|| AppError::Expired("this payment".to_string()))?;
        if coupon.is_redeemed {
            return Err(AppError::InvalidInput(
                "this payment has already been redeemed".to_string(),
            ));
        }

        let origin_side = self
            .position(ticket.route_position_id)
            .await
            .map_err(|_| AppError::InvalidRoute("the chosen route no longer exists".to_string()))?;
        let destination_side = self.position(origin_side.paired_position_id).await?;
        let destination_config = self.groups.config(&ticket.destination_group_id).await?;

        let claimant_balance = self
            .ledger
            .credit(&ticket.destination_group_id, claimant, ticket.amount)
            .await?;
        self.store
            .update(
                collections::EXCHANGE_POSITIONS,
                &[Filter::eq("id", origin_side.id)],
                json!({
                    "balance": origin_side.balance + coupon.amount,
                    "fees_earned": origin_side.fees_earned + coupon.fee,
                }),
            )
            .await?;
        // The destination side pays the pre-fee amount: the claimant's
        // credit grossed back up through the destination fee.
        let destination_debit = money::round2(Self::grossed(
            ticket.amount,
            destination_config.fee_percent,
        )?);
        self.store
            .update(
                collections::EXCHANGE_POSITIONS,
                &[Filter::eq("id", destination_side.id)],
                json!({
                    "balance": destination_side.balance - destination_debit,
                    "fees_earned": destination_side.fees_earned + ticket.fee,
                }),
            )
            .await?;
        self.store
            .update(
                collections::REMITTANCE_COUPONS,
                &[Filter::eq("coupon_code", &ticket.coupon_code)],
                json!({ "is_redeemed": true }),
            )
            .await?;
        self.store
            .update(
                collections::REDEEM_TICKETS,
                &[Filter::eq("id", ticket.id)],
                json!({ "is_redeemed": true }),
            )
            .await?;

        notify_feed(
            self.gateway.as_ref(),
            &destination_config,
            &format!("'{claimant}' has accepted an external payment."),
        )
        .await;
        get_metrics().record_redemption(
            ticket.origin_group_id.as_str(),
            ticket.destination_group_id.as_str(),
        );
        info!(
            coupon = %ticket.coupon_code,
            %claimant,
            credited = %ticket.amount,
            "redemption settled"
        );

        Ok(SettlementReceipt {
            credited: ticket.amount,
            claimant_balance,
        })
    }

    /// Step 4b: the claimant declines; the ticket is dropped and the
    /// coupon stays funded and re-redeemable.
    pub async fn decline_redeem(&self, ticket_id: Uuid, claimant: &MemberId) -> Result<()> {
        let ticket = self
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| AppError::Expired("this payment".to_string()))?;
        if ticket.is_redeemed {
            return Err(AppError::InvalidInput(
                "this payment has already been redeemed".to_string(),
            ));
        }
        if &ticket.claimant_id != claimant {
            return Err(AppError::InvalidInput(
                "this redemption belongs to another claimant".to_string(),
            ));
        }
        self.store
            .delete(
                collections::REDEEM_TICKETS,
                &[Filter::eq("coupon_code", &ticket.coupon_code)],
            )
            .await?;
        Ok(())
    }

    // ---- expiry --------------------------------------------------------

    pub async fn all_coupons(&self) -> Result<Vec<RemittanceCoupon>> {
        self.store
            .select_as(collections::REMITTANCE_COUPONS, &[])
            .await
    }

    /// Whether the coupon has outlived the redemption window.
    pub fn is_coupon_expired(&self, coupon: &RemittanceCoupon, now: DateTime<Utc>) -> bool {
        coupon.is_expired(now, self.policy.coupon_ttl())
    }

    /// Deletes an unredeemed coupon and any tickets pinned to it,
    /// refunding `amount + fee` to the sender when escrow was taken.
    pub async fn expire_coupon(&self, coupon: &RemittanceCoupon) -> Result<()> {
        self.store
            .delete(
                collections::REMITTANCE_COUPONS,
                &[Filter::eq("coupon_code", &coupon.coupon_code)],
            )
            .await?;
        self.store
            .delete(
                collections::REDEEM_TICKETS,
                &[Filter::eq("coupon_code", &coupon.coupon_code)],
            )
            .await?;
        if coupon.is_funded {
            match self
                .ledger
                .credit(
                    &coupon.origin_group_id,
                    &coupon.sender_id,
                    coupon.amount + coupon.fee,
                )
                .await
            {
                Ok(_) => {}
                // The sender left the group while the coupon was live;
                // the escrow has nowhere to go back to.
                Err(AppError::NotAMember { .. }) => warn!(
                    coupon = %coupon.coupon_code,
                    sender = %coupon.sender_id,
                    "expired coupon's sender no longer has a balance; escrow burned"
                ),
                Err(error) => return Err(error),
            }
        }
        get_metrics().record_coupon_expired(coupon.is_funded);
        info!(coupon = %coupon.coupon_code, funded = coupon.is_funded, "coupon expired");
        Ok(())
    }

    // ---- history -------------------------------------------------------

    /// Redeemed outbound coupons sent by `member` from `origin` in the
    /// window.
    pub async fn transfers_in_window(
        &self,
        origin: &GroupId,
        member: &MemberId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemittanceCoupon>> {
        let coupons: Vec<RemittanceCoupon> = self
            .store
            .select_as(
                collections::REMITTANCE_COUPONS,
                &[
                    Filter::eq("origin_group_id", origin),
                    Filter::eq("sender_id", member),
                    Filter::eq("is_redeemed", true),
                ],
            )
            .await?;
        Ok(coupons
            .into_iter()
            .filter(|coupon| start < coupon.created_at && coupon.created_at < end)
            .collect())
    }

    /// Settled inbound redemptions claimed by `member` in `destination`.
    pub async fn redemptions_in_window(
        &self,
        destination: &GroupId,
        member: &MemberId,
    ) -> Result<Vec<RedeemTicket>> {
        self.store
            .select_as(
                collections::REDEEM_TICKETS,
                &[
                    Filter::eq("destination_group_id", destination),
                    Filter::eq("claimant_id", member),
                    Filter::eq("is_redeemed", true),
                ],
            )
            .await
    }
}
