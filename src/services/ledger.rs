use crate::error::{AppError, Result};
use crate::models::{
    GroupId, IntentState, MemberBalance, MemberId, TransactionLogEntry, TransferIntent,
};
use crate::money;
use crate::observability::metrics::get_metrics;
use crate::store::{collections, DataStore, DataStoreExt, Filter};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a settled internal transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub amount: Decimal,
    pub fee: Decimal,
    pub total: Decimal,
    pub sender_balance: Decimal,
    pub receiver_balance: Decimal,
}

/// Outcome of a pay-everyone transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAllReceipt {
    pub recipients: u64,
    pub amount_each: Decimal,
    pub total: Decimal,
    pub fee: Decimal,
    pub sender_balance: Decimal,
}

/// Transaction volume over a window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Volume {
    pub amount: Decimal,
    pub count: u64,
}

/// What the intent replay found and did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryReport {
    /// Debits that had landed; credit and log were replayed.
    pub completed: u64,
    /// Intents where nothing had been applied; dropped.
    pub discarded: u64,
    /// Intents whose balance snapshot no longer matched either side.
    pub ambiguous: u64,
}

/// Per-group balances and the append-only transaction log.
///
/// The two balance writes of a transfer are independent store calls (the
/// store has no transactions); a durable [`TransferIntent`] brackets them
/// so a crash mid-transfer is recoverable via [`Self::recover_incomplete`].
pub struct LedgerService {
    store: Arc<dyn DataStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    fn member_filters(group: &GroupId, member: &MemberId) -> [Filter; 2] {
        [
            Filter::eq("group_id", group),
            Filter::eq("member_id", member),
        ]
    }

    pub async fn find_balance(
        &self,
        group: &GroupId,
        member: &MemberId,
    ) -> Result<Option<MemberBalance>> {
        self.store
            .select_one(collections::BALANCES, &Self::member_filters(group, member))
            .await
    }

    /// The member's balance row, or `NotAMember`.
    pub async fn balance(&self, group: &GroupId, member: &MemberId) -> Result<MemberBalance> {
        self.find_balance(group, member)
            .await?
            .ok_or_else(|| AppError::NotAMember {
                member: member.to_string(),
                group: group.to_string(),
            })
    }

    pub async fn is_member(&self, group: &GroupId, member: &MemberId) -> Result<bool> {
        Ok(self.find_balance(group, member).await?.is_some())
    }

    pub async fn members(&self, group: &GroupId) -> Result<Vec<MemberBalance>> {
        self.store
            .select_as(collections::BALANCES, &[Filter::eq("group_id", group)])
            .await
    }

    pub async fn member_count(&self, group: &GroupId) -> Result<u64> {
        self.store
            .count(collections::BALANCES, &[Filter::eq("group_id", group)])
            .await
    }

    /// Every group the member holds a balance in.
    pub async fn memberships(&self, member: &MemberId) -> Result<Vec<MemberBalance>> {
        self.store
            .select_as(collections::BALANCES, &[Filter::eq("member_id", member)])
            .await
    }

    /// Materializes a new member's balance row.
    pub async fn create_member(
        &self,
        group: &GroupId,
        member: &MemberId,
        sponsor: Option<MemberId>,
        starting_amount: Decimal,
    ) -> Result<MemberBalance> {
        if self.is_member(group, member).await? {
            return Err(AppError::InvalidInput(format!(
                "'{member}' already has a balance in group '{group}'"
            )));
        }
        let balance = MemberBalance::new(
            group.clone(),
            member.clone(),
            sponsor,
            money::round2(starting_amount),
        );
        self.store
            .insert_as(collections::BALANCES, &balance)
            .await?;
        Ok(balance)
    }

    /// Deletes the member's balance row (withdrawal or expulsion).
    pub async fn remove_member(&self, group: &GroupId, member: &MemberId) -> Result<()> {
        let removed = self
            .store
            .delete(collections::BALANCES, &Self::member_filters(group, member))
            .await?;
        if removed == 0 {
            return Err(AppError::NotAMember {
                member: member.to_string(),
                group: group.to_string(),
            });
        }
        Ok(())
    }

    /// Overwrites a balance amount. Ledger-owned writes never store a
    /// negative amount; callers pre-check debits.
    pub async fn set_amount(
        &self,
        group: &GroupId,
        member: &MemberId,
        amount: Decimal,
    ) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "refusing to set negative balance {amount} for '{member}'"
            )));
        }
        let touched = self
            .store
            .update(
                collections::BALANCES,
                &Self::member_filters(group, member),
                json!({ "amount": money::round2(amount) }),
            )
            .await?;
        if touched == 0 {
            return Err(AppError::NotAMember {
                member: member.to_string(),
                group: group.to_string(),
            });
        }
        Ok(())
    }

    pub async fn credit(&self, group: &GroupId, member: &MemberId, amount: Decimal) -> Result<Decimal> {
        let amount = money::round2(amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "credit amount must be positive".to_string(),
            ));
        }
        let balance = self.balance(group, member).await?;
        let updated = balance.amount + amount;
        self.set_amount(group, member, updated).await?;
        Ok(updated)
    }

    pub async fn debit(&self, group: &GroupId, member: &MemberId, amount: Decimal) -> Result<Decimal> {
        let amount = money::round2(amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "debit amount must be positive".to_string(),
            ));
        }
        let balance = self.balance(group, member).await?;
        if !balance.has_sufficient_funds(amount) {
            return Err(AppError::InsufficientFunds {
                requested: amount,
                available: balance.amount,
            });
        }
        let updated = balance.amount - amount;
        self.set_amount(group, member, updated).await?;
        Ok(updated)
    }

    /// Governance-owned field, stored on the balance row.
    pub async fn set_endorsing_power(
        &self,
        group: &GroupId,
        member: &MemberId,
        power: u32,
    ) -> Result<()> {
        let touched = self
            .store
            .update(
                collections::BALANCES,
                &Self::member_filters(group, member),
                json!({ "endorsing_power": power }),
            )
            .await?;
        if touched == 0 {
            return Err(AppError::NotAMember {
                member: member.to_string(),
                group: group.to_string(),
            });
        }
        Ok(())
    }

    /// Governance-owned field, stored on the balance row.
    pub async fn set_strike_count(
        &self,
        group: &GroupId,
        member: &MemberId,
        strikes: u32,
    ) -> Result<()> {
        let touched = self
            .store
            .update(
                collections::BALANCES,
                &Self::member_filters(group, member),
                json!({ "strike_count": strikes }),
            )
            .await?;
        if touched == 0 {
            return Err(AppError::NotAMember {
                member: member.to_string(),
                group: group.to_string(),
            });
        }
        Ok(())
    }

    /// Moves `amount` from `sender` to `receiver`, taking the group fee on
    /// top. Fails with `InsufficientFunds` (and no side effects) when the
    /// sender cannot cover `amount + fee`.
    pub async fn transfer(
        &self,
        group: &GroupId,
        sender: &MemberId,
        receiver: &MemberId,
        amount: Decimal,
        fee_percent: Decimal,
        message: Option<String>,
    ) -> Result<TransferReceipt> {
        if sender == receiver {
            return Err(AppError::InvalidInput(
                "cannot send to yourself".to_string(),
            ));
        }
        let amount = money::round2(amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "amount must be greater than 0".to_string(),
            ));
        }
        let fee = money::fee_for(amount, fee_percent);
        let total = amount + fee;

        let sender_balance = self.balance(group, sender).await?;
        let receiver_balance = self.balance(group, receiver).await?;
        if !sender_balance.has_sufficient_funds(total) {
            get_metrics().record_transfer_rejected(group.as_str());
            return Err(AppError::InsufficientFunds {
                requested: total,
                available: sender_balance.amount,
            });
        }

        let intent = TransferIntent::new(
            group.clone(),
            sender.clone(),
            receiver.clone(),
            amount,
            fee,
            message.clone(),
            sender_balance.amount,
        );
        self.store
            .insert_as(collections::TRANSFER_INTENTS, &intent)
            .await?;

        self.set_amount(group, sender, sender_balance.amount - total)
            .await?;
        self.store
            .update(
                collections::TRANSFER_INTENTS,
                &[Filter::eq("id", intent.id)],
                json!({ "state": IntentState::Debited }),
            )
            .await?;

        self.set_amount(group, receiver, receiver_balance.amount + amount)
            .await?;
        self.append_log(TransactionLogEntry::new(
            group.clone(),
            sender.clone(),
            receiver.clone(),
            amount,
            fee,
            message,
        ))
        .await?;
        self.store
            .delete(
                collections::TRANSFER_INTENTS,
                &[Filter::eq("id", intent.id)],
            )
            .await?;

        get_metrics().record_transfer(group.as_str());
        info!(%group, %sender, %receiver, %amount, %fee, "transfer settled");

        Ok(TransferReceipt {
            amount,
            fee,
            total,
            sender_balance: sender_balance.amount - total,
            receiver_balance: receiver_balance.amount + amount,
        })
    }

    /// Pays every other member `amount_each`, charging the sender the sum
    /// plus the fee on the sum. One log entry per recipient.
    pub async fn send_to_all(
        &self,
        group: &GroupId,
        sender: &MemberId,
        amount_each: Decimal,
        fee_percent: Decimal,
    ) -> Result<SendAllReceipt> {
        let amount_each = money::round2(amount_each);
        if amount_each <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "amount must be greater than 0".to_string(),
            ));
        }
        let members = self.members(group).await?;
        let recipients: Vec<&MemberBalance> = members
            .iter()
            .filter(|balance| &balance.member_id != sender)
            .collect();
        if recipients.is_empty() {
            return Err(AppError::InvalidInput(
                "no other members to pay".to_string(),
            ));
        }

        let total = amount_each * Decimal::from(recipients.len());
        let fee = money::fee_for(total, fee_percent);
        let fee_each = money::fee_for(amount_each, fee_percent);
        let sender_balance = self.balance(group, sender).await?;
        if !sender_balance.has_sufficient_funds(total + fee) {
            return Err(AppError::InsufficientFunds {
                requested: total + fee,
                available: sender_balance.amount,
            });
        }

        self.set_amount(group, sender, sender_balance.amount - total - fee)
            .await?;
        for recipient in &recipients {
            self.set_amount(group, &recipient.member_id, recipient.amount + amount_each)
                .await?;
            self.append_log(TransactionLogEntry::new(
                group.clone(),
                sender.clone(),
                recipient.member_id.clone(),
                amount_each,
                fee_each,
                None,
            ))
            .await?;
        }

        get_metrics().record_transfer(group.as_str());
        Ok(SendAllReceipt {
            recipients: recipients.len() as u64,
            amount_each,
            total,
            fee,
            sender_balance: sender_balance.amount - total - fee,
        })
    }

    /// Appends to the audit trail. Entries are never mutated afterwards.
    pub async fn append_log(&self, entry: TransactionLogEntry) -> Result<()> {
        self.store
            .insert_as(collections::TRANSACTIONS, &entry)
            .await
    }

    /// Sum of all member balances.
    pub async fn money_supply(&self, group: &GroupId) -> Result<Decimal> {
        let members = self.members(group).await?;
        Ok(members.iter().map(|balance| balance.amount).sum())
    }

    /// Mean absolute pairwise difference of balances, normalized:
    /// `Σ|bi−bj| / (2·n²·mean)`. Zero for an empty or perfectly level
    /// group; invariant under uniform positive scaling.
    pub async fn gini_index(&self, group: &GroupId) -> Result<Decimal> {
        let balances: Vec<Decimal> = self
            .members(group)
            .await?
            .iter()
            .map(|balance| balance.amount)
            .collect();
        let n = balances.len();
        if n == 0 {
            return Ok(Decimal::ZERO);
        }
        let supply: Decimal = balances.iter().copied().sum();
        if supply.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let mean = supply / Decimal::from(n);
        let mut diff_sum = Decimal::ZERO;
        for a in &balances {
            for b in &balances {
                diff_sum += (*a - *b).abs();
            }
        }
        Ok(diff_sum / (Decimal::TWO * Decimal::from(n * n) * mean))
    }

    /// Sum and count of logged transactions inside `(start, end)`.
    pub async fn volume(
        &self,
        group: &GroupId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Volume> {
        let entries: Vec<TransactionLogEntry> = self
            .store
            .select_as(collections::TRANSACTIONS, &[Filter::eq("group_id", group)])
            .await?;
        let mut amount = Decimal::ZERO;
        let mut count = 0;
        for entry in entries {
            if start < entry.occurred_at && entry.occurred_at < end {
                amount += entry.amount;
                count += 1;
            }
        }
        Ok(Volume { amount, count })
    }

    pub async fn sent_in_window(
        &self,
        group: &GroupId,
        member: &MemberId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TransactionLogEntry>> {
        let entries: Vec<TransactionLogEntry> = self
            .store
            .select_as(
                collections::TRANSACTIONS,
                &[Filter::eq("group_id", group), Filter::eq("sender_id", member)],
            )
            .await?;
        Ok(entries
            .into_iter()
            .filter(|entry| start < entry.occurred_at && entry.occurred_at < end)
            .collect())
    }

    pub async fn received_in_window(
        &self,
        group: &GroupId,
        member: &MemberId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TransactionLogEntry>> {
        let entries: Vec<TransactionLogEntry> = self
            .store
            .select_as(
                collections::TRANSACTIONS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("receiver_id", member),
                ],
            )
            .await?;
        Ok(entries
            .into_iter()
            .filter(|entry| start < entry.occurred_at && entry.occurred_at < end)
            .collect())
    }

    /// Replays transfers that crashed between their balance writes.
    ///
    /// `Debited` intents are unambiguous: the debit landed, so the credit
    /// and log entry are applied and the intent dropped. `Pending` intents
    /// are resolved against the sender's balance snapshot; when the live
    /// balance matches neither snapshot (another operation moved it first)
    /// the intent is dropped with a warning for operator reconciliation.
    pub async fn recover_incomplete(&self) -> Result<RecoveryReport> {
        let intents: Vec<TransferIntent> = self
            .store
            .select_as(collections::TRANSFER_INTENTS, &[])
            .await?;
        let mut report = RecoveryReport::default();
        for intent in intents {
            if let Err(err) = self.recover_one(&intent, &mut report).await {
                warn!(intent = %intent.id, %err, "transfer intent recovery failed; skipping");
            }
        }
        Ok(report)
    }

    async fn recover_one(
        &self,
        intent: &TransferIntent,
        report: &mut RecoveryReport,
    ) -> Result<()> {
        match intent.state {
            IntentState::Debited => {
                self.complete_intent(intent).await?;
                report.completed += 1;
            }
            IntentState::Pending => {
                let live = self
                    .find_balance(&intent.group_id, &intent.sender_id)
                    .await?
                    .map(|balance| balance.amount);
                if live == Some(intent.sender_balance_after) {
                    self.complete_intent(intent).await?;
                    report.completed += 1;
                } else if live == Some(intent.sender_balance_before) {
                    self.drop_intent(intent).await?;
                    report.discarded += 1;
                } else {
                    warn!(
                        intent = %intent.id,
                        sender = %intent.sender_id,
                        "transfer intent snapshot no longer matches; dropping"
                    );
                    self.drop_intent(intent).await?;
                    report.ambiguous += 1;
                }
            }
        }
        Ok(())
    }

    async fn complete_intent(&self, intent: &TransferIntent) -> Result<()> {
        let receiver = self
            .balance(&intent.group_id, &intent.receiver_id)
            .await?;
        self.set_amount(
            &intent.group_id,
            &intent.receiver_id,
            receiver.amount + intent.amount,
        )
        .await?;
        self.append_log(TransactionLogEntry::new(
            intent.group_id.clone(),
            intent.sender_id.clone(),
            intent.receiver_id.clone(),
            intent.amount,
            intent.fee,
            intent.message.clone(),
        ))
        .await?;
        self.drop_intent(intent).await
    }

    async fn drop_intent(&self, intent: &TransferIntent) -> Result<()> {
        self.store
            .delete(
                collections::TRANSFER_INTENTS,
                &[Filter::eq("id", intent.id)],
            )
            .await?;
        Ok(())
    }
}
