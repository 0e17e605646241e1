use super::ids::{GroupId, MemberId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One settled internal transfer. Append-only audit trail; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub id: Uuid,
    pub group_id: GroupId,
    pub sender_id: MemberId,
    pub receiver_id: MemberId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl TransactionLogEntry {
    pub fn new(
        group_id: GroupId,
        sender_id: MemberId,
        receiver_id: MemberId,
        amount: Decimal,
        fee: Decimal,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            sender_id,
            receiver_id,
            amount,
            fee,
            message,
            occurred_at: Utc::now(),
        }
    }
}

/// Progress of a two-sided transfer through its non-atomic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentState {
    /// Intent recorded; the debit may or may not have landed.
    Pending,
    /// Debit durably applied; the credit and log entry still owed.
    Debited,
}

/// Durable intent record for a two-sided transfer. The store has no
/// transactions, so the debit and credit are independent writes; this row
/// is written first and advanced after the debit lands, making a crashed
/// transfer recoverable by replay. Deleted once the transfer settles.
///
/// The balance snapshots disambiguate a `Pending` intent on recovery: if
/// the sender's live balance still matches `sender_balance_before` the
/// debit never landed, if it matches `sender_balance_after` it did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferIntent {
    pub id: Uuid,
    pub group_id: GroupId,
    pub sender_id: MemberId,
    pub receiver_id: MemberId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub message: Option<String>,
    pub state: IntentState,
    pub sender_balance_before: Decimal,
    pub sender_balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TransferIntent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: GroupId,
        sender_id: MemberId,
        receiver_id: MemberId,
        amount: Decimal,
        fee: Decimal,
        message: Option<String>,
        sender_balance_before: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            sender_id,
            receiver_id,
            amount,
            fee,
            message,
            state: IntentState::Pending,
            sender_balance_before,
            sender_balance_after: sender_balance_before - amount - fee,
            created_at: Utc::now(),
        }
    }
}
