pub mod balance;
pub mod exchange;
pub mod governance;
pub mod group;
pub mod ids;
pub mod market;
pub mod remittance;
pub mod transaction;

pub use balance::MemberBalance;
pub use exchange::{best_route, is_reciprocal, ExchangePosition, RouteCandidate};
pub use governance::{DelegationEdge, EndorsementRecord, FeeIncomeVote, JoinRequest, Strike};
pub use group::GroupConfig;
pub use ids::{ChannelRef, GroupId, MemberId, RoleRef};
pub use market::MarketListing;
pub use remittance::{generate_coupon_code, RedeemTicket, RemittanceCoupon};
pub use transaction::{IntentState, TransactionLogEntry, TransferIntent};
