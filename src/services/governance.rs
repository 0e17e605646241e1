use super::{notify_feed, notify_member};
use crate::config::PolicySettings;
use crate::error::{AppError, Result};
use crate::gateway::NotificationGateway;
use crate::models::{
    DelegationEdge, EndorsementRecord, FeeIncomeVote, GroupConfig, GroupId, JoinRequest, MemberId,
    Strike,
};
use crate::money;
use crate::observability::metrics::get_metrics;
use crate::services::group::GroupService;
use crate::services::ledger::LedgerService;
use crate::store::{collections, DataStore, DataStoreExt, Filter};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Result of casting an endorsement or rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndorseOutcome {
    /// Vote recorded; the request stays pending.
    Recorded {
        endorsement_weight: u32,
        rejection_weight: u32,
    },
    /// The vote pushed the request over the acceptance threshold.
    Accepted,
}

/// Median rates across the live votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tally {
    pub fee_percent: Decimal,
    pub daily_income: Decimal,
    pub votes: u64,
}

/// Result of submitting a fee/income vote.
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub tally: Tally,
    /// True when this vote reached the super-majority and the tally was
    /// installed into the group configuration.
    pub accepted: bool,
}

/// Result of casting a strike.
#[derive(Debug, Clone, Copy)]
pub struct StrikeOutcome {
    pub strikes: u32,
    pub expelled: bool,
}

/// Serializes the endorsing-power recompute per group so interleaved
/// delegate/undelegate calls cannot corrupt the power totals. Unrelated
/// groups never contend.
#[derive(Default)]
struct GroupLocks {
    inner: Mutex<HashMap<GroupId, Arc<tokio::sync::Mutex<()>>>>,
}

impl GroupLocks {
    fn for_group(&self, group: &GroupId) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("group lock registry");
        map.entry(group.clone()).or_default().clone()
    }
}

/// Join-request sponsorship and voting, delegated endorsing power,
/// strikes, and fee/income consensus voting.
pub struct GovernanceService {
    store: Arc<dyn DataStore>,
    gateway: Arc<dyn NotificationGateway>,
    ledger: Arc<LedgerService>,
    groups: Arc<GroupService>,
    policy: PolicySettings,
    locks: GroupLocks,
}

impl GovernanceService {
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
            locks: GroupLocks::default(),
        }
    }

    /// `threshold < x` is the acceptance test for votes, endorsements,
    /// and strikes alike.
    fn majority_threshold(&self, member_count: u64) -> Decimal {
        self.policy.super_majority * Decimal::from(member_count)
    }

    // ---- join requests -------------------------------------------------

    pub async fn find_request(
        &self,
        group: &GroupId,
        applicant: &MemberId,
    ) -> Result<Option<JoinRequest>> {
        self.store
            .select_one(
                collections::JOIN_REQUESTS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("member_id", applicant),
                ],
            )
            .await
    }

    pub async fn candidates(&self, group: &GroupId) -> Result<Vec<JoinRequest>> {
        self.store
            .select_as(collections::JOIN_REQUESTS, &[Filter::eq("group_id", group)])
            .await
    }

    /// The sponsor recorded on a member's balance row.
    pub async fn sponsor_of(&self, group: &GroupId, member: &MemberId) -> Result<Option<MemberId>> {
        Ok(self.ledger.balance(group, member).await?.sponsor_id)
    }

    /// Opens a join request on the applicant's behalf. Sponsorship doubles
    /// as a first endorsement when the sponsor holds any power, which in a
    /// one-member group accepts the applicant on the spot.
    pub async fn sponsor(
        &self,
        group: &GroupId,
        sponsor: &MemberId,
        applicant: &MemberId,
    ) -> Result<EndorseOutcome> {
        let config = self.groups.config(group).await?;
        let sponsor_balance = self.ledger.balance(group, sponsor).await?;
        if self.ledger.is_member(group, applicant).await? {
            return Err(AppError::InvalidInput(format!(
                "'{applicant}' is already a member of this group"
            )));
        }
        if self.find_request(group, applicant).await?.is_some() {
            return Err(AppError::InvalidInput(format!(
                "'{applicant}' already has an active join request"
            )));
        }

        let request = JoinRequest::new(group.clone(), applicant.clone(), Some(sponsor.clone()));
        self.store
            .insert_as(collections::JOIN_REQUESTS, &request)
            .await?;
        notify_member(
            self.gateway.as_ref(),
            applicant,
            &format!("You have been sponsored by '{sponsor}' to join the group."),
        )
        .await;
        notify_feed(
            self.gateway.as_ref(),
            &config,
            &format!("'{sponsor}' has sponsored '{applicant}' to join the group."),
        )
        .await;

        if sponsor_balance.endorsing_power > 0 {
            self.cast_recorded_vote(&config, sponsor, applicant, sponsor_balance.endorsing_power, false)
                .await
        } else {
            Ok(EndorseOutcome::Recorded {
                endorsement_weight: 0,
                rejection_weight: 0,
            })
        }
    }

    pub async fn endorse(
        &self,
        group: &GroupId,
        voter: &MemberId,
        applicant: &MemberId,
    ) -> Result<EndorseOutcome> {
        self.cast(group, voter, applicant, false).await
    }

    pub async fn reject(
        &self,
        group: &GroupId,
        voter: &MemberId,
        applicant: &MemberId,
    ) -> Result<EndorseOutcome> {
        self.cast(group, voter, applicant, true).await
    }

    async fn cast(
        &self,
        group: &GroupId,
        voter: &MemberId,
        applicant: &MemberId,
        is_rejection: bool,
    ) -> Result<EndorseOutcome> {
        let config = self.groups.config(group).await?;
        let voter_balance = self.ledger.balance(group, voter).await?;
        if self.find_request(group, applicant).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "join request for '{applicant}'"
            )));
        }
        let already = self
            .store
            .exists(
                collections::ENDORSEMENTS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("sender_id", voter),
                    Filter::eq("receiver_id", applicant),
                ],
            )
            .await?;
        if already {
            return Err(AppError::AlreadyVoted {
                voter: voter.to_string(),
                applicant: applicant.to_string(),
            });
        }
        if voter_balance.endorsing_power == 0 {
            return Err(AppError::InvalidInput(
                "you currently have no endorsing power; undelegate to regain it".to_string(),
            ));
        }
        self.cast_recorded_vote(
            &config,
            voter,
            applicant,
            voter_balance.endorsing_power,
            is_rejection,
        )
        .await
    }

    /// Records a weighted vote, bumps the request tally, and admits the
    /// applicant when endorsements pass the super-majority of members.
    async fn cast_recorded_vote(
        &self,
        config: &GroupConfig,
        voter: &MemberId,
        applicant: &MemberId,
        weight: u32,
        is_rejection: bool,
    ) -> Result<EndorseOutcome> {
        let group = &config.group_id;
        let record = EndorsementRecord {
            group_id: group.clone(),
            sender_id: voter.clone(),
            receiver_id: applicant.clone(),
            weight,
            is_rejection,
        };
        self.store
            .insert_as(collections::ENDORSEMENTS, &record)
            .await?;

        let request = self
            .find_request(group, applicant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("join request for '{applicant}'")))?;
        let (endorsement_weight, rejection_weight) = if is_rejection {
            (
                request.endorsement_weight,
                request.rejection_weight + weight,
            )
        } else {
            (
                request.endorsement_weight + weight,
                request.rejection_weight,
            )
        };
        self.store
            .update(
                collections::JOIN_REQUESTS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("member_id", applicant),
                ],
                json!({
                    "endorsement_weight": endorsement_weight,
                    "rejection_weight": rejection_weight,
                }),
            )
            .await?;

        let member_count = self.ledger.member_count(group).await?;
        if !is_rejection
            && Decimal::from(endorsement_weight) > self.majority_threshold(member_count)
        {
            let mut accepted = request;
            accepted.endorsement_weight = endorsement_weight;
            self.accept_request(config, &accepted).await?;
            return Ok(EndorseOutcome::Accepted);
        }
        Ok(EndorseOutcome::Recorded {
            endorsement_weight,
            rejection_weight,
        })
    }

    /// Admits the applicant: balance row seeded with the daily income,
    /// member role granted, request and its records cleared.
    async fn accept_request(&self, config: &GroupConfig, request: &JoinRequest) -> Result<()> {
        let group = &config.group_id;
        let applicant = &request.member_id;
        if let Err(error) = self
            .gateway
            .grant_role(group, applicant, &config.member_role)
            .await
        {
            warn!(%group, %applicant, %error, "member role grant failed");
        }
        self.ledger
            .create_member(
                group,
                applicant,
                request.sponsor_id.clone(),
                config.daily_income,
            )
            .await?;
        self.clear_request(group, applicant).await?;
        notify_member(
            self.gateway.as_ref(),
            applicant,
            "You have been accepted into the group!",
        )
        .await;
        notify_feed(
            self.gateway.as_ref(),
            config,
            &format!("'{applicant}' has been accepted into the group!"),
        )
        .await;
        get_metrics().record_member_admitted(group.as_str());
        info!(%group, %applicant, "join request accepted");
        Ok(())
    }

    async fn clear_request(&self, group: &GroupId, applicant: &MemberId) -> Result<()> {
        self.store
            .delete(
                collections::ENDORSEMENTS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("receiver_id", applicant),
                ],
            )
            .await?;
        self.store
            .delete(
                collections::JOIN_REQUESTS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("member_id", applicant),
                ],
            )
            .await?;
        Ok(())
    }

    /// Force-resolves requests older than the resolve window from whatever
    /// tally exists: accepted on a super-majority ratio of cast weight
    /// (a 0/0 tie rejects; a one-member group accepts on any endorsement),
    /// rejected otherwise. Returns how many requests were resolved.
    pub async fn resolve_overdue(&self, group: &GroupId) -> Result<u64> {
        let config = self.groups.config(group).await?;
        let now = Utc::now();
        let mut resolved = 0;
        for request in self.candidates(group).await? {
            if !request.is_older_than(now, self.policy.request_resolve_window()) {
                continue;
            }
            let member_count = self.ledger.member_count(group).await?;
            let lone_member_accept = member_count == 1 && request.endorsement_weight > 0;
            if request.approval_ratio() > self.policy.super_majority || lone_member_accept {
                self.accept_request(&config, &request).await?;
            } else {
                self.clear_request(group, &request.member_id).await?;
                notify_member(
                    self.gateway.as_ref(),
                    &request.member_id,
                    "You have not been accepted into the group.",
                )
                .await;
                info!(%group, applicant = %request.member_id, "join request rejected");
            }
            resolved += 1;
        }
        Ok(resolved)
    }

    /// Purges requests past the hard-expiry window, and requests whose
    /// applicant is no longer reachable on the platform.
    pub async fn purge_stale_requests(&self, group: &GroupId) -> Result<u64> {
        let now = Utc::now();
        let mut purged = 0;
        for request in self.candidates(group).await? {
            let departed = !self
                .gateway
                .resolve_membership(group, &request.member_id)
                .await
                .unwrap_or(true);
            if departed || request.is_older_than(now, self.policy.request_expiry_window()) {
                self.clear_request(group, &request.member_id).await?;
                info!(%group, applicant = %request.member_id, "join request expired");
                purged += 1;
            }
        }
        Ok(purged)
    }

    // ---- delegation ----------------------------------------------------

    pub async fn delegatee_of(
        &self,
        group: &GroupId,
        member: &MemberId,
    ) -> Result<Option<MemberId>> {
        let edge: Option<DelegationEdge> = self
            .store
            .select_one(
                collections::DELEGATIONS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("delegator_id", member),
                ],
            )
            .await?;
        Ok(edge.map(|edge| edge.delegatee_id))
    }

    /// Hands the delegator's endorsing power to `delegatee` and recomputes
    /// the group's power distribution.
    pub async fn delegate(
        &self,
        group: &GroupId,
        delegator: &MemberId,
        delegatee: &MemberId,
    ) -> Result<()> {
        self.ledger.balance(group, delegator).await?;
        if !self.ledger.is_member(group, delegatee).await? {
            return Err(AppError::NotAMember {
                member: delegatee.to_string(),
                group: group.to_string(),
            });
        }
        if delegator == delegatee {
            return Err(AppError::InvalidInput(
                "cannot delegate to yourself".to_string(),
            ));
        }
        if self.delegatee_of(group, delegator).await?.is_some() {
            return Err(AppError::AlreadyDelegated {
                delegator: delegator.to_string(),
            });
        }

        // Walk the delegatee's chain; reaching the delegator again means
        // the new edge would close a loop.
        let member_count = self.ledger.member_count(group).await? as usize;
        let mut current = delegatee.clone();
        let mut hops = 0;
        while let Some(next) = self.delegatee_of(group, &current).await? {
            if &next == delegator {
                return Err(AppError::CycleDetected {
                    delegatee: delegatee.to_string(),
                });
            }
            current = next;
            hops += 1;
            if hops > member_count {
                return Err(AppError::CycleDetected {
                    delegatee: delegatee.to_string(),
                });
            }
        }

        self.store
            .insert_as(
                collections::DELEGATIONS,
                &DelegationEdge::new(group.clone(), delegator.clone(), delegatee.clone()),
            )
            .await?;
        self.recompute_endorsing_power(group).await
    }

    /// Removes the delegator's outgoing edge and recomputes.
    pub async fn undelegate(&self, group: &GroupId, delegator: &MemberId) -> Result<()> {
        let removed = self
            .store
            .delete(
                collections::DELEGATIONS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("delegator_id", delegator),
                ],
            )
            .await?;
        if removed == 0 {
            return Err(AppError::InvalidInput(
                "you have not delegated your endorsing power".to_string(),
            ));
        }
        self.recompute_endorsing_power(group).await
    }

    /// Rebuilds every member's endorsing power from the delegation forest:
    /// reset to 1, then move each delegating member's unit to the terminal
    /// of its chain. Terminal lookup is memoized with path compression so
    /// long chains cost one walk. Serialized per group.
    pub async fn recompute_endorsing_power(&self, group: &GroupId) -> Result<()> {
        let lock = self.locks.for_group(group);
        let _guard = lock.lock().await;

        let members = self.ledger.members(group).await?;
        let edges: Vec<DelegationEdge> = self
            .store
            .select_as(collections::DELEGATIONS, &[Filter::eq("group_id", group)])
            .await?;
        let edge_map: HashMap<MemberId, MemberId> = edges
            .into_iter()
            .map(|edge| (edge.delegator_id, edge.delegatee_id))
            .collect();

        let mut power: HashMap<MemberId, u32> = members
            .iter()
            .map(|balance| (balance.member_id.clone(), 1))
            .collect();
        let mut terminals: HashMap<MemberId, MemberId> = HashMap::new();
        let max_hops = members.len();

        for balance in &members {
            let member = &balance.member_id;
            if !edge_map.contains_key(member) {
                continue;
            }
            let terminal = resolve_terminal(member, &edge_map, &mut terminals, max_hops)?;
            match power.get_mut(&terminal) {
                Some(terminal_power) => *terminal_power += 1,
                // The chain ends at someone who is no longer a member;
                // the delegator keeps their own unit.
                None => {
                    warn!(%group, %member, %terminal, "delegation chain ends outside the group");
                    continue;
                }
            }
            power.insert(member.clone(), 0);
        }

        for balance in &members {
            let computed = power[&balance.member_id];
            if computed != balance.endorsing_power {
                self.ledger
                    .set_endorsing_power(group, &balance.member_id, computed)
                    .await?;
            }
        }
        Ok(())
    }

    // ---- fee/income voting ---------------------------------------------

    pub async fn my_vote(
        &self,
        group: &GroupId,
        member: &MemberId,
    ) -> Result<Option<FeeIncomeVote>> {
        self.store
            .select_one(
                collections::FEE_INCOME_VOTES,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("member_id", member),
                ],
            )
            .await
    }

    pub async fn tally(&self, group: &GroupId) -> Result<Option<Tally>> {
        let votes: Vec<FeeIncomeVote> = self
            .store
            .select_as(
                collections::FEE_INCOME_VOTES,
                &[Filter::eq("group_id", group)],
            )
            .await?;
        if votes.is_empty() {
            return Ok(None);
        }
        let fees: Vec<Decimal> = votes.iter().map(|vote| vote.fee_percent).collect();
        let incomes: Vec<Decimal> = votes.iter().map(|vote| vote.daily_income).collect();
        Ok(Some(Tally {
            fee_percent: money::round2(money::median(&fees).unwrap_or_default()),
            daily_income: money::round2(money::median(&incomes).unwrap_or_default()),
            votes: votes.len() as u64,
        }))
    }

    /// Submits (or replaces) a member's vote. When the vote count passes
    /// the super-majority of members the median rates are installed and
    /// every vote is cleared.
    pub async fn vote(
        &self,
        group: &GroupId,
        member: &MemberId,
        fee_percent: Decimal,
        daily_income: Decimal,
    ) -> Result<VoteOutcome> {
        let config = self.groups.config(group).await?;
        if !config.voting_open {
            return Err(AppError::InvalidInput(
                "voting is currently closed".to_string(),
            ));
        }
        self.ledger.balance(group, member).await?;
        if fee_percent > Decimal::ONE_HUNDRED {
            return Err(AppError::InvalidInput(
                "fee cannot be greater than 100%".to_string(),
            ));
        }
        if fee_percent < Decimal::ZERO || daily_income < Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "rates cannot be negative".to_string(),
            ));
        }

        if self.my_vote(group, member).await?.is_some() {
            self.store
                .update(
                    collections::FEE_INCOME_VOTES,
                    &[
                        Filter::eq("group_id", group),
                        Filter::eq("member_id", member),
                    ],
                    json!({
                        "fee_percent": money::round2(fee_percent),
                        "daily_income": money::round2(daily_income),
                    }),
                )
                .await?;
        } else {
            self.store
                .insert_as(
                    collections::FEE_INCOME_VOTES,
                    &FeeIncomeVote {
                        group_id: group.clone(),
                        member_id: member.clone(),
                        fee_percent: money::round2(fee_percent),
                        daily_income: money::round2(daily_income),
                    },
                )
                .await?;
        }

        let tally = self
            .tally(group)
            .await?
            .expect("at least the vote just cast");
        let member_count = self.ledger.member_count(group).await?;
        if Decimal::from(tally.votes) > self.majority_threshold(member_count) {
            self.install_tally(group, &config, &tally).await?;
            return Ok(VoteOutcome {
                tally,
                accepted: true,
            });
        }
        Ok(VoteOutcome {
            tally,
            accepted: false,
        })
    }

    /// Admin override: installs the current tally without waiting for a
    /// super-majority.
    pub async fn accept_votes(&self, group: &GroupId) -> Result<Tally> {
        let config = self.groups.config(group).await?;
        let tally = self
            .tally(group)
            .await?
            .ok_or_else(|| AppError::InvalidInput("no votes have been recorded".to_string()))?;
        self.install_tally(group, &config, &tally).await?;
        Ok(tally)
    }

    async fn install_tally(
        &self,
        group: &GroupId,
        config: &GroupConfig,
        tally: &Tally,
    ) -> Result<()> {
        self.groups
            .set_rates(group, tally.fee_percent, tally.daily_income)
            .await?;
        self.store
            .delete(
                collections::FEE_INCOME_VOTES,
                &[Filter::eq("group_id", group)],
            )
            .await?;
        notify_feed(
            self.gateway.as_ref(),
            config,
            &format!(
                "New rates accepted: {}% transaction fee, {} daily income.",
                tally.fee_percent, tally.daily_income
            ),
        )
        .await;
        info!(%group, fee = %tally.fee_percent, income = %tally.daily_income, "vote tally installed");
        Ok(())
    }

    // ---- strikes and removal -------------------------------------------

    /// Casts a strike. Passing the super-majority expels the receiver.
    pub async fn strike(
        &self,
        group: &GroupId,
        sender: &MemberId,
        receiver: &MemberId,
    ) -> Result<StrikeOutcome> {
        if sender == receiver {
            return Err(AppError::InvalidInput(
                "you cannot strike yourself".to_string(),
            ));
        }
        let config = self.groups.config(group).await?;
        self.ledger.balance(group, sender).await?;
        let receiver_balance = self.ledger.balance(group, receiver).await?;
        let already = self
            .store
            .exists(
                collections::STRIKES,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("sender_id", sender),
                    Filter::eq("receiver_id", receiver),
                ],
            )
            .await?;
        if already {
            return Err(AppError::AlreadyStruck {
                sender: sender.to_string(),
                receiver: receiver.to_string(),
            });
        }

        let strikes = receiver_balance.strike_count + 1;
        self.ledger.set_strike_count(group, receiver, strikes).await?;
        self.store
            .insert_as(
                collections::STRIKES,
                &Strike::new(group.clone(), sender.clone(), receiver.clone()),
            )
            .await?;

        let member_count = self.ledger.member_count(group).await?;
        if Decimal::from(strikes) > self.majority_threshold(member_count) {
            self.remove_member(&config, receiver, "expelled").await?;
            notify_member(
                self.gateway.as_ref(),
                receiver,
                "You have been voted out of the group.",
            )
            .await;
            return Ok(StrikeOutcome {
                strikes,
                expelled: true,
            });
        }
        Ok(StrikeOutcome {
            strikes,
            expelled: false,
        })
    }

    /// Voluntary exit. The balance is burned; a group cannot lose its last
    /// member this way.
    pub async fn withdraw_membership(&self, group: &GroupId, member: &MemberId) -> Result<()> {
        let config = self.groups.config(group).await?;
        self.ledger.balance(group, member).await?;
        if self.ledger.member_count(group).await? == 1 {
            return Err(AppError::InvalidInput(
                "the only remaining member cannot withdraw".to_string(),
            ));
        }
        self.remove_member(&config, member, "withdrawn").await
    }

    /// Shared removal path for expulsion and withdrawal: balance deleted,
    /// governance rows cleaned up, power recomputed, role revoked.
    async fn remove_member(
        &self,
        config: &GroupConfig,
        member: &MemberId,
        reason: &str,
    ) -> Result<()> {
        let group = &config.group_id;
        self.ledger.remove_member(group, member).await?;
        self.store
            .delete(
                collections::STRIKES,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("receiver_id", member),
                ],
            )
            .await?;
        self.store
            .delete(
                collections::FEE_INCOME_VOTES,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("member_id", member),
                ],
            )
            .await?;
        // Drop both directions of delegation before recomputing so no
        // chain terminates at a ghost.
        self.store
            .delete(
                collections::DELEGATIONS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("delegator_id", member),
                ],
            )
            .await?;
        self.store
            .delete(
                collections::DELEGATIONS,
                &[
                    Filter::eq("group_id", group),
                    Filter::eq("delegatee_id", member),
                ],
            )
            .await?;
        self.recompute_endorsing_power(group).await?;
        if let Err(error) = self
            .gateway
            .revoke_role(group, member, &config.member_role)
            .await
        {
            warn!(%group, %member, %error, "member role revoke failed");
        }
        get_metrics().record_member_removed(group.as_str(), reason);
        info!(%group, %member, reason, "member removed");
        Ok(())
    }
}

/// Follows `member`'s chain to its terminal delegatee, memoizing every
/// node on the way (path compression). A walk longer than `max_hops` can
/// only mean a corrupted edge set and aborts the recompute.
fn resolve_terminal(
    member: &MemberId,
    edges: &HashMap<MemberId, MemberId>,
    cache: &mut HashMap<MemberId, MemberId>,
    max_hops: usize,
) -> Result<MemberId> {
    let mut path = Vec::new();
    let mut current = member.clone();
    let mut hops = 0;
    let terminal = loop {
        if let Some(cached) = cache.get(&current) {
            break cached.clone();
        }
        match edges.get(&current) {
            None => break current,
            Some(next) => {
                path.push(current.clone());
                current = next.clone();
                hops += 1;
                if hops > max_hops {
                    return Err(AppError::CycleDetected {
                        delegatee: member.to_string(),
                    });
                }
            }
        }
    };
    for node in path {
        cache.insert(node, terminal.clone());
    }
    Ok(terminal)
}
