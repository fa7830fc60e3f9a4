use std::sync::Arc;

use chrono::Utc;
use common::{Bet, BetId, BetStatus, BetUpdate, BetView, NewBet, Outcome, Record, RecordDelta, User, UserId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::store::{BetStore, UserDirectory};

/// A record adjustment that could not be written when its bet was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAdjustment {
    pub bet_id: BetId,
    pub user_id: UserId,
    pub delta: RecordDelta,
}

/// Adjustments waiting to be re-applied, shared by every ledger of a server.
#[derive(Clone, Default)]
pub struct RecordBacklog {
    pending: Arc<Mutex<Vec<PendingAdjustment>>>,
}

impl RecordBacklog {
    pub async fn push(&self, adjustment: PendingAdjustment) {
        self.pending.lock().await.push(adjustment);
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Re-applies every pending adjustment once. Returns how many are still outstanding.
    pub async fn retry<D: UserDirectory + ?Sized>(&self, directory: &D) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock().await);
        if pending.is_empty() {
            return 0;
        }

        let mut failed = Vec::new();
        for adjustment in pending {
            match directory
                .upsert_record(&adjustment.user_id, &adjustment.bet_id, &adjustment.delta)
                .await
            {
                Ok(record) => info!(
                    bet_id = %adjustment.bet_id,
                    user_id = %adjustment.user_id,
                    record = %record.formatted(),
                    "applied backlogged record adjustment"
                ),
                Err(error) => {
                    debug!(bet_id = %adjustment.bet_id, user_id = %adjustment.user_id, "record adjustment still failing: {:#}", error);
                    failed.push(adjustment);
                }
            }
        }

        let mut pending = self.pending.lock().await;
        pending.extend(failed);
        pending.len()
    }
}

fn adjustments(bet: &Bet, outcome: Outcome) -> [(UserId, RecordDelta); 2] {
    let stake = bet.pride_wagered;
    match outcome {
        Outcome::Draw => [
            (bet.creator_id.clone(), RecordDelta::draw()),
            (bet.participant_id.clone(), RecordDelta::draw()),
        ],
        Outcome::CreatorWon => [
            (bet.creator_id.clone(), RecordDelta::win(stake)),
            (bet.participant_id.clone(), RecordDelta::loss(stake)),
        ],
        Outcome::ParticipantWon => [
            (bet.participant_id.clone(), RecordDelta::win(stake)),
            (bet.creator_id.clone(), RecordDelta::loss(stake)),
        ],
    }
}

/// Enforces the bet lifecycle and turns settlements into record changes.
///
/// Every transition re-reads the bet and writes through a conditional update, so a bet
/// changed by another writer in the meantime fails with `InvalidTransition`.
pub struct BetLedger<S, D> {
    store: S,
    directory: D,
    backlog: RecordBacklog,
}

impl<S: BetStore, D: UserDirectory> BetLedger<S, D> {
    pub fn new(store: S, directory: D) -> Self {
        Self::with_backlog(store, directory, RecordBacklog::default())
    }

    pub fn with_backlog(store: S, directory: D, backlog: RecordBacklog) -> Self {
        Self {
            store,
            directory,
            backlog,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn backlog(&self) -> &RecordBacklog {
        &self.backlog
    }

    fn caller(&self) -> Result<UserId> {
        self.directory
            .current_user_id()
            .ok_or(LedgerError::NotAuthenticated)
    }

    async fn fetch(&self, bet_id: &str) -> Result<Bet> {
        self.store
            .get_by_id(bet_id)
            .await
            .map_err(LedgerError::store)?
            .ok_or_else(|| LedgerError::not_found("bet", bet_id))
    }

    pub async fn register_user(&self, user_id: &str, display_name: &str) -> Result<User> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::invalid_input("user id must not be empty"));
        }
        if display_name.trim().is_empty() {
            return Err(LedgerError::invalid_input("display name must not be empty"));
        }
        let user = self
            .directory
            .register_user(user_id, display_name)
            .await
            .map_err(LedgerError::store)?;
        info!(user_id, "user registered");
        Ok(user)
    }

    pub async fn current_user(&self) -> Result<User> {
        let caller = self.caller()?;
        self.directory
            .get_user(&caller)
            .await
            .map_err(LedgerError::store)?
            .ok_or_else(|| LedgerError::not_found("user", caller))
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let caller = self.caller()?;
        self.directory
            .list_other_users(&caller)
            .await
            .map_err(LedgerError::store)
    }

    /// Zero record for a known user who has not settled anything yet.
    pub async fn record_for(&self, user_id: &str) -> Result<Record> {
        self.directory
            .get_user(user_id)
            .await
            .map_err(LedgerError::store)?
            .ok_or_else(|| LedgerError::not_found("user", user_id))?;
        Ok(self
            .directory
            .get_record(user_id)
            .await
            .map_err(LedgerError::store)?
            .unwrap_or_default())
    }

    pub async fn create_bet(
        &self,
        creator_id: &str,
        participant_id: &str,
        description: &str,
        pride_wagered: u32,
    ) -> Result<Bet> {
        if self.caller()? != creator_id {
            return Err(LedgerError::NotAuthenticated);
        }
        if participant_id == creator_id {
            return Err(LedgerError::invalid_input("cannot bet against yourself"));
        }
        if description.trim().is_empty() {
            return Err(LedgerError::invalid_input("description must not be empty"));
        }
        if pride_wagered == 0 {
            return Err(LedgerError::invalid_input("pride wagered must be positive"));
        }
        self.directory
            .get_user(participant_id)
            .await
            .map_err(LedgerError::store)?
            .ok_or_else(|| LedgerError::not_found("user", participant_id))?;

        let new_bet = NewBet {
            creator_id: creator_id.to_string(),
            participant_id: participant_id.to_string(),
            description: description.to_string(),
            pride_wagered,
            created_at: Utc::now(),
        };
        let id = self
            .store
            .insert(&new_bet)
            .await
            .map_err(LedgerError::store)?;
        info!(bet_id = %id, creator_id, participant_id, pride_wagered, "bet created");
        Ok(Bet::from_new(id, new_bet))
    }

    /// Newest first.
    pub async fn list_bets_for_user(&self, user_id: &str) -> Result<Vec<BetView>> {
        let mut bets = self
            .store
            .list_for_user(user_id)
            .await
            .map_err(LedgerError::store)?;
        bets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bets
            .into_iter()
            .map(|bet| BetView::for_user(bet, user_id))
            .collect())
    }

    pub async fn respond_to_bet(&self, bet_id: &str, caller_id: &str, accept: bool) -> Result<Bet> {
        let bet = self.fetch(bet_id).await?;
        match bet.status {
            BetStatus::Pending => {}
            BetStatus::Accepted | BetStatus::Rejected | BetStatus::Completed => {
                return Err(LedgerError::invalid_transition(format!(
                    "bet {} is {}, only pending bets can be answered",
                    bet_id, bet.status
                )));
            }
        }
        if caller_id != bet.participant_id {
            return Err(LedgerError::invalid_transition(
                "only the invited participant can answer a bet",
            ));
        }

        let update = BetUpdate {
            expected: BetStatus::Pending,
            status: if accept {
                BetStatus::Accepted
            } else {
                BetStatus::Rejected
            },
            winner_id: None,
        };
        let bet = self
            .store
            .update(bet_id, &update, caller_id)
            .await
            .map_err(LedgerError::store)?
            .ok_or_else(|| {
                LedgerError::invalid_transition(format!("bet {} changed while answering", bet_id))
            })?;
        info!(bet_id, caller_id, status = %bet.status, "bet answered");
        Ok(bet)
    }

    pub async fn settle_bet(&self, bet_id: &str, caller_id: &str, outcome: Outcome) -> Result<Bet> {
        let bet = self.fetch(bet_id).await?;
        match bet.status {
            BetStatus::Accepted => {}
            BetStatus::Pending | BetStatus::Rejected | BetStatus::Completed => {
                return Err(LedgerError::invalid_transition(format!(
                    "bet {} is {}, only accepted bets can be settled",
                    bet_id, bet.status
                )));
            }
        }
        if caller_id != bet.creator_id {
            return Err(LedgerError::invalid_transition(
                "only the creator can settle a bet",
            ));
        }

        let update = BetUpdate {
            expected: BetStatus::Accepted,
            status: BetStatus::Completed,
            winner_id: outcome.winner_of(&bet),
        };
        let settled = self
            .store
            .update(bet_id, &update, caller_id)
            .await
            .map_err(LedgerError::store)?
            .ok_or_else(|| {
                LedgerError::invalid_transition(format!("bet {} changed while settling", bet_id))
            })?;
        info!(bet_id, ?outcome, winner_id = ?settled.winner_id, "bet settled");

        // the bet stays completed even when a record write fails
        for (user_id, delta) in adjustments(&settled, outcome) {
            self.apply_adjustment(&settled.id, user_id, delta).await;
        }
        Ok(settled)
    }

    async fn apply_adjustment(&self, bet_id: &str, user_id: UserId, delta: RecordDelta) {
        match self.directory.upsert_record(&user_id, bet_id, &delta).await {
            Ok(record) => debug!(bet_id, user_id = %user_id, record = %record.formatted(), pride_balance = record.pride_balance, "record updated"),
            Err(error) => {
                warn!(bet_id, user_id = %user_id, "record update failed, queued for retry: {:#}", error);
                self.backlog
                    .push(PendingAdjustment {
                        bet_id: bet_id.to_string(),
                        user_id,
                        delta,
                    })
                    .await;
            }
        }
    }

    pub async fn retry_unapplied_records(&self) -> usize {
        self.backlog.retry(&self.directory).await
    }
}
