//! Collaborators the ledger reads from and writes to.

use anyhow::Result;
use async_trait::async_trait;
use common::{Bet, BetId, BetUpdate, NewBet, Record, RecordDelta, User, UserId};

/// Durable bet storage.
#[async_trait]
pub trait BetStore: Send + Sync {
    async fn insert(&self, bet: &NewBet) -> Result<BetId>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Bet>>;

    /// Every bet where the user is the creator or the participant.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Bet>>;

    /// Applies `update` only while the stored status equals `update.expected` and
    /// `caller_id` is one of the two parties.
    ///
    /// Returns `Ok(None)` when nothing matched.
    async fn update(&self, id: &str, update: &BetUpdate, caller_id: &str) -> Result<Option<Bet>>;
}

/// Identity of the signed in user plus everyone's aggregate records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;

    async fn register_user(&self, id: &str, display_name: &str) -> Result<User>;

    async fn get_user(&self, id: &str) -> Result<Option<User>>;

    async fn list_other_users(&self, excluding_id: &str) -> Result<Vec<User>>;

    async fn get_record(&self, user_id: &str) -> Result<Option<Record>>;

    /// Adds `delta` to the user's record, creating it at zero first when missing.
    ///
    /// Applies at most once per `(bet_id, user_id)`. Repeating an adjustment for a bet that
    /// was already counted leaves the record as is and returns it.
    async fn upsert_record(&self, user_id: &str, bet_id: &str, delta: &RecordDelta) -> Result<Record>;
}
