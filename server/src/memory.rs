//! In-process stand-ins for the collaborators, with failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use common::{Bet, BetId, BetStatus, BetUpdate, NewBet, Record, RecordDelta, User, UserId};

use crate::store::{BetStore, UserDirectory};

#[derive(Default)]
struct State {
    bets: HashMap<BetId, Bet>,
    users: BTreeMap<UserId, String>,
    records: HashMap<UserId, Record>,
    applied: HashSet<(BetId, UserId)>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    fail_bets: Arc<AtomicBool>,
    fail_records: Arc<AtomicBool>,
    lose_record_acks: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn with_users(users: &[(&str, &str)]) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.lock();
            for (id, name) in users {
                state.users.insert(id.to_string(), name.to_string());
            }
        }
        backend
    }

    pub fn session(&self, user_id: Option<&str>) -> MemorySession {
        MemorySession {
            backend: self.clone(),
            user_id: user_id.map(Into::into),
        }
    }

    pub fn fail_bets(&self, fail: bool) {
        self.fail_bets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_records(&self, fail: bool) {
        self.fail_records.store(fail, Ordering::SeqCst);
    }

    /// Record writes still commit but report a failure, like a reply lost after the write.
    pub fn lose_record_acks(&self, lose: bool) {
        self.lose_record_acks.store(lose, Ordering::SeqCst);
    }

    pub fn record(&self, user_id: &str) -> Option<Record> {
        self.lock().records.get(user_id).copied()
    }

    pub fn bet(&self, bet_id: &str) -> Option<Bet> {
        self.lock().bets.get(bet_id).cloned()
    }

    pub fn force_status(&self, bet_id: &str, status: BetStatus) {
        if let Some(bet) = self.lock().bets.get_mut(bet_id) {
            bet.status = status;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_bets(&self) -> Result<()> {
        if self.fail_bets.load(Ordering::SeqCst) {
            bail!("bet store offline");
        }
        Ok(())
    }

    fn user(&self, state: &State, id: &str) -> Option<User> {
        state.users.get(id).map(|name| User {
            id: id.to_string(),
            display_name: name.clone(),
            record: state.records.get(id).copied().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl BetStore for MemoryBackend {
    async fn insert(&self, bet: &NewBet) -> Result<BetId> {
        self.check_bets()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.lock()
            .bets
            .insert(id.clone(), Bet::from_new(id.clone(), bet.clone()));
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Bet>> {
        self.check_bets()?;
        Ok(self.bet(id))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Bet>> {
        self.check_bets()?;
        Ok(self
            .lock()
            .bets
            .values()
            .filter(|bet| bet.involves(user_id))
            .cloned()
            .collect())
    }

    async fn update(&self, id: &str, update: &BetUpdate, caller_id: &str) -> Result<Option<Bet>> {
        self.check_bets()?;
        let mut state = self.lock();
        let Some(bet) = state.bets.get_mut(id) else {
            return Ok(None);
        };
        if bet.status != update.expected || !bet.involves(caller_id) {
            return Ok(None);
        }
        bet.status = update.status;
        bet.winner_id = update.winner_id.clone();
        Ok(Some(bet.clone()))
    }
}

#[derive(Clone)]
pub struct MemorySession {
    backend: MemoryBackend,
    user_id: Option<UserId>,
}

#[async_trait]
impl UserDirectory for MemorySession {
    fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }

    async fn register_user(&self, id: &str, display_name: &str) -> Result<User> {
        let mut state = self.backend.lock();
        if state.users.contains_key(id) {
            bail!("user '{}' already exists", id);
        }
        state.users.insert(id.to_string(), display_name.to_string());
        self.backend
            .user(&state, id)
            .ok_or_else(|| anyhow!("user '{}' vanished", id))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let state = self.backend.lock();
        Ok(self.backend.user(&state, id))
    }

    async fn list_other_users(&self, excluding_id: &str) -> Result<Vec<User>> {
        let state = self.backend.lock();
        Ok(state
            .users
            .keys()
            .filter(|id| id.as_str() != excluding_id)
            .filter_map(|id| self.backend.user(&state, id))
            .collect())
    }

    async fn get_record(&self, user_id: &str) -> Result<Option<Record>> {
        Ok(self.backend.record(user_id))
    }

    async fn upsert_record(&self, user_id: &str, bet_id: &str, delta: &RecordDelta) -> Result<Record> {
        if self.backend.fail_records.load(Ordering::SeqCst) {
            bail!("record store offline");
        }
        let mut state = self.backend.lock();
        let first = state
            .applied
            .insert((bet_id.to_string(), user_id.to_string()));
        let record = state.records.entry(user_id.to_string()).or_default();
        if first {
            record.apply(delta);
        }
        let record = *record;
        drop(state);

        if self.backend.lose_record_acks.load(Ordering::SeqCst) {
            bail!("timed out waiting for ack");
        }
        Ok(record)
    }
}
