use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Bet, BetId, BetStatus, BetUpdate, NewBet, Record, RecordDelta, User, UserId};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::sql::{Id, Thing};
use surrealdb::{Connection, Surreal};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::store::{BetStore, UserDirectory};

const BET: &str = "bet";
const USER: &str = "user";
const RECORD: &str = "user_record";

fn thing(tb: &str, id: &str) -> Thing {
    Thing {
        tb: tb.into(),
        id: Id::String(id.into()),
    }
}

fn key(thing: &Thing) -> String {
    match &thing.id {
        Id::String(id) => id.clone(),
        other => other.to_string(),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbUser {
    pub id: Thing,
    pub display_name: String,
}

impl DbUser {
    pub fn new(id: &str, display_name: impl Into<String>) -> Self {
        Self {
            id: thing(USER, id),
            display_name: display_name.into(),
        }
    }

    fn into_user(self, record: Option<Record>) -> User {
        User {
            id: key(&self.id),
            display_name: self.display_name,
            record: record.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbRecord {
    pub id: Thing,
    pub user: Thing,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub pride_balance: i64,
    /// Bets whose settlement has already been counted in this record.
    #[serde(default)]
    pub applied: Vec<Thing>,
}

impl From<DbRecord> for Record {
    fn from(value: DbRecord) -> Self {
        Record {
            wins: value.wins,
            draws: value.draws,
            losses: value.losses,
            pride_balance: value.pride_balance,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbBet {
    pub id: Thing,
    pub creator: Thing,
    pub participant: Thing,
    pub description: String,
    pub pride_wagered: u32,
    pub status: String,
    #[serde(default)]
    pub winner: Option<Thing>,
    pub created_at: String,
}

impl DbBet {
    pub fn new(bet: &NewBet) -> Self {
        Self {
            id: Thing {
                tb: BET.into(),
                id: Id::rand(),
            },
            creator: thing(USER, &bet.creator_id),
            participant: thing(USER, &bet.participant_id),
            description: bet.description.clone(),
            pride_wagered: bet.pride_wagered,
            status: BetStatus::Pending.to_string(),
            winner: None,
            created_at: bet.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<DbBet> for Bet {
    type Error = anyhow::Error;

    fn try_from(value: DbBet) -> Result<Self> {
        let id = key(&value.id);
        let status = value
            .status
            .parse::<BetStatus>()
            .map_err(|_| anyhow!("bet {} has unknown status '{}'", id, value.status))?;
        let created_at = DateTime::parse_from_rfc3339(&value.created_at)
            .with_context(|| format!("bet {} has a malformed created_at", id))?
            .with_timezone(&Utc);
        Ok(Bet {
            id,
            creator_id: key(&value.creator),
            participant_id: key(&value.participant),
            description: value.description,
            pride_wagered: value.pride_wagered,
            status,
            winner_id: value.winner.as_ref().map(key),
            created_at,
        })
    }
}

pub struct DatabaseConnection<C: Connection> {
    connection: Surreal<C>,
}

impl<C: Connection> Clone for DatabaseConnection<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
        }
    }
}

impl DatabaseConnection<Any> {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db = any::connect(config.address.as_str())
            .await
            .with_context(|| format!("connecting to {}", config.address))?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root { username, password })
                .await
                .context("signing in to the database")?;
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        Ok(Self::new(db))
    }
}

impl<C: Connection> DatabaseConnection<C> {
    pub fn new(connection: Surreal<C>) -> Self {
        Self { connection }
    }

    pub fn session(&self, user_id: Option<UserId>) -> Session<C> {
        Session {
            database: self.clone(),
            user_id,
        }
    }

    async fn record(&self, user_id: &str) -> Result<Option<Record>> {
        let record: Option<DbRecord> = self
            .connection
            .select((RECORD, user_id))
            .await
            .with_context(|| format!("selecting record of {}", user_id))?;
        Ok(record.map(Into::into))
    }
}

#[async_trait]
impl<C: Connection> BetStore for DatabaseConnection<C> {
    async fn insert(&self, bet: &NewBet) -> Result<BetId> {
        let record = DbBet::new(bet);
        let id = key(&record.id);
        let created: Option<DbBet> = self
            .connection
            .create((BET, id.as_str()))
            .content(&record)
            .await
            .context("creating bet")?;
        created.ok_or_else(|| anyhow!("bet {} was not created", id))?;
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Bet>> {
        let bet: Option<DbBet> = self
            .connection
            .select((BET, id))
            .await
            .with_context(|| format!("selecting bet {}", id))?;
        bet.map(Bet::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Bet>> {
        let bets: Vec<DbBet> = self
            .connection
            .query("SELECT * FROM bet WHERE creator = $user OR participant = $user;")
            .bind(("user", thing(USER, user_id)))
            .await?
            .take(0)
            .with_context(|| format!("listing bets of {}", user_id))?;
        bets.into_iter().map(Bet::try_from).collect()
    }

    async fn update(&self, id: &str, update: &BetUpdate, caller_id: &str) -> Result<Option<Bet>> {
        let updated: Vec<DbBet> = self
            .connection
            .query(
                "UPDATE $bet SET status = $status, winner = $winner \
                 WHERE status = $expected AND (creator = $caller OR participant = $caller) \
                 RETURN AFTER;",
            )
            .bind(("bet", thing(BET, id)))
            .bind(("status", update.status.as_ref()))
            .bind(("winner", update.winner_id.as_deref().map(|winner| thing(USER, winner))))
            .bind(("expected", update.expected.as_ref()))
            .bind(("caller", thing(USER, caller_id)))
            .await?
            .take(0)
            .with_context(|| format!("updating bet {}", id))?;
        updated.into_iter().next().map(Bet::try_from).transpose()
    }
}

/// The database seen by one signed in user (or nobody).
pub struct Session<C: Connection> {
    database: DatabaseConnection<C>,
    user_id: Option<UserId>,
}

#[async_trait]
impl<C: Connection> UserDirectory for Session<C> {
    fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }

    async fn register_user(&self, id: &str, display_name: &str) -> Result<User> {
        let user = DbUser::new(id, display_name);
        let created: Option<DbUser> = self
            .database
            .connection
            .create((USER, id))
            .content(&user)
            .await
            .with_context(|| format!("creating user {}", id))?;
        let created = created.ok_or_else(|| anyhow!("user {} was not created", id))?;
        Ok(created.into_user(None))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let user: Option<DbUser> = self
            .database
            .connection
            .select((USER, id))
            .await
            .with_context(|| format!("selecting user {}", id))?;
        match user {
            Some(user) => {
                let record = self.database.record(id).await?;
                Ok(Some(user.into_user(record)))
            }
            None => Ok(None),
        }
    }

    async fn list_other_users(&self, excluding_id: &str) -> Result<Vec<User>> {
        let mut response = self
            .database
            .connection
            .query("SELECT * FROM user WHERE id != $me ORDER BY id;")
            .query("SELECT * FROM user_record;")
            .bind(("me", thing(USER, excluding_id)))
            .await?;
        let users: Vec<DbUser> = response.take(0).context("listing users")?;
        let records: Vec<DbRecord> = response.take(1).context("listing records")?;

        let mut records: HashMap<String, Record> = records
            .into_iter()
            .map(|record| (key(&record.user), record.into()))
            .collect();
        Ok(users
            .into_iter()
            .map(|user| {
                let record = records.remove(&key(&user.id));
                user.into_user(record)
            })
            .collect())
    }

    async fn get_record(&self, user_id: &str) -> Result<Option<Record>> {
        self.database.record(user_id).await
    }

    async fn upsert_record(&self, user_id: &str, bet_id: &str, delta: &RecordDelta) -> Result<Record> {
        // UPDATE creates the record when it is missing and += starts absent fields at the delta.
        // The bet joins `applied` in the same write, so a repeat matches nothing.
        let updated: Vec<DbRecord> = self
            .database
            .connection
            .query(
                "UPDATE $record SET user = $user, wins += $wins, draws += $draws, \
                 losses += $losses, pride_balance += $pride, applied += $bet \
                 WHERE $bet NOTINSIDE applied RETURN AFTER;",
            )
            .bind(("record", thing(RECORD, user_id)))
            .bind(("user", thing(USER, user_id)))
            .bind(("bet", thing(BET, bet_id)))
            .bind(("wins", delta.wins))
            .bind(("draws", delta.draws))
            .bind(("losses", delta.losses))
            .bind(("pride", delta.pride))
            .await?
            .take(0)
            .with_context(|| format!("updating record of {}", user_id))?;
        if let Some(record) = updated.into_iter().next() {
            return Ok(record.into());
        }

        debug!(user_id, bet_id, "record adjustment already applied");
        self.database
            .record(user_id)
            .await?
            .ok_or_else(|| anyhow!("record of {} was not written", user_id))
    }
}
