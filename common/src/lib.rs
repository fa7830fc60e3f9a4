use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub mod network;
pub mod slider;

pub type UserId = String;
pub type BetId = String;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl BetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BetStatus::Rejected | BetStatus::Completed)
    }

    /// Label shown next to a bet; a pending bet reads differently for the side that created it.
    pub fn label(self, is_creator: bool) -> &'static str {
        match self {
            BetStatus::Pending if is_creator => "Waiting for Response",
            BetStatus::Pending => "Needs Your Response",
            BetStatus::Accepted => "In Progress",
            BetStatus::Rejected => "Rejected",
            BetStatus::Completed => "Completed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Outcome {
    CreatorWon,
    ParticipantWon,
    Draw,
}

impl Outcome {
    pub fn winner_of(self, bet: &Bet) -> Option<UserId> {
        match self {
            Outcome::CreatorWon => Some(bet.creator_id.clone()),
            Outcome::ParticipantWon => Some(bet.participant_id.clone()),
            Outcome::Draw => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Record {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub pride_balance: i64,
}

impl Record {
    pub fn formatted(&self) -> String {
        format!("{}-{}-{}", self.wins, self.draws, self.losses)
    }

    pub fn apply(&mut self, delta: &RecordDelta) {
        self.wins += delta.wins;
        self.draws += delta.draws;
        self.losses += delta.losses;
        self.pride_balance += delta.pride;
    }
}

/// Change to a user's record produced by a single settlement.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct RecordDelta {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub pride: i64,
}

impl RecordDelta {
    pub fn win(stake: u32) -> Self {
        Self {
            wins: 1,
            pride: i64::from(stake),
            ..Default::default()
        }
    }

    pub fn loss(stake: u32) -> Self {
        Self {
            losses: 1,
            pride: -i64::from(stake),
            ..Default::default()
        }
    }

    pub fn draw() -> Self {
        Self {
            draws: 1,
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub record: Record,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Bet {
    pub id: BetId,
    pub creator_id: UserId,
    pub participant_id: UserId,
    pub description: String,
    pub pride_wagered: u32,
    pub status: BetStatus,
    pub winner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Bet {
    pub fn from_new(id: BetId, new: NewBet) -> Self {
        Self {
            id,
            creator_id: new.creator_id,
            participant_id: new.participant_id,
            description: new.description,
            pride_wagered: new.pride_wagered,
            status: BetStatus::Pending,
            winner_id: None,
            created_at: new.created_at,
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.creator_id == user_id || self.participant_id == user_id
    }

    pub fn is_draw(&self) -> bool {
        self.status == BetStatus::Completed && self.winner_id.is_none()
    }
}

// A bet that has not been stored yet, the store assigns the id
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct NewBet {
    pub creator_id: UserId,
    pub participant_id: UserId,
    pub description: String,
    pub pride_wagered: u32,
    pub created_at: DateTime<Utc>,
}

/// Conditional status change: only applied while the stored status still equals `expected`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BetUpdate {
    pub expected: BetStatus,
    pub status: BetStatus,
    pub winner_id: Option<UserId>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct BetView {
    pub bet: Bet,
    pub is_creator: bool,
    pub status_display: String,
}

impl BetView {
    pub fn for_user(bet: Bet, user_id: &str) -> Self {
        let is_creator = bet.creator_id == user_id;
        let status_display = bet.status.label(is_creator).to_string();
        Self {
            bet,
            is_creator,
            status_display,
        }
    }

    pub fn counterparty_id(&self) -> &str {
        if self.is_creator {
            &self.bet.participant_id
        } else {
            &self.bet.creator_id
        }
    }

    pub fn won_by(&self, user_id: &str) -> bool {
        self.bet.winner_id.as_deref() == Some(user_id)
    }
}

pub fn active(bets: &[BetView]) -> Vec<&BetView> {
    bets.iter().filter(|view| !view.bet.status.is_terminal()).collect()
}

pub fn settled(bets: &[BetView]) -> Vec<&BetView> {
    bets.iter()
        .filter(|view| view.bet.status == BetStatus::Completed)
        .collect()
}
