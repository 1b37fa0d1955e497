// Auction configuration, history rows, and team-player assignments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ParseEnumError, Player, Team};

// ---------------------------------------------------------------------------
// Auction configuration
// ---------------------------------------------------------------------------

/// Lifecycle of the auction configuration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigStatus {
    Draft,
    Active,
    Completed,
}

impl ConfigStatus {
    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(ConfigStatus::Draft),
            "ACTIVE" => Ok(ConfigStatus::Active),
            "COMPLETED" => Ok(ConfigStatus::Completed),
            _ => Err(ParseEnumError::new("auction_config.status", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStatus::Draft => "DRAFT",
            ConfigStatus::Active => "ACTIVE",
            ConfigStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single active auction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub budget_cap: i64,
    pub max_players_per_team: u32,
    pub min_players_per_team: u32,
    pub status: ConfigStatus,
    /// Player currently on the block, if the operator recorded one.
    pub current_player_id: Option<i64>,
    pub current_player_position: u32,
    pub total_players: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAuctionConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub budget_cap: i64,
    pub max_players_per_team: u32,
    #[serde(default)]
    pub min_players_per_team: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionConfigUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub budget_cap: Option<i64>,
    #[serde(default)]
    pub max_players_per_team: Option<u32>,
    #[serde(default)]
    pub min_players_per_team: Option<u32>,
    #[serde(default)]
    pub status: Option<ConfigStatus>,
    #[serde(default)]
    pub current_player_id: Option<i64>,
    #[serde(default)]
    pub current_player_position: Option<u32>,
    #[serde(default)]
    pub total_players: Option<u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Auction history
// ---------------------------------------------------------------------------

/// Outcome recorded for a player that went through the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryStatus {
    Sold,
    Unsold,
    Withdrawn,
}

impl HistoryStatus {
    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_uppercase().as_str() {
            "SOLD" => Ok(HistoryStatus::Sold),
            "UNSOLD" => Ok(HistoryStatus::Unsold),
            "WITHDRAWN" => Ok(HistoryStatus::Withdrawn),
            _ => Err(ParseEnumError::new("auction_history.status", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Sold => "SOLD",
            HistoryStatus::Unsold => "UNSOLD",
            HistoryStatus::Withdrawn => "WITHDRAWN",
        }
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sale or no-sale event, optionally joined with its player and team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub player_id: i64,
    pub winning_team_id: Option<i64>,
    pub final_price: Option<i64>,
    pub auction_date: NaiveDate,
    pub sold_at: DateTime<Utc>,
    pub auction_round: Option<u32>,
    pub bidding_duration: Option<String>,
    pub notes: Option<String>,
    pub status: HistoryStatus,
    pub player: Option<Player>,
    pub team: Option<Team>,
}

impl HistoryEntry {
    /// A completed sale to a team.
    pub fn is_sale(&self) -> bool {
        self.winning_team_id.is_some() && self.status == HistoryStatus::Sold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub player_id: i64,
    #[serde(default)]
    pub winning_team_id: Option<i64>,
    #[serde(default)]
    pub final_price: Option<i64>,
    pub auction_date: NaiveDate,
    #[serde(default)]
    pub auction_round: Option<u32>,
    #[serde(default)]
    pub bidding_duration: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: HistoryStatus,
}

// ---------------------------------------------------------------------------
// Team-player assignments
// ---------------------------------------------------------------------------

/// Join row recording that a team bought a player at a given price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPlayer {
    pub id: i64,
    pub team_id: i64,
    pub player_id: i64,
    pub purchase_price: i64,
    pub purchased_at: DateTime<Utc>,
    pub position_in_team: Option<String>,
    pub is_captain: bool,
    pub is_vice_captain: bool,
    pub team: Option<Team>,
    pub player: Option<Player>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub team_id: i64,
    pub player_id: i64,
    pub purchase_price: i64,
    #[serde(default)]
    pub position_in_team: Option<String>,
}
