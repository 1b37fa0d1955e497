// Team rows and the payloads used to create or patch them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A team participating in the auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub short_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: String,
    pub secondary_color: String,
    /// Spending limit for the whole auction.
    pub budget_cap: i64,
    /// Sum of purchase prices of every assigned player.
    pub budget_spent: i64,
    pub players_count: u32,
    pub max_players: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Budget still available, never negative.
    pub fn budget_remaining(&self) -> i64 {
        (self.budget_cap - self.budget_spent).max(0)
    }

    /// Whether another player fits on the roster.
    pub fn has_roster_space(&self) -> bool {
        self.players_count < self.max_players
    }

    /// Whether the team could pay `price` for one more player.
    pub fn can_afford(&self, price: i64) -> bool {
        self.is_active && self.has_roster_space() && self.budget_remaining() >= price
    }
}

/// Fields for inserting a team. Unset optional fields fall back to the
/// configured auction defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub budget_cap: Option<i64>,
    #[serde(default)]
    pub max_players: Option<u32>,
}

/// Partial update for a team. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub budget_cap: Option<i64>,
    #[serde(default)]
    pub max_players: Option<u32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}
