// Player rows and the auction lifecycle tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ParseEnumError;

/// Lifecycle tag on a player row during the auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Pending,
    Current,
    Sold,
    Unsold,
    Skipped,
    Inactive,
}

impl AuctionStatus {
    pub const ALL: [AuctionStatus; 6] = [
        AuctionStatus::Pending,
        AuctionStatus::Current,
        AuctionStatus::Sold,
        AuctionStatus::Unsold,
        AuctionStatus::Skipped,
        AuctionStatus::Inactive,
    ];

    /// Parse the database/wire representation (case-insensitive).
    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(AuctionStatus::Pending),
            "CURRENT" => Ok(AuctionStatus::Current),
            "SOLD" => Ok(AuctionStatus::Sold),
            "UNSOLD" => Ok(AuctionStatus::Unsold),
            "SKIPPED" => Ok(AuctionStatus::Skipped),
            "INACTIVE" => Ok(AuctionStatus::Inactive),
            _ => Err(ParseEnumError::new("auction_status", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Pending => "PENDING",
            AuctionStatus::Current => "CURRENT",
            AuctionStatus::Sold => "SOLD",
            AuctionStatus::Unsold => "UNSOLD",
            AuctionStatus::Skipped => "SKIPPED",
            AuctionStatus::Inactive => "INACTIVE",
        }
    }

    /// Ordering used by the player queue: the player on the block first,
    /// then those still waiting, then decided ones.
    pub fn queue_order(&self) -> u8 {
        match self {
            AuctionStatus::Current => 0,
            AuctionStatus::Pending => 1,
            AuctionStatus::Sold => 2,
            AuctionStatus::Unsold => 3,
            AuctionStatus::Skipped => 4,
            AuctionStatus::Inactive => 5,
        }
    }

    /// Every status except INACTIVE belongs to the auction queue.
    pub fn is_in_queue(&self) -> bool {
        !matches!(self, AuctionStatus::Inactive)
    }

    /// The player has been through the block and a result was recorded.
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            AuctionStatus::Sold | AuctionStatus::Unsold | AuctionStatus::Skipped
        )
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player in the auction pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub position: String,
    pub category: String,
    pub subcategory: Option<String>,
    /// Minimum acceptable sale price.
    pub base_price: i64,
    pub image_url: Option<String>,
    pub nationality: Option<String>,
    pub age: Option<u32>,
    pub experience_years: Option<u32>,
    /// Free-form statistics blob.
    pub stats: Option<serde_json::Value>,
    pub is_sold: bool,
    pub is_active: bool,
    pub auction_status: AuctionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a player. A missing `base_price` takes the
/// configured default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    pub position: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub base_price: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub stats: Option<serde_json::Value>,
}

/// Partial update for a player. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub base_price: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub stats: Option<serde_json::Value>,
    #[serde(default)]
    pub is_sold: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}
