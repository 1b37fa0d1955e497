// Push-based change notifications published by the store after every
// committed mutation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tables that publish change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Teams,
    Players,
    AuctionConfig,
    AuctionHistory,
    TeamPlayers,
    AppUsers,
    Events,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Teams => "teams",
            Table::Players => "players",
            Table::AuctionConfig => "auction_config",
            Table::AuctionHistory => "auction_history",
            Table::TeamPlayers => "team_players",
            Table::AppUsers => "app_users",
            Table::Events => "events",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed change to one table. Receivers re-fetch the table rather
/// than applying a row-level patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableChange {
    pub table: Table,
    pub kind: ChangeKind,
}

impl TableChange {
    pub fn new(table: Table, kind: ChangeKind) -> Self {
        Self { table, kind }
    }
}

impl fmt::Display for TableChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} on {}", self.kind, self.table)
    }
}
