// Row types for every table the auction desk reads and writes.

pub mod auction;
pub mod event;
pub mod player;
pub mod team;
pub mod user;

pub use auction::{
    AuctionConfig, AuctionConfigUpdate, ConfigStatus, HistoryEntry, HistoryStatus,
    NewAssignment, NewAuctionConfig, NewHistoryEntry, TeamPlayer,
};
pub use event::{Event, EventStatus, EventType, EventUpdate, NewEvent};
pub use player::{AuctionStatus, NewPlayer, Player, PlayerUpdate};
pub use team::{NewTeam, Team, TeamUpdate};
pub use user::{AppUser, NewAppUser, Provider, Role};

// ---------------------------------------------------------------------------
// Insert defaults, used when neither the caller nor the config supplies one
// ---------------------------------------------------------------------------

pub const DEFAULT_PRIMARY_COLOR: &str = "#1976d2";
pub const DEFAULT_SECONDARY_COLOR: &str = "#424242";
pub const DEFAULT_TEAM_BUDGET_CAP: i64 = 10_000_000;
pub const DEFAULT_MAX_PLAYERS: u32 = 25;
pub const DEFAULT_BASE_PRICE: i64 = 100_000;

/// Error returned when a database or wire string does not name a known
/// enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
