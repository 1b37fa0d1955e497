// Table services: thin pass-throughs to the store that keep a local mirror
// of what they last fetched and the last failure message.

pub mod auction;
pub mod events;
pub mod players;
pub mod team_players;
pub mod teams;
pub mod users;

pub use auction::AuctionService;
pub use events::EventsService;
pub use players::PlayersService;
pub use team_players::TeamPlayersService;
pub use teams::TeamsService;
pub use users::{UserStats, UsersService};

use tracing::warn;

use crate::error::ServiceResult;

/// The most recent failure of a service, cleared when the next operation
/// starts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LastError(Option<String>);

impl LastError {
    pub fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    /// Remember `result`'s error, if any, and hand the result back.
    pub(crate) fn record<T>(&mut self, service: &str, result: ServiceResult<T>) -> ServiceResult<T> {
        match &result {
            Ok(_) => self.0 = None,
            Err(e) => {
                warn!(service, "operation failed: {}", e);
                self.0 = Some(e.to_string());
            }
        }
        result
    }
}
