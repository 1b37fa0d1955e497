// Auction desk state: cached mirrors of the auction tables plus the
// operator's sale loop (select, sell, unsold, skip, next).
//
// The caches are refreshed from the store after every local mutation and
// whenever a `TableChange` arrives, so every connected desk converges on the
// committed rows.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_core::changes::{Table, TableChange};
use gavel_core::db::{Database, SaleRecord, Scope};
use gavel_core::model::{
    AuctionConfig, AuctionStatus, HistoryEntry, HistoryStatus, NewAssignment, NewHistoryEntry,
    Player, Team, TeamPlayer,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analytics::HistoryStats;
use crate::error::AuctionError;

pub type AuctionResult<T> = Result<T, AuctionError>;

// ---------------------------------------------------------------------------
// Commands and views
// ---------------------------------------------------------------------------

/// The operator's hammer call for the player on the block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellOrder {
    pub team_id: i64,
    pub price: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What a completed sale produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleReceipt {
    pub player: Player,
    /// The buying team with its updated budget.
    pub team: Team,
    pub price: i64,
    pub record: SaleRecord,
}

/// A purchased player as listed on a team's roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterPlayer {
    #[serde(flatten)]
    pub player: Player,
    /// Assignment row id, used to sell the player back.
    pub team_player_id: i64,
    pub purchase_price: i64,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamWithPlayers {
    #[serde(flatten)]
    pub team: Team,
    pub budget_remaining: i64,
    pub players: Vec<RosterPlayer>,
}

/// Counters shown on the auction control panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlCounters {
    pub total: usize,
    pub sold: usize,
    pub remaining: usize,
    pub percentage: u32,
}

/// Everything a connected client needs to render the auction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuctionSnapshot {
    pub config: Option<AuctionConfig>,
    pub current_player: Option<Player>,
    pub teams: Vec<TeamWithPlayers>,
    pub player_queue: Vec<Player>,
    pub history: Vec<HistoryEntry>,
    pub history_stats: HistoryStats,
    pub total_players: usize,
    pub remaining_players: usize,
    pub progress_percentage: u32,
    pub counters: ControlCounters,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// AuctionState
// ---------------------------------------------------------------------------

pub struct AuctionState {
    db: Arc<Database>,
    auction_config: Option<AuctionConfig>,
    current_player: Option<Player>,
    /// Active teams ordered by name.
    teams: Vec<Team>,
    /// Active players ordered by name.
    players: Vec<Player>,
    /// Joined history rows, most recent first.
    auction_history: Vec<HistoryEntry>,
    /// Joined assignments, most recent purchase first.
    team_players: Vec<TeamPlayer>,
    last_error: Option<String>,
}

impl AuctionState {
    /// Create an empty state. Call [`AuctionState::load_all`] to fill it.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            auction_config: None,
            current_player: None,
            teams: Vec::new(),
            players: Vec::new(),
            auction_history: Vec::new(),
            team_players: Vec::new(),
            last_error: None,
        }
    }

    pub fn auction_config(&self) -> Option<&AuctionConfig> {
        self.auction_config.as_ref()
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.current_player.as_ref()
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn auction_history(&self) -> &[HistoryEntry] {
        &self.auction_history
    }

    pub fn team_players(&self) -> &[TeamPlayer] {
        &self.team_players
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Record a failure in `last_error` on its way out.
    fn track<T>(&mut self, result: AuctionResult<T>) -> AuctionResult<T> {
        if let Err(e) = &result {
            warn!("auction command failed: {}", e);
            self.last_error = Some(e.to_string());
        }
        result
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Reload every cached table, then work out who is on the block.
    pub fn load_all(&mut self) -> AuctionResult<()> {
        self.last_error = None;
        let result = self.reload_tables();
        self.track(result)?;
        info!(
            teams = self.teams.len(),
            players = self.players.len(),
            history = self.auction_history.len(),
            "auction state loaded"
        );
        Ok(())
    }

    fn reload_tables(&mut self) -> AuctionResult<()> {
        self.load_auction_config()?;
        self.load_teams()?;
        self.load_players()?;
        self.load_auction_history()?;
        self.load_team_players()?;
        self.load_current_player();
        Ok(())
    }

    pub fn load_auction_config(&mut self) -> AuctionResult<()> {
        self.auction_config = self.db.get_auction_config()?;
        Ok(())
    }

    pub fn load_teams(&mut self) -> AuctionResult<()> {
        self.teams = self.db.list_teams(Scope::ActiveByName)?;
        Ok(())
    }

    pub fn load_players(&mut self) -> AuctionResult<()> {
        self.players = self.db.list_players(Scope::ActiveByName)?;
        Ok(())
    }

    pub fn load_auction_history(&mut self) -> AuctionResult<()> {
        self.auction_history = self.db.list_history()?;
        Ok(())
    }

    pub fn load_team_players(&mut self) -> AuctionResult<()> {
        self.team_players = self.db.list_team_players()?;
        Ok(())
    }

    /// Derive the current player from the players cache.
    pub fn load_current_player(&mut self) {
        self.current_player = self
            .players
            .iter()
            .find(|p| p.auction_status == AuctionStatus::Current)
            .cloned();
    }

    /// Re-fetch whatever `change` touched. Returns `false` for tables this
    /// state does not mirror.
    pub fn refresh(&mut self, change: &TableChange) -> AuctionResult<bool> {
        debug!(%change, "refreshing auction state");
        let result = match change.table {
            Table::AuctionConfig => self.load_auction_config(),
            Table::Teams => self.load_teams(),
            Table::Players => self.load_players().map(|()| self.load_current_player()),
            Table::AuctionHistory => self.load_auction_history(),
            Table::TeamPlayers => self.load_team_players(),
            Table::AppUsers | Table::Events => return Ok(false),
        };
        self.track(result)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Mutations mirrored into the cache
    // -----------------------------------------------------------------------

    /// Persist a status change and patch the cached player. Selecting a
    /// player as CURRENT demotes whoever held the block before.
    pub fn update_player_auction_status(
        &mut self,
        player_id: i64,
        status: AuctionStatus,
    ) -> AuctionResult<Player> {
        let result = self.db.set_auction_status(player_id, status);
        let updated = self.track(result.map_err(AuctionError::from))?;

        if status == AuctionStatus::Current {
            for p in self.players.iter_mut() {
                if p.id != player_id && p.auction_status == AuctionStatus::Current {
                    p.auction_status = AuctionStatus::Pending;
                }
            }
        }
        for p in self.players.iter_mut() {
            if p.id == player_id {
                p.auction_status = status;
                p.is_sold = status == AuctionStatus::Sold;
                p.updated_at = updated.updated_at;
            }
        }

        match status {
            AuctionStatus::Current => {
                self.current_player = self.players.iter().find(|p| p.id == player_id).cloned();
            }
            AuctionStatus::Sold | AuctionStatus::Unsold | AuctionStatus::Skipped => {
                self.load_current_player();
            }
            AuctionStatus::Pending | AuctionStatus::Inactive => {}
        }
        Ok(updated)
    }

    /// Persist a history row and put it at the top of the cached history.
    pub fn add_history(&mut self, entry: &NewHistoryEntry) -> AuctionResult<HistoryEntry> {
        let result = self.db.insert_history(entry).map_err(AuctionError::from);
        let created = self.track(result)?;
        self.auction_history.insert(0, created.clone());
        Ok(created)
    }

    /// Persist an assignment, reload team budgets and cache the new row.
    pub fn assign_player_to_team(&mut self, assignment: &NewAssignment) -> AuctionResult<TeamPlayer> {
        let result = self.db.assign_player(assignment).map_err(AuctionError::from);
        let created = self.track(result)?;
        let reload = self.load_teams();
        self.track(reload)?;
        self.team_players.insert(0, created.clone());
        Ok(created)
    }

    pub fn add_players_to_auction(&mut self, player_ids: &[i64]) -> AuctionResult<usize> {
        self.set_many(player_ids, AuctionStatus::Pending)
    }

    pub fn remove_players_from_auction(&mut self, player_ids: &[i64]) -> AuctionResult<usize> {
        self.set_many(player_ids, AuctionStatus::Inactive)
    }

    fn set_many(&mut self, player_ids: &[i64], status: AuctionStatus) -> AuctionResult<usize> {
        let result = self
            .db
            .set_auction_status_many(player_ids, status)
            .map_err(AuctionError::from);
        let changed = self.track(result)?;
        for p in self.players.iter_mut() {
            if player_ids.contains(&p.id) {
                p.auction_status = status;
            }
        }
        self.load_current_player();
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Sale loop
    // -----------------------------------------------------------------------

    /// Put the first waiting player (by name) on the block. With nobody
    /// waiting the block is cleared and `None` is returned.
    pub fn next_player(&mut self) -> AuctionResult<Option<Player>> {
        let next = self
            .players
            .iter()
            .find(|p| p.auction_status == AuctionStatus::Pending)
            .map(|p| p.id);

        match next {
            Some(id) => {
                let player = self.update_player_auction_status(id, AuctionStatus::Current)?;
                info!(player_id = id, name = %player.name, "next player on the block");
                Ok(Some(player))
            }
            None => {
                self.current_player = None;
                Ok(None)
            }
        }
    }

    /// Put a specific player on the block.
    pub fn select_player(&mut self, player_id: i64) -> AuctionResult<Player> {
        let checked = match self.players.iter().find(|p| p.id == player_id) {
            None => Err(AuctionError::UnknownPlayer(player_id)),
            Some(p) if p.auction_status == AuctionStatus::Sold || !p.is_active => {
                Err(AuctionError::PlayerUnavailable {
                    name: p.name.clone(),
                    status: p.auction_status,
                })
            }
            Some(_) => Ok(()),
        };
        self.track(checked)?;
        self.update_player_auction_status(player_id, AuctionStatus::Current)
    }

    /// Active, unsold players whose name contains `term`. A blank term
    /// matches nobody.
    pub fn search_players(&self, term: &str) -> Vec<Player> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.players
            .iter()
            .filter(|p| {
                p.is_active
                    && p.auction_status != AuctionStatus::Sold
                    && p.name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    fn require_current(&self) -> AuctionResult<Player> {
        self.current_player.clone().ok_or(AuctionError::NoCurrentPlayer)
    }

    fn check_sale(&self, order: &SellOrder) -> AuctionResult<(Player, Team)> {
        let player = self.require_current()?;
        if order.price < player.base_price {
            return Err(AuctionError::BelowBasePrice {
                price: order.price,
                base_price: player.base_price,
            });
        }
        let team = self
            .teams
            .iter()
            .find(|t| t.id == order.team_id && t.is_active)
            .ok_or(AuctionError::UnknownTeam(order.team_id))?;
        if team.budget_remaining() < order.price {
            return Err(AuctionError::InsufficientBudget {
                team: team.name.clone(),
                price: order.price,
                remaining: team.budget_remaining(),
            });
        }
        if !team.has_roster_space() {
            return Err(AuctionError::RosterFull {
                team: team.name.clone(),
            });
        }
        Ok((player, team.clone()))
    }

    /// Sell the player on the block. Nothing is written unless the whole
    /// sale (status, history row, assignment) commits.
    pub fn sell_current_player(&mut self, order: &SellOrder) -> AuctionResult<SaleReceipt> {
        self.last_error = None;
        let checked = self.check_sale(order);
        let (player, _) = self.track(checked)?;

        let result = self
            .db
            .record_sale(player.id, order.team_id, order.price, order.notes.as_deref())
            .map_err(AuctionError::from);
        let record = self.track(result)?;

        for p in self.players.iter_mut() {
            if p.id == player.id {
                p.auction_status = AuctionStatus::Sold;
                p.is_sold = true;
            }
        }
        self.load_current_player();
        self.auction_history.insert(0, record.history.clone());
        self.team_players.insert(0, record.assignment.clone());
        let reload = self.load_teams();
        self.track(reload)?;

        let team = self
            .teams
            .iter()
            .find(|t| t.id == order.team_id)
            .cloned()
            .or_else(|| record.assignment.team.clone())
            .ok_or(AuctionError::UnknownTeam(order.team_id))?;
        let mut sold = player;
        sold.auction_status = AuctionStatus::Sold;
        sold.is_sold = true;

        info!(
            player = %sold.name,
            team = %team.name,
            price = order.price,
            "player sold"
        );
        Ok(SaleReceipt {
            player: sold,
            team,
            price: order.price,
            record,
        })
    }

    /// Close the lot without a buyer. The history row carries the base
    /// price and no team.
    pub fn mark_current_unsold(&mut self) -> AuctionResult<HistoryEntry> {
        self.last_error = None;
        let current = self.require_current();
        let player = self.track(current)?;

        let result = self.db.record_no_sale(player.id, None).map_err(AuctionError::from);
        let entry = self.track(result)?;

        for p in self.players.iter_mut() {
            if p.id == player.id {
                p.auction_status = AuctionStatus::Unsold;
                p.is_sold = false;
            }
        }
        self.load_current_player();
        self.auction_history.insert(0, entry.clone());
        info!(player = %player.name, "player unsold");
        Ok(entry)
    }

    pub fn skip_current_player(&mut self) -> AuctionResult<Player> {
        self.last_error = None;
        let current = self.require_current();
        let player = self.track(current)?;
        let skipped = self.update_player_auction_status(player.id, AuctionStatus::Skipped)?;
        info!(player = %skipped.name, "player skipped");
        Ok(skipped)
    }

    /// Put every active player back in the pool as PENDING. Returns how many
    /// players were queued.
    pub fn initialize_auction(&mut self) -> AuctionResult<usize> {
        self.last_error = None;
        let result = self.queue_active_players();
        let count = self.track(result)?;
        self.load_all()?;
        info!(count, "auction initialized");
        Ok(count)
    }

    fn queue_active_players(&self) -> AuctionResult<usize> {
        let players = self.db.list_players(Scope::All)?;
        if players.is_empty() {
            return Err(AuctionError::NoPlayers);
        }
        let active: Vec<i64> = players.iter().filter(|p| p.is_active).map(|p| p.id).collect();
        if active.is_empty() {
            return Err(AuctionError::NoActivePlayers);
        }
        Ok(self.db.set_auction_status_many(&active, AuctionStatus::Pending)?)
    }

    /// Wipe sales, history and budgets back to a fresh auction.
    pub fn reset_auction(&mut self) -> AuctionResult<()> {
        self.last_error = None;
        let result = self.reset_in_store();
        self.track(result)?;
        self.load_all()
    }

    fn reset_in_store(&self) -> AuctionResult<()> {
        let config = self.db.get_auction_config()?.ok_or(AuctionError::NoAuctionConfig)?;
        self.db.reset_auction(config.id)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    pub fn teams_with_players(&self) -> Vec<TeamWithPlayers> {
        self.teams
            .iter()
            .map(|team| TeamWithPlayers {
                team: team.clone(),
                budget_remaining: team.budget_remaining(),
                players: self
                    .team_players
                    .iter()
                    .filter(|tp| tp.team_id == team.id)
                    .filter_map(|tp| {
                        tp.player.clone().map(|player| RosterPlayer {
                            player,
                            team_player_id: tp.id,
                            purchase_price: tp.purchase_price,
                            purchased_at: tp.purchased_at,
                        })
                    })
                    .collect(),
            })
            .collect()
    }

    /// Players in the auction: the one on the block, then those waiting,
    /// then decided ones, each group by name.
    pub fn player_queue(&self) -> Vec<Player> {
        let mut queue: Vec<Player> = self
            .players
            .iter()
            .filter(|p| p.auction_status.is_in_queue())
            .cloned()
            .collect();
        queue.sort_by(|a, b| {
            a.auction_status
                .queue_order()
                .cmp(&b.auction_status.queue_order())
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        queue
    }

    pub fn available_players(&self) -> Vec<Player> {
        self.players
            .iter()
            .filter(|p| p.auction_status == AuctionStatus::Pending && p.is_active)
            .cloned()
            .collect()
    }

    pub fn sold_history(&self) -> Vec<HistoryEntry> {
        self.auction_history
            .iter()
            .filter(|h| h.status == HistoryStatus::Sold)
            .cloned()
            .collect()
    }

    pub fn total_players(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.auction_status.is_in_queue())
            .count()
    }

    pub fn remaining_players(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.auction_status == AuctionStatus::Pending)
            .count()
    }

    /// Queued players that are sold and have a SOLD history row. A player
    /// sold back and resold counts once.
    pub fn sold_players(&self) -> usize {
        let sold_ids: HashSet<i64> = self
            .auction_history
            .iter()
            .filter(|h| h.status == HistoryStatus::Sold)
            .map(|h| h.player_id)
            .collect();
        self.players
            .iter()
            .filter(|p| p.auction_status == AuctionStatus::Sold && sold_ids.contains(&p.id))
            .count()
    }

    /// Sold players as a rounded share of the queue.
    pub fn progress_percentage(&self) -> u32 {
        rounded_percentage(self.sold_players(), self.total_players())
    }

    /// Teams that could still buy the player on the block.
    pub fn eligible_teams(&self) -> Vec<Team> {
        let floor = self.current_player.as_ref().map_or(0, |p| p.base_price);
        self.teams
            .iter()
            .filter(|t| t.budget_remaining() >= floor && t.has_roster_space())
            .cloned()
            .collect()
    }

    pub fn control_counters(&self) -> ControlCounters {
        let total = self.players.iter().filter(|p| p.is_active).count();
        let sold = self
            .players
            .iter()
            .filter(|p| p.auction_status == AuctionStatus::Sold)
            .count();
        ControlCounters {
            total,
            sold,
            remaining: self.remaining_players(),
            percentage: rounded_percentage(sold, total),
        }
    }

    pub fn snapshot(&self) -> AuctionSnapshot {
        AuctionSnapshot {
            config: self.auction_config.clone(),
            current_player: self.current_player.clone(),
            teams: self.teams_with_players(),
            player_queue: self.player_queue(),
            history: self.auction_history.clone(),
            history_stats: HistoryStats::from_entries(&self.auction_history),
            total_players: self.total_players(),
            remaining_players: self.remaining_players(),
            progress_percentage: self.progress_percentage(),
            counters: self.control_counters(),
            last_error: self.last_error.clone(),
        }
    }
}

fn rounded_percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u32
}
