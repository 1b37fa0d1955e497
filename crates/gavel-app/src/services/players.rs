// Player pool management, including CSV import.

use std::io::Read;
use std::sync::Arc;

use gavel_core::config::AuctionDefaults;
use gavel_core::db::{Database, Scope};
use gavel_core::model::{NewPlayer, Player, PlayerUpdate};
use tracing::info;

use super::LastError;
use crate::analytics::PlayerStats;
use crate::error::{ServiceError, ServiceResult};
use crate::import;

const SERVICE: &str = "players";

/// Outcome of a CSV import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub imported: Vec<Player>,
    pub skipped: usize,
}

pub struct PlayersService {
    db: Arc<Database>,
    defaults: AuctionDefaults,
    players: Vec<Player>,
    last_error: LastError,
}

impl PlayersService {
    pub fn new(db: Arc<Database>, defaults: AuctionDefaults) -> Self {
        Self {
            db,
            defaults,
            players: Vec::new(),
            last_error: LastError::default(),
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.get()
    }

    pub fn clear_error(&mut self) {
        self.last_error.clear();
    }

    pub fn get_players(&mut self) -> ServiceResult<Vec<Player>> {
        let result = self.db.list_players(Scope::All).map_err(ServiceError::from);
        let players = self.last_error.record(SERVICE, result)?;
        self.players = players.clone();
        Ok(players)
    }

    pub fn get_player_by_id(&mut self, id: i64) -> ServiceResult<Player> {
        let result = self.db.get_player(id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    pub fn create_player(&mut self, player: NewPlayer) -> ServiceResult<Player> {
        let player = NewPlayer {
            base_price: player.base_price.or(Some(self.defaults.base_price)),
            ..player
        };
        let result = self.db.insert_player(&player).map_err(ServiceError::from);
        let created = self.last_error.record(SERVICE, result)?;
        self.players.insert(0, created.clone());
        Ok(created)
    }

    pub fn update_player(&mut self, id: i64, update: &PlayerUpdate) -> ServiceResult<Player> {
        let result = self.db.update_player(id, update).map_err(ServiceError::from);
        let updated = self.last_error.record(SERVICE, result)?;
        if let Some(cached) = self.players.iter_mut().find(|p| p.id == id) {
            *cached = updated.clone();
        }
        Ok(updated)
    }

    /// Delete a player. A sold player's team gets the purchase price back.
    pub fn delete_player(&mut self, id: i64) -> ServiceResult<()> {
        let result = self.db.delete_player(id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)?;
        self.players.retain(|p| p.id != id);
        Ok(())
    }

    pub fn toggle_player_status(&mut self, id: i64) -> ServiceResult<Player> {
        let Some(is_active) = self.players.iter().find(|p| p.id == id).map(|p| p.is_active) else {
            return self.last_error.record(
                SERVICE,
                Err(ServiceError::NotFound {
                    entity: "player",
                    id: id.to_string(),
                }),
            );
        };
        self.update_player(
            id,
            &PlayerUpdate {
                is_active: Some(!is_active),
                ..PlayerUpdate::default()
            },
        )
    }

    pub fn delete_players(&mut self, ids: &[i64]) -> ServiceResult<usize> {
        let result = self.db.delete_players(ids).map_err(ServiceError::from);
        let deleted = self.last_error.record(SERVICE, result)?;
        self.players.retain(|p| !ids.contains(&p.id));
        info!(requested = ids.len(), deleted, "bulk player delete");
        Ok(deleted)
    }

    /// Counts over every player row, fetched fresh.
    pub fn get_player_stats(&mut self) -> ServiceResult<PlayerStats> {
        let result = self.db.list_players(Scope::All).map_err(ServiceError::from);
        let players = self.last_error.record(SERVICE, result)?;
        Ok(PlayerStats::from_players(&players))
    }

    pub fn get_players_by_category(&mut self, category: &str) -> ServiceResult<Vec<Player>> {
        let result = self
            .db
            .list_players_by_category(category)
            .map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    pub fn get_unsold_players(&mut self) -> ServiceResult<Vec<Player>> {
        let result = self.db.list_unsold_players().map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    /// Parse a CSV player pool and insert every valid row in one
    /// transaction. Empty base prices take the configured default.
    pub fn import_csv<R: Read>(&mut self, rdr: R) -> ServiceResult<ImportSummary> {
        let result = import::parse_players(rdr, self.defaults.base_price)
            .map_err(ServiceError::from)
            .and_then(|pool| {
                let imported = self.db.insert_players(&pool.players)?;
                Ok(ImportSummary {
                    imported,
                    skipped: pool.skipped,
                })
            });
        let summary = self.last_error.record(SERVICE, result)?;

        info!(
            imported = summary.imported.len(),
            skipped = summary.skipped,
            "player pool imported"
        );
        for player in summary.imported.iter().rev() {
            self.players.insert(0, player.clone());
        }
        Ok(summary)
    }
}
