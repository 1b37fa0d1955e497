// Team rosters: assigning, removing and selling players back.

use std::sync::Arc;

use gavel_core::db::Database;
use gavel_core::model::{NewAssignment, TeamPlayer};

use super::LastError;
use crate::error::{ServiceError, ServiceResult};

const SERVICE: &str = "team_players";

pub struct TeamPlayersService {
    db: Arc<Database>,
    team_players: Vec<TeamPlayer>,
    last_error: LastError,
}

impl TeamPlayersService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            team_players: Vec::new(),
            last_error: LastError::default(),
        }
    }

    pub fn team_players(&self) -> &[TeamPlayer] {
        &self.team_players
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.get()
    }

    pub fn clear_error(&mut self) {
        self.last_error.clear();
    }

    /// Every assignment joined with team and player, latest purchase first.
    pub fn get_team_players(&mut self) -> ServiceResult<Vec<TeamPlayer>> {
        let result = self.db.list_team_players().map_err(ServiceError::from);
        let rows = self.last_error.record(SERVICE, result)?;
        self.team_players = rows.clone();
        Ok(rows)
    }

    pub fn get_players_for_team(&mut self, team_id: i64) -> ServiceResult<Vec<TeamPlayer>> {
        let result = self
            .db
            .list_players_for_team(team_id)
            .map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    /// Add a player to a team's roster and charge the team.
    pub fn assign_player_to_team(&mut self, assignment: &NewAssignment) -> ServiceResult<TeamPlayer> {
        let result = self.db.assign_player(assignment).map_err(ServiceError::from);
        let created = self.last_error.record(SERVICE, result)?;
        self.team_players.insert(0, created.clone());
        Ok(created)
    }

    /// Drop an assignment and refund the team. The player's status is left
    /// alone.
    pub fn remove_player_from_team(&mut self, team_player_id: i64) -> ServiceResult<TeamPlayer> {
        let result = self
            .db
            .remove_assignment(team_player_id)
            .map_err(ServiceError::from);
        let removed = self.last_error.record(SERVICE, result)?;
        self.team_players.retain(|tp| tp.id != team_player_id);
        Ok(removed)
    }

    /// Undo a purchase: refund the team and put the player back in the pool
    /// as PENDING.
    pub fn sell_player_back_to_pool(&mut self, team_player_id: i64) -> ServiceResult<TeamPlayer> {
        let result = self
            .db
            .sell_back_to_pool(team_player_id)
            .map_err(ServiceError::from);
        let removed = self.last_error.record(SERVICE, result)?;
        self.team_players.retain(|tp| tp.id != team_player_id);
        Ok(removed)
    }

    /// Ids of every player on some team's roster.
    pub fn get_sold_players(&mut self) -> ServiceResult<Vec<i64>> {
        let result = self.db.sold_player_ids().map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }
}
