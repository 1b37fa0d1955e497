// Team management.

use std::sync::Arc;

use gavel_core::config::AuctionDefaults;
use gavel_core::db::{Database, Scope};
use gavel_core::model::{NewTeam, Team, TeamUpdate};
use tracing::info;

use super::LastError;
use crate::error::{ServiceError, ServiceResult};

const SERVICE: &str = "teams";

pub struct TeamsService {
    db: Arc<Database>,
    defaults: AuctionDefaults,
    teams: Vec<Team>,
    last_error: LastError,
}

impl TeamsService {
    pub fn new(db: Arc<Database>, defaults: AuctionDefaults) -> Self {
        Self {
            db,
            defaults,
            teams: Vec::new(),
            last_error: LastError::default(),
        }
    }

    /// Teams as of the last fetch, newest first.
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.get()
    }

    pub fn clear_error(&mut self) {
        self.last_error.clear();
    }

    pub fn get_teams(&mut self) -> ServiceResult<Vec<Team>> {
        let result = self.db.list_teams(Scope::All).map_err(ServiceError::from);
        let teams = self.last_error.record(SERVICE, result)?;
        self.teams = teams.clone();
        Ok(teams)
    }

    pub fn get_team_by_id(&mut self, id: i64) -> ServiceResult<Team> {
        let result = self.db.get_team(id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    /// Create a team. Colors, cap and roster size left out fall back to the
    /// configured auction defaults.
    pub fn create_team(&mut self, team: NewTeam) -> ServiceResult<Team> {
        let team = NewTeam {
            primary_color: team
                .primary_color
                .or_else(|| Some(self.defaults.primary_color.clone())),
            secondary_color: team
                .secondary_color
                .or_else(|| Some(self.defaults.secondary_color.clone())),
            budget_cap: team.budget_cap.or(Some(self.defaults.team_budget_cap)),
            max_players: team.max_players.or(Some(self.defaults.max_players)),
            ..team
        };
        let result = self.db.insert_team(&team).map_err(ServiceError::from);
        let created = self.last_error.record(SERVICE, result)?;
        self.teams.insert(0, created.clone());
        Ok(created)
    }

    pub fn update_team(&mut self, id: i64, update: &TeamUpdate) -> ServiceResult<Team> {
        let result = self.db.update_team(id, update).map_err(ServiceError::from);
        let updated = self.last_error.record(SERVICE, result)?;
        if let Some(cached) = self.teams.iter_mut().find(|t| t.id == id) {
            *cached = updated.clone();
        }
        Ok(updated)
    }

    pub fn delete_team(&mut self, id: i64) -> ServiceResult<()> {
        let result = self.db.delete_team(id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)?;
        self.teams.retain(|t| t.id != id);
        Ok(())
    }

    /// Flip a cached team between active and inactive.
    pub fn toggle_team_status(&mut self, id: i64) -> ServiceResult<Team> {
        let Some(is_active) = self.teams.iter().find(|t| t.id == id).map(|t| t.is_active) else {
            return self.last_error.record(
                SERVICE,
                Err(ServiceError::NotFound {
                    entity: "team",
                    id: id.to_string(),
                }),
            );
        };
        self.update_team(
            id,
            &TeamUpdate {
                is_active: Some(!is_active),
                ..TeamUpdate::default()
            },
        )
    }

    pub fn delete_teams(&mut self, ids: &[i64]) -> ServiceResult<usize> {
        let result = self.db.delete_teams(ids).map_err(ServiceError::from);
        let deleted = self.last_error.record(SERVICE, result)?;
        self.teams.retain(|t| !ids.contains(&t.id));
        info!(requested = ids.len(), deleted, "bulk team delete");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TeamsService {
        let db = Arc::new(Database::open(":memory:").expect("in-memory database should open"));
        let defaults = AuctionDefaults {
            team_budget_cap: 5_000,
            max_players: 11,
            primary_color: "#00aa00".into(),
            ..AuctionDefaults::default()
        };
        TeamsService::new(db, defaults)
    }

    fn named(name: &str) -> NewTeam {
        NewTeam {
            name: name.into(),
            ..NewTeam::default()
        }
    }

    #[test]
    fn create_team_uses_configured_defaults() {
        let mut teams = service();
        let created = teams.create_team(named("Kestrels")).unwrap();

        assert_eq!(created.budget_cap, 5_000);
        assert_eq!(created.max_players, 11);
        assert_eq!(created.primary_color, "#00aa00");
        assert_eq!(created.budget_spent, 0);
        assert_eq!(teams.teams().len(), 1);
    }

    #[test]
    fn explicit_values_win_over_defaults() {
        let mut teams = service();
        let created = teams
            .create_team(NewTeam {
                budget_cap: Some(9_000),
                ..named("Kestrels")
            })
            .unwrap();
        assert_eq!(created.budget_cap, 9_000);
    }

    #[test]
    fn toggle_status_round_trip() {
        let mut teams = service();
        let created = teams.create_team(named("Kestrels")).unwrap();

        let off = teams.toggle_team_status(created.id).unwrap();
        assert!(!off.is_active);
        assert!(!teams.teams()[0].is_active);

        let on = teams.toggle_team_status(created.id).unwrap();
        assert!(on.is_active);
    }

    #[test]
    fn toggle_uncached_team_is_not_found() {
        let mut teams = service();
        let err = teams.toggle_team_status(42).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "team", .. }));
        assert_eq!(teams.last_error(), Some("team 42 not found"));

        teams.clear_error();
        assert!(teams.last_error().is_none());
    }

    #[test]
    fn get_and_delete() {
        let mut teams = service();
        let a = teams.create_team(named("A")).unwrap();
        let b = teams.create_team(named("B")).unwrap();
        let c = teams.create_team(named("C")).unwrap();

        assert_eq!(teams.get_teams().unwrap().len(), 3);
        assert_eq!(teams.get_team_by_id(b.id).unwrap().name, "B");

        teams.delete_team(a.id).unwrap();
        assert_eq!(teams.delete_teams(&[b.id, c.id, 999]).unwrap(), 2);
        assert!(teams.teams().is_empty());
        assert!(teams.get_teams().unwrap().is_empty());
    }

    #[test]
    fn failures_set_last_error_and_success_clears_it() {
        let mut teams = service();
        assert!(teams.delete_team(7).is_err());
        assert!(teams.last_error().is_some());

        teams.get_teams().unwrap();
        assert!(teams.last_error().is_none());
    }
}
