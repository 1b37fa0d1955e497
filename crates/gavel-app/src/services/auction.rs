// Auction configuration and history administration.

use std::sync::Arc;

use chrono::Utc;
use gavel_core::db::Database;
use gavel_core::model::{
    AuctionConfig, AuctionConfigUpdate, ConfigStatus, HistoryEntry, NewAuctionConfig,
    NewHistoryEntry,
};
use tracing::info;

use super::LastError;
use crate::error::{ServiceError, ServiceResult};

const SERVICE: &str = "auction";

pub struct AuctionService {
    db: Arc<Database>,
    config: Option<AuctionConfig>,
    history: Vec<HistoryEntry>,
    last_error: LastError,
}

impl AuctionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            config: None,
            history: Vec::new(),
            last_error: LastError::default(),
        }
    }

    pub fn config(&self) -> Option<&AuctionConfig> {
        self.config.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.get()
    }

    pub fn clear_error(&mut self) {
        self.last_error.clear();
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn get_auction_config(&mut self) -> ServiceResult<Option<AuctionConfig>> {
        let result = self.db.get_auction_config().map_err(ServiceError::from);
        let config = self.last_error.record(SERVICE, result)?;
        self.config = config.clone();
        Ok(config)
    }

    /// The newest configuration still in DRAFT or ACTIVE.
    pub fn get_current_auction(&mut self) -> ServiceResult<Option<AuctionConfig>> {
        let result = self.db.get_current_auction().map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)
    }

    pub fn create_auction_config(&mut self, config: &NewAuctionConfig) -> ServiceResult<AuctionConfig> {
        let result = self.db.insert_auction_config(config).map_err(ServiceError::from);
        let created = self.last_error.record(SERVICE, result)?;
        self.config = Some(created.clone());
        Ok(created)
    }

    pub fn update_auction_config(
        &mut self,
        id: i64,
        update: &AuctionConfigUpdate,
    ) -> ServiceResult<AuctionConfig> {
        let result = self
            .db
            .update_auction_config(id, update)
            .map_err(ServiceError::from);
        let updated = self.last_error.record(SERVICE, result)?;
        self.config = Some(updated.clone());
        Ok(updated)
    }

    pub fn delete_auction_config(&mut self, id: i64) -> ServiceResult<()> {
        let result = self.db.delete_auction_config(id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)?;
        if self.config.as_ref().is_some_and(|c| c.id == id) {
            self.config = None;
        }
        Ok(())
    }

    /// The newest configuration, or `NotFound` when none exists.
    fn require_config(&mut self) -> ServiceResult<AuctionConfig> {
        let result = self
            .db
            .get_auction_config()
            .map_err(ServiceError::from)
            .and_then(|config| {
                config.ok_or_else(|| ServiceError::NotFound {
                    entity: "auction config",
                    id: "latest".into(),
                })
            });
        self.last_error.record(SERVICE, result)
    }

    /// Mark the auction ACTIVE and stamp `started_at`, whatever its status.
    pub fn start_auction(&mut self) -> ServiceResult<AuctionConfig> {
        let config = self.require_config()?;
        let started = self.update_auction_config(
            config.id,
            &AuctionConfigUpdate {
                status: Some(ConfigStatus::Active),
                started_at: Some(Utc::now()),
                ..AuctionConfigUpdate::default()
            },
        )?;
        info!(config_id = started.id, "auction started");
        Ok(started)
    }

    /// Mark the auction COMPLETED and stamp `completed_at`.
    pub fn end_auction(&mut self) -> ServiceResult<AuctionConfig> {
        let config = self.require_config()?;
        let ended = self.update_auction_config(
            config.id,
            &AuctionConfigUpdate {
                status: Some(ConfigStatus::Completed),
                completed_at: Some(Utc::now()),
                ..AuctionConfigUpdate::default()
            },
        )?;
        info!(config_id = ended.id, "auction ended");
        Ok(ended)
    }

    /// Reset the newest configuration and everything sold under it.
    pub fn reset_auction(&mut self) -> ServiceResult<AuctionConfig> {
        let config = self.require_config()?;
        let result = self.db.reset_auction(config.id).map_err(ServiceError::from);
        self.last_error.record(SERVICE, result)?;
        self.history.clear();
        self.get_auction_config()?.ok_or_else(|| ServiceError::NotFound {
            entity: "auction config",
            id: config.id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    pub fn get_auction_history(&mut self) -> ServiceResult<Vec<HistoryEntry>> {
        let result = self.db.list_history().map_err(ServiceError::from);
        let history = self.last_error.record(SERVICE, result)?;
        self.history = history.clone();
        Ok(history)
    }

    pub fn add_history(&mut self, entry: &NewHistoryEntry) -> ServiceResult<HistoryEntry> {
        let result = self.db.insert_history(entry).map_err(ServiceError::from);
        let created = self.last_error.record(SERVICE, result)?;
        self.history.insert(0, created.clone());
        Ok(created)
    }

    pub fn clear_auction_history(&mut self) -> ServiceResult<usize> {
        let result = self.db.clear_history().map_err(ServiceError::from);
        let cleared = self.last_error.record(SERVICE, result)?;
        self.history.clear();
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::model::{AuctionStatus, HistoryStatus, NewPlayer, NewTeam};

    fn service() -> (Arc<Database>, AuctionService) {
        let db = Arc::new(Database::open(":memory:").expect("in-memory database should open"));
        (db.clone(), AuctionService::new(db))
    }

    fn new_config() -> NewAuctionConfig {
        NewAuctionConfig {
            name: "Season auction".into(),
            description: None,
            budget_cap: 10_000,
            max_players_per_team: 15,
            min_players_per_team: Some(11),
        }
    }

    #[test]
    fn start_and_end_stamp_timestamps() {
        let (_, mut auction) = service();
        let created = auction.create_auction_config(&new_config()).unwrap();
        assert_eq!(created.status, ConfigStatus::Draft);
        assert!(created.started_at.is_none());

        let started = auction.start_auction().unwrap();
        assert_eq!(started.status, ConfigStatus::Active);
        assert!(started.started_at.is_some());
        assert_eq!(auction.get_current_auction().unwrap().map(|c| c.id), Some(created.id));

        let ended = auction.end_auction().unwrap();
        assert_eq!(ended.status, ConfigStatus::Completed);
        assert!(ended.completed_at.is_some());
        assert!(auction.get_current_auction().unwrap().is_none());
    }

    #[test]
    fn start_without_config_is_not_found() {
        let (_, mut auction) = service();
        let err = auction.start_auction().unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert!(auction.last_error().is_some());
    }

    #[test]
    fn history_add_list_and_clear() {
        let (db, mut auction) = service();
        let player = db
            .insert_player(&NewPlayer {
                name: "Asha".into(),
                position: "Batsman".into(),
                category: "Marquee".into(),
                ..NewPlayer::default()
            })
            .unwrap();

        let entry = auction
            .add_history(&NewHistoryEntry {
                player_id: player.id,
                winning_team_id: None,
                final_price: Some(100),
                auction_date: Utc::now().date_naive(),
                auction_round: None,
                bidding_duration: None,
                notes: Some("passed in".into()),
                status: HistoryStatus::Unsold,
            })
            .unwrap();
        assert_eq!(entry.player.as_ref().map(|p| p.name.as_str()), Some("Asha"));
        assert_eq!(auction.get_auction_history().unwrap().len(), 1);

        assert_eq!(auction.clear_auction_history().unwrap(), 1);
        assert!(auction.history().is_empty());
        assert!(db.list_history().unwrap().is_empty());
    }

    #[test]
    fn reset_returns_config_to_draft() {
        let (db, mut auction) = service();
        auction.create_auction_config(&new_config()).unwrap();
        auction.start_auction().unwrap();
        let team = db
            .insert_team(&NewTeam {
                name: "Kestrels".into(),
                ..NewTeam::default()
            })
            .unwrap();
        let player = db
            .insert_player(&NewPlayer {
                name: "Asha".into(),
                position: "Batsman".into(),
                category: "Marquee".into(),
                base_price: Some(100),
                ..NewPlayer::default()
            })
            .unwrap();
        db.record_sale(player.id, team.id, 500, None).unwrap();

        let reset = auction.reset_auction().unwrap();
        assert_eq!(reset.status, ConfigStatus::Draft);
        assert!(reset.started_at.is_none());
        assert_eq!(db.get_team(team.id).unwrap().budget_spent, 0);
        assert_eq!(db.get_player(player.id).unwrap().auction_status, AuctionStatus::Pending);
    }

    #[test]
    fn delete_config_clears_cache() {
        let (_, mut auction) = service();
        let created = auction.create_auction_config(&new_config()).unwrap();
        auction.delete_auction_config(created.id).unwrap();
        assert!(auction.config().is_none());
        assert!(auction.get_auction_config().unwrap().is_none());
    }
}
