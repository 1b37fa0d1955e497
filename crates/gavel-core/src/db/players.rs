// Player pool rows and their auction status transitions.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::rows::{self, PLAYER_COLUMNS};
use super::teams::refund_team;
use super::{Database, DbError, DbResult, Scope};
use crate::changes::{ChangeKind, Table};
use crate::model::{AuctionStatus, NewPlayer, Player, PlayerUpdate, DEFAULT_BASE_PRICE};

impl Database {
    pub fn list_players(&self, scope: Scope) -> DbResult<Vec<Player>> {
        let filter = match scope {
            Scope::All => "ORDER BY p.created_at DESC, p.id DESC",
            Scope::ActiveByName => "WHERE p.is_active = 1 ORDER BY p.name COLLATE NOCASE, p.id",
        };
        self.query_players(filter, params![])
    }

    pub fn get_player(&self, id: i64) -> DbResult<Player> {
        fetch_player(&self.conn(), id)
    }

    /// Active players in one category, by name.
    pub fn list_players_by_category(&self, category: &str) -> DbResult<Vec<Player>> {
        self.query_players(
            "WHERE p.is_active = 1 AND p.category = ?1 ORDER BY p.name COLLATE NOCASE, p.id",
            [category],
        )
    }

    /// Active players nobody has bought yet, by name.
    pub fn list_unsold_players(&self) -> DbResult<Vec<Player>> {
        self.query_players(
            "WHERE p.is_active = 1 AND p.is_sold = 0 ORDER BY p.name COLLATE NOCASE, p.id",
            params![],
        )
    }

    fn query_players<P: rusqlite::Params>(&self, tail: &str, params: P) -> DbResult<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {PLAYER_COLUMNS} FROM players p {tail}"))?;
        let players = stmt
            .query_map(params, rows::player)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    pub fn insert_player(&self, player: &NewPlayer) -> DbResult<Player> {
        let conn = self.conn();
        let id = insert_player_row(&conn, player, Utc::now())?;
        let created = fetch_player(&conn, id)?;
        drop(conn);

        debug!(player_id = id, name = %created.name, "player created");
        self.publish(&[(Table::Players, ChangeKind::Insert)]);
        Ok(created)
    }

    /// Insert a batch of players in one transaction. Either every row lands
    /// or none does.
    pub fn insert_players(&self, players: &[NewPlayer]) -> DbResult<Vec<Player>> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut created = Vec::with_capacity(players.len());
        for player in players {
            let id = insert_player_row(&tx, player, now)?;
            created.push(fetch_player(&tx, id)?);
        }
        tx.commit()?;
        drop(conn);

        info!(count = created.len(), "players imported");
        if !created.is_empty() {
            self.publish(&[(Table::Players, ChangeKind::Insert)]);
        }
        Ok(created)
    }

    pub fn update_player(&self, id: i64, update: &PlayerUpdate) -> DbResult<Player> {
        if let Some(price) = update.base_price {
            if price < 0 {
                return Err(DbError::InvalidAmount {
                    field: "base_price",
                    value: price,
                });
            }
        }
        let stats = update
            .stats
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE players SET
                name             = COALESCE(?2, name),
                position         = COALESCE(?3, position),
                category         = COALESCE(?4, category),
                subcategory      = COALESCE(?5, subcategory),
                base_price       = COALESCE(?6, base_price),
                image_url        = COALESCE(?7, image_url),
                nationality      = COALESCE(?8, nationality),
                age              = COALESCE(?9, age),
                experience_years = COALESCE(?10, experience_years),
                stats            = COALESCE(?11, stats),
                is_sold          = COALESCE(?12, is_sold),
                is_active        = COALESCE(?13, is_active),
                updated_at       = ?14
             WHERE id = ?1",
            params![
                id,
                update.name,
                update.position,
                update.category,
                update.subcategory,
                update.base_price,
                update.image_url,
                update.nationality,
                update.age,
                update.experience_years,
                stats,
                update.is_sold,
                update.is_active,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(DbError::not_found(Table::Players, id));
        }
        let updated = fetch_player(&conn, id)?;
        drop(conn);

        self.publish(&[(Table::Players, ChangeKind::Update)]);
        Ok(updated)
    }

    /// Delete a player. If a team bought them, the team gets the purchase
    /// price and roster slot back before the assignment cascades away.
    pub fn delete_player(&self, id: i64) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let refunded = match remove_player_row(&tx, id, Utc::now())? {
            Some(refunded) => refunded,
            None => return Err(DbError::not_found(Table::Players, id)),
        };
        tx.commit()?;
        drop(conn);

        info!(player_id = id, refunded, "player deleted");
        self.publish_player_removal(refunded);
        Ok(())
    }

    /// Delete many players in one transaction, refunding buyers. Ids that do
    /// not exist are skipped. Returns how many rows were deleted.
    pub fn delete_players(&self, ids: &[i64]) -> DbResult<usize> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        let mut any_refund = false;
        for &id in ids {
            if let Some(refunded) = remove_player_row(&tx, id, now)? {
                deleted += 1;
                any_refund |= refunded;
            }
        }
        tx.commit()?;
        drop(conn);

        info!(count = deleted, "players deleted");
        if deleted > 0 {
            self.publish_player_removal(any_refund);
        }
        Ok(deleted)
    }

    fn publish_player_removal(&self, refunded: bool) {
        let mut changes = vec![
            (Table::Players, ChangeKind::Delete),
            (Table::AuctionHistory, ChangeKind::Delete),
        ];
        if refunded {
            changes.push((Table::TeamPlayers, ChangeKind::Delete));
            changes.push((Table::Teams, ChangeKind::Update));
        }
        self.publish(&changes);
    }

    /// Set one player's auction status. `is_sold` follows the status, and
    /// making a player CURRENT returns whoever was CURRENT to PENDING.
    pub fn set_auction_status(&self, id: i64, status: AuctionStatus) -> DbResult<Player> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        set_status(&tx, id, status, Utc::now())?;
        let player = fetch_player(&tx, id)?;
        tx.commit()?;
        drop(conn);

        self.publish(&[(Table::Players, ChangeKind::Update)]);
        Ok(player)
    }

    /// Set the status of many players at once. Only `auction_status`
    /// changes; `is_sold` is left alone. Returns the number of rows touched.
    pub fn set_auction_status_many(&self, ids: &[i64], status: AuctionStatus) -> DbResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if status == AuctionStatus::Current {
            demote_current(&tx, now)?;
        }
        let mut touched = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE players SET auction_status = ?2, updated_at = ?3 WHERE id = ?1",
            )?;
            for id in ids {
                touched += stmt.execute(params![id, status, now])?;
            }
        }
        tx.commit()?;
        drop(conn);

        debug!(count = touched, %status, "bulk auction status update");
        self.publish(&[(Table::Players, ChangeKind::Update)]);
        Ok(touched)
    }
}

pub(crate) fn fetch_player(conn: &Connection, id: i64) -> DbResult<Player> {
    conn.query_row(
        &format!("SELECT {PLAYER_COLUMNS} FROM players p WHERE p.id = ?1"),
        [id],
        rows::player,
    )
    .optional()?
    .ok_or_else(|| DbError::not_found(Table::Players, id))
}

fn insert_player_row(conn: &Connection, player: &NewPlayer, now: DateTime<Utc>) -> DbResult<i64> {
    let base_price = player.base_price.unwrap_or(DEFAULT_BASE_PRICE);
    if base_price < 0 {
        return Err(DbError::InvalidAmount {
            field: "base_price",
            value: base_price,
        });
    }
    let stats = player
        .stats
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO players (name, position, category, subcategory, base_price, image_url,
                              nationality, age, experience_years, stats, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            player.name,
            player.position,
            player.category,
            player.subcategory,
            base_price,
            player.image_url,
            player.nationality,
            player.age,
            player.experience_years,
            stats,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Refund the buying team, if any, then delete the player row. Returns
/// `None` when the player does not exist, otherwise whether a refund was
/// made.
fn remove_player_row(conn: &Connection, id: i64, now: DateTime<Utc>) -> DbResult<Option<bool>> {
    let purchase: Option<(i64, i64)> = conn
        .query_row(
            "SELECT team_id, purchase_price FROM team_players WHERE player_id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((team_id, price)) = purchase {
        refund_team(conn, team_id, price, now)?;
    }
    let deleted = conn.execute("DELETE FROM players WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Ok(None);
    }
    Ok(Some(purchase.is_some()))
}

/// Return any CURRENT player to PENDING.
fn demote_current(conn: &Connection, now: DateTime<Utc>) -> DbResult<()> {
    conn.execute(
        "UPDATE players SET auction_status = 'PENDING', updated_at = ?1
         WHERE auction_status = 'CURRENT'",
        params![now],
    )?;
    Ok(())
}

pub(crate) fn set_status(
    conn: &Connection,
    id: i64,
    status: AuctionStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    if status == AuctionStatus::Current {
        demote_current(conn, now)?;
    }
    let changed = conn.execute(
        "UPDATE players SET auction_status = ?2, is_sold = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, status, status == AuctionStatus::Sold, now],
    )?;
    if changed == 0 {
        return Err(DbError::not_found(Table::Players, id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{new_player, new_team, test_db};
    use crate::model::NewAssignment;

    #[test]
    fn insert_player_applies_default_base_price() {
        let db = test_db();
        let player = db
            .insert_player(&NewPlayer {
                name: "Ravi".into(),
                position: "Bowler".into(),
                category: "Uncapped".into(),
                ..NewPlayer::default()
            })
            .unwrap();

        assert_eq!(player.base_price, DEFAULT_BASE_PRICE);
        assert_eq!(player.auction_status, AuctionStatus::Pending);
        assert!(!player.is_sold);
        assert!(player.is_active);
        assert!(player.stats.is_none());
    }

    #[test]
    fn stats_round_trip_as_json() {
        let db = test_db();
        let mut new = new_player("Ravi", 100);
        new.stats = Some(serde_json::json!({ "matches": 42, "strike_rate": 131.5 }));

        let player = db.insert_player(&new).unwrap();
        let loaded = db.get_player(player.id).unwrap();

        assert_eq!(loaded.stats, new.stats);
    }

    #[test]
    fn insert_players_is_all_or_nothing() {
        let db = test_db();
        let batch = vec![new_player("Ok", 100), new_player("Bad", -5)];

        assert!(db.insert_players(&batch).is_err());
        assert!(db.list_players(Scope::All).unwrap().is_empty());
    }

    #[test]
    fn category_and_unsold_listings() {
        let db = test_db();
        let a = db.insert_player(&new_player("Bala", 100)).unwrap();
        let mut other = new_player("Chetan", 100);
        other.category = "Uncapped".into();
        db.insert_player(&other).unwrap();
        db.insert_player(&new_player("Arun", 100)).unwrap();
        db.set_auction_status(a.id, AuctionStatus::Sold).unwrap();

        let marquee: Vec<String> = db
            .list_players_by_category("Marquee")
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(marquee, vec!["Arun", "Bala"]);

        let unsold: Vec<String> = db
            .list_unsold_players()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(unsold, vec!["Arun", "Chetan"]);
    }

    #[test]
    fn update_player_rejects_negative_price() {
        let db = test_db();
        let p = db.insert_player(&new_player("Ravi", 100)).unwrap();
        let err = db
            .update_player(
                p.id,
                &PlayerUpdate {
                    base_price: Some(-1),
                    ..PlayerUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidAmount { .. }));
    }

    #[test]
    fn set_current_demotes_previous_current() {
        let db = test_db();
        let a = db.insert_player(&new_player("A", 100)).unwrap();
        let b = db.insert_player(&new_player("B", 100)).unwrap();

        db.set_auction_status(a.id, AuctionStatus::Current).unwrap();
        db.set_auction_status(b.id, AuctionStatus::Current).unwrap();

        assert_eq!(db.get_player(a.id).unwrap().auction_status, AuctionStatus::Pending);
        assert_eq!(db.get_player(b.id).unwrap().auction_status, AuctionStatus::Current);
    }

    #[test]
    fn index_rejects_second_current_written_directly() {
        let db = test_db();
        let a = db.insert_player(&new_player("A", 100)).unwrap();
        let b = db.insert_player(&new_player("B", 100)).unwrap();
        db.set_auction_status(a.id, AuctionStatus::Current).unwrap();

        let result = db.conn().execute(
            "UPDATE players SET auction_status = 'CURRENT' WHERE id = ?1",
            [b.id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn set_status_tracks_is_sold() {
        let db = test_db();
        let p = db.insert_player(&new_player("A", 100)).unwrap();

        assert!(db.set_auction_status(p.id, AuctionStatus::Sold).unwrap().is_sold);
        assert!(!db.set_auction_status(p.id, AuctionStatus::Pending).unwrap().is_sold);
    }

    #[test]
    fn set_status_many_leaves_is_sold_alone() {
        let db = test_db();
        let a = db.insert_player(&new_player("A", 100)).unwrap();
        let b = db.insert_player(&new_player("B", 100)).unwrap();
        db.set_auction_status(a.id, AuctionStatus::Sold).unwrap();

        let touched = db
            .set_auction_status_many(&[a.id, b.id, 999], AuctionStatus::Inactive)
            .unwrap();

        assert_eq!(touched, 2);
        let a = db.get_player(a.id).unwrap();
        assert_eq!(a.auction_status, AuctionStatus::Inactive);
        assert!(a.is_sold);
    }

    #[test]
    fn delete_player_refunds_buying_team() {
        let db = test_db();
        let team = db.insert_team(&new_team("Kestrels", 1_000, 5)).unwrap();
        let p = db.insert_player(&new_player("A", 100)).unwrap();
        db.assign_player(&NewAssignment {
            team_id: team.id,
            player_id: p.id,
            purchase_price: 400,
            position_in_team: None,
        })
        .unwrap();

        db.delete_player(p.id).unwrap();

        let team = db.get_team(team.id).unwrap();
        assert_eq!(team.budget_spent, 0);
        assert_eq!(team.players_count, 0);
        assert!(db.list_team_players().unwrap().is_empty());
    }

    #[test]
    fn delete_players_skips_missing_ids() {
        let db = test_db();
        let a = db.insert_player(&new_player("A", 100)).unwrap();
        let b = db.insert_player(&new_player("B", 100)).unwrap();
        db.insert_player(&new_player("C", 100)).unwrap();

        assert_eq!(db.delete_players(&[a.id, b.id, 404]).unwrap(), 2);
        assert_eq!(db.list_players(Scope::All).unwrap().len(), 1);
    }

    #[test]
    fn delete_missing_player_changes_nothing() {
        let db = test_db();
        assert!(matches!(db.delete_player(42), Err(DbError::NotFound { .. })));
    }
}
