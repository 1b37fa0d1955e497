// Auction configuration, history, team-player assignments, and the
// multi-table steps of the sale loop.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use super::players::{fetch_player, set_status};
use super::rows::{
    self, ASSIGNMENT_COLUMNS, CONFIG_COLUMNS, HISTORY_COLUMNS, PLAYER_COLUMNS, TEAM_COLUMNS,
};
use super::teams::{charge_team, fetch_team, refund_team};
use super::{Database, DbError, DbResult};
use crate::changes::{ChangeKind, Table};
use crate::model::{
    AuctionConfig, AuctionConfigUpdate, AuctionStatus, ConfigStatus, HistoryEntry,
    HistoryStatus, NewAssignment, NewAuctionConfig, NewHistoryEntry, TeamPlayer,
};

/// Everything a completed sale wrote: the SOLD history row and the new
/// assignment, both joined with their player and team.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleRecord {
    pub history: HistoryEntry,
    pub assignment: TeamPlayer,
}

// ---------------------------------------------------------------------------
// auction_config
// ---------------------------------------------------------------------------

impl Database {
    /// The newest configuration row, if any exists.
    pub fn get_auction_config(&self) -> DbResult<Option<AuctionConfig>> {
        let conn = self.conn();
        let config = conn
            .query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM auction_config ORDER BY id DESC LIMIT 1"),
                [],
                rows::auction_config,
            )
            .optional()?;
        Ok(config)
    }

    /// The newest configuration that is still DRAFT or ACTIVE.
    pub fn get_current_auction(&self) -> DbResult<Option<AuctionConfig>> {
        let conn = self.conn();
        let config = conn
            .query_row(
                &format!(
                    "SELECT {CONFIG_COLUMNS} FROM auction_config
                     WHERE status IN ('DRAFT', 'ACTIVE')
                     ORDER BY id DESC LIMIT 1"
                ),
                [],
                rows::auction_config,
            )
            .optional()?;
        Ok(config)
    }

    pub fn insert_auction_config(&self, config: &NewAuctionConfig) -> DbResult<AuctionConfig> {
        if config.budget_cap < 0 {
            return Err(DbError::InvalidAmount {
                field: "budget_cap",
                value: config.budget_cap,
            });
        }
        let conn = self.conn();
        conn.execute(
            "INSERT INTO auction_config (name, description, budget_cap, max_players_per_team,
                                         min_players_per_team, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                config.name,
                config.description,
                config.budget_cap,
                config.max_players_per_team,
                config.min_players_per_team.unwrap_or(0),
                Utc::now(),
            ],
        )?;
        let created = fetch_config(&conn, conn.last_insert_rowid())?;
        drop(conn);

        info!(config_id = created.id, name = %created.name, "auction config created");
        self.publish(&[(Table::AuctionConfig, ChangeKind::Insert)]);
        Ok(created)
    }

    pub fn update_auction_config(
        &self,
        id: i64,
        update: &AuctionConfigUpdate,
    ) -> DbResult<AuctionConfig> {
        if let Some(cap) = update.budget_cap {
            if cap < 0 {
                return Err(DbError::InvalidAmount {
                    field: "budget_cap",
                    value: cap,
                });
            }
        }
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE auction_config SET
                name                    = COALESCE(?2, name),
                description             = COALESCE(?3, description),
                budget_cap              = COALESCE(?4, budget_cap),
                max_players_per_team    = COALESCE(?5, max_players_per_team),
                min_players_per_team    = COALESCE(?6, min_players_per_team),
                status                  = COALESCE(?7, status),
                current_player_id       = COALESCE(?8, current_player_id),
                current_player_position = COALESCE(?9, current_player_position),
                total_players           = COALESCE(?10, total_players),
                started_at              = COALESCE(?11, started_at),
                completed_at            = COALESCE(?12, completed_at),
                updated_at              = ?13
             WHERE id = ?1",
            params![
                id,
                update.name,
                update.description,
                update.budget_cap,
                update.max_players_per_team,
                update.min_players_per_team,
                update.status,
                update.current_player_id,
                update.current_player_position,
                update.total_players,
                update.started_at,
                update.completed_at,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(DbError::not_found(Table::AuctionConfig, id));
        }
        let updated = fetch_config(&conn, id)?;
        drop(conn);

        self.publish(&[(Table::AuctionConfig, ChangeKind::Update)]);
        Ok(updated)
    }

    pub fn delete_auction_config(&self, id: i64) -> DbResult<()> {
        let deleted = self
            .conn()
            .execute("DELETE FROM auction_config WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(DbError::not_found(Table::AuctionConfig, id));
        }
        self.publish(&[(Table::AuctionConfig, ChangeKind::Delete)]);
        Ok(())
    }
}

fn fetch_config(conn: &Connection, id: i64) -> DbResult<AuctionConfig> {
    conn.query_row(
        &format!("SELECT {CONFIG_COLUMNS} FROM auction_config WHERE id = ?1"),
        [id],
        rows::auction_config,
    )
    .optional()?
    .ok_or_else(|| DbError::not_found(Table::AuctionConfig, id))
}

// ---------------------------------------------------------------------------
// auction_history
// ---------------------------------------------------------------------------

fn history_select() -> String {
    format!(
        "SELECT {HISTORY_COLUMNS}, {PLAYER_COLUMNS}, {TEAM_COLUMNS}
         FROM auction_history h
         LEFT JOIN players p ON p.id = h.player_id
         LEFT JOIN teams t ON t.id = h.winning_team_id"
    )
}

impl Database {
    /// Every history row with its player and team, most recent first.
    pub fn list_history(&self) -> DbResult<Vec<HistoryEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY h.sold_at DESC, h.id DESC",
            history_select()
        ))?;
        let entries = stmt
            .query_map([], rows::history_joined)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Append a history row and return it joined with its player and team.
    pub fn insert_history(&self, entry: &NewHistoryEntry) -> DbResult<HistoryEntry> {
        let conn = self.conn();
        let id = insert_history_row(&conn, entry, Utc::now())?;
        let created = fetch_history(&conn, id)?;
        drop(conn);

        self.publish(&[(Table::AuctionHistory, ChangeKind::Insert)]);
        Ok(created)
    }

    /// Delete every history row. Returns how many were removed.
    pub fn clear_history(&self) -> DbResult<usize> {
        let deleted = self.conn().execute("DELETE FROM auction_history", [])?;
        warn!(rows = deleted, "auction history cleared");
        self.publish(&[(Table::AuctionHistory, ChangeKind::Delete)]);
        Ok(deleted)
    }
}

fn insert_history_row(
    conn: &Connection,
    entry: &NewHistoryEntry,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    if let Some(price) = entry.final_price {
        if price < 0 {
            return Err(DbError::InvalidAmount {
                field: "final_price",
                value: price,
            });
        }
    }
    conn.execute(
        "INSERT INTO auction_history (player_id, winning_team_id, final_price, auction_date,
                                      sold_at, auction_round, bidding_duration, notes, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.player_id,
            entry.winning_team_id,
            entry.final_price,
            entry.auction_date,
            now,
            entry.auction_round,
            entry.bidding_duration,
            entry.notes,
            entry.status,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn fetch_history(conn: &Connection, id: i64) -> DbResult<HistoryEntry> {
    conn.query_row(
        &format!("{} WHERE h.id = ?1", history_select()),
        [id],
        rows::history_joined,
    )
    .optional()?
    .ok_or_else(|| DbError::not_found(Table::AuctionHistory, id))
}

// ---------------------------------------------------------------------------
// team_players
// ---------------------------------------------------------------------------

fn assignment_select() -> String {
    format!(
        "SELECT {ASSIGNMENT_COLUMNS}, {TEAM_COLUMNS}, {PLAYER_COLUMNS}
         FROM team_players tp
         LEFT JOIN teams t ON t.id = tp.team_id
         LEFT JOIN players p ON p.id = tp.player_id"
    )
}

impl Database {
    /// Every assignment with its team and player, most recent first.
    pub fn list_team_players(&self) -> DbResult<Vec<TeamPlayer>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY tp.purchased_at DESC, tp.id DESC",
            assignment_select()
        ))?;
        let assignments = stmt
            .query_map([], rows::assignment_joined)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assignments)
    }

    /// One team's roster in purchase order.
    pub fn list_players_for_team(&self, team_id: i64) -> DbResult<Vec<TeamPlayer>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE tp.team_id = ?1 ORDER BY tp.purchased_at, tp.id",
            assignment_select()
        ))?;
        let assignments = stmt
            .query_map([team_id], rows::assignment_joined)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assignments)
    }

    /// Ids of every player that has been bought by some team.
    pub fn sold_player_ids(&self) -> DbResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT player_id FROM team_players ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Put a player on a team's roster, charging the team's budget. Rejects
    /// the purchase if it would break the team's cap or roster limit.
    pub fn assign_player(&self, assignment: &NewAssignment) -> DbResult<TeamPlayer> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = assign(&tx, assignment, Utc::now())?;
        let created = fetch_assignment(&tx, id)?;
        tx.commit()?;
        drop(conn);

        info!(
            team_id = assignment.team_id,
            player_id = assignment.player_id,
            price = assignment.purchase_price,
            "player assigned"
        );
        self.publish(&[
            (Table::TeamPlayers, ChangeKind::Insert),
            (Table::Teams, ChangeKind::Update),
        ]);
        Ok(created)
    }

    /// Delete an assignment and refund the team. Returns the removed row.
    pub fn remove_assignment(&self, assignment_id: i64) -> DbResult<TeamPlayer> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = unassign(&tx, assignment_id, Utc::now())?;
        tx.commit()?;
        drop(conn);

        info!(
            team_id = removed.team_id,
            player_id = removed.player_id,
            "assignment removed"
        );
        self.publish(&[
            (Table::TeamPlayers, ChangeKind::Delete),
            (Table::Teams, ChangeKind::Update),
        ]);
        Ok(removed)
    }

    /// Undo a purchase: refund the team and send the player back to the
    /// pool as PENDING. The SOLD history row is kept.
    pub fn sell_back_to_pool(&self, assignment_id: i64) -> DbResult<TeamPlayer> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = unassign(&tx, assignment_id, now)?;
        set_status(&tx, removed.player_id, AuctionStatus::Pending, now)?;
        tx.commit()?;
        drop(conn);

        info!(
            team_id = removed.team_id,
            player_id = removed.player_id,
            refunded = removed.purchase_price,
            "player sold back to pool"
        );
        self.publish(&[
            (Table::TeamPlayers, ChangeKind::Delete),
            (Table::Teams, ChangeKind::Update),
            (Table::Players, ChangeKind::Update),
        ]);
        Ok(removed)
    }
}

fn fetch_assignment(conn: &Connection, id: i64) -> DbResult<TeamPlayer> {
    conn.query_row(
        &format!("{} WHERE tp.id = ?1", assignment_select()),
        [id],
        rows::assignment_joined,
    )
    .optional()?
    .ok_or_else(|| DbError::not_found(Table::TeamPlayers, id))
}

/// Insert the join row and charge the team, after checking the team's cap
/// and roster limit.
fn assign(conn: &Connection, assignment: &NewAssignment, now: DateTime<Utc>) -> DbResult<i64> {
    let price = assignment.purchase_price;
    if price < 0 {
        return Err(DbError::InvalidAmount {
            field: "purchase_price",
            value: price,
        });
    }

    fetch_player(conn, assignment.player_id)?;
    let team = fetch_team(conn, assignment.team_id)?;

    let owner: Option<i64> = conn
        .query_row(
            "SELECT team_id FROM team_players WHERE player_id = ?1",
            [assignment.player_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(team_id) = owner {
        return Err(DbError::AlreadyAssigned {
            player_id: assignment.player_id,
            team_id,
        });
    }
    if !team.has_roster_space() {
        return Err(DbError::RosterFull {
            team_id: team.id,
            max_players: team.max_players,
        });
    }
    if team.budget_remaining() < price {
        return Err(DbError::BudgetExceeded {
            team_id: team.id,
            price,
            remaining: team.budget_remaining(),
        });
    }

    conn.execute(
        "INSERT INTO team_players (team_id, player_id, purchase_price, purchased_at,
                                   position_in_team)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            assignment.team_id,
            assignment.player_id,
            price,
            now,
            assignment.position_in_team,
        ],
    )?;
    let id = conn.last_insert_rowid();
    charge_team(conn, team.id, price, now)?;
    Ok(id)
}

/// Delete the join row and refund the team. Returns the row as it was.
fn unassign(conn: &Connection, assignment_id: i64, now: DateTime<Utc>) -> DbResult<TeamPlayer> {
    let removed = fetch_assignment(conn, assignment_id)?;
    refund_team(conn, removed.team_id, removed.purchase_price, now)?;
    conn.execute("DELETE FROM team_players WHERE id = ?1", [assignment_id])?;
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Sale loop steps
// ---------------------------------------------------------------------------

impl Database {
    /// Close a sale in one transaction: the player becomes SOLD, a SOLD
    /// history row is appended, and the player joins the team's roster.
    pub fn record_sale(
        &self,
        player_id: i64,
        team_id: i64,
        price: i64,
        notes: Option<&str>,
    ) -> DbResult<SaleRecord> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        set_status(&tx, player_id, AuctionStatus::Sold, now)?;
        let history_id = insert_history_row(
            &tx,
            &NewHistoryEntry {
                player_id,
                winning_team_id: Some(team_id),
                final_price: Some(price),
                auction_date: now.date_naive(),
                auction_round: None,
                bidding_duration: None,
                notes: notes.map(str::to_string),
                status: HistoryStatus::Sold,
            },
            now,
        )?;
        let assignment_id = assign(
            &tx,
            &NewAssignment {
                team_id,
                player_id,
                purchase_price: price,
                position_in_team: None,
            },
            now,
        )?;
        let record = SaleRecord {
            history: fetch_history(&tx, history_id)?,
            assignment: fetch_assignment(&tx, assignment_id)?,
        };
        tx.commit()?;
        drop(conn);

        info!(player_id, team_id, price, "sale recorded");
        self.publish(&[
            (Table::Players, ChangeKind::Update),
            (Table::AuctionHistory, ChangeKind::Insert),
            (Table::TeamPlayers, ChangeKind::Insert),
            (Table::Teams, ChangeKind::Update),
        ]);
        Ok(record)
    }

    /// Close a lot without a buyer: the player becomes UNSOLD and an UNSOLD
    /// history row at the player's base price is appended.
    pub fn record_no_sale(&self, player_id: i64, notes: Option<&str>) -> DbResult<HistoryEntry> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let player = fetch_player(&tx, player_id)?;
        set_status(&tx, player_id, AuctionStatus::Unsold, now)?;
        let history_id = insert_history_row(
            &tx,
            &NewHistoryEntry {
                player_id,
                winning_team_id: None,
                final_price: Some(player.base_price),
                auction_date: now.date_naive(),
                auction_round: None,
                bidding_duration: None,
                notes: notes.map(str::to_string),
                status: HistoryStatus::Unsold,
            },
            now,
        )?;
        let entry = fetch_history(&tx, history_id)?;
        tx.commit()?;
        drop(conn);

        info!(player_id, "no sale recorded");
        self.publish(&[
            (Table::Players, ChangeKind::Update),
            (Table::AuctionHistory, ChangeKind::Insert),
        ]);
        Ok(entry)
    }

    /// Put the whole auction back to its starting point in one transaction.
    ///
    /// The configuration returns to DRAFT with no current player or
    /// timestamps. Every player goes back to PENDING and unsold, history and
    /// assignments are deleted, and every team's budget and roster count
    /// drop to zero.
    pub fn reset_auction(&self, config_id: i64) -> DbResult<()> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE auction_config SET
                status = ?2, current_player_id = NULL, current_player_position = 0,
                started_at = NULL, completed_at = NULL, updated_at = ?3
             WHERE id = ?1",
            params![config_id, ConfigStatus::Draft, now],
        )?;
        if changed == 0 {
            return Err(DbError::not_found(Table::AuctionConfig, config_id));
        }
        tx.execute(
            "UPDATE players SET auction_status = 'PENDING', is_sold = 0, updated_at = ?1",
            params![now],
        )?;
        tx.execute("DELETE FROM auction_history", [])?;
        tx.execute("DELETE FROM team_players", [])?;
        tx.execute(
            "UPDATE teams SET budget_spent = 0, players_count = 0, updated_at = ?1",
            params![now],
        )?;
        tx.commit()?;
        drop(conn);

        warn!(config_id, "auction reset");
        self.publish(&[
            (Table::AuctionConfig, ChangeKind::Update),
            (Table::Players, ChangeKind::Update),
            (Table::AuctionHistory, ChangeKind::Delete),
            (Table::TeamPlayers, ChangeKind::Delete),
            (Table::Teams, ChangeKind::Update),
        ]);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
