// Team rows and the budget bookkeeping shared with assignments.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::rows::{self, TEAM_COLUMNS};
use super::{Database, DbError, DbResult, Scope};
use crate::changes::{ChangeKind, Table};
use crate::model::{
    NewTeam, Team, TeamUpdate, DEFAULT_MAX_PLAYERS, DEFAULT_PRIMARY_COLOR,
    DEFAULT_SECONDARY_COLOR, DEFAULT_TEAM_BUDGET_CAP,
};

impl Database {
    /// List teams. `Scope::All` is newest first, `Scope::ActiveByName` is
    /// the auction-day roster.
    pub fn list_teams(&self, scope: Scope) -> DbResult<Vec<Team>> {
        let sql = match scope {
            Scope::All => format!(
                "SELECT {TEAM_COLUMNS} FROM teams t ORDER BY t.created_at DESC, t.id DESC"
            ),
            Scope::ActiveByName => format!(
                "SELECT {TEAM_COLUMNS} FROM teams t WHERE t.is_active = 1
                 ORDER BY t.name COLLATE NOCASE, t.id"
            ),
        };
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let teams = stmt
            .query_map([], rows::team)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    pub fn get_team(&self, id: i64) -> DbResult<Team> {
        fetch_team(&self.conn(), id)
    }

    /// Insert a team, filling colors, budget cap and roster size from the
    /// built-in defaults when the caller leaves them out.
    pub fn insert_team(&self, team: &NewTeam) -> DbResult<Team> {
        let budget_cap = team.budget_cap.unwrap_or(DEFAULT_TEAM_BUDGET_CAP);
        if budget_cap < 0 {
            return Err(DbError::InvalidAmount {
                field: "budget_cap",
                value: budget_cap,
            });
        }
        let now = Utc::now();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO teams (name, short_name, logo_url, primary_color, secondary_color,
                                budget_cap, max_players, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                team.name,
                team.short_name,
                team.logo_url,
                team.primary_color.as_deref().unwrap_or(DEFAULT_PRIMARY_COLOR),
                team.secondary_color
                    .as_deref()
                    .unwrap_or(DEFAULT_SECONDARY_COLOR),
                budget_cap,
                team.max_players.unwrap_or(DEFAULT_MAX_PLAYERS),
                now,
            ],
        )?;
        let created = fetch_team(&conn, conn.last_insert_rowid())?;
        drop(conn);

        info!(team_id = created.id, name = %created.name, "team created");
        self.publish(&[(Table::Teams, ChangeKind::Insert)]);
        Ok(created)
    }

    /// Apply the fields present in `update`. A cap or roster size below what
    /// the team has already used is rejected.
    pub fn update_team(&self, id: i64, update: &TeamUpdate) -> DbResult<Team> {
        let conn = self.conn();
        let current = fetch_team(&conn, id)?;

        if let Some(cap) = update.budget_cap {
            if cap < current.budget_spent {
                return Err(DbError::InvalidAmount {
                    field: "budget_cap",
                    value: cap,
                });
            }
        }
        if let Some(max) = update.max_players {
            if max < current.players_count {
                return Err(DbError::InvalidAmount {
                    field: "max_players",
                    value: i64::from(max),
                });
            }
        }

        conn.execute(
            "UPDATE teams SET
                name            = COALESCE(?2, name),
                short_name      = COALESCE(?3, short_name),
                logo_url        = COALESCE(?4, logo_url),
                primary_color   = COALESCE(?5, primary_color),
                secondary_color = COALESCE(?6, secondary_color),
                budget_cap      = COALESCE(?7, budget_cap),
                max_players     = COALESCE(?8, max_players),
                is_active       = COALESCE(?9, is_active),
                updated_at      = ?10
             WHERE id = ?1",
            params![
                id,
                update.name,
                update.short_name,
                update.logo_url,
                update.primary_color,
                update.secondary_color,
                update.budget_cap,
                update.max_players,
                update.is_active,
                Utc::now(),
            ],
        )?;
        let updated = fetch_team(&conn, id)?;
        drop(conn);

        self.publish(&[(Table::Teams, ChangeKind::Update)]);
        Ok(updated)
    }

    /// Delete a team. Its assignments cascade away without refunds and its
    /// history rows lose their winning team.
    pub fn delete_team(&self, id: i64) -> DbResult<()> {
        let deleted = self.conn().execute("DELETE FROM teams WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(DbError::not_found(Table::Teams, id));
        }

        info!(team_id = id, "team deleted");
        self.publish(&[
            (Table::Teams, ChangeKind::Delete),
            (Table::TeamPlayers, ChangeKind::Delete),
        ]);
        Ok(())
    }

    /// Delete many teams in one transaction. Ids that do not exist are
    /// skipped. Returns how many rows were deleted.
    pub fn delete_teams(&self, ids: &[i64]) -> DbResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM teams WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        drop(conn);

        info!(count = deleted, "teams deleted");
        if deleted > 0 {
            self.publish(&[
                (Table::Teams, ChangeKind::Delete),
                (Table::TeamPlayers, ChangeKind::Delete),
            ]);
        }
        Ok(deleted)
    }
}

pub(crate) fn fetch_team(conn: &Connection, id: i64) -> DbResult<Team> {
    conn.query_row(
        &format!("SELECT {TEAM_COLUMNS} FROM teams t WHERE t.id = ?1"),
        [id],
        rows::team,
    )
    .optional()?
    .ok_or_else(|| DbError::not_found(Table::Teams, id))
}

/// Give `price` back to a team and free one roster slot, never going below
/// zero.
pub(crate) fn refund_team(
    conn: &Connection,
    team_id: i64,
    price: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    conn.execute(
        "UPDATE teams SET
            budget_spent  = MAX(budget_spent - ?2, 0),
            players_count = MAX(players_count - 1, 0),
            updated_at    = ?3
         WHERE id = ?1",
        params![team_id, price, now],
    )?;
    Ok(())
}

/// Charge `price` to a team and take one roster slot.
pub(crate) fn charge_team(
    conn: &Connection,
    team_id: i64,
    price: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    conn.execute(
        "UPDATE teams SET
            budget_spent  = budget_spent + ?2,
            players_count = players_count + 1,
            updated_at    = ?3
         WHERE id = ?1",
        params![team_id, price, now],
    )?;
    Ok(())
}
