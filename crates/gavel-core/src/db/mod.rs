// SQLite persistence layer: the relational backend behind the auction desk.
//
// Every table gets select/insert/update/delete operations. Operations that
// touch more than one table run inside a single transaction, and every
// committed mutation is announced on a broadcast channel so subscribers can
// re-fetch what changed.

mod auction;
mod events;
mod players;
mod rows;
mod teams;
mod users;

use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::changes::{ChangeKind, Table, TableChange};
use crate::model::{
    AuctionStatus, ConfigStatus, EventStatus, EventType, HistoryStatus, Provider, Role,
};

pub use auction::SaleRecord;

/// Capacity of the change notification channel. Receivers that fall further
/// behind than this get `RecvError::Lagged` and should reload everything.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{table} row {id} not found")]
    NotFound { table: Table, id: String },

    #[error("team {team_id} cannot spend {price}: only {remaining} of its budget remains")]
    BudgetExceeded {
        team_id: i64,
        price: i64,
        remaining: i64,
    },

    #[error("team {team_id} already has the maximum of {max_players} players")]
    RosterFull { team_id: i64, max_players: u32 },

    #[error("player {player_id} is already assigned to team {team_id}")]
    AlreadyAssigned { player_id: i64, team_id: i64 },

    #[error("invalid amount for `{field}`: {value}")]
    InvalidAmount { field: &'static str, value: i64 },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode JSON column: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn not_found(table: Table, id: impl ToString) -> Self {
        DbError::NotFound {
            table,
            id: id.to_string(),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Which rows a listing returns and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Every row, newest first.
    #[default]
    All,
    /// Only rows with `is_active = 1`, ordered by name.
    ActiveByName,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite-backed store for teams, players, the auction configuration,
/// history, assignments, users, and calendar events.
pub struct Database {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<TableChange>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> DbResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(SCHEMA)?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    /// Subscribe to committed table changes.
    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Announce committed changes. Having no subscribers is not an error.
    fn publish(&self, changes: &[(Table, ChangeKind)]) {
        for &(table, kind) in changes {
            let change = TableChange::new(table, kind);
            debug!(%change, "publishing table change");
            let _ = self.changes.send(change);
        }
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS teams (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        short_name      TEXT,
        logo_url        TEXT,
        primary_color   TEXT NOT NULL,
        secondary_color TEXT NOT NULL,
        budget_cap      INTEGER NOT NULL CHECK (budget_cap >= 0),
        budget_spent    INTEGER NOT NULL DEFAULT 0 CHECK (budget_spent >= 0),
        players_count   INTEGER NOT NULL DEFAULT 0 CHECK (players_count >= 0),
        max_players     INTEGER NOT NULL CHECK (max_players >= 0),
        is_active       INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        CHECK (budget_spent <= budget_cap),
        CHECK (players_count <= max_players)
    );

    CREATE TABLE IF NOT EXISTS players (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL,
        position         TEXT NOT NULL,
        category         TEXT NOT NULL,
        subcategory      TEXT,
        base_price       INTEGER NOT NULL CHECK (base_price >= 0),
        image_url        TEXT,
        nationality      TEXT,
        age              INTEGER,
        experience_years INTEGER,
        stats            TEXT,
        is_sold          INTEGER NOT NULL DEFAULT 0,
        is_active        INTEGER NOT NULL DEFAULT 1,
        auction_status   TEXT NOT NULL DEFAULT 'PENDING',
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_players_single_current
        ON players(auction_status) WHERE auction_status = 'CURRENT';

    CREATE TABLE IF NOT EXISTS auction_config (
        id                      INTEGER PRIMARY KEY AUTOINCREMENT,
        name                    TEXT NOT NULL,
        description             TEXT,
        budget_cap              INTEGER NOT NULL CHECK (budget_cap >= 0),
        max_players_per_team    INTEGER NOT NULL,
        min_players_per_team    INTEGER NOT NULL DEFAULT 0,
        status                  TEXT NOT NULL DEFAULT 'DRAFT',
        current_player_id       INTEGER REFERENCES players(id) ON DELETE SET NULL,
        current_player_position INTEGER NOT NULL DEFAULT 0,
        total_players           INTEGER NOT NULL DEFAULT 0,
        created_at              TEXT NOT NULL,
        updated_at              TEXT NOT NULL,
        started_at              TEXT,
        completed_at            TEXT
    );

    CREATE TABLE IF NOT EXISTS auction_history (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id        INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
        winning_team_id  INTEGER REFERENCES teams(id) ON DELETE SET NULL,
        final_price      INTEGER,
        auction_date     TEXT NOT NULL,
        sold_at          TEXT NOT NULL,
        auction_round    INTEGER,
        bidding_duration TEXT,
        notes            TEXT,
        status           TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_auction_history_sold_at ON auction_history(sold_at);

    CREATE TABLE IF NOT EXISTS team_players (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        team_id          INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
        player_id        INTEGER NOT NULL UNIQUE REFERENCES players(id) ON DELETE CASCADE,
        purchase_price   INTEGER NOT NULL CHECK (purchase_price >= 0),
        purchased_at     TEXT NOT NULL,
        position_in_team TEXT,
        is_captain       INTEGER NOT NULL DEFAULT 0,
        is_vice_captain  INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_team_players_team_id ON team_players(team_id);

    CREATE TABLE IF NOT EXISTS app_users (
        user_id         TEXT PRIMARY KEY,
        email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
        role            TEXT NOT NULL DEFAULT 'user',
        provider        TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        last_sign_in_at TEXT,
        email_confirmed INTEGER NOT NULL DEFAULT 0,
        role_updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS events (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        description TEXT,
        event_type  TEXT NOT NULL,
        start_date  TEXT NOT NULL,
        end_date    TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'scheduled',
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );
";

// ---------------------------------------------------------------------------
// Text enum columns
// ---------------------------------------------------------------------------

macro_rules! text_enum_column {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    let text = value.as_str()?;
                    <$ty>::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
                }
            }
        )*
    };
}

text_enum_column!(AuctionStatus, ConfigStatus, HistoryStatus, Role, EventType, EventStatus);

impl ToSql for Provider {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Provider {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(Provider::parse)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{NewPlayer, NewTeam};

    /// Helper: create a fresh in-memory database for each test.
    pub(crate) fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    pub(crate) fn new_team(name: &str, cap: i64, max_players: u32) -> NewTeam {
        NewTeam {
            name: name.to_string(),
            budget_cap: Some(cap),
            max_players: Some(max_players),
            ..NewTeam::default()
        }
    }

    pub(crate) fn new_player(name: &str, base_price: i64) -> NewPlayer {
        NewPlayer {
            name: name.to_string(),
            position: "Batsman".to_string(),
            category: "Marquee".to_string(),
            base_price: Some(base_price),
            ..NewPlayer::default()
        }
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "app_users",
            "auction_config",
            "auction_history",
            "events",
            "players",
            "team_players",
            "teams",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn open_is_idempotent_on_same_file() {
        let path = std::env::temp_dir().join("gavel_db_open_twice.db");
        let _ = std::fs::remove_file(&path);
        let path_str = path.to_str().unwrap();

        {
            let db = Database::open(path_str).unwrap();
            db.insert_team(&new_team("Kestrels", 1_000, 5)).unwrap();
        }
        let db = Database::open(path_str).unwrap();
        assert_eq!(db.list_teams(Scope::All).unwrap().len(), 1);

        drop(db);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_enum_text_is_a_conversion_error() {
        let db = test_db();
        let player = db.insert_player(&new_player("Asha", 100)).unwrap();
        db.conn()
            .execute(
                "UPDATE players SET auction_status = 'LIMBO' WHERE id = ?1",
                [player.id],
            )
            .unwrap();

        let err = db.get_player(player.id).unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
    }

    #[tokio::test]
    async fn mutations_are_published() {
        let db = test_db();
        let mut rx = db.subscribe();

        db.insert_team(&new_team("Kestrels", 1_000, 5)).unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change, TableChange::new(Table::Teams, ChangeKind::Insert));
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let db = test_db();
        db.insert_team(&new_team("Kestrels", 1_000, 5)).unwrap();
    }
}
