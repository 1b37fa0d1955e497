// Column lists and row mappers shared by the per-table modules.
//
// Joined queries select several column lists side by side, so every mapper
// takes the offset of its first column.

use rusqlite::Row;

use crate::model::{AppUser, AuctionConfig, Event, HistoryEntry, Player, Team, TeamPlayer};

/// Columns of `teams`, aliased `t`.
pub(crate) const TEAM_COLUMNS: &str = "t.id, t.name, t.short_name, t.logo_url, \
     t.primary_color, t.secondary_color, t.budget_cap, t.budget_spent, t.players_count, \
     t.max_players, t.is_active, t.created_at, t.updated_at";
pub(crate) const TEAM_COLUMN_COUNT: usize = 13;

/// Columns of `players`, aliased `p`.
pub(crate) const PLAYER_COLUMNS: &str = "p.id, p.name, p.position, p.category, \
     p.subcategory, p.base_price, p.image_url, p.nationality, p.age, p.experience_years, \
     p.stats, p.is_sold, p.is_active, p.auction_status, p.created_at, p.updated_at";
pub(crate) const PLAYER_COLUMN_COUNT: usize = 16;

pub(crate) const CONFIG_COLUMNS: &str = "id, name, description, budget_cap, \
     max_players_per_team, min_players_per_team, status, current_player_id, \
     current_player_position, total_players, created_at, updated_at, started_at, completed_at";

/// Columns of `auction_history`, aliased `h`.
pub(crate) const HISTORY_COLUMNS: &str = "h.id, h.player_id, h.winning_team_id, \
     h.final_price, h.auction_date, h.sold_at, h.auction_round, h.bidding_duration, \
     h.notes, h.status";
pub(crate) const HISTORY_COLUMN_COUNT: usize = 10;

/// Columns of `team_players`, aliased `tp`.
pub(crate) const ASSIGNMENT_COLUMNS: &str = "tp.id, tp.team_id, tp.player_id, \
     tp.purchase_price, tp.purchased_at, tp.position_in_team, tp.is_captain, tp.is_vice_captain";
pub(crate) const ASSIGNMENT_COLUMN_COUNT: usize = 8;

pub(crate) const USER_COLUMNS: &str = "user_id, email, role, provider, created_at, \
     last_sign_in_at, email_confirmed, role_updated_at";

pub(crate) const EVENT_COLUMNS: &str =
    "id, name, description, event_type, start_date, end_date, status, created_at, updated_at";

pub(crate) fn team_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(at)?,
        name: row.get(at + 1)?,
        short_name: row.get(at + 2)?,
        logo_url: row.get(at + 3)?,
        primary_color: row.get(at + 4)?,
        secondary_color: row.get(at + 5)?,
        budget_cap: row.get(at + 6)?,
        budget_spent: row.get(at + 7)?,
        players_count: row.get(at + 8)?,
        max_players: row.get(at + 9)?,
        is_active: row.get(at + 10)?,
        created_at: row.get(at + 11)?,
        updated_at: row.get(at + 12)?,
    })
}

pub(crate) fn team(row: &Row<'_>) -> rusqlite::Result<Team> {
    team_at(row, 0)
}

/// A LEFT JOINed team: absent when its id column is NULL.
pub(crate) fn optional_team_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Option<Team>> {
    match row.get::<_, Option<i64>>(at)? {
        Some(_) => team_at(row, at).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn player_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(at)?,
        name: row.get(at + 1)?,
        position: row.get(at + 2)?,
        category: row.get(at + 3)?,
        subcategory: row.get(at + 4)?,
        base_price: row.get(at + 5)?,
        image_url: row.get(at + 6)?,
        nationality: row.get(at + 7)?,
        age: row.get(at + 8)?,
        experience_years: row.get(at + 9)?,
        stats: row.get(at + 10)?,
        is_sold: row.get(at + 11)?,
        is_active: row.get(at + 12)?,
        auction_status: row.get(at + 13)?,
        created_at: row.get(at + 14)?,
        updated_at: row.get(at + 15)?,
    })
}

pub(crate) fn player(row: &Row<'_>) -> rusqlite::Result<Player> {
    player_at(row, 0)
}

pub(crate) fn optional_player_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Option<Player>> {
    match row.get::<_, Option<i64>>(at)? {
        Some(_) => player_at(row, at).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn auction_config(row: &Row<'_>) -> rusqlite::Result<AuctionConfig> {
    Ok(AuctionConfig {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        budget_cap: row.get(3)?,
        max_players_per_team: row.get(4)?,
        min_players_per_team: row.get(5)?,
        status: row.get(6)?,
        current_player_id: row.get(7)?,
        current_player_position: row.get(8)?,
        total_players: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        started_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

/// History columns followed by LEFT JOINed player and team columns.
pub(crate) fn history_joined(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let player_at = HISTORY_COLUMN_COUNT;
    let team_at = player_at + PLAYER_COLUMN_COUNT;
    Ok(HistoryEntry {
        id: row.get(0)?,
        player_id: row.get(1)?,
        winning_team_id: row.get(2)?,
        final_price: row.get(3)?,
        auction_date: row.get(4)?,
        sold_at: row.get(5)?,
        auction_round: row.get(6)?,
        bidding_duration: row.get(7)?,
        notes: row.get(8)?,
        status: row.get(9)?,
        player: optional_player_at(row, player_at)?,
        team: optional_team_at(row, team_at)?,
    })
}

/// Assignment columns followed by LEFT JOINed team and player columns.
pub(crate) fn assignment_joined(row: &Row<'_>) -> rusqlite::Result<TeamPlayer> {
    let team_at = ASSIGNMENT_COLUMN_COUNT;
    let player_at = team_at + TEAM_COLUMN_COUNT;
    Ok(TeamPlayer {
        id: row.get(0)?,
        team_id: row.get(1)?,
        player_id: row.get(2)?,
        purchase_price: row.get(3)?,
        purchased_at: row.get(4)?,
        position_in_team: row.get(5)?,
        is_captain: row.get(6)?,
        is_vice_captain: row.get(7)?,
        team: optional_team_at(row, team_at)?,
        player: optional_player_at(row, player_at)?,
    })
}

pub(crate) fn user(row: &Row<'_>) -> rusqlite::Result<AppUser> {
    Ok(AppUser {
        user_id: row.get(0)?,
        email: row.get(1)?,
        role: row.get(2)?,
        provider: row.get(3)?,
        created_at: row.get(4)?,
        last_sign_in_at: row.get(5)?,
        email_confirmed: row.get(6)?,
        role_updated_at: row.get(7)?,
    })
}

pub(crate) fn event(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        event_type: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
