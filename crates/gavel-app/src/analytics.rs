// Pure reducers over cached rows: team card bands, history and player
// statistics, player filtering, and Indian-style amount formatting.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use gavel_core::model::{HistoryEntry, HistoryStatus, Player, Team};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Team card
// ---------------------------------------------------------------------------

/// Usage band shown on a team card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
    Full,
}

/// Badge for a whole team: inactive teams first, otherwise the budget band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStatusLevel {
    Inactive,
    Budget(Level),
}

/// Share of the budget cap already spent, 0 when the cap is 0.
pub fn budget_percentage(team: &Team) -> f64 {
    if team.budget_cap == 0 {
        return 0.0;
    }
    team.budget_spent as f64 / team.budget_cap as f64 * 100.0
}

/// Share of roster slots already filled, 0 when the roster size is 0.
pub fn player_percentage(team: &Team) -> f64 {
    if team.max_players == 0 {
        return 0.0;
    }
    f64::from(team.players_count) / f64::from(team.max_players) * 100.0
}

pub fn budget_level(team: &Team) -> Level {
    let used = budget_percentage(team);
    if used > 80.0 {
        Level::High
    } else if used > 50.0 {
        Level::Medium
    } else {
        Level::Low
    }
}

pub fn roster_level(team: &Team) -> Level {
    let filled = player_percentage(team);
    if filled >= 100.0 {
        Level::Full
    } else if filled > 80.0 {
        Level::High
    } else {
        Level::Low
    }
}

pub fn team_status_level(team: &Team) -> TeamStatusLevel {
    if !team.is_active {
        return TeamStatusLevel::Inactive;
    }
    TeamStatusLevel::Budget(budget_level(team))
}

// ---------------------------------------------------------------------------
// Auction history
// ---------------------------------------------------------------------------

/// Totals shown above the auction history table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_transactions: usize,
    pub sold: usize,
    pub unsold: usize,
    pub total_revenue: i64,
    pub average_price: i64,
}

impl HistoryStats {
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let sales: Vec<&HistoryEntry> = entries.iter().filter(|e| e.is_sale()).collect();
        let unsold = entries
            .iter()
            .filter(|e| e.winning_team_id.is_none() || e.status == HistoryStatus::Unsold)
            .count();
        let total_revenue: i64 = sales.iter().filter_map(|e| e.final_price).sum();
        let average_price = if sales.is_empty() {
            0
        } else {
            total_revenue / sales.len() as i64
        };

        Self {
            total_transactions: entries.len(),
            sold: sales.len(),
            unsold,
            total_revenue,
            average_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySort {
    /// Player name, A to Z.
    Name,
    /// Highest final price first.
    Price,
    /// Most recent auction date first.
    #[default]
    Date,
}

fn history_player_name(entry: &HistoryEntry) -> String {
    entry
        .player
        .as_ref()
        .map(|p| p.name.to_lowercase())
        .unwrap_or_default()
}

pub fn sort_history(entries: &mut [HistoryEntry], by: HistorySort) {
    match by {
        HistorySort::Name => entries.sort_by_key(history_player_name),
        HistorySort::Price => {
            entries.sort_by(|a, b| b.final_price.unwrap_or(0).cmp(&a.final_price.unwrap_or(0)))
        }
        HistorySort::Date => entries.sort_by(|a, b| {
            b.auction_date
                .cmp(&a.auction_date)
                .then_with(|| b.sold_at.cmp(&a.sold_at))
        }),
    }
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Counts over the whole player table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerStats {
    pub total: usize,
    pub active: usize,
    pub sold: usize,
    pub unsold: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_position: BTreeMap<String, usize>,
}

impl PlayerStats {
    pub fn from_players(players: &[Player]) -> Self {
        let mut stats = PlayerStats {
            total: players.len(),
            ..PlayerStats::default()
        };
        for player in players {
            if player.is_active {
                stats.active += 1;
            }
            if player.is_sold {
                stats.sold += 1;
            } else {
                stats.unsold += 1;
            }
            *stats.by_category.entry(player.category.clone()).or_default() += 1;
            *stats.by_position.entry(player.position.clone()).or_default() += 1;
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSortField {
    #[default]
    Name,
    Position,
    Category,
    BasePrice,
    Age,
    ExperienceYears,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Clicking the column that is already sorted flips the direction.
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Filters and ordering for the player table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerQuery {
    /// Case-insensitive match on name, position, category or nationality.
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub sort_field: PlayerSortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl PlayerQuery {
    fn matches(&self, player: &Player, needle: &str) -> bool {
        let text_match = needle.is_empty()
            || player.name.to_lowercase().contains(needle)
            || player.position.to_lowercase().contains(needle)
            || player.category.to_lowercase().contains(needle)
            || player
                .nationality
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(needle));

        text_match
            && self.category.as_deref().map_or(true, |c| c.is_empty() || player.category == c)
            && self.position.as_deref().map_or(true, |p| p.is_empty() || player.position == p)
    }

    fn compare(&self, a: &Player, b: &Player) -> Ordering {
        let ordering = match self.sort_field {
            PlayerSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            PlayerSortField::Position => a.position.to_lowercase().cmp(&b.position.to_lowercase()),
            PlayerSortField::Category => a.category.to_lowercase().cmp(&b.category.to_lowercase()),
            PlayerSortField::BasePrice => a.base_price.cmp(&b.base_price),
            PlayerSortField::Age => a.age.cmp(&b.age),
            PlayerSortField::ExperienceYears => a.experience_years.cmp(&b.experience_years),
            PlayerSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Apply `query` to `players`, returning the matching rows in order.
pub fn filter_players(players: &[Player], query: &PlayerQuery) -> Vec<Player> {
    let needle = query.search.trim().to_lowercase();
    let mut matched: Vec<Player> = players
        .iter()
        .filter(|p| query.matches(p, &needle))
        .cloned()
        .collect();
    matched.sort_by(|a, b| query.compare(a, b));
    matched
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Group digits the Indian way: the last three, then pairs
/// (`1234567` becomes `12,34,567`).
pub fn format_amount(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{}", group_digits(amount.unsigned_abs()))
}

/// Rupee amount with no decimals, e.g. `₹1,00,000`.
pub fn format_currency(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}₹{}", group_digits(amount.unsigned_abs()))
}

fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{tail}", groups.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};
    use gavel_core::model::AuctionStatus;

    fn team(cap: i64, spent: i64, count: u32, max: u32) -> Team {
        let now = Utc::now();
        Team {
            id: 1,
            name: "Kestrels".into(),
            short_name: None,
            logo_url: None,
            primary_color: "#1976d2".into(),
            secondary_color: "#424242".into(),
            budget_cap: cap,
            budget_spent: spent,
            players_count: count,
            max_players: max,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn player(id: i64, name: &str, position: &str, category: &str, price: i64) -> Player {
        let now = Utc::now();
        Player {
            id,
            name: name.into(),
            position: position.into(),
            category: category.into(),
            subcategory: None,
            base_price: price,
            image_url: None,
            nationality: None,
            age: None,
            experience_years: None,
            stats: None,
            is_sold: false,
            is_active: true,
            auction_status: AuctionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(
        id: i64,
        name: &str,
        team: Option<i64>,
        price: i64,
        status: HistoryStatus,
        day: u32,
    ) -> HistoryEntry {
        HistoryEntry {
            id,
            player_id: id,
            winning_team_id: team,
            final_price: Some(price),
            auction_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            sold_at: Utc::now() + Duration::seconds(id),
            auction_round: None,
            bidding_duration: None,
            notes: None,
            status,
            player: Some(player(id, name, "Batsman", "Marquee", price)),
            team: None,
        }
    }

    #[test]
    fn percentages_handle_zero_denominators() {
        assert_eq!(budget_percentage(&team(0, 0, 0, 0)), 0.0);
        assert_eq!(player_percentage(&team(0, 0, 3, 0)), 0.0);
        assert_eq!(budget_percentage(&team(1_000, 250, 0, 25)), 25.0);
        assert_eq!(player_percentage(&team(1_000, 0, 5, 20)), 25.0);
    }

    #[test]
    fn budget_bands() {
        assert_eq!(budget_level(&team(100, 50, 0, 10)), Level::Low);
        assert_eq!(budget_level(&team(100, 51, 0, 10)), Level::Medium);
        assert_eq!(budget_level(&team(100, 80, 0, 10)), Level::Medium);
        assert_eq!(budget_level(&team(100, 81, 0, 10)), Level::High);
    }

    #[test]
    fn roster_bands() {
        assert_eq!(roster_level(&team(100, 0, 8, 10)), Level::Low);
        assert_eq!(roster_level(&team(100, 0, 9, 10)), Level::High);
        assert_eq!(roster_level(&team(100, 0, 10, 10)), Level::Full);
    }

    #[test]
    fn inactive_team_status_wins_over_budget() {
        let mut t = team(100, 90, 0, 10);
        assert_eq!(team_status_level(&t), TeamStatusLevel::Budget(Level::High));
        t.is_active = false;
        assert_eq!(team_status_level(&t), TeamStatusLevel::Inactive);
    }

    #[test]
    fn history_stats_counts_and_revenue() {
        let entries = vec![
            entry(1, "Asha", Some(1), 300, HistoryStatus::Sold, 1),
            entry(2, "Ben", Some(2), 500, HistoryStatus::Sold, 2),
            entry(3, "Cai", None, 100, HistoryStatus::Unsold, 3),
        ];
        let stats = HistoryStats::from_entries(&entries);

        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.sold, 2);
        assert_eq!(stats.unsold, 1);
        assert_eq!(stats.total_revenue, 800);
        assert_eq!(stats.average_price, 400);
    }

    #[test]
    fn history_stats_empty_has_zero_average() {
        assert_eq!(HistoryStats::from_entries(&[]), HistoryStats::default());
    }

    #[test]
    fn sort_history_orders() {
        let mut entries = vec![
            entry(1, "cai", Some(1), 300, HistoryStatus::Sold, 2),
            entry(2, "Asha", Some(1), 900, HistoryStatus::Sold, 1),
            entry(3, "Ben", None, 100, HistoryStatus::Unsold, 3),
        ];

        sort_history(&mut entries, HistorySort::Name);
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        sort_history(&mut entries, HistorySort::Price);
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        sort_history(&mut entries, HistorySort::Date);
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn player_stats_groups() {
        let mut sold = player(2, "Ben", "Bowler", "Overseas", 100);
        sold.is_sold = true;
        let mut inactive = player(3, "Cai", "Bowler", "Marquee", 100);
        inactive.is_active = false;
        let players = vec![player(1, "Asha", "Batsman", "Marquee", 100), sold, inactive];

        let stats = PlayerStats::from_players(&players);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.sold, 1);
        assert_eq!(stats.unsold, 2);
        assert_eq!(stats.by_category["Marquee"], 2);
        assert_eq!(stats.by_position["Bowler"], 2);
    }

    #[test]
    fn filter_players_searches_and_sorts() {
        let mut overseas = player(2, "Ben Cole", "Bowler", "Overseas", 300);
        overseas.nationality = Some("England".into());
        let players = vec![
            player(1, "Asha Rao", "Batsman", "Marquee", 200),
            overseas,
            player(3, "Cai Lin", "Bowler", "Marquee", 100),
        ];

        let by_nationality = filter_players(
            &players,
            &PlayerQuery {
                search: "ENG".into(),
                ..PlayerQuery::default()
            },
        );
        assert_eq!(by_nationality.len(), 1);
        assert_eq!(by_nationality[0].id, 2);

        let bowlers_by_price = filter_players(
            &players,
            &PlayerQuery {
                position: Some("Bowler".into()),
                sort_field: PlayerSortField::BasePrice,
                direction: SortDirection::Desc,
                ..PlayerQuery::default()
            },
        );
        let ids: Vec<i64> = bowlers_by_price.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3]);

        let marquee = filter_players(
            &players,
            &PlayerQuery {
                category: Some("Marquee".into()),
                ..PlayerQuery::default()
            },
        );
        let names: Vec<&str> = marquee.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Asha Rao", "Cai Lin"]);
    }

    #[test]
    fn indian_digit_grouping() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(999), "999");
        assert_eq!(format_amount(1_000), "1,000");
        assert_eq!(format_amount(100_000), "1,00,000");
        assert_eq!(format_amount(1_234_567), "12,34,567");
        assert_eq!(format_amount(10_000_000), "1,00,00,000");
        assert_eq!(format_amount(-1_234_567), "-12,34,567");
        assert_eq!(format_currency(250_000), "₹2,50,000");
        assert_eq!(format_currency(-500), "-₹500");
        assert_eq!(format_currency(i64::MIN), "-₹92,23,37,20,36,85,47,75,808");
        assert_eq!(format_amount(i64::MIN), "-92,23,37,20,36,85,47,75,808");
    }

    #[test]
    fn toggling_sort_direction() {
        assert_eq!(SortDirection::Asc.toggled(), SortDirection::Desc);
        assert_eq!(SortDirection::Desc.toggled(), SortDirection::Asc);
    }
}
