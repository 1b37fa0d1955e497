// Player pool import from CSV.
//
// Expected header: name,position,category[,subcategory,base_price,
// image_url,nationality,age,experience_years]. Extra columns are folded into
// the player's free-form `stats` object.

use std::io::Read;

use gavel_core::model::NewPlayer;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Players parsed from a CSV file plus the number of rows that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPool {
    pub players: Vec<NewPlayer>,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct RawPlayerRow {
    name: String,
    position: String,
    category: String,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    base_price: Option<i64>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    nationality: Option<String>,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    experience_years: Option<u32>,
}

/// Columns mapped onto player fields; any other column is a stat.
const PLAYER_COLUMNS: [&str; 9] = [
    "name",
    "position",
    "category",
    "subcategory",
    "base_price",
    "image_url",
    "nationality",
    "age",
    "experience_years",
];

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Turn a stats cell into a JSON number when it looks like one.
fn stat_value(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return n.into();
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => f.into(),
        _ => raw.into(),
    }
}

/// Parse a player pool. Malformed rows and rows missing a name, position or
/// category are skipped with a warning. `default_base_price` fills empty
/// base price cells.
pub fn parse_players<R: Read>(rdr: R, default_base_price: i64) -> Result<ParsedPool, ImportError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let headers = reader.headers()?.clone();
    let mut pool = ParsedPool::default();

    for (index, result) in reader.records().enumerate() {
        let line = index + 2;
        let parsed = result.and_then(|record| {
            let raw: RawPlayerRow = record.deserialize(Some(&headers))?;
            Ok((record, raw))
        });
        let (record, raw) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(line, "skipping malformed player row: {}", e);
                pool.skipped += 1;
                continue;
            }
        };

        let name = raw.name.trim().to_string();
        let position = raw.position.trim().to_string();
        let category = raw.category.trim().to_string();
        if name.is_empty() || position.is_empty() || category.is_empty() {
            warn!(line, "skipping player row without name, position or category");
            pool.skipped += 1;
            continue;
        }

        let base_price = raw.base_price.unwrap_or(default_base_price);
        if base_price < 0 {
            warn!(line, "skipping player '{}': negative base price {}", name, base_price);
            pool.skipped += 1;
            continue;
        }

        let stats: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .zip(record.iter())
            .filter(|(column, value)| !PLAYER_COLUMNS.contains(column) && !value.is_empty())
            .map(|(column, value)| (column.to_string(), stat_value(value)))
            .collect();

        pool.players.push(NewPlayer {
            name,
            position,
            category,
            subcategory: non_empty(raw.subcategory),
            base_price: Some(base_price),
            image_url: non_empty(raw.image_url),
            nationality: non_empty(raw.nationality),
            age: raw.age,
            experience_years: raw.experience_years,
            stats: (!stats.is_empty()).then(|| serde_json::Value::Object(stats)),
        });
    }

    if pool.players.is_empty() && pool.skipped > 0 {
        return Err(ImportError::Validation(format!(
            "player CSV produced zero valid rows ({} skipped)",
            pool.skipped
        )));
    }

    Ok(pool)
}
