// Configuration loading and parsing (gavel.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{
    DEFAULT_BASE_PRICE, DEFAULT_MAX_PLAYERS, DEFAULT_PRIMARY_COLOR, DEFAULT_SECONDARY_COLOR,
    DEFAULT_TEAM_BUDGET_CAP,
};

/// Environment variable that overrides the base directory holding
/// `config/` and `defaults/`.
pub const HOME_ENV: &str = "GAVEL_HOME";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub auction: AuctionDefaults,
    pub identity: IdentityConfig,
    pub credentials: CredentialsConfig,
    pub ws_port: u16,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// gavel.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire gavel.toml file.
#[derive(Debug, Clone, Deserialize)]
struct GavelFile {
    auction: AuctionDefaults,
    server: ServerSection,
    database: DatabaseSection,
    identity: IdentityConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

/// Values applied when a new team, player or auction configuration leaves
/// a field out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuctionDefaults {
    /// Name given to the auction configuration created on first start.
    pub name: String,
    #[serde(default = "default_budget_cap")]
    pub team_budget_cap: i64,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default)]
    pub min_players: u32,
    #[serde(default = "default_base_price")]
    pub base_price: i64,
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    #[serde(default = "default_secondary_color")]
    pub secondary_color: String,
}

impl Default for AuctionDefaults {
    fn default() -> Self {
        Self {
            name: "Player Auction".into(),
            team_budget_cap: DEFAULT_TEAM_BUDGET_CAP,
            max_players: DEFAULT_MAX_PLAYERS,
            min_players: 0,
            base_price: DEFAULT_BASE_PRICE,
            primary_color: DEFAULT_PRIMARY_COLOR.into(),
            secondary_color: DEFAULT_SECONDARY_COLOR.into(),
        }
    }
}

fn default_budget_cap() -> i64 {
    DEFAULT_TEAM_BUDGET_CAP
}

fn default_max_players() -> u32 {
    DEFAULT_MAX_PLAYERS
}

fn default_base_price() -> i64 {
    DEFAULT_BASE_PRICE
}

fn default_primary_color() -> String {
    DEFAULT_PRIMARY_COLOR.into()
}

fn default_secondary_color() -> String {
    DEFAULT_SECONDARY_COLOR.into()
}

/// OAuth identity provider settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentityConfig {
    /// When false, sessions are resolved from the local users table only.
    #[serde(default)]
    pub enabled: bool,
    pub provider_url: String,
    /// Where the provider sends the browser after sign-in.
    pub redirect_url: String,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Emails that are made admins the first time they sign in.
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

fn default_provider() -> String {
    "google".into()
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub anon_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/gavel.toml` and (optionally)
/// `config/credentials.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- gavel.toml (required) ---
    let gavel_path = config_dir.join("gavel.toml");
    let gavel_text = read_file(&gavel_path)?;
    let gavel_file: GavelFile =
        toml::from_str(&gavel_text).map_err(|e| ConfigError::ParseError {
            path: gavel_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        auction: gavel_file.auction,
        identity: gavel_file.identity,
        credentials,
        ws_port: gavel_file.server.port,
        db_path: gavel_file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     set {HOME_ENV} or run from the project root",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };

        // Templates such as credentials.toml.example are for the operator.
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Pick the directory that holds `config/` and `defaults/`.
///
/// `GAVEL_HOME` wins when set. Otherwise the current directory is used if it
/// looks like a gavel home, then the platform config directory.
pub fn resolve_base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if cwd.join("config").is_dir() || cwd.join("defaults").is_dir() {
        return Ok(cwd);
    }

    match directories::ProjectDirs::from("", "", "gavel") {
        Some(dirs) => Ok(dirs.config_dir().to_path_buf()),
        None => Ok(cwd),
    }
}

/// Convenience wrapper: resolves the base directory, copies default config
/// files into place, and loads them.
pub fn load_config() -> Result<(PathBuf, Config), ConfigError> {
    let base_dir = resolve_base_dir()?;
    ensure_config_files(&base_dir)?;
    let config = load_config_from(&base_dir)?;
    Ok((base_dir, config))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.ws_port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    // Auction defaults
    let auction = &config.auction;
    if auction.team_budget_cap <= 0 {
        return Err(ConfigError::ValidationError {
            field: "auction.team_budget_cap".into(),
            message: format!("must be > 0, got {}", auction.team_budget_cap),
        });
    }
    if auction.max_players == 0 {
        return Err(ConfigError::ValidationError {
            field: "auction.max_players".into(),
            message: "must be > 0".into(),
        });
    }
    if auction.min_players > auction.max_players {
        return Err(ConfigError::ValidationError {
            field: "auction.min_players".into(),
            message: format!(
                "must not exceed max_players ({}), got {}",
                auction.max_players, auction.min_players
            ),
        });
    }
    if !(0..=auction.team_budget_cap).contains(&auction.base_price) {
        return Err(ConfigError::ValidationError {
            field: "auction.base_price".into(),
            message: format!(
                "must be between 0 and team_budget_cap inclusive, got {}",
                auction.base_price
            ),
        });
    }
    for (name, color) in [
        ("auction.primary_color", &auction.primary_color),
        ("auction.secondary_color", &auction.secondary_color),
    ] {
        if !is_hex_color(color) {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("must be a #rrggbb color, got {color:?}"),
            });
        }
    }

    // Identity
    let identity = &config.identity;
    if identity.enabled
        && !(identity.provider_url.starts_with("https://")
            || identity.provider_url.starts_with("http://"))
    {
        return Err(ConfigError::ValidationError {
            field: "identity.provider_url".into(),
            message: format!("must be an http(s) URL, got {:?}", identity.provider_url),
        });
    }
    if let Some(bad) = identity.admin_emails.iter().find(|e| !e.contains('@')) {
        return Err(ConfigError::ValidationError {
            field: "identity.admin_emails".into(),
            message: format!("not an email address: {bad:?}"),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Helper: the workspace root, where `defaults/` lives.
    fn project_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    /// Helper: a scratch base dir with an empty `config/`.
    fn scratch(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        tmp
    }

    fn default_gavel_toml() -> String {
        fs::read_to_string(project_root().join("defaults/gavel.toml")).unwrap()
    }

    fn expect_validation_field(base: &Path, expected: &str) {
        match load_config_from(base).unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected),
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn load_valid_config_from_defaults() {
        let tmp = scratch("gavel_config_defaults");
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults/gavel.toml"), default_gavel_toml()).unwrap();

        let copied = ensure_config_files(&tmp).unwrap();
        assert_eq!(copied, vec![tmp.join("config/gavel.toml")]);

        let config = load_config_from(&tmp).expect("should load default config");
        assert_eq!(config.ws_port, 9100);
        assert_eq!(config.db_path, "gavel.db");
        assert_eq!(config.auction.team_budget_cap, DEFAULT_TEAM_BUDGET_CAP);
        assert_eq!(config.auction.max_players, DEFAULT_MAX_PLAYERS);
        assert_eq!(config.auction.base_price, DEFAULT_BASE_PRICE);
        assert_eq!(config.auction.primary_color, DEFAULT_PRIMARY_COLOR);
        assert!(!config.identity.enabled);
        assert_eq!(config.identity.default_provider, "google");
        assert!(config.credentials.anon_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn shipped_template_warns_local_sign_in_has_no_credentials() {
        let template = default_gavel_toml();
        let config: GavelFile = toml::from_str(&template).unwrap();
        assert!(!config.identity.enabled);
        assert!(config.identity.admin_emails.is_empty());

        let identity_section = &template[template.find("[identity]").unwrap()..];
        assert!(identity_section.contains("NO credentials"));
    }

    #[test]
    fn ensure_config_files_keeps_existing_and_skips_examples() {
        let tmp = scratch("gavel_config_ensure");
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults/gavel.toml"), "default").unwrap();
        fs::write(tmp.join("defaults/credentials.toml.example"), "anon_key = \"x\"").unwrap();
        fs::write(tmp.join("config/gavel.toml"), "mine").unwrap();

        let copied = ensure_config_files(&tmp).unwrap();

        assert!(copied.is_empty());
        assert_eq!(fs::read_to_string(tmp.join("config/gavel.toml")).unwrap(), "mine");
        assert!(!tmp.join("config/credentials.toml.example").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_without_any_dirs_fails() {
        let tmp = std::env::temp_dir().join("gavel_config_nothing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        assert!(matches!(
            ensure_config_files(&tmp),
            Err(ConfigError::DefaultsCopyError { .. })
        ));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_gavel_toml_is_file_not_found() {
        let tmp = scratch("gavel_config_missing");
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::FileNotFound { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = scratch("gavel_config_malformed");
        fs::write(tmp.join("config/gavel.toml"), "[server\nport = ").unwrap();
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::ParseError { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_anon_key() {
        let tmp = scratch("gavel_config_creds");
        fs::write(tmp.join("config/gavel.toml"), default_gavel_toml()).unwrap();
        fs::write(
            tmp.join("config/credentials.toml"),
            "anon_key = \"public-anon-key\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.credentials.anon_key.as_deref(), Some("public-anon-key"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn omitted_auction_fields_use_builtin_defaults() {
        let tmp = scratch("gavel_config_sparse");
        fs::write(
            tmp.join("config/gavel.toml"),
            r#"
[auction]
name = "Sparse"

[server]
port = 9200

[database]
path = "sparse.db"

[identity]
provider_url = "https://id.example.com"
redirect_url = "http://localhost:9200/callback"
"#,
        )
        .unwrap();

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(
            config.auction,
            AuctionDefaults {
                name: "Sparse".into(),
                ..AuctionDefaults::default()
            }
        );
        assert!(config.identity.admin_emails.is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_port() {
        let tmp = scratch("gavel_config_port_zero");
        let text = default_gavel_toml().replace("port = 9100", "port = 0");
        fs::write(tmp.join("config/gavel.toml"), text).unwrap();
        expect_validation_field(&tmp, "server.port");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_base_price_above_cap() {
        let tmp = scratch("gavel_config_base_price");
        let text = default_gavel_toml().replace("base_price = 100000", "base_price = 99000000");
        fs::write(tmp.join("config/gavel.toml"), text).unwrap();
        expect_validation_field(&tmp, "auction.base_price");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_bad_color() {
        let tmp = scratch("gavel_config_color");
        let text = default_gavel_toml().replace("\"#1976d2\"", "\"blue\"");
        fs::write(tmp.join("config/gavel.toml"), text).unwrap();
        expect_validation_field(&tmp, "auction.primary_color");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_admin_email_without_at() {
        let tmp = scratch("gavel_config_admin_email");
        let text = default_gavel_toml().replace("admin_emails = []", "admin_emails = [\"root\"]");
        fs::write(tmp.join("config/gavel.toml"), text).unwrap();
        expect_validation_field(&tmp, "identity.admin_emails");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn enabled_identity_needs_http_url() {
        let tmp = scratch("gavel_config_identity_url");
        let text = default_gavel_toml()
            .replace("enabled = false", "enabled = true")
            .replace("provider_url = \"https://", "provider_url = \"ftp://");
        fs::write(tmp.join("config/gavel.toml"), text).unwrap();
        expect_validation_field(&tmp, "identity.provider_url");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn hex_color_check() {
        assert!(is_hex_color("#A0b1C2"));
        assert!(!is_hex_color("#12345"));
        assert!(!is_hex_color("123456#"));
        assert!(!is_hex_color("#12345g"));
    }
}
