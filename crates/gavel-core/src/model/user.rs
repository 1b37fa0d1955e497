// Application users and their roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ParseEnumError;

/// Access level mapped from a user's email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Viewer];

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "viewer" => Ok(Role::Viewer),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::User => "User",
            Role::Viewer => "Viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a user signed in. Unknown provider names are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Email,
    Github,
    #[serde(untagged)]
    Other(String),
}

impl Provider {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "google" => Provider::Google,
            "email" => Provider::Email,
            "github" => Provider::Github,
            _ => Provider::Other(s.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Provider::Google => "google",
            Provider::Email => "email",
            Provider::Github => "github",
            Provider::Other(name) => name,
        }
    }

    /// Display name for the provider.
    pub fn label(&self) -> &str {
        match self {
            Provider::Google => "Google",
            Provider::Email => "Email/Password",
            Provider::Github => "GitHub",
            Provider::Other(name) if name.is_empty() => "Unknown",
            Provider::Other(name) => name,
        }
    }
}

/// A user known to the auction desk together with their role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub provider: Provider,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub email_confirmed: bool,
    pub role_updated_at: DateTime<Utc>,
}

/// Fields supplied when a signed-in identity is first seen. `role` only
/// applies to new rows; an existing user keeps the role they have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppUser {
    pub user_id: String,
    pub email: String,
    pub provider: Provider,
    #[serde(default)]
    pub email_confirmed: bool,
    pub role: Role,
}
