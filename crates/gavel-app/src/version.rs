// Application version reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version and build flavour, stamped with the time it was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub environment: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub fn version() -> &'static str {
    VERSION
}

pub fn version_with_prefix() -> String {
    format!("v{VERSION}")
}

/// Major and minor only, e.g. `0.1`.
pub fn short_version() -> String {
    shorten(VERSION)
}

pub fn short_version_with_prefix() -> String {
    format!("v{}", short_version())
}

/// True for debug builds.
pub fn is_development() -> bool {
    cfg!(debug_assertions)
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION,
        environment: if is_development() {
            "development"
        } else {
            "production"
        },
        timestamp: Utc::now(),
    }
}

fn shorten(version: &str) -> String {
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{major}.{minor}"),
        _ => version.to_string(),
    }
}
