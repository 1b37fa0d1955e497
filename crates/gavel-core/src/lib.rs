// Domain rows, the SQLite store, and configuration for the gavel auction desk.

pub mod changes;
pub mod config;
pub mod db;
pub mod model;
