// Auction desk application layer: the live auction state, table services,
// analytics and identity.

pub mod analytics;
pub mod error;
pub mod identity;
pub mod import;
pub mod services;
pub mod state;
pub mod version;
