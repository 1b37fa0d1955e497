// Error types for the auction loop and the table services.

use gavel_core::db::DbError;
use gavel_core::model::AuctionStatus;
use thiserror::Error;

use crate::import::ImportError;

/// Why an auction-loop command was refused or failed.
#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("no auction configuration found")]
    NoAuctionConfig,

    #[error("no player is currently up for auction")]
    NoCurrentPlayer,

    #[error("no players found; add players first")]
    NoPlayers,

    #[error("no active players found; activate some players first")]
    NoActivePlayers,

    #[error("player {0} is not in the active pool")]
    UnknownPlayer(i64),

    #[error("{name} cannot be put up for auction while {status}")]
    PlayerUnavailable { name: String, status: AuctionStatus },

    #[error("team {0} is not an active team")]
    UnknownTeam(i64),

    #[error("price {price} is below the base price of {base_price}")]
    BelowBasePrice { price: i64, base_price: i64 },

    #[error("{team} has {remaining} left and cannot pay {price}")]
    InsufficientBudget {
        team: String,
        price: i64,
        remaining: i64,
    },

    #[error("{team} already has a full roster")]
    RosterFull { team: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Failure of a table service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("you cannot change your own admin role")]
    SelfDemotion,

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
