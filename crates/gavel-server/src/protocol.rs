// JSON messages exchanged with desk clients over the WebSocket.
//
// Every message is an object with a `type` tag in SCREAMING_SNAKE_CASE.

use gavel_app::analytics::{HistorySort, HistoryStats, PlayerQuery, PlayerStats};
use gavel_app::services::UserStats;
use gavel_app::state::AuctionSnapshot;
use gavel_core::model::{
    AppUser, Event, EventType, EventUpdate, HistoryEntry, NewEvent, NewPlayer, NewTeam, Player,
    PlayerUpdate, Role, TeamUpdate,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Resume a provider session with its access token.
    Authenticate { access_token: String },
    /// Finish an OAuth redirect by trading the callback code for a session.
    ExchangeCode { code: String, code_verifier: String },
    /// Email sign-in. Without a password the desk checks its local users
    /// table, which only works while the identity provider is disabled.
    SignIn {
        email: String,
        #[serde(default)]
        password: Option<String>,
    },
    SignOut,
    ResetPassword { email: String },

    /// Ask for a fresh snapshot.
    Refresh,
    InitializeAuction,
    NextPlayer,
    SelectPlayer { player_id: i64 },
    SellPlayer {
        team_id: i64,
        price: i64,
        #[serde(default)]
        notes: Option<String>,
    },
    MarkUnsold,
    SkipPlayer,
    StartAuction,
    EndAuction,
    ResetAuction,
    SellBack { team_player_id: i64 },
    ClearHistory,
    /// Auction history sorted for the history screen.
    ListHistory {
        #[serde(default)]
        sort: HistorySort,
    },

    // Teams
    CreateTeam { team: NewTeam },
    UpdateTeam { team_id: i64, changes: TeamUpdate },
    ToggleTeam { team_id: i64 },
    DeleteTeams { team_ids: Vec<i64> },

    // Player pool
    QueryPlayers {
        #[serde(default)]
        query: PlayerQuery,
    },
    CreatePlayer { player: NewPlayer },
    UpdatePlayer { player_id: i64, changes: PlayerUpdate },
    TogglePlayer { player_id: i64 },
    DeletePlayers { player_ids: Vec<i64> },
    /// CSV text with a header row, as exported from a spreadsheet.
    ImportPlayers { csv: String },
    AddToAuction { player_ids: Vec<i64> },
    RemoveFromAuction { player_ids: Vec<i64> },

    // Users
    ListUsers {
        #[serde(default)]
        search: String,
    },
    UpdateUserRole { user_id: String, role: Role },

    // Calendar
    /// All events, or only one type, or the next `upcoming` scheduled ones.
    ListEvents {
        #[serde(default)]
        event_type: Option<EventType>,
        #[serde(default)]
        upcoming: Option<usize>,
    },
    CreateEvent { event: NewEvent },
    UpdateEvent { event_id: i64, changes: EventUpdate },
    DeleteEvent { event_id: i64 },

    Heartbeat {
        #[serde(default)]
        timestamp: Option<u64>,
    },
}

impl ClientMessage {
    /// Whether the command changes auction data and so needs the admin role.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ClientMessage::InitializeAuction
                | ClientMessage::NextPlayer
                | ClientMessage::SelectPlayer { .. }
                | ClientMessage::SellPlayer { .. }
                | ClientMessage::MarkUnsold
                | ClientMessage::SkipPlayer
                | ClientMessage::StartAuction
                | ClientMessage::EndAuction
                | ClientMessage::ResetAuction
                | ClientMessage::SellBack { .. }
                | ClientMessage::ClearHistory
                | ClientMessage::CreateTeam { .. }
                | ClientMessage::UpdateTeam { .. }
                | ClientMessage::ToggleTeam { .. }
                | ClientMessage::DeleteTeams { .. }
                | ClientMessage::CreatePlayer { .. }
                | ClientMessage::UpdatePlayer { .. }
                | ClientMessage::TogglePlayer { .. }
                | ClientMessage::DeletePlayers { .. }
                | ClientMessage::ImportPlayers { .. }
                | ClientMessage::AddToAuction { .. }
                | ClientMessage::RemoveFromAuction { .. }
                | ClientMessage::UpdateUserRole { .. }
                | ClientMessage::CreateEvent { .. }
                | ClientMessage::UpdateEvent { .. }
                | ClientMessage::DeleteEvent { .. }
        )
    }

    /// Whether only admins may send the command: every mutation, plus the
    /// user list.
    pub fn needs_admin(&self) -> bool {
        self.is_mutation() || matches!(self, ClientMessage::ListUsers { .. })
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Welcome {
        version: String,
    },
    Snapshot {
        snapshot: Box<AuctionSnapshot>,
    },
    /// Transient toast shown for a few seconds.
    Notification {
        level: NotificationLevel,
        text: String,
    },
    /// The client must sign in before the command can run. When an identity
    /// provider is configured, `authorize_url` starts its OAuth flow.
    AuthRequired {
        return_url: String,
        authorize_url: Option<String>,
    },
    SignedIn {
        email: String,
        role: Role,
    },
    SignedOut,
    Players {
        players: Vec<Player>,
        stats: PlayerStats,
    },
    History {
        entries: Vec<HistoryEntry>,
        stats: HistoryStats,
    },
    Users {
        users: Vec<AppUser>,
        stats: UserStats,
    },
    Events {
        events: Vec<Event>,
    },
}

impl ServerMessage {
    pub fn success(text: impl Into<String>) -> Self {
        ServerMessage::Notification {
            level: NotificationLevel::Success,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        ServerMessage::Notification {
            level: NotificationLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ServerMessage::Notification {
            level: NotificationLevel::Error,
            text: text.into(),
        }
    }

    pub fn snapshot(snapshot: AuctionSnapshot) -> Self {
        ServerMessage::Snapshot {
            snapshot: Box::new(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(msg: &ClientMessage) -> ClientMessage {
        let text = serde_json::to_string(msg).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn client_messages_use_screaming_tags() {
        let value = serde_json::to_value(ClientMessage::SellPlayer {
            team_id: 3,
            price: 250_000,
            notes: None,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "SELL_PLAYER", "team_id": 3, "price": 250000, "notes": null})
        );

        let unit = serde_json::to_value(ClientMessage::MarkUnsold).unwrap();
        assert_eq!(unit, json!({"type": "MARK_UNSOLD"}));
    }

    #[test]
    fn optional_fields_may_be_omitted() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"SELL_PLAYER","team_id":1,"price":500}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SellPlayer {
                team_id: 1,
                price: 500,
                notes: None
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"HEARTBEAT"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Heartbeat { timestamp: None });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"SIGN_IN","email":"desk@example.com"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SignIn {
                email: "desk@example.com".into(),
                password: None
            }
        );
    }

    #[test]
    fn every_client_message_round_trips() {
        let messages = [
            ClientMessage::Authenticate {
                access_token: "tok".into(),
            },
            ClientMessage::ExchangeCode {
                code: "c".into(),
                code_verifier: "v".into(),
            },
            ClientMessage::SignOut,
            ClientMessage::Refresh,
            ClientMessage::SelectPlayer { player_id: 9 },
            ClientMessage::SellBack { team_player_id: 4 },
            ClientMessage::ClearHistory,
        ];
        for msg in &messages {
            assert_eq!(&round_trip(msg), msg);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"DROP_TABLES"}"#).is_err());
    }

    #[test]
    fn mutations_are_flagged() {
        assert!(ClientMessage::ResetAuction.is_mutation());
        assert!(ClientMessage::SelectPlayer { player_id: 1 }.is_mutation());
        assert!(ClientMessage::ImportPlayers { csv: String::new() }.is_mutation());
        assert!(ClientMessage::DeleteEvent { event_id: 1 }.is_mutation());
        assert!(!ClientMessage::Refresh.is_mutation());
        assert!(!ClientMessage::SignOut.is_mutation());
        assert!(!ClientMessage::Heartbeat { timestamp: Some(1) }.is_mutation());
    }

    #[test]
    fn admin_commands_cover_mutations_and_user_list() {
        assert!(ClientMessage::ToggleTeam { team_id: 1 }.needs_admin());
        assert!(ClientMessage::ListUsers { search: String::new() }.needs_admin());
        assert!(!ClientMessage::Refresh.needs_admin());
        assert!(!ClientMessage::ListHistory { sort: HistorySort::Price }.needs_admin());
        assert!(!ClientMessage::QueryPlayers { query: PlayerQuery::default() }.needs_admin());
    }

    #[test]
    fn management_commands_parse_with_defaults() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"CREATE_TEAM","team":{"name":"Arrows","budget_cap":5000}}"#,
        )
        .unwrap();
        let ClientMessage::CreateTeam { team } = msg else {
            panic!("expected CREATE_TEAM");
        };
        assert_eq!(team.name, "Arrows");
        assert_eq!(team.budget_cap, Some(5000));
        assert_eq!(team.max_players, None);

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"LIST_EVENTS"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ListEvents {
                event_type: None,
                upcoming: None
            }
        );

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"UPDATE_USER_ROLE","user_id":"u-fan","role":"viewer"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::UpdateUserRole {
                user_id: "u-fan".into(),
                role: Role::Viewer
            }
        );
    }

    #[test]
    fn server_messages_serialize_with_tags() {
        let value = serde_json::to_value(ServerMessage::error("team 4 is not an active team")).unwrap();
        assert_eq!(
            value,
            json!({"type": "NOTIFICATION", "level": "error", "text": "team 4 is not an active team"})
        );

        let value = serde_json::to_value(ServerMessage::AuthRequired {
            return_url: "/auction".into(),
            authorize_url: None,
        })
        .unwrap();
        assert_eq!(value["type"], "AUTH_REQUIRED");
        assert_eq!(value["return_url"], "/auction");

        let value = serde_json::to_value(ServerMessage::SignedIn {
            email: "desk@example.com".into(),
            role: Role::Admin,
        })
        .unwrap();
        assert_eq!(value["role"], "admin");
    }
}
