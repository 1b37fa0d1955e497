// Application event loop: turns client commands into auction operations and
// keeps every signed-in client's snapshot current.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use gavel_app::analytics::{
    filter_players, format_currency, sort_history, HistoryStats,
};
use gavel_app::error::{AuctionError, ServiceError};
use gavel_app::identity::{
    self, require_admin, require_authenticated, AuthSession, Guard, IdentityError,
    IdentityProvider, Session,
};
use gavel_app::services::users::role_label;
use gavel_app::services::{
    AuctionService, EventsService, PlayersService, TeamPlayersService, TeamsService, UsersService,
};
use gavel_app::state::{AuctionState, SellOrder};
use gavel_app::version;
use gavel_core::changes::TableChange;
use gavel_core::config::{AuctionDefaults, IdentityConfig};
use gavel_core::db::Database;
use gavel_core::model::NewAuctionConfig;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::ws_server::{ClientId, Outbound, WsEvent};

/// Page a client is sent back to after signing in for a viewing command.
const VIEW_RETURN_URL: &str = "/dashboard";
/// Page a client is sent back to after signing in for a control command.
const CONTROL_RETURN_URL: &str = "/auction";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a client command failed. Shown to the client as an error toast.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Auction(#[from] AuctionError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("{0}")]
    Rejected(String),
}

type CommandResult = Result<ServerMessage, CommandError>;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClientSession {
    session: Option<Session>,
    access_token: Option<String>,
}

/// Everything the event loop owns.
pub struct AppState {
    db: Arc<Database>,
    auction_state: AuctionState,
    auction: AuctionService,
    rosters: TeamPlayersService,
    teams: TeamsService,
    players: PlayersService,
    users: UsersService,
    events: EventsService,
    identity: Box<dyn IdentityProvider>,
    identity_config: IdentityConfig,
    clients: HashMap<ClientId, ClientSession>,
    out: mpsc::Sender<Outbound>,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        identity: Box<dyn IdentityProvider>,
        identity_config: IdentityConfig,
        out: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            auction_state: AuctionState::new(db.clone()),
            auction: AuctionService::new(db.clone()),
            rosters: TeamPlayersService::new(db.clone()),
            teams: TeamsService::new(db.clone(), AuctionDefaults::default()),
            players: PlayersService::new(db.clone(), AuctionDefaults::default()),
            users: UsersService::new(db.clone()),
            events: EventsService::new(db.clone()),
            db,
            identity,
            identity_config,
            clients: HashMap::new(),
            out,
        }
    }

    /// Use `defaults` for teams and players created without those fields.
    pub fn with_auction_defaults(mut self, defaults: AuctionDefaults) -> Self {
        self.teams = TeamsService::new(self.db.clone(), defaults.clone());
        self.players = PlayersService::new(self.db.clone(), defaults);
        self
    }

    pub fn auction_state(&self) -> &AuctionState {
        &self.auction_state
    }

    pub fn session(&self, client_id: ClientId) -> Option<&Session> {
        self.clients.get(&client_id).and_then(|c| c.session.as_ref())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// Create the first auction configuration from `defaults` when the store
/// has none. Returns true when one was created.
pub fn ensure_auction_config(db: &Arc<Database>, defaults: &AuctionDefaults) -> anyhow::Result<bool> {
    let mut auction = AuctionService::new(db.clone());
    if auction
        .get_auction_config()
        .context("failed to read auction configuration")?
        .is_some()
    {
        return Ok(false);
    }
    let created = auction
        .create_auction_config(&NewAuctionConfig {
            name: defaults.name.clone(),
            description: None,
            budget_cap: defaults.team_budget_cap,
            max_players_per_team: defaults.max_players,
            min_players_per_team: (defaults.min_players > 0).then_some(defaults.min_players),
        })
        .context("failed to create auction configuration")?;
    info!(config_id = created.id, name = %created.name, "created auction configuration");
    Ok(true)
}

/// Run the application event loop until the WebSocket side goes away or
/// `shutdown` fires.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut changes: broadcast::Receiver<TableChange>,
    mut shutdown: oneshot::Receiver<()>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");
    if let Err(e) = state.auction_state.load_all() {
        error!("Initial auction load failed: {}", e);
    }

    loop {
        tokio::select! {
            // --- WebSocket events ---
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(event) => handle_ws_event(&mut state, event).await,
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Store changes ---
            change = changes.recv() => {
                match change {
                    Ok(change) => handle_changes(&mut state, change, &mut changes).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "change feed lagged, reloading everything");
                        if let Err(e) = state.auction_state.load_all() {
                            error!("Reload after lag failed: {}", e);
                        }
                        broadcast_snapshot(&state).await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed, shutting down");
                        break;
                    }
                }
            }

            // --- Shutdown ---
            _ = &mut shutdown => {
                info!("Shutdown requested");
                let notice = ServerMessage::info("The auction desk is shutting down");
                if let Some(text) = encode(&notice) {
                    let _ = state.out.send(Outbound::Broadcast(text)).await;
                }
                break;
            }
        }
    }

    info!("Application event loop stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Outbound helpers
// ---------------------------------------------------------------------------

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode server message: {}", e);
            None
        }
    }
}

async fn send_to(state: &AppState, client_id: ClientId, message: &ServerMessage) {
    if let Some(text) = encode(message) {
        let _ = state.out.send(Outbound::To { client_id, text }).await;
    }
}

/// Push the current snapshot to every signed-in client.
async fn broadcast_snapshot(state: &AppState) {
    let message = ServerMessage::snapshot(state.auction_state.snapshot());
    let Some(text) = encode(&message) else {
        return;
    };
    for (client_id, client) in &state.clients {
        if client.session.is_some() {
            let _ = state
                .out
                .send(Outbound::To {
                    client_id: *client_id,
                    text: text.clone(),
                })
                .await;
        }
    }
}

async fn send_auth_required(state: &AppState, client_id: ClientId, return_url: &str) {
    let authorize_url = if state.identity.is_enabled() {
        state
            .identity
            .authorize_url(
                &state.identity_config.default_provider,
                &state.identity_config.redirect_url,
            )
            .map(|url| url.to_string())
            .map_err(|e| warn!("Cannot build authorize URL: {}", e))
            .ok()
    } else {
        None
    };
    let message = ServerMessage::AuthRequired {
        return_url: return_url.to_string(),
        authorize_url,
    };
    send_to(state, client_id, &message).await;
}

// ---------------------------------------------------------------------------
// Store changes
// ---------------------------------------------------------------------------

/// Apply `first` and any changes already queued behind it, then send one
/// snapshot for the lot.
async fn handle_changes(
    state: &mut AppState,
    first: TableChange,
    changes: &mut broadcast::Receiver<TableChange>,
) {
    let mut pending = vec![first];
    loop {
        match changes.try_recv() {
            Ok(change) => pending.push(change),
            Err(TryRecvError::Lagged(missed)) => {
                warn!(missed, "change feed lagged while draining");
                if let Err(e) = state.auction_state.load_all() {
                    error!("Reload after lag failed: {}", e);
                }
                broadcast_snapshot(state).await;
                return;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    pending.dedup();

    let mut touched = false;
    for change in &pending {
        match state.auction_state.refresh(change) {
            Ok(refreshed) => touched |= refreshed,
            Err(e) => warn!(%change, "refresh failed: {}", e),
        }
    }
    if touched {
        debug!(changes = pending.len(), "broadcasting snapshot");
        broadcast_snapshot(state).await;
    }
}

// ---------------------------------------------------------------------------
// WebSocket events
// ---------------------------------------------------------------------------

pub async fn handle_ws_event(state: &mut AppState, event: WsEvent) {
    match event {
        WsEvent::Connected { client_id, addr } => {
            info!(client_id, "Client connected from {}", addr);
            state.clients.insert(client_id, ClientSession::default());
            let welcome = ServerMessage::Welcome {
                version: version::version_with_prefix(),
            };
            send_to(state, client_id, &welcome).await;
            send_auth_required(state, client_id, VIEW_RETURN_URL).await;
        }
        WsEvent::Disconnected { client_id } => {
            info!(client_id, "Client disconnected");
            state.clients.remove(&client_id);
        }
        WsEvent::Message { client_id, text } => {
            handle_ws_message(state, client_id, &text).await;
        }
    }
}

async fn handle_ws_message(state: &mut AppState, client_id: ClientId, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(client_id, "Failed to parse client message: {}", e);
            send_to(state, client_id, &ServerMessage::error("Unrecognised message")).await;
            return;
        }
    };

    match message {
        ClientMessage::Heartbeat { timestamp } => {
            debug!(client_id, ?timestamp, "heartbeat");
        }
        ClientMessage::Authenticate { .. }
        | ClientMessage::ExchangeCode { .. }
        | ClientMessage::SignIn { .. }
        | ClientMessage::SignOut
        | ClientMessage::ResetPassword { .. } => {
            handle_auth(state, client_id, message).await;
        }
        command => {
            let guard = if command.needs_admin() {
                require_admin(state.session(client_id), CONTROL_RETURN_URL)
            } else {
                require_authenticated(state.session(client_id), VIEW_RETURN_URL)
            };
            if !admit(state, client_id, guard).await {
                return;
            }
            let actor = state.session(client_id).cloned();
            let reply = match execute(state, actor.as_ref(), &command) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(client_id, ?command, "command failed: {}", e);
                    ServerMessage::error(e.to_string())
                }
            };
            send_to(state, client_id, &reply).await;
        }
    }
}

/// Act on a guard decision. Returns true when the command may run.
async fn admit(state: &AppState, client_id: ClientId, guard: Guard) -> bool {
    match guard {
        Guard::Allow => true,
        Guard::RedirectToLogin { return_url } => {
            send_auth_required(state, client_id, &return_url).await;
            false
        }
        Guard::Forbidden => {
            let denied = ServerMessage::error("Admin access required");
            send_to(state, client_id, &denied).await;
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Sign-in
// ---------------------------------------------------------------------------

async fn handle_auth(state: &mut AppState, client_id: ClientId, message: ClientMessage) {
    let result = authenticate(state, client_id, message).await;
    match result {
        Ok(Some(session)) => {
            info!(client_id, email = %session.email, role = %session.role, "client signed in");
            let signed_in = ServerMessage::SignedIn {
                email: session.email.clone(),
                role: session.role,
            };
            if let Some(client) = state.clients.get_mut(&client_id) {
                client.session = Some(session);
            }
            send_to(state, client_id, &signed_in).await;
            let snapshot = ServerMessage::snapshot(state.auction_state.snapshot());
            send_to(state, client_id, &snapshot).await;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(client_id, "sign-in failed: {}", e);
            send_to(state, client_id, &ServerMessage::error(e.to_string())).await;
        }
    }
}

/// Run an identity command. `Some` carries a new session for the client.
async fn authenticate(
    state: &mut AppState,
    client_id: ClientId,
    message: ClientMessage,
) -> Result<Option<Session>, CommandError> {
    let admin_emails = state.identity_config.admin_emails.clone();
    match message {
        ClientMessage::Authenticate { access_token } => {
            let user = state.identity.get_user(&access_token).await?;
            let session = identity::resolve_session(&state.db, &user, &admin_emails)?;
            remember_token(state, client_id, access_token);
            Ok(Some(session))
        }
        ClientMessage::ExchangeCode {
            code,
            code_verifier,
        } => {
            let auth = state.identity.exchange_code(&code, &code_verifier).await?;
            adopt(state, client_id, auth, &admin_emails).map(Some)
        }
        ClientMessage::SignIn {
            email,
            password: Some(password),
        } => {
            let auth = state
                .identity
                .sign_in_with_password(&email, &password)
                .await?;
            adopt(state, client_id, auth, &admin_emails).map(Some)
        }
        ClientMessage::SignIn {
            email,
            password: None,
        } => {
            if state.identity.is_enabled() {
                return Err(CommandError::Rejected("A password is required".into()));
            }
            match identity::local_session(&state.db, &email, &admin_emails)? {
                Some(session) => Ok(Some(session)),
                None => Err(CommandError::Rejected(format!(
                    "{} is not registered on this desk",
                    email.trim()
                ))),
            }
        }
        ClientMessage::SignOut => {
            let token = state
                .clients
                .get_mut(&client_id)
                .and_then(|c| {
                    c.session = None;
                    c.access_token.take()
                });
            if let Some(token) = token {
                if let Err(e) = state.identity.sign_out(&token).await {
                    warn!(client_id, "provider sign-out failed: {}", e);
                }
            }
            info!(client_id, "client signed out");
            send_to(state, client_id, &ServerMessage::SignedOut).await;
            send_auth_required(state, client_id, VIEW_RETURN_URL).await;
            Ok(None)
        }
        ClientMessage::ResetPassword { email } => {
            state.identity.reset_password(&email).await?;
            let sent = ServerMessage::info(format!("Password reset email sent to {}", email.trim()));
            send_to(state, client_id, &sent).await;
            Ok(None)
        }
        other => Err(CommandError::Rejected(format!(
            "{other:?} is not a sign-in command"
        ))),
    }
}

fn adopt(
    state: &mut AppState,
    client_id: ClientId,
    auth: AuthSession,
    admin_emails: &[String],
) -> Result<Session, CommandError> {
    let session = identity::resolve_session(&state.db, &auth.user, admin_emails)?;
    remember_token(state, client_id, auth.access_token);
    Ok(session)
}

fn remember_token(state: &mut AppState, client_id: ClientId, token: String) {
    if let Some(client) = state.clients.get_mut(&client_id) {
        client.access_token = Some(token);
    }
}

// ---------------------------------------------------------------------------
// Auction commands
// ---------------------------------------------------------------------------

/// Run a command that has passed its guard and describe the outcome for the
/// client. `actor` is the signed-in session sending it.
pub fn execute(
    state: &mut AppState,
    actor: Option<&Session>,
    command: &ClientMessage,
) -> CommandResult {
    let auction = &mut state.auction_state;
    match command {
        ClientMessage::Refresh => Ok(ServerMessage::snapshot(auction.snapshot())),
        ClientMessage::InitializeAuction => {
            let queued = auction.initialize_auction()?;
            Ok(ServerMessage::success(format!(
                "Auction initialized with {queued} players"
            )))
        }
        ClientMessage::NextPlayer => match auction.next_player()? {
            Some(player) => Ok(ServerMessage::success(format!(
                "{} is on the block",
                player.name
            ))),
            None => Ok(ServerMessage::info("No players left in the queue")),
        },
        ClientMessage::SelectPlayer { player_id } => {
            let player = auction.select_player(*player_id)?;
            Ok(ServerMessage::success(format!(
                "{} is on the block",
                player.name
            )))
        }
        ClientMessage::SellPlayer {
            team_id,
            price,
            notes,
        } => {
            let receipt = auction.sell_current_player(&SellOrder {
                team_id: *team_id,
                price: *price,
                notes: notes.clone(),
            })?;
            Ok(ServerMessage::success(format!(
                "{} sold to {} for {}",
                receipt.player.name,
                receipt.team.name,
                format_currency(receipt.price)
            )))
        }
        ClientMessage::MarkUnsold => {
            let name = auction.current_player().map(|p| p.name.clone());
            auction.mark_current_unsold()?;
            Ok(ServerMessage::info(format!(
                "{} went unsold",
                name.unwrap_or_else(|| "Player".into())
            )))
        }
        ClientMessage::SkipPlayer => {
            let player = auction.skip_current_player()?;
            Ok(ServerMessage::info(format!("{} skipped", player.name)))
        }
        ClientMessage::StartAuction => {
            let config = state.auction.start_auction()?;
            Ok(ServerMessage::success(format!("{} started", config.name)))
        }
        ClientMessage::EndAuction => {
            let config = state.auction.end_auction()?;
            Ok(ServerMessage::success(format!("{} completed", config.name)))
        }
        ClientMessage::ResetAuction => {
            auction.reset_auction()?;
            Ok(ServerMessage::success("Auction reset"))
        }
        ClientMessage::SellBack { team_player_id } => {
            let removed = state.rosters.sell_player_back_to_pool(*team_player_id)?;
            let name = removed
                .player
                .map(|p| p.name)
                .unwrap_or_else(|| format!("Player {}", removed.player_id));
            Ok(ServerMessage::success(format!(
                "{name} returned to the pool"
            )))
        }
        ClientMessage::ClearHistory => {
            let cleared = state.auction.clear_auction_history()?;
            Ok(ServerMessage::success(format!(
                "Cleared {cleared} history entries"
            )))
        }
        ClientMessage::ListHistory { sort } => {
            let mut entries = state.auction.get_auction_history()?;
            let stats = HistoryStats::from_entries(&entries);
            sort_history(&mut entries, *sort);
            Ok(ServerMessage::History { entries, stats })
        }
        other => manage(state, actor, other),
    }
}

/// Team, player pool, user and calendar management.
fn manage(state: &mut AppState, actor: Option<&Session>, command: &ClientMessage) -> CommandResult {
    match command {
        // --- Teams ---
        ClientMessage::CreateTeam { team } => {
            let created = state.teams.create_team(team.clone())?;
            Ok(ServerMessage::success(format!("{} created", created.name)))
        }
        ClientMessage::UpdateTeam { team_id, changes } => {
            let updated = state.teams.update_team(*team_id, changes)?;
            Ok(ServerMessage::success(format!("{} updated", updated.name)))
        }
        ClientMessage::ToggleTeam { team_id } => {
            state.teams.get_teams()?;
            let team = state.teams.toggle_team_status(*team_id)?;
            let now = if team.is_active { "active" } else { "inactive" };
            Ok(ServerMessage::success(format!("{} is now {now}", team.name)))
        }
        ClientMessage::DeleteTeams { team_ids } => {
            let deleted = state.teams.delete_teams(team_ids)?;
            Ok(ServerMessage::success(format!("Deleted {deleted} teams")))
        }

        // --- Player pool ---
        ClientMessage::QueryPlayers { query } => {
            state.players.get_players()?;
            let stats = state.players.get_player_stats()?;
            let players = filter_players(state.players.players(), query);
            Ok(ServerMessage::Players { players, stats })
        }
        ClientMessage::CreatePlayer { player } => {
            let created = state.players.create_player(player.clone())?;
            Ok(ServerMessage::success(format!(
                "{} added to the pool at {}",
                created.name,
                format_currency(created.base_price)
            )))
        }
        ClientMessage::UpdatePlayer { player_id, changes } => {
            let updated = state.players.update_player(*player_id, changes)?;
            Ok(ServerMessage::success(format!("{} updated", updated.name)))
        }
        ClientMessage::TogglePlayer { player_id } => {
            state.players.get_players()?;
            let player = state.players.toggle_player_status(*player_id)?;
            let now = if player.is_active { "active" } else { "inactive" };
            Ok(ServerMessage::success(format!("{} is now {now}", player.name)))
        }
        ClientMessage::DeletePlayers { player_ids } => {
            let deleted = state.players.delete_players(player_ids)?;
            Ok(ServerMessage::success(format!("Deleted {deleted} players")))
        }
        ClientMessage::ImportPlayers { csv } => {
            let summary = state.players.import_csv(csv.as_bytes())?;
            Ok(ServerMessage::success(format!(
                "Imported {} players, skipped {}",
                summary.imported.len(),
                summary.skipped
            )))
        }
        ClientMessage::AddToAuction { player_ids } => {
            let added = state.auction_state.add_players_to_auction(player_ids)?;
            Ok(ServerMessage::success(format!(
                "{added} players added to the auction"
            )))
        }
        ClientMessage::RemoveFromAuction { player_ids } => {
            let removed = state.auction_state.remove_players_from_auction(player_ids)?;
            Ok(ServerMessage::success(format!(
                "{removed} players removed from the auction"
            )))
        }

        // --- Users ---
        ClientMessage::ListUsers { search } => {
            state.users.get_users()?;
            Ok(ServerMessage::Users {
                users: state.users.filter_users(search),
                stats: state.users.user_stats(),
            })
        }
        ClientMessage::UpdateUserRole { user_id, role } => {
            let actor = actor.ok_or_else(|| CommandError::Rejected("Sign in first".into()))?;
            let updated = state.users.update_user_role(actor, user_id, *role)?;
            for client in state.clients.values_mut() {
                if let Some(session) = client.session.as_mut() {
                    if session.user_id == updated.user_id {
                        session.role = updated.role;
                    }
                }
            }
            Ok(ServerMessage::success(format!(
                "{} is now {}",
                updated.email,
                role_label(updated.role)
            )))
        }

        // --- Calendar ---
        ClientMessage::ListEvents {
            event_type,
            upcoming,
        } => {
            let events = match (upcoming, event_type) {
                (Some(limit), _) => state.events.get_upcoming_events(*limit)?,
                (None, Some(event_type)) => state.events.get_events_by_type(*event_type)?,
                (None, None) => state.events.get_events()?,
            };
            Ok(ServerMessage::Events { events })
        }
        ClientMessage::CreateEvent { event } => {
            let created = state.events.create_event(event)?;
            Ok(ServerMessage::success(format!("{} scheduled", created.name)))
        }
        ClientMessage::UpdateEvent { event_id, changes } => {
            let updated = state.events.update_event(*event_id, changes)?;
            Ok(ServerMessage::success(format!("{} updated", updated.name)))
        }
        ClientMessage::DeleteEvent { event_id } => {
            state.events.delete_event(*event_id)?;
            Ok(ServerMessage::success("Event deleted"))
        }

        other => Err(CommandError::Rejected(format!(
            "{other:?} is not a desk command"
        ))),
    }
}
