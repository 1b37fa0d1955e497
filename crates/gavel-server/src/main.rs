// Gavel auction desk entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database, create the first auction configuration if needed
// 4. Build the identity client
// 5. Create channels
// 6. Spawn WebSocket server task
// 7. Spawn app logic task
// 8. Wait for Ctrl+C
// 9. Cleanup on exit

use std::sync::Arc;

use gavel_app::identity::IdentityClient;
use gavel_app::version;
use gavel_core::config;
use gavel_core::db;
use gavel_server::app;
use gavel_server::ws_server;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file)
    init_tracing()?;
    info!("Gavel {} starting up", version::version_with_prefix());

    // 2. Load config
    let (base_dir, config) = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded from {}: {}, budget cap {}, {} players per team",
        base_dir.display(),
        config.auction.name,
        config.auction.team_budget_cap,
        config.auction.max_players
    );

    // 3. Open database
    let db_path = base_dir.join(&config.db_path);
    let db_path = db_path.to_string_lossy();
    let db = Arc::new(db::Database::open(&db_path).context("failed to open database")?);
    info!("Database opened at {}", db_path);

    if app::ensure_auction_config(&db, &config.auction)? {
        info!("Created the first auction configuration from defaults");
    }

    // 4. Build the identity client from config
    let identity = IdentityClient::from_config(&config);
    match &identity {
        IdentityClient::Active(_) => info!("Identity provider enabled"),
        IdentityClient::Disabled => info!("Identity provider disabled, using local sign-in"),
    }

    // 5. Create channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (out_tx, out_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let changes = db.subscribe();

    let app_state = app::AppState::new(
        db.clone(),
        Box::new(identity),
        config.identity.clone(),
        out_tx,
    )
    .with_auction_defaults(config.auction.clone());

    // 6. Spawn WebSocket server task
    let ws_port = config.ws_port;
    let mut ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(ws_port, ws_tx, out_rx).await {
            error!("WebSocket server error on port {}: {}", ws_port, e);
        }
    });

    // 7. Spawn app logic task
    let mut app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, changes, shutdown_rx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 8. Wait for Ctrl+C
    info!("Auction desk ready on ws://127.0.0.1:{}", ws_port);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(());

    // 9. Cleanup: the app task tells clients and drops its outbound sender,
    // then the server flushes what is queued and closes each connection.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    if tokio::time::timeout_at(deadline, &mut app_handle).await.is_err() {
        warn!("Application loop did not stop in time");
        app_handle.abort();
    }
    if tokio::time::timeout_at(deadline, &mut ws_handle).await.is_err() {
        warn!("WebSocket server did not finish flushing in time");
    }

    ws_handle.abort();

    info!("Gavel shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/gavel.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("gavel.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("gavel=info,gavel_server=info,gavel_app=info,gavel_core=info,warn")
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
