// Integration tests for the desk server.
//
// These open a real loopback WebSocket and drive the server (and, in the
// second test, the application loop behind it) the way a browser client
// would.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gavel_app::identity::IdentityClient;
use gavel_core::config::IdentityConfig;
use gavel_core::db::Database;
use gavel_core::model::{NewPlayer, NewTeam};
use gavel_server::app::{self, AppState};
use gavel_server::ws_server::{self, Outbound, WsEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ===========================================================================
// Helpers
// ===========================================================================

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Next text frame from the server, decoded as JSON.
async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("server should answer in time")
            .expect("stream should stay open")
            .expect("frame should be valid");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip frames until one of type `kind` arrives.
async fn expect_type(client: &mut Client, kind: &str) -> serde_json::Value {
    loop {
        let frame = next_json(client).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

/// Read until the server's close frame. False if the stream breaks first.
async fn closes_cleanly(client: &mut Client) -> bool {
    loop {
        match tokio::time::timeout(WAIT, client.next()).await {
            Ok(Some(Ok(Message::Close(_)))) => {
                // Keep polling so the close reply goes out.
                while let Ok(Some(Ok(_))) = tokio::time::timeout(WAIT, client.next()).await {}
                return true;
            }
            Ok(Some(Ok(_))) => continue,
            _ => return false,
        }
    }
}

async fn send(client: &mut Client, json: &str) {
    client.send(Message::Text(json.into())).await.unwrap();
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn frames_flow_both_ways_and_disconnect_is_reported() {
    let (listener, url) = bind().await;
    let (ws_tx, mut ws_rx) = mpsc::channel(16);
    let (out_tx, out_rx) = mpsc::channel(16);
    let server = tokio::spawn(ws_server::serve(listener, ws_tx, out_rx));

    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    let client_id = match ws_rx.recv().await.unwrap() {
        WsEvent::Connected { client_id, .. } => client_id,
        other => panic!("expected Connected, got {other:?}"),
    };

    send(&mut client, r#"{"type":"REFRESH"}"#).await;
    assert_eq!(
        ws_rx.recv().await.unwrap(),
        WsEvent::Message {
            client_id,
            text: r#"{"type":"REFRESH"}"#.into()
        }
    );

    out_tx
        .send(Outbound::To {
            client_id,
            text: r#"{"type":"SIGNED_OUT"}"#.into(),
        })
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await["type"], "SIGNED_OUT");

    out_tx
        .send(Outbound::Broadcast(r#"{"type":"WELCOME","version":"v0"}"#.into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await["version"], "v0");

    client.close(None).await.unwrap();
    assert_eq!(
        ws_rx.recv().await.unwrap(),
        WsEvent::Disconnected { client_id }
    );

    drop(out_tx);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn local_admin_drives_the_auction_over_the_socket() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let team = db
        .insert_team(&NewTeam {
            name: "Kestrels".into(),
            budget_cap: Some(10_000),
            max_players: Some(5),
            ..NewTeam::default()
        })
        .unwrap();
    db.insert_player(&NewPlayer {
        name: "Asha".into(),
        position: "Batsman".into(),
        category: "Marquee".into(),
        base_price: Some(500),
        ..NewPlayer::default()
    })
    .unwrap();
    app::ensure_auction_config(&db, &Default::default()).unwrap();

    let identity_config = IdentityConfig {
        enabled: false,
        provider_url: "https://auth.example.com".into(),
        redirect_url: "http://localhost/auth/callback".into(),
        default_provider: "google".into(),
        admin_emails: vec!["desk@example.com".into()],
    };

    let (listener, url) = bind().await;
    let (ws_tx, ws_rx) = mpsc::channel(64);
    let (out_tx, out_rx) = mpsc::channel(64);
    let (stop_tx, stop_rx) = oneshot::channel();
    let changes = db.subscribe();
    let state = AppState::new(
        db.clone(),
        Box::new(IdentityClient::Disabled),
        identity_config,
        out_tx,
    );
    let server = tokio::spawn(ws_server::serve(listener, ws_tx, out_rx));
    let app_loop = tokio::spawn(app::run(ws_rx, changes, stop_rx, state));

    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    assert_eq!(next_json(&mut client).await["type"], "WELCOME");
    assert_eq!(next_json(&mut client).await["type"], "AUTH_REQUIRED");

    send(&mut client, r#"{"type":"NEXT_PLAYER"}"#).await;
    let refused = next_json(&mut client).await;
    assert_eq!(refused["type"], "AUTH_REQUIRED");
    assert_eq!(refused["return_url"], "/auction");

    send(&mut client, r#"{"type":"SIGN_IN","email":"desk@example.com"}"#).await;
    let signed_in = expect_type(&mut client, "SIGNED_IN").await;
    assert_eq!(signed_in["role"], "admin");

    send(&mut client, r#"{"type":"NEXT_PLAYER"}"#).await;
    let note = expect_type(&mut client, "NOTIFICATION").await;
    assert_eq!(note["text"], "Asha is on the block");

    let sell = format!(
        r#"{{"type":"SELL_PLAYER","team_id":{},"price":1500}}"#,
        team.id
    );
    send(&mut client, &sell).await;
    let note = expect_type(&mut client, "NOTIFICATION").await;
    assert_eq!(note["level"], "success");
    assert_eq!(note["text"], "Asha sold to Kestrels for ₹1,500");

    // The store change feed pushes a fresh snapshot with the sale in it.
    loop {
        let snapshot = expect_type(&mut client, "SNAPSHOT").await;
        if snapshot["snapshot"]["history_stats"]["sold"] == 1 {
            assert_eq!(snapshot["snapshot"]["teams"][0]["budget_spent"], 1500);
            break;
        }
    }

    // The loop has finished before the client reads anything, so the notice
    // and the close both come from the server flushing on its way out.
    stop_tx.send(()).unwrap();
    app_loop.await.unwrap().unwrap();
    let notice = expect_type(&mut client, "NOTIFICATION").await;
    assert_eq!(notice["text"], "The auction desk is shutting down");
    assert!(closes_cleanly(&mut client).await);
    tokio::time::timeout(WAIT, server)
        .await
        .expect("server should stop once the client is gone")
        .unwrap()
        .unwrap();
}
