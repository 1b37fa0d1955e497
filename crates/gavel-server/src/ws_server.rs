// WebSocket server for the desk clients (control panel and viewer screens).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Identifies one connection for the lifetime of the server.
pub type ClientId = u64;

/// Frames buffered per client before new ones are dropped.
const CLIENT_BUFFER: usize = 64;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug, PartialEq)]
pub enum WsEvent {
    /// A client finished the WebSocket handshake.
    Connected { client_id: ClientId, addr: String },
    /// A client went away.
    Disconnected { client_id: ClientId },
    /// A text frame from a client (raw JSON string).
    Message { client_id: ClientId, text: String },
}

/// A text frame the application wants delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    To { client_id: ClientId, text: String },
    Broadcast(String),
}

// ---------------------------------------------------------------------------
// Client registry
// ---------------------------------------------------------------------------

/// Writers of every connected client, keyed by id.
#[derive(Clone, Default)]
pub struct Clients {
    inner: Arc<Mutex<HashMap<ClientId, mpsc::Sender<String>>>>,
}

impl Clients {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, mpsc::Sender<String>>> {
        self.inner.lock().expect("client registry mutex poisoned")
    }

    pub fn insert(&self, client_id: ClientId, writer: mpsc::Sender<String>) {
        self.lock().insert(client_id, writer);
    }

    pub fn remove(&self, client_id: ClientId) {
        self.lock().remove(&client_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every writer. Each one sends what it already holds and then
    /// closes its socket.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Queue `outbound` on the addressed writers. A client whose buffer is
    /// full misses the frame; a closed writer is dropped from the registry.
    pub fn dispatch(&self, outbound: Outbound) {
        let mut clients = self.lock();
        let targets: Vec<(ClientId, String)> = match outbound {
            Outbound::To { client_id, text } => {
                if !clients.contains_key(&client_id) {
                    debug!(client_id, "dropping frame for departed client");
                    return;
                }
                vec![(client_id, text)]
            }
            Outbound::Broadcast(text) => clients.keys().map(|id| (*id, text.clone())).collect(),
        };

        for (client_id, text) in targets {
            let Some(writer) = clients.get(&client_id) else {
                continue;
            };
            match writer.try_send(text) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client_id, "client is not keeping up; frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    clients.remove(&client_id);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Server loop
// ---------------------------------------------------------------------------

/// Run the WebSocket server on `127.0.0.1:{port}`. Client events go out
/// through `tx`; frames arriving on `outbound` are written to clients.
pub async fn run(
    port: u16,
    tx: mpsc::Sender<WsEvent>,
    outbound: mpsc::Receiver<Outbound>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    serve(listener, tx, outbound).await
}

/// Accept clients on an already bound listener until the application drops
/// its end of `outbound`. Frames queued before that are still delivered, and
/// the call returns once every connection has closed.
pub async fn serve(
    listener: TcpListener,
    tx: mpsc::Sender<WsEvent>,
    mut outbound: mpsc::Receiver<Outbound>,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    let clients = Clients::default();
    let mut connections = JoinSet::new();
    let mut next_id: ClientId = 1;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                let client_id = next_id;
                next_id += 1;
                info!(client_id, "Accepted TCP connection from {addr}");
                connections.spawn(handle_connection(
                    stream,
                    addr.to_string(),
                    client_id,
                    tx.clone(),
                    clients.clone(),
                ));
            }

            frame = outbound.recv() => {
                match frame {
                    Some(frame) => clients.dispatch(frame),
                    None => {
                        info!("Outbound channel closed, stopping WebSocket server");
                        break;
                    }
                }
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    clients.clear();
    while connections.join_next().await.is_some() {}
    info!("All client connections closed");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    addr: String,
    client_id: ClientId,
    tx: mpsc::Sender<WsEvent>,
    clients: Clients,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };
    let (mut write, read) = ws_stream.split();

    let (writer_tx, mut writer_rx) = mpsc::channel::<String>(CLIENT_BUFFER);
    clients.insert(client_id, writer_tx);

    let writer = tokio::spawn(async move {
        while let Some(text) = writer_rx.recv().await {
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    let connected = tx
        .send(WsEvent::Connected {
            client_id,
            addr: addr.clone(),
        })
        .await;
    if connected.is_ok() {
        let _ = process_message_stream(read, client_id, &tx, &addr).await;
    }

    clients.remove(client_id);
    writer.abort();
    let _ = tx.send(WsEvent::Disconnected { client_id }).await;
    info!(client_id, "Client {addr} disconnected");
}

/// Forward text frames from `stream` through `tx` until the client closes,
/// errors, or the stream ends. Returns `Err(())` once the receiver is gone.
pub async fn process_message_stream<St>(
    mut stream: St,
    client_id: ClientId,
    tx: &mpsc::Sender<WsEvent>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    client_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong and raw frames carry nothing for us.
            }
        }
    }
    Ok(())
}
