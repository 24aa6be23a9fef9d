//! Realtime change feed client.
//!
//! Maintains one websocket to the backend's realtime endpoint, joins one
//! topic per watched table, and fans incoming insert/update/delete events
//! out on per-table broadcast channels. Consumers do not receive row data:
//! an event only says "this table changed", prompting a re-query.
//!
//! Connection lifecycle: dial, rejoin every watched topic, then loop over
//! heartbeats (30s), join requests for newly watched tables, and incoming
//! events. A dropped socket is re-dialed after a fixed delay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Client heartbeat cadence expected by the server.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before re-dialing after a dropped connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Buffered events per table before a slow consumer starts lagging.
const CHANNEL_CAPACITY: usize = 32;

/// What happened to a watched table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn from_event(event: &str) -> Option<Self> {
        match event {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One change-feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChange {
    pub table: String,
    pub kind: ChangeKind,
}

// ═══════════════════════════════════════════════════════════
// Wire frames
// ═══════════════════════════════════════════════════════════

/// One channel-framed socket message.
#[derive(Debug, Serialize, Deserialize)]
struct SocketMessage {
    topic: String,
    event: String,
    payload: Value,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

fn topic_for(table: &str) -> String {
    format!("realtime:public:{table}")
}

fn table_of(topic: &str) -> Option<&str> {
    topic.strip_prefix("realtime:public:")
}

fn join_message(table: &str, reference: u64) -> SocketMessage {
    SocketMessage {
        topic: topic_for(table),
        event: "phx_join".to_string(),
        payload: Value::Object(Default::default()),
        reference: Some(reference.to_string()),
    }
}

fn heartbeat_message(reference: u64) -> SocketMessage {
    SocketMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: Value::Object(Default::default()),
        reference: Some(reference.to_string()),
    }
}

/// Extract a table change from an incoming frame. Replies, joins and
/// heartbeat acks fall through as None.
fn parse_change(text: &str) -> Option<TableChange> {
    let message: SocketMessage = serde_json::from_str(text).ok()?;
    let table = table_of(&message.topic)?;
    let kind = ChangeKind::from_event(&message.event)?;
    Some(TableChange {
        table: table.to_string(),
        kind,
    })
}

// ═══════════════════════════════════════════════════════════
// RealtimeFeed
// ═══════════════════════════════════════════════════════════

type ChannelMap = Arc<Mutex<HashMap<String, broadcast::Sender<TableChange>>>>;
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Handle over the socket task. Dropping it tears the connection down.
pub struct RealtimeFeed {
    channels: ChannelMap,
    join_tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl RealtimeFeed {
    /// Spawn the socket task against `url`
    /// (see [`crate::config::BackendConfig::realtime_url`]).
    pub fn spawn(url: String) -> Self {
        let channels: ChannelMap = Arc::new(Mutex::new(HashMap::new()));
        let (join_tx, join_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_feed(url, Arc::clone(&channels), join_rx));
        Self {
            channels,
            join_tx,
            task,
        }
    }

    /// Events for `table`. The first subscription for a table joins its
    /// topic; later ones share the same channel.
    pub fn subscribe(&self, table: &str) -> broadcast::Receiver<TableChange> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sender) = channels.get(table) {
            return sender.subscribe();
        }
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(table.to_string(), sender);
        let _ = self.join_tx.send(table.to_string());
        receiver
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_feed(url: String, channels: ChannelMap, mut join_rx: mpsc::UnboundedReceiver<String>) {
    loop {
        match connect_async(&url).await {
            Ok((socket, _)) => {
                tracing::info!("Realtime feed connected");
                if let Err(reason) = drive_socket(socket, &channels, &mut join_rx).await {
                    tracing::warn!(error = %reason, "Realtime feed dropped");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Realtime feed connection failed");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn drive_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    channels: &ChannelMap,
    join_rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), String> {
    let (mut sink, mut stream) = socket.split();
    let mut reference: u64 = 0;

    // Rejoin every table watched before this connection
    let watched: Vec<String> = {
        let channels = channels.lock().unwrap_or_else(|p| p.into_inner());
        channels.keys().cloned().collect()
    };
    for table in watched {
        reference += 1;
        send_message(&mut sink, join_message(&table, reference)).await?;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                reference += 1;
                send_message(&mut sink, heartbeat_message(reference)).await?;
            }
            Some(table) = join_rx.recv() => {
                reference += 1;
                send_message(&mut sink, join_message(&table, reference)).await?;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => dispatch(&text, channels),
                Some(Ok(Message::Close(_))) | None => {
                    return Err("server closed the connection".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.to_string()),
            },
        }
    }
}

async fn send_message(sink: &mut WsSink, message: SocketMessage) -> Result<(), String> {
    let text = serde_json::to_string(&message).map_err(|e| e.to_string())?;
    sink.send(Message::Text(text)).await.map_err(|e| e.to_string())
}

fn dispatch(text: &str, channels: &ChannelMap) {
    if let Some(change) = parse_change(text) {
        let channels = channels.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sender) = channels.get(&change.table) {
            // No receivers right now is not an error
            let _ = sender.send(change);
        }
    }
}
