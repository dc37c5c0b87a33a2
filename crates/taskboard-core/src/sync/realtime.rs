//! Realtime Change Feed
//!
//! Subscribes to row changes of the remote task table over the row-store's
//! realtime websocket (Phoenix channel protocol). Every `postgres_changes`
//! message becomes a [`ChangeEvent`]. Best effort: events sent while the
//! socket is down are lost and nothing is replayed. The stream ends when
//! the socket closes or the server rejects the join.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{ChangeEvent, ChangeFeed, ChangeKind, ChangeStream};
use crate::domain::TaskId;
use crate::repository::{RepositoryError, RepositoryResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel name used when none is configured
pub const DEFAULT_CHANNEL: &str = "public:tasks";

const DEFAULT_SCHEMA: &str = "public";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 32;

/// Change feed over the remote realtime websocket
#[derive(Debug, Clone)]
pub struct RealtimeChangeFeed {
    endpoint: Url,
    channel: String,
    schema: String,
    table: String,
    heartbeat: Duration,
}

impl RealtimeChangeFeed {
    /// Build the feed from the project URL (`https://...`) and API key
    pub fn new(
        project_url: &str,
        api_key: &str,
        channel: &str,
        table: &str,
    ) -> RepositoryResult<Self> {
        Ok(Self {
            endpoint: websocket_endpoint(project_url, api_key)?,
            channel: channel.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.to_string(),
            heartbeat: HEARTBEAT_INTERVAL,
        })
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }

    fn join_message(&self) -> Value {
        json!({
            "topic": self.topic(),
            "event": "phx_join",
            "payload": {
                "config": {
                    "postgres_changes": [
                        { "event": "*", "schema": self.schema, "table": self.table }
                    ]
                }
            },
            "ref": "1",
        })
    }
}

#[async_trait]
impl ChangeFeed for RealtimeChangeFeed {
    async fn subscribe(&self) -> RepositoryResult<ChangeStream> {
        let host = self.endpoint.host_str().unwrap_or_default().to_string();
        let (mut ws, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| RepositoryError::Realtime(format!("failed to connect to {host}: {e}")))?;

        ws.send(Message::Text(self.join_message().to_string().into()))
            .await
            .map_err(|e| RepositoryError::Realtime(format!("failed to join channel: {e}")))?;
        info!(topic = %self.topic(), "Realtime channel joined");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(run_channel(ws, tx, self.topic(), self.heartbeat));

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Pump socket frames into the subscriber until either side goes away
async fn run_channel(
    mut ws: WsStream,
    tx: mpsc::Sender<ChangeEvent>,
    topic: String,
    period: Duration,
) {
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!(%topic, "Realtime subscriber dropped");
                break;
            }
            _ = heartbeat.tick() => {
                let beat = json!({
                    "topic": "phoenix",
                    "event": "heartbeat",
                    "payload": {},
                    "ref": next_ref.to_string(),
                });
                next_ref += 1;
                if let Err(e) = ws.send(Message::Text(beat.to_string().into())).await {
                    warn!(%topic, error = %e, "Realtime heartbeat failed");
                    break;
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => match parse_frame(text.as_str(), &topic) {
                    Inbound::Change(event) => {
                        debug!(%topic, kind = ?event.kind, "Change received");
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    // No events will follow, end the stream so subscribers see it
                    Inbound::JoinRejected(reason) => {
                        warn!(%topic, %reason, "Realtime join rejected");
                        break;
                    }
                    Inbound::Ignored => {}
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!(%topic, "Realtime channel closed by server");
                    break;
                }
                Some(Err(e)) => {
                    warn!(%topic, error = %e, "Realtime channel failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = ws.close(None).await;
}

#[derive(Debug, Deserialize)]
struct PhoenixFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

/// What a frame means for the subscriber
#[derive(Debug, PartialEq)]
enum Inbound {
    Change(ChangeEvent),
    JoinRejected(String),
    Ignored,
}

fn parse_frame(text: &str, topic: &str) -> Inbound {
    let frame: PhoenixFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Unparseable realtime frame");
            return Inbound::Ignored;
        }
    };
    if frame.topic != topic {
        return Inbound::Ignored;
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            let record_id = data["record"]["id"]
                .as_str()
                .or_else(|| data["old_record"]["id"].as_str())
                .map(TaskId::from);
            Inbound::Change(ChangeEvent {
                kind: ChangeKind::from_event_type(data["type"].as_str().unwrap_or_default()),
                table: data["table"].as_str().unwrap_or_default().to_string(),
                record_id,
            })
        }
        // The join is the only message pushed on this topic
        "phx_reply" if frame.payload["status"] == "error" => {
            Inbound::JoinRejected(frame.payload["response"].to_string())
        }
        "phx_reply" | "system" | "presence_state" | "presence_diff" => Inbound::Ignored,
        other => {
            debug!(%topic, event = other, "Ignoring realtime event");
            Inbound::Ignored
        }
    }
}

/// `https://host` → `wss://host/realtime/v1/websocket?apikey=...&vsn=1.0.0`
fn websocket_endpoint(project_url: &str, api_key: &str) -> RepositoryResult<Url> {
    let mut url = Url::parse(project_url)
        .map_err(|e| RepositoryError::InvalidUrl(format!("{project_url}: {e}")))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(RepositoryError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| RepositoryError::InvalidUrl(format!("cannot use scheme '{scheme}'")))?;

    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/realtime/v1/websocket"));
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}
