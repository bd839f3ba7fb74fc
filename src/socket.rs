//! Realtime channel to the backend.
//!
//! Frames are JSON text messages `{"event": name, "data": payload}`. The
//! transport turns them into typed [`SocketEvent`]s; connection changes are
//! reported as events too, so consumers only ever read one stream.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Outbound chat event.
pub const SEND_MESSAGE: &str = "send-message";

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Malformed frame: {0}")]
    Frame(String),
}

/// Wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: &str, data: impl Serialize) -> Result<Self, SocketError> {
        let data = serde_json::to_value(data).map_err(|e| SocketError::Frame(e.to_string()))?;
        Ok(Self {
            event: event.to_string(),
            data,
        })
    }
}

/// Batch of bill updates pushed while documents are processed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardPush {
    pub bills: Vec<Value>,
    /// Human readable progress line, shown as a toast.
    pub step: Option<String>,
}

impl DashboardPush {
    fn from_value(data: Value) -> Self {
        match data {
            Value::Array(bills) => Self { bills, step: None },
            Value::Object(mut obj) => {
                let step = obj
                    .get("step")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string);
                let bills = ["bills", "data", "updatedBills"]
                    .iter()
                    .find_map(|key| match obj.remove(*key) {
                        Some(Value::Array(items)) => Some(items),
                        Some(single @ Value::Object(_)) => Some(vec![single]),
                        _ => None,
                    })
                    .unwrap_or_else(|| {
                        // A bare bill object.
                        if obj.contains_key("id") || obj.contains_key("_id") {
                            obj.remove("step");
                            vec![Value::Object(obj)]
                        } else {
                            Vec::new()
                        }
                    });
                Self { bills, step }
            }
            _ => Self::default(),
        }
    }
}

/// Everything the client reacts to on the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connect,
    Disconnect { reason: String },
    ConnectError { message: String },
    AgentResponse { text: String },
    AgentStream { chunk: String },
    AgentStreamEnd { text: Option<String> },
    AgentStreamError { message: String },
    DashboardEvent(DashboardPush),
    Unknown { event: String },
}

impl SocketEvent {
    pub fn from_frame(frame: Frame) -> Self {
        let Frame { event, data } = frame;
        match event.as_str() {
            "connect" => SocketEvent::Connect,
            "disconnect" => SocketEvent::Disconnect {
                reason: text_of(&data, &["reason", "message"]).unwrap_or_else(|| "server disconnect".into()),
            },
            "connect_error" => SocketEvent::ConnectError {
                message: text_of(&data, &["message", "error"]).unwrap_or_default(),
            },
            "agent-response" => SocketEvent::AgentResponse {
                text: text_of(&data, &["message", "response", "text", "content"]).unwrap_or_default(),
            },
            "agent-stream" => SocketEvent::AgentStream {
                chunk: text_of(&data, &["chunk", "content", "text", "delta"]).unwrap_or_default(),
            },
            "agent-stream-end" => SocketEvent::AgentStreamEnd {
                text: text_of(&data, &["message", "fullText", "text", "content"]),
            },
            "agent-stream-error" => SocketEvent::AgentStreamError {
                message: text_of(&data, &["message", "error"]).unwrap_or_default(),
            },
            "dashboard-event" => SocketEvent::DashboardEvent(DashboardPush::from_value(data)),
            _ => SocketEvent::Unknown { event },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SocketEvent::Connect => "connect",
            SocketEvent::Disconnect { .. } => "disconnect",
            SocketEvent::ConnectError { .. } => "connect_error",
            SocketEvent::AgentResponse { .. } => "agent-response",
            SocketEvent::AgentStream { .. } => "agent-stream",
            SocketEvent::AgentStreamEnd { .. } => "agent-stream-end",
            SocketEvent::AgentStreamError { .. } => "agent-stream-error",
            SocketEvent::DashboardEvent(_) => "dashboard-event",
            SocketEvent::Unknown { event } => event,
        }
    }
}

/// Payload text: a bare string, or the first string found under `keys`.
fn text_of(data: &Value, keys: &[&str]) -> Option<String> {
    match data {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => keys
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

pub fn decode(text: &str) -> Result<SocketEvent, SocketError> {
    let frame: Frame = serde_json::from_str(text).map_err(|e| SocketError::Frame(e.to_string()))?;
    Ok(SocketEvent::from_frame(frame))
}

// ═══════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════

/// A live (or failed) connection. Dropping `outbound` closes the socket.
pub struct SocketConnection {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
    pub task: Option<JoinHandle<()>>,
}

/// Open the socket. Failure is not an error here: it is delivered as a
/// `ConnectError` event and the event stream ends. No reconnect is tried.
pub async fn connect(url: &str) -> SocketConnection {
    let (event_tx, events) = mpsc::unbounded_channel();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();

    let task = match tokio_tungstenite::connect_async(url).await {
        Ok((stream, _)) => {
            tracing::info!("Socket connected");
            let _ = event_tx.send(SocketEvent::Connect);
            Some(tokio::spawn(pump(stream, outbound_rx, event_tx)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Socket connection failed");
            let _ = event_tx.send(SocketEvent::ConnectError {
                message: e.to_string(),
            });
            None
        }
    };

    SocketConnection {
        outbound,
        events,
        task,
    }
}

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Forward frames both ways until either side closes.
async fn pump(
    stream: Stream,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            msg = source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match decode(&text) {
                        Ok(event) => {
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "Ignoring socket frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        let _ = events.send(SocketEvent::Disconnect { reason });
                        break;
                    }
                    Some(Err(e)) => {
                        let _ = events.send(SocketEvent::Disconnect { reason: e.to_string() });
                        break;
                    }
                    None => {
                        let _ = events.send(SocketEvent::Disconnect {
                            reason: "connection closed".to_string(),
                        });
                        break;
                    }
                    Some(Ok(_)) => {} // Ping/Pong handled by tungstenite
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    break;
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::warn!(error = %e, event = %frame.event, "Dropping unserializable frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    let _ = events.send(SocketEvent::Disconnect { reason: e.to_string() });
                    break;
                }
            }
        }
    }

    tracing::info!("Socket disconnected");
}
