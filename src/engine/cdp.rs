//! Persistent CDP connection to one browser process.
//!
//! All traffic for a browser goes through a single spawned connection task:
//! callers submit commands over a channel and await a oneshot reply, the
//! task correlates replies by message id, and protocol events (target
//! created/destroyed/changed, socket loss) flow out on an event channel.
//! One reader, one writer — no response can be stolen by a second socket.

use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{PilothouseError, Result};

/// Out-of-band notification from the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TargetCreated {
        target_id: String,
        kind: String,
        url: String,
        browser_context_id: Option<String>,
        opener_id: Option<String>,
    },
    TargetDestroyed {
        target_id: String,
    },
    TargetInfoChanged {
        target_id: String,
        url: String,
    },
    /// The WebSocket died — the browser process is gone or unreachable.
    ConnectionLost,
}

struct PendingCall {
    method: String,
    params: Value,
    session_id: Option<String>,
    reply: oneshot::Sender<Result<Value>>,
}

/// Cheap clonable handle to a browser-level CDP connection.
#[derive(Clone)]
pub struct CdpConnection {
    cmd_tx: mpsc::Sender<PendingCall>,
}

impl CdpConnection {
    /// Connect to a browser WebSocket endpoint and spawn the connection task.
    pub async fn connect(ws_url: &str) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
        let (ws, _) = connect_async(ws_url).await.map_err(|e| {
            PilothouseError::CdpConnectionFailed(format!("WebSocket connect failed: {e}"))
        })?;

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(ws, cmd_rx, event_tx));

        Ok((Self { cmd_tx }, event_rx))
    }

    /// Send a browser-level command and wait for its reply.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.send(method, params, None).await
    }

    /// Send a command scoped to an attached target session.
    pub async fn call_in_session(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        self.send(method, params, Some(session_id.to_string())).await
    }

    async fn send(&self, method: &str, params: Value, session_id: Option<String>) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        let call = PendingCall {
            method: method.to_string(),
            params,
            session_id,
            reply,
        };
        self.cmd_tx.send(call).await.map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    /// A connection whose task never existed; every call fails. Lets catalog
    /// tests run without a live browser.
    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        let (cmd_tx, _) = mpsc::channel(1);
        Self { cmd_tx }
    }
}

fn closed() -> PilothouseError {
    PilothouseError::CdpConnectionFailed("browser connection is closed".to_string())
}

async fn run_connection(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut cmd_rx: mpsc::Receiver<PendingCall>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<u64, oneshot::Sender<Result<Value>>> = HashMap::new();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            call = cmd_rx.recv() => match call {
                Some(call) => {
                    let id = next_id;
                    next_id += 1;
                    let mut frame = json!({
                        "id": id,
                        "method": call.method,
                        "params": call.params,
                    });
                    if let Some(session) = call.session_id {
                        frame["sessionId"] = Value::String(session);
                    }
                    if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                        let _ = call.reply.send(Err(closed()));
                        break;
                    }
                    pending.insert(id, call.reply);
                }
                // Every CdpConnection clone is gone; close the socket.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) {
                        dispatch_frame(frame, &mut pending, &event_tx);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("CDP socket error: {}", e);
                    break;
                }
            },
        }
    }

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(closed()));
    }
    let _ = event_tx.send(EngineEvent::ConnectionLost);
}

fn dispatch_frame(
    frame: Value,
    pending: &mut HashMap<u64, oneshot::Sender<Result<Value>>>,
    event_tx: &mpsc::UnboundedSender<EngineEvent>,
) {
    // Command reply
    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        if let Some(reply) = pending.remove(&id) {
            let outcome = match frame.get("error") {
                Some(err) => {
                    let message = err
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown CDP error");
                    Err(PilothouseError::CdpError(message.to_string()))
                }
                None => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = reply.send(outcome);
        }
        return;
    }

    // Protocol event
    let Some(method) = frame.get("method").and_then(Value::as_str) else {
        return;
    };
    let params = frame.get("params").cloned().unwrap_or(Value::Null);
    if let Some(event) = parse_event(method, &params) {
        let _ = event_tx.send(event);
    }
}

fn parse_event(method: &str, params: &Value) -> Option<EngineEvent> {
    match method {
        "Target.targetCreated" => {
            let info = params.get("targetInfo")?;
            Some(EngineEvent::TargetCreated {
                target_id: str_field(info, "targetId")?,
                kind: str_field(info, "type")?,
                url: str_field(info, "url").unwrap_or_default(),
                browser_context_id: str_field(info, "browserContextId"),
                opener_id: str_field(info, "openerId"),
            })
        }
        "Target.targetDestroyed" => Some(EngineEvent::TargetDestroyed {
            target_id: str_field(params, "targetId")?,
        }),
        "Target.targetInfoChanged" => {
            let info = params.get("targetInfo")?;
            Some(EngineEvent::TargetInfoChanged {
                target_id: str_field(info, "targetId")?,
                url: str_field(info, "url")?,
            })
        }
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}
