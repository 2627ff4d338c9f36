//! Local HTTP / WebSocket surface for desktop front-ends.
//!
//! * `GET /health` returns the current pipeline state.
//! * `GET /ws` streams every [`StateEvent`] as JSON and accepts
//!   `{"type":"trigger"}` (same as pressing the hotkey) and `{"type":"ping"}`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::pipeline::{PipelineState, StateBroadcaster, StateEvent, TriggerSource};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// Start a new run, preempting the current one.
    Trigger,
    Ping,
}

/// Server → client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    State(StateEvent),
    Pong,
    Error { message: String },
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub state: PipelineState,
    pub generation: u64,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct ServerState {
    pub broadcaster: StateBroadcaster,
    pub triggers: mpsc::Sender<TriggerSource>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until the task is dropped.
pub async fn serve(config: &ServerConfig, state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
    log::info!("server: listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let current = state.broadcaster.current();
    Json(HealthResponse {
        status: "ok",
        state: current.state,
        generation: current.generation,
    })
}

async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

async fn send(socket: &mut WebSocket, msg: &WsOutgoing) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            log::warn!("server: could not encode {msg:?}: {e}");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    // The first event replays the current state.
    let mut events = state.broadcaster.subscribe();
    log::info!("server: client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    // Dropped by the broadcaster for falling behind.
                    log::debug!("server: client fell behind, closing");
                    break;
                };
                if !send(&mut socket, &WsOutgoing::State(event)).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_text(text.as_str(), &state) {
                            if !send(&mut socket, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::debug!("server: socket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    log::info!("server: client disconnected");
}

/// Handle one text frame; returns the reply, if any.
fn handle_text(text: &str, state: &ServerState) -> Option<WsOutgoing> {
    let incoming = match serde_json::from_str::<WsIncoming>(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            return Some(WsOutgoing::Error {
                message: format!("invalid message: {e}"),
            })
        }
    };

    match incoming {
        WsIncoming::Ping => Some(WsOutgoing::Pong),
        WsIncoming::Trigger => match state.triggers.try_send(TriggerSource::Interface) {
            Ok(()) => None,
            Err(mpsc::error::TrySendError::Full(_)) => Some(WsOutgoing::Error {
                message: "pipeline busy".into(),
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Some(WsOutgoing::Error {
                message: "pipeline stopped".into(),
            }),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn state(capacity: usize) -> (ServerState, mpsc::Receiver<TriggerSource>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            ServerState {
                broadcaster: StateBroadcaster::new(),
                triggers: tx,
            },
            rx,
        )
    }

    #[test]
    fn state_message_is_flat_json() {
        let event = StateEvent::new(PipelineState::Listening, "", 3);
        let json = serde_json::to_value(WsOutgoing::State(event)).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["state"], "listening");
        assert_eq!(json["generation"], 3);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn incoming_messages_parse() {
        assert_eq!(
            serde_json::from_str::<WsIncoming>(r#"{"type":"trigger"}"#).unwrap(),
            WsIncoming::Trigger
        );
        assert_eq!(
            serde_json::from_str::<WsIncoming>(r#"{"type":"ping"}"#).unwrap(),
            WsIncoming::Ping
        );
        assert!(serde_json::from_str::<WsIncoming>(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn trigger_forwards_interface_source() {
        let (state, mut rx) = state(4);
        assert!(handle_text(r#"{"type":"trigger"}"#, &state).is_none());
        assert_eq!(rx.try_recv().unwrap(), TriggerSource::Interface);
    }

    #[test]
    fn full_trigger_queue_reports_busy() {
        let (state, _rx) = state(1);
        assert!(handle_text(r#"{"type":"trigger"}"#, &state).is_none());
        assert!(matches!(
            handle_text(r#"{"type":"trigger"}"#, &state),
            Some(WsOutgoing::Error { message }) if message == "pipeline busy"
        ));
    }

    #[test]
    fn ping_and_garbage() {
        let (state, _rx) = state(1);
        assert!(matches!(
            handle_text(r#"{"type":"ping"}"#, &state),
            Some(WsOutgoing::Pong)
        ));
        assert!(matches!(
            handle_text("not json", &state),
            Some(WsOutgoing::Error { .. })
        ));
    }

    #[tokio::test]
    async fn health_reports_current_state() {
        let (state, _rx) = state(1);
        state
            .broadcaster
            .publish(StateEvent::new(PipelineState::Processing, "", 7));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(state))).await.unwrap();
        });

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["state"], "processing");
        assert_eq!(body["generation"], 7);
    }
}
