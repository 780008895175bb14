//! WebSocket adapter (design §4.I): envelope `{type, id, timestamp, ...}`,
//! `subscribe/unsubscribe/send/broadcast`, server heartbeat at
//! `WS_HEARTBEAT_INTERVAL`. Generalizes the teacher's SSE stream
//! (`api/sse.rs`, a one-way broadcast-to-client feed) into a bidirectional
//! channel.

use super::middleware::{authenticate_and_throttle, RateLimiterRegistry};
use crate::actions::Action;
use crate::auth::{AuthGate, Credentials, Principal, TransportMetadata};
use crate::executor::ActionExecutor;
use crate::pool::{BrowserPool, PoolEvent};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct WsState {
    pub pool: BrowserPool,
    pub executor: Arc<ActionExecutor>,
    pub auth: Arc<dyn AuthGate>,
    pub limiter: Arc<RateLimiterRegistry>,
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe { id: String },
    Unsubscribe { id: String },
    Send { id: String, payload: serde_json::Value },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Ack { id: String, timestamp: chrono::DateTime<chrono::Utc> },
    Event { id: String, timestamp: chrono::DateTime<chrono::Utc>, event: PoolEvent },
    Response { id: String, timestamp: chrono::DateTime<chrono::Utc>, result: crate::actions::ActionResult },
    Heartbeat { timestamp: chrono::DateTime<chrono::Utc> },
    Error { id: String, timestamp: chrono::DateTime<chrono::Utc>, message: String },
}

async fn authenticate_ws(state: &WsState, headers: &HeaderMap) -> Result<Option<Principal>, crate::error::ErrorKind> {
    let credentials = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| Credentials::Bearer(token.to_string()))
        .or_else(|| {
            headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(|key| Credentials::ApiKey(key.to_string()))
        });
    let meta = TransportMetadata {
        remote_addr: None,
        user_agent: headers.get("user-agent").and_then(|v| v.to_str().ok()).map(str::to_string),
        protocol: "ws",
    };
    authenticate_and_throttle(state.auth.as_ref(), &state.limiter, "/ws", credentials, meta).await
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let principal = match authenticate_ws(&state, &headers).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return (axum::http::StatusCode::UNAUTHORIZED, "authentication required").into_response(),
        Err(err) => return (axum::http::StatusCode::from_u16(err.http_status()).unwrap_or(axum::http::StatusCode::UNAUTHORIZED), err.to_string()).into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, principal)).into_response()
}

async fn handle_socket(mut socket: WebSocket, state: WsState, principal: Principal) {
    let mut events = state.pool.subscribe();
    let mut subscribed = false;
    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let frame = ServerFrame::Heartbeat { timestamp: chrono::Utc::now() };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            event = events.recv(), if subscribed => {
                match event {
                    Ok(event) => {
                        let frame = ServerFrame::Event {
                            id: "pool-events".to_string(),
                            timestamp: chrono::Utc::now(),
                            event,
                        };
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Subscribe { id }) => {
                                subscribed = true;
                                let frame = ServerFrame::Ack { id, timestamp: chrono::Utc::now() };
                                if send_frame(&mut socket, &frame).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientFrame::Unsubscribe { id }) => {
                                subscribed = false;
                                let frame = ServerFrame::Ack { id, timestamp: chrono::Utc::now() };
                                if send_frame(&mut socket, &frame).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientFrame::Send { id, payload }) => {
                                let frame = match serde_json::from_value::<Action>(payload) {
                                    Ok(action) => {
                                        let result = state.executor.execute(action, &principal).await;
                                        ServerFrame::Response { id, timestamp: chrono::Utc::now(), result }
                                    }
                                    Err(err) => ServerFrame::Error {
                                        id,
                                        timestamp: chrono::Utc::now(),
                                        message: format!("malformed action payload: {err}"),
                                    },
                                };
                                if send_frame(&mut socket, &frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                let frame = ServerFrame::Error {
                                    id: "unknown".to_string(),
                                    timestamp: chrono::Utc::now(),
                                    message: format!("malformed frame: {err}"),
                                };
                                if send_frame(&mut socket, &frame).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text)).await
}
