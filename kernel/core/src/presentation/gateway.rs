// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Gateway
//!
//! Authenticated WebSocket front door of the kernel.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Admit clients, surface their frames as events, fan results back out
//!
//! # Admission
//!
//! Checked on the HTTP upgrade request, before any socket exists:
//!
//! 1. `Origin`, when present and the allow-list is non-empty, must be listed.
//! 2. `Authorization: Bearer <token>` must carry a token signed with the
//!    gateway secret that has not expired.
//!
//! Any failure answers `401 Unauthorized` with a short reason; the client set
//! is never touched.
//!
//! # Connections
//!
//! Each admitted socket gets a task that owns it and an outbound queue. The
//! client map only holds queue senders, so `broadcast`, `send_to` and
//! `shutdown` never block on a slow socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, ORIGIN};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::events::GatewayEvent;
use crate::domain::pairing::{DEFAULT_TOKEN_TTL, TOKEN_ISSUER};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::pairing::{expiry_from_now, sign_hs256, verify_hs256};

const INVALID_JSON_REPLY: &str = r#"{"error":"Invalid JSON"}"#;
const SHUTDOWN_REASON: &str = "Server shutting down";

/// Identifies one admitted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_address: String,
    /// 0 picks a free port; see the address returned by `start()`.
    pub port: u16,
    pub jwt_secret: String,
    pub origin_allowlist: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Origin {0} not allowed")]
    OriginNotAllowed(String),

    #[error("Missing or invalid Authorization header")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to bind gateway to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Gateway already started")]
    AlreadyStarted,

    #[error("Gateway server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to sign token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

enum Outbound {
    Frame(String),
    Close { code: u16, reason: &'static str },
}

struct GatewayShared {
    config: GatewayConfig,
    clients: RwLock<HashMap<ClientId, mpsc::UnboundedSender<Outbound>>>,
    event_bus: Arc<EventBus>,
    shutdown: CancellationToken,
}

impl GatewayShared {
    fn admit(&self, headers: &HeaderMap) -> Result<Map<String, Value>, AuthError> {
        if let Some(origin) = headers.get(ORIGIN) {
            let origin = String::from_utf8_lossy(origin.as_bytes());
            let allowlist = &self.config.origin_allowlist;
            if !allowlist.is_empty() && !allowlist.iter().any(|allowed| *allowed == origin) {
                return Err(AuthError::OriginNotAllowed(origin.into_owned()));
            }
        }

        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingToken)?;

        validate_token(token, &self.config.jwt_secret)
    }

    /// `None` once shutdown has begun. The token is checked under the client
    /// lock that `shutdown` drains with, so a late upgrade cannot slip in.
    fn register(&self, client_id: ClientId) -> Option<mpsc::UnboundedReceiver<Outbound>> {
        let mut clients = self.clients.write();
        if self.shutdown.is_cancelled() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        clients.insert(client_id, tx);
        metrics::gauge!("crevnclaw_gateway_clients").set(clients.len() as f64);
        Some(rx)
    }

    fn unregister(&self, client_id: ClientId) {
        let mut clients = self.clients.write();
        clients.remove(&client_id);
        metrics::gauge!("crevnclaw_gateway_clients").set(clients.len() as f64);
    }
}

pub struct GatewayServer {
    shared: Arc<GatewayShared>,
    server: tokio::sync::Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            shared: Arc::new(GatewayShared {
                config,
                clients: RwLock::new(HashMap::new()),
                event_bus,
                shutdown: CancellationToken::new(),
            }),
            server: tokio::sync::Mutex::new(None),
        }
    }

    /// Bind the listener and start accepting connections in the background.
    pub async fn start(&self) -> Result<SocketAddr, GatewayError> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Err(GatewayError::AlreadyStarted);
        }

        let address = format!("{}:{}", self.shared.config.bind_address, self.shared.config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| GatewayError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GatewayError::Bind { address, source })?;

        let app = Router::new()
            .route("/", get(upgrade_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.shared.clone());

        let shutdown = self.shared.shutdown.clone();
        *server = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        }));

        info!("Gateway listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Sign a bearer token for this gateway. `iss` and `exp` are always
    /// overwritten.
    pub fn generate_token(&self, claims: Map<String, Value>) -> Result<String, GatewayError> {
        Ok(generate_token(claims, &self.shared.config.jwt_secret)?)
    }

    pub fn validate_token(&self, token: &str) -> Result<Map<String, Value>, AuthError> {
        validate_token(token, &self.shared.config.jwt_secret)
    }

    /// Serialize `payload` once and queue it on every open connection.
    /// Returns the number of connections it was queued on.
    pub fn broadcast<T: Serialize + ?Sized>(&self, payload: &T) -> Result<usize, GatewayError> {
        let text = serde_json::to_string(payload)?;
        let clients = self.shared.clients.read();
        let delivered = clients
            .values()
            .filter(|tx| tx.send(Outbound::Frame(text.clone())).is_ok())
            .count();
        debug!(clients = delivered, "Broadcast frame");
        Ok(delivered)
    }

    pub fn send_to<T: Serialize + ?Sized>(&self, client_id: ClientId, payload: &T) -> Result<(), GatewayError> {
        let text = serde_json::to_string(payload)?;
        let clients = self.shared.clients.read();
        clients
            .get(&client_id)
            .and_then(|tx| tx.send(Outbound::Frame(text)).ok())
            .ok_or(GatewayError::UnknownClient(client_id))
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.read().len()
    }

    /// Close every connection with 1001, then stop the listener and wait for it.
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        let clients: Vec<_> = {
            let mut clients = self.shared.clients.write();
            self.shared.shutdown.cancel();
            clients.drain().collect()
        };
        for (client_id, tx) in clients {
            debug!(client_id = %client_id, "Closing client for shutdown");
            let _ = tx.send(Outbound::Close {
                code: close_code::AWAY,
                reason: SHUTDOWN_REASON,
            });
        }
        metrics::gauge!("crevnclaw_gateway_clients").set(0.0);

        let handle = self.server.lock().await.take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| GatewayError::Serve(std::io::Error::other(e)))?
                .map_err(GatewayError::Serve)?;
        }

        info!("Gateway stopped");
        Ok(())
    }
}

pub fn generate_token(mut claims: Map<String, Value>, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    claims.insert("iss".to_string(), Value::String(TOKEN_ISSUER.to_string()));
    claims.insert("exp".to_string(), Value::from(expiry_from_now(DEFAULT_TOKEN_TTL)));
    sign_hs256(&claims, secret)
}

/// Verify signature and expiry; returns every claim in the token.
pub fn validate_token(token: &str, secret: &str) -> Result<Map<String, Value>, AuthError> {
    verify_hs256(token, secret).map_err(AuthError::InvalidToken)
}

async fn upgrade_handler(
    State(shared): State<Arc<GatewayShared>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(e) = shared.admit(&headers) {
        warn!(error = %e, "Rejected gateway connection");
        metrics::counter!("crevnclaw_gateway_rejected_total").increment(1);
        return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
    }

    let origin = headers
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    ws.on_upgrade(move |socket| handle_socket(shared, socket, origin))
}

async fn handle_socket(shared: Arc<GatewayShared>, mut socket: WebSocket, origin: Option<String>) {
    let client_id = ClientId::new();
    let Some(mut outbound) = shared.register(client_id) else {
        debug!(client_id = %client_id, "Upgrade completed during shutdown");
        let frame = CloseFrame {
            code: close_code::AWAY,
            reason: SHUTDOWN_REASON.into(),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
        return;
    };

    info!(client_id = %client_id, origin = ?origin, "Client connected");
    shared.event_bus.publish_gateway_event(GatewayEvent::ClientConnected {
        client_id: client_id.0,
        origin,
        connected_at: Utc::now(),
    });

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        report_client_error(&shared, client_id, e);
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame { code, reason: reason.into() };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !dispatch_frame(&shared, client_id, text.as_str().as_bytes()) {
                        if let Err(e) = sink.send(Message::Text(INVALID_JSON_REPLY.into())).await {
                            report_client_error(&shared, client_id, e);
                            break;
                        }
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if !dispatch_frame(&shared, client_id, &bytes) {
                        if let Err(e) = sink.send(Message::Text(INVALID_JSON_REPLY.into())).await {
                            report_client_error(&shared, client_id, e);
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // ping/pong are answered by the protocol layer
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    report_client_error(&shared, client_id, e);
                    break;
                }
            },
        }
    }

    shared.unregister(client_id);
    info!(client_id = %client_id, "Client disconnected");
    shared.event_bus.publish_gateway_event(GatewayEvent::ClientDisconnected {
        client_id: client_id.0,
        disconnected_at: Utc::now(),
    });
}

/// Publish a parsed frame. Returns false when the frame is not JSON.
fn dispatch_frame(shared: &GatewayShared, client_id: ClientId, data: &[u8]) -> bool {
    match serde_json::from_slice::<Value>(data) {
        Ok(message) => {
            shared.event_bus.publish_gateway_event(GatewayEvent::MessageReceived {
                client_id: client_id.0,
                message,
                received_at: Utc::now(),
            });
            true
        }
        Err(e) => {
            debug!(client_id = %client_id, error = %e, "Received non-JSON frame");
            false
        }
    }
}

fn report_client_error(shared: &GatewayShared, client_id: ClientId, error: axum::Error) {
    warn!(client_id = %client_id, error = %error, "Client transport error");
    shared.event_bus.publish_gateway_event(GatewayEvent::ClientError {
        client_id: client_id.0,
        error: error.to_string(),
    });
}
