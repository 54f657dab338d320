// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! MCP Tool Host
//!
//! Manages subprocess tool servers speaking newline-delimited JSON-RPC 2.0
//! over stdin/stdout.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Request-correlated IPC with external tool servers
//!
//! # Correlation
//!
//! Each connection owns one reader task. It buffers stdout and only parses
//! complete lines, so a response split across two reads is reassembled before
//! decoding. A response whose `id` matches a pending request resolves it;
//! anything else (notifications, late replies to timed-out requests, lines
//! that are not JSON or not UTF-8) is logged and dropped. Once stdout hits
//! EOF the connection is marked closed and new requests fail immediately.
//!
//! ```text
//! call_tool ──► pending[id] = tx ──► stdin: {"id":id,...}\n
//!                                        │
//! reader task ◄── stdout lines ◄─────────┘
//!     └─► pending.remove(id).send(response)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::mcp::{
    JsonRpcMessage, McpError, McpServerConfig, ToolDefinition, MCP_PROTOCOL_VERSION, MCP_REQUEST_TIMEOUT,
};

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcMessage>>>>;

/// One live tool server.
struct ServerConnection {
    name: String,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingRequests,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl ServerConnection {
    async fn send(&self, message: &JsonRpcMessage) -> Result<(), McpError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.reader.abort();
        self.pending.lock().clear();

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                debug!(server = %self.name, error = %e, "Tool server already exited");
            }
            let _ = child.wait().await;
        }
    }
}

struct RegisteredTool {
    server: String,
    definition: ToolDefinition,
}

pub struct McpHost {
    servers: RwLock<HashMap<String, Arc<ServerConnection>>>,
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
    next_id: AtomicU64,
}

impl McpHost {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            tools: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawn the configured server, run the handshake and register its tools.
    pub async fn connect(&self, config: &McpServerConfig) -> Result<Vec<ToolDefinition>, McpError> {
        self.ensure_not_connected(&config.name).await?;

        info!(server = %config.name, command = %config.command, "Spawning MCP server");
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                server: config.name.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(McpError::Io(std::io::Error::other("child stdio not captured")));
        };

        if let Some(stderr) = child.stderr.take() {
            let server = config.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {}", line);
                }
            });
        }

        self.attach(&config.name, stdout, stdin, Some(child)).await
    }

    /// Handshake over an already-open transport. Used for in-process servers
    /// and tests; [`connect`](Self::connect) calls this after spawning.
    pub async fn connect_with_transport<R, W>(
        &self,
        name: &str,
        reader: R,
        writer: W,
    ) -> Result<Vec<ToolDefinition>, McpError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.ensure_not_connected(name).await?;
        self.attach(name, reader, writer, None).await
    }

    /// Issue `tools/call` against a connected server.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        args: Map<String, Value>,
    ) -> Result<Value, McpError> {
        let connection = self
            .servers
            .read()
            .await
            .get(server_name)
            .cloned()
            .ok_or_else(|| McpError::NotConnected(server_name.to_string()))?;

        debug!(server = %server_name, tool = %tool_name, "Calling MCP tool");
        self.request(
            &connection,
            "tools/call",
            json!({ "name": tool_name, "arguments": args }),
        )
        .await
    }

    pub async fn list_all_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .await
            .values()
            .map(|tool| tool.definition.clone())
            .collect()
    }

    /// Look up a tool by its `<server>:<tool>` key. Returns the owning server
    /// name alongside the definition.
    pub async fn resolve_tool(&self, key: &str) -> Option<(String, ToolDefinition)> {
        self.tools
            .read()
            .await
            .get(key)
            .map(|tool| (tool.server.clone(), tool.definition.clone()))
    }

    /// Names of connected servers, sorted.
    pub async fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Kill every server process and forget all tools.
    pub async fn disconnect_all(&self) {
        let connections: Vec<Arc<ServerConnection>> =
            self.servers.write().await.drain().map(|(_, c)| c).collect();
        self.tools.write().await.clear();

        for connection in connections {
            info!(server = %connection.name, "Disconnecting MCP server");
            connection.shutdown().await;
        }
    }

    async fn ensure_not_connected(&self, name: &str) -> Result<(), McpError> {
        if self.servers.read().await.contains_key(name) {
            return Err(McpError::AlreadyConnected(name.to_string()));
        }
        Ok(())
    }

    async fn attach<R, W>(
        &self,
        name: &str,
        reader: R,
        writer: W,
        child: Option<Child>,
    ) -> Result<Vec<ToolDefinition>, McpError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_responses(
            name.to_string(),
            reader,
            pending.clone(),
            closed.clone(),
        ));
        let connection = Arc::new(ServerConnection {
            name: name.to_string(),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            closed,
            reader,
            child: Mutex::new(child),
        });

        let tools = match self.handshake(&connection).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = %name, error = %e, "MCP handshake failed");
                connection.shutdown().await;
                return Err(e);
            }
        };

        {
            let mut servers = self.servers.write().await;
            if servers.contains_key(name) {
                drop(servers);
                connection.shutdown().await;
                return Err(McpError::AlreadyConnected(name.to_string()));
            }
            servers.insert(name.to_string(), connection);
        }

        let mut registry = self.tools.write().await;
        for tool in &tools {
            registry.insert(
                ToolDefinition::registry_key(name, &tool.name),
                RegisteredTool {
                    server: name.to_string(),
                    definition: tool.clone(),
                },
            );
        }
        info!(server = %name, tools = tools.len(), "MCP server connected");

        Ok(tools)
    }

    async fn handshake(&self, connection: &ServerConnection) -> Result<Vec<ToolDefinition>, McpError> {
        self.request(
            connection,
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "crevnclaw",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;

        connection
            .send(&JsonRpcMessage::notification("notifications/initialized", json!({})))
            .await?;

        let listing = self.request(connection, "tools/list", json!({})).await?;
        let tools = listing
            .get("tools")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(ToolDefinition::from_listing).collect())
            .unwrap_or_default();

        Ok(tools)
    }

    async fn request(&self, connection: &ServerConnection, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        connection.pending.lock().insert(id, tx);

        // The reader sets `closed` before clearing pending, so either we see
        // the flag here or our sender is dropped by that clear.
        if connection.closed.load(Ordering::SeqCst) {
            connection.pending.lock().remove(&id);
            return Err(McpError::TransportClosed {
                method: method.to_string(),
            });
        }

        if let Err(e) = connection.send(&JsonRpcMessage::request(id, method, params)).await {
            connection.pending.lock().remove(&id);
            return Err(e);
        }

        let outcome = match tokio::time::timeout(MCP_REQUEST_TIMEOUT, rx).await {
            Err(_) => {
                connection.pending.lock().remove(&id);
                warn!(server = %connection.name, method, id, "MCP request timed out");
                Err(McpError::Timeout {
                    method: method.to_string(),
                })
            }
            Ok(Err(_)) => Err(McpError::TransportClosed {
                method: method.to_string(),
            }),
            Ok(Ok(response)) => match response.error {
                Some(error) => Err(McpError::Protocol {
                    code: error.code,
                    message: error.message,
                }),
                None => Ok(response.result.unwrap_or(Value::Null)),
            },
        };

        let label = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!("crevnclaw_tool_requests_total", "method" => method.to_string(), "outcome" => label)
            .increment(1);

        outcome
    }
}

impl Default for McpHost {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_responses<R>(server: String, reader: R, pending: PendingRequests, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let message: JsonRpcMessage = match serde_json::from_slice(line.trim_ascii()) {
                    Ok(message) => message,
                    Err(e) => {
                        if !line.trim_ascii().is_empty() {
                            debug!(server = %server, error = %e, "Ignoring non JSON-RPC line");
                        }
                        continue;
                    }
                };
                // Server-initiated requests and notifications carry a method
                let Some(id) = message.id.filter(|_| message.method.is_none()) else {
                    debug!(server = %server, method = ?message.method, "Ignoring server message");
                    continue;
                };
                match pending.lock().remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(message);
                    }
                    None => debug!(server = %server, id, "Dropping unmatched response"),
                }
            }
            Err(e) => {
                warn!(server = %server, error = %e, "MCP stdout read failed");
                break;
            }
        }
    }

    debug!(server = %server, "MCP stdout closed");
    closed.store(true, Ordering::SeqCst);
    // Dropping the senders fails every in-flight request with TransportClosed
    pending.lock().clear();
}
