// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `crevnclaw serve` - boot the kernel and run until a shutdown signal.
//!
//! Wiring:
//!
//! ```text
//! client frame ─► Gateway ─► MessageReceived ─► Coordinator
//!                                                  │ breaker tripped: bankrupt notice to sender
//!                                                  ▼
//!                                   Scheduler (Interactive lane) ─► MessageRouter ─► handlers
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use crevnclaw_kernel::application::{CircuitBreaker, MessageRouter, Scheduler};
use crevnclaw_kernel::domain::ledger::Ledger;
use crevnclaw_kernel::domain::message::{MessageType, WireMessage};
use crevnclaw_kernel::domain::node_config::KernelConfig;
use crevnclaw_kernel::domain::repository::WorkflowStateStore;
use crevnclaw_kernel::infrastructure::event_bus::EventBus;
use crevnclaw_kernel::infrastructure::pairing::{self, PairingOptions};
use crevnclaw_kernel::infrastructure::{FileWorkflowStateStore, InMemoryLedger, McpHost};
use crevnclaw_kernel::presentation::{Coordinator, GatewayConfig, GatewayServer};

use super::pair::token_prefix;

#[derive(Args)]
pub struct ServeArgs {
    /// Gateway port (overrides config.json)
    #[arg(long)]
    port: Option<u16>,
}

pub async fn handle_command(args: ServeArgs, home: Option<&Path>) -> Result<()> {
    let home = KernelConfig::resolve_home(home);
    info!(home = %home.display(), "Starting CrevnClaw kernel");

    let mut config = KernelConfig::load(&home).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let provider = config
        .providers
        .iter()
        .find(|p| p.provider_type.as_str() == config.active_provider)
        .with_context(|| {
            format!(
                "Active provider '{}' not found in providers list",
                config.active_provider
            )
        })?
        .clone();
    info!(provider = provider.provider_type.as_str(), model = %provider.model, "LLM provider selected");

    if config.observability.metrics.enabled {
        let addr = SocketAddr::from(([127, 0, 0, 1], config.observability.metrics.port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let jwt_secret = super::resolve_jwt_secret();
    let pairing_token = pairing::generate(&PairingOptions::new(jwt_secret.clone(), &home))
        .context("Failed to write pairing token")?;

    let event_bus = Arc::new(EventBus::with_default_capacity());

    let tool_host = Arc::new(McpHost::new());
    for server in &config.mcp_servers {
        match tool_host.connect(server).await {
            Ok(tools) => info!(server = %server.name, tools = tools.len(), "Tool server connected"),
            Err(e) => warn!(server = %server.name, error = %e, "Failed to connect tool server; skipping"),
        }
    }

    let workflow_store = FileWorkflowStateStore::new(config.freeze_path(&home));
    if workflow_store.has_frozen_state().await {
        info!(path = %workflow_store.path().display(), "Frozen workflow awaiting approval");
    }

    let ledger = Arc::new(InMemoryLedger::new());
    let gateway = Arc::new(GatewayServer::new(
        GatewayConfig {
            bind_address: config.bind_address.clone(),
            port: config.port,
            jwt_secret,
            origin_allowlist: config.origin_allowlist.clone(),
        },
        event_bus.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(event_bus.clone()));
    let router = Arc::new(MessageRouter::new());
    let breaker = Arc::new(CircuitBreaker::new(
        config.circuit_breaker.clone(),
        ledger.clone(),
        event_bus.clone(),
    ));

    register_handlers(
        &router,
        &gateway,
        &breaker,
        ledger,
        provider.provider_type.as_str(),
        &provider.model,
    );

    // Subscribe before the listener opens so no connection event is missed
    let coordinator = Coordinator::new(gateway.clone(), scheduler, router, breaker)
        .spawn(event_bus.subscribe());

    let addr = gateway.start().await.context("Failed to start gateway")?;
    println!(
        "{} ws://{}",
        "CrevnClaw Gateway listening on".green().bold(),
        addr
    );
    println!("Pairing token: {}", pairing::token_path(&home).display());
    println!("Connect with token: {}...", token_prefix(&pairing_token));

    shutdown_signal().await;
    info!("Shutting down");

    gateway.shutdown().await.context("Gateway shutdown failed")?;
    tool_host.disconnect_all().await;
    coordinator.abort();

    info!("Kernel stopped");
    Ok(())
}

fn register_handlers(
    router: &MessageRouter,
    gateway: &Arc<GatewayServer>,
    breaker: &Arc<CircuitBreaker>,
    ledger: Arc<InMemoryLedger>,
    provider: &str,
    model: &str,
) {
    router.on_error(|err| {
        error!(error = %err, "Router error");
    });

    // Every chat turn starts one agent loop
    let loops = ledger.clone();
    let provider = provider.to_string();
    let model = model.to_string();
    router.on_type(MessageType::Chat, move |_| {
        loops.record(0.0, 0, 0, &provider, &model);
    });

    let gateway = gateway.clone();
    let breaker = breaker.clone();
    router.on_type(MessageType::Status, move |_| {
        let reply = status_report(gateway.client_count(), ledger.as_ref(), breaker.trip_reason());
        if let Err(e) = gateway.broadcast(&reply) {
            warn!(error = %e, "Failed to broadcast status");
        }
    });
}

fn status_report(clients: usize, ledger: &dyn Ledger, trip_reason: Option<String>) -> WireMessage {
    let mut payload = Map::new();
    payload.insert("clients".to_string(), json!(clients));
    payload.insert("daily_spend".to_string(), json!(ledger.daily_spend()));
    payload.insert("hourly_loops".to_string(), json!(ledger.hourly_loop_count()));
    payload.insert("tripped".to_string(), json!(trip_reason.is_some()));
    payload.insert(
        "trip_reason".to_string(),
        trip_reason.map_or(Value::Null, Value::String),
    );
    WireMessage::new(MessageType::Status, payload)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
