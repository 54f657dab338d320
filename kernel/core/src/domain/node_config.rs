// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

// Kernel Configuration Types
//
// Defines the `config.json` schema read at bootstrap:
// - Gateway listener and origin allow-list
// - Language-model provider list and the active provider
// - Circuit breaker thresholds
// - MCP tool servers to spawn
// - Sandbox limits handed to the action layer
// - Workflow freeze location and observability settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::circuit_breaker::CircuitBreakerConfig;
use crate::domain::mcp::McpServerConfig;

/// Name of the configuration file inside the agent home directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Top-level kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Gateway WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Gateway bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Origins allowed to open a gateway connection (empty disables the check)
    #[serde(default = "default_origin_allowlist")]
    pub origin_allowlist: Vec<String>,

    /// Language-model providers (at least one)
    pub providers: Vec<ProviderConfig>,

    /// Provider type used by the agent loop
    pub active_provider: String,

    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Bedrock,
    Anthropic,
    Openai,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Bedrock => "bedrock",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Openai => "openai",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Limits forwarded to the sandboxed code-execution layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,

    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub host_network: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            cpu_limit: default_cpu_limit(),
            memory_limit: default_memory_limit(),
            timeout_ms: default_sandbox_timeout_ms(),
            host_network: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Frozen-state file; relative paths resolve against the agent home.
    /// Default: `<home>/workflow-state.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("text" or "json")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions
fn default_port() -> u16 {
    3100
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_origin_allowlist() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_cpu_limit() -> f64 {
    1.0
}

fn default_memory_limit() -> String {
    "512m".to_string()
}

fn default_sandbox_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl KernelConfig {
    /// Resolve the agent home directory.
    ///
    /// Precedence: the explicit path, then `~/.crevnclaw`, then the working
    /// directory. The CLI fills `explicit` from `--home` or `CREVNCLAW_HOME`.
    pub fn resolve_home(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        dirs::home_dir()
            .map(|home| home.join(".crevnclaw"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load, apply environment overrides and validate `<home>/config.json`.
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILENAME);
        tracing::info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string (no overrides, no validation).
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CREVNCLAW_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: CREVNCLAW_PORT={}", port);
                    self.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for CREVNCLAW_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one provider must be configured".to_string(),
            ));
        }

        if !self
            .providers
            .iter()
            .any(|p| p.provider_type.as_str() == self.active_provider)
        {
            return Err(ConfigError::Invalid(format!(
                "Active provider '{}' not found in providers list",
                self.active_provider
            )));
        }

        let breaker = &self.circuit_breaker;
        if !(breaker.max_daily_spend > 0.0) {
            return Err(ConfigError::Invalid(
                "circuit_breaker.max_daily_spend must be positive".to_string(),
            ));
        }
        if breaker.max_loops_per_hour == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.max_loops_per_hour must be positive".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.mcp_servers {
            if server.name.is_empty() || server.command.is_empty() {
                return Err(ConfigError::Invalid(
                    "MCP servers need a name and a command".to_string(),
                ));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate MCP server name '{}'",
                    server.name
                )));
            }
        }

        Ok(())
    }

    /// Frozen workflow state location for this home directory.
    pub fn freeze_path(&self, home: &Path) -> PathBuf {
        match &self.workflow.freeze_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => home.join(path),
            None => home.join("workflow-state.json"),
        }
    }
}
