// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Issuer stamped on every token the kernel signs.
pub const TOKEN_ISSUER: &str = "crevnclaw";

/// Default lifetime of gateway and pairing tokens.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// File name of the pairing credential under the agent home directory.
pub const PAIRING_TOKEN_FILENAME: &str = ".pairing-token";

/// Payload of a pairing credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingClaims {
    #[serde(rename = "type")]
    pub token_type: String,
    pub iss: String,
    pub exp: i64,
    /// Claims added by other issuers (e.g. `iat`), kept so validation is lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Invalid pairing token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to access pairing token at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
