// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Pairing credential issuance.
//!
//! A pairing token is an HS256 JWT `{type: "pairing", iss: "crevnclaw", exp}`
//! stored as plain text in `<home>/.pairing-token`, readable only by the owner.
//! Local clients read it to authenticate against the gateway.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Map;
use tracing::info;

use crate::domain::pairing::{PairingClaims, PairingError, DEFAULT_TOKEN_TTL, PAIRING_TOKEN_FILENAME, TOKEN_ISSUER};

pub struct PairingOptions {
    pub secret: String,
    pub home: PathBuf,
    pub ttl: Duration,
}

impl PairingOptions {
    pub fn new(secret: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            secret: secret.into(),
            home: home.into(),
            ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

pub fn token_path(home: &Path) -> PathBuf {
    home.join(PAIRING_TOKEN_FILENAME)
}

/// Sign a fresh pairing token and write it to the home directory.
pub fn generate(options: &PairingOptions) -> Result<String, PairingError> {
    let claims = PairingClaims {
        token_type: "pairing".to_string(),
        iss: TOKEN_ISSUER.to_string(),
        exp: expiry_from_now(options.ttl),
        extra: Map::new(),
    };
    let token = sign_hs256(&claims, &options.secret)?;

    let path = token_path(&options.home);
    write_owner_only(&path, token.as_bytes()).map_err(|source| PairingError::Io {
        path: path.display().to_string(),
        source,
    })?;

    info!(path = %path.display(), "Wrote pairing token");
    Ok(token)
}

/// Verify signature and expiry.
pub fn validate(token: &str, secret: &str) -> Result<PairingClaims, PairingError> {
    Ok(verify_hs256(token, secret)?)
}

/// Contents of the pairing token file, surrounding whitespace removed.
pub fn read_token(home: &Path) -> Result<String, PairingError> {
    let path = token_path(home);
    let raw = fs::read_to_string(&path).map_err(|source| PairingError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(raw.trim().to_string())
}

pub(crate) fn expiry_from_now(ttl: Duration) -> i64 {
    Utc::now().timestamp() + ttl.as_secs() as i64
}

pub(crate) fn sign_hs256<T: Serialize>(claims: &T, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub(crate) fn verify_hs256<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

#[cfg(unix)]
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-with-enough-entropy";

    #[test]
    fn test_generate_writes_verifiable_token() {
        let home = tempfile::tempdir().unwrap();
        let token = generate(&PairingOptions::new(SECRET, home.path())).unwrap();

        assert_eq!(read_token(home.path()).unwrap(), token);

        let claims = validate(&token, SECRET).unwrap();
        assert_eq!(claims.token_type, "pairing");
        assert_eq!(claims.iss, "crevnclaw");
        let remaining = claims.exp - Utc::now().timestamp();
        assert!((86_390..=86_400).contains(&remaining), "{remaining}");
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let home = tempfile::tempdir().unwrap();
        let path = token_path(home.path());
        fs::write(&path, "stale").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        generate(&PairingOptions::new(SECRET, home.path())).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let home = tempfile::tempdir().unwrap();
        let token = generate(&PairingOptions::new(SECRET, home.path())).unwrap();

        assert!(matches!(
            validate(&token, "another-secret"),
            Err(PairingError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = PairingClaims {
            token_type: "pairing".to_string(),
            iss: TOKEN_ISSUER.to_string(),
            exp: Utc::now().timestamp() - 60,
            extra: Map::new(),
        };
        let token = sign_hs256(&claims, SECRET).unwrap();

        assert!(validate(&token, SECRET).is_err());
    }

    #[test]
    fn test_read_token_trims_and_reports_missing() {
        let home = tempfile::tempdir().unwrap();
        assert!(matches!(read_token(home.path()), Err(PairingError::Io { .. })));

        fs::write(token_path(home.path()), "abc.def.ghi\n").unwrap();
        assert_eq!(read_token(home.path()).unwrap(), "abc.def.ghi");
    }
}
