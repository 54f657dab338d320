// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the CrevnClaw CLI

pub mod pair;
pub mod serve;
pub mod workflow;

pub use self::pair::PairArgs;
pub use self::serve::ServeArgs;
pub use self::workflow::WorkflowCommand;

/// Signing secret for gateway and pairing tokens.
///
/// `JWT_SECRET` when set and non-empty, otherwise 32 random bytes hex-encoded.
/// A random secret invalidates every token issued by a previous process.
pub(crate) fn resolve_jwt_secret() -> String {
    match std::env::var("JWT_SECRET") {
        Ok(secret) if !secret.is_empty() => secret,
        _ => hex::encode(rand::random::<[u8; 32]>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_secret_is_64_hex_chars() {
        if std::env::var("JWT_SECRET").is_ok() {
            return;
        }
        let a = resolve_jwt_secret();
        let b = resolve_jwt_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
