// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `crevnclaw pair` - issue a pairing token outside of `serve`.
//!
//! The token is only accepted by a gateway signing with the same secret, so
//! this is meant to be used with a fixed `JWT_SECRET`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::Path;
use std::time::Duration;

use crevnclaw_kernel::infrastructure::pairing::{self, PairingOptions};
use crevnclaw_kernel::domain::node_config::KernelConfig;

#[derive(Args)]
pub struct PairArgs {
    /// Token lifetime in hours
    #[arg(long, default_value_t = 24)]
    ttl_hours: u64,
}

pub fn handle_command(args: PairArgs, home: Option<&Path>) -> Result<()> {
    let home = KernelConfig::resolve_home(home);
    std::fs::create_dir_all(&home)
        .with_context(|| format!("Failed to create home directory {}", home.display()))?;

    if std::env::var("JWT_SECRET").map_or(true, |s| s.is_empty()) {
        println!(
            "{}",
            "⚠ JWT_SECRET is not set; this token will not match a running gateway.".yellow()
        );
    }

    let mut options = PairingOptions::new(super::resolve_jwt_secret(), &home);
    options.ttl = Duration::from_secs(args.ttl_hours * 60 * 60);
    let token = pairing::generate(&options).context("Failed to issue pairing token")?;

    println!("{}", "✓ Pairing token issued".green().bold());
    println!("  Path:    {}", pairing::token_path(&home).display());
    println!("  Token:   {}...", token_prefix(&token));
    println!("  Expires: in {} hour(s)", args.ttl_hours);
    Ok(())
}

/// First 20 characters, for display only.
pub(crate) fn token_prefix(token: &str) -> &str {
    token.get(..20).unwrap_or(token)
}
