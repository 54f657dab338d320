// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Lane
//!
//! Fixed priority classes for scheduled work.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Ordering of [`Scheduler`](crate::application::scheduler::Scheduler) queues

use serde::{Deserialize, Serialize};

/// Scheduling priority class.
///
/// The derived `Ord` follows declaration order, so `System < Interactive < Background`
/// in comparison terms while `System` is the *highest* priority. Use
/// [`Lane::PRIORITY_ORDER`] when iterating lanes for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    System,
    Interactive,
    Background,
}

impl Lane {
    /// Lanes in the order `flush()` drains them.
    pub const PRIORITY_ORDER: [Lane; 3] = [Lane::System, Lane::Interactive, Lane::Background];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::System => "system",
            Lane::Interactive => "interactive",
            Lane::Background => "background",
        }
    }

    /// Index into per-lane storage.
    pub(crate) fn index(&self) -> usize {
        match self {
            Lane::System => 0,
            Lane::Interactive => 1,
            Lane::Background => 2,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_is_system_interactive_background() {
        assert_eq!(
            Lane::PRIORITY_ORDER,
            [Lane::System, Lane::Interactive, Lane::Background]
        );
        assert!(Lane::System < Lane::Interactive);
        assert!(Lane::Interactive < Lane::Background);
    }

    #[test]
    fn test_lane_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Lane::Interactive).unwrap(), "\"interactive\"");
    }
}
