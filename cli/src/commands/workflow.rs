// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Workflow command implementations
//!
//! # Commands
//!
//! - `crevnclaw workflow validate <file>` - Parse and validate a workflow definition
//! - `crevnclaw workflow status` - Show the frozen workflow state, if any

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use crevnclaw_kernel::domain::node_config::KernelConfig;
use crevnclaw_kernel::domain::repository::WorkflowStateStore;
use crevnclaw_kernel::domain::workflow::{StepKind, WorkflowDefinition, WorkflowStatus};
use crevnclaw_kernel::infrastructure::{FileWorkflowStateStore, WorkflowParser};

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Validate a workflow definition file
    Validate {
        /// Path to workflow YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show the frozen workflow state
    Status {
        /// Frozen-state file (defaults to the configured freeze path)
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: WorkflowCommand, home: Option<&Path>) -> Result<()> {
    match command {
        WorkflowCommand::Validate { file } => validate_workflow(file),
        WorkflowCommand::Status { file } => show_status(file, home).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("{}", "📋 Validating workflow definition...".cyan());
    println!("   File: {}", file.display());
    println!();

    let workflow = WorkflowParser::parse_file(&file).context("Failed to parse workflow definition")?;

    println!("{}", "✓ Workflow is valid!".green().bold());
    println!();
    println!("Workflow Details:");
    println!("  Name:        {}", workflow.name);
    if !workflow.description.is_empty() {
        println!("  Description: {}", workflow.description);
    }
    println!("  Steps:       {}", workflow.steps.len());
    if let Some(first) = workflow.first_step() {
        println!("  Entry:       {}", first.id);
    }
    println!("  Approvals:   {}", count_kind(&workflow, StepKind::Approval));
    println!("  Terminal:    {} step(s)", terminal_steps(&workflow).len());

    Ok(())
}

async fn show_status(file: Option<PathBuf>, home: Option<&Path>) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => default_freeze_path(home),
    };
    let store = FileWorkflowStateStore::new(&path);

    if !store.has_frozen_state().await {
        println!("{}", "No frozen workflow.".yellow());
        println!("   Looked in: {}", path.display());
        return Ok(());
    }

    let state = store.thaw().await.context("Failed to read frozen workflow state")?;

    let status = match state.status {
        WorkflowStatus::WaitingApproval => state.status.to_string().yellow().bold(),
        WorkflowStatus::Failed => state.status.to_string().red().bold(),
        WorkflowStatus::Completed => state.status.to_string().green().bold(),
        WorkflowStatus::Running => state.status.to_string().cyan(),
    };

    println!("{}", "Frozen Workflow:".bold());
    println!("  Workflow:    {}", state.workflow_name);
    println!("  Step:        {}", state.current_step);
    println!("  Status:      {}", status);
    if let Some(frozen_at) = state.frozen_at {
        println!("  Frozen at:   {}", frozen_at.to_rfc3339());
    }
    if !state.context.is_empty() {
        println!("  Context:");
        println!("{}", serde_json::to_string_pretty(&state.context)?);
    }

    Ok(())
}

/// Configured freeze path, or the default location when config.json is unusable.
fn default_freeze_path(home: Option<&Path>) -> PathBuf {
    let home = KernelConfig::resolve_home(home);
    match KernelConfig::load(&home) {
        Ok(config) => config.freeze_path(&home),
        Err(e) => {
            tracing::debug!(error = %e, "Falling back to default freeze path");
            home.join("workflow-state.json")
        }
    }
}

fn count_kind(workflow: &WorkflowDefinition, kind: StepKind) -> usize {
    workflow.steps.iter().filter(|s| s.kind == kind).count()
}

/// Steps that hand control to nobody.
fn terminal_steps(workflow: &WorkflowDefinition) -> Vec<&str> {
    workflow
        .steps
        .iter()
        .filter(|s| s.successors().next().is_none())
        .map(|s| s.id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: &str = r#"
name: release
description: Build, review and ship
steps:
  - id: build
    name: Build
    type: action
    action: run_build
    next: review
  - id: review
    name: Review
    type: approval
    on_approve: deploy
    on_reject: cancel
  - id: deploy
    name: Deploy
    type: action
    action: deploy
  - id: cancel
    name: Cancel
    type: action
    action: notify_cancel
"#;

    #[test]
    fn test_step_summaries() {
        let workflow = WorkflowParser::parse_yaml(RELEASE).unwrap();
        assert_eq!(count_kind(&workflow, StepKind::Approval), 1);
        assert_eq!(count_kind(&workflow, StepKind::Action), 3);
        assert_eq!(terminal_steps(&workflow), vec!["deploy", "cancel"]);
    }

    #[test]
    fn test_validate_workflow_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("release.yaml");
        std::fs::write(&file, RELEASE).unwrap();
        assert!(validate_workflow(file).is_ok());

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "name: broken\ndescription: x\nsteps: []\n").unwrap();
        assert!(validate_workflow(broken).is_err());
    }

    #[test]
    fn test_default_freeze_path_without_config() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            default_freeze_path(Some(dir.path())),
            dir.path().join("workflow-state.json")
        );
    }
}
