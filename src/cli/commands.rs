//! Command implementations for the CLI
//!
//! Commands return Results; printing is left to the caller.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::cloud::{CloudCall, CloudState, InMemoryCloud};
use crate::config::{load_deployment_file, ConfigError, DesiredState};
use crate::reconcile::{ConvergeReport, ReconcileError, Reconciler};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Outcome of a simulated convergence
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    #[serde(flatten)]
    pub report: ConvergeReport,
    /// Mutating calls issued, in order
    pub calls: Vec<CloudCall>,
    #[serde(skip)]
    pub state: CloudState,
}

/// Load and validate a deployment file
pub fn validate_deployment(path: &Path) -> CommandResult<DesiredState> {
    let config = load_deployment_file(path)?;
    Ok(config.desired_state()?)
}

/// Read a simulated account. A missing file is an empty account.
pub fn load_cloud_state(path: Option<&Path>) -> CommandResult<CloudState> {
    let Some(path) = path else {
        return Ok(CloudState::default());
    };
    if !path.exists() {
        return Ok(CloudState::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_cloud_state(path: &Path, state: &CloudState) -> CommandResult<()> {
    let content = serde_json::to_string_pretty(state)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Converge `desired` against an in-memory account seeded with `state`
pub async fn simulate(desired: &DesiredState, state: CloudState) -> CommandResult<SimulationReport> {
    let cloud = Arc::new(InMemoryCloud::from_state(state));
    let reconciler = Reconciler::with_retry(cloud.clone(), desired.retry.clone());

    let report = reconciler
        .converge(
            &desired.load_balancer,
            &desired.target_group,
            &desired.container,
        )
        .await?;

    Ok(SimulationReport {
        report,
        calls: cloud.journal().await,
        state: cloud.snapshot().await,
    })
}
