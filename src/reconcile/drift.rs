//! Health check drift detection for target groups

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::error::{ReconcileError, ReconcileResult, ResourceKind};
use super::spec::HealthCheckPolicy;
use crate::cloud::CloudResourceClient;

/// What a drift check did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftOutcome {
    InSync,
    Updated,
}

impl fmt::Display for DriftOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftOutcome::InSync => f.write_str("in sync"),
            DriftOutcome::Updated => f.write_str("updated"),
        }
    }
}

pub struct DriftDetector {
    client: Arc<dyn CloudResourceClient>,
}

impl DriftDetector {
    pub fn new(client: Arc<dyn CloudResourceClient>) -> Self {
        Self { client }
    }

    /// Compare the live health check with `desired` and overwrite it with the
    /// whole desired policy if any field differs.
    pub async fn check(
        &self,
        target_group_arn: &str,
        desired: &HealthCheckPolicy,
    ) -> ReconcileResult<DriftOutcome> {
        let target_group = self
            .client
            .retrieve_target_group(target_group_arn)
            .await
            .map_err(|e| {
                ReconcileError::api(ResourceKind::TargetGroup, target_group_arn, "retrieve", e)
            })?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: ResourceKind::TargetGroup,
                name: target_group_arn.to_string(),
            })?;

        if desired.matches(&target_group.health_check) {
            debug!(target_group = %target_group.name, "Health check in sync");
            return Ok(DriftOutcome::InSync);
        }

        info!(
            target_group = %target_group.name,
            live = ?target_group.health_check,
            "Updating target group health check"
        );
        self.client
            .update_target_group_health_check(target_group_arn, &desired.to_health_check())
            .await
            .map_err(|e| {
                ReconcileError::api(ResourceKind::TargetGroup, target_group_arn, "update", e)
            })?;

        Ok(DriftOutcome::Updated)
    }
}
