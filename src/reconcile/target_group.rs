use std::sync::Arc;

use tracing::{debug, info};

use super::error::{ReconcileError, ReconcileResult, ResourceKind};
use super::spec::{default_tags, TargetGroupSpec};
use crate::cloud::{CloudResourceClient, TargetGroup};

/// Creates target groups with the desired health check policy
pub struct TargetGroupProvisioner {
    client: Arc<dyn CloudResourceClient>,
}

impl TargetGroupProvisioner {
    pub fn new(client: Arc<dyn CloudResourceClient>) -> Self {
        Self { client }
    }

    /// Look up a target group by name
    pub async fn find(&self, name: &str) -> ReconcileResult<Option<TargetGroup>> {
        self.client
            .retrieve_target_group_by_name(name)
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::TargetGroup, name, "retrieve", e))
    }

    /// Create and tag a target group, returning its ARN
    pub async fn create(&self, spec: &TargetGroupSpec, vpc_id: &str) -> ReconcileResult<String> {
        info!(target_group = %spec.name, port = spec.port, "Creating target group");
        let target_group = self
            .client
            .create_target_group(
                &spec.name,
                spec.port,
                spec.protocol,
                vpc_id,
                &spec.health_check.to_health_check(),
            )
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::TargetGroup, &spec.name, "create", e))?;

        self.client
            .create_tags(&target_group.arn, &default_tags(&spec.name))
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::TargetGroup, &spec.name, "tag", e))?;

        Ok(target_group.arn)
    }

    /// Reuse a target group left behind by an earlier run, or create it
    pub async fn ensure(&self, spec: &TargetGroupSpec, vpc_id: &str) -> ReconcileResult<String> {
        match self.find(&spec.name).await? {
            Some(existing) => {
                debug!(target_group = %spec.name, arn = %existing.arn, "Reusing target group");
                Ok(existing.arn)
            }
            None => self.create(spec, vpc_id).await,
        }
    }
}
