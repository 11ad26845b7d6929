use std::sync::Arc;

use tracing::info;

use super::error::{ReconcileError, ReconcileResult, ResourceKind};
use super::spec::{default_tags, LoadBalancerSpec};
use crate::cloud::{CloudResourceClient, LoadBalancer};

/// Creates the internet-facing load balancer across every subnet of the VPC
pub struct LoadBalancerProvisioner {
    client: Arc<dyn CloudResourceClient>,
}

impl LoadBalancerProvisioner {
    pub fn new(client: Arc<dyn CloudResourceClient>) -> Self {
        Self { client }
    }

    pub async fn find(&self, name: &str) -> ReconcileResult<Option<LoadBalancer>> {
        self.client
            .retrieve_load_balancer_by_name(name)
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::LoadBalancer, name, "retrieve", e))
    }

    /// Create and tag the load balancer, returning its ARN
    pub async fn create(
        &self,
        spec: &LoadBalancerSpec,
        security_group_id: &str,
    ) -> ReconcileResult<String> {
        let subnet_ids = self
            .client
            .list_vpc_subnets(&spec.vpc_id)
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::Subnets, &spec.vpc_id, "list", e))?;

        info!(
            load_balancer = %spec.name,
            security_group = %security_group_id,
            subnets = subnet_ids.len(),
            "Creating load balancer"
        );
        let load_balancer = self
            .client
            .create_load_balancer(
                &spec.name,
                true,
                &[security_group_id.to_string()],
                &subnet_ids,
            )
            .await
            .map_err(|e| {
                ReconcileError::api(ResourceKind::LoadBalancer, &spec.name, "create", e)
            })?;

        self.client
            .create_tags(&load_balancer.arn, &default_tags(&spec.name))
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::LoadBalancer, &spec.name, "tag", e))?;

        Ok(load_balancer.arn)
    }
}
