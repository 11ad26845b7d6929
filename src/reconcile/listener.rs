use std::sync::Arc;

use tracing::{debug, info};

use super::error::{ReconcileError, ReconcileResult, ResourceKind};
use super::spec::LoadBalancerSpec;
use crate::cloud::{CloudResourceClient, Listener};

/// Creates listeners between a load balancer and a target group, and checks
/// whether an existing load balancer already forwards to a target group.
pub struct ListenerBinder {
    client: Arc<dyn CloudResourceClient>,
}

/// Whether any listener's default action forwards to `target_group_arn`
pub fn forwards_to(listeners: &[Listener], target_group_arn: &str) -> bool {
    listeners.iter().any(|listener| {
        listener
            .default_actions
            .iter()
            .any(|action| action.target_group_arn.as_deref() == Some(target_group_arn))
    })
}

impl ListenerBinder {
    pub fn new(client: Arc<dyn CloudResourceClient>) -> Self {
        Self { client }
    }

    /// Check that some listener of the load balancer targets the target group
    pub async fn is_bound(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
    ) -> ReconcileResult<bool> {
        let listeners = self
            .client
            .retrieve_load_balancer_listeners(load_balancer_arn)
            .await
            .map_err(|e| {
                ReconcileError::api(
                    ResourceKind::LoadBalancer,
                    load_balancer_arn,
                    "retrieve listeners of",
                    e,
                )
            })?;
        debug!(
            load_balancer = %load_balancer_arn,
            listeners = listeners.len(),
            "Retrieved listeners"
        );
        Ok(forwards_to(&listeners, target_group_arn))
    }

    /// Create the configured HTTP and HTTPS listeners. Ports left at
    /// zero get no listener.
    pub async fn bind(
        &self,
        spec: &LoadBalancerSpec,
        load_balancer_arn: &str,
        target_group_arn: &str,
    ) -> ReconcileResult<()> {
        for binding in spec.listener_bindings(load_balancer_arn, target_group_arn) {
            info!(
                load_balancer = %spec.name,
                protocol = %binding.protocol,
                port = binding.port,
                "Adding listener"
            );
            self.client.create_listener(&binding).await.map_err(|e| {
                ReconcileError::api(
                    ResourceKind::Listener,
                    format!("{}:{}:{}", spec.name, binding.protocol, binding.port),
                    "create",
                    e,
                )
            })?;
        }
        Ok(())
    }
}
