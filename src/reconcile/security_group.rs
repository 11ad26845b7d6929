//! Load balancer security group provisioning
//!
//! An existing group is returned as-is; its rules are never touched. A new
//! group is only created once the cluster instances' group is known. It gets
//! tagged (retrying while it propagates), opened on the listener
//! ports, and granted access to the cluster instances' security group.

use std::sync::Arc;

use tracing::{debug, info};

use super::error::{ReconcileError, ReconcileResult, ResourceKind};
use super::retry::{retry_on_codes, RetryPolicy};
use super::spec::{default_tags, instance_security_group_name, LoadBalancerSpec};
use crate::cloud::{
    CloudResourceClient, RuleSource, SecurityGroupRule, ANY_IPV4, CODE_DUPLICATE_PERMISSION,
    CODE_GROUP_NOT_FOUND,
};

pub struct SecurityGroupProvisioner {
    client: Arc<dyn CloudResourceClient>,
    retry: RetryPolicy,
}

impl SecurityGroupProvisioner {
    pub fn new(client: Arc<dyn CloudResourceClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Return the id of the load balancer's security group, creating it if needed
    pub async fn ensure(&self, spec: &LoadBalancerSpec) -> ReconcileResult<String> {
        let name = &spec.security_group_name;
        let existing = self
            .client
            .retrieve_security_group_by_name_or_id(name)
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::SecurityGroup, name, "retrieve", e))?;

        match existing {
            Some(group) => {
                debug!(security_group = %name, id = %group.id, "Security group exists");
                Ok(group.id)
            }
            None => self.create(spec).await,
        }
    }

    async fn create(&self, spec: &LoadBalancerSpec) -> ReconcileResult<String> {
        let name = &spec.security_group_name;

        // the instances group must exist before the load balancer group is created
        let instances_name = instance_security_group_name(&spec.cluster_name);
        let instances = self
            .client
            .retrieve_security_group_by_name(&instances_name)
            .await
            .map_err(|e| {
                ReconcileError::api(ResourceKind::SecurityGroup, &instances_name, "retrieve", e)
            })?
            .ok_or_else(|| ReconcileError::ClusterNotInitialized {
                security_group: instances_name.clone(),
            })?;

        info!(security_group = %name, vpc = %spec.vpc_id, "Creating security group");
        let group_id = self
            .client
            .create_security_group(name, name, &spec.vpc_id)
            .await
            .map_err(|e| ReconcileError::api(ResourceKind::SecurityGroup, name, "create", e))?;

        let tags = default_tags(name);
        retry_on_codes(
            &self.retry,
            &[CODE_GROUP_NOT_FOUND],
            "tag_security_group",
            || self.client.create_security_group_tags(&group_id, &tags),
        )
        .await
        .map_err(|e| ReconcileError::api(ResourceKind::SecurityGroup, name, "tag", e))?;

        for port in spec.listener_ports() {
            let rule = SecurityGroupRule::tcp_port(port, RuleSource::Cidr(ANY_IPV4.to_string()));
            self.authorize(&group_id, name, &rule).await?;
        }

        let rule =
            SecurityGroupRule::tcp_range(0, 65535, RuleSource::SecurityGroup(group_id.clone()));
        self.authorize(&instances.id, &instances_name, &rule).await?;

        Ok(group_id)
    }

    /// Add an inbound rule; a rule that already exists counts as added.
    async fn authorize(
        &self,
        group_id: &str,
        group_name: &str,
        rule: &SecurityGroupRule,
    ) -> ReconcileResult<()> {
        info!(security_group = %group_name, rule = %rule, "Adding inbound rule");
        match self.client.add_inbound_rule(group_id, rule).await {
            Ok(()) => Ok(()),
            Err(e) if e.has_code(CODE_DUPLICATE_PERMISSION) => {
                debug!(security_group = %group_name, rule = %rule, "Inbound rule already present");
                Ok(())
            }
            Err(e) => Err(ReconcileError::api(
                ResourceKind::SecurityGroup,
                group_name,
                "add inbound rule to",
                e,
            )),
        }
    }
}
