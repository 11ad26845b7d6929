//! Top-level reconciliation
//!
//! The current topology is read once and resolved into a [`Topology`], then
//! a single handler per variant converges it:
//!
//! ```text
//!   load balancer?  target group?   path
//!   yes             yes             verify a listener joins them (read-only)
//!   yes             no              target group -> listeners
//!   no              (not checked)   target group -> security group
//!                                   -> load balancer -> listeners
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::drift::{DriftDetector, DriftOutcome};
use super::error::{ReconcileError, ReconcileResult};
use super::listener::ListenerBinder;
use super::load_balancer::LoadBalancerProvisioner;
use super::retry::RetryPolicy;
use super::security_group::SecurityGroupProvisioner;
use super::spec::{ContainerBinding, LoadBalancerBinding, LoadBalancerSpec, TargetGroupSpec};
use super::target_group::TargetGroupProvisioner;
use crate::cloud::{CloudResourceClient, LoadBalancer, TargetGroup};

/// Existing resources found at the start of a run
#[derive(Debug, Clone, PartialEq)]
pub enum Topology {
    BothExist {
        load_balancer: LoadBalancer,
        target_group: TargetGroup,
    },
    LoadBalancerOnly {
        load_balancer: LoadBalancer,
    },
    Neither,
}

/// Result of [`Reconciler::converge`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergeReport {
    pub binding: LoadBalancerBinding,
    pub health_check: DriftOutcome,
}

/// Converges load balancer, target group, listeners and security group to the
/// desired specs. Holds no state between runs.
pub struct Reconciler {
    security_groups: SecurityGroupProvisioner,
    target_groups: TargetGroupProvisioner,
    load_balancers: LoadBalancerProvisioner,
    listeners: ListenerBinder,
    drift: DriftDetector,
}

impl Reconciler {
    pub fn new(client: Arc<dyn CloudResourceClient>) -> Self {
        Self::with_retry(client, RetryPolicy::default())
    }

    pub fn with_retry(client: Arc<dyn CloudResourceClient>, retry: RetryPolicy) -> Self {
        Self {
            security_groups: SecurityGroupProvisioner::new(client.clone(), retry),
            target_groups: TargetGroupProvisioner::new(client.clone()),
            load_balancers: LoadBalancerProvisioner::new(client.clone()),
            listeners: ListenerBinder::new(client.clone()),
            drift: DriftDetector::new(client),
        }
    }

    /// Inspect which resources exist. The target group is only looked up when
    /// the load balancer exists.
    pub async fn resolve_topology(
        &self,
        load_balancer: &LoadBalancerSpec,
        target_group: &TargetGroupSpec,
    ) -> ReconcileResult<Topology> {
        let Some(lb) = self.load_balancers.find(&load_balancer.name).await? else {
            return Ok(Topology::Neither);
        };

        let topology = match self.target_groups.find(&target_group.name).await? {
            Some(tg) => Topology::BothExist {
                load_balancer: lb,
                target_group: tg,
            },
            None => Topology::LoadBalancerOnly { load_balancer: lb },
        };
        Ok(topology)
    }

    /// Converge the resource graph and return the binding for the service.
    pub async fn reconcile(
        &self,
        load_balancer: &LoadBalancerSpec,
        target_group: &TargetGroupSpec,
        container: &ContainerBinding,
    ) -> ReconcileResult<LoadBalancerBinding> {
        let topology = self.resolve_topology(load_balancer, target_group).await?;

        let target_group_arn = match topology {
            Topology::BothExist {
                load_balancer: lb,
                target_group: tg,
            } => self.verify_binding(load_balancer, &lb, target_group, &tg).await?,
            Topology::LoadBalancerOnly { load_balancer: lb } => {
                self.extend(load_balancer, &lb, target_group).await?
            }
            Topology::Neither => self.bootstrap(load_balancer, target_group).await?,
        };

        Ok(LoadBalancerBinding::new(target_group_arn, container))
    }

    /// Reconcile, then correct health check drift on the bound target group.
    pub async fn converge(
        &self,
        load_balancer: &LoadBalancerSpec,
        target_group: &TargetGroupSpec,
        container: &ContainerBinding,
    ) -> ReconcileResult<ConvergeReport> {
        let binding = self
            .reconcile(load_balancer, target_group, container)
            .await?;
        let health_check = self
            .check_drift(&binding.target_group_arn, target_group)
            .await?;
        Ok(ConvergeReport {
            binding,
            health_check,
        })
    }

    pub async fn check_drift(
        &self,
        target_group_arn: &str,
        target_group: &TargetGroupSpec,
    ) -> ReconcileResult<DriftOutcome> {
        self.drift
            .check(target_group_arn, &target_group.health_check)
            .await
    }

    /// Both exist: a listener must already join them. Nothing is created.
    async fn verify_binding(
        &self,
        spec: &LoadBalancerSpec,
        lb: &LoadBalancer,
        target_group: &TargetGroupSpec,
        tg: &TargetGroup,
    ) -> ReconcileResult<String> {
        if !self.listeners.is_bound(&lb.arn, &tg.arn).await? {
            return Err(ReconcileError::Conflict {
                load_balancer: spec.name.clone(),
                target_group: target_group.name.clone(),
            });
        }
        debug!(
            load_balancer = %spec.name,
            target_group = %target_group.name,
            "Load balancer already forwards to target group"
        );
        Ok(tg.arn.clone())
    }

    /// Load balancer exists without the target group: add the target group
    /// and point new listeners at it.
    async fn extend(
        &self,
        spec: &LoadBalancerSpec,
        lb: &LoadBalancer,
        target_group: &TargetGroupSpec,
    ) -> ReconcileResult<String> {
        info!(
            load_balancer = %spec.name,
            target_group = %target_group.name,
            "Adding target group to existing load balancer"
        );
        let tg_arn = self.target_groups.create(target_group, &spec.vpc_id).await?;
        self.listeners.bind(spec, &lb.arn, &tg_arn).await?;
        Ok(tg_arn)
    }

    /// Nothing exists: target group, security group, load balancer, listeners.
    /// The target group comes first so both ARNs are known for the listeners.
    async fn bootstrap(
        &self,
        spec: &LoadBalancerSpec,
        target_group: &TargetGroupSpec,
    ) -> ReconcileResult<String> {
        info!(load_balancer = %spec.name, "Provisioning load balancer");
        let tg_arn = self.target_groups.ensure(target_group, &spec.vpc_id).await?;
        let security_group_id = self.security_groups.ensure(spec).await?;
        let lb_arn = self.load_balancers.create(spec, &security_group_id).await?;
        self.listeners.bind(spec, &lb_arn, &tg_arn).await?;
        Ok(tg_arn)
    }
}
