//! Desired-state types consumed by the reconciler

use serde::{Deserialize, Serialize};

use crate::cloud::{HealthCheck, ListenerBinding, Protocol, Tags};

/// Port a new target group is declared with. Traffic is routed by the
/// listener and the service attachment, not by this port.
pub const PROVISIONAL_TARGET_PORT: u16 = 80;

/// Value of the `managed-by` tag on every resource this crate creates
pub const MANAGED_BY: &str = env!("CARGO_PKG_NAME");

/// Desired load balancer configuration. The name is the identity key and must
/// stay stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub vpc_id: String,
    /// Name or id of the load balancer's security group
    pub security_group_name: String,
    /// Cluster whose instances must accept traffic from the load balancer
    pub cluster_name: String,
    /// HTTP listener port; 0 means no HTTP listener
    pub http_port: u16,
    /// HTTPS listener port; 0 means no HTTPS listener
    pub https_port: u16,
    pub certificate_arn: Option<String>,
}

impl LoadBalancerSpec {
    /// Listener ports that are configured, in creation order
    pub fn listener_ports(&self) -> Vec<u16> {
        [self.http_port, self.https_port]
            .into_iter()
            .filter(|p| *p > 0)
            .collect()
    }

    /// Listener requests for the configured ports, HTTP first
    pub fn listener_bindings(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
    ) -> Vec<ListenerBinding> {
        let mut bindings = Vec::new();
        if self.http_port > 0 {
            bindings.push(ListenerBinding {
                load_balancer_arn: load_balancer_arn.to_string(),
                target_group_arn: target_group_arn.to_string(),
                protocol: Protocol::Http,
                port: self.http_port,
                certificate_arn: None,
            });
        }
        if self.https_port > 0 {
            bindings.push(ListenerBinding {
                load_balancer_arn: load_balancer_arn.to_string(),
                target_group_arn: target_group_arn.to_string(),
                protocol: Protocol::Https,
                port: self.https_port,
                certificate_arn: self.certificate_arn.clone(),
            });
        }
        bindings
    }
}

/// Health probing policy for a target group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckPolicy {
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub path: String,
    /// Expected status codes; empty means no matcher
    pub status_codes: String,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl HealthCheckPolicy {
    /// The provider representation of this policy. Probes always use HTTP.
    pub fn to_health_check(&self) -> HealthCheck {
        HealthCheck {
            protocol: Protocol::Http,
            path: self.path.clone(),
            interval_secs: self.interval_secs,
            timeout_secs: self.timeout_secs,
            healthy_threshold: self.healthy_threshold,
            unhealthy_threshold: self.unhealthy_threshold,
            matcher: if self.status_codes.is_empty() {
                None
            } else {
                Some(self.status_codes.clone())
            },
        }
    }

    /// Whether a live health check matches this policy field by field.
    /// An absent matcher compares as the empty string.
    pub fn matches(&self, live: &HealthCheck) -> bool {
        live.interval_secs == self.interval_secs
            && live.timeout_secs == self.timeout_secs
            && live.path == self.path
            && live.healthy_threshold == self.healthy_threshold
            && live.unhealthy_threshold == self.unhealthy_threshold
            && live.matcher.as_deref().unwrap_or("") == self.status_codes
    }
}

/// Desired target group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
    pub health_check: HealthCheckPolicy,
}

impl TargetGroupSpec {
    /// An HTTP target group on the provisional port
    pub fn new(name: impl Into<String>, health_check: HealthCheckPolicy) -> Self {
        Self {
            name: name.into(),
            protocol: Protocol::Http,
            port: PROVISIONAL_TARGET_PORT,
            health_check,
        }
    }
}

/// The container the service attaches to the target group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBinding {
    pub container_name: String,
    pub container_port: u16,
}

/// Output of a reconciliation, consumed by the service attachment step.
/// A plain value; it is rebuilt on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerBinding {
    pub target_group_arn: String,
    pub container_name: String,
    pub container_port: u16,
}

impl LoadBalancerBinding {
    pub fn new(target_group_arn: impl Into<String>, container: &ContainerBinding) -> Self {
        Self {
            target_group_arn: target_group_arn.into(),
            container_name: container.container_name.clone(),
            container_port: container.container_port,
        }
    }
}

/// Tags applied to every resource right after it is created
pub fn default_tags(name: &str) -> Tags {
    Tags::from([
        ("Name".to_string(), name.to_string()),
        ("managed-by".to_string(), MANAGED_BY.to_string()),
        (
            format!("{}-version", MANAGED_BY),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
    ])
}

/// Name of the security group attached to a cluster's compute instances
pub fn instance_security_group_name(cluster_name: &str) -> String {
    format!("{}_{}_instances", MANAGED_BY, cluster_name)
}
