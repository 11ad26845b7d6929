use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider code returned when a just-created security group is not yet
/// visible to the tagging API.
pub const CODE_GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";

/// Provider code returned when an identical inbound rule already exists.
pub const CODE_DUPLICATE_PERMISSION: &str = "InvalidPermission.Duplicate";

/// Provider code returned when a target group name is taken with different settings.
pub const CODE_DUPLICATE_TARGET_GROUP: &str = "DuplicateTargetGroupName";

/// Provider code returned when a load balancer name is taken.
pub const CODE_DUPLICATE_LOAD_BALANCER: &str = "DuplicateLoadBalancerName";

/// Provider code for malformed requests.
pub const CODE_VALIDATION: &str = "ValidationError";

/// Source range that matches every IPv4 address.
pub const ANY_IPV4: &str = "0.0.0.0/0";

// ============================================================================
// Data structures (pure, no I/O)
// ============================================================================

/// Key/value tags attached to a resource. Ordered so output is deterministic.
pub type Tags = BTreeMap<String, String>;

/// Protocol spoken by a listener or a target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub arn: String,
    pub name: String,
    pub internet_facing: bool,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
}

/// A listener's default action. Only forward actions carry a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_group_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub arn: String,
    pub load_balancer_arn: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
    #[serde(default)]
    pub default_actions: Vec<ListenerAction>,
}

/// Health check settings as the provider stores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: Protocol,
    pub path: String,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    /// Expected HTTP status codes, e.g. "200" or "200-299"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub arn: String,
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
    pub vpc_id: String,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub vpc_id: String,
}

/// Where an inbound rule admits traffic from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Cidr(String),
    SecurityGroup(String),
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Cidr(cidr) => f.write_str(cidr),
            RuleSource::SecurityGroup(id) => f.write_str(id),
        }
    }
}

/// An inbound permission on a security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub source: RuleSource,
}

impl SecurityGroupRule {
    /// TCP on a single port
    pub fn tcp_port(port: u16, source: RuleSource) -> Self {
        Self::tcp_range(port, port, source)
    }

    pub fn tcp_range(from_port: u16, to_port: u16, source: RuleSource) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port,
            to_port,
            source,
        }
    }
}

impl fmt::Display for SecurityGroupRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from_port == self.to_port {
            write!(f, "{}:{}:{}", self.protocol, self.from_port, self.source)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.protocol, self.from_port, self.to_port, self.source
            )
        }
    }
}

/// Request to create a listener between a load balancer and a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerBinding {
    pub load_balancer_arn: String,
    pub target_group_arn: String,
    pub protocol: Protocol,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
}

/// Failures reported by the cloud control plane.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloudError {
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl CloudError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The provider error code, if the request reached the provider.
    pub fn code(&self) -> Option<&str> {
        match self {
            CloudError::Service { code, .. } => Some(code),
            CloudError::Transport(_) => None,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }
}

// ============================================================================
// Trait for abstraction (provider adapters and the in-memory cloud)
// ============================================================================

/// Control-plane operations the reconciler needs.
///
/// Lookups return `Ok(None)` when the resource does not exist; that is a normal
/// outcome and distinct from an API failure.
#[async_trait]
pub trait CloudResourceClient: Send + Sync {
    // Load balancers

    async fn retrieve_load_balancer_by_name(
        &self,
        name: &str,
    ) -> Result<Option<LoadBalancer>, CloudError>;

    async fn retrieve_load_balancer_listeners(
        &self,
        load_balancer_arn: &str,
    ) -> Result<Vec<Listener>, CloudError>;

    async fn create_load_balancer(
        &self,
        name: &str,
        internet_facing: bool,
        security_group_ids: &[String],
        subnet_ids: &[String],
    ) -> Result<LoadBalancer, CloudError>;

    async fn create_listener(&self, binding: &ListenerBinding) -> Result<(), CloudError>;

    // Target groups

    async fn retrieve_target_group_by_name(
        &self,
        name: &str,
    ) -> Result<Option<TargetGroup>, CloudError>;

    async fn retrieve_target_group(&self, arn: &str) -> Result<Option<TargetGroup>, CloudError>;

    async fn create_target_group(
        &self,
        name: &str,
        port: u16,
        protocol: Protocol,
        vpc_id: &str,
        health_check: &HealthCheck,
    ) -> Result<TargetGroup, CloudError>;

    async fn update_target_group_health_check(
        &self,
        arn: &str,
        health_check: &HealthCheck,
    ) -> Result<(), CloudError>;

    // Tagging for load balancers and target groups

    async fn create_tags(&self, resource_arn: &str, tags: &Tags) -> Result<(), CloudError>;

    // Security groups

    async fn retrieve_security_group_by_name_or_id(
        &self,
        name_or_id: &str,
    ) -> Result<Option<SecurityGroup>, CloudError>;

    async fn retrieve_security_group_by_name(
        &self,
        name: &str,
    ) -> Result<Option<SecurityGroup>, CloudError>;

    /// Returns the new group's id.
    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> Result<String, CloudError>;

    async fn create_security_group_tags(
        &self,
        group_id: &str,
        tags: &Tags,
    ) -> Result<(), CloudError>;

    async fn add_inbound_rule(
        &self,
        group_id: &str,
        rule: &SecurityGroupRule,
    ) -> Result<(), CloudError>;

    // Network

    async fn list_vpc_subnets(&self, vpc_id: &str) -> Result<Vec<String>, CloudError>;
}
