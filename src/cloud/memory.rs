//! In-process implementation of [`CloudResourceClient`]
//!
//! Keeps the whole resource namespace in memory, records every mutating call
//! in a journal, and can simulate the provider's eventual consistency: a new
//! security group rejects tagging with `InvalidGroup.NotFound` for a
//! configurable number of attempts. The state is serde-serializable so it can
//! be seeded from and written back to a JSON file.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::client::{
    CloudError, CloudResourceClient, HealthCheck, Listener, ListenerAction, ListenerBinding,
    LoadBalancer, Protocol, SecurityGroup, SecurityGroupRule, Tags, TargetGroup,
    CODE_DUPLICATE_LOAD_BALANCER, CODE_DUPLICATE_PERMISSION, CODE_DUPLICATE_TARGET_GROUP,
    CODE_GROUP_NOT_FOUND, CODE_VALIDATION,
};

const ARN_PREFIX: &str = "arn:aws:elasticloadbalancing:local:000000000000";

/// A security group together with its inbound rules and tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupRecord {
    #[serde(flatten)]
    pub group: SecurityGroup,
    #[serde(default)]
    pub inbound_rules: Vec<SecurityGroupRule>,
    #[serde(default)]
    pub tags: Tags,
}

/// Serializable snapshot of the simulated account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudState {
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub target_groups: Vec<TargetGroup>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupRecord>,
    /// VPC id -> subnet ids
    #[serde(default)]
    pub subnets: BTreeMap<String, Vec<String>>,
    /// Resource ARN -> tags (load balancers and target groups)
    #[serde(default)]
    pub tags: BTreeMap<String, Tags>,
    #[serde(default)]
    pub next_id: u64,
}

/// A mutating call observed by the in-memory cloud
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum CloudCall {
    CreateLoadBalancer {
        name: String,
        security_group_ids: Vec<String>,
        subnet_ids: Vec<String>,
    },
    CreateListener(ListenerBinding),
    CreateTargetGroup {
        name: String,
        port: u16,
        protocol: Protocol,
    },
    UpdateHealthCheck {
        arn: String,
        health_check: HealthCheck,
    },
    CreateTags {
        resource_arn: String,
    },
    CreateSecurityGroup {
        name: String,
    },
    TagSecurityGroup {
        group_id: String,
    },
    AddInboundRule {
        group_id: String,
        rule: SecurityGroupRule,
    },
}

impl CloudCall {
    /// Short operation name, matching the client method that produced it
    pub fn operation(&self) -> &'static str {
        match self {
            CloudCall::CreateLoadBalancer { .. } => "create_load_balancer",
            CloudCall::CreateListener(_) => "create_listener",
            CloudCall::CreateTargetGroup { .. } => "create_target_group",
            CloudCall::UpdateHealthCheck { .. } => "update_target_group_health_check",
            CloudCall::CreateTags { .. } => "create_tags",
            CloudCall::CreateSecurityGroup { .. } => "create_security_group",
            CloudCall::TagSecurityGroup { .. } => "create_security_group_tags",
            CloudCall::AddInboundRule { .. } => "add_inbound_rule",
        }
    }

    /// Name, id or ARN of the resource the call acted on
    pub fn resource(&self) -> &str {
        match self {
            CloudCall::CreateLoadBalancer { name, .. } => name,
            CloudCall::CreateListener(binding) => &binding.load_balancer_arn,
            CloudCall::CreateTargetGroup { name, .. } => name,
            CloudCall::UpdateHealthCheck { arn, .. } => arn,
            CloudCall::CreateTags { resource_arn } => resource_arn,
            CloudCall::CreateSecurityGroup { name } => name,
            CloudCall::TagSecurityGroup { group_id } => group_id,
            CloudCall::AddInboundRule { group_id, .. } => group_id,
        }
    }

    /// Human-readable detail for display
    pub fn detail(&self) -> String {
        match self {
            CloudCall::CreateLoadBalancer {
                security_group_ids,
                subnet_ids,
                ..
            } => format!(
                "sg={} subnets={}",
                security_group_ids.join(","),
                subnet_ids.join(",")
            ),
            CloudCall::CreateListener(binding) => {
                format!("{}:{} -> {}", binding.protocol, binding.port, binding.target_group_arn)
            }
            CloudCall::CreateTargetGroup { port, protocol, .. } => format!("{}:{}", protocol, port),
            CloudCall::UpdateHealthCheck { health_check, .. } => format!(
                "{} every {}s",
                health_check.path, health_check.interval_secs
            ),
            CloudCall::AddInboundRule { rule, .. } => rule.to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: CloudState,
    journal: Vec<CloudCall>,
    failures: HashMap<String, CloudError>,
    /// Failed tag attempts a new security group answers with before it is visible
    tag_visibility_lag: u32,
    pending_visibility: HashMap<String, u32>,
}

impl Inner {
    fn check_failure(&self, operation: &str) -> Result<(), CloudError> {
        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.state.next_id += 1;
        self.state.next_id
    }

    fn security_group_mut(&mut self, id: &str) -> Option<&mut SecurityGroupRecord> {
        self.state
            .security_groups
            .iter_mut()
            .find(|r| r.group.id == id)
    }
}

/// Simulated cloud account backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    inner: Mutex<Inner>,
}

impl InMemoryCloud {
    /// Create an empty account
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account seeded with existing resources
    pub fn from_state(state: CloudState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                ..Default::default()
            }),
        }
    }

    /// Register subnets for a VPC
    pub fn with_subnets(mut self, vpc_id: &str, subnet_ids: &[&str]) -> Self {
        self.inner.get_mut().state.subnets.insert(
            vpc_id.to_string(),
            subnet_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Add a pre-existing security group (e.g. the cluster instances' group)
    pub fn with_security_group(mut self, id: &str, name: &str, vpc_id: &str) -> Self {
        self.inner
            .get_mut()
            .state
            .security_groups
            .push(SecurityGroupRecord {
                group: SecurityGroup {
                    id: id.to_string(),
                    name: name.to_string(),
                    description: name.to_string(),
                    vpc_id: vpc_id.to_string(),
                },
                inbound_rules: Vec::new(),
                tags: Tags::new(),
            });
        self
    }

    /// Make new security groups reject the first `attempts` tag calls
    pub fn with_tag_visibility_lag(mut self, attempts: u32) -> Self {
        self.inner.get_mut().tag_visibility_lag = attempts;
        self
    }

    /// Make every call to `operation` fail with `error` until cleared
    pub async fn fail_operation(&self, operation: &str, error: CloudError) {
        self.inner
            .lock()
            .await
            .failures
            .insert(operation.to_string(), error);
    }

    pub async fn clear_failures(&self) {
        self.inner.lock().await.failures.clear();
    }

    /// All mutating calls observed so far, oldest first
    pub async fn journal(&self) -> Vec<CloudCall> {
        self.inner.lock().await.journal.clone()
    }

    /// Forget recorded calls, keeping state
    pub async fn clear_journal(&self) {
        self.inner.lock().await.journal.clear();
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> CloudState {
        self.inner.lock().await.state.clone()
    }

    /// Tags attached to a load balancer or target group
    pub async fn tags_for(&self, arn: &str) -> Tags {
        self.inner
            .lock()
            .await
            .state
            .tags
            .get(arn)
            .cloned()
            .unwrap_or_default()
    }

    /// The stored record for a security group id
    pub async fn security_group_record(&self, id: &str) -> Option<SecurityGroupRecord> {
        self.inner
            .lock()
            .await
            .state
            .security_groups
            .iter()
            .find(|r| r.group.id == id)
            .cloned()
    }

    /// Overwrite a stored target group's health check, bypassing the journal
    pub async fn set_health_check(&self, arn: &str, health_check: HealthCheck) {
        let mut inner = self.inner.lock().await;
        if let Some(tg) = inner.state.target_groups.iter_mut().find(|t| t.arn == arn) {
            tg.health_check = health_check;
        }
    }

    /// Remove a target group, bypassing the journal
    pub async fn remove_target_group(&self, arn: &str) {
        self.inner
            .lock()
            .await
            .state
            .target_groups
            .retain(|t| t.arn != arn);
    }
}

#[async_trait]
impl CloudResourceClient for InMemoryCloud {
    async fn retrieve_load_balancer_by_name(
        &self,
        name: &str,
    ) -> Result<Option<LoadBalancer>, CloudError> {
        let inner = self.inner.lock().await;
        inner.check_failure("retrieve_load_balancer_by_name")?;
        Ok(inner
            .state
            .load_balancers
            .iter()
            .find(|lb| lb.name == name)
            .cloned())
    }

    async fn retrieve_load_balancer_listeners(
        &self,
        load_balancer_arn: &str,
    ) -> Result<Vec<Listener>, CloudError> {
        let inner = self.inner.lock().await;
        inner.check_failure("retrieve_load_balancer_listeners")?;
        if !inner
            .state
            .load_balancers
            .iter()
            .any(|lb| lb.arn == load_balancer_arn)
        {
            return Err(CloudError::service(
                "LoadBalancerNotFound",
                format!("load balancer '{}' not found", load_balancer_arn),
            ));
        }
        Ok(inner
            .state
            .listeners
            .iter()
            .filter(|l| l.load_balancer_arn == load_balancer_arn)
            .cloned()
            .collect())
    }

    async fn create_load_balancer(
        &self,
        name: &str,
        internet_facing: bool,
        security_group_ids: &[String],
        subnet_ids: &[String],
    ) -> Result<LoadBalancer, CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("create_load_balancer")?;
        if inner.state.load_balancers.iter().any(|lb| lb.name == name) {
            return Err(CloudError::service(
                CODE_DUPLICATE_LOAD_BALANCER,
                format!("a load balancer with name '{}' already exists", name),
            ));
        }
        if subnet_ids.is_empty() {
            return Err(CloudError::service(
                CODE_VALIDATION,
                "at least one subnet must be specified",
            ));
        }

        let id = inner.next_id();
        let lb = LoadBalancer {
            arn: format!("{}:loadbalancer/app/{}/{:016x}", ARN_PREFIX, name, id),
            name: name.to_string(),
            internet_facing,
            security_group_ids: security_group_ids.to_vec(),
            subnet_ids: subnet_ids.to_vec(),
        };
        inner.state.load_balancers.push(lb.clone());
        inner.journal.push(CloudCall::CreateLoadBalancer {
            name: name.to_string(),
            security_group_ids: security_group_ids.to_vec(),
            subnet_ids: subnet_ids.to_vec(),
        });
        Ok(lb)
    }

    async fn create_listener(&self, binding: &ListenerBinding) -> Result<(), CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("create_listener")?;
        if !inner
            .state
            .load_balancers
            .iter()
            .any(|lb| lb.arn == binding.load_balancer_arn)
        {
            return Err(CloudError::service(
                "LoadBalancerNotFound",
                format!("load balancer '{}' not found", binding.load_balancer_arn),
            ));
        }
        if !inner
            .state
            .target_groups
            .iter()
            .any(|tg| tg.arn == binding.target_group_arn)
        {
            return Err(CloudError::service(
                "TargetGroupNotFound",
                format!("target group '{}' not found", binding.target_group_arn),
            ));
        }
        if inner
            .state
            .listeners
            .iter()
            .any(|l| l.load_balancer_arn == binding.load_balancer_arn && l.port == binding.port)
        {
            return Err(CloudError::service(
                "DuplicateListener",
                format!("a listener already exists on port {}", binding.port),
            ));
        }
        if binding.protocol == Protocol::Https && binding.certificate_arn.is_none() {
            return Err(CloudError::service(
                "CertificateNotFound",
                "an HTTPS listener requires a certificate",
            ));
        }

        let id = inner.next_id();
        let arn = format!(
            "{}/{:016x}",
            binding.load_balancer_arn.replace(":loadbalancer/", ":listener/"),
            id
        );
        inner.state.listeners.push(Listener {
            arn,
            load_balancer_arn: binding.load_balancer_arn.clone(),
            port: binding.port,
            protocol: binding.protocol,
            certificate_arn: binding.certificate_arn.clone(),
            default_actions: vec![ListenerAction {
                target_group_arn: Some(binding.target_group_arn.clone()),
            }],
        });
        inner.journal.push(CloudCall::CreateListener(binding.clone()));
        Ok(())
    }

    async fn retrieve_target_group_by_name(
        &self,
        name: &str,
    ) -> Result<Option<TargetGroup>, CloudError> {
        let inner = self.inner.lock().await;
        inner.check_failure("retrieve_target_group_by_name")?;
        Ok(inner
            .state
            .target_groups
            .iter()
            .find(|tg| tg.name == name)
            .cloned())
    }

    async fn retrieve_target_group(&self, arn: &str) -> Result<Option<TargetGroup>, CloudError> {
        let inner = self.inner.lock().await;
        inner.check_failure("retrieve_target_group")?;
        Ok(inner
            .state
            .target_groups
            .iter()
            .find(|tg| tg.arn == arn)
            .cloned())
    }

    async fn create_target_group(
        &self,
        name: &str,
        port: u16,
        protocol: Protocol,
        vpc_id: &str,
        health_check: &HealthCheck,
    ) -> Result<TargetGroup, CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("create_target_group")?;

        let existing = inner
            .state
            .target_groups
            .iter()
            .find(|tg| tg.name == name)
            .cloned();
        let tg = match existing {
            // identical settings: the provider hands back the existing group
            Some(tg)
                if tg.port == port
                    && tg.protocol == protocol
                    && tg.vpc_id == vpc_id
                    && tg.health_check == *health_check =>
            {
                tg
            }
            Some(_) => {
                return Err(CloudError::service(
                    CODE_DUPLICATE_TARGET_GROUP,
                    format!("a target group with name '{}' already exists", name),
                ));
            }
            None => {
                let id = inner.next_id();
                let tg = TargetGroup {
                    arn: format!("{}:targetgroup/{}/{:016x}", ARN_PREFIX, name, id),
                    name: name.to_string(),
                    port,
                    protocol,
                    vpc_id: vpc_id.to_string(),
                    health_check: health_check.clone(),
                };
                inner.state.target_groups.push(tg.clone());
                tg
            }
        };

        inner.journal.push(CloudCall::CreateTargetGroup {
            name: name.to_string(),
            port,
            protocol,
        });
        Ok(tg)
    }

    async fn update_target_group_health_check(
        &self,
        arn: &str,
        health_check: &HealthCheck,
    ) -> Result<(), CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("update_target_group_health_check")?;
        let tg = inner
            .state
            .target_groups
            .iter_mut()
            .find(|tg| tg.arn == arn)
            .ok_or_else(|| {
                CloudError::service(
                    "TargetGroupNotFound",
                    format!("target group '{}' not found", arn),
                )
            })?;
        tg.health_check = health_check.clone();
        inner.journal.push(CloudCall::UpdateHealthCheck {
            arn: arn.to_string(),
            health_check: health_check.clone(),
        });
        Ok(())
    }

    async fn create_tags(&self, resource_arn: &str, tags: &Tags) -> Result<(), CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("create_tags")?;
        let known = inner
            .state
            .load_balancers
            .iter()
            .any(|lb| lb.arn == resource_arn)
            || inner
                .state
                .target_groups
                .iter()
                .any(|tg| tg.arn == resource_arn);
        if !known {
            return Err(CloudError::service(
                CODE_VALIDATION,
                format!("resource '{}' not found", resource_arn),
            ));
        }
        inner
            .state
            .tags
            .entry(resource_arn.to_string())
            .or_default()
            .extend(tags.clone());
        inner.journal.push(CloudCall::CreateTags {
            resource_arn: resource_arn.to_string(),
        });
        Ok(())
    }

    async fn retrieve_security_group_by_name_or_id(
        &self,
        name_or_id: &str,
    ) -> Result<Option<SecurityGroup>, CloudError> {
        let inner = self.inner.lock().await;
        inner.check_failure("retrieve_security_group_by_name_or_id")?;
        Ok(inner
            .state
            .security_groups
            .iter()
            .find(|r| r.group.id == name_or_id || r.group.name == name_or_id)
            .map(|r| r.group.clone()))
    }

    async fn retrieve_security_group_by_name(
        &self,
        name: &str,
    ) -> Result<Option<SecurityGroup>, CloudError> {
        let inner = self.inner.lock().await;
        inner.check_failure("retrieve_security_group_by_name")?;
        Ok(inner
            .state
            .security_groups
            .iter()
            .find(|r| r.group.name == name)
            .map(|r| r.group.clone()))
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> Result<String, CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("create_security_group")?;
        if inner
            .state
            .security_groups
            .iter()
            .any(|r| r.group.name == name && r.group.vpc_id == vpc_id)
        {
            return Err(CloudError::service(
                "InvalidGroup.Duplicate",
                format!("the security group '{}' already exists", name),
            ));
        }

        let id = format!("sg-{:017x}", inner.next_id());
        inner.state.security_groups.push(SecurityGroupRecord {
            group: SecurityGroup {
                id: id.clone(),
                name: name.to_string(),
                description: description.to_string(),
                vpc_id: vpc_id.to_string(),
            },
            inbound_rules: Vec::new(),
            tags: Tags::new(),
        });
        let lag = inner.tag_visibility_lag;
        if lag > 0 {
            inner.pending_visibility.insert(id.clone(), lag);
        }
        inner.journal.push(CloudCall::CreateSecurityGroup {
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn create_security_group_tags(
        &self,
        group_id: &str,
        tags: &Tags,
    ) -> Result<(), CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("create_security_group_tags")?;

        let not_found = || {
            CloudError::service(
                CODE_GROUP_NOT_FOUND,
                format!("the security group '{}' does not exist", group_id),
            )
        };
        if let Some(remaining) = inner.pending_visibility.get_mut(group_id) {
            *remaining -= 1;
            if *remaining == 0 {
                inner.pending_visibility.remove(group_id);
            }
            return Err(not_found());
        }

        let record = inner.security_group_mut(group_id).ok_or_else(not_found)?;
        record.tags.extend(tags.clone());
        inner.journal.push(CloudCall::TagSecurityGroup {
            group_id: group_id.to_string(),
        });
        Ok(())
    }

    async fn add_inbound_rule(
        &self,
        group_id: &str,
        rule: &SecurityGroupRule,
    ) -> Result<(), CloudError> {
        let mut inner = self.inner.lock().await;
        inner.check_failure("add_inbound_rule")?;
        let record = inner.security_group_mut(group_id).ok_or_else(|| {
            CloudError::service(
                CODE_GROUP_NOT_FOUND,
                format!("the security group '{}' does not exist", group_id),
            )
        })?;
        if record.inbound_rules.contains(rule) {
            return Err(CloudError::service(
                CODE_DUPLICATE_PERMISSION,
                format!("the specified rule \"{}\" already exists", rule),
            ));
        }
        record.inbound_rules.push(rule.clone());
        inner.journal.push(CloudCall::AddInboundRule {
            group_id: group_id.to_string(),
            rule: rule.clone(),
        });
        Ok(())
    }

    async fn list_vpc_subnets(&self, vpc_id: &str) -> Result<Vec<String>, CloudError> {
        let inner = self.inner.lock().await;
        inner.check_failure("list_vpc_subnets")?;
        Ok(inner
            .state
            .subnets
            .get(vpc_id)
            .cloned()
            .unwrap_or_default())
    }
}
