use serde::{Deserialize, Serialize};
use tracing::warn;

use super::time::{parse_seconds, parse_time_expression};
use super::ConfigError;
use crate::reconcile::{
    ContainerBinding, HealthCheckPolicy, LoadBalancerSpec, RetryPolicy, TargetGroupSpec,
};

/// The deployment file structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentConfig {
    /// Cluster whose instances receive the traffic
    pub cluster_name: String,
    pub vpc_id: String,
    pub container: ContainerConfig,
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContainerConfig {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadBalancerConfig {
    pub name: String,
    /// Security group name or id
    pub security_group: String,
    pub target_group: String,
    /// HTTP listener port (0 = none)
    #[serde(default)]
    pub port: u16,
    /// HTTPS listener port (0 = none)
    #[serde(default)]
    pub https_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

/// Health check settings with time expressions ("30s", "1m")
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthCheckConfig {
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Expected status codes; an empty string disables the matcher
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_limit")]
    pub healthy_limit: u32,
    #[serde(default = "default_limit")]
    pub unhealthy_limit: u32,
}

fn default_interval() -> String {
    "30s".to_string()
}

fn default_timeout() -> String {
    "5s".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_status() -> String {
    "200".to_string()
}

fn default_limit() -> u32 {
    2
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            path: default_path(),
            status: default_status(),
            healthy_limit: default_limit(),
            unhealthy_limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_max_duration")]
    pub max_duration: String,
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_max_duration() -> String {
    "5m".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_duration: default_max_duration(),
        }
    }
}

/// Everything the reconciler needs for one run
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub load_balancer: LoadBalancerSpec,
    pub target_group: TargetGroupSpec,
    pub container: ContainerBinding,
    pub retry: RetryPolicy,
}

// ============================================================================
// Pure parsing functions (no I/O)
// ============================================================================

/// Remove `//` line comments and `/* */` block comments outside of strings
pub fn strip_jsonc_comments(input: &str) -> String {
    enum Mode {
        Code,
        Str,
        Escape,
        Line,
        Block,
    }

    let mut out = String::with_capacity(input.len());
    let mut mode = Mode::Code;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match mode {
            Mode::Code => match (c, chars.peek()) {
                ('/', Some('/')) => {
                    chars.next();
                    mode = Mode::Line;
                }
                ('/', Some('*')) => {
                    chars.next();
                    mode = Mode::Block;
                }
                ('"', _) => {
                    out.push(c);
                    mode = Mode::Str;
                }
                _ => out.push(c),
            },
            Mode::Str => {
                out.push(c);
                match c {
                    '\\' => mode = Mode::Escape,
                    '"' => mode = Mode::Code,
                    _ => {}
                }
            }
            Mode::Escape => {
                out.push(c);
                mode = Mode::Str;
            }
            Mode::Line => {
                if c == '\n' {
                    out.push(c);
                    mode = Mode::Code;
                }
            }
            Mode::Block => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    mode = Mode::Code;
                }
            }
        }
    }

    out
}

/// Parse a JSON or JSONC deployment document
pub fn parse_deployment_json(content: &str) -> Result<DeploymentConfig, ConfigError> {
    serde_json::from_str(&strip_jsonc_comments(content))
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a YAML deployment document
pub fn parse_deployment_yaml(content: &str) -> Result<DeploymentConfig, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

impl DeploymentConfig {
    /// Validate the file and convert it into reconciler input.
    pub fn desired_state(&self) -> Result<DesiredState, ConfigError> {
        require("cluster-name", &self.cluster_name)?;
        require("vpc-id", &self.vpc_id)?;
        require("container.name", &self.container.name)?;
        require("load-balancer.name", &self.load_balancer.name)?;
        require("load-balancer.security-group", &self.load_balancer.security_group)?;
        require("load-balancer.target-group", &self.load_balancer.target_group)?;
        if self.container.port == 0 {
            return Err(ConfigError::Validation(
                "'container.port' must be greater than 0".to_string(),
            ));
        }

        let lb = &self.load_balancer;
        let certificate_arn = lb
            .certificate_arn
            .as_deref()
            .filter(|arn| !arn.trim().is_empty())
            .map(str::to_string);
        if lb.https_port > 0 && certificate_arn.is_none() {
            return Err(ConfigError::Validation(
                "'load-balancer.certificate-arn' is required when 'https-port' is set".to_string(),
            ));
        }

        let health_check = self.health_check_policy()?;
        let retry = RetryPolicy::new(
            parse_time_expression("retry.poll-interval", &self.retry.poll_interval)?,
            parse_time_expression("retry.max-duration", &self.retry.max_duration)?,
        );
        if retry.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "'retry.poll-interval' must be greater than 0".to_string(),
            ));
        }
        if retry.poll_interval > retry.max_duration {
            return Err(ConfigError::Validation(
                "'retry.poll-interval' must not exceed 'retry.max-duration'".to_string(),
            ));
        }

        Ok(DesiredState {
            load_balancer: LoadBalancerSpec {
                name: lb.name.clone(),
                vpc_id: self.vpc_id.clone(),
                security_group_name: lb.security_group.clone(),
                cluster_name: self.cluster_name.clone(),
                http_port: lb.port,
                https_port: lb.https_port,
                certificate_arn,
            },
            target_group: TargetGroupSpec::new(lb.target_group.clone(), health_check),
            container: ContainerBinding {
                container_name: self.container.name.clone(),
                container_port: self.container.port,
            },
            retry,
        })
    }

    fn health_check_policy(&self) -> Result<HealthCheckPolicy, ConfigError> {
        let hc = &self.load_balancer.health_check;
        let interval_secs = parse_seconds("health-check.interval", &hc.interval)?;
        let timeout_secs = parse_seconds("health-check.timeout", &hc.timeout)?;

        if interval_secs == 0 {
            return Err(ConfigError::Validation(
                "'health-check.interval' must be greater than 0".to_string(),
            ));
        }
        if hc.healthy_limit < 1 || hc.unhealthy_limit < 1 {
            return Err(ConfigError::Validation(
                "health check thresholds must be at least 1".to_string(),
            ));
        }
        if timeout_secs >= interval_secs {
            warn!(
                interval = interval_secs,
                timeout = timeout_secs,
                "Health check timeout is not shorter than the interval"
            );
        }

        Ok(HealthCheckPolicy {
            interval_secs,
            timeout_secs,
            path: hc.path.clone(),
            status_codes: hc.status.clone(),
            healthy_threshold: hc.healthy_limit,
            unhealthy_threshold: hc.unhealthy_limit,
        })
    }
}
