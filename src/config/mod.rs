pub mod deployment;
pub mod time;

pub use deployment::{
    parse_deployment_json, parse_deployment_yaml, strip_jsonc_comments, ContainerConfig,
    DeploymentConfig, DesiredState, HealthCheckConfig, LoadBalancerConfig, RetryConfig,
};
pub use time::{parse_seconds, parse_time_expression};

use std::path::Path;
use thiserror::Error;

/// Errors for loading and validating deployment files
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid time expression '{expression}' for '{field}'")]
    InvalidTimeExpression {
        field: &'static str,
        expression: String,
    },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

// ============================================================================
// I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load a deployment file. `.yaml`/`.yml` files are read as YAML, anything
/// else as JSON with optional comments.
pub fn load_deployment_file(path: &Path) -> Result<DeploymentConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parse_deployment_yaml(&content),
        _ => parse_deployment_json(&content),
    }
}
