use std::fmt;

use thiserror::Error;

use crate::cloud::CloudError;

/// Kind of cloud resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    LoadBalancer,
    Listener,
    TargetGroup,
    SecurityGroup,
    Subnets,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::TargetGroup => "target group",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::Subnets => "subnets of VPC",
        };
        f.write_str(name)
    }
}

/// Errors that stop a reconciliation
///
/// Every variant names the resource it concerns. After any error the resource
/// graph may be partially created; re-running the reconciliation is safe.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A resource disappeared between lookup and use
    #[error("{kind} [{name}] was not found")]
    NotFound { kind: ResourceKind, name: String },

    /// Load balancer and target group both exist but no listener joins them
    #[error("load balancer [{load_balancer}] does not have a listener to target group [{target_group}]")]
    Conflict {
        load_balancer: String,
        target_group: String,
    },

    /// The cluster instances' security group is missing
    #[error("security group [{security_group}] for the cluster instances was not found; is the cluster initialized?")]
    ClusterNotInitialized { security_group: String },

    #[error("failed to {operation} {kind} [{name}]: {source}")]
    Api {
        kind: ResourceKind,
        name: String,
        operation: &'static str,
        #[source]
        source: CloudError,
    },
}

impl ReconcileError {
    /// Wrap a collaborator failure with the resource it happened on
    pub fn api(
        kind: ResourceKind,
        name: impl Into<String>,
        operation: &'static str,
        source: CloudError,
    ) -> Self {
        ReconcileError::Api {
            kind,
            name: name.into(),
            operation,
            source,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }
}

/// Result type for reconciliation steps
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_names_resource_and_cause() {
        let err = ReconcileError::api(
            ResourceKind::TargetGroup,
            "svc-tg",
            "create",
            CloudError::service("AccessDenied", "not authorized"),
        );
        assert_eq!(
            err.to_string(),
            "failed to create target group [svc-tg]: AccessDenied: not authorized"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_conflict_message() {
        let err = ReconcileError::Conflict {
            load_balancer: "svc-lb".to_string(),
            target_group: "svc-tg".to_string(),
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("[svc-lb]"));
        assert!(err.to_string().contains("[svc-tg]"));
    }
}
