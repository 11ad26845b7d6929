//! # Load balancer reconciliation
//!
//! Converges the networking resources that expose a container service:
//!
//! - **Security group** for the load balancer, open on the listener ports and
//!   allowed into the cluster instances' security group
//! - **Target group** carrying the health check policy
//! - **Load balancer**, internet-facing, across every subnet of the VPC
//! - **Listeners** (HTTP and/or HTTPS) forwarding to the target group
//!
//! Every run re-reads the account; nothing is persisted between runs, and a run
//! that failed half-way can simply be repeated.
//!
//! ## Dependency order
//!
//! ```text
//!   target group ──────────────────────────┐
//!   security group ──> load balancer ──> listeners
//! ```

pub mod drift;
pub mod error;
pub mod listener;
pub mod load_balancer;
pub mod orchestrator;
pub mod retry;
pub mod security_group;
pub mod spec;
pub mod target_group;

pub use drift::{DriftDetector, DriftOutcome};
pub use error::{ReconcileError, ReconcileResult, ResourceKind};
pub use listener::ListenerBinder;
pub use load_balancer::LoadBalancerProvisioner;
pub use orchestrator::{ConvergeReport, Reconciler, Topology};
pub use retry::{retry_on_codes, RetryPolicy};
pub use security_group::SecurityGroupProvisioner;
pub use spec::{
    default_tags, instance_security_group_name, ContainerBinding, HealthCheckPolicy,
    LoadBalancerBinding, LoadBalancerSpec, TargetGroupSpec, PROVISIONAL_TARGET_PORT,
};
pub use target_group::TargetGroupProvisioner;
