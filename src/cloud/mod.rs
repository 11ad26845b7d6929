//! Cloud control-plane seam
//!
//! The reconciler only talks to the provider through [`CloudResourceClient`].
//! [`InMemoryCloud`] implements it in-process for simulation and tests.

pub mod client;
pub mod memory;

pub use client::{
    CloudError, CloudResourceClient, HealthCheck, Listener, ListenerAction, ListenerBinding,
    LoadBalancer, Protocol, RuleSource, SecurityGroup, SecurityGroupRule, Tags, TargetGroup,
    ANY_IPV4, CODE_DUPLICATE_PERMISSION, CODE_GROUP_NOT_FOUND,
};
pub use memory::{CloudCall, CloudState, InMemoryCloud, SecurityGroupRecord};
