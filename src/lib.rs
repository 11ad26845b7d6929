//! lbwire: keeps the load balancer, target group, listeners and security
//! group in front of a container service converged with a declared deployment.

pub mod cli;
pub mod cloud;
pub mod config;
pub mod reconcile;
