//! Kubernetes access: client construction and converging workload updates.

pub mod client;
pub mod workload;
