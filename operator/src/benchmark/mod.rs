//! Benchmark is a k8s custom resource requesting a single network throughput measurement.

// Export all spec types
mod spec;
pub use spec::*;

// All other mods are behind the controller flag to keep the deps to a minimum
#[cfg(feature = "controller")]
pub mod controller;
#[cfg(feature = "controller")]
pub mod event;
#[cfg(feature = "controller")]
pub mod reconciler;
#[cfg(feature = "controller")]
pub mod result;
#[cfg(feature = "controller")]
pub mod workload;

#[cfg(test)]
#[cfg(feature = "controller")]
pub mod stub;

#[cfg(feature = "controller")]
pub use controller::{run, OperatorConfig};
