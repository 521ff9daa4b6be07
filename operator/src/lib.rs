//! Provides API for the operator and related tooling.
#![warn(missing_docs)]

/// Benchmark module for running network throughput benchmarks.
pub mod benchmark;
/// Labels module for managing resource labels.
#[cfg(feature = "controller")]
pub(crate) mod labels;
/// Utils module for access to the cluster object store.
#[cfg(feature = "controller")]
pub mod utils;

/// Name the operator uses to mark the resources it manages.
#[cfg(feature = "controller")]
const CONTROLLER_NAME: &str = "netbench";
