//! Utils is shared functions and constants for the controller

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{DeleteParams, LogParams, PostParams},
    client::Client,
    Api, ResourceExt,
};

use crate::benchmark::NetBenchmark;

/// Errors produced by the object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An object with the same name already exists.
    #[error("object already exists")]
    AlreadyExists,
    /// The object does not exist.
    #[error("object not found")]
    NotFound,
    /// The api server did not answer in time.
    #[error("api call timed out after {0:?}")]
    Timeout(Duration),
    /// The object could not be encoded for the api server.
    #[error("Serialize error: {source}")]
    Serialize {
        /// Underlying encoding failure.
        #[from]
        source: serde_json::Error,
    },
    /// Any other api failure.
    #[error("Kube error: {source}")]
    Kube {
        /// Underlying client failure.
        source: kube::Error,
    },
}

impl From<kube::Error> for StoreError {
    fn from(source: kube::Error) -> Self {
        match source {
            kube::Error::Api(err) if err.reason == "AlreadyExists" => StoreError::AlreadyExists,
            kube::Error::Api(err) if err.reason == "NotFound" => StoreError::NotFound,
            source => StoreError::Kube { source },
        }
    }
}

/// Define the behavior we consume from the cluster object store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Read the latest copy of a benchmark.
    async fn get_request(&self, namespace: &str, name: &str) -> Result<NetBenchmark, StoreError>;
    /// Write the whole status of a benchmark back, returning the stored copy.
    async fn replace_status(&self, benchmark: &NetBenchmark) -> Result<NetBenchmark, StoreError>;
    /// Create a pod, failing with `AlreadyExists` when the name is taken.
    async fn create_workload(&self, pod: &Pod) -> Result<Pod, StoreError>;
    /// Read the latest copy of a pod.
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Pod, StoreError>;
    /// Delete a pod, a missing pod is already deleted.
    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
    /// Read the full stdout of a pod.
    async fn workload_logs(&self, namespace: &str, name: &str) -> Result<String, StoreError>;
}

/// Object store backed by the Kubernetes api server.
///
/// Every call is bounded by a deadline so a stuck request surfaces as a retryable error.
pub struct KubeStore {
    k_client: Client,
    call_timeout: Duration,
}

impl KubeStore {
    /// Create new store
    pub fn new(k_client: Client, call_timeout: Duration) -> Self {
        Self {
            k_client,
            call_timeout,
        }
    }

    fn benchmarks(&self, ns: &str) -> Api<NetBenchmark> {
        Api::namespaced(self.k_client.clone(), ns)
    }

    fn pods(&self, ns: &str) -> Api<Pod> {
        Api::namespaced(self.k_client.clone(), ns)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.call_timeout)),
        }
    }
}

#[async_trait]
impl WorkloadStore for KubeStore {
    async fn get_request(&self, namespace: &str, name: &str) -> Result<NetBenchmark, StoreError> {
        let benchmarks = self.benchmarks(namespace);
        self.bounded(benchmarks.get(name)).await
    }

    async fn replace_status(&self, benchmark: &NetBenchmark) -> Result<NetBenchmark, StoreError> {
        let benchmarks = self.benchmarks(&benchmark.namespace().unwrap_or_default());
        let data = serde_json::to_vec(benchmark)?;
        self.bounded(benchmarks.replace_status(
            &benchmark.name_any(),
            &PostParams::default(),
            data,
        ))
        .await
    }

    async fn create_workload(&self, pod: &Pod) -> Result<Pod, StoreError> {
        let pods = self.pods(&pod.namespace().unwrap_or_default());
        self.bounded(pods.create(&PostParams::default(), pod)).await
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        let pods = self.pods(namespace);
        self.bounded(pods.get(name)).await
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let pods = self.pods(namespace);
        match self.bounded(pods.delete(name, &DeleteParams::default())).await {
            Ok(_) | Err(StoreError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn workload_logs(&self, namespace: &str, name: &str) -> Result<String, StoreError> {
        let pods = self.pods(namespace);
        self.bounded(pods.logs(name, &LogParams::default())).await
    }
}
