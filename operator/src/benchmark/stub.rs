//! In-memory store and fixtures shared by the benchmark tests.
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use kube::{api::ObjectMeta, core::ErrorResponse, ResourceExt};

use crate::{
    benchmark::{
        event::{Observer, ReconcileEvent},
        workload::{build_workload, client_command, ImageConfig, Role},
        NetBenchmark, NetBenchmarkSpec, NetBenchmarkStatus,
    },
    utils::{StoreError, WorkloadStore},
};

pub const TEST_UID: &str = "6f9619ff-8b86-d011-b42d-00cf4fc964ff";
pub const SERVER_NAME: &str = "bench-server-00cf4fc964ff";
pub const CLIENT_NAME: &str = "bench-client-00cf4fc964ff";

/// Output of a netperf TCP stream test reporting 941.23 on the result line.
pub const NETPERF_OUTPUT: &str = "MIGRATED TCP STREAM TEST from 0.0.0.0 (0.0.0.0) port 0 AF_INET to 10.1.1.5 () port 0 AF_INET
Recv   Send    Send
Socket Socket  Message  Elapsed
Size   Size    Size     Time     Throughput
bytes  bytes   bytes    secs.    10^6bits/sec

 87380  16384  16384    10.02     941.23
";

pub fn test_benchmark() -> NetBenchmark {
    NetBenchmark {
        metadata: ObjectMeta {
            name: Some("bench".to_owned()),
            namespace: Some("test".to_owned()),
            uid: Some(TEST_UID.to_owned()),
            resource_version: Some("1".to_owned()),
            ..ObjectMeta::default()
        },
        spec: NetBenchmarkSpec::default(),
        status: None,
    }
}

pub fn with_status(benchmark: NetBenchmark, status: NetBenchmarkStatus) -> NetBenchmark {
    NetBenchmark {
        status: Some(status),
        ..benchmark
    }
}

pub fn api_error(code: u16, reason: &str) -> StoreError {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: format!("injected {reason}"),
        reason: reason.to_owned(),
        code,
    })
    .into()
}

#[derive(Default)]
struct State {
    benchmark: Option<NetBenchmark>,
    pods: BTreeMap<String, Pod>,
    logs: BTreeMap<String, String>,
    failing_deletes: BTreeSet<String>,
    failing_creates: BTreeSet<String>,
    failing_status_writes: bool,
    create_attempts: usize,
    status_writes: usize,
    latency: Option<Duration>,
}

/// Store holding a single benchmark and its pods.
///
/// Status writes are checked against the stored resource version the way the API server does.
/// With a latency set every call sleeps before touching the state.
#[derive(Clone, Default)]
pub struct FakeStore(Arc<Mutex<State>>);

impl FakeStore {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.0.lock().expect("state lock")
    }

    pub fn insert_benchmark(&self, benchmark: NetBenchmark) -> NetBenchmark {
        self.state().benchmark = Some(benchmark.clone());
        benchmark
    }

    pub fn benchmark(&self) -> NetBenchmark {
        self.state().benchmark.clone().expect("benchmark stored")
    }

    pub fn status(&self) -> NetBenchmarkStatus {
        self.benchmark().current_status()
    }

    pub fn status_writes(&self) -> usize {
        self.state().status_writes
    }

    pub fn insert_server_pod(&self, benchmark: &NetBenchmark) -> Pod {
        let role = Role::Server;
        let pod = build_workload(
            benchmark,
            role,
            role.restart_policy(),
            vec![],
            &ImageConfig::default(),
        );
        self.insert_pod(pod)
    }

    pub fn insert_client_pod(&self, benchmark: &NetBenchmark, server_ip: &str) -> Pod {
        let role = Role::Client;
        let pod = build_workload(
            benchmark,
            role,
            role.restart_policy(),
            client_command(server_ip),
            &ImageConfig::default(),
        );
        self.insert_pod(pod)
    }

    fn insert_pod(&self, pod: Pod) -> Pod {
        self.state().pods.insert(pod.name_any(), pod.clone());
        pod
    }

    /// Set the phase of a stored pod and, when given, its address.
    pub fn set_pod_phase(&self, name: &str, phase: &str, pod_ip: Option<&str>) -> Pod {
        let mut state = self.state();
        let pod = state.pods.get_mut(name).expect("pod stored");
        let status = pod.status.get_or_insert_with(PodStatus::default);
        status.phase = Some(phase.to_owned());
        if let Some(ip) = pod_ip {
            status.pod_ip = Some(ip.to_owned());
        }
        pod.clone()
    }

    pub fn set_logs(&self, name: &str, logs: &str) {
        self.state().logs.insert(name.to_owned(), logs.to_owned());
    }

    pub fn fail_delete(&self, name: &str) {
        self.state().failing_deletes.insert(name.to_owned());
    }

    pub fn fail_create(&self, name: &str) {
        self.state().failing_creates.insert(name.to_owned());
    }

    pub fn fail_status_writes(&self) {
        self.state().failing_status_writes = true;
    }

    pub fn create_attempts(&self) -> usize {
        self.state().create_attempts
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    async fn delay(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state().pods.get(name).cloned()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.state().pods.keys().cloned().collect()
    }
}

#[async_trait]
impl WorkloadStore for FakeStore {
    async fn get_request(&self, namespace: &str, name: &str) -> Result<NetBenchmark, StoreError> {
        self.delay().await;
        self.state()
            .benchmark
            .clone()
            .filter(|b| b.namespace().as_deref() == Some(namespace) && b.name_any() == name)
            .ok_or(StoreError::NotFound)
    }

    async fn replace_status(&self, benchmark: &NetBenchmark) -> Result<NetBenchmark, StoreError> {
        self.delay().await;
        let mut state = self.state();
        if state.failing_status_writes {
            return Err(api_error(500, "InternalError"));
        }
        let stored = state.benchmark.as_mut().ok_or(StoreError::NotFound)?;
        if stored.resource_version() != benchmark.resource_version() {
            return Err(api_error(409, "Conflict"));
        }
        let version = stored
            .resource_version()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_default();
        stored.status = benchmark.status.clone();
        stored.metadata.resource_version = Some((version + 1).to_string());
        let stored = stored.clone();
        state.status_writes += 1;
        Ok(stored)
    }

    async fn create_workload(&self, pod: &Pod) -> Result<Pod, StoreError> {
        self.delay().await;
        let mut state = self.state();
        let name = pod.name_any();
        state.create_attempts += 1;
        if state.failing_creates.contains(&name) {
            return Err(api_error(403, "Forbidden"));
        }
        if state.pods.contains_key(&name) {
            return Err(StoreError::AlreadyExists);
        }
        state.pods.insert(name, pod.clone());
        Ok(pod.clone())
    }

    async fn get_workload(&self, _namespace: &str, name: &str) -> Result<Pod, StoreError> {
        self.delay().await;
        self.state()
            .pods
            .get(name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_workload(&self, _namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delay().await;
        let mut state = self.state();
        if state.failing_deletes.contains(name) {
            return Err(api_error(500, "InternalError"));
        }
        state.pods.remove(name);
        Ok(())
    }

    async fn workload_logs(&self, _namespace: &str, name: &str) -> Result<String, StoreError> {
        self.delay().await;
        self.state()
            .logs
            .get(name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

/// Observer keeping every event in order.
#[derive(Clone, Default)]
pub struct RecordingObserver(Arc<Mutex<Vec<ReconcileEvent>>>);

impl RecordingObserver {
    pub fn events(&self) -> Vec<ReconcileEvent> {
        self.0.lock().expect("events lock").clone()
    }
}

impl Observer for RecordingObserver {
    fn observe(&self, event: ReconcileEvent) {
        self.0.lock().expect("events lock").push(event);
    }
}
