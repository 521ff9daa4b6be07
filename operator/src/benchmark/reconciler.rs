//! Benchmark state machine.
//!
//! Each notification is handled by reading the current state of the benchmark and performing at
//! most one step: create the server, create the client, record the result, mark an error or
//! nothing. Pod names are derived from the benchmark uid so repeated deliveries of the same
//! notification converge on the same objects.
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::{
    benchmark::{
        event::{qualified_name, Notification, Observer, ReconcileEvent},
        result::{parse_throughput, ParseError},
        workload::{benchmark_owner, build_workload, client_command, ImageConfig, Role},
        NetBenchmark, NetBenchmarkStatus, Phase,
    },
    utils::{StoreError, WorkloadStore},
};

/// Errors produced while handling a notification.
///
/// Any error requeues the benchmark after the retry delay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The object store failed.
    #[error("Store error: {source}")]
    Store {
        /// Underlying store failure.
        #[from]
        source: StoreError,
    },
    /// The client output could not be read.
    #[error("Result error: {source}")]
    Result {
        /// Underlying parse failure.
        #[from]
        source: ParseError,
    },
}

const RUNNING: &str = "Running";
const SUCCEEDED: &str = "Succeeded";
const FAILED: &str = "Failed";

/// Drives benchmarks through their phases.
pub struct Reconciler<S, O> {
    store: S,
    observer: O,
    images: ImageConfig,
}

impl<S, O> Reconciler<S, O>
where
    S: WorkloadStore,
    O: Observer,
{
    /// Create new reconciler
    pub fn new(store: S, observer: O, images: ImageConfig) -> Self {
        Self {
            store,
            observer,
            images,
        }
    }

    /// Object store the reconciler acts on.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle a single notification.
    pub async fn handle(&self, notification: Notification) -> Result<(), Error> {
        match notification {
            Notification::Request {
                object,
                deleted: true,
            } => {
                // Pods are garbage collected through their owner reference.
                self.observer.observe(ReconcileEvent::RequestDeleted {
                    namespace: object.namespace().unwrap_or_default(),
                    name: object.name_any(),
                });
                Ok(())
            }
            Notification::Request {
                object,
                deleted: false,
            } => self.handle_request(&object).await,
            Notification::Workload {
                object,
                deleted: true,
            } => {
                self.observer.observe(ReconcileEvent::WorkloadDeleted {
                    pod: qualified_name(&*object),
                });
                Ok(())
            }
            Notification::Workload {
                object,
                deleted: false,
            } => self.handle_workload(&object).await,
            Notification::Unknown { kind } => {
                self.observer.observe(ReconcileEvent::UnknownKind { kind });
                Ok(())
            }
        }
    }

    async fn handle_request(&self, observed: &NetBenchmark) -> Result<(), Error> {
        let namespace = observed.namespace().unwrap_or_default();
        let name = observed.name_any();
        let benchmark = match self.store.get_request(&namespace, &name).await {
            Ok(benchmark) => benchmark,
            Err(StoreError::NotFound) => {
                self.observer
                    .observe(ReconcileEvent::RequestDeleted { namespace, name });
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        match benchmark.phase() {
            Phase::Initial | Phase::ServerScheduled => self.ensure_server(&benchmark).await,
            phase => {
                self.observer.observe(ReconcileEvent::NothingToDo {
                    name: qualified_name(&benchmark),
                    phase,
                });
                Ok(())
            }
        }
    }

    async fn ensure_server(&self, benchmark: &NetBenchmark) -> Result<(), Error> {
        let role = Role::Server;
        let server = build_workload(
            benchmark,
            role,
            role.restart_policy(),
            Vec::new(),
            &self.images,
        );
        let name = server.name_any();
        self.create_workload(&server, role).await?;

        if benchmark.current_status().server_workload_name == name {
            self.observer
                .observe(ReconcileEvent::WorkloadRecorded { name, role });
            return Ok(());
        }
        self.update_status(benchmark, Phase::ServerScheduled, move |status| {
            status.server_workload_name = name;
        })
        .await
    }

    async fn handle_workload(&self, pod: &Pod) -> Result<(), Error> {
        let Some(owner) = benchmark_owner(pod) else {
            self.observer
                .observe(ReconcileEvent::MissingOwner { pod: qualified_name(pod) });
            return Ok(());
        };
        if owner.uid.is_empty() {
            self.observer
                .observe(ReconcileEvent::OwnerUidMissing { pod: qualified_name(pod) });
        }

        let benchmark = match self.store.get_request(&owner.namespace, &owner.name).await {
            Ok(benchmark) => benchmark,
            Err(StoreError::NotFound) => {
                self.observer.observe(ReconcileEvent::OwnerGone {
                    pod: qualified_name(pod),
                    owner: format!("{}/{}", owner.namespace, owner.name),
                });
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let phase = benchmark.phase();
        if phase.is_terminal() {
            self.observer.observe(ReconcileEvent::Finished {
                pod: qualified_name(pod),
                phase,
            });
            return Ok(());
        }

        let status = benchmark.current_status();
        let pod_name = pod.name_any();
        if is_recorded(&status.client_workload_name, &pod_name) {
            self.handle_client(&benchmark, pod).await
        } else if is_recorded(&status.server_workload_name, &pod_name) {
            self.handle_server(&benchmark, pod).await
        } else {
            self.observer.observe(ReconcileEvent::WorkloadUnmatched {
                pod: qualified_name(pod),
                owner: qualified_name(&benchmark),
            });
            Ok(())
        }
    }

    async fn handle_server(&self, benchmark: &NetBenchmark, server: &Pod) -> Result<(), Error> {
        let pod_phase = pod_phase(server);
        if pod_phase != RUNNING {
            self.observer.observe(ReconcileEvent::ServerNotRunning {
                pod: qualified_name(server),
                pod_phase: pod_phase.to_owned(),
            });
            return Ok(());
        }

        let status = benchmark.current_status();
        if !status.client_workload_name.is_empty() {
            self.observer.observe(ReconcileEvent::WorkloadRecorded {
                name: status.client_workload_name,
                role: Role::Client,
            });
            return Ok(());
        }

        let Some(address) = server
            .status
            .as_ref()
            .and_then(|status| status.pod_ip.as_deref())
            .filter(|ip| !ip.is_empty())
        else {
            self.observer
                .observe(ReconcileEvent::ServerWithoutAddress { pod: qualified_name(server) });
            return Ok(());
        };

        let role = Role::Client;
        let client = build_workload(
            benchmark,
            role,
            role.restart_policy(),
            client_command(address),
            &self.images,
        );
        let name = client.name_any();
        self.create_workload(&client, role).await?;
        self.update_status(benchmark, Phase::Testing, move |status| {
            status.client_workload_name = name;
        })
        .await
    }

    async fn handle_client(&self, benchmark: &NetBenchmark, client: &Pod) -> Result<(), Error> {
        match pod_phase(client) {
            RUNNING => {
                self.observer
                    .observe(ReconcileEvent::ClientRunning { pod: qualified_name(client) });
                Ok(())
            }
            SUCCEEDED => self.collect_result(benchmark, client).await,
            FAILED => {
                // The pod restarts on failure, a later success still completes the benchmark.
                self.observer
                    .observe(ReconcileEvent::ClientFailed { pod: qualified_name(client) });
                Ok(())
            }
            pod_phase => {
                self.observer.observe(ReconcileEvent::ClientWaiting {
                    pod: qualified_name(client),
                    pod_phase: pod_phase.to_owned(),
                });
                Ok(())
            }
        }
    }

    // Record the measured throughput and remove both pods.
    async fn collect_result(&self, benchmark: &NetBenchmark, client: &Pod) -> Result<(), Error> {
        let namespace = benchmark.namespace().unwrap_or_default();
        let client_name = client.name_any();

        let output = self.store.workload_logs(&namespace, &client_name).await?;
        let throughput = match parse_throughput(&output) {
            Ok(throughput) => throughput,
            Err(err) => return Err(self.fail(benchmark, err.into()).await),
        };

        let server_name = benchmark.current_status().server_workload_name;
        let server = match self.store.get_workload(&namespace, &server_name).await {
            Ok(server) => server,
            Err(err) => return Err(self.fail(benchmark, err.into()).await),
        };
        if let Err(err) = self.store.delete_workload(&namespace, &client_name).await {
            return Err(self.fail(benchmark, err.into()).await);
        }
        if let Err(err) = self
            .store
            .delete_workload(&namespace, &server.name_any())
            .await
        {
            return Err(self.fail(benchmark, err.into()).await);
        }

        let recorded = self
            .update_status(benchmark, Phase::Done, move |status| {
                status.throughput_bits_per_second = Some(throughput);
            })
            .await;
        if let Err(err) = recorded {
            // Both pods are gone, a retry cannot measure again.
            self.observer.observe(ReconcileEvent::ResultNotRecorded {
                name: qualified_name(benchmark),
                throughput,
                reason: err.to_string(),
            });
            return Err(err);
        }
        self.observer.observe(ReconcileEvent::ResultRecorded {
            name: qualified_name(benchmark),
            throughput,
        });
        Ok(())
    }

    // Create a pod, an existing pod with the same name counts as created.
    async fn create_workload(&self, pod: &Pod, role: Role) -> Result<(), Error> {
        let name = pod.name_any();
        match self.store.create_workload(pod).await {
            Ok(_) => {
                self.observer
                    .observe(ReconcileEvent::WorkloadCreated { name, role });
                Ok(())
            }
            Err(StoreError::AlreadyExists) => {
                self.observer
                    .observe(ReconcileEvent::WorkloadExists { name, role });
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    // Mark the benchmark as failed and hand back the error that caused it.
    async fn fail(&self, benchmark: &NetBenchmark, err: Error) -> Error {
        let name = qualified_name(benchmark);
        match self.update_status(benchmark, Phase::Error, |_| {}).await {
            Ok(()) => self.observer.observe(ReconcileEvent::MarkedError {
                name,
                reason: err.to_string(),
            }),
            Err(mark_err) => self.observer.observe(ReconcileEvent::MarkErrorFailed {
                name,
                reason: mark_err.to_string(),
            }),
        }
        err
    }

    // Read the latest benchmark, apply the change to a copy of its status and write the whole
    // status back. Changes that would move the phase backwards are dropped.
    async fn update_status(
        &self,
        benchmark: &NetBenchmark,
        to: Phase,
        change: impl FnOnce(&mut NetBenchmarkStatus) + Send,
    ) -> Result<(), Error> {
        let latest = self
            .store
            .get_request(
                &benchmark.namespace().unwrap_or_default(),
                &benchmark.name_any(),
            )
            .await?;
        let from = latest.phase();
        if !from.can_advance_to(to) {
            self.observer.observe(ReconcileEvent::TransitionSkipped {
                name: qualified_name(&latest),
                from,
                to,
            });
            return Ok(());
        }

        let mut status = latest.current_status();
        status.phase = to;
        change(&mut status);
        let updated = NetBenchmark {
            status: Some(status),
            ..latest
        };
        self.store.replace_status(&updated).await?;
        if from != to {
            self.observer.observe(ReconcileEvent::PhaseChanged {
                name: qualified_name(&updated),
                from,
                to,
            });
        }
        Ok(())
    }
}

fn is_recorded(recorded: &str, name: &str) -> bool {
    !recorded.is_empty() && recorded == name
}

fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or("Unknown")
}
