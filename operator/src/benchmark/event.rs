//! Notifications consumed by the reconciler and the diagnostics it reports.
use k8s_openapi::api::core::v1::Pod;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::benchmark::{workload::Role, NetBenchmark, Phase};

/// Indication that an object may have changed, possibly delivered more than once.
#[derive(Clone, Debug)]
pub enum Notification {
    /// A benchmark changed or was deleted.
    Request {
        /// Last observed copy of the benchmark.
        object: NetBenchmark,
        /// Whether the benchmark was deleted.
        deleted: bool,
    },
    /// A benchmark pod changed or was deleted.
    Workload {
        /// Last observed copy of the pod.
        object: Box<Pod>,
        /// Whether the pod was deleted.
        deleted: bool,
    },
    /// An object of a kind the reconciler does not handle.
    Unknown {
        /// Kind of the object.
        kind: String,
    },
}

impl Notification {
    /// Kind of the object the notification is about.
    pub fn kind(&self) -> String {
        match self {
            Notification::Request { .. } => NetBenchmark::kind(&()).into_owned(),
            Notification::Workload { .. } => Pod::kind(&()).into_owned(),
            Notification::Unknown { kind } => kind.clone(),
        }
    }

    /// Namespaced name of the object the notification is about.
    pub fn object_name(&self) -> Option<String> {
        match self {
            Notification::Request { object, .. } => Some(qualified_name(object)),
            Notification::Workload { object, .. } => Some(qualified_name(&**object)),
            Notification::Unknown { .. } => None,
        }
    }
}

pub(crate) fn qualified_name(object: &impl ResourceExt) -> String {
    format!(
        "{}/{}",
        object.namespace().unwrap_or_default(),
        object.name_any()
    )
}

/// Decision or observation made while handling a notification.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileEvent {
    /// A benchmark was deleted, its pods are garbage collected through their owner reference.
    RequestDeleted {
        /// Namespace of the benchmark.
        namespace: String,
        /// Name of the benchmark.
        name: String,
    },
    /// The phase of the benchmark requires no action for this notification.
    NothingToDo {
        /// Namespaced name of the benchmark.
        name: String,
        /// Current phase.
        phase: Phase,
    },
    /// A pod was created.
    WorkloadCreated {
        /// Name of the pod.
        name: String,
        /// Role of the pod.
        role: Role,
    },
    /// A pod already existed under its deterministic name.
    WorkloadExists {
        /// Name of the pod.
        name: String,
        /// Role of the pod.
        role: Role,
    },
    /// The pod is already recorded on the benchmark.
    WorkloadRecorded {
        /// Name of the pod.
        name: String,
        /// Role of the pod.
        role: Role,
    },
    /// The phase advanced.
    PhaseChanged {
        /// Namespaced name of the benchmark.
        name: String,
        /// Phase before the change.
        from: Phase,
        /// Phase after the change.
        to: Phase,
    },
    /// A requested status change would have moved the phase backwards and was dropped.
    TransitionSkipped {
        /// Namespaced name of the benchmark.
        name: String,
        /// Phase found on the latest copy.
        from: Phase,
        /// Requested phase.
        to: Phase,
    },
    /// The server pod is not running yet.
    ServerNotRunning {
        /// Namespaced name of the pod.
        pod: String,
        /// Phase reported by the pod.
        pod_phase: String,
    },
    /// The server pod is running but has no address to measure against yet.
    ServerWithoutAddress {
        /// Namespaced name of the pod.
        pod: String,
    },
    /// The client pod is still measuring.
    ClientRunning {
        /// Namespaced name of the pod.
        pod: String,
    },
    /// The client pod failed, the benchmark stays in its current phase.
    ClientFailed {
        /// Namespaced name of the pod.
        pod: String,
    },
    /// The client pod is in a phase that requires no action.
    ClientWaiting {
        /// Namespaced name of the pod.
        pod: String,
        /// Phase reported by the pod.
        pod_phase: String,
    },
    /// A throughput measurement was recorded.
    ResultRecorded {
        /// Namespaced name of the benchmark.
        name: String,
        /// Measured throughput.
        throughput: f64,
    },
    /// A measurement was taken and both pods removed, but writing the result failed.
    ///
    /// The measurement only survives in this event.
    ResultNotRecorded {
        /// Namespaced name of the benchmark.
        name: String,
        /// Measured throughput.
        throughput: f64,
        /// Error returned by the status write.
        reason: String,
    },
    /// The benchmark was marked as failed.
    MarkedError {
        /// Namespaced name of the benchmark.
        name: String,
        /// Error that failed the benchmark.
        reason: String,
    },
    /// Marking the benchmark as failed did not succeed.
    MarkErrorFailed {
        /// Namespaced name of the benchmark.
        name: String,
        /// Error returned by the status write.
        reason: String,
    },
    /// A pod is not recorded as either the server or the client of its owner.
    WorkloadUnmatched {
        /// Namespaced name of the pod.
        pod: String,
        /// Namespaced name of the owning benchmark.
        owner: String,
    },
    /// A pod has no benchmark owner reference.
    MissingOwner {
        /// Namespaced name of the pod.
        pod: String,
    },
    /// A pod owner reference carries no uid.
    OwnerUidMissing {
        /// Namespaced name of the pod.
        pod: String,
    },
    /// The owning benchmark no longer exists.
    OwnerGone {
        /// Namespaced name of the pod.
        pod: String,
        /// Namespaced name of the missing benchmark.
        owner: String,
    },
    /// A pod deletion was observed.
    WorkloadDeleted {
        /// Namespaced name of the pod.
        pod: String,
    },
    /// The benchmark reached a terminal phase, the pod event is ignored.
    Finished {
        /// Namespaced name of the pod.
        pod: String,
        /// Terminal phase of the benchmark.
        phase: Phase,
    },
    /// A notification about an unhandled kind of object.
    UnknownKind {
        /// Kind of the object.
        kind: String,
    },
}

/// Receives the diagnostics of the reconciler.
pub trait Observer: Send + Sync {
    /// Report an event.
    fn observe(&self, event: ReconcileEvent);
}

/// Renders reconcile events as tracing events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, event: ReconcileEvent) {
        use ReconcileEvent::*;
        match event {
            RequestDeleted { namespace, name } => {
                debug!(%namespace, %name, "benchmark deleted")
            }
            NothingToDo { name, phase } => debug!(%name, %phase, "nothing to do"),
            WorkloadCreated { name, role } => info!(%name, ?role, "pod created"),
            WorkloadExists { name, role } => debug!(%name, ?role, "pod already exists"),
            WorkloadRecorded { name, role } => {
                debug!(%name, ?role, "pod already recorded")
            }
            PhaseChanged { name, from, to } => info!(%name, %from, %to, "phase changed"),
            TransitionSkipped { name, from, to } => {
                warn!(%name, %from, %to, "phase transition skipped")
            }
            ServerNotRunning { pod, pod_phase } => {
                debug!(%pod, %pod_phase, "server pod is not running yet")
            }
            ServerWithoutAddress { pod } => debug!(%pod, "server pod has no address yet"),
            ClientRunning { pod } => debug!(%pod, "client pod is running"),
            ClientFailed { pod } => warn!(%pod, "client pod failed"),
            ClientWaiting { pod, pod_phase } => debug!(%pod, %pod_phase, "client pod waiting"),
            ResultRecorded { name, throughput } => {
                info!(%name, throughput, "benchmark result recorded")
            }
            ResultNotRecorded {
                name,
                throughput,
                reason,
            } => error!(%name, throughput, %reason, "benchmark result could not be recorded"),
            MarkedError { name, reason } => warn!(%name, %reason, "benchmark failed"),
            MarkErrorFailed { name, reason } => {
                warn!(%name, %reason, "failed to mark benchmark as failed")
            }
            WorkloadUnmatched { pod, owner } => {
                warn!(%pod, %owner, "pod is neither server nor client of its benchmark")
            }
            MissingOwner { pod } => debug!(%pod, "pod has no benchmark owner"),
            OwnerUidMissing { pod } => warn!(%pod, "pod has a benchmark owner without uid"),
            OwnerGone { pod, owner } => debug!(%pod, %owner, "owning benchmark is gone"),
            WorkloadDeleted { pod } => debug!(%pod, "pod deleted"),
            Finished { pod, phase } => debug!(%pod, %phase, "benchmark finished, ignoring pod"),
            UnknownKind { kind } => warn!(%kind, "unknown notification received"),
        }
    }
}
