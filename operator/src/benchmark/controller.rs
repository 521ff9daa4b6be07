//! Runs the benchmark reconciler for every benchmark and whenever one of its pods changes.
//!
//! Scheduling is left to the kube-runtime controller: a benchmark is reconciled by at most one
//! task at a time, pod events are mapped to their owning benchmark, and failed reconciles are
//! requeued once per benchmark.
use std::{sync::Arc, time::Duration};

use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    client::Client,
    runtime::{
        controller::{self, Action},
        watcher, Controller,
    },
    Api, ResourceExt,
};
use tracing::{debug, error, info, warn};

use crate::{
    benchmark::{
        event::{Notification, Observer, TracingObserver},
        reconciler::{Error, Reconciler},
        workload::{workload_name, ImageConfig, Role},
        NetBenchmark,
    },
    labels::MANAGED_BY_LABEL_SELECTOR,
    utils::{KubeStore, StoreError, WorkloadStore},
};

/// Runtime settings of the operator.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace to watch, all namespaces when unset.
    pub namespace: Option<String>,
    /// Image used by pods whose benchmark does not name one.
    pub images: ImageConfig,
    /// Delay before a failed benchmark is reconciled again.
    pub retry_delay: Duration,
    /// Upper bound on each API server call.
    pub call_timeout: Duration,
    /// Maximum number of benchmarks reconciled at once, 0 for no limit.
    pub concurrency: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            images: ImageConfig::default(),
            retry_delay: Duration::from_secs(5),
            call_timeout: Duration::from_secs(30),
            concurrency: 4,
        }
    }
}

/// State shared by all reconcile calls.
pub struct Context<S, O> {
    reconciler: Reconciler<S, O>,
    retry_delay: Duration,
}

impl<S, O> Context<S, O> {
    /// Create new context
    pub fn new(reconciler: Reconciler<S, O>, retry_delay: Duration) -> Self {
        Self {
            reconciler,
            retry_delay,
        }
    }
}

/// Handle errors during reconciliation.
fn on_error<S, O>(benchmark: Arc<NetBenchmark>, error: &Error, cx: Arc<Context<S, O>>) -> Action {
    warn!(
        namespace = ?benchmark.namespace(),
        name = %benchmark.name_any(),
        %error,
        "reconcile failed, requeueing"
    );
    Action::requeue(cx.retry_delay)
}

/// Start a controller for the NetBenchmark CRD.
pub async fn run(config: OperatorConfig) -> Result<(), kube::Error> {
    let k_client = Client::try_default().await?;

    let (benchmarks, pods): (Api<NetBenchmark>, Api<Pod>) = match &config.namespace {
        Some(namespace) => (
            Api::namespaced(k_client.clone(), namespace),
            Api::namespaced(k_client.clone(), namespace),
        ),
        None => (Api::all(k_client.clone()), Api::all(k_client.clone())),
    };

    let store = KubeStore::new(k_client, config.call_timeout);
    let context = Arc::new(Context::new(
        Reconciler::new(store, TracingObserver, config.images.clone()),
        config.retry_delay,
    ));

    info!(namespace = ?config.namespace, "watching benchmarks");
    Controller::new(benchmarks, watcher::Config::default())
        .owns(
            pods,
            watcher::Config::default().labels(MANAGED_BY_LABEL_SELECTOR),
        )
        .with_config(controller::Config::default().concurrency(config.concurrency))
        .shutdown_on_signal()
        .run(reconcile, on_error, context)
        .for_each(|rec_res| async move {
            match rec_res {
                Ok((benchmark, _)) => {
                    debug!(%benchmark, "reconcile success");
                }
                Err(err) => {
                    error!(?err, "reconcile error")
                }
            }
        })
        .await;
    Ok(())
}

/// Perform a reconcile pass for a benchmark.
///
/// The benchmark itself is handled first, then each of its pods that exists, server before
/// client, so a single pass can move the benchmark as far as the observed pods allow.
async fn reconcile<S, O>(benchmark: Arc<NetBenchmark>, cx: Arc<Context<S, O>>) -> Result<Action, Error>
where
    S: WorkloadStore + 'static,
    O: Observer + 'static,
{
    let reconciler = &cx.reconciler;
    reconciler
        .handle(Notification::Request {
            object: benchmark.as_ref().clone(),
            deleted: false,
        })
        .await?;

    let namespace = benchmark.namespace().unwrap_or_default();
    for role in [Role::Server, Role::Client] {
        let name = workload_name(&benchmark, role);
        match reconciler.store().get_workload(&namespace, &name).await {
            Ok(pod) => {
                reconciler
                    .handle(Notification::Workload {
                        object: Box::new(pod),
                        deleted: false,
                    })
                    .await?
            }
            Err(StoreError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
    }

    // Pod changes trigger the next pass through the owner reference.
    Ok(Action::await_change())
}
