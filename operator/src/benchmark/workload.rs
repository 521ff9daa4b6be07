//! Construction of the server and client pods of a benchmark.
use k8s_openapi::{
    api::core::v1::{
        Affinity, Container, NodeAffinity, NodeSelector, NodeSelectorRequirement,
        NodeSelectorTerm, Pod, PodSpec,
    },
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::{api::ObjectMeta, Resource, ResourceExt};
use multihash_codetable::{Code, MultihashDigest};

use crate::{
    benchmark::{NetBenchmark, NetBenchmarkSpec},
    labels::workload_labels,
};

/// Image with both netserver and netperf installed.
pub const DEFAULT_IMAGE: &str = "tailoredcloud/netperf:v2.7";
/// Pull policy used unless a benchmark overrides it.
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";

const SERVER_NAME_PREFIX: &str = "bench-server-";
const CLIENT_NAME_PREFIX: &str = "bench-client-";
const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";
const HASHED_SUFFIX_LEN: usize = 12;

/// Role a pod plays in a benchmark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Runs netserver and waits for connections.
    Server,
    /// Runs netperf against the server once and exits.
    Client,
}

impl Role {
    /// Label value of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }

    /// Restart policy a pod of this role is created with.
    pub fn restart_policy(self) -> RestartPolicy {
        match self {
            Role::Server => RestartPolicy::Always,
            Role::Client => RestartPolicy::OnFailure,
        }
    }

    fn name_prefix(self) -> &'static str {
        match self {
            Role::Server => SERVER_NAME_PREFIX,
            Role::Client => CLIENT_NAME_PREFIX,
        }
    }

    fn node_hint(self, spec: &NetBenchmarkSpec) -> Option<&str> {
        let hint = match self {
            Role::Server => spec.server_node.as_deref(),
            Role::Client => spec.client_node.as_deref(),
        };
        hint.filter(|node| !node.is_empty())
    }
}

/// Pod restart policies used by benchmark pods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart whenever the container exits.
    Always,
    /// Restart only when the container exits with an error.
    OnFailure,
}

impl RestartPolicy {
    fn as_str(self) -> &'static str {
        match self {
            RestartPolicy::Always => "Always",
            RestartPolicy::OnFailure => "OnFailure",
        }
    }
}

/// Configuration for benchmark images.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageConfig {
    /// Image for both benchmark pods.
    pub image: String,
    /// Pull policy for image.
    pub image_pull_policy: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_owned(),
            image_pull_policy: DEFAULT_IMAGE_PULL_POLICY.to_owned(),
        }
    }
}

impl ImageConfig {
    /// Apply the overrides of a benchmark on top of this configuration.
    pub fn for_benchmark(&self, spec: &NetBenchmarkSpec) -> Self {
        // Empty overrides are unset, like empty node hints.
        let image = spec.image.as_deref().filter(|image| !image.is_empty());
        let image_pull_policy = spec
            .image_pull_policy
            .as_deref()
            .filter(|policy| !policy.is_empty());
        Self {
            image: image.unwrap_or(&self.image).to_owned(),
            image_pull_policy: image_pull_policy
                .unwrap_or(&self.image_pull_policy)
                .to_owned(),
        }
    }
}

/// Command of a client measuring against the server at `server_address`.
pub fn client_command(server_address: &str) -> Vec<String> {
    vec![
        "netperf".to_owned(),
        "-H".to_owned(),
        server_address.to_owned(),
    ]
}

/// Deterministic name of the pod with `role` for a benchmark.
///
/// Canonical UIDs contribute their last fragment, any other UID is hashed.
pub fn workload_name(benchmark: &NetBenchmark, role: Role) -> String {
    let uid = benchmark.uid().unwrap_or_default();
    format!("{}{}", role.name_prefix(), uid_suffix(&uid))
}

fn uid_suffix(uid: &str) -> String {
    match uid.split('-').collect::<Vec<_>>().as_slice() {
        [_, _, _, _, last]
            if !last.is_empty() && last.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            last.to_ascii_lowercase()
        }
        _ => {
            let digest = Code::Sha2_256.digest(uid.as_bytes());
            let mut suffix = hex::encode(digest.digest());
            suffix.truncate(HASHED_SUFFIX_LEN);
            suffix
        }
    }
}

/// Reference from a pod back to the benchmark that owns it.
pub fn owner_reference(benchmark: &NetBenchmark) -> OwnerReference {
    OwnerReference {
        api_version: NetBenchmark::api_version(&()).into_owned(),
        kind: NetBenchmark::kind(&()).into_owned(),
        name: benchmark.name_any(),
        uid: benchmark.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Identity of the benchmark a pod belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchmarkRef {
    /// Namespace of the benchmark, always the namespace of the pod.
    pub namespace: String,
    /// Name of the benchmark.
    pub name: String,
    /// Uid of the benchmark, empty when the reference carries none.
    pub uid: String,
}

/// Find the benchmark that owns a pod.
pub fn benchmark_owner(pod: &Pod) -> Option<BenchmarkRef> {
    let kind = NetBenchmark::kind(&());
    pod.owner_references()
        .iter()
        .find(|oref| oref.kind == kind)
        .map(|oref| BenchmarkRef {
            namespace: pod.namespace().unwrap_or_default(),
            name: oref.name.clone(),
            uid: oref.uid.clone(),
        })
}

// Require scheduling onto exactly the named node.
fn node_affinity(node: &str) -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: HOSTNAME_LABEL.to_owned(),
                        operator: "In".to_owned(),
                        values: Some(vec![node.to_owned()]),
                    }]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the pod with `role` for a benchmark.
///
/// An empty command keeps the image entrypoint.
pub fn build_workload(
    benchmark: &NetBenchmark,
    role: Role,
    restart_policy: RestartPolicy,
    command: Vec<String>,
    images: &ImageConfig,
) -> Pod {
    let name = workload_name(benchmark, role);
    let images = images.for_benchmark(&benchmark.spec);
    Pod {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: benchmark.namespace(),
            owner_references: Some(vec![owner_reference(benchmark)]),
            labels: Some(workload_labels(role.as_str())),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name,
                image: Some(images.image),
                image_pull_policy: Some(images.image_pull_policy),
                command: (!command.is_empty()).then_some(command),
                ..Default::default()
            }],
            restart_policy: Some(restart_policy.as_str().to_owned()),
            affinity: role.node_hint(&benchmark.spec).map(node_affinity),
            ..Default::default()
        }),
        ..Default::default()
    }
}
