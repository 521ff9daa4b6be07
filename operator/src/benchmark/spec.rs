use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Primary CRD for requesting a single network throughput benchmark.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "netbench.dev",
    version = "v1alpha1",
    kind = "NetBenchmark",
    plural = "netbenchmarks",
    shortname = "nb",
    status = "NetBenchmarkStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Throughput", "type":"number", "jsonPath":".status.throughputBitsPerSecond"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetBenchmarkSpec {
    /// Name of the node the server workload must be scheduled on.
    pub server_node: Option<String>,
    /// Name of the node the client workload must be scheduled on.
    pub client_node: Option<String>,
    /// Image for both benchmark workloads, overrides the operator default.
    pub image: Option<String>,
    /// Pull policy for image.
    pub image_pull_policy: Option<String>,
}

/// Current status of a benchmark.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetBenchmarkStatus {
    /// Progress of the benchmark.
    #[serde(default)]
    pub phase: Phase,
    /// Name of the server pod, empty until it has been created.
    #[serde(default)]
    pub server_workload_name: String,
    /// Name of the client pod, empty until it has been created.
    #[serde(default)]
    pub client_workload_name: String,
    /// Measured throughput as reported by the client, only set once the phase is Done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_bits_per_second: Option<f64>,
}

/// Phases of a benchmark, in the order they are reached.
///
/// Done and Error are terminal.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy, JsonSchema)]
pub enum Phase {
    /// Nothing has been created yet.
    #[default]
    Initial,
    /// The server pod has been created.
    ServerScheduled,
    /// The client pod has been created and is measuring.
    Testing,
    /// The throughput has been recorded and both pods removed.
    Done,
    /// The benchmark failed and will not make further progress.
    Error,
}

impl Phase {
    /// Reports whether no further action is taken in this phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }

    // Position along Initial -> ServerScheduled -> Testing -> Done.
    fn rank(self) -> u8 {
        match self {
            Phase::Initial => 0,
            Phase::ServerScheduled => 1,
            Phase::Testing => 2,
            Phase::Done => 3,
            Phase::Error => 4,
        }
    }

    /// Reports whether moving from this phase to `next` keeps progress monotonic.
    ///
    /// Staying in the same non-terminal phase is allowed so a status can be re-recorded.
    pub fn can_advance_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Phase::Error || next.rank() >= self.rank()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Initial => "Initial",
            Phase::ServerScheduled => "ServerScheduled",
            Phase::Testing => "Testing",
            Phase::Done => "Done",
            Phase::Error => "Error",
        };
        f.write_str(name)
    }
}

impl NetBenchmark {
    /// Status of the benchmark, a missing status is the default Initial status.
    pub fn current_status(&self) -> NetBenchmarkStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Current phase of the benchmark.
    pub fn phase(&self) -> Phase {
        self.status
            .as_ref()
            .map(|status| status.phase)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        assert!(Phase::Initial.can_advance_to(Phase::ServerScheduled));
        assert!(Phase::ServerScheduled.can_advance_to(Phase::ServerScheduled));
        assert!(Phase::ServerScheduled.can_advance_to(Phase::Testing));
        assert!(Phase::Testing.can_advance_to(Phase::Done));
        assert!(!Phase::Testing.can_advance_to(Phase::ServerScheduled));
        assert!(!Phase::Testing.can_advance_to(Phase::Initial));
    }

    #[test]
    fn error_is_reachable_from_any_non_terminal_phase() {
        for phase in [Phase::Initial, Phase::ServerScheduled, Phase::Testing] {
            assert!(phase.can_advance_to(Phase::Error), "{phase}");
        }
    }

    #[test]
    fn terminal_phases_absorb() {
        for phase in [Phase::Done, Phase::Error] {
            assert!(phase.is_terminal());
            for next in [
                Phase::Initial,
                Phase::ServerScheduled,
                Phase::Testing,
                Phase::Done,
                Phase::Error,
            ] {
                assert!(!phase.can_advance_to(next), "{phase} -> {next}");
            }
        }
    }

    #[test]
    fn missing_status_is_initial() {
        let benchmark = NetBenchmark::new("bench", NetBenchmarkSpec::default());
        assert_eq!(benchmark.phase(), Phase::Initial);
        assert_eq!(benchmark.current_status(), NetBenchmarkStatus::default());
    }

    #[test]
    fn status_uses_camel_case() {
        let status = NetBenchmarkStatus {
            phase: Phase::Done,
            server_workload_name: "bench-server-a".to_owned(),
            client_workload_name: "bench-client-a".to_owned(),
            throughput_bits_per_second: Some(941.23),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({
                "phase": "Done",
                "serverWorkloadName": "bench-server-a",
                "clientWorkloadName": "bench-client-a",
                "throughputBitsPerSecond": 941.23,
            })
        );
        let empty: NetBenchmarkStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(empty, NetBenchmarkStatus::default());
    }
}
