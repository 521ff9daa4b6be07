//! Operator is a long lived process that runs network throughput benchmarks requested as
//! NetBenchmark resources.
#![deny(missing_docs)]

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use netbench_common::telemetry;
use netbench_operator::benchmark::{
    self,
    workload::{ImageConfig, DEFAULT_IMAGE, DEFAULT_IMAGE_PULL_POLICY},
    OperatorConfig,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Endpoint traces are exported to, tracing is only logged when unset.
    #[arg(long, env = "NETBENCH_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Namespace to watch, all namespaces when unset.
    #[arg(long, env = "NETBENCH_NAMESPACE")]
    namespace: Option<String>,

    /// Image of benchmarks that do not name one.
    #[arg(long, env = "NETBENCH_IMAGE", default_value = DEFAULT_IMAGE)]
    image: String,

    /// Pull policy of benchmarks that do not name one.
    #[arg(long, env = "NETBENCH_IMAGE_PULL_POLICY", default_value = DEFAULT_IMAGE_PULL_POLICY)]
    image_pull_policy: String,

    /// Seconds to wait before a failed benchmark is reconciled again.
    #[arg(long, env = "NETBENCH_RETRY_DELAY_SECS", default_value_t = 5)]
    retry_delay_secs: u64,

    /// Seconds each API server call may take.
    #[arg(long, env = "NETBENCH_CALL_TIMEOUT_SECS", default_value_t = 30)]
    call_timeout_secs: u64,

    /// Number of benchmarks reconciled at once, 0 for no limit.
    #[arg(long, env = "NETBENCH_CONCURRENCY", default_value_t = 4)]
    concurrency: u16,
}

impl From<Cli> for OperatorConfig {
    fn from(cli: Cli) -> Self {
        Self {
            namespace: cli.namespace,
            images: ImageConfig {
                image: cli.image,
                image_pull_policy: cli.image_pull_policy,
            },
            retry_delay: Duration::from_secs(cli.retry_delay_secs),
            call_timeout: Duration::from_secs(cli.call_timeout_secs),
            concurrency: cli.concurrency,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    telemetry::init(args.otlp_endpoint.clone())?;

    info!(?args, "starting operator");
    benchmark::run(args.into()).await?;

    // Flush traces before shutdown
    telemetry::shutdown();
    Ok(())
}
