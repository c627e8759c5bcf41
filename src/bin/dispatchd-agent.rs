//! dispatchd-agent — per-node worker that executes service-control commands
//! on behalf of a dispatchd-broker.
//!
//! Subscribes to the broker's fan-out endpoint on the host's OS-family name,
//! its node name, and any configured extra topic prefixes; executes matched
//! requests against the local `service(8)` utility; pushes results to the
//! broker's sink.
//!
//! # Usage
//!
//! ```bash
//! dispatchd-agent --config dispatchd-agent.toml
//!
//! dispatchd-agent \
//!     --fanout tcp://broker-host:5556 \
//!     --sink tcp://broker-host:5557 \
//!     --management tcp://0.0.0.0:5560
//! ```

use std::path::PathBuf;

use clap::Parser;
use dispatchd::agent::Agent;
use dispatchd::config::AgentConfig;

#[derive(Parser, Debug)]
#[command(name = "dispatchd-agent", version, about)]
struct Cli {
    /// Path to a TOML config file. CLI flags and environment variables override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "DISPATCHD_AGENT_FANOUT")]
    fanout: Option<String>,

    #[arg(long, env = "DISPATCHD_AGENT_SINK")]
    sink: Option<String>,

    #[arg(long, env = "DISPATCHD_AGENT_MANAGEMENT")]
    management: Option<String>,

    /// Extra topic prefixes to subscribe to, beyond the implicit OS-family/node-name ones.
    #[arg(long, env = "DISPATCHD_AGENT_TOPICS", value_delimiter = ',')]
    topics: Vec<String>,

    /// Interval in seconds between metrics log lines (0 = disabled).
    #[arg(long, env = "DISPATCHD_AGENT_METRICS_INTERVAL", default_value_t = 30)]
    metrics_interval: u64,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<AgentConfig> {
        let base = match &self.config {
            Some(path) => AgentConfig::from_file(path)?,
            None => AgentConfig::default(),
        };

        Ok(base.merge(AgentConfig {
            fanout: self.fanout,
            sink: self.sink,
            management: self.management,
            topics: self.topics,
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let metrics_interval = cli.metrics_interval;
    tracing::info!(?cli, "starting dispatchd-agent");

    let config = cli.into_config()?.validate()?;
    let agent = Agent::connect(config).await?;

    if metrics_interval > 0 {
        let metrics = agent.metrics();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            loop {
                interval.tick().await;
                metrics.log();
            }
        });
    }

    // The agent terminates only via the `agent.shutdown` management
    // command; no OS signal is wired to shutdown.
    agent.run().await?;

    tracing::info!("dispatchd-agent exited cleanly");
    Ok(())
}
