//! dispatchd-broker — central fan-out/fan-in dispatcher for service-control requests.
//!
//! Terminates client intake requests, assigns correlation tokens, fans
//! requests out to topic-matching agents, collects their results at the
//! sink, and republishes results keyed by token on an ephemeral port.
//!
//! # Usage
//!
//! ```bash
//! dispatchd-broker --config dispatchd-broker.toml
//!
//! dispatchd-broker \
//!     --intake tcp://0.0.0.0:5555 \
//!     --fanout tcp://0.0.0.0:5556 \
//!     --sink tcp://0.0.0.0:5557 \
//!     --management tcp://0.0.0.0:5558
//!
//! DISPATCHD_BROKER_INTAKE=tcp://0.0.0.0:5555 dispatchd-broker --fanout tcp://0.0.0.0:5556 ...
//! ```

use std::path::PathBuf;

use clap::Parser;
use dispatchd::broker::Broker;
use dispatchd::config::BrokerConfig;

#[derive(Parser, Debug)]
#[command(name = "dispatchd-broker", version, about)]
struct Cli {
    /// Path to a TOML config file. CLI flags and environment variables override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "DISPATCHD_BROKER_INTAKE")]
    intake: Option<String>,

    #[arg(long, env = "DISPATCHD_BROKER_FANOUT")]
    fanout: Option<String>,

    #[arg(long, env = "DISPATCHD_BROKER_SINK")]
    sink: Option<String>,

    #[arg(long, env = "DISPATCHD_BROKER_MANAGEMENT")]
    management: Option<String>,

    /// Interface the ephemeral result-publisher port binds on.
    #[arg(long, env = "DISPATCHD_BROKER_RESULT_PUBLISHER_HOST")]
    result_publisher_host: Option<String>,

    /// Interval in seconds between metrics log lines (0 = disabled).
    #[arg(long, env = "DISPATCHD_BROKER_METRICS_INTERVAL", default_value_t = 30)]
    metrics_interval: u64,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<BrokerConfig> {
        let base = match &self.config {
            Some(path) => BrokerConfig::from_file(path)?,
            None => BrokerConfig::default(),
        };

        Ok(base.merge(BrokerConfig {
            intake: self.intake,
            fanout: self.fanout,
            sink: self.sink,
            management: self.management,
            result_publisher_host: self.result_publisher_host,
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
    tracing::info!(?cli, "starting dispatchd-broker");

    let config = cli.into_config()?.validate()?;
    let broker = Broker::bind(config).await?;
    tracing::info!(port = broker.result_publisher_port(), "result publisher port assigned");

    if metrics_interval > 0 {
        let metrics = broker.metrics();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            loop {
                interval.tick().await;
                metrics.log();
            }
        });
    }

    // The broker terminates only via the `manager.shutdown` management
    // command; no OS signal is wired to shutdown.
    broker.run().await?;

    tracing::info!("dispatchd-broker exited cleanly");
    Ok(())
}
