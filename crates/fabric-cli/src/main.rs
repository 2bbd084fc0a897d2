// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mesh::{MulticastGanglion, MulticastGanglionConfig};
use plexus::{GanglionFilters, InprocGanglion, Neuron, Plexus};
use protocol::{JsonCodec, Namespace};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Parser)]
#[command(name = "fabric", version, about = "event-fabric node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// join the fabric, periodically announcing a Ping on `namespace`
    Run(RunOpts),
}

#[derive(Parser, Debug)]
struct RunOpts {
    /// path to a fabric TOML configuration file
    #[arg(long)]
    config: String,

    /// namespace the demo ping neuron is published under
    #[arg(long, default_value = "fabric.demo")]
    namespace: String,

    /// seconds between demo pings; 0 disables the periodic emitter
    #[arg(long, default_value_t = 10)]
    ping_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ping {
    from: String,
    sequence: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    util::logging::init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(opts) => run(opts).await,
    }
}

async fn run(opts: RunOpts) -> Result<()> {
    let fabric_config = config::FabricConfig::load(&opts.config).with_context(|| format!("loading {}", opts.config))?;

    let filters = GanglionFilters {
        relevant_neurons: fabric_config.relevant_neurons.clone(),
        ignored_neurons: fabric_config.ignored_neurons.clone(),
        allowed_codecs: fabric_config.allowed_codecs.clone(),
    };

    let multicast = MulticastGanglion::start(MulticastGanglionConfig {
        bind_interface: fabric_config.bind_interface,
        multicast_cidr: fabric_config.multicast_cidr,
        port: fabric_config.port,
        heartbeat_interval: fabric_config.heartbeat_interval,
        proposal_timeout: fabric_config.proposal_timeout,
        filters,
    })
    .await
    .context("starting multicast ganglion")?;
    let instance_id = multicast.instance_id();

    let plexus = Plexus::new(Arc::new(InprocGanglion::new(GanglionFilters::default())));
    plexus.infuse_external(multicast).await.context("infusing multicast ganglion")?;

    let neuron: Neuron<Ping> = Neuron::new(Namespace::new(opts.namespace.split('.')), Arc::new(JsonCodec::new("json")), "Ping");

    plexus
        .adapt(
            neuron.clone(),
            vec![Arc::new(|value: Ping, _neuron, _reaction_id| {
                Box::pin(async move {
                    info!("received ping #{} from {}", value.sequence, value.from);
                })
            })],
        )
        .await
        .context("adapting demo ping neuron")?;

    info!(instance_id, "fabric node up, emitting pings on {}", neuron.name());

    let mut sequence = 0u64;
    let ping_interval = Duration::from_secs(opts.ping_interval_seconds.max(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(ping_interval), if opts.ping_interval_seconds > 0 => {
                plexus
                    .transmit(
                        &neuron,
                        Ping {
                            from: instance_id.to_string(),
                            sequence,
                        },
                    )
                    .await
                    .context("transmitting demo ping")?;
                sequence += 1;
            }
        }
    }

    plexus.close_all().await.context("closing plexus")?;
    Ok(())
}
