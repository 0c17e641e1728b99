//! Field sensor node.
//!
//! Connects to the configured broker, waits for its operating parameters
//! from the provisioning service, then samples and publishes until Ctrl+C.

use anyhow::{Context, Result};
use fieldnode_common::{LoggingConfig, TransportConfig, init_tracing};
use fieldnode_transport::{MqttTransport, Transport, ZenohTransport};
use tokio::signal;

use fieldnode::demo::{DEMO_NODE_ID, run_demo};
use fieldnode::identity::AUTO_NODE_ID;
use fieldnode::{ConfiguredSource, FieldNodeConfig, Node, NodeArgs, NodeIdentity, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = NodeArgs::parse();

    // Demo mode runs without a configuration file
    let config = if args.demo && !args.config.exists() {
        FieldNodeConfig::default()
    } else {
        FieldNodeConfig::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    };

    // Initialize logging with optional CLI override
    let log_config = match &args.log_level {
        Some(level) => LoggingConfig {
            level: level.clone(),
            format: config.logging.format,
        },
        None => config.logging.clone(),
    };
    init_tracing(&log_config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), demo = args.demo, "Starting fieldnode");

    let node_id = match (&args.node_id, args.demo) {
        (Some(id), _) => id.clone(),
        (None, true) if config.node.node_id == AUTO_NODE_ID => DEMO_NODE_ID.to_string(),
        (None, _) => config.node.node_id.clone(),
    };
    let identity = NodeIdentity::resolve(&node_id, config.node.interface.as_deref())
        .context("resolving node identity")?;

    tracing::info!(node_id = %identity, transport = config.transport.kind(), "Node identity");

    if args.demo {
        tokio::select! {
            _ = run_demo(&config, identity) => {}
            result = signal::ctrl_c() => shutdown(result),
        }
        return Ok(());
    }

    let clock = SystemClock::from_config(&config.clock)?;
    let source = ConfiguredSource::from_config(&config.sampling.source);

    match config.transport.clone() {
        TransportConfig::Mqtt(mqtt) => {
            run(MqttTransport::new(mqtt), identity, source, clock, &config).await;
        }
        TransportConfig::Zenoh(zenoh) => {
            run(ZenohTransport::new(zenoh), identity, source, clock, &config).await;
        }
    }

    Ok(())
}

/// Bootstrap and run a node until Ctrl+C.
async fn run<T: Transport>(
    transport: T,
    identity: NodeIdentity,
    source: ConfiguredSource,
    clock: SystemClock,
    config: &FieldNodeConfig,
) {
    let node = async {
        let mut node = Node::bootstrap(transport, identity, source, clock, config).await;
        node.run().await;
    };

    tokio::select! {
        _ = node => {}
        result = signal::ctrl_c() => shutdown(result),
    }
}

fn shutdown(result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
