//! Binary running a gateway client from command line arguments.
//!
//! Connects the configured shards, logs decoded events until interrupted,
//! then shuts the registry down cooperatively.

mod cli;

use std::sync::Arc;

use clap::Parser;
use wiregate::{
    AggregateCache, EventRegistry, EventSink, GatewayConfig, GatewayEvent, ShardRegistry,
    TcpConnector, WireFormat,
};

/// Sink that logs each event's wire name.
struct LogSink;

impl EventSink for LogSink {
    fn on_event(&self, event: GatewayEvent) {
        tracing::info!(event = event.name(), "dispatch received");
    }
}

#[tokio::main]
async fn main() -> wiregate::Result<()> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let mut config = GatewayConfig::new(cli.token, cli.host);
    config.port = cli.port;
    config.intents = cli.intents;
    config.shard_total = cli.shards;
    if cli.cbor {
        config.format = WireFormat::Cbor;
    }

    let (mut registry, handle) = ShardRegistry::new(
        config,
        TcpConnector,
        Arc::new(LogSink),
        Arc::new(EventRegistry::standard()),
        Some(Arc::new(AggregateCache::new())),
    );
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });
    registry.run().await
}
