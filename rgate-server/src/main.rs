//! rgate server
//!
//! A reverse-connection RPC broker: proof, wallet and market workers dial in
//! over websockets, callers invoke them over HTTP, and sibling brokers share
//! their registrations through gossip.

mod api;
mod config;
mod server;
mod shutdown;
mod state;
mod validator;

use clap::Parser;
use config::ConfigLoader;
use rgate_core::GatewayApi;
use rgate_core::cluster::{ClusterBroadcaster, GossipMembership, HttpPeerConnector};
use rgate_core::streams::{MarketEventStream, ProofEventStream, WalletEventStream};
use rgate_core::validator::IdentityValidator;
use server::{build_router, run_server};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use validator::MinerBindingValidator;

/// rgate - reverse-connection RPC broker
#[derive(Parser, Debug)]
#[command(name = "rgate-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./rgate.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:45132)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the cluster seeds (repeatable)
    #[arg(long = "seed", env = "RGATE_SEEDS", value_delimiter = ',')]
    seeds: Vec<Url>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting rgate-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen, args.seeds);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let listen_addr = loaded_config.server.listen;
    let tokens = Arc::new(loaded_config.tokens);
    let shutdown = CancellationToken::new();

    // Event streams
    let validator: Arc<dyn IdentityValidator> =
        Arc::new(MinerBindingValidator::new(tokens.clone()));
    let request = loaded_config.request;
    let mut api = GatewayApi::new(
        ProofEventStream::new(request, validator.clone(), shutdown.clone()),
        WalletEventStream::new(request, shutdown.clone()),
        MarketEventStream::new(request, validator, shutdown.clone()),
    );

    // Cluster membership
    let membership = match loaded_config.cluster {
        Some(cluster) => {
            let connector = HttpPeerConnector::new(cluster.peer_token.clone());
            let membership = Arc::new(GossipMembership::new(cluster));
            tokio::spawn(membership.clone().run(shutdown.clone()));
            api = api.with_cluster(ClusterBroadcaster::new(
                membership.clone(),
                Arc::new(connector),
            ));
            Some(membership)
        }
        None => {
            tracing::info!("No [cluster] section, running standalone");
            None
        }
    };

    // Build the router
    let state = AppState::new(api, membership, tokens);
    let router = build_router(state);

    // Run the server
    tracing::info!(
        "Starting HTTP server on {} (public endpoint {})",
        listen_addr,
        loaded_config.server.public_endpoint
    );
    let result = run_server(router, listen_addr).await;

    // Stop reapers, lifecycle tasks and gossip
    shutdown.cancel();
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
