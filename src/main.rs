// ===================================================================================================
// mainline-dht-node - Kademlia-style mainline DHT node
// ===================================================================================================
//
// Joins a BitTorrent-style mainline DHT overlay and either runs as a
// long-lived node (answering queries, refreshing its routing table) or
// drives a single get_peers lookup from the command line and exits.
//
// ===================================================================================================

mod bootstrap;
mod cache;
mod cli;
mod config;
mod controller;
mod error;
mod experimental;
mod identifier;
mod logging;
mod lookup;
mod message;
mod node;
mod querier;
mod reactor;
mod responder;
mod routing;

use clap::Parser;
use cli::{Cli, Commands};
use controller::Controller;
use identifier::NodeId;
use lookup::LookupCallback;
use reactor::Reactor;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging_safe();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let node_id = match &cli.node_id {
        Some(hex) => Some(hex.parse::<NodeId>().map_err(|e| anyhow::anyhow!("invalid --node-id: {e}"))?),
        None => None,
    };

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => run_service(config, node_id, cli.bootstrap_mode).await,
        Commands::GetPeers { info_hash, bt_port, use_cache } => {
            run_get_peers(config, node_id, cli.bootstrap_mode, &info_hash, bt_port, use_cache).await
        }
    }
}

async fn run_service(config: config::Config, node_id: Option<NodeId>, bootstrap_mode: bool) -> anyhow::Result<()> {
    let controller = Controller::new(&config, node_id, bootstrap_mode)?;
    tracing::info!(node_id = %controller.local_id(), "starting dht-node");
    let reactor = Reactor::bind(config.network.listen_port, controller).await?;
    reactor.run().await?;
    Ok(())
}

async fn run_get_peers(
    config: config::Config,
    node_id: Option<NodeId>,
    bootstrap_mode: bool,
    info_hash_hex: &str,
    bt_port: u16,
    use_cache: bool,
) -> anyhow::Result<()> {
    let info_hash: NodeId = info_hash_hex
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid info hash {:?}: {e}", info_hash_hex))?;

    let peers = Arc::new(Mutex::new(Vec::new()));
    let peers_for_callback = peers.clone();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));
    let callback: LookupCallback = Box::new(move |_lookup_id, batch, _src| match batch {
        Some(found) => peers_for_callback.lock().unwrap().extend(found),
        None => {
            if let Some(tx) = done_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }
    });

    let mut controller = Controller::new(&config, node_id, bootstrap_mode)?;
    let initial = controller.get_peers(0, info_hash, callback, bt_port, use_cache);
    let reactor = Reactor::bind(config.network.listen_port, controller).await?;
    reactor.send_all(initial).await?;
    reactor.run_until(done_rx).await?;

    for peer in peers.lock().unwrap().iter() {
        println!("{}", peer);
    }
    Ok(())
}
