/// Command Line Interface Module
///
/// This module defines the command-line interface for the DHT node using
/// Clap. It supports running the node as a long-lived service and, for
/// scripting and debugging, driving a single `get_peers` lookup from the
/// command line.
use clap::Parser;
use std::path::PathBuf;

/// Main CLI structure for the DHT node.
#[derive(Parser, Debug, Clone)]
#[command(name = "dht-node")]
pub struct Cli {
    /// UDP port to listen on (0 for an OS-assigned port).
    #[arg(long)]
    pub port: Option<u16>,
    /// Hex-encoded 160-bit node id to use (random if not specified).
    #[arg(long)]
    pub node_id: Option<String>,
    /// Path to the bootstrap-nodes snapshot file.
    #[arg(long)]
    pub bootstrap_file: Option<PathBuf>,
    /// Private overlay name-qualifier; only talk to nodes sharing it.
    #[arg(long)]
    pub private_overlay: Option<String>,
    /// Run in bootstrap mode: answer queries but never start lookups of
    /// our own.
    #[arg(long)]
    pub bootstrap_mode: bool,
    /// Path to a TOML configuration file (overrides individual flags
    /// below where both are given).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// The subcommand to execute. Defaults to `run` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Parser, Debug, Clone)]
pub enum Commands {
    /// Run the node as a long-lived service (the default).
    Run,
    /// Perform a single iterative get_peers lookup and print the peers
    /// found, then exit.
    GetPeers {
        /// Hex-encoded 160-bit info-hash to look up.
        #[arg(value_name = "INFO_HASH")]
        info_hash: String,
        /// BT port to advertise when announcing to the swarm afterward.
        #[arg(long, default_value = "6881")]
        bt_port: u16,
        /// Serve from the short-lived cache if a fresh result exists,
        /// skipping the network entirely.
        #[arg(long)]
        use_cache: bool,
    },
}

impl Cli {
    /// Fold `--config` (if present) with the individual flags into a
    /// runnable [`crate::config::Config`], flags taking precedence over
    /// file defaults for whichever fields were actually passed.
    pub fn resolve_config(&self) -> crate::error::DhtResult<crate::config::Config> {
        let mut config = crate::config::Config::load_or_default(self.config.clone())?;
        if let Some(port) = self.port {
            config.network.listen_port = port;
        }
        if let Some(path) = &self.bootstrap_file {
            config.network.bootstrap_file = path.clone();
        }
        if self.private_overlay.is_some() {
            config.network.private_overlay_name = self.private_overlay.clone();
        }
        Ok(config)
    }
}
