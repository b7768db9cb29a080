use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging system for the DHT node.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log level based on debug/release build
        if cfg!(debug_assertions) {
            EnvFilter::new("dht_node=debug")
        } else {
            EnvFilter::new("dht_node=info")
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    info!("dht-node logging initialized");
    Ok(())
}

/// Initialize logging with fallback behavior if setup fails.
pub fn init_logging_safe() {
    if let Err(e) = init_logging() {
        eprintln!(
            "Warning: failed to set up tracing subscriber: {}. Using basic logging.",
            e
        );
    }
}

/// Log a routing-table / maintenance event.
pub fn log_routing_event(event: &str, details: &str) {
    info!(target: "dht::routing", "{}: {}", event, details);
}

/// Log an inbound or outbound KRPC message.
pub fn log_krpc(direction: &str, kind: &str, addr: &str) {
    tracing::debug!(target: "dht::krpc", "{} {} {}", direction, kind, addr);
}

/// Log a lookup lifecycle event.
pub fn log_lookup_event(lookup_id: &str, event: &str, details: &str) {
    info!(target: "dht::lookup", "lookup {} {}: {}", lookup_id, event, details);
}

/// Log error with context.
pub fn log_error_with_context(context: &str, error: &dyn std::error::Error) {
    error!(target: "dht::error", "{}: {}", context, error);
}
