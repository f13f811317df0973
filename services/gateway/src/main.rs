// dr-gateway: Controller-side relay daemon.
//
// Loads the gateway config, opens the gateway-role relay transport, and runs
// until ctrl-c. Teardown is bounded, so a wedged socket cannot hang shutdown.

use gateway::config;
use tracing::info;

use dr_core::transport::SessionTransport;
use dr_session_log::SessionLog;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");

    // Parse optional --config <path> argument.
    // Defaults to /etc/dr-gateway/gateway.toml when not supplied.
    let args: Vec<String> = std::env::args().collect();
    let cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(p) => config::load_config_from_path(std::path::Path::new(p)),
            None => {
                eprintln!("FATAL: --config requires a path argument");
                std::process::exit(1);
            }
        },
        None => config::load_config(),
    };
    let cfg = match cfg {
        Ok(cfg) => {
            info!(relay_url = %cfg.relay_url, "config loaded");
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let log = match SessionLog::create(&cfg.log_folder) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("FATAL: failed to create session log: {e}");
            std::process::exit(1);
        }
    };
    info!(path = %log.path().display(), "session log created");

    let transport =
        SessionTransport::gateway(cfg.relay_url, cfg.client_id, cfg.private_key, log);
    if let Err(e) = transport.connect() {
        eprintln!("FATAL: failed to connect to relay: {e}");
        std::process::exit(1);
    }
    info!("relay connection started");

    tokio::signal::ctrl_c().await.ok();
    info!("ctrl-c received, shutting down");
    transport.disconnect().await;
    info!("gateway stopped");
}
