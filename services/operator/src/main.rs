// dr-operator: Interactive operator shell.
//
// Parses the invocation options, then reads shell commands from stdin until
// `exit` or end of input.  Any session left open is torn down on the way out.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use dr_core::backend::BackendClient;
use dr_core::session::DrSession;
use operator::render::OutputFormat;
use operator::shell::{self, ShellContext};

#[derive(Parser)]
#[command(
    name = "dr-operator",
    version,
    about = "Operator shell for rotation controllers"
)]
struct Cli {
    /// Backend base URL
    #[arg(long)]
    server: String,
    /// Relay websocket URL
    #[arg(long)]
    relay_url: Option<String>,
    /// Backend session token
    #[arg(long, env = "DR_SESSION_TOKEN")]
    session_token: String,
    /// Folder for session audit logs
    #[arg(long, default_value = "dr-logs")]
    log_folder: PathBuf,
    /// Listing output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "operator starting");

    let mut ctx = ShellContext {
        backend: BackendClient::new(cli.server, cli.session_token.clone()),
        session: DrSession::new(),
        relay_url: cli.relay_url,
        session_token: cli.session_token,
        log_folder: cli.log_folder,
        format: cli.format,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("dr> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        match shell::parse_line(&line) {
            Ok(None) => {}
            Ok(Some(command)) => match ctx.run_command(command).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => eprintln!("Error: {e}"),
            },
            Err(e) => {
                // clap renders its own usage and error text
                let _ = e.print();
            }
        }
    }

    if ctx.session.is_connected() {
        ctx.session.disconnect().await;
    }
}
