// shell: Line-oriented command interface for the operator.
//
// Each input line is tokenized shell-style (quotes and escapes honored) and
// parsed as a clap subcommand, so shell commands get real flag parsing,
// `--help`, and error messages for free.

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use dr_core::backend::BackendClient;
use dr_core::error::RelayError;
use dr_core::issuer::{ConfigInit, CreateControllerRequest, create_controller};
use dr_core::registry::{find_controller, list_controllers};
use dr_core::session::DrSession;

use crate::render::{OutputFormat, render_controllers};

/// One parsed line of shell input.
#[derive(Debug, Parser)]
#[command(name = "", no_binary_name = true)]
pub enum ShellCommand {
    /// Register a new controller and print its bootstrap credential
    #[command(name = "controller-create")]
    ControllerCreate {
        /// Controller display name
        #[arg(long)]
        name: String,
        /// Application name or uid the controller belongs to
        #[arg(long)]
        application: String,
        /// Materialize a full client configuration: json, b64, or a file path
        #[arg(long)]
        config_init: Option<String>,
        /// Print only the credential, for scripting
        #[arg(long)]
        return_value: bool,
    },
    /// List registered controllers
    #[command(name = "controller-list")]
    ControllerList,
    /// Show one controller by uid or name
    #[command(name = "controller-info")]
    ControllerInfo {
        /// Controller uid or name
        controller: String,
    },
    /// Open the relay session
    Connect,
    /// Close the relay session
    Disconnect,
    /// Send a command over the relay session
    Cmd {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Leave the shell
    Exit,
}

/// Parse one input line.  Blank lines parse to `None`.
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, clap::Error> {
    let Some(tokens) = shlex::split(line) else {
        return Err(clap::Error::raw(
            clap::error::ErrorKind::InvalidValue,
            "unmatched quote in input\n",
        ));
    };
    if tokens.is_empty() {
        return Ok(None);
    }
    ShellCommand::try_parse_from(tokens).map(Some)
}

/// Everything a shell command can touch: the backend client, the one
/// process-wide relay session, and the invocation-level options.
pub struct ShellContext {
    pub backend: BackendClient,
    pub session: DrSession,
    pub relay_url: Option<String>,
    pub session_token: String,
    pub log_folder: PathBuf,
    pub format: OutputFormat,
}

impl ShellContext {
    /// Execute one command.  Returns false when the shell should exit.
    pub async fn run_command(&mut self, command: ShellCommand) -> Result<bool, RelayError> {
        match command {
            ShellCommand::ControllerCreate {
                name,
                application,
                config_init,
                return_value,
            } => {
                let request = CreateControllerRequest {
                    controller_name: name,
                    application_ref: application,
                    config_init: config_init.as_deref().map(ConfigInit::parse),
                };
                let (credential, record) = create_controller(&self.backend, &request).await?;
                if return_value {
                    println!("{}", credential.value());
                } else {
                    println!("Controller \"{}\" has been created.", record.name);
                    println!("Hand the credential below to the controller host.");
                    println!("--------------------------------");
                    println!("{}", credential.value());
                    println!("--------------------------------");
                }
            }
            ShellCommand::ControllerList => {
                let records = list_controllers(&self.backend).await?;
                print!("{}", render_controllers(&records, self.format));
            }
            ShellCommand::ControllerInfo { controller } => {
                let record = find_controller(&self.backend, &controller).await?;
                print!(
                    "{}",
                    render_controllers(std::slice::from_ref(&record), self.format)
                );
            }
            ShellCommand::Connect => match &self.relay_url {
                None => warn!("No relay URL configured, not connecting"),
                Some(url) => {
                    self.session
                        .connect(url, &self.session_token, &self.log_folder)?;
                }
            },
            ShellCommand::Disconnect => self.session.disconnect().await,
            ShellCommand::Cmd { command } => self.session.send_command(&command)?,
            ShellCommand::Exit => return Ok(false),
        }
        Ok(true)
    }
}
