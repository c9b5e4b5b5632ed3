//! aerospace-ipc - send commands to AeroSpace over its Unix socket.
//!
//! A thin front-end over `aerospace_ipc::ipc::IpcClient`, handy for
//! checking that a gesture daemon would be able to reach the window manager.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aerospace_ipc::ipc::{default_socket_path, IpcClient, IpcError};

/// Send commands to the AeroSpace window manager.
#[derive(Parser)]
#[command(name = "aerospace-ipc", version, about, long_about = None)]
struct Cli {
    /// Path to the AeroSpace socket (default: /tmp/bobko.aerospace-<user>.sock).
    #[arg(short, long, env = "AEROSPACE_SOCKET")]
    socket: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch to the next/previous workspace.
    Switch {
        /// Direction passed to `workspace`, e.g. "next" or "prev".
        direction: String,
    },

    /// Run a `workspace` command.
    Workspace {
        /// Wrap around at the first/last workspace.
        #[arg(long)]
        wrap_around: bool,

        /// Payload for the command's stdin.
        #[arg(long, default_value = "")]
        stdin: String,

        /// Workspace command or name.
        command: String,
    },

    /// List workspaces on the focused monitor.
    ListWorkspaces {
        /// Include workspaces with no windows.
        #[arg(long)]
        include_empty: bool,
    },

    /// Send a raw command.
    Exec {
        /// Payload for the command's stdin.
        #[arg(long, default_value = "")]
        stdin: String,

        /// Response field to print on success.
        #[arg(long)]
        field: Option<String>,

        /// Command and its arguments.
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the default socket path and exit.
    SocketPath,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "aerospace_ipc=warn",
        1 => "aerospace_ipc=debug",
        _ => "aerospace_ipc=trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let socket = cli.socket.as_deref();
    let result = match &cli.command {
        Commands::SocketPath => {
            let path = default_socket_path().context("Failed to resolve socket path")?;
            println!("{}", path.display());
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Switch { direction } => IpcClient::connect(socket)?.switch(direction),
        Commands::Workspace {
            wrap_around,
            stdin,
            command,
        } => IpcClient::connect(socket)?.workspace(*wrap_around, command, stdin),
        Commands::ListWorkspaces { include_empty } => IpcClient::connect(socket)?
            .list_workspace_names(*include_empty)
            .map(|names| (!names.is_empty()).then(|| names.join("\n"))),
        Commands::Exec { stdin, field, args } => {
            IpcClient::connect(socket)?.execute(args, stdin, field.as_deref())
        }
    };

    // The client was dropped (and closed) at the end of its arm.
    report(result)
}

/// Print a command outcome and pick the process exit status.
fn report(result: Result<Option<String>, IpcError>) -> Result<ExitCode> {
    match result {
        Ok(output) => {
            if let Some(output) = output {
                println!("{output}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(IpcError::CommandFailed { exit_code, stderr }) => {
            if let Some(stderr) = stderr {
                eprintln!("{}", stderr.trim_end());
            }
            tracing::debug!(exit_code, "AeroSpace reported failure");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("AeroSpace request failed"),
    }
}
