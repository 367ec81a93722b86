//! Command-line interface for tictac_server.

use clap::{Parser, Subcommand};

/// Tictac Server - authoritative tic-tac-toe matches with matchmaking
#[derive(Parser, Debug)]
#[command(name = "tictac_server")]
#[command(about = "Authoritative tic-tac-toe match server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the match host and HTTP RPC surface
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a device token for local testing
    Token {
        /// Device identifier (at least 10 characters)
        #[arg(long)]
        device_id: String,

        /// Display name
        #[arg(long)]
        username: Option<String>,

        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },
}
