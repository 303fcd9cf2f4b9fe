//! CLI argument parsing for the painel-worker binary.

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "painel-worker", about = "Client and appointment panel backend worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Print a development access token for an owner
    IssueToken {
        /// Owner id placed in the token subject
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        email: Option<String>,
    },
}
