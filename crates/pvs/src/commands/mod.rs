//! Command handlers.

pub mod config_cmd;
pub mod live_fields;
pub mod snapshot;
pub mod watch;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Route a parsed command line to its handler.
pub async fn dispatch(cli: Cli) -> Result<(), CliError> {
    tracing::debug!(command = ?cli.command, "dispatching command");
    match cli.command {
        // Neither needs a gateway connection
        Command::Config(args) => config_cmd::handle(&args, &cli.global),
        Command::LiveFields(args) => live_fields::handle(&args),

        Command::Snapshot(args) => snapshot::handle(&args, &cli.global).await,
        Command::Watch(args) => watch::handle(&args, &cli.global).await,
    }
}
