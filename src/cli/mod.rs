mod hook;
mod init;
mod status;

use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::{bridge, config, errors::Result};

#[derive(Debug, Parser)]
#[command(
    name = "codebridge",
    version,
    about = "Drive a Claude Code session from Telegram"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Long-poll Telegram and relay prompts into tmux (default).
    Bridge,
    /// Pair a Telegram chat, save config and install Claude Code hooks.
    Init,
    /// Show configuration and shared state.
    Status,
    /// Entry point for Claude Code hooks.
    Hook(HookArgs),
}

#[derive(Debug, Args, Clone)]
pub struct HookArgs {
    /// `PermissionRequest` or `Stop`.
    pub event: String,
}

pub async fn dispatch() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Bridge) {
        Command::Bridge => bridge::run(config::load()?).await?,
        Command::Init => init::execute().await?,
        Command::Status => status::execute().await?,
        Command::Hook(args) => hook::execute(args).await?,
    }
    debug!("command completed");
    Ok(())
}
