mod bridge;
mod cli;
mod config;
mod errors;
mod hooks;
mod injector;
mod models;
mod plugin;
mod state;
mod telegram;
#[cfg(test)]
mod testing;
mod transport;

use miette::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    cli::dispatch().await.map_err(Into::into)
}

/// Logs go to stderr; hook stdout is reserved for the JSON reply.
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codebridge=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
