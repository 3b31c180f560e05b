use tracing::warn;

use super::HookArgs;
use crate::{
    config,
    errors::{AppError, Result},
    hooks::{approval, response},
};

pub async fn execute(args: HookArgs) -> Result<()> {
    match args.event.as_str() {
        "PermissionRequest" => {
            let outcome = match config::load() {
                Ok(config) => approval::execute(&config).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                // Exit status 2 makes Claude Code treat the request as blocked.
                eprintln!("codebridge: {err}; denied for safety");
                std::process::exit(2);
            }
            Ok(())
        }
        "Stop" => {
            let outcome = match config::load() {
                Ok(config) => response::execute(&config).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                warn!(error = %err, "failed to relay response");
            }
            Ok(())
        }
        other => Err(AppError::UnknownHookEvent(other.to_string())),
    }
}
