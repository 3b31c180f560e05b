use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("could not resolve user home/config directory")]
    #[diagnostic(
        code(codebridge::config::paths),
        help("Set HOME, or point CODEBRIDGE_CONFIG at a config file.")
    )]
    HomeDirUnavailable,

    #[error("failed to load config: {0}")]
    #[diagnostic(
        code(codebridge::config::load),
        help("Fix the config file syntax or run `codebridge init` to rewrite it.")
    )]
    ConfigLoad(String),

    #[error("not configured")]
    #[diagnostic(
        code(codebridge::config::not_configured),
        help("Run `codebridge init` to pair a Telegram chat.")
    )]
    NotConfigured,

    #[error("failed to prepare directory: {0}")]
    #[diagnostic(code(codebridge::config::mkdir))]
    CreateDir(String),

    #[error("failed to write config file: {0}")]
    #[diagnostic(code(codebridge::config::write))]
    WriteConfig(String),

    #[error("failed to serialize config")]
    #[diagnostic(code(codebridge::config::serialize))]
    ConfigSerialize,

    #[error("failed to read hook payload from stdin")]
    #[diagnostic(code(codebridge::hook::stdin))]
    HookReadStdin,

    #[error("unsupported hook event `{0}`")]
    #[diagnostic(
        code(codebridge::hook::event),
        help("Supported events are `PermissionRequest` and `Stop`.")
    )]
    UnknownHookEvent(String),

    #[error("another bridge already owns state directory {0}")]
    #[diagnostic(
        code(codebridge::bridge::already_running),
        help("Send /stop to the running bridge or stop its process first.")
    )]
    BridgeAlreadyRunning(String),

    #[error("failed to acquire bridge lock: {0}")]
    #[diagnostic(code(codebridge::bridge::lock))]
    BridgeLock(String),

    #[error("approval request `{0}` already exists")]
    #[diagnostic(code(codebridge::state::request_exists))]
    RequestExists(String),

    #[error("invalid request id `{0}`")]
    #[diagnostic(code(codebridge::state::request_id))]
    InvalidRequestId(String),

    #[error("failed to publish state record {path}: {reason}")]
    #[diagnostic(code(codebridge::state::record))]
    StateRecord { path: String, reason: String },

    #[error("tmux is not available")]
    #[diagnostic(code(codebridge::tmux::missing), help("Install tmux and retry."))]
    TmuxMissing,

    #[error("input injection failed: {0}")]
    #[diagnostic(
        code(codebridge::injector::failed),
        help("Keep the Claude Code tmux pane alive, or set `tmux_target`.")
    )]
    InjectionFailed(String),

    #[error("Telegram token is invalid or unauthorized")]
    #[diagnostic(code(codebridge::telegram::auth))]
    TelegramAuthFailed,

    #[error("another getUpdates consumer is active on this bot token: {0}")]
    #[diagnostic(
        code(codebridge::telegram::conflict),
        help("Only one bridge may poll a bot token. Stop the other bridge or webhook.")
    )]
    PollConflict(String),

    #[error("Telegram rate limit hit, retry after {}s", retry_after.as_secs())]
    #[diagnostic(code(codebridge::telegram::throttled))]
    TelegramThrottled { retry_after: Duration },

    #[error("Telegram service unavailable: {0}")]
    #[diagnostic(code(codebridge::telegram::unavailable))]
    TelegramUnavailable(String),

    #[error("Telegram message not found")]
    #[diagnostic(code(codebridge::telegram::not_found))]
    MessageNotFound,

    #[error("telegram API error: {0}")]
    #[diagnostic(code(codebridge::telegram::api))]
    TelegramApi(String),

    #[error("gave up on Telegram after {attempts} attempts: {last}")]
    #[diagnostic(
        code(codebridge::telegram::retries_exhausted),
        help("Check network connectivity, then restart the bridge.")
    )]
    RetryBudgetExhausted { attempts: u32, last: String },

    #[error("timed out waiting for `/start` from Telegram")]
    #[diagnostic(
        code(codebridge::telegram::pairing_timeout),
        help("Send `/start` to your bot, then rerun `codebridge init`.")
    )]
    TelegramPairingTimeout,

    #[error("failed to parse existing Claude settings JSON")]
    #[diagnostic(code(codebridge::plugin::settings_parse))]
    PluginSettingsParse,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl AppError {
    /// Failures worth retrying: the next identical request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Http(_) | AppError::TelegramThrottled { .. } | AppError::TelegramUnavailable(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::TelegramThrottled { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::AppError;

    #[test]
    fn conflict_is_not_retried() {
        assert!(!AppError::PollConflict("terminated by other getUpdates request".into()).is_transient());
        assert!(!AppError::TelegramAuthFailed.is_transient());
    }

    #[test]
    fn throttling_carries_retry_after() {
        let err = AppError::TelegramThrottled {
            retry_after: Duration::from_secs(3),
        };
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }
}
