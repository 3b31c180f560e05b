use std::{process::Stdio, time::Duration};

use tokio::{process::Command, time::sleep};
use tracing::debug;

use crate::{
    config::Config,
    errors::{AppError, Result},
};

const PASTE_BUFFER: &str = "codebridge";

/// Delivers keystrokes to whatever currently holds input focus.
pub trait InputInjector {
    /// Pastes `text` and submits it.
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Presses named keys in order (tmux key names, e.g. `BTab`, `Enter`).
    async fn press_keys(&self, keys: &[String]) -> Result<()>;
}

/// Injects through tmux. Without a target, tmux addresses the active pane of
/// the most recently used client, which is the focused session.
#[derive(Debug, Clone)]
pub struct TmuxInjector {
    target: Option<String>,
    settle: Duration,
}

impl TmuxInjector {
    pub fn new(target: Option<String>, settle: Duration) -> Self {
        Self { target, settle }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tmux_target.clone(),
            Duration::from_millis(config.paste_settle_ms),
        )
    }

    async fn tmux(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("tmux")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => AppError::TmuxMissing,
                _ => AppError::InjectionFailed(err.to_string()),
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(AppError::InjectionFailed(format!(
            "tmux {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )))
    }

    fn targeted<'a>(&'a self, mut args: Vec<&'a str>) -> Vec<&'a str> {
        if let Some(target) = self.target.as_deref() {
            args.push("-t");
            args.push(target);
        }
        args
    }
}

impl InputInjector for TmuxInjector {
    async fn type_text(&self, text: &str) -> Result<()> {
        // Bracketed paste keeps multi-line prompts from submitting early.
        self.tmux(&["set-buffer", "-b", PASTE_BUFFER, "--", text])
            .await?;
        let paste = self.targeted(vec!["paste-buffer", "-p", "-d", "-b", PASTE_BUFFER]);
        self.tmux(&paste).await?;
        sleep(self.settle).await;
        self.press_keys(&["Enter".to_string()]).await?;
        debug!(chars = text.chars().count(), "injected prompt");
        Ok(())
    }

    async fn press_keys(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            let mut args = self.targeted(vec!["send-keys"]);
            args.push(key);
            self.tmux(&args).await?;
            sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }
}

pub async fn ensure_tmux() -> Result<()> {
    let status = Command::new("tmux")
        .arg("-V")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(code) if code.success() => Ok(()),
        _ => Err(AppError::TmuxMissing),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::TmuxInjector;

    #[test]
    fn target_is_appended_only_when_configured() {
        let untargeted = TmuxInjector::new(None, Duration::ZERO);
        assert_eq!(untargeted.targeted(vec!["send-keys"]), vec!["send-keys"]);

        let targeted = TmuxInjector::new(Some("claude:0.1".into()), Duration::ZERO);
        assert_eq!(
            targeted.targeted(vec!["send-keys"]),
            vec!["send-keys", "-t", "claude:0.1"]
        );
    }
}
