use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<i64>,
    #[serde(default = "default_api_base")]
    pub telegram_api_base: String,
    #[serde(default = "default_auto_approve")]
    pub auto_approve: Vec<String>,
    #[serde(default)]
    pub auto_deny: Vec<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_decision_poll_interval_ms")]
    pub decision_poll_interval_ms: u64,
    #[serde(default = "default_long_poll_seconds")]
    pub long_poll_seconds: u64,
    #[serde(default = "default_max_poll_retries")]
    pub max_poll_retries: u32,
    #[serde(default = "default_orphan_grace_seconds")]
    pub orphan_grace_seconds: u64,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_outbound_per_second")]
    pub outbound_per_second: u32,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default)]
    pub tmux_target: Option<String>,
    #[serde(default = "default_paste_settle_ms")]
    pub paste_settle_ms: u64,
    #[serde(default = "default_plan_mode_keys")]
    pub plan_mode_keys: Vec<String>,
    #[serde(default = "default_plan_mode_prefix")]
    pub plan_mode_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: default_api_base(),
            auto_approve: default_auto_approve(),
            auto_deny: Vec::new(),
            timeout_seconds: default_timeout_seconds(),
            decision_poll_interval_ms: default_decision_poll_interval_ms(),
            long_poll_seconds: default_long_poll_seconds(),
            max_poll_retries: default_max_poll_retries(),
            orphan_grace_seconds: default_orphan_grace_seconds(),
            max_message_length: default_max_message_length(),
            outbound_per_second: default_outbound_per_second(),
            state_dir: default_state_dir(),
            tmux_target: None,
            paste_settle_ms: default_paste_settle_ms(),
            plan_mode_keys: default_plan_mode_keys(),
            plan_mode_prefix: default_plan_mode_prefix(),
        }
    }
}

impl Config {
    pub fn is_configured(&self) -> bool {
        self.telegram_bot_token
            .as_deref()
            .map(str::trim)
            .is_some_and(|token| !token.is_empty())
            && self.telegram_chat_id.is_some_and(|chat_id| chat_id != 0)
    }

    pub fn token(&self) -> Result<&str> {
        self.telegram_bot_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or(AppError::NotConfigured)
    }

    pub fn chat_id(&self) -> Result<i64> {
        self.telegram_chat_id
            .filter(|chat_id| *chat_id != 0)
            .ok_or(AppError::NotConfigured)
    }

    pub fn state_dir(&self) -> &Path {
        Path::new(&self.state_dir)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn decision_poll_interval(&self) -> Duration {
        Duration::from_millis(self.decision_poll_interval_ms.max(10))
    }

    pub fn long_poll(&self) -> Duration {
        Duration::from_secs(self.long_poll_seconds)
    }

    pub fn orphan_grace(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_seconds)
    }
}

/// Defaults, then the TOML file, then `CODEBRIDGE_*` variables. Environment
/// wins so a hook running under another OS environment can point
/// `CODEBRIDGE_STATE_DIR` at the bridge's directory.
pub fn load() -> Result<Config> {
    let path = config_path()?;
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if path.exists() {
        figment = figment.merge(Toml::file(&path));
    }

    figment
        .merge(Env::prefixed("CODEBRIDGE_").ignore(&["config"]))
        .extract()
        .map_err(|err| AppError::ConfigLoad(err.to_string()))
}

pub fn save(config: &Config) -> Result<()> {
    let path = config_path()?;
    let Some(parent) = path.parent() else {
        return Err(AppError::HomeDirUnavailable);
    };

    fs::create_dir_all(parent).map_err(|_| AppError::CreateDir(parent.display().to_string()))?;

    let toml_text = toml::to_string_pretty(config).map_err(|_| AppError::ConfigSerialize)?;
    fs::write(&path, toml_text).map_err(|_| AppError::WriteConfig(path.display().to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

pub fn config_path() -> Result<PathBuf> {
    if let Ok(explicit) = env::var("CODEBRIDGE_CONFIG") {
        return Ok(PathBuf::from(explicit));
    }
    let Some(base_dirs) = BaseDirs::new() else {
        return Err(AppError::HomeDirUnavailable);
    };
    Ok(base_dirs.config_dir().join("codebridge").join("config.toml"))
}

pub fn claude_settings_path() -> Result<PathBuf> {
    let Some(base_dirs) = BaseDirs::new() else {
        return Err(AppError::HomeDirUnavailable);
    };
    Ok(base_dirs.home_dir().join(".claude").join("settings.json"))
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_auto_approve() -> Vec<String> {
    ["Read", "Glob", "Grep"].map(String::from).to_vec()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_decision_poll_interval_ms() -> u64 {
    500
}

fn default_long_poll_seconds() -> u64 {
    20
}

fn default_max_poll_retries() -> u32 {
    8
}

fn default_orphan_grace_seconds() -> u64 {
    120
}

fn default_max_message_length() -> usize {
    3500
}

fn default_outbound_per_second() -> u32 {
    20
}

fn default_paste_settle_ms() -> u64 {
    200
}

fn default_plan_mode_keys() -> Vec<String> {
    vec!["BTab".to_string(), "BTab".to_string()]
}

fn default_plan_mode_prefix() -> String {
    "(plan mode) ".to_string()
}

fn default_state_dir() -> String {
    BaseDirs::new()
        .map(|dirs| dirs.data_dir().join("codebridge").join("state"))
        .unwrap_or_else(|| env::temp_dir().join("codebridge"))
        .to_string_lossy()
        .into_owned()
}
