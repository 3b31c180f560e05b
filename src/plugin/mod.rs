use std::{fs, path::Path};

use serde_json::{Map, Value, json};

use crate::{
    config,
    errors::{AppError, Result},
};

const HOOK_EVENTS: [&str; 2] = ["PermissionRequest", "Stop"];
/// Claude Code kills hooks that outlive their timeout; leave room past ours.
const HOOK_TIMEOUT_SLACK_SECS: u64 = 30;

pub fn install_hooks(binary_path: &Path, approval_timeout_secs: u64) -> Result<()> {
    let settings_path = config::claude_settings_path()?;
    let Some(parent) = settings_path.parent() else {
        return Err(AppError::HomeDirUnavailable);
    };
    fs::create_dir_all(parent).map_err(|_| AppError::CreateDir(parent.display().to_string()))?;

    let mut root: Value = if settings_path.exists() {
        let text = fs::read_to_string(&settings_path)?;
        serde_json::from_str(&text).map_err(|_| AppError::PluginSettingsParse)?
    } else {
        json!({})
    };

    merge_hooks(&mut root, binary_path, approval_timeout_secs)?;
    let serialized = serde_json::to_string_pretty(&root)?;
    fs::write(&settings_path, serialized)
        .map_err(|_| AppError::WriteConfig(settings_path.display().to_string()))?;
    Ok(())
}

pub fn hooks_installed() -> Result<bool> {
    let settings_path = config::claude_settings_path()?;
    if !settings_path.exists() {
        return Ok(false);
    }

    let text = fs::read_to_string(&settings_path)?;
    let parsed: Value = serde_json::from_str(&text).map_err(|_| AppError::PluginSettingsParse)?;
    Ok(HOOK_EVENTS
        .iter()
        .all(|event| has_bridge_hook(&parsed, event)))
}

/// Replaces our entries under `hooks.PermissionRequest` and `hooks.Stop`,
/// leaving every other hook the user configured in place.
fn merge_hooks(root: &mut Value, binary_path: &Path, approval_timeout_secs: u64) -> Result<()> {
    let Some(settings) = root.as_object_mut() else {
        return Err(AppError::PluginSettingsParse);
    };
    let hooks = settings
        .entry("hooks")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(hooks) = hooks.as_object_mut() else {
        return Err(AppError::PluginSettingsParse);
    };

    let bin = binary_path.display().to_string();
    let timeout = approval_timeout_secs + HOOK_TIMEOUT_SLACK_SECS;
    for event in HOOK_EVENTS {
        let entries = hooks
            .entry(event)
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(entries) = entries.as_array_mut() else {
            return Err(AppError::PluginSettingsParse);
        };
        entries.retain(|entry| !is_bridge_entry(entry, event));
        entries.push(build_hook_entry(&bin, event, timeout));
    }
    Ok(())
}

fn build_hook_entry(bin: &str, event: &str, timeout: u64) -> Value {
    let command = json!({
        "type": "command",
        "command": format!("{bin} hook {event}"),
        "timeout": timeout,
    });
    match event {
        "PermissionRequest" => json!({ "matcher": "*", "hooks": [command] }),
        _ => json!({ "hooks": [command] }),
    }
}

fn is_bridge_entry(entry: &Value, event: &str) -> bool {
    let suffix = format!(" hook {event}");
    entry
        .get("hooks")
        .and_then(Value::as_array)
        .is_some_and(|commands| {
            commands.iter().any(|command| {
                command
                    .get("command")
                    .and_then(Value::as_str)
                    .is_some_and(|line| line.contains("codebridge") && line.ends_with(&suffix))
            })
        })
}

fn has_bridge_hook(settings: &Value, event: &str) -> bool {
    settings
        .pointer(&format!("/hooks/{event}"))
        .and_then(Value::as_array)
        .is_some_and(|entries| entries.iter().any(|entry| is_bridge_entry(entry, event)))
}
