use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::approval::Decision;

/// Payload Claude Code writes to a `PermissionRequest` hook's stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRequestInput {
    #[serde(default = "unknown_tool")]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
}

/// Payload Claude Code writes to a `Stop` hook's stdin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopInput {
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub last_assistant_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    pub hook_specific_output: PermissionOutput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOutput {
    pub hook_event_name: &'static str,
    pub decision: HookDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct HookDecision {
    pub behavior: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HookOutput {
    pub fn permission(behavior: Decision, message: Option<String>) -> Self {
        Self {
            hook_specific_output: PermissionOutput {
                hook_event_name: "PermissionRequest",
                decision: HookDecision { behavior, message },
            },
        }
    }
}

fn unknown_tool() -> String {
    "Unknown".to_string()
}
