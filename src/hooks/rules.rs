use crate::{config::Config, models::approval::Decision};

/// Exact-match tool name lists that short-circuit the chat round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoRules {
    pub approve: Vec<String>,
    pub deny: Vec<String>,
}

impl AutoRules {
    pub fn from_config(config: &Config) -> Self {
        Self {
            approve: config.auto_approve.clone(),
            deny: config.auto_deny.clone(),
        }
    }

    /// Deny is checked first, so a tool listed in both is denied.
    pub fn evaluate(&self, tool_name: &str) -> Option<Decision> {
        if self.deny.iter().any(|name| name == tool_name) {
            return Some(Decision::Deny);
        }
        if self.approve.iter().any(|name| name == tool_name) {
            return Some(Decision::Allow);
        }
        None
    }
}
