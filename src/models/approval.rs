use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::errors::{AppError, Result};

const MAX_REQUEST_ID_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny => write!(f, "deny"),
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "allow" => Ok(Decision::Allow),
            "deny" => Ok(Decision::Deny),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Answered,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub tool_name: String,
    pub tool_detail: String,
    pub created_at: i64,
    pub status: RequestStatus,
}

impl ApprovalRequest {
    pub fn new(tool_name: impl Into<String>, tool_detail: impl Into<String>, now: i64) -> Self {
        Self {
            request_id: Ulid::new().to_string(),
            tool_name: tool_name.into(),
            tool_detail: tool_detail.into(),
            created_at: now,
            status: RequestStatus::Pending,
        }
    }

    pub fn callback_data(&self, decision: Decision) -> String {
        CallbackPayload {
            request_id: self.request_id.clone(),
            decision,
        }
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub request_id: String,
    pub decision: Decision,
    pub decided_at: i64,
}

/// Inline button payload, `request_id:decision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub request_id: String,
    pub decision: Decision,
}

impl CallbackPayload {
    pub fn parse(data: &str) -> Result<Self> {
        let Some((request_id, decision)) = data.split_once(':') else {
            return Err(AppError::InvalidRequestId(data.to_string()));
        };
        validate_request_id(request_id)?;
        let decision = decision
            .parse::<Decision>()
            .map_err(|_| AppError::InvalidRequestId(data.to_string()))?;
        Ok(Self {
            request_id: request_id.to_string(),
            decision,
        })
    }
}

impl fmt::Display for CallbackPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.request_id, self.decision)
    }
}

/// Request ids double as file names in the state directory.
pub fn validate_request_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidRequestId(id.to_string()))
    }
}
