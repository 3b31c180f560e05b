use std::{path::Path, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    detail::permission_message, read_stdin, rules::AutoRules,
    transcript::latest_assistant_text,
};
use crate::{
    config::Config,
    errors::Result,
    models::{
        approval::{ApprovalRequest, Decision},
        hook::{HookOutput, PermissionRequestInput},
    },
    state::{Awaited, StateStore, now_epoch},
    telegram::{
        TelegramTransport,
        format::escape_html,
    },
    transport::{ChatTransport, OutgoingMessage},
};

const SEND_FAILED_REASON: &str = "Failed to send Telegram notification";
const CONTEXT_KEY_CHARS: usize = 200;
const CONTEXT_PREVIEW_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    AutoRule,
    Operator,
    Timeout,
    NotificationFailed,
}

/// What the hook reports back to Claude Code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    pub reason: Option<String>,
    pub source: Source,
}

impl Resolution {
    fn denied(reason: impl Into<String>, source: Source) -> Self {
        Self {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            source,
        }
    }

    pub fn from_rules(rules: &AutoRules, tool_name: &str) -> Option<Self> {
        match rules.evaluate(tool_name)? {
            Decision::Allow => Some(Self {
                decision: Decision::Allow,
                reason: None,
                source: Source::AutoRule,
            }),
            Decision::Deny => Some(Self::denied(
                format!("{tool_name} is blocked"),
                Source::AutoRule,
            )),
        }
    }

    pub fn into_output(self) -> HookOutput {
        HookOutput::permission(self.decision, self.reason)
    }
}

/// Asks the operator over chat and waits for the bridge to publish the answer.
pub struct Approver<T> {
    transport: T,
    store: StateStore,
    chat_id: i64,
    timeout: Duration,
    interval: Duration,
}

impl<T: ChatTransport> Approver<T> {
    pub fn new(
        transport: T,
        store: StateStore,
        chat_id: i64,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            chat_id,
            timeout,
            interval,
        }
    }

    pub async fn ask(&self, input: &PermissionRequestInput) -> Result<Resolution> {
        if let Some(path) = input.transcript_path.as_deref() {
            self.forward_context(Path::new(path)).await;
        }

        let message = permission_message(&input.tool_name, &input.tool_input);
        let request = ApprovalRequest::new(&input.tool_name, &message, now_epoch());
        let request_id = request.request_id.as_str();
        self.store.create_request(&request)?;

        let outgoing = OutgoingMessage::html(&message)
            .with_button("✅ Allow", request.callback_data(Decision::Allow))
            .with_button("❌ Deny", request.callback_data(Decision::Deny));
        let message_id = match self.transport.send(self.chat_id, outgoing).await {
            Ok(message_id) => message_id,
            Err(err) => {
                warn!(request_id, error = %err, "failed to send permission request");
                self.store.remove_request(request_id)?;
                return Ok(Resolution::denied(
                    SEND_FAILED_REASON,
                    Source::NotificationFailed,
                ));
            }
        };
        info!(request_id, tool = %input.tool_name, "awaiting operator decision");

        let deadline = Instant::now() + self.timeout;
        let awaited = match self
            .store
            .await_decision(request_id, deadline, self.interval)
            .await
        {
            Ok(awaited) => awaited,
            Err(err) => {
                // Leave nothing pending behind a failed wait.
                if let Err(cleanup) = self.store.expire_request(request_id) {
                    warn!(request_id, error = %cleanup, "failed to expire request");
                }
                return Err(err);
            }
        };

        let (resolution, outcome) = match awaited {
            Awaited::Decided(decided) => {
                self.store.answer_request(request_id)?;
                info!(request_id, decision = %decided.decision, "operator decided");
                match decided.decision {
                    Decision::Allow => (
                        Resolution {
                            decision: Decision::Allow,
                            reason: None,
                            source: Source::Operator,
                        },
                        "✅ <b>Allowed</b>".to_string(),
                    ),
                    Decision::Deny => (
                        Resolution::denied("Denied by user", Source::Operator),
                        "❌ <b>Denied</b>".to_string(),
                    ),
                }
            }
            Awaited::TimedOut => {
                self.store.expire_request(request_id)?;
                let reason = format!("No response within {}s", self.timeout.as_secs());
                warn!(request_id, "permission request timed out, denying");
                let outcome = format!("⏱ <b>{reason}</b>, denied");
                (Resolution::denied(reason, Source::Timeout), outcome)
            }
        };

        let edited = format!("{message}\n\n{outcome}");
        if let Err(err) = self.transport.edit(self.chat_id, message_id, &edited).await {
            warn!(request_id, error = %err, "failed to update permission message");
        }
        Ok(resolution)
    }

    /// Sends the assistant's latest words ahead of the prompt so the operator
    /// sees why the tool is wanted. The same text is never sent twice in a row.
    async fn forward_context(&self, transcript: &Path) {
        let text = match latest_assistant_text(transcript) {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => return,
            Err(err) => {
                debug!(error = %err, "could not read transcript");
                return;
            }
        };
        let key: String = text.chars().take(CONTEXT_KEY_CHARS).collect();
        let key = key.trim();
        match self.store.last_sent() {
            Ok(Some(last)) if last == key => return,
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to read last forwarded text"),
        }

        let preview = match text.char_indices().nth(CONTEXT_PREVIEW_CHARS) {
            Some((end, _)) => &text[..end],
            None => text.as_str(),
        };
        let message = OutgoingMessage::html(format!("🤖 Claude:\n\n{}", escape_html(preview)));
        if let Err(err) = self.transport.send(self.chat_id, message).await {
            warn!(error = %err, "failed to forward assistant text");
            return;
        }
        if let Err(err) = self.store.set_last_sent(key) {
            warn!(error = %err, "failed to record forwarded text");
        }
    }
}

impl Approver<TelegramTransport> {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            TelegramTransport::from_config(config)?,
            StateStore::new(config.state_dir()),
            config.chat_id()?,
            config.approval_timeout(),
            config.decision_poll_interval(),
        ))
    }
}

/// Auto rules first. `connect` runs only when the operator has to be asked,
/// so the fast path never touches the store or the chat.
pub async fn decide<T, F>(
    input: &PermissionRequestInput,
    rules: &AutoRules,
    connect: F,
) -> Result<Resolution>
where
    T: ChatTransport,
    F: FnOnce() -> Result<Approver<T>>,
{
    if let Some(resolution) = Resolution::from_rules(rules, &input.tool_name) {
        return Ok(resolution);
    }
    connect()?.ask(input).await
}

pub async fn execute(config: &Config) -> Result<()> {
    let input: PermissionRequestInput = serde_json::from_str(&read_stdin()?)?;
    info!(
        tool = %input.tool_name,
        session_id = input.session_id.as_deref().unwrap_or("-"),
        "permission request"
    );

    let rules = AutoRules::from_config(config);
    let resolution = decide(&input, &rules, || Approver::from_config(config)).await?;
    info!(
        source = ?resolution.source,
        decision = %resolution.decision,
        "permission resolved"
    );
    println!("{}", serde_json::to_string(&resolution.into_output())?);
    Ok(())
}
