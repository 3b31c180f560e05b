pub mod format;
mod retry;
mod wire;

use std::{num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

pub use retry::{PollPhase, RetryBudget, RetryStep};
use wire::{BotUser, SentMessage, TelegramResponse, TelegramUpdate};

use crate::{
    config::Config,
    errors::{AppError, Result},
    models::event::{ChatEvent, EventCursor, EventKind},
    transport::{ChatTransport, MessageOutcome, OutgoingMessage, TextFormat},
};

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);
const LONG_POLL_SLACK: Duration = Duration::from_secs(10);
const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];
/// Asks Telegram for only the newest pending update, confirming all older ones.
const NEWEST_UPDATE_OFFSET: i64 = -1;

/// Thin Bot API client. The token never appears in errors or logs: reqwest
/// errors are stripped of their URL before they leave this module.
pub struct TelegramClient {
    http: Client,
    api_base: String,
    token: SecretString,
    limiter: DefaultDirectRateLimiter,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, outbound_per_second: u32) -> Self {
        let rate = NonZeroU32::new(outbound_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            http: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: SecretString::from(token.to_string()),
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    pub async fn get_me(&self) -> Result<String> {
        let user: BotUser = self.call("getMe", &json!({}), OUTBOUND_TIMEOUT).await?;
        Ok(user.username.unwrap_or_else(|| "unknown-bot".to_string()))
    }

    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<TelegramUpdate>> {
        let payload = json!({
            "timeout": timeout.as_secs(),
            "offset": offset,
            "allowed_updates": ALLOWED_UPDATES,
        });
        self.call("getUpdates", &payload, timeout + LONG_POLL_SLACK)
            .await
    }

    /// Blocks until a `/start` arrives, returning the chat it came from.
    pub async fn wait_for_start_chat(&self, max_wait: Duration) -> Result<i64> {
        let mut cursor = EventCursor::default();
        let start = tokio::time::Instant::now();

        while start.elapsed() < max_wait {
            let updates = self
                .get_updates(cursor.next_offset(), Duration::from_secs(20))
                .await?;
            for update in cursor.admit_batch(updates, |update| update.update_id) {
                if let Some(event) = update.into_event()
                    && matches!(&event.kind, EventKind::Text(text) if text.trim() == "/start")
                {
                    return Ok(event.chat_id);
                }
            }
        }

        Err(AppError::TelegramPairingTimeout)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T> {
        let url = format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.token.expose_secret()
        );
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| AppError::Http(err.without_url()))?;
        let status = response.status().as_u16();
        let body: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|err| AppError::Http(err.without_url()))?;
        body.into_result(method, status)
    }

    /// Outbound calls share the rate limiter and a short retry budget.
    async fn call_outbound<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        let mut budget = RetryBudget::for_outbound();
        loop {
            self.limiter.until_ready().await;
            let err = match self.call(method, payload, OUTBOUND_TIMEOUT).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match budget.on_failure(&err) {
                RetryStep::Wait { attempt, delay } => {
                    warn!(method, attempt, error = %err, "retrying telegram call");
                    sleep(delay).await;
                }
                RetryStep::GiveUp => return Err(budget.escalate(err)),
            }
        }
    }
}

/// The chat transport over Telegram. Owns the single long-poll cursor.
///
/// The first poll of a process skips whatever backlog Telegram still holds,
/// so a restarted bridge starts from now instead of replaying old prompts
/// or a previous `/stop`.
pub struct TelegramTransport {
    client: TelegramClient,
    cursor: EventCursor,
    retry: RetryBudget,
    phase: PollPhase,
    backlog_skipped: bool,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient, retry: RetryBudget) -> Self {
        Self {
            client,
            cursor: EventCursor::default(),
            retry,
            phase: PollPhase::Polling,
            backlog_skipped: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = TelegramClient::new(
            &config.telegram_api_base,
            config.token()?,
            config.outbound_per_second,
        );
        Ok(Self::new(
            client,
            RetryBudget::for_polling(config.max_poll_retries),
        ))
    }

    #[cfg(test)]
    pub fn phase(&self) -> PollPhase {
        self.phase
    }
}

impl ChatTransport for TelegramTransport {
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<ChatEvent>> {
        if self.phase == PollPhase::Fatal {
            return Err(AppError::TelegramApi(
                "poller already stopped after a fatal error".to_string(),
            ));
        }

        loop {
            let (offset, wait) = if self.backlog_skipped {
                (self.cursor.next_offset(), timeout)
            } else {
                (NEWEST_UPDATE_OFFSET, Duration::ZERO)
            };
            let err = match self.client.get_updates(offset, wait).await {
                Ok(updates) if !self.backlog_skipped => {
                    self.retry.on_success();
                    self.phase = PollPhase::Polling;
                    self.backlog_skipped = true;
                    if let Some(newest) = updates.iter().map(|update| update.update_id).max() {
                        self.cursor.admit(newest);
                        debug!(update_id = newest, "skipped telegram backlog");
                    }
                    continue;
                }
                Ok(updates) => {
                    self.retry.on_success();
                    self.phase = PollPhase::Polling;
                    let fresh = self
                        .cursor
                        .admit_batch(updates, |update| update.update_id);
                    return Ok(fresh
                        .into_iter()
                        .filter_map(TelegramUpdate::into_event)
                        .collect());
                }
                Err(err) => err,
            };

            match self.retry.on_failure(&err) {
                RetryStep::Wait { attempt, delay } => {
                    self.phase = PollPhase::Backoff { attempt };
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "telegram long poll failed, backing off"
                    );
                    sleep(delay).await;
                }
                RetryStep::GiveUp => {
                    self.phase = PollPhase::Fatal;
                    return Err(self.retry.escalate(err));
                }
            }
        }
    }

    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<i64> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": message.text,
        });
        if message.format == TextFormat::Html {
            payload["parse_mode"] = json!("HTML");
        }
        if !message.buttons.is_empty() {
            let row: Vec<Value> = message
                .buttons
                .iter()
                .map(|button| json!({ "text": button.label, "callback_data": button.data }))
                .collect();
            payload["reply_markup"] = json!({ "inline_keyboard": [row] });
        }

        let sent: SentMessage = self.client.call_outbound("sendMessage", &payload).await?;
        debug!(chat_id, message_id = sent.message_id, "sent telegram message");
        Ok(sent.message_id)
    }

    /// `text` is Telegram HTML.
    async fn edit(&self, chat_id: i64, message_id: i64, text: &str) -> Result<MessageOutcome> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        match self
            .client
            .call_outbound::<Value>("editMessageText", &payload)
            .await
        {
            Ok(_) => Ok(MessageOutcome::Done),
            Err(AppError::MessageNotFound) => Ok(MessageOutcome::NotFound),
            Err(AppError::TelegramApi(description))
                if description.contains("message is not modified") =>
            {
                Ok(MessageOutcome::Done)
            }
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<MessageOutcome> {
        let payload = json!({ "chat_id": chat_id, "message_id": message_id });
        match self
            .client
            .call_outbound::<bool>("deleteMessage", &payload)
            .await
        {
            Ok(_) => Ok(MessageOutcome::Done),
            Err(AppError::MessageNotFound) => Ok(MessageOutcome::NotFound),
            Err(err) => Err(err),
        }
    }

    async fn answer_button(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        self.client
            .call_outbound::<bool>("answerCallbackQuery", &payload)
            .await?;
        Ok(())
    }
}
