use std::time::Duration;

use crate::{errors::Result, models::event::ChatEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    Html,
}

/// One inline keyboard button carrying opaque callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub format: TextFormat,
    /// Rendered as a single keyboard row.
    pub buttons: Vec<Button>,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Html,
            buttons: Vec::new(),
        }
    }

    pub fn with_button(mut self, label: impl Into<String>, data: impl Into<String>) -> Self {
        self.buttons.push(Button {
            label: label.into(),
            data: data.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Done,
    NotFound,
}

/// Chat service as seen by the bridge and the hooks.
///
/// `poll` retries transient failures internally and only returns an error
/// once the condition is fatal for the caller.
pub trait ChatTransport {
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<ChatEvent>>;

    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<i64>;

    async fn edit(&self, chat_id: i64, message_id: i64, text: &str) -> Result<MessageOutcome>;

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<MessageOutcome>;

    async fn answer_button(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
