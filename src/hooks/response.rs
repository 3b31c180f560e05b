use std::path::Path;

use tracing::{debug, info, warn};

use super::{read_stdin, transcript::latest_assistant_text};
use crate::{
    config::Config,
    errors::Result,
    models::hook::StopInput,
    state::StateStore,
    telegram::{
        TelegramTransport,
        format::{MarkdownRenderer, split_message},
    },
    transport::{ChatTransport, MessageOutcome, OutgoingMessage},
};

const RESPONSE_HEADER: &str = "🤖 Claude:\n\n";

/// Forwards a finished turn to the chat and retires the thinking indicator.
pub struct Relay<T> {
    transport: T,
    store: StateStore,
    chat_id: i64,
    max_len: usize,
    renderer: MarkdownRenderer,
}

impl<T: ChatTransport> Relay<T> {
    pub fn new(transport: T, store: StateStore, chat_id: i64, max_len: usize) -> Result<Self> {
        Ok(Self {
            transport,
            store,
            chat_id,
            max_len,
            renderer: MarkdownRenderer::new()?,
        })
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the number of chat messages sent.
    pub async fn relay(&self, text: Option<&str>) -> Result<usize> {
        self.retire_indicator().await;

        let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
            debug!("turn finished without assistant text");
            return Ok(0);
        };

        let chunks = split_message(&format!("{RESPONSE_HEADER}{text}"), self.max_len);
        for chunk in &chunks {
            let html = self.renderer.render(chunk);
            self.transport
                .send(self.chat_id, OutgoingMessage::html(html))
                .await?;
        }
        info!(messages = chunks.len(), "relayed response");
        Ok(chunks.len())
    }

    async fn retire_indicator(&self) {
        let message_id = match self.store.take_indicator() {
            Ok(Some(message_id)) => message_id,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "failed to read thinking indicator");
                return;
            }
        };
        match self.transport.delete(self.chat_id, message_id).await {
            Ok(MessageOutcome::Done) => debug!(message_id, "deleted thinking indicator"),
            Ok(MessageOutcome::NotFound) => debug!(message_id, "thinking indicator already gone"),
            Err(err) => warn!(message_id, error = %err, "failed to delete thinking indicator"),
        }
    }
}

impl Relay<TelegramTransport> {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            TelegramTransport::from_config(config)?,
            StateStore::new(config.state_dir()),
            config.chat_id()?,
            config.max_message_length,
        )
    }
}

fn response_text(input: &StopInput) -> Option<String> {
    if let Some(text) = input
        .last_assistant_message
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        return Some(text.to_string());
    }
    let path = input.transcript_path.as_deref()?;
    match latest_assistant_text(Path::new(path)) {
        Ok(text) => text,
        Err(err) => {
            debug!(path, error = %err, "could not read transcript");
            None
        }
    }
}

pub async fn execute(config: &Config) -> Result<()> {
    let store = StateStore::new(config.state_dir());
    if !store.bridge_running() {
        debug!("bridge not running, nothing to relay");
        return Ok(());
    }

    let input = match read_stdin().and_then(|raw| Ok(serde_json::from_str::<StopInput>(&raw)?)) {
        Ok(input) => input,
        Err(err) => {
            debug!(error = %err, "ignoring unreadable stop payload");
            return Ok(());
        }
    };

    let text = response_text(&input);
    Relay::from_config(config)?.relay(text.as_deref()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{io::Write, sync::atomic::Ordering};

    use super::{Relay, response_text};
    use crate::{models::hook::StopInput, state::StateStore, testing::FakeTransport};

    const CHAT: i64 = 42;

    fn relay(store: &StateStore, max_len: usize) -> Relay<FakeTransport> {
        Relay::new(FakeTransport::default(), store.clone(), CHAT, max_len).unwrap()
    }

    #[tokio::test]
    async fn indicator_is_deleted_before_the_response() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.set_indicator(Some(77)).unwrap();
        let relay = relay(&store, 3500);

        let sent = relay.relay(Some("Fixed **two** bugs.")).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(relay.transport.deleted_ids(), vec![77]);
        assert_eq!(store.indicator().unwrap(), None);
        assert_eq!(
            relay.transport.sent_texts(),
            vec!["🤖 Claude:\n\nFixed <b>two</b> bugs."]
        );
    }

    #[tokio::test]
    async fn missing_indicator_message_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.set_indicator(Some(5)).unwrap();
        let relay = relay(&store, 3500);
        relay.transport.missing_on_delete.store(true, Ordering::SeqCst);

        assert_eq!(relay.relay(Some("ok")).await.unwrap(), 1);
        assert_eq!(store.indicator().unwrap(), None);
    }

    #[tokio::test]
    async fn long_responses_split_on_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let relay = relay(&store, 60);
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));

        assert_eq!(relay.relay(Some(&text)).await.unwrap(), 2);
        let sent = relay.transport.sent_texts();
        assert_eq!(sent[0], format!("🤖 Claude:\n\n{}", "a".repeat(40)));
        assert_eq!(sent[1], "b".repeat(40));
    }

    #[tokio::test]
    async fn empty_turn_only_clears_indicator() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.set_indicator(Some(9)).unwrap();
        let relay = relay(&store, 3500);

        assert_eq!(relay.relay(Some("  ")).await.unwrap(), 0);
        assert!(relay.transport.sent_texts().is_empty());
        assert_eq!(relay.transport.deleted_ids(), vec![9]);
    }

    #[test]
    fn transcript_is_the_fallback_source() {
        let mut transcript = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            transcript,
            r#"{{"type":"assistant","message":{{"content":[{{"type":"text","text":"from transcript"}}]}}}}"#
        )
        .unwrap();
        let path = transcript.path().display().to_string();

        let direct = StopInput {
            transcript_path: Some(path.clone()),
            last_assistant_message: Some("direct".into()),
        };
        assert_eq!(response_text(&direct).as_deref(), Some("direct"));

        let fallback = StopInput {
            transcript_path: Some(path),
            last_assistant_message: None,
        };
        assert_eq!(response_text(&fallback).as_deref(), Some("from transcript"));

        assert_eq!(response_text(&StopInput::default()), None);
    }
}
