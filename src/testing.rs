//! In-memory collaborators for exercising the bridge and the hooks.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    time::Duration,
};

use crate::{
    errors::{AppError, Result},
    injector::InputInjector,
    models::event::ChatEvent,
    transport::{ChatTransport, MessageOutcome, OutgoingMessage},
};

#[derive(Default)]
pub struct FakeTransport {
    pub batches: VecDeque<Result<Vec<ChatEvent>>>,
    pub sent: Mutex<Vec<(i64, OutgoingMessage)>>,
    pub edits: Mutex<Vec<(i64, String)>>,
    pub deleted: Mutex<Vec<i64>>,
    pub answers: Mutex<Vec<(String, Option<String>)>>,
    pub fail_sends: AtomicBool,
    pub missing_on_delete: AtomicBool,
    next_id: AtomicI64,
}

impl FakeTransport {
    pub fn with_batches(batches: Vec<Result<Vec<ChatEvent>>>) -> Self {
        Self {
            batches: batches.into(),
            ..Self::default()
        }
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.text.clone())
            .collect()
    }

    pub fn deleted_ids(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn answer_texts(&self) -> Vec<Option<String>> {
        self.answers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl ChatTransport for FakeTransport {
    async fn poll(&mut self, _timeout: Duration) -> Result<Vec<ChatEvent>> {
        self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<i64> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(AppError::TelegramUnavailable("fake outage".into()));
        }
        self.sent.lock().unwrap().push((chat_id, message));
        Ok(100 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit(&self, _chat_id: i64, message_id: i64, text: &str) -> Result<MessageOutcome> {
        self.edits.lock().unwrap().push((message_id, text.to_string()));
        Ok(MessageOutcome::Done)
    }

    async fn delete(&self, _chat_id: i64, message_id: i64) -> Result<MessageOutcome> {
        self.deleted.lock().unwrap().push(message_id);
        if self.missing_on_delete.load(Ordering::SeqCst) {
            return Ok(MessageOutcome::NotFound);
        }
        Ok(MessageOutcome::Done)
    }

    async fn answer_button(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeInjector {
    pub typed: Mutex<Vec<String>>,
    pub keys: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl FakeInjector {
    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().unwrap().clone()
    }
}

impl InputInjector for FakeInjector {
    async fn type_text(&self, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::InjectionFailed("no focused pane".into()));
        }
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn press_keys(&self, keys: &[String]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::InjectionFailed("no focused pane".into()));
        }
        self.keys.lock().unwrap().extend(keys.iter().cloned());
        Ok(())
    }
}
