//! The long-running bridge: the one process that long-polls the bot token.

mod command;

use std::time::Duration;

use tracing::{debug, error, info, warn};

use command::{HELP_TEXT, Inbound, STARTED_TEXT};

use crate::{
    config::Config,
    errors::Result,
    injector::{InputInjector, TmuxInjector, ensure_tmux},
    models::{
        approval::{ApprovalDecision, CallbackPayload, Decision},
        event::{ChatEvent, EventCursor, EventKind},
    },
    state::{StateStore, now_epoch},
    telegram::TelegramTransport,
    transport::{ChatTransport, OutgoingMessage},
};

pub const THINKING_TEXT: &str = "💭 Thinking...";
const STOPPED_TEXT: &str = "🛑 Bridge stopped";
const INTERRUPTED_TEXT: &str = "🛑 Bridge stopped (Ctrl+C)";

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub chat_id: i64,
    pub long_poll: Duration,
    pub orphan_grace: Duration,
    pub plan_mode_keys: Vec<String>,
    pub plan_mode_prefix: String,
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            chat_id: config.chat_id()?,
            long_poll: config.long_poll(),
            orphan_grace: config.orphan_grace(),
            plan_mode_keys: config.plan_mode_keys.clone(),
            plan_mode_prefix: config.plan_mode_prefix.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub async fn run(config: Config) -> Result<()> {
    let settings = BridgeSettings::from_config(&config)?;
    ensure_tmux().await?;

    let store = StateStore::new(config.state_dir());
    let lock = store.lock_bridge()?;
    store.mark_bridge_running()?;

    let transport = TelegramTransport::from_config(&config)?;
    let injector = TmuxInjector::from_config(&config);
    info!(lock = %lock.path().display(), "bridge polling");

    Bridge::new(transport, injector, store, settings).run().await
}

pub struct Bridge<T, I> {
    transport: T,
    injector: I,
    store: StateStore,
    settings: BridgeSettings,
    seen: EventCursor,
}

impl<T: ChatTransport, I: InputInjector> Bridge<T, I> {
    pub fn new(transport: T, injector: I, store: StateStore, settings: BridgeSettings) -> Self {
        Self {
            transport,
            injector,
            store,
            settings,
            seen: EventCursor::default(),
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub fn injector(&self) -> &I {
        &self.injector
    }

    /// Runs until `/stop`, Ctrl-C, or a fatal transport error.
    pub async fn run(&mut self) -> Result<()> {
        self.say(STARTED_TEXT).await;
        let mut shutdown = Box::pin(tokio::signal::ctrl_c());

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => None,
                polled = self.transport.poll(self.settings.long_poll) => Some(polled),
            };
            let Some(polled) = polled else {
                info!("bridge received shutdown signal");
                self.shutdown(INTERRUPTED_TEXT).await;
                return Ok(());
            };

            let events = match polled {
                Ok(events) => events,
                Err(err) => {
                    error!(error = %err, "bridge transport failed");
                    self.shutdown(&format!("⚠️ Bridge stopping: {err}")).await;
                    return Err(err);
                }
            };

            for event in events {
                if self.handle(event).await == Flow::Stop {
                    return Ok(());
                }
            }

            match self.store.sweep_orphaned_decisions(self.settings.orphan_grace) {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept orphaned decisions"),
                Err(err) => warn!(error = %err, "failed to sweep orphaned decisions"),
            }
        }
    }

    pub async fn handle(&mut self, event: ChatEvent) -> Flow {
        if !self.seen.admit(event.id) {
            debug!(update_id = event.id, "skipping replayed event");
            return Flow::Continue;
        }

        let authorized = event.chat_id == self.settings.chat_id;
        match event.kind {
            EventKind::Button { callback_id, data } if authorized => {
                self.handle_button(&callback_id, &data).await;
                Flow::Continue
            }
            EventKind::Button { callback_id, .. } => {
                warn!(chat_id = event.chat_id, "button press from unauthorized chat");
                self.acknowledge(&callback_id, "Unauthorized.").await;
                Flow::Continue
            }
            EventKind::Text(text) if authorized => match self.handle_text(&text).await {
                Ok(flow) => flow,
                Err(err) => {
                    warn!(update_id = event.id, error = %err, "failed to handle message");
                    Flow::Continue
                }
            },
            EventKind::Text(_) => {
                debug!(chat_id = event.chat_id, "ignoring message from unauthorized chat");
                Flow::Continue
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> Result<Flow> {
        match Inbound::parse(text) {
            Inbound::Plan => self.toggle_plan_mode().await?,
            Inbound::Stop => {
                info!("stop requested from chat");
                self.shutdown(STOPPED_TEXT).await;
                return Ok(Flow::Stop);
            }
            Inbound::Help => {
                if let Err(err) = self
                    .transport
                    .send(self.settings.chat_id, OutgoingMessage::html(HELP_TEXT))
                    .await
                {
                    warn!(error = %err, "failed to send help");
                }
            }
            Inbound::UnknownCommand(name) => debug!(command = %name, "ignoring unknown command"),
            Inbound::Prompt(prompt) => self.relay_prompt(&prompt).await?,
        }
        Ok(Flow::Continue)
    }

    async fn relay_prompt(&mut self, prompt: &str) -> Result<()> {
        let framed = self.frame(prompt)?;
        self.raise_indicator().await;

        if let Err(err) = self.injector.type_text(&framed).await {
            // Focus may have moved; retyping could land in the wrong window.
            warn!(error = %err, "dropping prompt, injection failed");
            self.clear_indicator().await;
            self.say(&format!("⚠️ Could not deliver prompt: {err}")).await;
            return Ok(());
        }
        info!(chars = framed.chars().count(), "prompt injected");
        Ok(())
    }

    fn frame(&self, prompt: &str) -> Result<String> {
        if self.store.plan_mode()? && !self.settings.plan_mode_prefix.is_empty() {
            return Ok(format!("{}{prompt}", self.settings.plan_mode_prefix));
        }
        Ok(prompt.to_string())
    }

    async fn toggle_plan_mode(&mut self) -> Result<()> {
        let enabled = !self.store.plan_mode()?;
        if let Err(err) = self.injector.press_keys(&self.settings.plan_mode_keys).await {
            warn!(error = %err, "failed to toggle plan mode");
            self.say(&format!("⚠️ Could not toggle plan mode: {err}"))
                .await;
            return Ok(());
        }
        self.store.set_plan_mode(enabled)?;
        let status = if enabled {
            "📋 Plan mode: ON"
        } else {
            "⚡ Plan mode: OFF"
        };
        info!(enabled, "plan mode toggled");
        self.say(status).await;
        Ok(())
    }

    async fn handle_button(&mut self, callback_id: &str, data: &str) {
        let reply = match CallbackPayload::parse(data) {
            Err(_) => {
                warn!(data, "ignoring malformed button payload");
                "Unknown request"
            }
            Ok(payload) => self.record_decision(payload),
        };
        self.acknowledge(callback_id, reply).await;
    }

    fn record_decision(&self, payload: CallbackPayload) -> &'static str {
        match self.store.has_pending(&payload.request_id) {
            Ok(true) => {}
            Ok(false) => {
                info!(request_id = %payload.request_id, "button for unknown or expired request");
                return "Request expired";
            }
            Err(err) => {
                error!(request_id = %payload.request_id, error = %err, "failed to read request");
                return "⚠️ Could not record decision";
            }
        }

        let decision = ApprovalDecision {
            request_id: payload.request_id,
            decision: payload.decision,
            decided_at: now_epoch(),
        };
        if let Err(err) = self.store.write_decision(&decision) {
            error!(request_id = %decision.request_id, error = %err, "failed to write decision");
            return "⚠️ Could not record decision";
        }
        info!(request_id = %decision.request_id, decision = %decision.decision, "decision recorded");
        match decision.decision {
            Decision::Allow => "✅ Allowed",
            Decision::Deny => "❌ Denied",
        }
    }

    async fn acknowledge(&self, callback_id: &str, text: &str) {
        if let Err(err) = self.transport.answer_button(callback_id, Some(text)).await {
            warn!(error = %err, "failed to answer button press");
        }
    }

    /// Replaces any outstanding indicator with a fresh one.
    async fn raise_indicator(&self) {
        self.clear_indicator().await;
        let message_id = match self
            .transport
            .send(self.settings.chat_id, OutgoingMessage::plain(THINKING_TEXT))
            .await
        {
            Ok(message_id) => message_id,
            Err(err) => {
                warn!(error = %err, "failed to send thinking indicator");
                return;
            }
        };
        if let Err(err) = self.store.set_indicator(Some(message_id)) {
            warn!(error = %err, "failed to record thinking indicator");
        }
    }

    async fn clear_indicator(&self) {
        let outstanding = match self.store.take_indicator() {
            Ok(outstanding) => outstanding,
            Err(err) => {
                warn!(error = %err, "failed to read thinking indicator");
                return;
            }
        };
        if let Some(message_id) = outstanding
            && let Err(err) = self.transport.delete(self.settings.chat_id, message_id).await
        {
            debug!(message_id, error = %err, "could not delete thinking indicator");
        }
    }

    async fn shutdown(&self, farewell: &str) {
        self.clear_indicator().await;
        if let Err(err) = self.store.clear_bridge_running() {
            warn!(error = %err, "failed to clear running marker");
        }
        self.say(farewell).await;
    }

    async fn say(&self, text: &str) {
        if let Err(err) = self
            .transport
            .send(self.settings.chat_id, OutgoingMessage::plain(text))
            .await
        {
            warn!(error = %err, "failed to send chat message");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use super::{Bridge, BridgeSettings, Flow, THINKING_TEXT};
    use crate::{
        errors::AppError,
        models::{
            approval::{ApprovalRequest, Decision},
            event::ChatEvent,
        },
        state::StateStore,
        testing::{FakeInjector, FakeTransport},
    };

    const CHAT: i64 = 42;

    fn settings() -> BridgeSettings {
        BridgeSettings {
            chat_id: CHAT,
            long_poll: Duration::from_millis(1),
            orphan_grace: Duration::from_secs(120),
            plan_mode_keys: vec!["BTab".into(), "BTab".into()],
            plan_mode_prefix: "(plan mode) ".into(),
        }
    }

    fn bridge(
        transport: FakeTransport,
    ) -> (tempfile::TempDir, Bridge<FakeTransport, FakeInjector>) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let bridge = Bridge::new(transport, FakeInjector::default(), store, settings());
        (dir, bridge)
    }

    #[tokio::test]
    async fn prompt_raises_indicator_and_injects() {
        let (_dir, mut bridge) = bridge(FakeTransport::default());

        let flow = bridge.handle(ChatEvent::text(1, CHAT, "fix the bug")).await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(bridge.transport.sent_texts(), vec![THINKING_TEXT]);
        assert_eq!(bridge.injector.typed(), vec!["fix the bug"]);
        assert_eq!(bridge.store.indicator().unwrap(), Some(100));
    }

    #[tokio::test]
    async fn new_indicator_replaces_outstanding_one() {
        let (_dir, mut bridge) = bridge(FakeTransport::default());
        bridge.transport.missing_on_delete.store(true, Ordering::SeqCst);

        bridge.handle(ChatEvent::text(1, CHAT, "first")).await;
        bridge.handle(ChatEvent::text(2, CHAT, "second")).await;

        assert_eq!(bridge.transport.deleted_ids(), vec![100]);
        assert_eq!(bridge.store.indicator().unwrap(), Some(101));
    }

    #[tokio::test]
    async fn replayed_events_are_processed_once() {
        let (_dir, mut bridge) = bridge(FakeTransport::default());

        bridge.handle(ChatEvent::text(5, CHAT, "once")).await;
        bridge.handle(ChatEvent::text(5, CHAT, "once")).await;
        bridge.handle(ChatEvent::text(4, CHAT, "older")).await;

        assert_eq!(bridge.injector.typed(), vec!["once"]);
    }

    #[tokio::test]
    async fn plan_mode_toggles_and_frames_prompts() {
        let (_dir, mut bridge) = bridge(FakeTransport::default());

        bridge.handle(ChatEvent::text(1, CHAT, "/plan")).await;
        assert!(bridge.store.plan_mode().unwrap());
        assert_eq!(*bridge.injector.keys.lock().unwrap(), vec!["BTab", "BTab"]);
        assert!(bridge.injector.typed().is_empty());

        bridge.handle(ChatEvent::text(2, CHAT, "design the cache")).await;
        assert_eq!(bridge.injector.typed(), vec!["(plan mode) design the cache"]);

        bridge.handle(ChatEvent::text(3, CHAT, "/plan")).await;
        assert!(!bridge.store.plan_mode().unwrap());
        assert_eq!(
            bridge.transport.sent_texts(),
            vec!["📋 Plan mode: ON", THINKING_TEXT, "⚡ Plan mode: OFF"]
        );
    }

    #[tokio::test]
    async fn button_press_records_exactly_one_decision() {
        let (_dir, mut bridge) = bridge(FakeTransport::default());
        let mut request = ApprovalRequest::new("Bash", "ls", 0);
        request.request_id = "req-123".into();
        bridge.store.create_request(&request).unwrap();

        bridge
            .handle(ChatEvent::button(1, CHAT, "cb-1", "req-123:allow"))
            .await;

        let decision = bridge.store.take_decision("req-123").unwrap().unwrap();
        assert_eq!(decision.request_id, "req-123");
        assert_eq!(decision.decision, Decision::Allow);
        assert_eq!(bridge.store.take_decision("req-123").unwrap(), None);
        assert_eq!(
            bridge.transport.answer_texts(),
            vec![Some("✅ Allowed".to_string())]
        );
        assert!(bridge.store.read_request("req-123").unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_callbacks_are_acknowledged_and_ignored() {
        let (dir, mut bridge) = bridge(FakeTransport::default());

        bridge
            .handle(ChatEvent::button(1, CHAT, "cb-1", "gone-1:allow"))
            .await;
        bridge
            .handle(ChatEvent::button(2, CHAT, "cb-2", "garbage"))
            .await;

        assert_eq!(
            bridge.transport.answer_texts(),
            vec![
                Some("Request expired".to_string()),
                Some("Unknown request".to_string())
            ]
        );
        assert!(!dir.path().join("responses").exists());
    }

    #[tokio::test]
    async fn unauthorized_chats_are_ignored() {
        let (_dir, mut bridge) = bridge(FakeTransport::default());

        bridge.handle(ChatEvent::text(1, 7, "rm -rf /")).await;
        bridge.handle(ChatEvent::button(2, 7, "cb-1", "req-1:allow")).await;

        assert!(bridge.injector.typed().is_empty());
        assert!(bridge.transport.sent_texts().is_empty());
        assert_eq!(
            bridge.transport.answer_texts(),
            vec![Some("Unauthorized.".to_string())]
        );
    }

    #[tokio::test]
    async fn injection_failure_drops_prompt_without_retry() {
        let (_dir, mut bridge) = bridge(FakeTransport::default());
        bridge.injector.fail.store(true, Ordering::SeqCst);

        let flow = bridge.handle(ChatEvent::text(1, CHAT, "hello")).await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(bridge.store.indicator().unwrap(), None);
        assert_eq!(bridge.transport.deleted_ids(), vec![100]);
        let sent = bridge.transport.sent_texts();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].starts_with("⚠️ Could not deliver prompt"));
    }

    #[tokio::test]
    async fn stop_command_flushes_state_and_exits() {
        let transport = FakeTransport::with_batches(vec![
            Ok(vec![ChatEvent::text(1, CHAT, "work")]),
            Ok(vec![ChatEvent::text(2, CHAT, "/stop"), ChatEvent::text(3, CHAT, "late")]),
        ]);
        let (_dir, mut bridge) = bridge(transport);
        bridge.store.mark_bridge_running().unwrap();

        bridge.run().await.unwrap();

        assert!(!bridge.store.bridge_running());
        assert_eq!(bridge.store.indicator().unwrap(), None);
        assert_eq!(bridge.injector.typed(), vec!["work"]);
        assert_eq!(
            bridge.transport.sent_texts().last().map(String::as_str),
            Some("🛑 Bridge stopped")
        );
    }

    #[tokio::test]
    async fn fatal_transport_error_ends_loop_loudly() {
        let transport = FakeTransport::with_batches(vec![Err(AppError::PollConflict(
            "terminated by other getUpdates request".into(),
        ))]);
        let (_dir, mut bridge) = bridge(transport);
        bridge.store.mark_bridge_running().unwrap();
        bridge.store.set_indicator(Some(31)).unwrap();

        let err = bridge.run().await.unwrap_err();
        assert!(matches!(err, AppError::PollConflict(_)));
        let sent = bridge.transport.sent_texts();
        assert!(sent.last().unwrap().starts_with("⚠️ Bridge stopping"));
        assert!(!bridge.store.bridge_running());
        assert_eq!(bridge.store.indicator().unwrap(), None);
        assert_eq!(bridge.transport.deleted_ids(), vec![31]);
    }

    #[tokio::test]
    async fn orphaned_decisions_are_swept_each_cycle() {
        let transport = FakeTransport::with_batches(vec![
            Ok(Vec::new()),
            Ok(vec![ChatEvent::text(1, CHAT, "/stop")]),
        ]);
        let (dir, mut bridge) = bridge(transport);
        bridge.settings.orphan_grace = Duration::ZERO;
        bridge
            .store
            .write_decision(&crate::models::approval::ApprovalDecision {
                request_id: "gone-2".into(),
                decision: Decision::Allow,
                decided_at: 0,
            })
            .unwrap();

        bridge.run().await.unwrap();
        assert!(!dir.path().join("responses").join("gone-2.response").exists());
    }
}
