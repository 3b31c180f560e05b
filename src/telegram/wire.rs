use serde::Deserialize;

use crate::{
    errors::{AppError, Result},
    models::event::ChatEvent,
};

#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

impl<T> TelegramResponse<T> {
    /// Maps a Bot API envelope onto the crate's error taxonomy. `status` is
    /// the HTTP status, used when the body carries no `error_code`.
    pub fn into_result(self, method: &str, status: u16) -> Result<T> {
        if self.ok {
            return self
                .result
                .ok_or_else(|| AppError::TelegramApi(format!("{method}: empty result")));
        }

        let description = self
            .description
            .unwrap_or_else(|| format!("unknown {method} failure"));
        match self.error_code.unwrap_or(status) {
            409 => Err(AppError::PollConflict(description)),
            401 | 404 => Err(AppError::TelegramAuthFailed),
            429 => {
                let seconds = self
                    .parameters
                    .and_then(|params| params.retry_after)
                    .unwrap_or(1);
                Err(AppError::TelegramThrottled {
                    retry_after: std::time::Duration::from_secs(seconds),
                })
            }
            code if code >= 500 => Err(AppError::TelegramUnavailable(description)),
            _ if is_missing_message(&description) => Err(AppError::MessageNotFound),
            _ => Err(AppError::TelegramApi(format!("{method}: {description}"))),
        }
    }
}

fn is_missing_message(description: &str) -> bool {
    let lowered = description.to_ascii_lowercase();
    [
        "message to edit not found",
        "message to delete not found",
        "message can't be deleted",
        "message_id_invalid",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

impl TelegramUpdate {
    /// Updates the bridge has no use for (stickers, edits, joins) map to `None`.
    pub fn into_event(self) -> Option<ChatEvent> {
        if let Some(query) = self.callback_query {
            let chat_id = query
                .message
                .as_ref()
                .map_or(query.from.id, |message| message.chat.id);
            return Some(ChatEvent::button(
                self.update_id,
                chat_id,
                query.id,
                query.data.unwrap_or_default(),
            ));
        }

        let message = self.message?;
        let text = message.text?;
        Some(ChatEvent::text(self.update_id, message.chat.id, text))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{TelegramResponse, TelegramUpdate};
    use crate::{errors::AppError, models::event::EventKind};

    fn failure(body: Value) -> AppError {
        let response: TelegramResponse<Value> = serde_json::from_value(body).unwrap();
        response.into_result("getUpdates", 400).unwrap_err()
    }

    #[test]
    fn error_codes_map_to_taxonomy() {
        assert!(matches!(
            failure(json!({"ok": false, "error_code": 409, "description": "Conflict: terminated by other getUpdates request"})),
            AppError::PollConflict(_)
        ));
        assert!(matches!(
            failure(json!({"ok": false, "error_code": 401, "description": "Unauthorized"})),
            AppError::TelegramAuthFailed
        ));
        assert!(matches!(
            failure(json!({"ok": false, "error_code": 429, "description": "Too Many Requests", "parameters": {"retry_after": 7}})),
            AppError::TelegramThrottled { retry_after } if retry_after.as_secs() == 7
        ));
        assert!(matches!(
            failure(json!({"ok": false, "error_code": 502, "description": "Bad Gateway"})),
            AppError::TelegramUnavailable(_)
        ));
        assert!(matches!(
            failure(json!({"ok": false, "error_code": 400, "description": "Bad Request: message to delete not found"})),
            AppError::MessageNotFound
        ));
        assert!(matches!(
            failure(json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"})),
            AppError::TelegramApi(_)
        ));
    }

    #[test]
    fn callback_updates_keep_payload_verbatim() {
        let update: TelegramUpdate = serde_json::from_value(json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 42},
                "message": {"message_id": 5, "chat": {"id": 42}},
                "data": "req-123:allow"
            }
        }))
        .unwrap();

        let event = update.into_event().unwrap();
        assert_eq!(event.id, 11);
        assert_eq!(event.chat_id, 42);
        assert_eq!(
            event.kind,
            EventKind::Button {
                callback_id: "cb-1".into(),
                data: "req-123:allow".into()
            }
        );
    }

    #[test]
    fn non_text_messages_are_skipped() {
        let update: TelegramUpdate = serde_json::from_value(json!({
            "update_id": 3,
            "message": {"message_id": 9, "chat": {"id": 42}}
        }))
        .unwrap();
        assert!(update.into_event().is_none());
    }
}
