/// One inbound unit from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub id: i64,
    pub chat_id: i64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Text(String),
    Button { callback_id: String, data: String },
}

impl ChatEvent {
    pub fn text(id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            chat_id,
            kind: EventKind::Text(text.into()),
        }
    }

    pub fn button(
        id: i64,
        chat_id: i64,
        callback_id: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id,
            chat_id,
            kind: EventKind::Button {
                callback_id: callback_id.into(),
                data: data.into(),
            },
        }
    }
}

/// In-memory high-water mark over event ids. Only ids strictly above the
/// last admitted one pass, so a batch is consumed in order and at most once
/// per process lifetime.
#[derive(Debug, Default, Clone)]
pub struct EventCursor {
    last: Option<i64>,
}

impl EventCursor {
    #[cfg(test)]
    pub fn last(&self) -> Option<i64> {
        self.last
    }

    /// Offset to hand to the next long poll. Zero until an id is admitted,
    /// which asks for everything still unconfirmed.
    pub fn next_offset(&self) -> i64 {
        self.last.map_or(0, |id| id + 1)
    }

    pub fn admit(&mut self, id: i64) -> bool {
        if self.last.is_some_and(|last| id <= last) {
            return false;
        }
        self.last = Some(id);
        true
    }

    /// Sorts a batch by id and drops everything already seen.
    pub fn admit_batch<T>(&mut self, mut batch: Vec<T>, id_of: impl Fn(&T) -> i64) -> Vec<T> {
        batch.sort_by_key(|item| id_of(item));
        batch.retain(|item| self.admit(id_of(item)));
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::EventCursor;

    #[test]
    fn seeded_cursor_resumes_after_the_seed() {
        let mut cursor = EventCursor::default();
        assert_eq!(cursor.last(), None);
        assert!(cursor.admit(77));
        assert_eq!(cursor.next_offset(), 78);
        assert!(cursor.admit_batch(vec![77], |id| *id).is_empty());
    }

    #[test]
    fn replayed_ids_are_rejected() {
        let mut cursor = EventCursor::default();
        assert!(cursor.admit(10));
        assert!(!cursor.admit(10));
        assert!(!cursor.admit(9));
        assert!(cursor.admit(11));
        assert_eq!(cursor.next_offset(), 12);
    }

    #[test]
    fn batches_come_out_sorted_and_deduplicated() {
        let mut cursor = EventCursor::default();
        let first = cursor.admit_batch(vec![3, 1, 2], |id| *id);
        assert_eq!(first, vec![1, 2, 3]);

        let second = cursor.admit_batch(vec![5, 2, 3, 4, 5], |id| *id);
        assert_eq!(second, vec![4, 5]);
        assert_eq!(cursor.last(), Some(5));
    }
}
