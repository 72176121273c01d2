//! The authoritative in-memory message list of one open conversation,
//! and the optimistic send protocol.
//!
//! Every transition is a plain method returning what the caller must do
//! next, so the whole protocol is testable without a store or a UI.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use fichaje_shared::{ConversationId, Message, MessageId, MessageKind, UserId};

/// What a message-insert event did to the timeline.
#[derive(Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The server id is already present (own send already reconciled, or
    /// a replayed event).
    Duplicate,
    Appended {
        /// The message came from the peer and must be marked read.
        should_mark_read: bool,
    },
}

pub struct Timeline {
    conversation: ConversationId,
    me: UserId,
    entries: Vec<Message>,
    draft: String,
    in_flight: Option<MessageId>,
}

impl Timeline {
    pub fn new(conversation: ConversationId, me: UserId) -> Self {
        Self {
            conversation,
            me,
            entries: Vec::new(),
            draft: String::new(),
            in_flight: None,
        }
    }

    /// Replace the list with the loaded history, ordered by creation time
    /// ascending. The sort is stable: equal timestamps keep their
    /// insertion order.
    pub fn load(&mut self, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.entries = messages;
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.entries.iter().find(|m| &m.id == id)
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, value: impl Into<String>) {
        self.draft = value.into();
    }

    /// Whether a text send is in flight.
    pub fn sending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Step 1–2 of the send protocol: validate the draft and append the
    /// optimistic entry. Returns `None` (and changes nothing) when the
    /// trimmed draft is empty or a send is already in flight.
    pub fn begin_send(&mut self, now: DateTime<Utc>) -> Option<Message> {
        let content = self.draft.trim();
        if content.is_empty() || self.in_flight.is_some() {
            return None;
        }
        let message = Message {
            id: MessageId::local(),
            conversation_id: self.conversation,
            sender_id: self.me,
            content: content.to_string(),
            kind: MessageKind::Text,
            read: false,
            created_at: now,
            audio_url: None,
            audio_duration_secs: None,
        };
        self.in_flight = Some(message.id.clone());
        self.entries.push(message.clone());
        self.draft.clear();
        Some(message)
    }

    /// Reconcile a confirmed send: the optimistic entry is replaced in
    /// place, preserving its list position. If the realtime insert event
    /// won the race and the server id is already present, the optimistic
    /// entry is simply removed.
    pub fn confirm_send(&mut self, local: &MessageId, confirmed: Message) -> bool {
        if self.in_flight.as_ref() == Some(local) {
            self.in_flight = None;
        }
        if self.entries.iter().any(|m| m.id == confirmed.id) {
            self.entries.retain(|m| &m.id != local);
            return true;
        }
        match self.entries.iter_mut().find(|m| &m.id == local) {
            Some(entry) => {
                *entry = confirmed;
                true
            }
            None => false,
        }
    }

    /// Roll back a failed send: the optimistic entry is removed and its
    /// content restored as the draft so the user can retry.
    pub fn fail_send(&mut self, local: &MessageId) -> Option<String> {
        if self.in_flight.as_ref() == Some(local) {
            self.in_flight = None;
        }
        let index = self.entries.iter().position(|m| &m.id == local)?;
        let removed = self.entries.remove(index);
        self.draft = removed.content.clone();
        Some(removed.content)
    }

    /// Apply a live insert event, deduplicating by server id.
    pub fn apply_insert(&mut self, message: Message) -> ReceiveOutcome {
        if self.entries.iter().any(|m| m.id == message.id) {
            return ReceiveOutcome::Duplicate;
        }
        let should_mark_read = message.sender_id != self.me && !message.read;
        self.entries.push(message);
        ReceiveOutcome::Appended { should_mark_read }
    }

    /// Apply a live update event (read-flag flips). Returns whether an
    /// entry changed.
    pub fn apply_update(&mut self, message: Message) -> bool {
        match self.entries.iter_mut().find(|m| m.id == message.id) {
            Some(entry) => {
                *entry = message;
                true
            }
            None => false,
        }
    }

    /// Ids of unread messages addressed to us.
    pub fn unread_from_peer(&self) -> Vec<MessageId> {
        self.entries
            .iter()
            .filter(|m| !m.read && m.sender_id != self.me)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Local mirror of the batch mark-read issued on load.
    pub fn mark_peer_read_local(&mut self) {
        for message in &mut self.entries {
            if message.sender_id != self.me {
                message.read = true;
            }
        }
    }

    /// Partition into calendar-day buckets for date-separator rendering.
    /// The boundary is the local calendar date, not a 24-hour window.
    pub fn date_groups(&self, offset: FixedOffset) -> Vec<(NaiveDate, Vec<&Message>)> {
        let mut groups: Vec<(NaiveDate, Vec<&Message>)> = Vec::new();
        for message in &self.entries {
            let day = message.created_at.with_timezone(&offset).date_naive();
            match groups.last_mut() {
                Some((current, bucket)) if *current == day => bucket.push(message),
                _ => groups.push((day, vec![message])),
            }
        }
        groups
    }
}
