//! The realtime service seam and its in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use fichaje_shared::{ConversationId, Message, UserId};

use crate::events::{MessageChange, PresenceEvent, PresenceState};

#[derive(Error, Debug)]
pub enum RealtimeError {
    /// The channel is gone; the owning view's remount is the recovery path.
    #[error("Realtime channel closed")]
    Closed,

    #[error("Subscription failed: {0}")]
    Subscribe(String),
}

/// Publish handle for the caller's own entry on a presence channel.
#[async_trait]
pub trait PresencePublisher: Send + Sync {
    async fn track(&self, state: PresenceState) -> Result<(), RealtimeError>;
    async fn untrack(&self) -> Result<(), RealtimeError>;
}

/// A joined presence channel: the event stream plus the publish handle.
pub struct PresenceChannel {
    pub events: mpsc::Receiver<PresenceEvent>,
    pub publisher: Box<dyn PresencePublisher>,
}

/// The external realtime service, reduced to what the engine consumes:
/// message-change streams filtered by conversation, and presence channels
/// keyed by user.
#[async_trait]
pub trait RealtimeHub: Send + Sync {
    async fn subscribe_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<mpsc::Receiver<MessageChange>, RealtimeError>;

    async fn join_presence(
        &self,
        conversation: ConversationId,
        key: UserId,
    ) -> Result<PresenceChannel, RealtimeError>;
}

struct PresenceTopic {
    states: HashMap<UserId, PresenceState>,
    events: broadcast::Sender<PresenceEvent>,
}

impl PresenceTopic {
    fn new() -> Self {
        Self {
            states: HashMap::new(),
            events: broadcast::channel(256).0,
        }
    }
}

#[derive(Default)]
struct HubInner {
    messages: HashMap<ConversationId, broadcast::Sender<MessageChange>>,
    presence: HashMap<ConversationId, PresenceTopic>,
}

/// In-process hub: broadcast fan-out per conversation topic and a shared
/// presence map keyed by user, so a re-join replaces the previous entry
/// instead of duplicating it. Two sessions in one process see each other
/// exactly as they would through the hosted service.
pub struct LocalHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner::default())),
        }
    }

    /// Feed a table insert into the conversation's change stream.
    pub fn publish_insert(&self, message: Message) {
        self.publish(MessageChange::Inserted(message));
    }

    /// Feed a table update into the conversation's change stream.
    pub fn publish_update(&self, message: Message) {
        self.publish(MessageChange::Updated(message));
    }

    fn publish(&self, change: MessageChange) {
        let conversation = match &change {
            MessageChange::Inserted(m) | MessageChange::Updated(m) => m.conversation_id,
        };
        let inner = self.inner.lock().unwrap();
        if let Some(sender) = inner.messages.get(&conversation) {
            // No subscribers is fine; the event is simply not observed.
            let _ = sender.send(change);
        }
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge a broadcast subscription into a plain mpsc stream. Ends when
/// the consumer drops its receiver.
fn forward<T: Clone + Send + 'static>(
    mut from: broadcast::Receiver<T>,
    to: mpsc::Sender<T>,
) {
    tokio::spawn(async move {
        loop {
            match from.recv().await {
                Ok(event) => {
                    if to.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime consumer lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[async_trait]
impl RealtimeHub for LocalHub {
    async fn subscribe_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<mpsc::Receiver<MessageChange>, RealtimeError> {
        let subscription = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .messages
                .entry(conversation)
                .or_insert_with(|| broadcast::channel(256).0)
                .subscribe()
        };

        let (tx, rx) = mpsc::channel(256);
        forward(subscription, tx);
        debug!(topic = %conversation.message_topic(), "Subscribed to message changes");
        Ok(rx)
    }

    async fn join_presence(
        &self,
        conversation: ConversationId,
        key: UserId,
    ) -> Result<PresenceChannel, RealtimeError> {
        let (subscription, snapshot) = {
            let mut inner = self.inner.lock().unwrap();
            let topic = inner
                .presence
                .entry(conversation)
                .or_insert_with(PresenceTopic::new);
            (topic.events.subscribe(), topic.states.clone())
        };

        let (tx, rx) = mpsc::channel(256);
        // New joiners see the current channel state first.
        let _ = tx.try_send(PresenceEvent::Sync(snapshot));
        forward(subscription, tx);

        debug!(topic = %conversation.presence_topic(), key = %key, "Joined presence channel");
        Ok(PresenceChannel {
            events: rx,
            publisher: Box::new(LocalPresencePublisher {
                inner: self.inner.clone(),
                conversation,
                key,
            }),
        })
    }
}

struct LocalPresencePublisher {
    inner: Arc<Mutex<HubInner>>,
    conversation: ConversationId,
    key: UserId,
}

#[async_trait]
impl PresencePublisher for LocalPresencePublisher {
    async fn track(&self, state: PresenceState) -> Result<(), RealtimeError> {
        let mut inner = self.inner.lock().unwrap();
        let topic = inner
            .presence
            .entry(self.conversation)
            .or_insert_with(PresenceTopic::new);

        let newly_joined = topic.states.insert(self.key, state.clone()).is_none();
        if newly_joined {
            let _ = topic.events.send(PresenceEvent::Join {
                key: self.key,
                state,
            });
        }
        let _ = topic.events.send(PresenceEvent::Sync(topic.states.clone()));
        Ok(())
    }

    async fn untrack(&self) -> Result<(), RealtimeError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(topic) = inner.presence.get_mut(&self.conversation) {
            if topic.states.remove(&self.key).is_some() {
                let _ = topic.events.send(PresenceEvent::Leave { key: self.key });
                let _ = topic.events.send(PresenceEvent::Sync(topic.states.clone()));
            }
        }
        Ok(())
    }
}
