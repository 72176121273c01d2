//! Per-conversation channel ownership.
//!
//! One multiplexer is created and torn down by the conversation view's
//! lifecycle and holds at most one live subscription pair (messages +
//! presence) at a time, so no event is ever delivered twice. Events for a
//! conversation arrive in the order the backing stream emits them; there
//! is no ordering guarantee between the two streams.
//!
//! A dropped subscription is not detected or resubscribed here — closing
//! and reopening the owning view is the recovery mechanism.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use fichaje_shared::{ConversationId, UserId};

use crate::events::{MessageChange, PresenceEvent, PresenceState};
use crate::hub::{PresencePublisher, RealtimeError, RealtimeHub};

/// The two receivers of an open conversation. Dropping them releases the
/// underlying subscriptions.
pub struct ChannelPair {
    pub conversation: ConversationId,
    pub messages: mpsc::Receiver<MessageChange>,
    pub presence: mpsc::Receiver<PresenceEvent>,
}

pub struct ChannelMultiplexer {
    hub: Arc<dyn RealtimeHub>,
    current: Option<ConversationId>,
    publisher: Option<Box<dyn PresencePublisher>>,
}

impl ChannelMultiplexer {
    pub fn new(hub: Arc<dyn RealtimeHub>) -> Self {
        Self {
            hub,
            current: None,
            publisher: None,
        }
    }

    /// The conversation whose pair is currently live, if any.
    pub fn conversation(&self) -> Option<ConversationId> {
        self.current
    }

    /// Subscribe the message and presence channels for a conversation.
    ///
    /// Any previously open pair is closed first, so switching
    /// conversations can never leave two live subscriptions behind.
    pub async fn open(
        &mut self,
        conversation: ConversationId,
        key: UserId,
    ) -> Result<ChannelPair, RealtimeError> {
        if self.current.is_some() {
            self.close().await;
        }

        let messages = self.hub.subscribe_messages(conversation).await?;
        let presence = self.hub.join_presence(conversation, key).await?;

        self.current = Some(conversation);
        self.publisher = Some(presence.publisher);

        debug!(conversation = %conversation, "Opened conversation channel pair");
        Ok(ChannelPair {
            conversation,
            messages,
            presence: presence.events,
        })
    }

    /// Publish the caller's presence state on the open channel.
    pub async fn track(&self, state: PresenceState) -> Result<(), RealtimeError> {
        match &self.publisher {
            Some(publisher) => publisher.track(state).await,
            None => Err(RealtimeError::Closed),
        }
    }

    /// Untrack presence and forget the pair. The caller drops its
    /// [`ChannelPair`] receivers to finish the unsubscribe.
    pub async fn close(&mut self) {
        self.current = None;
        if let Some(publisher) = self.publisher.take() {
            if let Err(e) = publisher.untrack().await {
                debug!(error = %e, "Untrack on close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::hub::LocalHub;

    #[tokio::test]
    async fn reopening_unsubscribes_the_previous_pair() {
        let hub = Arc::new(LocalHub::new());
        let me = UserId::new();
        let first = ConversationId::new();
        let second = ConversationId::new();

        let mut mux = ChannelMultiplexer::new(hub.clone());
        let _pair = mux.open(first, me).await.unwrap();
        mux.track(PresenceState::online(Utc::now())).await.unwrap();
        assert_eq!(mux.conversation(), Some(first));

        // A peer watching the first conversation sees us leave when the
        // multiplexer switches to the second.
        let mut watcher = hub.join_presence(first, UserId::new()).await.unwrap();
        let _ = watcher.events.recv().await; // initial sync

        let _pair2 = mux.open(second, me).await.unwrap();
        assert_eq!(mux.conversation(), Some(second));

        match watcher.events.recv().await.unwrap() {
            PresenceEvent::Leave { key } => assert_eq!(key, me),
            event => panic!("expected leave, got {event:?}"),
        }
    }

    #[tokio::test]
    async fn tracking_without_an_open_pair_is_an_error() {
        let hub = Arc::new(LocalHub::new());
        let mux = ChannelMultiplexer::new(hub);
        let result = mux.track(PresenceState::online(Utc::now())).await;
        assert!(matches!(result, Err(RealtimeError::Closed)));
    }
}
