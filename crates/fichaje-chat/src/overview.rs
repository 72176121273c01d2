//! The conversation-list view model: find-or-create on first contact,
//! and per-conversation overviews with unread counts and polling-path
//! presence.

use chrono::{DateTime, Utc};

use fichaje_shared::{Conversation, Message, PublicationId, UserId};
use fichaje_store::{MessageStore, StoreError};

use crate::counterpart::Counterpart;
use crate::presence::online_within_window;

/// One row of the conversation list.
#[derive(Debug, Clone)]
pub struct ConversationOverview {
    pub conversation: Conversation,
    pub counterpart: Counterpart,
    pub last_message: Option<Message>,
    pub unread_count: u64,
    pub peer_online: bool,
    pub peer_last_seen: Option<DateTime<Utc>>,
}

/// First-contact path: reuse the existing conversation for this
/// publication and participant pair (either ordering) or create it.
pub async fn find_or_create_conversation(
    store: &dyn MessageStore,
    publication: PublicationId,
    me: UserId,
    other: UserId,
) -> Result<Conversation, StoreError> {
    if let Some(existing) = store.find_conversation(publication, me, other).await? {
        return Ok(existing);
    }
    store.create_conversation(publication, me, other).await
}

/// Load the conversation list for `me`, most recently active first,
/// with last message, unread count, counterpart identity and the
/// heartbeat-window presence derivation. Also returns the total unread
/// across all conversations (the tab badge).
pub async fn load_overviews(
    store: &dyn MessageStore,
    me: UserId,
    now: DateTime<Utc>,
) -> Result<(Vec<ConversationOverview>, u64), StoreError> {
    let conversations = store.list_conversations(me).await?;
    let mut overviews = Vec::with_capacity(conversations.len());
    let mut total_unread = 0;

    for conversation in conversations {
        let other = conversation.counterpart_of(me);
        let last_message = store.last_message(conversation.id).await?;
        let unread_count = store.unread_count(conversation.id, me).await?;
        let profile = store.fetch_profile(other).await?;
        let presence = store.fetch_presence(other).await?;

        let (peer_online, peer_last_seen) = match presence {
            Some(record) => (
                online_within_window(record.last_seen, now),
                Some(record.last_seen),
            ),
            None => (false, None),
        };

        total_unread += unread_count;
        overviews.push(ConversationOverview {
            counterpart: Counterpart::resolve(other, profile),
            conversation,
            last_message,
            unread_count,
            peer_online,
            peer_last_seen,
        });
    }

    Ok((overviews, total_unread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fichaje_shared::{NewMessage, PresenceRecord};
    use fichaje_store::MemoryStore;

    #[tokio::test]
    async fn first_contact_creates_once_per_pair_and_publication() {
        let store = MemoryStore::new();
        let me = UserId::new();
        let other = UserId::new();
        let publication = PublicationId::new();

        let created = find_or_create_conversation(&store, publication, me, other)
            .await
            .unwrap();
        // The peer starting from their side lands in the same conversation.
        let reused = find_or_create_conversation(&store, publication, other, me)
            .await
            .unwrap();
        assert_eq!(created.id, reused.id);
        assert_eq!(store.list_conversations(me).await.unwrap().len(), 1);

        // A different publication starts a fresh thread.
        let elsewhere = find_or_create_conversation(&store, PublicationId::new(), me, other)
            .await
            .unwrap();
        assert_ne!(created.id, elsewhere.id);
    }

    #[tokio::test]
    async fn overviews_order_by_activity_and_sum_unread() {
        let store = MemoryStore::new();
        let me = UserId::new();
        let ana = UserId::new();
        let club = UserId::new();

        let with_ana = store
            .create_conversation(PublicationId::new(), me, ana)
            .await
            .unwrap();
        let with_club = store
            .create_conversation(PublicationId::new(), club, me)
            .await
            .unwrap();

        store
            .insert_message(NewMessage::text(with_ana.id, ana, "uno"))
            .await
            .unwrap();
        store
            .insert_message(NewMessage::text(with_club.id, club, "dos"))
            .await
            .unwrap();
        store
            .insert_message(NewMessage::text(with_club.id, club, "tres"))
            .await
            .unwrap();

        let (overviews, total) = load_overviews(&store, me, Utc::now()).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(overviews.len(), 2);
        // Most recent activity first.
        assert_eq!(overviews[0].conversation.id, with_club.id);
        assert_eq!(overviews[0].unread_count, 2);
        assert_eq!(
            overviews[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("tres")
        );
        assert_eq!(overviews[1].unread_count, 1);
    }

    #[tokio::test]
    async fn polling_presence_uses_the_two_minute_window() {
        let store = MemoryStore::new();
        let me = UserId::new();
        let fresh = UserId::new();
        let stale = UserId::new();
        let now = Utc::now();

        store
            .create_conversation(PublicationId::new(), me, fresh)
            .await
            .unwrap();
        store
            .create_conversation(PublicationId::new(), me, stale)
            .await
            .unwrap();
        store.set_presence(PresenceRecord {
            user_id: fresh,
            last_seen: now,
            is_online: true,
        });
        store.set_presence(PresenceRecord {
            user_id: stale,
            last_seen: now - chrono::Duration::minutes(3),
            is_online: true,
        });

        let (overviews, _) = load_overviews(&store, me, now).await.unwrap();
        let by_peer = |id: UserId| {
            overviews
                .iter()
                .find(|o| o.counterpart.id == id)
                .unwrap()
        };
        assert!(by_peer(fresh).peer_online);
        // A 3-minute-old heartbeat is offline regardless of its flag.
        assert!(!by_peer(stale).peer_online);
        assert!(by_peer(stale).peer_last_seen.is_some());
    }
}
