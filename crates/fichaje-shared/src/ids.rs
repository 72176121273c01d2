use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::LOCAL_ID_PREFIX;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Topic name of the message change stream for this conversation.
    pub fn message_topic(&self) -> String {
        format!("mensajes:{}", self.0)
    }

    /// Topic name of the presence channel for this conversation.
    pub fn presence_topic(&self) -> String {
        format!("presence:{}", self.0)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PublicationId(pub Uuid);

impl PublicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PublicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PublicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier.
///
/// Server-assigned ids are UUID strings. An optimistic send carries a
/// locally generated id with the `temp-` prefix until the store confirms
/// the insert; the prefix is what distinguishes the two.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh local (unconfirmed) id.
    pub fn local() -> Self {
        Self(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_carry_the_prefix() {
        let local = MessageId::local();
        assert!(local.is_local());
        assert!(local.as_str().starts_with("temp-"));
    }

    #[test]
    fn server_ids_do_not() {
        let server = MessageId::from(Uuid::new_v4());
        assert!(!server.is_local());
    }

    #[test]
    fn topics_are_namespaced_per_conversation() {
        let id = ConversationId::new();
        assert_eq!(id.message_topic(), format!("mensajes:{}", id.0));
        assert_eq!(id.presence_topic(), format!("presence:{}", id.0));
        assert_ne!(id.message_topic(), id.presence_topic());
    }
}
