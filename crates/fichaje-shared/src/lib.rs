//! # fichaje-shared
//!
//! Domain types shared by every fichaje crate: typed identifiers, the
//! conversation/message/presence models mapped onto the backing service's
//! column names, and the timing/formatting constants the chat engine is
//! built around.

pub mod constants;
pub mod ids;
pub mod model;

pub use ids::{ConversationId, MessageId, PublicationId, UserId};
pub use model::{Conversation, Message, MessageKind, NewMessage, PresenceRecord, Profile};
