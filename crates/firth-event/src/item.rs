//! The immutable event record.

use serde::{Deserialize, Serialize};

use crate::id::{AuthorId, EventId};
use crate::{kind, Timestamp};

/// Event kind tag.
pub type Kind = u16;

/// How one event references another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// Direct parent in a reply thread
    ReplyTo,
    /// Root of the thread this event belongs to
    Root,
    /// Quoted or reposted event
    Quote,
    /// Plain mention, no thread relation
    Mention,
}

/// A typed reference from one event to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    /// Referenced event
    pub target: EventId,
    /// Relation carried by the reference
    pub kind: RefKind,
}

impl ItemRef {
    pub fn new(kind: RefKind, target: EventId) -> Self {
        Self { target, kind }
    }
}

/// An immutable signed record delivered by a relay or read from the local
/// store. The engine never mutates one; projections for display are built
/// elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Content hash identifying this event
    pub id: EventId,
    /// Author fingerprint
    pub author: AuthorId,
    /// Creation time claimed by the author (unix seconds)
    pub created_at: Timestamp,
    /// Kind tag
    pub kind: Kind,
    /// Typed references to other events
    #[serde(default)]
    pub refs: Vec<ItemRef>,
    /// Authors tagged in this event (follow lists, mentions)
    #[serde(default)]
    pub tagged_authors: Vec<AuthorId>,
    /// Hashtags attached to this event, lowercased
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Relays that delivered this event to us
    #[serde(default)]
    pub relays: Vec<String>,
    /// Opaque content
    pub payload: String,
}

impl RawItem {
    /// Build an item, deriving its id from author, timestamp and payload.
    pub fn new(author: AuthorId, created_at: Timestamp, kind: Kind, payload: &str) -> Self {
        let mut buf = Vec::with_capacity(32 + 8 + 2 + payload.len());
        buf.extend_from_slice(&author.0);
        buf.extend_from_slice(&created_at.to_be_bytes());
        buf.extend_from_slice(&kind.to_be_bytes());
        buf.extend_from_slice(payload.as_bytes());
        Self {
            id: EventId::from_payload(&buf),
            author,
            created_at,
            kind,
            refs: Vec::new(),
            tagged_authors: Vec::new(),
            hashtags: Vec::new(),
            relays: Vec::new(),
            payload: payload.to_owned(),
        }
    }

    /// Add a typed reference.
    #[must_use]
    pub fn with_ref(mut self, kind: RefKind, target: EventId) -> Self {
        self.refs.push(ItemRef::new(kind, target));
        self
    }

    fn first_ref(&self, kind: RefKind) -> Option<EventId> {
        self.refs.iter().find(|r| r.kind == kind).map(|r| r.target)
    }

    /// Direct parent, if this event is a reply.
    pub fn reply_to(&self) -> Option<EventId> {
        self.first_ref(RefKind::ReplyTo)
    }

    /// Thread root, if the author tagged one.
    pub fn root_ref(&self) -> Option<EventId> {
        self.first_ref(RefKind::Root)
    }

    /// Quoted event, if any.
    pub fn quote(&self) -> Option<EventId> {
        self.first_ref(RefKind::Quote)
    }

    /// For reposts, the event being reposted.
    pub fn repost_target(&self) -> Option<EventId> {
        if self.kind == kind::REPOST {
            self.quote()
        } else {
            None
        }
    }

    pub fn is_repost(&self) -> bool {
        self.kind == kind::REPOST
    }

    /// A reply references either a direct parent or a thread root.
    pub fn is_reply(&self) -> bool {
        self.reply_to().is_some() || self.root_ref().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(seed: u8) -> AuthorId {
        let mut id = [0u8; 32];
        id[0] = seed;
        AuthorId(id)
    }

    #[test]
    fn id_covers_author_and_time() {
        let a = RawItem::new(author(1), 100, kind::NOTE, "hi");
        let b = RawItem::new(author(2), 100, kind::NOTE, "hi");
        let c = RawItem::new(author(1), 101, kind::NOTE, "hi");
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn reply_refs() {
        let root = RawItem::new(author(1), 100, kind::NOTE, "root");
        let reply = RawItem::new(author(2), 200, kind::NOTE, "reply")
            .with_ref(RefKind::Root, root.id)
            .with_ref(RefKind::ReplyTo, root.id);
        assert!(reply.is_reply());
        assert_eq!(reply.reply_to(), Some(root.id));
        assert_eq!(reply.root_ref(), Some(root.id));
        assert!(!root.is_reply());
    }

    #[test]
    fn repost_target_requires_repost_kind() {
        let target = RawItem::new(author(1), 100, kind::NOTE, "original");
        let repost = RawItem::new(author(2), 200, kind::REPOST, "")
            .with_ref(RefKind::Quote, target.id);
        let quoting_note = RawItem::new(author(3), 300, kind::NOTE, "look at this")
            .with_ref(RefKind::Quote, target.id);
        assert_eq!(repost.repost_target(), Some(target.id));
        assert_eq!(quoting_note.repost_target(), None);
        assert_eq!(quoting_note.quote(), Some(target.id));
    }

    #[test]
    fn serde_roundtrip() {
        let item = RawItem::new(author(7), 1234, kind::NOTE, "content");
        let json = serde_json::to_string(&item).unwrap();
        let back: RawItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }
}
