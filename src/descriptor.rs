//! Descriptors: the immutable records that the conversation store hands to the timeline.
//!
//! The store owns these; the timeline only ever reads them, and keeps its own
//! [`Item`](crate::item::Item) per descriptor that it refreshes in place.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::{ItemPayload, Side};
use crate::item::state::Timestamps;

/// Milliseconds since the Unix epoch, or a duration in milliseconds.
///
/// Timestamps use `0` for "not yet" and `-1` for "explicitly suppressed/failed".
pub type Millis = i64;

/// The stable identifier of a stored conversation entry.
///
/// The `sequence` comes first so that the derived ordering compares sequence ids
/// before falling back to the origin (which only disambiguates between peers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DescriptorId {
    /// The sequence id assigned by the sender.
    pub sequence: u64,
    /// The sender that assigned the `sequence`, e.g., a peer's twincode or our own.
    pub origin: String,
}

impl DescriptorId {
    pub fn new(origin: impl Into<String>, sequence: u64) -> Self {
        Self { sequence, origin: origin.into() }
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.sequence)
    }
}

/// The type tag of an annotation attached to a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationKind {
    /// This descriptor is a forwarded copy of another message.
    Forwarded,
    /// This descriptor was forwarded by us to another conversation.
    Forward,
    /// The content was edited after it was sent.
    Edited,
    /// A reaction; the annotation's `value` is the reaction code.
    Like,
    /// The descriptor was saved/bookmarked.
    Save,
}

/// A single key/value annotation as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    #[serde(default)]
    pub value: i64,
    /// The peer who added this annotation, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

impl Annotation {
    pub fn forwarded() -> Self {
        Self { kind: AnnotationKind::Forwarded, value: 0, peer: None }
    }

    pub fn edited() -> Self {
        Self { kind: AnnotationKind::Edited, value: 0, peer: None }
    }

    pub fn like(value: i64) -> Self {
        Self { kind: AnnotationKind::Like, value, peer: None }
    }

    pub fn like_from(value: i64, peer: impl Into<String>) -> Self {
        Self { kind: AnnotationKind::Like, value, peer: Some(peer.into()) }
    }
}

/// An immutable record describing one stored conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: DescriptorId,
    /// Whether we sent this entry or a peer did.
    pub side: Side,
    /// The peer who sent this entry, only meaningful for peer-sent entries in group chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub timestamps: Timestamps,
    /// How long (in ms) this entry stays visible after being read. `0` means forever.
    #[serde(default)]
    pub expire_timeout: Millis,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<DescriptorId>,
    pub payload: ItemPayload,
}

impl Descriptor {
    /// A plain text message, mostly useful for tests and demos.
    pub fn text(id: DescriptorId, side: Side, created: Millis, body: impl Into<String>) -> Self {
        Self {
            id,
            side,
            peer_id: None,
            timestamps: Timestamps { created, ..Timestamps::default() },
            expire_timeout: 0,
            annotations: Vec::new(),
            reply_to: None,
            payload: ItemPayload::Message { body: body.into() },
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.expire_timeout > 0
    }
}
