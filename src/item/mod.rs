//! Timeline items: the envelope that wraps one descriptor for display.
//!
//! All cross-cutting logic (state derivation, corner grouping, ordering) operates
//! on the common [`Item`] envelope; kind-specific data lives in [`ItemPayload`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::annotations::{aggregate_annotations, AggregatedAnnotations};
use crate::corners::CornerMask;
use crate::descriptor::{Annotation, Descriptor, DescriptorId, Millis};

pub mod ordering;
pub mod state;

use ordering::OrderKey;
use state::{derive_state, DeleteFade, ItemState, Timestamps};

/// A process-unique, monotonically increasing identifier.
///
/// Ids correlate with construction order, never with timeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out [`ItemId`]s; owned by whoever constructs the timeline.
#[derive(Debug)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns a fresh id. Ids are never reused.
    pub fn next_id(&mut self) -> ItemId {
        let id = ItemId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Which side of the conversation an item was sent from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sent by the current user.
    Local,
    /// Sent by a peer.
    Peer,
}

/// Kinds of system notices shown inline in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InfoKind {
    /// The privacy notice shown at the start of a conversation.
    Privacy,
    /// The ephemeral message timeout was changed.
    EphemeralSettingsChanged,
    PeerJoined,
    PeerLeft,
}

/// The closed set of kinds that a timeline row can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Message,
    Image,
    Video,
    Audio,
    File,
    Location,
    Link,
    Call,
    Invitation,
    InvitationAcceptedContact,
    ClearHistory,
    Info(InfoKind),
    // Synthetic rows injected by the composer.
    Header,
    Footer,
    Typing,
    Name,
    Time,
}

impl ItemKind {
    /// Whether rows of this kind are not a bubble sent by anyone: they never join a run
    /// of bubbles and are never marked as read.
    pub fn is_synthetic(self) -> bool {
        matches!(self, Self::Header | Self::Footer | Self::Typing | Self::Name | Self::Time | Self::Info(_))
    }
}

/// The kind-specific content of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemPayload {
    Message {
        body: String,
    },
    Image {
        #[serde(default)]
        width: u32,
        #[serde(default)]
        height: u32,
    },
    Video {
        #[serde(default)]
        duration_ms: Millis,
    },
    Audio {
        #[serde(default)]
        duration_ms: Millis,
        /// Filled in asynchronously once a background loader extracted it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waveform: Option<Vec<u8>>,
    },
    File {
        name: String,
        #[serde(default)]
        size: u64,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Link {
        url: String,
        /// Filled in asynchronously once the link preview was fetched.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preview_title: Option<String>,
    },
    Call {
        #[serde(default)]
        video: bool,
        #[serde(default)]
        duration_ms: Millis,
        #[serde(default)]
        missed: bool,
    },
    Invitation {
        group_name: String,
    },
    InvitationAcceptedContact {
        contact_name: String,
    },
    ClearHistory,
    Info {
        info: InfoKind,
    },
}

impl ItemPayload {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Message { .. } => ItemKind::Message,
            Self::Image { .. } => ItemKind::Image,
            Self::Video { .. } => ItemKind::Video,
            Self::Audio { .. } => ItemKind::Audio,
            Self::File { .. } => ItemKind::File,
            Self::Location { .. } => ItemKind::Location,
            Self::Link { .. } => ItemKind::Link,
            Self::Call { .. } => ItemKind::Call,
            Self::Invitation { .. } => ItemKind::Invitation,
            Self::InvitationAcceptedContact { .. } => ItemKind::InvitationAcceptedContact,
            Self::ClearHistory => ItemKind::ClearHistory,
            Self::Info { info } => ItemKind::Info(*info),
        }
    }
}

/// One real entry of the timeline, wrapping a descriptor.
///
/// Timestamps and annotations are refreshed in place when the store reports an update;
/// the `id` never changes for the lifetime of the item.
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    descriptor: DescriptorId,
    side: Side,
    /// The sending peer, used to split runs in group chats.
    peer_id: Option<String>,
    pub payload: ItemPayload,
    timestamps: Timestamps,
    /// The visible lifetime after being read, in ms; `0` means non-ephemeral.
    expire_timeout: Millis,
    /// An explicit override of the derived state, only ever set to `BothDeleted`.
    state_override: Option<ItemState>,
    raw_annotations: Vec<Annotation>,
    annotations: AggregatedAnnotations,
    /// Recomputed by the composer whenever this item's neighbors change.
    pub(crate) corners: CornerMask,
    pub selected: bool,
    fade: DeleteFade,
    reply_to: Option<DescriptorId>,
    /// Whether a "mark read" request was already sent for this item.
    pub(crate) read_requested: bool,
}

impl Item {
    /// Creates a new item for the given descriptor, using an id from `ids`.
    pub fn from_descriptor(ids: &mut IdGenerator, descriptor: &Descriptor) -> Self {
        let item = Self {
            id: ids.next_id(),
            descriptor: descriptor.id.clone(),
            side: descriptor.side,
            peer_id: descriptor.peer_id.clone(),
            payload: descriptor.payload.clone(),
            timestamps: descriptor.timestamps,
            expire_timeout: descriptor.expire_timeout.max(0),
            state_override: None,
            raw_annotations: descriptor.annotations.clone(),
            annotations: aggregate_annotations(&descriptor.annotations),
            corners: CornerMask::all(),
            selected: false,
            fade: DeleteFade::NotStarted,
            reply_to: descriptor.reply_to.clone(),
            read_requested: false,
        };
        item.report_inconsistencies();
        item
    }

    pub fn id(&self) -> ItemId { self.id }
    pub fn descriptor_id(&self) -> &DescriptorId { &self.descriptor }
    pub fn side(&self) -> Side { self.side }
    pub fn peer_id(&self) -> Option<&str> { self.peer_id.as_deref() }
    pub fn kind(&self) -> ItemKind { self.payload.kind() }
    pub fn timestamps(&self) -> &Timestamps { &self.timestamps }
    pub fn expire_timeout(&self) -> Millis { self.expire_timeout }
    pub fn is_ephemeral(&self) -> bool { self.expire_timeout > 0 }
    pub fn corners(&self) -> CornerMask { self.corners }
    pub fn annotations(&self) -> &AggregatedAnnotations { &self.annotations }
    pub fn raw_annotations(&self) -> &[Annotation] { &self.raw_annotations }
    pub fn reply_to(&self) -> Option<&DescriptorId> { self.reply_to.as_ref() }
    pub fn fade(&self) -> DeleteFade { self.fade }

    pub fn order_key(&self) -> OrderKey {
        OrderKey::new(self.timestamps.created, self.side, self.descriptor.clone())
    }

    /// Returns the current display state.
    ///
    /// This is always [`derive_state`] of the timestamps, except while a forced
    /// both-deleted countdown is running.
    pub fn state(&self) -> ItemState {
        self.state_override.unwrap_or_else(|| derive_state(&self.timestamps))
    }

    /// Replaces all timestamps (last write wins) and returns the new state.
    pub fn update_timestamps(&mut self, timestamps: Timestamps) -> ItemState {
        self.timestamps = timestamps;
        self.report_inconsistencies();
        self.state()
    }

    /// Replaces the annotations, returning `true` if the set of visible badges changed.
    pub fn update_annotations(&mut self, annotations: Vec<Annotation>) -> bool {
        let aggregated = aggregate_annotations(&annotations);
        self.raw_annotations = annotations;
        let changed = aggregated != self.annotations;
        self.annotations = aggregated;
        changed
    }

    /// Forces this item into the both-deleted state, e.g., when we delete a message locally
    /// that the peer has already deleted on their side.
    pub fn force_both_deleted(&mut self, now: Millis) {
        self.state_override = Some(ItemState::BothDeleted);
        self.start_fade(now);
    }

    /// Starts the fade-out countdown if it has never been started.
    ///
    /// Returns `true` if this call started it.
    pub fn start_fade(&mut self, now: Millis) -> bool {
        if self.fade == DeleteFade::NotStarted {
            self.fade = DeleteFade::Running { started_at: now };
            true
        } else {
            false
        }
    }

    /// Advances the fade-out countdown, returning `true` exactly once: when it completes.
    pub fn advance_fade(&mut self, now: Millis, duration: Millis) -> bool {
        match self.fade {
            DeleteFade::Running { .. } if self.fade.progress(now, duration) >= 100 => {
                self.fade = DeleteFade::Completed;
                true
            }
            _ => false,
        }
    }

    /// The delete progress (0–100) shown while fading out.
    pub fn delete_progress(&self, now: Millis, duration: Millis) -> u8 {
        self.fade.progress(now, duration)
    }

    /// Whether `other` was sent by the same sender as this item.
    pub fn same_sender(&self, other: &Item) -> bool {
        self.side == other.side && (self.side == Side::Local || self.peer_id == other.peer_id)
    }

    fn report_inconsistencies(&self) {
        let issues = self.timestamps.inconsistencies();
        if !issues.is_empty() {
            warn!("Item {} (descriptor {}) has inconsistent timestamps: {}", self.id, self.descriptor, issues.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(sequence: u64) -> Descriptor {
        Descriptor::text(DescriptorId::new("me", sequence), Side::Local, 100, "hi")
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut ids = IdGenerator::new();
        let a = Item::from_descriptor(&mut ids, &descriptor(2));
        let b = Item::from_descriptor(&mut ids, &descriptor(1));
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_update_keeps_identity() {
        let mut ids = IdGenerator::new();
        let mut item = Item::from_descriptor(&mut ids, &descriptor(1));
        let id = item.id();
        assert_eq!(item.state(), ItemState::Sending);
        let state = item.update_timestamps(Timestamps { created: 100, sent: 101, received: 102, ..Timestamps::default() });
        assert_eq!(state, ItemState::Received);
        assert_eq!(item.id(), id);
    }

    #[test]
    fn test_forced_both_deleted_fades_once() {
        let mut ids = IdGenerator::new();
        let mut item = Item::from_descriptor(&mut ids, &descriptor(1));
        item.force_both_deleted(1_000);
        assert_eq!(item.state(), ItemState::BothDeleted);
        // A second start must not restart the countdown.
        assert!(!item.start_fade(1_500));
        assert_eq!(item.delete_progress(1_500, 1_000), 50);
        assert!(!item.advance_fade(1_900, 1_000));
        assert!(item.advance_fade(2_000, 1_000));
        assert!(!item.advance_fade(3_000, 1_000));
        assert_eq!(item.delete_progress(3_000, 1_000), 100);
    }

    #[test]
    fn test_annotation_update_reports_badge_changes() {
        let mut ids = IdGenerator::new();
        let mut item = Item::from_descriptor(&mut ids, &descriptor(1));
        assert!(!item.update_annotations(vec![]));
        assert!(item.update_annotations(vec![Annotation::like(2)]));
        assert!(item.update_annotations(vec![Annotation::like(2), Annotation::like(2)]));
        assert!(!item.update_annotations(vec![Annotation::like(2), Annotation::like(2)]));
        assert!(item.update_annotations(vec![]));
    }

    #[test]
    fn test_payload_deserializes_by_tag() {
        let payload: ItemPayload = serde_json::from_str(r#"{"type":"call","video":true}"#).unwrap();
        assert_eq!(payload.kind(), ItemKind::Call);
        let payload: ItemPayload = serde_json::from_str(r#"{"type":"info","info":"peer-joined"}"#).unwrap();
        assert_eq!(payload.kind(), ItemKind::Info(InfoKind::PeerJoined));
    }
}
