//! The channels between the conversation store and a timeline.
//!
//! The store runs elsewhere (typically on a background task) and talks to the timeline
//! only through these messages: [`TimelineUpdate`]s flow in, [`StoreRequest`]s flow out.
//! Both use unbounded `crossbeam_channel`s so that neither side ever blocks.

use crate::descriptor::{Annotation, Descriptor, DescriptorId};
use crate::item::state::Timestamps;

/// A message sent from the conversation store to a timeline,
/// to be applied on the presentation thread.
#[derive(Debug, Clone)]
pub enum TimelineUpdate {
    /// The very first update a timeline receives, containing the loaded history.
    FirstUpdate {
        descriptors: Vec<Descriptor>,
    },
    /// A descriptor became visible, either from history or as a live event.
    NewDescriptor(Descriptor),
    /// The timestamps and/or annotations of a known descriptor changed.
    DescriptorUpdated {
        id: DescriptorId,
        timestamps: Timestamps,
        annotations: Vec<Annotation>,
    },
    /// A descriptor was finally deleted from the store.
    DescriptorDeleted(DescriptorId),
    /// The list of peers (their displayable names) currently composing a message.
    TypingUsers {
        users: Vec<String>,
    },
    /// The whole conversation history was cleared.
    HistoryCleared,
}

/// Why a deletion was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    /// An ephemeral message reached the end of its visible lifetime.
    Expired,
    /// A both-deleted message finished fading out.
    BothDeleted,
    /// The user explicitly deleted the message.
    User,
}

/// A request sent from a timeline to the conversation store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRequest {
    /// The given peer descriptor has been displayed and should be marked as read.
    MarkRead(DescriptorId),
    /// The given descriptor should be deleted.
    Delete {
        id: DescriptorId,
        reason: DeleteReason,
    },
}

/// Builds a `DescriptorUpdated` message from a refreshed descriptor.
impl From<&Descriptor> for TimelineUpdate {
    fn from(descriptor: &Descriptor) -> Self {
        TimelineUpdate::DescriptorUpdated {
            id: descriptor.id.clone(),
            timestamps: descriptor.timestamps,
            annotations: descriptor.annotations.clone(),
        }
    }
}
