//! Errors returned by timeline mutations.

use crate::descriptor::DescriptorId;
use crate::item::ItemId;

/// Errors that can occur while applying store updates to a conversation timeline.
///
/// Lookups that merely fail to find something (e.g., `item_to_position` for an item
/// that was already removed) return `None` instead of one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    /// An update referenced a descriptor that was never added to this timeline.
    #[error("unknown descriptor {0}")]
    UnknownDescriptor(DescriptorId),
    /// The store reported a descriptor that this timeline already contains.
    #[error("descriptor {0} is already in the timeline")]
    DuplicateDescriptor(DescriptorId),
    /// The given item is not (or no longer) registered in the timeline.
    #[error("item {0} not found in the timeline")]
    ItemNotFound(ItemId),
    /// A row position outside of `0..len`.
    #[error("position {position} is out of bounds for {len} rows")]
    PositionOutOfBounds { position: usize, len: usize },
    /// The store's request receiver was dropped.
    #[error("the store request channel is closed")]
    RequestChannelClosed,
}
