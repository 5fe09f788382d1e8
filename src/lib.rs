/// The records that the conversation store hands to a timeline.
pub mod descriptor;
pub mod error;

/// Timeline items, their display state and their order.
pub mod item;
/// Reaction, forward and edit badges.
pub mod annotations;
/// Bubble corner grouping of consecutive same-sender items.
pub mod corners;
/// Self-destruction of ephemeral messages.
pub mod ephemeral;

/// The channels between the conversation store and a timeline.
pub mod store;
pub mod settings;

/// Core content: the composed, position-addressable timeline.
pub mod timeline;

pub mod utils;

pub use descriptor::{Annotation, AnnotationKind, Descriptor, DescriptorId, Millis};
pub use error::TimelineError;
pub use item::{Item, ItemId, ItemKind, ItemPayload, Side};
pub use item::state::{ItemState, Timestamps};
pub use settings::TimelineSettings;
pub use store::{DeleteReason, StoreRequest, TimelineUpdate};
pub use timeline::{ConversationTimeline, TimelineComposer};
