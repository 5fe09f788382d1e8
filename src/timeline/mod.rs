//! Composing real items and synthetic rows into the list shown by the timeline view.

pub mod row;
pub mod separators;
pub mod composer;
/// The row addressing of the reaction detail view.
pub mod annotation_detail;
pub mod conversation;

pub use composer::TimelineComposer;
pub use conversation::{ConversationTimeline, ItemPresentation, RowContent, RowPresentation, TickOutcome};
