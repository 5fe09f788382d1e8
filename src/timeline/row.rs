//! The rows of a composed timeline: real items plus synthetic rows.

use chrono::NaiveDate;

use crate::item::ordering::OrderKey;
use crate::item::{ItemId, ItemKind};

/// The position of a row within the body of the timeline, relative to its item.
///
/// Separators are filed under the key of the item they precede,
/// so they always sort directly before it: time first, then name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BodySlot {
    TimeSeparator,
    NameSeparator,
    Item,
}

/// The sort key of a row. The derived order puts the header first, then the body
/// (in item order), then the typing row, then the footer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Header,
    Body {
        key: OrderKey,
        slot: BodySlot,
    },
    Typing,
    Footer,
}

/// What a row displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    Header,
    Footer,
    Typing,
    /// A date separator before the first item of a calendar day.
    Time { day: NaiveDate },
    /// A sender name separator before a peer's run in group chats.
    Name { peer: String },
    /// A real item of the given kind.
    Item(ItemKind),
}

impl RowKind {
    /// Maps this row onto the closed set of item kinds.
    pub fn item_kind(&self) -> ItemKind {
        match self {
            RowKind::Header => ItemKind::Header,
            RowKind::Footer => ItemKind::Footer,
            RowKind::Typing => ItemKind::Typing,
            RowKind::Time { .. } => ItemKind::Time,
            RowKind::Name { .. } => ItemKind::Name,
            RowKind::Item(kind) => *kind,
        }
    }
}

/// A single addressable row of the composed timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// The stable id of this row. For item rows, this is the item's id.
    pub id: ItemId,
    pub key: RowKey,
    pub kind: RowKind,
}

impl Row {
    pub fn is_item(&self) -> bool {
        matches!(self.kind, RowKind::Item(_))
    }

    pub fn is_separator(&self) -> bool {
        matches!(self.kind, RowKind::Time { .. } | RowKind::Name { .. })
    }

    /// Returns the item id if this row displays a real item.
    pub fn item_id(&self) -> Option<ItemId> {
        self.is_item().then_some(self.id)
    }
}
