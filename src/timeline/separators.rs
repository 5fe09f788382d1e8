//! Deciding where date and sender-name separators go.
//!
//! The composer doesn't decide this itself; it asks a [`SeparatorPolicy`] which
//! separators (if any) should precede an item, given the real item right before it.

use chrono::{FixedOffset, NaiveDate};

use crate::item::{Item, Side};
use crate::settings::TimelineSettings;
use crate::utils::{calendar_day, utc_offset};

/// The separators to insert before an item.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Separators {
    pub time: Option<NaiveDate>,
    pub name: Option<String>,
}

impl Separators {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.name.is_none()
    }
}

/// Decides which separators go before `item`, given the previous real item (if any).
pub trait SeparatorPolicy {
    fn separators_before(&self, prev: Option<&Item>, item: &Item) -> Separators;
}

impl<F> SeparatorPolicy for F
where
    F: Fn(Option<&Item>, &Item) -> Separators,
{
    fn separators_before(&self, prev: Option<&Item>, item: &Item) -> Separators {
        self(prev, item)
    }
}

/// A policy that never inserts separators.
pub struct NoSeparators;

impl SeparatorPolicy for NoSeparators {
    fn separators_before(&self, _prev: Option<&Item>, _item: &Item) -> Separators {
        Separators::none()
    }
}

/// The default policy: a date row whenever the calendar day changes, and in group
/// chats, the peer's name before each of their runs.
#[derive(Debug, Clone)]
pub struct DaySeparators {
    pub day_separators: bool,
    pub name_separators: bool,
    pub group_chat: bool,
    pub offset: FixedOffset,
}

impl DaySeparators {
    pub fn from_settings(settings: &TimelineSettings) -> Self {
        Self {
            day_separators: settings.separators.day_separators,
            name_separators: settings.separators.name_separators,
            group_chat: settings.group_chat,
            offset: utc_offset(settings.separators.utc_offset_minutes),
        }
    }
}

impl SeparatorPolicy for DaySeparators {
    fn separators_before(&self, prev: Option<&Item>, item: &Item) -> Separators {
        let day = calendar_day(item.timestamps().created, self.offset);
        let time = if self.day_separators {
            match prev {
                Some(prev) if calendar_day(prev.timestamps().created, self.offset) == day => None,
                _ => day,
            }
        } else {
            None
        };
        let starts_run = time.is_some()
            || prev.is_none_or(|p| p.kind().is_synthetic() || !p.same_sender(item));
        let name = (self.group_chat && self.name_separators && item.side() == Side::Peer
            && !item.kind().is_synthetic() && starts_run)
            .then(|| item.peer_id().unwrap_or("unknown").to_owned());
        Separators { time, name }
    }
}
