//! Aggregating a descriptor's raw annotations into the badges shown on an item.
//!
//! Reactions are grouped by their code and counted, keeping the order in which each
//! distinct code was first seen (not count order), so that recomputing from the same
//! input never reorders the badge row.

use indexmap::IndexMap;

use crate::descriptor::{Annotation, AnnotationKind};
use crate::item::Side;

/// A reaction code, either one we know how to render or an unknown one that is kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reaction {
    ThumbsUp,
    ThumbsDown,
    Heart,
    Cry,
    Hungry,
    Surprised,
    Screaming,
    Fire,
    /// An out-of-range code, rendered with the "unknown" marker.
    Unknown(i64),
}

impl Reaction {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::ThumbsUp,
            1 => Self::ThumbsDown,
            2 => Self::Heart,
            3 => Self::Cry,
            4 => Self::Hungry,
            5 => Self::Surprised,
            6 => Self::Screaming,
            7 => Self::Fire,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::ThumbsUp => 0,
            Self::ThumbsDown => 1,
            Self::Heart => 2,
            Self::Cry => 3,
            Self::Hungry => 4,
            Self::Surprised => 5,
            Self::Screaming => 6,
            Self::Fire => 7,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// The glyph drawn in the reaction badge.
    pub fn emoji(self) -> &'static str {
        match self {
            Self::ThumbsUp => "👍",
            Self::ThumbsDown => "👎",
            Self::Heart => "❤️",
            Self::Cry => "😢",
            Self::Hungry => "😋",
            Self::Surprised => "😮",
            Self::Screaming => "😱",
            Self::Fire => "🔥",
            Self::Unknown(_) => "❓",
        }
    }
}

/// One distinct reaction and how many times it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionCount {
    pub reaction: Reaction,
    pub count: usize,
}

/// The result of aggregating an item's annotations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregatedAnnotations {
    pub forwarded: bool,
    pub edited: bool,
    /// Distinct reactions in first-seen order.
    pub reactions: Vec<ReactionCount>,
}

impl AggregatedAnnotations {
    /// Whether any badge (forwarded, edited or a reaction) is shown below the item.
    pub fn has_badges(&self) -> bool {
        self.forwarded || self.edited || !self.reactions.is_empty()
    }

    /// Returns the badges of the badge row in their fixed priority order.
    pub fn badges(&self) -> Vec<Badge> {
        let mut badges = Vec::with_capacity(self.reactions.len() + 2);
        if self.forwarded {
            badges.push(Badge::Forwarded);
        }
        if self.edited {
            badges.push(Badge::Edited);
        }
        badges.extend(self.reactions.iter().copied().map(Badge::Reaction));
        badges
    }
}

/// Aggregates the given raw annotations.
///
/// Annotation kinds that have no badge (e.g., [`AnnotationKind::Save`]) are ignored.
pub fn aggregate_annotations(annotations: &[Annotation]) -> AggregatedAnnotations {
    let mut aggregated = AggregatedAnnotations::default();
    let mut counts: IndexMap<i64, usize> = IndexMap::new();
    for annotation in annotations {
        match annotation.kind {
            AnnotationKind::Forwarded => aggregated.forwarded = true,
            AnnotationKind::Edited => aggregated.edited = true,
            AnnotationKind::Like => *counts.entry(annotation.value).or_insert(0) += 1,
            AnnotationKind::Forward | AnnotationKind::Save => { }
        }
    }
    aggregated.reactions = counts.into_iter()
        .map(|(code, count)| ReactionCount { reaction: Reaction::from_code(code), count })
        .collect();
    aggregated
}

/// A small indicator drawn in the badge row attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Forwarded,
    Edited,
    Reaction(ReactionCount),
}

/// The horizontal edge of the badge row that slot indices are counted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
}

/// A badge and its slot in the badge row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeSlot {
    pub badge: Badge,
    /// The slot index, counted from `edge`; slot 0 is closest to the message origin side.
    pub index: usize,
    pub edge: Edge,
}

/// Lays out the badge row of an item sent from the given `side`.
///
/// Our own messages are right-aligned, so their slots are counted from the right edge;
/// peer messages mirror that from the left. The forwarded badge (if any) always takes
/// slot 0, then the edited badge, then the reactions in first-seen order.
pub fn badge_slots(aggregated: &AggregatedAnnotations, side: Side) -> Vec<BadgeSlot> {
    let edge = match side {
        Side::Local => Edge::Right,
        Side::Peer => Edge::Left,
    };
    aggregated.badges()
        .into_iter()
        .enumerate()
        .map(|(index, badge)| BadgeSlot { badge, index, edge })
        .collect()
}
