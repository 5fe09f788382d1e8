//! Bubble corner grouping for consecutive items from the same sender.
//!
//! Consecutive items from the same sender form a "run". Inside a run, the edges where two
//! bubbles touch use a small (tight) corner radius on the sender's side and a small margin;
//! the outer edges of a run use the large radius and margin. Our own runs are graded on the
//! right-hand corners, peer runs on the left-hand ones.
//!
//! An item that shows a badge row (forwarded, edited, reactions) always ends its run,
//! because the badge row visually occupies its trailing edge.
//!
//! Only the immediate predecessor and successor are needed to compute an item's mask,
//! so the composer can recompute it in O(1) whenever an item's neighbors change.

use bitflags::bitflags;

use crate::item::{Item, Side};

bitflags! {
    /// Which corners and margins of a bubble use the "run boundary" (large) variant.
    ///
    /// A cleared bit means the small, grouped variant.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct CornerMask: u8 {
        const TopLeft           = 1 << 0;
        const TopRight          = 1 << 1;
        const BottomLeft        = 1 << 2;
        const BottomRight       = 1 << 3;
        const TopLargeMargin    = 1 << 4;
        const BottomLargeMargin = 1 << 5;
    }
}

impl CornerMask {
    /// The four rounding bits, without the margins.
    pub fn rounding(self) -> CornerMask {
        self & (Self::TopLeft | Self::TopRight | Self::BottomLeft | Self::BottomRight)
    }

    /// The two margin bits, without the rounding.
    pub fn margins(self) -> CornerMask {
        self & (Self::TopLargeMargin | Self::BottomLargeMargin)
    }

    pub fn is_top_large(self) -> bool {
        self.contains(Self::TopLargeMargin)
    }

    pub fn is_bottom_large(self) -> bool {
        self.contains(Self::BottomLargeMargin)
    }
}

/// The parts of an item that corner grouping looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMember<'a> {
    pub side: Side,
    pub peer_id: Option<&'a str>,
    pub has_badges: bool,
}

impl<'a> RunMember<'a> {
    pub fn of(item: &'a Item) -> Self {
        Self {
            side: item.side(),
            peer_id: item.peer_id(),
            has_badges: item.annotations().has_badges(),
        }
    }

    fn same_sender(&self, other: &RunMember<'_>) -> bool {
        self.side == other.side && (self.side == Side::Local || self.peer_id == other.peer_id)
    }
}

/// Computes the corner mask of `item`.
///
/// `prev` and `next` are the items directly above and below it, or `None` if the adjacent
/// row is not a real item (a separator, the header, the typing row, etc.).
/// If `group_runs` is false, every item is drawn as a run of its own.
pub fn compute_corners(
    prev: Option<RunMember<'_>>,
    item: RunMember<'_>,
    next: Option<RunMember<'_>>,
    group_runs: bool,
) -> CornerMask {
    let mut mask = CornerMask::all();
    if !group_runs {
        return mask;
    }
    let (top, bottom) = match item.side {
        Side::Local => (CornerMask::TopRight, CornerMask::BottomRight),
        Side::Peer => (CornerMask::TopLeft, CornerMask::BottomLeft),
    };
    let joins_above = prev.is_some_and(|p| p.same_sender(&item) && !p.has_badges);
    let joins_below = !item.has_badges && next.is_some_and(|n| n.same_sender(&item));
    if joins_above {
        mask.remove(top | CornerMask::TopLargeMargin);
    }
    if joins_below {
        mask.remove(bottom | CornerMask::BottomLargeMargin);
    }
    mask
}
