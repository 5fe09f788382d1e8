//! The total order over timeline items.
//!
//! Items sort by creation time; at equal creation times, peer-sent items come before
//! our own, and remaining ties are broken by the descriptor's sequence id (then its
//! origin, so that two distinct descriptors never compare equal).

use std::cmp::Ordering;

use crate::descriptor::{DescriptorId, Millis};
use super::Side;

/// The sort key of a real item in the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderKey {
    pub created: Millis,
    pub side: Side,
    pub descriptor: DescriptorId,
}

impl OrderKey {
    pub fn new(created: Millis, side: Side, descriptor: DescriptorId) -> Self {
        Self { created, side, descriptor }
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created.cmp(&other.created)
            .then_with(|| side_rank(self.side).cmp(&side_rank(other.side)))
            .then_with(|| self.descriptor.cmp(&other.descriptor))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Peer-sent items sort before self-sent ones at equal timestamps.
fn side_rank(side: Side) -> u8 {
    match side {
        Side::Peer => 0,
        Side::Local => 1,
    }
}
