//! Deriving an item's display state from its lifecycle timestamps.
//!
//! ## State derivation
//!
//! The display state is a pure function of the timestamps, evaluated in a fixed
//! order where the first match wins:
//!
//! ```text
//! peer_deleted != 0 && deleted != 0  →  BothDeleted
//! peer_deleted != 0                  →  PeerDeleted
//! deleted != 0                       →  Deleted
//! received == -1                     →  NotSent
//! read == -1                         →  Default
//! read != 0                          →  Read
//! received != 0                      →  Received
//! otherwise                          →  Sending
//! ```
//!
//! ## Fade out
//!
//! Entering `BothDeleted` starts a bounded local countdown ([`DeleteFade`]) that goes
//! from 0 to 100 percent over a fixed duration, after which the item asks the store
//! to remove it for good. The countdown starts at most once and is never restarted.

use serde::{Deserialize, Serialize};

use crate::descriptor::Millis;

/// The lifecycle timestamps of an item.
///
/// Each is `0` for "not yet" and `-1` for "explicitly suppressed/failed", where applicable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Timestamps {
    pub created: Millis,
    pub updated: Millis,
    pub sent: Millis,
    pub received: Millis,
    pub read: Millis,
    pub deleted: Millis,
    pub peer_deleted: Millis,
}

impl Timestamps {
    /// Returns a list of the inconsistencies in this tuple, which are likely upstream bugs.
    ///
    /// These never affect [`derive_state`]; they are only reported.
    pub fn inconsistencies(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if self.read > 0 && self.received == 0 {
            issues.push("read without received");
        }
        if self.read > 0 && self.received > 0 && self.read < self.received {
            issues.push("read before received");
        }
        if self.received > 0 && self.sent > 0 && self.received < self.sent {
            issues.push("received before sent");
        }
        if self.sent > 0 && self.created > 0 && self.sent < self.created {
            issues.push("sent before created");
        }
        issues
    }
}

/// The finite display state of an item.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemState {
    #[default]
    Default,
    Sending,
    Received,
    Read,
    NotSent,
    Deleted,
    PeerDeleted,
    BothDeleted,
}

impl ItemState {
    pub fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted | Self::PeerDeleted | Self::BothDeleted)
    }
}

/// Derives the display state from the given timestamps.
pub fn derive_state(ts: &Timestamps) -> ItemState {
    if ts.peer_deleted != 0 && ts.deleted != 0 {
        ItemState::BothDeleted
    } else if ts.peer_deleted != 0 {
        ItemState::PeerDeleted
    } else if ts.deleted != 0 {
        ItemState::Deleted
    } else if ts.received == -1 {
        ItemState::NotSent
    } else if ts.read == -1 {
        ItemState::Default
    } else if ts.read != 0 {
        ItemState::Read
    } else if ts.received != 0 {
        ItemState::Received
    } else {
        ItemState::Sending
    }
}

/// The local fade-out countdown of a both-deleted item.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DeleteFade {
    #[default]
    NotStarted,
    Running {
        started_at: Millis,
    },
    /// The countdown reached 100; the removal request has already been issued.
    Completed,
}

impl DeleteFade {
    /// Returns the fade progress in percent (0–100) at time `now`.
    pub fn progress(&self, now: Millis, duration: Millis) -> u8 {
        match *self {
            DeleteFade::NotStarted => 0,
            DeleteFade::Completed => 100,
            DeleteFade::Running { started_at } => {
                if duration <= 0 {
                    return 100;
                }
                let elapsed = now.saturating_sub(started_at).clamp(0, duration);
                (i128::from(elapsed) * 100 / i128::from(duration)) as u8
            }
        }
    }
}
