//! Scheduling the self-destruction of ephemeral (timed) messages.
//!
//! Each ephemeral item goes through `Unarmed → Armed → Fired`:
//! * it is armed exactly when its state becomes `Read` and its expire timeout is positive,
//!   with a fire time of `read + expire_timeout`;
//! * while armed, it exposes the remaining fraction of its lifetime for the progress ring;
//! * when the fire time passes, a single [`StoreRequest::Delete`] is sent for it.
//!
//! The scheduler never reads the wall clock: the owner passes an explicit `now` to every
//! call and drives it with [`EphemeralScheduler::advance`], so tests can simulate time.
//! Cancelling an entry (when its item is removed or recycled) is synchronous, and nothing
//! is ever sent for a cancelled entry afterwards.

use std::collections::HashMap;

use crossbeam_channel::Sender;
use tracing::{debug, error};

use crate::descriptor::{DescriptorId, Millis};
use crate::item::state::ItemState;
use crate::item::{Item, ItemId};
use crate::store::{DeleteReason, StoreRequest};

/// The scheduling phase of one ephemeral item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralPhase {
    Unarmed,
    Armed {
        read_at: Millis,
        fire_at: Millis,
    },
    /// The deletion request has been sent. Terminal.
    Fired,
}

#[derive(Debug)]
struct EphemeralEntry {
    descriptor: DescriptorId,
    expire_timeout: Millis,
    phase: EphemeralPhase,
    /// When progress was last reported for this entry.
    last_tick: Millis,
}

/// The outcome of advancing the scheduler to a new point in time.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EphemeralTick {
    /// Items whose deletion was requested during this advance, in id order.
    pub fired: Vec<ItemId>,
    /// Items whose progress ring should be redrawn, with their remaining fraction.
    pub progress: Vec<(ItemId, f32)>,
}

/// Arms, fires and cancels the countdowns of ephemeral items.
pub struct EphemeralScheduler {
    entries: HashMap<ItemId, EphemeralEntry>,
    request_sender: Sender<StoreRequest>,
    /// How often progress updates are reported for armed entries.
    tick_interval: Millis,
}

impl EphemeralScheduler {
    pub fn new(request_sender: Sender<StoreRequest>, tick_interval: Millis) -> Self {
        Self {
            entries: HashMap::new(),
            request_sender,
            tick_interval: tick_interval.max(1),
        }
    }

    /// Looks at the current state of `item` and arms its countdown if it just became read.
    ///
    /// Calling this again for an already armed or fired item is a no-op, so it is safe to
    /// call after every timestamp refresh. If the fire time has already passed, the item is
    /// fired immediately instead of being scheduled with a negative delay.
    pub fn observe(&mut self, item: &Item, now: Millis) -> EphemeralPhase {
        if let Some(entry) = self.entries.get(&item.id()) {
            return entry.phase;
        }
        if !item.is_ephemeral() || item.state() != ItemState::Read {
            return EphemeralPhase::Unarmed;
        }
        let read_at = item.timestamps().read;
        let fire_at = read_at.saturating_add(item.expire_timeout());
        let mut entry = EphemeralEntry {
            descriptor: item.descriptor_id().clone(),
            expire_timeout: item.expire_timeout(),
            phase: EphemeralPhase::Armed { read_at, fire_at },
            last_tick: now,
        };
        if now >= fire_at {
            debug!("Ephemeral item {} expired at {fire_at} before it was armed (now {now})", item.id());
            fire(&self.request_sender, item.id(), &mut entry);
        } else {
            debug!("Armed ephemeral item {}, firing at {fire_at}", item.id());
        }
        let phase = entry.phase;
        self.entries.insert(item.id(), entry);
        phase
    }

    /// Returns the current phase of the given item.
    pub fn phase(&self, item_id: ItemId) -> EphemeralPhase {
        self.entries.get(&item_id).map_or(EphemeralPhase::Unarmed, |e| e.phase)
    }

    /// Returns the remaining fraction of the item's visible lifetime, in `[0, 1]`.
    ///
    /// Returns `None` if the item's countdown is not armed or fired.
    pub fn remaining_fraction(&self, item_id: ItemId, now: Millis) -> Option<f32> {
        let entry = self.entries.get(&item_id)?;
        match entry.phase {
            EphemeralPhase::Unarmed => None,
            EphemeralPhase::Fired => Some(0.0),
            EphemeralPhase::Armed { read_at, .. } => Some(remaining(read_at, entry.expire_timeout, now)),
        }
    }

    /// Fires every armed entry whose time has come, without reporting any progress.
    ///
    /// Returns the fired items in id order.
    pub fn fire_due(&mut self, now: Millis) -> Vec<ItemId> {
        let mut fired = Vec::new();
        for (&item_id, entry) in self.entries.iter_mut() {
            if let EphemeralPhase::Armed { fire_at, .. } = entry.phase
                && now >= fire_at
            {
                fire(&self.request_sender, item_id, entry);
                fired.push(item_id);
            }
        }
        fired.sort();
        fired
    }

    /// Advances to `now`: fires every armed entry whose time has come and reports
    /// progress for the others at most once per tick interval.
    pub fn advance(&mut self, now: Millis) -> EphemeralTick {
        let mut tick = EphemeralTick { fired: self.fire_due(now), ..EphemeralTick::default() };
        for (&item_id, entry) in self.entries.iter_mut() {
            let EphemeralPhase::Armed { read_at, .. } = entry.phase else { continue };
            if now.saturating_sub(entry.last_tick) >= self.tick_interval {
                entry.last_tick = now;
                tick.progress.push((item_id, remaining(read_at, entry.expire_timeout, now)));
            }
        }
        tick.progress.sort_by_key(|(id, _)| *id);
        tick
    }

    /// Cancels the countdown of the given item, e.g., because it was removed from view.
    ///
    /// Returns `true` if there was a countdown to cancel.
    pub fn cancel(&mut self, item_id: ItemId) -> bool {
        let removed = self.entries.remove(&item_id);
        if let Some(entry) = removed.as_ref()
            && matches!(entry.phase, EphemeralPhase::Armed { .. })
        {
            debug!("Cancelled ephemeral countdown of item {item_id}");
        }
        removed.is_some()
    }

    /// Cancels all countdowns.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The number of entries that are armed but have not fired yet.
    pub fn armed_count(&self) -> usize {
        self.entries.values()
            .filter(|e| matches!(e.phase, EphemeralPhase::Armed { .. }))
            .count()
    }
}

fn remaining(read_at: Millis, expire_timeout: Millis, now: Millis) -> f32 {
    if expire_timeout <= 0 {
        return 0.0;
    }
    let elapsed = now.saturating_sub(read_at) as f64;
    (1.0 - elapsed / expire_timeout as f64).clamp(0.0, 1.0) as f32
}

/// Moves the entry to `Fired` and sends its single deletion request.
fn fire(sender: &Sender<StoreRequest>, item_id: ItemId, entry: &mut EphemeralEntry) {
    if entry.phase == EphemeralPhase::Fired {
        return;
    }
    entry.phase = EphemeralPhase::Fired;
    let request = StoreRequest::Delete {
        id: entry.descriptor.clone(),
        reason: DeleteReason::Expired,
    };
    if sender.send(request).is_err() {
        error!("Failed to request deletion of expired item {item_id}: the store request channel is closed");
    }
}
