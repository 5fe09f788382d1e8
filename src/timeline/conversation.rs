//! The timeline of one conversation, as driven by the presentation thread.
//!
//! A [`ConversationTimeline`] owns the composed rows, the ephemeral scheduler and the
//! UI-shell inputs (select mode, open context menu). The conversation store talks to it
//! only through channels: it drains [`TimelineUpdate`]s in [`ConversationTimeline::process_timeline_updates`]
//! and sends [`StoreRequest`]s back. Time never advances on its own; the owner calls
//! [`ConversationTimeline::tick`] with the current time.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use crate::annotations::{badge_slots, BadgeSlot};
use crate::corners::CornerMask;
use crate::descriptor::{Annotation, Descriptor, DescriptorId, Millis};
use crate::ephemeral::{EphemeralPhase, EphemeralScheduler};
use crate::error::TimelineError;
use crate::item::state::{ItemState, Timestamps};
use crate::item::{Item, ItemId, ItemKind, ItemPayload, Side};
use crate::settings::TimelineSettings;
use crate::store::{DeleteReason, StoreRequest, TimelineUpdate};
use crate::utils::typing_notice_text;
use super::annotation_detail::AnnotationDetailComposer;
use super::composer::TimelineComposer;
use super::row::RowKind;
use super::separators::{DaySeparators, SeparatorPolicy};

/// Everything the list view needs to draw one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPresentation {
    /// The stable id of the row.
    pub id: ItemId,
    pub kind: ItemKind,
    pub content: RowContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowContent {
    Header,
    Footer,
    Typing { text: String },
    Time { day: NaiveDate },
    Name { peer: String },
    Item(ItemPresentation),
}

/// The presentation record of a real item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPresentation {
    pub state: ItemState,
    pub side: Side,
    pub corners: CornerMask,
    pub badges: Vec<BadgeSlot>,
    /// The remaining fraction of an armed ephemeral item's lifetime, for the progress ring.
    pub ephemeral_progress: Option<f32>,
    /// The fade-out progress (0–100) of a both-deleted item.
    pub delete_progress: u8,
    pub selected: bool,
    /// Whether the context menu is currently open on this item.
    pub highlighted: bool,
    /// The item this one replies to, if it is currently in the timeline.
    pub reply_to: Option<ItemId>,
    pub payload: ItemPayload,
}

/// What happened during one call to [`ConversationTimeline::tick`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutcome {
    /// Ephemeral items that expired and were removed.
    pub expired: Vec<ItemId>,
    /// Both-deleted items that finished fading out.
    pub faded_out: Vec<ItemId>,
    /// Ephemeral items whose progress ring moved, with their remaining fraction.
    pub progress: Vec<(ItemId, f32)>,
    /// Faded-out items whose deletion request could not be sent to the store.
    pub request_failures: Vec<ItemId>,
}

pub struct ConversationTimeline {
    composer: TimelineComposer,
    scheduler: EphemeralScheduler,
    /// Maps each descriptor shown in this timeline to its item.
    descriptors: HashMap<DescriptorId, ItemId>,
    update_receiver: Receiver<TimelineUpdate>,
    request_sender: Sender<StoreRequest>,
    settings: TimelineSettings,
    /// Whether the timeline is in multi-select mode.
    select_mode: bool,
    /// The item whose context menu is open, if any.
    menu_item: Option<ItemId>,
    /// Items whose both-deleted fade-out is running.
    fading: BTreeSet<ItemId>,
}

impl ConversationTimeline {
    /// Creates a timeline that uses the default separator policy for the given settings.
    pub fn new(
        settings: TimelineSettings,
        update_receiver: Receiver<TimelineUpdate>,
        request_sender: Sender<StoreRequest>,
    ) -> Self {
        let policy = DaySeparators::from_settings(&settings);
        Self::with_policy(settings, Box::new(policy), update_receiver, request_sender)
    }

    pub fn with_policy(
        settings: TimelineSettings,
        policy: Box<dyn SeparatorPolicy>,
        update_receiver: Receiver<TimelineUpdate>,
        request_sender: Sender<StoreRequest>,
    ) -> Self {
        Self {
            composer: TimelineComposer::new(policy, settings.appearance.group_runs),
            scheduler: EphemeralScheduler::new(request_sender.clone(), settings.progress_tick_interval_ms),
            descriptors: HashMap::new(),
            update_receiver,
            request_sender,
            settings,
            select_mode: false,
            menu_item: None,
            fading: BTreeSet::new(),
        }
    }

    pub fn settings(&self) -> &TimelineSettings {
        &self.settings
    }

    pub fn composer(&self) -> &TimelineComposer {
        &self.composer
    }

    pub fn row_count(&self) -> usize {
        self.composer.row_count()
    }

    pub fn row_kind(&self, position: usize) -> Option<ItemKind> {
        self.composer.row_kind(position)
    }

    pub fn row_stable_id(&self, position: usize) -> Option<ItemId> {
        self.composer.row_stable_id(position)
    }

    pub fn position_to_item(&self, position: usize) -> Option<&Item> {
        self.composer.position_to_item(position)
    }

    pub fn item_to_position(&self, item_id: ItemId) -> Option<usize> {
        self.composer.item_to_position(item_id)
    }

    pub fn item_for_descriptor(&self, id: &DescriptorId) -> Option<ItemId> {
        self.descriptors.get(id).copied()
    }

    pub fn needs_rebind(&self, position: usize) -> bool {
        self.composer.needs_rebind(position)
    }

    pub fn ephemeral_phase(&self, item_id: ItemId) -> EphemeralPhase {
        self.scheduler.phase(item_id)
    }

    /// Handles all pending updates from the conversation store,
    /// then removes any ephemeral item whose fire time has passed.
    ///
    /// Returns the number of updates that were processed.
    pub fn process_timeline_updates(&mut self, now: Millis) -> usize {
        let mut num_updates = 0;
        while let Ok(update) = self.update_receiver.try_recv() {
            num_updates += 1;
            match self.apply_update(update, now) {
                Ok(()) => { }
                // The store reports deletions of items we already removed ourselves, e.g., expired ones.
                Err(e @ TimelineError::UnknownDescriptor(_)) => debug!("Ignoring timeline update: {e}"),
                Err(e) => warn!("Failed to apply timeline update: {e}"),
            }
        }
        self.expire_due(now);
        num_updates
    }

    /// Applies a single update from the conversation store.
    pub fn apply_update(&mut self, update: TimelineUpdate, now: Millis) -> Result<(), TimelineError> {
        match update {
            TimelineUpdate::FirstUpdate { descriptors } => {
                self.clear();
                for descriptor in &descriptors {
                    if let Err(e) = self.add_descriptor(descriptor, now) {
                        warn!("Skipping descriptor in initial history: {e}");
                    }
                }
                debug!("Loaded {} items into the timeline", self.composer.item_count());
            }
            TimelineUpdate::NewDescriptor(descriptor) => {
                self.add_descriptor(&descriptor, now)?;
            }
            TimelineUpdate::DescriptorUpdated { id, timestamps, annotations } => {
                self.update_descriptor(&id, timestamps, annotations, now)?;
            }
            TimelineUpdate::DescriptorDeleted(id) => {
                self.remove_descriptor(&id)?;
            }
            TimelineUpdate::TypingUsers { users } => {
                self.composer.set_typing_users(users);
            }
            TimelineUpdate::HistoryCleared => self.clear(),
        }
        Ok(())
    }

    /// Adds a newly visible descriptor to the timeline.
    pub fn add_descriptor(&mut self, descriptor: &Descriptor, now: Millis) -> Result<ItemId, TimelineError> {
        if self.descriptors.contains_key(&descriptor.id) {
            return Err(TimelineError::DuplicateDescriptor(descriptor.id.clone()));
        }
        let item_id = self.composer.add_descriptor(descriptor);
        self.descriptors.insert(descriptor.id.clone(), item_id);
        self.after_change(item_id, now);
        Ok(item_id)
    }

    /// Refreshes the timestamps and annotations of a known descriptor in place.
    pub fn update_descriptor(
        &mut self,
        id: &DescriptorId,
        timestamps: Timestamps,
        annotations: Vec<Annotation>,
        now: Millis,
    ) -> Result<ItemId, TimelineError> {
        let item_id = self.item_for_descriptor(id)
            .ok_or_else(|| TimelineError::UnknownDescriptor(id.clone()))?;
        self.composer
            .update_item(item_id, |item| {
                item.update_timestamps(timestamps);
                item.update_annotations(annotations);
            })
            .ok_or(TimelineError::ItemNotFound(item_id))?;
        self.after_change(item_id, now);
        Ok(item_id)
    }

    /// Removes the item of a descriptor that the store has finally deleted.
    pub fn remove_descriptor(&mut self, id: &DescriptorId) -> Result<ItemId, TimelineError> {
        let item_id = self.item_for_descriptor(id)
            .ok_or_else(|| TimelineError::UnknownDescriptor(id.clone()))?;
        self.remove_item(item_id);
        Ok(item_id)
    }

    /// Removes every item, cancelling all countdowns.
    pub fn clear(&mut self) {
        self.composer.clear_items();
        self.scheduler.clear();
        self.descriptors.clear();
        self.fading.clear();
        self.menu_item = None;
    }

    /// Advances all time-driven behavior to `now`: expires ephemeral items and
    /// advances the fade-out of both-deleted items.
    pub fn tick(&mut self, now: Millis) -> TickOutcome {
        let ephemeral = self.scheduler.advance(now);
        self.remove_expired(&ephemeral.fired);
        for &(item_id, _) in &ephemeral.progress {
            self.composer.invalidate_item(item_id);
        }

        let duration = self.settings.fade_out_duration_ms;
        let mut faded_out = Vec::new();
        let mut request_failures = Vec::new();
        let fading: Vec<ItemId> = self.fading.iter().copied().collect();
        for item_id in fading {
            match self.composer.update_item(item_id, |item| item.advance_fade(now, duration)) {
                Some(false) => { }
                Some(true) => {
                    self.fading.remove(&item_id);
                    faded_out.push(item_id);
                    if let Some(descriptor) = self.composer.item(item_id).map(|i| i.descriptor_id().clone())
                        && let Err(e) = self.send_request(StoreRequest::Delete { id: descriptor, reason: DeleteReason::BothDeleted })
                    {
                        warn!("Item {item_id} finished fading out, but its deletion was not requested: {e}");
                        request_failures.push(item_id);
                    }
                }
                None => {
                    self.fading.remove(&item_id);
                }
            }
        }

        TickOutcome {
            expired: ephemeral.fired,
            faded_out,
            progress: ephemeral.progress,
            request_failures,
        }
    }

    /// Returns the presentation of the row at `position` and records it as bound.
    ///
    /// Ephemeral items whose fire time has passed are removed first, so an expired
    /// item is never presented, even if `tick()` has not caught up with `now` yet.
    pub fn bind(&mut self, position: usize, now: Millis) -> Option<RowPresentation> {
        self.expire_due(now);
        let row = self.composer.row(position)?;
        let content = match &row.kind {
            RowKind::Header => RowContent::Header,
            RowKind::Footer => RowContent::Footer,
            RowKind::Typing => RowContent::Typing { text: typing_notice_text(self.composer.typing_users()) },
            RowKind::Time { day } => RowContent::Time { day: *day },
            RowKind::Name { peer } => RowContent::Name { peer: peer.clone() },
            RowKind::Item(_) => RowContent::Item(self.present_item(self.composer.item(row.id)?, now)),
        };
        let presentation = RowPresentation { id: row.id, kind: row.kind.item_kind(), content };
        self.composer.mark_bound(position);
        Some(presentation)
    }

    fn present_item(&self, item: &Item, now: Millis) -> ItemPresentation {
        ItemPresentation {
            state: item.state(),
            side: item.side(),
            corners: item.corners(),
            badges: badge_slots(item.annotations(), item.side()),
            ephemeral_progress: self.scheduler.remaining_fraction(item.id(), now),
            delete_progress: item.delete_progress(now, self.settings.fade_out_duration_ms),
            selected: item.selected,
            highlighted: self.menu_item == Some(item.id()),
            reply_to: item.reply_to().and_then(|id| self.item_for_descriptor(id)),
            payload: item.payload.clone(),
        }
    }

    /// Called when the row at `position` became visible on screen.
    ///
    /// Requests an unread peer item to be marked as read, at most once per item.
    /// System notices are never marked as read.
    /// Returns `true` if a request was sent.
    pub fn mark_visible(&mut self, position: usize) -> Result<bool, TimelineError> {
        let len = self.composer.row_count();
        if position >= len {
            return Err(TimelineError::PositionOutOfBounds { position, len });
        }
        let Some(item) = self.composer.position_to_item(position) else { return Ok(false) };
        let unread = item.side() == Side::Peer
            && !item.kind().is_synthetic()
            && item.timestamps().read == 0
            && !item.state().is_deleted();
        if !unread || item.read_requested {
            return Ok(false);
        }
        let (item_id, descriptor) = (item.id(), item.descriptor_id().clone());
        self.send_request(StoreRequest::MarkRead(descriptor))?;
        self.composer.update_item(item_id, |item| item.read_requested = true);
        Ok(true)
    }

    pub fn select_mode(&self) -> bool {
        self.select_mode
    }

    /// Enters or leaves multi-select mode. Leaving it deselects everything.
    pub fn set_select_mode(&mut self, select_mode: bool) {
        self.select_mode = select_mode;
        if !select_mode {
            for item_id in self.selected_items() {
                self.composer.update_item(item_id, |item| item.selected = false);
            }
        }
    }

    /// Toggles the selection of an item, returning whether it is now selected.
    ///
    /// Outside of select mode, nothing can be selected.
    pub fn toggle_selected(&mut self, item_id: ItemId) -> Result<bool, TimelineError> {
        let select_mode = self.select_mode;
        self.composer
            .update_item(item_id, |item| {
                item.selected = select_mode && !item.selected;
                item.selected
            })
            .ok_or(TimelineError::ItemNotFound(item_id))
    }

    /// The selected items, in timeline order.
    pub fn selected_items(&self) -> Vec<ItemId> {
        self.composer.items_in_order()
            .filter(|item| item.selected)
            .map(Item::id)
            .collect()
    }

    /// Requests deletion of every selected item and leaves select mode.
    ///
    /// Returns the number of deletion requests sent.
    pub fn delete_selected(&mut self) -> Result<usize, TimelineError> {
        let requests: Vec<StoreRequest> = self.composer.items_in_order()
            .filter(|item| item.selected)
            .map(|item| StoreRequest::Delete { id: item.descriptor_id().clone(), reason: DeleteReason::User })
            .collect();
        let count = requests.len();
        for request in requests {
            self.send_request(request)?;
        }
        self.set_select_mode(false);
        Ok(count)
    }

    /// Opens the context menu on the given item, or closes it with `None`.
    pub fn set_menu_item(&mut self, item_id: Option<ItemId>) {
        let previous = std::mem::replace(&mut self.menu_item, item_id);
        for id in [previous, item_id].into_iter().flatten() {
            self.composer.invalidate_item(id);
        }
    }

    pub fn menu_item(&self) -> Option<ItemId> {
        self.menu_item
    }

    /// Deletes an item at the user's request.
    ///
    /// If the peer already deleted it, the item becomes both-deleted and fades out locally
    /// before its removal is requested; otherwise the store is asked to delete it right away.
    pub fn delete_item(&mut self, item_id: ItemId, now: Millis) -> Result<(), TimelineError> {
        let item = self.composer.item(item_id).ok_or(TimelineError::ItemNotFound(item_id))?;
        if item.state() == ItemState::PeerDeleted {
            self.composer.update_item(item_id, |item| item.force_both_deleted(now));
            self.fading.insert(item_id);
            return Ok(());
        }
        let descriptor = item.descriptor_id().clone();
        self.send_request(StoreRequest::Delete { id: descriptor, reason: DeleteReason::User })
    }

    /// Attaches a fetched link preview title to a link item.
    pub fn set_link_preview(&mut self, id: &DescriptorId, title: String) -> Result<(), TimelineError> {
        let item_id = self.item_for_descriptor(id)
            .ok_or_else(|| TimelineError::UnknownDescriptor(id.clone()))?;
        self.composer.update_item(item_id, |item| match &mut item.payload {
            ItemPayload::Link { preview_title, .. } => *preview_title = Some(title),
            _ => warn!("Ignoring link preview for non-link item {item_id}"),
        });
        Ok(())
    }

    /// Attaches an extracted waveform to an audio item.
    pub fn set_audio_waveform(&mut self, id: &DescriptorId, samples: Vec<u8>) -> Result<(), TimelineError> {
        let item_id = self.item_for_descriptor(id)
            .ok_or_else(|| TimelineError::UnknownDescriptor(id.clone()))?;
        self.composer.update_item(item_id, |item| match &mut item.payload {
            ItemPayload::Audio { waveform, .. } => *waveform = Some(samples),
            _ => warn!("Ignoring waveform for non-audio item {item_id}"),
        });
        Ok(())
    }

    /// Builds the reaction detail view of the given item.
    pub fn annotation_detail(&self, item_id: ItemId) -> Option<AnnotationDetailComposer> {
        self.composer.item(item_id).map(AnnotationDetailComposer::for_item)
    }

    /// Turns run grouping on or off, e.g., after the user changed their appearance settings.
    pub fn set_group_runs(&mut self, group_runs: bool) {
        self.settings.appearance.group_runs = group_runs;
        self.composer.set_group_runs(group_runs);
    }

    /// Starts the fade of a both-deleted item and arms the countdown of a newly read ephemeral one.
    fn after_change(&mut self, item_id: ItemId, now: Millis) {
        let Some(item) = self.composer.item(item_id) else { return };
        if item.state() == ItemState::BothDeleted
            && self.composer.update_item(item_id, |item| item.start_fade(now)) == Some(true)
        {
            debug!("Item {item_id} is deleted on both sides, fading it out");
            self.fading.insert(item_id);
        }
        let Some(item) = self.composer.item(item_id) else { return };
        if self.scheduler.observe(item, now) == EphemeralPhase::Fired {
            // Its fire time had already passed when it became read.
            self.remove_item(item_id);
        }
    }

    /// Fires the countdowns that are due at `now` and removes their items.
    fn expire_due(&mut self, now: Millis) {
        let fired = self.scheduler.fire_due(now);
        self.remove_expired(&fired);
    }

    fn remove_expired(&mut self, fired: &[ItemId]) {
        for &item_id in fired {
            debug!("Ephemeral item {item_id} expired, removing it from the timeline");
            self.remove_item(item_id);
        }
    }

    /// Removes an item from view, synchronously cancelling its countdowns.
    fn remove_item(&mut self, item_id: ItemId) {
        self.scheduler.cancel(item_id);
        self.fading.remove(&item_id);
        if self.menu_item == Some(item_id) {
            self.menu_item = None;
        }
        if let Some(item) = self.composer.remove_item(item_id) {
            self.descriptors.remove(item.descriptor_id());
        }
    }

    fn send_request(&self, request: StoreRequest) -> Result<(), TimelineError> {
        self.request_sender.send(request).map_err(|e| {
            error!("Failed to send {:?} to the conversation store: channel closed", e.into_inner());
            TimelineError::RequestChannelClosed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    use crate::annotations::{Badge, Edge};
    use crate::item::InfoKind;
    use crate::timeline::separators::NoSeparators;

    struct Harness {
        timeline: ConversationTimeline,
        updates: Sender<TimelineUpdate>,
        requests: Receiver<StoreRequest>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(TimelineSettings::default())
        }

        fn with_settings(settings: TimelineSettings) -> Self {
            let (updates, update_receiver) = unbounded();
            let (request_sender, requests) = unbounded();
            let timeline = ConversationTimeline::with_policy(settings, Box::new(NoSeparators), update_receiver, request_sender);
            Self { timeline, updates, requests }
        }

        fn send(&mut self, update: TimelineUpdate, now: Millis) {
            self.updates.send(update).unwrap();
            self.timeline.process_timeline_updates(now);
        }

        fn drain_requests(&self) -> Vec<StoreRequest> {
            self.requests.try_iter().collect()
        }

        fn presentation(&mut self, item_id: ItemId, now: Millis) -> ItemPresentation {
            let position = self.timeline.item_to_position(item_id).unwrap();
            match self.timeline.bind(position, now).unwrap().content {
                RowContent::Item(item) => item,
                other => panic!("expected an item row, got {other:?}"),
            }
        }
    }

    fn message(side: Side, created: Millis, sequence: u64) -> Descriptor {
        let origin = if side == Side::Local { "me" } else { "bob" };
        Descriptor::text(DescriptorId::new(origin, sequence), side, created, "hello")
    }

    #[test]
    fn test_self_run_split_by_peer_message() {
        let mut h = Harness::new();
        let s1 = message(Side::Local, 10, 1);
        let s2 = message(Side::Local, 20, 2);
        let p = message(Side::Peer, 30, 1);
        let s3 = message(Side::Local, 40, 3);
        h.send(TimelineUpdate::FirstUpdate { descriptors: vec![s1.clone(), s2.clone(), p.clone(), s3.clone()] }, 100);

        let corners = |h: &mut Harness, d: &Descriptor| {
            let id = h.timeline.item_for_descriptor(&d.id).unwrap();
            h.presentation(id, 100).corners
        };
        // The first item keeps its large outer top and joins the second at the bottom.
        assert_eq!(corners(&mut h, &s1), CornerMask::all() - CornerMask::BottomRight - CornerMask::BottomLargeMargin);
        // The second item joins the first and is split from the third by the peer message.
        assert_eq!(corners(&mut h, &s2), CornerMask::all() - CornerMask::TopRight - CornerMask::TopLargeMargin);
        assert_eq!(corners(&mut h, &p), CornerMask::all());
        assert_eq!(corners(&mut h, &s3), CornerMask::all());

        // Once the peer message goes away, the self run is contiguous again.
        h.send(TimelineUpdate::DescriptorDeleted(p.id.clone()), 100);
        assert_eq!(corners(&mut h, &s2), CornerMask::all() - CornerMask::TopRight - CornerMask::TopLargeMargin
            - CornerMask::BottomRight - CornerMask::BottomLargeMargin);
        assert_eq!(corners(&mut h, &s3), CornerMask::all() - CornerMask::TopRight - CornerMask::TopLargeMargin);
    }

    #[test]
    fn test_ephemeral_item_is_deleted_once() {
        const T: Millis = 10_000;
        let mut h = Harness::new();
        let mut descriptor = message(Side::Peer, 1_000, 1);
        descriptor.expire_timeout = 5_000;
        descriptor.timestamps.sent = 1_001;
        descriptor.timestamps.received = 1_002;
        h.send(TimelineUpdate::NewDescriptor(descriptor.clone()), 2_000);
        let item_id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();

        // Shown on screen: we ask the store to mark it read, only once.
        let position = h.timeline.item_to_position(item_id).unwrap();
        assert!(h.timeline.mark_visible(position).unwrap());
        assert!(!h.timeline.mark_visible(position).unwrap());
        assert_eq!(h.drain_requests(), vec![StoreRequest::MarkRead(descriptor.id.clone())]);

        // The store confirms the read at T.
        let mut timestamps = descriptor.timestamps;
        timestamps.read = T;
        h.send(TimelineUpdate::DescriptorUpdated { id: descriptor.id.clone(), timestamps, annotations: vec![] }, T);
        assert!(matches!(h.timeline.ephemeral_phase(item_id), EphemeralPhase::Armed { fire_at, .. } if fire_at == T + 5_000));
        assert_eq!(h.presentation(item_id, T).ephemeral_progress, Some(1.0));

        assert!(h.timeline.tick(T + 2_500).expired.is_empty());
        assert!(h.drain_requests().is_empty());

        let outcome = h.timeline.tick(T + 5_001);
        assert_eq!(outcome.expired, vec![item_id]);
        assert_eq!(h.drain_requests(), vec![StoreRequest::Delete { id: descriptor.id.clone(), reason: DeleteReason::Expired }]);
        assert_eq!(h.timeline.item_to_position(item_id), None);

        // The store's own deletion notice and later ticks change nothing.
        h.send(TimelineUpdate::DescriptorDeleted(descriptor.id.clone()), T + 6_000);
        assert!(h.timeline.tick(T + 20_000).expired.is_empty());
        assert!(h.drain_requests().is_empty());
    }

    #[test]
    fn test_removed_item_cancels_its_countdown() {
        let mut h = Harness::new();
        let mut descriptor = message(Side::Peer, 1_000, 1);
        descriptor.expire_timeout = 5_000;
        descriptor.timestamps.read = 2_000;
        h.send(TimelineUpdate::NewDescriptor(descriptor.clone()), 2_000);
        let item_id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();
        assert!(matches!(h.timeline.ephemeral_phase(item_id), EphemeralPhase::Armed { .. }));

        h.send(TimelineUpdate::DescriptorDeleted(descriptor.id.clone()), 3_000);
        assert_eq!(h.timeline.ephemeral_phase(item_id), EphemeralPhase::Unarmed);
        assert!(h.timeline.tick(10_000).expired.is_empty());
        assert!(h.drain_requests().is_empty());
        assert_eq!(h.timeline.item_to_position(item_id), None);
        assert!(h.timeline.position_to_item(1).is_none());
    }

    #[test]
    fn test_expired_before_arming_is_deleted_immediately() {
        let mut h = Harness::new();
        let mut descriptor = message(Side::Peer, 1_000, 1);
        descriptor.expire_timeout = 5_000;
        descriptor.timestamps.read = 2_000;
        h.send(TimelineUpdate::FirstUpdate { descriptors: vec![descriptor.clone()] }, 60_000);
        assert_eq!(h.drain_requests(), vec![StoreRequest::Delete { id: descriptor.id.clone(), reason: DeleteReason::Expired }]);
        assert_eq!(h.timeline.item_for_descriptor(&descriptor.id), None);
        assert_eq!(h.timeline.row_count(), 2);
    }

    #[test]
    fn test_bind_after_fire_time_removes_expired_item() {
        let mut h = Harness::new();
        let mut descriptor = message(Side::Peer, 1_000, 1);
        descriptor.expire_timeout = 5_000;
        descriptor.timestamps.read = 1_000;
        h.send(TimelineUpdate::NewDescriptor(descriptor.clone()), 1_000);
        let item_id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();
        let position = h.timeline.item_to_position(item_id).unwrap();
        assert!(h.drain_requests().is_empty());

        // The list view binds the row long after its fire time, before any tick.
        let row = h.timeline.bind(position, 60_000).unwrap();
        assert_ne!(row.id, item_id);
        assert!(!matches!(row.content, RowContent::Item(_)));
        assert_eq!(h.drain_requests(), vec![StoreRequest::Delete { id: descriptor.id.clone(), reason: DeleteReason::Expired }]);
        assert_eq!(h.timeline.item_to_position(item_id), None);
        assert!(h.timeline.tick(60_000).expired.is_empty());
        assert!(h.drain_requests().is_empty());
    }

    #[test]
    fn test_processing_updates_removes_expired_items() {
        let mut h = Harness::new();
        let mut descriptor = message(Side::Peer, 1_000, 1);
        descriptor.expire_timeout = 5_000;
        descriptor.timestamps.read = 1_000;
        h.send(TimelineUpdate::NewDescriptor(descriptor.clone()), 1_000);

        h.send(TimelineUpdate::TypingUsers { users: vec!["bob".into()] }, 7_000);
        assert_eq!(h.timeline.item_for_descriptor(&descriptor.id), None);
        assert_eq!(h.drain_requests(), vec![StoreRequest::Delete { id: descriptor.id, reason: DeleteReason::Expired }]);
        assert_eq!(h.timeline.row_count(), 3);
    }

    #[test]
    fn test_info_notices_are_never_marked_read() {
        let mut h = Harness::new();
        let a = message(Side::Peer, 10, 1);
        let info = Descriptor {
            payload: ItemPayload::Info { info: InfoKind::PeerJoined },
            ..message(Side::Peer, 20, 2)
        };
        let b = message(Side::Peer, 30, 3);
        h.send(TimelineUpdate::FirstUpdate { descriptors: vec![a.clone(), info.clone(), b.clone()] }, 100);

        let info_id = h.timeline.item_for_descriptor(&info.id).unwrap();
        let info_position = h.timeline.item_to_position(info_id).unwrap();
        assert_eq!(h.timeline.row_kind(info_position), Some(ItemKind::Info(InfoKind::PeerJoined)));
        assert!(!h.timeline.mark_visible(info_position).unwrap());
        for descriptor in [&a, &b] {
            let id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();
            let position = h.timeline.item_to_position(id).unwrap();
            assert!(h.timeline.mark_visible(position).unwrap());
            // The notice splits the peer's run.
            assert_eq!(h.presentation(id, 100).corners, CornerMask::all());
        }
        assert_eq!(h.presentation(info_id, 100).corners, CornerMask::all());
        assert_eq!(h.drain_requests(), vec![StoreRequest::MarkRead(a.id), StoreRequest::MarkRead(b.id)]);
    }

    #[test]
    fn test_annotations_become_badges() {
        let mut h = Harness::new();
        let mut descriptor = message(Side::Peer, 1_000, 1);
        descriptor.annotations = vec![
            Annotation::forwarded(),
            Annotation::like(2),
            Annotation::like(2),
            Annotation::like(5),
        ];
        h.send(TimelineUpdate::NewDescriptor(descriptor.clone()), 2_000);
        let item_id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();
        let badges = h.presentation(item_id, 2_000).badges;
        assert_eq!(badges.len(), 3);
        assert_eq!(badges[0].badge, Badge::Forwarded);
        assert!(badges.iter().all(|slot| slot.edge == Edge::Left));
        let reactions: Vec<(i64, usize, usize)> = badges.iter()
            .filter_map(|slot| match slot.badge {
                Badge::Reaction(r) => Some((r.reaction.code(), r.count, slot.index)),
                _ => None,
            })
            .collect();
        assert_eq!(reactions, vec![(2, 2, 1), (5, 1, 2)]);

        let detail = h.timeline.annotation_detail(item_id).unwrap();
        assert_eq!(detail.row_count(), 1 + 1 + 3);
    }

    #[test]
    fn test_positions_roundtrip_for_every_configuration() {
        const DAY: Millis = 86_400_000;
        for typing in [false, true] {
            for count in [0u64, 1, 4] {
                let (updates, update_receiver) = unbounded();
                let (request_sender, _requests) = unbounded();
                let settings = TimelineSettings { group_chat: true, ..TimelineSettings::default() };
                let mut timeline = ConversationTimeline::new(settings, update_receiver, request_sender);
                for i in 0..count {
                    let side = if i % 2 == 0 { Side::Peer } else { Side::Local };
                    updates.send(TimelineUpdate::NewDescriptor(message(side, i as Millis * DAY, i))).unwrap();
                }
                if typing {
                    updates.send(TimelineUpdate::TypingUsers { users: vec!["bob".into()] }).unwrap();
                }
                timeline.process_timeline_updates(0);

                let len = timeline.row_count();
                assert_eq!(timeline.row_kind(0), Some(ItemKind::Header));
                assert_eq!(timeline.row_kind(len - 1), Some(ItemKind::Footer));
                assert_eq!(timeline.row_kind(len - 2) == Some(ItemKind::Typing), typing);
                let mut seen = 0;
                for position in 0..len {
                    if let Some(item) = timeline.position_to_item(position) {
                        assert_eq!(timeline.item_to_position(item.id()), Some(position));
                        seen += 1;
                    }
                }
                assert_eq!(seen, count);
            }
        }
    }

    #[test]
    fn test_typing_row_text() {
        let mut h = Harness::new();
        h.send(TimelineUpdate::TypingUsers { users: vec!["Ann".into(), "Bo".into()] }, 0);
        let presentation = h.timeline.bind(1, 0).unwrap();
        assert_eq!(presentation.kind, ItemKind::Typing);
        assert_eq!(presentation.content, RowContent::Typing { text: "Ann and Bo are typing ".into() });
        assert!(!h.timeline.needs_rebind(1));
        h.send(TimelineUpdate::TypingUsers { users: vec![] }, 0);
        assert_eq!(h.timeline.row_count(), 2);
    }

    #[test]
    fn test_both_deleted_fades_out_then_requests_deletion() {
        let mut h = Harness::new();
        let descriptor = message(Side::Local, 1_000, 1);
        h.send(TimelineUpdate::NewDescriptor(descriptor.clone()), 1_000);
        let item_id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();

        let mut timestamps = descriptor.timestamps;
        timestamps.deleted = 2_000;
        timestamps.peer_deleted = 2_000;
        h.send(TimelineUpdate::DescriptorUpdated { id: descriptor.id.clone(), timestamps, annotations: vec![] }, 2_000);
        assert_eq!(h.presentation(item_id, 2_500).delete_progress, 50);
        // Refreshing with the same timestamps must not restart the fade.
        h.send(TimelineUpdate::DescriptorUpdated { id: descriptor.id.clone(), timestamps, annotations: vec![] }, 2_600);
        assert_eq!(h.presentation(item_id, 2_600).delete_progress, 60);

        assert!(h.timeline.tick(2_900).faded_out.is_empty());
        assert_eq!(h.timeline.tick(3_000).faded_out, vec![item_id]);
        assert!(h.timeline.tick(4_000).faded_out.is_empty());
        assert_eq!(h.drain_requests(), vec![StoreRequest::Delete { id: descriptor.id, reason: DeleteReason::BothDeleted }]);
    }

    #[test]
    fn test_fade_out_reports_unsent_deletion() {
        let (_updates, update_receiver) = unbounded();
        let (request_sender, requests) = unbounded();
        let mut timeline = ConversationTimeline::with_policy(
            TimelineSettings::default(), Box::new(NoSeparators), update_receiver, request_sender,
        );
        let mut descriptor = message(Side::Local, 1_000, 1);
        descriptor.timestamps.deleted = 2_000;
        descriptor.timestamps.peer_deleted = 2_000;
        let item_id = timeline.add_descriptor(&descriptor, 2_000).unwrap();

        drop(requests);
        let outcome = timeline.tick(3_000);
        assert_eq!(outcome.faded_out, vec![item_id]);
        assert_eq!(outcome.request_failures, vec![item_id]);
        assert!(timeline.tick(4_000).request_failures.is_empty());
    }

    #[test]
    fn test_deleting_a_peer_deleted_item_fades_it() {
        let mut h = Harness::new();
        let mut descriptor = message(Side::Local, 1_000, 1);
        descriptor.timestamps.peer_deleted = 1_500;
        h.send(TimelineUpdate::NewDescriptor(descriptor.clone()), 2_000);
        let item_id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();
        assert_eq!(h.presentation(item_id, 2_000).state, ItemState::PeerDeleted);

        h.timeline.delete_item(item_id, 2_000).unwrap();
        assert_eq!(h.presentation(item_id, 2_000).state, ItemState::BothDeleted);
        assert!(h.drain_requests().is_empty());
        assert_eq!(h.timeline.tick(3_000).faded_out, vec![item_id]);
    }

    #[test]
    fn test_select_and_delete() {
        let mut h = Harness::new();
        let a = message(Side::Local, 10, 1);
        let b = message(Side::Peer, 20, 1);
        h.send(TimelineUpdate::FirstUpdate { descriptors: vec![a.clone(), b.clone()] }, 100);
        let a_id = h.timeline.item_for_descriptor(&a.id).unwrap();
        let b_id = h.timeline.item_for_descriptor(&b.id).unwrap();

        assert!(!h.timeline.toggle_selected(a_id).unwrap());
        h.timeline.set_select_mode(true);
        assert!(h.timeline.toggle_selected(a_id).unwrap());
        assert!(h.timeline.toggle_selected(b_id).unwrap());
        assert!(!h.timeline.toggle_selected(b_id).unwrap());
        assert!(h.presentation(a_id, 100).selected);
        assert_eq!(h.timeline.delete_selected().unwrap(), 1);
        assert_eq!(h.drain_requests(), vec![StoreRequest::Delete { id: a.id, reason: DeleteReason::User }]);
        assert!(!h.timeline.select_mode());
        assert!(h.timeline.selected_items().is_empty());
    }

    #[test]
    fn test_menu_highlight_and_reply_target() {
        let mut h = Harness::new();
        let original = message(Side::Peer, 10, 1);
        let mut reply = message(Side::Local, 20, 1);
        reply.reply_to = Some(original.id.clone());
        h.send(TimelineUpdate::FirstUpdate { descriptors: vec![original.clone(), reply.clone()] }, 100);
        let original_id = h.timeline.item_for_descriptor(&original.id).unwrap();
        let reply_id = h.timeline.item_for_descriptor(&reply.id).unwrap();

        assert_eq!(h.presentation(reply_id, 100).reply_to, Some(original_id));
        h.timeline.set_menu_item(Some(reply_id));
        assert!(h.presentation(reply_id, 100).highlighted);
        assert!(!h.presentation(original_id, 100).highlighted);
    }

    #[test]
    fn test_async_media_results() {
        let mut h = Harness::new();
        let mut link = message(Side::Peer, 10, 1);
        link.payload = ItemPayload::Link { url: "https://example.org".into(), preview_title: None };
        h.send(TimelineUpdate::NewDescriptor(link.clone()), 100);
        h.timeline.set_link_preview(&link.id, "Example".into()).unwrap();
        let item_id = h.timeline.item_for_descriptor(&link.id).unwrap();
        assert_eq!(
            h.presentation(item_id, 100).payload,
            ItemPayload::Link { url: "https://example.org".into(), preview_title: Some("Example".into()) },
        );
        let unknown = DescriptorId::new("bob", 99);
        assert_eq!(
            h.timeline.set_audio_waveform(&unknown, vec![1, 2, 3]),
            Err(TimelineError::UnknownDescriptor(unknown.clone())),
        );
    }

    #[test]
    fn test_errors() {
        let mut h = Harness::new();
        let descriptor = message(Side::Local, 10, 1);
        h.timeline.add_descriptor(&descriptor, 0).unwrap();
        assert_eq!(
            h.timeline.add_descriptor(&descriptor, 0),
            Err(TimelineError::DuplicateDescriptor(descriptor.id.clone())),
        );
        assert_eq!(
            h.timeline.mark_visible(10),
            Err(TimelineError::PositionOutOfBounds { position: 10, len: 3 }),
        );
        drop(h.requests);
        let item_id = h.timeline.item_for_descriptor(&descriptor.id).unwrap();
        assert_eq!(h.timeline.delete_item(item_id, 0), Err(TimelineError::RequestChannelClosed));
    }

    #[test]
    fn test_history_cleared() {
        let mut h = Harness::new();
        h.send(TimelineUpdate::FirstUpdate { descriptors: vec![message(Side::Local, 10, 1), message(Side::Peer, 20, 1)] }, 0);
        assert_eq!(h.timeline.row_count(), 4);
        h.send(TimelineUpdate::HistoryCleared, 0);
        assert_eq!(h.timeline.row_count(), 2);
        assert_eq!(h.timeline.item_for_descriptor(&DescriptorId::new("me", 1)), None);
    }
}
