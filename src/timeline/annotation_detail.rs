//! The row addressing of the reaction detail view.
//!
//! The detail view shows a fixed list of items (usually just the one whose reactions
//! were tapped), followed by a section with one row per individual reaction:
//!
//! ```text
//! item 0 .. item n-1
//! [section title]          ← only if there is at least one reaction
//! reaction 0 .. reaction m-1
//! ```
//!
//! There is no header, footer or typing row here.

use std::collections::HashMap;

use crate::annotations::Reaction;
use crate::descriptor::AnnotationKind;
use crate::item::{Item, ItemId};

/// A single reaction given by one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationDetail {
    pub reaction: Reaction,
    /// Who gave this reaction, if known.
    pub peer: Option<String>,
}

/// What a row of the detail view displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailRow {
    Item(ItemId),
    SectionTitle,
    /// The reaction at the given index of the annotation section.
    Annotation(usize),
}

#[derive(Debug, Default)]
pub struct AnnotationDetailComposer {
    items: Vec<ItemId>,
    item_positions: HashMap<ItemId, usize>,
    annotations: Vec<AnnotationDetail>,
}

impl AnnotationDetailComposer {
    pub fn new(items: Vec<ItemId>, annotations: Vec<AnnotationDetail>) -> Self {
        let item_positions = items.iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        Self { items, item_positions, annotations }
    }

    /// Builds the detail view of a single item's reactions, in the order they were given.
    pub fn for_item(item: &Item) -> Self {
        let annotations = item.raw_annotations().iter()
            .filter(|a| a.kind == AnnotationKind::Like)
            .map(|a| AnnotationDetail {
                reaction: Reaction::from_code(a.value),
                peer: a.peer.clone(),
            })
            .collect();
        Self::new(vec![item.id()], annotations)
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn annotations(&self) -> &[AnnotationDetail] {
        &self.annotations
    }

    fn has_section(&self) -> bool {
        !self.annotations.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.items.len() + if self.has_section() { 1 + self.annotations.len() } else { 0 }
    }

    pub fn position_to_row(&self, position: usize) -> Option<DetailRow> {
        if let Some(id) = self.items.get(position) {
            return Some(DetailRow::Item(*id));
        }
        if !self.has_section() {
            return None;
        }
        match position - self.items.len() {
            0 => Some(DetailRow::SectionTitle),
            n if n <= self.annotations.len() => Some(DetailRow::Annotation(n - 1)),
            _ => None,
        }
    }

    pub fn row_to_position(&self, row: DetailRow) -> Option<usize> {
        match row {
            DetailRow::Item(id) => self.item_positions.get(&id).copied(),
            DetailRow::SectionTitle => self.has_section().then_some(self.items.len()),
            DetailRow::Annotation(index) => (index < self.annotations.len())
                .then(|| self.items.len() + 1 + index),
        }
    }

    /// Returns the reaction displayed at `position`, if that row is a reaction row.
    pub fn annotation_at(&self, position: usize) -> Option<&AnnotationDetail> {
        match self.position_to_row(position)? {
            DetailRow::Annotation(index) => self.annotations.get(index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Annotation, Descriptor, DescriptorId};
    use crate::item::{IdGenerator, Side};

    fn detail(code: i64) -> AnnotationDetail {
        AnnotationDetail { reaction: Reaction::from_code(code), peer: None }
    }

    #[test]
    fn test_addressing_is_consistent() {
        let composer = AnnotationDetailComposer::new(
            vec![ItemId(7), ItemId(3)],
            vec![detail(2), detail(5), detail(99)],
        );
        assert_eq!(composer.row_count(), 6);
        for position in 0..composer.row_count() {
            let row = composer.position_to_row(position).unwrap();
            assert_eq!(composer.row_to_position(row), Some(position));
        }
        assert_eq!(composer.position_to_row(2), Some(DetailRow::SectionTitle));
        assert_eq!(composer.position_to_row(5), Some(DetailRow::Annotation(2)));
        assert!(composer.annotation_at(5).unwrap().reaction.is_unknown());
        assert_eq!(composer.position_to_row(6), None);
        assert_eq!(composer.row_to_position(DetailRow::Item(ItemId(1))), None);
        assert_eq!(composer.row_to_position(DetailRow::Annotation(3)), None);
    }

    #[test]
    fn test_no_section_without_reactions() {
        let composer = AnnotationDetailComposer::new(vec![ItemId(1)], vec![]);
        assert_eq!(composer.row_count(), 1);
        assert_eq!(composer.position_to_row(1), None);
        assert_eq!(composer.row_to_position(DetailRow::SectionTitle), None);
    }

    #[test]
    fn test_for_item_lists_individual_reactions() {
        let mut ids = IdGenerator::new();
        let mut descriptor = Descriptor::text(DescriptorId::new("me", 1), Side::Local, 10, "hi");
        descriptor.annotations = vec![
            Annotation::forwarded(),
            Annotation::like_from(2, "bob"),
            Annotation::like_from(2, "alice"),
            Annotation::like(5),
        ];
        let item = Item::from_descriptor(&mut ids, &descriptor);
        let composer = AnnotationDetailComposer::for_item(&item);
        assert_eq!(composer.row_count(), 1 + 1 + 3);
        assert_eq!(composer.position_to_row(0), Some(DetailRow::Item(item.id())));
        assert_eq!(composer.annotation_at(2).unwrap().peer.as_deref(), Some("bob"));
        assert_eq!(composer.annotation_at(3).unwrap().peer.as_deref(), Some("alice"));
        assert_eq!(composer.annotation_at(4), Some(&detail(5)));
    }
}
