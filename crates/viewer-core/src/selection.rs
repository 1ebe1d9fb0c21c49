//! Multi-page drag selection
//!
//! ```text
//! Idle --down--> Dragging(page) --up+extend--> Queued --down--> Dragging(page')
//!                     |                                              |
//!                     +-------------------up-------------------------+--> Committing --finish--> Idle
//! ```
//!
//! Each pointer-up converts its drag rectangle to document space right away
//! and appends it to the queue for that page, so a zoom change between drags
//! cannot move an earlier box. A plain pointer-up hands the whole queue to
//! the caller as one [`QueuedSelection`] and clears it.

use crate::error::SelectionError;
use crate::mapper::PageCoordinateMapper;
use annotator_core::{Annotation, CoreError, CoreResult, DocBox, Label, ScreenBox, SpanDraft, TokenIndex};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SelectionPhase {
    #[default]
    Idle,
    /// Anchor and cursor are screen points on `page`
    Dragging { page: u32, anchor: (f64, f64), cursor: (f64, f64) },
    /// At least one box queued, waiting for the next drag
    Queued,
    /// Queue handed off, waiting for [`SelectionMachine::finish_commit`]
    Committing,
}

/// Everything selected in one multi-page gesture
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSelection {
    pub label: Label,
    /// Normalized document-space drag boxes per page
    pub boxes: BTreeMap<u32, Vec<DocBox>>,
}

impl QueuedSelection {
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.boxes.keys().copied()
    }

    /// Resolve every queued box and merge the result into one annotation
    ///
    /// `index_for` supplies each page's token layer. Returns `None` when the
    /// selection covered nothing worth annotating.
    pub fn into_annotation(
        self,
        index_for: impl Fn(u32) -> Arc<TokenIndex>,
    ) -> CoreResult<Option<Annotation>> {
        let mut draft = SpanDraft::new(self.label);
        let mut indexes = BTreeMap::new();

        for (page, boxes) in self.boxes {
            let index = index_for(page);
            for doc_box in &boxes {
                draft.add_selection(&index, index.resolve(doc_box))?;
            }
            indexes.insert(page, index);
        }

        Ok(draft.build(|page, ids| {
            indexes.get(&page).ok_or_else(|| CoreError::not_found("page", page))?.bounds_of(ids)
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerUp {
    /// Degenerate drag (a click); nothing queued
    Ignored,
    Queued { page: u32, queued_pages: usize },
    Commit(QueuedSelection),
}

#[derive(Debug, Default)]
pub struct SelectionMachine {
    phase: SelectionPhase,
    label: Option<Label>,
    queue: BTreeMap<u32, Vec<DocBox>>,
}

impl SelectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &SelectionPhase {
        &self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == SelectionPhase::Idle
    }

    /// Pages with at least one queued box
    pub fn queued_pages(&self) -> Vec<u32> {
        self.queue.keys().copied().collect()
    }

    pub fn queued_boxes(&self, page: u32) -> &[DocBox] {
        self.queue.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Start a drag on `page` at screen point `at`
    ///
    /// The label is captured when a new gesture starts; later drags in the
    /// same gesture reuse it.
    pub fn pointer_down(
        &mut self,
        page: u32,
        at: (f64, f64),
        can_annotate: bool,
        active_label: Option<&Label>,
    ) -> Result<(), SelectionError> {
        if self.phase == SelectionPhase::Committing {
            return Err(SelectionError::Busy);
        }
        if !can_annotate {
            return Err(SelectionError::NotPermitted);
        }

        if self.label.is_none() || self.queue.is_empty() {
            let label = active_label.ok_or(SelectionError::NoActiveLabel)?;
            self.label = Some(label.clone());
        }

        self.phase = SelectionPhase::Dragging { page, anchor: at, cursor: at };
        Ok(())
    }

    /// Move the cursor; returns the live rubber-band rectangle
    pub fn pointer_move(&mut self, at: (f64, f64)) -> Option<ScreenBox> {
        match &mut self.phase {
            SelectionPhase::Dragging { anchor, cursor, .. } => {
                *cursor = at;
                Some(ScreenBox::from_corners(*anchor, at))
            }
            _ => None,
        }
    }

    /// Current drag rectangle, if dragging
    pub fn live_box(&self) -> Option<(u32, ScreenBox)> {
        match &self.phase {
            SelectionPhase::Dragging { page, anchor, cursor } => {
                Some((*page, ScreenBox::from_corners(*anchor, *cursor)))
            }
            _ => None,
        }
    }

    /// Finish the drag at `at` using the dragged page's mapper
    ///
    /// With `extend` held the box is queued and the gesture stays open;
    /// otherwise the queue is handed back for committing.
    pub fn pointer_up(
        &mut self,
        mapper: &PageCoordinateMapper,
        at: (f64, f64),
        extend: bool,
    ) -> Result<PointerUp, SelectionError> {
        let (page, anchor) = match &self.phase {
            SelectionPhase::Dragging { page, anchor, .. } => (*page, *anchor),
            _ => return Err(SelectionError::NotDragging),
        };

        if mapper.page() != page {
            self.phase = self.resting_phase();
            return Err(SelectionError::PageMismatch { started: page, ended: mapper.page() });
        }

        let screen = ScreenBox::from_corners(anchor, at);
        let queued = if screen.width() > 0.0 || screen.height() > 0.0 {
            let doc = match mapper.screen_to_doc(&screen) {
                Ok(doc) => doc.normalize(),
                Err(err) => {
                    self.phase = self.resting_phase();
                    return Err(err.into());
                }
            };
            self.queue.entry(page).or_default().push(doc);
            true
        } else {
            false
        };

        if extend || self.queue.is_empty() {
            self.phase = self.resting_phase();
            if !queued {
                return Ok(PointerUp::Ignored);
            }
            tracing::debug!(page, pages = self.queue.len(), "selection box queued");
            return Ok(PointerUp::Queued { page, queued_pages: self.queue.len() });
        }

        let label = self.label.take().ok_or(SelectionError::NoActiveLabel)?;
        let boxes = std::mem::take(&mut self.queue);
        self.phase = SelectionPhase::Committing;

        tracing::debug!(pages = boxes.len(), label = %label.id, "committing selection");
        Ok(PointerUp::Commit(QueuedSelection { label, boxes }))
    }

    /// Return to idle once the commit finished, successfully or not
    pub fn finish_commit(&mut self) {
        if self.phase == SelectionPhase::Committing {
            self.phase = SelectionPhase::Idle;
        }
    }

    /// Abandon the gesture and drop the queue
    pub fn cancel(&mut self) {
        self.phase = SelectionPhase::Idle;
        self.label = None;
        self.queue.clear();
    }

    fn resting_phase(&self) -> SelectionPhase {
        if self.queue.is_empty() {
            SelectionPhase::Idle
        } else {
            SelectionPhase::Queued
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::CanvasOffset;
    use crate::zoom::{ZoomBounds, ZoomLevel};
    use annotator_core::{AnnotationKind, Token};

    fn words(page: u32) -> Arc<TokenIndex> {
        let tokens = ["alpha", "beta", "gamma", "delta"]
            .iter()
            .enumerate()
            .map(|(i, w)| Token::new(i as u32, i as f64 * 20.0, 0.0, 18.0, 10.0).with_text(*w))
            .collect();
        Arc::new(TokenIndex::new(page, tokens))
    }

    fn mapper(index: Arc<TokenIndex>, zoom: &ZoomLevel) -> PageCoordinateMapper {
        PageCoordinateMapper::new(index, zoom, CanvasOffset::default())
    }

    fn label() -> Label {
        Label::span("L1", "Party")
    }

    #[test]
    fn test_pointer_down_requires_permission_and_label() {
        let mut machine = SelectionMachine::new();

        assert_eq!(machine.pointer_down(0, (0.0, 0.0), false, Some(&label())), Err(SelectionError::NotPermitted));
        assert_eq!(machine.pointer_down(0, (0.0, 0.0), true, None), Err(SelectionError::NoActiveLabel));
        assert!(machine.is_idle());

        machine.pointer_down(0, (0.0, 0.0), true, Some(&label())).unwrap();
        assert!(matches!(machine.phase(), SelectionPhase::Dragging { page: 0, .. }));
    }

    #[test]
    fn test_pointer_up_without_drag_fails() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let mut machine = SelectionMachine::new();

        let result = machine.pointer_up(&mapper(words(0), &zoom), (10.0, 10.0), false);
        assert_eq!(result, Err(SelectionError::NotDragging));
    }

    #[test]
    fn test_extend_queues_and_plain_up_commits_every_page() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let (first, second) = (words(1), words(2));
        let mut machine = SelectionMachine::new();

        machine.pointer_down(1, (0.0, 0.0), true, Some(&label())).unwrap();
        machine.pointer_move((30.0, 10.0));
        let up = machine.pointer_up(&mapper(first.clone(), &zoom), (30.0, 10.0), true).unwrap();
        assert_eq!(up, PointerUp::Queued { page: 1, queued_pages: 1 });
        assert_eq!(machine.phase(), &SelectionPhase::Queued);

        machine.pointer_down(2, (40.0, 0.0), true, None).unwrap();
        let up = machine.pointer_up(&mapper(second.clone(), &zoom), (80.0, 10.0), false).unwrap();

        let PointerUp::Commit(selection) = up else {
            panic!("expected commit, got {up:?}");
        };
        assert_eq!(selection.pages().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(machine.phase(), &SelectionPhase::Committing);
        assert!(machine.queued_pages().is_empty());

        let annotation = selection
            .into_annotation(|page| if page == 1 { first.clone() } else { second.clone() })
            .unwrap()
            .unwrap();
        assert_eq!(annotation.kind, AnnotationKind::TokenAligned);
        assert_eq!(annotation.token_ids_on(1), &[0, 1]);
        assert_eq!(annotation.token_ids_on(2), &[2, 3]);
        assert_eq!(annotation.raw_text, "alpha beta gamma delta");

        machine.finish_commit();
        assert!(machine.is_idle());
    }

    #[test]
    fn test_second_drag_on_same_page_accumulates() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let page = words(0);
        let mut machine = SelectionMachine::new();

        machine.pointer_down(0, (0.0, 0.0), true, Some(&label())).unwrap();
        machine.pointer_up(&mapper(page.clone(), &zoom), (10.0, 10.0), true).unwrap();
        machine.pointer_down(0, (60.0, 0.0), true, None).unwrap();
        machine.pointer_up(&mapper(page.clone(), &zoom), (80.0, 10.0), true).unwrap();

        assert_eq!(machine.queued_pages(), vec![0]);
        assert_eq!(machine.queued_boxes(0).len(), 2);
    }

    #[test]
    fn test_queued_boxes_ignore_later_zoom_changes() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let page = words(0);
        let mut machine = SelectionMachine::new();

        machine.pointer_down(0, (0.0, 0.0), true, Some(&label())).unwrap();
        machine.pointer_up(&mapper(page.clone(), &zoom), (30.0, 10.0), true).unwrap();

        zoom.request(2.0).unwrap();
        assert_eq!(machine.queued_boxes(0), &[DocBox::new(0.0, 0.0, 30.0, 10.0)]);
    }

    #[test]
    fn test_wrong_page_mapper_is_rejected() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let mut machine = SelectionMachine::new();

        machine.pointer_down(3, (0.0, 0.0), true, Some(&label())).unwrap();
        let result = machine.pointer_up(&mapper(words(4), &zoom), (10.0, 10.0), false);

        assert_eq!(result, Err(SelectionError::PageMismatch { started: 3, ended: 4 }));
        assert!(machine.is_idle());
    }

    #[test]
    fn test_click_without_movement_is_ignored() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let mut machine = SelectionMachine::new();

        machine.pointer_down(0, (5.0, 5.0), true, Some(&label())).unwrap();
        let up = machine.pointer_up(&mapper(words(0), &zoom), (5.0, 5.0), false).unwrap();

        assert_eq!(up, PointerUp::Ignored);
        assert!(machine.is_idle());
    }

    #[test]
    fn test_cancel_discards_queue() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let mut machine = SelectionMachine::new();

        machine.pointer_down(0, (0.0, 0.0), true, Some(&label())).unwrap();
        machine.pointer_up(&mapper(words(0), &zoom), (30.0, 10.0), true).unwrap();
        machine.cancel();

        assert!(machine.is_idle());
        assert!(machine.queued_pages().is_empty());
        assert_eq!(machine.pointer_down(0, (0.0, 0.0), true, None), Err(SelectionError::NoActiveLabel));
    }

    #[test]
    fn test_pointer_down_while_committing_is_busy() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let mut machine = SelectionMachine::new();

        machine.pointer_down(0, (0.0, 0.0), true, Some(&label())).unwrap();
        machine.pointer_up(&mapper(words(0), &zoom), (30.0, 10.0), false).unwrap();

        assert_eq!(machine.pointer_down(0, (0.0, 0.0), true, Some(&label())), Err(SelectionError::Busy));
    }

    #[test]
    fn test_unavailable_pages_commit_as_freeform() {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        let blank = Arc::new(TokenIndex::unavailable(0));
        let mut machine = SelectionMachine::new();

        machine.pointer_down(0, (10.0, 10.0), true, Some(&label())).unwrap();
        let up = machine.pointer_up(&mapper(blank.clone(), &zoom), (50.0, 30.0), false).unwrap();

        let PointerUp::Commit(selection) = up else {
            panic!("expected commit, got {up:?}");
        };
        let annotation = selection.into_annotation(|_| blank.clone()).unwrap().unwrap();
        assert!(annotation.is_freeform());
        assert_eq!(annotation.bounds_on(0), Some(DocBox::new(10.0, 10.0, 50.0, 30.0)));
    }
}
