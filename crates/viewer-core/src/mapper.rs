//! Page coordinate mapper
//!
//! Converts between screen pixels (pointer events, canvas drawing) and
//! document space (tokens, persisted geometry) for one page:
//!
//! ```text
//! doc    = (screen - offset) / zoom
//! screen =  doc * zoom + offset
//! ```
//!
//! The zoom is read live from the shared [`ZoomLevel`], so a mapper never
//! needs rebuilding when the user zooms. Stored token ids are never
//! re-resolved on zoom change; only drawing through [`PageCoordinateMapper::doc_to_screen`]
//! moves.

use crate::zoom::ZoomLevel;
use annotator_core::{
    BoundingBox, CoreError, CoreResult, DocBox, PageSelection, ScreenBox, TokenIndex,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Top-left corner of a page canvas within the scrollable container
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CanvasOffset {
    pub left: f64,
    pub top: f64,
}

impl CanvasOffset {
    pub fn new(left: f64, top: f64) -> Self {
        Self { left, top }
    }
}

#[derive(Debug, Clone)]
pub struct PageCoordinateMapper {
    index: Arc<TokenIndex>,
    zoom: watch::Receiver<f64>,
    offset: CanvasOffset,
}

impl PageCoordinateMapper {
    pub fn new(index: Arc<TokenIndex>, zoom: &ZoomLevel, offset: CanvasOffset) -> Self {
        Self { index, zoom: zoom.subscribe(), offset }
    }

    pub fn page(&self) -> u32 {
        self.index.page()
    }

    pub fn index(&self) -> &Arc<TokenIndex> {
        &self.index
    }

    pub fn zoom(&self) -> f64 {
        *self.zoom.borrow()
    }

    pub fn offset(&self) -> CanvasOffset {
        self.offset
    }

    pub fn set_offset(&mut self, offset: CanvasOffset) {
        self.offset = offset;
    }

    pub fn with_offset(mut self, offset: CanvasOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Subtract the canvas offset, then divide by zoom
    pub fn screen_to_doc(&self, screen: &ScreenBox) -> CoreResult<DocBox> {
        let zoom = self.checked_zoom()?;
        let shifted = screen.translate(-self.offset.left, -self.offset.top);
        Ok(respace(&shifted.scale(1.0 / zoom)?))
    }

    /// Multiply by zoom, then add the canvas offset
    pub fn doc_to_screen(&self, doc: &DocBox) -> CoreResult<ScreenBox> {
        let zoom = self.checked_zoom()?;
        let scaled: ScreenBox = respace(&doc.scale(zoom)?);
        Ok(scaled.translate(self.offset.left, self.offset.top))
    }

    /// Screen point to document point
    pub fn screen_point_to_doc(&self, x: f64, y: f64) -> CoreResult<(f64, f64)> {
        let zoom = self.checked_zoom()?;
        Ok(((x - self.offset.left) / zoom, (y - self.offset.top) / zoom))
    }

    /// Resolve a raw pointer-drag rectangle into covered tokens
    pub fn resolve_selection(&self, screen: &ScreenBox) -> CoreResult<PageSelection> {
        let doc = self.screen_to_doc(screen)?;
        Ok(self.index.resolve(&doc))
    }

    /// Resolve a rectangle already in document space
    pub fn resolve_doc_selection(&self, doc: &DocBox) -> PageSelection {
        self.index.resolve(doc)
    }

    fn checked_zoom(&self) -> CoreResult<f64> {
        let zoom = self.zoom();
        if zoom.is_finite() && zoom > 0.0 {
            Ok(zoom)
        } else {
            Err(CoreError::InvalidArgument(format!("zoom must be > 0, got {zoom}")))
        }
    }
}

fn respace<A, B>(b: &BoundingBox<A>) -> BoundingBox<B> {
    BoundingBox::new(b.left, b.top, b.right, b.bottom)
}
