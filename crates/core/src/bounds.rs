//! Bounding box geometry
//!
//! Every box carries the coordinate space it lives in as a type parameter:
//!
//! - [`Screen`]: raw pointer pixels, dependent on zoom and canvas offset
//! - [`Document`]: scale-1.0, offset-free page pixels (tokens and persisted geometry)
//!
//! Conversions between spaces only happen through the page coordinate mapper.
//! Boxes are not normalized on construction because drags can run in any
//! direction; call [`BoundingBox::normalize`] before containment tests.

use crate::error::{CoreError, CoreResult};
use crate::token::Token;
use std::fmt;
use std::marker::PhantomData;

/// Marker for a coordinate space
pub trait Space: 'static {
    const NAME: &'static str;
}

/// On-screen pixel space
#[derive(Debug)]
pub enum Screen {}

/// Scale-1.0 document pixel space
#[derive(Debug)]
pub enum Document {}

impl Space for Screen {
    const NAME: &'static str = "screen";
}

impl Space for Document {
    const NAME: &'static str = "document";
}

/// Rectangle in coordinate space `S`
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct BoundingBox<S> {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    #[serde(skip)]
    space: PhantomData<S>,
}

pub type ScreenBox = BoundingBox<Screen>;
pub type DocBox = BoundingBox<Document>;

impl<S> BoundingBox<S> {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom, space: PhantomData }
    }

    /// Build a box from two drag corners in any order
    pub const fn from_corners(anchor: (f64, f64), cursor: (f64, f64)) -> Self {
        Self::new(anchor.0, anchor.1, cursor.0, cursor.1)
    }

    /// Build a box from an origin and a size
    pub const fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        (self.right - self.left).abs()
    }

    pub fn height(&self) -> f64 {
        (self.bottom - self.top).abs()
    }

    /// Center point `(x, y)`
    pub fn center(&self) -> (f64, f64) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub fn is_normalized(&self) -> bool {
        self.right >= self.left && self.bottom >= self.top
    }

    /// Returns a box whose edges are ordered: `left <= right`, `top <= bottom`
    pub fn normalize(&self) -> Self {
        Self::new(
            self.left.min(self.right),
            self.top.min(self.bottom),
            self.left.max(self.right),
            self.top.max(self.bottom),
        )
    }

    /// Multiply all four coordinates by `factor`
    ///
    /// `factor` must be finite and strictly positive.
    pub fn scale(&self, factor: f64) -> CoreResult<Self> {
        ensure_positive_factor(factor)?;
        Ok(Self::new(
            self.left * factor,
            self.top * factor,
            self.right * factor,
            self.bottom * factor,
        ))
    }

    /// Shift all coordinates by `(dx, dy)`
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Whether the point lies within this (normalized) box, edges inclusive
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Whether two (normalized) boxes overlap or touch
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.right < other.left
            || other.right < self.left
            || self.bottom < other.top
            || other.bottom < self.top)
    }

    /// Whether every coordinate differs from `other` by at most `tolerance`
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.left - other.left).abs() <= tolerance
            && (self.top - other.top).abs() <= tolerance
            && (self.right - other.right).abs() <= tolerance
            && (self.bottom - other.bottom).abs() <= tolerance
    }
}

impl DocBox {
    /// Center-point containment of a token
    ///
    /// Edge-touching selections include a token only when its center falls
    /// inside the box, so partial overlap never makes the result ambiguous.
    /// The box is expected to be normalized.
    pub fn contains_token(&self, token: &Token) -> bool {
        let (cx, cy) = token.center();
        self.contains_point(cx, cy)
    }
}

/// Minimal rectangle enclosing every box
///
/// Each input is normalized first. Fails with [`CoreError::EmptyInput`] when
/// `boxes` yields nothing.
pub fn union_of<'a, S: 'a>(
    boxes: impl IntoIterator<Item = &'a BoundingBox<S>>,
) -> CoreResult<BoundingBox<S>> {
    let mut boxes = boxes.into_iter().map(BoundingBox::normalize);
    let first = boxes.next().ok_or(CoreError::EmptyInput("union of zero boxes"))?;

    Ok(boxes.fold(first, |acc, b| {
        BoundingBox::new(
            acc.left.min(b.left),
            acc.top.min(b.top),
            acc.right.max(b.right),
            acc.bottom.max(b.bottom),
        )
    }))
}

pub(crate) fn ensure_positive_factor(factor: f64) -> CoreResult<()> {
    if factor.is_finite() && factor > 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidArgument(format!("scale factor must be > 0, got {factor}")))
    }
}

impl<S> Clone for BoundingBox<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for BoundingBox<S> {}

impl<S> PartialEq for BoundingBox<S> {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left
            && self.top == other.top
            && self.right == other.right
            && self.bottom == other.bottom
    }
}

impl<S: Space> fmt::Debug for BoundingBox<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundingBox")
            .field("space", &S::NAME)
            .field("left", &self.left)
            .field("top", &self.top)
            .field("right", &self.right)
            .field("bottom", &self.bottom)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_reorders_reverse_drag() {
        let reversed = DocBox::new(50.0, 30.0, 10.0, 10.0);
        let normalized = reversed.normalize();

        assert_eq!(normalized, DocBox::new(10.0, 10.0, 50.0, 30.0));
        assert!(normalized.is_normalized());
        assert!(!reversed.is_normalized());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let boxes = [
            DocBox::new(0.0, 0.0, 10.0, 10.0),
            DocBox::new(10.0, 0.0, 0.0, 10.0),
            DocBox::new(0.0, 10.0, 10.0, 0.0),
            DocBox::new(-5.5, 3.25, -20.0, -1.0),
        ];

        for b in boxes {
            assert_eq!(b.normalize().normalize(), b.normalize());
        }
    }

    #[test]
    fn test_scale_multiplies_every_edge() {
        let b = ScreenBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(b.scale(2.5).unwrap(), ScreenBox::new(2.5, 5.0, 7.5, 10.0));
    }

    #[test]
    fn test_scale_rejects_non_positive_factor() {
        let b = DocBox::new(0.0, 0.0, 1.0, 1.0);

        assert!(matches!(b.scale(0.0), Err(CoreError::InvalidArgument(_))));
        assert!(matches!(b.scale(-1.0), Err(CoreError::InvalidArgument(_))));
        assert!(matches!(b.scale(f64::NAN), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_contains_token_uses_center_point() {
        // Token spans x 10..30, center at x = 20
        let token = Token::new(0, 10.0, 10.0, 20.0, 10.0);

        // Covers the left half of the token including its center line
        assert!(DocBox::new(0.0, 0.0, 20.0, 40.0).contains_token(&token));
        // Overlaps the token but stops short of its center
        assert!(!DocBox::new(0.0, 0.0, 19.9, 40.0).contains_token(&token));
    }

    #[test]
    fn test_union_encloses_all_boxes() {
        let boxes = [
            DocBox::new(10.0, 10.0, 20.0, 20.0),
            DocBox::new(5.0, 15.0, 12.0, 40.0),
            DocBox::new(30.0, 0.0, 25.0, 5.0),
        ];

        assert_eq!(union_of(&boxes).unwrap(), DocBox::new(5.0, 0.0, 30.0, 40.0));
    }

    #[test]
    fn test_union_of_nothing_is_empty_input() {
        let boxes: Vec<DocBox> = Vec::new();
        assert_eq!(union_of(&boxes), Err(CoreError::EmptyInput("union of zero boxes")));
    }

    #[test]
    fn test_box_serializes_without_space_marker() {
        let b = DocBox::new(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_value(b).unwrap();

        assert_eq!(json, serde_json::json!({"left": 1.0, "top": 2.0, "right": 3.0, "bottom": 4.0}));

        let back: DocBox = serde_json::from_value(json).unwrap();
        assert_eq!(back, b);
    }
}
