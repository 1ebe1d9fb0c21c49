//! Annotation data model
//!
//! Span annotations cover one or more pages. Each page entry holds the
//! covered token ids and a document-space rectangle, so a page can be
//! rendered on its own without looking at any other page. Token ids never
//! depend on zoom: rescaling only changes how the stored rectangle is drawn.

use crate::bounds::{union_of, DocBox};
use crate::error::{CoreError, CoreResult};
use crate::id::{AnnotationId, LabelId};
use crate::token::{PageSelection, TokenId, TokenIndex, TokenLayerStatus};
use std::collections::{BTreeMap, BTreeSet};

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional)
    pub fn from_hex(hex: &str) -> CoreResult<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let channel = |i: usize| {
            digits
                .get(i..i + 2)
                .and_then(|c| u8::from_str_radix(c, 16).ok())
                .ok_or_else(|| CoreError::InvalidArgument(format!("bad color: {hex}")))
        };

        match digits.len() {
            6 => Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(CoreError::InvalidArgument(format!("bad color: {hex}"))),
        }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl Color {
    pub const YELLOW: Color = Color { r: 255, g: 255, b: 0, a: 255 };
    pub const GREY: Color = Color { r: 128, g: 128, b: 128, a: 255 };
}

/// What a label can be applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelKind {
    Span,
    DocType,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub text: String,
    pub color: Color,
    pub kind: LabelKind,
}

impl Label {
    pub fn span(id: impl Into<LabelId>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), color: Color::YELLOW, kind: LabelKind::Span }
    }

    pub fn doc_type(id: impl Into<LabelId>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), color: Color::GREY, kind: LabelKind::DocType }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    CanRead,
    CanUpdate,
    CanRemove,
    CanComment,
    CanPublish,
}

/// Set of permissions the current user holds on an object
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<Permission>);

impl Permissions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        [Permission::CanRead].into_iter().collect()
    }

    pub fn all() -> Self {
        [
            Permission::CanRead,
            Permission::CanUpdate,
            Permission::CanRemove,
            Permission::CanComment,
            Permission::CanPublish,
        ]
        .into_iter()
        .collect()
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn grant(&mut self, permission: Permission) {
        self.0.insert(permission);
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Geometry of an annotation on one page
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpan {
    /// Covered tokens, ascending; empty for freeform annotations
    pub token_ids: Vec<TokenId>,
    pub bounding_box: DocBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationKind {
    /// Derived from the token layer
    TokenAligned,
    /// User-drawn rectangle not aligned to tokens
    Freeform,
}

/// Span annotation over one or more pages
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: AnnotationId,
    pub label: Label,
    pub kind: AnnotationKind,
    pub pages: BTreeMap<u32, PageSpan>,
    pub raw_text: String,
    #[serde(default)]
    pub structural: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub permissions: Permissions,
}

impl Annotation {
    /// Token-aligned annotation with a fresh local id
    pub fn token_aligned(
        label: Label,
        pages: BTreeMap<u32, PageSpan>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            id: AnnotationId::local(),
            label,
            kind: AnnotationKind::TokenAligned,
            pages,
            raw_text: raw_text.into(),
            structural: false,
            approved: false,
            rejected: false,
            permissions: Permissions::all(),
        }
    }

    /// Freeform annotation with a fresh local id; token ids are dropped
    pub fn freeform(label: Label, boxes: BTreeMap<u32, DocBox>) -> Self {
        let pages = boxes
            .into_iter()
            .map(|(page, bounds)| {
                (page, PageSpan { token_ids: Vec::new(), bounding_box: bounds.normalize() })
            })
            .collect();

        Self {
            id: AnnotationId::local(),
            label,
            kind: AnnotationKind::Freeform,
            pages,
            raw_text: String::new(),
            structural: false,
            approved: false,
            rejected: false,
            permissions: Permissions::all(),
        }
    }

    pub fn with_id(mut self, id: AnnotationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_structural(mut self, structural: bool) -> Self {
        self.structural = structural;
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn is_freeform(&self) -> bool {
        self.kind == AnnotationKind::Freeform
    }

    pub fn is_on_page(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    pub fn first_page(&self) -> Option<u32> {
        self.pages.keys().next().copied()
    }

    pub fn is_multi_page(&self) -> bool {
        self.pages.len() > 1
    }

    /// Document-space rectangle for `page`, if the annotation covers it
    pub fn bounds_on(&self, page: u32) -> Option<DocBox> {
        self.pages.get(&page).map(|span| span.bounding_box)
    }

    pub fn token_ids_on(&self, page: u32) -> &[TokenId] {
        self.pages.get(&page).map(|span| span.token_ids.as_slice()).unwrap_or(&[])
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.can(permission)
    }

    /// Copy with `patch` applied; id and geometry are preserved
    pub fn patched(&self, patch: &AnnotationPatch) -> Self {
        let mut next = self.clone();
        if let Some(label) = &patch.label {
            next.label = label.clone();
        }
        if let Some(raw_text) = &patch.raw_text {
            next.raw_text = raw_text.clone();
        }
        if let Some(approved) = patch.approved {
            next.approved = approved;
        }
        if let Some(rejected) = patch.rejected {
            next.rejected = rejected;
        }
        next
    }
}

/// Editable metadata of an annotation; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<bool>,
}

impl AnnotationPatch {
    pub fn relabel(label: Label) -> Self {
        Self { label: Some(label), ..Self::default() }
    }

    pub fn approve() -> Self {
        Self { approved: Some(true), rejected: Some(false), ..Self::default() }
    }

    pub fn reject() -> Self {
        Self { approved: Some(false), rejected: Some(true), ..Self::default() }
    }
}

/// Document-level label, no geometry
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocTypeAnnotation {
    pub id: AnnotationId,
    pub label: Label,
    #[serde(default)]
    pub permissions: Permissions,
}

impl DocTypeAnnotation {
    pub fn new(label: Label) -> Self {
        Self { id: AnnotationId::local(), label, permissions: Permissions::all() }
    }
}

#[derive(Debug, Clone)]
struct DraftPage {
    token_ids: BTreeSet<TokenId>,
    drag_boxes: Vec<DocBox>,
    text: String,
}

/// Accumulates resolved page selections into one annotation
///
/// A page without a token layer turns the whole annotation freeform, which
/// then keeps the user-drawn rectangles on every page. Otherwise pages whose
/// drags covered no tokens are dropped.
#[derive(Debug, Clone)]
pub struct SpanDraft {
    label: Label,
    pages: BTreeMap<u32, DraftPage>,
    freeform: bool,
}

impl SpanDraft {
    pub fn new(label: Label) -> Self {
        Self { label, pages: BTreeMap::new(), freeform: false }
    }

    /// Add one resolved selection; `index` must be the selection's page layer
    pub fn add_selection(&mut self, index: &TokenIndex, selection: PageSelection) -> CoreResult<()> {
        if index.page() != selection.page {
            return Err(CoreError::InvalidArgument(format!(
                "selection for page {} resolved against page {}",
                selection.page,
                index.page()
            )));
        }

        if selection.layer == TokenLayerStatus::Unavailable {
            self.freeform = true;
        }

        let entry = self.pages.entry(selection.page).or_insert_with(|| DraftPage {
            token_ids: BTreeSet::new(),
            drag_boxes: Vec::new(),
            text: String::new(),
        });
        entry.token_ids.extend(selection.token_ids);
        entry.drag_boxes.push(selection.doc_box);

        let ids: Vec<TokenId> = entry.token_ids.iter().copied().collect();
        entry.text = index.text_of(&ids);

        Ok(())
    }

    pub fn is_freeform(&self) -> bool {
        self.freeform
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Build the pending annotation, or `None` when nothing was covered
    pub fn build(self, token_bounds: impl Fn(u32, &[TokenId]) -> CoreResult<DocBox>) -> Option<Annotation> {
        if self.pages.is_empty() {
            return None;
        }

        if self.freeform {
            let boxes = self
                .pages
                .iter()
                .filter_map(|(page, draft)| union_of(&draft.drag_boxes).ok().map(|b| (*page, b)))
                .collect();
            return Some(Annotation::freeform(self.label, boxes));
        }

        let mut pages = BTreeMap::new();
        let mut text = Vec::new();

        for (page, draft) in self.pages {
            if draft.token_ids.is_empty() {
                continue;
            }
            let token_ids: Vec<TokenId> = draft.token_ids.into_iter().collect();
            let bounds = match token_bounds(page, &token_ids) {
                Ok(bounds) => bounds,
                Err(err) => {
                    tracing::debug!(page, %err, "falling back to drag rectangle for page bounds");
                    union_of(&draft.drag_boxes).ok()?
                }
            };
            if !draft.text.is_empty() {
                text.push(draft.text);
            }
            pages.insert(page, PageSpan { token_ids, bounding_box: bounds });
        }

        if pages.is_empty() {
            return None;
        }

        Some(Annotation::token_aligned(self.label, pages, text.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    fn index(page: u32) -> TokenIndex {
        let tokens = ["Lorem", "ipsum", "dolor", "sit"]
            .iter()
            .enumerate()
            .map(|(i, w)| Token::new(i as u32, i as f64 * 20.0, 0.0, 18.0, 10.0).with_text(*w))
            .collect();
        TokenIndex::new(page, tokens)
    }

    #[test]
    fn test_color_hex_round_trip() {
        let color = Color::from_hex("#ff8000").unwrap();
        assert_eq!(color, Color::rgb(255, 128, 0));
        assert_eq!(color.to_hex(), "#ff8000");

        let translucent = Color::from_hex("00ff0080").unwrap();
        assert_eq!(translucent.a, 128);
        assert!(Color::from_hex("#12").is_err());
    }

    #[test]
    fn test_freeform_has_no_tokens() {
        let mut boxes = BTreeMap::new();
        boxes.insert(1, DocBox::new(30.0, 30.0, 10.0, 10.0));
        let annotation = Annotation::freeform(Label::span("L1", "Party"), boxes);

        assert!(annotation.is_freeform());
        assert!(annotation.token_ids_on(1).is_empty());
        assert_eq!(annotation.bounds_on(1), Some(DocBox::new(10.0, 10.0, 30.0, 30.0)));
        assert!(annotation.id.is_local());
    }

    #[test]
    fn test_patch_preserves_geometry() {
        let mut pages = BTreeMap::new();
        pages.insert(0, PageSpan { token_ids: vec![1, 2], bounding_box: DocBox::new(0.0, 0.0, 5.0, 5.0) });
        let annotation = Annotation::token_aligned(Label::span("L1", "Party"), pages, "a b");

        let approved = annotation.patched(&AnnotationPatch::approve());
        assert!(approved.approved);
        assert!(!approved.rejected);
        assert_eq!(approved.pages, annotation.pages);
        assert_eq!(approved.id, annotation.id);

        let relabeled = approved.patched(&AnnotationPatch::relabel(Label::span("L2", "Date")));
        assert_eq!(relabeled.label.id, LabelId::from("L2"));
        assert!(relabeled.approved);
    }

    #[test]
    fn test_draft_merges_boxes_on_same_page() {
        let page = index(0);
        let mut draft = SpanDraft::new(Label::span("L1", "Party"));

        draft.add_selection(&page, page.resolve(&DocBox::new(0.0, 0.0, 10.0, 10.0))).unwrap();
        draft.add_selection(&page, page.resolve(&DocBox::new(60.0, 0.0, 80.0, 10.0))).unwrap();

        let annotation = draft.build(|_, ids| page.bounds_of(ids)).unwrap();
        assert_eq!(annotation.kind, AnnotationKind::TokenAligned);
        assert_eq!(annotation.token_ids_on(0), &[0, 3]);
        assert_eq!(annotation.raw_text, "Lorem sit");
        assert_eq!(annotation.bounds_on(0), Some(DocBox::new(0.0, 0.0, 78.0, 10.0)));
    }

    #[test]
    fn test_draft_spanning_pages_keeps_each_page() {
        let first = index(1);
        let second = index(2);
        let mut draft = SpanDraft::new(Label::span("L1", "Party"));

        draft.add_selection(&first, first.resolve(&DocBox::new(40.0, 0.0, 80.0, 10.0))).unwrap();
        draft.add_selection(&second, second.resolve(&DocBox::new(0.0, 0.0, 20.0, 10.0))).unwrap();

        let annotation = draft
            .build(|page, ids| if page == 1 { first.bounds_of(ids) } else { second.bounds_of(ids) })
            .unwrap();

        assert!(annotation.is_multi_page());
        assert_eq!(annotation.token_ids_on(1), &[2, 3]);
        assert_eq!(annotation.token_ids_on(2), &[0]);
        assert_eq!(annotation.raw_text, "dolor sit Lorem");
    }

    #[test]
    fn test_draft_without_token_layer_is_freeform() {
        let blank = TokenIndex::unavailable(0);
        let mut draft = SpanDraft::new(Label::span("L1", "Party"));

        draft.add_selection(&blank, blank.resolve(&DocBox::new(10.0, 10.0, 50.0, 30.0))).unwrap();
        assert!(draft.is_freeform());

        let annotation = draft.build(|_, ids| blank.bounds_of(ids)).unwrap();
        assert!(annotation.is_freeform());
        assert_eq!(annotation.bounds_on(0), Some(DocBox::new(10.0, 10.0, 50.0, 30.0)));
    }

    #[test]
    fn test_draft_covering_no_tokens_builds_nothing() {
        let page = index(0);
        let mut draft = SpanDraft::new(Label::span("L1", "Party"));
        draft.add_selection(&page, page.resolve(&DocBox::new(0.0, 50.0, 10.0, 60.0))).unwrap();

        assert!(draft.build(|_, ids| page.bounds_of(ids)).is_none());
    }

    #[test]
    fn test_draft_rejects_mismatched_page() {
        let first = index(1);
        let second = index(2);
        let mut draft = SpanDraft::new(Label::span("L1", "Party"));

        let selection = second.resolve(&DocBox::new(0.0, 0.0, 10.0, 10.0));
        assert!(matches!(draft.add_selection(&first, selection), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_annotation_json_shape() {
        let mut pages = BTreeMap::new();
        pages.insert(3, PageSpan { token_ids: vec![4], bounding_box: DocBox::new(1.0, 2.0, 3.0, 4.0) });
        let annotation = Annotation::token_aligned(Label::span("L1", "Party"), pages, "word")
            .with_id(AnnotationId::from("a1"));

        let json = serde_json::to_value(&annotation).unwrap();
        assert_eq!(json["id"], "a1");
        assert_eq!(json["kind"], "TOKEN_ALIGNED");
        assert_eq!(json["pages"]["3"]["tokenIds"], serde_json::json!([4]));
        assert_eq!(json["label"]["color"], "#ffff00");

        let back: Annotation = serde_json::from_value(json).unwrap();
        assert_eq!(back, annotation);
    }
}
