//! Annotator Core Library
//!
//! Geometry, token layer and annotation/relationship model for the document
//! annotator. Everything here is pure and synchronous; async lifecycles live
//! in the viewer and session crates.

pub mod aggregate;
pub mod annotation;
pub mod bounds;
pub mod error;
pub mod id;
pub mod relationship;
pub mod token;
pub mod visibility;

pub use aggregate::PdfAnnotations;
pub use annotation::{
    Annotation, AnnotationKind, AnnotationPatch, Color, DocTypeAnnotation, Label, LabelKind,
    PageSpan, Permission, Permissions, SpanDraft,
};
pub use bounds::{union_of, BoundingBox, DocBox, Document, Screen, ScreenBox, Space};
pub use error::{CoreError, CoreResult};
pub use id::{AnnotationId, LabelId, RelationId};
pub use relationship::{
    add_members, forced_visible, on_annotation_removed, on_explicit_detach, DetachAction,
    DetachOutcome, RelationGroup, RelationSide, RemovalPlan,
};
pub use token::{
    PageSelection, PageTokens, Token, TokenId, TokenIndex, TokenLayerStatus, TokenMatch,
};
pub use visibility::{classify, visible_on, Visibility, VisibilitySettings};
