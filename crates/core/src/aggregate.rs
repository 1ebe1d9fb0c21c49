//! Full annotation state for one open document
//!
//! Every operation returns a new aggregate instead of mutating in place, so
//! holders of an `Arc<PdfAnnotations>` snapshot never observe a partial
//! update and change detection is a pointer comparison.

use crate::annotation::{Annotation, AnnotationPatch, DocTypeAnnotation};
use crate::error::{CoreError, CoreResult};
use crate::id::{AnnotationId, RelationId};
use crate::relationship::{on_annotation_removed, RelationGroup, RemovalPlan};

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAnnotations {
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub relations: Vec<RelationGroup>,
    #[serde(default)]
    pub doc_types: Vec<DocTypeAnnotation>,
}

impl PdfAnnotations {
    pub fn new(
        annotations: Vec<Annotation>,
        relations: Vec<RelationGroup>,
        doc_types: Vec<DocTypeAnnotation>,
    ) -> Self {
        Self { annotations, relations, doc_types }
    }

    pub fn annotation(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| &a.id == id)
    }

    pub fn relation(&self, id: &RelationId) -> Option<&RelationGroup> {
        self.relations.iter().find(|r| &r.id == id)
    }

    pub fn annotations_on(&self, page: u32) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.is_on_page(page))
    }

    /// Append an annotation; an existing id is replaced in place
    pub fn with_annotation(&self, annotation: Annotation) -> Self {
        let mut next = self.clone();
        match next.annotations.iter_mut().find(|a| a.id == annotation.id) {
            Some(slot) => *slot = annotation,
            None => next.annotations.push(annotation),
        }
        next
    }

    pub fn with_patched_annotation(&self, id: &AnnotationId, patch: &AnnotationPatch) -> CoreResult<Self> {
        let current = self.annotation(id).ok_or_else(|| CoreError::not_found("annotation", id))?;
        Ok(self.with_annotation(current.patched(patch)))
    }

    /// Remove an annotation together with its relation cleanup
    ///
    /// Returns the new aggregate and the plan that was applied, so the caller
    /// can mirror the same relation changes remotely.
    pub fn without_annotation(&self, id: &AnnotationId) -> CoreResult<(Self, RemovalPlan)> {
        if self.annotation(id).is_none() {
            return Err(CoreError::not_found("annotation", id));
        }

        let plan = on_annotation_removed(&self.relations, id);
        let next = Self {
            annotations: self.annotations.iter().filter(|a| &a.id != id).cloned().collect(),
            relations: plan.apply(&self.relations),
            doc_types: self.doc_types.clone(),
        };
        Ok((next, plan))
    }

    /// Swap a pending local id for the server-assigned one
    ///
    /// Position in the list is kept and relation memberships follow the new id.
    /// Returns `None` when the pending annotation was removed in the meantime.
    pub fn with_reconciled_annotation(&self, local_id: &AnnotationId, saved: Annotation) -> Option<Self> {
        let mut next = self.clone();
        let server_id = saved.id.clone();

        *next.annotations.iter_mut().find(|a| &a.id == local_id)? = saved;

        if local_id != &server_id {
            next.relations = next
                .relations
                .iter()
                .map(|r| {
                    if r.references(local_id) {
                        r.with_member_renamed(local_id, &server_id)
                    } else {
                        r.clone()
                    }
                })
                .collect();
        }
        Some(next)
    }

    /// Append a relation; an existing id is replaced in place
    pub fn with_relation(&self, relation: RelationGroup) -> Self {
        let mut next = self.clone();
        match next.relations.iter_mut().find(|r| r.id == relation.id) {
            Some(slot) => *slot = relation,
            None => next.relations.push(relation),
        }
        next
    }

    pub fn with_reconciled_relation(&self, local_id: &RelationId, saved: RelationGroup) -> Self {
        let mut next = self.clone();
        match next.relations.iter_mut().find(|r| &r.id == local_id) {
            Some(slot) => *slot = saved,
            None => next.relations.push(saved),
        }
        next
    }

    pub fn with_relations_updated(&self, updated: &[RelationGroup]) -> Self {
        let mut next = self.clone();
        for relation in &mut next.relations {
            if let Some(u) = updated.iter().find(|u| u.id == relation.id) {
                *relation = u.clone();
            }
        }
        next
    }

    pub fn without_relations(&self, ids: &[RelationId]) -> Self {
        let mut next = self.clone();
        next.relations.retain(|r| !ids.contains(&r.id));
        next
    }

    pub fn with_doc_type(&self, doc_type: DocTypeAnnotation) -> Self {
        let mut next = self.clone();
        match next.doc_types.iter_mut().find(|d| d.id == doc_type.id) {
            Some(slot) => *slot = doc_type,
            None => next.doc_types.push(doc_type),
        }
        next
    }

    pub fn with_reconciled_doc_type(&self, local_id: &AnnotationId, saved: DocTypeAnnotation) -> Self {
        let mut next = self.clone();
        match next.doc_types.iter_mut().find(|d| &d.id == local_id) {
            Some(slot) => *slot = saved,
            None => next.doc_types.push(saved),
        }
        next
    }

    pub fn without_doc_type(&self, id: &AnnotationId) -> Self {
        let mut next = self.clone();
        next.doc_types.retain(|d| &d.id != id);
        next
    }

    /// Relations referencing an annotation missing from this aggregate
    pub fn dangling_relations(&self) -> Vec<&RelationGroup> {
        self.relations
            .iter()
            .filter(|r| r.members().any(|id| self.annotation(id).is_none()))
            .collect()
    }
}
