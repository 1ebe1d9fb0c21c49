//! Annotation store for the open document
//!
//! Holds the current [`PdfAnnotations`] snapshot and applies every mutation
//! optimistically: the local state changes first, the remote call follows,
//! and on failure the change is rolled back and reported to the notification
//! sink. Server responses replace pending local ids in place.
//!
//! Mutations touching relations run through the document's operation queue
//! so each one plans against the state the previous one left behind.

use crate::api::{AnnotationApi, RemoteError};
use crate::error::{SessionError, SessionResult};
use crate::notify::{Notification, NotificationSink};
use annotator_core::{
    add_members, forced_visible, on_explicit_detach, visible_on, Annotation, AnnotationId,
    AnnotationPatch, CoreError, CoreResult, DetachAction, DetachOutcome, DocTypeAnnotation, Label,
    LabelId, LabelKind, PdfAnnotations, Permission, RelationGroup, RelationId, RelationSide,
    RemovalPlan, VisibilitySettings,
};
use annotator_scheduler::{DocumentGeneration, GenerationTicket, OperationQueue};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

/// What the user currently has selected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    pub annotations: BTreeSet<AnnotationId>,
    /// Members of these relations render regardless of filters
    pub relations: BTreeSet<RelationId>,
}

pub struct AnnotationStore {
    api: Arc<dyn AnnotationApi>,
    sink: Arc<dyn NotificationSink>,
    queue: OperationQueue,
    generation: DocumentGeneration,
    document_id: RwLock<Option<String>>,
    state: RwLock<Arc<PdfAnnotations>>,
    selection: RwLock<SelectionState>,
}

impl AnnotationStore {
    pub fn new(
        api: Arc<dyn AnnotationApi>,
        sink: Arc<dyn NotificationSink>,
        generation: DocumentGeneration,
    ) -> Self {
        Self {
            api,
            sink,
            queue: OperationQueue::new(),
            generation,
            document_id: RwLock::new(None),
            state: RwLock::new(Arc::new(PdfAnnotations::default())),
            selection: RwLock::new(SelectionState::default()),
        }
    }

    /// Replace the state with a freshly loaded document
    pub fn load(&self, document_id: impl Into<String>, annotations: PdfAnnotations) {
        let document_id = document_id.into();
        let dangling = annotations.dangling_relations().len();
        if dangling > 0 {
            tracing::warn!(document = %document_id, dangling, "loaded relations reference missing annotations");
        }

        *self.document_id.write() = Some(document_id);
        *self.state.write() = Arc::new(annotations);
        *self.selection.write() = SelectionState::default();
    }

    /// Drop all state; in-flight completions are discarded by the generation guard
    pub fn reset(&self) {
        *self.document_id.write() = None;
        *self.state.write() = Arc::new(PdfAnnotations::default());
        *self.selection.write() = SelectionState::default();
    }

    pub fn snapshot(&self) -> Arc<PdfAnnotations> {
        Arc::clone(&self.state.read())
    }

    pub fn document_id(&self) -> SessionResult<String> {
        self.document_id.read().clone().ok_or(SessionError::NoDocument)
    }

    // ---------------------------------------------------------------------
    // Annotations
    // ---------------------------------------------------------------------

    /// Add a pending annotation and persist it
    ///
    /// Returns the saved annotation carrying its server id.
    pub async fn create_annotation(&self, annotation: Annotation) -> SessionResult<Annotation> {
        let document_id = self.document_id()?;
        let ticket = self.generation.ticket();
        let local_id = annotation.id.clone();

        let (before, after) = self.apply(|doc| Ok(doc.with_annotation(annotation.clone())))?;
        tracing::debug!(annotation = %local_id, pages = annotation.pages.len(), "annotation created locally");

        match self.api.create_annotation(&document_id, &annotation).await {
            Ok(saved) => {
                let mut kept = true;
                self.reconcile(&ticket, |doc| {
                    doc.with_reconciled_annotation(&local_id, saved.clone()).unwrap_or_else(|| {
                        kept = false;
                        doc.clone()
                    })
                })?;
                if !kept {
                    return Err(self.discard_saved(&local_id, &saved).await);
                }
                self.rename_selected(&local_id, &saved.id);
                tracing::info!(local = %local_id, id = %saved.id, "annotation saved");
                Ok(saved)
            }
            Err(err) => Err(self.roll_back(&ticket, "create annotation", err, before, after, |doc| {
                without_annotation_only(doc, &local_id)
            })),
        }
    }

    /// Apply `patch` to an annotation and persist it
    pub async fn update_annotation(&self, id: &AnnotationId, patch: AnnotationPatch) -> SessionResult<Annotation> {
        let ticket = self.generation.ticket();
        let current = self.snapshot();
        let previous = current.annotation(id).cloned().ok_or_else(|| CoreError::not_found("annotation", id))?;
        if !previous.can(Permission::CanUpdate) {
            return Err(SessionError::NotPermitted("update"));
        }

        let patched = previous.patched(&patch);
        let (before, after) = self.apply(|doc| Ok(doc.with_annotation(patched.clone())))?;

        match self.api.update_annotation(&patched).await {
            Ok(saved) => {
                self.reconcile(&ticket, |doc| doc.with_annotation(saved.clone()))?;
                Ok(saved)
            }
            Err(err) => Err(self.roll_back(&ticket, "update annotation", err, before, after, |doc| {
                doc.with_annotation(previous)
            })),
        }
    }

    pub async fn approve(&self, id: &AnnotationId) -> SessionResult<Annotation> {
        self.update_annotation(id, AnnotationPatch::approve()).await
    }

    pub async fn reject(&self, id: &AnnotationId) -> SessionResult<Annotation> {
        self.update_annotation(id, AnnotationPatch::reject()).await
    }

    pub async fn relabel(&self, id: &AnnotationId, label: Label) -> SessionResult<Annotation> {
        self.update_annotation(id, AnnotationPatch::relabel(label)).await
    }

    /// Delete an annotation and clean up every relation referencing it
    ///
    /// The local change is one atomic swap. Remotely the annotation is
    /// deleted first, then one call deletes the emptied relations and one
    /// call updates the shrunk ones.
    pub async fn delete_annotation(&self, id: &AnnotationId) -> SessionResult<RemovalPlan> {
        let ticket = self.generation.ticket();
        self.queued("delete annotation", &ticket, self.delete_annotation_now(id, &ticket)).await
    }

    async fn delete_annotation_now(&self, id: &AnnotationId, ticket: &GenerationTicket) -> SessionResult<RemovalPlan> {
        let current = self.snapshot();
        let annotation = current.annotation(id).cloned().ok_or_else(|| CoreError::not_found("annotation", id))?;
        if !annotation.can(Permission::CanRemove) {
            return Err(SessionError::NotPermitted("remove"));
        }

        let mut plan = RemovalPlan::default();
        let (before, after) = self.apply(|doc| {
            let (next, removal) = doc.without_annotation(id)?;
            plan = removal;
            Ok(next)
        })?;
        self.deselect(Some(id), &plan.delete_ids());

        tracing::debug!(
            annotation = %id,
            delete_relations = plan.to_delete.len(),
            update_relations = plan.to_update.len(),
            "annotation removed locally"
        );

        // A pending annotation is removed remotely once its create completes
        let remote = async {
            if !id.is_local() {
                self.api.delete_annotation(id).await?;
            }
            if !plan.to_delete.is_empty() {
                self.api.delete_relations(&plan.delete_ids()).await?;
            }
            if !plan.to_update.is_empty() {
                self.api.update_relations(&plan.to_update).await?;
            }
            Ok::<_, RemoteError>(())
        }
        .await;

        match remote {
            Ok(()) => {
                self.ensure_current(ticket)?;
                tracing::info!(annotation = %id, "annotation deleted");
                Ok(plan)
            }
            Err(err) => {
                let touched: Vec<RelationGroup> =
                    before.relations.iter().filter(|r| r.references(id)).cloned().collect();
                Err(self.roll_back(ticket, "delete annotation", err, before, after, move |doc| {
                    touched.into_iter().fold(doc.with_annotation(annotation), |next, r| next.with_relation(r))
                }))
            }
        }
    }

    // ---------------------------------------------------------------------
    // Relations
    // ---------------------------------------------------------------------

    pub async fn create_relation(
        &self,
        label: LabelId,
        source_ids: impl IntoIterator<Item = AnnotationId>,
        target_ids: impl IntoIterator<Item = AnnotationId>,
    ) -> SessionResult<RelationGroup> {
        let relation = RelationGroup::new(label, source_ids, target_ids);
        let ticket = self.generation.ticket();
        self.queued("create relation", &ticket, self.create_relation_now(relation, &ticket)).await
    }

    async fn create_relation_now(&self, relation: RelationGroup, ticket: &GenerationTicket) -> SessionResult<RelationGroup> {
        let document_id = self.document_id()?;
        if !relation.is_valid() {
            return Err(CoreError::InvalidArgument("relation needs a source and a target".into()).into());
        }
        self.ensure_members_exist(relation.members())?;

        let local_id = relation.id.clone();
        let (before, after) = self.apply(|doc| Ok(doc.with_relation(relation.clone())))?;

        match self.api.create_relation(&document_id, &relation).await {
            Ok(saved) => {
                self.reconcile(ticket, |doc| doc.with_reconciled_relation(&local_id, saved.clone()))?;
                tracing::info!(local = %local_id, id = %saved.id, "relation saved");
                Ok(saved)
            }
            Err(err) => Err(self.roll_back(ticket, "create relation", err, before, after, |doc| {
                doc.without_relations(&[local_id.clone()])
            })),
        }
    }

    /// Add annotations to one side of an existing relation
    pub async fn add_to_relation(
        &self,
        relation_id: &RelationId,
        ids: Vec<AnnotationId>,
        side: RelationSide,
    ) -> SessionResult<RelationGroup> {
        let ticket = self.generation.ticket();
        self.queued("add to relation", &ticket, self.add_to_relation_now(relation_id, ids, side, &ticket))
            .await
    }

    async fn add_to_relation_now(
        &self,
        relation_id: &RelationId,
        ids: Vec<AnnotationId>,
        side: RelationSide,
        ticket: &GenerationTicket,
    ) -> SessionResult<RelationGroup> {
        let current = self.snapshot();
        let original = current.relation(relation_id).cloned().ok_or_else(|| CoreError::not_found("relation", relation_id))?;
        self.ensure_members_exist(ids.iter())?;

        let updated = add_members(&original, ids, side);
        if updated == original {
            return Ok(original);
        }

        self.update_relation_now("add to relation", original, updated, ticket).await
    }

    /// Detach one annotation from one relation
    ///
    /// A relation left one-sided is deleted; an unknown relation or a
    /// non-member annotation changes nothing.
    pub async fn detach(&self, annotation_id: &AnnotationId, relation_id: &RelationId) -> SessionResult<DetachOutcome> {
        let ticket = self.generation.ticket();
        self.queued("detach from relation", &ticket, self.detach_now(annotation_id, relation_id, &ticket)).await
    }

    async fn detach_now(
        &self,
        annotation_id: &AnnotationId,
        relation_id: &RelationId,
        ticket: &GenerationTicket,
    ) -> SessionResult<DetachOutcome> {
        let current = self.snapshot();
        let outcome = on_explicit_detach(&current.relations, annotation_id, relation_id);

        let (Some(relation), Some(original)) = (outcome.relation.clone(), current.relation(relation_id).cloned()) else {
            tracing::debug!(annotation = %annotation_id, relation = %relation_id, "detach changed nothing");
            return Ok(outcome);
        };

        match outcome.action {
            DetachAction::NoChange => Ok(outcome),
            DetachAction::Delete => {
                self.delete_relation_now("detach from relation", original, ticket).await?;
                Ok(outcome)
            }
            DetachAction::Update => {
                let saved = self.update_relation_now("detach from relation", original, relation, ticket).await?;
                Ok(DetachOutcome { relation: Some(saved), action: DetachAction::Update })
            }
        }
    }

    pub async fn delete_relation(&self, relation_id: &RelationId) -> SessionResult<()> {
        let ticket = self.generation.ticket();
        let op = async {
            let original = self
                .snapshot()
                .relation(relation_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("relation", relation_id))?;
            self.delete_relation_now("delete relation", original, &ticket).await
        };
        self.queued("delete relation", &ticket, op).await
    }

    async fn delete_relation_now(
        &self,
        action: &'static str,
        original: RelationGroup,
        ticket: &GenerationTicket,
    ) -> SessionResult<()> {
        let ids = vec![original.id.clone()];
        let (before, after) = self.apply(|doc| Ok(doc.without_relations(&ids)))?;
        self.deselect(None, &ids);

        match self.api.delete_relations(&ids).await {
            Ok(()) => {
                self.ensure_current(ticket)?;
                tracing::info!(relation = %original.id, "relation deleted");
                Ok(())
            }
            Err(err) => Err(self.roll_back(ticket, action, err, before, after, |doc| doc.with_relation(original))),
        }
    }

    async fn update_relation_now(
        &self,
        action: &'static str,
        original: RelationGroup,
        updated: RelationGroup,
        ticket: &GenerationTicket,
    ) -> SessionResult<RelationGroup> {
        let (before, after) = self.apply(|doc| Ok(doc.with_relations_updated(std::slice::from_ref(&updated))))?;

        match self.api.update_relations(std::slice::from_ref(&updated)).await {
            Ok(saved) => {
                self.reconcile(ticket, |doc| doc.with_relations_updated(&saved))?;
                Ok(saved.into_iter().find(|r| r.id == updated.id).unwrap_or(updated))
            }
            Err(err) => Err(self.roll_back(ticket, action, err, before, after, |doc| {
                doc.with_relations_updated(&[original])
            })),
        }
    }

    // ---------------------------------------------------------------------
    // Document types
    // ---------------------------------------------------------------------

    pub async fn add_doc_type(&self, label: Label) -> SessionResult<DocTypeAnnotation> {
        if label.kind != LabelKind::DocType {
            return Err(CoreError::InvalidArgument(format!("label {} is not a document type", label.id)).into());
        }

        let document_id = self.document_id()?;
        let ticket = self.generation.ticket();
        let doc_type = DocTypeAnnotation::new(label);
        let local_id = doc_type.id.clone();
        let (before, after) = self.apply(|doc| Ok(doc.with_doc_type(doc_type.clone())))?;

        match self.api.add_doc_type(&document_id, &doc_type).await {
            Ok(saved) => {
                self.reconcile(&ticket, |doc| doc.with_reconciled_doc_type(&local_id, saved.clone()))?;
                Ok(saved)
            }
            Err(err) => Err(self.roll_back(&ticket, "add document type", err, before, after, |doc| {
                doc.without_doc_type(&local_id)
            })),
        }
    }

    pub async fn remove_doc_type(&self, id: &AnnotationId) -> SessionResult<()> {
        let ticket = self.generation.ticket();
        let original = self
            .snapshot()
            .doc_types
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("document type", id))?;
        if !original.permissions.can(Permission::CanRemove) {
            return Err(SessionError::NotPermitted("remove"));
        }

        let (before, after) = self.apply(|doc| Ok(doc.without_doc_type(id)))?;

        match self.api.remove_doc_type(id).await {
            Ok(()) => self.ensure_current(&ticket),
            Err(err) => Err(self.roll_back(&ticket, "remove document type", err, before, after, |doc| {
                doc.with_doc_type(original)
            })),
        }
    }

    // ---------------------------------------------------------------------
    // Selection and visibility
    // ---------------------------------------------------------------------

    pub fn selection(&self) -> SelectionState {
        self.selection.read().clone()
    }

    pub fn select_annotations(&self, ids: impl IntoIterator<Item = AnnotationId>) {
        self.selection.write().annotations = ids.into_iter().collect();
    }

    pub fn select_relations(&self, ids: impl IntoIterator<Item = RelationId>) {
        self.selection.write().relations = ids.into_iter().collect();
    }

    pub fn clear_selection(&self) {
        *self.selection.write() = SelectionState::default();
    }

    /// Members of the selected relations
    pub fn forced_visible(&self) -> BTreeSet<AnnotationId> {
        let snapshot = self.snapshot();
        forced_visible(&snapshot.relations, &self.selection.read().relations)
    }

    /// Annotations that render on `page` under `settings`
    pub fn visible_on(&self, page: u32, settings: &VisibilitySettings) -> Vec<Annotation> {
        let snapshot = self.snapshot();
        let selection = self.selection();
        let forced = forced_visible(&snapshot.relations, &selection.relations);

        visible_on(page, &snapshot.annotations, settings, &selection.annotations, &forced)
            .into_iter()
            .cloned()
            .collect()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn queued<T>(
        &self,
        action: &'static str,
        ticket: &GenerationTicket,
        op: impl Future<Output = SessionResult<T>>,
    ) -> SessionResult<T> {
        self.queue.run_current(action, ticket, op).await.unwrap_or(Err(SessionError::DocumentClosed))
    }

    /// Swap in `change(current)`; returns the states before and after
    fn apply(
        &self,
        change: impl FnOnce(&PdfAnnotations) -> CoreResult<PdfAnnotations>,
    ) -> SessionResult<(Arc<PdfAnnotations>, Arc<PdfAnnotations>)> {
        let mut state = self.state.write();
        let before = Arc::clone(&state);
        let after = Arc::new(change(&before)?);
        *state = Arc::clone(&after);
        Ok((before, after))
    }

    fn reconcile(
        &self,
        ticket: &GenerationTicket,
        change: impl FnOnce(&PdfAnnotations) -> PdfAnnotations,
    ) -> SessionResult<()> {
        self.ensure_current(ticket)?;
        let mut state = self.state.write();
        *state = Arc::new(change(&state));
        Ok(())
    }

    /// Undo an optimistic change after a remote failure and report it
    ///
    /// When nothing else changed in between the pre-operation snapshot is
    /// restored as is; otherwise `inverse` is applied on top of the newer state.
    fn roll_back(
        &self,
        ticket: &GenerationTicket,
        action: &'static str,
        err: RemoteError,
        before: Arc<PdfAnnotations>,
        after: Arc<PdfAnnotations>,
        inverse: impl FnOnce(&PdfAnnotations) -> PdfAnnotations,
    ) -> SessionError {
        tracing::warn!(action, error = %err, "remote call failed");
        self.sink.notify(Notification::error(action, err.message.clone()));

        if !ticket.is_current() {
            return SessionError::Remote(err);
        }

        let mut state = self.state.write();
        if Arc::ptr_eq(&state, &after) {
            *state = before;
        } else {
            *state = Arc::new(inverse(&state));
        }
        SessionError::Remote(err)
    }

    fn ensure_current(&self, ticket: &GenerationTicket) -> SessionResult<()> {
        if ticket.is_current() {
            Ok(())
        } else {
            tracing::debug!(generation = ticket.value(), "dropping result for closed document");
            Err(SessionError::DocumentClosed)
        }
    }

    /// Remove an annotation the server saved after the user deleted it locally
    async fn discard_saved(&self, local_id: &AnnotationId, saved: &Annotation) -> SessionError {
        tracing::info!(local = %local_id, id = %saved.id, "annotation deleted while saving");
        if let Err(err) = self.api.delete_annotation(&saved.id).await {
            tracing::warn!(id = %saved.id, error = %err, "remote call failed");
            self.sink.notify(Notification::error("delete annotation", err.message.clone()));
            return SessionError::Remote(err);
        }
        CoreError::not_found("annotation", local_id).into()
    }

    fn ensure_members_exist<'a>(&self, ids: impl IntoIterator<Item = &'a AnnotationId>) -> SessionResult<()> {
        let snapshot = self.snapshot();
        for id in ids {
            if snapshot.annotation(id).is_none() {
                return Err(CoreError::not_found("annotation", id).into());
            }
        }
        Ok(())
    }

    fn rename_selected(&self, from: &AnnotationId, to: &AnnotationId) {
        let mut selection = self.selection.write();
        if selection.annotations.remove(from) {
            selection.annotations.insert(to.clone());
        }
    }

    fn deselect(&self, annotation: Option<&AnnotationId>, relations: &[RelationId]) {
        let mut selection = self.selection.write();
        if let Some(id) = annotation {
            selection.annotations.remove(id);
        }
        for id in relations {
            selection.relations.remove(id);
        }
    }
}

/// Drop a pending annotation without touching relations
fn without_annotation_only(doc: &PdfAnnotations, id: &AnnotationId) -> PdfAnnotations {
    let mut next = doc.clone();
    next.annotations.retain(|a| &a.id != id);
    next
}
