//! In-memory fakes for the remote boundaries

use crate::api::{AnnotationApi, DocumentInfo, RemoteError, TokenLoader};
use crate::notify::{Notification, NotificationSink};
use annotator_core::{
    Annotation, AnnotationId, DocTypeAnnotation, PageTokens, RelationGroup, RelationId, Token,
};
use annotator_scheduler::CancellationToken;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use viewer_core::{PageRenderer, RenderError, RenderRequest, RenderedPage};

// =========================================================================
// FakeApi
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreateAnnotation(AnnotationId),
    UpdateAnnotation(AnnotationId),
    DeleteAnnotation(AnnotationId),
    CreateRelation(RelationId),
    UpdateRelations(Vec<RelationGroup>),
    DeleteRelations(Vec<RelationId>),
    AddDocType(AnnotationId),
    RemoveDocType(AnnotationId),
}

#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<ApiCall>>,
    /// Method name that fails with a `RemoteError`
    fail_on: Mutex<Option<&'static str>>,
    delay: Mutex<Duration>,
    next_id: AtomicU32,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(method: &'static str) -> Arc<Self> {
        let api = Self::default();
        *api.fail_on.lock() = Some(method);
        Arc::new(api)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let api = Self::default();
        *api.delay.lock() = delay;
        Arc::new(api)
    }

    /// Make `method` fail from now on
    pub fn fail(&self, method: &'static str) {
        *self.fail_on.lock() = Some(method);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    async fn enter(&self, method: &'static str, call: ApiCall) -> Result<(), RemoteError> {
        self.calls.lock().push(call);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_on.lock() == Some(method) {
            return Err(RemoteError::new(format!("{method} failed: server unavailable")));
        }
        Ok(())
    }

    fn server_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl AnnotationApi for FakeApi {
    async fn create_annotation(
        &self,
        _document_id: &str,
        annotation: &Annotation,
    ) -> Result<Annotation, RemoteError> {
        self.enter("create_annotation", ApiCall::CreateAnnotation(annotation.id.clone())).await?;
        Ok(annotation.clone().with_id(AnnotationId::new(self.server_id())))
    }

    async fn update_annotation(&self, annotation: &Annotation) -> Result<Annotation, RemoteError> {
        self.enter("update_annotation", ApiCall::UpdateAnnotation(annotation.id.clone())).await?;
        Ok(annotation.clone())
    }

    async fn delete_annotation(&self, id: &AnnotationId) -> Result<(), RemoteError> {
        self.enter("delete_annotation", ApiCall::DeleteAnnotation(id.clone())).await
    }

    async fn create_relation(
        &self,
        _document_id: &str,
        relation: &RelationGroup,
    ) -> Result<RelationGroup, RemoteError> {
        self.enter("create_relation", ApiCall::CreateRelation(relation.id.clone())).await?;
        Ok(relation.clone().with_id(RelationId::new(self.server_id())))
    }

    async fn update_relations(
        &self,
        relations: &[RelationGroup],
    ) -> Result<Vec<RelationGroup>, RemoteError> {
        self.enter("update_relations", ApiCall::UpdateRelations(relations.to_vec())).await?;
        Ok(relations.to_vec())
    }

    async fn delete_relations(&self, ids: &[RelationId]) -> Result<(), RemoteError> {
        self.enter("delete_relations", ApiCall::DeleteRelations(ids.to_vec())).await
    }

    async fn add_doc_type(
        &self,
        _document_id: &str,
        doc_type: &DocTypeAnnotation,
    ) -> Result<DocTypeAnnotation, RemoteError> {
        self.enter("add_doc_type", ApiCall::AddDocType(doc_type.id.clone())).await?;
        let mut saved = doc_type.clone();
        saved.id = AnnotationId::new(self.server_id());
        Ok(saved)
    }

    async fn remove_doc_type(&self, id: &AnnotationId) -> Result<(), RemoteError> {
        self.enter("remove_doc_type", ApiCall::RemoveDocType(id.clone())).await
    }
}

// =========================================================================
// FakeLoader
// =========================================================================

pub struct FakeLoader {
    pub result: Result<Vec<PageTokens>, RemoteError>,
}

impl FakeLoader {
    pub fn pages(pages: Vec<PageTokens>) -> Arc<Self> {
        Arc::new(Self { result: Ok(pages) })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self { result: Err(RemoteError::new(message)) })
    }
}

#[async_trait]
impl TokenLoader for FakeLoader {
    async fn load_tokens(&self, _document: &DocumentInfo) -> Result<Vec<PageTokens>, RemoteError> {
        self.result.clone()
    }
}

/// One line of 18x10 word tokens spaced 20px apart
pub fn line_of_words(page: u32, words: &[&str]) -> PageTokens {
    let tokens = words
        .iter()
        .enumerate()
        .map(|(i, w)| Token::new(i as u32, i as f64 * 20.0, 0.0, 18.0, 10.0).with_text(*w))
        .collect();
    PageTokens { page, tokens }
}

// =========================================================================
// FakeRenderer / RecordingSink
// =========================================================================

pub struct FakeRenderer;

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(
        &self,
        request: RenderRequest,
        _cancel: CancellationToken,
    ) -> Result<RenderedPage, RenderError> {
        Ok(RenderedPage { width: 600.0 * request.scale, height: 800.0 * request.scale })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.notifications.lock())
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}
