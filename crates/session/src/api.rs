//! Boundaries to the remote services
//!
//! Transport and query shapes live behind these traits; the session only
//! needs typed results and a readable failure message.

use annotator_core::{
    Annotation, AnnotationId, DocTypeAnnotation, PageTokens, Permissions, RelationGroup, RelationId,
};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Document being annotated
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub id: String,
    pub page_count: u32,
    /// Permissions of the current user on the document itself
    #[serde(default)]
    pub permissions: Permissions,
}

#[async_trait]
pub trait TokenLoader: Send + Sync {
    /// Token layers for every page that has one
    async fn load_tokens(&self, document: &DocumentInfo) -> Result<Vec<PageTokens>, RemoteError>;
}

/// Persistence API for annotations, relations and document types
///
/// Create calls return the saved object carrying its server-assigned id.
#[async_trait]
pub trait AnnotationApi: Send + Sync {
    async fn create_annotation(
        &self,
        document_id: &str,
        annotation: &Annotation,
    ) -> Result<Annotation, RemoteError>;

    async fn update_annotation(&self, annotation: &Annotation) -> Result<Annotation, RemoteError>;

    async fn delete_annotation(&self, id: &AnnotationId) -> Result<(), RemoteError>;

    async fn create_relation(
        &self,
        document_id: &str,
        relation: &RelationGroup,
    ) -> Result<RelationGroup, RemoteError>;

    async fn update_relations(
        &self,
        relations: &[RelationGroup],
    ) -> Result<Vec<RelationGroup>, RemoteError>;

    async fn delete_relations(&self, ids: &[RelationId]) -> Result<(), RemoteError>;

    async fn add_doc_type(
        &self,
        document_id: &str,
        doc_type: &DocTypeAnnotation,
    ) -> Result<DocTypeAnnotation, RemoteError>;

    async fn remove_doc_type(&self, id: &AnnotationId) -> Result<(), RemoteError>;
}
