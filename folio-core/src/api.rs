//! Contract of the external document service.
//!
//! The engine never talks to a transport directly. Everything it needs from
//! the outside world (loading and saving documents, storing image blobs and
//! turning blob references into URIs) goes through [`DocumentApi`].

use async_trait::async_trait;
use folio_types::{
    ApiError, CreateDocument, CreatedDocument, DocId, DocumentPage, DocumentPatch, DocumentRecord,
    ListQuery, OwnerId, ReferenceId, ResolvedReference,
};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn fetch_document(&self, owner: &OwnerId, id: &DocId) -> ApiResult<DocumentRecord>;

    /// Create a top-level document, or a binary sub-resource when
    /// `input.parent_id` is set. The owner is the authenticated caller.
    async fn create_document(&self, input: CreateDocument) -> ApiResult<CreatedDocument>;

    async fn update_document(&self, id: &DocId, patch: DocumentPatch)
        -> ApiResult<DocumentRecord>;

    /// Look up a retrievable URI for a stored resource. `uri` is absent when
    /// the resource exists but has nothing to display.
    async fn resolve_reference(
        &self,
        owner: &OwnerId,
        reference: &ReferenceId,
    ) -> ApiResult<ResolvedReference>;

    async fn list_documents(&self, query: ListQuery) -> ApiResult<DocumentPage>;
}
