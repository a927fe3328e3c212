//! In-memory document service.
//!
//! [`MemoryDocumentStore`] implements [`DocumentApi`] for one authenticated
//! owner. It backs the CLI and the test suite. Binary sub-resources are child
//! documents whose resolved URI is a `data:` URI built from the stored
//! base64 payload.

use crate::api::{ApiResult, DocumentApi};
use async_trait::async_trait;
use chrono::Utc;
use folio_types::{
    ApiError, CreateDocument, CreatedDocument, DocId, DocumentPage, DocumentPatch, DocumentRecord,
    Direction, Encoding, ListQuery, OrderField, OwnerId, ReferenceId, ResolvedReference,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    record: DocumentRecord,
    /// Insertion order, breaks timestamp ties
    seq: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    documents: BTreeMap<DocId, StoredDocument>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct MemoryDocumentStore {
    owner: OwnerId,
    state: RwLock<StoreState>,
}

impl MemoryDocumentStore {
    /// A store acting on behalf of `owner`
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            state: RwLock::new(StoreState::default()),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a record as-is (another owner's document, fixtures)
    pub fn insert_record(&self, record: DocumentRecord) {
        let mut state = self.state.write();
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .documents
            .insert(record.id.clone(), StoredDocument { record, seq });
    }

    /// Load a store snapshot written by [`save_to_file`](Self::save_to_file).
    /// A missing file yields an empty store.
    pub fn load_from_file(owner: OwnerId, path: &Path) -> anyhow::Result<Self> {
        let store = Self::new(owner);
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            *store.state.write() = serde_json::from_str(&contents)?;
        }
        Ok(store)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&*self.state.read())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn get(&self, id: &DocId) -> ApiResult<DocumentRecord> {
        self.state
            .read()
            .documents
            .get(id)
            .map(|doc| doc.record.clone())
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }
}

fn compare(a: &StoredDocument, b: &StoredDocument, field: OrderField) -> Ordering {
    let primary = match field {
        OrderField::CreatedAt => a.record.created_at.cmp(&b.record.created_at),
        OrderField::UpdatedAt => a.record.updated_at.cmp(&b.record.updated_at),
        OrderField::Title => a.record.metadata.title.cmp(&b.record.metadata.title),
    };
    primary.then(a.seq.cmp(&b.seq))
}

#[async_trait]
impl DocumentApi for MemoryDocumentStore {
    async fn fetch_document(&self, owner: &OwnerId, id: &DocId) -> ApiResult<DocumentRecord> {
        let record = self.get(id)?;
        if &record.owner_id != owner {
            return Err(ApiError::NotFound(id.to_string()));
        }
        if record.owner_id != self.owner && !record.metadata.public {
            return Err(ApiError::Forbidden(id.to_string()));
        }
        Ok(record)
    }

    async fn create_document(&self, input: CreateDocument) -> ApiResult<CreatedDocument> {
        if let Some(parent) = &input.parent_id {
            let parent = self.get(parent)?;
            if parent.owner_id != self.owner {
                return Err(ApiError::Forbidden(parent.id.to_string()));
            }
        }
        if input.encoding == Encoding::Base64 {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD
                .decode(&input.content)
                .map_err(|e| ApiError::Invalid(format!("content is not base64: {e}")))?;
        }

        let now = Utc::now();
        let record = DocumentRecord {
            id: DocId::new(Uuid::new_v4().to_string()),
            owner_id: self.owner.clone(),
            parent_id: input.parent_id,
            created_at: now,
            updated_at: now,
            metadata: input.metadata,
            serialized_content: input.content,
            encoding: input.encoding,
        };
        let created = CreatedDocument {
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
        };
        self.insert_record(record);
        Ok(created)
    }

    async fn update_document(&self, id: &DocId, patch: DocumentPatch) -> ApiResult<DocumentRecord> {
        let mut state = self.state.write();
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        if doc.record.owner_id != self.owner {
            return Err(ApiError::Forbidden(id.to_string()));
        }
        if let Some(metadata) = patch.metadata {
            doc.record.metadata = metadata;
        }
        if let Some(content) = patch.content {
            doc.record.serialized_content = content;
        }
        doc.record.updated_at = Utc::now();
        Ok(doc.record.clone())
    }

    async fn resolve_reference(
        &self,
        owner: &OwnerId,
        reference: &ReferenceId,
    ) -> ApiResult<ResolvedReference> {
        let record = self.fetch_document(owner, &DocId::new(reference.as_str())).await?;
        let uri = match (record.encoding, &record.metadata.mime) {
            (Encoding::Base64, Some(mime)) => Some(format!(
                "data:{mime};base64,{}",
                record.serialized_content
            )),
            (Encoding::Base64, None) => Some(format!(
                "data:application/octet-stream;base64,{}",
                record.serialized_content
            )),
            _ => None,
        };
        Ok(ResolvedReference {
            id: reference.clone(),
            uri,
        })
    }

    async fn list_documents(&self, query: ListQuery) -> ApiResult<DocumentPage> {
        let state = self.state.read();
        let mut matching: Vec<&StoredDocument> = state
            .documents
            .values()
            .filter(|doc| doc.record.parent_id.is_none())
            .filter(|doc| {
                query
                    .owner_id
                    .as_ref()
                    .map_or(true, |owner| &doc.record.owner_id == owner)
            })
            .filter(|doc| doc.record.owner_id == self.owner || doc.record.metadata.public)
            .filter(|doc| !query.filters.public_only || doc.record.metadata.public)
            .collect();

        matching.sort_by(|a, b| {
            let ord = compare(a, b, query.ordering.field);
            match query.ordering.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });

        let total_count = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|doc| doc.record.clone())
            .collect();
        Ok(DocumentPage { items, total_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::{DocumentMetadata, ListFilters, ListOrdering};

    fn create(title: &str, public: bool) -> CreateDocument {
        CreateDocument {
            parent_id: None,
            metadata: DocumentMetadata {
                title: Some(title.into()),
                public,
                ..Default::default()
            },
            content: "{}".into(),
            encoding: Encoding::Json,
        }
    }

    #[tokio::test]
    async fn create_then_fetch() {
        let owner = OwnerId::new("alice");
        let store = MemoryDocumentStore::new(owner.clone());
        let created = store.create_document(create("Notes", false)).await.unwrap();
        assert_eq!(created.owner_id, owner);

        let record = store.fetch_document(&owner, &created.id).await.unwrap();
        assert_eq!(record.metadata.title.as_deref(), Some("Notes"));
        assert_eq!(record.serialized_content, "{}");

        let missing = store
            .fetch_document(&OwnerId::new("bob"), &created.id)
            .await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_touches_only_given_fields() {
        let owner = OwnerId::new("alice");
        let store = MemoryDocumentStore::new(owner.clone());
        let created = store.create_document(create("Old", false)).await.unwrap();
        let updated = store
            .update_document(
                &created.id,
                DocumentPatch {
                    content: Some("[1]".into()),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.serialized_content, "[1]");
        assert_eq!(updated.metadata.title.as_deref(), Some("Old"));
        assert!(updated.updated_at >= updated.created_at);
    }

    #[tokio::test]
    async fn blobs_resolve_to_data_uris() {
        let owner = OwnerId::new("alice");
        let store = MemoryDocumentStore::new(owner.clone());
        let doc = store.create_document(create("Doc", false)).await.unwrap();
        let blob = store
            .create_document(CreateDocument {
                parent_id: Some(doc.id.clone()),
                metadata: DocumentMetadata {
                    mime: Some("image/png".into()),
                    ..DocumentMetadata::with_type("image")
                },
                content: "iVBORw0KGgo=".into(),
                encoding: Encoding::Base64,
            })
            .await
            .unwrap();

        let resolved = store
            .resolve_reference(&owner, &ReferenceId::from(blob.id))
            .await
            .unwrap();
        assert_eq!(
            resolved.uri.as_deref(),
            Some("data:image/png;base64,iVBORw0KGgo=")
        );

        let page = store.list_documents(ListQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 1, "child documents are not listed");
    }

    #[tokio::test]
    async fn invalid_base64_is_rejected() {
        let store = MemoryDocumentStore::new(OwnerId::new("alice"));
        let result = store
            .create_document(CreateDocument {
                parent_id: None,
                metadata: DocumentMetadata::with_type("image"),
                content: "not base64!".into(),
                encoding: Encoding::Base64,
            })
            .await;
        assert!(matches!(result, Err(ApiError::Invalid(_))));
    }

    #[tokio::test]
    async fn list_paginates_and_orders() {
        let store = MemoryDocumentStore::new(OwnerId::new("alice"));
        for title in ["b", "a", "d", "c", "e"] {
            store.create_document(create(title, title != "c")).await.unwrap();
        }

        let query = ListQuery {
            offset: 1,
            limit: 2,
            ordering: ListOrdering {
                field: OrderField::Title,
                direction: Direction::Asc,
            },
            ..Default::default()
        };
        let page = store.list_documents(query).await.unwrap();
        let titles: Vec<_> = page
            .items
            .iter()
            .map(|r| r.metadata.title.clone().unwrap())
            .collect();
        assert_eq!(titles, vec!["b", "c"]);
        assert_eq!(page.total_count, 5);

        // Newest first by default; equal timestamps fall back to insertion
        let page = store.list_documents(ListQuery::default()).await.unwrap();
        assert_eq!(page.items[0].metadata.title.as_deref(), Some("e"));

        let public = store
            .list_documents(ListQuery {
                filters: ListFilters { public_only: true },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(public.total_count, 4);
    }

    #[test]
    fn snapshot_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let owner = OwnerId::new("alice");

        let store = MemoryDocumentStore::new(owner.clone());
        let id = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(store.create_document(create("Saved", false)))
            .unwrap()
            .id;
        store.save_to_file(&path).unwrap();

        let reloaded = MemoryDocumentStore::load_from_file(owner, &path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get(&id).unwrap().metadata.title.as_deref(),
            Some("Saved")
        );
    }
}
