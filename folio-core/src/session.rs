//! One editor bound to one remote document.

use crate::api::DocumentApi;
use crate::config::Config;
use crate::editor::Editor;
use crate::error::{EditorError, Result};
use crate::node::NodeType;
use crate::resources::{shared, ResourceBinder, SharedEditor};
use crate::serialized::SerializedEditorState;
use folio_types::{
    CreateDocument, DocId, DocumentMetadata, DocumentPatch, DocumentRecord, Encoding, OwnerId,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct DocumentSession {
    api: Arc<dyn DocumentApi>,
    record: DocumentRecord,
    editor: SharedEditor,
    binder: Arc<ResourceBinder>,
    saved_seq: u64,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("id", &self.record.id)
            .field("saved_seq", &self.saved_seq)
            .finish()
    }
}

impl DocumentSession {
    /// Fetch a document and load its content into a fresh editor
    pub async fn open(
        api: Arc<dyn DocumentApi>,
        owner: &OwnerId,
        id: &DocId,
        config: Config,
    ) -> Result<Self> {
        let record = api.fetch_document(owner, id).await?;
        if record.encoding != Encoding::Json {
            return Err(EditorError::MalformedNode(format!(
                "document {id} is not an editor document"
            )));
        }

        let max_upload_bytes = config.images.max_upload_bytes;
        let mut editor = Editor::with_config(config);
        if !record.serialized_content.trim().is_empty() {
            editor.load_json(&record.serialized_content)?;
        }
        let saved_seq = editor.seq();
        debug!(%id, blocks = editor.children(editor.root())?.len(), "opened document");

        let binder = ResourceBinder::new(Arc::clone(&api), record.owner_id.clone())
            .with_document(record.id.clone())
            .with_max_upload_bytes(max_upload_bytes);
        Ok(Self {
            api,
            record,
            editor: shared(editor),
            binder: Arc::new(binder),
            saved_seq,
        })
    }

    /// Create an empty document and open it
    pub async fn create(
        api: Arc<dyn DocumentApi>,
        title: Option<&str>,
        config: Config,
    ) -> Result<Self> {
        let created = api
            .create_document(CreateDocument {
                parent_id: None,
                metadata: DocumentMetadata {
                    title: title.map(str::to_string),
                    ..DocumentMetadata::with_type("document")
                },
                content: SerializedEditorState::new(Vec::new()).to_json()?,
                encoding: Encoding::Json,
            })
            .await?;
        info!(id = %created.id, "created document");
        Self::open(api, &created.owner_id, &created.id, config).await
    }

    pub fn id(&self) -> &DocId {
        &self.record.id
    }

    pub fn record(&self) -> &DocumentRecord {
        &self.record
    }

    pub fn editor(&self) -> &SharedEditor {
        &self.editor
    }

    pub fn binder(&self) -> &Arc<ResourceBinder> {
        &self.binder
    }

    /// Whether commits happened since the last load or save
    pub fn is_dirty(&self) -> bool {
        self.editor.lock().seq() != self.saved_seq
    }

    /// Stored title, or the text of the first heading
    pub fn title(&self) -> Option<String> {
        if let Some(title) = &self.record.metadata.title {
            return Some(title.clone());
        }
        let editor = self.editor.lock();
        editor
            .nodes_of_type(NodeType::Heading)
            .first()
            .map(|heading| editor.text_content(*heading).trim().to_string())
            .filter(|title| !title.is_empty())
    }

    /// Persist the current content and title
    pub async fn save(&mut self) -> Result<()> {
        let (content, seq) = {
            let editor = self.editor.lock();
            (editor.to_json()?, editor.seq())
        };
        let metadata = DocumentMetadata {
            title: self.title(),
            ..self.record.metadata.clone()
        };
        let record = self
            .api
            .update_document(
                &self.record.id,
                DocumentPatch {
                    metadata: Some(metadata),
                    content: Some(content),
                },
            )
            .await?;
        debug!(id = %record.id, seq, "saved document");
        self.record = record;
        self.saved_seq = seq;
        Ok(())
    }
}
