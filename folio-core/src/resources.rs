//! Async binding of image nodes to the document service.
//!
//! Image nodes persist only an [`ImageSource`]. Turning a remote reference
//! into something displayable, and uploading freshly inserted images, are
//! asynchronous round trips through a [`DocumentApi`]. The editor itself
//! stays synchronous: a resolution is split into [`Editor::begin_resolve`],
//! which hands out a [`ResolveTicket`], and [`Editor::complete_resolve`],
//! which applies the outcome only if the ticket is still the current one and
//! the node is still attached.
//!
//! [`ResourceBinder`] drives those round trips for an editor shared as
//! [`SharedEditor`]. The editor lock is never held across an `.await`.

use crate::api::DocumentApi;
use crate::editor::Editor;
use crate::error::{EditorError, Result};
use crate::node::{ImageSource, NodeKey, NodeKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use folio_types::{
    ApiError, CreateDocument, DocId, DocumentMetadata, Encoding, OwnerId, ReferenceId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// An editor shared between the editing surface and resource tasks
pub type SharedEditor = Arc<Mutex<Editor>>;

pub fn shared(editor: Editor) -> SharedEditor {
    Arc::new(Mutex::new(editor))
}

/// Display state of one image node. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Resolved(String),
    /// The node has no source at all
    Empty,
    /// Rendered as a broken image
    Failed(String),
}

#[derive(Debug, Clone)]
struct Binding {
    token: u64,
    state: ResolutionState,
}

/// Per-editor resolution bookkeeping: the current request token and state
/// of each image node, and the reference → URI cache.
#[derive(Debug, Default)]
pub struct ImageBindings {
    bindings: HashMap<NodeKey, Binding>,
    cache: HashMap<ReferenceId, String>,
    next_token: u64,
}

impl ImageBindings {
    fn issue(&mut self, key: NodeKey) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        self.bindings.insert(
            key,
            Binding {
                token,
                state: ResolutionState::Resolving,
            },
        );
        token
    }

    fn settle(&mut self, key: NodeKey, state: ResolutionState) {
        match self.bindings.get_mut(&key) {
            Some(binding) => binding.state = state,
            None => {
                self.bindings.insert(key, Binding { token: 0, state });
            }
        }
    }

    fn state(&self, key: NodeKey) -> Option<&ResolutionState> {
        self.bindings.get(&key).map(|b| &b.state)
    }

    pub fn cached(&self, reference: &ReferenceId) -> Option<&str> {
        self.cache.get(reference).map(String::as_str)
    }

    pub(crate) fn remember(&mut self, reference: ReferenceId, uri: String) {
        self.cache.insert(reference, uri);
    }

    /// Drop the bookkeeping of a collected node. Cached URIs are kept.
    pub(crate) fn forget(&mut self, key: NodeKey) {
        self.bindings.remove(&key);
    }
}

/// One outstanding resolution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveTicket {
    pub node: NodeKey,
    pub reference: ReferenceId,
    token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveStart {
    /// Nothing to fetch: empty source, local preview or cached reference
    Ready(ResolutionState),
    /// A request must be made; complete it with the ticket
    Pending(ResolveTicket),
}

/// What happened to a completed resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer request for the node was issued, or its source changed
    Stale,
    /// The node left the tree while the request was in flight
    Detached,
}

impl Editor {
    fn image_source(&self, key: NodeKey) -> Result<&ImageSource> {
        match self.node(key)?.kind() {
            NodeKind::Image { src, .. } => Ok(src),
            other => Err(EditorError::InvalidStructure(format!(
                "{key} is a {} node, not an image",
                other.node_type()
            ))),
        }
    }

    /// Current display state of an image node
    pub fn image_state(&self, key: NodeKey) -> Result<ResolutionState> {
        let src = self.image_source(key)?;
        if let Some(state) = self.images.state(key) {
            return Ok(state.clone());
        }
        Ok(match src {
            ImageSource::Empty => ResolutionState::Empty,
            ImageSource::Local(uri) | ImageSource::Url(uri) => {
                ResolutionState::Resolved(uri.clone())
            }
            ImageSource::Remote(reference) => match self.images.cached(reference) {
                Some(uri) => ResolutionState::Resolved(uri.to_string()),
                None => ResolutionState::Unresolved,
            },
        })
    }

    /// URI to draw for an image node, if one is known yet
    pub fn image_display_uri(&self, key: NodeKey) -> Option<String> {
        match self.image_state(key).ok()? {
            ResolutionState::Resolved(uri) => Some(uri),
            _ => None,
        }
    }

    /// Start resolving an image. Issuing a ticket supersedes any request
    /// still pending for the same node.
    pub fn begin_resolve(&mut self, key: NodeKey) -> Result<ResolveStart> {
        let ready = match self.image_source(key)? {
            ImageSource::Empty => ResolutionState::Empty,
            ImageSource::Local(uri) | ImageSource::Url(uri) => {
                ResolutionState::Resolved(uri.clone())
            }
            ImageSource::Remote(reference) => match self.images.cached(reference) {
                Some(uri) => ResolutionState::Resolved(uri.to_string()),
                None => {
                    let reference = reference.clone();
                    let token = self.images.issue(key);
                    return Ok(ResolveStart::Pending(ResolveTicket {
                        node: key,
                        reference,
                        token,
                    }));
                }
            },
        };
        self.images.settle(key, ready.clone());
        Ok(ResolveStart::Ready(ready))
    }

    /// Apply the outcome of a request started by [`begin_resolve`](Self::begin_resolve).
    /// Outcomes for detached nodes and superseded tickets are discarded.
    pub fn complete_resolve(
        &mut self,
        ticket: &ResolveTicket,
        outcome: std::result::Result<String, ApiError>,
    ) -> Completion {
        if !self.contains(ticket.node) || !self.is_attached(ticket.node) {
            debug!(node = %ticket.node, "dropping resolution for detached image");
            return Completion::Detached;
        }
        let current = self.images.bindings.get(&ticket.node).map(|b| b.token);
        if current != Some(ticket.token) {
            return Completion::Stale;
        }
        match self.image_source(ticket.node) {
            Ok(ImageSource::Remote(reference)) if *reference == ticket.reference => {}
            _ => return Completion::Stale,
        }

        let state = match outcome {
            Ok(uri) => {
                self.images.remember(ticket.reference.clone(), uri.clone());
                ResolutionState::Resolved(uri)
            }
            Err(err) => ResolutionState::Failed(err.to_string()),
        };
        self.images.settle(ticket.node, state);
        Completion::Applied
    }
}

/// Split a base64 data URI into its MIME type and payload
fn parse_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, payload))
}

/// Uploads and resolves images of one document on behalf of its owner
pub struct ResourceBinder {
    api: Arc<dyn DocumentApi>,
    owner: OwnerId,
    document: Option<DocId>,
    max_upload_bytes: usize,
}

impl std::fmt::Debug for ResourceBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBinder")
            .field("owner", &self.owner)
            .field("document", &self.document)
            .finish()
    }
}

impl ResourceBinder {
    pub fn new(api: Arc<dyn DocumentApi>, owner: OwnerId) -> Self {
        Self {
            api,
            owner,
            document: None,
            max_upload_bytes: crate::config::ImageConfig::default().max_upload_bytes,
        }
    }

    /// Attach uploads to `document` as child documents
    pub fn with_document(mut self, document: DocId) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Insert an image showing a local preview, then upload it and point the
    /// node at the stored reference.
    ///
    /// On upload failure the node stays in the tree with its preview and
    /// [`EditorError::UploadFailed`] names it, so the caller can
    /// [`retry_upload`](Self::retry_upload) or remove it.
    pub async fn insert_image(
        &self,
        editor: &SharedEditor,
        parent: NodeKey,
        index: usize,
        bytes: &[u8],
        mime: &str,
        alt: &str,
    ) -> Result<NodeKey> {
        if bytes.len() > self.max_upload_bytes {
            return Err(EditorError::UploadTooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }
        let preview = format!("data:{mime};base64,{}", STANDARD.encode(bytes));
        let key = editor.lock().update(|ed| {
            let key = ed.create(NodeKind::image(ImageSource::Local(preview), alt))?;
            ed.insert(parent, index, key)?;
            Ok(key)
        })?;
        self.upload(editor, key).await?;
        Ok(key)
    }

    /// Upload an image that still shows its local preview
    pub async fn retry_upload(&self, editor: &SharedEditor, node: NodeKey) -> Result<()> {
        self.upload(editor, node).await
    }

    async fn upload(&self, editor: &SharedEditor, node: NodeKey) -> Result<()> {
        let preview = {
            let ed = editor.lock();
            match ed.image_source(node)? {
                ImageSource::Local(uri) => uri.clone(),
                _ => {
                    return Err(EditorError::InvalidStructure(format!(
                        "image {node} has no local data to upload"
                    )))
                }
            }
        };
        let (mime, payload) = parse_data_uri(&preview).ok_or_else(|| {
            EditorError::InvalidStructure(format!("image {node} preview is not a base64 data URI"))
        })?;

        let request = CreateDocument {
            parent_id: self.document.clone(),
            metadata: DocumentMetadata {
                mime: Some(mime.to_string()),
                ..DocumentMetadata::with_type("image")
            },
            content: payload.to_string(),
            encoding: Encoding::Base64,
        };
        let created = match self.api.create_document(request).await {
            Ok(created) => created,
            Err(source) => {
                warn!(node = %node, "image upload failed: {source}");
                return Err(EditorError::UploadFailed { node, source });
            }
        };
        let reference = ReferenceId::from(created.id);

        let mut ed = editor.lock();
        // The preview is as good as the stored blob
        ed.images.remember(reference.clone(), preview.clone());
        if !ed.is_attached(node) {
            debug!(node = %node, %reference, "image removed before upload finished");
            return Ok(());
        }
        if !matches!(ed.image_source(node)?, ImageSource::Local(uri) if *uri == preview) {
            return Ok(());
        }
        ed.update(|ed| ed.set_image_source(node, ImageSource::Remote(reference.clone())))?;
        debug!(node = %node, %reference, "image uploaded");
        Ok(())
    }

    /// Resolve an image node to a displayable URI.
    ///
    /// Returns `Ok(None)` when there is nothing to show from this call: the
    /// source is empty, a newer request superseded this one, or the node was
    /// removed meanwhile. A failure that is still current marks the image
    /// `Failed` and is returned as [`EditorError::ResolveFailed`].
    pub async fn resolve(&self, editor: &SharedEditor, node: NodeKey) -> Result<Option<String>> {
        let start = editor.lock().begin_resolve(node)?;
        let ticket = match start {
            ResolveStart::Ready(ResolutionState::Resolved(uri)) => return Ok(Some(uri)),
            ResolveStart::Ready(_) => return Ok(None),
            ResolveStart::Pending(ticket) => ticket,
        };

        let outcome = match self.api.resolve_reference(&self.owner, &ticket.reference).await {
            Ok(resolved) => resolved
                .uri
                .ok_or_else(|| ApiError::NotFound(format!("no uri for {}", ticket.reference))),
            Err(err) => Err(err),
        };

        let completion = editor.lock().complete_resolve(&ticket, outcome.clone());
        match (completion, outcome) {
            (Completion::Applied, Ok(uri)) => Ok(Some(uri)),
            (Completion::Applied, Err(source)) => {
                warn!(node = %node, reference = %ticket.reference, "image resolution failed: {source}");
                Err(EditorError::ResolveFailed {
                    reference: ticket.reference,
                    source,
                })
            }
            (Completion::Stale | Completion::Detached, _) => Ok(None),
        }
    }

    /// Resolve in the background; the editing surface keeps going and sees
    /// the outcome through [`Editor::image_state`].
    pub fn spawn_resolve(
        self: &Arc<Self>,
        editor: SharedEditor,
        node: NodeKey,
    ) -> tokio::task::JoinHandle<Result<Option<String>>> {
        let binder = Arc::clone(self);
        tokio::spawn(async move { binder.resolve(&editor, node).await })
    }

    /// Resolve every image of the document that is not resolved yet
    pub async fn resolve_all(&self, editor: &SharedEditor) -> Vec<(NodeKey, Result<Option<String>>)> {
        let images = editor.lock().nodes_of_type(crate::node::NodeType::Image);
        let mut results = Vec::with_capacity(images.len());
        for node in images {
            results.push((node, self.resolve(editor, node).await));
        }
        results
    }
}
