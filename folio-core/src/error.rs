//! Error types for the editing engine

use crate::node::NodeKey;
use folio_types::{ApiError, ReferenceId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    /// Persisted or imported data does not describe a valid tree
    #[error("Malformed node: {0}")]
    MalformedNode(String),

    #[error("Upload of image {node} failed: {source}")]
    UploadFailed {
        node: NodeKey,
        #[source]
        source: ApiError,
    },

    #[error("Image of {size} bytes exceeds the upload limit of {limit} bytes")]
    UploadTooLarge { size: usize, limit: usize },

    #[error("Resolving reference {reference} failed: {source}")]
    ResolveFailed {
        reference: ReferenceId,
        #[source]
        source: ApiError,
    },

    /// A second update scope was opened while one is still active
    #[error("A transaction is already open on this editor")]
    ConcurrentTransaction,

    #[error("Mutation attempted outside of a transaction")]
    NoTransaction,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Document service error: {0}")]
    Api(#[from] ApiError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
