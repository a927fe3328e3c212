//! # folio-core
//!
//! Core library for the folio rich-text document engine.
//!
//! The crate is built around an [`Editor`]: an arena of typed nodes that is
//! only mutated inside transactions. Committed transactions produce a
//! [`MutationBatch`] that listeners (like the code gutter) react to.
//!
//! On top of the node model sit the format converters (Markdown import,
//! export and typing shortcuts in [`markdown`], HTML paste and export in
//! [`html`]) and the async image binding in [`resources`] which talks to a
//! [`DocumentApi`].

pub mod api;
pub mod autolink;
pub mod config;
pub mod editor;
pub mod error;
pub mod gutter;
pub mod highlight;
pub mod html;
pub mod markdown;
pub mod mutation;
pub mod node;
pub mod resources;
pub mod selection;
pub mod serialized;
pub mod session;
pub mod store;
pub mod trailing;

pub use api::{ApiResult, DocumentApi};
pub use autolink::AutoLinker;
pub use config::Config;
pub use editor::{Editor, Phase};
pub use error::{EditorError, Result};
pub use gutter::{gutter_text, CodeGutterListener};
pub use highlight::CodeHighlighter;
pub use html::{export_html, import_html, HtmlRules};
pub use markdown::{MarkdownShortcuts, Transformer, Transformers};
pub use mutation::{Decoration, MutationBatch, MutationKind, MutationListener, NodeTransform};
pub use node::{ImageSource, NodeKey, NodeKind, NodeType, TextFormat};
pub use resources::{shared, ResolutionState, ResourceBinder, SharedEditor};
pub use selection::Caret;
pub use serialized::{SerializedEditorState, SerializedNode};
pub use session::DocumentSession;
pub use store::MemoryDocumentStore;
pub use trailing::TrailingParagraph;
