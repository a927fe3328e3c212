//! Import, list and render documents in a local store file.

use super::{load_config, read_document, render};
use crate::{DocFormat, OrderArg};
use anyhow::{Context, Result};
use folio_core::{DocumentApi, DocumentSession, MemoryDocumentStore};
use folio_types::{DocId, Direction, ListFilters, ListOrdering, ListQuery, OrderField, OwnerId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct StoreArgs {
    pub path: PathBuf,
    pub owner: String,
    pub config: PathBuf,
}

impl StoreArgs {
    fn open(&self) -> Result<Arc<MemoryDocumentStore>> {
        let store =
            MemoryDocumentStore::load_from_file(OwnerId::new(self.owner.as_str()), &self.path)
                .with_context(|| format!("Failed to open store {}", self.path.display()))?;
        Ok(Arc::new(store))
    }

    fn save(&self, store: &MemoryDocumentStore) -> Result<()> {
        store
            .save_to_file(&self.path)
            .with_context(|| format!("Failed to write store {}", self.path.display()))
    }
}

pub async fn import_document(
    args: &StoreArgs,
    input: &Path,
    from: Option<DocFormat>,
    title: Option<&str>,
) -> Result<()> {
    let config = load_config(&args.config)?;
    let editor = read_document(input, from, config.clone())?;
    let store = args.open()?;
    let api: Arc<dyn DocumentApi> = store.clone();

    let mut session = DocumentSession::create(api, title, config)
        .await
        .context("Failed to create document")?;
    session.editor().lock().set_state(&editor.snapshot())?;
    session.save().await.context("Failed to save document")?;
    args.save(&store)?;

    println!("{}", session.id());
    Ok(())
}

pub struct ListOptions {
    pub offset: usize,
    pub limit: usize,
    pub order: OrderArg,
    pub asc: bool,
    pub public: bool,
    pub json: bool,
}

pub async fn list_documents(args: &StoreArgs, opts: ListOptions) -> Result<()> {
    let store = args.open()?;
    let query = ListQuery {
        owner_id: Some(store.owner().clone()),
        offset: opts.offset,
        limit: opts.limit,
        filters: ListFilters {
            public_only: opts.public,
        },
        ordering: ListOrdering {
            field: match opts.order {
                OrderArg::Created => OrderField::CreatedAt,
                OrderArg::Updated => OrderField::UpdatedAt,
                OrderArg::Title => OrderField::Title,
            },
            direction: if opts.asc {
                Direction::Asc
            } else {
                Direction::Desc
            },
        },
    };
    let page = store
        .list_documents(query)
        .await
        .context("Failed to list documents")?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    println!("{} of {} documents", page.items.len(), page.total_count);
    for record in &page.items {
        println!(
            "{}\t{}\t{}",
            record.id,
            record.updated_at.to_rfc3339(),
            record.metadata.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}

pub async fn show_document(args: &StoreArgs, id: &str, to: DocFormat) -> Result<()> {
    let config = load_config(&args.config)?;
    let store = args.open()?;
    let api: Arc<dyn DocumentApi> = store.clone();
    let owner = store.owner().clone();

    let session = DocumentSession::open(api, &owner, &DocId::new(id), config)
        .await
        .with_context(|| format!("Failed to open document {id}"))?;
    let rendered = render(&session.editor().lock(), to)?;
    println!("{rendered}");
    Ok(())
}
