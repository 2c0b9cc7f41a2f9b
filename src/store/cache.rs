use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use crate::error::{AppError, Result};
use crate::html::truncate_chars;
use crate::models::{CachedDocument, CachedDocumentType};
use crate::sources::MAX_SOURCE_CHARS;
use crate::store::{Collection, DOCUMENT_CACHE_KEY, Storage, now_millis};

/// Input for [`DocumentCache::add`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCachedDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub doc_type: CachedDocumentType,
    pub content: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub original_id: Option<String>,
    #[serde(default)]
    pub include_in_prompts: Option<bool>,
}

/// Flat cache of extracted document text. Grows until cleared.
pub struct DocumentCache {
    items: Collection<CachedDocument>,
}

impl DocumentCache {
    pub fn new(storage: Storage) -> Self {
        Self {
            items: Collection::load(storage, DOCUMENT_CACHE_KEY),
        }
    }

    pub fn list(&self) -> Vec<CachedDocument> {
        self.items.list()
    }

    pub fn get(&self, id: &str) -> Option<CachedDocument> {
        self.items.find(|d| d.id == id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<CachedDocument>> {
        self.items.subscribe()
    }

    /// Documents flagged for inclusion in every analysis run.
    pub fn included(&self) -> Vec<CachedDocument> {
        self.items.list().into_iter().filter(CachedDocument::is_included).collect()
    }

    pub fn add(&self, doc: NewCachedDocument) -> Result<CachedDocument> {
        let content = truncate_chars(&doc.content, MAX_SOURCE_CHARS).to_string();
        let cached = CachedDocument {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: doc.name,
            doc_type: doc.doc_type,
            size: doc.size.or(Some(doc.content.len() as u64)),
            content,
            mime_type: doc.mime_type,
            cached_at: now_millis(),
            original_id: doc.original_id,
            include_in_prompts: doc.include_in_prompts,
        };
        info!("Caching document {} ({} chars)", cached.name, cached.content.len());
        self.items.update(|items| {
            items.push(cached.clone());
            Ok(())
        })?;
        Ok(cached)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.items.update(|items| {
            let before = items.len();
            items.retain(|d| d.id != id);
            if items.len() == before {
                return Err(AppError::NotFound(format!("cached document {}", id)));
            }
            Ok(())
        })
    }

    pub fn set_include_in_prompts(&self, id: &str, include: bool) -> Result<CachedDocument> {
        self.items.update(|items| {
            let doc = items
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| AppError::NotFound(format!("cached document {}", id)))?;
            doc.include_in_prompts = Some(include);
            Ok(doc.clone())
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.items.clear()
    }
}
