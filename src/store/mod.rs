//! JSON key/value persistence.
//!
//! Each key is one `<key>.json` file under the data directory. Every
//! persisted entity sits behind exactly one repository in this module tree;
//! no other code touches the key strings.

mod analyses;
mod cache;
mod prompts;
mod settings;

pub use analyses::AnalysisRepository;
pub use cache::{DocumentCache, NewCachedDocument};
pub use prompts::PromptRepository;
pub use settings::{Settings, SettingsSnapshot};

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::error::{AppError, Result};

pub const SAVED_PROMPTS_KEY: &str = "drive-analyzer-saved-prompts";
pub const SAVED_ANALYSES_KEY: &str = "drive-analyzer-saved-analyses";
pub const CUSTOM_INSTRUCTIONS_KEY: &str = "drive-analyzer-custom-instructions";
pub const WEBHOOK_URL_KEY: &str = "drive-analyzer-webhook-url";
pub const DOCUMENT_CACHE_KEY: &str = "drive-analyzer-document-cache";
pub const PREFERRED_MODEL_KEY: &str = "drive-analyzer-preferred-model";

/// Directory of JSON values addressed by key.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Storage(format!("Failed to create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Reads a value. Missing keys and malformed JSON both read as `None`;
    /// the latter is logged.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Malformed JSON under {}, using default: {}", key, e);
                None
            }
        }
    }

    /// Writes through a uniquely named temp file in the same directory, so
    /// concurrent writers never share a scratch path and readers only ever
    /// see a complete file.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, value)?;
        tmp.flush()?;
        tmp.persist(self.path_for(key)).map_err(|e| AppError::from(e.error))?;
        debug!("Persisted {}", key);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A persisted list with change notification.
pub(crate) struct Collection<T> {
    storage: Storage,
    key: &'static str,
    tx: watch::Sender<Vec<T>>,
}

impl<T> Collection<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub(crate) fn load(storage: Storage, key: &'static str) -> Self {
        let items: Vec<T> = storage.get(key).unwrap_or_default();
        let (tx, _rx) = watch::channel(items);
        Self { storage, key, tx }
    }

    pub(crate) fn list(&self) -> Vec<T> {
        self.tx.borrow().clone()
    }

    pub(crate) fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.tx.borrow().iter().find(|item| pred(item)).cloned()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.tx.subscribe()
    }

    /// Applies `f` to a copy of the list and persists it. The in-memory list
    /// only changes when both `f` and the write succeed.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R>) -> Result<R> {
        let mut outcome = None;
        self.tx.send_if_modified(|items| {
            let mut next = items.clone();
            let result = f(&mut next).and_then(|r| {
                self.storage.set(self.key, &next)?;
                Ok(r)
            });
            let changed = result.is_ok();
            if changed {
                *items = next;
            }
            outcome = Some(result);
            changed
        });
        outcome.unwrap_or_else(|| Err(AppError::Storage(format!("Update of {} did not run", self.key))))
    }

    /// Empties the list and removes its key.
    pub(crate) fn clear(&self) -> Result<()> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|items| match self.storage.remove(self.key) {
            Ok(()) => {
                let changed = !items.is_empty();
                items.clear();
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}

/// All repositories over one storage directory.
pub struct Store {
    pub analyses: AnalysisRepository,
    pub prompts: PromptRepository,
    pub cache: DocumentCache,
    pub settings: Settings,
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let storage = Storage::open(dir)?;
        Ok(Self {
            analyses: AnalysisRepository::new(storage.clone()),
            prompts: PromptRepository::new(storage.clone()),
            cache: DocumentCache::new(storage.clone()),
            settings: Settings::new(storage),
        })
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn malformed_json_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        fs::write(storage.path_for("broken"), "{not json").unwrap();

        let value: Option<Vec<String>> = storage.get("broken");
        assert!(value.is_none());
    }

    #[test]
    fn set_then_remove_round_trips() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage.set("k", &vec!["a", "b"]).unwrap();
        assert_eq!(storage.get::<Vec<String>>("k").unwrap(), vec!["a", "b"]);

        storage.remove("k").unwrap();
        assert!(!storage.path_for("k").exists());
        storage.remove("k").unwrap();
    }

    #[test]
    fn failed_update_leaves_list_untouched() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let collection: Collection<String> = Collection::load(storage, "items");

        collection.update(|items| {
            items.push("one".to_string());
            Ok(())
        })
        .unwrap();
        let err = collection.update(|items| {
            items.push("two".to_string());
            Err::<(), _>(AppError::Validation("nope".to_string()))
        });

        assert!(err.is_err());
        assert_eq!(collection.list(), vec!["one".to_string()]);
    }

    #[test]
    fn subscribers_see_updates() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let collection: Collection<u32> = Collection::load(storage, "numbers");
        let mut rx = collection.subscribe();

        collection.update(|items| {
            items.push(7);
            Ok(())
        })
        .unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec![7]);
    }
}
