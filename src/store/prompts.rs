use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::models::SavedPrompt;
use crate::store::{Collection, SAVED_PROMPTS_KEY, Storage, now_millis};

/// Reusable prompt snippets, newest first.
pub struct PromptRepository {
    items: Collection<SavedPrompt>,
}

impl PromptRepository {
    pub fn new(storage: Storage) -> Self {
        Self {
            items: Collection::load(storage, SAVED_PROMPTS_KEY),
        }
    }

    pub fn list(&self) -> Vec<SavedPrompt> {
        self.items.list()
    }

    pub fn get(&self, id: &str) -> Option<SavedPrompt> {
        self.items.find(|p| p.id == id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<SavedPrompt>> {
        self.items.subscribe()
    }

    pub fn add(&self, title: &str, content: &str) -> Result<SavedPrompt> {
        let (title, content) = validate(title, content)?;
        let prompt = SavedPrompt {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            content,
            created_at: now_millis(),
        };
        self.items.update(|items| {
            items.insert(0, prompt.clone());
            Ok(())
        })?;
        Ok(prompt)
    }

    pub fn update(&self, id: &str, title: &str, content: &str) -> Result<SavedPrompt> {
        let (title, content) = validate(title, content)?;
        self.items.update(|items| {
            let prompt = items
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| AppError::NotFound(format!("prompt {}", id)))?;
            prompt.title = title;
            prompt.content = content;
            Ok(prompt.clone())
        })
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.items.update(|items| {
            let before = items.len();
            items.retain(|p| p.id != id);
            if items.len() == before {
                return Err(AppError::NotFound(format!("prompt {}", id)));
            }
            Ok(())
        })
    }
}

fn validate(title: &str, content: &str) -> Result<(String, String)> {
    if title.trim().is_empty() || content.trim().is_empty() {
        return Err(AppError::Validation(
            "Prompt title and content are required".to_string(),
        ));
    }
    Ok((title.trim().to_string(), content.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn add_update_delete() {
        let dir = TempDir::new().unwrap();
        let repo = PromptRepository::new(Storage::open(dir.path()).unwrap());

        let first = repo.add("Summary", "Summarize the documents").unwrap();
        let second = repo.add("Risks", "List the risks").unwrap();
        assert_eq!(repo.list()[0].id, second.id);

        let updated = repo.update(&first.id, "Short summary", "Two sentences").unwrap();
        assert_eq!(updated.content, "Two sentences");

        repo.delete(&second.id).unwrap();
        assert_eq!(repo.list(), vec![updated]);
        assert!(matches!(repo.delete(&second.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn prompts_survive_reload() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let saved = PromptRepository::new(storage.clone()).add("t", "c").unwrap();

        let reloaded = PromptRepository::new(storage);
        assert_eq!(reloaded.get(&saved.id), Some(saved));
    }

    #[test]
    fn blank_prompts_are_rejected() {
        let dir = TempDir::new().unwrap();
        let repo = PromptRepository::new(Storage::open(dir.path()).unwrap());
        assert!(matches!(repo.add(" ", "c"), Err(AppError::Validation(_))));
        assert!(repo.list().is_empty());
    }
}
