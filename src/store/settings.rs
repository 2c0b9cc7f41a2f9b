use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::store::{CUSTOM_INSTRUCTIONS_KEY, PREFERRED_MODEL_KEY, Storage, WEBHOOK_URL_KEY};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    #[serde(default)]
    pub custom_instructions: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub preferred_model: Option<String>,
}

/// Scalar user settings, each stored under its own key.
pub struct Settings {
    storage: Storage,
    tx: watch::Sender<SettingsSnapshot>,
}

impl Settings {
    pub fn new(storage: Storage) -> Self {
        let snapshot = SettingsSnapshot {
            custom_instructions: storage.get(CUSTOM_INSTRUCTIONS_KEY),
            webhook_url: storage.get(WEBHOOK_URL_KEY),
            preferred_model: storage.get(PREFERRED_MODEL_KEY),
        };
        let (tx, _rx) = watch::channel(snapshot);
        Self { storage, tx }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsSnapshot> {
        self.tx.subscribe()
    }

    pub fn custom_instructions(&self) -> Option<String> {
        self.tx.borrow().custom_instructions.clone()
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.tx.borrow().webhook_url.clone()
    }

    pub fn preferred_model(&self) -> Option<String> {
        self.tx.borrow().preferred_model.clone()
    }

    pub fn set_custom_instructions(&self, value: Option<&str>) -> Result<()> {
        self.store_field(CUSTOM_INSTRUCTIONS_KEY, non_blank(value), |s| &mut s.custom_instructions)
    }

    /// Only http(s) URLs are accepted.
    pub fn set_webhook_url(&self, value: Option<&str>) -> Result<()> {
        let value = non_blank(value);
        if let Some(url) = &value {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| AppError::Validation(format!("Invalid webhook URL: {}", e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::Validation(
                    "Webhook URL must use http or https".to_string(),
                ));
            }
        }
        self.store_field(WEBHOOK_URL_KEY, value, |s| &mut s.webhook_url)
    }

    pub fn set_preferred_model(&self, value: Option<&str>) -> Result<()> {
        self.store_field(PREFERRED_MODEL_KEY, non_blank(value), |s| &mut s.preferred_model)
    }

    /// Persists `value` under `key` while holding the snapshot's write lock,
    /// then updates the field. Writers to the same settings are serialized and
    /// the snapshot never holds a value the disk does not.
    fn store_field(
        &self,
        key: &str,
        value: Option<String>,
        field: impl FnOnce(&mut SettingsSnapshot) -> &mut Option<String>,
    ) -> Result<()> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|snapshot| {
            let written = match value.as_deref() {
                Some(v) => self.storage.set(key, v),
                None => self.storage.remove(key),
            };
            match written {
                Ok(()) => {
                    let slot = field(snapshot);
                    let changed = *slot != value;
                    *slot = value;
                    changed
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn settings_persist_and_clear() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let settings = Settings::new(storage.clone());

        settings.set_custom_instructions(Some("Answer in French.")).unwrap();
        settings.set_preferred_model(Some("openai/gpt-4o")).unwrap();
        assert_eq!(
            Settings::new(storage.clone()).snapshot(),
            SettingsSnapshot {
                custom_instructions: Some("Answer in French.".to_string()),
                webhook_url: None,
                preferred_model: Some("openai/gpt-4o".to_string()),
            }
        );

        settings.set_custom_instructions(Some("  ")).unwrap();
        assert!(settings.custom_instructions().is_none());
        assert!(!storage.path_for(CUSTOM_INSTRUCTIONS_KEY).exists());
    }

    #[test]
    fn webhook_url_must_be_http() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::new(Storage::open(dir.path()).unwrap());

        assert!(settings.set_webhook_url(Some("ftp://example.com/hook")).is_err());
        assert!(settings.set_webhook_url(Some("not a url")).is_err());
        settings.set_webhook_url(Some("https://example.com/hook")).unwrap();
        assert_eq!(settings.webhook_url().as_deref(), Some("https://example.com/hook"));
    }

    #[test]
    fn concurrent_writers_leave_memory_and_disk_in_agreement() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let settings = Settings::new(storage.clone());

        for round in 0..20 {
            std::thread::scope(|scope| {
                let handles = (0..8)
                    .map(|i| {
                        let settings = &settings;
                        scope.spawn(move || {
                            settings.set_custom_instructions(Some(&format!("value-{}-{}", round, i)))
                        })
                    })
                    .collect::<Vec<_>>();
                for handle in handles {
                    handle.join().unwrap().unwrap();
                }
            });

            let on_disk: Option<String> = storage.get(CUSTOM_INSTRUCTIONS_KEY);
            assert_eq!(on_disk, settings.custom_instructions());
        }

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path() != storage.path_for(CUSTOM_INSTRUCTIONS_KEY))
            .count();
        assert_eq!(leftovers, 0);
    }
}
