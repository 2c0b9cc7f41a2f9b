use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::SavedAnalysis;
use crate::store::{Collection, SAVED_ANALYSES_KEY, Storage};

const REQUIRED_FIELDS: &[&str] = &["id", "title", "timestamp", "prompt", "aiOutput", "sources"];

/// Saved analyses, newest first.
pub struct AnalysisRepository {
    items: Collection<SavedAnalysis>,
}

impl AnalysisRepository {
    pub fn new(storage: Storage) -> Self {
        Self {
            items: Collection::load(storage, SAVED_ANALYSES_KEY),
        }
    }

    pub fn list(&self) -> Vec<SavedAnalysis> {
        self.items.list()
    }

    pub fn get(&self, id: &str) -> Option<SavedAnalysis> {
        self.items.find(|a| a.id == id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<SavedAnalysis>> {
        self.items.subscribe()
    }

    /// Prepends `analysis` to the list.
    pub fn save(&self, analysis: SavedAnalysis) -> Result<()> {
        self.items.update(|items| {
            if items.iter().any(|a| a.id == analysis.id) {
                return Err(AppError::Conflict(format!(
                    "An analysis with id {} already exists",
                    analysis.id
                )));
            }
            info!("Saving analysis {} ({})", analysis.id, analysis.title);
            items.insert(0, analysis);
            Ok(())
        })
    }

    /// Returns an id derived from `timestamp` that no stored analysis uses yet.
    pub fn unused_id(&self, timestamp: i64) -> String {
        let items = self.items.list();
        let mut candidate = timestamp;
        while items.iter().any(|a| a.id == candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }

    pub fn rename(&self, id: &str, title: &str) -> Result<SavedAnalysis> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }
        self.items.update(|items| {
            let analysis = items
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AppError::NotFound(format!("analysis {}", id)))?;
            analysis.title = title.to_string();
            Ok(analysis.clone())
        })
    }

    /// Removes exactly the analysis with `id`.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.items.update(|items| {
            let index = items
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| AppError::NotFound(format!("analysis {}", id)))?;
            items.remove(index);
            Ok(())
        })
    }

    pub fn delete_all(&self) -> Result<()> {
        info!("Deleting all saved analyses");
        self.items.clear()
    }

    pub fn export_json(&self, id: &str) -> Result<String> {
        let analysis = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("analysis {}", id)))?;
        Ok(serde_json::to_string_pretty(&analysis)?)
    }

    pub fn export_markdown(&self, id: &str) -> Result<String> {
        let analysis = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("analysis {}", id)))?;
        Ok(render_markdown(&analysis))
    }

    /// Validates and prepends an exported analysis. Storage is left untouched
    /// when the shape is wrong or the id is already taken.
    pub fn import_json(&self, raw: &str) -> Result<SavedAnalysis> {
        let analysis = parse_import(raw)?;
        if self.get(&analysis.id).is_some() {
            warn!("Rejected import of duplicate analysis {}", analysis.id);
            return Err(AppError::Conflict(format!(
                "An analysis with id {} already exists",
                analysis.id
            )));
        }
        self.save(analysis.clone())?;
        Ok(analysis)
    }
}

pub(crate) fn parse_import(raw: &str) -> Result<SavedAnalysis> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::Validation(format!("Invalid JSON file: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::Validation("Imported file is not a saved analysis".to_string()))?;

    let missing = REQUIRED_FIELDS
        .iter()
        .filter(|field| !object.contains_key(**field))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Invalid analysis file: missing {}",
            missing.join(", ")
        )));
    }

    serde_json::from_value(value)
        .map_err(|e| AppError::Validation(format!("Invalid analysis file: {}", e)))
}

fn render_markdown(analysis: &SavedAnalysis) -> String {
    let saved_at = chrono::DateTime::from_timestamp_millis(analysis.timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| analysis.timestamp.to_string());

    let mut out = format!("# {}\n\n*Saved {}*\n\n## Prompt\n\n{}\n\n", analysis.title, saved_at, analysis.prompt);
    if !analysis.sources.is_empty() {
        out.push_str("## Sources\n\n");
        for source in &analysis.sources {
            out.push_str(&format!("- {} ({})\n", source.name, source.source_type.as_str()));
        }
        out.push('\n');
    }
    out.push_str("## Analysis\n\n");
    out.push_str(&analysis.ai_output);
    out.push('\n');
    out
}
