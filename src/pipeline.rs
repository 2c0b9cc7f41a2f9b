//! The analysis run: collect every source, combine, compose the prompt, call
//! the model, then persist and export the result.
//!
//! Sources are processed strictly in order (URLs, pasted text, local files,
//! cached documents, Drive files), each awaited before the next. Progress is
//! published on a `watch` channel and never moves backwards within a run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{ApifyConfig, Config, GoogleConfig};
use crate::error::{AppError, Result};
use crate::html::truncate_chars;
use crate::llm::{LlmClient, LlmOptions};
use crate::models::{
    CachedDocumentType, ProcessingStatus, SavedAnalysis, SavedAnalysisSource, SourceType,
};
use crate::prompt::{apply_budget, combine_sources, compose_prompt};
use crate::sources::apify::{ApifyClient, ApifyCrawlingOptions};
use crate::sources::drive::{DriveClient, DriveFile};
use crate::sources::local::{confine_to_root, read_local_file};
use crate::sources::text::wrap_pasted_text;
use crate::store::{Store, now_millis};
use crate::webhook;

const URLS_DONE: u8 = 15;
const TEXT_DONE: u8 = 20;
const LOCAL_DONE: u8 = 35;
const DRIVE_DONE: u8 = 80;
const ANALYSIS_STARTED: u8 = 85;
const ANALYSIS_DONE: u8 = 95;
const COMPLETE: u8 = 100;

const MAX_TITLE_CHARS: usize = 50;

/// Everything one analysis run needs from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisRequest {
    pub prompt: String,
    pub title: Option<String>,
    pub pasted_text: Option<String>,
    pub urls: Vec<String>,
    pub crawl_options: ApifyCrawlingOptions,
    pub local_files: Vec<PathBuf>,
    pub drive_files: Vec<DriveFile>,
    pub drive_access_token: Option<String>,
    pub include_analysis_ids: Vec<String>,
    pub model: Option<String>,
}

impl AnalysisRequest {
    fn pasted_text(&self) -> Option<&str> {
        self.pasted_text.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn urls(&self) -> Vec<String> {
        self.urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub struct Pipeline {
    store: Arc<Store>,
    llm: LlmClient,
    apify: ApifyConfig,
    google: GoogleConfig,
    local_files_dir: Option<PathBuf>,
    max_prompt_chars: Option<usize>,
    status: watch::Sender<ProcessingStatus>,
}

impl Pipeline {
    pub fn new(config: &Config, store: Arc<Store>) -> Self {
        let (status, _rx) = watch::channel(ProcessingStatus::default());
        Self {
            store,
            llm: LlmClient::new(config.llm.clone()),
            apify: config.apify.clone(),
            google: config.google.clone(),
            local_files_dir: config.local_files_dir.clone(),
            max_prompt_chars: config.max_prompt_chars,
            status,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ProcessingStatus> {
        self.status.subscribe()
    }

    /// Runs one analysis end to end and returns the saved result.
    ///
    /// Precondition failures return before any status change or network
    /// call. Once started, the status is reset to idle however the run ends,
    /// including when the future is dropped.
    pub async fn run(&self, request: AnalysisRequest) -> Result<SavedAnalysis> {
        self.check_preconditions(&request)?;
        let local_files = self.resolve_local_files(&request.local_files).await?;
        let total = self.count_sources(&request);
        let progress = self.claim(total)?;

        match self.execute(&request, &local_files, &progress).await {
            Ok(analysis) => {
                progress.advance("Analysis complete", COMPLETE);
                Ok(analysis)
            }
            Err(e) => {
                warn!("Analysis run failed: {}", e);
                Err(e)
            }
        }
    }

    fn check_preconditions(&self, request: &AnalysisRequest) -> Result<()> {
        if request.prompt.trim().is_empty() {
            return Err(AppError::Validation("Please enter a prompt".to_string()));
        }
        if self.count_sources(request) == 0 {
            return Err(AppError::Validation(
                "Please add at least one source".to_string(),
            ));
        }
        let has_token = request
            .drive_access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !request.drive_files.is_empty() && !has_token {
            return Err(AppError::Unauthorized(
                "Please sign in with Google to analyze Drive files".to_string(),
            ));
        }
        if !request.urls().is_empty() && self.apify.token.is_none() {
            return Err(AppError::Unauthorized("Apify API token is missing".to_string()));
        }
        Ok(())
    }

    /// Local paths must resolve under the configured root; with no root
    /// configured, local files are refused outright.
    async fn resolve_local_files(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let Some(root) = &self.local_files_dir else {
            return Err(AppError::Validation(
                "Local files are disabled; set LOCAL_FILES_DIR to enable them".to_string(),
            ));
        };
        let mut resolved = Vec::with_capacity(paths.len());
        for path in paths {
            resolved.push(confine_to_root(root, path).await?);
        }
        Ok(resolved)
    }

    fn count_sources(&self, request: &AnalysisRequest) -> usize {
        request.urls().len()
            + usize::from(request.pasted_text().is_some())
            + request.local_files.len()
            + self.store.cache.included().len()
            + request.drive_files.len()
    }

    fn claim(&self, total: usize) -> Result<Progress<'_>> {
        let claimed = self.status.send_if_modified(|status| {
            if status.is_processing {
                return false;
            }
            *status = ProcessingStatus {
                is_processing: true,
                current_step: "Preparing sources".to_string(),
                progress: 0,
                total_files: total,
                processed_files: 0,
            };
            true
        });
        if !claimed {
            return Err(AppError::Conflict(
                "An analysis is already in progress".to_string(),
            ));
        }
        Ok(Progress { status: &self.status })
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        local_files: &[PathBuf],
        progress: &Progress<'_>,
    ) -> Result<SavedAnalysis> {
        let mut pieces: Vec<String> = Vec::new();
        let mut sources: Vec<SavedAnalysisSource> = Vec::new();

        let urls = request.urls();
        if !urls.is_empty() {
            progress.advance("Fetching URL content", 5);
            let apify = ApifyClient::new(&self.apify)?;
            let result = apify.crawl_urls(&urls, &request.crawl_options).await;
            if !result.failed_urls.is_empty() {
                warn!("Could not fetch {} URL(s): {}", result.failed_urls.len(), result.failed_urls.join(", "));
            }
            pieces.push(result.combined_analyzed_text);
            sources.extend(urls.iter().map(|u| SavedAnalysisSource::new(SourceType::Url, u.as_str())));
            progress.processed(urls.len(), "URL content fetched", URLS_DONE);
        }

        if let Some(text) = request.pasted_text() {
            pieces.push(wrap_pasted_text(text));
            sources.push(SavedAnalysisSource::new(SourceType::Text, "Pasted text"));
            progress.processed(1, "Added pasted text", TEXT_DONE);
        }

        let cached = self.store.cache.included();
        let local_total = local_files.len() + cached.len();
        for (i, path) in local_files.iter().enumerate() {
            let file = read_local_file(path).await;
            pieces.push(format!("--- File: {} ---\n{}", file.name, file.content));
            progress.processed(
                1,
                &format!("Read local file {}", file.name),
                phase_progress(TEXT_DONE, LOCAL_DONE, i + 1, local_total),
            );
            sources.push(SavedAnalysisSource::new(SourceType::File, file.name));
        }
        for (i, doc) in cached.iter().enumerate() {
            let content = truncate_chars(&doc.content, crate::sources::MAX_SOURCE_CHARS);
            pieces.push(format!("--- Cached document: {} ---\n{}", doc.name, content));
            let source_type = match doc.doc_type {
                CachedDocumentType::Url => SourceType::Url,
                CachedDocumentType::Text => SourceType::Text,
                CachedDocumentType::Google | CachedDocumentType::Local => SourceType::File,
            };
            sources.push(SavedAnalysisSource::new(source_type, doc.name.as_str()));
            progress.processed(
                1,
                &format!("Added cached document {}", doc.name),
                phase_progress(TEXT_DONE, LOCAL_DONE, local_files.len() + i + 1, local_total),
            );
        }

        if !request.drive_files.is_empty() {
            let token = request.drive_access_token.clone().unwrap_or_default();
            let drive = DriveClient::new(token, self.google.clone());
            let drive_total = request.drive_files.len();
            for (i, file) in request.drive_files.iter().enumerate() {
                progress.advance(&format!("Extracting {}", file.name), LOCAL_DONE);
                let text = drive.extract_text(file).await;
                pieces.push(format!("--- Drive file: {} ---\n{}", file.name, text));
                sources.push(SavedAnalysisSource::new(SourceType::File, file.name.as_str()));
                progress.processed(
                    1,
                    &format!("Extracted {}", file.name),
                    phase_progress(LOCAL_DONE, DRIVE_DONE, i + 1, drive_total),
                );
            }
        }

        let combined = combine_sources(&pieces);
        if combined.trim().is_empty() {
            return Err(AppError::Validation(
                "No content could be extracted from the selected sources".to_string(),
            ));
        }
        let combined = apply_budget(combined, self.max_prompt_chars);

        let included = request
            .include_analysis_ids
            .iter()
            .filter_map(|id| {
                let found = self.store.analyses.get(id);
                if found.is_none() {
                    warn!("Included analysis {} no longer exists", id);
                }
                found
            })
            .collect::<Vec<_>>();
        let instructions = self.store.settings.custom_instructions();
        let prompt = compose_prompt(instructions.as_deref(), &included, &request.prompt);

        progress.advance("Analyzing with AI", ANALYSIS_STARTED);
        let options = LlmOptions {
            model: request.model.clone().or_else(|| self.store.settings.preferred_model()),
            ..LlmOptions::default()
        };
        let ai_output = self.llm.analyze(&prompt, &combined, &options).await?;
        progress.advance("Saving analysis", ANALYSIS_DONE);

        let timestamp = now_millis();
        let analysis = SavedAnalysis {
            id: self.store.analyses.unused_id(timestamp),
            title: request
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| derive_title(&request.prompt)),
            timestamp,
            prompt: request.prompt.clone(),
            ai_output,
            sources,
        };
        self.store.analyses.save(analysis.clone())?;
        info!("Analysis {} completed from {} source(s)", analysis.id, analysis.sources.len());

        if let Some(url) = self.store.settings.webhook_url() {
            if let Err(e) = webhook::send_analysis(&url, &analysis).await {
                warn!("Webhook export failed: {}", e);
            }
        }

        Ok(analysis)
    }
}

/// Publishes progress for the run in flight and resets the status when dropped.
struct Progress<'a> {
    status: &'a watch::Sender<ProcessingStatus>,
}

impl Progress<'_> {
    fn advance(&self, step: &str, progress: u8) {
        self.status.send_modify(|s| {
            s.current_step = step.to_string();
            s.progress = s.progress.max(progress.min(COMPLETE));
        });
    }

    fn processed(&self, count: usize, step: &str, progress: u8) {
        self.status.send_modify(|s| {
            s.processed_files = (s.processed_files + count).min(s.total_files);
        });
        self.advance(step, progress);
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        self.status.send_replace(ProcessingStatus::default());
    }
}

/// Linear progress between `start` and `end` after `done` of `total` items.
fn phase_progress(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return end;
    }
    let span = usize::from(end - start);
    start + (span * done.min(total) / total) as u8
}

/// First line of the prompt, shortened to fit a title.
pub fn derive_title(prompt: &str) -> String {
    let first_line = prompt.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if first_line.is_empty() {
        return "Untitled Analysis".to_string();
    }
    if first_line.chars().count() > MAX_TITLE_CHARS {
        format!("{}...", truncate_chars(first_line, MAX_TITLE_CHARS - 3))
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_progress_interpolates() {
        assert_eq!(phase_progress(35, 80, 0, 3), 35);
        assert_eq!(phase_progress(35, 80, 1, 3), 50);
        assert_eq!(phase_progress(35, 80, 3, 3), 80);
        assert_eq!(phase_progress(20, 35, 1, 0), 35);
    }

    #[test]
    fn progress_never_moves_backwards_and_resets_on_drop() {
        let (tx, rx) = watch::channel(ProcessingStatus {
            is_processing: true,
            total_files: 2,
            ..ProcessingStatus::default()
        });
        let progress = Progress { status: &tx };

        progress.processed(1, "text", TEXT_DONE);
        progress.advance("late", URLS_DONE);
        assert_eq!(rx.borrow().progress, TEXT_DONE);
        assert_eq!(rx.borrow().current_step, "late");

        progress.processed(5, "files", LOCAL_DONE);
        assert_eq!(rx.borrow().processed_files, 2);
        progress.advance("done", COMPLETE);
        assert_eq!(rx.borrow().progress, COMPLETE);

        drop(progress);
        assert_eq!(*rx.borrow(), ProcessingStatus::default());
    }

    #[test]
    fn titles_come_from_first_prompt_line() {
        assert_eq!(derive_title("\n  Summarize Q3  \nmore"), "Summarize Q3");
        assert_eq!(derive_title(""), "Untitled Analysis");
        let long = "x".repeat(80);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn request_ignores_blank_urls_and_text() {
        let request = AnalysisRequest {
            pasted_text: Some("   ".to_string()),
            urls: vec![" ".to_string(), " https://a.test ".to_string()],
            ..AnalysisRequest::default()
        };
        assert!(request.pasted_text().is_none());
        assert_eq!(request.urls(), vec!["https://a.test".to_string()]);
    }
}
