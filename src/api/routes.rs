use axum::{
    routing::{get, patch, post, put},
    Router,
    body::Body,
    extract::{Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tower_http::cors::{CorsLayer, Any};
use tracing::info;

use crate::error::{Result, AppError};
use crate::api::models::{
    ArticleRequest, DriveExtractRequest, ExportQuery, ExtractedText, FormattedOutput,
    IncludeRequest, PromptRequest, RenameRequest,
};
use crate::api::response::{self, Envelope};
use crate::formatters::{
    format_article_extractor_smart_output, format_bing_search_scraper_output,
    format_rss_xml_scraper_output,
};
use crate::models::{CachedDocument, CachedDocumentType, ProcessingStatus, SavedAnalysis, SavedPrompt};
use crate::pipeline::AnalysisRequest;
use crate::sources::apify::{
    ActorRunOutput, ApifyClient, ArticleExtractorSmartInput, BingSearchScraperInput,
    RssXmlScraperInput, ARTICLE_EXTRACTOR_SMART, BING_SEARCH_SCRAPER, RSS_XML_SCRAPER,
};
use crate::sources::drive::{DriveClient, DriveFile};
use crate::store::{NewCachedDocument, SettingsSnapshot};
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/api/status", get(status_handler))
        .route("/api/analyses", get(list_analyses).delete(delete_all_analyses))
        .route("/api/analyses/import", post(import_analysis))
        .route(
            "/api/analyses/:id",
            get(get_analysis).patch(rename_analysis).delete(delete_analysis),
        )
        .route("/api/analyses/:id/export", get(export_analysis))
        .route("/api/prompts", get(list_prompts).post(add_prompt))
        .route("/api/prompts/:id", put(update_prompt).delete(delete_prompt))
        .route("/api/cache", get(list_cache).post(add_cache).delete(clear_cache))
        .route("/api/cache/:id", patch(set_cache_inclusion).delete(remove_cache))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/drive/extract", post(extract_drive_file))
        .route("/api/drive/files/:id", get(drive_file_metadata))
        .route("/api/apify/articles", post(run_article_extractor))
        .route("/api/apify/bing", post(run_bing_search))
        .route("/api/apify/rss", post(run_rss_scraper))
        .route("/api/apify/actors/:actor_id", post(run_generic_actor))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn analyze_handler(
    State(state): State<AppState>,
    Json(req): Json<AnalysisRequest>,
) -> Result<Envelope<SavedAnalysis>> {
    info!(
        "Starting analysis with {} URL(s), {} Drive file(s), {} local file(s)",
        req.urls.len(),
        req.drive_files.len(),
        req.local_files.len()
    );
    let start_time = std::time::Instant::now();

    // Set an overall timeout for the entire run
    let result = tokio::time::timeout(state.config.analysis_timeout, state.pipeline.run(req)).await;

    let elapsed = start_time.elapsed();
    info!("Analysis request took {:?}", elapsed);

    match result {
        Ok(result) => result.map(response::created),
        Err(_) => Err(AppError::Timeout(format!(
            "Analysis timed out after {:?}",
            state.config.analysis_timeout
        ))),
    }
}

async fn status_handler(State(state): State<AppState>) -> Envelope<ProcessingStatus> {
    response::success(state.pipeline.status())
}

async fn list_analyses(State(state): State<AppState>) -> Envelope<Vec<SavedAnalysis>> {
    response::success(state.store.analyses.list())
}

async fn delete_all_analyses(State(state): State<AppState>) -> Result<Envelope<()>> {
    state.store.analyses.delete_all()?;
    Ok(response::success(()))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<SavedAnalysis>> {
    state
        .store
        .analyses
        .get(&id)
        .map(response::success)
        .ok_or_else(|| AppError::NotFound(format!("analysis {}", id)))
}

async fn rename_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Envelope<SavedAnalysis>> {
    Ok(response::success(state.store.analyses.rename(&id, &req.title)?))
}

async fn delete_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<()>> {
    state.store.analyses.delete(&id)?;
    Ok(response::success(()))
}

async fn export_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let (body, content_type, extension) = match query.format.as_deref() {
        None | Some("json") => (state.store.analyses.export_json(&id)?, "application/json", "json"),
        Some("markdown") | Some("md") => (state.store.analyses.export_markdown(&id)?, "text/markdown; charset=utf-8", "md"),
        Some(other) => return Err(AppError::Validation(format!("Unknown export format: {}", other))),
    };

    let disposition = format!(
        "attachment; filename=\"analysis-{}.{}\"",
        filename_safe(&id),
        extension
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(body),
    )
        .into_response())
}

/// Imported ids are arbitrary strings; keep only characters that are safe
/// inside a quoted header parameter and a file name.
fn filename_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn import_analysis(
    State(state): State<AppState>,
    body: String,
) -> Result<Envelope<SavedAnalysis>> {
    Ok(response::created(state.store.analyses.import_json(&body)?))
}

async fn list_prompts(State(state): State<AppState>) -> Envelope<Vec<SavedPrompt>> {
    response::success(state.store.prompts.list())
}

async fn add_prompt(
    State(state): State<AppState>,
    Json(req): Json<PromptRequest>,
) -> Result<Envelope<SavedPrompt>> {
    Ok(response::created(state.store.prompts.add(&req.title, &req.content)?))
}

async fn update_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PromptRequest>,
) -> Result<Envelope<SavedPrompt>> {
    Ok(response::success(state.store.prompts.update(&id, &req.title, &req.content)?))
}

async fn delete_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<()>> {
    state.store.prompts.delete(&id)?;
    Ok(response::success(()))
}

async fn list_cache(State(state): State<AppState>) -> Envelope<Vec<CachedDocument>> {
    response::success(state.store.cache.list())
}

async fn add_cache(
    State(state): State<AppState>,
    Json(doc): Json<NewCachedDocument>,
) -> Result<Envelope<CachedDocument>> {
    Ok(response::created(state.store.cache.add(doc)?))
}

async fn clear_cache(State(state): State<AppState>) -> Result<Envelope<()>> {
    state.store.cache.clear()?;
    Ok(response::success(()))
}

async fn remove_cache(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<()>> {
    state.store.cache.remove(&id)?;
    Ok(response::success(()))
}

async fn set_cache_inclusion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<IncludeRequest>,
) -> Result<Envelope<CachedDocument>> {
    Ok(response::success(
        state.store.cache.set_include_in_prompts(&id, req.include_in_prompts)?,
    ))
}

async fn get_settings(State(state): State<AppState>) -> Envelope<SettingsSnapshot> {
    response::success(state.store.settings.snapshot())
}

async fn put_settings(
    State(state): State<AppState>,
    Json(req): Json<SettingsSnapshot>,
) -> Result<Envelope<SettingsSnapshot>> {
    let settings = &state.store.settings;
    settings.set_webhook_url(req.webhook_url.as_deref())?;
    settings.set_custom_instructions(req.custom_instructions.as_deref())?;
    settings.set_preferred_model(req.preferred_model.as_deref())?;
    Ok(response::success(settings.snapshot()))
}

async fn extract_drive_file(
    State(state): State<AppState>,
    Json(req): Json<DriveExtractRequest>,
) -> Result<Envelope<ExtractedText>> {
    if req.access_token.trim().is_empty() {
        return Err(AppError::Unauthorized(
            "Please sign in with Google to read Drive files".to_string(),
        ));
    }
    let drive = DriveClient::new(req.access_token, state.config.google.clone());
    let text = drive.extract_text(&req.file).await;

    let cached_id = if req.cache {
        let size = req.file.size.as_deref().and_then(|s| s.parse().ok());
        let cached = state.store.cache.add(NewCachedDocument {
            name: req.file.name.clone(),
            doc_type: CachedDocumentType::Google,
            content: text.clone(),
            mime_type: Some(req.file.mime_type.clone()),
            size,
            original_id: Some(req.file.id.clone()),
            include_in_prompts: None,
        })?;
        Some(cached.id)
    } else {
        None
    };

    Ok(response::success(ExtractedText {
        name: req.file.name,
        text,
        cached_id,
    }))
}

async fn drive_file_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Envelope<DriveFile>> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized("Please sign in with Google to read Drive files".to_string())
        })?;
    let drive = DriveClient::new(token, state.config.google.clone());
    Ok(response::success(drive.file_metadata(&id).await?))
}

async fn run_article_extractor(
    State(state): State<AppState>,
    Json(req): Json<ArticleRequest>,
) -> Result<Envelope<FormattedOutput>> {
    if req.urls.is_empty() {
        return Err(AppError::Validation("Please add at least one URL".to_string()));
    }
    let apify = ApifyClient::new(&state.config.apify)?;
    let input = ArticleExtractorSmartInput {
        max_articles_per_crawl: req.max_articles_per_crawl,
        only_new_articles: req.only_new_articles,
        ..ArticleExtractorSmartInput::for_urls(req.urls.as_slice())
    };
    let items = apify.run_sync_dataset(ARTICLE_EXTRACTOR_SMART, &input).await?;
    Ok(response::success(FormattedOutput {
        text: format_article_extractor_smart_output(&items),
        item_count: items.len(),
    }))
}

async fn run_bing_search(
    State(state): State<AppState>,
    Json(req): Json<BingSearchScraperInput>,
) -> Result<Envelope<FormattedOutput>> {
    if req.queries.trim().is_empty() {
        return Err(AppError::Validation("Please enter at least one search query".to_string()));
    }
    let apify = ApifyClient::new(&state.config.apify)?;
    let items = apify.run_sync_dataset(BING_SEARCH_SCRAPER, &req.clamped()).await?;
    Ok(response::success(FormattedOutput {
        text: format_bing_search_scraper_output(&items),
        item_count: items.len(),
    }))
}

async fn run_rss_scraper(
    State(state): State<AppState>,
    Json(req): Json<RssXmlScraperInput>,
) -> Result<Envelope<FormattedOutput>> {
    if req.rss_urls.is_empty() {
        return Err(AppError::Validation("Please add at least one feed URL".to_string()));
    }
    let apify = ApifyClient::new(&state.config.apify)?;
    let items = apify.run_sync_dataset(RSS_XML_SCRAPER, &req.clamped()).await?;
    Ok(response::success(FormattedOutput {
        text: format_rss_xml_scraper_output(&items),
        item_count: items.len(),
    }))
}

async fn run_generic_actor(
    State(state): State<AppState>,
    Path(actor_id): Path<String>,
    Json(input): Json<Value>,
) -> Result<Envelope<ActorRunOutput>> {
    let apify = ApifyClient::new(&state.config.apify)?;
    Ok(response::success(apify.run_actor(&actor_id, &input).await?))
}
