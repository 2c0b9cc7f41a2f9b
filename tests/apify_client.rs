mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use drive_analyzer::error::AppError;
use drive_analyzer::sources::apify::{ApifyClient, ApifyCrawlingOptions};

/// Crawler that succeeds for every start URL except `url2`.
async fn crawler(
    Path(actor): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(input): Json<Value>,
) -> (StatusCode, Json<Value>) {
    assert_eq!(actor, "apify~website-content-crawler");
    assert_eq!(query.get("token").map(String::as_str), Some("apify-token"));

    let urls: Vec<String> = input["startUrls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["url"].as_str().unwrap().to_string())
        .collect();

    if urls.iter().any(|u| u == "url2") && urls.len() == 1 {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })));
    }

    let items = urls
        .iter()
        .filter(|u| *u != "url2")
        .map(|u| json!({ "url": u, "text": format!("text of {}", u) }))
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(Value::Array(items)))
}

async fn crawler_server() -> String {
    let router = Router::new().route("/v2/acts/:actor/run-sync-get-dataset-items", post(crawler));
    common::spawn(router).await
}

#[tokio::test]
async fn analyze_multiple_urls_reports_failed_url_inline() {
    let base = crawler_server().await;
    let client = ApifyClient::new(&common::apify_config(&base)).unwrap();

    let result = client
        .analyze_multiple_urls(
            &["url1".to_string(), "url2".to_string()],
            &ApifyCrawlingOptions::default(),
        )
        .await;

    assert_eq!(result.failed_urls, vec!["url2".to_string()]);
    assert!(result.combined_analyzed_text.contains("## Content from url1\n\ntext of url1"));
    assert!(result.combined_analyzed_text.contains("## Content from url2\n\nError: "));
    assert!(result.combined_analyzed_text.contains("HTTP 500"));
}

#[tokio::test]
async fn crawl_urls_lists_urls_without_items() {
    let base = crawler_server().await;
    let client = ApifyClient::new(&common::apify_config(&base)).unwrap();

    let result = client
        .crawl_urls(
            &["https://a.test/".to_string(), "url2".to_string()],
            &ApifyCrawlingOptions::default(),
        )
        .await;

    assert_eq!(result.failed_urls, vec!["url2".to_string()]);
    assert_eq!(
        result.combined_analyzed_text,
        "## Content from https://a.test/\n\ntext of https://a.test/"
    );
}

#[tokio::test]
async fn crawl_failure_marks_every_url_failed() {
    let client = ApifyClient::new(&common::apify_config("http://127.0.0.1:9")).unwrap();
    let urls = vec!["https://a.test".to_string(), "https://b.test".to_string()];

    let result = client.crawl_urls(&urls, &ApifyCrawlingOptions::default()).await;

    assert_eq!(result.failed_urls, urls);
    assert!(result.combined_analyzed_text.is_empty());
}

#[derive(Clone, Default)]
struct RunState {
    polls: Arc<AtomicUsize>,
}

async fn start_run(Path(actor): Path<String>) -> Json<Value> {
    assert_eq!(actor, "apify~rss-xml-scraper");
    Json(json!({ "data": { "id": "run-1", "status": "READY", "defaultDatasetId": "ds-1" } }))
}

async fn poll_run(State(state): State<RunState>, Path(run_id): Path<String>) -> Json<Value> {
    let polls = state.polls.fetch_add(1, Ordering::SeqCst);
    let status = if polls < 2 { "RUNNING" } else { "SUCCEEDED" };
    Json(json!({ "data": { "id": run_id, "status": status, "defaultDatasetId": "ds-1" } }))
}

async fn dataset_items(Path(dataset): Path<String>) -> Json<Value> {
    assert_eq!(dataset, "ds-1");
    Json(json!([{ "title": "Entry" }]))
}

#[tokio::test]
async fn run_actor_polls_until_terminal_status() {
    let state = RunState::default();
    let router = Router::new()
        .route("/v2/acts/:actor/runs", post(start_run))
        .route("/v2/actor-runs/:run_id", get(poll_run))
        .route("/v2/datasets/:dataset/items", get(dataset_items))
        .with_state(state.clone());
    let base = common::spawn(router).await;
    let client = ApifyClient::new(&common::apify_config(&base)).unwrap();

    let output = client
        .run_actor("apify/rss-xml-scraper", &json!({ "rssUrls": ["https://feed.test"] }))
        .await
        .unwrap();

    assert_eq!(output.status, "SUCCEEDED");
    assert_eq!(output.items, vec![json!({ "title": "Entry" })]);
    assert_eq!(state.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failed_runs_are_errors() {
    let router = Router::new()
        .route(
            "/v2/acts/:actor/runs",
            post(|| async {
                Json(json!({ "data": { "id": "run-2", "status": "FAILED", "defaultDatasetId": "ds" } }))
            }),
        );
    let base = common::spawn(router).await;
    let client = ApifyClient::new(&common::apify_config(&base)).unwrap();

    let err = client.run_actor("apify~rss-xml-scraper", &json!({})).await.unwrap_err();
    assert!(matches!(err, AppError::FetchError(msg) if msg.contains("FAILED")));
}
