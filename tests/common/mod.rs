#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use drive_analyzer::config::{ApifyConfig, Config, GoogleConfig, LlmConfig};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub type Captured = Arc<Mutex<Vec<Value>>>;

/// A chat-completion endpoint that records every request body and answers
/// with `reply`.
pub async fn fake_llm(reply: &'static str) -> (String, Captured) {
    slow_llm(reply, Duration::ZERO).await
}

/// Like [`fake_llm`], but waits `delay` before answering.
pub async fn slow_llm(reply: &'static str, delay: Duration) -> (String, Captured) {
    let captured: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/chat/completions",
            post(
                move |State((captured, reply)): State<(Captured, &'static str)>, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push(body);
                    tokio::time::sleep(delay).await;
                    Json(json!({ "choices": [ { "message": { "role": "assistant", "content": reply } } ] }))
                },
            ),
        )
        .with_state((captured.clone(), reply));
    let base = spawn(router).await;
    (format!("{}/chat/completions", base), captured)
}

/// Records every JSON body posted to `/hook`.
pub async fn fake_webhook() -> (String, Captured) {
    let captured: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/hook",
            post(|State(captured): State<Captured>, Json(body): Json<Value>| async move {
                captured.lock().unwrap().push(body);
                "ok"
            }),
        )
        .with_state(captured.clone());
    let base = spawn(router).await;
    (format!("{}/hook", base), captured)
}

pub fn test_config(data_dir: &Path, llm_endpoint: &str) -> Config {
    Config {
        server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        data_dir: data_dir.to_path_buf(),
        llm: LlmConfig {
            api_key: "test-key".to_string(),
            endpoint: llm_endpoint.to_string(),
            model: "test/model".to_string(),
            temperature: 0.2,
            max_tokens: 256,
            site_url: None,
            site_name: None,
        },
        apify: ApifyConfig {
            token: None,
            base_url: "http://127.0.0.1:9".to_string(),
            poll_interval: Duration::from_millis(10),
        },
        google: GoogleConfig::default(),
        local_files_dir: Some(data_dir.to_path_buf()),
        max_prompt_chars: None,
        analysis_timeout: Duration::from_secs(30),
    }
}

pub fn apify_config(base_url: &str) -> ApifyConfig {
    ApifyConfig {
        token: Some("apify-token".to_string()),
        base_url: base_url.to_string(),
        poll_interval: Duration::from_millis(10),
    }
}
