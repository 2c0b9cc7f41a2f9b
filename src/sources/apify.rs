//! Apify actor REST client.
//!
//! Two calling conventions are supported: the synchronous
//! `run-sync-get-dataset-items` endpoint used for crawling and the named
//! scraping actors, and the start/poll/list flow used for arbitrary actors.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ApifyConfig;
use crate::error::{AppError, Result};
use crate::http_client::{ensure_success, shared};

pub const WEBSITE_CONTENT_CRAWLER: &str = "apify~website-content-crawler";
pub const ARTICLE_EXTRACTOR_SMART: &str = "apify~article-extractor-smart";
pub const BING_SEARCH_SCRAPER: &str = "apify~bing-search-scraper";
pub const RSS_XML_SCRAPER: &str = "apify~rss-xml-scraper";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CrawlerType {
    #[serde(rename = "cheerio")]
    #[default]
    Cheerio,
    #[serde(rename = "jsdom")]
    Jsdom,
    #[serde(rename = "playwright:firefox")]
    PlaywrightFirefox,
    #[serde(rename = "playwright:adaptive")]
    PlaywrightAdaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApifyCrawlingOptions {
    #[serde(default)]
    pub max_crawl_depth: u32,
    #[serde(default = "default_max_crawl_pages")]
    pub max_crawl_pages: u32,
    #[serde(default)]
    pub crawler_type: CrawlerType,
}

fn default_max_crawl_pages() -> u32 {
    10
}

impl Default for ApifyCrawlingOptions {
    fn default() -> Self {
        Self {
            max_crawl_depth: 0,
            max_crawl_pages: default_max_crawl_pages(),
            crawler_type: CrawlerType::default(),
        }
    }
}

impl ApifyCrawlingOptions {
    pub fn clamped(mut self) -> Self {
        self.max_crawl_depth = self.max_crawl_depth.min(20);
        self.max_crawl_pages = self.max_crawl_pages.clamp(1, 1000);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartUrl {
    pub url: String,
}

impl From<&str> for StartUrl {
    fn from(url: &str) -> Self {
        Self { url: url.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlerInput {
    start_urls: Vec<StartUrl>,
    max_crawl_depth: u32,
    max_crawl_pages: u32,
    crawler_type: CrawlerType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleExtractorSmartInput {
    pub start_urls: Vec<StartUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_articles_per_crawl: Option<u32>,
    #[serde(default)]
    pub only_new_articles: bool,
    #[serde(default)]
    pub must_have_date: bool,
    #[serde(default)]
    pub save_html: bool,
}

impl ArticleExtractorSmartInput {
    pub fn for_urls<S: AsRef<str>>(urls: &[S]) -> Self {
        Self {
            start_urls: urls.iter().map(|u| StartUrl::from(u.as_ref())).collect(),
            max_articles_per_crawl: None,
            only_new_articles: false,
            must_have_date: false,
            save_html: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BingSearchScraperInput {
    /// Newline-separated search terms.
    pub queries: String,
    #[serde(default = "default_results_per_page")]
    pub results_per_page: u32,
    #[serde(default = "default_pages_per_query")]
    pub max_pages_per_query: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

fn default_results_per_page() -> u32 {
    10
}

fn default_pages_per_query() -> u32 {
    1
}

impl BingSearchScraperInput {
    pub fn clamped(mut self) -> Self {
        self.results_per_page = self.results_per_page.clamp(1, 50);
        self.max_pages_per_query = self.max_pages_per_query.clamp(1, 10);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RssXmlScraperInput {
    pub rss_urls: Vec<String>,
    #[serde(default = "default_max_items")]
    pub max_items: u32,
}

fn default_max_items() -> u32 {
    50
}

impl RssXmlScraperInput {
    pub fn clamped(mut self) -> Self {
        self.max_items = self.max_items.clamp(1, 1000);
        self
    }
}

/// Combined text of a batch of URLs plus the URLs that produced nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlAnalysis {
    pub combined_analyzed_text: String,
    pub failed_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRunOutput {
    pub run_id: String,
    pub status: String,
    pub items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    data: RunInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunInfo {
    id: String,
    status: String,
    default_dataset_id: String,
}

const TERMINAL_STATUSES: &[&str] = &["SUCCEEDED", "FAILED", "ABORTED", "TIMED-OUT"];

pub struct ApifyClient {
    client: Client,
    token: String,
    base_url: String,
    poll_interval: Duration,
}

impl ApifyClient {
    /// Fails with `Unauthorized` when no Apify token is configured.
    pub fn new(config: &ApifyConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| AppError::Unauthorized("Apify API token is missing".to_string()))?;
        Ok(Self {
            client: shared(),
            token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
        })
    }

    /// Runs an actor synchronously and returns its dataset items.
    pub async fn run_sync_dataset<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<Vec<Value>> {
        let url = format!(
            "{}/v2/acts/{}/run-sync-get-dataset-items",
            self.base_url,
            normalize_actor_id(actor_id)
        );
        debug!("Running Apify actor {}", actor_id);
        let response = self
            .client
            .post(&url)
            .query(&[("token", &self.token)])
            .json(input)
            .send()
            .await?;
        let items: Vec<Value> = ensure_success(response).await?.json().await?;
        info!("Apify actor {} returned {} items", actor_id, items.len());
        Ok(items)
    }

    /// Crawls all `urls` in one actor call.
    pub async fn crawl_urls(&self, urls: &[String], options: &ApifyCrawlingOptions) -> UrlAnalysis {
        if urls.is_empty() {
            return UrlAnalysis::default();
        }

        let options = options.clone().clamped();
        let input = crawler_input(urls.iter().map(String::as_str), &options);

        let items = match self.run_sync_dataset(WEBSITE_CONTENT_CRAWLER, &input).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Crawl of {} URLs failed: {}", urls.len(), e);
                return UrlAnalysis {
                    combined_analyzed_text: String::new(),
                    failed_urls: urls.to_vec(),
                };
            }
        };

        let mut sections = Vec::new();
        let mut covered = Vec::new();
        for item in &items {
            let Some(url) = item_url(item) else { continue };
            if let Some(text) = item_text(item) {
                sections.push(url_section(url, &text));
                covered.push(normalize_url(url));
            }
        }

        let failed_urls = urls
            .iter()
            .filter(|u| !covered.contains(&normalize_url(u)))
            .cloned()
            .collect();

        UrlAnalysis {
            combined_analyzed_text: sections.join("\n\n"),
            failed_urls,
        }
    }

    /// Crawls each URL with its own actor call, sequentially. Failures are
    /// reported inline as `Error: <message>` and collected in `failed_urls`.
    pub async fn analyze_multiple_urls(&self, urls: &[String], options: &ApifyCrawlingOptions) -> UrlAnalysis {
        let options = options.clone().clamped();
        let mut sections = Vec::with_capacity(urls.len());
        let mut failed_urls = Vec::new();

        for url in urls {
            let input = crawler_input(std::iter::once(url.as_str()), &options);
            match self.run_sync_dataset(WEBSITE_CONTENT_CRAWLER, &input).await {
                Ok(items) => {
                    let text = items
                        .iter()
                        .filter_map(item_text)
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    let text = if text.is_empty() {
                        "(No content extracted)".to_string()
                    } else {
                        text
                    };
                    sections.push(url_section(url, &text));
                }
                Err(e) => {
                    warn!("Failed to analyze {}: {}", url, e);
                    sections.push(url_section(url, &format!("Error: {}", e)));
                    failed_urls.push(url.clone());
                }
            }
        }

        UrlAnalysis {
            combined_analyzed_text: sections.join("\n\n"),
            failed_urls,
        }
    }

    /// Starts an actor run, polls it to a terminal status and lists its dataset.
    pub async fn run_actor(&self, actor_id: &str, input: &Value) -> Result<ActorRunOutput> {
        let actor = normalize_actor_id(actor_id);
        let url = format!("{}/v2/acts/{}/runs", self.base_url, actor);
        let response = self
            .client
            .post(&url)
            .query(&[("token", &self.token)])
            .json(input)
            .send()
            .await?;
        let mut run = ensure_success(response).await?.json::<RunEnvelope>().await?.data;
        info!("Started Apify run {} for actor {}", run.id, actor);

        while !TERMINAL_STATUSES.contains(&run.status.as_str()) {
            tokio::time::sleep(self.poll_interval).await;
            let url = format!("{}/v2/actor-runs/{}", self.base_url, run.id);
            let response = self
                .client
                .get(&url)
                .query(&[("token", &self.token)])
                .send()
                .await?;
            run = ensure_success(response).await?.json::<RunEnvelope>().await?.data;
            debug!("Apify run {} status: {}", run.id, run.status);
        }

        if run.status != "SUCCEEDED" {
            return Err(AppError::FetchError(format!(
                "Apify run {} finished with status {}",
                run.id, run.status
            )));
        }

        let url = format!("{}/v2/datasets/{}/items", self.base_url, run.default_dataset_id);
        let response = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str()), ("clean", "true")])
            .send()
            .await?;
        let items: Vec<Value> = ensure_success(response).await?.json().await?;

        Ok(ActorRunOutput {
            run_id: run.id,
            status: run.status,
            items,
        })
    }
}

fn crawler_input<'a>(urls: impl Iterator<Item = &'a str>, options: &ApifyCrawlingOptions) -> CrawlerInput {
    CrawlerInput {
        start_urls: urls.map(StartUrl::from).collect(),
        max_crawl_depth: options.max_crawl_depth,
        max_crawl_pages: options.max_crawl_pages,
        crawler_type: options.crawler_type,
    }
}

fn url_section(url: &str, body: &str) -> String {
    format!("## Content from {}\n\n{}", url, body)
}

fn item_url(item: &Value) -> Option<&str> {
    item.get("url")
        .and_then(Value::as_str)
        .or_else(|| item.pointer("/crawl/loadedUrl").and_then(Value::as_str))
}

fn item_text(item: &Value) -> Option<String> {
    ["text", "markdown"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Accepts both `owner/name` and `owner~name` actor ids.
pub fn normalize_actor_id(actor_id: &str) -> String {
    actor_id.trim().replace('/', "~")
}
