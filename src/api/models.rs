use serde::{Deserialize, Serialize};

use crate::sources::drive::DriveFile;

#[derive(Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

#[derive(Deserialize)]
pub struct PromptRequest {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeRequest {
    pub include_in_prompts: bool,
}

#[derive(Deserialize, Default)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub max_articles_per_crawl: Option<u32>,
    #[serde(default)]
    pub only_new_articles: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveExtractRequest {
    pub file: DriveFile,
    pub access_token: String,
    /// Also store the extracted text in the document cache.
    #[serde(default)]
    pub cache: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedOutput {
    pub text: String,
    pub item_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedText {
    pub name: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_id: Option<String>,
}
