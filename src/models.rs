use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Url,
    Text,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::Url => "url",
            SourceType::Text => "text",
        }
    }
}

/// Label of one input that fed an analysis. Not a reference to the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAnalysisSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
}

impl SavedAnalysisSource {
    pub fn new(source_type: SourceType, name: impl Into<String>) -> Self {
        Self {
            source_type,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnalysis {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub prompt: String,
    pub ai_output: String,
    pub sources: Vec<SavedAnalysisSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPrompt {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachedDocumentType {
    Google,
    Local,
    Url,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDocument {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub doc_type: CachedDocumentType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub cached_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_in_prompts: Option<bool>,
}

impl CachedDocument {
    pub fn is_included(&self) -> bool {
        self.include_in_prompts.unwrap_or(false)
    }
}

/// Progress of the analysis run in flight, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub is_processing: bool,
    pub current_step: String,
    pub progress: u8,
    pub total_files: usize,
    pub processed_files: usize,
}
