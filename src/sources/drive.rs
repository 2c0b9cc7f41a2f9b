//! Google Drive content extraction.
//!
//! Dispatches on the exact MIME type of a Drive file to the Docs, Sheets,
//! Slides or PDF extractor. Extraction never fails the caller: errors come
//! back as an inline `(Error extracting text from ...)` string so one bad
//! file cannot abort a batch.

use std::io::Write;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::GoogleConfig;
use crate::error::{AppError, Result};
use crate::html::truncate_chars;
use crate::http_client::{ensure_success, shared};
use crate::sources::MAX_SOURCE_CHARS;

pub const MIME_DOCUMENT: &str = "application/vnd.google-apps.document";
pub const MIME_SPREADSHEET: &str = "application/vnd.google-apps.spreadsheet";
pub const MIME_PRESENTATION: &str = "application/vnd.google-apps.presentation";
pub const MIME_PDF: &str = "application/pdf";

/// A Drive file as selected by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveKind {
    Docs,
    Sheets,
    Slides,
    Pdf,
}

impl DriveKind {
    fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            MIME_DOCUMENT => Some(Self::Docs),
            MIME_SPREADSHEET => Some(Self::Sheets),
            MIME_PRESENTATION => Some(Self::Slides),
            MIME_PDF => Some(Self::Pdf),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Docs => "Google Docs",
            Self::Sheets => "Google Sheets",
            Self::Slides => "Google Slides",
            Self::Pdf => "PDF",
        }
    }
}

pub fn unsupported_message(mime_type: &str) -> String {
    format!("(File type {} not supported for text extraction)", mime_type)
}

/// Bearer-authenticated client for the Drive, Docs, Sheets and Slides APIs.
pub struct DriveClient {
    client: Client,
    access_token: String,
    config: GoogleConfig,
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>, config: GoogleConfig) -> Self {
        Self {
            client: shared(),
            access_token: access_token.into(),
            config,
        }
    }

    /// Extracts the text of `file`, truncated to the per-source cap.
    pub async fn extract_text(&self, file: &DriveFile) -> String {
        let Some(kind) = DriveKind::from_mime(&file.mime_type) else {
            debug!("Skipping unsupported Drive file {} ({})", file.name, file.mime_type);
            return unsupported_message(&file.mime_type);
        };

        info!("Extracting {} file: {}", kind.label(), file.name);
        let result = match kind {
            DriveKind::Docs => self.extract_document(&file.id).await,
            DriveKind::Sheets => self.extract_spreadsheet(&file.id).await,
            DriveKind::Slides => self.extract_presentation(&file.id).await,
            DriveKind::Pdf => self.extract_pdf(&file.id).await,
        };

        match result {
            Ok(text) => truncate_chars(&text, MAX_SOURCE_CHARS).to_string(),
            Err(e) => {
                warn!("Failed to extract {}: {}", file.name, e);
                format!(
                    "(Error extracting text from {} document \"{}\": {})",
                    kind.label(),
                    file.name,
                    e
                )
            }
        }
    }

    pub async fn file_metadata(&self, file_id: &str) -> Result<DriveFile> {
        let url = format!(
            "{}/drive/v3/files/{}?fields=id,name,mimeType,size",
            self.config.api_base_url, file_id
        );
        let file = self.get_json(&url).await?;
        serde_json::from_value(file).map_err(AppError::from)
    }

    async fn extract_document(&self, id: &str) -> Result<String> {
        let url = format!("{}/v1/documents/{}", self.config.docs_base_url, id);
        let doc = self.get_json(&url).await?;
        Ok(document_text(&doc))
    }

    async fn extract_spreadsheet(&self, id: &str) -> Result<String> {
        let url = format!(
            "{}/v4/spreadsheets/{}?includeGridData=true",
            self.config.api_base_url, id
        );
        let sheet = self.get_json(&url).await?;
        Ok(spreadsheet_text(&sheet))
    }

    async fn extract_presentation(&self, id: &str) -> Result<String> {
        let url = format!("{}/v1/presentations/{}", self.config.slides_base_url, id);
        let deck = self.get_json(&url).await?;
        Ok(presentation_text(&deck))
    }

    async fn extract_pdf(&self, id: &str) -> Result<String> {
        let url = format!("{}/drive/v3/files/{}?alt=media", self.config.api_base_url, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let bytes = ensure_success(response).await?.bytes().await?;

        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;

        let output = Command::new("pdftotext")
            .arg("-layout")
            .arg(file.path())
            .arg("-")
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(output) => Err(AppError::ParseError(format!(
                "pdftotext failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::ConfigError(
                "pdftotext not found (install poppler-utils)".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

/// Concatenates every text run of a Docs v1 document body.
pub fn document_text(doc: &Value) -> String {
    let mut out = String::new();
    if let Some(content) = doc.pointer("/body/content").and_then(Value::as_array) {
        collect_structural(content, &mut out);
    }
    out.trim().to_string()
}

fn collect_structural(elements: &[Value], out: &mut String) {
    for element in elements {
        if let Some(runs) = element.pointer("/paragraph/elements").and_then(Value::as_array) {
            for run in runs {
                if let Some(text) = run.pointer("/textRun/content").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
        }
        if let Some(rows) = element.pointer("/table/tableRows").and_then(Value::as_array) {
            for row in rows {
                for cell in row["tableCells"].as_array().into_iter().flatten() {
                    if let Some(content) = cell["content"].as_array() {
                        collect_structural(content, out);
                    }
                }
            }
        }
        if let Some(content) = element.pointer("/tableOfContents/content").and_then(Value::as_array) {
            collect_structural(content, out);
        }
    }
}

/// Renders every sheet as a titled block of tab-separated rows.
pub fn spreadsheet_text(spreadsheet: &Value) -> String {
    let mut blocks = Vec::new();
    for sheet in spreadsheet["sheets"].as_array().into_iter().flatten() {
        let title = sheet.pointer("/properties/title").and_then(Value::as_str).unwrap_or("Untitled");
        let mut lines = vec![format!("Sheet: {}", title)];
        for grid in sheet["data"].as_array().into_iter().flatten() {
            for row in grid["rowData"].as_array().into_iter().flatten() {
                let cells = row["values"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|cell| cell["formattedValue"].as_str().unwrap_or(""))
                    .collect::<Vec<_>>();
                if cells.iter().any(|c| !c.is_empty()) {
                    lines.push(cells.join("\t"));
                }
            }
        }
        blocks.push(lines.join("\n"));
    }
    blocks.join("\n\n")
}

/// Renders each slide's shape and table text under a `Slide <n>:` heading.
pub fn presentation_text(presentation: &Value) -> String {
    let mut blocks = Vec::new();
    for (i, slide) in presentation["slides"].as_array().into_iter().flatten().enumerate() {
        let mut texts = Vec::new();
        if let Some(elements) = slide["pageElements"].as_array() {
            collect_page_elements(elements, &mut texts);
        }
        let mut block = format!("Slide {}:", i + 1);
        for text in texts {
            block.push('\n');
            block.push_str(&text);
        }
        blocks.push(block);
    }
    blocks.join("\n\n")
}

fn collect_page_elements(elements: &[Value], texts: &mut Vec<String>) {
    for element in elements {
        if let Some(text) = element.pointer("/shape/text") {
            push_text_elements(text, texts);
        }
        if let Some(rows) = element.pointer("/table/tableRows").and_then(Value::as_array) {
            for row in rows {
                for cell in row["tableCells"].as_array().into_iter().flatten() {
                    push_text_elements(&cell["text"], texts);
                }
            }
        }
        if let Some(children) = element.pointer("/elementGroup/children").and_then(Value::as_array) {
            collect_page_elements(children, texts);
        }
    }
}

fn push_text_elements(text: &Value, texts: &mut Vec<String>) {
    let joined: String = text["textElements"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|e| e.pointer("/textRun/content").and_then(Value::as_str))
        .collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        texts.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_text_walks_paragraphs_and_tables() {
        let doc = json!({
            "body": { "content": [
                { "sectionBreak": {} },
                { "paragraph": { "elements": [
                    { "textRun": { "content": "Hello " } },
                    { "textRun": { "content": "world\n" } }
                ] } },
                { "table": { "tableRows": [ { "tableCells": [
                    { "content": [ { "paragraph": { "elements": [ { "textRun": { "content": "cell\n" } } ] } } ] }
                ] } ] } }
            ] }
        });
        assert_eq!(document_text(&doc), "Hello world\ncell");
    }

    #[test]
    fn spreadsheet_text_renders_tab_separated_rows() {
        let sheet = json!({
            "sheets": [{
                "properties": { "title": "Budget" },
                "data": [{ "rowData": [
                    { "values": [ { "formattedValue": "Item" }, { "formattedValue": "Cost" } ] },
                    { "values": [ {} ] },
                    { "values": [ { "formattedValue": "Tea" }, { "formattedValue": "3" } ] }
                ] }]
            }]
        });
        assert_eq!(spreadsheet_text(&sheet), "Sheet: Budget\nItem\tCost\nTea\t3");
    }

    #[test]
    fn presentation_text_numbers_slides() {
        let deck = json!({
            "slides": [
                { "pageElements": [ { "shape": { "text": { "textElements": [
                    { "paragraphMarker": {} },
                    { "textRun": { "content": "Title slide\n" } }
                ] } } } ] },
                { "pageElements": [] }
            ]
        });
        assert_eq!(presentation_text(&deck), "Slide 1:\nTitle slide\n\nSlide 2:");
    }

    #[test]
    fn only_exact_mime_types_are_supported() {
        assert_eq!(DriveKind::from_mime(MIME_DOCUMENT), Some(DriveKind::Docs));
        assert_eq!(DriveKind::from_mime("application/vnd.google-apps.document+x"), None);
        assert_eq!(
            unsupported_message("image/png"),
            "(File type image/png not supported for text extraction)"
        );
    }
}
