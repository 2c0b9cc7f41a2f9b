use serde::Serialize;
use serde_json::Value;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Result, AppError};
use crate::http_client::shared;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes documents. Always format your response in GitHub-flavored Markdown.";

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

/// Per-call overrides of the configured model parameters.
#[derive(Debug, Clone, Default)]
pub struct LlmOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

pub fn build_user_message(prompt: &str, content: &str) -> String {
    let mut result = String::with_capacity(prompt.len() + content.len() + 80);
    result.push_str(prompt);
    result.push_str("\n\n--- SOURCE DOCUMENTS ---\n\n");
    result.push_str(content);
    result.push_str("\n\n--- END SOURCE DOCUMENTS ---");
    result
}

pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: shared(),
            config,
        }
    }

    /// Sends `prompt` and the combined source `content` to the chat-completion
    /// endpoint and returns the markdown reply.
    pub async fn analyze(&self, prompt: &str, content: &str, options: &LlmOptions) -> Result<String> {
        let body = ChatRequest {
            model: options.model.clone().unwrap_or_else(|| self.config.model.clone()),
            messages: vec![
                Message {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                Message {
                    role: "user".into(),
                    content: build_user_message(prompt, content),
                },
            ],
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
        };

        info!("Calling {} with model {}", self.config.endpoint, body.model);
        debug!("User message length: {} chars", body.messages[1].content.len());

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body);

        // OpenRouter attribution headers
        if let Some(url) = &self.config.site_url {
            request = request.header("HTTP-Referer", url.as_str());
        }
        if let Some(name) = &self.config.site_name {
            request = request.header("X-Title", name.as_str());
        }

        let res = request
            .send()
            .await
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            warn!("LLM request failed with status {}", status.as_u16());
            return Err(AppError::LlmError(format!(
                "API request failed with status {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        let json: Value = res
            .json()
            .await
            .map_err(|e| AppError::LlmError(format!("Invalid response body: {}", e)))?;
        parse_reply(&json)
    }
}

fn parse_reply(json: &Value) -> Result<String> {
    if let Some(content) = json["choices"][0]["message"]["content"].as_str() {
        return Ok(content.to_string());
    }
    match json["error"]["message"].as_str() {
        Some(message) => Err(AppError::LlmError(message.to_string())),
        None => Err(AppError::LlmError("Invalid response format from LLM".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_wraps_sources() {
        assert_eq!(
            build_user_message("Summarize", "doc"),
            "Summarize\n\n--- SOURCE DOCUMENTS ---\n\ndoc\n\n--- END SOURCE DOCUMENTS ---"
        );
    }

    #[test]
    fn reply_is_first_choice_content() {
        let json = json!({ "choices": [ { "message": { "role": "assistant", "content": "# Done" } } ] });
        assert_eq!(parse_reply(&json).unwrap(), "# Done");
    }

    #[test]
    fn malformed_reply_is_an_error() {
        let err = parse_reply(&json!({ "choices": [] })).unwrap_err();
        assert_eq!(err.to_string(), "LLM processing error: Invalid response format from LLM");

        let err = parse_reply(&json!({ "error": { "message": "quota exceeded" } })).unwrap_err();
        assert!(err.to_string().ends_with("quota exceeded"));
    }
}
