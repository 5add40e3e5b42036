use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, ServiceError};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-3-5-haiku-20241022";

const SYSTEM_PROMPT: &str = r#"You are a helpful assistant that summarizes news articles.
Focus on the key facts and the main story.
Use clear, concise language and keep a journalistic tone."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub prompt: String,
    /// Upper bound on the summary length, in words.
    pub max_words: u32,
}

/// A text summarization backend.
#[async_trait]
pub trait SummaryService: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> std::result::Result<String, ServiceError>;

    fn model_version(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

pub struct ClaudeSummarizer {
    client: Client,
    api_key: String,
}

impl ClaudeSummarizer {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl SummaryService for ClaudeSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> std::result::Result<String, ServiceError> {
        let message = MessageRequest {
            model: CLAUDE_MODEL.to_string(),
            // Roughly two tokens per word leaves room to finish the last sentence.
            max_tokens: (request.max_words * 2).max(64),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            system: Some(SYSTEM_PROMPT.to_string()),
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&message)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status.as_u16(), &error_text));
        }

        let message_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(&e))?;

        summary_from_response(message_response)
    }

    fn model_version(&self) -> &str {
        CLAUDE_MODEL
    }
}

fn summary_from_response(response: MessageResponse) -> std::result::Result<String, ServiceError> {
    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(ServiceError::Permanent(
            "summary declined by content policy".to_string(),
        ));
    }

    let summary = response
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    let summary = summary.trim();
    if summary.is_empty() {
        return Err(ServiceError::Permanent("empty summary returned".to_string()));
    }
    Ok(summary.to_string())
}
