//! Ollama chat backend.

use super::cleanup::clean_response;
use super::{classify_status, classify_transport, AnalysisBackend, HttpSettings};
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Client for a local (or remote) Ollama server.
pub struct OllamaBackend {
    settings: HttpSettings,
    http_client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(settings: HttpSettings) -> Result<Self, BackendError> {
        let http_client = settings.client()?;
        Ok(Self {
            settings,
            http_client,
        })
    }
}

#[async_trait]
impl AnalysisBackend for OllamaBackend {
    fn label(&self) -> String {
        format!("ollama/{}", self.settings.model)
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.settings.base_url);

        let request = OllamaChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens,
            },
        };

        debug!("POST {} ({} prompt chars)", url, prompt.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                classify_transport(&e, &self.settings.base_url, self.settings.timeout_seconds)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response.text().await.map_err(|e| {
            classify_transport(&e, &self.settings.base_url, self.settings.timeout_seconds)
        })?;

        let content = parse_chat(&body)?;

        if self.settings.clean_repetition {
            Ok(clean_response(&content))
        } else {
            Ok(content)
        }
    }
}

fn parse_chat(body: &str) -> Result<String, BackendError> {
    let parsed: OllamaChatResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::malformed(format!("Failed to parse Ollama response: {}", e)))?;

    if parsed.message.content.trim().is_empty() {
        return Err(BackendError::malformed("Ollama returned an empty message"));
    }
    Ok(parsed.message.content)
}
