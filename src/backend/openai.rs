//! OpenAI-compatible chat completions backend.
//!
//! Serves both OpenAI and the Hugging Face inference router, which speaks
//! the same `/chat/completions` protocol.

use super::cleanup::clean_response;
use super::{classify_status, classify_transport, AnalysisBackend, HttpSettings};
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client.
pub struct OpenAiBackend {
    settings: HttpSettings,
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(settings: HttpSettings) -> Result<Self, BackendError> {
        let http_client = settings.client()?;
        Ok(Self {
            settings,
            http_client,
        })
    }
}

#[async_trait]
impl AnalysisBackend for OpenAiBackend {
    fn label(&self) -> String {
        format!("{}/{}", self.settings.provider.as_str(), self.settings.model)
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.settings.base_url);

        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        debug!("POST {} ({} prompt chars)", url, prompt.len());

        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(ref key) = self.settings.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
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

        let content = parse_completion(&body)?;

        if self.settings.clean_repetition {
            Ok(clean_response(&content))
        } else {
            Ok(content)
        }
    }
}

/// Extract the first choice's text from a completion body.
fn parse_completion(body: &str) -> Result<String, BackendError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::malformed(format!("Failed to parse completion: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| BackendError::malformed("Completion contained no text"))
}
