use async_trait::async_trait;
use formpilot_core::types::{ChatMessage, LLMResponse};
use formpilot_core::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::{build_http_client, HttpClientOptions};
use crate::Provider;

/// Find the largest byte index <= `max_bytes` that is a valid char boundary.
pub(crate) fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Which wire dialect of the chat-completions API to speak.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFlavor {
    /// `{base}/chat/completions` with a Bearer token.
    OpenAi,
    /// `{base}/openai/deployments/{deployment}/chat/completions?api-version=...`
    /// with an `api-key` header; the model travels in the URL.
    Azure {
        deployment: String,
        api_version: String,
    },
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

pub struct OpenAIProvider {
    client: Client,
    flavor: ApiFlavor,
    settings: ProviderSettings,
}

impl OpenAIProvider {
    pub fn new(settings: ProviderSettings, flavor: ApiFlavor) -> Self {
        Self::new_with_proxy(settings, flavor, &HttpClientOptions::default())
    }

    pub fn new_with_proxy(
        mut settings: ProviderSettings,
        flavor: ApiFlavor,
        http: &HttpClientOptions<'_>,
    ) -> Self {
        settings.api_base = settings.api_base.trim_end_matches('/').to_string();
        let client = build_http_client(&settings.api_base, settings.request_timeout, http);
        Self {
            client,
            flavor,
            settings,
        }
    }

    fn endpoint(&self) -> String {
        match &self.flavor {
            ApiFlavor::OpenAi => format!("{}/chat/completions", self.settings.api_base),
            ApiFlavor::Azure {
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.settings.api_base,
                urlencoding_path(deployment),
                api_version
            ),
        }
    }

    fn build_request(&self, messages: &[ChatMessage]) -> ChatRequest {
        ChatRequest {
            model: match self.flavor {
                ApiFlavor::OpenAi => Some(self.settings.model.clone()),
                ApiFlavor::Azure { .. } => None,
            },
            messages: messages.to_vec(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// One HTTP round trip. `Retryable` marks 429/5xx and transport errors.
    async fn send_request(&self, messages: &[ChatMessage]) -> std::result::Result<ChatResponse, Attempt> {
        let url = self.endpoint();
        let request = self.build_request(messages);

        info!(url = %url, model = %self.settings.model, messages_count = messages.len(), "Calling LLM");

        let mut builder = self.client.post(&url).json(&request);
        builder = match self.flavor {
            ApiFlavor::OpenAi => builder.header("Authorization", format!("Bearer {}", self.settings.api_key)),
            ApiFlavor::Azure { .. } => builder.header("api-key", &self.settings.api_key),
        };

        let response = builder.send().await.map_err(|e| {
            Attempt::Retryable(Error::Provider(format!("Request failed: {}", e)))
        })?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let end = truncate_at_char_boundary(&raw_body, 500);
            error!(status = %status, body = %&raw_body[..end], "LLM API error");
            let err = Error::Provider(format!("API error {}: {}", status, &raw_body[..end]));
            return Err(if is_retryable(status) {
                Attempt::Retryable(err)
            } else {
                Attempt::Fatal(err)
            });
        }

        {
            let end = truncate_at_char_boundary(&raw_body, 500);
            debug!(body_len = raw_body.len(), preview = %&raw_body[..end], "LLM raw response");
        }

        parse_chat_response(&raw_body).map_err(Attempt::Fatal)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Deployment names are plain identifiers in practice; only spaces and
/// slashes need escaping for the URL path.
fn urlencoding_path(segment: &str) -> String {
    segment.replace('/', "%2F").replace(' ', "%20")
}

enum Attempt {
    Retryable(Error),
    Fatal(Error),
}

fn parse_chat_response(raw_body: &str) -> Result<ChatResponse> {
    serde_json::from_str(raw_body).map_err(|e| {
        let end = truncate_at_char_boundary(raw_body, 500);
        Error::Provider(format!("Failed to parse response: {}. Body: {}", e, &raw_body[..end]))
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMResponse> {
        let mut attempt = 0u32;
        let chat_response = loop {
            match self.send_request(messages).await {
                Ok(resp) => break resp,
                Err(Attempt::Retryable(e)) if attempt < self.settings.max_retries => {
                    let delay = self.settings.retry_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "LLM call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(Attempt::Retryable(e)) | Err(Attempt::Fatal(e)) => return Err(e),
            }
        };

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("No choices in response".to_string()))?;

        let content = choice.message.content.unwrap_or_default();
        Ok(LLMResponse {
            content: if content.is_empty() { None } else { Some(content) },
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: chat_response.usage.unwrap_or(Value::Null),
        })
    }
}
