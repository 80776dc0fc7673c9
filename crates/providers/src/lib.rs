pub mod client;
pub mod factory;
pub mod openai;

use async_trait::async_trait;
use formpilot_core::types::{ChatMessage, LLMResponse};
use formpilot_core::Result;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMResponse>;
}

pub use client::{build_http_client, HttpClientOptions};
pub use factory::{create_provider, infer_provider_from_model};
pub use openai::{ApiFlavor, OpenAIProvider, ProviderSettings};
