use formpilot_core::Config;
use std::time::Duration;

use crate::client::HttpClientOptions;
use crate::openai::{ApiFlavor, ProviderSettings};
use crate::{OpenAIProvider, Provider};

const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

/// Default api_base for OpenAI-compatible providers.
fn default_api_base(provider_name: &str) -> &'static str {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Infer the provider from a model string prefix.
pub fn infer_provider_from_model(model: &str) -> Option<&'static str> {
    if model.starts_with("azure/") {
        Some("azure")
    } else if model.starts_with("openai/")
        || model.starts_with("gpt-")
        || model.starts_with("o1")
        || model.starts_with("o3")
    {
        Some("openai")
    } else if model.starts_with("deepseek") {
        Some("deepseek")
    } else if model.starts_with("groq/") {
        Some("groq")
    } else {
        None
    }
}

fn strip_routing_prefix(model: &str) -> &str {
    for prefix in ["azure/", "openai/", "groq/"] {
        if let Some(rest) = model.strip_prefix(prefix) {
            return rest;
        }
    }
    model
}

/// Resolution order: `llm.provider`, then the model prefix, then the first
/// provider in the config that has a key.
pub fn create_provider(config: &Config) -> anyhow::Result<Box<dyn Provider>> {
    let llm = &config.llm;
    let explicit = llm.provider.as_deref().filter(|p| !p.is_empty());

    let effective: String = if let Some(ep) = explicit {
        ep.to_string()
    } else if let Some(inferred) = infer_provider_from_model(&llm.model) {
        inferred.to_string()
    } else if let Some((name, _)) = config.get_api_key() {
        name.to_string()
    } else {
        return Err(anyhow::anyhow!(
            "No LLM provider configured. Set 'llm.provider', use a recognized model name \
             (e.g. 'gpt-4o-mini'), or add an API key to the providers section."
        ));
    };

    let empty_cfg = formpilot_core::config::ProviderConfig::default();
    let provider_cfg = config.get_provider(&effective);
    if explicit.is_some() && provider_cfg.is_none() {
        return Err(anyhow::anyhow!(
            "Provider '{}' is explicitly configured but not found in providers section",
            effective
        ));
    }
    let resolved_cfg = provider_cfg.unwrap_or(&empty_cfg);

    let api_key = resolved_cfg.resolved_api_key(&effective).ok_or_else(|| {
        anyhow::anyhow!("Provider '{}' has no API key (config or environment)", effective)
    })?;

    let model = strip_routing_prefix(&llm.model).to_string();
    let (api_base, flavor) = if effective == "azure" {
        let base = resolved_cfg
            .api_base
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Provider 'azure' requires 'apiBase' (the resource endpoint)"))?;
        let flavor = ApiFlavor::Azure {
            deployment: resolved_cfg.deployment.clone().unwrap_or_else(|| model.clone()),
            api_version: resolved_cfg
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        };
        (base, flavor)
    } else {
        let base = resolved_cfg
            .api_base
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| default_api_base(&effective).to_string());
        (base, ApiFlavor::OpenAi)
    };

    let settings = ProviderSettings {
        api_key,
        api_base,
        model,
        max_tokens: llm.max_tokens,
        temperature: llm.temperature,
        max_retries: llm.max_retries,
        retry_delay: Duration::from_millis(llm.retry_delay_ms),
        // The pipeline applies its own deadline; this only guards a hung socket.
        request_timeout: config.timeouts.ai() + Duration::from_secs(5),
    };
    let http = HttpClientOptions {
        provider_proxy: resolved_cfg.proxy.as_deref(),
        global_proxy: config.network.proxy.as_deref(),
        no_proxy: &config.network.no_proxy,
        user_agent: None,
    };

    Ok(Box::new(OpenAIProvider::new_with_proxy(settings, flavor, &http)))
}
