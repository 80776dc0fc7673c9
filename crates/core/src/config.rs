use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Azure OpenAI only: `api-version` query parameter.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Azure OpenAI only: deployment name. Falls back to the model name.
    #[serde(default)]
    pub deployment: Option<String>,
    /// `None` follows the global proxy, `Some("")` forces a direct connection.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl ProviderConfig {
    /// The configured key, or the conventional environment variable for
    /// `provider_name` when the config value is empty.
    pub fn resolved_api_key(&self, provider_name: &str) -> Option<String> {
        let key = self.api_key.trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }
        env_key_name(provider_name)
            .and_then(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn env_key_name(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("OPENAI_API_KEY"),
        "azure" => Some("AZURE_OPENAI_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Explicit provider name. When unset it is inferred from the model.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// `chrome` or `edge`.
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Explicit browser binary; skips discovery when set.
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Needed when running as root inside containers.
    #[serde(default = "default_true")]
    pub no_sandbox: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
}

fn default_engine() -> String {
    "chrome".to_string()
}

fn default_true() -> bool {
    true
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    1024
}

fn default_launch_timeout_secs() -> u64 {
    15
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            headless: true,
            executable: None,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            no_sandbox: true,
            extra_args: Vec::new(),
            launch_timeout_secs: default_launch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
    #[serde(default = "default_navigation_secs")]
    pub navigation_secs: u64,
    #[serde(default = "default_page_ready_secs")]
    pub page_ready_secs: u64,
    #[serde(default = "default_element_ms")]
    pub element_ms: u64,
    #[serde(default = "default_ai_secs")]
    pub ai_secs: u64,
    #[serde(default = "default_file_chooser_ms")]
    pub file_chooser_ms: u64,
}

fn default_download_secs() -> u64 {
    30
}

fn default_navigation_secs() -> u64 {
    60
}

fn default_page_ready_secs() -> u64 {
    30
}

fn default_element_ms() -> u64 {
    5000
}

fn default_ai_secs() -> u64 {
    60
}

fn default_file_chooser_ms() -> u64 {
    5000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            download_secs: default_download_secs(),
            navigation_secs: default_navigation_secs(),
            page_ready_secs: default_page_ready_secs(),
            element_ms: default_element_ms(),
            ai_secs: default_ai_secs(),
            file_chooser_ms: default_file_chooser_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn page_ready(&self) -> Duration {
        Duration::from_secs(self.page_ready_secs)
    }

    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn ai(&self) -> Duration {
        Duration::from_secs(self.ai_secs)
    }

    pub fn file_chooser(&self) -> Duration {
        Duration::from_millis(self.file_chooser_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    /// Where evidence screenshots are written. Relative paths resolve
    /// against the current directory.
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: String,
    /// Parent directory for per-run working directories. Defaults to the
    /// system temp dir.
    #[serde(default)]
    pub temp_root: Option<String>,
}

fn default_screenshots_dir() -> String {
    "screenshots".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: default_screenshots_dir(),
            temp_root: None,
        }
    }
}

impl OutputConfig {
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(expand_home)
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        expand_home(&self.screenshots_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub no_proxy: Vec<String>,
    /// User-Agent for résumé downloads.
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), ProviderConfig::default());
        providers.insert(
            "azure".to_string(),
            ProviderConfig {
                api_version: Some("2024-02-15-preview".to_string()),
                ..ProviderConfig::default()
            },
        );
        providers.insert(
            "openrouter".to_string(),
            ProviderConfig {
                api_base: Some("https://openrouter.ai/api/v1".to_string()),
                ..ProviderConfig::default()
            },
        );
        providers.insert("deepseek".to_string(), ProviderConfig::default());
        providers.insert("groq".to_string(), ProviderConfig::default());

        Self {
            providers,
            llm: LlmConfig::default(),
            browser: BrowserConfig::default(),
            timeouts: TimeoutConfig::default(),
            output: OutputConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// First provider, in priority order, that has a usable API key.
    pub fn get_api_key(&self) -> Option<(&str, String)> {
        let priority = ["azure", "openai", "openrouter", "deepseek", "groq"];
        for name in priority {
            if let Some(provider) = self.providers.get(name) {
                if let Some(key) = provider.resolved_api_key(name) {
                    return Some((name, key));
                }
            }
        }
        None
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
