//! Configuration management for chatbridge.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::attachments::{mb_to_bytes, VisionPolicy, DEFAULT_MAX_IMAGES, DEFAULT_MAX_IMAGE_SIZE_MB};
use crate::compose::DEFAULT_MAX_RAG_CHARS;
use crate::types::{
    GenerationConfig, OpenAiApi, ProviderKind, DEFAULT_ANTHROPIC_VERSION, DEFAULT_MAX_TOKENS,
    DEFAULT_MAX_TOKENS_PARAM, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub vision: VisionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub openai_api: OpenAiApi,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    #[serde(default = "default_max_tokens_param")]
    pub max_tokens_param: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i64,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
}

fn default_api_key_env() -> String {
    "CHATBRIDGE_API_KEY".to_string()
}

fn default_provider() -> String {
    "auto".to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> i64 {
    DEFAULT_MAX_TOKENS as i64
}

fn default_max_tokens_param() -> String {
    DEFAULT_MAX_TOKENS_PARAM.to_string()
}

fn default_timeout_secs() -> i64 {
    DEFAULT_TIMEOUT_SECS as i64
}

fn default_anthropic_version() -> String {
    DEFAULT_ANTHROPIC_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub system_prompt: String,
    /// Reply template; `{ai_text}` is replaced with the model output.
    #[serde(default)]
    pub response_template: String,
    #[serde(default)]
    pub rag_content: String,
    /// Read instead of `rag_content` when set.
    #[serde(default)]
    pub rag_file: Option<PathBuf>,
    #[serde(default = "default_max_rag_chars")]
    pub max_rag_chars: usize,
}

fn default_max_rag_chars() -> usize {
    DEFAULT_MAX_RAG_CHARS
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            response_template: String::new(),
            rag_content: String::new(),
            rag_file: None,
            max_rag_chars: DEFAULT_MAX_RAG_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default = "default_max_image_size_mb")]
    pub max_image_size_mb: f64,
    #[serde(default)]
    pub include_inline: bool,
}

fn bool_true() -> bool {
    true
}

fn default_max_images() -> usize {
    DEFAULT_MAX_IMAGES
}

fn default_max_image_size_mb() -> f64 {
    DEFAULT_MAX_IMAGE_SIZE_MB
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_images: DEFAULT_MAX_IMAGES,
            max_image_size_mb: DEFAULT_MAX_IMAGE_SIZE_MB,
            include_inline: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                api_key_env: default_api_key_env(),
                model: "gpt-4o-mini".to_string(),
                provider: default_provider(),
                openai_api: OpenAiApi::default(),
                temperature: DEFAULT_TEMPERATURE,
                max_tokens: default_max_tokens(),
                max_tokens_param: default_max_tokens_param(),
                timeout_secs: default_timeout_secs(),
                anthropic_version: default_anthropic_version(),
            },
            prompt: PromptConfig {
                system_prompt: "You are a helpful assistant. Be concise and accurate.".to_string(),
                ..PromptConfig::default()
            },
            vision: VisionConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".chatbridge").join("config.toml"))
    }

    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("CHATBRIDGE_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(model) = var("CHATBRIDGE_MODEL") {
            self.llm.model = model;
        }
        if let Some(provider) = var("CHATBRIDGE_PROVIDER") {
            self.llm.provider = provider;
        }
    }

    /// `llm.api_key` if set, else the variable named by `llm.api_key_env`.
    /// `None` is valid for keyless endpoints.
    pub fn api_key(&self) -> Option<String> {
        self.resolve_api_key(|name| std::env::var(name).ok())
    }

    fn resolve_api_key(&self, var: impl Fn(&str) -> Option<String>) -> Option<String> {
        if let Some(key) = &self.llm.api_key {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }
        if self.llm.api_key_env.trim().is_empty() {
            return None;
        }
        var(self.llm.api_key_env.trim()).filter(|k| !k.trim().is_empty())
    }

    pub fn api_url(&self) -> Result<&str> {
        let url = self.llm.api_url.trim();
        if url.is_empty() {
            bail!(
                "Missing API URL. Set llm.api_url in the config file or export CHATBRIDGE_API_URL"
            );
        }
        Ok(url)
    }

    /// Sanitized per-request settings.
    pub fn generation_config(&self) -> Result<GenerationConfig> {
        let llm = &self.llm;
        let model = llm.model.trim();
        if model.is_empty() {
            bail!("Missing model. Set llm.model in the config file or export CHATBRIDGE_MODEL");
        }
        let provider: ProviderKind = llm
            .provider
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let temperature = if llm.temperature.is_finite() {
            llm.temperature
        } else {
            DEFAULT_TEMPERATURE
        };
        let max_tokens = u32::try_from(llm.max_tokens)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let timeout_secs = u64::try_from(llm.timeout_secs)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(GenerationConfig::new(model)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens)
            .with_max_tokens_param(non_blank(&llm.max_tokens_param, DEFAULT_MAX_TOKENS_PARAM))
            .with_timeout_secs(timeout_secs)
            .with_provider(provider)
            .with_anthropic_version(non_blank(&llm.anthropic_version, DEFAULT_ANTHROPIC_VERSION))
            .with_openai_api(llm.openai_api))
    }

    /// `None` when vision is disabled.
    pub fn vision_policy(&self) -> Option<VisionPolicy> {
        if !self.vision.enabled {
            return None;
        }
        Some(VisionPolicy {
            max_images: self.vision.max_images,
            max_image_bytes: mb_to_bytes(self.vision.max_image_size_mb),
            include_inline: self.vision.include_inline,
        })
    }

    /// Reference text from `prompt.rag_file`, falling back to `prompt.rag_content`.
    pub fn rag_text(&self) -> Result<String> {
        match &self.prompt.rag_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read RAG file: {}", path.display())),
            None => Ok(self.prompt.rag_content.clone()),
        }
    }

    pub fn save_default(path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let default = Self::default();
        let content = toml::to_string_pretty(&default).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        Ok(config_path)
    }
}

fn non_blank(value: &str, fallback: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
