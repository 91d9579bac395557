//! Configuration for trackbench.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::aggregate::ScoringPolicy;
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings for one OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://openrouter.ai/api")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "deepseek/deepseek-v3.2")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Value for the `HTTP-Referer` header some gateways require.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Value for the `X-Title` header some gateways use for attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

fn default_api_base() -> String {
    "https://openrouter.ai/api".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            model: "deepseek/deepseek-v3.2".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            referer: None,
            title: None,
        }
    }
}

/// How a target model is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenRouter chat completions with the document attached as a file part.
    #[default]
    Openrouter,
    /// Any OpenAI-compatible endpoint, document attached as a file part.
    OpenaiCompatible,
    /// OpenAI-compatible endpoint, document text inlined into the prompt.
    TextInline,
}

/// A model under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub provider: ProviderKind,
    /// Falls back to the judge's endpoint when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: ProviderKind::default(),
            api_base: None,
            api_key: None,
            max_tokens: None,
        }
    }
}

/// Scheduling, timeout and retry settings for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum (question, model) items in flight.
    pub concurrency: usize,
    /// Attempts per external call, including the first.
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    /// Timeout for a single answer or arbiter call.
    pub call_timeout_secs: u64,
    /// Deadline for the whole run; remaining items are cancelled.
    pub run_timeout_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 2,
            retry_backoff_ms: 500,
            call_timeout_secs: 120,
            run_timeout_secs: None,
        }
    }
}

impl RunConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Arbiter endpoint and model
    pub judge: LlmConfig,
    /// Models under evaluation
    pub models: Vec<ModelEntry>,
    /// Run scheduling
    pub run: RunConfig,
    /// Score table and roll-up policy
    pub scoring: ScoringPolicy,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    judge: Option<LlmFileSection>,
    #[serde(default)]
    models: Vec<ModelEntry>,
    run: Option<RunConfig>,
    scoring: Option<ScoringPolicy>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    referer: Option<String>,
    title: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, JUDGE_MODEL, ...)
    /// 2. Config file (`explicit`, else ~/.config/trackbench/config.yaml)
    /// 3. Default values
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Config::default(),
            },
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.judge.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY").or_else(|_| env::var("OPENROUTER_API_KEY")) {
            self.judge.api_key = api_key;
        }

        if let Ok(model) = env::var("JUDGE_MODEL") {
            self.judge.model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                self.judge.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                self.judge.temperature = temp;
            }
        }

        if let Ok(concurrency) = env::var("TRACKBENCH_CONCURRENCY") {
            if let Ok(n) = concurrency.parse() {
                self.run.concurrency = n;
            }
        }

        if let Ok(credit) = env::var("TRACKBENCH_PARTIAL_CREDIT") {
            if let Ok(value) = credit.parse() {
                self.scoring.partial_credit = value;
            }
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.judge {
            if let Some(api_base) = llm.api_base {
                config.judge.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.judge.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.judge.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.judge.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.judge.temperature = temperature;
            }
            config.judge.referer = llm.referer;
            config.judge.title = llm.title;
        }

        config.models = file_config.models;
        if let Some(run) = file_config.run {
            config.run = run;
        }
        if let Some(scoring) = file_config.scoring {
            config.scoring = scoring;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "trackbench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Connection settings for a target model, inheriting the judge's endpoint.
    pub fn model_llm_config(&self, entry: &ModelEntry) -> LlmConfig {
        LlmConfig {
            api_base: entry
                .api_base
                .clone()
                .unwrap_or_else(|| self.judge.api_base.clone()),
            api_key: entry
                .api_key
                .clone()
                .unwrap_or_else(|| self.judge.api_key.clone()),
            model: entry.name.clone(),
            max_tokens: entry.max_tokens.unwrap_or(self.judge.max_tokens),
            temperature: self.judge.temperature,
            referer: self.judge.referer.clone(),
            title: self.judge.title.clone(),
        }
    }

    /// Make sure every named model has an entry, adding defaults for new ones.
    pub fn ensure_models(&mut self, names: &[String]) {
        for name in names {
            if !self.models.iter().any(|m| &m.name == name) {
                self.models.push(ModelEntry::new(name.clone()));
            }
        }
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.judge.api_base.is_empty() {
            return Err(EvalError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.judge.api_key.is_empty() {
            return Err(EvalError::Config(
                "LLM API key is required. Set LLM_API_KEY or OPENROUTER_API_KEY, or add to config file.".to_string()
            ));
        }

        if self.judge.model.is_empty() {
            return Err(EvalError::Config(
                "Judge model is required. Set JUDGE_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.run.concurrency == 0 {
            return Err(EvalError::Config("run.concurrency must be at least 1".to_string()));
        }

        if self.run.max_attempts == 0 {
            return Err(EvalError::Config("run.max_attempts must be at least 1".to_string()));
        }

        if self.run.call_timeout_secs == 0 || self.run.run_timeout_secs == Some(0) {
            return Err(EvalError::Config("timeouts must be greater than zero".to_string()));
        }

        self.scoring.validate()
    }

    /// Create a config from explicit judge values (useful for testing).
    pub fn with_judge(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            judge: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
