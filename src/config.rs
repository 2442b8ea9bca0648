//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.mdpanel.toml` files.

use anyhow::{Context, Result};
use crate::report::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".mdpanel.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// LLM backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Pipeline timing and pool settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Custom specialist roster. Empty means the built-in roster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialists: Vec<SpecialistConfig>,

    /// Synthesis settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Output file path. Unset means `results/final_diagnosis.<ext>` for the
    /// chosen format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Directory searched for reports when none is given.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            reports_dir: default_reports_dir(),
            verbose: false,
        }
    }
}

const DEFAULT_OUTPUT_STEM: &str = "results/final_diagnosis";

impl GeneralConfig {
    /// Where to write a report in `format`.
    pub fn output_path(&self, format: OutputFormat) -> PathBuf {
        match self.output {
            Some(ref path) => path.clone(),
            None => PathBuf::from(DEFAULT_OUTPUT_STEM).with_extension(format.extension()),
        }
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("Medical Reports")
}

/// Which LLM provider to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Pick from available credentials
    #[default]
    Auto,
    /// OpenAI chat completions
    Openai,
    /// Hugging Face inference router (OpenAI-compatible)
    Huggingface,
    /// Local Ollama server
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Auto => "auto",
            Provider::Openai => "openai",
            Provider::Huggingface => "huggingface",
            Provider::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Openai | Provider::Auto => "gpt-4-turbo",
            Provider::Huggingface => "meta-llama/Llama-3.2-3B-Instruct",
            Provider::Ollama => "llama3.2",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Openai | Provider::Auto => "https://api.openai.com/v1",
            Provider::Huggingface => "https://router.huggingface.co/v1",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    /// Hugging Face models sample at 0.7; the others run deterministic.
    pub fn default_temperature(&self) -> f32 {
        match self {
            Provider::Huggingface => 0.7,
            Provider::Openai | Provider::Ollama | Provider::Auto => 0.0,
        }
    }

    /// Environment variable holding the provider's API key, if any.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Provider::Openai => Some("OPENAI_API_KEY"),
            Provider::Huggingface => Some("HUGGINGFACEHUB_API_TOKEN"),
            Provider::Ollama | Provider::Auto => None,
        }
    }
}

/// LLM backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Overrides the provider's default endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Overrides the provider's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Temperature for generation. Defaults per provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts on rate-limit or timeout failures.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Base delay between attempts; grows linearly.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Collapse repeated lines in generated text. Defaults on for Hugging Face.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_repetition: Option<bool>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Auto,
            base_url: None,
            model: None,
            temperature: None,
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff(),
            clean_repetition: None,
        }
    }
}

fn default_max_tokens() -> u32 {
    600
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> usize {
    1
}

fn default_retry_backoff() -> u64 {
    2000
}

impl BackendConfig {
    /// Configured temperature, else the provider's default.
    pub fn effective_temperature(&self, provider: Provider) -> f32 {
        self.temperature
            .unwrap_or_else(|| provider.default_temperature())
    }

    /// Resolve `Auto` using whichever credential is present.
    pub fn resolve_provider(&self, env: impl Fn(&str) -> Option<String>) -> Provider {
        match self.provider {
            Provider::Auto => {
                if env("HUGGINGFACEHUB_API_TOKEN").is_some() {
                    Provider::Huggingface
                } else if env("OPENAI_API_KEY").is_some() {
                    Provider::Openai
                } else {
                    Provider::Ollama
                }
            }
            other => other,
        }
    }
}

/// Pipeline timing and pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for one specialist task.
    #[serde(default = "default_specialist_timeout")]
    pub specialist_timeout_seconds: u64,

    /// Optional upper bound for the whole specialist phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_seconds: Option<u64>,

    /// Worker pool size; defaults to the roster size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            specialist_timeout_seconds: default_specialist_timeout(),
            deadline_seconds: None,
            pool_size: None,
        }
    }
}

fn default_specialist_timeout() -> u64 {
    300
}

/// One `[[specialists]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistConfig {
    pub id: String,
    pub name: String,
    pub template: String,
}

/// Synthesis settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Replaces the built-in multidisciplinary team template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }
        if let Some(ref dir) = args.reports_dir {
            self.general.reports_dir = dir.clone();
        }

        if let Some(provider) = args.provider {
            self.backend.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.backend.model = Some(model.clone());
        }
        if let Some(ref url) = args.base_url {
            self.backend.base_url = Some(url.clone());
        }
        if let Some(temperature) = args.temperature {
            self.backend.temperature = Some(temperature);
        }
        if let Some(retries) = args.retries {
            self.backend.retries = retries;
        }

        if let Some(timeout) = args.timeout {
            self.pipeline.specialist_timeout_seconds = timeout;
        }
        if let Some(deadline) = args.deadline {
            self.pipeline.deadline_seconds = Some(deadline);
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
