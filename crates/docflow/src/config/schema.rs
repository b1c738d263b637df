use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::secrets::expand_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root for `uploads/`, `outputs/` and `database/`. `~` is expanded.
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_data_directory() -> String {
    "~/.docflow".to_string()
}

impl Config {
    /// A default configuration rooted at `data_directory`.
    pub fn with_data_directory(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: data_directory.into().to_string_lossy().into_owned(),
            registry: RegistryConfig::default(),
            converter: ConverterConfig::default(),
            extraction: ExtractionConfig::default(),
            jobs: JobsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.data_directory))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.data_dir().join("outputs")
    }

    pub fn database_dir(&self) -> PathBuf {
        self.data_dir().join("database")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_directory(default_data_directory())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// `documents.json` with a `.bak` beside it.
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: RegistryBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// `{input}` is replaced with the document path.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default = "default_rendered_extension")]
    pub rendered_extension: String,
}

fn default_program() -> String {
    "marker_single".to_string()
}

fn default_args() -> Vec<String> {
    vec!["{input}".to_string()]
}

fn default_rendered_extension() -> String {
    "html".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_directory: None,
            rendered_extension: default_rendered_extension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-2024-08-06".to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Upper bound on concurrent conversions. Unbounded when absent.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default = "default_progress_channel_capacity")]
    pub progress_channel_capacity: usize,
}

fn default_progress_channel_capacity() -> usize {
    256
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            progress_channel_capacity: default_progress_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
