use crate::budget::trimming::{DEFAULT_MAX_MESSAGE_TOKENS, DEFAULT_RESERVE_TOKENS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE_PATH: &str = "threadmem.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// When a thread becomes eligible for summarization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Fire once `threshold` messages arrived since the latest summary
    #[default]
    SinceLastSummary,
    /// Fire whenever the total message count is a multiple of `threshold`
    EveryNth,
}

/// Settings for the summarization workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// Model used for extraction calls, distinct from the chat model
    pub model: String,
    pub threshold: usize,
    pub trigger: TriggerPolicy,
    /// Low temperature favours repeatable extraction
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Output tokens requested from the extraction model
    pub max_output_tokens: u32,
    /// Safety buffer kept free in the extraction model's window
    pub buffer_tokens: u32,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-3.5-turbo".to_string(),
            threshold: 4,
            trigger: TriggerPolicy::default(),
            temperature: 0.2,
            timeout_secs: 60,
            max_output_tokens: 1000,
            buffer_tokens: 100,
        }
    }
}

impl SummarizationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for chat-context preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatContextConfig {
    /// Thread system prompts are cut to this many tokens
    pub max_system_prompt_tokens: u32,
    /// Tokens kept free for the model's answer
    pub reserve_tokens: u32,
    pub buffer_tokens: u32,
    /// Stored messages estimated above this are left out of chat prompts
    pub max_message_tokens: u32,
}

impl Default for ChatContextConfig {
    fn default() -> Self {
        Self {
            max_system_prompt_tokens: 250,
            reserve_tokens: DEFAULT_RESERVE_TOKENS,
            buffer_tokens: 100,
            max_message_tokens: DEFAULT_MAX_MESSAGE_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    /// Conversational model used when a caller names none
    pub default_model: String,
    /// Root of the JSONL thread store
    pub data_dir: Option<PathBuf>,
    /// Model profile override file
    pub profiles_path: Option<PathBuf>,
    pub summarization: SummarizationConfig,
    pub chat: ChatContextConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            default_model: "openai/gpt-3.5-turbo".to_string(),
            data_dir: None,
            profiles_path: None,
            summarization: SummarizationConfig::default(),
            chat: ChatContextConfig::default(),
        }
    }
}

fn threadmem_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".threadmem")
}

fn threadmem_config_json_path() -> PathBuf {
    threadmem_dir().join("config.json")
}

impl MemoryConfig {
    /// Load `~/.threadmem/config.json`, else `./threadmem.toml`, then apply
    /// environment overrides. Unreadable files are logged and skipped.
    pub fn load() -> Self {
        let mut config = None;

        for path in [threadmem_config_json_path(), PathBuf::from(CONFIG_FILE_PATH)] {
            if !path.exists() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(loaded) => {
                    config = Some(loaded);
                    break;
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }

        let mut config = config.unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Parse a JSON or TOML file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path.extension().map_or(false, |ext| ext == "toml");
        let parsed = if is_toml {
            toml::from_str::<MemoryConfig>(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<MemoryConfig>(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Apply overrides from a variable lookup (the process environment in [`load`](Self::load)).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("OPENROUTER_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(api_base) = lookup("THREADMEM_API_BASE") {
            self.api_base = Some(api_base);
        }
        if let Some(model) = lookup("THREADMEM_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(model) = lookup("THREADMEM_SUMMARIZATION_MODEL") {
            self.summarization.model = model;
        }
        if let Some(threshold) = lookup("THREADMEM_SUMMARY_THRESHOLD") {
            match threshold.trim().parse::<usize>() {
                Ok(value) if value > 0 => self.summarization.threshold = value,
                _ => tracing::warn!("Ignoring invalid THREADMEM_SUMMARY_THRESHOLD '{}'", threshold),
            }
        }
        if let Some(dir) = lookup("THREADMEM_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Store root, defaulting to `~/.threadmem/threads`.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| threadmem_dir().join("threads"))
    }
}
