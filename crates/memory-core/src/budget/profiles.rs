//! Model profile registry.
//!
//! Holds the per-model metadata the estimator, slicer and orchestrator need:
//! context window, output cap, tokens-per-word constant and summary size
//! class. Built-in profiles can be overridden from a JSON file.

use crate::summary::SizeClass;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Tokens-per-word used when the provider has no entry in [`PROVIDER_TOKENS_PER_WORD`].
pub const DEFAULT_TOKENS_PER_WORD: f64 = 1.3;

/// Context window assumed for models with no profile.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 4096;

/// Output cap assumed for models with no profile.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1000;

/// Approximate tokens per word by provider.
pub const PROVIDER_TOKENS_PER_WORD: &[(&str, f64)] = &[
    ("google", 1.3),
    ("openai", 1.3),
    ("mistralai", 1.3),
    ("anthropic", 1.3),
];

/// Static metadata for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Model identifier, e.g. `openai/gpt-4`
    pub name: String,
    /// Provider prefix, e.g. `openai`
    pub provider: String,
    /// Total tokens the model accepts per call
    pub context_window: u32,
    /// Maximum tokens the model may produce
    pub max_output_tokens: u32,
    /// Estimation constant for the word-based counter
    #[serde(default = "default_tokens_per_word")]
    pub tokens_per_word: f64,
    /// Which summary fields this model is shown
    #[serde(default)]
    pub summary_size_class: SizeClass,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub description: String,
}

fn default_tokens_per_word() -> f64 {
    DEFAULT_TOKENS_PER_WORD
}

fn default_temperature() -> f32 {
    0.7
}

impl ModelProfile {
    /// Create a profile whose estimation constant comes from the provider table.
    pub fn new(
        name: impl Into<String>,
        context_window: u32,
        max_output_tokens: u32,
        summary_size_class: SizeClass,
    ) -> Self {
        let name = name.into();
        let provider = provider_of(&name).to_string();
        Self {
            tokens_per_word: tokens_per_word_for_provider(&provider),
            provider,
            name,
            context_window,
            max_output_tokens,
            summary_size_class,
            temperature: default_temperature(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Profile used for models the registry does not know.
    pub fn fallback(name: impl Into<String>) -> Self {
        Self::new(
            name,
            DEFAULT_CONTEXT_WINDOW,
            DEFAULT_MAX_OUTPUT_TOKENS,
            SizeClass::Medium,
        )
    }
}

/// Provider portion of a `provider/model` name; empty when there is no prefix.
pub fn provider_of(model: &str) -> &str {
    model.split_once('/').map(|(p, _)| p).unwrap_or("")
}

pub fn tokens_per_word_for_provider(provider: &str) -> f64 {
    PROVIDER_TOKENS_PER_WORD
        .iter()
        .find(|(p, _)| *p == provider)
        .map(|(_, tpw)| *tpw)
        .unwrap_or(DEFAULT_TOKENS_PER_WORD)
}

fn builtin_profiles() -> Vec<ModelProfile> {
    vec![
        ModelProfile::new("openai/gpt-4", 8_192, 8_192, SizeClass::Large)
            .with_description("OpenAI's most capable model with excellent reasoning"),
        ModelProfile::new("upstage/solar-pro-3:free", 8_192, 8_192, SizeClass::Large)
            .with_description("Upstage Solar Pro"),
        ModelProfile::new("openai/gpt-4-turbo-preview", 128_000, 4_096, SizeClass::Large)
            .with_description("OpenAI's fast GPT-4 variant with expanded context"),
        ModelProfile::new("openai/gpt-3.5-turbo", 4_096, 4_096, SizeClass::Medium)
            .with_description("OpenAI's fast and cost-effective model"),
        ModelProfile::new("mistralai/mistral-7b-instruct", 32_000, 1_500, SizeClass::Medium)
            .with_description("Mistral's open-source 7B parameter model"),
        ModelProfile::new("anthropic/claude-3-haiku", 200_000, 1_024, SizeClass::Small)
            .with_description("Anthropic's fast and compact Claude model"),
    ]
}

/// A profile lookup that may have fallen back to defaults.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub profile: ModelProfile,
    /// True when the model had no profile and defaults were used
    pub is_fallback: bool,
}

/// Registry of model profiles with user overrides.
///
/// Constructed once at startup and shared by handle; lookups are exact-name.
#[derive(Debug, Clone)]
pub struct ModelProfileRegistry {
    profiles: HashMap<String, ModelProfile>,
    config_path: Option<PathBuf>,
}

impl ModelProfileRegistry {
    /// Registry with the built-in profiles only.
    pub fn new() -> Self {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self {
            profiles,
            config_path: None,
        }
    }

    /// Registry with no profiles at all; every lookup falls back.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            config_path: None,
        }
    }

    pub fn with_config_path(path: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.config_path = Some(path.into());
        registry
    }

    /// Load user overrides from the configured path.
    ///
    /// Default path: `~/.threadmem/model_profiles.json`. A missing file is not an error.
    pub async fn load_user_config(&mut self) -> std::io::Result<usize> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(get_default_config_path);

        if !path.exists() {
            return Ok(0);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let profiles: Vec<ModelProfile> = serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        let count = profiles.len();
        for profile in profiles {
            self.insert(profile);
        }

        tracing::info!("Loaded {} user model profiles from {:?}", count, path);
        Ok(count)
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, profile: ModelProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, model: &str) -> Option<&ModelProfile> {
        self.profiles.get(model.trim())
    }

    /// Look up a profile, falling back to [`ModelProfile::fallback`].
    pub fn resolve(&self, model: &str) -> ResolvedProfile {
        match self.get(model) {
            Some(profile) => ResolvedProfile {
                profile: profile.clone(),
                is_fallback: false,
            },
            None => {
                tracing::debug!("No profile for model '{}', using defaults", model);
                ResolvedProfile {
                    profile: ModelProfile::fallback(model.trim()),
                    is_fallback: true,
                }
            }
        }
    }

    /// All profiles sorted by name.
    pub fn list(&self) -> Vec<&ModelProfile> {
        let mut profiles: Vec<&ModelProfile> = self.profiles.values().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }
}

impl Default for ModelProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `~/.threadmem/model_profiles.json`
pub fn get_default_config_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".threadmem").join("model_profiles.json")
}
