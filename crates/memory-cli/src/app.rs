use anyhow::{Context, Result};
use async_trait::async_trait;
use memory_core::llm::{ModelCallError, ModelInvoker, ModelRequest, SharedModelInvoker};
use memory_core::{JsonlThreadStore, MemoryConfig, ModelProfileRegistry, SummarizationOrchestrator};
use memory_llm::OpenRouterInvoker;
use std::path::Path;
use std::sync::Arc;

/// Stands in when no API key is configured; offline commands never call it.
struct MissingKeyInvoker;

#[async_trait]
impl ModelInvoker for MissingKeyInvoker {
    async fn invoke(&self, _request: ModelRequest) -> Result<String, ModelCallError> {
        Err(ModelCallError::Auth("OPENROUTER_API_KEY is not set".to_string()))
    }
}

pub struct App {
    pub config: MemoryConfig,
    pub store: Arc<JsonlThreadStore>,
    pub invoker: SharedModelInvoker,
    pub orchestrator: Arc<SummarizationOrchestrator>,
}

impl App {
    pub async fn init(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                let mut config = MemoryConfig::from_file(path)?;
                config.apply_env(|key| std::env::var(key).ok());
                config
            }
            None => MemoryConfig::load(),
        };
        if let Some(dir) = data_dir {
            config.data_dir = Some(dir.to_path_buf());
        }

        let mut profiles = match &config.profiles_path {
            Some(path) => ModelProfileRegistry::with_config_path(path),
            None => ModelProfileRegistry::with_config_path(
                memory_core::budget::profiles::get_default_config_path(),
            ),
        };
        profiles
            .load_user_config()
            .await
            .context("Failed to load model profile overrides")?;

        let store = Arc::new(JsonlThreadStore::new(config.data_dir()));
        store
            .init()
            .await
            .with_context(|| format!("Failed to create data directory {:?}", config.data_dir()))?;

        let invoker: SharedModelInvoker = match &config.api_key {
            Some(key) => {
                let mut invoker = OpenRouterInvoker::new(key.clone())
                    .with_timeout(config.summarization.timeout());
                if let Some(base) = &config.api_base {
                    invoker = invoker.with_base_url(base.clone());
                }
                Arc::new(invoker)
            }
            None => {
                tracing::debug!("No API key configured; model calls will fail");
                Arc::new(MissingKeyInvoker)
            }
        };

        let orchestrator = SummarizationOrchestrator::new(
            store.clone(),
            invoker.clone(),
            Arc::new(profiles),
            config.summarization.clone(),
        )
        .with_chat_config(config.chat.clone());

        Ok(Self {
            config,
            store,
            invoker,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Requested model, or the configured default.
    pub fn model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.config.default_model)
    }
}
