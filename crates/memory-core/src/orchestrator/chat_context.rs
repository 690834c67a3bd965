//! Prompt assembly for the conversational model.
//!
//! Layout: optional system prompt, the latest summary as an assistant
//! message, the most recent unsummarized messages, then the new user message.
//! Stored messages above the per-message cap never enter the window.

use super::SummarizationOrchestrator;
use crate::budget::counter::estimate_words;
use crate::budget::{
    advisory_for, clean_messages, filter_by_length, validate_context, BudgetError, ContextBudget,
    PreparedContext, TokenUsageBreakdown,
};
use crate::error::ContextError;
use crate::llm::ModelRequest;
use crate::summary::{render_for_prompt, select_class_for_model};
use crate::types::PromptMessage;
use std::slice;

const SUMMARY_PREFIX: &str = "[Previous Summary]";

impl SummarizationOrchestrator {
    /// Build the prompt for answering `user_message` on `thread_id`.
    ///
    /// Call before the new message is appended to the store.
    pub async fn prepare_chat_context(
        &self,
        thread_id: &str,
        model: &str,
        system_prompt: Option<&str>,
        user_message: &str,
    ) -> Result<PreparedContext, ContextError> {
        let profile = self.profiles.resolve(model).profile;
        let chat = &self.chat_config;

        let message_tokens = self.estimator.estimate(user_message, model);
        if message_tokens > profile.max_output_tokens {
            return Err(BudgetError::MessageTooLong {
                message_tokens,
                max_tokens: profile.max_output_tokens,
            }
            .into());
        }

        let system_prompt = system_prompt
            .map(|p| truncate_to_tokens(p, chat.max_system_prompt_tokens, profile.tokens_per_word))
            .filter(|p| !p.is_empty());

        let messages = self.store.get_messages(thread_id).await?;
        let latest = self.store.get_latest_summary(thread_id).await?;
        let covered = latest
            .as_ref()
            .map(|s| s.message_count_covered.min(messages.len()))
            .unwrap_or(0);
        let class = select_class_for_model(&self.profiles, model);

        let mut budget = ContextBudget::with_buffer(self.estimator.clone(), model, chat.buffer_tokens);
        budget.add_tokens(chat.reserve_tokens.min(profile.max_output_tokens), "output_reserve");

        let system_tokens =
            self.estimator
                .estimate_messages::<PromptMessage>(&[], model, system_prompt.as_deref());
        if !budget.can_fit_tokens(system_tokens) {
            return Err(BudgetError::SystemPromptTooLarge {
                system_tokens,
                available_tokens: budget.available(),
            }
            .into());
        }
        budget.add_tokens(system_tokens, "system");

        let user = PromptMessage::user(user_message);
        let user_tokens = self.estimator.estimate_messages(slice::from_ref(&user), model, None);
        if !budget.can_fit_tokens(user_tokens) {
            return Err(BudgetError::ContextExceeded {
                required_tokens: user_tokens,
                available_tokens: budget.available(),
            }
            .into());
        }
        budget.add_tokens(user_tokens, "user_message");

        let mut truncation_occurred = false;
        let mut summary_tokens = 0;
        let mut summary_message = None;

        let rendered = latest
            .as_ref()
            .map(|s| render_for_prompt(&s.record, class))
            .unwrap_or_default();
        if !rendered.is_empty() {
            let message = PromptMessage::assistant(format!("{SUMMARY_PREFIX}\n{rendered}"));
            let tokens = self.estimator.estimate_messages(slice::from_ref(&message), model, None);
            if budget.can_fit_tokens(tokens) {
                budget.add_tokens(tokens, "summary");
                summary_tokens = tokens;
                summary_message = Some(message);
            } else {
                tracing::warn!(thread_id, model, tokens, "Summary dropped: does not fit the window");
                truncation_occurred = true;
            }
        }

        let (pending, filtered) =
            filter_by_length(&self.estimator, &messages[covered..], model, chat.max_message_tokens);
        if filtered.deleted_count > 0 {
            tracing::warn!(
                thread_id,
                dropped = filtered.deleted_count,
                "Oversized stored messages left out of the prompt"
            );
            truncation_occurred = true;
        }
        let start = pending.len().saturating_sub(class.recent_message_window());
        let mut window_tokens = user_tokens;
        let mut recent = Vec::new();
        for message in pending[start..].iter().rev() {
            let prompt_message = PromptMessage::from(message);
            let tokens = self
                .estimator
                .estimate_messages(slice::from_ref(&prompt_message), model, None);
            if !budget.can_fit_tokens(tokens) {
                truncation_occurred = true;
                break;
            }
            budget.add_tokens(tokens, "recent");
            window_tokens += tokens;
            recent.push(prompt_message);
        }
        recent.reverse();

        let total_tokens = system_tokens + summary_tokens + window_tokens;
        let status = validate_context(&self.profiles, model, total_tokens, chat.buffer_tokens);
        let advisory = advisory_for(&status);
        if let Some(advisory) = &advisory {
            tracing::debug!(thread_id, "{}", advisory.message);
        }

        let mut prompt_messages = Vec::with_capacity(recent.len() + 2);
        prompt_messages.extend(summary_message);
        prompt_messages.extend(recent);
        prompt_messages.push(user);

        Ok(PreparedContext {
            system_prompt,
            messages: prompt_messages,
            token_usage: TokenUsageBreakdown {
                system_tokens,
                summary_tokens,
                window_tokens,
                total_tokens,
                budget_limit: profile.context_window,
            },
            truncation_occurred,
            advisory,
        })
    }

    /// Turn a prepared context into a model request.
    ///
    /// The messages go through [`clean_messages`] once more so the request
    /// honors the per-message cap and leaves the output reserve free even when
    /// the caller edited the prepared context.
    pub fn build_chat_request(
        &self,
        model: &str,
        prepared: PreparedContext,
    ) -> Result<ModelRequest, BudgetError> {
        let profile = self.profiles.resolve(model).profile;
        let max_output_tokens = profile.max_output_tokens.min(self.chat_config.reserve_tokens);

        let (messages, report) = clean_messages(
            &self.estimator,
            &prepared.messages,
            model,
            prepared.system_prompt.as_deref(),
            self.chat_config.max_message_tokens,
            max_output_tokens,
        )?;
        if report.total_removed > 0 {
            tracing::warn!(
                model,
                filtered = report.filtering.deleted_count,
                trimmed = report.trimming.messages_removed,
                "Messages removed before the model call"
            );
        }

        Ok(ModelRequest {
            model: model.to_string(),
            system_prompt: prepared.system_prompt,
            messages,
            max_output_tokens,
            temperature: profile.temperature,
        })
    }
}

/// Keep the leading words of `text` that fit in `max_tokens`.
fn truncate_to_tokens(text: &str, max_tokens: u32, tokens_per_word: f64) -> String {
    if estimate_words(text, tokens_per_word) <= max_tokens {
        return text.trim().to_string();
    }
    let max_words = if tokens_per_word > 0.0 {
        (max_tokens as f64 / tokens_per_word).floor() as usize
    } else {
        usize::MAX
    };
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{AdvisoryLevel, ModelProfile, ModelProfileRegistry};
    use crate::config::SummarizationConfig;
    use crate::llm::{ModelCallError, ModelInvoker, ModelRequest};
    use crate::storage::{InMemoryThreadStore, ThreadStore};
    use crate::summary::{SizeClass, SummaryField, SummaryRecord};
    use crate::types::{Message, Role};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Unused;

    #[async_trait]
    impl ModelInvoker for Unused {
        async fn invoke(&self, _request: ModelRequest) -> Result<String, ModelCallError> {
            Err(ModelCallError::Transport("not used".into()))
        }
    }

    fn orchestrator(store: Arc<InMemoryThreadStore>, registry: ModelProfileRegistry) -> SummarizationOrchestrator {
        SummarizationOrchestrator::new(
            store,
            Arc::new(Unused),
            Arc::new(registry),
            SummarizationConfig::default(),
        )
    }

    #[test]
    fn truncates_system_prompt_by_words() {
        let long = vec!["word"; 400].join(" ");
        let cut = truncate_to_tokens(&long, 250, 1.3);
        // floor(250 / 1.3) = 192 words
        assert_eq!(cut.split_whitespace().count(), 192);
        assert!(estimate_words(&cut, 1.3) <= 250);
        assert_eq!(truncate_to_tokens("  short prompt ", 250, 1.3), "short prompt");
    }

    #[tokio::test]
    async fn layout_is_summary_then_recent_then_user() {
        let store = Arc::new(InMemoryThreadStore::new());
        for i in 0..12 {
            store
                .append_message("t", &Message::user("alice", format!("old message {i}")))
                .await
                .unwrap();
        }
        let record = SummaryRecord::new().with(SummaryField::CoreFacts, "Alice likes tea");
        store.save_summary("t", &record, 4).await.unwrap();

        let orch = orchestrator(store, ModelProfileRegistry::new());
        let prepared = orch
            .prepare_chat_context("t", "openai/gpt-3.5-turbo", Some("Be brief."), "What now?")
            .await
            .unwrap();

        // medium window: summary + 5 recent + user
        assert_eq!(prepared.messages.len(), 7);
        assert_eq!(prepared.messages[0].role, Role::Assistant);
        assert!(prepared.messages[0].content.starts_with("[Previous Summary]\nCore Facts:"));
        assert_eq!(prepared.messages[1].content, "old message 7");
        assert_eq!(prepared.messages[5].content, "old message 11");
        assert_eq!(prepared.messages[6].content, "What now?");
        assert_eq!(prepared.system_prompt.as_deref(), Some("Be brief."));
        assert!(!prepared.truncation_occurred);
        assert!(prepared.token_usage.summary_tokens > 0);
        assert_eq!(prepared.token_usage.budget_limit, 4_096);
    }

    #[tokio::test]
    async fn recent_window_skips_summarized_messages() {
        let store = Arc::new(InMemoryThreadStore::new());
        for i in 0..6 {
            store
                .append_message("t", &Message::user("alice", format!("m{i}")))
                .await
                .unwrap();
        }
        store
            .save_summary("t", &SummaryRecord::new().with(SummaryField::CoreFacts, "fact"), 5)
            .await
            .unwrap();

        let orch = orchestrator(store, ModelProfileRegistry::new());
        let prepared = orch
            .prepare_chat_context("t", "openai/gpt-4", None, "next")
            .await
            .unwrap();

        let contents: Vec<&str> = prepared.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents.len(), 3);
        assert_eq!(&contents[1..], &["m5", "next"]);
        assert!(prepared.system_prompt.is_none());
    }

    #[tokio::test]
    async fn rejects_message_longer_than_max_output() {
        let mut registry = ModelProfileRegistry::new();
        registry.insert(ModelProfile::new("test/short", 4_096, 10, SizeClass::Medium));
        let orch = orchestrator(Arc::new(InMemoryThreadStore::new()), registry);

        let err = orch
            .prepare_chat_context("t", "test/short", None, &vec!["word"; 20].join(" "))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ContextError::Budget(BudgetError::MessageTooLong { max_tokens: 10, .. })
        ));
    }

    #[tokio::test]
    async fn drops_oldest_recent_messages_when_window_is_tight() {
        let mut registry = ModelProfileRegistry::new();
        let mut profile = ModelProfile::new("test/tight", 300, 100, SizeClass::Large);
        profile.tokens_per_word = 1.0;
        registry.insert(profile);

        let store = Arc::new(InMemoryThreadStore::new());
        for i in 0..10 {
            let content = format!("{i} {}", vec!["pad"; 29].join(" "));
            store.append_message("t", &Message::user("bob", content)).await.unwrap();
        }

        let orch = orchestrator(store, registry);
        let prepared = orch
            .prepare_chat_context("t", "test/tight", None, "hello")
            .await
            .unwrap();

        assert!(prepared.truncation_occurred);
        // reserve 100 + buffer 100 + user 11 leaves room for two 40-token messages
        assert_eq!(prepared.messages.len(), 3);
        assert!(prepared.messages[1].content.starts_with("9 "));
        assert_eq!(prepared.advisory.as_ref().map(|a| a.level), None);
    }

    #[tokio::test]
    async fn advisory_reports_heavy_usage() {
        let mut registry = ModelProfileRegistry::new();
        let mut profile = ModelProfile::new("test/small", 200, 200, SizeClass::Small);
        profile.tokens_per_word = 1.0;
        registry.insert(profile);

        let orch = orchestrator(Arc::new(InMemoryThreadStore::new()), registry)
            .with_chat_config(crate::config::ChatContextConfig {
                reserve_tokens: 0,
                buffer_tokens: 10,
                ..Default::default()
            });
        let prepared = orch
            .prepare_chat_context("t", "test/small", None, &vec!["w"; 150].join(" "))
            .await
            .unwrap();

        // 150 + 10 overhead = 160 of 200
        assert_eq!(prepared.token_usage.total_tokens, 160);
        assert_eq!(prepared.advisory.map(|a| a.level), Some(AdvisoryLevel::Warning));
    }

    #[tokio::test]
    async fn oversized_stored_message_is_left_out() {
        let mut registry = ModelProfileRegistry::new();
        let mut profile = ModelProfile::new("test/capped", 8_000, 500, SizeClass::Medium);
        profile.tokens_per_word = 1.0;
        registry.insert(profile);

        let store = Arc::new(InMemoryThreadStore::new());
        store.append_message("t", &Message::user("alice", "before")).await.unwrap();
        let pasted = format!("dump {}", vec!["line"; 80].join(" "));
        store.append_message("t", &Message::user("alice", pasted)).await.unwrap();
        store.append_message("t", &Message::user("alice", "after")).await.unwrap();

        let orch = orchestrator(store, registry).with_chat_config(crate::config::ChatContextConfig {
            max_message_tokens: 50,
            ..Default::default()
        });
        let prepared = orch
            .prepare_chat_context("t", "test/capped", None, "question")
            .await
            .unwrap();

        let contents: Vec<&str> = prepared.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["before", "after", "question"]);
        assert!(prepared.truncation_occurred);
    }

    #[tokio::test]
    async fn chat_request_keeps_output_reserve_free() {
        let mut registry = ModelProfileRegistry::new();
        let mut profile = ModelProfile::new("test/req", 120, 40, SizeClass::Medium);
        profile.tokens_per_word = 1.0;
        profile.temperature = 0.5;
        registry.insert(profile);
        let orch = orchestrator(Arc::new(InMemoryThreadStore::new()), registry);

        let prepared = PreparedContext {
            system_prompt: Some("Be brief.".to_string()),
            messages: vec![
                PromptMessage::user(vec!["old"; 60].join(" ")),
                PromptMessage::assistant(vec!["mid"; 20].join(" ")),
                PromptMessage::user("latest question"),
            ],
            token_usage: TokenUsageBreakdown {
                system_tokens: 0,
                summary_tokens: 0,
                window_tokens: 0,
                total_tokens: 0,
                budget_limit: 120,
            },
            truncation_occurred: false,
            advisory: None,
        };

        let request = orch.build_chat_request("test/req", prepared).unwrap();
        // 120 - reserve 40 - system 2 leaves 78; the 60-word message does not fit
        assert_eq!(request.max_output_tokens, 40);
        assert_eq!(request.temperature, 0.5);
        assert_eq!(request.system_prompt.as_deref(), Some("Be brief."));
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents.len(), 2);
        assert!(contents[0].starts_with("mid"));
        assert_eq!(contents[1], "latest question");
    }
}
