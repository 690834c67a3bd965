//! Extraction prompt construction.

use crate::budget::{ContextBudget, TokenEstimator};
use crate::config::SummarizationConfig;
use crate::error::SummarizationError;
use crate::llm::ModelRequest;
use crate::summary::SummaryRecord;
use crate::types::{Message, PromptMessage};

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You maintain long-term memory for a conversation. \
Read the conversation and return ONLY a JSON object with these keys:\n\
- \"core_facts\": list of durable facts established in the conversation\n\
- \"user_preferences\": list of stated likes, dislikes and working styles\n\
- \"decisions_made\": list of choices that were settled\n\
- \"constraints\": list of limits, requirements or deadlines\n\
- \"open_questions\": list of unresolved questions\n\
- \"entities\": object mapping each person, project or thing to a short description\n\
- \"unlabeled\": list of anything useful that fits nowhere else\n\
Each list item is one short sentence. Use empty lists for keys with nothing to report. \
When existing memory is provided, keep what is still true and add what is new. \
Do not wrap the JSON in prose.";

const FOOTER: &str = "\n\nReturn the updated memory as one JSON object.";

/// A ready extraction request plus how much of the transcript made it in.
#[derive(Debug, Clone)]
pub struct ExtractionPrompt {
    pub request: ModelRequest,
    pub lines_total: usize,
    pub lines_kept: usize,
}

pub fn transcript_line(message: &Message) -> String {
    format!("{} ({}): {}", message.sender, message.role.as_str(), message.content)
}

/// Build the extraction call for `messages`, seeded with `previous`.
///
/// The transcript is fitted into the extraction model's window newest first;
/// the oldest lines are dropped when it does not fit.
pub fn build_extraction_request(
    estimator: &TokenEstimator,
    config: &SummarizationConfig,
    previous: Option<&SummaryRecord>,
    messages: &[Message],
) -> Result<ExtractionPrompt, SummarizationError> {
    let model = config.model.as_str();

    let header = match previous.filter(|record| !record.is_empty()) {
        Some(record) => format!(
            "Existing memory:\n{}\n\nNew messages:\n",
            serde_json::to_string_pretty(record).unwrap_or_default()
        ),
        None => "Conversation:\n".to_string(),
    };

    let mut budget = ContextBudget::with_buffer(estimator.clone(), model, config.buffer_tokens);
    let output_reserve = config.max_output_tokens.min(budget.profile().max_output_tokens);
    budget.add_tokens(output_reserve, "output_reserve");

    let fixed_tokens = estimator.estimate_messages(
        &[PromptMessage::user(format!("{header}{FOOTER}"))],
        model,
        Some(EXTRACTION_SYSTEM_PROMPT),
    );
    if !budget.can_fit_tokens(fixed_tokens) {
        return Err(SummarizationError::PromptTooLarge {
            required_tokens: fixed_tokens,
            available_tokens: budget.available(),
        });
    }
    budget.add_tokens(fixed_tokens, "extraction_prompt");

    let lines: Vec<String> = messages.iter().map(transcript_line).collect();
    let mut kept: Vec<&str> = Vec::new();
    for line in lines.iter().rev() {
        if !budget.can_fit(line) {
            break;
        }
        budget.add_from(line, "transcript");
        kept.push(line);
    }

    if kept.is_empty() {
        if let Some(newest) = lines.last() {
            return Err(SummarizationError::PromptTooLarge {
                required_tokens: fixed_tokens.saturating_add(estimator.estimate(newest, model)),
                available_tokens: budget.available().saturating_add(fixed_tokens),
            });
        }
    }
    kept.reverse();

    if kept.len() < lines.len() {
        tracing::warn!(
            model,
            dropped = lines.len() - kept.len(),
            "Extraction transcript trimmed to fit the model window"
        );
    }

    let content = format!("{header}{}{FOOTER}", kept.join("\n"));
    Ok(ExtractionPrompt {
        request: ModelRequest {
            model: model.to_string(),
            system_prompt: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            messages: vec![PromptMessage::user(content)],
            max_output_tokens: output_reserve,
            temperature: config.temperature,
        },
        lines_total: lines.len(),
        lines_kept: kept.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{ModelProfile, ModelProfileRegistry};
    use crate::summary::{SizeClass, SummaryField};
    use std::sync::Arc;

    fn estimator_with(window: u32) -> TokenEstimator {
        let mut registry = ModelProfileRegistry::new();
        let mut profile = ModelProfile::new("test/tiny", window, 100, SizeClass::Small);
        profile.tokens_per_word = 1.0;
        registry.insert(profile);
        TokenEstimator::new(Arc::new(registry))
    }

    fn config() -> SummarizationConfig {
        SummarizationConfig {
            model: "test/tiny".to_string(),
            max_output_tokens: 100,
            buffer_tokens: 10,
            ..SummarizationConfig::default()
        }
    }

    #[test]
    fn formats_sender_and_role() {
        let line = transcript_line(&Message::user("alice", "I like tea"));
        assert_eq!(line, "alice (user): I like tea");
    }

    #[test]
    fn includes_previous_record_and_transcript() {
        let estimator = TokenEstimator::new(Arc::new(ModelProfileRegistry::new()));
        let previous = SummaryRecord::new().with(SummaryField::CoreFacts, "Alice lives in Paris");
        let messages = vec![
            Message::user("alice", "I moved to Lyon"),
            Message::assistant("Noted!", None),
        ];
        let cfg = SummarizationConfig::default();

        let prompt = build_extraction_request(&estimator, &cfg, Some(&previous), &messages).unwrap();
        let content = &prompt.request.messages[0].content;

        assert!(content.contains("Alice lives in Paris"));
        assert!(content.contains("alice (user): I moved to Lyon"));
        assert!(content.contains("Agent (assistant): Noted!"));
        assert_eq!(prompt.lines_kept, 2);
        assert_eq!(prompt.request.model, cfg.model);
        assert_eq!(prompt.request.temperature, cfg.temperature);
        assert!(prompt.request.system_prompt.as_deref().unwrap().contains("\"core_facts\""));
    }

    #[test]
    fn drops_oldest_lines_when_window_is_small() {
        let messages: Vec<Message> = (0..50)
            .map(|i| Message::user("bob", format!("message number {i} with a few extra words")))
            .collect();

        let prompt = build_extraction_request(&estimator_with(600), &config(), None, &messages).unwrap();
        assert!(prompt.lines_kept < prompt.lines_total);
        assert!(prompt.lines_kept > 0);

        let content = &prompt.request.messages[0].content;
        assert!(content.contains("message number 49 "));
        assert!(!content.contains("message number 0 "));
    }

    #[test]
    fn window_too_small_for_the_instructions_fails() {
        let messages = vec![Message::user("bob", "hi")];
        let err = build_extraction_request(&estimator_with(150), &config(), None, &messages).unwrap_err();
        assert!(matches!(err, SummarizationError::PromptTooLarge { .. }));
    }
}
