//! Size-class slicing, prompt rendering and merging of summary records.

use crate::budget::profiles::ModelProfileRegistry;
use crate::summary::record::{SummaryField, SummaryRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// How much of a summary a model is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SizeClass {
    Small,
    #[default]
    Medium,
    Large,
}

impl SizeClass {
    /// Parse a class name; anything unrecognized is `Medium`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "small" => SizeClass::Small,
            "large" => SizeClass::Large,
            "medium" => SizeClass::Medium,
            other => {
                tracing::debug!("Unknown summary size class '{}', using medium", other);
                SizeClass::Medium
            }
        }
    }

    /// Fields exposed for this class, in render order.
    pub fn fields(&self) -> &'static [SummaryField] {
        match self {
            SizeClass::Small => &[
                SummaryField::CoreFacts,
                SummaryField::UserPreferences,
                SummaryField::Constraints,
            ],
            SizeClass::Medium => &[
                SummaryField::CoreFacts,
                SummaryField::UserPreferences,
                SummaryField::DecisionsMade,
                SummaryField::Constraints,
                SummaryField::OpenQuestions,
            ],
            SizeClass::Large => &[
                SummaryField::CoreFacts,
                SummaryField::UserPreferences,
                SummaryField::DecisionsMade,
                SummaryField::Constraints,
                SummaryField::OpenQuestions,
                SummaryField::Entities,
                SummaryField::Unlabeled,
            ],
        }
    }

    /// Number of recent messages sent alongside the summary in chat calls.
    pub fn recent_message_window(&self) -> usize {
        match self {
            SizeClass::Small => 2,
            SizeClass::Medium => 5,
            SizeClass::Large => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Medium => "medium",
            SizeClass::Large => "large",
        }
    }
}

impl From<String> for SizeClass {
    fn from(value: String) -> Self {
        SizeClass::parse_lenient(&value)
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field item counts used to watch summary growth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub core_facts: usize,
    pub user_preferences: usize,
    pub decisions_made: usize,
    pub constraints: usize,
    pub open_questions: usize,
    pub entities: usize,
    pub unlabeled: usize,
    pub total_items: usize,
}

/// Copy only the fields listed for `class`; the rest are left empty.
pub fn slice(record: &SummaryRecord, class: SizeClass) -> SummaryRecord {
    let mut sliced = SummaryRecord::default();
    for field in class.fields() {
        match field {
            SummaryField::Entities => sliced.entities = record.entities.clone(),
            list_field => {
                if let (Some(dst), Some(src)) = (sliced.list_mut(*list_field), record.list(*list_field)) {
                    dst.clone_from(src);
                }
            }
        }
    }
    sliced
}

/// Flatten the sliced record into labeled blocks; empty input renders as "".
pub fn render_for_prompt(record: &SummaryRecord, class: SizeClass) -> String {
    let sliced = slice(record, class);
    let mut blocks = Vec::new();

    for field in class.fields() {
        let mut lines = Vec::new();
        match field {
            SummaryField::Entities => {
                for (name, description) in sliced.entities.iter() {
                    if description.is_empty() {
                        lines.push(format!("- {}", name));
                    } else {
                        lines.push(format!("- {}: {}", name, description));
                    }
                }
            }
            list_field => {
                if let Some(items) = sliced.list(*list_field) {
                    lines.extend(items.iter().map(|item| format!("- {}", item)));
                }
            }
        }

        if !lines.is_empty() {
            blocks.push(format!("{}:\n{}", field.label(), lines.join("\n")));
        }
    }

    blocks.join("\n\n")
}

/// Size class from the model's profile, `Medium` when it has none.
pub fn select_class_for_model(profiles: &ModelProfileRegistry, model: &str) -> SizeClass {
    profiles
        .get(model)
        .map(|p| p.summary_size_class)
        .unwrap_or_default()
}

/// Previous items, then incoming items not already present.
///
/// Items compare case-insensitively with whitespace collapsed. Incoming
/// entities overwrite same-named previous ones; new names are appended.
/// Pure: neither input is modified.
pub fn merge(previous: &SummaryRecord, incoming: &SummaryRecord) -> SummaryRecord {
    let mut merged = previous.clone();

    for field in SummaryField::LISTS {
        let (Some(dst), Some(src)) = (merged.list_mut(field), incoming.list(field)) else {
            continue;
        };
        let mut seen: HashSet<String> = dst.iter().map(|item| normalize_item(item)).collect();
        for item in src {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(normalize_item(trimmed)) {
                dst.push(trimmed.to_string());
            }
        }
    }

    for (name, description) in incoming.entities.iter() {
        merged.entities.insert(name, description);
    }

    merged
}

/// Per-field counts and their total.
pub fn stats(record: &SummaryRecord) -> SummaryStats {
    let mut stats = SummaryStats {
        core_facts: record.core_facts.len(),
        user_preferences: record.user_preferences.len(),
        decisions_made: record.decisions_made.len(),
        constraints: record.constraints.len(),
        open_questions: record.open_questions.len(),
        entities: record.entities.len(),
        unlabeled: record.unlabeled.len(),
        total_items: 0,
    };
    stats.total_items = stats.core_facts
        + stats.user_preferences
        + stats.decisions_made
        + stats.constraints
        + stats.open_questions
        + stats.entities
        + stats.unlabeled;
    stats
}

/// Lowercase with runs of whitespace collapsed to one space.
fn normalize_item(item: &str) -> String {
    item.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::profiles::ModelProfile;

    fn full_record() -> SummaryRecord {
        SummaryRecord::new()
            .with(SummaryField::CoreFacts, "User is planning a trip to Lisbon")
            .with(SummaryField::UserPreferences, "Prefers trains over flights")
            .with(SummaryField::DecisionsMade, "Travel dates fixed to May 3-10")
            .with(SummaryField::Constraints, "Budget under 1500 EUR")
            .with(SummaryField::OpenQuestions, "Which neighbourhood to stay in?")
            .with_entity("Lisbon", "destination city")
            .with(SummaryField::Unlabeled, "Mentioned a fear of heights")
    }

    #[test]
    fn large_slice_keeps_every_field() {
        let record = full_record();
        assert_eq!(slice(&record, SizeClass::Large), record);
    }

    #[test]
    fn small_slice_excludes_detail_fields() {
        let sliced = slice(&full_record(), SizeClass::Small);
        assert_eq!(sliced.core_facts.len(), 1);
        assert_eq!(sliced.user_preferences.len(), 1);
        assert_eq!(sliced.constraints.len(), 1);
        assert!(sliced.entities.is_empty());
        assert!(sliced.unlabeled.is_empty());
        assert!(sliced.open_questions.is_empty());
        assert!(sliced.decisions_made.is_empty());
    }

    #[test]
    fn medium_slice_excludes_entities_and_unlabeled() {
        let sliced = slice(&full_record(), SizeClass::Medium);
        assert_eq!(sliced.decisions_made.len(), 1);
        assert_eq!(sliced.open_questions.len(), 1);
        assert!(sliced.entities.is_empty());
        assert!(sliced.unlabeled.is_empty());
    }

    #[test]
    fn unknown_class_name_is_medium() {
        assert_eq!(SizeClass::parse_lenient("gigantic"), SizeClass::Medium);
        assert_eq!(SizeClass::parse_lenient(" LARGE "), SizeClass::Large);
        let parsed: SizeClass = serde_json::from_str(r#""tiny""#).unwrap();
        assert_eq!(parsed, SizeClass::Medium);
        assert_eq!(serde_json::to_string(&SizeClass::Small).unwrap(), r#""small""#);
    }

    #[test]
    fn render_empty_is_empty_string() {
        assert_eq!(render_for_prompt(&SummaryRecord::new(), SizeClass::Large), "");
        let only_entities = SummaryRecord::new().with_entity("Bob", "manager");
        assert_eq!(render_for_prompt(&only_entities, SizeClass::Small), "");
    }

    #[test]
    fn render_is_labeled_and_ordered() {
        let rendered = render_for_prompt(&full_record(), SizeClass::Large);
        let expected = "Core Facts:\n- User is planning a trip to Lisbon\n\n\
User Preferences:\n- Prefers trains over flights\n\n\
Decisions Made:\n- Travel dates fixed to May 3-10\n\n\
Constraints:\n- Budget under 1500 EUR\n\n\
Open Questions:\n- Which neighbourhood to stay in?\n\n\
Key Entities:\n- Lisbon: destination city\n\n\
Other Notes:\n- Mentioned a fear of heights";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn render_skips_empty_fields() {
        let record = SummaryRecord::new().with(SummaryField::Constraints, "No weekends");
        assert_eq!(
            render_for_prompt(&record, SizeClass::Medium),
            "Constraints:\n- No weekends"
        );
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let record = full_record();
        assert_eq!(merge(&record, &SummaryRecord::new()), record);
    }

    #[test]
    fn merge_with_self_is_idempotent() {
        let record = full_record();
        assert_eq!(merge(&record, &record), record);
    }

    #[test]
    fn merge_drops_case_and_whitespace_variants() {
        let previous = SummaryRecord::new().with(SummaryField::CoreFacts, "User likes Rust");
        let incoming = SummaryRecord::new()
            .with(SummaryField::CoreFacts, "  user   LIKES rust ")
            .with(SummaryField::CoreFacts, "User works remotely")
            .with(SummaryField::CoreFacts, "user works remotely");

        let merged = merge(&previous, &incoming);
        assert_eq!(merged.core_facts, vec!["User likes Rust", "User works remotely"]);
    }

    #[test]
    fn merge_entities_incoming_wins_new_keys_appended() {
        let previous = SummaryRecord::new()
            .with_entity("Alice", "user")
            .with_entity("Acme", "employer");
        let incoming = SummaryRecord::new()
            .with_entity("Acme", "former employer")
            .with_entity("Bob", "colleague");

        let merged = merge(&previous, &incoming);
        let entries: Vec<(&str, &str)> = merged.entities.iter().collect();
        assert_eq!(
            entries,
            vec![("Alice", "user"), ("Acme", "former employer"), ("Bob", "colleague")]
        );
    }

    #[test]
    fn merge_does_not_touch_inputs() {
        let previous = full_record();
        let incoming = SummaryRecord::new().with(SummaryField::OpenQuestions, "Hotel or hostel?");
        let before = previous.clone();
        let merged = merge(&previous, &incoming);
        assert_eq!(previous, before);
        assert_eq!(merged.open_questions.len(), 2);
    }

    #[test]
    fn stats_counts_every_field() {
        let stats = stats(&full_record());
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.unlabeled, 1);
        assert_eq!(stats.total_items, 7);
    }

    #[test]
    fn class_for_model_uses_profile_or_medium() {
        let mut registry = ModelProfileRegistry::empty();
        registry.insert(ModelProfile::new("x/tiny", 1_000, 100, SizeClass::Small));
        assert_eq!(select_class_for_model(&registry, "x/tiny"), SizeClass::Small);
        assert_eq!(select_class_for_model(&registry, "x/other"), SizeClass::Medium);
    }
}
