//! Validation of the extraction model's JSON output.
//!
//! The model is asked for a bare JSON object but may wrap it in prose or a
//! code fence, omit categories, or use the wrong shapes. Parsing yields a
//! tagged [`ExtractionOutcome`] instead of trusting the raw value.

use crate::summary::record::{SummaryField, SummaryRecord};
use serde_json::{Map, Value};

/// Result of parsing one extraction response.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Every present field had the expected shape
    Complete(SummaryRecord),
    /// Some fields were malformed; only salvageable items were kept
    Partial {
        record: SummaryRecord,
        issues: Vec<String>,
    },
    /// No JSON object could be recovered at all
    Failed { reason: String },
}

impl ExtractionOutcome {
    /// The usable record, if any.
    pub fn record(&self) -> Option<&SummaryRecord> {
        match self {
            ExtractionOutcome::Complete(record) | ExtractionOutcome::Partial { record, .. } => {
                Some(record)
            }
            ExtractionOutcome::Failed { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, ExtractionOutcome::Complete(_))
    }
}

/// Parse raw model text into a summary record.
pub fn parse_extraction(raw: &str) -> ExtractionOutcome {
    let Some(candidate) = locate_json_object(raw) else {
        return ExtractionOutcome::Failed {
            reason: "response contains no JSON object".to_string(),
        };
    };

    let value: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) => {
            return ExtractionOutcome::Failed {
                reason: format!("invalid JSON: {}", e),
            }
        }
    };

    let Value::Object(object) = value else {
        return ExtractionOutcome::Failed {
            reason: "top-level JSON value is not an object".to_string(),
        };
    };

    let mut record = SummaryRecord::new();
    let mut issues = Vec::new();

    for field in SummaryField::LISTS {
        if let Some(value) = object.get(field.key()) {
            salvage_list(&mut record, field, value, &mut issues);
        }
    }
    if let Some(value) = object.get(SummaryField::Entities.key()) {
        salvage_entities(&mut record, value, &mut issues);
    }

    let known: Vec<&str> = SummaryField::ALL.iter().map(|f| f.key()).collect();
    let unknown: Vec<&String> = object.keys().filter(|k| !known.contains(&k.as_str())).collect();
    if !unknown.is_empty() {
        tracing::debug!("Ignoring unknown summary keys: {:?}", unknown);
    }

    if issues.is_empty() {
        ExtractionOutcome::Complete(record)
    } else {
        ExtractionOutcome::Partial { record, issues }
    }
}

fn salvage_list(record: &mut SummaryRecord, field: SummaryField, value: &Value, issues: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                match scalar_text(item) {
                    Some(text) => {
                        record.push(field, &text);
                    }
                    None => issues.push(format!("{}[{}] is not a string", field.key(), index)),
                }
            }
        }
        Value::String(text) => {
            issues.push(format!("{} is a string, expected a list", field.key()));
            record.push(field, text);
        }
        Value::Null => {}
        _ => issues.push(format!("{} has an unexpected type", field.key())),
    }
}

fn salvage_entities(record: &mut SummaryRecord, value: &Value, issues: &mut Vec<String>) {
    match value {
        Value::Object(map) => insert_entities(record, map, issues),
        Value::Array(items) => {
            issues.push("entities is a list, expected a mapping".to_string());
            for item in items {
                // [{"name": .., "role"|"description": ..}] is a common shape
                if let Value::Object(obj) = item {
                    let name = obj.get("name").and_then(scalar_text);
                    let role = obj
                        .get("role")
                        .or_else(|| obj.get("description"))
                        .and_then(scalar_text)
                        .unwrap_or_default();
                    if let Some(name) = name {
                        record.entities.insert(&name, &role);
                    }
                }
            }
        }
        Value::Null => {}
        _ => issues.push("entities has an unexpected type".to_string()),
    }
}

fn insert_entities(record: &mut SummaryRecord, map: &Map<String, Value>, issues: &mut Vec<String>) {
    for (name, description) in map {
        match scalar_text(description) {
            Some(text) => record.entities.insert(name, &text),
            None => match description {
                Value::Null => record.entities.insert(name, ""),
                other => {
                    issues.push(format!("entities.{} is not a string", name));
                    record.entities.insert(name, &other.to_string());
                }
            },
        }
    }
}

/// Strings as-is, numbers and booleans stringified.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Slice from the first `{` to the last `}`, which also strips code fences.
fn locate_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let raw = r#"{
            "core_facts": ["User is building a CLI"],
            "user_preferences": ["Prefers Rust"],
            "decisions_made": [],
            "constraints": ["Must run offline"],
            "open_questions": ["Which database?"],
            "entities": {"clap": "argument parser"},
            "unlabeled": []
        }"#;

        let ExtractionOutcome::Complete(record) = parse_extraction(raw) else {
            panic!("expected complete outcome");
        };
        assert_eq!(record.core_facts, vec!["User is building a CLI"]);
        assert_eq!(record.entities.get("clap"), Some("argument parser"));
        assert!(record.decisions_made.is_empty());
    }

    #[test]
    fn missing_fields_are_not_issues() {
        let outcome = parse_extraction(r#"{"core_facts": ["only this"]}"#);
        assert!(matches!(outcome, ExtractionOutcome::Complete(_)));
        assert!(outcome.record().unwrap().unlabeled.is_empty());
    }

    #[test]
    fn strips_code_fences_and_prose() {
        let raw = "Here is the summary:\n```json\n{\"core_facts\": [\"fenced\"]}\n```";
        let outcome = parse_extraction(raw);
        assert_eq!(outcome.record().unwrap().core_facts, vec!["fenced"]);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn non_json_fails() {
        let outcome = parse_extraction("Sorry, I cannot summarize this.");
        assert!(matches!(outcome, ExtractionOutcome::Failed { .. }));
        assert!(outcome.record().is_none());

        let broken = parse_extraction(r#"{"core_facts": ["unterminated"#);
        assert!(matches!(broken, ExtractionOutcome::Failed { .. }));
    }

    #[test]
    fn wrong_shapes_are_salvaged_as_partial() {
        let raw = r#"{
            "core_facts": "a single fact",
            "constraints": ["ok", {"nested": true}, 42],
            "open_questions": 7,
            "entities": [{"name": "Alice", "role": "user"}]
        }"#;

        let ExtractionOutcome::Partial { record, issues } = parse_extraction(raw) else {
            panic!("expected partial outcome");
        };
        assert_eq!(record.core_facts, vec!["a single fact"]);
        assert_eq!(record.constraints, vec!["ok", "42"]);
        assert!(record.open_questions.is_empty());
        assert_eq!(record.entities.get("Alice"), Some("user"));
        assert_eq!(issues.len(), 4);
    }

    #[test]
    fn blank_items_are_dropped() {
        let outcome = parse_extraction(r#"{"core_facts": ["  ", "  real  ", ""]}"#);
        assert_eq!(outcome.record().unwrap().core_facts, vec!["real"]);
    }

    #[test]
    fn top_level_array_fails() {
        // braces exist but the slice between them is not one object
        let outcome = parse_extraction(r#"[{"a": 1}, {"b": 2}]"#);
        assert!(matches!(outcome, ExtractionOutcome::Failed { .. }));
    }
}
