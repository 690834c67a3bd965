//! The categorized summary record.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One category of a [`SummaryRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryField {
    CoreFacts,
    UserPreferences,
    DecisionsMade,
    Constraints,
    OpenQuestions,
    Entities,
    Unlabeled,
}

impl SummaryField {
    pub const ALL: [SummaryField; 7] = [
        SummaryField::CoreFacts,
        SummaryField::UserPreferences,
        SummaryField::DecisionsMade,
        SummaryField::Constraints,
        SummaryField::OpenQuestions,
        SummaryField::Entities,
        SummaryField::Unlabeled,
    ];

    /// Sequence-valued fields, i.e. everything except `entities`.
    pub const LISTS: [SummaryField; 6] = [
        SummaryField::CoreFacts,
        SummaryField::UserPreferences,
        SummaryField::DecisionsMade,
        SummaryField::Constraints,
        SummaryField::OpenQuestions,
        SummaryField::Unlabeled,
    ];

    /// JSON key.
    pub fn key(&self) -> &'static str {
        match self {
            SummaryField::CoreFacts => "core_facts",
            SummaryField::UserPreferences => "user_preferences",
            SummaryField::DecisionsMade => "decisions_made",
            SummaryField::Constraints => "constraints",
            SummaryField::OpenQuestions => "open_questions",
            SummaryField::Entities => "entities",
            SummaryField::Unlabeled => "unlabeled",
        }
    }

    /// Heading used when rendering for a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            SummaryField::CoreFacts => "Core Facts",
            SummaryField::UserPreferences => "User Preferences",
            SummaryField::DecisionsMade => "Decisions Made",
            SummaryField::Constraints => "Constraints",
            SummaryField::OpenQuestions => "Open Questions",
            SummaryField::Entities => "Key Entities",
            SummaryField::Unlabeled => "Other Notes",
        }
    }
}

/// Name → description mapping that keeps insertion order.
///
/// Serialized as a JSON object. Inserting an existing name overwrites its
/// description in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMap {
    entries: Vec<(String, String)>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Blank names are ignored; both parts are trimmed.
    pub fn insert(&mut self, name: &str, description: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let description = description.trim().to_string();
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = description,
            None => self.entries.push((name.to_string(), description)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for EntityMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = EntityMap::new();
        for (k, v) in iter {
            map.insert(k.as_ref(), v.as_ref());
        }
        map
    }
}

impl Serialize for EntityMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EntityMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntityMapVisitor;

        impl<'de> Visitor<'de> for EntityMapVisitor {
            type Value = EntityMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of entity names to descriptions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<EntityMap, A::Error> {
                let mut map = EntityMap::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    map.insert(&k, &v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(EntityMapVisitor)
    }
}

/// Structured compression of a thread's history at a point in time.
///
/// Every list holds trimmed, non-empty strings in insertion order; absent
/// categories are empty, never null. Holds no reference to its thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryRecord {
    pub core_facts: Vec<String>,
    pub user_preferences: Vec<String>,
    pub decisions_made: Vec<String>,
    pub constraints: Vec<String>,
    pub open_questions: Vec<String>,
    pub entities: EntityMap,
    pub unlabeled: Vec<String>,
}

impl SummaryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items of a list field; `entities` yields `None`.
    pub fn list(&self, field: SummaryField) -> Option<&Vec<String>> {
        match field {
            SummaryField::CoreFacts => Some(&self.core_facts),
            SummaryField::UserPreferences => Some(&self.user_preferences),
            SummaryField::DecisionsMade => Some(&self.decisions_made),
            SummaryField::Constraints => Some(&self.constraints),
            SummaryField::OpenQuestions => Some(&self.open_questions),
            SummaryField::Unlabeled => Some(&self.unlabeled),
            SummaryField::Entities => None,
        }
    }

    pub fn list_mut(&mut self, field: SummaryField) -> Option<&mut Vec<String>> {
        match field {
            SummaryField::CoreFacts => Some(&mut self.core_facts),
            SummaryField::UserPreferences => Some(&mut self.user_preferences),
            SummaryField::DecisionsMade => Some(&mut self.decisions_made),
            SummaryField::Constraints => Some(&mut self.constraints),
            SummaryField::OpenQuestions => Some(&mut self.open_questions),
            SummaryField::Unlabeled => Some(&mut self.unlabeled),
            SummaryField::Entities => None,
        }
    }

    /// Append a trimmed item to a list field; blank items are ignored.
    pub fn push(&mut self, field: SummaryField, item: &str) -> bool {
        let item = item.trim();
        if item.is_empty() {
            return false;
        }
        match self.list_mut(field) {
            Some(list) => {
                list.push(item.to_string());
                true
            }
            None => false,
        }
    }

    pub fn with(mut self, field: SummaryField, item: &str) -> Self {
        self.push(field, item);
        self
    }

    pub fn with_entity(mut self, name: &str, description: &str) -> Self {
        self.entities.insert(name, description);
        self
    }

    /// Number of items in one field.
    pub fn field_len(&self, field: SummaryField) -> usize {
        match field {
            SummaryField::Entities => self.entities.len(),
            other => self.list(other).map_or(0, Vec::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        SummaryField::ALL.iter().all(|f| self.field_len(*f) == 0)
    }

    /// Copy of this record with the list invariants enforced.
    pub fn sanitized(&self) -> Self {
        let mut clean = SummaryRecord {
            entities: self.entities.clone(),
            ..SummaryRecord::default()
        };
        for field in SummaryField::LISTS {
            if let Some(items) = self.list(field) {
                for item in items {
                    clean.push(field, item);
                }
            }
        }
        clean
    }
}

/// A persisted record: the record blob plus what it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub thread_id: String,
    pub record: SummaryRecord,
    /// Number of thread messages this record covers
    pub message_count_covered: usize,
    pub created_at: DateTime<Utc>,
}

impl StoredSummary {
    pub fn new(thread_id: impl Into<String>, record: SummaryRecord, message_count_covered: usize) -> Self {
        Self {
            thread_id: thread_id.into(),
            record,
            message_count_covered,
            created_at: Utc::now(),
        }
    }
}
