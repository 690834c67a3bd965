use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[serde(alias = "agent")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One stored message of a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default = "generate_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub sender: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn user(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            sender: sender.into(),
            role: Role::User,
            content: content.into(),
            model_used: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, model_used: Option<String>) -> Self {
        Self {
            id: generate_id(),
            sender: "Agent".to_string(),
            role: Role::Assistant,
            content: content.into(),
            model_used,
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            sender: "System".to_string(),
            role: Role::System,
            content: content.into(),
            model_used: None,
            created_at: Utc::now(),
        }
    }
}

/// A role/content pair as sent to a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Message> for PromptMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Anything carrying message text the estimator can price.
pub trait HasContent {
    fn content(&self) -> &str;
}

impl HasContent for Message {
    fn content(&self) -> &str {
        &self.content
    }
}

impl HasContent for PromptMessage {
    fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_role_deserializes_as_assistant() {
        let msg: Message = serde_json::from_str(
            r#"{"sender":"Agent","role":"agent","content":"hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(!msg.id.is_empty());
        assert!(msg.model_used.is_none());
    }

    #[test]
    fn prompt_message_from_message_keeps_role_and_content() {
        let msg = Message::user("alice", "Hello there");
        let prompt = PromptMessage::from(&msg);
        assert_eq!(prompt.role, Role::User);
        assert_eq!(prompt.content, "Hello there");
    }
}
