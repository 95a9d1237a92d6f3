use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry in the mentor conversation. Messages are append-only; nothing
/// mutates a message after it has been pushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_plan_prompt: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_plan_prompt: false,
            timestamp: Utc::now(),
        }
    }

    pub fn plan_prompt(mut self) -> Self {
        self.is_plan_prompt = true;
        self
    }
}

/// One slot of a generated study plan. Produced in a batch by the AI service;
/// held as "pending" until the user confirms, then the batch replaces the
/// active plan wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlanItem {
    pub id: String,
    pub subject: String,
    pub time: String,
    pub tasks: Vec<String>,
    pub difficulty: f64,
}
