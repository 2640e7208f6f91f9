//! Message intent classification

use serde::{Deserialize, Serialize};

use crate::task::Priority;

/// What a message asks of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Chat,
    Task,
    Question,
}

/// Structured intent of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAnalysis {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default = "default_true")]
    pub needs_collaboration: bool,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub relevant_skills: Vec<String>,
    #[serde(default = "default_participants")]
    pub suggested_participants: usize,
    #[serde(default)]
    pub priority: Priority,
}

fn default_participants() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl Default for MessageAnalysis {
    fn default() -> Self {
        Self {
            kind: MessageKind::Chat,
            needs_collaboration: true,
            topic: "general conversation".to_string(),
            relevant_skills: vec!["communication".to_string()],
            suggested_participants: default_participants(),
            priority: Priority::Medium,
        }
    }
}

impl MessageAnalysis {
    pub fn is_task(&self) -> bool {
        self.kind == MessageKind::Task
    }
}
