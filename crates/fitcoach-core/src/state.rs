//! UI-agnostic conversation types
//!
//! These live in the core so any front end can render the same log without
//! depending on a specific UI framework.

use serde::{Deserialize, Serialize};

/// One entry in the on-screen conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub text: String,
    pub model: Option<String>,
}

impl ChatEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            model: None,
        }
    }

    pub fn assistant(text: impl Into<String>, model: Option<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
            model,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Error,
            text: text.into(),
            model: None,
        }
    }
}

/// Who produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Error,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Error => "error",
        }
    }
}
