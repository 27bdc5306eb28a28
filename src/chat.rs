//! Explicit chat session state for the recall surface.
//!
//! The session is owned by the caller (daemon state or a one-shot CLI
//! invocation) and passed around explicitly; the recall engine itself stays
//! stateless. The log resets when a session opens or the display language
//! changes.

use serde::{Deserialize, Serialize};

use crate::eid::Eid;
use crate::inference::ParsedIntent;
use crate::language::Language;
use crate::recall::RecallResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_ids: Option<Vec<Eid>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_filters: Option<ParsedIntent>,
}

/// Append-only conversation log for one open chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub language: Language,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            messages: vec![],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Switch the session language, wiping the log if it actually changed.
    pub fn ensure_language(&mut self, language: Language) {
        if self.language != language {
            self.reset(language);
        }
    }

    pub fn reset(&mut self, language: Language) {
        self.language = language;
        self.messages.clear();
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            text: text.into(),
            related_ids: None,
            used_filters: None,
        });
    }

    pub fn push_model(&mut self, response: &RecallResponse) {
        self.messages.push(ChatMessage {
            role: ChatRole::Model,
            text: response.answer.clone(),
            related_ids: Some(response.related_ids.clone()),
            used_filters: response.used_filters.clone(),
        });
    }
}
