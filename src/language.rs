use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Display language for model output and canned replies.
///
/// Threaded through every model prompt; the core treats it as an opaque
/// selector and only dereferences it for the canned fallback strings below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    /// Language name as spelled out inside model prompts.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Zh => "Chinese (中文)",
        }
    }

    /// Canned reply when the recall pipeline finds no matching notes.
    pub fn no_matches(&self) -> &'static str {
        match self {
            Language::En => "I couldn't find any notes matching your request.",
            Language::Zh => "我没有找到符合你要求的笔记。",
        }
    }

    /// Canned reply when answer synthesis fails.
    pub fn apology(&self) -> &'static str {
        match self {
            Language::En => "Sorry, something went wrong while answering. Please try again.",
            Language::Zh => "抱歉，回答时出了点问题，请稍后再试。",
        }
    }

    /// Placeholder for image notes in the synthesis context.
    pub fn image_placeholder(&self) -> &'static str {
        match self {
            Language::En => "[image note]",
            Language::Zh => "[图片笔记]",
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::En => write!(f, "en"),
            Language::Zh => write!(f, "zh"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown language '{0}', expected 'en' or 'zh'")]
pub struct UnknownLanguage(String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}
