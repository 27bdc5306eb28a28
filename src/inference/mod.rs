//! Model provider abstraction.
//!
//! Every task the application delegates to a generative model gets its own
//! capability method with a schema-validated response type, so the provider
//! is swappable and testable against a deterministic stub:
//!
//! - `annotate`: summary/tags/category for new note content
//! - `parse_intent`: free-text query -> structured filters
//! - `synthesize`: grounded answer over a fixed set of retrieved notes
//! - `embed`: text -> fixed-length vector
//!
//! Providers report failures as [`InferenceError`]; the calling components
//! convert those into documented fallbacks and never surface them to the
//! end user.

pub mod gemini;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::language::Language;

pub use gemini::GeminiBackend;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Network error, timeout, or non-2xx from the model endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// The model answered, but the body does not conform to the required
    /// structured schema.
    #[error("non-conforming model output: {0}")]
    Schema(String),

    #[error("api key missing: environment variable {0} is not set")]
    MissingKey(String),
}

impl InferenceError {
    pub fn cause(&self) -> FallbackCause {
        match self {
            InferenceError::Schema(_) => FallbackCause::Schema,
            InferenceError::Transport(_) | InferenceError::MissingKey(_) => {
                FallbackCause::Transport
            }
        }
    }
}

/// Why a result is a documented fallback rather than model output.
/// Lets the UI distinguish "degraded but valid" from normal answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackCause {
    Transport,
    Schema,
}

/// Structured annotation result for new note content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub summary: String,
    pub tags: Vec<String>,
    pub category: String,
}

/// Structured interpretation of a free-text recall query.
///
/// Also surfaced to the UI as the "filters that were applied" echo, hence
/// the camelCase wire names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIntent {
    pub keywords: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inclusive epoch-ms bounds.
    #[serde(default)]
    pub start_date: Option<i64>,
    #[serde(default)]
    pub end_date: Option<i64>,
}

impl ParsedIntent {
    /// The documented parse fallback: the whole query becomes the keyword
    /// phrase and no filters apply.
    pub fn fallback(query: &str) -> Self {
        ParsedIntent {
            keywords: query.to_string(),
            ..Default::default()
        }
    }
}

/// Structured answer-synthesis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedAnswer {
    pub answer: String,
    #[serde(default)]
    pub related_ids: Vec<String>,
}

/// Image payload for multimodal annotation.
#[derive(Debug, Clone)]
pub struct ImagePart<'a> {
    pub mime_type: &'a str,
    /// Base64-encoded bytes.
    pub data: &'a str,
}

#[derive(Debug, Clone)]
pub struct AnnotationRequest<'a> {
    pub text: Option<&'a str>,
    pub image: Option<ImagePart<'a>>,
    pub existing_categories: &'a [String],
    pub language: Language,
}

#[derive(Debug, Clone)]
pub struct IntentRequest<'a> {
    pub query: &'a str,
    pub known_categories: &'a [String],
    /// Wall-clock anchor for resolving relative date phrases, epoch ms.
    pub now_ms: i64,
    pub language: Language,
}

/// One note, compacted for the synthesis context window.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub id: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub category: String,
    /// Text excerpt, or an image placeholder for image notes.
    pub excerpt: String,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub query: &'a str,
    pub context: &'a [ContextEntry],
    pub language: Language,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn annotate(&self, req: AnnotationRequest<'_>) -> Result<Annotation, InferenceError>;

    async fn parse_intent(&self, req: IntentRequest<'_>) -> Result<ParsedIntent, InferenceError>;

    async fn synthesize(
        &self,
        req: SynthesisRequest<'_>,
    ) -> Result<SynthesizedAnswer, InferenceError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

/// Embedding adapter: any provider failure means "no embedding available",
/// logged and swallowed. Callers treat the absence as a ranking signal gap,
/// never as an error.
pub async fn embed_or_none(provider: &dyn ModelProvider, text: &str) -> Option<Vec<f32>> {
    if text.trim().is_empty() {
        return None;
    }

    match provider.embed(text).await {
        Ok(vector) if !vector.is_empty() => Some(vector),
        Ok(_) => {
            log::warn!("embedding service returned an empty vector");
            None
        }
        Err(err) => {
            log::warn!("embedding failed: {err}");
            None
        }
    }
}
