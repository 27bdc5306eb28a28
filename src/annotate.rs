//! Content annotation for newly captured notes.
//!
//! Annotation is total: whatever the model does, the caller gets a usable
//! summary/tags/category back, with a tagged cause when the result is the
//! degraded fallback.

use crate::inference::{
    embed_or_none, Annotation, AnnotationRequest, FallbackCause, ImagePart, ModelProvider,
};
use crate::language::Language;

/// How much of the input survives into a degraded summary.
const DEGRADED_SUMMARY_CHARS: usize = 50;

/// Fallback category when annotation fails or the model returns an empty one.
pub const FALLBACK_CATEGORY: &str = "General";
/// Fallback tag set.
pub const FALLBACK_TAG: &str = "uncategorized";

/// Annotation result, post-normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotated {
    pub summary: String,
    pub tags: Vec<String>,
    pub category: String,
    pub embedding: Option<Vec<f32>>,
    /// Set when the fields are the degraded fallback rather than model output.
    pub fallback: Option<FallbackCause>,
}

pub struct Annotator<'a> {
    provider: &'a dyn ModelProvider,
}

impl<'a> Annotator<'a> {
    pub fn new(provider: &'a dyn ModelProvider) -> Self {
        Self { provider }
    }

    /// Annotate new note content. Never fails; on any model/transport/schema
    /// error the degraded result is returned instead.
    pub async fn analyze(
        &self,
        text: Option<&str>,
        image: Option<ImagePart<'_>>,
        existing_categories: &[String],
        language: Language,
    ) -> Annotated {
        let request = AnnotationRequest {
            text,
            image,
            existing_categories,
            language,
        };

        let raw = match self.provider.annotate(request).await {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("annotation failed, producing degraded note: {err}");
                return degraded(text, err.cause());
            }
        };

        let (summary, tags, category) = normalize(raw, text);

        let embedding_input = embedding_text(&category, &tags, &summary, text);
        let embedding = embed_or_none(self.provider, &embedding_input).await;

        Annotated {
            summary,
            tags,
            category,
            embedding,
            fallback: None,
        }
    }
}

/// The text a note's embedding is derived from: category, tags, summary and
/// (when present) the raw content, concatenated.
pub fn embedding_text(
    category: &str,
    tags: &[String],
    summary: &str,
    text: Option<&str>,
) -> String {
    let mut parts = vec![category.to_string(), tags.join(", "), summary.to_string()];
    if let Some(text) = text {
        if !text.trim().is_empty() {
            parts.push(text.to_string());
        }
    }
    parts.join("\n")
}

/// Enforce the post-annotation invariants: lowercase deduped non-empty tags,
/// non-empty category and summary.
fn normalize(raw: Annotation, text: Option<&str>) -> (String, Vec<String>, String) {
    let mut seen = std::collections::HashSet::new();
    let mut tags: Vec<String> = raw
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect();
    if tags.is_empty() {
        tags = vec![FALLBACK_TAG.to_string()];
    }

    let category = match raw.category.trim() {
        "" => FALLBACK_CATEGORY.to_string(),
        c => c.to_string(),
    };

    let summary = match raw.summary.trim() {
        "" => degraded_summary(text),
        s => s.to_string(),
    };

    (summary, tags, category)
}

fn degraded(text: Option<&str>, cause: FallbackCause) -> Annotated {
    Annotated {
        summary: degraded_summary(text),
        tags: vec![FALLBACK_TAG.to_string()],
        category: FALLBACK_CATEGORY.to_string(),
        embedding: None,
        fallback: Some(cause),
    }
}

/// First 50 characters of the input with a truncation marker.
fn degraded_summary(text: Option<&str>) -> String {
    let text = text.unwrap_or_default().trim();
    if text.chars().count() > DEGRADED_SUMMARY_CHARS {
        let head: String = text.chars().take(DEGRADED_SUMMARY_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
