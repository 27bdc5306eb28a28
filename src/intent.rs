//! Query intent parsing.
//!
//! Wraps the provider's `parse_intent` task and guarantees a usable
//! [`ParsedIntent`] whatever happens: on any failure the whole query becomes
//! the keyword phrase and no filters apply.

use crate::inference::{IntentRequest, ModelProvider, ParsedIntent};
use crate::language::Language;

pub struct IntentParser<'a> {
    provider: &'a dyn ModelProvider,
}

impl<'a> IntentParser<'a> {
    pub fn new(provider: &'a dyn ModelProvider) -> Self {
        Self { provider }
    }

    /// Parse a free-text query into structured filters. Relative date
    /// phrases resolve against `now_ms`. Never fails.
    pub async fn parse(
        &self,
        query: &str,
        known_categories: &[String],
        now_ms: i64,
        language: Language,
    ) -> ParsedIntent {
        let request = IntentRequest {
            query,
            known_categories,
            now_ms,
            language,
        };

        match self.provider.parse_intent(request).await {
            Ok(intent) => normalize(intent),
            Err(err) => {
                log::warn!("intent parsing failed, falling back to raw keywords: {err}");
                ParsedIntent::fallback(query)
            }
        }
    }
}

fn normalize(mut intent: ParsedIntent) -> ParsedIntent {
    intent.keywords = intent.keywords.trim().to_string();

    intent.category = intent
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let mut seen = std::collections::HashSet::new();
    intent.tags = intent
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect();

    intent
}
