//! Natural-language recall over the note collection.
//!
//! One query is one stateless pass: parse intent -> hard filter -> rank ->
//! synthesize. Every step degrades instead of failing; the caller always
//! gets an answer string back.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::eid::Eid;
use crate::inference::{
    embed_or_none, ContextEntry, FallbackCause, ModelProvider, ParsedIntent, SynthesisRequest,
};
use crate::intent::IntentParser;
use crate::language::Language;
use crate::notes::{Note, NoteKind};
use crate::scoring::cosine_similarity;

/// Score for candidates without a stored embedding; sorts after any real
/// cosine score.
const UNSCORED: f32 = -1.0;

/// How much note text goes into a synthesis context entry.
const EXCERPT_CHARS: usize = 200;

/// Result of one recall query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    pub answer: String,
    pub related_ids: Vec<Eid>,

    /// The filters that were applied, echoed for transparency. Omitted when
    /// synthesis failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_filters: Option<ParsedIntent>,

    /// Set when `answer` is a canned degradation rather than model output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackCause>,
}

pub struct RecallEngine<'a> {
    provider: &'a dyn ModelProvider,
    top_k: usize,
}

impl<'a> RecallEngine<'a> {
    pub fn new(provider: &'a dyn ModelProvider, top_k: usize) -> Self {
        Self { provider, top_k }
    }

    /// Answer a free-text query over a snapshot of the note collection.
    /// Total: never fails, never touches the notes.
    pub async fn query(
        &self,
        user_query: &str,
        notes: &[Note],
        language: Language,
    ) -> RecallResponse {
        let categories = distinct_categories(notes);
        let now_ms = Utc::now().timestamp_millis();

        let parsed = IntentParser::new(self.provider)
            .parse(user_query, &categories, now_ms, language)
            .await;
        log::debug!("parsed intent: {parsed:?}");

        let candidates = hard_filter(notes, &parsed);
        let ranked = self.rank(&parsed.keywords, candidates).await;

        if ranked.is_empty() {
            return RecallResponse {
                answer: language.no_matches().to_string(),
                related_ids: vec![],
                used_filters: Some(parsed),
                fallback: None,
            };
        }

        let context = build_context(&ranked, language);
        let request = SynthesisRequest {
            query: user_query,
            context: &context,
            language,
        };

        match self.provider.synthesize(request).await {
            Ok(answer) => {
                // only ids that were actually offered may come back
                let offered: HashSet<&str> = context.iter().map(|e| e.id.as_str()).collect();
                let related_ids = answer
                    .related_ids
                    .into_iter()
                    .filter(|id| offered.contains(id.as_str()))
                    .map(Eid::from)
                    .collect();

                RecallResponse {
                    answer: answer.answer,
                    related_ids,
                    used_filters: Some(parsed),
                    fallback: None,
                }
            }
            Err(err) => {
                log::warn!("answer synthesis failed: {err}");
                RecallResponse {
                    answer: language.apology().to_string(),
                    related_ids: vec![],
                    used_filters: None,
                    fallback: Some(err.cause()),
                }
            }
        }
    }

    /// Order the surviving candidates and cut to `top_k`.
    ///
    /// With a usable keyword phrase the candidates are ranked by cosine
    /// similarity against the keyword embedding (candidates without a stored
    /// embedding sort last). If the keyword embedding is unavailable the
    /// existing order is kept. Without keywords, most recent first.
    async fn rank(&self, keywords: &str, mut candidates: Vec<Note>) -> Vec<Note> {
        if candidates.is_empty() {
            return candidates;
        }

        let keywords = keywords.trim();
        if keywords.chars().count() > 1 {
            if let Some(query_embedding) = embed_or_none(self.provider, keywords).await {
                let mut scored: Vec<(f32, Note)> = candidates
                    .into_iter()
                    .map(|note| {
                        let score = note
                            .embedding
                            .as_deref()
                            .map(|e| cosine_similarity(&query_embedding, e))
                            .unwrap_or(UNSCORED);
                        (score, note)
                    })
                    .collect();

                // stable sort keeps candidate order within equal scores
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(self.top_k);
                return scored.into_iter().map(|(_, note)| note).collect();
            }

            candidates.truncate(self.top_k);
            return candidates;
        }

        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        candidates.truncate(self.top_k);
        candidates
    }
}

/// Boolean inclusion test applied before ranking. Order-preserving over the
/// survivors; a note survives iff all four conditions hold independently.
pub fn hard_filter(notes: &[Note], intent: &ParsedIntent) -> Vec<Note> {
    notes
        .iter()
        .filter(|note| matches_intent(note, intent))
        .cloned()
        .collect()
}

fn matches_intent(note: &Note, intent: &ParsedIntent) -> bool {
    if let Some(category) = &intent.category {
        if !note.category.eq_ignore_ascii_case(category) {
            return false;
        }
    }

    if !intent.tags.is_empty() {
        let note_tags: Vec<String> = note.tags.iter().map(|t| t.to_lowercase()).collect();
        // OR semantics: one common tag keeps the note
        let any_match = intent
            .tags
            .iter()
            .any(|t| note_tags.contains(&t.to_lowercase()));
        if !any_match {
            return false;
        }
    }

    if let Some(start) = intent.start_date {
        if note.created_at < start {
            return false;
        }
    }

    if let Some(end) = intent.end_date {
        if note.created_at > end {
            return false;
        }
    }

    true
}

fn distinct_categories(notes: &[Note]) -> Vec<String> {
    let mut seen: Vec<String> = vec![];
    for note in notes {
        if !note.category.is_empty()
            && !seen.iter().any(|c| c.eq_ignore_ascii_case(&note.category))
        {
            seen.push(note.category.clone());
        }
    }
    seen
}

fn build_context(notes: &[Note], language: Language) -> Vec<ContextEntry> {
    notes
        .iter()
        .map(|note| {
            let excerpt = if note.kind == NoteKind::Image {
                language.image_placeholder().to_string()
            } else {
                excerpt_of(&note.content)
            };

            ContextEntry {
                id: note.id.to_string(),
                summary: note.summary.clone(),
                tags: note.tags.clone(),
                category: note.category.clone(),
                excerpt,
                date: format_date(note.created_at),
            }
        })
        .collect()
}

fn excerpt_of(content: &str) -> String {
    if content.chars().count() > EXCERPT_CHARS {
        let head: String = content.chars().take(EXCERPT_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

fn format_date(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::mock::{FailMode, MockProvider};

    fn note(category: &str, tags: &[&str], created_at: i64) -> Note {
        Note {
            id: Eid::new(),
            content: format!("{category} content"),
            kind: NoteKind::Text,
            summary: format!("{category} summary"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: category.to_string(),
            created_at,
            ..Default::default()
        }
    }

    fn intent(
        category: Option<&str>,
        tags: &[&str],
        start: Option<i64>,
        end: Option<i64>,
    ) -> ParsedIntent {
        ParsedIntent {
            keywords: String::new(),
            category: category.map(|c| c.to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn test_hard_filter_category_case_insensitive() {
        let notes = vec![note("Cooking", &[], 1), note("Coding", &[], 2)];
        let survivors = hard_filter(&notes, &intent(Some("coding"), &[], None, None));
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].category, "Coding");
    }

    #[test]
    fn test_hard_filter_tags_or_semantics() {
        let notes = vec![
            note("A", &["pasta"], 1),
            note("B", &["react"], 2),
            note("C", &["hiking"], 3),
        ];
        // any requested tag keeps the note
        let survivors = hard_filter(&notes, &intent(None, &["pasta", "react"], None, None));
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].category, "A");
        assert_eq!(survivors[1].category, "B");
    }

    #[test]
    fn test_hard_filter_date_bounds_inclusive() {
        let notes = vec![note("A", &[], 100), note("B", &[], 200), note("C", &[], 300)];

        let survivors = hard_filter(&notes, &intent(None, &[], Some(100), Some(200)));
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].created_at, 100);
        assert_eq!(survivors[1].created_at, 200);

        let after = hard_filter(&notes, &intent(None, &[], Some(301), None));
        assert!(after.is_empty());
    }

    #[test]
    fn test_hard_filter_is_idempotent_and_order_preserving() {
        let notes = vec![
            note("Coding", &["rust"], 3),
            note("Coding", &["go"], 1),
            note("Cooking", &["pasta"], 2),
        ];
        let it = intent(Some("Coding"), &[], None, None);

        let once = hard_filter(&notes, &it);
        let twice = hard_filter(&once, &it);
        assert_eq!(once, twice);
        // collection order survives filtering
        assert_eq!(once[0].created_at, 3);
        assert_eq!(once[1].created_at, 1);
    }

    #[test]
    fn test_hard_filter_empty_intent_keeps_everything() {
        let notes = vec![note("A", &[], 1), note("B", &[], 2)];
        assert_eq!(hard_filter(&notes, &intent(None, &[], None, None)).len(), 2);
    }

    #[tokio::test]
    async fn test_rank_by_similarity_unscored_last() {
        let mock = MockProvider::new().with_query_embedding(vec![1.0, 0.0]);
        let engine = RecallEngine::new(&mock, 10);

        let mut close = note("A", &[], 1);
        close.embedding = Some(vec![0.9, 0.1]);
        let mut far = note("B", &[], 2);
        far.embedding = Some(vec![0.0, 1.0]);
        let unscored = note("C", &[], 3);

        let ranked = engine
            .rank("pasta", vec![far.clone(), unscored.clone(), close.clone()])
            .await;

        assert_eq!(ranked[0].id, close.id);
        assert_eq!(ranked[1].id, far.id);
        assert_eq!(ranked[2].id, unscored.id);
    }

    #[tokio::test]
    async fn test_rank_caps_at_top_k() {
        let mock = MockProvider::new().with_query_embedding(vec![1.0, 0.0]);
        let engine = RecallEngine::new(&mock, 10);

        let candidates: Vec<Note> = (0..25)
            .map(|i| {
                let mut n = note("A", &[], i);
                n.embedding = Some(vec![1.0, i as f32 / 25.0]);
                n
            })
            .collect();

        let ranked = engine.rank("topic", candidates).await;
        assert_eq!(ranked.len(), 10);
    }

    #[tokio::test]
    async fn test_rank_embed_failure_keeps_existing_order() {
        let mock = MockProvider::new().failing_embed(FailMode::Transport);
        let engine = RecallEngine::new(&mock, 2);

        let a = note("A", &[], 1);
        let b = note("B", &[], 9);
        let c = note("C", &[], 5);
        let ranked = engine.rank("topic", vec![a.clone(), b.clone(), c]).await;

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, a.id);
        assert_eq!(ranked[1].id, b.id);
    }

    #[tokio::test]
    async fn test_rank_without_keywords_is_recency_and_skips_embedding() {
        let mock = MockProvider::new();
        let engine = RecallEngine::new(&mock, 2);

        let old = note("A", &[], 100);
        let newer = note("B", &[], 300);
        let mid = note("C", &[], 200);

        let ranked = engine
            .rank(" ", vec![old.clone(), newer.clone(), mid.clone()])
            .await;

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, newer.id);
        assert_eq!(ranked[1].id, mid.id);
        assert_eq!(mock.call_count("embed"), 0);
    }

    #[tokio::test]
    async fn test_single_char_keywords_skip_embedding() {
        let mock = MockProvider::new();
        let engine = RecallEngine::new(&mock, 10);

        engine.rank("x", vec![note("A", &[], 1)]).await;
        assert_eq!(mock.call_count("embed"), 0);
    }

    #[test]
    fn test_excerpt_truncation() {
        let long = "x".repeat(300);
        let excerpt = excerpt_of(&long);
        assert_eq!(excerpt.chars().count(), EXCERPT_CHARS + 3);
        assert!(excerpt.ends_with("..."));

        assert_eq!(excerpt_of("short"), "short");
    }

    #[test]
    fn test_context_uses_image_placeholder() {
        let mut img = note("Photos", &["trip"], 1_700_000_000_000);
        img.kind = NoteKind::Image;
        img.image_data = Some("QUJD".to_string());

        let context = build_context(&[img], Language::En);
        assert_eq!(context[0].excerpt, "[image note]");
        assert_eq!(context[0].date, "2023-11-14");
    }

    #[test]
    fn test_distinct_categories_first_seen() {
        let notes = vec![
            note("Cooking", &[], 1),
            note("cooking", &[], 2),
            note("Coding", &[], 3),
        ];
        assert_eq!(distinct_categories(&notes), vec!["Cooking", "Coding"]);
    }
}
