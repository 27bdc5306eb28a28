//! Gemini model provider.
//!
//! All three generation tasks go through `generateContent` with a forced
//! JSON response schema; embeddings go through `embedContent`. One attempt
//! per call, no retries; callers own the fallback behavior.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::InferenceConfig;
use crate::inference::{
    Annotation, AnnotationRequest, InferenceError, IntentRequest, ModelProvider, ParsedIntent,
    SynthesisRequest, SynthesizedAnswer,
};
use async_trait::async_trait;

/// Response schema for annotation results.
static ANNOTATION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "tags": { "type": "ARRAY", "items": { "type": "STRING" } },
            "category": { "type": "STRING" }
        },
        "required": ["summary", "tags", "category"]
    })
});

/// Response schema for parsed intents.
static INTENT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "keywords": { "type": "STRING" },
            "category": { "type": "STRING", "nullable": true },
            "tags": { "type": "ARRAY", "items": { "type": "STRING" } },
            "startDate": { "type": "NUMBER", "nullable": true },
            "endDate": { "type": "NUMBER", "nullable": true }
        },
        "required": ["keywords", "tags"]
    })
});

/// Response schema for synthesized answers.
static SYNTHESIS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "answer": { "type": "STRING" },
            "relatedIds": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["answer", "relatedIds"]
    })
});

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    embed_model: String,
    api_key_env: String,
    timeout_secs: u64,
}

impl GeminiBackend {
    pub fn from_config(config: &InferenceConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to create HTTP client");

        log::info!(
            "Initializing Gemini backend: url={}, model={}, embed={}",
            config.base_url,
            config.model,
            config.embed_model
        );

        Self {
            client,
            base_url: config
                .base_url
                .strip_suffix('/')
                .unwrap_or(config.base_url.as_str())
                .to_string(),
            model: config.model.clone(),
            embed_model: config.embed_model.clone(),
            api_key_env: config.api_key_env.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn embed_model_name(&self) -> &str {
        &self.embed_model
    }

    fn api_key(&self) -> Result<String, InferenceError> {
        std::env::var(&self.api_key_env)
            .map_err(|_| InferenceError::MissingKey(self.api_key_env.clone()))
    }

    /// Run one `generateContent` call with a forced JSON schema and parse
    /// the response body into `T`. Any non-conforming body is a schema
    /// failure.
    async fn generate_structured<T: DeserializeOwned>(
        &self,
        parts: Vec<Part>,
        schema: &Value,
    ) -> Result<T, InferenceError> {
        let key = self.api_key()?;
        let start = Instant::now();

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: schema.clone(),
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            // key travels in a header so it never shows up in request logs
            .header("x-goog-api-key", key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Transport(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Schema(format!("failed to parse response envelope: {e}")))?;

        let text = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| InferenceError::Schema("response carried no text part".to_string()))?;

        let parsed = serde_json::from_str::<T>(&text)
            .map_err(|e| InferenceError::Schema(format!("{e}; body was: {text}")))?;

        log::debug!(
            "generateContent complete in {}ms",
            start.elapsed().as_millis()
        );

        Ok(parsed)
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn inline(mime_type: &str, data: &str) -> Self {
        Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    #[serde(rename = "responseSchema")]
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest {
    content: EmbedContent,
}

#[derive(Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

fn annotation_prompt(req: &AnnotationRequest<'_>) -> String {
    let categories = if req.existing_categories.is_empty() {
        "(none yet)".to_string()
    } else {
        req.existing_categories.join(", ")
    };

    let mut prompt = format!(
        "You are the annotation step of a personal note-taking app. Analyze the \
         attached note content and produce:\n\
         - summary: a description of the content, at most 2 sentences\n\
         - tags: 3 to 5 short lowercase keywords that would help find this note again\n\
         - category: exactly one broad category label. Existing categories: {categories}. \
         Reuse one of them when it fits; only invent a new broad category when none fits.\n\
         Write the summary, tags and category in {language}.",
        language = req.language.prompt_name()
    );

    if req.text.is_none() {
        prompt.push_str("\nThe note has no text, only the attached image.");
    }

    prompt
}

fn intent_prompt(req: &IntentRequest<'_>) -> String {
    let categories = if req.known_categories.is_empty() {
        "(none)".to_string()
    } else {
        req.known_categories.join(", ")
    };
    let now = chrono::DateTime::from_timestamp_millis(req.now_ms)
        .unwrap_or_default()
        .to_rfc3339();

    format!(
        "You are the query parser of a personal note-taking app. The user wrote, \
         in {language}:\n\"{query}\"\n\n\
         Extract search filters:\n\
         - keywords: the core topic with filter phrasing stripped (drop things like \
         \"show me\", \"from last week\", \"in <category>\", \"about\"). If the query \
         is a question, keywords is the question's core topic. May be empty.\n\
         - category: at most one of the known categories [{categories}], only when \
         the query explicitly names it or strongly implies it; otherwise null.\n\
         - tags: tags the user explicitly mentioned, lowercase.\n\
         - startDate/endDate: inclusive bounds in epoch milliseconds for any date \
         phrase, resolved against the current time {now} ({now_ms} ms); null when \
         the query has no date constraint.",
        language = req.language.prompt_name(),
        query = req.query,
        now_ms = req.now_ms,
    )
}

fn synthesis_prompt(req: &SynthesisRequest<'_>) -> String {
    let notes = serde_json::to_string_pretty(req.context).unwrap_or_default();

    format!(
        "You are the answer step of a personal note-taking app. Answer the user's \
         request strictly from the notes below; do not use outside knowledge. If \
         the request asks for a listing, summarize the matching notes. If it asks a \
         question, synthesize the answer from the notes' content. Respond in \
         {language}.\n\n\
         Return:\n\
         - answer: the reply text\n\
         - relatedIds: the ids of the notes the answer is based on\n\n\
         User request: \"{query}\"\n\nNotes:\n{notes}",
        language = req.language.prompt_name(),
        query = req.query,
    )
}

#[async_trait]
impl ModelProvider for GeminiBackend {
    async fn annotate(&self, req: AnnotationRequest<'_>) -> Result<Annotation, InferenceError> {
        let mut parts = vec![Part::text(annotation_prompt(&req))];
        if let Some(text) = req.text {
            parts.push(Part::text(text));
        }
        if let Some(image) = &req.image {
            parts.push(Part::inline(image.mime_type, image.data));
        }

        self.generate_structured(parts, &ANNOTATION_SCHEMA).await
    }

    async fn parse_intent(&self, req: IntentRequest<'_>) -> Result<ParsedIntent, InferenceError> {
        let parts = vec![Part::text(intent_prompt(&req))];
        self.generate_structured(parts, &INTENT_SCHEMA).await
    }

    async fn synthesize(
        &self,
        req: SynthesisRequest<'_>,
    ) -> Result<SynthesizedAnswer, InferenceError> {
        let parts = vec![Part::text(synthesis_prompt(&req))];
        self.generate_structured(parts, &SYNTHESIS_SCHEMA).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let key = self.api_key()?;

        let request = EmbedRequest {
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:embedContent",
                self.base_url, self.embed_model
            ))
            .header("x-goog-api-key", key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Transport(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let result: EmbedResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Schema(format!("failed to parse response: {e}")))?;

        Ok(result.embedding.values)
    }
}


/// Integration tests against a live Gemini endpoint.
/// Run with: cargo test --features live-tests (requires GEMINI_API_KEY)
#[cfg(all(test, feature = "live-tests"))]
mod live_tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::language::Language;

    fn live_backend() -> GeminiBackend {
        GeminiBackend::from_config(&InferenceConfig::default())
    }

    #[tokio::test]
    async fn test_live_embed() {
        let backend = live_backend();
        let vector = backend.embed("hello world").await.expect("embed failed");
        assert!(!vector.is_empty());
    }

    #[tokio::test]
    async fn test_live_annotate() {
        let backend = live_backend();
        let annotation = backend
            .annotate(AnnotationRequest {
                text: Some("Pasta carbonara: guanciale, eggs, pecorino romano, no cream."),
                image: None,
                existing_categories: &["Cooking".to_string()],
                language: Language::En,
            })
            .await
            .expect("annotation failed");
        assert!(!annotation.summary.is_empty());
        assert!(!annotation.tags.is_empty());
        assert!(!annotation.category.is_empty());
    }
}
