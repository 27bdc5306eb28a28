//! Deterministic model provider stub for tests.
//!
//! Fixture responses per task, per-task failure switches, and a call log so
//! tests can assert which model calls a pipeline actually made.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::inference::{
    Annotation, AnnotationRequest, InferenceError, IntentRequest, ModelProvider, ParsedIntent,
    SynthesisRequest, SynthesizedAnswer,
};

/// Which failure a task should simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Transport,
    Schema,
}

impl FailMode {
    fn to_error(self) -> InferenceError {
        match self {
            FailMode::Transport => InferenceError::Transport("simulated failure".to_string()),
            FailMode::Schema => InferenceError::Schema("simulated failure".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

#[derive(Clone, Default)]
pub struct MockProvider {
    annotation: Option<Annotation>,
    intent: Option<ParsedIntent>,
    answer: Option<SynthesizedAnswer>,
    query_embedding: Option<Vec<f32>>,
    dimension: usize,

    fail_annotate: Option<FailMode>,
    fail_intent: Option<FailMode>,
    fail_synthesize: Option<FailMode>,
    fail_embed: Option<FailMode>,

    calls: Arc<Mutex<Vec<MockCall>>>,
    synthesis_context_sizes: Arc<Mutex<Vec<usize>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            dimension: 16,
            ..Default::default()
        }
    }

    /// Fixed annotation result. Without one, a generic fixture is returned.
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Fixed parsed intent. Without one, the query echoes back as keywords
    /// with no filters.
    pub fn with_intent(mut self, intent: ParsedIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Fixed synthesis result. Without one, the mock answers "mock answer"
    /// and relates every offered note id.
    pub fn with_answer(mut self, answer: SynthesizedAnswer) -> Self {
        self.answer = Some(answer);
        self
    }

    /// Fixed embedding returned for every embed call (otherwise embeddings
    /// are derived deterministically from the text).
    pub fn with_query_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    pub fn failing_annotate(mut self, mode: FailMode) -> Self {
        self.fail_annotate = Some(mode);
        self
    }

    pub fn failing_intent(mut self, mode: FailMode) -> Self {
        self.fail_intent = Some(mode);
        self
    }

    pub fn failing_synthesize(mut self, mode: FailMode) -> Self {
        self.fail_synthesize = Some(mode);
        self
    }

    pub fn failing_embed(mut self, mode: FailMode) -> Self {
        self.fail_embed = Some(mode);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Context sizes of every synthesize call, in order.
    pub fn synthesis_context_sizes(&self) -> Vec<usize> {
        self.synthesis_context_sizes.lock().unwrap().clone()
    }

    fn log(&self, operation: &str, input: &str) {
        self.calls.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    /// Deterministic unit-length embedding from text content.
    pub fn embedding_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut vector = vec![0.0f32; dimension];
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vector[idx] += 0.1;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|x| *x /= magnitude);
        }
        vector
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn annotate(&self, req: AnnotationRequest<'_>) -> Result<Annotation, InferenceError> {
        self.log("annotate", req.text.unwrap_or("[image]"));

        if let Some(mode) = self.fail_annotate {
            return Err(mode.to_error());
        }

        Ok(self.annotation.clone().unwrap_or_else(|| Annotation {
            summary: "A mock summary.".to_string(),
            tags: vec!["mock".to_string()],
            category: "General".to_string(),
        }))
    }

    async fn parse_intent(&self, req: IntentRequest<'_>) -> Result<ParsedIntent, InferenceError> {
        self.log("parse_intent", req.query);

        if let Some(mode) = self.fail_intent {
            return Err(mode.to_error());
        }

        Ok(self
            .intent
            .clone()
            .unwrap_or_else(|| ParsedIntent::fallback(req.query)))
    }

    async fn synthesize(
        &self,
        req: SynthesisRequest<'_>,
    ) -> Result<SynthesizedAnswer, InferenceError> {
        self.log("synthesize", req.query);
        self.synthesis_context_sizes
            .lock()
            .unwrap()
            .push(req.context.len());

        if let Some(mode) = self.fail_synthesize {
            return Err(mode.to_error());
        }

        Ok(self.answer.clone().unwrap_or_else(|| SynthesizedAnswer {
            answer: "mock answer".to_string(),
            related_ids: req.context.iter().map(|e| e.id.clone()).collect(),
        }))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        self.log("embed", text);

        if let Some(mode) = self.fail_embed {
            return Err(mode.to_error());
        }

        if let Some(fixed) = &self.query_embedding {
            return Ok(fixed.clone());
        }

        Ok(Self::embedding_for(text, self.dimension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::embed_or_none;
    use crate::language::Language;

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let mock = MockProvider::new();
        let a = mock.embed("quantum computing").await.unwrap();
        let b = mock.embed("quantum computing").await.unwrap();
        assert_eq!(a, b);

        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_failure_switch_and_adapter() {
        let mock = MockProvider::new().failing_embed(FailMode::Transport);
        assert!(mock.embed("x").await.is_err());
        assert_eq!(embed_or_none(&mock, "x").await, None);
    }

    #[tokio::test]
    async fn test_call_log() {
        let mock = MockProvider::new();
        mock.embed("a").await.unwrap();
        mock.embed("b").await.unwrap();
        mock.parse_intent(IntentRequest {
            query: "q",
            known_categories: &[],
            now_ms: 0,
            language: Language::En,
        })
        .await
        .unwrap();

        assert_eq!(mock.call_count("embed"), 2);
        assert_eq!(mock.call_count("parse_intent"), 1);
        assert_eq!(mock.call_count("synthesize"), 0);
    }
}
