use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;

use super::backend::{AppBackend, ReembedReport};
use super::errors::AppError;
use crate::{
    annotate::{embedding_text, Annotator},
    config::Config,
    eid::Eid,
    inference::{embed_or_none, ImagePart, ModelProvider},
    language::Language,
    notes::{ListQuery, Note, NoteDraft, NoteKind, NoteStore},
    recall::{RecallEngine, RecallResponse},
};

/// Local backend: note store, model provider and config all in-process.
pub struct AppLocal {
    config: Arc<RwLock<Config>>,
    store: Arc<dyn NoteStore>,
    provider: Arc<dyn ModelProvider>,
}

impl AppLocal {
    pub fn new(
        config: Arc<RwLock<Config>>,
        store: Arc<dyn NoteStore>,
        provider: Arc<dyn ModelProvider>,
    ) -> Self {
        Self {
            config,
            store,
            provider,
        }
    }

    fn language(&self, requested: Option<Language>) -> Language {
        requested.unwrap_or(self.config.read().unwrap().language)
    }

    fn top_k(&self) -> usize {
        self.config.read().unwrap().recall.top_k
    }
}

#[async_trait]
impl AppBackend for AppLocal {
    async fn capture(&self, draft: NoteDraft) -> Result<Note, AppError> {
        if draft.is_empty() {
            return Err(AppError::EmptyDraft);
        }

        let language = self.language(draft.language);
        let text = draft
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        // decode up front so a broken payload fails before any model call
        let image_mime = match &draft.image_data {
            Some(b64) => {
                let bytes = STANDARD.decode(b64)?;
                let mime = infer::get(&bytes)
                    .map(|t| t.mime_type().to_string())
                    .unwrap_or_else(|| "image/png".to_string());
                Some(mime)
            }
            None => None,
        };

        let kind = NoteKind::detect(text, draft.image_data.is_some());

        let image_part = match (&draft.image_data, &image_mime) {
            (Some(data), Some(mime)) => Some(ImagePart {
                mime_type: mime,
                data,
            }),
            _ => None,
        };

        let existing_categories = self.store.categories();
        let annotated = Annotator::new(self.provider.as_ref())
            .analyze(text, image_part, &existing_categories, language)
            .await;

        if let Some(cause) = annotated.fallback {
            log::warn!("capture continues with a degraded annotation ({cause:?})");
        }

        // image-only notes carry the content-type as their content marker
        let content = match (text, &image_mime) {
            (Some(text), _) => text.to_string(),
            (None, Some(mime)) => mime.clone(),
            (None, None) => String::new(),
        };

        let note = Note {
            id: Eid::new(),
            content,
            kind,
            image_data: draft.image_data,
            summary: annotated.summary,
            tags: annotated.tags,
            category: annotated.category,
            created_at: Utc::now().timestamp_millis(),
            embedding: annotated.embedding,
        };

        Ok(self.store.create(note)?)
    }

    async fn recall(
        &self,
        query: String,
        language: Option<Language>,
    ) -> Result<RecallResponse, AppError> {
        let language = self.language(language);
        let notes = self.store.all();

        let engine = RecallEngine::new(self.provider.as_ref(), self.top_k());
        Ok(engine.query(&query, &notes, language).await)
    }

    async fn search(&self, query: ListQuery) -> Result<Vec<Note>, AppError> {
        Ok(self.store.search(query))
    }

    async fn delete(&self, id: Eid) -> Result<(), AppError> {
        if self.store.delete(&id)? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    async fn categories(&self) -> Result<Vec<String>, AppError> {
        Ok(self.store.categories())
    }

    async fn tags(&self) -> Result<Vec<String>, AppError> {
        Ok(self.store.tags())
    }

    async fn total(&self) -> Result<usize, AppError> {
        Ok(self.store.total())
    }

    async fn reembed(&self) -> Result<ReembedReport, AppError> {
        let mut report = ReembedReport::default();

        for note in self.store.all() {
            if note.embedding.is_some() {
                report.skipped += 1;
                continue;
            }

            let text = (note.kind != NoteKind::Image).then_some(note.content.as_str());
            let input = embedding_text(&note.category, &note.tags, &note.summary, text);

            match embed_or_none(self.provider.as_ref(), &input).await {
                Some(embedding) => {
                    self.store.set_embedding(&note.id, embedding)?;
                    report.embedded += 1;
                }
                None => report.failed += 1,
            }
        }

        log::info!(
            "reembed pass: {} embedded, {} skipped, {} failed",
            report.embedded,
            report.skipped,
            report.failed
        );

        Ok(report)
    }

    async fn config(&self) -> Result<Config, AppError> {
        Ok(self.config.read().unwrap().clone())
    }

    async fn update_config(&self, config: Config) -> Result<(), AppError> {
        let mut current = self.config.write().unwrap();
        let base_path = current.base_path().to_string();
        *current = config.with_base_path(&base_path);
        current.save();
        Ok(())
    }
}
