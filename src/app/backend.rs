use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::AppError;
use crate::{
    config::Config,
    eid::Eid,
    language::Language,
    notes::{ListQuery, Note, NoteDraft},
    recall::RecallResponse,
};

/// Outcome of an embedding backfill pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReembedReport {
    /// Notes that received a fresh embedding.
    pub embedded: usize,
    /// Notes that already had one.
    pub skipped: usize,
    /// Notes where the embedding service failed; left untouched.
    pub failed: usize,
}

#[async_trait]
pub trait AppBackend: Send + Sync {
    /// Annotate and persist a new note.
    async fn capture(&self, draft: NoteDraft) -> Result<Note, AppError>;

    /// Answer a natural-language query over the stored notes.
    async fn recall(
        &self,
        query: String,
        language: Option<Language>,
    ) -> Result<RecallResponse, AppError>;

    /// Plain listing search, no model involved.
    async fn search(&self, query: ListQuery) -> Result<Vec<Note>, AppError>;

    async fn delete(&self, id: Eid) -> Result<(), AppError>;

    async fn categories(&self) -> Result<Vec<String>, AppError>;
    async fn tags(&self) -> Result<Vec<String>, AppError>;
    async fn total(&self) -> Result<usize, AppError>;

    /// Backfill embeddings for notes that lack one.
    async fn reembed(&self) -> Result<ReembedReport, AppError>;

    async fn config(&self) -> Result<Config, AppError>;
    async fn update_config(&self, config: Config) -> Result<(), AppError>;
}
