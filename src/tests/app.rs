//! Capture/recall flow tests over the local backend.

use std::path::Path;
use std::sync::{Arc, RwLock};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::app::{AppBackend, AppError, AppLocal};
use crate::config::Config;
use crate::inference::mock::{FailMode, MockProvider};
use crate::inference::Annotation;
use crate::notes::{BackendJson, ListQuery, NoteDraft, NoteKind};

/// Minimal PNG magic; enough for MIME sniffing.
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn store_in(dir: &Path) -> BackendJson {
    BackendJson::load(dir.join("notes.json").to_str().unwrap()).unwrap()
}

fn app_with(store: BackendJson, mock: MockProvider) -> AppLocal {
    AppLocal::new(
        Arc::new(RwLock::new(Config::default())),
        Arc::new(store),
        Arc::new(mock),
    )
}

fn text_draft(text: &str) -> NoteDraft {
    NoteDraft {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_capture_text_note() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockProvider::new().with_annotation(Annotation {
        summary: "Carbonara, the roman way.".to_string(),
        tags: vec!["pasta".to_string(), "dinner".to_string()],
        category: "Cooking".to_string(),
    });
    let app = app_with(store_in(dir.path()), mock);

    let note = app.capture(text_draft("carbonara: no cream, ever")).await.unwrap();

    assert_eq!(note.kind, NoteKind::Text);
    assert_eq!(note.content, "carbonara: no cream, ever");
    assert_eq!(note.category, "Cooking");
    assert_eq!(note.image_data, None);
    assert!(note.embedding.is_some());
    assert!(note.created_at > 0);
    assert_eq!(app.total().await.unwrap(), 1);
}

#[tokio::test]
async fn test_capture_link_note() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(store_in(dir.path()), MockProvider::new());

    let note = app
        .capture(text_draft("https://doc.rust-lang.org/book/"))
        .await
        .unwrap();

    assert_eq!(note.kind, NoteKind::Link);
    assert_eq!(note.image_data, None);
}

#[tokio::test]
async fn test_capture_image_note_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(store_in(dir.path()), MockProvider::new());

    let payload = STANDARD.encode(PNG_MAGIC);
    let note = app
        .capture(NoteDraft {
            image_data: Some(payload.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(note.kind, NoteKind::Image);
    assert_eq!(note.image_data, Some(payload));
    // image-only notes carry the content-type marker as content
    assert_eq!(note.content, "image/png");
}

#[tokio::test]
async fn test_capture_empty_draft_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(store_in(dir.path()), MockProvider::new());

    let result = app.capture(NoteDraft::default()).await;
    assert!(matches!(result, Err(AppError::EmptyDraft)));

    let blank = app.capture(text_draft("   ")).await;
    assert!(matches!(blank, Err(AppError::EmptyDraft)));
}

#[tokio::test]
async fn test_capture_broken_image_payload_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(store_in(dir.path()), MockProvider::new());

    let result = app
        .capture(NoteDraft {
            image_data: Some("!!! not base64 !!!".to_string()),
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(AppError::Base64(_))));
    assert_eq!(app.total().await.unwrap(), 0);
}

#[tokio::test]
async fn test_degraded_capture_still_persists() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockProvider::new().failing_annotate(FailMode::Transport);
    let app = app_with(store_in(dir.path()), mock);

    let note = app
        .capture(text_draft("a thought the model never saw"))
        .await
        .unwrap();

    assert_eq!(note.category, "General");
    assert_eq!(note.tags, vec!["uncategorized"]);
    assert_eq!(note.embedding, None);
    assert_eq!(app.total().await.unwrap(), 1);
}

#[tokio::test]
async fn test_recall_through_backend() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(store_in(dir.path()), MockProvider::new());

    app.capture(text_draft("remember the milk")).await.unwrap();
    let response = app.recall("what should I remember?".to_string(), None).await.unwrap();

    assert_eq!(response.answer, "mock answer");
    assert_eq!(response.related_ids.len(), 1);
}

#[tokio::test]
async fn test_delete_unknown_note() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(store_in(dir.path()), MockProvider::new());

    let result = app.delete("01MISSING".into()).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_search_passthrough() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockProvider::new().with_annotation(Annotation {
        summary: "s".to_string(),
        tags: vec!["t".to_string()],
        category: "Reading".to_string(),
    });
    let app = app_with(store_in(dir.path()), mock);

    app.capture(text_draft("borrow checker notes")).await.unwrap();
    app.capture(text_draft("carbonara recipe")).await.unwrap();

    let hits = app
        .search(ListQuery {
            text: Some("borrow".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    assert_eq!(app.categories().await.unwrap(), vec!["Reading"]);
    assert_eq!(app.tags().await.unwrap(), vec!["t"]);
}

#[tokio::test]
async fn test_reembed_backfills_only_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());

    // capture with a dead embedding service: notes persist without vectors
    let broken = app_with(store.clone(), MockProvider::new().failing_embed(FailMode::Transport));
    broken.capture(text_draft("first")).await.unwrap();
    broken.capture(text_draft("second")).await.unwrap();

    let report = broken.reembed().await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.embedded, 0);

    // same store, healthy provider: the backfill fills both
    let healthy = app_with(store.clone(), MockProvider::new());
    let report = healthy.reembed().await.unwrap();
    assert_eq!(report.embedded, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failed, 0);

    // a second pass touches nothing
    let report = healthy.reembed().await.unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(report.embedded, 0);
}
