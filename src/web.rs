use crate::{
    app::{AppBackend, AppError, AppLocal},
    chat::{ChatMessage, ChatSession},
    config::Config,
    eid::Eid,
    language::Language,
    notes::{ListQuery, Note, NoteDraft},
    recall::RecallResponse,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::{signal, sync::RwLock};

#[derive(Clone)]
pub struct SharedState {
    app: Arc<AppLocal>,
    chat: Arc<RwLock<ChatSession>>,
}

impl SharedState {
    pub fn new(app: AppLocal, language: Language) -> Self {
        Self {
            app: Arc::new(app),
            chat: Arc::new(RwLock::new(ChatSession::new(language))),
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/notes/capture", post(capture))
        .route("/api/notes/search", post(search))
        .route("/api/notes/delete", post(delete))
        .route("/api/notes/total", post(total))
        .route("/api/notes/tags", post(tags))
        .route("/api/notes/reembed", post(reembed))
        .route("/api/categories", get(categories))
        .route("/api/recall/query", post(recall_query))
        .route("/api/recall/history", get(recall_history))
        .route("/api/recall/reset", post(recall_reset))
        .route("/api/config", get(get_config))
        .route("/api/config", post(update_config))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn start_app(app: AppLocal) {
    let config = app.config().await.expect("config is always readable locally");

    let state = SharedState::new(app, config.language);
    let router = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .unwrap();
    log::info!("listening on {}", config.listen_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {
            log::warn!("shutting down");
        },
        _ = terminate => {},
    }
}

pub fn start_daemon(app: AppLocal) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app).await });
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::NotFound => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::EmptyDraft => (
                axum::http::StatusCode::BAD_REQUEST,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Base64(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Reqwest(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::IO(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

async fn capture(
    State(state): State<SharedState>,
    Json(draft): Json<NoteDraft>,
) -> Result<Json<Note>, HttpError> {
    state.app.capture(draft).await.map(Json).map_err(HttpError)
}

async fn search(
    State(state): State<SharedState>,
    Json(query): Json<ListQuery>,
) -> Result<Json<Vec<Note>>, HttpError> {
    state.app.search(query).await.map(Json).map_err(HttpError)
}

#[derive(Deserialize)]
struct DeleteBody {
    id: Eid,
}

async fn delete(
    State(state): State<SharedState>,
    Json(body): Json<DeleteBody>,
) -> Result<Json<serde_json::Value>, HttpError> {
    match state.app.delete(body.id).await {
        Ok(()) => Ok(Json(json!({"deleted": true}))),
        Err(AppError::NotFound) => Ok(Json(json!({"deleted": false}))),
        Err(err) => Err(HttpError(err)),
    }
}

async fn total(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, HttpError> {
    let total = state.app.total().await.map_err(HttpError)?;
    Ok(Json(json!({"total": total})))
}

async fn tags(State(state): State<SharedState>) -> Result<Json<Vec<String>>, HttpError> {
    state.app.tags().await.map(Json).map_err(HttpError)
}

async fn categories(State(state): State<SharedState>) -> Result<Json<Vec<String>>, HttpError> {
    state.app.categories().await.map(Json).map_err(HttpError)
}

async fn reembed(
    State(state): State<SharedState>,
) -> Result<Json<crate::app::ReembedReport>, HttpError> {
    state.app.reembed().await.map(Json).map_err(HttpError)
}

#[derive(Deserialize)]
struct RecallBody {
    query: String,
    #[serde(default)]
    language: Option<Language>,
}

async fn recall_query(
    State(state): State<SharedState>,
    Json(body): Json<RecallBody>,
) -> Result<Json<RecallResponse>, HttpError> {
    let language = {
        let mut chat = state.chat.write().await;
        let language = body.language.unwrap_or(chat.language);
        chat.ensure_language(language);
        chat.push_user(&body.query);
        language
    };

    let response = state
        .app
        .recall(body.query, Some(language))
        .await
        .map_err(HttpError)?;

    state.chat.write().await.push_model(&response);

    Ok(Json(response))
}

async fn recall_history(State(state): State<SharedState>) -> Json<Vec<ChatMessage>> {
    Json(state.chat.read().await.messages().to_vec())
}

#[derive(Deserialize)]
struct ResetBody {
    #[serde(default)]
    language: Option<Language>,
}

async fn recall_reset(
    State(state): State<SharedState>,
    Json(body): Json<ResetBody>,
) -> Json<serde_json::Value> {
    let mut chat = state.chat.write().await;
    let language = body.language.unwrap_or(chat.language);
    chat.reset(language);
    Json(json!({"ok": true}))
}

async fn get_config(State(state): State<SharedState>) -> Result<Json<Config>, HttpError> {
    state.app.config().await.map(Json).map_err(HttpError)
}

async fn update_config(
    State(state): State<SharedState>,
    Json(config): Json<Config>,
) -> Result<Json<serde_json::Value>, HttpError> {
    state
        .app
        .update_config(config)
        .await
        .map_err(HttpError)?;
    Ok(Json(json!({"ok": true})))
}
