#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("note not found")]
    NotFound,

    #[error("nothing to capture: the draft has no text and no image")]
    EmptyDraft,

    #[error("reqwest error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("base64: {0:?}")]
    Base64(#[from] base64::DecodeError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
