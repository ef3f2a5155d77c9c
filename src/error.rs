use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Script generation error: {0}")]
    Generation(String),

    #[error("Video submission error: {0}")]
    Submission(String),

    #[error("Video polling error: {0}")]
    Poll(String),

    #[error("Video download error: {0}")]
    Download(String),

    #[error("Rendering already started: {0}")]
    RenderLocked(String),

    #[error("View unavailable: {0}")]
    ViewDisabled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VideoError>;
