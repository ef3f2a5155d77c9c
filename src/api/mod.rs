//! External generation services.
//!
//! The render core only talks to these traits; [`GeminiClient`] is the
//! production implementation of both.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::scene::{AspectRatio, Script, ScriptStyle};

/// Produces a structured script from a free-text idea.
#[async_trait]
pub trait ScriptService: Send + Sync {
    async fn generate(&self, idea: &str, style: ScriptStyle) -> Result<Script>;
}

/// Long-running video generation.
#[async_trait]
pub trait VideoService: Send + Sync {
    /// Start generating one clip. Fails with `VideoError::Submission`.
    async fn submit(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<Operation>;

    /// Refresh the status of a submitted operation. Fails with `VideoError::Poll`.
    async fn poll(&self, operation: &Operation) -> Result<Operation>;

    /// Fetch the finished clip behind a result locator. Fails with `VideoError::Download`.
    async fn download(&self, locator: &str) -> Result<Bytes>;
}

/// Snapshot of a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Operation {
    /// Server-side handle, used for polling
    pub name: String,
    pub done: bool,
    /// Reported progress (0-100), when the service sends one
    pub progress_percent: Option<u8>,
    /// Where the finished media can be fetched from
    pub result_locator: Option<String>,
}

impl Operation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Clamp a reported progress value into 0..=100.
pub(crate) fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
