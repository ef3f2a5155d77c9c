//! Per-scene render job.
//!
//! A [`SceneRenderJob`] drives one long-running video operation: submit,
//! poll on a fixed interval until done, then download the clip. It never
//! touches shared state; everything it learns is sent to the coordinator as a
//! [`JobMessage`] keyed by scene number.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::VideoService;
use crate::error::{Result, VideoError};
use crate::scene::AspectRatio;
use crate::video::media::{MediaHandle, MediaStore};

/// Lifecycle of one scene's render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderPhase {
    #[default]
    Idle,
    Rendering,
    Succeeded,
    Failed,
}

impl RenderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderPhase::Idle => "idle",
            RenderPhase::Rendering => "rendering",
            RenderPhase::Succeeded => "succeeded",
            RenderPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderPhase::Succeeded | RenderPhase::Failed)
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of one scene's render.
///
/// `result` is present iff the phase is `Succeeded`, `error` iff `Failed`.
/// Phases only move forward: `Idle -> Rendering -> Succeeded | Failed`.
#[derive(Debug)]
pub struct RenderJobState {
    scene_number: u32,
    phase: RenderPhase,
    progress_percent: u8,
    result: Option<MediaHandle>,
    error: Option<String>,
}

impl RenderJobState {
    pub fn new(scene_number: u32) -> Self {
        Self {
            scene_number,
            phase: RenderPhase::Idle,
            progress_percent: 0,
            result: None,
            error: None,
        }
    }

    pub fn scene_number(&self) -> u32 {
        self.scene_number
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn result(&self) -> Option<&MediaHandle> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Enter `Rendering`. Returns false if the job already left `Idle`.
    pub(crate) fn begin(&mut self) -> bool {
        if self.phase != RenderPhase::Idle {
            return false;
        }
        self.phase = RenderPhase::Rendering;
        self.progress_percent = 0;
        true
    }

    pub(crate) fn report_progress(&mut self, percent: u8) {
        if self.phase == RenderPhase::Rendering {
            self.progress_percent = percent.min(100);
        }
    }

    /// A handle arriving for a job that is not rendering is dropped (and released).
    pub(crate) fn succeed(&mut self, handle: MediaHandle) -> bool {
        if self.phase != RenderPhase::Rendering {
            return false;
        }
        self.phase = RenderPhase::Succeeded;
        self.progress_percent = 100;
        self.result = Some(handle);
        true
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.phase != RenderPhase::Rendering {
            return false;
        }
        self.phase = RenderPhase::Failed;
        self.error = Some(message.into());
        true
    }

    pub(crate) fn result_mut(&mut self) -> Option<&mut MediaHandle> {
        self.result.as_mut()
    }
}

#[derive(Debug)]
pub(crate) enum JobEvent {
    Progress(u8),
    Succeeded(MediaHandle),
    Failed(String),
}

#[derive(Debug)]
pub(crate) struct JobMessage {
    pub scene_number: u32,
    pub event: JobEvent,
}

/// Worker for a single scene.
pub(crate) struct SceneRenderJob {
    scene_number: u32,
    prompt: String,
    aspect_ratio: AspectRatio,
    poll_interval: Duration,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<JobMessage>,
}

impl SceneRenderJob {
    pub fn new(
        scene_number: u32,
        prompt: impl Into<String>,
        aspect_ratio: AspectRatio,
        poll_interval: Duration,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<JobMessage>,
    ) -> Self {
        Self {
            scene_number,
            prompt: prompt.into(),
            aspect_ratio,
            poll_interval,
            cancel,
            events,
        }
    }

    /// Run to completion or cancellation. Exactly one terminal event is sent
    /// unless the job is cancelled first.
    pub async fn run(self, video: Arc<dyn VideoService>, media: MediaStore) {
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(scene = self.scene_number, "Render cancelled");
                return;
            }
            outcome = self.drive(&*video, &media) => outcome,
        };

        // a clip produced after teardown is dropped here and released
        if self.cancel.is_cancelled() {
            return;
        }

        let event = match outcome {
            Ok(handle) => {
                info!(scene = self.scene_number, "Scene rendered");
                JobEvent::Succeeded(handle)
            }
            Err(e) => JobEvent::Failed(e.to_string()),
        };
        self.emit(event);
    }

    async fn drive(&self, video: &dyn VideoService, media: &MediaStore) -> Result<MediaHandle> {
        info!(
            scene = self.scene_number,
            aspect_ratio = %self.aspect_ratio,
            "Submitting scene for rendering"
        );
        let mut operation = video.submit(&self.prompt, self.aspect_ratio).await?;
        if let Some(percent) = operation.progress_percent {
            self.emit(JobEvent::Progress(percent));
        }

        let mut checks = 0u32;
        while !operation.done {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(VideoError::Poll("render cancelled".to_string()));
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            checks += 1;
            operation = video.poll(&operation).await?;
            debug!(
                scene = self.scene_number,
                check = checks,
                done = operation.done,
                progress = ?operation.progress_percent,
                "Polled operation"
            );
            if let Some(percent) = operation.progress_percent {
                self.emit(JobEvent::Progress(percent));
            }
        }

        let locator = operation.result_locator.ok_or_else(|| {
            VideoError::Poll("Video generation completed, but no download link was found".to_string())
        })?;

        let data = video.download(&locator).await?;
        media.store(self.scene_number, &data).await
    }

    fn emit(&self, event: JobEvent) {
        // coordinator gone means the job has been discarded; nothing to report to
        let _ = self.events.send(JobMessage {
            scene_number: self.scene_number,
            event,
        });
    }
}
