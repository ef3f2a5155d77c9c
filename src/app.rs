//! Application state and the script gate.
//!
//! [`App`] owns the current script and the render session. The rendering
//! view is only reachable while a script is present; `admit` and `reset` are
//! the only operations that change the script.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::{ScriptService, VideoService};
use crate::config::Config;
use crate::error::{Result, VideoError};
use crate::scene::{Script, ScriptStyle};
use crate::video::{MediaStore, RenderCoordinator};

/// Top-level views of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum View {
    #[default]
    ScriptAuthoring,
    Rendering,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::ScriptAuthoring => f.write_str("script authoring"),
            View::Rendering => f.write_str("rendering"),
        }
    }
}

pub struct App {
    view: View,
    script: Option<Script>,
    session: Option<RenderCoordinator>,
    authoring_error: Option<String>,
    video: Arc<dyn VideoService>,
    media: MediaStore,
    poll_interval: Duration,
}

impl App {
    pub fn new(video: Arc<dyn VideoService>, media: MediaStore, poll_interval: Duration) -> Self {
        Self {
            view: View::ScriptAuthoring,
            script: None,
            session: None,
            authoring_error: None,
            video,
            media,
            poll_interval,
        }
    }

    pub fn from_config(video: Arc<dyn VideoService>, config: &Config) -> Self {
        Self::new(video, MediaStore::new(&config.work_dir), config.poll_interval)
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref()
    }

    /// Last script-authoring error, for inline display.
    pub fn authoring_error(&self) -> Option<&str> {
        self.authoring_error.as_deref()
    }

    /// Whether the navigation affordance for `view` is enabled.
    pub fn is_view_enabled(&self, view: View) -> bool {
        match view {
            View::ScriptAuthoring => true,
            View::Rendering => self.script.is_some(),
        }
    }

    /// Navigate to `view`.
    ///
    /// Leaving the rendering view tears its session down; coming back starts
    /// a fresh one for the same script.
    pub fn select_view(&mut self, view: View) -> Result<()> {
        if !self.is_view_enabled(view) {
            return Err(VideoError::ViewDisabled(format!(
                "{} view requires a script",
                view
            )));
        }
        if view == self.view {
            return Ok(());
        }

        match view {
            View::ScriptAuthoring => {
                self.session = None;
            }
            View::Rendering => {
                self.session = Some(self.new_session());
            }
        }
        self.view = view;
        Ok(())
    }

    /// Record a freshly generated script and move to the rendering view.
    pub fn admit(&mut self, script: Script) {
        info!(title = %script.title, scenes = script.scenes.len(), "Script admitted");
        self.script = Some(script);
        self.authoring_error = None;
        self.session = Some(self.new_session());
        self.view = View::Rendering;
    }

    /// Discard the script and every render job, back to script authoring.
    pub fn reset(&mut self) {
        if self.script.is_some() {
            info!("Resetting session");
        }
        self.session = None;
        self.script = None;
        self.view = View::ScriptAuthoring;
    }

    /// Ask `service` for a script and admit it on success. Failures stay on
    /// the authoring view and are kept in [`App::authoring_error`].
    pub async fn generate_script(
        &mut self,
        service: &dyn ScriptService,
        idea: &str,
        style: ScriptStyle,
    ) -> Result<()> {
        if idea.trim().is_empty() {
            let err = VideoError::InvalidInput("Please enter a script idea".to_string());
            self.authoring_error = Some(err.to_string());
            return Err(err);
        }

        self.authoring_error = None;
        match service.generate(idea, style).await {
            Ok(script) => {
                self.admit(script);
                Ok(())
            }
            Err(e) => {
                warn!("Script generation failed: {}", e);
                self.authoring_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Current render session; present only in the rendering view.
    pub fn session(&self) -> Option<&RenderCoordinator> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut RenderCoordinator> {
        self.session.as_mut()
    }

    /// Trigger "render all" for the admitted script. Returns false when the
    /// session already started.
    pub fn render_all(&mut self) -> Result<bool> {
        match (&self.script, self.session.as_mut()) {
            (Some(script), Some(session)) => Ok(session.render_all(script)),
            _ => Err(VideoError::ViewDisabled(
                "rendering view requires a script".to_string(),
            )),
        }
    }

    fn new_session(&self) -> RenderCoordinator {
        RenderCoordinator::new(self.video.clone(), self.media.clone(), self.poll_interval)
    }
}
