//! Fan-out of per-scene render jobs.
//!
//! [`RenderCoordinator`] starts one [`SceneRenderJob`] per scene and is the
//! only writer of job state and of the session error list. Jobs report back
//! over a channel keyed by scene number; callers drive the coordinator with
//! [`RenderCoordinator::next_update`] (or [`RenderCoordinator::wait_all`]).
//! A job task that ends without reporting (a panic) is reaped from the task
//! set and recorded as a failure of its scene.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::VideoService;
use crate::error::{Result, VideoError};
use crate::scene::{AspectRatio, Script};
use crate::video::job::{JobEvent, JobMessage, RenderJobState, SceneRenderJob};
use crate::video::media::MediaStore;

/// A per-scene failure, as shown in the session error list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    pub scene_number: u32,
    pub message: String,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scene {}: {}", self.scene_number, self.message)
    }
}

/// What changed after applying one job event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneUpdate {
    Progress { scene_number: u32, percent: u8 },
    Succeeded { scene_number: u32 },
    Failed { scene_number: u32, message: String },
}

/// Render session for one script.
pub struct RenderCoordinator {
    video: Arc<dyn VideoService>,
    media: MediaStore,
    poll_interval: Duration,
    aspect_ratio: AspectRatio,
    started: bool,
    order: Vec<u32>,
    states: HashMap<u32, RenderJobState>,
    tasks: JoinSet<()>,
    task_scenes: HashMap<Id, u32>,
    cancels: HashMap<u32, CancellationToken>,
    errors: Vec<RenderError>,
    events_tx: mpsc::UnboundedSender<JobMessage>,
    events_rx: mpsc::UnboundedReceiver<JobMessage>,
}

impl RenderCoordinator {
    pub fn new(video: Arc<dyn VideoService>, media: MediaStore, poll_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            video,
            media,
            poll_interval,
            aspect_ratio: AspectRatio::default(),
            started: false,
            order: Vec::new(),
            states: HashMap::new(),
            tasks: JoinSet::new(),
            task_scenes: HashMap::new(),
            cancels: HashMap::new(),
            errors: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// Choose the frame shape. Rejected once rendering has started.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) -> Result<()> {
        if self.started {
            return Err(VideoError::RenderLocked(format!(
                "aspect ratio is fixed at {} for this render pass",
                self.aspect_ratio
            )));
        }
        self.aspect_ratio = aspect_ratio;
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start one job per scene. Returns false (and does nothing) if this
    /// session already started rendering.
    pub fn render_all(&mut self, script: &Script) -> bool {
        if self.started {
            debug!("Render already started, ignoring trigger");
            return false;
        }
        self.started = true;
        self.errors.clear();

        info!(
            scenes = script.scenes.len(),
            aspect_ratio = %self.aspect_ratio,
            "Rendering all scenes"
        );

        for scene in &script.scenes {
            let scene_number = scene.scene_number;
            if self.states.contains_key(&scene_number) {
                warn!(scene = scene_number, "Duplicate scene number, skipping");
                continue;
            }

            let mut state = RenderJobState::new(scene_number);
            if !state.begin() {
                continue;
            }

            let cancel = CancellationToken::new();
            let job = SceneRenderJob::new(
                scene_number,
                scene.veo_prompt.clone(),
                self.aspect_ratio,
                self.poll_interval,
                cancel.clone(),
                self.events_tx.clone(),
            );
            let task = self
                .tasks
                .spawn(job.run(self.video.clone(), self.media.clone()));

            self.order.push(scene_number);
            self.states.insert(scene_number, state);
            self.task_scenes.insert(task.id(), scene_number);
            self.cancels.insert(scene_number, cancel);
        }

        true
    }

    /// Wait for the next job event and apply it. Returns `None` once every
    /// job is terminal (or nothing was started).
    pub async fn next_update(&mut self) -> Option<SceneUpdate> {
        loop {
            if self.is_finished() || !self.started {
                return None;
            }

            // queued events win over task exits so a job's last report is
            // always applied before its task is reaped
            tokio::select! {
                biased;
                Some(message) = self.events_rx.recv() => {
                    if let Some(update) = self.apply(message) {
                        return Some(update);
                    }
                }
                Some(joined) = self.tasks.join_next_with_id() => match joined {
                    Ok((id, ())) => {
                        self.task_scenes.remove(&id);
                    }
                    Err(e) => {
                        if let Some(update) = self.reap(e) {
                            return Some(update);
                        }
                    }
                },
                else => return None,
            }
        }
    }

    /// Drive every job to a terminal state.
    pub async fn wait_all(&mut self) {
        while self.next_update().await.is_some() {}
    }

    /// Record a job task that stopped without a terminal event.
    fn reap(&mut self, error: JoinError) -> Option<SceneUpdate> {
        let scene_number = self.task_scenes.remove(&error.id())?;
        let message = format!("render task stopped unexpectedly: {}", error);
        self.fail(scene_number, message)
    }

    fn fail(&mut self, scene_number: u32, message: String) -> Option<SceneUpdate> {
        let state = self.states.get_mut(&scene_number)?;
        if !state.fail(message.clone()) {
            return None;
        }
        self.cancels.remove(&scene_number);
        let error = RenderError {
            scene_number,
            message: message.clone(),
        };
        warn!("{}", error);
        self.errors.push(error);
        Some(SceneUpdate::Failed {
            scene_number,
            message,
        })
    }

    fn apply(&mut self, message: JobMessage) -> Option<SceneUpdate> {
        let scene_number = message.scene_number;
        let state = self.states.get_mut(&scene_number)?;

        match message.event {
            JobEvent::Progress(percent) => {
                state.report_progress(percent);
                Some(SceneUpdate::Progress {
                    scene_number,
                    percent: state.progress_percent(),
                })
            }
            JobEvent::Succeeded(handle) => {
                if !state.succeed(handle) {
                    return None;
                }
                self.cancels.remove(&scene_number);
                Some(SceneUpdate::Succeeded { scene_number })
            }
            JobEvent::Failed(message) => self.fail(scene_number, message),
        }
    }

    pub fn job(&self, scene_number: u32) -> Option<&RenderJobState> {
        self.states.get(&scene_number)
    }

    /// Job states in script order.
    pub fn jobs(&self) -> impl Iterator<Item = &RenderJobState> {
        self.order.iter().filter_map(|n| self.states.get(n))
    }

    pub fn job_count(&self) -> usize {
        self.states.len()
    }

    /// Session error list, in arrival order.
    pub fn errors(&self) -> &[RenderError] {
        &self.errors
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.states.values().all(|s| s.phase().is_terminal())
    }

    /// Move a finished clip out of the staging area so it outlives the session.
    pub async fn persist_result(&mut self, scene_number: u32, dest: &Path) -> Result<PathBuf> {
        let handle = self
            .states
            .get_mut(&scene_number)
            .and_then(|s| s.result_mut())
            .ok_or_else(|| {
                VideoError::InvalidInput(format!("scene {} has no rendered clip", scene_number))
            })?;
        handle.persist(dest).await
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        for (scene_number, cancel) in self.cancels.drain() {
            cancel.cancel();
            debug!(scene = scene_number, "Stopped render job");
        }
        self.tasks.abort_all();
        // dropping the states releases every staged clip
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;
    use crate::video::job::RenderPhase;
    use crate::video::testing::{FakeVideo, Plan};
    use tempfile::TempDir;

    fn script(prompts: &[&str]) -> Script {
        Script {
            title: "Test".into(),
            description: "A test script".into(),
            scenes: prompts
                .iter()
                .enumerate()
                .map(|(i, p)| Scene::new(i as u32 + 1, "INT. STUDIO", "scene", *p))
                .collect(),
        }
    }

    fn coordinator(video: Arc<FakeVideo>, dir: &TempDir) -> RenderCoordinator {
        RenderCoordinator::new(video, MediaStore::new(dir.path()), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_one_job_per_scene() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(FakeVideo::new());
        let mut coord = coordinator(video.clone(), &dir);

        assert!(coord.render_all(&script(&["a", "b", "c", "d"])));
        assert_eq!(coord.job_count(), 4);
        assert!(coord.jobs().all(|j| j.phase() == RenderPhase::Rendering));

        coord.wait_all().await;
        assert!(coord.is_finished());
        assert_eq!(video.submits().len(), 4);
        assert!(coord.jobs().all(|j| j.phase() == RenderPhase::Succeeded));
        let order: Vec<u32> = coord.jobs().map(|j| j.scene_number()).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_second_trigger_is_noop() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(FakeVideo::new());
        let mut coord = coordinator(video.clone(), &dir);
        let s = script(&["a", "b"]);

        assert!(coord.render_all(&s));
        assert!(!coord.render_all(&s));
        coord.wait_all().await;
        assert!(!coord.render_all(&s));

        assert_eq!(video.submits().len(), 2);
        assert_eq!(coord.job_count(), 2);
        assert!(coord.is_started());
    }

    #[tokio::test]
    async fn test_failed_scene_is_isolated() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(
            FakeVideo::new()
                .with_plan("one", Plan::succeed(&[20, 60]))
                .with_plan("two", Plan::FailSubmit)
                .with_plan("three", Plan::succeed(&[45])),
        );
        let mut coord = coordinator(video.clone(), &dir);

        coord.render_all(&script(&["one", "two", "three"]));
        coord.wait_all().await;

        assert_eq!(coord.errors().len(), 1);
        assert_eq!(coord.errors()[0].scene_number, 2);
        assert!(coord.errors()[0].to_string().starts_with("Scene 2: "));

        for n in [1, 3] {
            let job = coord.job(n).unwrap();
            assert_eq!(job.phase(), RenderPhase::Succeeded);
            assert_eq!(job.progress_percent(), 100);
            assert!(job.result().is_some());
        }
        let failed = coord.job(2).unwrap();
        assert_eq!(failed.phase(), RenderPhase::Failed);
        assert!(failed.error().is_some());
        assert!(failed.result().is_none());

        let ratios: Vec<AspectRatio> = video.submits().into_iter().map(|(_, r)| r).collect();
        assert!(ratios.iter().all(|r| *r == AspectRatio::Landscape));
    }

    #[tokio::test]
    async fn test_every_failure_kind_is_collected() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(
            FakeVideo::new()
                .with_plan("a", Plan::FailPoll)
                .with_plan("b", Plan::NoResult)
                .with_plan("c", Plan::FailDownload)
                .with_plan("d", Plan::succeed(&[50])),
        );
        let mut coord = coordinator(video, &dir);

        coord.render_all(&script(&["a", "b", "c", "d"]));
        coord.wait_all().await;

        let mut tagged: Vec<u32> = coord.errors().iter().map(|e| e.scene_number).collect();
        tagged.sort();
        assert_eq!(tagged, vec![1, 2, 3]);
        assert_eq!(coord.job(4).unwrap().phase(), RenderPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_panicked_job_is_reported_as_failed() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(
            FakeVideo::new()
                .with_plan("one", Plan::succeed(&[30]))
                .with_plan("two", Plan::Panic)
                .with_plan("three", Plan::succeed(&[60])),
        );
        let mut coord = coordinator(video, &dir);

        coord.render_all(&script(&["one", "two", "three"]));
        tokio::time::timeout(Duration::from_secs(2), coord.wait_all())
            .await
            .expect("a dead job task must not stall the session");

        assert!(coord.is_finished());
        let failed = coord.job(2).unwrap();
        assert_eq!(failed.phase(), RenderPhase::Failed);
        assert!(failed.error().unwrap().contains("stopped unexpectedly"));
        assert_eq!(coord.errors().len(), 1);
        assert_eq!(coord.errors()[0].scene_number, 2);
        for n in [1, 3] {
            assert_eq!(coord.job(n).unwrap().phase(), RenderPhase::Succeeded);
        }
    }

    #[tokio::test]
    async fn test_status_without_progress_keeps_last_value() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(FakeVideo::new().with_plan(
            "a",
            Plan::Stall {
                progress: vec![Some(40), None, None],
            },
        ));
        let mut coord = coordinator(video.clone(), &dir);
        coord.render_all(&script(&["a"]));

        loop {
            match coord.next_update().await {
                Some(SceneUpdate::Progress { percent: 40, .. }) => break,
                Some(SceneUpdate::Progress { .. }) => {}
                other => panic!("unexpected update {other:?}"),
            }
        }

        // polls keep coming but none of them carries progress
        let quiet = tokio::time::timeout(Duration::from_millis(30), coord.next_update()).await;
        assert!(quiet.is_err(), "got an update from a status without progress");
        assert!(video.poll_count("a") >= 3);

        let job = coord.job(1).unwrap();
        assert_eq!(job.phase(), RenderPhase::Rendering);
        assert_eq!(job.progress_percent(), 40);
    }

    #[tokio::test]
    async fn test_progress_stays_in_range() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(FakeVideo::new().with_plan("a", Plan::succeed(&[10, 70, 30])));
        let mut coord = coordinator(video, &dir);

        coord.render_all(&script(&["a"]));
        while let Some(update) = coord.next_update().await {
            if let SceneUpdate::Progress { percent, .. } = update {
                assert!(percent <= 100);
            }
            assert!(coord.job(1).unwrap().progress_percent() <= 100);
        }
        assert_eq!(coord.job(1).unwrap().progress_percent(), 100);
    }

    #[tokio::test]
    async fn test_aspect_ratio_frozen_after_start() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(FakeVideo::new());
        let mut coord = coordinator(video.clone(), &dir);

        coord.set_aspect_ratio(AspectRatio::Portrait).unwrap();
        coord.render_all(&script(&["a", "b"]));
        assert!(matches!(
            coord.set_aspect_ratio(AspectRatio::Landscape),
            Err(VideoError::RenderLocked(_))
        ));
        assert_eq!(coord.aspect_ratio(), AspectRatio::Portrait);

        coord.wait_all().await;
        assert!(video
            .submits()
            .iter()
            .all(|(_, r)| *r == AspectRatio::Portrait));
    }

    #[tokio::test]
    async fn test_next_update_before_start_is_none() {
        let dir = TempDir::new().unwrap();
        let mut coord = coordinator(Arc::new(FakeVideo::new()), &dir);
        assert!(coord.next_update().await.is_none());
        assert!(!coord.is_finished());
    }

    #[tokio::test]
    async fn test_drop_stops_polling_and_releases_clips() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(
            FakeVideo::new()
                .with_plan("done", Plan::succeed(&[]))
                .with_plan("slow", Plan::Hang),
        );
        let mut coord = coordinator(video.clone(), &dir);
        coord.render_all(&script(&["done", "slow"]));

        while coord.job(1).unwrap().phase() != RenderPhase::Succeeded {
            coord.next_update().await.unwrap();
        }
        let clip = coord.job(1).unwrap().result().unwrap().path().to_path_buf();
        assert!(clip.exists());

        drop(coord);
        assert!(!clip.exists(), "Clip should be released with the session");

        let polls = video.poll_count("slow");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(video.poll_count("slow"), polls, "No polling after teardown");
    }

    #[tokio::test]
    async fn test_persisted_clip_survives_session() {
        let dir = TempDir::new().unwrap();
        let video = Arc::new(FakeVideo::new());
        let mut coord = coordinator(video, &dir);
        coord.render_all(&script(&["a"]));
        coord.wait_all().await;

        let dest = dir.path().join("final").join("scene_1.mp4");
        coord.persist_result(1, &dest).await.unwrap();
        drop(coord);
        assert!(dest.exists());
    }
}
