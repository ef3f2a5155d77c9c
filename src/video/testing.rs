//! In-memory video service for render tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::api::{Operation, VideoService};
use crate::error::{Result, VideoError};
use crate::scene::AspectRatio;

const FAILING_LOCATOR: &str = "mem://fail";

/// Scripted behaviour for one prompt.
#[derive(Debug, Clone)]
pub enum Plan {
    /// Report each progress value on successive polls, then finish with a clip.
    /// `None` is a status without a progress indicator.
    Succeed { progress: Vec<Option<u8>> },
    /// Report the listed progress values, then stay unfinished without progress.
    Stall { progress: Vec<Option<u8>> },
    FailSubmit,
    FailPoll,
    NoResult,
    FailDownload,
    /// Never finishes.
    Hang,
    /// The submit call panics.
    Panic,
}

impl Plan {
    pub fn succeed(progress: &[u8]) -> Self {
        Plan::Succeed {
            progress: progress.iter().copied().map(Some).collect(),
        }
    }

    pub fn sparse(progress: &[Option<u8>]) -> Self {
        Plan::Succeed {
            progress: progress.to_vec(),
        }
    }
}

#[derive(Default)]
pub struct FakeVideo {
    plans: HashMap<String, Plan>,
    submits: Mutex<Vec<(String, AspectRatio)>>,
    polls: Mutex<HashMap<String, usize>>,
}

impl FakeVideo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(mut self, prompt: &str, plan: Plan) -> Self {
        self.plans.insert(prompt.to_string(), plan);
        self
    }

    pub fn submits(&self) -> Vec<(String, AspectRatio)> {
        self.submits.lock().unwrap().clone()
    }

    pub fn poll_count(&self, prompt: &str) -> usize {
        self.polls.lock().unwrap().get(prompt).copied().unwrap_or(0)
    }

    fn plan(&self, prompt: &str) -> Plan {
        self.plans
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| Plan::succeed(&[]))
    }
}

#[async_trait]
impl VideoService for FakeVideo {
    async fn submit(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<Operation> {
        self.submits
            .lock()
            .unwrap()
            .push((prompt.to_string(), aspect_ratio));

        match self.plan(prompt) {
            Plan::FailSubmit => Err(VideoError::Submission(format!("rejected '{}'", prompt))),
            Plan::Panic => panic!("video service crashed on '{}'", prompt),
            _ => Ok(Operation {
                name: format!("op/{}", prompt),
                progress_percent: Some(0),
                ..Default::default()
            }),
        }
    }

    async fn poll(&self, operation: &Operation) -> Result<Operation> {
        let prompt = operation.name.trim_start_matches("op/").to_string();
        let count = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(prompt.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let mut next = Operation::pending(operation.name.clone());
        match self.plan(&prompt) {
            Plan::Succeed { progress } => {
                if let Some(p) = progress.get(count - 1) {
                    next.progress_percent = *p;
                } else {
                    // last report short of 100 on purpose
                    next.done = true;
                    next.progress_percent = Some(90);
                    next.result_locator = Some(format!("mem://{}", prompt));
                }
            }
            Plan::FailPoll => return Err(VideoError::Poll("status unavailable".to_string())),
            Plan::NoResult => next.done = true,
            Plan::FailDownload => {
                next.done = true;
                next.result_locator = Some(FAILING_LOCATOR.to_string());
            }
            Plan::Stall { progress } => {
                next.progress_percent = progress.get(count - 1).copied().flatten();
            }
            Plan::Hang => next.progress_percent = Some(5),
            Plan::FailSubmit | Plan::Panic => unreachable!("submission already failed"),
        }
        Ok(next)
    }

    async fn download(&self, locator: &str) -> Result<Bytes> {
        if locator == FAILING_LOCATOR {
            return Err(VideoError::Download("Failed to download video: 500".to_string()));
        }
        Ok(Bytes::from(format!("clip from {}", locator)))
    }
}
