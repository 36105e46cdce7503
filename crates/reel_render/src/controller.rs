//! Render job controller.
//!
//! [`RenderJobController`] owns the [`RenderJobState`] of one render job at
//! a time and drives it from submission to a terminal state with a
//! [`PollLoop`]. Every transition is published as a [`RenderEvent`] to all
//! subscribers, in order.
//!
//! # Job lifecycle
//!
//! ```text
//! Init ──submit──▶ Invoking ──accepted──▶ Rendering{p} ──done──▶ Done
//!                     │                       │
//!                     └──────failure──────────┴──────────────────▶ Error
//!
//! any state ──cancel──▶ Init
//! ```
//!
//! Each submission bumps a generation number. Every asynchronous result is
//! checked against it before being applied, so a cancelled or superseded
//! job can never change the state.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reel_core::{RenderPolicy, RenderRequest};

use crate::error::RenderFailure;
use crate::poll::{PollError, PollLoop, PollOutcome, PollStatus};
use crate::service::{JobHandle, ProgressReport, RenderService};

/// State of the render job owned by a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderJobState {
    /// No job submitted
    Init,
    /// Submission request in flight
    Invoking,
    /// Job accepted; polling in progress
    Rendering {
        job_id: String,
        bucket_ref: String,
        progress: f64,
    },
    /// Artifact is ready
    Done { url: String, size_bytes: u64 },
    /// Job failed; `error` displays the user-facing message
    Error {
        job_id: Option<String>,
        error: RenderFailure,
    },
}

impl RenderJobState {
    /// Whether a job is currently in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, RenderJobState::Invoking | RenderJobState::Rendering { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderJobState::Done { .. } | RenderJobState::Error { .. })
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            RenderJobState::Rendering { progress, .. } => Some(*progress),
            RenderJobState::Done { .. } => Some(1.0),
            _ => None,
        }
    }

    /// Short status name for display.
    pub fn status(&self) -> &'static str {
        match self {
            RenderJobState::Init => "init",
            RenderJobState::Invoking => "invoking",
            RenderJobState::Rendering { .. } => "rendering",
            RenderJobState::Done { .. } => "done",
            RenderJobState::Error { .. } => "error",
        }
    }
}

/// Transition published by a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// Entered `Invoking`
    Invoking,
    /// Entered `Rendering` with zero progress
    Accepted { job_id: String, bucket_ref: String },
    /// Progress update while `Rendering`
    Progress { job_id: String, progress: f64 },
    /// Entered `Done`
    Completed { url: String, size_bytes: u64 },
    /// Entered `Error`
    Failed {
        job_id: Option<String>,
        error: RenderFailure,
    },
    /// Cancelled back to `Init`
    Reset,
}

/// Location and size of a finished render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderArtifact {
    pub url: String,
    pub size_bytes: u64,
}

impl From<ProgressReport> for PollStatus<RenderArtifact> {
    fn from(report: ProgressReport) -> Self {
        match report {
            ProgressReport::Progress { progress } => PollStatus::Progress(progress),
            ProgressReport::Done { url, size_bytes } => {
                PollStatus::Done(RenderArtifact { url, size_bytes })
            }
            ProgressReport::Error { message } => PollStatus::Failed(message),
        }
    }
}

#[derive(Debug)]
struct JobSlot {
    state: RenderJobState,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Drives one render job at a time against a [`RenderService`].
///
/// The controller is cheap to clone; clones share the same job, so one
/// task can await [`submit`](Self::submit) while another calls
/// [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct RenderJobController {
    service: Arc<dyn RenderService>,
    poll: PollLoop,
    slot: Arc<Mutex<JobSlot>>,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<RenderEvent>>>>,
}

impl RenderJobController {
    pub fn new(service: Arc<dyn RenderService>, policy: &RenderPolicy) -> Self {
        Self::with_poll_loop(service, PollLoop::from_policy(policy))
    }

    pub fn with_poll_loop(service: Arc<dyn RenderService>, poll: PollLoop) -> Self {
        Self {
            service,
            poll,
            slot: Arc::new(Mutex::new(JobSlot {
                state: RenderJobState::Init,
                generation: 0,
                cancel: None,
            })),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> RenderJobState {
        self.slot.lock().state.clone()
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().state.is_active()
    }

    /// Receive every transition from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RenderEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Submit a job and drive it to a terminal state.
    ///
    /// Returns the state the job ended in. If a job is already in flight
    /// nothing happens and the current state is returned. If the job is
    /// cancelled while this call is pending, the returned state is `Init`.
    pub async fn submit(&self, request: RenderRequest) -> RenderJobState {
        let (generation, cancel) = {
            let mut slot = self.slot.lock();
            if slot.state.is_active() {
                warn!("Render job already {}, ignoring submit", slot.state.status());
                return slot.state.clone();
            }
            slot.generation += 1;
            let cancel = CancellationToken::new();
            slot.cancel = Some(cancel.clone());
            slot.state = RenderJobState::Invoking;
            self.emit(RenderEvent::Invoking);
            (slot.generation, cancel)
        };

        info!(
            "Submitting render job #{} ({} frames @ {} fps, {})",
            generation,
            request.input_props.duration_in_frames,
            request.input_props.fps,
            request.codec().file_extension()
        );

        let handle = match self.service.submit(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Render submission failed: {}", e);
                let error = RenderFailure::from_submission(&e);
                self.transition(generation, |_| {
                    Some((
                        RenderJobState::Error {
                            job_id: None,
                            error: error.clone(),
                        },
                        RenderEvent::Failed {
                            job_id: None,
                            error,
                        },
                    ))
                });
                return self.state();
            }
        };

        let accepted = self.transition(generation, |_| {
            Some((
                RenderJobState::Rendering {
                    job_id: handle.job_id.clone(),
                    bucket_ref: handle.bucket_ref.clone(),
                    progress: 0.0,
                },
                RenderEvent::Accepted {
                    job_id: handle.job_id.clone(),
                    bucket_ref: handle.bucket_ref.clone(),
                },
            ))
        });
        if !accepted {
            debug!("Job {} accepted after cancellation, not polling", handle.job_id);
            return self.state();
        }
        info!("Render job {} accepted (bucket {})", handle.job_id, handle.bucket_ref);

        let outcome = self.poll_job(generation, &cancel, &handle).await;
        self.finish(generation, &handle, outcome);
        self.state()
    }

    /// Cancel the active job and return to `Init` immediately.
    ///
    /// Calls already in flight run to completion, but their results are
    /// discarded.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        if let Some(token) = slot.cancel.take() {
            token.cancel();
        }
        slot.generation += 1;
        if slot.state != RenderJobState::Init {
            info!("Render job cancelled from state {}", slot.state.status());
            slot.state = RenderJobState::Init;
            self.emit(RenderEvent::Reset);
        }
    }

    async fn poll_job(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        handle: &JobHandle,
    ) -> Result<PollOutcome<RenderArtifact>, PollError> {
        let service = Arc::clone(&self.service);
        self.poll
            .run(
                cancel,
                || {
                    let service = Arc::clone(&service);
                    let handle = handle.clone();
                    async move { service.check(&handle).await.map(PollStatus::from) }
                },
                |p| {
                    self.transition(generation, |state| match state {
                        RenderJobState::Rendering {
                            job_id,
                            bucket_ref,
                            progress,
                        } => {
                            if p < *progress {
                                debug!("Progress went backwards ({} -> {}), holding", progress, p);
                            }
                            let progress = progress.max(p);
                            Some((
                                RenderJobState::Rendering {
                                    job_id: job_id.clone(),
                                    bucket_ref: bucket_ref.clone(),
                                    progress,
                                },
                                RenderEvent::Progress {
                                    job_id: job_id.clone(),
                                    progress,
                                },
                            ))
                        }
                        _ => None,
                    });
                },
            )
            .await
    }

    fn finish(
        &self,
        generation: u64,
        handle: &JobHandle,
        outcome: Result<PollOutcome<RenderArtifact>, PollError>,
    ) {
        let error = match outcome {
            Ok(PollOutcome::Done(artifact)) => {
                info!(
                    "Render job {} done: {} ({} bytes)",
                    handle.job_id, artifact.url, artifact.size_bytes
                );
                self.transition(generation, |_| {
                    Some((
                        RenderJobState::Done {
                            url: artifact.url.clone(),
                            size_bytes: artifact.size_bytes,
                        },
                        RenderEvent::Completed {
                            url: artifact.url,
                            size_bytes: artifact.size_bytes,
                        },
                    ))
                });
                return;
            }
            Ok(PollOutcome::Cancelled) => {
                debug!("Polling for job {} stopped after cancellation", handle.job_id);
                return;
            }
            Err(PollError::Timeout { deadline }) => RenderFailure::Timeout { deadline },
            Err(PollError::Exhausted { failures }) => RenderFailure::Exhausted { failures },
            Err(PollError::Failed(message)) => RenderFailure::Service(message),
        };

        warn!("Render job {} failed ({}): {}", handle.job_id, error.tag(), error);
        let job_id = Some(handle.job_id.clone());
        self.transition(generation, |_| {
            Some((
                RenderJobState::Error {
                    job_id: job_id.clone(),
                    error: error.clone(),
                },
                RenderEvent::Failed { job_id, error },
            ))
        });
    }

    /// Apply a transition if `generation` is still the live job.
    fn transition<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&RenderJobState) -> Option<(RenderJobState, RenderEvent)>,
    {
        let mut slot = self.slot.lock();
        let live = slot.generation == generation
            && slot.cancel.as_ref().is_some_and(|c| !c.is_cancelled());
        if !live {
            debug!("Discarding update for superseded render job #{}", generation);
            return false;
        }
        match f(&slot.state) {
            Some((state, event)) => {
                slot.state = state;
                self.emit(event);
                true
            }
            None => false,
        }
    }

    fn emit(&self, event: RenderEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
