//! Job lifecycle state machine.
//!
//! [`JobController`] owns the current job identity, consumes progress
//! events from a [`ProgressFeed`], decides when to fetch results from
//! the [`SimulationApi`], and exposes a single coherent [`JobState`]
//! view to consumers.
//!
//! Starting a new job is the only cancellation mechanism: each `start`
//! bumps an epoch counter and retires the previous job identity before
//! any awaited call can resolve, so progress events or job-creation
//! responses that arrive for a superseded job are detected by identity
//! comparison at delivery time and silently dropped.

use std::sync::Arc;

use tokio::sync::Mutex;

use choices_core::projector::{project_results, DetailedResult};
use choices_core::ranking::RankingOption;
use choices_core::types::OptionId;

use crate::api::SimulationApi;
use crate::channel::{ProgressFeed, Subscription};
use crate::messages::JobUpdate;

/// User-facing message when job creation fails.
pub const MSG_START_FAILED: &str = "could not start the simulation";

/// User-facing message when result retrieval fails.
pub const MSG_FETCH_FAILED: &str = "could not fetch results";

/// The controller's lifecycle view.
///
/// `Done` and `Failed` are terminal for a job instance; a new `start`
/// is accepted from any state and discards the previous identity.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Idle,
    Starting,
    Running {
        /// Displayed completion percentage. Never walks backwards even
        /// when the channel delivers updates out of order.
        progress: u8,
    },
    Completing,
    Done(Vec<DetailedResult>),
    Failed(String),
}

struct ControllerInner {
    state: JobState,
    /// Identity of the job whose events are currently accepted.
    current: Option<String>,
    /// Bumped by every `start`; awaited work resolving under an older
    /// epoch is abandoned.
    epoch: u64,
    runs: u32,
}

/// Orchestrates one simulation job at a time.
pub struct JobController {
    api: Arc<dyn SimulationApi>,
    feed: Arc<dyn ProgressFeed>,
    catalog: Vec<RankingOption>,
    inner: Mutex<ControllerInner>,
}

impl JobController {
    pub fn new(
        api: Arc<dyn SimulationApi>,
        feed: Arc<dyn ProgressFeed>,
        catalog: Vec<RankingOption>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            feed,
            catalog,
            inner: Mutex::new(ControllerInner {
                state: JobState::Idle,
                current: None,
                epoch: 0,
                runs: 0,
            }),
        })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> JobState {
        self.inner.lock().await.state.clone()
    }

    /// Start a fresh job, discarding any previous one.
    ///
    /// Returns the progress subscription to pump when the job was
    /// created and subscribed, or `None` when creation failed (state is
    /// then `Failed`) or when a newer `start` superseded this one while
    /// the creation request was in flight.
    pub async fn start(&self, ranked_ids: &[OptionId], runs: u32) -> Option<Subscription> {
        let epoch = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            let epoch = inner.epoch;
            let outgoing = inner.current.take();
            inner.state = JobState::Starting;
            inner.runs = runs;
            drop(inner);

            // The outgoing job must stop delivering before the new one
            // subscribes, or the shared connection would interleave
            // events from two jobs.
            if let Some(job_id) = outgoing {
                self.feed.unsubscribe(&job_id).await;
            }
            epoch
        };

        let job_id = match self.api.create_job(ranked_ids, runs).await {
            Ok(job_id) => job_id,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create simulation job");
                let mut inner = self.inner.lock().await;
                if inner.epoch == epoch {
                    inner.state = JobState::Failed(MSG_START_FAILED.to_string());
                }
                return None;
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            tracing::debug!(job_id = %job_id, "Discarding job created for a superseded start");
            return None;
        }

        match self.feed.subscribe(&job_id).await {
            Ok(subscription) => {
                tracing::info!(job_id = %job_id, runs, "Simulation job running");
                inner.current = Some(job_id);
                inner.state = JobState::Running { progress: 0 };
                Some(subscription)
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to subscribe to job progress");
                inner.state = JobState::Failed(MSG_START_FAILED.to_string());
                None
            }
        }
    }

    /// Consume one progress event.
    ///
    /// Events whose job id does not match the controller's current job
    /// are stale subscription artifacts and are dropped. The completion
    /// check is `>= 100` since the channel may overshoot; the fetch is
    /// triggered exactly once per job.
    pub async fn handle_update(&self, update: &JobUpdate) {
        let (job_id, runs, epoch) = {
            let mut inner = self.inner.lock().await;
            let Some(current) = inner.current.clone() else {
                tracing::debug!(
                    job_id = %update.job_id,
                    "Dropping progress event with no job in flight",
                );
                return;
            };
            if current != update.job_id {
                tracing::debug!(
                    job_id = %update.job_id,
                    current = %current,
                    "Dropping stale progress event",
                );
                return;
            }

            let rounded = update.progress.round().clamp(0.0, 100.0) as u8;
            if rounded < 100 {
                // Only a running job updates the display. The job id
                // stays set until the fetch resolves, so a stray
                // low-progress event can still carry the current id
                // while the state is Completing; it must not pull the
                // machine back to Running.
                let JobState::Running { progress } = inner.state else {
                    tracing::debug!(
                        job_id = %current,
                        progress = rounded,
                        "Dropping out-of-order progress event",
                    );
                    return;
                };
                let shown = progress.max(rounded);
                inner.state = JobState::Running { progress: shown };
                tracing::debug!(job_id = %current, progress = shown, "Job progress");
                return;
            }

            if inner.state == JobState::Completing {
                // Duplicate completion event while the fetch is in flight.
                return;
            }
            inner.state = JobState::Completing;
            (current, inner.runs, inner.epoch)
        };

        // Threshold reached: stop listening, then fetch exactly once.
        self.feed.unsubscribe(&job_id).await;

        let outcome = match self.api.fetch_results(&job_id).await {
            Ok(tally) => match project_results(&tally, runs, &self.catalog) {
                Ok(results) => Ok(results),
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Result projection failed");
                    Err(())
                }
            },
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to fetch simulation results");
                Err(())
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            tracing::debug!(job_id = %job_id, "Discarding results for a superseded job");
            return;
        }

        // Terminal either way: the job identity is cleared so late
        // events for it are ignored and a retry begins clean.
        inner.current = None;
        inner.state = match outcome {
            Ok(results) => JobState::Done(results),
            Err(()) => JobState::Failed(MSG_FETCH_FAILED.to_string()),
        };
    }

    /// Start a job and pump its progress events to a terminal state.
    pub async fn run(&self, ranked_ids: &[OptionId], runs: u32) -> JobState {
        let Some(mut subscription) = self.start(ranked_ids, runs).await else {
            return self.state().await;
        };

        while let Some(update) = subscription.recv().await {
            self.handle_update(&update).await;
            if matches!(self.state().await, JobState::Done(_) | JobState::Failed(_)) {
                break;
            }
        }

        let state = self.state().await;
        if matches!(state, JobState::Running { .. } | JobState::Completing) {
            tracing::warn!("Progress feed closed before the job reached a terminal state");
        }
        state
    }
}
