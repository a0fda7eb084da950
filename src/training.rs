//! Training poll loop.
//!
//! Kicks off training on the provider and polls per-submodel status until
//! every submodel has left training, one reports failure, the optional
//! poll ceiling is hit, or the cancellation token fires. Waits between polls
//! are timed suspensions raced against cancellation, never blocking sleeps.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{SubmodelStatus, TrainingJobStatus, TrainingState};
use crate::progress::{TrainingProgressEvent, TrainingProgressReporter};
use crate::traits::RemoteGateway;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("failed to start training: {0:#}")]
    Start(anyhow::Error),

    #[error("unexpected training status '{0}' on start, expected 'Queued'")]
    UnexpectedStatus(String),

    #[error("failed to fetch training status: {0:#}")]
    Poll(anyhow::Error),

    #[error("submodel '{model_id}' failed to train: {reason}")]
    SubmodelFailed { model_id: String, reason: String },

    #[error("training cancelled before completion")]
    Cancelled,

    #[error("training did not complete within {0} polls")]
    PollLimitExceeded(u32),
}

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub poll_interval: Duration,
    pub max_polls: Option<u32>,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: None,
        }
    }
}

/// Fraction of submodels no longer queued or in progress.
///
/// An empty status list counts as no progress: the provider has not
/// scheduled any submodel yet.
pub fn training_progress(statuses: &[SubmodelStatus]) -> f64 {
    if statuses.is_empty() {
        return 0.0;
    }
    let total = statuses.len();
    let pending = statuses.iter().filter(|s| s.state.is_pending()).count();
    (total - pending) as f64 / total as f64
}

/// Job-level status derived from one poll.
pub fn job_status(statuses: &[SubmodelStatus]) -> TrainingJobStatus {
    if let Some(failed) = statuses.iter().find(|s| s.state == TrainingState::Fail) {
        return TrainingJobStatus::Failed {
            reason: failure_reason(failed),
            model_id: failed.model_id.clone(),
        };
    }
    if statuses.is_empty() {
        return TrainingJobStatus::NotStarted;
    }
    if statuses.iter().all(|s| s.state == TrainingState::Queued) {
        return TrainingJobStatus::Queued;
    }
    let progress = training_progress(statuses);
    if progress >= 1.0 {
        TrainingJobStatus::Succeeded
    } else {
        TrainingJobStatus::InProgress {
            fraction_complete: progress,
        }
    }
}

fn failure_reason(status: &SubmodelStatus) -> String {
    status
        .failure_reason
        .clone()
        .unwrap_or_else(|| "no reason given".to_string())
}

/// Start training `version_id` and wait for it to finish.
///
/// Returns the number of status polls performed.
pub async fn train_to_completion(
    gateway: &dyn RemoteGateway,
    app_id: &str,
    version_id: &str,
    options: &TrainingOptions,
    progress: &dyn TrainingProgressReporter,
    cancel: &CancellationToken,
) -> Result<u32, TrainingError> {
    let state = gateway
        .start_training(app_id, version_id)
        .await
        .map_err(TrainingError::Start)?;
    if state != TrainingState::Queued {
        return Err(TrainingError::UnexpectedStatus(state.as_str().to_string()));
    }
    tracing::info!(version_id, "training queued");
    progress.report(TrainingProgressEvent::Queued {
        version: version_id.to_string(),
    });

    let mut polls = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(TrainingError::Cancelled);
        }

        let statuses = gateway
            .poll_training(app_id, version_id)
            .await
            .map_err(TrainingError::Poll)?;
        polls += 1;

        let status = job_status(&statuses);
        let total = statuses.len() as u64;
        let finished = statuses.iter().filter(|s| !s.state.is_pending()).count() as u64;
        progress.report(TrainingProgressEvent::Polled {
            version: version_id.to_string(),
            status: status.clone(),
            finished,
            total,
        });

        match status {
            TrainingJobStatus::Failed { reason, model_id } => {
                return Err(TrainingError::SubmodelFailed { model_id, reason });
            }
            TrainingJobStatus::Succeeded => {
                tracing::info!(version_id, polls, "training complete");
                return Ok(polls);
            }
            _ => {
                tracing::debug!(
                    version_id,
                    polls,
                    progress = training_progress(&statuses),
                    "training in progress"
                );
            }
        }

        if let Some(max) = options.max_polls {
            if polls >= max {
                return Err(TrainingError::PollLimitExceeded(max));
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TrainingError::Cancelled),
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }
}
