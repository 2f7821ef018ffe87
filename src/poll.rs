//! Fixed-cadence polling of a submitted job until it settles.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::runpod::{JobSnapshot, JobStatus, RunpodError};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// 300 attempts at 2 s is about ten minutes.
pub const MAX_ATTEMPTS: u32 = 300;

/// Anything that can report the current state of a job.
pub trait StatusSource {
    fn job_status(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<JobSnapshot, RunpodError>> + Send;
}

#[derive(Clone, Copy, Debug)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Job submission failed: {0}")]
    Submit(#[source] RunpodError),

    #[error("Status query failed: {0}")]
    Query(#[source] RunpodError),

    #[error("{0}")]
    Failed(String),

    #[error("Job completed but no image was found in its output")]
    NoImage,

    /// The job may still finish upstream; we stopped watching it.
    #[error("Gave up waiting after {attempts} status checks")]
    TimedOut { attempts: u32 },
}

/// Queries `source` every `policy.interval` until the job reaches a terminal
/// status or `policy.max_attempts` queries have been made. Returns the
/// extracted result image of a completed job.
///
/// A failed query ends polling at once; it is not retried.
pub async fn poll_until_terminal<S>(
    source: &S,
    job_id: &str,
    policy: PollPolicy,
) -> Result<String, PollError>
where
    S: StatusSource + ?Sized,
{
    for attempt in 1..=policy.max_attempts {
        let snapshot = source.job_status(job_id).await.map_err(PollError::Query)?;
        debug!(job_id, attempt, status = %snapshot.status, "Polled job status");

        match snapshot.status {
            JobStatus::Completed => return snapshot.result_image.ok_or(PollError::NoImage),
            status if status.is_terminal() => {
                let message = snapshot
                    .error
                    .unwrap_or_else(|| format!("RunPod job ended with status {status}"));
                return Err(PollError::Failed(message));
            }
            _ => {}
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(job_id, attempts = policy.max_attempts, "Stopped polling, job still not finished");
    Err(PollError::TimedOut {
        attempts: policy.max_attempts,
    })
}
