//! Client for the RunPod serverless endpoint that runs the face-swap graph.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::config::RunpodConfig;
use crate::extract::extract_image;
use crate::poll::{poll_until_terminal, PollError, PollPolicy, StatusSource};
use crate::workflow::{Seeds, Workflow, SOURCE_IMAGE_NAME, TARGET_IMAGE_NAME};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RunpodError {
    /// The endpoint answered with a non-success status.
    #[error("RunPod {operation} error: {status}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("RunPod request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Job ids are spliced into the request path, so only `[A-Za-z0-9_-]` is allowed.
    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),
}

/// RunPod job ids look like `c80ffee4-f315-4e25-a146-0f3d98cf024b-u1`.
pub fn is_valid_job_id(job_id: &str) -> bool {
    !job_id.is_empty()
        && job_id.len() <= 128
        && job_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Status values reported by RunPod for a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    Other(String),
}

impl JobStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "IN_QUEUE" => JobStatus::InQueue,
            "IN_PROGRESS" => JobStatus::InProgress,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            "TIMED_OUT" => JobStatus::TimedOut,
            other => JobStatus::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            JobStatus::InQueue => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::TimedOut => "TIMED_OUT",
            JobStatus::Other(raw) => raw,
        }
    }

    /// No further transition happens after a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// The two images and prompt of one face-swap request, base64 encoded.
#[derive(Clone, Debug)]
pub struct FaceSwapJob {
    pub prompt: String,
    pub source_image: String,
    pub target_image: String,
}

#[derive(Clone, Debug)]
pub struct JobHandle {
    pub id: String,
    pub status: JobStatus,
}

/// One status observation. `result_image` is only filled for completed jobs.
#[derive(Clone, Debug)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub result_image: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    input: RunInput<'a>,
}

#[derive(Serialize)]
struct RunInput<'a> {
    workflow: &'a Workflow,
    images: [NamedImage<'a>; 2],
}

#[derive(Serialize)]
struct NamedImage<'a> {
    name: &'static str,
    image: &'a str,
}

#[derive(Deserialize)]
struct JobAck {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl StatusBody {
    fn into_snapshot(self) -> JobSnapshot {
        let status = JobStatus::from_wire(&self.status);
        let result_image = match (&status, &self.output) {
            (JobStatus::Completed, Some(output)) => extract_image(output).map(str::to_string),
            _ => None,
        };
        let error = match self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(message)) => Some(message),
            Some(other) => Some(other.to_string()),
        };
        JobSnapshot {
            status,
            result_image,
            error,
        }
    }
}

pub struct RunpodClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RunpodClient {
    pub fn new(config: &RunpodConfig) -> Result<Self, RunpodError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
        })
    }

    /// Submits the job with freshly drawn seeds.
    pub async fn submit(&self, job: &FaceSwapJob) -> Result<JobHandle, RunpodError> {
        self.submit_with_seeds(job, Seeds::random()).await
    }

    pub async fn submit_with_seeds(
        &self,
        job: &FaceSwapJob,
        seeds: Seeds,
    ) -> Result<JobHandle, RunpodError> {
        let workflow = Workflow::new(&job.prompt, seeds);
        let payload = RunRequest {
            input: RunInput {
                workflow: &workflow,
                images: [
                    NamedImage {
                        name: SOURCE_IMAGE_NAME,
                        image: &job.source_image,
                    },
                    NamedImage {
                        name: TARGET_IMAGE_NAME,
                        image: &job.target_image,
                    },
                ],
            },
        };

        info!(swap_seed = seeds.swap, refine_seed = seeds.refine, "📤 Submitting face-swap job");

        let response = self
            .http
            .post(format!("{}/run", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let ack: JobAck = Self::json_or_error("API", response).await?;

        info!(job_id = %ack.id, status = %ack.status, "Job accepted");
        Ok(JobHandle {
            id: ack.id,
            status: JobStatus::from_wire(&ack.status),
        })
    }

    pub async fn status(&self, job_id: &str) -> Result<JobSnapshot, RunpodError> {
        let response = self
            .http
            .get(self.job_url("status", job_id)?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let body: StatusBody = Self::json_or_error("status", response).await?;
        Ok(body.into_snapshot())
    }

    /// Asks RunPod to stop a queued or running job.
    pub async fn cancel(&self, job_id: &str) -> Result<JobStatus, RunpodError> {
        let response = self
            .http
            .post(self.job_url("cancel", job_id)?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let ack: JobAck = Self::json_or_error("cancel", response).await?;
        info!(job_id = %ack.id, status = %ack.status, "Job cancel requested");
        Ok(JobStatus::from_wire(&ack.status))
    }

    /// Submits `job` and polls it to a terminal state, returning the image.
    pub async fn run_to_completion(
        &self,
        job: &FaceSwapJob,
        policy: PollPolicy,
    ) -> Result<String, PollError> {
        let handle = self.submit(job).await.map_err(PollError::Submit)?;
        poll_until_terminal(self, &handle.id, policy).await
    }

    fn job_url(&self, action: &str, job_id: &str) -> Result<String, RunpodError> {
        if !is_valid_job_id(job_id) {
            return Err(RunpodError::InvalidJobId(job_id.to_string()));
        }
        Ok(format!("{}/{}/{}", self.base_url, action, job_id))
    }

    async fn json_or_error<T: for<'de> Deserialize<'de>>(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T, RunpodError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(operation, status = status.as_u16(), body = %body, "RunPod returned an error");
            return Err(RunpodError::Http {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl StatusSource for RunpodClient {
    async fn job_status(&self, job_id: &str) -> Result<JobSnapshot, RunpodError> {
        self.status(job_id).await
    }
}
