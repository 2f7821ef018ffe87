//! Face-swap relay: a small web service that prepares two photos, submits
//! them to a RunPod ComfyUI endpoint and reports the generated image.

pub mod config;
pub mod error;
pub mod extract;
pub mod image_prep;
pub mod page;
pub mod poll;
pub mod runpod;
pub mod server;
pub mod workflow;

pub use config::Config;
pub use error::ApiError;
pub use runpod::{FaceSwapJob, JobStatus, RunpodClient, RunpodError};
pub use server::{router, AppState};
