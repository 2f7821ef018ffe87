use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::error::ApiError;
use crate::image_prep::{prepare_image, strip_data_url_prefix};
use crate::page;
use crate::runpod::{FaceSwapJob, RunpodClient, RunpodError};

/// Two base64 photos already capped at 1200 px fit comfortably in 10 MiB.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// `/prepare` takes camera originals, which are routinely over 10 MiB.
pub const PREPARE_BODY_LIMIT: usize = 40 * 1024 * 1024;

pub struct AppState {
    runpod: Option<RunpodClient>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, RunpodError> {
        let runpod = config.runpod.as_ref().map(RunpodClient::new).transpose()?;
        Ok(Self { runpod })
    }

    /// State without credentials; remote-facing routes refuse every request.
    pub fn unconfigured() -> Self {
        Self { runpod: None }
    }

    fn runpod(&self) -> Result<&RunpodClient, ApiError> {
        self.runpod.as_ref().ok_or(ApiError::NotConfigured)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub source_image: Option<String>,
    #[serde(default)]
    pub target_image: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub result_image: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize)]
pub struct PrepareResponse {
    pub image: String,
    pub width: u32,
    pub height: u32,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route(
            "/prepare",
            post(prepare).layer(DefaultBodyLimit::max(PREPARE_BODY_LIMIT)),
        )
        .route(
            "/generate",
            post(generate).layer(DefaultBodyLimit::max(BODY_LIMIT)),
        )
        .route("/status/:job_id", get(job_status))
        .route("/cancel/:job_id", post(cancel))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(page::render())
}

/// Resizes and re-encodes the multipart field `image` (or the first field).
async fn prepare(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PrepareResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| ApiError::BadRequest {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| ApiError::BadRequest {
        status: err.status(),
        message: err.body_text(),
    })? {
        let is_image = field.name() == Some("image");
        let data = field.bytes().await.map_err(|err| ApiError::BadRequest {
            status: err.status(),
            message: err.body_text(),
        })?;
        if is_image || upload.is_none() {
            upload = Some(data);
        }
        if is_image {
            break;
        }
    }
    let data = upload.ok_or_else(|| ApiError::bad_request("No image uploaded"))?;

    let prepared = tokio::task::spawn_blocking(move || prepare_image(&data))
        .await
        .map_err(|err| ApiError::internal(format!("Image preparation task failed: {err}")))??;

    info!(width = prepared.width, height = prepared.height, "📸 Prepared upload");
    Ok(Json(PrepareResponse {
        image: prepared.base64,
        width: prepared.width,
        height: prepared.height,
    }))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;

    let image = |value: &Option<String>| {
        value
            .as_deref()
            .map(strip_data_url_prefix)
            .filter(|data| !data.is_empty())
            .map(str::to_string)
    };
    let (Some(source_image), Some(target_image)) =
        (image(&request.source_image), image(&request.target_image))
    else {
        return Err(ApiError::MissingImages);
    };

    let client = state.runpod()?;
    let job = FaceSwapJob {
        prompt: request.prompt.unwrap_or_default(),
        source_image,
        target_image,
    };
    let handle = client.submit(&job).await?;

    Ok(Json(GenerateResponse {
        job_id: handle.id,
        status: handle.status.to_string(),
    }))
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let snapshot = state.runpod()?.status(&job_id).await?;
    Ok(Json(StatusResponse {
        status: snapshot.status.to_string(),
        result_image: snapshot.result_image,
        error: snapshot.error,
    }))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let status = state.runpod()?.cancel(&job_id).await?;
    Ok(Json(CancelResponse {
        status: status.to_string(),
    }))
}
