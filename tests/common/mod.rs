//! In-process stand-in for the RunPod serverless API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use faceswap_relay::config::{Config, RunpodConfig};
use faceswap_relay::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const API_KEY: &str = "rp_test_key";
pub const ENDPOINT_ID: &str = "ep-test";

#[derive(Clone, Default)]
pub struct FakeRunpod {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    hits: AtomicUsize,
    status_hits: AtomicUsize,
    run_bodies: Mutex<Vec<Value>>,
    auth_headers: Mutex<Vec<String>>,
    run_reply: Mutex<Option<(u16, Value)>>,
    status_replies: Mutex<VecDeque<(u16, Value)>>,
}

#[allow(dead_code)]
impl FakeRunpod {
    pub fn reply_to_run(&self, status: u16, body: Value) {
        *self.inner.run_reply.lock().unwrap() = Some((status, body));
    }

    pub fn queue_status(&self, status: u16, body: Value) {
        self.inner.status_replies.lock().unwrap().push_back((status, body));
    }

    pub fn hits(&self) -> usize {
        self.inner.hits.load(Ordering::SeqCst)
    }

    pub fn status_hits(&self) -> usize {
        self.inner.status_hits.load(Ordering::SeqCst)
    }

    pub fn run_bodies(&self) -> Vec<Value> {
        self.inner.run_bodies.lock().unwrap().clone()
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.inner.auth_headers.lock().unwrap().clone()
    }

    fn record(&self, endpoint: &str, headers: &HeaderMap) {
        assert_eq!(endpoint, ENDPOINT_ID);
        self.inner.hits.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.inner.auth_headers.lock().unwrap().push(auth);
    }

    /// Serves the fake on an ephemeral port and returns its API base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/v2/:endpoint/run", post(run))
            .route("/v2/:endpoint/status/:job_id", get(status))
            .route("/v2/:endpoint/cancel/:job_id", post(cancel))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v2")
    }
}

fn reply(status: u16, body: Value) -> Response {
    (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
}

async fn run(
    State(fake): State<FakeRunpod>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    fake.record(&endpoint, &headers);
    let job_number = {
        let mut bodies = fake.inner.run_bodies.lock().unwrap();
        bodies.push(body);
        bodies.len()
    };
    let (status, body) = fake
        .inner
        .run_reply
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| (200, json!({ "id": format!("job-{job_number}"), "status": "IN_QUEUE" })));
    reply(status, body)
}

async fn status(
    State(fake): State<FakeRunpod>,
    Path((endpoint, job_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    fake.record(&endpoint, &headers);
    fake.inner.status_hits.fetch_add(1, Ordering::SeqCst);
    let (status, body) = fake
        .inner
        .status_replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| (200, json!({ "id": job_id, "status": "IN_PROGRESS" })));
    reply(status, body)
}

async fn cancel(
    State(fake): State<FakeRunpod>,
    Path((endpoint, job_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    fake.record(&endpoint, &headers);
    reply(200, json!({ "id": job_id, "status": "CANCELLED" }))
}

#[allow(dead_code)]
pub fn runpod_config(api_base: String) -> RunpodConfig {
    RunpodConfig {
        api_key: API_KEY.to_string(),
        endpoint_id: ENDPOINT_ID.to_string(),
        api_base,
    }
}

#[allow(dead_code)]
pub fn app_for(api_base: Option<String>) -> Router {
    let config = Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        runpod: api_base.map(runpod_config),
    };
    router(Arc::new(AppState::new(&config).unwrap()))
}

/// Sends one request through the router and decodes the JSON reply.
#[allow(dead_code)]
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[allow(dead_code)]
pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}
