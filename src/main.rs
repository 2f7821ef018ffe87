use std::sync::Arc;

use anyhow::Context;
use faceswap_relay::{router, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(AppState::new(&config).context("building RunPod client")?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    info!("🚀 Server running on http://{}", config.bind_addr);
    info!("🧑 Open in your browser to start swapping faces!");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
