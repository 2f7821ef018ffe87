//! Process configuration, read once from the environment at start-up.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "https://api.runpod.ai/v2";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Credentials and location of the RunPod serverless endpoint.
#[derive(Clone, Debug)]
pub struct RunpodConfig {
    pub api_key: String,
    pub endpoint_id: String,
    pub api_base: String,
}

impl RunpodConfig {
    /// `{api_base}/{endpoint_id}`, the prefix of every job route.
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.api_base, self.endpoint_id)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// `None` when the API key or endpoint id is unset. The server still
    /// starts; remote-facing routes answer with a configuration error.
    pub runpod: Option<RunpodConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_raw = non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .with_context(|| format!("BIND_ADDR is not a socket address: {bind_raw}"))?;

        let api_base = non_empty("RUNPOD_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let runpod = match (non_empty("RUNPOD_API_KEY"), non_empty("RUNPOD_ENDPOINT_ID")) {
            (Some(api_key), Some(endpoint_id)) => Some(RunpodConfig {
                api_key,
                endpoint_id,
                api_base,
            }),
            (api_key, endpoint_id) => {
                warn!(
                    api_key_set = api_key.is_some(),
                    endpoint_id_set = endpoint_id.is_some(),
                    "RunPod credentials incomplete, /generate and /status will refuse requests"
                );
                None
            }
        };

        Ok(Self { bind_addr, runpod })
    }
}
