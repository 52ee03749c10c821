//! The upstream streaming protocol is an external collaborator spec.md §1
//! explicitly scopes out of the relay's own concern. This module defines
//! the trait boundary plus a reference implementation sufficient for the
//! bundled binary and tests — not a claim of wire-format completeness.

use crate::handler::AutoConfigHandler;
use crate::message;
use crate::sse::parse_sse_stream;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Runs until the stream ends or an unrecoverable error occurs,
    /// forwarding every decoded message to `handler`.
    async fn run(&self, handler: Arc<AutoConfigHandler>) -> Result<(), UpstreamClientError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamClientError {
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("upstream stream ended")]
    StreamEnded,
    #[error("upstream returned unauthorized — control plane rejected the auto-config key")]
    Unauthorized,
}

/// SSE-based reference auto-config client, grounded on the provider
/// crate's `reqwest` streaming idiom.
pub struct SseAutoConfigClient {
    url: String,
    auto_config_key: String,
    http: reqwest::Client,
}

impl SseAutoConfigClient {
    pub fn new(url: impl Into<String>, auto_config_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_config_key: auto_config_key.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UpstreamClient for SseAutoConfigClient {
    async fn run(&self, handler: Arc<AutoConfigHandler>) -> Result<(), UpstreamClientError> {
        let response = self
            .http
            .get(&self.url)
            .header("Authorization", &self.auto_config_key)
            .send()
            .await
            .map_err(|e| UpstreamClientError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UpstreamClientError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(UpstreamClientError::Request(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let mut events = Box::pin(parse_sse_stream(response.bytes_stream()));
        while let Some(event) = events.next().await {
            let event = event.map_err(UpstreamClientError::Request)?;
            match message::decode(&event.event, &event.data) {
                Ok(msg) => handler.handle_message(msg),
                Err(e) => tracing::warn!(error = %e, "dropping unparsable auto-config message"),
            }
        }
        Err(UpstreamClientError::StreamEnded)
    }
}

/// Runs `client` with reconnect-with-backoff, honoring spec §7's policy
/// that an unauthorized control-plane response is fatal (the caller should
/// abort the process), while any other disconnection just retries.
pub async fn run_with_reconnect(
    client: Arc<dyn UpstreamClient>,
    handler: Arc<AutoConfigHandler>,
    max_backoff: Duration,
) -> UpstreamClientError {
    let mut backoff = Duration::from_millis(500);
    loop {
        match client.run(handler.clone()).await {
            Ok(()) => unreachable!("run() only returns via Err"),
            Err(UpstreamClientError::Unauthorized) => return UpstreamClientError::Unauthorized,
            Err(e) => {
                tracing::warn!(error = %e, backoff_ms = backoff.as_millis(), "auto-config stream disconnected, reconnecting");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}
