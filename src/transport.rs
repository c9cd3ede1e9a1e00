//! Timed HTTP POST transport.
//!
//! Thin wrapper around a pooled `reqwest::Client`: every call is a JSON POST
//! with a per-call deadline, and every outcome is either a raw status+body
//! pair or a classified [`BeaconError`]. Nothing above this layer touches
//! `reqwest` types.

use std::time::{Duration, Instant};

use log::debug;
use reqwest::Client;
use serde_json::Value;

use crate::elapsed_ms;
use crate::error::BeaconError;
use crate::types::SyncType;

/// Raw response before any contract mapping.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Pooled HTTP transport scoped to one API base URL.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build the transport. No global timeout is set on the client; every
    /// call carries its own operation-specific deadline.
    pub fn new(base_url: &str) -> Result<Self, BeaconError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| BeaconError::Network {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one timed JSON POST. `sync_type`, when present, travels as the
    /// `X-Sync-Type` header. The full body is read before returning so the
    /// deadline bounds the entire exchange as seen by callers.
    pub async fn post_json(
        &self,
        endpoint: &str,
        token: &str,
        body: &Value,
        deadline: Duration,
        sync_type: Option<SyncType>,
    ) -> Result<RawResponse, BeaconError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let started = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .timeout(deadline)
            .json(body);
        if let Some(sync_type) = sync_type {
            request = request.header("X-Sync-Type", sync_type.as_header_value());
        }

        let response = request
            .send()
            .await
            .map_err(|e| BeaconError::from_send_error(&e, deadline))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BeaconError::Timeout {
                    seconds: deadline.as_secs(),
                }
            } else {
                BeaconError::Network {
                    message: format!("body read failed: {e}"),
                }
            }
        })?;

        debug!(
            "[Transport] POST {} -> {} ({} bytes, {} ms)",
            endpoint,
            status,
            body.len(),
            elapsed_ms(started)
        );

        Ok(RawResponse { status, body })
    }
}
