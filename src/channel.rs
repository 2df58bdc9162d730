//! Client-side transport channel (C4): an HTTP connection abstraction offering
//! `post(path, body) -> (status, body)`.
//!
//! A `Channel` owns a connection to one `(host, port)` and may reuse it across
//! calls. It does not retry and does not attempt to parse bodies -- that's the
//! proxy/stub layer's job.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{RpcError, TransportErrorKind};

/// Single-owner HTTP connection to one endpoint. Cloning a `Channel` creates a
/// new underlying `reqwest::Client` connection-pool handle rather than sharing
/// one in-flight request; reuse across concurrent tasks otherwise requires one
/// `Channel` per task (SS5).
#[derive(Clone)]
pub struct Channel {
    endpoint: SocketAddr,
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl Channel {
    pub fn new(endpoint: SocketAddr) -> Self {
        Channel { endpoint, client: reqwest::Client::new(), timeout: None }
    }

    /// Apply a per-call deadline to every subsequent `post`. On expiry the
    /// pending call fails with `RpcError::Transport { kind: Timeout, .. }`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// `POST` `body` to `path` on this channel's endpoint, returning the
    /// response status and body bytes. Does not retry; does not interpret the
    /// body.
    #[tracing::instrument(level = "debug", skip(self, body), fields(endpoint = %self.endpoint, path))]
    pub async fn post(&self, path: &str, body: Vec<u8>) -> Result<(StatusCode, Bytes), RpcError> {
        let url = format!("http://{}{}", self.endpoint, path);
        debug!(%url, bytes = body.len(), "POST");

        let request = self.client.post(&url).body(body).send();

        let response = match self.timeout {
            Some(duration) => match tokio::time::timeout(duration, request).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%url, "call timed out");
                    return Err(RpcError::Transport { endpoint: self.endpoint, kind: TransportErrorKind::Timeout });
                }
            },
            None => request.await,
        };

        let response = response.map_err(|err| {
            let kind = if err.is_connect() {
                TransportErrorKind::Connect(err.to_string())
            } else if err.is_timeout() {
                TransportErrorKind::Timeout
            } else {
                TransportErrorKind::Write(err.to_string())
            };
            RpcError::Transport { endpoint: self.endpoint, kind }
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| RpcError::Transport {
            endpoint: self.endpoint,
            kind: TransportErrorKind::Read(err.to_string()),
        })?;

        Ok((status, body))
    }
}
