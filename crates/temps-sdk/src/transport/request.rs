//! Request primitives: beacon-style and request/response-style
//!
//! The strategy is resolved once from [`Capabilities`] when the transport is
//! built; `send` never branches on the environment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{MakeRequest, TransportRequest, TransportResponse};
use crate::error::{SdkError, TransportError};
use crate::options::Capabilities;

/// Largest payload a beacon accepts, matching browser `sendBeacon` quotas
pub const BEACON_MAX_PAYLOAD: usize = 64 * 1024;

const USER_AGENT: &str = concat!("temps-sdk-rust/", env!("CARGO_PKG_VERSION"));

/// Which request primitive a transport uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStrategy {
    /// One-shot, non-blocking submission; no response, no retry
    Beacon,
    /// Awaited request whose in-flight work survives the caller going away
    Fetch,
}

impl RequestStrategy {
    /// Beacon when available and nobody needs to inspect responses, fetch otherwise
    pub fn resolve(capabilities: &Capabilities) -> Self {
        if capabilities.beacon && !capabilities.response_required {
            RequestStrategy::Beacon
        } else {
            RequestStrategy::Fetch
        }
    }

    pub fn build(
        self,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Arc<dyn MakeRequest>, SdkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let endpoint = endpoint.into();

        Ok(match self {
            RequestStrategy::Beacon => Arc::new(BeaconRequest { client, endpoint }),
            RequestStrategy::Fetch => Arc::new(FetchRequest { client, endpoint }),
        })
    }
}

/// Fire-and-forget submission
///
/// The request is queued on the runtime and the call returns immediately with
/// an empty response. Only payloads over [`BEACON_MAX_PAYLOAD`] are refused.
pub struct BeaconRequest {
    client: reqwest::Client,
    endpoint: String,
}

impl BeaconRequest {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MakeRequest for BeaconRequest {
    fn destination(&self) -> &str {
        &self.endpoint
    }

    async fn make_request(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let size = request.payload.len();
        if size > BEACON_MAX_PAYLOAD {
            return Err(TransportError::BeaconRejected { size });
        }

        let submission = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(request.payload)
            .send();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = submission.await {
                debug!(endpoint = %endpoint, error = %e, "Beacon submission failed");
            }
        });

        Ok(TransportResponse::default())
    }
}

/// Awaited POST with keepalive semantics
///
/// The request runs on its own task, so dropping the caller's future does not
/// cancel an in-flight delivery.
pub struct FetchRequest {
    client: reqwest::Client,
    endpoint: String,
}

impl FetchRequest {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MakeRequest for FetchRequest {
    fn destination(&self) -> &str {
        &self.endpoint
    }

    async fn make_request(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let submission = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(request.payload)
            .send();

        let response = tokio::spawn(submission).await.map_err(|e| {
            if e.is_panic() {
                TransportError::Panicked(e.to_string())
            } else {
                TransportError::Network("request cancelled".to_string())
            }
        })??;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(TransportResponse {
            status_code: Some(status.as_u16()),
            error: None,
        })
    }
}
