//! Shared plumbing for outbound calls to the embedding, vector index, and chat services.
//!
//! Every call goes through [`send_json`], which applies the per-call wall-clock budget and
//! maps failures onto [`UpstreamError`]. Dropping the in-flight future on expiry aborts the
//! request.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Coarse failure classification used for logging, metrics, and fallback selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An external call exceeded its time budget.
    Timeout,
    /// An external call failed or returned a non-success status.
    ServiceError,
    /// A response did not match the expected shape.
    MalformedResponse,
}

impl FailureKind {
    /// Stable identifier used in logs and API payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ServiceError => "service_error",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

/// Errors returned by outbound HTTP calls.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The call did not complete within its budget.
    #[error("{service} request timed out after {}s", .after.as_secs())]
    Timeout {
        /// Name of the remote service.
        service: &'static str,
        /// Budget that expired.
        after: Duration,
    },
    /// HTTP layer failed before a response was received.
    #[error("{service} request failed: {source}")]
    Transport {
        /// Name of the remote service.
        service: &'static str,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The service responded with a non-success status code.
    #[error("{service} responded with {status}: {body}")]
    Service {
        /// Name of the remote service.
        service: &'static str,
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The response body could not be decoded into the expected shape.
    #[error("{service} returned a malformed response: {detail}")]
    MalformedResponse {
        /// Name of the remote service.
        service: &'static str,
        /// Decoder diagnostic.
        detail: String,
    },
}

impl UpstreamError {
    /// Map the error onto the coarse failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Transport { .. } | Self::Service { .. } => FailureKind::ServiceError,
            Self::MalformedResponse { .. } => FailureKind::MalformedResponse,
        }
    }

    /// Description shown to end users; response bodies stay in the logs.
    pub fn summary(&self) -> String {
        match self {
            Self::Transport { service, .. } => format!("{service} request failed"),
            Self::Service {
                service, status, ..
            } => format!("{service} responded with {status}"),
            other => other.to_string(),
        }
    }

    /// Build a malformed-response error for the named service.
    pub fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service,
            detail: detail.into(),
        }
    }
}

/// Run a future under a wall-clock budget, mapping expiry to [`UpstreamError::Timeout`].
pub async fn with_timeout<T, F>(
    service: &'static str,
    budget: Duration,
    future: F,
) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(service, budget_secs = budget.as_secs(), "Upstream call timed out");
            Err(UpstreamError::Timeout {
                service,
                after: budget,
            })
        }
    }
}

/// Send a prepared request and decode a JSON body, all within `budget`.
pub async fn send_json<T>(
    service: &'static str,
    budget: Duration,
    request: RequestBuilder,
) -> Result<T, UpstreamError>
where
    T: DeserializeOwned,
{
    with_timeout(service, budget, async move {
        let response = request
            .send()
            .await
            .map_err(|source| transport_error(service, budget, source))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = UpstreamError::Service {
                service,
                status,
                body,
            };
            tracing::error!(error = %error, "Upstream request failed");
            return Err(error);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| transport_error(service, budget, source))?;
        serde_json::from_slice(&bytes)
            .map_err(|error| UpstreamError::malformed(service, error.to_string()))
    })
    .await
}

fn transport_error(service: &'static str, budget: Duration, source: reqwest::Error) -> UpstreamError {
    if source.is_timeout() {
        UpstreamError::Timeout {
            service,
            after: budget,
        }
    } else {
        UpstreamError::Transport { service, source }
    }
}

/// Join a base URL and a relative path without doubling slashes.
pub fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
