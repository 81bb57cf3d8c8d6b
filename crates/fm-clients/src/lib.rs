pub mod agent;
pub mod code_host;
pub mod retry;

pub use agent::{AgentApi, AgentPage, AgentSnapshot, HttpAgentApi, LaunchRequest, RemoteStatus};
pub use code_host::{CodeHost, HttpCodeHost, PrRef, ReviewSummary, ReviewerComment};
pub use retry::RetryPolicy;

use thiserror::Error;

/// Failure classification shared by both external clients. `is_retryable`
/// decides what the bounded-backoff wrapper will attempt again: timeouts,
/// rate limits, connection errors, and 5xx responses. Everything else is a
/// terminal rejection surfaced immediately.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("client not configured")]
    Unavailable,
    #[error("request timed out")]
    Timeout,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("network error: {message}")]
    Network { message: String },
    #[error("decode error: {message}")]
    Decode { message: String },
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited { .. } | Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unavailable | Self::Decode { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_decode() {
            return Self::Decode {
                message: err.to_string(),
            };
        }
        Self::Network {
            message: err.to_string(),
        }
    }
}

pub(crate) async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(60);
        return ClientError::RateLimited { retry_after_secs };
    }
    let message = response.text().await.unwrap_or_default();
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}
