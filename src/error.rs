//! Typed failures surfaced by the stop fetcher.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The requested center or radius is unusable.
    #[error("invalid search area: {0}")]
    InvalidArea(String),

    /// Upstream answered with a status that retrying will not fix.
    #[error("Overpass rejected the query with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// The response body was not the JSON we expected.
    #[error("failed to decode Overpass response: {0}")]
    Decode(String),

    /// Every attempt failed with a transient error.
    #[error("Overpass request failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("failed to build Overpass request: {0}")]
    Request(String),
}

impl FetchError {
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode(message.into())
    }

    /// Short machine-readable label, used in log fields and summary rows.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidArea(_) => "invalid_area",
            FetchError::Rejected { .. } => "rejected",
            FetchError::Decode(_) => "decode_error",
            FetchError::Exhausted { .. } => "fetch_error",
            FetchError::Request(_) => "request_error",
        }
    }
}

/// Statuses worth retrying: rate limiting and gateway/server hiccups.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Network-level failures worth retrying.
pub fn is_transient_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_error_kind_labels() {
        let err = FetchError::Exhausted {
            attempts: 3,
            last: "timeout".to_string(),
        };
        assert_eq!(err.kind(), "fetch_error");
        assert!(err.to_string().contains("3 attempts"));

        let err = FetchError::Rejected {
            status: StatusCode::BAD_REQUEST,
            body: "parse error".to_string(),
        };
        assert_eq!(err.kind(), "rejected");
        assert!(err.to_string().contains("400"));
    }
}
