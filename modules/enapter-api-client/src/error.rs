use std::fmt;
use std::io;
use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Boxed error type used by transports for failures that fit no other bucket.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a [`Transport`](crate::Transport) before any HTTP
/// response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(BoxError),
}

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("create request: {0}")]
    Build(String),

    #[error("marshal body: {0}")]
    Marshal(#[source] serde_json::Error),

    #[error("do request: {0}")]
    Transport(#[from] TransportError),

    #[error("request failed with status {status}:{0}", status = .0.status_code)]
    Response(#[from] ResponseError),

    #[error("unmarshal response: {0}")]
    Unmarshal(#[source] serde_json::Error),

    #[error("read body: {0}")]
    Read(#[from] io::Error),
}

impl ClientError {
    /// The structured server rejection, if this error is one.
    #[must_use]
    pub fn response_error(&self) -> Option<&ResponseError> {
        match self {
            ClientError::Response(err) => Some(err),
            _ => None,
        }
    }

    /// Server-provided delay before the request may be retried.
    ///
    /// Returns `None` unless the server rejected the request and sent a
    /// non-zero `Retry-After` hint.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.response_error()
            .map(|err| err.retry_after)
            .filter(|delay| !delay.is_zero())
    }
}

/// A single error entry of a rejected request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

/// Normalized form of every non-2xx response returned by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseError {
    /// Error entries in the order the server sent them.
    pub errors: Vec<ErrorDetail>,
    pub status_code: StatusCode,
    /// Zero when the server sent no usable `Retry-After` header.
    pub retry_after: Duration,
}

#[derive(Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorDetail>,
}

impl ResponseError {
    /// Builds the error from the parts of a rejected response.
    ///
    /// The server's error list is kept as sent, even when empty. Bodies that
    /// are not `{"errors": [...]}` are turned into one synthesized entry.
    #[must_use]
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let errors = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) => parsed.errors,
            Err(_) => vec![fallback_detail(status, body)],
        };

        Self {
            errors,
            status_code: status,
            retry_after: parse_retry_after(headers),
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for detail in &self.errors {
            write!(f, "\n\t- {}: {}", detail.code, detail.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResponseError {}

fn fallback_detail(status: StatusCode, body: &[u8]) -> ErrorDetail {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_owned()
    } else {
        text.to_owned()
    };

    ErrorDetail {
        code: format!("http_{}", status.as_u16()),
        message,
        details: None,
    }
}

/// Reads `Retry-After` as delta-seconds or as an HTTP-date.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Duration {
    let Some(value) = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok()) else {
        return Duration::ZERO;
    };
    let value = value.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Duration::from_secs(secs);
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|at| at.duration_since(SystemTime::now()).ok())
        .unwrap_or(Duration::ZERO)
}
