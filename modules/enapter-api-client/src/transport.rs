use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use http::{HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ClientError, TransportError};
use crate::request::Request;
use crate::response::Response;

/// Header carrying the user identity the request is made on behalf of.
pub static AUTH_USER_HEADER: HeaderName = HeaderName::from_static("x-enapter-auth-user");

/// Header carrying the API token.
pub static AUTH_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-enapter-auth-token");

/// Sends a fully built request and returns the response with its body unread.
///
/// Implementations must treat `request` as read-only: the same value may be
/// reused by the caller for a retry or read concurrently elsewhere.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}

/// Transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with its own connection pool.
    ///
    /// `timeout` bounds the whole exchange, body included, so leave it unset
    /// when progress streams are expected to outlive it.
    ///
    /// # Errors
    /// Returns [`ClientError::Build`] if the underlying client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new(connect_timeout: Duration, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Reuse an existing `reqwest` client.
    #[must_use]
    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let mut req_builder = self
            .http_client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if !request.body().is_empty() {
            req_builder = req_builder.body(request.body().clone());
        }

        let resp = req_builder
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else if e.is_connect() {
                    TransportError::Connection(e.to_string())
                } else {
                    TransportError::Other(Box::new(e))
                }
            })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let stream = resp.bytes_stream().map_err(std::io::Error::other);

        Ok(Response::new(status, headers, Box::pin(stream)))
    }
}

/// Copy the request and set one header on the copy.
fn with_header(request: &Request, name: &HeaderName, value: &HeaderValue) -> Request {
    let mut decorated = request.clone();
    decorated.headers_mut().insert(name.clone(), value.clone());
    decorated
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::Build(format!("invalid {what} header value: {e}")))
}

/// Decorator that sets [`AUTH_USER_HEADER`] on every request it forwards.
#[derive(Debug, Clone)]
pub struct AuthUserTransport<T> {
    user: HeaderValue,
    next: T,
}

impl<T: Transport> AuthUserTransport<T> {
    /// # Errors
    /// Returns [`ClientError::Build`] if `user` is not a valid header value.
    pub fn new(next: T, user: &str) -> Result<Self, ClientError> {
        Ok(Self {
            user: header_value(user, "auth user")?,
            next,
        })
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthUserTransport<T> {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let decorated = with_header(request, &AUTH_USER_HEADER, &self.user);
        self.next.send(&decorated).await
    }
}

/// Decorator that sets [`AUTH_TOKEN_HEADER`] on every request it forwards.
#[derive(Clone)]
pub struct AuthTokenTransport<T> {
    token: HeaderValue,
    next: T,
}

impl<T: Transport> AuthTokenTransport<T> {
    /// The token is marked sensitive so it never shows up in header dumps.
    ///
    /// # Errors
    /// Returns [`ClientError::Build`] if `token` is not a valid header value.
    pub fn new(next: T, token: &SecretString) -> Result<Self, ClientError> {
        let mut token = header_value(token.expose_secret(), "auth token")?;
        token.set_sensitive(true);
        Ok(Self { token, next })
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for AuthTokenTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokenTransport")
            .field("token", &"[REDACTED]")
            .field("next", &self.next)
            .finish()
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthTokenTransport<T> {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let decorated = with_header(request, &AUTH_TOKEN_HEADER, &self.token);
        self.next.send(&decorated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method, StatusCode};
    use std::sync::Mutex;
    use url::Url;

    /// Records every request that reaches the end of the chain.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Request>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: &Request) -> Result<Response, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(Response::from_bytes(StatusCode::OK, HeaderMap::new(), "ok"))
        }
    }

    #[derive(Debug)]
    struct Failing;

    #[async_trait]
    impl Transport for Failing {
        async fn send(&self, _request: &Request) -> Result<Response, TransportError> {
            Err(TransportError::Connection("refused".into()))
        }
    }

    fn base_request() -> Request {
        Request::new(Method::GET, Url::parse("http://localhost/api/v1/devices").unwrap())
    }

    #[tokio::test]
    async fn test_user_then_token_sets_both_headers() {
        let recorder = Arc::new(Recorder::default());
        let chain = AuthTokenTransport::new(
            AuthUserTransport::new(recorder.clone(), "alice").unwrap(),
            &SecretString::from("t0ken".to_owned()),
        )
        .unwrap();

        let original = base_request();
        chain.send(&original).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].headers()[&AUTH_USER_HEADER], "alice");
        assert_eq!(seen[0].headers()[&AUTH_TOKEN_HEADER], "t0ken");
        assert!(seen[0].headers()[&AUTH_TOKEN_HEADER].is_sensitive());

        assert!(original.headers().is_empty());
    }

    #[tokio::test]
    async fn test_decorator_keeps_existing_headers() {
        let recorder = Arc::new(Recorder::default());
        let chain = AuthUserTransport::new(recorder.clone(), "bob").unwrap();

        let mut original = base_request();
        original
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("42"));
        chain.send(&original).await.unwrap();
        chain.send(&original).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for req in seen.iter() {
            assert_eq!(req.headers()["x-request-id"], "42");
            assert_eq!(req.headers()[&AUTH_USER_HEADER], "bob");
        }
        assert_eq!(original.headers().len(), 1);
        assert!(!original.headers().contains_key(&AUTH_USER_HEADER));
    }

    #[tokio::test]
    async fn test_inner_decorator_overrides_outer_value() {
        let recorder = Arc::new(Recorder::default());
        let chain = AuthUserTransport::new(
            AuthUserTransport::new(recorder.clone(), "inner").unwrap(),
            "outer",
        )
        .unwrap();

        chain.send(&base_request()).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].headers()[&AUTH_USER_HEADER], "inner");
        assert_eq!(seen[0].headers().get_all(&AUTH_USER_HEADER).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_errors_propagate_verbatim() {
        let chain = AuthUserTransport::new(Failing, "alice").unwrap();
        let err = chain.send(&base_request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(ref msg) if msg == "refused"));
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let err = AuthUserTransport::new(Failing, "line\nbreak").unwrap_err();
        assert!(matches!(err, ClientError::Build(_)));
    }

    #[test]
    fn test_token_redacted_in_debug() {
        #[derive(Debug)]
        struct Inner;
        #[async_trait]
        impl Transport for Inner {
            async fn send(&self, _request: &Request) -> Result<Response, TransportError> {
                Err(TransportError::Timeout("never".into()))
            }
        }

        let transport = AuthTokenTransport::new(Inner, &SecretString::from("s3cret".to_owned())).unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("s3cret"));
    }
}
