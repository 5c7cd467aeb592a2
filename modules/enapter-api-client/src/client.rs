use std::sync::Arc;

use http::Method;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::assets::AssetsApi;
use crate::blueprints::BlueprintsApi;
use crate::commands::CommandsApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, ResponseError};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{AuthTokenTransport, AuthUserTransport, ReqwestTransport, Transport};

/// Entry point of the SDK.
///
/// Holds the API base URL and the transport stack. Cheap to clone; clones
/// share the transport (and its connection pool).
#[derive(Clone)]
pub struct Client {
    base_url: Url,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client that sends every request through `transport`.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] if `base_url` is not an absolute URL.
    pub fn new<T: Transport + 'static>(base_url: &str, transport: T) -> Result<Self, ClientError> {
        Self::with_shared_transport(base_url, Arc::new(transport))
    }

    /// Like [`Client::new`] but for an already shared transport stack.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] if `base_url` is not an absolute URL.
    pub fn with_shared_transport(
        base_url: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }

        Ok(Self {
            base_url,
            transport,
        })
    }

    /// Build the default `reqwest` transport and wrap it with the auth
    /// decorators the configuration asks for.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] for an invalid base URL and
    /// [`ClientError::Build`] when the transport or a credential header
    /// cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
            config.connect_timeout,
            config.timeout,
        )?);
        if let Some(user) = &config.auth_user {
            transport = Arc::new(AuthUserTransport::new(transport, user)?);
        }
        if let Some(token) = &config.auth_token {
            transport = Arc::new(AuthTokenTransport::new(transport, token)?);
        }

        Self::with_shared_transport(&config.base_url, transport)
    }

    /// Create a client from `ENAPTER_API_*` environment variables.
    ///
    /// # Errors
    /// See [`ClientConfig::from_env`] and [`Client::from_config`].
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_config(&ClientConfig::from_env()?)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Command execution API.
    #[must_use]
    pub fn commands(&self) -> CommandsApi<'_> {
        CommandsApi::new(self)
    }

    /// Devices API.
    #[must_use]
    pub fn assets(&self) -> AssetsApi<'_> {
        AssetsApi::new(self)
    }

    /// Blueprints API.
    #[must_use]
    pub fn blueprints(&self) -> BlueprintsApi<'_> {
        BlueprintsApi::new(self)
    }

    /// Build a request for `path` relative to the base URL.
    ///
    /// The path is appended to the base URL as is, so a base URL with a path
    /// prefix (`https://host/gateway`) keeps it.
    ///
    /// # Errors
    /// Returns [`ClientError::Build`] if the resulting URL is malformed.
    pub fn new_request(&self, method: Method, path: &str) -> Result<Request, ClientError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let separator = if path.starts_with('/') { "" } else { "/" };
        let url = Url::parse(&format!("{base}{separator}{path}"))
            .map_err(|e| ClientError::Build(format!("invalid path {path:?}: {e}")))?;

        Ok(Request::new(method, url))
    }

    /// Send `request` and hand back successful responses with the body unread.
    ///
    /// # Errors
    /// [`ClientError::Transport`] when no response was received and
    /// [`ClientError::Response`] for any non-2xx status.
    #[instrument(skip_all, fields(method = %request.method(), path = request.url().path()))]
    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let response = self.transport.send(request).await?;
        let status = response.status();
        if status.is_success() {
            debug!(%status, "request succeeded");
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to read error response body");
                bytes::Bytes::new()
            }
        };

        let err = ResponseError::from_response(status, &headers, &body);
        warn!(
            %status,
            retry_after_secs = err.retry_after.as_secs(),
            errors = err.errors.len(),
            "request rejected by server"
        );
        Err(err.into())
    }
}
