use std::time::Duration;

use secrecy::SecretString;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "https://api.enapter.com";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`Client`](crate::Client)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `X-Enapter-Auth-User` when set.
    pub auth_user: Option<String>,
    /// Sent as `X-Enapter-Auth-Token` when set.
    pub auth_token: Option<SecretString>,
    pub connect_timeout: Duration,
    /// Whole-exchange timeout, body included. Unset by default so progress
    /// streams can stay open as long as the command runs.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            auth_user: None,
            auth_token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `base_url` with no credentials.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Reads:
    /// - `ENAPTER_API_URL`: base URL (default: `https://api.enapter.com`)
    /// - `ENAPTER_API_TOKEN`: API token (optional)
    /// - `ENAPTER_API_USER`: user to act on behalf of (optional)
    /// - `ENAPTER_API_TIMEOUT`: overall timeout such as `30s` (optional)
    /// - `ENAPTER_API_CONNECT_TIMEOUT`: connect timeout (default: `10s`)
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] when a timeout value cannot be parsed.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url =
            std::env::var("ENAPTER_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let auth_token = non_empty_var("ENAPTER_API_TOKEN").map(SecretString::from);
        let auth_user = non_empty_var("ENAPTER_API_USER");
        let timeout = duration_var("ENAPTER_API_TIMEOUT")?;
        let connect_timeout =
            duration_var("ENAPTER_API_CONNECT_TIMEOUT")?.unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        Ok(Self {
            base_url,
            auth_user,
            auth_token,
            connect_timeout,
            timeout,
        })
    }

    /// Act on behalf of `user`.
    #[must_use]
    pub fn with_auth_user(mut self, user: impl Into<String>) -> Self {
        self.auth_user = Some(user.into());
        self
    }

    /// Authenticate with `token`.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(SecretString::from(token.into()));
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn duration_var(name: &str) -> Result<Option<Duration>, ClientError> {
    non_empty_var(name)
        .map(|raw| {
            humantime::parse_duration(raw.trim())
                .map_err(|e| ClientError::Config(format!("invalid {name}: {e}")))
        })
        .transpose()
}
