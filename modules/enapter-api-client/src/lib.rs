//! Enapter HTTP API client
//!
//! Async client for listing devices, downloading blueprints and running
//! commands on devices, either waiting for the final result or following
//! progress line by line as the device reports it.
//!
//! Requests go through a [`Transport`]. The default stack is a pooled
//! `reqwest` client wrapped by decorators that add the authentication
//! headers; any layer can be replaced, for example with a test double.
//!
//! # Examples
//!
//! ## Execute a command
//!
//! ```no_run
//! use enapter_api_client::{Client, ClientConfig, CommandRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("https://api.enapter.com").with_auth_token("token");
//! let client = Client::from_config(&config)?;
//!
//! let request = CommandRequest::for_device("device-id", "set_limits")
//!     .with_argument("max_power", 3000);
//! let result = client.commands().execute(&request).await?;
//! println!("{:?}: {:?}", result.state, result.payload);
//! # Ok(())
//! # }
//! ```
//!
//! ## Follow progress
//!
//! ```no_run
//! use enapter_api_client::{CancellationToken, Client, CommandRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::from_env()?;
//! let cancel = CancellationToken::new();
//!
//! let request = CommandRequest::for_hardware("hardware-id", "firmware_update");
//! let mut progress = client
//!     .commands()
//!     .execute_with_progress(&request, cancel.clone())
//!     .await?;
//!
//! while let Some(event) = progress.recv().await {
//!     match event {
//!         Ok(result) => println!("{:?}", result.state),
//!         Err(err) => eprintln!("bad progress event: {err}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry hint
//!
//! ```no_run
//! use enapter_api_client::{Client, DevicesQuery};
//!
//! # async fn example(client: Client) {
//! match client.assets().devices(&DevicesQuery::default()).await {
//!     Ok(page) => println!("{} devices", page.devices.len()),
//!     Err(err) => {
//!         if let Some(wait) = err.retry_after() {
//!             tokio::time::sleep(wait).await;
//!         }
//!     }
//! }
//! # }
//! ```

mod assets;
mod blueprints;
mod client;
mod commands;
mod config;
mod error;
mod progress;
mod request;
mod response;
mod transport;

// Re-export public API
pub use assets::{
    AssetsApi, Device, DeviceByIdQuery, DeviceByIdResponse, DeviceConnectivity, DeviceType,
    DevicesQuery, DevicesResponse, ExpandDeviceParams,
};
pub use blueprints::BlueprintsApi;
pub use client::Client;
pub use commands::{CommandRequest, CommandResult, CommandState, CommandsApi};
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT};
pub use error::{BoxError, ClientError, ErrorDetail, ResponseError, TransportError};
pub use progress::{ProgressError, ProgressEvent, ProgressStream};
pub use request::Request;
pub use response::{BodyStream, Response};
pub use transport::{
    AUTH_TOKEN_HEADER, AUTH_USER_HEADER, AuthTokenTransport, AuthUserTransport, ReqwestTransport,
    Transport,
};

// Re-export commonly used types from dependencies
pub use http::{Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
