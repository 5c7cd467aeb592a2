use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::client::Client;
use crate::error::ClientError;
use crate::progress::ProgressStream;
use crate::response::Response;

const EXECUTE_PATH: &str = "/commands/v1/execute";
const SHOW_PROGRESS_PARAM: &str = "show_progress";

/// Command to run on a device, addressed either by device ID or hardware ID.
///
/// Which identifier is meaningful is validated by the server, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
    pub command_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

impl CommandRequest {
    #[must_use]
    pub fn for_device(device_id: impl Into<String>, command_name: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            command_name: command_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_hardware(hardware_id: impl Into<String>, command_name: impl Into<String>) -> Self {
        Self {
            hardware_id: Some(hardware_id.into()),
            command_name: command_name.into(),
            ..Self::default()
        }
    }

    /// Add one argument, keeping insertion order.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = Some(arguments);
        self
    }
}

/// Lifecycle state reported for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Succeeded,
    Error,
    PlatformError,
    Started,
    DeviceInProgress,
}

impl CommandState {
    /// `true` for states after which no further progress is reported.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandState::Succeeded | CommandState::Error | CommandState::PlatformError
        )
    }
}

/// Outcome (or interim progress) of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub state: CommandState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
}

/// Command execution API, obtained from [`Client::commands`].
#[derive(Debug, Clone, Copy)]
pub struct CommandsApi<'a> {
    client: &'a Client,
}

impl<'a> CommandsApi<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Run a command and wait for its final result.
    ///
    /// # Errors
    /// Fails on request construction, transport failure, server rejection
    /// ([`ClientError::Response`]) or an undecodable response body.
    #[instrument(skip_all, fields(command = %request.command_name))]
    pub async fn execute(&self, request: &CommandRequest) -> Result<CommandResult, ClientError> {
        let response = self.send(request, false).await?;
        let result: CommandResult = response.json().await?;

        debug!(state = ?result.state, "command executed");
        Ok(result)
    }

    /// Run a command and follow its progress as it happens.
    ///
    /// Returns as soon as the server accepted the request. Progress events
    /// are then read in a background task, one per line of the response, and
    /// delivered through the returned stream in the order the server sent
    /// them. Cancelling `cancel` stops the task and closes the stream.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Fails, without starting the stream, on request construction, transport
    /// failure or server rejection.
    #[instrument(skip_all, fields(command = %request.command_name))]
    pub async fn execute_with_progress(
        &self,
        request: &CommandRequest,
        cancel: CancellationToken,
    ) -> Result<ProgressStream, ClientError> {
        let response = self.send(request, true).await?;

        debug!("streaming command progress");
        Ok(ProgressStream::spawn(response, cancel))
    }

    async fn send(
        &self,
        request: &CommandRequest,
        show_progress: bool,
    ) -> Result<Response, ClientError> {
        let mut req = self
            .client
            .new_request(Method::POST, EXECUTE_PATH)?
            .with_json(request)?;
        if show_progress {
            req.set_query_param(SHOW_PROGRESS_PARAM, "true");
        }

        self.client.send(&req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::Stream;
    use http::{HeaderMap, StatusCode};
    use serde_json::json;

    use crate::error::TransportError;
    use crate::request::Request;
    use crate::response::BodyStream;
    use crate::transport::Transport;

    #[test]
    fn test_request_omits_absent_fields() {
        let request = CommandRequest::for_device("dev-1", "ping");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"device_id": "dev-1", "command_name": "ping"})
        );

        let request = CommandRequest::for_hardware("hw-9", "reboot");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"hardware_id": "hw-9", "command_name": "reboot"})
        );
    }

    #[test]
    fn test_arguments_keep_insertion_order() {
        let request = CommandRequest::for_device("dev-1", "set_limits")
            .with_argument("zeta", 1)
            .with_argument("alpha", json!({"nested": [1, 2]}))
            .with_argument("mid", "x");

        let encoded = serde_json::to_string(&request).unwrap();
        assert_eq!(
            encoded,
            r#"{"device_id":"dev-1","command_name":"set_limits","arguments":{"zeta":1,"alpha":{"nested":[1,2]},"mid":"x"}}"#
        );
    }

    #[test]
    fn test_state_wire_names() {
        let cases = [
            ("succeeded", CommandState::Succeeded, true),
            ("error", CommandState::Error, true),
            ("platform_error", CommandState::PlatformError, true),
            ("started", CommandState::Started, false),
            ("device_in_progress", CommandState::DeviceInProgress, false),
        ];
        for (wire, state, terminal) in cases {
            let decoded: CommandState = serde_json::from_value(json!(wire)).unwrap();
            assert_eq!(decoded, state);
            assert_eq!(state.is_terminal(), terminal, "{wire}");
        }
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let result = serde_json::from_str::<CommandResult>(r#"{"state":"paused"}"#);
        assert!(result.is_err());
    }

    /// Answers every request with `body` and counts how often a body was dropped.
    struct OneShot {
        body: &'static str,
        drops: Arc<AtomicUsize>,
    }

    struct CountedBody {
        inner: BodyStream,
        drops: Arc<AtomicUsize>,
    }

    impl Stream for CountedBody {
        type Item = Result<Bytes, io::Error>;

        fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.get_mut().inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for CountedBody {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for OneShot {
        async fn send(&self, _request: &Request) -> Result<Response, TransportError> {
            let body = CountedBody {
                inner: Response::from_bytes(StatusCode::OK, HeaderMap::new(), self.body)
                    .into_stream(),
                drops: self.drops.clone(),
            };
            Ok(Response::new(StatusCode::OK, HeaderMap::new(), Box::pin(body)))
        }
    }

    fn one_shot(body: &'static str) -> (Client, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let client = Client::new(
            "http://localhost:8080",
            OneShot {
                body,
                drops: drops.clone(),
            },
        )
        .unwrap();
        (client, drops)
    }

    #[tokio::test]
    async fn test_execute_closes_body_once() {
        let (client, drops) = one_shot(r#"{"state":"succeeded"}"#);
        let request = CommandRequest::for_device("dev-1", "ping");

        let result = client.commands().execute(&request).await.unwrap();
        assert_eq!(result.state, CommandState::Succeeded);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_closes_body_on_decode_failure() {
        let (client, drops) = one_shot("not json");
        let request = CommandRequest::for_device("dev-1", "ping");

        let err = client.commands().execute(&request).await.unwrap_err();
        assert!(matches!(err, ClientError::Unmarshal(_)));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_result_payload_optional() {
        let result: CommandResult = serde_json::from_str(r#"{"state":"started"}"#).unwrap();
        assert_eq!(result.state, CommandState::Started);
        assert!(result.payload.is_none());

        let result: CommandResult =
            serde_json::from_str(r#"{"state":"succeeded","payload":{"uptime":42}}"#).unwrap();
        assert_eq!(result.payload.unwrap()["uptime"], 42);
    }
}
