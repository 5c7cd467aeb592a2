//! Live progress of a command, read from a newline-delimited JSON body.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};

use crate::commands::CommandResult;
use crate::response::Response;

/// One unit of command progress: a decoded line or the reason it is missing.
pub type ProgressEvent = Result<CommandResult, ProgressError>;

#[derive(Debug, Error)]
pub enum ProgressError {
    /// The line is not a valid command result. The stream keeps going.
    #[error("unmarshal progress line: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// Reading the body failed or a line exceeded the length limit. Always
    /// the last event of a stream.
    #[error("read progress stream: {0}")]
    Read(#[from] io::Error),
}

/// Receiving side of a command progress stream.
///
/// A single background task owns the response body and produces the events.
/// It hands over one event at a time and reads the next line only after the
/// consumer received the previous event. The stream ends when the server closes the body, after
/// a read failure, or once the cancellation token fires. Dropping the stream
/// also stops the task.
#[derive(Debug)]
pub struct ProgressStream {
    events: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
}

impl ProgressStream {
    pub(crate) fn spawn(response: Response, cancel: CancellationToken) -> Self {
        let (tx, events) = mpsc::channel(1);
        tokio::spawn(
            read_progress(response.into_reader(), tx, cancel.clone()).instrument(Span::current()),
        );
        Self { events, cancel }
    }

    /// Receive the next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if self.cancel.is_cancelled() {
            self.events.close();
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.events.close();
                None
            }
            event = self.events.recv() => event,
        }
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            this.events.close();
            return Poll::Ready(None);
        }
        this.events.poll_recv(cx)
    }
}

/// Longest progress line accepted; a longer one ends the stream.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Body reader loop: one event per line until EOF, read failure,
/// cancellation or a dropped receiver. The reader is dropped (closing the
/// body) exactly once, when this function returns.
///
/// After each event the loop waits until the consumer has taken it before
/// reading on, so no line is read ahead of the consumer.
async fn read_progress<R>(reader: R, tx: mpsc::Sender<ProgressEvent>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(
        reader,
        AnyDelimiterCodec::new_with_max_length(vec![b'\n'], Vec::new(), MAX_LINE_LEN),
    );
    let mut delivered = 0_usize;

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(delivered, "progress stream cancelled");
                break;
            }
            frame = lines.next() => frame,
        };

        let (event, last) = match frame {
            Some(Ok(line)) => (decode_line(&line), false),
            None => {
                debug!(delivered, "progress stream closed by server");
                break;
            }
            Some(Err(err)) => {
                let err = match err {
                    AnyDelimiterCodecError::Io(err) => err,
                    AnyDelimiterCodecError::MaxChunkLengthExceeded => io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("progress line longer than {MAX_LINE_LEN} bytes"),
                    ),
                };
                warn!(error = %err, delivered, "progress stream read failed");
                (Err(ProgressError::Read(err)), true)
            }
        };

        if let Err(err) = &event {
            debug!(error = %err, "forwarding undecodable progress event");
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(delivered, "progress stream cancelled");
                break;
            }
            sent = tx.send(event) => {
                if sent.is_err() {
                    debug!(delivered, "progress receiver dropped");
                    break;
                }
                delivered += 1;
            }
        }

        if last {
            break;
        }

        // The slot frees up only once the consumer received the event.
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(delivered, "progress stream cancelled");
                break;
            }
            permit = tx.reserve() => {
                if permit.is_err() {
                    debug!(delivered, "progress receiver dropped");
                    break;
                }
            }
        }
    }
}

/// Decode one line. Every line yields an event, a blank one included.
fn decode_line(line: &[u8]) -> ProgressEvent {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    serde_json::from_slice(line).map_err(|source| ProgressError::Decode {
        line: String::from_utf8_lossy(line).into_owned(),
        source,
    })
}
