// StreamRelay - lifecycle of a single download
//
// Starting -> Streaming -> Completed
//     |           |
//     +-> Failed  +-> Failed | Aborted
//
// A session holds a concurrency permit and the extractor handle. Both are
// released on entry to a terminal state and, failing that, on drop. Bytes
// are pulled from the extractor only when the consumer asks for the next
// chunk, so a slow client slows the extractor down through the pipe.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

use super::errors::ExtractionError;
use super::extractors::{ByteStream, Extractor, StreamHandle};
use super::models::MediaRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Starting,
    Streaming,
    Completed,
    Failed,
    Aborted,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Too many downloads in progress (limit {limit})")]
    AtCapacity { limit: usize },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Concurrent sessions; further requests are rejected
    pub max_sessions: usize,
    /// Longest wait for the next chunk, including the first one
    pub idle_timeout: Duration,
    /// How long to wait for the extractor to exit after end of output
    pub exit_grace: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            idle_timeout: Duration::from_secs(60),
            exit_grace: Duration::from_secs(5),
        }
    }
}

pub struct StreamRelay {
    extractor: Arc<dyn Extractor>,
    slots: Arc<Semaphore>,
    settings: RelaySettings,
}

impl StreamRelay {
    pub fn new(extractor: Arc<dyn Extractor>, settings: RelaySettings) -> Self {
        Self {
            extractor,
            slots: Arc::new(Semaphore::new(settings.max_sessions)),
            settings,
        }
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Open a session and wait for its first chunk.
    ///
    /// Returns only once bytes are flowing (or the stream ended cleanly), so
    /// the caller can still answer with an error status on failure.
    pub async fn start(&self, request: MediaRequest) -> Result<RelaySession, RelayError> {
        let permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| RelayError::AtCapacity {
                limit: self.settings.max_sessions,
            })?;

        let mut session = RelaySession {
            id: Uuid::new_v4(),
            request,
            state: RelayState::Starting,
            bytes: None,
            handle: None,
            pending: None,
            bytes_sent: 0,
            permit: Some(permit),
            settings: self.settings.clone(),
            span: tracing::Span::current(),
        };
        tracing::info!(
            session = %session.id,
            url = %session.request.url(),
            rendition = session.request.rendition().unwrap_or("best"),
            extractor = self.extractor.name(),
            "Relay starting"
        );

        let opened = timeout(
            self.settings.idle_timeout,
            self.extractor.open_stream(&session.request),
        )
        .await;
        let media = match opened {
            Ok(Ok(media)) => media,
            Ok(Err(e)) => return Err(session.fail_before_bytes(e).into()),
            Err(_) => {
                let err = ExtractionError::ExtractionTimeout(self.settings.idle_timeout);
                return Err(session.fail_before_bytes(err).into());
            }
        };
        session.handle = Some(media.handle);
        let mut bytes = media.bytes;

        match timeout(self.settings.idle_timeout, bytes.next()).await {
            Ok(Some(Ok(chunk))) => {
                session.bytes = Some(bytes);
                session.pending = Some(chunk);
                session.transition(RelayState::Streaming);
                Ok(session)
            }
            Ok(Some(Err(e))) => {
                let err = ExtractionError::failed(format!("Failed to read media stream: {}", e));
                Err(session.fail_before_bytes(err).into())
            }
            Ok(None) => {
                // End of output before any byte: the exit status decides
                drop(bytes);
                match session.wait_for_exit().await {
                    Ok(()) => {
                        session.transition(RelayState::Completed);
                        Ok(session)
                    }
                    Err(e) => Err(session.fail_before_bytes(e).into()),
                }
            }
            Err(_) => {
                let err = ExtractionError::ExtractionTimeout(self.settings.idle_timeout);
                Err(session.fail_before_bytes(err).into())
            }
        }
    }
}

/// One in-flight download. Not shared; dropping it before the end of the
/// stream aborts the extractor.
pub struct RelaySession {
    id: Uuid,
    request: MediaRequest,
    state: RelayState,
    bytes: Option<ByteStream>,
    handle: Option<Box<dyn StreamHandle>>,
    /// First chunk, read while starting
    pending: Option<Bytes>,
    bytes_sent: u64,
    permit: Option<OwnedSemaphorePermit>,
    settings: RelaySettings,
    /// Span of the request that started the session; the body is polled
    /// after the handler has returned
    span: tracing::Span,
}

impl RelaySession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &MediaRequest {
        &self.request
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Next chunk for the consumer. `None` once the session is terminal.
    ///
    /// A read error or idle timeout fails the session and is returned as an
    /// `io::Error` so the HTTP layer aborts the connection.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        if let Some(chunk) = self.pending.take() {
            self.bytes_sent += chunk.len() as u64;
            return Some(Ok(chunk));
        }
        if self.state.is_terminal() {
            return None;
        }

        let idle_timeout = self.settings.idle_timeout;
        let bytes = self.bytes.as_mut()?;

        match timeout(idle_timeout, bytes.next()).await {
            Ok(Some(Ok(chunk))) => {
                self.bytes_sent += chunk.len() as u64;
                Some(Ok(chunk))
            }
            Ok(Some(Err(e))) => {
                tracing::error!(session = %self.id, error = %e, bytes_sent = self.bytes_sent, "Media stream read failed");
                self.transition(RelayState::Failed);
                Some(Err(e))
            }
            Ok(None) => {
                self.bytes = None;
                if let Err(e) = self.wait_for_exit().await {
                    // Headers and bytes are already out; nothing left to report to the client
                    tracing::warn!(
                        session = %self.id,
                        error = %e,
                        bytes_sent = self.bytes_sent,
                        "Extractor exited with an error after streaming"
                    );
                }
                self.transition(RelayState::Completed);
                None
            }
            Err(_) => {
                tracing::error!(
                    session = %self.id,
                    idle_timeout_secs = idle_timeout.as_secs(),
                    bytes_sent = self.bytes_sent,
                    "No media data within idle timeout"
                );
                self.transition(RelayState::Failed);
                Some(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    ExtractionError::ExtractionTimeout(idle_timeout),
                )))
            }
        }
    }

    /// Consume the session as a byte stream for a response body.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        futures::stream::unfold(self, |mut session| {
            let span = session.span.clone();
            async move { session.next_chunk().await.map(|item| (item, session)) }.instrument(span)
        })
    }

    async fn wait_for_exit(&mut self) -> Result<(), ExtractionError> {
        match self.handle.as_mut() {
            Some(handle) => handle.finish(self.settings.exit_grace).await,
            None => Ok(()),
        }
    }

    fn fail_before_bytes(mut self, err: ExtractionError) -> ExtractionError {
        tracing::error!(
            session = %self.id,
            url = %self.request.url(),
            error = %err,
            reason = ?err.reason(),
            "Relay failed before streaming"
        );
        if let Some(diagnostic) = err.diagnostic() {
            tracing::debug!(session = %self.id, "Extractor output:\n{}", diagnostic);
        }
        self.transition(RelayState::Failed);
        err
    }

    /// Move to `next`. Entering a terminal state releases the extractor
    /// and the permit; a second terminal state is ignored.
    fn transition(&mut self, next: RelayState) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "Relay state");
        self.state = next;

        match next {
            RelayState::Completed => tracing::info!(
                session = %self.id,
                bytes_sent = self.bytes_sent,
                "Relay completed"
            ),
            RelayState::Aborted => tracing::info!(
                session = %self.id,
                bytes_sent = self.bytes_sent,
                "Client disconnected, extractor terminated"
            ),
            _ => {}
        }

        if next.is_terminal() {
            self.release();
        }
    }

    fn release(&mut self) {
        self.pending = None;
        self.bytes = None;
        if let Some(mut handle) = self.handle.take() {
            handle.terminate();
        }
        self.permit = None;
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        let _entered = self.span.clone().entered();
        self.transition(RelayState::Aborted);
    }
}

impl fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("bytes_sent", &self.bytes_sent)
            .finish()
    }
}
