//! Per-peer protocol state machine.
//!
//! A session starts in `Authenticating` and must present a valid `'A'` frame
//! before anything else. After the `'Y'` response it moves to `Streaming`,
//! where every `'I'` payload is handed to the sink. Any deviation ends the
//! session; a queued `'N'` is flushed best-effort on the way out.

use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::protocol::{self, Frame, FrameType, Identity, AUTH_OK, AUTH_REJECTED};
use crate::storage::ScreenshotSink;

#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    #[error("authentication failed: {0}")]
    AuthRejected(protocol::Error),
    #[error("expected auth frame, got {0:?}")]
    ExpectedAuthFrame(FrameType),
    #[error("auth frame received while already streaming")]
    UnexpectedAuthFrame,
    #[error("frame error: {0}")]
    Frame(#[from] protocol::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

enum Phase {
    Authenticating,
    Streaming(Identity),
}

pub(crate) struct Session<S> {
    stream: S,
    peer: SocketAddr,
    read: BytesMut,
    write: BytesMut,
    phase: Phase,
    sink: ScreenshotSink,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub(crate) fn new(stream: S, peer: SocketAddr, sink: ScreenshotSink) -> Self {
        Self {
            stream,
            peer,
            read: BytesMut::new(),
            write: BytesMut::new(),
            phase: Phase::Authenticating,
            sink,
        }
    }

    /// Drive the session until the peer closes or a protocol/transport error
    /// ends it. An `Ok` return means the peer hung up.
    pub(crate) async fn run(mut self) -> Result<(), SessionError> {
        let result = self.drive().await;

        if result.is_err() {
            // The rejection byte may still be sitting in the write buffer.
            let _ = self.flush().await;
        }

        result
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        loop {
            if self.stream.read_buf(&mut self.read).await? == 0 {
                return Ok(());
            }

            // The buffer may hold several frames, or a tail of the next one.
            loop {
                match Frame::read_from(&mut self.read) {
                    Ok(frame) => self.on_frame(frame)?,
                    Err(protocol::Error::InsufficientBytes(_)) => break,
                    Err(e) => {
                        // An unauthenticated peer still gets told no.
                        if matches!(self.phase, Phase::Authenticating) {
                            self.write.put_u8(AUTH_REJECTED);
                        }

                        return Err(e.into());
                    }
                }
            }

            self.flush().await?;
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        let identity = match self.phase {
            Phase::Authenticating => return self.on_auth_frame(frame),
            Phase::Streaming(ref identity) => identity,
        };

        match frame.frame_type {
            FrameType::Image => {
                match self.sink.save(identity, &self.peer, &frame.payload) {
                    Ok(path) => {
                        info!(client = %self.peer, path = %path.display(), "saved image");
                    }
                    // A failed write loses this frame only.
                    Err(e) => error!(client = %self.peer, "failed to save image: {e}"),
                }

                Ok(())
            }
            FrameType::Auth => Err(SessionError::UnexpectedAuthFrame),
        }
    }

    fn on_auth_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        if frame.frame_type != FrameType::Auth {
            self.write.put_u8(AUTH_REJECTED);
            return Err(SessionError::ExpectedAuthFrame(frame.frame_type));
        }

        let mut payload = frame.payload;

        match Identity::read_from(&mut payload) {
            Ok(identity) => {
                info!(client = %self.peer, identity = %identity, "authenticated");

                self.write.put_u8(AUTH_OK);
                self.phase = Phase::Streaming(identity);

                Ok(())
            }
            Err(e) => {
                warn!(client = %self.peer, "rejecting credentials: {e}");

                self.write.put_u8(AUTH_REJECTED);
                Err(SessionError::AuthRejected(e))
            }
        }
    }

    async fn flush(&mut self) -> Result<(), std::io::Error> {
        if self.write.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.write).await?;
        self.write.clear();

        Ok(())
    }
}
