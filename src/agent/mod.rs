//! The capture-and-stream loop.
//!
//! Connects once, authenticates with the local hostname and username, then
//! sends one PNG frame per tick until the collector goes away or the user
//! interrupts. Capture failures only cost the current tick; transport
//! failures end the agent.

use std::net::SocketAddrV4;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::signal;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::protocol::{Frame, FrameType, Identity, AUTH_OK, AUTH_REJECTED};
use crate::screen;

pub async fn run(server: SocketAddrV4, period_secs: u64) -> Result<()> {
    let mut stream = TcpStream::connect(server)
        .await
        .with_context(|| format!("failed to connect to {server}"))?;

    info!(server = %server, "connected");

    let identity = local_identity();
    authenticate(&mut stream, &identity).await?;
    info!(identity = %identity, "authenticated");

    let period = Duration::from_secs(period_secs);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        match screen::grab_png() {
            Ok(png) => {
                let sent = send_frame(&mut stream, Frame::new(FrameType::Image, png))
                    .await
                    .context("failed to send image frame")?;

                info!(bytes = sent, "sent screenshot");
            }
            Err(e) => warn!("screen capture failed, skipping tick: {e}"),
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupt received, stopping");
                return Ok(());
            }
            _ = sleep(period) => {}
        }
    }
}

/// Send the `'A'` frame and wait for the collector's one-byte verdict.
async fn authenticate<S>(stream: &mut S, identity: &Identity) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload = BytesMut::new();
    identity.write(&mut payload);

    send_frame(stream, Frame::new(FrameType::Auth, payload.freeze()))
        .await
        .context("failed to send auth frame")?;

    let mut response = [0u8; 1];
    stream
        .read_exact(&mut response)
        .await
        .context("collector closed the connection before answering")?;

    match response[0] {
        AUTH_OK => Ok(()),
        AUTH_REJECTED => bail!("collector rejected the credentials"),
        other => bail!("unexpected auth response byte: 0x{other:02x}"),
    }
}

/// Write one whole frame; `write_all` keeps going across partial writes.
/// Returns the number of bytes put on the wire.
async fn send_frame<S>(stream: &mut S, frame: Frame) -> std::io::Result<usize>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    frame.write(&mut buf);

    stream.write_all(&buf).await?;

    Ok(buf.len())
}

fn local_identity() -> Identity {
    Identity {
        hostname: whoami::fallible::hostname().unwrap_or_else(|_| "unknown-host".into()),
        username: whoami::username(),
    }
}
