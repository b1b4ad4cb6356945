//! The collector: accepts any number of agents and persists their frames.

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tracing::{debug, info, warn};

use crate::storage::ScreenshotSink;

mod session;

use session::Session;

/// Where collected frames are written, relative to the working directory.
const SCREENSHOTS_ROOT: &str = "screenshots";

/// Accept backlog passed to `listen`.
const BACKLOG: u32 = 1024;

pub async fn run(port: u16) -> Result<()> {
    let listener = bind(port).with_context(|| format!("failed to listen on port {port}"))?;

    info!(port, "collector listening");

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupt received, shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };

                info!(client = %peer, "new connection");

                let session = Session::new(stream, peer, ScreenshotSink::new(SCREENSHOTS_ROOT));

                tokio::spawn(async move {
                    match session.run().await {
                        Ok(()) => info!(client = %peer, "connection closed"),
                        Err(e) => warn!(client = %peer, "session ended: {e}"),
                    }
                });
            }
        }
    }
}

/// Bind the listening socket. `SO_REUSEADDR` is required; `SO_REUSEPORT` and
/// keepalive are best-effort.
fn bind(port: u16) -> std::io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;

    socket.set_reuseaddr(true)?;

    if let Err(e) = socket.set_reuseport(true) {
        debug!("SO_REUSEPORT unavailable: {e}");
    }

    if let Err(e) = socket.set_keepalive(true) {
        debug!("SO_KEEPALIVE unavailable: {e}");
    }

    socket.bind((Ipv4Addr::UNSPECIFIED, port).into())?;
    socket.listen(BACKLOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_picks_a_free_port() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let listener = bind(0).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
