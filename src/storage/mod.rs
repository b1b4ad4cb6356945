//! Screenshot persistence.
//!
//! Frames land under `<root>/<hostname>/<username>/` with a
//! `YYYYMMDD_HHMMSS_<ip-without-dots>_<port>.png` filename. Two frames from
//! the same peer within the same second overwrite each other; the last one
//! wins.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::protocol::Identity;

pub struct ScreenshotSink {
    root: PathBuf,
}

impl ScreenshotSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Write one PNG payload, creating the identity directories as needed.
    /// Returns the path written.
    pub fn save(
        &self,
        identity: &Identity,
        peer: &SocketAddr,
        png: &[u8],
    ) -> std::io::Result<PathBuf> {
        let dir = self.root.join(&identity.hostname).join(&identity.username);
        fs::create_dir_all(&dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{timestamp}_{}.png", peer_tag(peer)));

        fs::write(&path, png)?;

        Ok(path)
    }
}

/// Peer identifier used in filenames: the IP with separator dots removed,
/// then the port (`192.168.10.10:54321` → `1921681010_54321`).
fn peer_tag(peer: &SocketAddr) -> String {
    let ip = peer.ip().to_string().replace('.', "");

    format!("{ip}_{}", peer.port())
}
