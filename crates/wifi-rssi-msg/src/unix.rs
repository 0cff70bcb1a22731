//! ---
//! section: "02-messaging-ipc-data-model"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Message envelope, codec, and address-routed channels."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Cross-process channel built on Unix datagram sockets.
//!
//! Every endpoint owns `<root>/<address>.sock`. The kernel reports the bound
//! path of each sender, which is what makes the source address verifiable:
//! a peer cannot put another address on the envelope without owning the
//! corresponding socket file.
//!
//! The channel directory is world-writable with the sticky bit set and every
//! socket is world-writable, so unprivileged clients can reach a service run
//! by another user while no one can remove a socket they do not own.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixDatagram as StdUnixDatagram;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UnixDatagram;
use tracing::{debug, warn};

use crate::transport::{Channel, Datagram, Endpoint};
use crate::types::{Address, MAX_FRAME_LEN};
use crate::{MessagingError, Result};

/// Mode of the per-protocol channel directory.
pub const CHANNEL_DIR_MODE: u32 = 0o1777;
/// Mode of every endpoint socket file.
pub const SOCKET_MODE: u32 = 0o666;

/// Channel whose endpoints are socket files under a per-protocol directory.
#[derive(Debug, Clone)]
pub struct UnixDatagramChannel {
    protocol: u16,
    root: PathBuf,
}

impl UnixDatagramChannel {
    /// Prepare the channel directory `<socket_dir>/wifi-rssi-<protocol>`.
    pub fn new(socket_dir: impl AsRef<Path>, protocol: u16) -> Result<Self> {
        let root = socket_dir.as_ref().join(format!("wifi-rssi-{protocol}"));
        std::fs::create_dir_all(&root)?;
        // Only the owner may chmod; a directory set up by another user is used as is.
        if let Err(err) =
            std::fs::set_permissions(&root, std::fs::Permissions::from_mode(CHANNEL_DIR_MODE))
        {
            debug!(path = %root.display(), error = %err, "channel directory mode left unchanged");
        }
        Ok(Self { protocol, root })
    }

    /// Directory holding the endpoint sockets.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Socket path owned by `address`.
    pub fn socket_path(&self, address: Address) -> PathBuf {
        self.root.join(format!("{}.sock", address.get()))
    }

    /// Bind and return the concrete endpoint type.
    pub fn bind_endpoint(&self, address: Address) -> Result<UnixDatagramEndpoint> {
        let path = self.socket_path(address);
        if path.exists() {
            reclaim_stale(&path, address)?;
        }
        let bound = StdUnixDatagram::bind(&path).map_err(|err| match err.kind() {
            io::ErrorKind::AddrInUse => MessagingError::AddressInUse(address),
            _ => MessagingError::Io(err),
        })?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
        bound.set_nonblocking(true)?;
        // Sends bypass reactor readiness: a datagram either enters the peer's
        // queue right away or the send fails.
        let sender = bound.try_clone()?;
        let socket = UnixDatagram::from_std(bound)?;
        debug!(protocol = self.protocol, %address, path = %path.display(), "endpoint bound");
        Ok(UnixDatagramEndpoint {
            address,
            socket,
            sender,
            path,
            channel: self.clone(),
        })
    }

    fn address_of(&self, peer: &tokio::net::unix::SocketAddr) -> Result<Address> {
        let path = peer
            .as_pathname()
            .ok_or_else(|| MessagingError::UnverifiableSource("unnamed socket".into()))?;
        if path.parent() != Some(self.root.as_path()) {
            return Err(MessagingError::UnverifiableSource(
                path.display().to_string(),
            ));
        }
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u32>().ok())
            .map(Address::new)
            .ok_or_else(|| MessagingError::UnverifiableSource(path.display().to_string()))
    }
}

// A socket file nobody answers on is left over from a dead process.
fn reclaim_stale(path: &Path, address: Address) -> Result<()> {
    let liveness = std::os::unix::net::UnixDatagram::unbound()?;
    match liveness.connect(path) {
        Ok(()) => Err(MessagingError::AddressInUse(address)),
        Err(_) => {
            warn!(path = %path.display(), "removing stale endpoint socket");
            std::fs::remove_file(path)?;
            Ok(())
        }
    }
}

impl Channel for UnixDatagramChannel {
    fn protocol(&self) -> u16 {
        self.protocol
    }

    fn bind(&self, address: Address) -> Result<Box<dyn Endpoint>> {
        Ok(Box::new(self.bind_endpoint(address)?))
    }

    fn name(&self) -> &'static str {
        "unix_datagram"
    }
}

/// Endpoint owning one socket file; the file is removed on drop.
#[derive(Debug)]
pub struct UnixDatagramEndpoint {
    address: Address,
    socket: UnixDatagram,
    sender: StdUnixDatagram,
    path: PathBuf,
    channel: UnixDatagramChannel,
}

#[async_trait]
impl Endpoint for UnixDatagramEndpoint {
    fn local_address(&self) -> Address {
        self.address
    }

    async fn send_to(&self, destination: Address, frame: Bytes) -> Result<()> {
        let target = self.channel.socket_path(destination);
        match self.sender.send_to(&frame, &target) {
            Ok(_) => Ok(()),
            Err(err) => Err(match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                    MessagingError::Unreachable(destination)
                }
                io::ErrorKind::WouldBlock => MessagingError::Backlog(destination),
                _ => MessagingError::Io(err),
            }),
        }
    }

    async fn recv_from(&self) -> Result<Datagram> {
        // One spare byte so an oversized datagram shows up as a length error.
        let mut buf = vec![0u8; MAX_FRAME_LEN + 1];
        let (len, peer) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        let source = self.channel.address_of(&peer)?;
        Ok(Datagram {
            source,
            frame: Bytes::from(buf),
        })
    }

    fn name(&self) -> &'static str {
        "unix_datagram"
    }
}

impl Drop for UnixDatagramEndpoint {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %err, "socket file already gone");
        }
    }
}
