use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::poll::wait_readable;
use crate::traits::{FrameTransport, Incoming, Report, REPORT_SIZE};

const READ_CHUNK_SIZE: usize = 4 * REPORT_SIZE;

/// Listening side of a virtual HID link over a Unix domain socket.
///
/// Each accepted connection is one host attachment. The stream carries
/// back-to-back 64-byte reports in both directions with no extra framing.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// A stale socket left at `path` is removed first. Any other kind of file
    /// at `path` is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind with an explicit permission mode for the socket file.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |path: &Path, source: std::io::Error| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        };

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "virtual HID socket listening");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Accept the next host connection (blocking).
    pub fn accept(&self) -> Result<SocketTransport> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "host attached");
        Ok(SocketTransport::new(stream))
    }

    /// Accept a host connection, giving up after `timeout`.
    ///
    /// Returns `Ok(None)` when no host attached in time, so callers can check
    /// a shutdown flag between attempts.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<SocketTransport>> {
        let ready =
            wait_readable(self.listener.as_raw_fd(), timeout).map_err(TransportError::Accept)?;
        if !ready {
            return Ok(None);
        }
        self.accept().map(Some)
    }

    /// Connect to a listening device socket as the host side.
    pub fn connect(path: impl AsRef<Path>) -> Result<SocketTransport> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "attached to virtual HID socket");
        Ok(SocketTransport::new(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket()
            && metadata.dev() == expected_dev
            && metadata.ino() == expected_ino
        {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
        }
    }
}

/// One attached virtual HID link.
///
/// Reads are assembled into whole 64-byte reports; a report split across
/// several socket reads is only handed out once complete.
pub struct SocketTransport {
    stream: UnixStream,
    buf: BytesMut,
    closed: bool,
}

impl SocketTransport {
    fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            closed: false,
        }
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self::new(stream)
    }

    fn take_buffered(&mut self) -> Option<Incoming> {
        if self.buf.len() < REPORT_SIZE {
            return None;
        }
        Some(Incoming::Report(self.buf.split_to(REPORT_SIZE).freeze()))
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.stream.read(&mut chunk) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(err) if matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                Ok(())
            }
            Err(err) => Err(io_to_transport(err)),
        }
    }
}

impl FrameTransport for SocketTransport {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buf.clear();
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn send_frame(&mut self, report: &Report) -> Result<()> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        self.stream.write_all(report).map_err(io_to_transport)?;
        self.stream.flush().map_err(io_to_transport)
    }

    fn receive_frame(&mut self) -> Result<Incoming> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        if let Some(report) = self.take_buffered() {
            return Ok(report);
        }
        if wait_readable(self.stream.as_raw_fd(), Duration::ZERO)? {
            self.fill()?;
        }
        Ok(self.take_buffered().unwrap_or(Incoming::NoDataYet))
    }

    fn wait_for_input(&mut self, timeout: Duration) -> Result<()> {
        if self.closed || self.buf.len() >= REPORT_SIZE {
            return Ok(());
        }
        wait_readable(self.stream.as_raw_fd(), timeout)?;
        Ok(())
    }
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("buffered", &self.buf.remaining())
            .field("closed", &self.closed)
            .finish()
    }
}

fn io_to_transport(err: std::io::Error) -> TransportError {
    match err.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            TransportError::Closed
        }
        _ => TransportError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("softu2f-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn recv_blocking(transport: &mut SocketTransport) -> bytes::Bytes {
        for _ in 0..200 {
            if let Incoming::Report(report) = transport.receive_frame().unwrap() {
                return report;
            }
            transport
                .wait_for_input(Duration::from_millis(10))
                .unwrap();
        }
        panic!("no report received");
    }

    #[test]
    fn test_bind_accept_connect() {
        let dir = temp_dir("uds-roundtrip");
        let sock_path = dir.join("test.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        let path_clone = sock_path.clone();
        let host = std::thread::spawn(move || {
            let mut host = UnixDomainSocket::connect(&path_clone).unwrap();
            host.send_frame(&[0x42; REPORT_SIZE]).unwrap();
            recv_blocking(&mut host)
        });

        let mut device = listener.accept().unwrap();
        let request = recv_blocking(&mut device);
        assert_eq!(request.as_ref(), &[0x42; REPORT_SIZE][..]);
        device.send_frame(&[0x24; REPORT_SIZE]).unwrap();

        let reply = host.join().unwrap();
        assert_eq!(reply.as_ref(), &[0x24; REPORT_SIZE][..]);

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_split_report_is_reassembled() {
        let (mut raw, peer) = UnixStream::pair().unwrap();
        let mut transport = SocketTransport::from_stream(peer);

        raw.write_all(&[7u8; 30]).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(transport.receive_frame().unwrap(), Incoming::NoDataYet);

        raw.write_all(&[7u8; REPORT_SIZE - 30]).unwrap();
        let report = recv_blocking(&mut transport);
        assert_eq!(report.len(), REPORT_SIZE);
    }

    #[test]
    fn test_peer_hangup_is_closed() {
        let (raw, peer) = UnixStream::pair().unwrap();
        let mut transport = SocketTransport::from_stream(peer);
        drop(raw);

        transport
            .wait_for_input(Duration::from_millis(100))
            .unwrap();
        assert!(matches!(
            transport.receive_frame(),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_accept_timeout_returns_none_when_idle() {
        let dir = temp_dir("uds-accept-timeout");
        let listener = UnixDomainSocket::bind(dir.join("idle.sock")).unwrap();
        let accepted = listener
            .accept_timeout(Duration::from_millis(20))
            .unwrap();
        assert!(accepted.is_none());
        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixDomainSocket::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_bind_default_permissions_hardened() {
        let dir = temp_dir("uds-perms");
        let sock_path = dir.join("perm.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("uds-bind-file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = UnixDomainSocket::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_drop_does_not_remove_replaced_path() {
        let dir = temp_dir("uds-drop-race");
        let sock_path = dir.join("drop.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_closed_transport_rejects_use() {
        let (_raw, peer) = UnixStream::pair().unwrap();
        let mut transport = SocketTransport::from_stream(peer);
        transport.close().unwrap();
        transport.close().unwrap();
        assert!(matches!(
            transport.send_frame(&[0; REPORT_SIZE]),
            Err(TransportError::Shutdown)
        ));
    }
}
