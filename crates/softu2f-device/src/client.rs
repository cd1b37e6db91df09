use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use softu2f_frame::{
    command_name, decode_frame, Assembly, Message, MessageWriter, Reassembler, CID_BROADCAST,
    INIT_NONCE_SIZE, U2FHID_ERROR, U2FHID_INIT, U2FHID_LOCK, U2FHID_MSG, U2FHID_PING,
    U2FHID_WINK,
};
use softu2f_transport::{FrameTransport, Incoming};

use crate::error::{DeviceError, Result};
use crate::init::{InitRequest, InitResponse};

/// Default time to wait for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives a device from the host side of a transport.
///
/// Starts on the broadcast channel; [`HostClient::init`] adopts the channel
/// the device assigns.
pub struct HostClient<T> {
    transport: T,
    cid: u32,
    reassembler: Reassembler,
    writer: MessageWriter,
    timeout: Duration,
}

impl<T: FrameTransport> HostClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cid: CID_BROADCAST,
            reassembler: Reassembler::new(),
            writer: MessageWriter::new(Duration::ZERO),
            timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Override the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Pace outbound frames like a real host stack would.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.writer.set_pacing(pacing);
        self
    }

    /// Channel used for requests.
    pub fn cid(&self) -> u32 {
        self.cid
    }

    /// Use an already allocated channel.
    pub fn set_cid(&mut self, cid: u32) {
        self.cid = cid;
    }

    /// INIT with a fresh nonce and adopt the assigned channel.
    pub fn init(&mut self) -> Result<InitResponse> {
        self.init_with_nonce(fresh_nonce())
    }

    /// INIT with `nonce`. The response must echo it.
    pub fn init_with_nonce(&mut self, nonce: [u8; INIT_NONCE_SIZE]) -> Result<InitResponse> {
        let request = InitRequest::new(nonce);
        let reply = self.transact(U2FHID_INIT, request.encode().to_vec())?;
        let response = InitResponse::decode(&reply)?;
        if response.nonce != nonce {
            return Err(DeviceError::UnexpectedResponse(
                "INIT response nonce does not match request".to_string(),
            ));
        }
        tracing::debug!(
            cid = format_args!("{:#010x}", response.cid),
            "channel assigned"
        );
        self.cid = response.cid;
        Ok(response)
    }

    /// PING and verify the echo.
    pub fn ping(&mut self, data: impl Into<Bytes>) -> Result<Bytes> {
        let data = data.into();
        let reply = self.transact(U2FHID_PING, data.clone())?;
        if reply != data {
            return Err(DeviceError::UnexpectedResponse(format!(
                "PING echo differs ({} bytes sent, {} received)",
                data.len(),
                reply.len()
            )));
        }
        Ok(reply)
    }

    pub fn wink(&mut self) -> Result<()> {
        self.transact(U2FHID_WINK, Bytes::new())?;
        Ok(())
    }

    /// Lock the device to this channel for `seconds` (zero releases).
    pub fn lock(&mut self, seconds: u8) -> Result<()> {
        self.transact(U2FHID_LOCK, vec![seconds])?;
        Ok(())
    }

    /// Send an APDU and return the raw response.
    pub fn msg(&mut self, apdu: impl Into<Bytes>) -> Result<Bytes> {
        self.transact(U2FHID_MSG, apdu)
    }

    /// Send `cmd` on this channel and wait for the matching response.
    ///
    /// An ERROR response becomes [`DeviceError::Remote`].
    pub fn transact(&mut self, cmd: u8, payload: impl Into<Bytes>) -> Result<Bytes> {
        let request = Message::new(self.cid, cmd, payload);
        self.writer.send(&mut self.transport, &request)?;

        let response = self.receive(self.cid)?;
        if let Some(code) = response.error_code() {
            return Err(DeviceError::Remote { code });
        }
        if response.cmd != request.cmd {
            return Err(DeviceError::UnexpectedResponse(format!(
                "sent {}, got {}",
                command_name(request.cmd),
                command_name(response.cmd)
            )));
        }
        Ok(response.payload)
    }

    /// Wait for the next complete message on `cid`, ignoring other channels.
    pub fn receive(&mut self, cid: u32) -> Result<Message> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let raw = match self.transport.receive_frame()? {
                Incoming::Report(raw) => raw,
                Incoming::NoDataYet => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.reassembler.reset();
                        return Err(DeviceError::Timeout(self.timeout));
                    }
                    self.transport.wait_for_input(deadline - now)?;
                    continue;
                }
            };

            let frame = decode_frame(&raw)?;
            if frame.cid != cid {
                tracing::trace!(
                    cid = format_args!("{:#010x}", frame.cid),
                    "ignoring frame for another channel"
                );
                continue;
            }
            match self.reassembler.accept(frame)? {
                Assembly::Complete(message) => return Ok(message),
                Assembly::Incomplete => {}
                Assembly::Cancelled { .. } => {}
                Assembly::Rejected(rejection) => {
                    self.reassembler.reset();
                    return Err(DeviceError::UnexpectedResponse(rejection.to_string()));
                }
            }
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(unix)]
impl HostClient<softu2f_transport::SocketTransport> {
    /// Connect to a device served on a Unix socket.
    pub fn connect(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let transport = softu2f_transport::UnixDomainSocket::connect(path)?;
        Ok(Self::new(transport))
    }
}

impl<T> std::fmt::Debug for HostClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClient")
            .field("cid", &format_args!("{:#010x}", self.cid))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// Not cryptographic; INIT nonces only need to differ between requests.
fn fresh_nonce() -> [u8; INIT_NONCE_SIZE] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    (nanos ^ (u64::from(std::process::id()) << 32)).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use softu2f_frame::command::errors::ERR_CHANNEL_BUSY;
    use softu2f_transport::MemoryTransport;

    use super::*;

    #[test]
    fn error_response_is_remote() {
        let (host, mut device) = MemoryTransport::pair();
        let mut client = HostClient::new(host).with_timeout(Duration::from_millis(200));
        client.set_cid(4);

        let mut writer = MessageWriter::new(Duration::ZERO);
        writer
            .send_error(&mut device, 4, ERR_CHANNEL_BUSY)
            .unwrap();
        let err = client.ping(&b"hi"[..]).unwrap_err();
        assert!(matches!(err, DeviceError::Remote { code } if code == ERR_CHANNEL_BUSY));
    }

    #[test]
    fn silence_is_timeout() {
        let (host, _device) = MemoryTransport::pair();
        let mut client = HostClient::new(host).with_timeout(Duration::from_millis(20));
        assert!(matches!(client.wink(), Err(DeviceError::Timeout(_))));
    }

    #[test]
    fn other_channels_are_ignored() {
        let (host, mut device) = MemoryTransport::pair();
        let mut client = HostClient::new(host).with_timeout(Duration::from_millis(200));
        client.set_cid(2);

        let mut writer = MessageWriter::new(Duration::ZERO);
        writer
            .send(&mut device, &Message::new(3, U2FHID_PING, &b"no"[..]))
            .unwrap();
        writer
            .send(&mut device, &Message::new(2, U2FHID_PING, &b"yes"[..]))
            .unwrap();
        assert_eq!(client.ping(&b"yes"[..]).unwrap().as_ref(), b"yes");
    }

    #[test]
    fn nonces_differ() {
        let a = fresh_nonce();
        std::thread::sleep(Duration::from_millis(1));
        assert_ne!(a, fresh_nonce());
    }
}
