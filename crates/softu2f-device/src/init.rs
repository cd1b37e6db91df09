use serde::Serialize;
use softu2f_frame::command::INIT_RESPONSE_SIZE;
use softu2f_frame::{CAPFLAG_WINK, INIT_NONCE_SIZE, U2FHID_IF_VERSION, U2FHID_INIT};

use crate::error::{DeviceError, Result};

/// Payload of an INIT request: the host's nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitRequest {
    pub nonce: [u8; INIT_NONCE_SIZE],
}

impl InitRequest {
    pub fn new(nonce: [u8; INIT_NONCE_SIZE]) -> Self {
        Self { nonce }
    }

    /// Parse an INIT request payload. Exactly eight bytes.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let nonce = payload
            .try_into()
            .map_err(|_| DeviceError::InvalidLength {
                cmd: U2FHID_INIT,
                len: payload.len(),
            })?;
        Ok(Self { nonce })
    }

    pub fn encode(&self) -> [u8; INIT_NONCE_SIZE] {
        self.nonce
    }
}

/// Payload of an INIT response.
///
/// ```text
/// | nonce (8) | cid (4, BE) | if version | major | minor | build | capflags |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitResponse {
    pub nonce: [u8; INIT_NONCE_SIZE],
    pub cid: u32,
    pub interface_version: u8,
    pub version_major: u8,
    pub version_minor: u8,
    pub version_build: u8,
    pub capabilities: u8,
}

impl InitResponse {
    /// A response advertising this device's interface version and WINK.
    pub fn new(nonce: [u8; INIT_NONCE_SIZE], cid: u32, version: (u8, u8, u8)) -> Self {
        Self {
            nonce,
            cid,
            interface_version: U2FHID_IF_VERSION,
            version_major: version.0,
            version_minor: version.1,
            version_build: version.2,
            capabilities: CAPFLAG_WINK,
        }
    }

    pub fn encode(&self) -> [u8; INIT_RESPONSE_SIZE] {
        let mut out = [0u8; INIT_RESPONSE_SIZE];
        out[..8].copy_from_slice(&self.nonce);
        out[8..12].copy_from_slice(&self.cid.to_be_bytes());
        out[12] = self.interface_version;
        out[13] = self.version_major;
        out[14] = self.version_minor;
        out[15] = self.version_build;
        out[16] = self.capabilities;
        out
    }

    /// Parse an INIT response payload. Trailing bytes are ignored.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < INIT_RESPONSE_SIZE {
            return Err(DeviceError::UnexpectedResponse(format!(
                "INIT response is {} bytes, expected {INIT_RESPONSE_SIZE}",
                payload.len()
            )));
        }
        let mut nonce = [0u8; INIT_NONCE_SIZE];
        nonce.copy_from_slice(&payload[..8]);
        Ok(Self {
            nonce,
            cid: u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]),
            interface_version: payload[12],
            version_major: payload[13],
            version_minor: payload[14],
            version_build: payload[15],
            capabilities: payload[16],
        })
    }

    pub fn supports_wink(&self) -> bool {
        self.capabilities & CAPFLAG_WINK != 0
    }
}
