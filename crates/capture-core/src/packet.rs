use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::CaptureError;

/// Payload protocol carried by a capture envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolCode {
    Sip = 1,
    Rtcp = 5,
}

impl ProtocolCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ProtocolCode {
    type Error = CaptureError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProtocolCode::Sip),
            5 => Ok(ProtocolCode::Rtcp),
            other => Err(CaptureError::UnsupportedProtocol(other)),
        }
    }
}

/// One decoded datagram, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub src: Address,
    pub dst: Address,
    /// Capture time, microsecond precision
    pub timestamp: DateTime<Utc>,
    pub protocol: ProtocolCode,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(
        src: Address,
        dst: Address,
        timestamp: DateTime<Utc>,
        protocol: ProtocolCode,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            src,
            dst,
            timestamp,
            protocol,
            payload: payload.into(),
        }
    }
}
