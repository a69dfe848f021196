//! RTCP compound packet decoding
//!
//! A compound packet is a run of RTCP packets, each with a 4-byte header:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|   RC    |      PT       |            length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `length` counts the 32-bit words following the header. Only Sender Reports are
//! parsed; every other type is skipped by its declared length.

pub mod ntp;
pub mod report_block;
pub mod sender_report;

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::error::{Result, RtcpError};

pub use ntp::NtpTimestamp;
pub use report_block::{BlockInterval, RtcpReportBlock};
pub use sender_report::RtcpSenderReport;

pub const RTCP_SENDER_REPORT: u8 = 200;
pub const RTCP_RECEIVER_REPORT: u8 = 201;
pub const RTCP_SOURCE_DESCRIPTION: u8 = 202;
pub const RTCP_GOODBYE: u8 = 203;
pub const RTCP_APPLICATION: u8 = 204;

/// Common RTCP packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub version: u8,
    pub padding: bool,
    /// Report count (low 5 bits of the first byte)
    pub count: u8,
    pub packet_type: u8,
    /// Body length in 32-bit words
    pub length: u16,
}

impl RtcpHeader {
    pub const SIZE: usize = 4;

    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(RtcpError::BufferTooSmall {
                required: Self::SIZE,
                available: buf.remaining(),
            });
        }

        let first = buf.get_u8();
        let version = first >> 6;
        if version != 2 {
            return Err(RtcpError::InvalidVersion(version));
        }

        Ok(Self {
            version,
            padding: first & 0x20 != 0,
            count: first & 0x1F,
            packet_type: buf.get_u8(),
            length: buf.get_u16(),
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let first = (self.version & 0x03) << 6 | (self.padding as u8) << 5 | (self.count & 0x1F);
        buf.put_u8(first);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.length);
    }

    /// Body size in bytes
    pub fn body_len(&self) -> usize {
        self.length as usize * 4
    }
}

/// Extract every Sender Report from a compound packet
///
/// Failing on the first packet of the compound is an error. A later packet that
/// is truncated or malformed ends the walk, keeping the reports already parsed.
pub fn decode_compound(data: &[u8]) -> Result<Vec<RtcpSenderReport>> {
    let mut buf = data;
    let mut reports = Vec::new();
    let mut first = true;

    while buf.has_remaining() {
        match next_packet(&mut buf) {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(e) if first => return Err(e),
            Err(e) => {
                debug!("Truncating RTCP compound after {} sender reports: {}", reports.len(), e);
                break;
            }
        }
        first = false;
    }

    Ok(reports)
}

fn next_packet(buf: &mut &[u8]) -> Result<Option<RtcpSenderReport>> {
    let header = RtcpHeader::parse(buf)?;
    let body_len = header.body_len();
    if body_len > buf.remaining() {
        return Err(RtcpError::Truncated {
            packet_type: header.packet_type,
            length: body_len,
            available: buf.remaining(),
        });
    }

    let data: &[u8] = *buf;
    let (mut body, rest) = data.split_at(body_len);
    *buf = rest;

    match header.packet_type {
        RTCP_SENDER_REPORT => RtcpSenderReport::parse(&mut body, header.count).map(Some),
        _ => Ok(None),
    }
}
