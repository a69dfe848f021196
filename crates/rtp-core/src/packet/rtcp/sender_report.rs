use bytes::{Buf, BufMut, BytesMut};

use super::ntp::NtpTimestamp;
use super::report_block::RtcpReportBlock;
use super::{RtcpHeader, RTCP_SENDER_REPORT};
use crate::error::{Result, RtcpError};

/// RTCP Sender Report (SR) packet
/// Defined in RFC 3550 Section 6.4.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSenderReport {
    /// SSRC of the sender
    pub ssrc: u32,

    /// Wall-clock time the report was sent
    pub ntp_timestamp: NtpTimestamp,

    /// RTP timestamp matching the NTP timestamp
    pub rtp_timestamp: u32,

    /// Packets sent since the stream started
    pub sender_packet_count: u32,

    /// Payload octets sent since the stream started
    pub sender_octet_count: u32,

    /// Report blocks
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpSenderReport {
    /// Size of the sender info section (SSRC included)
    pub const SENDER_INFO_SIZE: usize = 24;

    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            ntp_timestamp: NtpTimestamp::default(),
            rtp_timestamp: 0,
            sender_packet_count: 0,
            sender_octet_count: 0,
            report_blocks: Vec::new(),
        }
    }

    pub fn add_report_block(&mut self, block: RtcpReportBlock) {
        self.report_blocks.push(block);
    }

    /// Body size in bytes, header excluded
    pub fn size(&self) -> usize {
        Self::SENDER_INFO_SIZE + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Parse the body of an SR carrying `report_count` blocks
    pub fn parse(buf: &mut impl Buf, report_count: u8) -> Result<Self> {
        let required = Self::SENDER_INFO_SIZE + report_count as usize * RtcpReportBlock::SIZE;
        if buf.remaining() < required {
            return Err(RtcpError::BufferTooSmall {
                required,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();
        let ntp_timestamp = NtpTimestamp::new(buf.get_u32(), buf.get_u32());
        let rtp_timestamp = buf.get_u32();
        let sender_packet_count = buf.get_u32();
        let sender_octet_count = buf.get_u32();

        let mut report_blocks = Vec::with_capacity(report_count as usize);
        for _ in 0..report_count {
            report_blocks.push(RtcpReportBlock::parse(buf)?);
        }

        Ok(Self {
            ssrc,
            ntp_timestamp,
            rtp_timestamp,
            sender_packet_count,
            sender_octet_count,
            report_blocks,
        })
    }

    /// Serialize as a complete RTCP packet, header included
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(RtcpHeader::SIZE + self.size());

        let header = RtcpHeader {
            version: 2,
            padding: false,
            count: self.report_blocks.len().min(31) as u8,
            packet_type: RTCP_SENDER_REPORT,
            length: ((RtcpHeader::SIZE + self.size()) / 4 - 1) as u16,
        };
        header.serialize(&mut buf);

        buf.put_u32(self.ssrc);
        buf.put_u32(self.ntp_timestamp.seconds);
        buf.put_u32(self.ntp_timestamp.fraction);
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.sender_packet_count);
        buf.put_u32(self.sender_octet_count);

        for block in self.report_blocks.iter().take(31) {
            block.serialize(&mut buf);
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_calculation() {
        let mut sr = RtcpSenderReport::new(0x1234_5678);
        assert_eq!(sr.size(), 24);

        sr.add_report_block(RtcpReportBlock::new(0xabcd_ef01));
        sr.add_report_block(RtcpReportBlock::new(0x1122_3344));
        assert_eq!(sr.size(), 24 + 2 * 24);
    }

    #[test]
    fn test_parse_body() {
        let mut sr = RtcpSenderReport::new(7);
        sr.ntp_timestamp = NtpTimestamp::new(3_900_000_000, 42);
        sr.sender_packet_count = 500;
        let mut block = RtcpReportBlock::new(100);
        block.cumulative_lost = 5;
        block.highest_seq = 1000;
        sr.add_report_block(block);

        let bytes = sr.serialize();
        let mut body = &bytes[RtcpHeader::SIZE..];
        assert_eq!(RtcpSenderReport::parse(&mut body, 1).unwrap(), sr);
    }

    #[test]
    fn test_parse_missing_blocks() {
        let sr = RtcpSenderReport::new(7).serialize();
        let mut body = &sr[RtcpHeader::SIZE..];
        assert!(matches!(
            RtcpSenderReport::parse(&mut body, 2),
            Err(RtcpError::BufferTooSmall { required: 72, .. })
        ));
    }
}
