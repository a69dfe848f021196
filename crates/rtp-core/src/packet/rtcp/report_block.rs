use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, RtcpError};

const CUMULATIVE_LOST_MASK: u32 = 0x00FF_FFFF;

/// One reception report block of a Sender Report (RFC 3550 section 6.4.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReportBlock {
    /// Stream being reported on
    pub ssrc: u32,
    /// 8-bit fixed point, lost / expected since the previous report
    pub fraction_lost: u8,
    /// 24 bits on the wire
    pub cumulative_lost: u32,
    pub highest_seq: u32,
    /// Interarrival jitter in timestamp units
    pub jitter: u32,
    pub last_sr: u32,
    pub delay_since_last_sr: u32,
}

/// Packets expected and lost between two blocks of the same stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInterval {
    pub expected: u32,
    pub lost: u32,
}

impl BlockInterval {
    pub fn received(&self) -> u32 {
        self.expected.saturating_sub(self.lost)
    }
}

impl RtcpReportBlock {
    pub const SIZE: usize = 24;

    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            fraction_lost: 0,
            cumulative_lost: 0,
            highest_seq: 0,
            jitter: 0,
            last_sr: 0,
            delay_since_last_sr: 0,
        }
    }

    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        let available = buf.remaining();
        if available < Self::SIZE {
            return Err(RtcpError::BufferTooSmall { required: Self::SIZE, available });
        }

        let ssrc = buf.get_u32();
        let [fraction_lost, lost_hi, lost_mid, lost_lo] = buf.get_u32().to_be_bytes();
        let cumulative_lost = u32::from_be_bytes([0, lost_hi, lost_mid, lost_lo]);
        let highest_seq = buf.get_u32();
        let jitter = buf.get_u32();
        let last_sr = buf.get_u32();
        let delay_since_last_sr = buf.get_u32();

        Ok(Self {
            ssrc,
            fraction_lost,
            cumulative_lost,
            highest_seq,
            jitter,
            last_sr,
            delay_since_last_sr,
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let loss_word =
            u32::from(self.fraction_lost) << 24 | (self.cumulative_lost & CUMULATIVE_LOST_MASK);
        buf.reserve(Self::SIZE);
        for word in [
            self.ssrc,
            loss_word,
            self.highest_seq,
            self.jitter,
            self.last_sr,
            self.delay_since_last_sr,
        ] {
            buf.put_u32(word);
        }
    }

    /// Counters elapsed since an earlier block with the given sequence and loss totals
    ///
    /// Counter resets saturate to zero instead of wrapping.
    pub fn interval_since(&self, highest_seq: u32, cumulative_lost: u32) -> BlockInterval {
        BlockInterval {
            expected: self.highest_seq.saturating_sub(highest_seq),
            lost: self.cumulative_lost.saturating_sub(cumulative_lost),
        }
    }

    /// Jitter if it is below `limit`
    pub fn jitter_below(&self, limit: u32) -> Option<u32> {
        (self.jitter < limit).then_some(self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: [u8; 24] = [
        0x00, 0x00, 0x00, 0x64, // ssrc
        0x0A, 0x01, 0x02, 0x03, // fraction / cumulative
        0x00, 0x00, 0x04, 0x1A, // highest seq
        0x00, 0x00, 0x00, 0x20, // jitter
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_loss_word_split() {
        let block = RtcpReportBlock::parse(&mut &BLOCK[..]).unwrap();
        assert_eq!(block.ssrc, 100);
        assert_eq!(block.fraction_lost, 10);
        assert_eq!(block.cumulative_lost, 0x010203);
        assert_eq!(block.highest_seq, 1050);
        assert_eq!(block.jitter, 32);

        let mut out = BytesMut::new();
        block.serialize(&mut out);
        assert_eq!(&out[..], &BLOCK[..]);
    }

    #[test]
    fn test_short_buffer() {
        assert_eq!(
            RtcpReportBlock::parse(&mut &BLOCK[..20]),
            Err(RtcpError::BufferTooSmall { required: 24, available: 20 })
        );
    }

    #[test]
    fn test_interval_saturates_on_reset() {
        let mut block = RtcpReportBlock::new(7);
        block.highest_seq = 1100;
        block.cumulative_lost = 2;

        let interval = block.interval_since(1000, 5);
        assert_eq!(interval, BlockInterval { expected: 100, lost: 0 });
        assert_eq!(interval.received(), 100);
        assert_eq!(block.interval_since(1050, 1).received(), 49);
    }

    #[test]
    fn test_jitter_limit() {
        let mut block = RtcpReportBlock::new(7);
        block.jitter = 9_999;
        assert_eq!(block.jitter_below(10_000), Some(9_999));
        block.jitter = 10_000;
        assert_eq!(block.jitter_below(10_000), None);
    }
}
