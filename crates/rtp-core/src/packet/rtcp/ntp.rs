/// NTP timestamp carried by Sender Reports (RFC 3550 section 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NtpTimestamp {
    /// Seconds since 1900-01-01
    pub seconds: u32,
    /// Units of 2^-32 s
    pub fraction: u32,
}

impl NtpTimestamp {
    pub fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// 32.32 fixed-point value
    pub fn to_u64(&self) -> u64 {
        u64::from(self.seconds) << 32 | u64::from(self.fraction)
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is not older
    pub fn millis_since(&self, earlier: &NtpTimestamp) -> u64 {
        let delta = self.to_u64().saturating_sub(earlier.to_u64());
        ((u128::from(delta) * 1000) >> 32) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_since() {
        let earlier = NtpTimestamp::new(3_900_000_000, 0);
        // 2.5 s later
        let later = NtpTimestamp::new(3_900_000_002, 0x8000_0000);

        assert_eq!(later.millis_since(&earlier), 2500);
        assert_eq!(earlier.millis_since(&later), 0);
        assert_eq!(later.millis_since(&later), 0);
    }
}
