//! Capture decoding for voipmon
//!
//! Turns raw capture datagrams (HEP3 envelopes) into immutable [`Packet`] values
//! that the correlation components consume.
//!
//! ```
//! use voipmon_capture_core::{decode_hep, encode_hep, Address, Packet, ProtocolCode};
//!
//! let packet = Packet::new(
//!     Address::new("10.0.0.1:5060".parse().unwrap()),
//!     Address::new("10.0.0.2:5060".parse().unwrap()),
//!     chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
//!     ProtocolCode::Sip,
//!     &b"OPTIONS sip:pbx SIP/2.0\r\n\r\n"[..],
//! );
//! let decoded = decode_hep(&encode_hep(&packet)).unwrap();
//! assert_eq!(decoded, packet);
//! ```

pub mod address;
pub mod error;
pub mod hep;
pub mod packet;
pub mod resolver;

pub use address::{canonical_pair, Address};
pub use error::{CaptureError, Result};
pub use hep::{decode_hep, encode_hep, CaptureDecoder};
pub use packet::{Packet, ProtocolCode};
pub use resolver::{HostResolver, StaticHostResolver};
