//! HEP3 capture envelope
//!
//! ```text
//! +------+--------+----------------------------------------------+
//! | HEP3 | length | chunk | chunk | ...                          |
//! +------+--------+----------------------------------------------+
//!   4 B     2 B
//!
//! chunk: vendor (2 B) | type (2 B) | length (2 B, includes these 6 B) | value
//! ```
//!
//! The envelope header is skipped without inspection. Chunk types the decoder does
//! not use are skipped by their declared length; a repeated chunk replaces the
//! earlier value.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Timelike, Utc};
use tracing::debug;

use voipmon_infra_common::sink::{attributes, MetricsSink};

use crate::address::Address;
use crate::error::{CaptureError, Result};
use crate::packet::{Packet, ProtocolCode};
use crate::resolver::HostResolver;

/// Envelope header size
pub const HEADER_SIZE: usize = 6;
/// Chunk header size (vendor, type, length)
pub const CHUNK_HEADER_SIZE: usize = 6;

const MAGIC: &[u8; 4] = b"HEP3";

/// Chunk type identifiers
pub mod chunk {
    pub const SRC_IPV4: u16 = 3;
    pub const DST_IPV4: u16 = 4;
    pub const SRC_PORT: u16 = 7;
    pub const DST_PORT: u16 = 8;
    pub const TIMESTAMP_SECS: u16 = 9;
    pub const TIMESTAMP_MICROS: u16 = 10;
    pub const PROTOCOL_TYPE: u16 = 11;
    pub const PAYLOAD: u16 = 15;

    /// Chunks every envelope must carry
    pub const REQUIRED: [u16; 8] = [
        SRC_IPV4,
        DST_IPV4,
        SRC_PORT,
        DST_PORT,
        TIMESTAMP_SECS,
        TIMESTAMP_MICROS,
        PROTOCOL_TYPE,
        PAYLOAD,
    ];
}

#[derive(Default)]
struct Chunks {
    src_ip: Option<IpAddr>,
    dst_ip: Option<IpAddr>,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    seconds: Option<u32>,
    micros: Option<u32>,
    protocol: Option<u8>,
    payload: Option<Bytes>,
}

fn parse_ip(chunk_type: u16, mut value: &[u8]) -> Result<IpAddr> {
    match value.len() {
        4 => Ok(IpAddr::V4(Ipv4Addr::from(value.get_u32()))),
        16 => Ok(IpAddr::V6(Ipv6Addr::from(value.get_u128()))),
        length => Err(CaptureError::InvalidAddress { chunk_type, length }),
    }
}

fn parse_u16(chunk_type: u16, mut value: &[u8]) -> Result<u16> {
    if value.len() != 2 {
        return Err(CaptureError::InvalidChunkLength {
            chunk_type,
            length: value.len() + CHUNK_HEADER_SIZE,
        });
    }
    Ok(value.get_u16())
}

fn parse_u32(chunk_type: u16, mut value: &[u8]) -> Result<u32> {
    if value.len() != 4 {
        return Err(CaptureError::InvalidChunkLength {
            chunk_type,
            length: value.len() + CHUNK_HEADER_SIZE,
        });
    }
    Ok(value.get_u32())
}

fn parse_u8(chunk_type: u16, value: &[u8]) -> Result<u8> {
    match value {
        [byte] => Ok(*byte),
        _ => Err(CaptureError::InvalidChunkLength {
            chunk_type,
            length: value.len() + CHUNK_HEADER_SIZE,
        }),
    }
}

/// Decode one capture envelope into a [`Packet`]
///
/// Only SIP payloads (protocol type 1) are accepted.
pub fn decode_hep(data: &[u8]) -> Result<Packet> {
    if data.len() < HEADER_SIZE {
        return Err(CaptureError::BufferTooSmall {
            required: HEADER_SIZE,
            available: data.len(),
        });
    }

    let mut buf = &data[HEADER_SIZE..];
    let mut chunks = Chunks::default();

    while buf.has_remaining() {
        if buf.remaining() < CHUNK_HEADER_SIZE {
            return Err(CaptureError::BufferTooSmall {
                required: CHUNK_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let _vendor = buf.get_u16();
        let chunk_type = buf.get_u16();
        let length = buf.get_u16() as usize;

        if length < CHUNK_HEADER_SIZE {
            return Err(CaptureError::InvalidChunkLength { chunk_type, length });
        }
        let value_len = length - CHUNK_HEADER_SIZE;
        if value_len > buf.remaining() {
            return Err(CaptureError::ChunkOverrun {
                chunk_type,
                length,
                available: buf.remaining() + CHUNK_HEADER_SIZE,
            });
        }

        let value = &buf[..value_len];
        match chunk_type {
            chunk::SRC_IPV4 => chunks.src_ip = Some(parse_ip(chunk_type, value)?),
            chunk::DST_IPV4 => chunks.dst_ip = Some(parse_ip(chunk_type, value)?),
            chunk::SRC_PORT => chunks.src_port = Some(parse_u16(chunk_type, value)?),
            chunk::DST_PORT => chunks.dst_port = Some(parse_u16(chunk_type, value)?),
            chunk::TIMESTAMP_SECS => chunks.seconds = Some(parse_u32(chunk_type, value)?),
            chunk::TIMESTAMP_MICROS => chunks.micros = Some(parse_u32(chunk_type, value)?),
            chunk::PROTOCOL_TYPE => chunks.protocol = Some(parse_u8(chunk_type, value)?),
            chunk::PAYLOAD => chunks.payload = Some(Bytes::copy_from_slice(value)),
            _ => {}
        }
        buf.advance(value_len);
    }

    let src_ip = chunks.src_ip.ok_or(CaptureError::MissingChunk(chunk::SRC_IPV4))?;
    let dst_ip = chunks.dst_ip.ok_or(CaptureError::MissingChunk(chunk::DST_IPV4))?;
    let src_port = chunks.src_port.ok_or(CaptureError::MissingChunk(chunk::SRC_PORT))?;
    let dst_port = chunks.dst_port.ok_or(CaptureError::MissingChunk(chunk::DST_PORT))?;
    let seconds = chunks.seconds.ok_or(CaptureError::MissingChunk(chunk::TIMESTAMP_SECS))?;
    let micros = chunks.micros.ok_or(CaptureError::MissingChunk(chunk::TIMESTAMP_MICROS))?;
    let protocol = chunks.protocol.ok_or(CaptureError::MissingChunk(chunk::PROTOCOL_TYPE))?;
    let payload = chunks.payload.ok_or(CaptureError::MissingChunk(chunk::PAYLOAD))?;

    if protocol != ProtocolCode::Sip.code() {
        return Err(CaptureError::UnsupportedProtocol(protocol));
    }

    if micros >= 1_000_000 {
        return Err(CaptureError::InvalidTimestamp { seconds, micros });
    }
    let timestamp = DateTime::<Utc>::from_timestamp(seconds as i64, micros * 1000)
        .ok_or(CaptureError::InvalidTimestamp { seconds, micros })?;

    Ok(Packet {
        src: Address::new(SocketAddr::new(src_ip, src_port)),
        dst: Address::new(SocketAddr::new(dst_ip, dst_port)),
        timestamp,
        protocol: ProtocolCode::Sip,
        payload,
    })
}

fn put_chunk(buf: &mut BytesMut, chunk_type: u16, value: &[u8]) {
    buf.put_u16(0);
    buf.put_u16(chunk_type);
    buf.put_u16((value.len() + CHUNK_HEADER_SIZE) as u16);
    buf.put_slice(value);
}

fn ip_octets(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Encode a packet as a capture envelope
///
/// Timestamps are truncated to microseconds. Payloads larger than a chunk can hold
/// are truncated.
pub fn encode_hep(packet: &Packet) -> Bytes {
    let max_value = u16::MAX as usize - CHUNK_HEADER_SIZE;
    let payload = &packet.payload[..packet.payload.len().min(max_value)];

    let mut body = BytesMut::with_capacity(128 + payload.len());
    put_chunk(&mut body, chunk::SRC_IPV4, &ip_octets(packet.src.addr.ip()));
    put_chunk(&mut body, chunk::DST_IPV4, &ip_octets(packet.dst.addr.ip()));
    put_chunk(&mut body, chunk::SRC_PORT, &packet.src.addr.port().to_be_bytes());
    put_chunk(&mut body, chunk::DST_PORT, &packet.dst.addr.port().to_be_bytes());

    let seconds = packet.timestamp.timestamp().clamp(0, u32::MAX as i64) as u32;
    let micros = (packet.timestamp.nanosecond() / 1000).min(999_999);
    put_chunk(&mut body, chunk::TIMESTAMP_SECS, &seconds.to_be_bytes());
    put_chunk(&mut body, chunk::TIMESTAMP_MICROS, &micros.to_be_bytes());
    put_chunk(&mut body, chunk::PROTOCOL_TYPE, &[packet.protocol.code()]);
    put_chunk(&mut body, chunk::PAYLOAD, payload);

    let mut out = BytesMut::with_capacity(HEADER_SIZE + body.len());
    out.put_slice(MAGIC);
    out.put_u16((HEADER_SIZE + body.len()).min(u16::MAX as usize) as u16);
    out.put_slice(&body);
    out.freeze()
}

/// Capture decoder stage
///
/// Wraps [`decode_hep`] with host resolution, counters and drop logging.
pub struct CaptureDecoder {
    resolver: Option<Arc<dyn HostResolver>>,
    metrics: Arc<dyn MetricsSink>,
    decoded: AtomicU64,
    rejected: AtomicU64,
}

impl CaptureDecoder {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            resolver: None,
            metrics,
            decoded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Fill [`Address::host`] through `resolver`
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Decode one datagram
    ///
    /// Rejected buffers are counted and logged; the error is returned so the caller
    /// can branch on its kind.
    pub fn decode(&self, data: &[u8]) -> Result<Packet> {
        match decode_hep(data) {
            Ok(mut packet) => {
                if let Some(resolver) = &self.resolver {
                    packet.src.host = resolver.resolve(packet.src.addr.ip());
                    packet.dst.host = resolver.resolve(packet.dst.addr.ip());
                }
                self.decoded.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .counter("hep_packets_decoded", 1, &attributes([("protocol", "sip")]));
                Ok(packet)
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .counter("hep_packets_rejected", 1, &attributes([("reason", e.reason())]));
                debug!("Dropping capture datagram ({} bytes): {}", data.len(), e);
                Err(e)
            }
        }
    }

    /// Datagrams decoded so far
    pub fn decoded_count(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    /// Datagrams rejected so far
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CaptureDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDecoder")
            .field("decoded", &self.decoded_count())
            .field("rejected", &self.rejected_count())
            .finish()
    }
}
