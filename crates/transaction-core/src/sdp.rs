//! Minimal SDP extraction
//!
//! Only what media correlation needs: the audio RTP endpoint and the offered
//! codecs. Connection lines may appear at session or media level; the media-level
//! one wins.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

const STATIC_PAYLOAD_TYPES: &[(u8, &str, u32)] = &[
    (0, "PCMU", 8000),
    (3, "GSM", 8000),
    (4, "G723", 8000),
    (8, "PCMA", 8000),
    (9, "G722", 8000),
    (18, "G729", 8000),
];

/// One codec offered on the audio stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
}

/// Audio endpoint negotiated by one side of an offer/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// RTP address and port
    pub address: SocketAddr,
    /// Codecs in preference order
    pub codecs: Vec<Codec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptime: Option<u32>,
}

impl SessionDescription {
    /// Parse an SDP body; `None` when there is no usable audio stream
    pub fn parse(body: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(body).ok()?;

        let mut session_ip: Option<IpAddr> = None;
        let mut media_ip: Option<IpAddr> = None;
        let mut port: Option<u16> = None;
        let mut formats: Vec<u8> = Vec::new();
        let mut rtpmap: HashMap<u8, (String, u32)> = HashMap::new();
        let mut ptime = None;
        let mut in_audio = false;
        let mut seen_media = false;

        for line in text.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("m=") {
                seen_media = true;
                let cols: Vec<&str> = value.split_whitespace().collect();
                // First audio stream only
                if port.is_none() && cols.len() >= 3 && cols[0] == "audio" {
                    in_audio = true;
                    port = cols[1].split('/').next().and_then(|p| p.parse().ok());
                    formats = cols[3..].iter().filter_map(|f| f.parse().ok()).collect();
                } else {
                    in_audio = false;
                }
            } else if let Some(value) = line.strip_prefix("c=") {
                let ip = parse_connection(value);
                if in_audio {
                    media_ip = ip.or(media_ip);
                } else if !seen_media {
                    session_ip = ip.or(session_ip);
                }
            } else if let Some(value) = line.strip_prefix("a=rtpmap:") {
                if let Some((pt, codec)) = parse_rtpmap(value) {
                    rtpmap.insert(pt, codec);
                }
            } else if let Some(value) = line.strip_prefix("a=ptime:") {
                if in_audio {
                    ptime = value.trim().parse().ok();
                }
            }
        }

        let port = port.filter(|p| *p != 0)?;
        let ip = media_ip.or(session_ip)?;

        let codecs = formats
            .into_iter()
            .filter_map(|pt| {
                rtpmap
                    .get(&pt)
                    .map(|(name, rate)| (name.clone(), *rate))
                    .or_else(|| static_codec(pt))
                    .map(|(name, clock_rate)| Codec {
                        payload_type: pt,
                        name,
                        clock_rate,
                    })
            })
            .collect();

        Some(Self {
            address: SocketAddr::new(ip, port),
            codecs,
            ptime,
        })
    }

    /// First offered codec
    pub fn primary_codec(&self) -> Option<&Codec> {
        self.codecs.first()
    }

    /// Name of the codec for `payload_type`
    pub fn codec_name(&self, payload_type: u8) -> Option<&str> {
        self.codecs
            .iter()
            .find(|c| c.payload_type == payload_type)
            .map(|c| c.name.as_str())
    }
}

fn parse_connection(value: &str) -> Option<IpAddr> {
    let mut cols = value.split_whitespace();
    if cols.next()? != "IN" {
        return None;
    }
    let _family = cols.next()?;
    // Multicast addresses may carry a /ttl suffix
    cols.next()?.split('/').next()?.parse().ok()
}

fn parse_rtpmap(value: &str) -> Option<(u8, (String, u32))> {
    let mut parts = value.split_whitespace();
    let pt = parts.next()?.parse::<u8>().ok()?;
    let mut encoding = parts.next()?.split('/');
    let name = encoding.next()?.trim();
    let rate = encoding.next()?.trim().parse::<u32>().ok()?;
    if name.is_empty() {
        return None;
    }
    Some((pt, (name.to_string(), rate)))
}

fn static_codec(pt: u8) -> Option<(String, u32)> {
    STATIC_PAYLOAD_TYPES
        .iter()
        .find(|(entry, _, _)| *entry == pt)
        .map(|(_, name, rate)| (name.to_string(), *rate))
}
