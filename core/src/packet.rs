//! Fixed-header packet encoding for the radio link, and the matching
//! host-side decoder.
//!
//! Wire layout (all multi-byte fields big-endian):
//!
//! | offset | size | field          |
//! |--------|------|----------------|
//! | 0      | 1    | reserved, 0x00 |
//! | 1      | 1    | sender_id      |
//! | 2      | 2    | payload_length |
//! | 4      | 4    | serial         |
//! | 8      | n    | payload        |
//! | 8 + n  | 16   | CBC-MAC tag    |
//!
//! The payload is every Q15 coefficient of the feature set, row-major
//! (vector-major, then coefficient), two bytes each, MSB first.

use crate::auth::Authenticator;
use crate::error::{PipelineError, Result};
use crate::features::FeatureSet;
use crate::fixed::Q15;

pub const PACKET_HEADER_LENGTH: usize = 8;
pub const PACKET_TAG_LENGTH: usize = 16;

pub struct PacketEncoder;

impl PacketEncoder {
    /// Total wire size of a packet carrying `coefficients` Q15 values.
    pub fn packet_length(coefficients: usize) -> usize {
        PACKET_HEADER_LENGTH + 2 * coefficients + PACKET_TAG_LENGTH
    }

    /// Build the framed packet: header, big-endian payload, zeroed tag slot.
    /// The caller seals it with [`PacketEncoder::seal`] before handing it to
    /// the radio. `serial` is owned by the caller and not mutated here.
    ///
    /// A set whose coefficients do not fit the 16-bit length field is
    /// rejected rather than encoded with a truncated header.
    pub fn encode(set: &FeatureSet, sender_id: u8, serial: u32) -> Result<Vec<u8>> {
        let payload_len = 2 * set.as_flat().len();
        if payload_len > u16::MAX as usize {
            return Err(PipelineError::MalformedPacket(format!(
                "payload of {payload_len} bytes overflows the 16-bit length field"
            )));
        }
        let mut packet = Vec::with_capacity(PACKET_HEADER_LENGTH + payload_len + PACKET_TAG_LENGTH);

        packet.push(0x00);
        packet.push(sender_id);
        packet.extend_from_slice(&(payload_len as u16).to_be_bytes());
        packet.extend_from_slice(&serial.to_be_bytes());
        for &coef in set.as_flat() {
            packet.extend_from_slice(&coef.to_be_bytes());
        }
        packet.resize(PACKET_HEADER_LENGTH + payload_len + PACKET_TAG_LENGTH, 0);
        Ok(packet)
    }

    /// Compute the CBC-MAC over header + payload and write it into the tag
    /// slot.
    pub fn seal(packet: &mut [u8], auth: &mut Authenticator) -> Result<()> {
        if packet.len() < PACKET_HEADER_LENGTH + PACKET_TAG_LENGTH {
            return Err(PipelineError::MalformedPacket(format!(
                "{} bytes is too short to seal",
                packet.len()
            )));
        }
        let boundary = packet.len() - PACKET_TAG_LENGTH;
        let tag = auth.tag(&packet[..boundary])?;
        packet[boundary..].copy_from_slice(&tag);
        Ok(())
    }
}

/// Header and payload of a packet parsed on the host side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub sender_id: u8,
    pub payload_length: u16,
    pub serial: u32,
    pub coefficients: Vec<Q15>,
    pub tag: [u8; PACKET_TAG_LENGTH],
}

pub struct PacketDecoder;

impl PacketDecoder {
    /// Recover (sender_id, payload_length, serial) from the fixed header.
    pub fn decode_header(data: &[u8]) -> Result<(u8, u16, u32)> {
        if data.len() < PACKET_HEADER_LENGTH {
            return Err(PipelineError::MalformedPacket(format!(
                "{} bytes is shorter than the {PACKET_HEADER_LENGTH}-byte header",
                data.len()
            )));
        }
        if data[0] != 0x00 {
            return Err(PipelineError::MalformedPacket(format!(
                "reserved byte is {:#04x}, expected 0x00",
                data[0]
            )));
        }
        let sender_id = data[1];
        let payload_length = u16::from_be_bytes([data[2], data[3]]);
        let serial = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        Ok((sender_id, payload_length, serial))
    }

    /// Parse a complete packet. The tag is extracted, not verified; use
    /// [`PacketDecoder::verify`] to check it.
    pub fn decode(data: &[u8]) -> Result<ParsedPacket> {
        let (sender_id, payload_length, serial) = Self::decode_header(data)?;
        let expected = PACKET_HEADER_LENGTH + payload_length as usize + PACKET_TAG_LENGTH;
        if data.len() != expected {
            return Err(PipelineError::MalformedPacket(format!(
                "{} bytes on the wire, header implies {expected}",
                data.len()
            )));
        }
        if payload_length % 2 != 0 {
            return Err(PipelineError::MalformedPacket(format!(
                "payload length {payload_length} is not a whole number of Q15 coefficients"
            )));
        }
        let payload = &data[PACKET_HEADER_LENGTH..PACKET_HEADER_LENGTH + payload_length as usize];
        let coefficients = payload
            .chunks_exact(2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .collect();
        let mut tag = [0u8; PACKET_TAG_LENGTH];
        tag.copy_from_slice(&data[expected - PACKET_TAG_LENGTH..]);
        Ok(ParsedPacket {
            sender_id,
            payload_length,
            serial,
            coefficients,
            tag,
        })
    }

    /// Recompute the CBC-MAC over header + payload and compare against the
    /// transmitted tag.
    pub fn verify(data: &[u8], auth: &mut Authenticator) -> Result<ParsedPacket> {
        let parsed = Self::decode(data)?;
        let boundary = data.len() - PACKET_TAG_LENGTH;
        let tag = auth.tag(&data[..boundary])?;
        if tag != parsed.tag {
            return Err(PipelineError::TagMismatch);
        }
        Ok(parsed)
    }
}

/// Lowercase hex of a packet, the firmware's wire-trace format.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 * bytes.len());
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub fn hex_decode(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(PipelineError::MalformedPacket(
            "hex string has odd length".into(),
        ));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| {
                PipelineError::MalformedPacket(format!("invalid hex at offset {i}"))
            })
        })
        .collect()
}
