//! Frame encoding and multi-frame batch decoding.
//!
//! ```text
//! +---------------+----------+-------------------+-----------------+
//! | id (2 bytes)  | reserved | length (4 bytes)  |    payload      |
//! | u16 LE        | u8 = 0   | u32 little-endian | (length bytes)  |
//! +---------------+----------+-------------------+-----------------+
//! ```
//!
//! A response body is any number of frames back to back. The length does not
//! include the 7 header bytes. A length of 0 is a valid empty frame.

use tracing::debug;

use crate::packet::Packet;

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 7;

/// Largest payload accepted from the server.
pub const MAX_PAYLOAD_SIZE: u32 = 10 * 1024 * 1024;

/// Errors that can occur while decoding a single frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes are available than the header or declared payload needs.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes needed for the complete frame.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The declared payload size exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The declared payload size.
        size: u32,
        /// The configured maximum.
        max: u32,
    },
}

/// Append one frame to `out`.
pub fn encode_frame(id: u16, payload: &[u8], out: &mut Vec<u8>) {
    out.reserve(HEADER_LEN + payload.len());
    out.extend_from_slice(&id.to_le_bytes());
    out.push(0);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Append `packet` as one frame to `out`.
pub fn encode_packet(packet: &Packet, out: &mut Vec<u8>) {
    encode_frame(packet.id, packet.payload(), out);
}

/// Decode the frame at the start of `buf`.
///
/// Returns the packet (payload copied into an owned buffer) and the number of
/// bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<(Packet, usize), FrameError> {
    if buf.len() < HEADER_LEN {
        return Err(FrameError::Truncated {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let id = u16::from_le_bytes([buf[0], buf[1]]);
    // buf[2] is reserved
    let len = u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]);

    if len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let end = HEADER_LEN + len as usize;
    if end > buf.len() {
        return Err(FrameError::Truncated {
            needed: end,
            available: buf.len(),
        });
    }

    Ok((Packet::from_payload(id, buf[HEADER_LEN..end].to_vec()), end))
}

/// Decode every complete frame in `buf`, in order.
///
/// Oversized frames are skipped when their bytes are present and end decoding
/// otherwise. A frame whose declared length runs past the buffer ends decoding
/// silently; nothing after it is trusted.
pub fn decode_batch(buf: &[u8]) -> Vec<Packet> {
    let mut packets = Vec::new();
    let mut offset = 0;

    while buf.len() - offset >= HEADER_LEN {
        match decode_frame(&buf[offset..]) {
            Ok((packet, consumed)) => {
                packets.push(packet);
                offset += consumed;
            }
            Err(FrameError::PayloadTooLarge { size, .. }) => {
                let skip = HEADER_LEN + size as usize;
                if buf.len() - offset < skip {
                    debug!(size, "oversized frame exceeds response, dropping the rest");
                    break;
                }
                debug!(size, "dropping oversized frame");
                offset += skip;
            }
            Err(FrameError::Truncated { needed, available }) => {
                debug!(needed, available, "truncated frame, stopping");
                break;
            }
        }
    }

    packets
}
