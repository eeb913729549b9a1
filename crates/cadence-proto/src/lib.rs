//! Binary packet codec for the Cadence online protocol.
//!
//! Every message on the wire is a frame of a 2-byte packet id, one reserved
//! byte, a 4-byte payload length and the payload, all little-endian. A single
//! HTTP body carries any number of back-to-back frames.

pub mod framing;
pub mod hash;
pub mod ids;
pub mod outgoing;
pub mod packet;
pub mod room;
pub mod spectate;

pub use framing::{
    FrameError, HEADER_LEN, MAX_PAYLOAD_SIZE, decode_batch, decode_frame, encode_frame,
    encode_packet,
};
pub use hash::Md5Hash;
pub use ids::{ClientPacket, ServerPacket};
pub use packet::{Packet, Wire};
pub use room::{Room, SLOT_COUNT, Slot};
pub use spectate::{LiveReplayFrame, ReplayFrame, ScoreFrame, SpectateBundle, SpectatorAction};
