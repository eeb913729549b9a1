//! Owned packet buffer with a typed read cursor.

use std::any::Any;

use crate::hash::Md5Hash;

/// String marker byte preceding a non-empty string.
pub const STRING_PRESENT: u8 = 0x0B;

/// Fixed-width little-endian wire primitive.
pub trait Wire: Sized + Default {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the little-endian encoding to `out`.
    fn put(&self, out: &mut Vec<u8>);

    /// Decode from exactly [`SIZE`](Self::SIZE) bytes.
    fn get(bytes: &[u8]) -> Self;
}

macro_rules! impl_wire_num {
    ($($t:ty),* $(,)?) => {
        $(
            impl Wire for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn put(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn get(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_wire_num!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Wire for bool {
    const SIZE: usize = 1;

    fn put(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn get(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// One protocol message: an id plus an owned payload.
///
/// Writes append to the payload. Reads advance a cursor; reading past the end
/// yields the type's default value and flags the packet as overrun instead of
/// panicking. Frame lengths, not individual fields, guard correctness.
#[derive(Default)]
pub struct Packet {
    /// Packet id (see [`ServerPacket`](crate::ServerPacket) and
    /// [`ClientPacket`](crate::ClientPacket)).
    pub id: u16,
    data: Vec<u8>,
    pos: usize,
    overrun: bool,
    /// Correlation handle attached by the sender of a request.
    pub extra: Option<Box<dyn Any + Send>>,
    /// Correlation integer attached by the sender of a request.
    pub extra_int: i32,
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .field("extra_int", &self.extra_int)
            .finish_non_exhaustive()
    }
}

impl Packet {
    /// Empty packet ready for writing.
    pub fn new(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Packet wrapping an already-decoded payload, cursor at the start.
    pub fn from_payload(id: u16, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            ..Default::default()
        }
    }

    /// Full payload regardless of cursor position.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Consume the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Whether a read ran past the end of the payload.
    pub fn is_overrun(&self) -> bool {
        self.overrun
    }

    /// Move the cursor back by `n` bytes.
    pub fn rewind(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    /// Append a fixed-width value.
    pub fn write<T: Wire>(&mut self, value: T) {
        value.put(&mut self.data);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append an unsigned LEB128 integer.
    pub fn write_uleb128(&mut self, mut value: u32) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.data.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Append a string: `0x00` when empty, else `0x0B` + ULEB128 length + UTF-8.
    pub fn write_string(&mut self, s: &str) {
        if s.is_empty() {
            self.data.push(0);
            return;
        }
        self.data.push(STRING_PRESENT);
        self.write_uleb128(s.len() as u32);
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Append a hash as a fixed 32-byte string.
    pub fn write_hash(&mut self, hash: &Md5Hash) {
        self.data.push(STRING_PRESENT);
        self.data.push(0x20);
        let mut raw = [b'0'; Md5Hash::LEN];
        let src = hash.as_str().as_bytes();
        let n = src.len().min(Md5Hash::LEN);
        raw[..n].copy_from_slice(&src[..n]);
        self.data.extend_from_slice(&raw);
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// Read a fixed-width value, or its default past the end.
    pub fn read<T: Wire>(&mut self) -> T {
        match self.take(T::SIZE) {
            Some(bytes) => T::get(bytes),
            None => T::default(),
        }
    }

    /// Read `n` raw bytes, or `None` past the end.
    pub fn read_bytes(&mut self, n: usize) -> Option<&[u8]> {
        self.take(n)
    }

    /// Read an unsigned LEB128 integer.
    pub fn read_uleb128(&mut self) -> u32 {
        let mut result = 0u32;
        let mut shift = 0u32;
        loop {
            let byte: u8 = self.read();
            if shift < 32 {
                result |= u32::from(byte & 0x7F) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 || self.overrun {
                return result;
            }
        }
    }

    /// Read a string. Invalid UTF-8 is replaced rather than rejected.
    pub fn read_string(&mut self) -> String {
        if self.read::<u8>() == 0 {
            return String::new();
        }
        let len = self.read_uleb128() as usize;
        match self.take(len) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => String::new(),
        }
    }

    /// Skip over a string without decoding it.
    pub fn skip_string(&mut self) {
        if self.read::<u8>() == 0 {
            return;
        }
        let len = self.read_uleb128() as usize;
        let _ = self.take(len);
    }

    /// Read a hash string, truncated to 32 characters.
    pub fn read_hash(&mut self) -> Md5Hash {
        if self.read::<u8>() == 0 {
            return Md5Hash::default();
        }
        let len = self.read_uleb128() as usize;
        let keep = len.min(Md5Hash::LEN);
        let hash = match self.take(keep) {
            Some(bytes) => Md5Hash::from_hex(&String::from_utf8_lossy(bytes)),
            None => Md5Hash::default(),
        };
        if len > keep {
            let _ = self.take(len - keep);
        }
        hash
    }

    fn take(&mut self, n: usize) -> Option<&[u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.data.len() {
            self.pos = self.data.len();
            self.overrun = true;
            return None;
        }
        let start = self.pos;
        self.pos = end;
        Some(&self.data[start..end])
    }
}
