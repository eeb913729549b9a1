//! 32-character lowercase hex MD5 digests.

use md5::{Digest, Md5};

/// An MD5 digest in its protocol form: 32 lowercase hex characters.
///
/// The empty hash is valid and means "no map" / "no password".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Md5Hash(String);

impl Md5Hash {
    /// Length of a complete hash string.
    pub const LEN: usize = 32;

    /// Hash `bytes`.
    pub fn digest(bytes: impl AsRef<[u8]>) -> Self {
        Self(format!("{:x}", Md5::digest(bytes.as_ref())))
    }

    /// Wrap an existing hex string, truncated to 32 characters and lowercased.
    pub fn from_hex(hex: &str) -> Self {
        let mut s: String = hex.chars().take(Self::LEN).collect();
        s.make_ascii_lowercase();
        Self(s)
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the empty hash.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this holds a full 32-character digest.
    pub fn is_complete(&self) -> bool {
        self.0.len() == Self::LEN
    }
}

impl std::fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            Md5Hash::digest("password").as_str(),
            "5f4dcc3b5aa765d61d8327deb882cf99"
        );
        assert!(Md5Hash::digest("").is_complete());
    }

    #[test]
    fn test_from_hex_truncates_and_lowercases() {
        let h = Md5Hash::from_hex(&"AB".repeat(20));
        assert_eq!(h.as_str().len(), 32);
        assert!(h.as_str().chars().all(|c| c == 'a' || c == 'b'));
    }
}
