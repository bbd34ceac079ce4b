//! Object identifiers for NoteWriter records.
//!
//! Every persistent object carries an `Oid`: a 40-character lowercase hex
//! string over 20 bytes. Content-addressed objects (blobs, packfiles) derive
//! their OID from their canonical bytes; fresh logical objects (a note seen
//! for the first time) mint a random OID. OIDs are permanent: identity across
//! edits is preserved through the index match chain, never by recomputing.

use std::{fmt::Display, io, str::FromStr};

use serde::{Deserialize, Serialize, de, ser};
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::errors::NtError;

/// Byte length of an OID.
pub const OID_LEN: usize = 20;
/// Hex string length of an OID.
pub const OID_HEX_LEN: usize = 40;

/// Concrete object ID value.
///
/// Supports conversion to/from hex strings and byte slices, content hashing,
/// and random minting for fresh logical objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid([u8; OID_LEN]);

impl Default for Oid {
    fn default() -> Self {
        Oid::nil()
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Oid {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Parse a 40-char lowercase hex string into an `Oid`.
impl FromStr for Oid {
    type Err = NtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != OID_HEX_LEN {
            return Err(NtError::InvalidOid(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| NtError::InvalidOid(s.to_string()))?;
        let mut h = [0u8; OID_LEN];
        h.copy_from_slice(bytes.as_slice());
        Ok(Oid(h))
    }
}

impl Serialize for Oid {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Oid::from_str(&s).map_err(de::Error::custom)
    }
}

impl Oid {
    /// The all-zero OID. Never persisted as a real identity; used as the
    /// placeholder while a content OID is being computed.
    pub const fn nil() -> Oid {
        Oid([0u8; OID_LEN])
    }

    /// True when this is the all-zero placeholder.
    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; OID_LEN]
    }

    /// Zero-filled hex string.
    pub fn zero_str() -> String {
        "0".repeat(OID_HEX_LEN)
    }

    /// Compute the content-derived OID of a byte sequence.
    pub fn for_content(data: &[u8]) -> Oid {
        let digest = Sha1::digest(data);
        let mut bytes = [0u8; OID_LEN];
        bytes.copy_from_slice(digest.as_ref());
        Oid(bytes)
    }

    /// Mint a fresh random OID for a new logical object.
    pub fn random() -> Oid {
        Oid::for_content(Uuid::new_v4().as_bytes())
    }

    /// Create an `Oid` from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Oid, NtError> {
        if bytes.len() != OID_LEN {
            return Err(NtError::InvalidOid(hex::encode(bytes)));
        }
        let mut h = [0u8; OID_LEN];
        h.copy_from_slice(bytes);
        Ok(Oid(h))
    }

    /// Read OID bytes from a stream.
    pub fn from_stream(data: &mut impl io::Read) -> io::Result<Oid> {
        let mut h = [0u8; OID_LEN];
        data.read_exact(&mut h)?;
        Ok(Oid(h))
    }

    /// Object-directory fan-out: first two hex chars and the remaining 38.
    pub fn split_dir(&self) -> (String, String) {
        let hex = self.to_string();
        (hex[..2].to_string(), hex[2..].to_string())
    }

    /// Return raw bytes of the OID.
    pub fn to_data(self) -> Vec<u8> {
        self.0.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Oid;

    /// Hashing "Hello, world!" should match the known SHA-1 value.
    #[test]
    fn test_for_content() {
        let oid = Oid::for_content("Hello, world!".as_bytes());
        assert_eq!(oid.to_string(), "943a702d06f34599aee1f8da8ef9f7296031d699");
    }

    /// Construct an OID from raw bytes.
    #[test]
    fn test_from_bytes() {
        let oid = Oid::from_bytes(&[
            0x8a, 0xb6, 0x86, 0xea, 0xfe, 0xb1, 0xf4, 0x47, 0x02, 0x73, 0x8c, 0x8b, 0x0f, 0x24,
            0xf2, 0x56, 0x7c, 0x36, 0xda, 0x6d,
        ])
        .unwrap();
        assert_eq!(oid.to_string(), "8ab686eafeb1f44702738c8b0f24f2567c36da6d");
    }

    /// Parsing a hex string should round-trip through Display.
    #[test]
    fn test_from_str_round_trip() {
        let hex = "8ab686eafeb1f44702738c8b0f24f2567c36da6d";
        let oid = Oid::from_str(hex).unwrap();
        assert_eq!(oid.to_string(), hex);
    }

    /// Wrong lengths are rejected.
    #[test]
    fn test_invalid_length() {
        assert!(Oid::from_str("8ab686").is_err());
        assert!(Oid::from_bytes(&[0u8; 19]).is_err());
    }

    /// Random OIDs are distinct and not nil.
    #[test]
    fn test_random_distinct() {
        let a = Oid::random();
        let b = Oid::random();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    /// Fan-out split yields a 2-char directory and 38-char file name.
    #[test]
    fn test_split_dir() {
        let oid = Oid::from_str("943a702d06f34599aee1f8da8ef9f7296031d699").unwrap();
        let (dir, rest) = oid.split_dir();
        assert_eq!(dir, "94");
        assert_eq!(rest, "3a702d06f34599aee1f8da8ef9f7296031d699");
    }

    /// YAML serialisation uses the hex form.
    #[test]
    fn test_yaml_round_trip() {
        let oid = Oid::for_content(b"abc");
        let yaml = serde_yaml::to_string(&oid).unwrap();
        let back: Oid = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(oid, back);
    }
}
