//! Content digests
//!
//! A [`Digest`] is the 32-byte fingerprint of a serialized blob. It is the key
//! of the content store and the currency passed between storage and cache.
//! Digests are produced by a [`HashAlgorithm`]; both supported algorithms emit
//! 256-bit outputs so digests from either fit the same type.

use crate::{Error, Result};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Length in bytes of every digest
pub const DIGEST_LEN: usize = 32;

/// Number of leading bytes shown by the short rendering
const SHORT_LEN: usize = 8;

/// Hash function used to fingerprint blobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256
    #[default]
    Sha256,
    /// BLAKE3 in its default 256-bit mode
    Blake3,
}

impl HashAlgorithm {
    /// Hash `blob` into a digest
    #[must_use]
    pub fn digest(self, blob: &[u8]) -> Digest {
        match self {
            Self::Sha256 => {
                use sha2::Digest as _;
                let out = Sha256::digest(blob);
                let mut bytes = [0u8; DIGEST_LEN];
                bytes.copy_from_slice(&out);
                Digest(bytes)
            }
            Self::Blake3 => Digest(*blake3::hash(blob).as_bytes()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Blake3 => f.write_str("blake3"),
        }
    }
}

/// Fingerprint of a blob
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash `blob` with the default algorithm
    #[must_use]
    pub fn create(blob: &[u8]) -> Self {
        HashAlgorithm::default().digest(blob)
    }

    /// Build a digest from raw hash output
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDigest`] unless `bytes` is exactly [`DIGEST_LEN`] long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| Error::invalid_digest(DIGEST_LEN, bytes.len()))?;
        Ok(Self(array))
    }

    /// Parse a full hex rendering
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHex`] if the string is not hex and
    /// [`Error::InvalidDigest`] if it decodes to the wrong number of bytes
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str).map_err(|e| Error::invalid_hex(hex_str, e))?;
        Self::from_slice(&bytes)
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Full hex rendering
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Bucket value derived from the digest prefix; only for hash tables
    #[must_use]
    pub fn fast_hash(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(prefix)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_slice(bytes)
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Equal digests share a prefix, so feeding only the prefix keeps Hash consistent with Eq.
impl Hash for Digest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fast_hash());
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..SHORT_LEN]))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_bytes(DigestVisitor)
    }
}

struct DigestVisitor;

impl<'de> Visitor<'de> for DigestVisitor {
    type Value = Digest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DIGEST_LEN} digest bytes")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Digest, E> {
        Digest::from_slice(v).map_err(E::custom)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Digest, A::Error> {
        let mut bytes = Vec::with_capacity(DIGEST_LEN);
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Digest::from_slice(&bytes).map_err(de::Error::custom)
    }
}
