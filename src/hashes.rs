use std::fmt;

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::digest::FixedOutput;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::default();
    hasher.update(input);
    hasher.finalize_fixed().into()
}

/// Double SHA-256. The hash function of the protocol: message checksums,
/// transaction and block identities, merkle nodes.
pub fn sha256d(input: &[u8]) -> Hash256 {
    Hash256(sha256(&sha256(input)))
}

/// RIPEMD-160 of SHA-256, used for addresses and key fingerprints.
pub fn hash160(input: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::default();
    hasher.update(sha256(input));
    hasher.finalize_fixed().into()
}

pub fn hmac_sha512(key: &[u8], msg: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// A 256 bit hash in the byte order produced by [sha256d].
///
/// Hex display follows the convention of reversing the bytes, so
/// `to_hex`/`from_hex` show the familiar big-endian form while the wire and
/// all internal computations use the bytes as stored.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| Error::Truncated)?;
        Ok(Hash256(arr))
    }

    /// Parses the reversed (display) hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::malformed(format!("invalid hash hex: {e}")))?;
        let mut arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::malformed("hash hex must be 64 characters"))?;
        arr.reverse();
        Ok(Hash256(arr))
    }

    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}
