//! Base-58-check wrapping for addresses, wallet import keys and extended
//! keys, together with the configurable address version bytes.

use crate::error::{Error, Result};

/// Version bytes prefixed to pay-to-address and pay-to-script-hash payloads.
/// The defaults are the main network values; pass a custom pair to target
/// another chain instead of mutating process state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AddressVersions {
    pub address: u8,
    pub multisig: u8,
}

impl Default for AddressVersions {
    fn default() -> Self {
        AddressVersions { address: 0x00, multisig: 0x05 }
    }
}

/// Encodes `version || payload` with a 4-byte double-SHA-256 checksum.
pub fn to_base58_check(payload: &[u8], version: u8) -> String {
    let mut data = Vec::with_capacity(payload.len() + 1);
    data.push(version);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

/// Checksum-only form, used for 78 byte extended keys which carry their
/// version inside the payload.
pub fn to_base58_check_raw(data: &[u8]) -> String {
    bs58::encode(data).with_check().into_string()
}

/// Decodes and splits off the leading version byte.
pub fn from_base58_check(s: &str) -> Result<(Vec<u8>, u8)> {
    let data = from_base58_check_raw(s)?;
    if data.is_empty() {
        return Err(Error::malformed("base58check payload is empty"));
    }
    Ok((data[1..].to_vec(), data[0]))
}

pub fn from_base58_check_raw(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| Error::malformed(format!("invalid base58check string: {e}")))
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_known_address() {
        // hash160 of the canonical sample public key
        let pub_key_hash = hex!("010966776006953d5567439e5e39f86a0d273bee");
        let address = to_base58_check(&pub_key_hash, 0x00);
        assert_eq!(address, "16UwLL9Risc3QfPqBUvKofHmBQ7wMtjvM");

        let (payload, version) = from_base58_check(&address).unwrap();
        assert_eq!(version, 0x00);
        assert_eq!(payload, pub_key_hash);
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        assert!(from_base58_check("16UwLL9Risc3QfPqBUvKofHmBQ7wMtjvm").is_err());
    }

    #[test]
    fn test_raw_round_trip() {
        let data = hex!("0488ade4000000000000000000");
        let encoded = to_base58_check_raw(&data);
        assert_eq!(from_base58_check_raw(&encoded).unwrap(), data);
    }
}
