//! BIP 32 hierarchical deterministic keychains: master key derivation from
//! a seed, hardened and non-hardened child derivation, public views, and the
//! 78 byte extended key form.

use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};

use crate::error::{Error, Result};
use crate::hashes::{hash160, hmac_sha512};

pub const HARDENED: u32 = 0x8000_0000;

/// Version prefixes of serialized extended keys. The defaults are the main
/// network `xprv`/`xpub` values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyVersions {
    pub private: u32,
    pub public: u32,
}

impl Default for KeyVersions {
    fn default() -> Self {
        KeyVersions { private: 0x0488ADE4, public: 0x0488B21E }
    }
}

/// Master key material: HMAC-SHA512 of the seed under the key
/// `"Bitcoin seed"`, split into key and chain code halves.
pub struct HDSeed {
    master_key: [u8; 32],
    master_chain_code: [u8; 32],
}

impl HDSeed {
    pub fn new(seed: &[u8]) -> Self {
        let digest = hmac_sha512(b"Bitcoin seed", seed);
        HDSeed {
            master_key: digest[..32].try_into().unwrap(),
            master_chain_code: digest[32..].try_into().unwrap(),
        }
    }

    pub fn master_key(&self) -> &[u8; 32] {
        &self.master_key
    }

    pub fn master_chain_code(&self) -> &[u8; 32] {
        &self.master_chain_code
    }
}

/// One node of a key tree. Immutable; derivation returns new nodes.
///
/// The 33 byte key holds a zero-prefixed scalar for private nodes and a
/// compressed curve point for public ones.
#[derive(Clone, Debug, PartialEq)]
pub struct HDKeychain {
    versions: KeyVersions,
    version: u32,
    depth: u8,
    parent_fp: u32,
    child_num: u32,
    chain_code: [u8; 32],
    key: [u8; 33],
    pub_key: [u8; 33],
}

impl HDKeychain {
    /// Master private keychain from a seed.
    pub fn master(seed: &HDSeed, versions: KeyVersions) -> Result<Self> {
        Self::private(seed.master_key(), seed.master_chain_code(), versions)
    }

    /// Private keychain at depth 0 from raw key material.
    pub fn private(key: &[u8; 32], chain_code: &[u8; 32], versions: KeyVersions) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(key).map_err(|_| Error::InvalidExtendedKey)?;
        let pub_key = PublicKey::from_secret_key(&secp, &secret).serialize();

        let mut key_field = [0_u8; 33];
        key_field[1..].copy_from_slice(key);

        Ok(HDKeychain {
            versions,
            version: versions.private,
            depth: 0,
            parent_fp: 0,
            child_num: 0,
            chain_code: *chain_code,
            key: key_field,
            pub_key,
        })
    }

    /// Reads the 78 byte serialized form.
    pub fn from_extended_key(extkey: &[u8], versions: KeyVersions) -> Result<Self> {
        if extkey.len() != 78 {
            return Err(Error::InvalidExtendedKey);
        }
        let version = u32::from_be_bytes(extkey[0..4].try_into().unwrap());
        let depth = extkey[4];
        let parent_fp = u32::from_be_bytes(extkey[5..9].try_into().unwrap());
        let child_num = u32::from_be_bytes(extkey[9..13].try_into().unwrap());
        let chain_code: [u8; 32] = extkey[13..45].try_into().unwrap();
        let key: [u8; 33] = extkey[45..78].try_into().unwrap();

        let secp = Secp256k1::new();
        let pub_key = if key[0] == 0x00 {
            let secret = SecretKey::from_slice(&key[1..]).map_err(|_| Error::InvalidExtendedKey)?;
            PublicKey::from_secret_key(&secp, &secret).serialize()
        } else {
            PublicKey::from_slice(&key).map_err(|_| Error::InvalidExtendedKey)?.serialize()
        };

        Ok(HDKeychain { versions, version, depth, parent_fp, child_num, chain_code, key, pub_key })
    }

    /// The 78 byte form: version (u32 BE) || depth || parent fingerprint
    /// (BE) || child number (BE) || chain code || key.
    pub fn extended_key(&self) -> [u8; 78] {
        let mut extkey = [0_u8; 78];
        extkey[0..4].copy_from_slice(&self.version.to_be_bytes());
        extkey[4] = self.depth;
        extkey[5..9].copy_from_slice(&self.parent_fp.to_be_bytes());
        extkey[9..13].copy_from_slice(&self.child_num.to_be_bytes());
        extkey[13..45].copy_from_slice(&self.chain_code);
        extkey[45..78].copy_from_slice(&self.key);
        extkey
    }

    pub fn is_private(&self) -> bool {
        self.key[0] == 0x00
    }

    pub fn versions(&self) -> KeyVersions {
        self.versions
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn parent_fingerprint(&self) -> u32 {
        self.parent_fp
    }

    pub fn child_num(&self) -> u32 {
        self.child_num
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn key(&self) -> &[u8; 33] {
        &self.key
    }

    pub fn pub_key(&self) -> &[u8; 33] {
        &self.pub_key
    }

    /// RIPEMD160(SHA256(public key)).
    pub fn key_hash(&self) -> [u8; 20] {
        hash160(&self.pub_key)
    }

    /// The first four bytes of [Self::key_hash].
    pub fn fingerprint(&self) -> u32 {
        u32::from_be_bytes(self.key_hash()[..4].try_into().unwrap())
    }

    /// The public view of this node: same position in the tree, point
    /// instead of scalar.
    pub fn public(&self) -> HDKeychain {
        HDKeychain {
            versions: self.versions,
            version: self.versions.public,
            depth: self.depth,
            parent_fp: self.parent_fp,
            child_num: self.child_num,
            chain_code: self.chain_code,
            key: self.pub_key,
            pub_key: self.pub_key,
        }
    }

    /// Derives child `i`. Indices at or above [HARDENED] use hardened
    /// derivation and require a private parent.
    ///
    /// Fails with [Error::DerivationFailed] for the (astronomically rare)
    /// indices where the derived scalar falls outside the curve order; per
    /// BIP 32 the caller proceeds with index `i + 1`.
    pub fn get_child(&self, i: u32) -> Result<HDKeychain> {
        let hardened = i & HARDENED != 0;
        if hardened && !self.is_private() {
            return Err(Error::DerivationFailed);
        }

        let mut data = Vec::with_capacity(37);
        if hardened {
            data.extend_from_slice(&self.key);
        } else {
            data.extend_from_slice(&self.pub_key);
        }
        data.extend_from_slice(&i.to_be_bytes());

        let digest = hmac_sha512(&self.chain_code, &data);
        let left: [u8; 32] = digest[..32].try_into().unwrap();
        let tweak = Scalar::from_be_bytes(left).map_err(|_| Error::DerivationFailed)?;

        let secp = Secp256k1::new();
        let (key, pub_key) = if self.is_private() {
            let secret = SecretKey::from_slice(&self.key[1..]).expect("validated on construction");
            let child_secret = secret.add_tweak(&tweak).map_err(|_| Error::DerivationFailed)?;
            let mut key = [0_u8; 33];
            key[1..].copy_from_slice(&child_secret.secret_bytes());
            (key, PublicKey::from_secret_key(&secp, &child_secret).serialize())
        } else {
            let point = PublicKey::from_slice(&self.pub_key).expect("validated on construction");
            let child_point =
                point.add_exp_tweak(&secp, &tweak).map_err(|_| Error::DerivationFailed)?;
            (child_point.serialize(), child_point.serialize())
        };

        Ok(HDKeychain {
            versions: self.versions,
            version: self.version,
            depth: self.depth.wrapping_add(1),
            parent_fp: self.fingerprint(),
            child_num: i,
            chain_code: digest[32..].try_into().unwrap(),
            key,
            pub_key,
        })
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use rstest::*;

    use crate::address::to_base58_check_raw;

    use super::*;

    fn master(seed: &[u8]) -> HDKeychain {
        HDKeychain::master(&HDSeed::new(seed), KeyVersions::default()).unwrap()
    }

    fn base58(keychain: &HDKeychain) -> String {
        to_base58_check_raw(&keychain.extended_key())
    }

    /// BIP 32 test vector 1.
    #[test]
    fn test_vector_1() {
        let priv_m = master(&hex!("000102030405060708090a0b0c0d0e0f"));
        assert_eq!(
            base58(&priv_m),
            "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi"
        );
        assert_eq!(
            base58(&priv_m.public()),
            "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8"
        );

        let priv_m0h = priv_m.get_child(HARDENED).unwrap();
        assert_eq!(
            base58(&priv_m0h),
            "xprv9uHRZZhk6KAJC1avXpDAp4MDc3sQKNxDiPvvkX8Br5ngLNv1TxvUxt4cV1rGL5hj6KCesnDYUhd7oWgT11eZG7XnxHrnYeSvkzY7d2bhkJ7"
        );
        assert_eq!(
            base58(&priv_m0h.public()),
            "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw"
        );

        let priv_m0h1 = priv_m0h.get_child(1).unwrap();
        assert_eq!(
            base58(&priv_m0h1),
            "xprv9wTYmMFdV23N2TdNG573QoEsfRrWKQgWeibmLntzniatZvR9BmLnvSxqu53Kw1UmYPxLgboyZQaXwTCg8MSY3H2EU4pWcQDnRnrVA1xe8fs"
        );
        assert_eq!(
            base58(&priv_m0h1.public()),
            "xpub6ASuArnXKPbfEwhqN6e3mwBcDTgzisQN1wXN9BJcM47sSikHjJf3UFHKkNAWbWMiGj7Wf5uMash7SyYq527Hqck2AxYysAA7xmALppuCkwQ"
        );
        assert_eq!(priv_m0h1.depth(), 2);
        assert_eq!(priv_m0h1.parent_fingerprint(), priv_m0h.fingerprint());
    }

    /// BIP 32 test vector 2.
    #[test]
    fn test_vector_2() {
        let seed = hex!(
            "fffcf9f6f3f0edeae7e4e1dedbd8d5d2cfccc9c6c3c0bdbab7b4b1aeaba8a5a2"
            "9f9c999693908d8a8784817e7b7875726f6c696663605d5a5754514e4b484542"
        );
        let priv_m = master(&seed);
        assert_eq!(
            base58(&priv_m),
            "xprv9s21ZrQH143K31xYSDQpPDxsXRTUcvj2iNHm5NUtrGiGG5e2DtALGdso3pGz6ssrdK4PFmM8NSpSBHNqPqm55Qn3LqFtT2emdEXVYsCzC2U"
        );

        let child = priv_m
            .get_child(0)
            .unwrap()
            .get_child(HARDENED | 2147483647)
            .unwrap()
            .get_child(1)
            .unwrap();
        assert_eq!(
            base58(&child.public()),
            "xpub6DF8uhdarytz3FWdA8TvFSvvAh8dP3283MY7p2V4SeE2wyWmG5mg5EwVvmdMVCQcoNJxGoWaU9DCWh89LojfZ537wTfunKau47EL2dhHKon"
        );
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(42)]
    fn test_public_derivation_commutes(#[case] i: u32) {
        let priv_m = master(b"a reasonably long master seed");
        let via_private = priv_m.get_child(i).unwrap().public();
        let via_public = priv_m.public().get_child(i).unwrap();
        assert_eq!(via_private, via_public);
    }

    #[test]
    fn test_hardened_derivation_requires_private_parent() {
        let pub_m = master(b"a reasonably long master seed").public();
        assert!(!pub_m.is_private());
        assert!(matches!(pub_m.get_child(HARDENED | 7), Err(Error::DerivationFailed)));
    }

    #[test]
    fn test_extended_key_round_trip() {
        let priv_m = master(b"another seed").get_child(3).unwrap();
        let extkey = priv_m.extended_key();
        assert_eq!(extkey.len(), 78);

        let parsed = HDKeychain::from_extended_key(&extkey, KeyVersions::default()).unwrap();
        assert_eq!(parsed, priv_m);
        assert!(parsed.is_private());

        let pub_parsed =
            HDKeychain::from_extended_key(&priv_m.public().extended_key(), KeyVersions::default())
                .unwrap();
        assert_eq!(pub_parsed, priv_m.public());
        assert!(!pub_parsed.is_private());
    }

    #[test]
    fn test_extended_key_rejects_bad_input() {
        assert!(matches!(
            HDKeychain::from_extended_key(&[0; 77], KeyVersions::default()),
            Err(Error::InvalidExtendedKey)
        ));

        // a public key prefix that is not a valid curve point
        let mut extkey = master(b"another seed").public().extended_key();
        extkey[45] = 0x07;
        assert!(matches!(
            HDKeychain::from_extended_key(&extkey, KeyVersions::default()),
            Err(Error::InvalidExtendedKey)
        ));
    }

    #[test]
    fn test_public_view_shares_identity() {
        let node = master(b"seed bytes").get_child(9).unwrap();
        let public = node.public();
        assert_eq!(public.fingerprint(), node.fingerprint());
        assert_eq!(public.key_hash(), node.key_hash());
        assert_eq!(public.chain_code(), node.chain_code());
        assert_eq!(public.depth(), node.depth());
        assert_eq!(public.child_num(), node.child_num());
    }
}
