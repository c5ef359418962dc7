use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::address::from_base58_check;
use crate::error::{Error, Result};
use crate::hashes::Hash256;

/// An ECDSA key pair over secp256k1. Public keys are always handled in the
/// 33 byte compressed form.
pub struct EcKey {
    secp: Secp256k1<All>,
    secret: SecretKey,
    public: PublicKey,
}

impl EcKey {
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes).map_err(|_| Error::InvalidPrivateKey)?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(EcKey { secp, secret, public })
    }

    /// Imports a private key in wallet import format: base58check of
    /// `version || secret`, with an optional trailing 0x01 compression flag.
    pub fn from_wallet_import(wif: &str) -> Result<Self> {
        let (payload, _version) = from_base58_check(wif).map_err(|_| Error::InvalidPrivateKey)?;
        let secret_bytes = match payload.len() {
            32 => &payload[..],
            33 if payload[32] == 0x01 => &payload[..32],
            _ => return Err(Error::InvalidPrivateKey),
        };
        EcKey::from_secret_bytes(secret_bytes)
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn public_key(&self) -> [u8; 33] {
        self.public.serialize()
    }

    /// DER-encoded ECDSA signature over a 32 byte digest.
    pub fn sign(&self, digest: &Hash256) -> Result<Vec<u8>> {
        let message = Message::from_digest(*digest.as_bytes());
        let signature = self.secp.sign_ecdsa(&message, &self.secret);
        Ok(signature.serialize_der().to_vec())
    }

    pub fn verify(&self, digest: &Hash256, signature_der: &[u8]) -> bool {
        let message = Message::from_digest(*digest.as_bytes());
        match Signature::from_der(signature_der) {
            Ok(signature) => self.secp.verify_ecdsa(&message, &signature, &self.public).is_ok(),
            Err(_) => false,
        }
    }
}
