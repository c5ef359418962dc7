use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Input buffer ended before a complete structure could be read.
    #[error("input ended before a complete structure")]
    Truncated,

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("'{0}' is not a known command")]
    UnknownCommand(String),

    #[error("header checksum does not match payload")]
    ChecksumMismatch,

    /// A block's computed transaction merkle root disagrees with its
    /// header.
    #[error("block merkle root does not match header")]
    MerkleRootMismatch,

    /// A partial merkle tree's recomputed root disagrees with the expected
    /// root.
    #[error("recomputed merkle root does not match expected root")]
    RootMismatch,

    /// A partial merkle tree had set flag bits left over after traversal.
    #[error("trailing flag bits are not zero")]
    ExcessBits,

    #[error("target mantissa too large")]
    MantissaTooLarge,

    #[error("target exponent too large")]
    ExponentTooLarge,

    #[error("public key is not part of this input")]
    UnknownPublicKey,

    #[error("public key already added")]
    DuplicatePublicKey,

    #[error("invalid redeem script: {0}")]
    InvalidRedeemScript(String),

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("signing failed")]
    SigningFailed,

    #[error("transaction {0} is not a registered dependency")]
    DependencyMissing(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("connection closed with code {0}")]
    ConnectionClosed(i32),

    #[error("connection failed: {0}")]
    ConnectionFailed(#[from] std::io::Error),

    #[error("invalid extended key")]
    InvalidExtendedKey,

    /// The derived child key fell outside the valid scalar/point range.
    /// Callers retry at the next index.
    #[error("child key derivation failed")]
    DerivationFailed,
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::Malformed(msg.into())
    }
}
