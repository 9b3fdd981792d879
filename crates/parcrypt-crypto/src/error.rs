use thiserror::Error;

/// Failures raised while building or running a cipher
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("unsupported cipher configuration: {0}")]
    Unsupported(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid IV length: expected {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("chunk offset {offset} is not a multiple of the {block_size}-byte block size")]
    UnalignedOffset { offset: u64, block_size: usize },

    #[error("input of {len} bytes is not a multiple of the {block_size}-byte block size")]
    UnalignedInput { len: usize, block_size: usize },

    #[error("invalid PKCS#7 padding (wrong password or corrupted data)")]
    BadPadding,

    #[error("counter keystream exhausted")]
    KeystreamExhausted,

    #[error("ciphertext too short for authentication tag: {0} bytes")]
    MissingTag(usize),

    #[error("authentication failed (wrong password or corrupted data)")]
    AuthenticationFailed,

    #[error("AEAD encryption failed")]
    AeadEncrypt,
}

/// Failures raised while deriving a key from a password
#[derive(Debug, Error)]
pub enum KdfError {
    #[error("unknown KDF: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid KDF parameters: {0}")]
    InvalidParams(String),

    #[error("key derivation failed: {0}")]
    Failed(String),
}
