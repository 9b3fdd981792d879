//! parcrypt-crypto: cipher selection and key material for the chunked engine
//!
//! Pipeline: password → KDF(salt) → key → per-chunk cipher(iv) → transform
//!
//! ```text
//! catalog   static AlgorithmSpec table (family, key size, block size, modes)
//! mode      which (family, mode) pairs may be split across workers
//! counter   per-chunk IV = base IV + block index (big-endian, wrapping)
//! chunk     ChunkCipher trait + RustCrypto-backed factory
//! kdf       PBKDF2-HMAC-SHA256 / Argon2id password → key
//! keys      zeroizing key container, random salt/IV generation
//! ```

pub mod catalog;
pub mod chunk;
pub mod counter;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod mode;

pub use catalog::{lookup, require, AlgorithmSpec, BlockMode, CipherFamily, CATALOG};
pub use chunk::{create_cipher, ChunkCipher, CipherFactory, CipherParams, KeyedCipherFactory};
pub use counter::derive_chunk_iv;
pub use error::{CipherError, KdfError};
pub use kdf::{derive_key, derive_key_material, KdfAlgorithm, KdfParams, KeyMaterial};
pub use keys::{random_bytes, SecretKey};
pub use mode::{classify, iv_len, is_padded, is_parallelizable, needs_iv, ModeClass};

/// AES-GCM / Twofish-GCM nonce length (96-bit)
pub const GCM_NONCE_LEN: usize = 12;

/// GCM authentication tag length
pub const GCM_TAG_LEN: usize = 16;

/// ChaCha20 (IETF) nonce length, taken from the KDF output
pub const STREAM_NONCE_LEN: usize = 12;
