//! Key derivation: password + salt → cipher key (and stream nonce)

use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::catalog::AlgorithmSpec;
use crate::error::KdfError;
use crate::keys::SecretKey;
use crate::STREAM_NONCE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    Pbkdf2Sha256,
    Argon2id,
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdfAlgorithm::Pbkdf2Sha256 => f.write_str("pbkdf2-sha256"),
            KdfAlgorithm::Argon2id => f.write_str("argon2id"),
        }
    }
}

impl FromStr for KdfAlgorithm {
    type Err = KdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pbkdf2-sha256" | "pbkdf2" => Ok(KdfAlgorithm::Pbkdf2Sha256),
            "argon2id" | "argon2" => Ok(KdfAlgorithm::Argon2id),
            _ => Err(KdfError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// KDF parameters. Not stored in the file; decryption must use the same ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// PBKDF2 iteration count, or Argon2 time cost
    pub iterations: u32,
    /// Argon2 memory cost in KiB (ignored by PBKDF2)
    pub mem_cost_kib: u32,
    /// Argon2 lanes (ignored by PBKDF2)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::pbkdf2(100_000)
    }
}

impl KdfParams {
    pub fn pbkdf2(iterations: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Pbkdf2Sha256,
            iterations,
            mem_cost_kib: 0,
            parallelism: 0,
        }
    }

    pub fn argon2id(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            iterations: time_cost,
            mem_cost_kib,
            parallelism,
        }
    }
}

/// Key plus, for stream ciphers, the nonce derived alongside it
#[derive(Debug)]
pub struct KeyMaterial {
    pub key: SecretKey,
    pub stream_nonce: Option<Vec<u8>>,
}

/// Derive `key_len` bytes from a password and salt.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8],
    params: &KdfParams,
    key_len: usize,
) -> Result<SecretKey, KdfError> {
    let mut out = vec![0u8; key_len];
    fill(password, salt, params, &mut out)?;
    Ok(SecretKey::from_bytes(out))
}

/// Derive the key for `spec`. Stream ciphers get `key_len + 12` bytes of
/// output, the tail of which becomes the nonce.
pub fn derive_key_material(
    password: &SecretString,
    salt: &[u8],
    params: &KdfParams,
    spec: &AlgorithmSpec,
) -> Result<KeyMaterial, KdfError> {
    let key_len = spec.key_len();
    if !spec.family.is_stream() {
        return Ok(KeyMaterial {
            key: derive_key(password, salt, params, key_len)?,
            stream_nonce: None,
        });
    }

    let mut out = vec![0u8; key_len + STREAM_NONCE_LEN];
    fill(password, salt, params, &mut out)?;
    let nonce = out[key_len..].to_vec();
    let key = SecretKey::from_bytes(out[..key_len].to_vec());
    out.zeroize();
    Ok(KeyMaterial {
        key,
        stream_nonce: Some(nonce),
    })
}

fn fill(
    password: &SecretString,
    salt: &[u8],
    params: &KdfParams,
    out: &mut [u8],
) -> Result<(), KdfError> {
    if params.iterations == 0 {
        return Err(KdfError::InvalidParams("iterations must be >= 1".into()));
    }
    let secret = password.expose_secret().as_bytes();
    match params.algorithm {
        KdfAlgorithm::Pbkdf2Sha256 => {
            pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, out);
            Ok(())
        }
        KdfAlgorithm::Argon2id => {
            let argon2_params = Params::new(
                params.mem_cost_kib,
                params.iterations,
                params.parallelism,
                Some(out.len()),
            )
            .map_err(|e| KdfError::InvalidParams(format!("Argon2id: {e}")))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
                .hash_password_into(secret, salt, out)
                .map_err(|e| KdfError::Failed(format!("Argon2id: {e}")))
        }
    }
}
