//! Mode classification
//!
//! Decides, before any planning happens, whether a (family, mode) pair may be
//! split across workers and whether it needs an IV in the file header.

use serde::Serialize;

use crate::catalog::{AlgorithmSpec, BlockMode, CipherFamily};
use crate::GCM_NONCE_LEN;

/// How a mode's output for block *i* depends on other blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeClass {
    /// Keystream for block i is a function of (base counter + i)
    CounterStyle,
    /// Every block is transformed on its own
    BlockIndependent,
    /// Block i depends on ciphertext or keystream of block i-1
    Chained,
    /// Single authentication tag over the whole payload
    Authenticated,
    /// Stream cipher without a block mode
    Stream,
}

pub fn classify(family: CipherFamily, mode: BlockMode) -> ModeClass {
    if family.is_stream() {
        return ModeClass::Stream;
    }
    match mode {
        BlockMode::Ctr => ModeClass::CounterStyle,
        BlockMode::Ecb => ModeClass::BlockIndependent,
        BlockMode::Cbc | BlockMode::Cfb | BlockMode::Ofb => ModeClass::Chained,
        BlockMode::Gcm => ModeClass::Authenticated,
        BlockMode::None => ModeClass::Stream,
    }
}

/// True only for counter-style and block-independent modes of block ciphers.
///
/// GCM is deliberately excluded: its tag covers the whole payload, so chunks
/// cannot be authenticated independently without a different file format.
pub fn is_parallelizable(family: CipherFamily, mode: BlockMode) -> bool {
    matches!(
        classify(family, mode),
        ModeClass::CounterStyle | ModeClass::BlockIndependent
    )
}

/// False for stream ciphers and ECB; every other mode carries an IV.
pub fn needs_iv(family: CipherFamily, mode: BlockMode) -> bool {
    !matches!(
        classify(family, mode),
        ModeClass::Stream | ModeClass::BlockIndependent
    )
}

/// Modes whose final block carries PKCS#7 padding
pub fn is_padded(mode: BlockMode) -> bool {
    matches!(mode, BlockMode::Ecb | BlockMode::Cbc)
}

/// IV length written to the header (0 when the mode has none)
pub fn iv_len(spec: &AlgorithmSpec, mode: BlockMode) -> usize {
    if !needs_iv(spec.family, mode) {
        0
    } else if mode == BlockMode::Gcm {
        GCM_NONCE_LEN
    } else {
        spec.block_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::lookup;

    #[test]
    fn counter_and_ecb_are_parallel() {
        assert!(is_parallelizable(CipherFamily::Aes, BlockMode::Ctr));
        assert!(is_parallelizable(CipherFamily::Twofish, BlockMode::Ecb));
    }

    #[test]
    fn chained_modes_are_sequential() {
        for mode in [BlockMode::Cbc, BlockMode::Cfb, BlockMode::Ofb] {
            assert!(!is_parallelizable(CipherFamily::Aes, mode), "{mode}");
            assert!(needs_iv(CipherFamily::Aes, mode), "{mode}");
        }
    }

    #[test]
    fn gcm_is_sequential_with_short_nonce() {
        assert!(!is_parallelizable(CipherFamily::Aes, BlockMode::Gcm));
        assert_eq!(iv_len(lookup("aes-128").unwrap(), BlockMode::Gcm), GCM_NONCE_LEN);
    }

    #[test]
    fn stream_cipher_is_sequential_without_iv() {
        assert!(!is_parallelizable(CipherFamily::ChaCha20, BlockMode::None));
        assert!(!needs_iv(CipherFamily::ChaCha20, BlockMode::None));
        assert_eq!(iv_len(lookup("chacha20").unwrap(), BlockMode::None), 0);
    }

    #[test]
    fn ecb_has_no_iv() {
        assert!(!needs_iv(CipherFamily::Aes, BlockMode::Ecb));
        assert_eq!(iv_len(lookup("aes-256").unwrap(), BlockMode::Ecb), 0);
        assert_eq!(iv_len(lookup("aes-256").unwrap(), BlockMode::Ctr), 16);
    }

    #[test]
    fn padding_only_for_ecb_and_cbc() {
        assert!(is_padded(BlockMode::Ecb));
        assert!(is_padded(BlockMode::Cbc));
        assert!(!is_padded(BlockMode::Ctr));
        assert!(!is_padded(BlockMode::Cfb));
    }
}
