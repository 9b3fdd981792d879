//! Static algorithm catalog
//!
//! Every supported (family, key size) pair, its block size and the block modes
//! it can run in. The table is checked for well-formedness at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CipherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherFamily {
    Aes,
    Twofish,
    ChaCha20,
}

impl CipherFamily {
    /// Stream ciphers have no block structure and no block mode
    pub const fn is_stream(self) -> bool {
        matches!(self, CipherFamily::ChaCha20)
    }
}

impl fmt::Display for CipherFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherFamily::Aes => f.write_str("aes"),
            CipherFamily::Twofish => f.write_str("twofish"),
            CipherFamily::ChaCha20 => f.write_str("chacha20"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    /// No block mode (stream ciphers)
    None,
    Ecb,
    Cbc,
    Cfb,
    Ofb,
    Ctr,
    Gcm,
}

impl BlockMode {
    pub const ALL: [BlockMode; 7] = [
        BlockMode::None,
        BlockMode::Ecb,
        BlockMode::Cbc,
        BlockMode::Cfb,
        BlockMode::Ofb,
        BlockMode::Ctr,
        BlockMode::Gcm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockMode::None => "none",
            BlockMode::Ecb => "ecb",
            BlockMode::Cbc => "cbc",
            BlockMode::Cfb => "cfb",
            BlockMode::Ofb => "ofb",
            BlockMode::Ctr => "ctr",
            BlockMode::Gcm => "gcm",
        }
    }
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockMode {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        BlockMode::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| CipherError::Unsupported(format!("unknown block mode '{s}'")))
    }
}

/// Immutable description of one catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlgorithmSpec {
    /// Identifier used in config and on the command line, e.g. "aes-256"
    pub id: &'static str,
    pub family: CipherFamily,
    pub key_size_bits: u32,
    /// 1 for stream ciphers
    pub block_size_bytes: usize,
    pub supported_modes: &'static [BlockMode],
}

impl AlgorithmSpec {
    pub const fn key_len(&self) -> usize {
        (self.key_size_bits / 8) as usize
    }

    pub fn supports(&self, mode: BlockMode) -> bool {
        self.supported_modes.contains(&mode)
    }

    /// The mode used when none is requested
    pub fn default_mode(&self) -> BlockMode {
        if self.family.is_stream() {
            BlockMode::None
        } else {
            BlockMode::Ctr
        }
    }
}

impl fmt::Display for AlgorithmSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

const BLOCK_MODES: &[BlockMode] = &[
    BlockMode::Ecb,
    BlockMode::Cbc,
    BlockMode::Cfb,
    BlockMode::Ofb,
    BlockMode::Ctr,
    BlockMode::Gcm,
];

const STREAM_MODES: &[BlockMode] = &[BlockMode::None];

pub static CATALOG: &[AlgorithmSpec] = &[
    AlgorithmSpec {
        id: "aes-128",
        family: CipherFamily::Aes,
        key_size_bits: 128,
        block_size_bytes: 16,
        supported_modes: BLOCK_MODES,
    },
    AlgorithmSpec {
        id: "aes-192",
        family: CipherFamily::Aes,
        key_size_bits: 192,
        block_size_bytes: 16,
        supported_modes: BLOCK_MODES,
    },
    AlgorithmSpec {
        id: "aes-256",
        family: CipherFamily::Aes,
        key_size_bits: 256,
        block_size_bytes: 16,
        supported_modes: BLOCK_MODES,
    },
    AlgorithmSpec {
        id: "twofish-256",
        family: CipherFamily::Twofish,
        key_size_bits: 256,
        block_size_bytes: 16,
        supported_modes: BLOCK_MODES,
    },
    AlgorithmSpec {
        id: "chacha20",
        family: CipherFamily::ChaCha20,
        key_size_bits: 256,
        block_size_bytes: 1,
        supported_modes: STREAM_MODES,
    },
];

const fn catalog_is_well_formed(catalog: &[AlgorithmSpec]) -> bool {
    let mut i = 0;
    while i < catalog.len() {
        let spec = &catalog[i];
        if spec.key_size_bits == 0 || spec.key_size_bits % 8 != 0 {
            return false;
        }
        if spec.block_size_bytes == 0 || spec.supported_modes.is_empty() {
            return false;
        }
        if spec.family.is_stream() && spec.block_size_bytes != 1 {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = assert!(catalog_is_well_formed(CATALOG), "malformed algorithm catalog");

/// Find a catalog entry by identifier (case-insensitive).
pub fn lookup(id: &str) -> Option<&'static AlgorithmSpec> {
    CATALOG.iter().find(|spec| spec.id.eq_ignore_ascii_case(id))
}

/// Like [`lookup`], but with an error listing the valid identifiers.
pub fn require(id: &str) -> Result<&'static AlgorithmSpec, CipherError> {
    lookup(id).ok_or_else(|| {
        let known: Vec<&str> = CATALOG.iter().map(|s| s.id).collect();
        CipherError::Unsupported(format!(
            "unknown algorithm '{id}' (expected one of: {})",
            known.join(", ")
        ))
    })
}
