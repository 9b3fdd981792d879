use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ParcryptError, ParcryptResult};

/// Top-level configuration (loaded from parcrypt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcryptConfig {
    pub engine: EngineConfig,
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
}

/// Chunked engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker thread count (0 = available cores)
    pub workers: usize,
    /// Allow splitting a file across workers when the mode permits it
    pub parallel: bool,
    /// Smallest chunk handed to a single worker, in KiB (default: 64)
    pub min_chunk_kib: u64,
    /// Read/write buffer per worker, in KiB (default: 64)
    pub buffer_kib: usize,
    /// Write per-chunk output to anonymous temp files instead of memory
    pub spill_to_disk: bool,
}

/// Cipher and key-derivation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Catalog identifier, e.g. "aes-256", "twofish-256", "chacha20"
    pub algorithm: String,
    /// Block mode: "ctr", "ecb", "cbc", "cfb", "ofb", "gcm", "none"
    pub mode: String,
    /// Key derivation function: "pbkdf2-sha256" or "argon2id"
    pub kdf: String,
    /// PBKDF2 iteration count (default: 100000)
    pub pbkdf2_iterations: u32,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Salt length written to each file header, in bytes (default: 16)
    pub salt_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            parallel: true,
            min_chunk_kib: 64,
            buffer_kib: 64,
            spill_to_disk: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            algorithm: "aes-256".into(),
            mode: "ctr".into(),
            kdf: "pbkdf2-sha256".into(),
            pbkdf2_iterations: 100_000,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            salt_len: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl ParcryptConfig {
    /// Parse a config file, or fall back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> ParcryptResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ParcryptResult<()> {
        if self.engine.buffer_kib == 0 {
            return Err(ParcryptError::Config("engine.buffer_kib must be >= 1".into()));
        }
        if self.crypto.salt_len < 8 {
            return Err(ParcryptError::Config(format!(
                "crypto.salt_len must be >= 8 (got {})",
                self.crypto.salt_len
            )));
        }
        if self.crypto.pbkdf2_iterations == 0 {
            return Err(ParcryptError::Config(
                "crypto.pbkdf2_iterations must be >= 1".into(),
            ));
        }
        match self.logging.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(ParcryptError::Config(format!(
                "logging.format must be \"json\" or \"text\" (got {other:?})"
            ))),
        }
    }

    /// Minimum chunk size in bytes
    pub fn min_chunk_bytes(&self) -> u64 {
        self.engine.min_chunk_kib.saturating_mul(1024)
    }

    /// Worker buffer size in bytes
    pub fn buffer_bytes(&self) -> usize {
        self.engine.buffer_kib.saturating_mul(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[engine]
workers = 8
parallel = false
min_chunk_kib = 256
buffer_kib = 128
spill_to_disk = true

[crypto]
algorithm = "twofish-256"
mode = "ecb"
kdf = "argon2id"
pbkdf2_iterations = 200000
argon2_mem_cost_kib = 131072
argon2_time_cost = 4
argon2_parallelism = 8
salt_len = 32

[logging]
level = "debug"
format = "json"
"#;
        let config: ParcryptConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.engine.workers, 8);
        assert!(!config.engine.parallel);
        assert_eq!(config.min_chunk_bytes(), 256 * 1024);
        assert_eq!(config.buffer_bytes(), 128 * 1024);
        assert!(config.engine.spill_to_disk);
        assert_eq!(config.crypto.algorithm, "twofish-256");
        assert_eq!(config.crypto.mode, "ecb");
        assert_eq!(config.crypto.kdf, "argon2id");
        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert_eq!(config.crypto.salt_len, 32);
        assert_eq!(config.logging.format, "json");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_defaults() {
        let config: ParcryptConfig = toml::from_str("").unwrap();

        assert_eq!(config.engine.workers, 0);
        assert!(config.engine.parallel);
        assert_eq!(config.min_chunk_bytes(), 64 * 1024);
        assert_eq!(config.crypto.algorithm, "aes-256");
        assert_eq!(config.crypto.mode, "ctr");
        assert_eq!(config.crypto.kdf, "pbkdf2-sha256");
        assert_eq!(config.crypto.salt_len, 16);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[crypto]
mode = "cbc"
"#;
        let config: ParcryptConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.crypto.mode, "cbc");
        // Defaults
        assert_eq!(config.crypto.algorithm, "aes-256");
        assert_eq!(config.engine.buffer_kib, 64);
    }

    #[test]
    fn test_validate_rejects_short_salt() {
        let mut config = ParcryptConfig::default();
        config.crypto.salt_len = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = ParcryptConfig::default();
        config.logging.format = "yaml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = ParcryptConfig::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.crypto.algorithm, "aes-256");
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("parcrypt.toml");
        std::fs::write(&path, "[engine]\nworkers = 3\n").unwrap();

        let config = ParcryptConfig::load_or_default(&path).unwrap();
        assert_eq!(config.engine.workers, 3);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("parcrypt.toml");
        std::fs::write(&path, "[engine\nworkers = \"many\"\n").unwrap();

        let err = ParcryptConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, crate::error::ParcryptError::ConfigParse(_)), "{err:?}");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ParcryptConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ParcryptConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.engine.min_chunk_kib, parsed.engine.min_chunk_kib);
        assert_eq!(config.crypto.mode, parsed.crypto.mode);
        assert_eq!(config.logging.format, parsed.logging.format);
    }
}
