use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chainseal_batch::{DEFAULT_CHUNK_SIZE, DEFAULT_SIZE_RANGES};
use chainseal_core::{Suite, SymmetricAlgorithm};
use serde::{Deserialize, Serialize};

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Signing identity of this node
    pub identity: IdentityConfig,

    /// PEM files of the trusted root certificates
    #[serde(default)]
    pub trusted_roots: Vec<PathBuf>,

    /// Batch verification settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Cipher used for encrypted payloads
    #[serde(default = "default_symmetric")]
    pub symmetric_algorithm: SymmetricAlgorithm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub algorithm: Suite,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Inclusive `[low, high]` batch sizes to precompute
    pub size_ranges: Vec<[usize; 2]>,

    /// Signatures per chunk in multi-verify
    pub chunk_size: usize,
}

fn default_symmetric() -> SymmetricAlgorithm {
    SymmetricAlgorithm::Aes128
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            size_ranges: DEFAULT_SIZE_RANGES
                .iter()
                .map(|r| [*r.start(), *r.end()])
                .collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl BatchConfig {
    pub fn ranges(&self) -> Vec<RangeInclusive<usize>> {
        self.size_ranges.iter().map(|[lo, hi]| *lo..=*hi).collect()
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            algorithm: Suite::EcdsaP256,
            cert_path: PathBuf::from("./chainseal-data/node.crt"),
            key_path: PathBuf::from("./chainseal-data/node.key"),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            identity: IdentityConfig::default(),
            trusted_roots: Vec::new(),
            batch: BatchConfig::default(),
            symmetric_algorithm: default_symmetric(),
        }
    }
}

impl NodeConfig {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.chunk_size == 0 {
            bail!("batch.chunk_size must be positive");
        }
        for [lo, hi] in &self.batch.size_ranges {
            if *lo == 0 || lo > hi {
                bail!("invalid batch size range [{}, {}]", lo, hi);
            }
        }
        Ok(())
    }
}

/// Generate a sample configuration rooted at `data_dir`
pub fn generate_sample_config(data_dir: &Path, algorithm: Suite) -> NodeConfig {
    NodeConfig {
        identity: IdentityConfig {
            algorithm,
            cert_path: data_dir.join("node.crt"),
            key_path: data_dir.join("node.key"),
        },
        trusted_roots: vec![data_dir.join("ca.crt")],
        batch: BatchConfig::default(),
        symmetric_algorithm: match algorithm {
            Suite::Sm2 => SymmetricAlgorithm::Sm4,
            Suite::EcdsaP256 => SymmetricAlgorithm::Aes128,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.batch.chunk_size, 50);
        assert_eq!(config.batch.size_ranges, vec![[31, 100], [499, 501]]);
        assert_eq!(config.symmetric_algorithm, SymmetricAlgorithm::Aes128);
        assert_eq!(config.batch.ranges(), vec![31..=100, 499..=501]);
    }

    #[test]
    fn test_sample_config() {
        let config = generate_sample_config(Path::new("/tmp/org1"), Suite::Sm2);
        assert_eq!(config.identity.algorithm, Suite::Sm2);
        assert_eq!(config.symmetric_algorithm, SymmetricAlgorithm::Sm4);
        assert_eq!(config.trusted_roots.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = generate_sample_config(dir.path(), Suite::EcdsaP256);
        config.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"ecdsa_with_sha256\""));

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.identity.key_path, config.identity.key_path);
        assert_eq!(loaded.batch.size_ranges, config.batch.size_ranges);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let json = r#"{"identity":{"algorithm":"sm2_with_sm3","cert_path":"c.pem","key_path":"k.pem"}}"#;
        let config: NodeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.identity.algorithm, Suite::Sm2);
        assert_eq!(config.batch.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.trusted_roots.is_empty());
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut config = NodeConfig::default();
        config.batch.size_ranges = vec![[40, 30]];
        assert!(config.validate().is_err());
        config.batch.size_ranges = vec![[31, 40]];
        config.batch.chunk_size = 0;
        assert!(config.validate().is_err());
    }
}
