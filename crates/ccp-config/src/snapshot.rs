//! Config snapshots for run reports and deployment manifests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::resolve::ConfigOrigin;
use crate::CONFIG_SCHEMA_VERSION;

/// Identifies the configuration a run used, without embedding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub schema_version: String,
    /// SHA-256 of the canonical JSON rendering.
    pub config_hash: String,
    /// Where the config came from (`defaults` or a file path).
    pub origin: String,
    pub captured_at: String,
}

impl ConfigSnapshot {
    pub fn capture(config: &PipelineConfig, origin: &ConfigOrigin) -> Result<Self, ConfigError> {
        Ok(Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            config_hash: config_hash(config)?,
            origin: match origin {
                ConfigOrigin::Defaults => "defaults".to_string(),
                ConfigOrigin::File(path) => path.display().to_string(),
            },
            captured_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Hash of the canonical JSON rendering of `config`.
pub fn config_hash(config: &PipelineConfig) -> Result<String, ConfigError> {
    let json = serde_json::to_vec(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&json)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = PipelineConfig::default();
        let mut b = a.clone();
        assert_eq!(config_hash(&a).unwrap(), config_hash(&b).unwrap());

        b.lake.bucket = "another-bucket".to_string();
        assert_ne!(config_hash(&a).unwrap(), config_hash(&b).unwrap());
    }

    #[test]
    fn snapshot_records_origin() {
        let snap = ConfigSnapshot::capture(&PipelineConfig::default(), &ConfigOrigin::Defaults)
            .unwrap();
        assert_eq!(snap.origin, "defaults");
        assert_eq!(snap.config_hash.len(), 64);
    }
}
