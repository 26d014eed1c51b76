use jobq_persistence::JobStoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub network: NetworkConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Enqueue requests are rejected once this many jobs are queued.
    pub queue_depth_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
    pub completed_retention_days: i64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            network: NetworkConfig {
                host: "0.0.0.0".to_string(),
                port: 7070,
                queue_depth_limit: 100_000,
            },
            persistence: PersistenceConfig {
                data_dir: PathBuf::from("./data"),
                completed_retention_days: 7,
            },
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_store_config(&self) -> JobStoreConfig {
        JobStoreConfig {
            data_dir: self.persistence.data_dir.clone(),
            completed_retention_days: self.persistence.completed_retention_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_roundtrip() {
        let config = BrokerConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: BrokerConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.network.port, config.network.port);
        assert_eq!(parsed.persistence.data_dir, config.persistence.data_dir);
    }
}
