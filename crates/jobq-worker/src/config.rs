use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub broker_address: String,
    pub worker_id: Option<String>,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            broker_address: "127.0.0.1:7070".to_string(),
            worker_id: None,
            poll_interval_ms: 200,
            heartbeat_interval_secs: 15,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// The configured worker id, or one of the form `<hostname>-<pid>-<random>`.
    pub fn resolve_worker_id(&self) -> String {
        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = std::process::id();
        let random = uuid::Uuid::new_v4().simple().to_string();

        format!("{host}-{pid}-{}", &random[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_worker_id_wins() {
        let config = WorkerConfig {
            worker_id: Some("fixed-id".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_worker_id(), "fixed-id");
    }

    #[test]
    fn test_generated_worker_id_is_unique() {
        let config = WorkerConfig::default();
        assert_ne!(config.resolve_worker_id(), config.resolve_worker_id());
    }
}
