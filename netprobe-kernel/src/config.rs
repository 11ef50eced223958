use crate::models::Tool;
use serde::{Deserialize, Serialize};
use std::{path::{Path, PathBuf}, time::Duration};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub rate_limit: RateLimitConf,
    pub tools: ToolsConf,
    pub storage: StorageConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitConf {
    pub window_seconds: u64,
    pub max_requests: usize,
    pub max_clients: usize,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ToolsConf {
    pub ping: ToolConf,
    pub nmap: ToolConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolConf {
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConf {
    pub data_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(&'static str),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".into(),
            rate_limit: RateLimitConf::default(),
            tools: ToolsConf::default(),
            storage: StorageConf::default(),
        }
    }
}

impl Default for RateLimitConf {
    fn default() -> Self {
        Self { window_seconds: 60, max_requests: 20, max_clients: 10_000, sweep_interval_seconds: 300 }
    }
}

impl Default for ToolsConf {
    fn default() -> Self {
        Self {
            ping: ToolConf { timeout_seconds: 20 },
            nmap: ToolConf { timeout_seconds: 120 },
        }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./data") }
    }
}

impl RateLimitConf {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl ToolsConf {
    pub fn timeout_for(&self, tool: Tool) -> Duration {
        let conf = match tool {
            Tool::Ping => &self.ping,
            Tool::Nmap => &self.nmap,
        };
        Duration::from_secs(conf.timeout_seconds)
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rl = &self.rate_limit;
        if rl.window_seconds == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_seconds must be > 0"));
        }
        if rl.max_requests == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_requests must be > 0"));
        }
        if rl.max_clients == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_clients must be > 0"));
        }
        if rl.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid("rate_limit.sweep_interval_seconds must be > 0"));
        }
        if self.tools.ping.timeout_seconds == 0 || self.tools.nmap.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("tool timeouts must be > 0"));
        }
        Ok(())
    }

    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: KernelConfig = serde_yaml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Config lue depuis NETPROBE_CONFIG (netprobe.yaml par défaut).
/// Un fichier absent, illisible ou invalide retombe sur la config par défaut.
pub async fn load_config() -> KernelConfig {
    let path = std::env::var("NETPROBE_CONFIG").unwrap_or_else(|_| "netprobe.yaml".into());
    let mut cfg = load_config_from(&path).await;

    if let Ok(listen) = std::env::var("NETPROBE_LISTEN") {
        cfg.listen = listen;
    }
    cfg
}

pub async fn load_config_from(path: &str) -> KernelConfig {
    if !Path::new(path).exists() {
        warn!("no {path} found, using default config");
        return KernelConfig::default();
    }
    match fs::read_to_string(path).await {
        Ok(txt) => KernelConfig::from_yaml(&txt).unwrap_or_else(|e| {
            warn!("{path}: {e}, falling back to defaults");
            KernelConfig::default()
        }),
        Err(e) => {
            warn!("{path}: cannot read config ({e}), falling back to defaults");
            KernelConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(cfg.rate_limit.max_requests, 20);
        assert_eq!(cfg.tools.timeout_for(Tool::Ping), Duration::from_secs(20));
        assert_eq!(cfg.tools.timeout_for(Tool::Nmap), Duration::from_secs(120));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = KernelConfig::from_yaml("rate_limit:\n  max_requests: 5\ntools:\n  nmap:\n    timeout_seconds: 30\n").unwrap();
        assert_eq!(cfg.rate_limit.max_requests, 5);
        assert_eq!(cfg.rate_limit.window_seconds, 60);
        assert_eq!(cfg.tools.timeout_for(Tool::Nmap), Duration::from_secs(30));
        assert_eq!(cfg.tools.timeout_for(Tool::Ping), Duration::from_secs(20));
        assert_eq!(cfg.listen, "0.0.0.0:8000");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(KernelConfig::from_yaml("  \n").unwrap(), KernelConfig::default());
    }

    #[test]
    fn test_rejects_zero_limits() {
        assert!(matches!(
            KernelConfig::from_yaml("rate_limit:\n  max_requests: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            KernelConfig::from_yaml("tools:\n  ping:\n    timeout_seconds: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(matches!(KernelConfig::from_yaml("rate_limit: [1, 2"), Err(ConfigError::Parse(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netprobe.yaml");
        std::fs::write(&path, "listen: 127.0.0.1:9000\nrate_limit:\n  max_requests: 3\n").unwrap();

        let cfg = load_config_from(&path.to_string_lossy()).await;
        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(cfg.rate_limit.max_requests, 3);
    }

    #[tokio::test]
    async fn test_unreadable_config_falls_back_to_defaults() {
        // le chemin existe mais ce n'est pas un fichier : la lecture échoue
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().to_string_lossy()).await;
        assert_eq!(cfg, KernelConfig::default());
    }

    #[tokio::test]
    async fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.yaml").to_string_lossy()).await;
        assert_eq!(cfg, KernelConfig::default());
    }
}
