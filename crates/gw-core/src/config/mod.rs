//! Configuration management for the gateway

mod gateway;
pub mod serde_utils;

pub use gateway::{
    BackoffConfig, BrokerConfig, GatewayConfig, HostKeyPolicy, OutboundConfig, TunnelConfig,
};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ssh-gateway")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    tracing::debug!("Loaded configuration from {:?}", path);
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config::<GatewayConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == path));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = GatewayConfig::default();
        config.bind_address = "127.0.0.1:2222".into();
        config.tunnel.connect_settle = Duration::from_millis(1500);
        config.outbound.host_key_policy = HostKeyPolicy::Pinned;
        config.outbound.trusted_fingerprints = vec!["abc".into()];

        save_config(&path, &config).unwrap();
        let loaded: GatewayConfig = load_config(&path).unwrap();

        assert_eq!(loaded.bind_address, "127.0.0.1:2222");
        assert_eq!(loaded.tunnel.connect_settle, Duration::from_millis(1500));
        assert_eq!(loaded.outbound.host_key_policy, HostKeyPolicy::Pinned);
        assert_eq!(loaded.outbound.trusted_fingerprints, vec!["abc".to_string()]);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bind_address = [").unwrap();
        assert!(matches!(
            load_config::<GatewayConfig>(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
