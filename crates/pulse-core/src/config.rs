//! Configuration for the agent and collector sides.
//!
//! Serde structs with defaults, optional JSON file loading and
//! environment-variable overrides. CLI flag parsing stays outside this
//! crate; callers hand a finished config in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, PulseResult};

fn default_address() -> String {
    "localhost:8080".to_string()
}

const fn default_poll_interval() -> u64 {
    2
}

const fn default_report_interval() -> u64 {
    10
}

const fn default_store_interval() -> u64 {
    300
}

const fn default_restore() -> bool {
    true
}

/// Agent-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collector address (host:port)
    pub address: String,
    /// Seconds between metric sampling runs
    pub poll_interval: u64,
    /// Seconds between batch reports
    pub report_interval: u64,
    /// Shared HMAC secret; empty disables signing
    pub key: Option<String>,
    /// PEM public key for batch encryption
    pub crypto_key: Option<PathBuf>,
    /// Outbound IP advertised to the collector's trusted-subnet check
    pub real_ip: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            poll_interval: default_poll_interval(),
            report_interval: default_report_interval(),
            key: None,
            crypto_key: None,
            real_ip: None,
        }
    }
}

impl AgentConfig {
    /// Load from a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> PulseResult<Self> {
        read_json(path.as_ref())
    }

    /// Overlay environment variables onto the current values
    pub fn apply_env(&mut self) {
        if let Some(v) = env_string("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = env_u64("POLL_INTERVAL") {
            self.poll_interval = v;
        }
        if let Some(v) = env_u64("REPORT_INTERVAL") {
            self.report_interval = v;
        }
        if let Some(v) = env_string("KEY") {
            self.key = Some(v);
        }
        if let Some(v) = env_string("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v));
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    pub fn validate(&self) -> PulseResult<()> {
        if self.address.is_empty() {
            return Err(PulseError::unexpected("agent address must not be empty"));
        }
        if self.poll_interval == 0 || self.report_interval == 0 {
            return Err(PulseError::unexpected("intervals must be positive"));
        }
        Ok(())
    }
}

/// Collector-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (host:port)
    pub address: String,
    /// Seconds between snapshot dumps; zero means dump synchronously on
    /// every push
    pub store_interval: u64,
    /// Snapshot file location; enables the file backend
    pub store_path: Option<PathBuf>,
    /// Restore prior snapshot state on start
    pub restore: bool,
    /// Database connection string; enables the database backend
    pub database_dsn: Option<String>,
    /// Shared HMAC secret; empty disables signature verification
    pub key: Option<String>,
    /// PEM private key for batch decryption
    pub crypto_key: Option<PathBuf>,
    /// CIDR of clients accepted without further authentication
    pub trusted_subnet: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval: default_store_interval(),
            store_path: None,
            restore: default_restore(),
            database_dsn: None,
            key: None,
            crypto_key: None,
            trusted_subnet: None,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> PulseResult<Self> {
        read_json(path.as_ref())
    }

    /// Overlay environment variables onto the current values
    pub fn apply_env(&mut self) {
        if let Some(v) = env_string("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = env_u64("STORE_INTERVAL") {
            self.store_interval = v;
        }
        if let Some(v) = env_string("FILE_STORAGE_PATH") {
            self.store_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("RESTORE") {
            self.restore = v == "true" || v == "1";
        }
        if let Some(v) = env_string("DATABASE_DSN") {
            self.database_dsn = Some(v);
        }
        if let Some(v) = env_string("KEY") {
            self.key = Some(v);
        }
        if let Some(v) = env_string("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("TRUSTED_SUBNET") {
            self.trusted_subnet = Some(v);
        }
    }

    /// Zero store interval means every push dumps before returning
    pub fn sync_mode(&self) -> bool {
        self.store_interval == 0
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval)
    }

    pub fn validate(&self) -> PulseResult<()> {
        if self.address.is_empty() {
            return Err(PulseError::unexpected("server address must not be empty"));
        }
        if let Some(subnet) = &self.trusted_subnet {
            crate::net::TrustedSubnet::parse(subnet)?;
        }
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> PulseResult<T> {
    let payload = std::fs::read_to_string(path)
        .map_err(|e| PulseError::io(format!("read config {}: {}", path.display(), e)))?;
    serde_json::from_str(&payload)
        .map_err(|e| PulseError::Json(format!("parse config {}: {}", path.display(), e)))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Option<u64> {
    env_string(name).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AgentConfig::default().validate().unwrap();
        ServerConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_store_interval_means_sync_mode() {
        let mut config = ServerConfig::default();
        assert!(!config.sync_mode());
        config.store_interval = 0;
        assert!(config.sync_mode());
    }

    #[test]
    fn file_loading_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(
            &path,
            r#"{"address":"0.0.0.0:9090","store_interval":30,"restore":false}"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.address, "0.0.0.0:9090");
        assert_eq!(config.store_interval, 30);
        assert!(!config.restore);
        // Unset fields keep their defaults.
        assert!(config.store_path.is_none());
    }

    #[test]
    fn bad_subnet_fails_validation() {
        let mut config = ServerConfig::default();
        config.trusted_subnet = Some("not-a-subnet".into());
        assert!(config.validate().is_err());
    }
}
