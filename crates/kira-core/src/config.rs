//! Worker configuration loaded from `~/.kira/worker.yaml`, overridable by
//! `KIRA_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a single worker process.
///
/// Loaded from a YAML file on disk (default `~/.kira/worker.yaml`), then
/// overridden field-by-field by environment variables so a worker can be
/// reconfigured for a single invocation without editing the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub server_url: String,
    pub token: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: f64,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_kiro_timeout")]
    pub kiro_timeout: u64,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8787".into(),
            token: None,
            password: None,
            poll_interval: default_poll_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            kiro_timeout: default_kiro_timeout(),
            workspace_root: default_workspace_root(),
        }
    }
}

fn default_poll_interval() -> f64 {
    5.0
}
fn default_heartbeat_interval() -> f64 {
    30.0
}
fn default_max_concurrent_tasks() -> usize {
    1
}
fn default_kiro_timeout() -> u64 {
    600
}
fn default_workspace_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kira")
        .join("workspaces")
}

impl WorkerConfig {
    /// Default config file location: `~/.kira/worker.yaml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kira")
            .join("worker.yaml")
    }

    /// Load config from the default path (if present), then apply
    /// `KIRA_*` environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            Self::load_from(&path)?
        } else {
            WorkerConfig::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load from a specific YAML file, without env overrides.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: WorkerConfig =
            serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("KIRA_SERVER_URL") {
            self.server_url = v;
        }
        if let Ok(v) = std::env::var("KIRA_WORKER_TOKEN") {
            self.token = Some(v);
        }
        if let Ok(v) = std::env::var("KIRA_WORKER_PASSWORD") {
            self.password = Some(v);
        }
        if let Ok(v) = std::env::var("KIRA_POLL_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.poll_interval = n;
            }
        }
        if let Ok(v) = std::env::var("KIRA_HEARTBEAT_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.heartbeat_interval = n;
            }
        }
        if let Ok(v) = std::env::var("KIRA_MAX_CONCURRENT_TASKS") {
            if let Ok(n) = v.parse() {
                self.max_concurrent_tasks = n;
            }
        }
        if let Ok(v) = std::env::var("KIRA_KIRO_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.kiro_timeout = n;
            }
        }
        if let Ok(v) = std::env::var("KIRA_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(v);
        }
    }

    /// Serialize to YAML and write to `path`, restricting permissions to
    /// owner read/write (the file may contain a worker token or password).
    pub fn save(&self, path: impl Into<PathBuf>) -> Result<(), ConfigError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let yaml = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(&path, yaml).map_err(|e| ConfigError::Io(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Configuration for the `kira-server` binary, loaded from
/// `~/.kira/server.yaml` and overridable by `KIRA_SERVER_*` env variables,
/// following the same load/save shape as [`WorkerConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Extra WebSocket origins to allow beyond the built-in localhost
    /// variants — the daemon's own origin allowlist follows the same idea,
    /// one host over.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            db_path: default_db_path(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}
fn default_server_port() -> u16 {
    8787
}
fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kira")
        .join("kira.db")
}

impl ServerConfig {
    /// Default config file location: `~/.kira/server.yaml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kira")
            .join("server.yaml")
    }

    /// Load config from the default path (if present), then apply
    /// `KIRA_SERVER_*` environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            Self::load_from(&path)?
        } else {
            ServerConfig::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: ServerConfig =
            serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("KIRA_SERVER_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("KIRA_SERVER_PORT") {
            if let Ok(n) = v.parse() {
                self.port = n;
            }
        }
        if let Ok(v) = std::env::var("KIRA_SERVER_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.max_concurrent_tasks, 1);
        assert_eq!(cfg.poll_interval, 5.0);
        assert!(cfg.workspace_root.ends_with("workspaces"));
    }

    #[test]
    fn load_from_roundtrips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.yaml");
        let mut cfg = WorkerConfig::default();
        cfg.server_url = "https://kira.example.com".into();
        cfg.token = Some("secret-token".into());
        cfg.save(&path).unwrap();

        let loaded = WorkerConfig::load_from(&path).unwrap();
        assert_eq!(loaded.server_url, "https://kira.example.com");
        assert_eq!(loaded.token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn save_restricts_permissions_on_unix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.yaml");
        WorkerConfig::default().save(&path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn missing_file_yields_parse_error_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.yaml");
        assert!(WorkerConfig::load_from(&path).is_err());
    }

    #[test]
    fn server_config_defaults_are_sane() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8787);
        assert!(cfg.db_path.ends_with("kira.db"));
        assert!(cfg.allowed_origins.is_empty());
    }

    #[test]
    fn server_config_roundtrips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        let yaml = "host: 0.0.0.0\nport: 9000\ndb_path: /tmp/kira.db\n";
        std::fs::write(&path, yaml).unwrap();
        let cfg = ServerConfig::load_from(&path).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/kira.db"));
    }
}
