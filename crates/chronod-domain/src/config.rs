//! Daemon-level configuration: how to bind the control plane, where the job
//! table and logs live, and which environment variable carries the shared
//! API credential.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8420
}

fn default_api_token_env() -> String {
    "CHRONOD_API_TOKEN".to_string()
}

fn default_job_config_path() -> PathBuf {
    PathBuf::from("jobs.toml")
}

fn default_logs_root() -> PathBuf {
    PathBuf::from("logs")
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".to_string(), "http://127.0.0.1:*".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_cors_origins(),
        }
    }
}

/// Top-level daemon configuration, loaded from a TOML file at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,

    #[serde(default = "default_job_config_path")]
    pub job_config_path: PathBuf,

    #[serde(default = "default_logs_root")]
    pub logs_root: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api_token_env: default_api_token_env(),
            job_config_path: default_job_config_path(),
            logs_root: default_logs_root(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path`, or fall back to defaults if the file does not exist.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Validate the configuration, collecting every issue rather than
    /// failing on the first one.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".to_string(),
                message: "port must not be 0".to_string(),
            });
        }
        if self.server.host.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".to_string(),
                message: "host must not be empty".to_string(),
            });
        }
        if self.server.cors.allowed_origins.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".to_string(),
                message: "no CORS origins configured; browser clients will be rejected".to_string(),
            });
        }
        if self
            .server
            .cors
            .allowed_origins
            .iter()
            .any(|o| o == "*")
        {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".to_string(),
                message: "'*' allows any origin; restrict this in production".to_string(),
            });
        }
        if self.api_token_env.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "api_token_env".to_string(),
                message: "api_token_env must name an environment variable".to_string(),
            });
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            ConfigSeverity::Error => write!(f, "[ERROR] {}: {}", self.field, self.message),
            ConfigSeverity::Warning => write!(f, "[WARN] {}: {}", self.field, self.message),
        }
    }
}
