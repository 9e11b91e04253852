use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::language::{LanguageProfile, LanguageRegistry};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxSettings,
    pub telemetry: TelemetryConfig,
    /// Extra or overriding language profiles, keyed by language name.
    pub languages: HashMap<String, LanguageProfile>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origins. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            allowed_origins: vec!["http://localhost:3000".into()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SandboxSettings {
    /// Stem of the file user code is written to when no directive names one.
    pub default_filename: String,
    /// Upper bound for a single runtime call.
    pub exec_timeout_secs: u64,
    /// Idle time after which a session is reaped.
    pub session_ttl_secs: u64,
    /// How often the reaper scans for idle sessions.
    pub reap_interval_secs: u64,
    /// Working directory inside each container (tmpfs-backed).
    pub workdir: String,
    /// Docker network mode for sandbox containers.
    pub network_mode: String,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            default_filename: "file".into(),
            exec_timeout_secs: 10,
            session_ttl_secs: 30 * 60,
            reap_interval_secs: 60,
            workdir: "/sandbox".into(),
            network_mode: "none".into(),
        }
    }
}

impl SandboxSettings {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub metrics: bool,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            metrics: true,
            service_name: "replbox".into(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("REPLBOX_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map REPLBOX__SERVER__PORT=5000 to server.port
            .add_source(Environment::with_prefix("REPLBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn language_registry(&self) -> LanguageRegistry {
        LanguageRegistry::with_overrides(&self.languages)
    }
}
