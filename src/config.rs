use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub capture: CaptureConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. "sqlite:./data/hookbin.db"
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./data/hookbin.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When false, bearer identities are ignored and ownership runs entirely
    /// on anonymous session cookies
    pub enabled: bool,
    pub session_cookie: String,
    pub session_max_age_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            session_cookie: "hookbin_session".to_string(),
            session_max_age_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Live-session poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Length of generated public slugs
    pub slug_length: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            slug_length: 12,
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
        }
    }
}

/// Load configuration from a TOML file (optional) plus HOOKBIN__ environment
/// overrides, then validate
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("HOOKBIN").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.database.url.is_empty() {
        anyhow::bail!("database.url cannot be empty");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be at least 1");
    }

    if cfg.capture.poll_interval_ms < 100 {
        anyhow::bail!("capture.poll_interval_ms must be at least 100");
    }

    // Below 8 characters slugs become guessable and collisions frequent
    if cfg.capture.slug_length < 8 {
        anyhow::bail!("capture.slug_length must be at least 8");
    }

    if cfg.auth.session_cookie.is_empty() {
        anyhow::bail!("auth.session_cookie cannot be empty");
    }

    if cfg.metrics.enabled && !cfg.metrics.endpoint.starts_with('/') {
        anyhow::bail!("metrics.endpoint must start with '/'");
    }

    if cfg.server.log_format != "text" && cfg.server.log_format != "json" {
        anyhow::bail!(
            "server.log_format must be \"text\" or \"json\", got: {}",
            cfg.server.log_format
        );
    }

    cfg.server
        .host
        .parse::<std::net::IpAddr>()
        .map_err(|_| anyhow::anyhow!("server.host is not a valid IP address: {}", cfg.server.host))?;

    Ok(())
}
