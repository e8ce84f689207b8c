use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use tg_http::HppConfig;
use tg_ratelimit::RateLimitConfig;

use crate::tracing_setup::LoggingConfig;

/// Environment variables override the file, e.g. `TOLLGATE__RATE_LIMIT__CAPACITY=20`
pub const ENV_PREFIX: &str = "TOLLGATE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub request_timeout_ms: u64,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
    pub hpp: HppConfig,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Message("request_timeout_ms must be greater than 0".to_string()));
        }

        self.rate_limit.validate().map_err(|err| ConfigError::Message(err.to_string()))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request_timeout_ms: 30_000,
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            hpp: HppConfig::default(),
        }
    }
}

/// Load server config from an optional file plus `TOLLGATE__*` environment variables
pub fn load_server_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
    load_with_env(path.as_ref(), environment())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true)
}

fn load_with_env(path: &Path, env: Environment) -> Result<ServerConfig, ConfigError> {
    let config = Config::builder().add_source(File::from(path).required(false)).add_source(env).build()?;

    let server: ServerConfig = config.try_deserialize()?;
    server.validate()?;

    Ok(server)
}

/// Load server config with fallback to default
pub fn load_server_config_or_default(path: &str) -> ServerConfig {
    match load_server_config(path) {
        Ok(config) => {
            tracing::info!("Loaded server config from {path}");
            config
        }
        Err(err) => {
            tracing::warn!("Failed to load server config from {}: {}. Using defaults.", path, err);
            ServerConfig::default()
        }
    }
}
