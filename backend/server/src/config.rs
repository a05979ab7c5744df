use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use mongodb::options::ConnectionString;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_COLLECTION: &str = "responses";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MONGODB_URI is not set and no secret file was found")]
    MissingConnectionString,

    #[error("MONGODB_URI does not name a database")]
    MissingDatabaseName,

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub mongodb_uri: String,
    pub database: String,
    pub collection: String,
    pub strict_ip_uniqueness: bool,
    pub cors_max_age_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. `load` passes the process
    /// environment; the secret file fallback applies to both.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mongodb_uri = lookup("MONGODB_URI")
            .filter(|uri| !uri.trim().is_empty())
            .or_else(|| read_secret("MONGODB_URI"))
            .ok_or(ConfigError::MissingConnectionString)?;

        let database = database_name(&mongodb_uri)?.ok_or(ConfigError::MissingDatabaseName)?;

        Ok(Self {
            port: try_load(&lookup, "RUST_PORT", "1111")?,
            database,
            mongodb_uri,
            collection: try_load(&lookup, "RESPONSES_COLLECTION", DEFAULT_COLLECTION)?,
            strict_ip_uniqueness: try_load(&lookup, "STRICT_IP_UNIQUENESS", "false")?,
            cors_max_age_secs: try_load(&lookup, "CORS_MAX_AGE_SECS", "3600")?,
        })
    }
}

/// Database named by the path segment of a connection string, e.g.
/// `mongodb+srv://user:pw@host/survey?retryWrites=true` -> `survey`.
/// Parsed by the driver so the name matches what the client would pick.
pub fn database_name(uri: &str) -> Result<Option<String>, ConfigError> {
    let parsed = ConnectionString::parse(uri).map_err(|e| {
        warn!("Invalid MONGODB_URI value: {e}");
        ConfigError::Invalid {
            key: "MONGODB_URI".to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(parsed.default_database.filter(|name| !name.is_empty()))
}

fn try_load<T: FromStr, F>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse::<T>()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}
