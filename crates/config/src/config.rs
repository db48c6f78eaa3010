use core::str::FromStr;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;

/// Default directory for uploaded files and model artifacts.
const DEFAULT_MEDIA_BASE_PATH: &str = "./media";

/// Returns the base path for the object store.
#[must_use]
pub fn get_base_path() -> PathBuf {
    dotenvy::dotenv().ok();

    std::env::var("MEDIA_BASE_PATH").map_or_else(|_| PathBuf::from(DEFAULT_MEDIA_BASE_PATH), PathBuf::from)
}

/// Global object store instance, lazily initialized.
pub static OBJECT_STORE: LazyLock<Arc<dyn ObjectStore>> = LazyLock::new(|| {
    let base_path = get_base_path();

    std::fs::create_dir_all(&base_path).expect("Failed to create object store directory");

    Arc::new(LocalFileSystem::new_with_prefix(&base_path).expect("Failed to create object store"))
});

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum number of pooled database connections
    pub database_max_connections: u32,

    /// Shared secret used to verify HS256 access tokens
    pub jwt_secret: String,

    /// Port the HTTP server listens on
    pub port: u16,

    /// Upper bound for a single request body, in bytes
    pub max_upload_bytes: usize,

    /// Upper bound for the number of epochs a training request may ask for
    pub max_training_epochs: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DATABASE_URL`: `PostgreSQL` connection string
    /// - `JWT_SECRET`: secret for verifying access tokens
    ///
    /// Optional environment variables:
    /// - `PORT` (default `8000`)
    /// - `DATABASE_MAX_CONNECTIONS` (default `5`)
    /// - `MAX_UPLOAD_MB` (default `256`)
    /// - `MAX_TRAINING_EPOCHS` (default `100`)
    /// - `MEDIA_BASE_PATH`: base directory for stored files (default `./media`)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or malformed.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url =
            lookup("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET environment variable not set")?;

        let port = parse_or(&lookup, "PORT", 8000)?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?;
        let max_upload_mb: usize = parse_or(&lookup, "MAX_UPLOAD_MB", 256)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("MAX_UPLOAD_MB of {max_upload_mb} does not fit in memory"))?;
        let max_training_epochs = parse_or(&lookup, "MAX_TRAINING_EPOCHS", 100)?;

        Ok(Self {
            database_url,
            database_max_connections,
            jwt_secret,
            port,
            max_upload_bytes,
            max_training_epochs,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value {raw:?}: {e}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/labelnet"),
            ("JWT_SECRET", "secret"),
        ]))
        .expect("config should load");

        assert_eq!(config.port, 8000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.max_upload_bytes, 256 * 1024 * 1024);
        assert_eq!(config.max_training_epochs, 100);
    }

    #[test]
    fn test_missing_secret_is_error() {
        let result = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_port_is_error() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("PORT", "eighty"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_upload_limit_is_error() {
        let huge = usize::MAX.to_string();
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("MAX_UPLOAD_MB", huge.as_str()),
        ]));
        assert!(result.is_err());

        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("MAX_UPLOAD_MB", "8"),
        ]))
        .expect("config should load");
        assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
    }
}
