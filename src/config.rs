//! Configuration management for the file storage agent

use serde::Deserialize;
use std::env;

/// Seven days, the longest lifetime a SigV4 presigned URL may have
pub const DEFAULT_URL_TTL_SECS: u64 = 604_800;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub uploader: UploaderConfig,
    pub connector: ConnectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
    Storj,
    /// In-process store, nothing leaves the machine
    Memory,
}

impl StorageProvider {
    fn from_name(name: &str) -> Self {
        match name {
            "r2" => StorageProvider::R2,
            "s3" => StorageProvider::S3,
            "b2" => StorageProvider::B2,
            "storj" => StorageProvider::Storj,
            "memory" => StorageProvider::Memory,
            _ => StorageProvider::Minio,
        }
    }
}

/// Settings for the uploading party
#[derive(Debug, Clone, Deserialize)]
pub struct UploaderConfig {
    /// Address used as sender of uploads and recipient of downloads
    pub agent_id: String,
    /// Source pattern, e.g. `./upload_dir/*` or `./data/**/*.json`
    pub source: String,
    pub tick_interval_secs: u64,
}

/// Settings for the storage party
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    pub connection_id: String,
    pub max_workers: usize,
    pub url_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        UploaderConfig {
            agent_id: "skill/file_uploader".to_string(),
            source: "./upload_dir/*".to_string(),
            tick_interval_secs: 10,
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            connection_id: "connection/storage".to_string(),
            max_workers: 5,
            url_ttl_secs: DEFAULT_URL_TTL_SECS,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 250,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::Minio,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "uploads".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
            },
            uploader: UploaderConfig::default(),
            connector: ConnectorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let uploader = UploaderConfig::default();
        let connector = ConnectorConfig::default();
        let provider = StorageProvider::from_name(
            env::var("S3_PROVIDER")
                .unwrap_or_else(|_| "minio".to_string())
                .as_str(),
        );
        // The in-process store needs no credentials
        let required = |name: &str, fallback: &str| match provider {
            StorageProvider::Memory => Ok(env::var(name).unwrap_or_else(|_| fallback.to_string())),
            _ => env::var(name),
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000),
            },
            storage: StorageConfig {
                provider,
                endpoint: required("S3_ENDPOINT", "memory://")?,
                bucket: required("S3_BUCKET", "uploads")?,
                access_key: required("S3_ACCESS_KEY", "")?,
                secret_key: required("S3_SECRET_KEY", "")?,
                region: env::var("S3_REGION").ok(),
            },
            uploader: UploaderConfig {
                agent_id: env::var("UPLOADER_ID").unwrap_or(uploader.agent_id),
                source: env::var("UPLOAD_SOURCE").unwrap_or(uploader.source),
                tick_interval_secs: parse_var("UPLOAD_TICK_SECS", uploader.tick_interval_secs),
            },
            connector: ConnectorConfig {
                connection_id: env::var("CONNECTOR_ID").unwrap_or(connector.connection_id),
                max_workers: parse_var("CONNECTOR_MAX_WORKERS", connector.max_workers).max(1),
                url_ttl_secs: parse_var("CONNECTOR_URL_TTL_SECS", connector.url_ttl_secs),
                request_timeout_secs: parse_var(
                    "CONNECTOR_REQUEST_TIMEOUT_SECS",
                    connector.request_timeout_secs,
                ),
                max_retries: parse_var("CONNECTOR_MAX_RETRIES", connector.max_retries),
                retry_backoff_ms: parse_var(
                    "CONNECTOR_RETRY_BACKOFF_MS",
                    connector.retry_backoff_ms,
                ),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.connector.max_workers, 5);
        assert_eq!(config.connector.url_ttl_secs, 604_800);
        assert_eq!(config.uploader.source, "./upload_dir/*");
        assert_eq!(config.storage.provider, StorageProvider::Minio);
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(StorageProvider::from_name("storj"), StorageProvider::Storj);
        assert_eq!(StorageProvider::from_name("memory"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_name("unknown"), StorageProvider::Minio);
    }
}
