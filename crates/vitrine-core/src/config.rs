//! Configuration module
//!
//! Environment-driven configuration for the blob store, the document store, the
//! ingestion pipelines and the event worker. `.env` files are honoured through dotenvy.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_DERIVATIVE_PREFIX, DEFAULT_IMAGE_UPLOAD_PREFIX, DEFAULT_VIDEO_UPLOAD_PREFIX,
};
use crate::storage_types::StorageBackend;

// Common constants
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_CONNECTION_TIMEOUT_SECS: u64 = 30;
const DURABLE_URL_TTL_SECS: u64 = 7 * 24 * 3600;
const DEFAULT_IMAGE_VARIANTS: &str = "thumb:320,small:640,medium:1280,large:2048";
const DEFAULT_VIDEO_HEIGHTS: &str = "360,720,1080";
const WEBP_QUALITY: f32 = 80.0;
const MAX_CONCURRENT_TRANSCODES: usize = 2;
const POSTER_OFFSET_SECS: f64 = 1.0;
const POSTER_WIDTH: u32 = 640;
const IMAGE_TIMEOUT_SECS: u64 = 300;
const VIDEO_TIMEOUT_SECS: u64 = 1800;
const WORKER_MAX_CONCURRENT_EVENTS: usize = 4;
const WORKER_MAX_REDELIVERIES: u32 = 3;

/// A named webp width target, e.g. `thumb:320`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVariantSpec {
    pub name: String,
    pub width: u32,
}

impl ImageVariantSpec {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }

    /// Derivative key used in `paths.derivatives` and in the blob key.
    pub fn key(&self) -> String {
        format!("webp_{}", self.name)
    }

    /// Parse a comma separated `name:width` list.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, anyhow::Error> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let (name, width) = entry.split_once(':').ok_or_else(|| {
                    anyhow::anyhow!("Invalid image variant '{}', expected name:width", entry)
                })?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(anyhow::anyhow!("Image variant '{}' has an empty name", entry));
                }
                let width = width
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| anyhow::anyhow!("Invalid width in '{}': {}", entry, e))?;
                Ok(ImageVariantSpec::new(name, width))
            })
            .collect()
    }
}

/// Document store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentBackend {
    Memory,
    Postgres,
}

impl FromStr for DocumentBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(DocumentBackend::Memory),
            "postgres" | "postgresql" => Ok(DocumentBackend::Postgres),
            _ => Err(anyhow::anyhow!("Invalid document backend: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    /// Presign ceiling for durable URLs on S3.
    pub durable_url_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DocumentStoreConfig {
    pub backend: DocumentBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

/// Pipeline settings shared by the image and video ingestion pipelines
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub image_upload_prefix: String,
    pub video_upload_prefix: String,
    pub derivative_prefix: String,
    pub image_variants: Vec<ImageVariantSpec>,
    pub webp_quality: f32,
    pub blurhash_enabled: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub video_heights: Vec<u32>,
    pub max_concurrent_transcodes: usize,
    pub poster_offset_secs: f64,
    pub poster_width: u32,
    /// Parent directory for per-invocation workspaces; system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            image_upload_prefix: DEFAULT_IMAGE_UPLOAD_PREFIX.to_string(),
            video_upload_prefix: DEFAULT_VIDEO_UPLOAD_PREFIX.to_string(),
            derivative_prefix: DEFAULT_DERIVATIVE_PREFIX.to_string(),
            image_variants: vec![
                ImageVariantSpec::new("thumb", 320),
                ImageVariantSpec::new("small", 640),
                ImageVariantSpec::new("medium", 1280),
                ImageVariantSpec::new("large", 2048),
            ],
            webp_quality: WEBP_QUALITY,
            blurhash_enabled: true,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_heights: vec![360, 720, 1080],
            max_concurrent_transcodes: MAX_CONCURRENT_TRANSCODES,
            poster_offset_secs: POSTER_OFFSET_SECS,
            poster_width: POSTER_WIDTH,
            temp_dir: None,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let widths: HashSet<u32> = self.image_variants.iter().map(|v| v.width).collect();
        if widths.len() < 2 {
            return Err(anyhow::anyhow!(
                "IMAGE_VARIANTS must define at least two distinct widths"
            ));
        }
        if self.image_variants.iter().any(|v| v.width == 0) {
            return Err(anyhow::anyhow!("IMAGE_VARIANTS widths must be positive"));
        }
        let names: HashSet<&str> = self.image_variants.iter().map(|v| v.name.as_str()).collect();
        if names.len() != self.image_variants.len() {
            return Err(anyhow::anyhow!("IMAGE_VARIANTS names must be unique"));
        }
        if self.video_heights.is_empty() || self.video_heights.contains(&0) {
            return Err(anyhow::anyhow!(
                "VIDEO_HEIGHTS must list at least one positive height"
            ));
        }
        if self.max_concurrent_transcodes == 0 {
            return Err(anyhow::anyhow!(
                "MAX_CONCURRENT_TRANSCODES must be at least 1"
            ));
        }
        if !(0.0..=100.0).contains(&self.webp_quality) {
            return Err(anyhow::anyhow!("WEBP_QUALITY must be between 0 and 100"));
        }
        Ok(())
    }
}

/// Upload event consumer settings
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub max_concurrent_events: usize,
    pub max_redeliveries: u32,
    pub image_timeout_secs: u64,
    pub video_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_events: WORKER_MAX_CONCURRENT_EVENTS,
            max_redeliveries: WORKER_MAX_REDELIVERIES,
            image_timeout_secs: IMAGE_TIMEOUT_SECS,
            video_timeout_secs: VIDEO_TIMEOUT_SECS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub storage: StorageConfig,
    pub documents: DocumentStoreConfig,
    pub ingest: IngestConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StorageBackend>()?;

        let storage = StorageConfig {
            backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            durable_url_ttl_secs: env::var("DURABLE_URL_TTL_SECS")
                .unwrap_or_else(|_| DURABLE_URL_TTL_SECS.to_string())
                .parse()
                .unwrap_or(DURABLE_URL_TTL_SECS),
        };

        let documents = DocumentStoreConfig {
            backend: env::var("DOCUMENT_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .parse::<DocumentBackend>()?,
            database_url: env::var("DATABASE_URL").ok(),
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| DB_MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(DB_MAX_CONNECTIONS),
            connection_timeout_secs: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| DB_CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(DB_CONNECTION_TIMEOUT_SECS),
        };

        let image_variants = ImageVariantSpec::parse_list(
            &env::var("IMAGE_VARIANTS").unwrap_or_else(|_| DEFAULT_IMAGE_VARIANTS.to_string()),
        )?;

        let video_heights = env::var("VIDEO_HEIGHTS")
            .unwrap_or_else(|_| DEFAULT_VIDEO_HEIGHTS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|e| anyhow::anyhow!("Invalid VIDEO_HEIGHTS entry '{}': {}", s, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ingest = IngestConfig {
            image_upload_prefix: env::var("IMAGE_UPLOAD_PREFIX")
                .unwrap_or_else(|_| DEFAULT_IMAGE_UPLOAD_PREFIX.to_string()),
            video_upload_prefix: env::var("VIDEO_UPLOAD_PREFIX")
                .unwrap_or_else(|_| DEFAULT_VIDEO_UPLOAD_PREFIX.to_string()),
            derivative_prefix: env::var("DERIVATIVE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_DERIVATIVE_PREFIX.to_string()),
            image_variants,
            webp_quality: env::var("WEBP_QUALITY")
                .unwrap_or_else(|_| WEBP_QUALITY.to_string())
                .parse()
                .unwrap_or(WEBP_QUALITY),
            blurhash_enabled: env::var("BLURHASH_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            video_heights,
            max_concurrent_transcodes: env::var("MAX_CONCURRENT_TRANSCODES")
                .unwrap_or_else(|_| MAX_CONCURRENT_TRANSCODES.to_string())
                .parse()
                .unwrap_or(MAX_CONCURRENT_TRANSCODES),
            poster_offset_secs: env::var("POSTER_OFFSET_SECS")
                .unwrap_or_else(|_| POSTER_OFFSET_SECS.to_string())
                .parse()
                .unwrap_or(POSTER_OFFSET_SECS),
            poster_width: env::var("POSTER_WIDTH")
                .unwrap_or_else(|_| POSTER_WIDTH.to_string())
                .parse()
                .unwrap_or(POSTER_WIDTH),
            temp_dir: env::var("TEMP_DIR").ok().map(PathBuf::from),
        };

        let worker = WorkerConfig {
            max_concurrent_events: env::var("WORKER_MAX_CONCURRENT_EVENTS")
                .unwrap_or_else(|_| WORKER_MAX_CONCURRENT_EVENTS.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_CONCURRENT_EVENTS),
            max_redeliveries: env::var("WORKER_MAX_REDELIVERIES")
                .unwrap_or_else(|_| WORKER_MAX_REDELIVERIES.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_REDELIVERIES),
            image_timeout_secs: env::var("IMAGE_TIMEOUT_SECS")
                .unwrap_or_else(|_| IMAGE_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(IMAGE_TIMEOUT_SECS),
            video_timeout_secs: env::var("VIDEO_TIMEOUT_SECS")
                .unwrap_or_else(|_| VIDEO_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(VIDEO_TIMEOUT_SECS),
        };

        Ok(Config {
            environment,
            storage,
            documents,
            ingest,
            worker,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() && self.storage.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "The memory storage backend cannot be used in production"
                    ));
                }
            }
        }

        if self.documents.backend == DocumentBackend::Postgres {
            match &self.documents.database_url {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                _ => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string when DOCUMENT_BACKEND=postgres"
                    ))
                }
            }
        }

        if self.worker.max_concurrent_events == 0 {
            return Err(anyhow::anyhow!(
                "WORKER_MAX_CONCURRENT_EVENTS must be at least 1"
            ));
        }

        self.ingest.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            environment: "development".to_string(),
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                local_storage_path: None,
                local_storage_base_url: None,
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
                aws_region: None,
                durable_url_ttl_secs: DURABLE_URL_TTL_SECS,
            },
            documents: DocumentStoreConfig {
                backend: DocumentBackend::Memory,
                database_url: None,
                max_connections: DB_MAX_CONNECTIONS,
                connection_timeout_secs: DB_CONNECTION_TIMEOUT_SECS,
            },
            ingest: IngestConfig::default(),
            worker: WorkerConfig::default(),
        }
    }

    #[test]
    fn parses_variant_list() {
        let variants = ImageVariantSpec::parse_list(DEFAULT_IMAGE_VARIANTS).unwrap();
        assert_eq!(variants.len(), 4);
        assert_eq!(variants[0], ImageVariantSpec::new("thumb", 320));
        assert_eq!(variants[3].key(), "webp_large");
    }

    #[test]
    fn rejects_malformed_variant() {
        assert!(ImageVariantSpec::parse_list("thumb").is_err());
        assert!(ImageVariantSpec::parse_list("thumb:wide").is_err());
        assert!(ImageVariantSpec::parse_list(":320").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn requires_two_distinct_widths() {
        let mut config = base_config();
        config.ingest.image_variants = vec![
            ImageVariantSpec::new("a", 640),
            ImageVariantSpec::new("b", 640),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn requires_positive_transcode_limit() {
        let mut config = base_config();
        config.ingest.max_concurrent_transcodes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn postgres_requires_database_url() {
        let mut config = base_config();
        config.documents.backend = DocumentBackend::Postgres;
        assert!(config.validate().is_err());
        config.documents.database_url = Some("postgresql://localhost/vitrine".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn memory_storage_rejected_in_production() {
        let mut config = base_config();
        config.environment = "production".to_string();
        assert!(config.validate().is_err());
    }
}
