//! Runtime configuration read from the environment (and `.env` through `dotenvy`).

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BUCKET: &str = "newsdesk-images";
pub const DEFAULT_MAX_DIMENSION: u32 = 800;
pub const DEFAULT_QUALITY: u8 = 70;
pub const DEFAULT_EXTERNAL_MAX_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("could not read {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}

/// Loads `path` into the process environment. A missing file is fine, a
/// malformed line is an error rather than a silent end of the file.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(source) => Err(ConfigError::EnvFile {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub bucket_name: String,
}

impl SupabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            supabase_url: lookup("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: lookup("SUPABASE_ANON_KEY")
                .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            bucket_name: lookup("BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Supabase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStrategyKind {
    Inline,
    External,
}

/// How an admin session keeps its cache fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Standing subscription per collection; pushes replace the cache entry.
    Live,
    /// One-shot fetch on activation, optimistic splices after writes.
    Snapshot,
}

impl FromStr for SyncMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(SyncMode::Live),
            "snapshot" => Ok(SyncMode::Snapshot),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub strategy: ImageStrategyKind,
    pub max_dimension: u32,
    pub quality: u8,
    pub max_bytes: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub supabase: Option<SupabaseConfig>,
    pub image: ImageConfig,
    pub sync_mode: SyncMode,
    pub poll_interval: Duration,
    pub resubscribe_delay: Duration,
    pub require_article_images: bool,
    pub admin_session_idle: Duration,
}

fn parse<T: FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if load_env_file(Path::new(".env"))? {
            log::debug!("Loaded settings from .env");
        }
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("supabase") => StoreBackend::Supabase,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let strategy = match lookup("IMAGE_STRATEGY").as_deref() {
            None | Some("inline") => ImageStrategyKind::Inline,
            Some("external") => ImageStrategyKind::External,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "IMAGE_STRATEGY",
                    value: other.to_string(),
                })
            }
        };

        let supabase = if store_backend == StoreBackend::Supabase
            || strategy == ImageStrategyKind::External
        {
            Some(SupabaseConfig::from_lookup(lookup)?)
        } else {
            None
        };

        let max_bytes = match lookup("IMAGE_MAX_BYTES") {
            Some(value) => Some(value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "IMAGE_MAX_BYTES",
                value,
            })?),
            None if strategy == ImageStrategyKind::External => Some(DEFAULT_EXTERNAL_MAX_BYTES),
            None => None,
        };

        let quality: u8 = parse(lookup, "IMAGE_QUALITY", DEFAULT_QUALITY)?;
        if quality == 0 || quality > 100 {
            return Err(ConfigError::Invalid {
                key: "IMAGE_QUALITY",
                value: quality.to_string(),
            });
        }

        let sync_mode = match lookup("SYNC_MODE") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "SYNC_MODE",
                value,
            })?,
            None => SyncMode::Live,
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:5173".to_string(),
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:8080".to_string(),
                ]
            });

        Ok(AppConfig {
            port: parse(lookup, "PORT", 8080)?,
            cors_allowed_origins,
            store_backend,
            supabase,
            image: ImageConfig {
                strategy,
                max_dimension: parse(lookup, "IMAGE_MAX_DIMENSION", DEFAULT_MAX_DIMENSION)?,
                quality,
                max_bytes,
            },
            sync_mode,
            poll_interval: Duration::from_secs(parse(lookup, "SYNC_POLL_INTERVAL_SECS", 5)?),
            resubscribe_delay: Duration::from_secs(parse(lookup, "SYNC_RESUBSCRIBE_SECS", 10)?),
            require_article_images: parse(lookup, "REQUIRE_ARTICLE_IMAGES", true)?,
            admin_session_idle: Duration::from_secs(parse(lookup, "ADMIN_SESSION_IDLE_SECS", 1800)?),
        })
    }
}
