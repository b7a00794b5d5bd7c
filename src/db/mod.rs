//! Application state shared by every worker.
//!
//! - `store` - the remote document store (in-process or Supabase PostgREST)
//! - `intake` - image intake with the configured strategy
//! - `public` - read-side cache kept live for the public pages
//! - `sessions` - open admin sessions, evicted after an idle period

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::admin::{AdminSession, SessionSettings};
use crate::config::{AppConfig, ConfigError, ImageStrategyKind, StoreBackend, SyncMode};
use crate::intake::{ExternalStrategy, ImageIntake, ImageStrategy, InlineStrategy};
use crate::posting::models::PostKind;
use crate::storage::SupabaseStorage;
use crate::store::{DocumentStore, InMemoryStore, PostgrestStore};
use crate::sync::{LiveSubscription, LocalCache, SyncAdapter, SyncError};

pub const IMAGE_FOLDER: &str = "images";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub intake: ImageIntake,
    pub public: Arc<LocalCache>,
    pub sessions: Cache<Uuid, Arc<AdminSession>>,
    pub settings: SessionSettings,
    _public_feeds: Arc<LiveSubscription>,
}

impl AppState {
    pub async fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(900))
            .user_agent("newsdesk-server/1.0")
            .build()?;

        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
            StoreBackend::Supabase => {
                let supabase = config
                    .supabase
                    .as_ref()
                    .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
                Arc::new(PostgrestStore::new(supabase, config.poll_interval))
            }
        };

        let strategy: Arc<dyn ImageStrategy> = match config.image.strategy {
            ImageStrategyKind::Inline => Arc::new(InlineStrategy::new(
                config.image.max_dimension,
                config.image.quality,
                config.image.max_bytes,
            )),
            ImageStrategyKind::External => {
                let supabase = config
                    .supabase
                    .clone()
                    .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
                let storage = Arc::new(SupabaseStorage::new(supabase, http_client.clone()));
                Arc::new(ExternalStrategy::new(storage, IMAGE_FOLDER, config.image.max_bytes))
            }
        };

        let settings = SessionSettings {
            sync_mode: config.sync_mode,
            require_article_images: config.require_article_images,
        };
        let state = Self::new(
            store,
            ImageIntake::new(strategy),
            settings,
            config.admin_session_idle,
            config.resubscribe_delay,
        )
        .await?;
        Ok(state)
    }

    /// Subscribes the public cache to every collection and sets up the
    /// session registry. Public feeds that fail are reopened after
    /// `resubscribe_delay`.
    pub async fn new(
        store: Arc<dyn DocumentStore>,
        intake: ImageIntake,
        settings: SessionSettings,
        session_idle: Duration,
        resubscribe_delay: Duration,
    ) -> Result<Self, SyncError> {
        let public = Arc::new(LocalCache::new());
        let adapter = SyncAdapter::new(store.clone(), public.clone(), intake.strategy(), SyncMode::Live)
            .resubscribe_after(resubscribe_delay);
        let feeds = adapter.subscribe(&PostKind::ALL).await?;

        let sessions = Cache::builder()
            .time_to_idle(session_idle)
            .max_capacity(64)
            .build();

        Ok(Self {
            store,
            intake,
            public,
            sessions,
            settings,
            _public_feeds: Arc::new(feeds),
        })
    }

    pub async fn open_session(&self) -> Result<Arc<AdminSession>, SyncError> {
        let session = Arc::new(
            AdminSession::open(self.store.clone(), self.intake.clone(), self.settings).await?,
        );
        self.sessions.insert(session.id(), session.clone()).await;
        Ok(session)
    }

    pub async fn session(&self, id: &Uuid) -> Option<Arc<AdminSession>> {
        self.sessions.get(id).await
    }

    pub async fn close_session(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).await.is_some()
    }
}
