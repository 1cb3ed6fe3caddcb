use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;

use crate::{
    api,
    config::Config,
    observability::Telemetry,
    scheduler::Scheduler,
    store::memory::MemoryStore,
    subject::dao::{LinkDao, RecipientDao, TagDao},
    subject::repository::{
        LinkRepository, MemoryLinkRepository, MemoryTagRepository, RecipientDirectory,
        StaticRecipients, TagRepository,
    },
    trending::kind::{LinkKind, TagKind},
    trending::notifier::{LogNotifier, ReviewNotifier, WebhookNotifier},
    trending::tracker::Tracker,
    util::retry::RetryConfig,
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    scheduler: Scheduler,
    tag_repo: Arc<dyn TagRepository>,
    link_repo: Arc<dyn LinkRepository>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.registry.scheduler
    }

    pub(crate) fn tag_repo(&self) -> &Arc<dyn TagRepository> {
        &self.registry.tag_repo
    }

    pub(crate) fn link_repo(&self) -> &Arc<dyn LinkRepository> {
        &self.registry.link_repo
    }
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化や HTTP クライアント構築が失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;
        let store = Arc::new(MemoryStore::new());

        let (tag_repo, link_repo, recipients): (
            Arc<dyn TagRepository>,
            Arc<dyn LinkRepository>,
            Arc<dyn RecipientDirectory>,
        ) = match config.db_dsn() {
            Some(dsn) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections())
                    .min_connections(config.db_min_connections())
                    .acquire_timeout(config.db_acquire_timeout())
                    .idle_timeout(Some(config.db_idle_timeout()))
                    .max_lifetime(Some(config.db_max_lifetime()))
                    .test_before_acquire(true)
                    .connect_lazy(dsn)
                    .context("failed to configure subject database pool")?;
                (
                    Arc::new(TagDao::new(pool.clone())),
                    Arc::new(LinkDao::new(pool.clone())),
                    Arc::new(RecipientDao::new(pool)),
                )
            }
            None => {
                tracing::warn!("TRENDS_DB_DSN not set, using in-memory subject repositories");
                (
                    Arc::new(MemoryTagRepository::new()),
                    Arc::new(MemoryLinkRepository::new()),
                    Arc::new(StaticRecipients(Vec::new())),
                )
            }
        };

        let notifier: Arc<dyn ReviewNotifier> = match config.review_webhook_url() {
            Some(url) => Arc::new(WebhookNotifier::new(
                url.to_string(),
                config.review_webhook_token().map(str::to_string),
                config.review_webhook_connect_timeout(),
                config.review_webhook_total_timeout(),
                RetryConfig::new(
                    config.notify_max_retries(),
                    config.notify_backoff_base_ms(),
                    config.notify_backoff_cap_ms(),
                ),
            )?),
            None => Arc::new(LogNotifier),
        };

        let store: Arc<dyn crate::store::Store> = store;
        let tags = Arc::new(Tracker::new(
            TagKind::new(Arc::clone(&tag_repo)),
            Arc::clone(&store),
            Arc::clone(&recipients),
            Arc::clone(&notifier),
        ));
        let links = Arc::new(Tracker::new(
            LinkKind::new(Arc::clone(&link_repo)),
            store,
            recipients,
            notifier,
        ));

        let scheduler = Scheduler::new(tags, links, telemetry.clone());

        Ok(Self {
            config,
            telemetry,
            scheduler,
            tag_repo,
            link_repo,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
