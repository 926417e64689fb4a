use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::mail::{LogMailer, Mailer};
use crate::render::{HtmlRenderer, Renderer};
use crate::store::{DocumentStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn Mailer>,
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn DocumentStore> = match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url).await?;
                pg.prepare().await?;
                info!("using postgres document store");
                Arc::new(pg)
            }
            None => {
                warn!("DATABASE_URL not set; documents are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };
        let mailer = Arc::new(LogMailer::new(config.email_from.clone()));

        Ok(Self::from_parts(config, store, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            store,
            mailer,
            renderer: Arc::new(HtmlRenderer),
        }
    }

    /// Memory-backed state with a logging mailer.
    pub fn in_memory(config: AppConfig) -> Self {
        let mailer = Arc::new(LogMailer::new(config.email_from.clone()));
        Self::from_parts(Arc::new(config), Arc::new(MemoryStore::new()), mailer)
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = store;
        self
    }
}
