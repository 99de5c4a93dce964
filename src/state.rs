use crate::auth::{jwt::JwtKeys, session::SessionTransport};
use crate::config::AppConfig;
use crate::db;
use crate::users::{memory::InMemoryUserStore, repo::PgUserStore, repo::UserStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub keys: Arc<JwtKeys>,
    pub session: Arc<SessionTransport>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await;
        let store = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;
        Self::from_parts(store, config)
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: AppConfig) -> anyhow::Result<Self> {
        let keys = JwtKeys::from_config(&config.jwt)?;
        let session = SessionTransport::new(&config, &keys);
        Ok(Self {
            store,
            config: Arc::new(config),
            keys: Arc::new(keys),
            session: Arc::new(session),
        })
    }

    /// In-memory store with test settings.
    pub fn fake() -> Self {
        Self::from_parts(Arc::new(InMemoryUserStore::new()), AppConfig::for_tests())
            .expect("test config is valid")
    }
}
