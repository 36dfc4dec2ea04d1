use std::sync::Arc;

use crate::auth::{LockoutPolicy, PasswordHasher, PolicyRegistry, SessionCookies};
use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, Auditor, SeaOrmAuthService};

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub auditor: Auditor,

    pub policies: Arc<PolicyRegistry>,

    pub cookies: Arc<SessionCookies>,

    pub auth_service: Arc<dyn AuthService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        Self::with_store(config, store).await
    }

    pub async fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let policies = PolicyRegistry::from_config(&config.authorization)
            .map_err(|e| anyhow::anyhow!("Invalid authorization config: {e}"))?;

        let cookies = SessionCookies::new(&config.session, config.server.secure_cookies)?;
        let hasher = PasswordHasher::from_config(&config.security)?;
        let auditor = Auditor::from_store(store.clone());

        let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            auditor.clone(),
            hasher,
            LockoutPolicy::from_config(&config.security.auth_throttle),
            config.security.password.clone(),
        ));

        auth_service
            .ensure_bootstrap_admin(&config.bootstrap)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to seed bootstrap administrator: {e}"))?;

        Ok(Self {
            config: Arc::new(config),
            store,
            auditor,
            policies: Arc::new(policies),
            cookies: Arc::new(cookies),
            auth_service,
        })
    }
}
