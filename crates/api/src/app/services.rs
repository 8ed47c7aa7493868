use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use hrdesk_auth::{
    AuthService, CredentialHasher, CredentialStore, EmployeeDirectory, HashingError, SessionStore,
    TokenService,
};
use hrdesk_infra::{
    AppConfig, DbError, InMemoryCredentialStore, InMemoryEmployeeDirectory, InMemorySessionStore,
    PostgresCredentialStore, PostgresEmployeeDirectory, PostgresSessionStore, db,
};

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("invalid password hashing parameters: {0}")]
    Hashing(#[from] HashingError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("DATABASE_URL is required when USE_PERSISTENT_STORES is set")]
    MissingDatabaseUrl,
}

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub auth: AuthService,
    /// Echo reset tokens in `/auth/request-reset` responses.
    pub expose_reset_token: bool,
    pool: Option<PgPool>,
}

impl AppServices {
    /// Pick the store backend from `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, ServicesError> {
        if config.use_persistent_stores {
            Self::persistent(config).await
        } else {
            Self::in_memory(config)
        }
    }

    /// In-memory stores; the roster is seeded from `dev_employee_emails`.
    pub fn in_memory(config: &AppConfig) -> Result<Self, ServicesError> {
        let roster: Arc<dyn EmployeeDirectory> = Arc::new(InMemoryEmployeeDirectory::with_emails(
            &config.dev_employee_emails,
        ));
        let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new(roster));
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

        if config.dev_employee_emails.is_empty() {
            warn!("in-memory employee roster is empty; registration will be refused");
        }
        info!(roster = config.dev_employee_emails.len(), "using in-memory stores");
        Self::assemble(config, credentials, sessions, None)
    }

    /// Postgres-backed stores. Opens the pool and runs migrations.
    pub async fn persistent(config: &AppConfig) -> Result<Self, ServicesError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or(ServicesError::MissingDatabaseUrl)?;
        let pool = db::connect(url, config.database_max_connections).await?;

        let roster: Arc<dyn EmployeeDirectory> = Arc::new(PostgresEmployeeDirectory::new(pool.clone()));
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(PostgresCredentialStore::new(pool.clone(), roster));
        let sessions: Arc<dyn SessionStore> = Arc::new(PostgresSessionStore::new(pool.clone()));

        info!("using postgres stores");
        Self::assemble(config, credentials, sessions, Some(pool))
    }

    fn assemble(
        config: &AppConfig,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        pool: Option<PgPool>,
    ) -> Result<Self, ServicesError> {
        let tokens = Arc::new(TokenService::new(
            config.access_token_secret.as_bytes(),
            config.refresh_token_secret.as_bytes(),
        ));
        let hasher = CredentialHasher::new(config.hashing)?;

        Ok(Self {
            auth: AuthService::new(credentials, sessions, tokens, hasher),
            expose_reset_token: config.expose_reset_token,
            pool,
        })
    }

    /// Release the connection pool, if any. Call after the server has drained.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("database pool closed");
        }
    }
}
