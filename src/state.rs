use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::AppConfig;
use crate::db::{DbError, Engine, PgEngine, SessionManager};
use crate::users::repo::{PgUserRepository, UserRepository};

/// Shared by every request. `sessions` is the single process-wide manager.
pub struct AppState<E: Engine, U> {
    pub sessions: Arc<SessionManager<E>>,
    pub users: Arc<U>,
}

impl<E: Engine, U> Clone for AppState<E, U> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            users: Arc::clone(&self.users),
        }
    }
}

impl<E, U> AppState<E, U>
where
    E: Engine,
    U: UserRepository<E::Session>,
{
    pub fn new(sessions: SessionManager<E>, users: U) -> Self {
        Self {
            sessions: Arc::new(sessions),
            users: Arc::new(users),
        }
    }
}

pub type PgAppState = AppState<PgEngine, PgUserRepository>;

impl PgAppState {
    /// Connects the pool, brings the schema up to date and checks that a
    /// transaction round-trips.
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = PgEngine::connect(&config.database)
            .await
            .context("connect to database")?;
        let sessions = SessionManager::new(engine);

        sessions
            .ensure_schema()
            .await
            .context("ensure database schema")?;
        sessions
            .connect(|conn| {
                Box::pin(async move {
                    sqlx::query("SELECT 1").execute(&mut **conn).await?;
                    Ok::<_, DbError>(())
                })
            })
            .await
            .context("database ping")?;
        info!("database schema ready");

        Ok(Self::new(sessions, PgUserRepository))
    }
}
