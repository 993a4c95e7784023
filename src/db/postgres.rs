use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    ConnectOptions, PgConnection, PgPool, Postgres, Transaction,
};
use tracing::debug;

use super::{DbError, Engine, ScopedConnection, Session};
use crate::config::DatabaseSettings;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, DbError> {
        let mut options = PgConnectOptions::from_str(&settings.database_url())?;
        if !settings.echo {
            options = options.disable_statement_logging();
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        debug!(
            host = %settings.host,
            port = settings.port,
            database = %settings.name,
            "connected to database"
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl Engine for PgEngine {
    type Connection = Transaction<'static, Postgres>;
    type Session = PgSession;

    async fn begin(&self) -> Result<Self::Connection, DbError> {
        Ok(self.pool.begin().await?)
    }

    async fn open_session(&self) -> Result<PgSession, DbError> {
        Ok(PgSession::new(self.pool.clone()))
    }

    async fn ensure_schema(&self) -> Result<(), DbError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    async fn dispose(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ScopedConnection for Transaction<'static, Postgres> {
    async fn commit(self) -> Result<(), DbError> {
        Transaction::commit(self).await.map_err(DbError::from)
    }

    async fn rollback(self) -> Result<(), DbError> {
        Transaction::rollback(self).await.map_err(DbError::from)
    }
}

/// Session over the pool. A transaction is started lazily on first use and
/// ends at `commit`, `rollback` or `close`; the next use starts a new one.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    closed: bool,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            closed: false,
        }
    }

    /// Connection of the current transaction, beginning one if needed.
    pub async fn connection(&mut self) -> Result<&mut PgConnection, DbError> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        self.tx.as_deref_mut().ok_or(DbError::SessionClosed)
    }
}

#[async_trait]
impl Session for PgSession {
    async fn commit(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
