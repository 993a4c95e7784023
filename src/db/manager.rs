use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{DbError, Engine, ScopedConnection, Session};

/// Owns the process-wide engine and hands out scoped connections and sessions.
///
/// The manager is either initialized (holds an engine) or closed. `shutdown`
/// is the only transition and it is one-way; everything called afterwards
/// fails with [`DbError::Uninitialized`].
pub struct SessionManager<E: Engine> {
    engine: RwLock<Option<Arc<E>>>,
}

impl<E: Engine> SessionManager<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: RwLock::new(Some(Arc::new(engine))),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.engine.read().await.is_some()
    }

    async fn engine(&self) -> Result<Arc<E>, DbError> {
        self.engine
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(DbError::Uninitialized)
    }

    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        self.engine().await?.ensure_schema().await
    }

    /// Runs `scope` on a connection inside a transaction.
    ///
    /// The transaction commits when `scope` returns `Ok`. When it returns `Err`
    /// the transaction is rolled back and that error is handed back as is.
    pub async fn connect<F, T, Error>(&self, scope: F) -> Result<T, Error>
    where
        F: for<'c> FnOnce(&'c mut E::Connection) -> BoxFuture<'c, Result<T, Error>> + Send,
        T: Send,
        Error: From<DbError> + Display + Send,
    {
        let engine = self.engine().await?;
        let mut conn = engine.begin().await?;

        let scoped = AssertUnwindSafe(scope(&mut conn)).catch_unwind().await;
        match scoped {
            Ok(Ok(value)) => {
                conn.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                debug!(error = %err, "connection scope failed, rolling back");
                match conn.rollback().await {
                    Ok(()) => Err(err),
                    Err(rollback_err) => {
                        warn!(error = %err, %rollback_err, "connection rollback failed");
                        Err(rollback_err.into())
                    }
                }
            }
            Err(payload) => {
                if let Err(rollback_err) = conn.rollback().await {
                    warn!(%rollback_err, "connection rollback after panic failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Runs `scope` with a fresh session.
    ///
    /// On `Err` (or panic) the session is rolled back first. The session is
    /// closed on every path before this returns. A failed rollback replaces the
    /// scope's error; a failed close only surfaces when the scope succeeded.
    pub async fn session<F, T, Error>(&self, scope: F) -> Result<T, Error>
    where
        F: for<'s> FnOnce(&'s mut E::Session) -> BoxFuture<'s, Result<T, Error>> + Send,
        T: Send,
        Error: From<DbError> + Display + Send,
    {
        let engine = self.engine().await?;
        let mut session = engine.open_session().await?;

        let scoped = AssertUnwindSafe(scope(&mut session)).catch_unwind().await;
        let outcome = match scoped {
            Ok(Ok(value)) => Ok(Ok(value)),
            Ok(Err(err)) => {
                debug!(error = %err, "session scope failed, rolling back");
                Ok(match session.rollback().await {
                    Ok(()) => Err(err),
                    Err(rollback_err) => {
                        warn!(error = %err, %rollback_err, "session rollback failed");
                        Err(Error::from(rollback_err))
                    }
                })
            }
            Err(payload) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(%rollback_err, "session rollback after panic failed");
                }
                Err(payload)
            }
        };

        let closed = session.close().await;

        match outcome {
            Ok(Ok(value)) => {
                closed?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(close_err) = closed {
                    warn!(%close_err, "session close failed");
                }
                Err(err)
            }
            Err(payload) => {
                if let Err(close_err) = closed {
                    warn!(%close_err, "session close after panic failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Disposes the pool and moves the manager to the closed state.
    pub async fn shutdown(&self) -> Result<(), DbError> {
        let mut guard = self.engine.write().await;
        let engine = guard.as_ref().ok_or(DbError::Uninitialized)?;
        engine.dispose().await;
        *guard = None;
        info!("database engine disposed");
        Ok(())
    }
}
