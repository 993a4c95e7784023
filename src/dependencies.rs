//! Request-scoped database session.

use futures::future::BoxFuture;
use tracing::{info_span, Instrument};

use crate::db::{Engine, SessionManager};
use crate::error::ApiError;

/// Runs `handler` with one session for the current request.
///
/// The session comes from [`SessionManager::session`], so it is rolled back
/// when the handler fails and closed before this returns.
pub async fn with_session<E, F, T>(sessions: &SessionManager<E>, handler: F) -> Result<T, ApiError>
where
    E: Engine,
    F: for<'s> FnOnce(&'s mut E::Session) -> BoxFuture<'s, Result<T, ApiError>> + Send,
    T: Send,
{
    sessions
        .session(handler)
        .instrument(info_span!("db_session"))
        .await
}
