use async_trait::async_trait;

use super::DbError;

/// A live database handle: the connection pool plus the factory that opens
/// sessions on it.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    type Connection: ScopedConnection;
    type Session: Session;

    /// Opens a connection with a transaction already started on it.
    async fn begin(&self) -> Result<Self::Connection, DbError>;

    async fn open_session(&self) -> Result<Self::Session, DbError>;

    /// Brings the schema up to date.
    async fn ensure_schema(&self) -> Result<(), DbError>;

    /// Closes every pooled connection. The engine is unusable afterwards.
    async fn dispose(&self);
}

/// Connection bound to a single transaction.
#[async_trait]
pub trait ScopedConnection: Send + 'static {
    async fn commit(self) -> Result<(), DbError>;
    async fn rollback(self) -> Result<(), DbError>;
}

/// Unit of work. Writes made through a session become visible to others only
/// after `commit`.
#[async_trait]
pub trait Session: Send + 'static {
    async fn commit(&mut self) -> Result<(), DbError>;

    /// Discards uncommitted work. No-op when nothing is pending.
    async fn rollback(&mut self) -> Result<(), DbError>;

    /// Releases the underlying connection, discarding uncommitted work.
    /// Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), DbError>;

    fn is_closed(&self) -> bool;
}
