//! Database access: engine and session traits, the lifecycle manager that owns
//! the engine, and the Postgres implementation.

mod engine;
mod manager;
pub mod postgres;

#[cfg(test)]
pub mod memory;

use sqlx::error::ErrorKind;
use thiserror::Error;

pub use engine::{Engine, ScopedConnection, Session};
pub use manager::SessionManager;
pub use postgres::{PgEngine, PgSession};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("session manager is not initialized")]
    Uninitialized,

    #[error("session is closed")]
    SessionClosed,

    #[error("row not found")]
    NotFound,

    /// Unique constraint violated (e.g. duplicate email).
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// Any other integrity constraint (foreign key, not null, check).
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::Conflict(db.constraint().unwrap_or(db.message()).to_string())
            }
            sqlx::Error::Database(ref db)
                if matches!(
                    db.kind(),
                    ErrorKind::ForeignKeyViolation
                        | ErrorKind::NotNullViolation
                        | ErrorKind::CheckViolation
                ) =>
            {
                Self::Constraint(db.constraint().unwrap_or(db.message()).to_string())
            }
            other => Self::Sqlx(other),
        }
    }
}
