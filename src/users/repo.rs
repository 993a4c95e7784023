use async_trait::async_trait;

use crate::db::{DbError, PgSession, Session};
use crate::users::repo_types::{NewUser, User};

/// Data access for [`User`] records through a session of type `S`.
///
/// Mutating calls commit the session and return the row as the database
/// stored it (generated key, default timestamps).
#[async_trait]
pub trait UserRepository<S: Session>: Send + Sync {
    /// Find a user by email. A missing row is `Ok(None)`.
    async fn find_by_email(&self, session: &mut S, email: &str) -> Result<Option<User>, DbError>;

    async fn email_exists(&self, session: &mut S, email: &str) -> Result<bool, DbError> {
        Ok(self.find_by_email(session, email).await?.is_some())
    }

    async fn create(&self, session: &mut S, new_user: NewUser) -> Result<User, DbError>;

    /// Write back the mutable fields of an existing user.
    async fn save(&self, session: &mut S, user: &User) -> Result<User, DbError>;

    /// Delete a user and, by cascade, its orders. Returns whether a row existed.
    async fn delete(&self, session: &mut S, id: i64) -> Result<bool, DbError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PgUserRepository;

#[async_trait]
impl UserRepository<PgSession> for PgUserRepository {
    async fn find_by_email(
        &self,
        session: &mut PgSession,
        email: &str,
    ) -> Result<Option<User>, DbError> {
        let conn = session.connection().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password, phone, address, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(user)
    }

    async fn create(&self, session: &mut PgSession, new_user: NewUser) -> Result<User, DbError> {
        let conn = session.connection().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password, phone, address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, password, phone, address, created_at, updated_at
            "#,
        )
        .bind(new_user.name)
        .bind(new_user.email)
        .bind(new_user.password)
        .bind(new_user.phone)
        .bind(new_user.address)
        .fetch_one(&mut *conn)
        .await?;
        session.commit().await?;
        Ok(user)
    }

    async fn save(&self, session: &mut PgSession, user: &User) -> Result<User, DbError> {
        let conn = session.connection().await?;
        let saved = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $2, email = $3, password = $4, phone = $5, address = $6,
                updated_at = now()
            WHERE id = $1
            RETURNING id, name, email, password, phone, address, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.phone)
        .bind(&user.address)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::NotFound)?;
        session.commit().await?;
        Ok(saved)
    }

    async fn delete(&self, session: &mut PgSession, id: i64) -> Result<bool, DbError> {
        let conn = session.connection().await?;
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        session.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
