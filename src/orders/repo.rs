use async_trait::async_trait;

use crate::db::{DbError, PgSession, Session};
use crate::orders::repo_types::{NewOrder, Order};

#[async_trait]
pub trait OrderRepository<S: Session>: Send + Sync {
    /// Insert an order for an existing user. An unknown `user_id` or a
    /// non-positive quantity is a [`DbError::Constraint`].
    async fn create(&self, session: &mut S, new_order: NewOrder) -> Result<Order, DbError>;

    /// Orders of one user, oldest first.
    async fn list_for_user(&self, session: &mut S, user_id: i64) -> Result<Vec<Order>, DbError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PgOrderRepository;

#[async_trait]
impl OrderRepository<PgSession> for PgOrderRepository {
    async fn create(&self, session: &mut PgSession, new_order: NewOrder) -> Result<Order, DbError> {
        let conn = session.connection().await?;
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (user_id, item, quantity)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, item, quantity, created_at
            "#,
        )
        .bind(new_order.user_id)
        .bind(new_order.item)
        .bind(new_order.quantity)
        .fetch_one(&mut *conn)
        .await?;
        session.commit().await?;
        Ok(order)
    }

    async fn list_for_user(
        &self,
        session: &mut PgSession,
        user_id: i64,
    ) -> Result<Vec<Order>, DbError> {
        let conn = session.connection().await?;
        let rows = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, item, quantity, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }
}
